use crate::{config::ThermostatConfig, sensor::SensorReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    TooHot,
    TooCold,
    Comfortable,
}

/// Desired relay states for one AUTO evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPlan {
    pub demand: Demand,
    pub heater: bool,
    pub cooling: bool,
}

impl RelayPlan {
    fn for_demand(demand: Demand) -> Self {
        let (heater, cooling) = match demand {
            Demand::TooHot => (false, true),
            Demand::TooCold => (true, false),
            Demand::Comfortable => (false, false),
        };
        Self {
            demand,
            heater,
            cooling,
        }
    }
}

/// Three-band hysteresis. Returns `None` while the temperature is unknown,
/// meaning the relays are left as they are.
pub fn decide(reading: &SensorReading, config: &ThermostatConfig) -> Option<RelayPlan> {
    let temperature = reading.temperature_c?;
    let upper_bound = config.target_temp_c + config.hysteresis_c;
    let lower_bound = config.target_temp_c - config.hysteresis_c;

    let demand = if temperature > upper_bound {
        Demand::TooHot
    } else if temperature < lower_bound {
        Demand::TooCold
    } else {
        Demand::Comfortable
    };

    Some(RelayPlan::for_demand(demand))
}
