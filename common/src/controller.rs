use crate::{
    api::RelayCommand,
    config::{RuntimeConfig, ThermostatConfig},
    display,
    mode::{ControlMode, ModeArbiter},
    relay::{PinWrite, RelayBank, FAN1_CHANNEL, FAN2_CHANNEL, HEATER_CHANNEL},
    sensor::{SampleOutcome, SensorDriver, SensorSampler},
    thermostat::{self, RelayPlan},
    types::{one_decimal, StatusPayload},
};

/// What one control tick did, for the runtime shell to execute and log.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub sample: SampleOutcome,
    pub reverted_to_auto: bool,
    pub plan: Option<RelayPlan>,
    pub writes: Vec<PinWrite>,
}

/// All mutable control state: relays, last reading and mode. Every request
/// and every tick goes through one `&mut Controller`, so each runs to
/// completion before the next one starts.
#[derive(Debug, Clone)]
pub struct Controller {
    thermostat: ThermostatConfig,
    relays: RelayBank,
    sampler: SensorSampler,
    arbiter: ModeArbiter,
}

impl Controller {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            thermostat: config.thermostat,
            relays: RelayBank::new(config.relays.active_levels()),
            sampler: SensorSampler::new(config.timing.sensor_interval_ms),
            arbiter: ModeArbiter::new(config.timing.manual_timeout_ms),
        }
    }

    /// Pin writes that put every relay in its off state at boot.
    pub fn startup(&mut self) -> Vec<PinWrite> {
        self.relays.all_off()
    }

    pub fn relays(&self) -> &RelayBank {
        &self.relays
    }

    pub fn mode(&self) -> ControlMode {
        self.arbiter.mode()
    }

    /// Sample if due, expire MANUAL if its timeout elapsed, then let the
    /// thermostat drive the relays when in AUTO.
    pub fn tick<D: SensorDriver + ?Sized>(&mut self, now_ms: u64, driver: &mut D) -> TickReport {
        let sample = self.sampler.maybe_sample(now_ms, driver);
        let reverted_to_auto = self.arbiter.tick(now_ms);

        if self.arbiter.is_manual() {
            return TickReport {
                sample,
                reverted_to_auto,
                plan: None,
                writes: Vec::new(),
            };
        }

        let plan = thermostat::decide(&self.sampler.current(), &self.thermostat);
        let writes = plan.map(|plan| self.apply_plan(plan)).unwrap_or_default();

        TickReport {
            sample,
            reverted_to_auto,
            plan,
            writes,
        }
    }

    /// Applies a validated relay command and hands relay ownership to the
    /// operator until the manual timeout runs out.
    pub fn apply_relay_command(&mut self, command: RelayCommand, now_ms: u64) -> Option<PinWrite> {
        let write = self.relays.set(command.channel, command.on);
        self.arbiter.on_external_command(now_ms);
        write
    }

    pub fn status(&self, now_ms: u64) -> StatusPayload {
        let reading = self.sampler.current();
        StatusPayload {
            mode: self.arbiter.mode().as_str(),
            manual_remaining_s: self.arbiter.remaining_manual_seconds(now_ms),
            target_temp: one_decimal(self.thermostat.target_temp_c),
            temperature: reading.temperature_c.map(one_decimal),
            humidity: reading.humidity.map(one_decimal),
            relay: self.relays.states(),
        }
    }

    pub fn display_lines(&self) -> [String; 2] {
        display::render(
            &self.sampler.current(),
            self.arbiter.mode(),
            &self.relays.states(),
        )
    }

    fn apply_plan(&mut self, plan: RelayPlan) -> Vec<PinWrite> {
        [
            (HEATER_CHANNEL, plan.heater),
            (FAN1_CHANNEL, plan.cooling),
            (FAN2_CHANNEL, plan.cooling),
        ]
        .into_iter()
        .filter_map(|(channel, on)| self.relays.set(channel, on))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::SensorError,
        relay::{Level, RelayStates, AUX_CHANNEL},
        thermostat::Demand,
    };

    /// Returns a fixed reading, or fails when `fail` is set.
    struct FixedSensor {
        temperature_c: f32,
        humidity: f32,
        fail: bool,
    }

    impl FixedSensor {
        fn at(temperature_c: f32) -> Self {
            Self {
                temperature_c,
                humidity: 55.0,
                fail: false,
            }
        }
    }

    impl SensorDriver for FixedSensor {
        fn read(&mut self) -> Result<(f32, f32), SensorError> {
            if self.fail {
                return Err(SensorError::ReadFailed("no response".into()));
            }
            Ok((self.temperature_c, self.humidity))
        }
    }

    fn controller() -> Controller {
        let mut controller = Controller::new(&RuntimeConfig::default());
        controller.startup();
        controller
    }

    fn relay_tuple(controller: &Controller) -> (bool, bool, bool) {
        let relays = controller.relays();
        (
            relays.get(HEATER_CHANNEL),
            relays.get(FAN1_CHANNEL),
            relays.get(FAN2_CHANNEL),
        )
    }

    #[test]
    fn status_before_first_read_has_null_reading() {
        let controller = controller();
        let status = controller.status(0);

        assert_eq!(status.mode, "AUTO");
        assert_eq!(status.manual_remaining_s, 0);
        assert_eq!(status.target_temp, 26.0);
        assert_eq!(status.temperature, None);
        assert_eq!(status.humidity, None);
        assert_eq!(status.relay, RelayStates::default());
    }

    #[test]
    fn startup_turns_all_relays_off_with_configured_polarity() {
        let mut controller = Controller::new(&RuntimeConfig::default());
        let writes = controller.startup();

        assert_eq!(writes.len(), 4);
        assert!(writes.iter().all(|write| !write.on && write.level == Level::High));
    }

    #[test]
    fn auto_mode_follows_thermostat() {
        let mut controller = controller();
        let mut sensor = FixedSensor::at(30.0);

        let report = controller.tick(2_000, &mut sensor);
        assert_eq!(report.plan.map(|plan| plan.demand), Some(Demand::TooHot));
        assert_eq!(report.writes.len(), 3);
        assert_eq!(relay_tuple(&controller), (false, true, true));

        sensor.temperature_c = 20.0;
        controller.tick(4_000, &mut sensor);
        assert_eq!(relay_tuple(&controller), (true, false, false));

        sensor.temperature_c = 26.5;
        controller.tick(6_000, &mut sensor);
        assert_eq!(relay_tuple(&controller), (false, false, false));
    }

    #[test]
    fn no_reading_means_no_writes() {
        let mut controller = controller();
        let mut sensor = FixedSensor::at(30.0);
        sensor.fail = true;

        let report = controller.tick(2_000, &mut sensor);

        assert!(matches!(report.sample, SampleOutcome::Failed(_)));
        assert_eq!(report.plan, None);
        assert!(report.writes.is_empty());
    }

    #[test]
    fn command_enters_manual_and_reports_new_state() {
        let mut controller = controller();

        let write = controller.apply_relay_command(
            RelayCommand {
                channel: AUX_CHANNEL,
                on: true,
            },
            10_000,
        );
        let status = controller.status(10_000);

        assert_eq!(write.map(|write| write.level), Some(Level::Low));
        assert_eq!(status.mode, "MANUAL");
        assert_eq!(status.manual_remaining_s, 180);
        assert!(status.relay.ch1);
    }

    #[test]
    fn manual_mode_freezes_relays_regardless_of_readings() {
        let mut controller = controller();
        let mut sensor = FixedSensor::at(35.0);
        controller.apply_relay_command(
            RelayCommand {
                channel: HEATER_CHANNEL,
                on: true,
            },
            1_000,
        );

        for (step, temperature) in [35.0, 10.0, 26.0, 40.0].into_iter().enumerate() {
            sensor.temperature_c = temperature;
            let report = controller.tick(2_000 * (step as u64 + 1), &mut sensor);
            assert!(report.writes.is_empty());
            assert_eq!(relay_tuple(&controller), (true, false, false));
        }
    }

    #[test]
    fn command_in_same_tick_is_not_overwritten() {
        let mut controller = controller();
        let mut sensor = FixedSensor::at(30.0);
        controller.tick(2_000, &mut sensor);
        assert_eq!(relay_tuple(&controller), (false, true, true));

        controller.apply_relay_command(
            RelayCommand {
                channel: FAN1_CHANNEL,
                on: false,
            },
            2_100,
        );
        controller.tick(2_100, &mut sensor);

        assert_eq!(relay_tuple(&controller), (false, false, true));
    }

    #[test]
    fn timeout_reverts_and_thermostat_applies_on_same_tick() {
        let mut controller = controller();
        let mut sensor = FixedSensor::at(20.0);
        controller.tick(2_000, &mut sensor);
        controller.apply_relay_command(
            RelayCommand {
                channel: HEATER_CHANNEL,
                on: false,
            },
            3_000,
        );

        let report = controller.tick(182_999, &mut sensor);
        assert!(!report.reverted_to_auto);
        assert_eq!(relay_tuple(&controller), (false, false, false));

        let report = controller.tick(183_000, &mut sensor);
        assert!(report.reverted_to_auto);
        assert_eq!(controller.mode(), ControlMode::Auto);
        assert_eq!(relay_tuple(&controller), (true, false, false));
    }

    #[test]
    fn repeated_command_is_idempotent_and_rearms_timeout() {
        let mut controller = controller();
        let command = RelayCommand {
            channel: FAN2_CHANNEL,
            on: true,
        };

        controller.apply_relay_command(command, 0);
        let first = controller.status(0).relay;
        controller.apply_relay_command(command, 50_000);
        let second = controller.status(50_000);

        assert_eq!(first, second.relay);
        assert_eq!(second.manual_remaining_s, 180);
        assert_eq!(controller.status(60_000).manual_remaining_s, 170);
    }

    #[test]
    fn failed_read_keeps_reporting_last_good_values() {
        let mut controller = controller();
        let mut sensor = FixedSensor::at(24.26);
        sensor.humidity = 48.0;
        controller.tick(2_000, &mut sensor);

        sensor.fail = true;
        let report = controller.tick(4_000, &mut sensor);
        let status = controller.status(4_000);

        assert!(matches!(report.sample, SampleOutcome::Failed(_)));
        assert_eq!(status.temperature, Some(24.3));
        assert_eq!(status.humidity, Some(48.0));
    }

    #[test]
    fn display_reflects_relay_bank() {
        let mut controller = controller();
        controller.tick(2_000, &mut FixedSensor::at(30.0));

        assert_eq!(
            controller.display_lines(),
            ["T:30.0C H:55%".to_string(), "AUT H:0 F:12".to_string()]
        );
    }
}
