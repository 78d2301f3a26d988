use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, relay::ActiveLevel};

pub const RELAY_CHANNEL_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermostatConfig {
    pub target_temp_c: f32,
    pub hysteresis_c: f32,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            target_temp_c: 26.0,
            hysteresis_c: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub sensor_interval_ms: u64,
    pub manual_timeout_ms: u64,
    pub display_interval_ms: u64,
    pub tick_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sensor_interval_ms: 2_000,
            manual_timeout_ms: 180_000,
            display_interval_ms: 1_000,
            tick_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayChannelConfig {
    pub gpio: i32,
    pub active: ActiveLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub channels: [RelayChannelConfig; RELAY_CHANNEL_COUNT],
}

impl Default for RelayConfig {
    fn default() -> Self {
        // Most relay boards energize the coil when the input is pulled low.
        // GPIO0 is a boot strapping pin; move channel 1 if the board fails to boot.
        let channel = |gpio| RelayChannelConfig {
            gpio,
            active: ActiveLevel::Low,
        };
        Self {
            channels: [channel(0), channel(14), channel(12), channel(13)],
        }
    }
}

impl RelayConfig {
    pub fn active_levels(&self) -> [ActiveLevel; RELAY_CHANNEL_COUNT] {
        self.channels.map(|channel| channel.active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub dht_gpio: i32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self { dht_gpio: 19 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            http_port: 80,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub thermostat: ThermostatConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub relays: RelayConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl RuntimeConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        let mut config = serde_json::from_slice::<Self>(raw)?;
        config.sanitize();
        Ok(config)
    }

    pub fn sanitize(&mut self) {
        self.thermostat.sanitize();
        self.timing.sanitize();
    }
}

impl ThermostatConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !self.target_temp_c.is_finite() {
            self.target_temp_c = defaults.target_temp_c;
        }
        self.target_temp_c = self.target_temp_c.clamp(-20.0, 60.0);

        if !self.hysteresis_c.is_finite() || self.hysteresis_c < 0.0 {
            self.hysteresis_c = defaults.hysteresis_c;
        }
    }
}

impl TimingConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if self.sensor_interval_ms == 0 {
            self.sensor_interval_ms = defaults.sensor_interval_ms;
        }
        if self.manual_timeout_ms == 0 {
            self.manual_timeout_ms = defaults.manual_timeout_ms;
        }
        if self.display_interval_ms == 0 {
            self.display_interval_ms = defaults.display_interval_ms;
        }
        if self.tick_interval_ms == 0 {
            self.tick_interval_ms = defaults.tick_interval_ms;
        }
    }
}
