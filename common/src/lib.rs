pub mod api;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod mode;
pub mod relay;
pub mod sensor;
pub mod thermostat;
pub mod types;

pub use api::{parse_relay_command, RelayCommand, CORS_HEADERS};
pub use config::{RuntimeConfig, ThermostatConfig, TimingConfig};
pub use controller::{Controller, TickReport};
pub use error::{CommandError, ConfigError, SensorError};
pub use mode::{ControlMode, ModeArbiter};
pub use relay::{ActiveLevel, Level, PinWrite, RelayBank, RelayStates};
pub use sensor::{SampleOutcome, SensorDriver, SensorReading, SensorSampler};
pub use thermostat::{Demand, RelayPlan};
pub use types::{ErrorBody, StatusPayload};
