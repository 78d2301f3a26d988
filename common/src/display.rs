//! Two-line, 16-column status text as shown on the front panel.

use crate::{mode::ControlMode, relay::RelayStates, sensor::SensorReading};

pub const DISPLAY_COLUMNS: usize = 16;

pub fn render(reading: &SensorReading, mode: ControlMode, relays: &RelayStates) -> [String; 2] {
    let temperature = reading
        .temperature_c
        .map(|value| format!("{value:.1}"))
        .unwrap_or_else(|| "--.-".to_string());
    // The panel shows whole percent; truncate like an integer cast.
    let humidity = reading
        .humidity
        .map(|value| (value as i32).to_string())
        .unwrap_or_else(|| "--".to_string());

    let mode = match mode {
        ControlMode::Manual => "MAN",
        ControlMode::Auto => "AUT",
    };

    let fans = match (relays.ch3, relays.ch4) {
        (true, true) => "12",
        (true, false) => "1 ",
        (false, true) => "2 ",
        (false, false) => "0 ",
    };

    [
        fit(format!("T:{temperature}C H:{humidity}%")),
        fit(format!("{mode} H:{} F:{fans}", u8::from(relays.ch2))),
    ]
}

fn fit(line: String) -> String {
    line.chars().take(DISPLAY_COLUMNS).collect()
}
