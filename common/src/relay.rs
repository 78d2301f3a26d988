use serde::{Deserialize, Serialize};

use crate::config::RELAY_CHANNEL_COUNT;

pub const AUX_CHANNEL: u8 = 1;
pub const HEATER_CHANNEL: u8 = 2;
pub const FAN1_CHANNEL: u8 = 3;
pub const FAN2_CHANNEL: u8 = 4;

/// Physical signal level on a relay input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    High,
    Low,
}

/// Which signal level energizes a given relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveLevel {
    High,
    Low,
}

impl ActiveLevel {
    pub fn level_for(self, on: bool) -> Level {
        match (self, on) {
            (Self::High, true) | (Self::Low, false) => Level::High,
            (Self::High, false) | (Self::Low, true) => Level::Low,
        }
    }
}

/// A pin write performed by [`RelayBank::set`], for the runtime shell to carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinWrite {
    pub channel: u8,
    pub on: bool,
    pub level: Level,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RelayStates {
    pub ch1: bool,
    pub ch2: bool,
    pub ch3: bool,
    pub ch4: bool,
}

#[derive(Debug, Clone)]
pub struct RelayBank {
    states: [bool; RELAY_CHANNEL_COUNT],
    active: [ActiveLevel; RELAY_CHANNEL_COUNT],
}

impl RelayBank {
    pub fn new(active: [ActiveLevel; RELAY_CHANNEL_COUNT]) -> Self {
        Self {
            states: [false; RELAY_CHANNEL_COUNT],
            active,
        }
    }

    pub fn is_valid_channel(channel: i64) -> bool {
        (1..=RELAY_CHANNEL_COUNT as i64).contains(&channel)
    }

    /// Records the logical state of `channel` and returns the pin write that
    /// realizes it. Channels outside 1-4 are ignored.
    pub fn set(&mut self, channel: u8, on: bool) -> Option<PinWrite> {
        let index = Self::index(channel)?;
        self.states[index] = on;
        Some(PinWrite {
            channel,
            on,
            level: self.active[index].level_for(on),
        })
    }

    pub fn get(&self, channel: u8) -> bool {
        Self::index(channel)
            .map(|index| self.states[index])
            .unwrap_or(false)
    }

    pub fn all_off(&mut self) -> Vec<PinWrite> {
        (1..=RELAY_CHANNEL_COUNT as u8)
            .filter_map(|channel| self.set(channel, false))
            .collect()
    }

    pub fn states(&self) -> RelayStates {
        let [ch1, ch2, ch3, ch4] = self.states;
        RelayStates { ch1, ch2, ch3, ch4 }
    }

    fn index(channel: u8) -> Option<usize> {
        let index = usize::from(channel).checked_sub(1)?;
        (index < RELAY_CHANNEL_COUNT).then_some(index)
    }
}
