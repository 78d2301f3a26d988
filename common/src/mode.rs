#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Auto,
    Manual,
}

impl ControlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Manual => "MANUAL",
        }
    }
}

/// Decides who owns the relays: the thermostat (AUTO) or the last remote
/// command (MANUAL). MANUAL is entered only by a command and left only when
/// the timeout elapses with no further commands.
#[derive(Debug, Clone)]
pub struct ModeArbiter {
    timeout_ms: u64,
    mode: ControlMode,
    last_command_ms: u64,
}

impl ModeArbiter {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            mode: ControlMode::Auto,
            last_command_ms: 0,
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn is_manual(&self) -> bool {
        self.mode == ControlMode::Manual
    }

    pub fn on_external_command(&mut self, now_ms: u64) {
        self.mode = ControlMode::Manual;
        self.last_command_ms = now_ms;
    }

    /// Returns true when this call reverted MANUAL back to AUTO.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        if self.is_manual() && now_ms.saturating_sub(self.last_command_ms) >= self.timeout_ms {
            self.mode = ControlMode::Auto;
            return true;
        }
        false
    }

    pub fn remaining_manual_ms(&self, now_ms: u64) -> u64 {
        if !self.is_manual() {
            return 0;
        }
        let elapsed = now_ms.saturating_sub(self.last_command_ms);
        self.timeout_ms.saturating_sub(elapsed)
    }

    pub fn remaining_manual_seconds(&self, now_ms: u64) -> u64 {
        self.remaining_manual_ms(now_ms) / 1_000
    }
}
