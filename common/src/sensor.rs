use crate::error::SensorError;

/// Latest retained temperature/humidity pair. `None` until the first successful read.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    pub temperature_c: Option<f32>,
    pub humidity: Option<f32>,
}

/// Hardware integration point for the temperature/humidity sensor.
pub trait SensorDriver {
    /// Returns `(temperature_c, humidity_percent)`.
    fn read(&mut self) -> Result<(f32, f32), SensorError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    NotDue,
    Updated(SensorReading),
    Failed(SensorError),
}

pub fn is_due(now_ms: u64, last_ms: u64, interval_ms: u64) -> bool {
    now_ms.saturating_sub(last_ms) >= interval_ms
}

#[derive(Debug, Clone)]
pub struct SensorSampler {
    interval_ms: u64,
    reading: SensorReading,
    last_attempt_ms: u64,
}

impl SensorSampler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            reading: SensorReading::default(),
            last_attempt_ms: 0,
        }
    }

    pub fn maybe_sample<D: SensorDriver + ?Sized>(
        &mut self,
        now_ms: u64,
        driver: &mut D,
    ) -> SampleOutcome {
        if !is_due(now_ms, self.last_attempt_ms, self.interval_ms) {
            return SampleOutcome::NotDue;
        }
        self.last_attempt_ms = now_ms;

        let (temperature_c, humidity) = match driver.read() {
            Ok(values) => values,
            Err(err) => return SampleOutcome::Failed(err),
        };

        if !temperature_c.is_finite() || !humidity.is_finite() {
            return SampleOutcome::Failed(SensorError::InvalidData);
        }

        self.reading = SensorReading {
            temperature_c: Some(temperature_c),
            humidity: Some(humidity),
        };
        SampleOutcome::Updated(self.reading)
    }

    pub fn current(&self) -> SensorReading {
        self.reading
    }
}
