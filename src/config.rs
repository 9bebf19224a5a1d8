//! Driver configuration.

use std::time::Duration;

/// Tunables for [`BleDriver`](crate::BleDriver).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DriverConfig {
    /// Delay before the first tick of a begin or end sequence, in milliseconds.
    pub entry_delay_ms: u64,
    /// Delay between consecutive sequence ticks, in milliseconds.
    ///
    /// The peripheral never acknowledges sequence steps, so this has to be long
    /// enough for it to settle after each write.
    pub step_delay_ms: u64,
    /// Events buffered per subscriber before the slowest one starts lagging.
    pub event_capacity: usize,
}

impl DriverConfig {
    /// Default delay before the first tick.
    pub const DEFAULT_ENTRY_DELAY: Duration = Duration::from_millis(100);
    /// Default delay between ticks.
    pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(500);

    /// Set the delay before the first tick.
    pub fn with_entry_delay(mut self, delay: Duration) -> Self {
        self.entry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the delay between ticks.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the per-subscriber event buffer.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Delay before the first tick.
    pub fn entry_delay(&self) -> Duration {
        Duration::from_millis(self.entry_delay_ms)
    }

    /// Delay between ticks.
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            entry_delay_ms: Self::DEFAULT_ENTRY_DELAY.as_millis() as u64,
            step_delay_ms: Self::DEFAULT_STEP_DELAY.as_millis() as u64,
            event_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.entry_delay(), Duration::from_millis(100));
        assert_eq!(config.step_delay(), Duration::from_millis(500));
        assert_eq!(config.event_capacity, 64);
    }

    #[test]
    fn test_builder() {
        let config = DriverConfig::default()
            .with_entry_delay(Duration::from_millis(10))
            .with_step_delay(Duration::from_millis(50))
            .with_event_capacity(8);
        assert_eq!(config.entry_delay_ms, 10);
        assert_eq!(config.step_delay_ms, 50);
        assert_eq!(config.event_capacity, 8);
    }
}
