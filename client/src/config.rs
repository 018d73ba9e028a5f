use crate::input::InputPattern;
use shared::{DEFAULT_PORT, DEFAULT_TICK_RATE, RETRANSMIT_INTERVAL_MS, RETRANSMIT_THRESHOLD_MS};
use std::time::Duration;

/// Client tuning knobs
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, `host:port`; host names are resolved once at startup
    pub server_addr: String,
    pub player_id: u16,
    /// Inputs sent per second
    pub tick_rate: u32,
    pub ping_interval: Duration,
    /// Trailing window used for the loss estimate
    pub telemetry_horizon: Duration,
    /// Packets younger than this are still in flight and not counted as lost
    pub loss_grace: Duration,
    pub retransmit_interval: Duration,
    pub retransmit_threshold: Duration,
    pub pattern: InputPattern,
    /// Seed for the `wander` pattern
    pub seed: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            player_id: 1,
            tick_rate: DEFAULT_TICK_RATE,
            ping_interval: Duration::from_secs(1),
            telemetry_horizon: Duration::from_secs(2),
            loss_grace: Duration::from_millis(250),
            retransmit_interval: Duration::from_millis(RETRANSMIT_INTERVAL_MS),
            retransmit_threshold: Duration::from_millis(RETRANSMIT_THRESHOLD_MS),
            pattern: InputPattern::Idle,
            seed: None,
        }
    }
}

impl ClientConfig {
    /// Interval between two input sends
    pub fn tick_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.tick_rate.max(1) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_addr, "127.0.0.1:30000");
        assert_eq!(config.player_id, 1);
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.retransmit_interval, Duration::from_millis(100));
        assert_eq!(config.retransmit_threshold, Duration::from_millis(200));
        assert_eq!(config.pattern, InputPattern::Idle);
    }

    #[test]
    fn test_tick_duration() {
        let config = ClientConfig {
            tick_rate: 20,
            ..ClientConfig::default()
        };
        assert_eq!(config.tick_duration(), Duration::from_millis(50));

        let zero = ClientConfig {
            tick_rate: 0,
            ..ClientConfig::default()
        };
        assert_eq!(zero.tick_duration(), Duration::from_secs(1));
    }
}
