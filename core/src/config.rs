//! Engine configuration.

use std::time::Duration;

/// Tunables for the reservation engine, read from `BOXOFFICE_*`
/// environment variables with sensible defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum tickets per reservation (`BOXOFFICE_MAX_TICKETS`)
    pub max_tickets_per_reservation: u32,
    /// Default hold duration in minutes (`BOXOFFICE_HOLD_MINUTES`)
    pub hold_minutes: i64,
    /// Reclaimer sweep interval (`BOXOFFICE_RECLAIM_INTERVAL_SECS`)
    pub reclaim_interval: Duration,
    /// Payment gateway call timeout (`BOXOFFICE_GATEWAY_TIMEOUT_SECS`)
    pub gateway_timeout: Duration,
    /// ISO 4217 currency code (`BOXOFFICE_CURRENCY`)
    pub currency: String,
}

impl EngineConfig {
    /// Loads configuration from the environment, falling back to defaults
    /// for anything unset or unparseable
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_tickets_per_reservation: std::env::var("BOXOFFICE_MAX_TICKETS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tickets_per_reservation),
            hold_minutes: std::env::var("BOXOFFICE_HOLD_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.hold_minutes),
            reclaim_interval: std::env::var("BOXOFFICE_RECLAIM_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.reclaim_interval, Duration::from_secs),
            gateway_timeout: std::env::var("BOXOFFICE_GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(defaults.gateway_timeout, Duration::from_secs),
            currency: std::env::var("BOXOFFICE_CURRENCY").unwrap_or(defaults.currency),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tickets_per_reservation: 5,
            hold_minutes: 25,
            reclaim_interval: Duration::from_secs(30),
            gateway_timeout: Duration::from_secs(10),
            currency: "USD".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_tickets_per_reservation, 5);
        assert_eq!(config.hold_minutes, 25);
        assert_eq!(config.reclaim_interval, Duration::from_secs(30));
        assert_eq!(config.gateway_timeout, Duration::from_secs(10));
        assert_eq!(config.currency, "USD");
    }
}
