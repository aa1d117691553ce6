use serde::{Deserialize, Serialize};
use sos_activation::CountdownConfig;
use sos_location::LocationConfig;
use sos_motion::ShakeConfig;

/// Tunables for one session, persisted under `sos-config`.
///
/// Every section falls back to its defaults when missing from storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SosConfig {
    pub countdown: CountdownConfig,
    pub shake: ShakeConfig,
    pub location: LocationConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SosConfig::default();
        assert_eq!(config.countdown.duration_secs, 5);
        assert_eq!(config.countdown.tick_ms, 1000);
        assert_eq!(config.shake.threshold, 15.0);
        assert_eq!(config.shake.required_peaks, 1);
        assert_eq!(config.shake.buffer_capacity, 64);
        assert_eq!(
            config.location.refresh_interval(),
            Some(std::time::Duration::from_secs(30))
        );
    }

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let config: SosConfig =
            serde_json::from_str(r#"{"countdown": {"duration_secs": 3}}"#).unwrap();
        assert_eq!(config.countdown.duration_secs, 3);
        assert_eq!(config.countdown.tick_ms, 1000);
        assert_eq!(config.shake, ShakeConfig::default());
    }
}
