//! Role controller configuration
//!
//! Both roles agree on an `ExchangeProfile`: which service the peripheral
//! advertises and which characteristic carries the counter.

use crate::ids::{CharacteristicId, ServiceId, COUNTER_CHARACTERISTIC_ID, COUNTER_SERVICE_ID};
use serde::{Deserialize, Serialize};

/// Service + characteristic pair shared by both roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeProfile {
    pub service_id: ServiceId,
    pub characteristic_id: CharacteristicId,
}

impl Default for ExchangeProfile {
    fn default() -> Self {
        Self {
            service_id: COUNTER_SERVICE_ID,
            characteristic_id: COUNTER_CHARACTERISTIC_ID,
        }
    }
}

/// Central role configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralConfig {
    pub profile: ExchangeProfile,
}

impl CentralConfig {
    pub fn new(profile: ExchangeProfile) -> Self {
        Self { profile }
    }
}

/// Peripheral role configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    pub profile: ExchangeProfile,

    /// Local name included in the advertisement
    pub local_name: Option<String>,

    /// Answer reads past the end of the value with `InvalidOffset` instead
    /// of leaving them unanswered
    pub reject_invalid_offset: bool,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            profile: ExchangeProfile::default(),
            local_name: Some("BLE-COUNTER".to_string()),
            reject_invalid_offset: false,
        }
    }
}

impl PeripheralConfig {
    pub fn new(profile: ExchangeProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    pub fn with_reject_invalid_offset(mut self, reject: bool) -> Self {
        self.reject_invalid_offset = reject;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_uses_counter_ids() {
        let profile = ExchangeProfile::default();
        assert_eq!(profile.service_id, COUNTER_SERVICE_ID);
        assert_eq!(profile.characteristic_id, COUNTER_CHARACTERISTIC_ID);
    }

    #[test]
    fn test_peripheral_defaults() {
        let config = PeripheralConfig::default();
        assert_eq!(config.local_name.as_deref(), Some("BLE-COUNTER"));
        assert!(!config.reject_invalid_offset);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: PeripheralConfig =
            serde_json::from_str(r#"{ "reject_invalid_offset": true }"#).unwrap();
        assert!(config.reject_invalid_offset);
        assert_eq!(config.profile, ExchangeProfile::default());
    }

    #[test]
    fn test_config_serialization() {
        let config = CentralConfig::new(ExchangeProfile {
            service_id: ServiceId::from_u16(0x180D),
            characteristic_id: CharacteristicId::from_u16(0x2A37),
        });
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: CentralConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}
