//! Configuration file support.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::filter::{BluetoothFilter, UsbFilter};

/// Backend choice and default device filters.
///
/// ```toml
/// backend = "native"
///
/// [usb]
/// vendor_id = 0x0f4e
///
/// [bluetooth]
/// name_pattern = "Focus*"
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HidConfig {
    pub backend: BackendKind,
    pub usb: UsbFilter,
    pub bluetooth: BluetoothFilter,
}

impl HidConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HidConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::HID_SERVICE_UUID;

    #[test]
    fn test_parse_config() {
        let config: HidConfig = toml::from_str(
            r#"
            backend = "null"

            [usb]
            vendor_id = 0x0f4e
            product_id = 0x0100

            [bluetooth]
            name_pattern = "Focus*"
            service_uuid = "00001124-0000-1000-8000-00805f9b34fb"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendKind::Null);
        assert_eq!(config.usb, UsbFilter::ids(0x0F4E, 0x0100));
        assert_eq!(config.bluetooth.service_uuid, Some(HID_SERVICE_UUID));
    }

    #[test]
    fn test_empty_config_matches_anything() {
        let config: HidConfig = toml::from_str("").unwrap();
        assert_eq!(config, HidConfig::default());
        assert_eq!(config.backend, BackendKind::Native);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hid.toml");
        let config = HidConfig {
            backend: BackendKind::Null,
            usb: UsbFilter {
                serial_number: Some("SN-42".into()),
                ..Default::default()
            },
            bluetooth: BluetoothFilter::address("AA:BB:CC:DD:EE:FF".parse().unwrap()),
        };

        config.save_to_file(&path).unwrap();
        let loaded = HidConfig::load_from_file(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(HidConfig::load_from_file(dir.path().join("absent.toml")).is_err());
    }
}
