//! Backend layer module.

#[cfg(feature = "hidapi")]
pub mod hidapi;
pub mod mock;
pub mod null;
#[cfg(feature = "nusb")]
pub mod nusb;
pub mod split;
pub mod traits;

#[cfg(feature = "hidapi")]
pub use self::hidapi::HidapiBackend;
pub use mock::{MockAccess, MockBackend, MockProbe};
pub use null::NullBackend;
#[cfg(feature = "nusb")]
pub use self::nusb::NusbBackend;
pub use split::SplitBackend;
pub use traits::{HidBackend, HidConnection, ReportType, output_report_parts};

use serde::{Deserialize, Serialize};

/// Backend choices available from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// USB and Bluetooth, each through the native backend compiled in for it.
    #[default]
    Native,
    /// USB only.
    Usb,
    /// Bluetooth only.
    Bluetooth,
    Null,
}

impl BackendKind {
    pub fn create(self) -> Box<dyn HidBackend> {
        match self {
            BackendKind::Native => Box::new(SplitBackend::new(usb_backend(), bluetooth_backend())),
            BackendKind::Usb => usb_backend(),
            BackendKind::Bluetooth => bluetooth_backend(),
            BackendKind::Null => Box::new(NullBackend),
        }
    }
}

#[cfg(feature = "nusb")]
fn usb_backend() -> Box<dyn HidBackend> {
    Box::new(NusbBackend::new())
}

#[cfg(not(feature = "nusb"))]
fn usb_backend() -> Box<dyn HidBackend> {
    tracing::debug!("No USB HID backend compiled in");
    Box::new(NullBackend)
}

#[cfg(feature = "hidapi")]
fn bluetooth_backend() -> Box<dyn HidBackend> {
    Box::new(HidapiBackend::new())
}

#[cfg(not(feature = "hidapi"))]
fn bluetooth_backend() -> Box<dyn HidBackend> {
    tracing::debug!("No Bluetooth HID backend compiled in");
    Box::new(NullBackend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kinds() {
        assert_eq!(BackendKind::Native.create().name(), "split");
        assert_eq!(BackendKind::Null.create().name(), "null");

        #[cfg(feature = "nusb")]
        assert_eq!(BackendKind::Usb.create().name(), "nusb");
        #[cfg(feature = "hidapi")]
        assert_eq!(BackendKind::Bluetooth.create().name(), "hidapi");
    }

    #[cfg(not(feature = "hidapi"))]
    #[test]
    fn test_bluetooth_without_backend_is_unsupported() {
        use crate::error::ErrorKind;
        use crate::filter::BluetoothFilter;

        let err = BackendKind::Native
            .create()
            .open_bluetooth(&BluetoothFilter::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn test_backend_kind_names() {
        let kinds: Vec<BackendKind> = ["native", "usb", "bluetooth", "null"]
            .iter()
            .map(|name| toml::Value::String(name.to_string()).try_into().unwrap())
            .collect();
        assert_eq!(
            kinds,
            [
                BackendKind::Native,
                BackendKind::Usb,
                BackendKind::Bluetooth,
                BackendKind::Null
            ]
        );
    }
}
