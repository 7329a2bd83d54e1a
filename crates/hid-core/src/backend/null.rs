//! Backend for platforms without HID support.

use super::traits::HidBackend;
use crate::device::HidDevice;
use crate::error::HidError;
use crate::filter::{BluetoothFilter, UsbFilter};

/// Every open fails with `NotSupported`, so callers can tell a missing
/// platform backend apart from an absent device.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

impl HidBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn open_usb(&self, _filter: &UsbFilter) -> Result<HidDevice, HidError> {
        Err(HidError::not_supported("USB HID"))
    }

    fn open_bluetooth(&self, _filter: &BluetoothFilter) -> Result<HidDevice, HidError> {
        Err(HidError::not_supported("Bluetooth HID"))
    }
}
