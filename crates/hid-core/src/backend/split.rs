//! Backend combining one backend per transport.

use super::traits::HidBackend;
use crate::device::HidDevice;
use crate::error::HidError;
use crate::filter::{BluetoothCandidate, BluetoothFilter, UsbCandidate, UsbFilter};

/// Routes USB requests to one backend and Bluetooth requests to another.
pub struct SplitBackend {
    usb: Box<dyn HidBackend>,
    bluetooth: Box<dyn HidBackend>,
}

impl SplitBackend {
    pub fn new(usb: Box<dyn HidBackend>, bluetooth: Box<dyn HidBackend>) -> Self {
        Self { usb, bluetooth }
    }
}

impl HidBackend for SplitBackend {
    fn name(&self) -> &'static str {
        "split"
    }

    fn open_usb(&self, filter: &UsbFilter) -> Result<HidDevice, HidError> {
        self.usb.open_usb(filter)
    }

    fn open_bluetooth(&self, filter: &BluetoothFilter) -> Result<HidDevice, HidError> {
        self.bluetooth.open_bluetooth(filter)
    }

    fn list_usb(&self) -> Result<Vec<UsbCandidate>, HidError> {
        self.usb.list_usb()
    }

    fn list_bluetooth(&self) -> Result<Vec<BluetoothCandidate>, HidError> {
        self.bluetooth.list_bluetooth()
    }
}
