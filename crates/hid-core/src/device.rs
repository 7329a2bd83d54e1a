//! Open device handle.

use std::fmt;

use tracing::{debug, instrument, warn};

use crate::backend::{HidConnection, ReportType};
use crate::descriptor::{ItemsDescriptor, parse_items};
use crate::error::HidError;
use crate::filter::{BluetoothAddress, BluetoothCandidate, UsbCandidate};

/// Transport a device was opened over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Usb,
    Bluetooth,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Usb => write!(f, "USB"),
            TransportKind::Bluetooth => write!(f, "Bluetooth"),
        }
    }
}

/// Metadata cached when a device is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub transport: TransportKind,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub address: Option<BluetoothAddress>,
    pub name: Option<String>,
}

impl DeviceInfo {
    pub fn usb(vendor_id: u16, product_id: u16) -> Self {
        Self {
            transport: TransportKind::Usb,
            vendor_id,
            product_id,
            manufacturer: None,
            product: None,
            serial_number: None,
            address: None,
            name: None,
        }
    }

    pub fn bluetooth(address: BluetoothAddress) -> Self {
        Self {
            transport: TransportKind::Bluetooth,
            vendor_id: 0,
            product_id: 0,
            manufacturer: None,
            product: None,
            serial_number: None,
            address: Some(address),
            name: None,
        }
    }
}

impl From<&UsbCandidate> for DeviceInfo {
    fn from(candidate: &UsbCandidate) -> Self {
        Self {
            manufacturer: candidate.manufacturer.clone(),
            product: candidate.product.clone(),
            serial_number: candidate.serial_number.clone(),
            ..Self::usb(candidate.vendor_id, candidate.product_id)
        }
    }
}

impl From<&BluetoothCandidate> for DeviceInfo {
    fn from(candidate: &BluetoothCandidate) -> Self {
        Self {
            vendor_id: candidate.vendor_id.unwrap_or(0),
            product_id: candidate.product_id.unwrap_or(0),
            name: candidate.name.clone(),
            ..Self::bluetooth(candidate.address)
        }
    }
}

/// An open HID device.
///
/// The handle owns its backend connection. The connection is released once,
/// either by [`close`](HidDevice::close) or when the handle is dropped.
/// I/O takes `&mut self`, so sharing a handle between threads needs a lock.
pub struct HidDevice {
    info: DeviceInfo,
    connection: Box<dyn HidConnection>,
    released: bool,
}

impl HidDevice {
    pub fn new(info: DeviceInfo, connection: Box<dyn HidConnection>) -> Self {
        Self {
            info,
            connection,
            released: false,
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn transport(&self) -> TransportKind {
        self.info.transport
    }

    pub fn vendor_id(&self) -> u16 {
        self.info.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.info.product_id
    }

    /// `VVVV:PPPP` for USB devices, the device address for Bluetooth.
    pub fn identifier(&self) -> String {
        match (self.info.transport, self.info.address) {
            (TransportKind::Bluetooth, Some(address)) => address.to_string(),
            _ => format!("{:04X}:{:04X}", self.info.vendor_id, self.info.product_id),
        }
    }

    /// Human-readable device name, when the device reported one.
    pub fn name(&self) -> Option<&str> {
        self.info
            .product
            .as_deref()
            .or(self.info.name.as_deref())
    }

    pub fn read_report(&mut self, max_len: usize) -> Result<Vec<u8>, HidError> {
        self.connection.read_report(max_len)
    }

    pub fn write_report(&mut self, data: &[u8]) -> Result<usize, HidError> {
        self.connection.write_report(data)
    }

    pub fn get_report(
        &mut self,
        report_type: ReportType,
        report_id: u8,
        max_len: usize,
    ) -> Result<Vec<u8>, HidError> {
        self.connection.get_report(report_type, report_id, max_len)
    }

    pub fn set_report(
        &mut self,
        report_type: ReportType,
        report_id: u8,
        data: &[u8],
    ) -> Result<(), HidError> {
        self.connection.set_report(report_type, report_id, data)
    }

    pub fn get_feature(&mut self, report_id: u8, max_len: usize) -> Result<Vec<u8>, HidError> {
        self.get_report(ReportType::Feature, report_id, max_len)
    }

    pub fn set_feature(&mut self, report_id: u8, data: &[u8]) -> Result<(), HidError> {
        self.set_report(ReportType::Feature, report_id, data)
    }

    pub fn report_descriptor(&mut self) -> Result<Vec<u8>, HidError> {
        self.connection.report_descriptor()
    }

    /// Fetch and parse the report descriptor. Every call reads it afresh.
    #[instrument(skip(self), fields(device = %self.identifier()))]
    pub fn items(&mut self) -> Result<ItemsDescriptor, HidError> {
        let bytes = self.connection.report_descriptor()?;
        debug!(len = bytes.len(), "Report descriptor read");
        Ok(parse_items(&bytes)?)
    }

    /// Release the connection.
    pub fn close(mut self) -> Result<(), HidError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), HidError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        debug!(device = %self.identifier(), "Closing device");
        self.connection.close()
    }
}

impl Drop for HidDevice {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(device = %self.identifier(), error = %e, "Failed to release device");
        }
    }
}

impl fmt::Debug for HidDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HidDevice")
            .field("info", &self.info)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
