//! Backend abstraction.
//!
//! A `HidBackend` knows how to find and open devices on one platform or
//! transport. Each open device is driven through a `HidConnection`, which
//! the backend owns the details of.

use crate::device::HidDevice;
use crate::error::HidError;
use crate::filter::{BluetoothCandidate, BluetoothFilter, UsbCandidate, UsbFilter};

/// HID report types, as used in GET_REPORT/SET_REPORT requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportType {
    Input = 1,
    Output = 2,
    Feature = 3,
}

/// Split an output report into its report ID and the bytes to send.
///
/// Output reports are passed around with the report ID as the first byte.
/// Devices that do not use report IDs take a leading `0`, which is not sent.
/// Reports with a non-zero ID are sent whole, ID included.
pub fn output_report_parts(data: &[u8]) -> Result<(u8, &[u8]), HidError> {
    match data {
        [] => Err(HidError::transport("Empty output report")),
        [0, payload @ ..] => Ok((0, payload)),
        [id, ..] => Ok((*id, data)),
    }
}

/// Platform backend interface.
///
/// Implementations:
/// - `NullBackend`: platforms without HID support
/// - `NusbBackend`: native USB
/// - `HidapiBackend`: Bluetooth through the platform HID stack
/// - `SplitBackend`: one backend per transport
/// - `MockBackend`: in-memory devices for testing
pub trait HidBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Open the first USB HID interface accepted by `filter`.
    fn open_usb(&self, filter: &UsbFilter) -> Result<HidDevice, HidError>;

    /// Open the first Bluetooth HID device accepted by `filter`.
    fn open_bluetooth(&self, filter: &BluetoothFilter) -> Result<HidDevice, HidError>;

    /// Enumerate USB HID interfaces.
    fn list_usb(&self) -> Result<Vec<UsbCandidate>, HidError> {
        Err(HidError::not_supported("USB enumeration"))
    }

    /// Enumerate known Bluetooth HID devices.
    fn list_bluetooth(&self) -> Result<Vec<BluetoothCandidate>, HidError> {
        Err(HidError::not_supported("Bluetooth enumeration"))
    }
}

/// Connection state of one open device.
///
/// Only [`close`](HidConnection::close) has a working default; everything
/// else reports `NotSupported` unless the backend provides it.
pub trait HidConnection: Send {
    /// Read one input report from the interrupt IN pipe.
    fn read_report(&mut self, _max_len: usize) -> Result<Vec<u8>, HidError> {
        Err(HidError::not_supported("read_report"))
    }

    /// Send an output report. The first byte is the report ID, `0` for
    /// devices without IDs (see [`output_report_parts`]).
    fn write_report(&mut self, _data: &[u8]) -> Result<usize, HidError> {
        Err(HidError::not_supported("write_report"))
    }

    /// Fetch a report over the control pipe. Reports with a non-zero ID
    /// come back with the ID as their first byte.
    fn get_report(
        &mut self,
        _report_type: ReportType,
        _report_id: u8,
        _max_len: usize,
    ) -> Result<Vec<u8>, HidError> {
        Err(HidError::not_supported("get_report"))
    }

    /// Send a report over the control pipe. `data` is the report as it goes
    /// on the wire, starting with `report_id` when that is non-zero.
    fn set_report(
        &mut self,
        _report_type: ReportType,
        _report_id: u8,
        _data: &[u8],
    ) -> Result<(), HidError> {
        Err(HidError::not_supported("set_report"))
    }

    /// Fetch the raw report descriptor.
    fn report_descriptor(&mut self) -> Result<Vec<u8>, HidError> {
        Err(HidError::not_supported("report_descriptor"))
    }

    /// Release backend resources. Called at most once.
    fn close(&mut self) -> Result<(), HidError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_output_report_parts() {
        // No report IDs: the leading zero is dropped
        assert_eq!(output_report_parts(&[0, 0x01, 0x02]).unwrap(), (0, &[0x01, 0x02][..]));
        // With an ID the report goes out whole
        assert_eq!(
            output_report_parts(&[0x05, 0x01]).unwrap(),
            (0x05, &[0x05, 0x01][..])
        );
        assert_eq!(output_report_parts(&[0]).unwrap(), (0, &[][..]));
        assert_eq!(
            output_report_parts(&[]).unwrap_err().kind(),
            ErrorKind::Transport
        );
    }

    struct Bare;

    impl HidConnection for Bare {}

    #[test]
    fn test_connection_defaults() {
        let mut conn = Bare;
        assert_eq!(conn.read_report(8).unwrap_err().kind(), ErrorKind::NotSupported);
        assert_eq!(conn.write_report(&[0, 1]).unwrap_err().kind(), ErrorKind::NotSupported);
        assert_eq!(
            conn.get_report(ReportType::Feature, 1, 8).unwrap_err().kind(),
            ErrorKind::NotSupported
        );
        assert_eq!(
            conn.set_report(ReportType::Output, 0, &[1]).unwrap_err().kind(),
            ErrorKind::NotSupported
        );
        assert_eq!(conn.report_descriptor().unwrap_err().kind(), ErrorKind::NotSupported);
        assert!(conn.close().is_ok());
    }
}
