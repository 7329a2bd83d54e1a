//! Bluetooth backend on hidapi.
//!
//! The platform HID stack exposes paired Bluetooth HID devices the same way
//! as wired ones (hidraw on Linux). Only devices on the Bluetooth bus are
//! opened here; USB stays with `NusbBackend`.

use std::ffi::CString;

use hidapi::{BusType, HidApi};
use tracing::{debug, info, instrument};

use super::traits::{HidBackend, HidConnection, ReportType, output_report_parts};
use crate::device::{DeviceInfo, HidDevice};
use crate::error::HidError;
use crate::filter::{
    BluetoothAddress, BluetoothCandidate, BluetoothFilter, HID_SERVICE_UUID, UsbFilter,
};

const READ_TIMEOUT_MS: i32 = 1000;
/// Kernel and hidapi limit for report descriptors.
const MAX_REPORT_DESCRIPTOR_LEN: usize = 4096;

impl From<hidapi::HidError> for HidError {
    fn from(e: hidapi::HidError) -> Self {
        HidError::from_message(e.to_string())
    }
}

/// Build a candidate from what the HID stack reports for a Bluetooth device.
/// The serial number of a Bluetooth HID device is its address.
fn bluetooth_candidate(
    serial: Option<&str>,
    name: Option<&str>,
    vendor_id: u16,
    product_id: u16,
) -> Option<BluetoothCandidate> {
    let address: BluetoothAddress = serial?.parse().ok()?;
    Some(BluetoothCandidate {
        address,
        name: name.filter(|n| !n.is_empty()).map(str::to_string),
        services: vec![HID_SERVICE_UUID],
        vendor_id: Some(vendor_id),
        product_id: Some(product_id),
    })
}

/// Bluetooth-only backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct HidapiBackend;

impl HidapiBackend {
    pub fn new() -> Self {
        Self
    }

    fn enumerate(api: &HidApi) -> Vec<(CString, BluetoothCandidate)> {
        let mut found: Vec<(CString, BluetoothCandidate)> = Vec::new();
        for info in api.device_list() {
            if !matches!(info.bus_type(), BusType::Bluetooth) {
                continue;
            }
            let Some(candidate) = bluetooth_candidate(
                info.serial_number(),
                info.product_string(),
                info.vendor_id(),
                info.product_id(),
            ) else {
                debug!(path = ?info.path(), "Bluetooth HID device without address");
                continue;
            };
            // Some platforms list one entry per top-level collection
            if found.iter().any(|(_, c)| c.address == candidate.address) {
                continue;
            }
            found.push((info.path().to_owned(), candidate));
        }
        found
    }
}

impl HidBackend for HidapiBackend {
    fn name(&self) -> &'static str {
        "hidapi"
    }

    fn open_usb(&self, _filter: &UsbFilter) -> Result<HidDevice, HidError> {
        Err(HidError::not_supported("USB HID"))
    }

    #[instrument(level = "info", skip(self))]
    fn open_bluetooth(&self, filter: &BluetoothFilter) -> Result<HidDevice, HidError> {
        let api = HidApi::new()?;
        let (path, candidate) = Self::enumerate(&api)
            .into_iter()
            .find(|(_, candidate)| filter.matches(candidate))
            .ok_or_else(|| {
                debug!("No matching Bluetooth HID device");
                HidError::NotFound
            })?;

        let device = api.open_path(&path)?;
        info!(address = %candidate.address, name = ?candidate.name, "Bluetooth device opened");
        Ok(HidDevice::new(
            DeviceInfo::from(&candidate),
            Box::new(HidapiConnection { device }),
        ))
    }

    fn list_bluetooth(&self) -> Result<Vec<BluetoothCandidate>, HidError> {
        let api = HidApi::new()?;
        Ok(Self::enumerate(&api)
            .into_iter()
            .map(|(_, candidate)| candidate)
            .collect())
    }
}

struct HidapiConnection {
    device: hidapi::HidDevice,
}

impl HidConnection for HidapiConnection {
    fn read_report(&mut self, max_len: usize) -> Result<Vec<u8>, HidError> {
        let mut buf = vec![0u8; max_len];
        let n = self.device.read_timeout(&mut buf, READ_TIMEOUT_MS)?;
        if n == 0 {
            return Err(HidError::transport(format!(
                "No input report within {READ_TIMEOUT_MS} ms"
            )));
        }
        buf.truncate(n);
        Ok(buf)
    }

    fn write_report(&mut self, data: &[u8]) -> Result<usize, HidError> {
        // hidapi takes the same leading report ID byte
        output_report_parts(data)?;
        Ok(self.device.write(data)?)
    }

    fn get_report(
        &mut self,
        report_type: ReportType,
        report_id: u8,
        max_len: usize,
    ) -> Result<Vec<u8>, HidError> {
        // hidapi always puts the report ID in front, even when it is zero
        let mut buf = vec![0u8; max_len + 1];
        buf[0] = report_id;
        let n = match report_type {
            ReportType::Feature => self.device.get_feature_report(&mut buf)?,
            ReportType::Input => self.device.get_input_report(&mut buf)?,
            ReportType::Output => return Err(HidError::not_supported("GET_REPORT(Output)")),
        };
        buf.truncate(n);
        if report_id == 0 && !buf.is_empty() {
            buf.remove(0);
        }
        Ok(buf)
    }

    fn set_report(
        &mut self,
        report_type: ReportType,
        report_id: u8,
        data: &[u8],
    ) -> Result<(), HidError> {
        let report = if report_id == 0 {
            [&[0u8][..], data].concat()
        } else {
            data.to_vec()
        };
        match report_type {
            ReportType::Feature => Ok(self.device.send_feature_report(&report)?),
            ReportType::Output => {
                self.device.write(&report)?;
                Ok(())
            }
            ReportType::Input => Err(HidError::not_supported("SET_REPORT(Input)")),
        }
    }

    fn report_descriptor(&mut self) -> Result<Vec<u8>, HidError> {
        let mut buf = vec![0u8; MAX_REPORT_DESCRIPTOR_LEN];
        let n = self.device.get_report_descriptor(&mut buf)?;
        buf.truncate(n);
        debug!(len = n, "Report descriptor fetched");
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bluetooth_candidate_from_serial() {
        let candidate =
            bluetooth_candidate(Some("e4:17:d8:0a:1b:2c"), Some("Pro Controller"), 0x057E, 0x2009)
                .unwrap();
        assert_eq!(candidate.address.to_string(), "E4:17:D8:0A:1B:2C");
        assert_eq!(candidate.name.as_deref(), Some("Pro Controller"));
        assert_eq!(candidate.vendor_id, Some(0x057E));
        assert!(BluetoothFilter::new().matches(&candidate));
        assert!(
            BluetoothFilter {
                service_uuid: Some(HID_SERVICE_UUID),
                ..Default::default()
            }
            .matches(&candidate)
        );
    }

    #[test]
    fn test_bluetooth_candidate_needs_address() {
        assert!(bluetooth_candidate(None, Some("Keyboard"), 1, 2).is_none());
        assert!(bluetooth_candidate(Some("not-an-address"), None, 1, 2).is_none());

        let unnamed = bluetooth_candidate(Some("00:1A:7D:DA:71:13"), Some(""), 1, 2).unwrap();
        assert_eq!(unnamed.name, None);
    }
}
