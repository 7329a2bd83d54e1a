//! In-memory backend for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::traits::{HidBackend, HidConnection, ReportType, output_report_parts};
use crate::device::{DeviceInfo, HidDevice};
use crate::error::HidError;
use crate::filter::{BluetoothCandidate, BluetoothFilter, UsbCandidate, UsbFilter};

/// How a mock device responds to an open attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MockAccess {
    #[default]
    Open,
    Busy,
    Denied,
}

#[derive(Debug, Default)]
struct MockState {
    descriptor: Option<Vec<u8>>,
    access: MockAccess,
    /// Queued input reports.
    inputs: VecDeque<Vec<u8>>,
    /// Captured output reports.
    writes: Vec<Vec<u8>>,
    reports: HashMap<(ReportType, u8), Vec<u8>>,
    descriptor_reads: usize,
    opens: usize,
    closes: usize,
    fail_close: bool,
}

/// Shared view of one mock device, for scripting and inspection.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_access(&self, access: MockAccess) {
        self.lock().access = access;
    }

    /// Queue an input report to be returned on the next read.
    pub fn queue_input(&self, report: &[u8]) {
        self.lock().inputs.push_back(report.to_vec());
    }

    pub fn set_feature_report(&self, report_id: u8, data: &[u8]) {
        self.lock()
            .reports
            .insert((ReportType::Feature, report_id), data.to_vec());
    }

    /// Make `close` fail, to exercise release error paths.
    pub fn fail_close(&self, fail: bool) {
        self.lock().fail_close = fail;
    }

    /// All captured output reports.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    pub fn descriptor_reads(&self) -> usize {
        self.lock().descriptor_reads
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }
}

struct MockDevice<C> {
    candidate: C,
    probe: MockProbe,
}

/// Backend serving a fixed set of in-memory devices.
#[derive(Default)]
pub struct MockBackend {
    usb: Vec<MockDevice<UsbCandidate>>,
    bluetooth: Vec<MockDevice<BluetoothCandidate>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a USB device. `descriptor` of `None` models a device whose report
    /// descriptor cannot be read.
    pub fn add_usb(&mut self, candidate: UsbCandidate, descriptor: Option<Vec<u8>>) -> MockProbe {
        let probe = MockProbe::default();
        probe.lock().descriptor = descriptor;
        self.usb.push(MockDevice {
            candidate,
            probe: probe.clone(),
        });
        probe
    }

    pub fn add_bluetooth(
        &mut self,
        candidate: BluetoothCandidate,
        descriptor: Option<Vec<u8>>,
    ) -> MockProbe {
        let probe = MockProbe::default();
        probe.lock().descriptor = descriptor;
        self.bluetooth.push(MockDevice {
            candidate,
            probe: probe.clone(),
        });
        probe
    }
}

fn connect(info: DeviceInfo, probe: &MockProbe) -> Result<HidDevice, HidError> {
    let mut state = probe.lock();
    match state.access {
        MockAccess::Busy => return Err(HidError::Busy("claimed by another process".into())),
        MockAccess::Denied => return Err(HidError::PermissionDenied("no access".into())),
        MockAccess::Open => {}
    }
    state.opens += 1;
    drop(state);

    Ok(HidDevice::new(
        info,
        Box::new(MockConnection {
            probe: probe.clone(),
        }),
    ))
}

impl HidBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open_usb(&self, filter: &UsbFilter) -> Result<HidDevice, HidError> {
        let device = self
            .usb
            .iter()
            .find(|d| filter.matches(&d.candidate))
            .ok_or(HidError::NotFound)?;
        connect(DeviceInfo::from(&device.candidate), &device.probe)
    }

    fn open_bluetooth(&self, filter: &BluetoothFilter) -> Result<HidDevice, HidError> {
        let device = self
            .bluetooth
            .iter()
            .find(|d| filter.matches(&d.candidate))
            .ok_or(HidError::NotFound)?;
        connect(DeviceInfo::from(&device.candidate), &device.probe)
    }

    fn list_usb(&self) -> Result<Vec<UsbCandidate>, HidError> {
        Ok(self.usb.iter().map(|d| d.candidate.clone()).collect())
    }

    fn list_bluetooth(&self) -> Result<Vec<BluetoothCandidate>, HidError> {
        Ok(self.bluetooth.iter().map(|d| d.candidate.clone()).collect())
    }
}

struct MockConnection {
    probe: MockProbe,
}

impl HidConnection for MockConnection {
    fn read_report(&mut self, max_len: usize) -> Result<Vec<u8>, HidError> {
        let mut report = self
            .probe
            .lock()
            .inputs
            .pop_front()
            .ok_or_else(|| HidError::transport("Timeout waiting for input report"))?;
        report.truncate(max_len);
        Ok(report)
    }

    fn write_report(&mut self, data: &[u8]) -> Result<usize, HidError> {
        output_report_parts(data)?;
        self.probe.lock().writes.push(data.to_vec());
        Ok(data.len())
    }

    fn get_report(
        &mut self,
        report_type: ReportType,
        report_id: u8,
        max_len: usize,
    ) -> Result<Vec<u8>, HidError> {
        let mut report = self
            .probe
            .lock()
            .reports
            .get(&(report_type, report_id))
            .cloned()
            .ok_or_else(|| HidError::transport(format!("No report {report_id}")))?;
        report.truncate(max_len);
        Ok(report)
    }

    fn set_report(
        &mut self,
        report_type: ReportType,
        report_id: u8,
        data: &[u8],
    ) -> Result<(), HidError> {
        self.probe
            .lock()
            .reports
            .insert((report_type, report_id), data.to_vec());
        Ok(())
    }

    fn report_descriptor(&mut self) -> Result<Vec<u8>, HidError> {
        let mut state = self.probe.lock();
        let descriptor = state
            .descriptor
            .clone()
            .ok_or(HidError::not_supported("report_descriptor"))?;
        state.descriptor_reads += 1;
        Ok(descriptor)
    }

    fn close(&mut self) -> Result<(), HidError> {
        let mut state = self.probe.lock();
        state.closes += 1;
        if state.fail_close {
            return Err(HidError::transport("release failed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::filter::BluetoothAddress;

    fn pad() -> UsbCandidate {
        UsbCandidate {
            vendor_id: 0x0F4E,
            product_id: 0x0100,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_match_is_not_found() {
        let mut backend = MockBackend::new();
        backend.add_usb(pad(), None);

        let err = backend.open_usb(&UsbFilter::ids(0x1234, 0x0001)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = backend.open_bluetooth(&BluetoothFilter::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_access_errors() {
        let mut backend = MockBackend::new();
        let probe = backend.add_usb(pad(), None);

        probe.set_access(MockAccess::Busy);
        let err = backend.open_usb(&UsbFilter::new()).unwrap_err();
        assert!(err.is_retryable());

        probe.set_access(MockAccess::Denied);
        let err = backend.open_usb(&UsbFilter::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(probe.opens(), 0);
    }

    #[test]
    fn test_first_match_wins() {
        let mut backend = MockBackend::new();
        let first = backend.add_usb(pad(), None);
        let second = backend.add_usb(pad(), None);

        let _device = backend.open_usb(&UsbFilter::new()).unwrap();
        assert_eq!(first.opens(), 1);
        assert_eq!(second.opens(), 0);
    }

    #[test]
    fn test_bluetooth_device() {
        let mut backend = MockBackend::new();
        let address = BluetoothAddress::new([0, 1, 2, 3, 4, 5]);
        backend.add_bluetooth(
            BluetoothCandidate {
                address,
                name: Some("Refreshabraille".into()),
                services: Vec::new(),
                vendor_id: Some(0x0810),
                product_id: None,
            },
            None,
        );

        let device = backend.open_bluetooth(&BluetoothFilter::address(address)).unwrap();
        assert_eq!(device.identifier(), "00:01:02:03:04:05");
        assert_eq!(device.vendor_id(), 0x0810);
        assert_eq!(device.name(), Some("Refreshabraille"));
        assert_eq!(backend.list_bluetooth().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_input_queue_times_out() {
        let mut backend = MockBackend::new();
        backend.add_usb(pad(), None);
        let mut device = backend.open_usb(&UsbFilter::new()).unwrap();
        assert!(device.read_report(64).is_err());
    }
}
