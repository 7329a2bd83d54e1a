//! Native USB backend built on nusb.
//!
//! Uses the blocking `.wait()` form of the nusb 0.2 API. Bluetooth is not
//! handled here; combine with another backend through `SplitBackend`.

use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use nusb::descriptors::TransferType;
use nusb::transfer::{
    Buffer, ControlIn, ControlOut, ControlType, Direction, In, Interrupt, Out, Recipient,
    TransferError,
};
use nusb::{Endpoint, Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use super::traits::{HidBackend, HidConnection, ReportType, output_report_parts};
use crate::device::{DeviceInfo, HidDevice};
use crate::error::HidError;
use crate::filter::{BluetoothFilter, USB_CLASS_HID, UsbCandidate, UsbFilter};

/// Standard GET_DESCRIPTOR request.
const REQUEST_GET_DESCRIPTOR: u8 = 0x06;
/// HID class GET_REPORT request.
const REQUEST_GET_REPORT: u8 = 0x01;
/// HID class SET_REPORT request.
const REQUEST_SET_REPORT: u8 = 0x09;
/// Class descriptor that follows a HID interface descriptor.
const DESCRIPTOR_TYPE_HID: u8 = 0x21;
/// Descriptor type of a HID report descriptor.
const DESCRIPTOR_TYPE_REPORT: u8 = 0x22;
/// Offset of `bNumDescriptors` in the HID class descriptor.
const HID_NUM_DESCRIPTORS_OFFSET: usize = 5;
/// Each entry after it is `bDescriptorType` and `wDescriptorLength`.
const HID_DESCRIPTOR_ENTRY_LEN: usize = 3;
const CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);
const INTERRUPT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Length of the report descriptor announced by a HID class descriptor.
fn report_descriptor_length(hid_descriptor: &[u8]) -> Option<u16> {
    let count = *hid_descriptor.get(HID_NUM_DESCRIPTORS_OFFSET)? as usize;
    hid_descriptor
        .get(HID_NUM_DESCRIPTORS_OFFSET + 1..)?
        .chunks_exact(HID_DESCRIPTOR_ENTRY_LEN)
        .take(count)
        .find(|entry| entry[0] == DESCRIPTOR_TYPE_REPORT)
        .map(|entry| LittleEndian::read_u16(&entry[1..]))
}

/// Check a finished interrupt IN transfer. A cancelled transfer is one that
/// ran out its timeout.
fn input_report(
    status: Result<(), TransferError>,
    report: Vec<u8>,
    max_len: usize,
) -> Result<Vec<u8>, HidError> {
    match status {
        Err(TransferError::Cancelled) => {
            return Err(HidError::transport(format!(
                "No input report within {} ms",
                INTERRUPT_TIMEOUT.as_millis()
            )));
        }
        other => other?,
    }
    if report.len() > max_len {
        return Err(HidError::transport(format!(
            "Input report of {} bytes does not fit in {} bytes",
            report.len(),
            max_len
        )));
    }
    Ok(report)
}

/// USB-only native backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NusbBackend;

impl NusbBackend {
    pub fn new() -> Self {
        Self
    }

    fn enumerate(&self) -> Result<Vec<(nusb::DeviceInfo, UsbCandidate)>, HidError> {
        let devices = list_devices().wait()?;

        let mut found = Vec::new();
        for device_info in devices {
            for iface in device_info.interfaces() {
                if iface.class() != USB_CLASS_HID {
                    continue;
                }
                let candidate = UsbCandidate {
                    vendor_id: device_info.vendor_id(),
                    product_id: device_info.product_id(),
                    interface_number: iface.interface_number(),
                    interface_class: iface.class(),
                    interface_subclass: iface.subclass(),
                    interface_protocol: iface.protocol(),
                    manufacturer: device_info.manufacturer_string().map(str::to_string),
                    product: device_info.product_string().map(str::to_string),
                    serial_number: device_info.serial_number().map(str::to_string),
                };
                found.push((device_info.clone(), candidate));
            }
        }
        Ok(found)
    }
}

impl HidBackend for NusbBackend {
    fn name(&self) -> &'static str {
        "nusb"
    }

    #[instrument(level = "info", skip(self))]
    fn open_usb(&self, filter: &UsbFilter) -> Result<HidDevice, HidError> {
        let (device_info, candidate) = self
            .enumerate()?
            .into_iter()
            .find(|(_, candidate)| filter.matches(candidate))
            .ok_or_else(|| {
                debug!("No matching HID interface");
                HidError::NotFound
            })?;

        let connection = NusbConnection::open(&device_info, candidate.interface_number)?;
        Ok(HidDevice::new(
            DeviceInfo::from(&candidate),
            Box::new(connection),
        ))
    }

    fn open_bluetooth(&self, _filter: &BluetoothFilter) -> Result<HidDevice, HidError> {
        Err(HidError::not_supported("Bluetooth HID"))
    }

    fn list_usb(&self) -> Result<Vec<UsbCandidate>, HidError> {
        Ok(self
            .enumerate()?
            .into_iter()
            .map(|(_, candidate)| candidate)
            .collect())
    }
}

/// A claimed HID interface.
struct NusbConnection {
    interface: Interface,
    interface_number: u8,
    in_endpoint: Option<Endpoint<Interrupt, In>>,
    out_endpoint: Option<Endpoint<Interrupt, Out>>,
    descriptor_len: Option<u16>,
}

impl NusbConnection {
    fn open(device_info: &nusb::DeviceInfo, interface_number: u8) -> Result<Self, HidError> {
        info!(
            vendor_id = %format!("{:04X}", device_info.vendor_id()),
            product_id = %format!("{:04X}", device_info.product_id()),
            interface = interface_number,
            "Found HID interface"
        );

        let device = device_info.open().wait()?;
        let interface = device.claim_interface(interface_number).wait()?;

        // Interrupt endpoints and the HID class descriptor of the active alt setting
        let mut in_address = None;
        let mut out_address = None;
        let mut descriptor_len = None;
        if let Some(alt) = interface.descriptor() {
            for ep in alt.endpoints() {
                if ep.transfer_type() != TransferType::Interrupt {
                    continue;
                }
                if ep.direction() == Direction::In {
                    in_address.get_or_insert(ep.address());
                } else {
                    out_address.get_or_insert(ep.address());
                }
            }
            descriptor_len = alt
                .descriptors()
                .find(|d| d.descriptor_type() == DESCRIPTOR_TYPE_HID)
                .and_then(|d| report_descriptor_length(&d));
        }

        let in_endpoint = in_address
            .map(|address| interface.endpoint::<Interrupt, In>(address))
            .transpose()?;
        let out_endpoint = out_address
            .map(|address| interface.endpoint::<Interrupt, Out>(address))
            .transpose()?;

        info!(
            in_ep = ?in_address.map(|a| format!("0x{:02X}", a)),
            out_ep = ?out_address.map(|a| format!("0x{:02X}", a)),
            descriptor_len = ?descriptor_len,
            "Device opened successfully"
        );

        Ok(Self {
            interface,
            interface_number,
            in_endpoint,
            out_endpoint,
            descriptor_len,
        })
    }

    fn report_value(report_type: ReportType, report_id: u8) -> u16 {
        ((report_type as u16) << 8) | u16::from(report_id)
    }
}

impl HidConnection for NusbConnection {
    /// One interrupt transfer of one packet carries one report.
    #[instrument(skip(self), fields(max_len))]
    fn read_report(&mut self, max_len: usize) -> Result<Vec<u8>, HidError> {
        let ep = self
            .in_endpoint
            .as_mut()
            .ok_or(HidError::not_supported("interrupt IN endpoint"))?;

        let packet_size = ep.max_packet_size();
        let completion = ep.transfer_blocking(Buffer::new(packet_size), INTERRUPT_TIMEOUT);
        let status = completion.status;
        let report = input_report(status, completion.buffer.into_vec(), max_len)?;
        debug!(bytes_read = report.len(), "Read complete");
        Ok(report)
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write_report(&mut self, data: &[u8]) -> Result<usize, HidError> {
        let (report_id, wire) = output_report_parts(data)?;

        let Some(ep) = self.out_endpoint.as_mut() else {
            // Devices without an OUT pipe take output reports on the control pipe
            self.set_report(ReportType::Output, report_id, wire)?;
            return Ok(data.len());
        };

        let completion = ep.transfer_blocking(Buffer::from(wire.to_vec()), INTERRUPT_TIMEOUT);
        completion.status?;

        debug!(report_id, bytes_written = wire.len(), "Write complete");
        Ok(data.len())
    }

    fn get_report(
        &mut self,
        report_type: ReportType,
        report_id: u8,
        max_len: usize,
    ) -> Result<Vec<u8>, HidError> {
        let report = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: REQUEST_GET_REPORT,
                    value: Self::report_value(report_type, report_id),
                    index: u16::from(self.interface_number),
                    length: max_len.min(u16::MAX as usize) as u16,
                },
                CONTROL_TIMEOUT,
            )
            .wait()?;
        Ok(report)
    }

    fn set_report(
        &mut self,
        report_type: ReportType,
        report_id: u8,
        data: &[u8],
    ) -> Result<(), HidError> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: REQUEST_SET_REPORT,
                    value: Self::report_value(report_type, report_id),
                    index: u16::from(self.interface_number),
                    data,
                },
                CONTROL_TIMEOUT,
            )
            .wait()?;
        Ok(())
    }

    #[instrument(skip(self), fields(interface = self.interface_number))]
    fn report_descriptor(&mut self) -> Result<Vec<u8>, HidError> {
        let expected = self.descriptor_len.ok_or_else(|| {
            HidError::transport("Interface has no HID class descriptor")
        })?;

        let bytes = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Standard,
                    recipient: Recipient::Interface,
                    request: REQUEST_GET_DESCRIPTOR,
                    value: u16::from(DESCRIPTOR_TYPE_REPORT) << 8,
                    index: u16::from(self.interface_number),
                    length: expected,
                },
                CONTROL_TIMEOUT,
            )
            .wait()?;

        if bytes.len() != usize::from(expected) {
            return Err(HidError::transport(format!(
                "Report descriptor read returned {} of {} bytes",
                bytes.len(),
                expected
            )));
        }
        debug!(len = bytes.len(), "Report descriptor fetched");
        Ok(bytes)
    }

    fn close(&mut self) -> Result<(), HidError> {
        // Endpoints and the interface are released when the connection is dropped
        debug!(interface = self.interface_number, "Releasing interface");
        Ok(())
    }
}
