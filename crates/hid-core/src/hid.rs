//! Public entry points.
//!
//! The plain functions route to the process-wide backend from
//! [`registry`](crate::registry). The `_with` variants take the backend
//! explicitly. Error kinds from the backend are passed through unchanged.

use tracing::{debug, info, instrument, warn};

use crate::backend::HidBackend;
use crate::descriptor::ItemsDescriptor;
use crate::device::HidDevice;
use crate::error::HidError;
use crate::filter::{BluetoothFilter, UsbFilter};
use crate::registry::active_backend;

/// Open the first USB HID device accepted by `filter`.
pub fn open_usb(filter: &UsbFilter) -> Result<HidDevice, HidError> {
    open_usb_with(active_backend(), filter)
}

/// Open the first Bluetooth HID device accepted by `filter`.
pub fn open_bluetooth(filter: &BluetoothFilter) -> Result<HidDevice, HidError> {
    open_bluetooth_with(active_backend(), filter)
}

#[instrument(skip(backend), fields(backend_name = backend.name()))]
pub fn open_usb_with(backend: &dyn HidBackend, filter: &UsbFilter) -> Result<HidDevice, HidError> {
    let device = backend
        .open_usb(filter)
        .inspect_err(|e| debug!(error = %e, "USB open failed"))?;
    info!(device = %device.identifier(), "USB device opened");
    Ok(device)
}

#[instrument(skip(backend), fields(backend_name = backend.name()))]
pub fn open_bluetooth_with(
    backend: &dyn HidBackend,
    filter: &BluetoothFilter,
) -> Result<HidDevice, HidError> {
    let device = backend
        .open_bluetooth(filter)
        .inspect_err(|e| debug!(error = %e, "Bluetooth open failed"))?;
    info!(device = %device.identifier(), "Bluetooth device opened");
    Ok(device)
}

/// Close a device. `None` is accepted and does nothing.
///
/// A release failure is returned for logging; the handle is gone either way.
pub fn close(device: Option<HidDevice>) -> Result<(), HidError> {
    let Some(device) = device else {
        return Ok(());
    };
    let identifier = device.identifier();
    device
        .close()
        .inspect_err(|e| warn!(device = %identifier, error = %e, "Close failed"))
}

/// Fetch and parse the device's report descriptor.
pub fn get_items(device: &mut HidDevice) -> Result<ItemsDescriptor, HidError> {
    device.items()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockAccess, MockBackend, NullBackend};
    use crate::descriptor::ItemTag;
    use crate::descriptor::fixtures::BOOT_KEYBOARD;
    use crate::error::ErrorKind;
    use crate::filter::UsbCandidate;

    fn backend_with_keyboard() -> MockBackend {
        let mut backend = MockBackend::new();
        backend.add_usb(
            UsbCandidate {
                vendor_id: 0x05AC,
                product_id: 0x0220,
                ..Default::default()
            },
            Some(BOOT_KEYBOARD.to_vec()),
        );
        backend
    }

    #[test]
    fn test_not_supported_differs_from_not_found() {
        let filter = UsbFilter {
            vendor_id: Some(0x1234),
            product_id: None,
            ..Default::default()
        };

        let unsupported = open_usb_with(&NullBackend, &filter).unwrap_err();
        let missing = open_usb_with(&backend_with_keyboard(), &filter).unwrap_err();

        assert_eq!(unsupported.kind(), ErrorKind::NotSupported);
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_open_and_get_items() {
        let backend = backend_with_keyboard();
        let mut device = open_usb_with(&backend, &UsbFilter::ids(0x05AC, 0x0220)).unwrap();

        let items = get_items(&mut device).unwrap();
        assert_eq!(items.items()[0].tag, ItemTag::UsagePage);
        assert_eq!(items.items().last().unwrap().tag, ItemTag::EndCollection);
        assert!(items.nesting().is_balanced());

        close(Some(device)).unwrap();
    }

    #[test]
    fn test_get_items_without_descriptor_support() {
        let mut backend = MockBackend::new();
        let probe = backend.add_usb(UsbCandidate::default(), None);
        let mut device = open_usb_with(&backend, &UsbFilter::new()).unwrap();

        let err = get_items(&mut device).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert_eq!(probe.descriptor_reads(), 0);
    }

    #[test]
    fn test_close_nothing() {
        close(None).unwrap();
        // A failed open leaves nothing to close
        let failed = open_bluetooth_with(&NullBackend, &BluetoothFilter::new()).ok();
        close(failed).unwrap();
    }

    #[test]
    fn test_busy_passes_through() {
        let mut backend = MockBackend::new();
        let probe = backend.add_usb(UsbCandidate::default(), None);
        probe.set_access(MockAccess::Busy);

        let err = open_usb_with(&backend, &UsbFilter::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(err.is_retryable());
    }
}
