//! HID-Core: portable access to USB and Bluetooth HID devices.
//!
//! Upper layers open devices and read their report descriptors without
//! knowing which platform backend does the work.
//!
//! # Architecture
//!
//! - **Descriptor**: report descriptor item parser
//! - **Filter**: USB and Bluetooth device match criteria
//! - **Backend**: platform backends (nusb, hidapi, null, split, mock)
//! - **Registry**: process-wide backend selection
//! - **Device**: owned handle for an open device
//! - **Facade**: `open_usb`, `open_bluetooth`, `close`, `get_items`
//!
//! # Example
//!
//! ```no_run
//! use hid_core::{UsbFilter, close, get_items, open_usb};
//!
//! let mut device = open_usb(&UsbFilter::ids(0x0f4e, 0x0100)).expect("open failed");
//! for item in get_items(&mut device).expect("no descriptor").iter() {
//!     println!("{:5}  {}", item.offset, item);
//! }
//! close(Some(device)).expect("close failed");
//! ```

pub mod backend;
pub mod config;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod filter;
pub mod hid;
pub mod registry;

// Re-exports for convenience
pub use backend::{BackendKind, HidBackend, HidConnection, NullBackend, ReportType, SplitBackend};
#[cfg(feature = "hidapi")]
pub use backend::HidapiBackend;
#[cfg(feature = "nusb")]
pub use backend::NusbBackend;
pub use config::HidConfig;
pub use descriptor::{
    ItemError, ItemTag, ItemsDescriptor, ParseError, ReportItem, ReportSize, parse_items,
};
pub use device::{DeviceInfo, HidDevice, TransportKind};
pub use error::{ErrorKind, HidError};
pub use filter::{
    BluetoothAddress, BluetoothCandidate, BluetoothFilter, HID_SERVICE_UUID, UsbCandidate,
    UsbFilter,
};
pub use hid::{close, get_items, open_bluetooth, open_usb};
pub use registry::{active_backend, install};
