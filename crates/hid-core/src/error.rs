//! Error types shared by backends and the facade.

use thiserror::Error;

use crate::descriptor::ParseError;

#[derive(Error, Debug)]
pub enum HidError {
    #[error("{operation} is not supported by this backend")]
    NotSupported { operation: &'static str },

    #[error("No matching HID device found")]
    NotFound,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device busy: {0}")]
    Busy(String),

    #[error("Malformed report descriptor: {0}")]
    Descriptor(#[from] ParseError),

    #[error("Transport error: {message}")]
    Transport { code: Option<i32>, message: String },

    #[error("HID backend already selected")]
    AlreadyInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat error classification for callers that branch on the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotSupported,
    NotFound,
    PermissionDenied,
    Busy,
    MalformedDescriptor,
    Transport,
    AlreadyInitialized,
}

impl HidError {
    pub fn not_supported(operation: &'static str) -> Self {
        HidError::NotSupported { operation }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        HidError::Transport {
            code: None,
            message: message.into(),
        }
    }

    /// Map a USB stack failure by its category, keeping the OS error code.
    #[cfg(feature = "nusb")]
    pub(crate) fn from_usb(kind: nusb::ErrorKind, os_error: Option<u32>, message: String) -> Self {
        match kind {
            nusb::ErrorKind::Busy => HidError::Busy(message),
            nusb::ErrorKind::PermissionDenied => HidError::PermissionDenied(message),
            nusb::ErrorKind::NotFound => HidError::NotFound,
            nusb::ErrorKind::Unsupported => HidError::not_supported("USB request"),
            _ => HidError::Transport {
                code: os_error.map(|code| code as i32),
                message,
            },
        }
    }

    /// Classify a backend failure message. Stacks without typed errors
    /// report access problems only through their error text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("permission denied")
            || lower.contains("access denied")
            || lower.contains("eacces")
            || lower.contains("eperm")
        {
            HidError::PermissionDenied(message)
        } else if lower.contains("busy") {
            HidError::Busy(message)
        } else {
            HidError::transport(message)
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HidError::NotSupported { .. } => ErrorKind::NotSupported,
            HidError::NotFound => ErrorKind::NotFound,
            HidError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            HidError::Busy(_) => ErrorKind::Busy,
            HidError::Descriptor(_) => ErrorKind::MalformedDescriptor,
            HidError::Transport { .. } => ErrorKind::Transport,
            HidError::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            HidError::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                std::io::ErrorKind::ResourceBusy => ErrorKind::Busy,
                std::io::ErrorKind::Unsupported => ErrorKind::NotSupported,
                _ => ErrorKind::Transport,
            },
        }
    }

    /// Whether trying again later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Busy
    }
}

#[cfg(feature = "nusb")]
impl From<nusb::Error> for HidError {
    fn from(e: nusb::Error) -> Self {
        HidError::from_usb(e.kind(), e.os_error(), e.to_string())
    }
}

#[cfg(feature = "nusb")]
impl From<nusb::transfer::TransferError> for HidError {
    fn from(e: nusb::transfer::TransferError) -> Self {
        use nusb::transfer::TransferError;

        let code = match e {
            TransferError::Unknown(code) => Some(code as i32),
            _ => None,
        };
        HidError::Transport {
            code,
            message: e.to_string(),
        }
    }
}
