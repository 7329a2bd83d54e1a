//! Process-wide backend selection.
//!
//! The backend is chosen once, before or at first use, and never changes
//! afterwards. Reads after initialization take no lock.

use std::sync::OnceLock;

use tracing::info;

use crate::backend::{BackendKind, HidBackend};
use crate::error::HidError;

static ACTIVE: OnceLock<Box<dyn HidBackend>> = OnceLock::new();

/// Select the backend for this process.
///
/// Fails with `AlreadyInitialized` if a backend was installed before or the
/// default was already taken into use.
pub fn install(backend: Box<dyn HidBackend>) -> Result<(), HidError> {
    let name = backend.name();
    ACTIVE
        .set(backend)
        .map_err(|_| HidError::AlreadyInitialized)?;
    info!(backend = name, "HID backend selected");
    Ok(())
}

/// The active backend, falling back to the compiled-in default.
pub fn active_backend() -> &'static dyn HidBackend {
    ACTIVE
        .get_or_init(|| {
            let backend = BackendKind::Native.create();
            info!(backend = backend.name(), "Using default HID backend");
            backend
        })
        .as_ref()
}

pub fn is_initialized() -> bool {
    ACTIVE.get().is_some()
}
