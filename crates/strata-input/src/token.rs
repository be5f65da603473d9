//! Device tokens
//!
//! A token is the canonical per-device record produced by the finder: USB
//! identity plus an opaque handle tying it back to the OS device object.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Opaque per-OS-device identity
///
/// Stable for as long as the device stays connected; hot-plugging the same
/// physical device may yield a new handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

impl DeviceHandle {
    /// Derive a handle from a platform device path (hidapi-style)
    pub fn from_path(path: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// Canonical record for one discovered input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceToken {
    /// USB vendor id
    pub vendor_id: u16,
    /// USB product id
    pub product_id: u16,
    /// Manufacturer string from device properties
    pub manufacturer: String,
    /// Product string from device properties
    pub product: String,
    /// Opaque OS handle this token was built from
    pub handle: DeviceHandle,
}

impl DeviceToken {
    pub fn new(
        vendor_id: u16,
        product_id: u16,
        manufacturer: impl Into<String>,
        product: impl Into<String>,
        handle: DeviceHandle,
    ) -> Self {
        Self {
            vendor_id,
            product_id,
            manufacturer: manufacturer.into(),
            product: product.into(),
            handle,
        }
    }
}

/// Raw device properties as read from the OS, before token insertion
///
/// String properties can fail to read on some transports; such devices are
/// skipped silently and scanning continues.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub handle: DeviceHandle,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl DeviceDescriptor {
    /// Build the token, or `None` when a property read failed
    pub fn into_token(self) -> Option<DeviceToken> {
        Some(DeviceToken {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            manufacturer: self.manufacturer?,
            product: self.product?,
            handle: self.handle,
        })
    }
}
