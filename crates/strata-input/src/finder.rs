//! Device finder
//!
//! Owns the token set. Listener backends mutate it through the insert and
//! remove operations; clients query it. All access goes through one lock so
//! bulk scans can hold it across a whole enumeration pass.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::token::{DeviceHandle, DeviceToken};

/// Thread-safe set of device tokens keyed by OS handle
#[derive(Default)]
pub struct DeviceFinder {
    tokens: Mutex<HashMap<DeviceHandle, DeviceToken>>,
}

impl DeviceFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a token exists for this OS handle
    pub fn has_token(&self, handle: DeviceHandle) -> bool {
        self.tokens.lock().unwrap().contains_key(&handle)
    }

    /// Insert a token; returns false when the handle was already present
    pub fn insert_token(&self, token: DeviceToken) -> bool {
        let mut tokens = self.tokens.lock().unwrap();
        if tokens.contains_key(&token.handle) {
            return false;
        }
        log::info!(
            "Input: device added: '{}' '{}' (VID={:#06x} PID={:#06x})",
            token.manufacturer,
            token.product,
            token.vendor_id,
            token.product_id
        );
        tokens.insert(token.handle, token);
        true
    }

    /// Remove the token matching this OS handle, if any
    pub fn remove_token(&self, handle: DeviceHandle) -> Option<DeviceToken> {
        let removed = self.tokens.lock().unwrap().remove(&handle);
        if let Some(token) = &removed {
            log::info!("Input: device removed: '{}'", token.product);
        }
        removed
    }

    /// Snapshot of all current tokens
    pub fn device_tokens(&self) -> Vec<DeviceToken> {
        self.tokens.lock().unwrap().values().cloned().collect()
    }

    /// Number of tracked devices
    pub fn token_count(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    /// Hold the token-set lock across a bulk scan
    ///
    /// Used by listener backends so one enumeration pass is observed
    /// atomically by clients.
    pub fn lock_tokens(&self) -> MutexGuard<'_, HashMap<DeviceHandle, DeviceToken>> {
        self.tokens.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(handle: u64) -> DeviceToken {
        DeviceToken::new(0x57e, 0x337, "Test Corp", "Test Pad", DeviceHandle(handle))
    }

    #[test]
    fn test_insert_is_deduplicated_by_handle() {
        let finder = DeviceFinder::new();
        assert!(finder.insert_token(token(1)));
        assert!(!finder.insert_token(token(1)));
        assert_eq!(finder.token_count(), 1);
    }

    #[test]
    fn test_remove_returns_token() {
        let finder = DeviceFinder::new();
        finder.insert_token(token(9));
        let removed = finder.remove_token(DeviceHandle(9)).unwrap();
        assert_eq!(removed.product, "Test Pad");
        assert!(!finder.has_token(DeviceHandle(9)));
        assert!(finder.remove_token(DeviceHandle(9)).is_none());
    }
}
