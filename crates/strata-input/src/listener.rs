//! Hot-plug listener core
//!
//! The listener turns asynchronous OS device events into mutations of the
//! finder's token set. All mutations are serialized onto the listener's own
//! thread: connect events originate there, and disconnect events raised on
//! any other thread are marshalled across a channel and applied by the
//! listener loop. `scan_now` is the one synchronous path; it applies a full
//! enumeration pass under the finder lock.
//!
//! Listener lifecycle: constructed → (scanning ⇄ not-scanning) → destroyed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use crate::finder::DeviceFinder;
use crate::token::{DeviceDescriptor, DeviceHandle};

/// Automatic and manual device scanning surface
///
/// Implemented by platform backends; `HidApiListener` is the in-tree one.
pub trait HidListener {
    /// Enable hot-plug scanning; new devices will be tokenized as they appear
    fn start_scanning(&self) -> bool;

    /// Disable hot-plug scanning; the existing token set is left untouched
    fn stop_scanning(&self) -> bool;

    /// Run one synchronous enumeration pass, inserting any missing tokens
    fn scan_now(&self) -> bool;
}

/// Backend-independent event logic shared by listener implementations
pub struct ListenerCore {
    finder: Arc<DeviceFinder>,
    scanning: AtomicBool,
    /// Thread all token mutations are serialized onto
    listener_thread: Mutex<Option<ThreadId>>,
    removal_tx: flume::Sender<DeviceHandle>,
    removal_rx: flume::Receiver<DeviceHandle>,
}

impl ListenerCore {
    pub fn new(finder: Arc<DeviceFinder>) -> Self {
        let (removal_tx, removal_rx) = flume::unbounded();
        Self {
            finder,
            scanning: AtomicBool::new(false),
            listener_thread: Mutex::new(None),
            removal_tx,
            removal_rx,
        }
    }

    pub fn finder(&self) -> &Arc<DeviceFinder> {
        &self.finder
    }

    /// Record the calling thread as the listener thread
    ///
    /// Called once by the backend's event loop before processing events.
    pub fn bind_listener_thread(&self) {
        *self.listener_thread.lock().unwrap() = Some(std::thread::current().id());
    }

    pub fn set_scanning(&self, enabled: bool) {
        self.scanning.store(enabled, Ordering::Relaxed);
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Relaxed)
    }

    /// Handle a device-connect event (listener thread only)
    ///
    /// Ignored while scanning is disabled or when the handle is already
    /// tracked. Devices whose string properties failed to read are skipped
    /// silently and scanning continues.
    pub fn device_connected(&self, desc: DeviceDescriptor) {
        if !self.is_scanning() {
            return;
        }
        if self.finder.has_token(desc.handle) {
            return;
        }
        match desc.into_token() {
            Some(token) => {
                self.finder.insert_token(token);
            }
            None => {
                log::debug!("Input: skipping device with unreadable properties");
            }
        }
    }

    /// Handle a device-disconnect event from any thread
    ///
    /// When raised off the listener thread the removal is marshalled onto it
    /// and applied at the next [`Self::drain_removals`] call, keeping all
    /// token mutations serialized.
    pub fn device_disconnected(&self, handle: DeviceHandle) {
        let on_listener_thread = match *self.listener_thread.lock().unwrap() {
            Some(id) => id == std::thread::current().id(),
            // No event loop bound yet; the caller is the only mutator.
            None => true,
        };

        if on_listener_thread {
            self.finder.remove_token(handle);
        } else {
            let _ = self.removal_tx.send(handle);
        }
    }

    /// Apply marshalled removals (listener thread only)
    pub fn drain_removals(&self) {
        while let Ok(handle) = self.removal_rx.try_recv() {
            self.finder.remove_token(handle);
        }
    }

    /// Apply one full enumeration pass under the finder lock
    ///
    /// Inserts a token for every descriptor whose handle is missing;
    /// unreadable devices are skipped. Works regardless of the scanning
    /// flag, mirroring manual rescans.
    pub fn apply_scan(&self, descriptors: impl IntoIterator<Item = DeviceDescriptor>) {
        let mut tokens = self.finder.lock_tokens();
        for desc in descriptors {
            if tokens.contains_key(&desc.handle) {
                continue;
            }
            if let Some(token) = desc.into_token() {
                tokens.insert(token.handle, token);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(handle: u64) -> DeviceDescriptor {
        DeviceDescriptor {
            handle: DeviceHandle(handle),
            vendor_id: 0x57e,
            product_id: 0x337,
            manufacturer: Some("Test Corp".into()),
            product: Some("Test Pad".into()),
        }
    }

    fn scanning_core() -> ListenerCore {
        let core = ListenerCore::new(Arc::new(DeviceFinder::new()));
        core.bind_listener_thread();
        core.set_scanning(true);
        core
    }

    #[test]
    fn test_connect_ignored_while_not_scanning() {
        let core = ListenerCore::new(Arc::new(DeviceFinder::new()));
        core.bind_listener_thread();
        core.device_connected(descriptor(1));
        assert_eq!(core.finder().token_count(), 0);
    }

    #[test]
    fn test_connect_disconnect_connect_leaves_one_token() {
        let core = scanning_core();
        let h = DeviceHandle(42);

        for _ in 0..100 {
            core.device_connected(descriptor(42));
            core.device_disconnected(h);
            core.device_connected(descriptor(42));
        }

        let tokens = core.finder().device_tokens();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].handle, h);
    }

    #[test]
    fn test_unreadable_properties_skip_device() {
        let core = scanning_core();
        let mut desc = descriptor(7);
        desc.product = None;
        core.device_connected(desc);
        assert_eq!(core.finder().token_count(), 0);

        // Scanning continues: the next healthy device still lands.
        core.device_connected(descriptor(8));
        assert_eq!(core.finder().token_count(), 1);
    }

    #[test]
    fn test_foreign_thread_disconnect_is_marshalled() {
        let core = Arc::new(scanning_core());
        core.device_connected(descriptor(5));

        let remote = core.clone();
        std::thread::spawn(move || {
            remote.device_disconnected(DeviceHandle(5));
        })
        .join()
        .unwrap();

        // The removal is queued, not applied, until the listener drains it.
        assert_eq!(core.finder().token_count(), 1);
        core.drain_removals();
        assert_eq!(core.finder().token_count(), 0);
    }

    #[test]
    fn test_scan_now_inserts_missing_only() {
        let core = scanning_core();
        core.device_connected(descriptor(1));

        let mut unreadable = descriptor(3);
        unreadable.manufacturer = None;
        core.apply_scan(vec![descriptor(1), descriptor(2), unreadable]);

        let mut handles: Vec<u64> = core
            .finder()
            .device_tokens()
            .iter()
            .map(|t| t.handle.0)
            .collect();
        handles.sort_unstable();
        assert_eq!(handles, vec![1, 2]);
    }
}
