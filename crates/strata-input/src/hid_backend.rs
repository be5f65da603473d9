//! hidapi-backed hot-plug listener
//!
//! hidapi exposes enumeration but no change notifications, so the listener
//! runs a scan thread that diffs successive device lists: paths that appear
//! become connect events, paths that vanish become disconnect events. The
//! scan thread is the listener thread; marshalled removals from other
//! threads are drained on every tick.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hidapi::HidApi;

use crate::error::{InputError, InputResult};
use crate::finder::DeviceFinder;
use crate::listener::{HidListener, ListenerCore};
use crate::token::{DeviceDescriptor, DeviceHandle};

/// How often the scan thread wakes to drain removals
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// How many ticks pass between full device-list refreshes
const SCAN_EVERY_TICKS: u32 = 10;

/// Hot-plug listener built on hidapi enumeration
pub struct HidApiListener {
    core: Arc<ListenerCore>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HidApiListener {
    /// Create the listener and perform the initial device scan
    ///
    /// The initial scan populates the finder before the scan thread starts,
    /// then scanning is left disabled until `start_scanning`.
    pub fn new(finder: Arc<DeviceFinder>) -> InputResult<Self> {
        let core = Arc::new(ListenerCore::new(finder));

        // Initial device add, synchronously on the constructing thread.
        match HidApi::new() {
            Ok(api) => core.apply_scan(enumerate(&api)),
            Err(e) => return Err(InputError::BackendInit(e.to_string())),
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_core = core.clone();
        let thread_shutdown = shutdown.clone();

        let handle = thread::Builder::new()
            .name("strata-hid-listener".into())
            .spawn(move || scan_loop(thread_core, thread_shutdown))
            .map_err(|e| InputError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            core,
            shutdown,
            handle: Some(handle),
        })
    }

    /// The shared event core, mainly for tests and diagnostics
    pub fn core(&self) -> &Arc<ListenerCore> {
        &self.core
    }
}

impl HidListener for HidApiListener {
    fn start_scanning(&self) -> bool {
        self.core.set_scanning(true);
        true
    }

    fn stop_scanning(&self) -> bool {
        self.core.set_scanning(false);
        true
    }

    fn scan_now(&self) -> bool {
        match HidApi::new() {
            Ok(api) => {
                self.core.apply_scan(enumerate(&api));
                true
            }
            Err(e) => {
                log::warn!("Input: manual scan failed: {}", e);
                false
            }
        }
    }
}

impl Drop for HidApiListener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Build descriptors for every device hidapi can currently see
fn enumerate(api: &HidApi) -> Vec<DeviceDescriptor> {
    api.device_list()
        .map(|info| DeviceDescriptor {
            handle: DeviceHandle::from_path(&info.path().to_string_lossy()),
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            manufacturer: info.manufacturer_string().map(str::to_string),
            product: info.product_string().map(str::to_string),
        })
        .collect()
}

fn scan_loop(core: Arc<ListenerCore>, shutdown: Arc<AtomicBool>) {
    core.bind_listener_thread();
    log::debug!("Input: hid listener thread started");

    let mut api = match HidApi::new() {
        Ok(api) => api,
        Err(e) => {
            log::error!("Input: hid listener thread failed to init hidapi: {}", e);
            return;
        }
    };

    let mut tick = 0u32;
    while !shutdown.load(Ordering::Relaxed) {
        core.drain_removals();

        tick += 1;
        if core.is_scanning() && tick % SCAN_EVERY_TICKS == 0 {
            if let Err(e) = api.refresh_devices() {
                log::warn!("Input: device refresh failed: {}", e);
                thread::sleep(TICK_INTERVAL);
                continue;
            }

            let descriptors = enumerate(&api);
            let present: HashSet<DeviceHandle> =
                descriptors.iter().map(|d| d.handle).collect();

            // Vanished devices first, then new arrivals.
            let vanished: Vec<DeviceHandle> = core
                .finder()
                .device_tokens()
                .iter()
                .map(|t| t.handle)
                .filter(|h| !present.contains(h))
                .collect();
            for handle in vanished {
                core.device_disconnected(handle);
            }

            for desc in descriptors {
                core.device_connected(desc);
            }
        }

        thread::sleep(TICK_INTERVAL);
    }

    log::debug!("Input: hid listener thread stopped");
}
