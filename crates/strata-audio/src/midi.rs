//! MIDI I/O
//!
//! The engine owns a MIDI client with three endpoint flavors: virtual in,
//! virtual out, and virtual in+out, plus real-device variants that attach
//! to an existing port by identifier. Endpoints are independent and release
//! their OS resources on drop. Incoming packets are delivered to the
//! receiver as `(bytes, host_time_seconds)`; when the engine requests it,
//! delivery is wrapped in the engine mutex so receivers may touch engine
//! state safely.
//!
//! Built on midir (ALSA on Linux, CoreMIDI on macOS, WinMM on Windows).
//! Virtual endpoints require an OS that supports them (unix only).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

#[cfg(unix)]
use midir::os::unix::{VirtualInput, VirtualOutput};

use crate::engine::EngineShared;
use crate::error::{AudioError, AudioResult};

/// Incoming-packet callback: `(bytes, host_time_seconds)`
pub type MidiReceiver = Box<dyn FnMut(&[u8], f64) + Send + 'static>;

const CLIENT_NAME: &str = "Strata MIDI";

/// An input endpoint; receives packets until dropped
pub struct MidiIn {
    _conn: MidiInputConnection<()>,
    desc: String,
    is_virtual: bool,
}

impl MidiIn {
    /// Human-readable endpoint description
    pub fn description(&self) -> &str {
        &self.desc
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }
}

/// An output endpoint
pub struct MidiOut {
    conn: MidiOutputConnection,
    desc: String,
    is_virtual: bool,
}

impl MidiOut {
    pub fn description(&self) -> &str {
        &self.desc
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Send one packet; returns the number of bytes accepted
    pub fn send(&mut self, bytes: &[u8]) -> AudioResult<usize> {
        self.conn
            .send(bytes)
            .map_err(|e| AudioError::MidiSend(e.to_string()))?;
        Ok(bytes.len())
    }
}

/// Paired input and output endpoints on one device
pub struct MidiInOut {
    input: MidiIn,
    output: MidiOut,
}

impl MidiInOut {
    pub fn description(&self) -> &str {
        self.input.description()
    }

    pub fn is_virtual(&self) -> bool {
        self.input.is_virtual()
    }

    pub fn send(&mut self, bytes: &[u8]) -> AudioResult<usize> {
        self.output.send(bytes)
    }
}

/// Engine-owned MIDI endpoint factory
pub(crate) struct MidiClient {
    /// When set, receiver delivery is serialized under the engine mutex
    engine_lock: Option<Arc<EngineShared>>,
    in_counter: AtomicU32,
    out_counter: AtomicU32,
}

impl MidiClient {
    pub fn new(engine_lock: Option<Arc<EngineShared>>) -> Self {
        Self {
            engine_lock,
            in_counter: AtomicU32::new(0),
            out_counter: AtomicU32::new(0),
        }
    }

    pub fn uses_lock(&self) -> bool {
        self.engine_lock.is_some()
    }

    /// Wrap a receiver with timestamp conversion and the optional engine lock
    fn wrap_receiver(
        &self,
        mut receiver: MidiReceiver,
    ) -> impl FnMut(u64, &[u8], &mut ()) + Send + 'static {
        let lock = self.engine_lock.clone();
        move |timestamp_us, bytes, _| {
            let seconds = timestamp_us as f64 / 1.0e6;
            match &lock {
                Some(shared) => {
                    let _guard = shared.inner.lock().unwrap();
                    receiver(bytes, seconds);
                }
                None => receiver(bytes, seconds),
            }
        }
    }

    fn new_input(&self) -> AudioResult<MidiInput> {
        let mut midi_in =
            MidiInput::new(CLIENT_NAME).map_err(|e| AudioError::MidiInit(e.to_string()))?;
        midi_in.ignore(Ignore::None);
        Ok(midi_in)
    }

    fn new_output(&self) -> AudioResult<MidiOutput> {
        MidiOutput::new(CLIENT_NAME).map_err(|e| AudioError::MidiInit(e.to_string()))
    }

    /// List `(id, name)` pairs for every attachable port
    pub fn enumerate_devices(&self) -> Vec<(String, String)> {
        let mut devices = Vec::new();

        if let Ok(midi_in) = self.new_input() {
            for port in midi_in.ports() {
                if let Ok(name) = midi_in.port_name(&port) {
                    devices.push((name.clone(), name));
                }
            }
        }
        if let Ok(midi_out) = self.new_output() {
            for port in midi_out.ports() {
                if let Ok(name) = midi_out.port_name(&port) {
                    if !devices.iter().any(|(id, _)| *id == name) {
                        devices.push((name.clone(), name));
                    }
                }
            }
        }

        devices
    }

    pub fn new_virtual_in(&self, receiver: MidiReceiver) -> AudioResult<MidiIn> {
        #[cfg(unix)]
        {
            let midi_in = self.new_input()?;
            let name = format!(
                "{} Virtual In {}",
                CLIENT_NAME,
                self.in_counter.fetch_add(1, Ordering::Relaxed)
            );
            let conn = midi_in
                .create_virtual(&name, self.wrap_receiver(receiver), ())
                .map_err(|e| AudioError::MidiConnect(e.to_string()))?;
            Ok(MidiIn {
                _conn: conn,
                desc: name,
                is_virtual: true,
            })
        }
        #[cfg(not(unix))]
        {
            let _ = receiver;
            Err(AudioError::MidiVirtualUnsupported)
        }
    }

    pub fn new_virtual_out(&self) -> AudioResult<MidiOut> {
        #[cfg(unix)]
        {
            let midi_out = self.new_output()?;
            let name = format!(
                "{} Virtual Out {}",
                CLIENT_NAME,
                self.out_counter.fetch_add(1, Ordering::Relaxed)
            );
            let conn = midi_out
                .create_virtual(&name)
                .map_err(|e| AudioError::MidiConnect(e.to_string()))?;
            Ok(MidiOut {
                conn,
                desc: name,
                is_virtual: true,
            })
        }
        #[cfg(not(unix))]
        {
            Err(AudioError::MidiVirtualUnsupported)
        }
    }

    pub fn new_virtual_in_out(&self, receiver: MidiReceiver) -> AudioResult<MidiInOut> {
        let input = self.new_virtual_in(receiver)?;
        let output = self.new_virtual_out()?;
        Ok(MidiInOut { input, output })
    }

    pub fn new_real_in(&self, device_id: &str, receiver: MidiReceiver) -> AudioResult<MidiIn> {
        let midi_in = self.new_input()?;
        let pattern = device_id.to_lowercase();
        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| {
                midi_in
                    .port_name(p)
                    .map(|n| n.to_lowercase().contains(&pattern))
                    .unwrap_or(false)
            })
            .ok_or_else(|| AudioError::MidiPortNotFound(device_id.to_string()))?;

        let desc = midi_in
            .port_name(&port)
            .map_err(|e| AudioError::MidiConnect(e.to_string()))?;
        log::info!("MIDI: attaching input '{}'", desc);

        let conn_name = format!(
            "{} Real In {}",
            CLIENT_NAME,
            self.in_counter.fetch_add(1, Ordering::Relaxed)
        );
        let conn = midi_in
            .connect(&port, &conn_name, self.wrap_receiver(receiver), ())
            .map_err(|e| AudioError::MidiConnect(e.to_string()))?;

        Ok(MidiIn {
            _conn: conn,
            desc,
            is_virtual: false,
        })
    }

    pub fn new_real_out(&self, device_id: &str) -> AudioResult<MidiOut> {
        let midi_out = self.new_output()?;
        let pattern = device_id.to_lowercase();
        let port = midi_out
            .ports()
            .into_iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|n| n.to_lowercase().contains(&pattern))
                    .unwrap_or(false)
            })
            .ok_or_else(|| AudioError::MidiPortNotFound(device_id.to_string()))?;

        let desc = midi_out
            .port_name(&port)
            .map_err(|e| AudioError::MidiConnect(e.to_string()))?;
        log::info!("MIDI: attaching output '{}'", desc);

        let conn_name = format!(
            "{} Real Out {}",
            CLIENT_NAME,
            self.out_counter.fetch_add(1, Ordering::Relaxed)
        );
        let conn = midi_out
            .connect(&port, &conn_name)
            .map_err(|e| AudioError::MidiConnect(e.to_string()))?;

        Ok(MidiOut {
            conn,
            desc,
            is_virtual: false,
        })
    }

    pub fn new_real_in_out(
        &self,
        device_id: &str,
        receiver: MidiReceiver,
    ) -> AudioResult<MidiInOut> {
        let input = self.new_real_in(device_id, receiver)?;
        let output = self.new_real_out(device_id)?;
        Ok(MidiInOut { input, output })
    }
}
