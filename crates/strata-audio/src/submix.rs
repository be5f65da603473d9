//! Submixes
//!
//! A submix is a named mixing bus accumulating voice contributions before
//! routing to the main mix. Voices → submixes → main form a one-level
//! fan-in graph; the main submix (bus 0) is the terminal bus written into
//! the hardware buffer. Each submix keeps a merge buffer per mix format and
//! only the engine's active format is filled during a pump.

use std::sync::Weak;

use crate::engine::EngineShared;
use crate::mix_info::MAX_CHANNELS;

/// Bus identifier; surfaced to the client's routing callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmixId(pub u32);

/// The distinguished terminal bus
pub const MAIN_SUBMIX: SubmixId = SubmixId(0);

/// An opaque per-bus effect applied when the submix is composed
///
/// One method per mix format; unimplemented formats pass through.
pub trait SubmixEffect: Send {
    fn process_i16(&mut self, _buf: &mut [i16], _frames: usize, _channels: usize) {}
    fn process_i32(&mut self, _buf: &mut [i32], _frames: usize, _channels: usize) {}
    fn process_f32(&mut self, _buf: &mut [f32], _frames: usize, _channels: usize) {}
}

/// Per-channel gains from a submix into the main mix, with slew
///
/// Same slew discipline as the send matrices: one linear step per composed
/// frame, landing exactly on the target.
#[derive(Debug, Clone)]
pub(crate) struct ChannelLevels {
    current: [f32; MAX_CHANNELS],
    target: [f32; MAX_CHANNELS],
    step: [f32; MAX_CHANNELS],
    remaining: usize,
}

impl ChannelLevels {
    fn unity() -> Self {
        Self {
            current: [1.0; MAX_CHANNELS],
            target: [1.0; MAX_CHANNELS],
            step: [0.0; MAX_CHANNELS],
            remaining: 0,
        }
    }

    pub fn set(&mut self, levels: [f32; MAX_CHANNELS], slew_frames: usize) {
        self.target = levels;
        if slew_frames == 0 {
            self.current = levels;
            self.remaining = 0;
        } else {
            for c in 0..MAX_CHANNELS {
                self.step[c] = (levels[c] - self.current[c]) / slew_frames as f32;
            }
            self.remaining = slew_frames;
        }
    }

    #[inline]
    pub fn gain(&self, channel: usize) -> f32 {
        self.current[channel]
    }

    #[inline]
    pub fn advance(&mut self) {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            } else {
                for c in 0..MAX_CHANNELS {
                    self.current[c] += self.step[c];
                }
            }
        }
    }
}

/// Engine-side state of one bus
pub(crate) struct SubmixCore {
    pub bus_id: u32,
    pub main_levels: ChannelLevels,
    pub effects: Vec<Box<dyn SubmixEffect>>,
    pub(crate) merge16: Vec<i16>,
    pub(crate) merge32: Vec<i32>,
    pub(crate) merge_f32: Vec<f32>,
}

impl SubmixCore {
    pub fn new(bus_id: u32) -> Self {
        Self {
            bus_id,
            main_levels: ChannelLevels::unity(),
            effects: Vec::new(),
            merge16: Vec::new(),
            merge32: Vec::new(),
            merge_f32: Vec::new(),
        }
    }

    /// Writable int16 merge slice covering `samples`, grown on demand
    pub fn merge_buf_16(&mut self, samples: usize) -> &mut [i16] {
        if self.merge16.len() < samples {
            self.merge16.resize(samples, 0);
        }
        &mut self.merge16[..samples]
    }

    pub fn merge_buf_32(&mut self, samples: usize) -> &mut [i32] {
        if self.merge32.len() < samples {
            self.merge32.resize(samples, 0);
        }
        &mut self.merge32[..samples]
    }

    pub fn merge_buf_f32(&mut self, samples: usize) -> &mut [f32] {
        if self.merge_f32.len() < samples {
            self.merge_f32.resize(samples, 0.0);
        }
        &mut self.merge_f32[..samples]
    }
}

/// Client handle to a bus
///
/// Dropping the handle removes the bus from the engine; any voice sends
/// targeting it are removed at the same time so send keys always reference
/// live submixes.
pub struct Submix {
    pub(crate) engine: Weak<EngineShared>,
    pub(crate) id: SubmixId,
}

impl Submix {
    pub fn id(&self) -> SubmixId {
        self.id
    }

    /// Bus id surfaced to the routing callback
    pub fn bus_id(&self) -> u32 {
        self.id.0
    }

    /// Set the per-channel gains into the main mix
    ///
    /// `slew` interpolates over the 5ms quantum; otherwise the gains apply
    /// at the next pump.
    pub fn set_main_levels(&self, levels: [f32; MAX_CHANNELS], slew: bool) {
        let Some(shared) = self.engine.upgrade() else {
            return;
        };
        let slew_frames = if slew {
            shared.mix_info.five_ms_frames()
        } else {
            0
        };
        let mut inner = shared.inner.lock().unwrap();
        if let Some(core) = inner.submixes.get_mut(self.id) {
            core.main_levels.set(levels, slew_frames);
        }
    }

    /// Append an effect to this bus's chain
    pub fn add_effect(&self, effect: Box<dyn SubmixEffect>) {
        let Some(shared) = self.engine.upgrade() else {
            return;
        };
        let mut inner = shared.inner.lock().unwrap();
        if let Some(core) = inner.submixes.get_mut(self.id) {
            core.effects.push(effect);
        }
    }
}

impl Drop for Submix {
    fn drop(&mut self) {
        if let Some(shared) = self.engine.upgrade() {
            shared.remove_submix(self.id);
        }
    }
}
