//! Static dispatch over the engine's active mix format
//!
//! The pump is generic over the format the backend mixes in; this trait
//! routes each generic call site to the right typed scratch vector, merge
//! buffer, routing-callback overload, and effect method.

use crate::engine::EngineScratch;
use crate::sample::MixSample;
use crate::submix::{ChannelLevels, SubmixCore, SubmixEffect};
use crate::voice::{VoiceCallback, VoiceId};

pub(crate) trait EngineFormat: MixSample {
    /// The int16 input scratch plus this format's pre/post pair
    fn scratch_triple(
        scratch: &mut EngineScratch,
    ) -> (&mut Vec<i16>, &mut Vec<Self>, &mut Vec<Self>);

    /// This format's merge slice of a submix, grown to `samples`
    fn merge(submix: &mut SubmixCore, samples: usize) -> &mut [Self];

    /// Split borrow of a submix's merge vector and its main-mix levels
    fn merge_with_levels(submix: &mut SubmixCore) -> (&mut Vec<Self>, &mut ChannelLevels);

    /// Run the submix's effect chain over its merge buffer
    fn apply_effects(submix: &mut SubmixCore, frames: usize, channels: usize);

    /// Invoke the matching route_audio overload
    #[allow(clippy::too_many_arguments)]
    fn route(
        cb: &dyn VoiceCallback,
        voice: VoiceId,
        frames: usize,
        channels: usize,
        dt: f64,
        bus: u32,
        input: &[Self],
        output: &mut [Self],
    );
}

impl EngineFormat for i16 {
    fn scratch_triple(
        scratch: &mut EngineScratch,
    ) -> (&mut Vec<i16>, &mut Vec<Self>, &mut Vec<Self>) {
        (&mut scratch.in16, &mut scratch.pre16, &mut scratch.post16)
    }

    fn merge(submix: &mut SubmixCore, samples: usize) -> &mut [Self] {
        submix.merge_buf_16(samples)
    }

    fn merge_with_levels(submix: &mut SubmixCore) -> (&mut Vec<Self>, &mut ChannelLevels) {
        let SubmixCore {
            merge16,
            main_levels,
            ..
        } = submix;
        (merge16, main_levels)
    }

    fn apply_effects(submix: &mut SubmixCore, frames: usize, channels: usize) {
        let samples = frames * channels;
        let SubmixCore {
            effects, merge16, ..
        } = submix;
        if merge16.len() < samples {
            merge16.resize(samples, 0);
        }
        for fx in effects.iter_mut() {
            fx.process_i16(&mut merge16[..samples], frames, channels);
        }
    }

    fn route(
        cb: &dyn VoiceCallback,
        voice: VoiceId,
        frames: usize,
        channels: usize,
        dt: f64,
        bus: u32,
        input: &[Self],
        output: &mut [Self],
    ) {
        cb.route_audio_i16(voice, frames, channels, dt, bus, input, output);
    }

}

impl EngineFormat for i32 {
    fn scratch_triple(
        scratch: &mut EngineScratch,
    ) -> (&mut Vec<i16>, &mut Vec<Self>, &mut Vec<Self>) {
        (&mut scratch.in16, &mut scratch.pre32, &mut scratch.post32)
    }

    fn merge(submix: &mut SubmixCore, samples: usize) -> &mut [Self] {
        submix.merge_buf_32(samples)
    }

    fn merge_with_levels(submix: &mut SubmixCore) -> (&mut Vec<Self>, &mut ChannelLevels) {
        let SubmixCore {
            merge32,
            main_levels,
            ..
        } = submix;
        (merge32, main_levels)
    }

    fn apply_effects(submix: &mut SubmixCore, frames: usize, channels: usize) {
        let samples = frames * channels;
        let SubmixCore {
            effects, merge32, ..
        } = submix;
        if merge32.len() < samples {
            merge32.resize(samples, 0);
        }
        for fx in effects.iter_mut() {
            fx.process_i32(&mut merge32[..samples], frames, channels);
        }
    }

    fn route(
        cb: &dyn VoiceCallback,
        voice: VoiceId,
        frames: usize,
        channels: usize,
        dt: f64,
        bus: u32,
        input: &[Self],
        output: &mut [Self],
    ) {
        cb.route_audio_i32(voice, frames, channels, dt, bus, input, output);
    }

}

impl EngineFormat for f32 {
    fn scratch_triple(
        scratch: &mut EngineScratch,
    ) -> (&mut Vec<i16>, &mut Vec<Self>, &mut Vec<Self>) {
        (&mut scratch.in16, &mut scratch.pre_f32, &mut scratch.post_f32)
    }

    fn merge(submix: &mut SubmixCore, samples: usize) -> &mut [Self] {
        submix.merge_buf_f32(samples)
    }

    fn merge_with_levels(submix: &mut SubmixCore) -> (&mut Vec<Self>, &mut ChannelLevels) {
        let SubmixCore {
            merge_f32,
            main_levels,
            ..
        } = submix;
        (merge_f32, main_levels)
    }

    fn apply_effects(submix: &mut SubmixCore, frames: usize, channels: usize) {
        let samples = frames * channels;
        let SubmixCore {
            effects, merge_f32, ..
        } = submix;
        if merge_f32.len() < samples {
            merge_f32.resize(samples, 0.0);
        }
        for fx in effects.iter_mut() {
            fx.process_f32(&mut merge_f32[..samples], frames, channels);
        }
    }

    fn route(
        cb: &dyn VoiceCallback,
        voice: VoiceId,
        frames: usize,
        channels: usize,
        dt: f64,
        bus: u32,
        input: &[Self],
        output: &mut [Self],
    ) {
        cb.route_audio_f32(voice, frames, channels, dt, bus, input, output);
    }

}
