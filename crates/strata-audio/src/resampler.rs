//! Per-voice resampler
//!
//! Converts a voice's int16 input stream to the engine's output rate and
//! sample format, pulling input on demand through a supply callback. Built
//! on rubato's sinc resampler at a "20-bit" quality point (256-tap
//! BlackmanHarris2 kernel, passband to 0.91·Nyquist). A voice whose input
//! rate equals the output rate and whose rate is fixed takes a bit-exact
//! bypass path instead.
//!
//! Dynamic-rate voices support `set_io_ratio`; a requested slew is applied
//! by stepping the effective ratio linearly across the slew window, one
//! adjustment per pump, with rubato ramping inside each chunk.

use std::collections::VecDeque;

use rubato::{
    Resampler, SincFixedOut, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{AudioError, AudioResult};
use crate::sample::MixSample;

/// Output frames produced per internal resampler chunk
const RESAMPLE_CHUNK: usize = 256;

/// Ratio headroom reserved for dynamic-rate voices
const DYNAMIC_RATIO_HEADROOM: f64 = 16.0;

enum Kind {
    /// Equal fixed rates; int16 passes straight through
    Bypass,
    Sinc {
        rs: SincFixedOut<f32>,
        /// Planar staging handed to rubato
        input_bufs: Vec<Vec<f32>>,
        /// Interleaved resampled samples awaiting consumption
        fifo: VecDeque<f32>,
    },
}

pub struct VoiceResampler {
    kind: Kind,
    channels: usize,
    /// rate_out / rate_in; the rubato ratio at pitch 1.0
    base_ratio: f64,
    dynamic: bool,
    pitch: f64,
    pitch_target: f64,
    pitch_step: f64,
    slew_remaining: usize,
}

impl VoiceResampler {
    /// Build a resampler from `rate_in` int16 input to `rate_out` output
    ///
    /// `channels` is 1 for mono voices, 2 for stereo. `dynamic` reserves
    /// ratio headroom for later `set_io_ratio` calls.
    pub fn new(
        rate_in: f64,
        rate_out: f64,
        channels: usize,
        dynamic: bool,
    ) -> AudioResult<Self> {
        if !(rate_in.is_finite() && rate_in > 0.0) {
            return Err(AudioError::InvalidRate(rate_in));
        }
        if !(rate_out.is_finite() && rate_out > 0.0) {
            return Err(AudioError::InvalidRate(rate_out));
        }

        let base_ratio = rate_out / rate_in;
        let kind = if rate_in == rate_out && !dynamic {
            Kind::Bypass
        } else {
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.91,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            let max_relative = if dynamic { DYNAMIC_RATIO_HEADROOM } else { 1.0 };
            let rs = SincFixedOut::<f32>::new(
                base_ratio,
                max_relative,
                params,
                RESAMPLE_CHUNK,
                channels,
            )
            .map_err(|e| AudioError::ResamplerError(e.to_string()))?;

            Kind::Sinc {
                rs,
                input_bufs: (0..channels).map(|_| Vec::new()).collect(),
                fifo: VecDeque::new(),
            }
        };

        Ok(Self {
            kind,
            channels,
            base_ratio,
            dynamic,
            pitch: 1.0,
            pitch_target: 1.0,
            pitch_step: 0.0,
            slew_remaining: 0,
        })
    }

    /// Warm-up transient length in output frames
    pub fn output_delay(&self) -> usize {
        match &self.kind {
            Kind::Bypass => 0,
            Kind::Sinc { rs, .. } => rs.output_delay(),
        }
    }

    /// Adjust the pitch ratio, immediately or slewed over `slew_frames`
    ///
    /// Ignored on voices built without dynamic rate, matching the fixed
    /// kernel they were constructed with.
    pub fn set_io_ratio(&mut self, ratio: f64, slew_frames: usize) -> AudioResult<()> {
        if !self.dynamic {
            if (ratio - 1.0).abs() > f64::EPSILON {
                log::debug!("Ignoring pitch ratio {} on fixed-rate voice", ratio);
            }
            return Ok(());
        }

        if slew_frames == 0 {
            self.pitch = ratio;
            self.pitch_target = ratio;
            self.slew_remaining = 0;
            self.apply_ratio(false)
        } else {
            self.pitch_target = ratio;
            self.pitch_step = (ratio - self.pitch) / slew_frames as f64;
            self.slew_remaining = slew_frames;
            Ok(())
        }
    }

    fn apply_ratio(&mut self, ramp: bool) -> AudioResult<()> {
        if let Kind::Sinc { rs, .. } = &mut self.kind {
            rs.set_resample_ratio(self.base_ratio / self.pitch, ramp)
                .map_err(|e| AudioError::ResamplerError(e.to_string()))?;
        }
        Ok(())
    }

    /// Step an in-flight ratio slew forward by one pump of `frames`
    fn advance_slew(&mut self, frames: usize) {
        if self.slew_remaining == 0 {
            return;
        }
        let steps = frames.min(self.slew_remaining);
        self.pitch += self.pitch_step * steps as f64;
        self.slew_remaining -= steps;
        if self.slew_remaining == 0 {
            self.pitch = self.pitch_target;
        }
        if let Err(e) = self.apply_ratio(true) {
            log::error!("Resampler ratio slew failed: {}", e);
            self.slew_remaining = 0;
        }
    }

    /// Produce `frames` output frames into `out`, pulling input as needed
    ///
    /// `supply` fills the requested number of int16 interleaved frames into
    /// the scratch slice and reports how many it produced; shortfalls are
    /// padded with silence. Always yields exactly `frames` frames except on
    /// the bypass path, where the supply count passes through.
    pub fn pull<S: MixSample>(
        &mut self,
        out: &mut [S],
        frames: usize,
        scratch_in: &mut Vec<i16>,
        mut supply: impl FnMut(&mut [i16], usize) -> usize,
    ) -> usize {
        let channels = self.channels;
        self.advance_slew(frames);

        match &mut self.kind {
            Kind::Bypass => {
                let samples = frames * channels;
                if scratch_in.len() < samples {
                    scratch_in.resize(samples, 0);
                }
                let produced = supply(&mut scratch_in[..samples], frames).min(frames);
                for i in 0..produced * channels {
                    out[i] = S::from_i16(scratch_in[i]);
                }
                produced
            }
            Kind::Sinc {
                rs,
                input_bufs,
                fifo,
            } => {
                let samples = frames * channels;
                while fifo.len() < samples {
                    let need = rs.input_frames_next();
                    let need_samples = need * channels;
                    if scratch_in.len() < need_samples {
                        scratch_in.resize(need_samples, 0);
                    }
                    let produced = supply(&mut scratch_in[..need_samples], need).min(need);
                    scratch_in[produced * channels..need_samples].fill(0);

                    for (c, buf) in input_bufs.iter_mut().enumerate() {
                        buf.clear();
                        buf.extend(
                            scratch_in[..need_samples]
                                .iter()
                                .skip(c)
                                .step_by(channels)
                                .map(|&v| f32::from_i16(v)),
                        );
                    }

                    match rs.process(&*input_bufs, None) {
                        Ok(waves) => {
                            let out_frames = waves[0].len();
                            for f in 0..out_frames {
                                for wave in waves.iter().take(channels) {
                                    fifo.push_back(wave[f]);
                                }
                            }
                        }
                        Err(e) => {
                            log::error!("Resampling error: {}", e);
                            out[..samples].fill(S::from_f32(0.0));
                            return frames;
                        }
                    }
                }

                for slot in out.iter_mut().take(samples) {
                    *slot = S::from_f32(fifo.pop_front().unwrap_or(0.0));
                }
                frames
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_fixed_rates_use_bypass() {
        let rs = VoiceResampler::new(48000.0, 48000.0, 1, false).unwrap();
        assert_eq!(rs.output_delay(), 0);
    }

    #[test]
    fn test_invalid_rate_is_rejected() {
        assert!(VoiceResampler::new(0.0, 48000.0, 1, false).is_err());
        assert!(VoiceResampler::new(48000.0, f64::NAN, 2, false).is_err());
    }

    #[test]
    fn test_bypass_is_bit_exact() {
        let mut rs = VoiceResampler::new(48000.0, 48000.0, 1, false).unwrap();
        let mut scratch = Vec::new();
        let mut out = vec![0i16; 64];
        let produced = rs.pull(&mut out, 64, &mut scratch, |buf, frames| {
            for (i, slot) in buf.iter_mut().enumerate() {
                *slot = (i as i16) * 100;
            }
            frames
        });
        assert_eq!(produced, 64);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, (i as i16) * 100);
        }
    }

    #[test]
    fn test_downsample_constant_settles() {
        let mut rs = VoiceResampler::new(96000.0, 48000.0, 1, false).unwrap();
        let delay = rs.output_delay();
        let mut scratch = Vec::new();

        let total = delay + 2048;
        let mut out = vec![0f32; total];
        let produced = rs.pull(&mut out, total, &mut scratch, |buf, frames| {
            buf.fill(16384);
            frames
        });
        assert_eq!(produced, total);

        for v in &out[delay + 256..] {
            assert!((v - 0.5).abs() < 1e-2, "steady state off: {}", v);
        }
    }

    #[test]
    fn test_fixed_rate_voice_ignores_ratio() {
        let mut rs = VoiceResampler::new(44100.0, 48000.0, 2, false).unwrap();
        assert!(rs.set_io_ratio(2.0, 0).is_ok());
    }

    #[test]
    fn test_dynamic_ratio_shifts_throughput() {
        let mut rs = VoiceResampler::new(48000.0, 48000.0, 1, true).unwrap();
        let mut scratch = Vec::new();
        let mut out = vec![0f32; 512];

        let mut supplied = 0usize;
        rs.pull(&mut out, 512, &mut scratch, |buf, frames| {
            supplied += frames;
            buf.fill(0);
            frames
        });
        let baseline = supplied;

        // Double pitch consumes input roughly twice as fast.
        rs.set_io_ratio(2.0, 0).unwrap();
        supplied = 0;
        rs.pull(&mut out, 512, &mut scratch, |buf, frames| {
            supplied += frames;
            buf.fill(0);
            frames
        });
        assert!(
            supplied as f64 > baseline as f64 * 1.5,
            "expected faster input consumption: {} vs {}",
            supplied,
            baseline
        );
    }
}
