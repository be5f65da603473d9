//! End-to-end pump tests against the pull-driven engine

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strata_audio::{
    AudioVoiceEngine, ChannelSet, NullVoiceEngine, SampleFormat, VoiceCallback, VoiceId,
    MAX_CHANNELS,
};

/// Supplies a repeating int16 ramp, tracking its absolute position
struct RampSource {
    pos: AtomicUsize,
    period: usize,
}

impl RampSource {
    fn new(period: usize) -> Self {
        Self {
            pos: AtomicUsize::new(0),
            period,
        }
    }

    fn value_at(&self, i: usize) -> i16 {
        (((i % self.period) as f32 / self.period as f32) * 32767.0) as i16
    }
}

impl VoiceCallback for RampSource {
    fn supply_audio(&self, _voice: VoiceId, frames: usize, scratch: &mut [i16]) -> usize {
        let start = self.pos.fetch_add(frames, Ordering::SeqCst);
        for (i, slot) in scratch.iter_mut().take(frames).enumerate() {
            *slot = self.value_at(start + i);
        }
        frames
    }
}

/// Supplies a constant int16 value on every channel
struct ConstSource {
    value: i16,
    supplied_frames: AtomicUsize,
}

impl ConstSource {
    fn new(value: i16) -> Arc<Self> {
        Arc::new(Self {
            value,
            supplied_frames: AtomicUsize::new(0),
        })
    }
}

impl VoiceCallback for ConstSource {
    fn supply_audio(&self, _voice: VoiceId, frames: usize, scratch: &mut [i16]) -> usize {
        self.supplied_frames.fetch_add(frames, Ordering::SeqCst);
        scratch.fill(self.value);
        frames
    }
}

fn stereo_engine(sample_rate: f64, period: usize) -> NullVoiceEngine {
    NullVoiceEngine::new(sample_rate, ChannelSet::Stereo, SampleFormat::Float32, period)
}

/// Channel-0 samples of an interleaved stereo buffer
fn left_channel(buf: &[f32]) -> Vec<f32> {
    buf.chunks(2).map(|frame| frame[0]).collect()
}

#[test]
fn test_passthrough_mono() {
    let engine = stereo_engine(48000.0, 480);
    let source = Arc::new(RampSource::new(480));
    let voice = engine.new_mono_voice(48000.0, source.clone(), false);
    voice.start();

    engine.pump_and_mix_voices();
    let out = engine.last_period_f32();
    assert_eq!(out.len(), 480 * 2);

    // Main channel equals the input ramp within one int16 LSB; the default
    // identity matrix routes the mono voice to both front channels.
    let lsb = 1.0 / 32768.0;
    for (i, frame) in out.chunks(2).enumerate() {
        let expected = source.value_at(i) as f32 / 32768.0;
        assert!(
            (frame[0] - expected).abs() <= lsb,
            "frame {}: {} vs {}",
            i,
            frame[0],
            expected
        );
        assert!((frame[1] - expected).abs() <= lsb);
    }
}

#[test]
fn test_resample_two_to_one() {
    let engine = stereo_engine(48000.0, 240);
    let source = ConstSource::new(16384);
    let voice = engine.new_mono_voice(96000.0, source, false);
    voice.start();

    let delay = voice.output_delay();
    assert!(delay > 0, "2:1 resampling must go through the sinc kernel");

    // Collect enough periods to get past the warm-up transient.
    let mut collected = Vec::new();
    while collected.len() < (delay + 240 * 4) * 2 {
        engine.pump_and_mix_voices();
        collected.extend(engine.last_period_f32());
    }

    // After warm-up the output settles at the input level.
    let left = left_channel(&collected);
    for (i, v) in left.iter().enumerate().skip(delay + 240) {
        assert!((v - 0.5).abs() < 1e-2, "frame {}: {}", i, v);
    }
}

#[test]
fn test_slewed_gain_ramp() {
    let engine = stereo_engine(48000.0, 480);
    let source = ConstSource::new(32767);
    let voice = engine.new_stereo_voice(48000.0, source, false);

    // Explicit identity send, slewed: the new matrix starts at zero and
    // climbs to unity over the 5ms quantum (240 frames at 48kHz).
    let mut coefs = [[0.0f32; 2]; MAX_CHANNELS];
    coefs[0] = [1.0, 0.0];
    coefs[1] = [0.0, 1.0];
    voice.set_stereo_channel_levels(None, coefs, true);
    voice.start();

    engine.pump_and_mix_voices();
    let left = left_channel(&engine.last_period_f32());

    let full = 32767.0 / 32768.0;
    for (k, v) in left.iter().enumerate().take(240) {
        let expected = (k as f32 / 240.0) * full;
        assert!(
            (v - expected).abs() < 0.01,
            "ramp frame {}: {} vs {}",
            k,
            v,
            expected
        );
    }
    for (k, v) in left.iter().enumerate().skip(240) {
        assert!((v - full).abs() < 1e-3, "steady frame {}: {}", k, v);
    }
}

#[test]
fn test_pump_determinism() {
    let run = || {
        let engine = stereo_engine(48000.0, 480);
        let voice = engine.new_mono_voice(44100.0, Arc::new(RampSource::new(333)), false);
        voice.start();
        let mut collected = Vec::new();
        for _ in 0..3 {
            engine.pump_and_mix_voices();
            collected.extend(engine.last_period_f32());
        }
        collected
    };

    let a = run();
    let b = run();
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.to_bits(), y.to_bits());
    }
}

#[test]
fn test_scratch_grows_monotonically() {
    let engine = stereo_engine(48000.0, 480);
    let voice = engine.new_stereo_voice(48000.0, ConstSource::new(100), false);
    voice.start();

    for frames in [100usize, 300, 200] {
        engine.pump_frames(frames);
    }

    // Stereo voice: scratch holds 2 samples per frame of the largest pump.
    let (pre, post) = engine.scratch_lens();
    assert!(pre >= 300 * 2, "pre scratch {}", pre);
    assert!(post >= 300 * 2, "post scratch {}", post);

    // A smaller pump afterwards never shrinks them.
    engine.pump_frames(50);
    let (pre_after, post_after) = engine.scratch_lens();
    assert!(pre_after >= pre);
    assert!(post_after >= post);
}

#[test]
fn test_silent_out_produces_zeros() {
    let engine = stereo_engine(48000.0, 480);
    let source = ConstSource::new(20000);
    let voice = engine.new_mono_voice(48000.0, source.clone(), false);
    voice.set_silent_out(true);
    voice.start();

    engine.pump_and_mix_voices();
    assert!(engine.last_period_f32().iter().all(|v| *v == 0.0));
    // The pull still happened; only the data was substituted.
    assert_eq!(source.supplied_frames.load(Ordering::SeqCst), 0);
}

#[test]
fn test_dropped_voice_is_unbound() {
    let engine = stereo_engine(48000.0, 480);
    let voice = engine.new_mono_voice(48000.0, ConstSource::new(20000), false);
    voice.start();

    engine.pump_and_mix_voices();
    assert!(engine.last_period_f32().iter().any(|v| *v != 0.0));

    drop(voice);
    engine.pump_and_mix_voices();
    assert!(engine.last_period_f32().iter().all(|v| *v == 0.0));
}

#[test]
fn test_submix_send_and_drop() {
    let engine = stereo_engine(48000.0, 480);
    let submix = engine.new_submix();
    let voice = engine.new_mono_voice(48000.0, ConstSource::new(16384), false);

    let mut coefs = [0.0f32; MAX_CHANNELS];
    coefs[0] = 0.5;
    voice.set_mono_channel_levels(Some(&submix), coefs, false);
    voice.start();

    engine.pump_and_mix_voices();
    let left = left_channel(&engine.last_period_f32());
    assert!((left[0] - 0.25).abs() < 1e-3, "attenuated send: {}", left[0]);

    // Dropping the submix strips the voice's send; with no explicit sends
    // left the voice falls back to the default matrix into main.
    drop(submix);
    engine.pump_and_mix_voices();
    let left = left_channel(&engine.last_period_f32());
    assert!((left[0] - 0.5).abs() < 1e-3, "default matrix: {}", left[0]);
}

#[test]
fn test_deferred_pitch_ratio_applies_at_pump_start() {
    let engine = stereo_engine(48000.0, 480);
    let source = ConstSource::new(0);
    let voice = engine.new_mono_voice(48000.0, source.clone(), true);
    voice.start();

    // Prime the resampler, then measure steady-state demand.
    engine.pump_and_mix_voices();
    source.supplied_frames.store(0, Ordering::SeqCst);
    for _ in 0..4 {
        engine.pump_and_mix_voices();
    }
    let baseline = source.supplied_frames.swap(0, Ordering::SeqCst);
    assert!(baseline > 0);

    voice.set_pitch_ratio(2.0, false);
    for _ in 0..4 {
        engine.pump_and_mix_voices();
    }
    let after = source.supplied_frames.swap(0, Ordering::SeqCst);
    assert!(
        after as f64 > baseline as f64 * 1.5,
        "pitch 2.0 should pull ~2x input: {} vs {}",
        after,
        baseline
    );
}

#[test]
fn test_int16_engine_passthrough() {
    let engine = NullVoiceEngine::new(48000.0, ChannelSet::Stereo, SampleFormat::Int16, 480);
    let source = Arc::new(RampSource::new(480));
    let voice = engine.new_mono_voice(48000.0, source.clone(), false);
    voice.start();

    engine.pump_and_mix_voices();
    let out = engine.last_period_i16();
    assert_eq!(out.len(), 480 * 2);
    for (i, frame) in out.chunks(2).enumerate() {
        let expected = source.value_at(i);
        assert!(
            (frame[0] - expected).abs() <= 1,
            "frame {}: {} vs {}",
            i,
            frame[0],
            expected
        );
    }
}
