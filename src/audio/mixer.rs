//! Real-time mixing callbacks
//!
//! [`CaptureSide`], [`RenderSide`] and [`ToneLoop`] are the bodies of the
//! audio callbacks. They are built with all of their memory up front;
//! `process` never locks, allocates, or performs I/O.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::buffer::{create_shared_buffer, required_capacity, SharedBuffer};
use crate::signal::{Oscillator, SignalSpec};

/// Output limiting applied after mixing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipMode {
    /// Saturate at ±1.0
    Hard,
    /// Compress smoothly above ±1.0
    #[default]
    Soft,
}

impl ClipMode {
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            ClipMode::Hard => hard_clip(x),
            ClipMode::Soft => soft_clip(x),
        }
    }
}

impl FromStr for ClipMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hard" => Ok(ClipMode::Hard),
            "soft" => Ok(ClipMode::Soft),
            other => Err(format!("unknown clip mode '{}' (expected 'hard' or 'soft')", other)),
        }
    }
}

impl fmt::Display for ClipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipMode::Hard => write!(f, "hard"),
            ClipMode::Soft => write!(f, "soft"),
        }
    }
}

/// Saturate to [-1.0, 1.0]
#[inline]
pub fn hard_clip(x: f32) -> f32 {
    if x.is_nan() {
        return 0.0;
    }
    x.clamp(-1.0, 1.0)
}

const SOFT_CLIP_CEILING: f32 = 1.1;
const SOFT_CLIP_KNEE: f32 = 0.1;

/// Identity inside [-1.0, 1.0]; above it `sign(x) * (1.1 - 0.1 / |x|)`.
///
/// Continuous at ±1.0, monotonic, odd, and never beyond ±1.1. NaN maps to
/// silence and ±inf to the ceiling.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    if x.is_nan() {
        return 0.0;
    }
    let magnitude = x.abs();
    if magnitude <= 1.0 {
        return x;
    }
    (SOFT_CLIP_CEILING - SOFT_CLIP_KNEE / magnitude).copysign(x)
}

/// Pre-clip mix of one captured sample and one oscillator sample
#[inline]
pub fn mix_sample(captured: f32, oscillator: f32, gain: f32) -> f32 {
    captured + oscillator * gain
}

/// Duplex mixing parameters, fixed for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixConfig {
    ultrasonic_gain: f32,
    clip_mode: ClipMode,
}

impl MixConfig {
    /// Gain is clamped into [0.0, 1.0]; NaN becomes 0.0.
    pub fn new(ultrasonic_gain: f32, clip_mode: ClipMode) -> Self {
        let ultrasonic_gain = if ultrasonic_gain.is_nan() {
            0.0
        } else {
            ultrasonic_gain.clamp(0.0, 1.0)
        };
        Self {
            ultrasonic_gain,
            clip_mode,
        }
    }

    pub fn ultrasonic_gain(&self) -> f32 {
        self.ultrasonic_gain
    }

    pub fn clip_mode(&self) -> ClipMode {
        self.clip_mode
    }
}

impl Default for MixConfig {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_ULTRASONIC_GAIN, ClipMode::Soft)
    }
}

/// Callback counters, updated with relaxed atomics from the audio threads
#[derive(Debug, Default)]
pub struct PipelineStats {
    capture_callbacks: AtomicU64,
    render_callbacks: AtomicU64,
    underrun_frames: AtomicU64,
    truncated_samples: AtomicU64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            capture_callbacks: self.capture_callbacks.load(Ordering::Relaxed),
            render_callbacks: self.render_callbacks.load(Ordering::Relaxed),
            underrun_frames: self.underrun_frames.load(Ordering::Relaxed),
            truncated_samples: self.truncated_samples.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub capture_callbacks: u64,
    pub render_callbacks: u64,
    /// Output frames rendered without captured audio behind them
    pub underrun_frames: u64,
    /// Captured samples dropped because the shared buffer was full
    pub truncated_samples: u64,
}

/// Capture callback body: copies the input into the shared buffer
pub struct CaptureSide {
    buffer: SharedBuffer,
    stats: Arc<PipelineStats>,
}

impl CaptureSide {
    #[inline]
    pub fn process(&self, input: &[f32]) {
        let copied = self.buffer.write(input);
        self.stats.capture_callbacks.fetch_add(1, Ordering::Relaxed);
        if copied < input.len() {
            self.stats
                .truncated_samples
                .fetch_add((input.len() - copied) as u64, Ordering::Relaxed);
        }
    }
}

/// Render callback body: captured audio plus ultrasonic tone, clipped
pub struct RenderSide {
    buffer: SharedBuffer,
    oscillator: Oscillator,
    config: MixConfig,
    input_channels: usize,
    output_channels: usize,
    stats: Arc<PipelineStats>,
}

impl RenderSide {
    /// Fill one interleaved output buffer.
    ///
    /// Output frame `k`, channel `c` takes input frame `k`, channel
    /// `c % input_channels`. Anything the capture side has not supplied this
    /// cycle is silence, leaving only the tone for that frame. The oscillator
    /// steps once per frame.
    #[inline]
    pub fn process(&mut self, output: &mut [f32]) {
        let cycle = self.buffer.read_cycle();
        let gain = self.config.ultrasonic_gain();
        let clip = self.config.clip_mode();
        let mut underruns = 0u64;

        for (frame_index, frame) in output.chunks_mut(self.output_channels).enumerate() {
            let tone = self.oscillator.next_sample();
            let input_frame = frame_index * self.input_channels;
            let mut starved = false;

            for (channel, out) in frame.iter_mut().enumerate() {
                let index = input_frame + channel % self.input_channels;
                let captured = cycle.get(index).unwrap_or_else(|| {
                    starved = true;
                    0.0
                });
                *out = clip.apply(mix_sample(captured, tone, gain));
            }

            if starved {
                underruns += 1;
            }
        }

        self.stats.render_callbacks.fetch_add(1, Ordering::Relaxed);
        if underruns > 0 {
            self.stats
                .underrun_frames
                .fetch_add(underruns, Ordering::Relaxed);
        }
    }
}

/// Build both halves of a duplex pipeline around one shared buffer.
///
/// `max_frames` bounds the largest callback either side will see; the buffer
/// holds that many frames at the wider of the two channel layouts.
pub fn duplex_pipeline(
    spec: &SignalSpec,
    config: MixConfig,
    input_channels: u16,
    output_channels: u16,
    max_frames: usize,
) -> (CaptureSide, RenderSide, Arc<PipelineStats>) {
    let buffer = create_shared_buffer(required_capacity(
        max_frames,
        input_channels,
        output_channels,
    ));
    let stats = Arc::new(PipelineStats::default());

    let capture = CaptureSide {
        buffer: buffer.clone(),
        stats: stats.clone(),
    };
    let render = RenderSide {
        buffer,
        oscillator: Oscillator::new(spec),
        config,
        input_channels: input_channels.max(1) as usize,
        output_channels: output_channels.max(1) as usize,
        stats: stats.clone(),
    };

    (capture, render, stats)
}

/// Speaker-mode render body: loops a precomputed tone buffer at full scale.
///
/// The wrap is click-free only when the buffer spans a whole number of
/// cycles of every tone (see [`crate::signal::loop_is_seamless`]).
pub struct ToneLoop {
    tone: Vec<f32>,
    position: usize,
    channels: usize,
    stats: Arc<PipelineStats>,
}

impl ToneLoop {
    pub fn new(tone: Vec<f32>, channels: u16) -> Self {
        Self {
            tone,
            position: 0,
            channels: channels.max(1) as usize,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Current read position in the tone buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Fill one interleaved output buffer, one tone sample per frame.
    #[inline]
    pub fn process(&mut self, output: &mut [f32]) {
        let len = self.tone.len();
        for frame in output.chunks_mut(self.channels) {
            let sample = if len == 0 {
                0.0
            } else {
                let sample = self.tone[self.position];
                self.position = (self.position + 1) % len;
                sample
            };
            frame.fill(sample);
        }
        self.stats.render_callbacks.fetch_add(1, Ordering::Relaxed);
    }
}
