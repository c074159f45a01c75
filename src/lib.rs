//! # Ultrajam
//!
//! Real-time ultrasonic tone synthesis and duplex loopback mixing.
//!
//! ## Architecture Overview
//!
//! ```text
//! SPEAKER MODE
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ SignalSpec  │──▶│ synthesize()     │──▶│ ToneLoop         │──▶ output device
//! │ (tone set)  │   │ phase-continuous │   │ (render callback)│
//! └─────────────┘   └──────────────────┘   └──────────────────┘
//!
//! SYSTEM (DUPLEX) MODE
//! ┌────────────────┐   ┌───────────────────┐
//! │ DeviceRegistry │──▶│ ProvisioningGate  │  Absent → Installing → Present / Failed
//! └────────────────┘   └─────────┬─────────┘
//!                                │ loopback present
//!                                ▼
//! ┌──────────────────┐  write  ┌───────────────────┐  read   ┌────────────────────┐
//! │ CaptureSide      │────────▶│ SharedFrameBuffer │────────▶│ RenderSide         │
//! │ (input callback) │         │ (atomic scratch)  │         │ + Oscillator       │
//! └──────────────────┘         └───────────────────┘         │ + gain + clip      │
//!        ▲                                                   └─────────┬──────────┘
//!   loopback device                                                    ▼
//!                                                               output device
//!
//! LifecycleController waits on the ShutdownSignal, then stops input before output.
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod provision;
pub mod signal;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate used by the standalone generators
    pub const SAMPLE_RATE: u32 = 44100;

    /// Lower edge of the ultrasonic validity band in Hz
    pub const MIN_FREQ: f64 = 20_000.0;

    /// Upper edge of the ultrasonic validity band in Hz
    pub const MAX_FREQ: f64 = 30_000.0;

    /// Default base tone in Hz
    pub const DEFAULT_FREQUENCY: f64 = 23_000.0;

    /// Default number of stacked tones
    pub const DEFAULT_TONE_COUNT: usize = 3;

    /// Default tone spacing for jamming sessions in Hz
    pub const DEFAULT_SPREAD_HZ: f64 = 300.0;

    /// Tone spacing used by `generate_multi_tone` in Hz
    pub const DEFAULT_MULTI_TONE_SPREAD_HZ: f64 = 100.0;

    /// Default loop buffer length for speaker mode
    pub const DEFAULT_LOOP_SECONDS: f64 = 1.0;

    /// Default ultrasonic gain in duplex mixing
    pub const DEFAULT_ULTRASONIC_GAIN: f32 = 0.5;

    /// Largest callback size assumed when the buffer size is left to the driver (in frames)
    pub const MAX_CALLBACK_FRAMES: usize = 8192;

    /// Capacity of the stream error channel
    pub const ERROR_CHANNEL_CAPACITY: usize = 16;

    /// How long to wait for a freshly installed device to enumerate
    pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 5000;

    /// Poll interval while waiting for a device to enumerate
    pub const DEFAULT_SETTLE_INTERVAL_MS: u64 = 250;

    /// How often the driver loop drains stream errors
    pub const ERROR_POLL_INTERVAL_MS: u64 = 200;
}
