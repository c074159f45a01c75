//! Stream ownership for speaker and duplex sessions
//!
//! cpal streams are built, started and torn down on one dedicated host
//! thread per session. The callbacks themselves run on driver threads and
//! only touch the state moved into them.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::audio::device::DeviceRegistry;
use crate::audio::mixer::{duplex_pipeline, PipelineStats, StatsSnapshot, ToneLoop};
use crate::config::{AppConfig, DeviceConfig};
use crate::constants::{ERROR_CHANNEL_CAPACITY, MAX_CALLBACK_FRAMES};
use crate::error::{DeviceError, Error, StreamError};
use crate::lifecycle::ActiveSession;
use crate::signal::synthesize;

/// Which pipeline a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Looped tone straight to the output device
    Speaker,
    /// Loopback capture mixed with the tone
    Duplex,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Speaker => write!(f, "speaker"),
            SessionMode::Duplex => write!(f, "duplex"),
        }
    }
}

/// Streams in teardown order, labelled for logging
type StreamSet = Vec<(&'static str, cpal::Stream)>;

/// A running jamming session
pub struct JamSession {
    mode: SessionMode,

    /// Whether the streams are playing
    running: Arc<AtomicBool>,

    /// Dropping or sending on this releases the host thread
    shutdown_tx: Option<Sender<()>>,

    /// Stream host thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Runtime errors reported by the audio layer
    error_rx: Receiver<StreamError>,

    stats: Arc<PipelineStats>,

    sample_rate: u32,
}

impl JamSession {
    /// Start looping the configured tone on the output device.
    ///
    /// The tone plays at full scale; the mix gain only applies to duplex.
    pub fn speaker(registry: &DeviceRegistry, config: &AppConfig) -> Result<Self, Error> {
        let device = registry.output_device(config.devices.output.as_deref())?;
        let stream_config = output_stream_config(&device, &config.devices)?;
        let sample_rate = stream_config.sample_rate.0;

        let tone = speaker_tone(config, sample_rate)?;
        info!(
            "Speaker loop: {} samples at {} Hz, {} channel(s)",
            tone.len(),
            sample_rate,
            stream_config.channels
        );

        let mut tone_loop = ToneLoop::new(tone, stream_config.channels);
        let stats = tone_loop.stats();

        Self::launch(SessionMode::Speaker, sample_rate, stats, move |error_tx| {
            let output = device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        tone_loop.process(data);
                    },
                    error_callback(error_tx),
                    None,
                )
                .map_err(|e| StreamError::Open(e.to_string()))?;

            Ok(vec![("output", output)])
        })
    }

    /// Start capturing `loopback`, mixing in the tone and rendering to the
    /// output device.
    ///
    /// The capture stream is opened at the output's sample rate; a device
    /// that cannot run at that rate fails here rather than drifting later.
    pub fn duplex(
        registry: &DeviceRegistry,
        config: &AppConfig,
        loopback: &str,
    ) -> Result<Self, Error> {
        let input_device = registry.input_device(loopback)?;
        let output_device = registry.output_device(config.devices.output.as_deref())?;

        let output_config = output_stream_config(&output_device, &config.devices)?;
        let input_config =
            input_stream_config(&input_device, &config.devices, output_config.sample_rate)?;
        let sample_rate = output_config.sample_rate.0;

        let max_frames = config
            .devices
            .buffer_frames
            .map(|frames| frames as usize)
            .unwrap_or(MAX_CALLBACK_FRAMES);

        let spec = config.signal_spec(sample_rate);
        let mix = config.mix_config();
        let (capture, mut render, stats) = duplex_pipeline(
            &spec,
            mix,
            input_config.channels,
            output_config.channels,
            max_frames,
        );

        info!(
            "Duplex: '{}' ({} ch) -> output ({} ch) at {} Hz, gain {:.2}, {} clip",
            loopback,
            input_config.channels,
            output_config.channels,
            sample_rate,
            mix.ultrasonic_gain(),
            mix.clip_mode()
        );

        Self::launch(SessionMode::Duplex, sample_rate, stats, move |error_tx| {
            let input = input_device
                .build_input_stream(
                    &input_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        capture.process(data);
                    },
                    error_callback(error_tx.clone()),
                    None,
                )
                .map_err(|e| StreamError::Open(e.to_string()))?;

            let output = output_device
                .build_output_stream(
                    &output_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        render.process(data);
                    },
                    error_callback(error_tx),
                    None,
                )
                .map_err(|e| StreamError::Open(e.to_string()))?;

            Ok(vec![("input", input), ("output", output)])
        })
    }

    /// Spawn the host thread, build and start the streams there, and wait
    /// until they are playing or have failed.
    fn launch<F>(
        mode: SessionMode,
        sample_rate: u32,
        stats: Arc<PipelineStats>,
        build: F,
    ) -> Result<Self, Error>
    where
        F: FnOnce(Sender<StreamError>) -> Result<StreamSet, StreamError> + Send + 'static,
    {
        let (error_tx, error_rx) = bounded::<StreamError>(ERROR_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = bounded::<Result<(), StreamError>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let running = Arc::new(AtomicBool::new(false));
        let running_for_host = running.clone();

        let handle = thread::Builder::new()
            .name(format!("{}-streams", mode))
            .spawn(move || {
                let streams = match build(error_tx).and_then(start_streams) {
                    Ok(streams) => streams,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                running_for_host.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(()));

                // Returns on an explicit stop or when the session is dropped
                let _ = shutdown_rx.recv();

                close_streams(streams);
                running_for_host.store(false, Ordering::SeqCst);
            })
            .map_err(|e| StreamError::Thread(e.to_string()))?;

        let started = ready_rx.recv().unwrap_or_else(|_| {
            Err(StreamError::Thread(
                "stream host exited before reporting".to_string(),
            ))
        });

        if let Err(e) = started {
            let _ = handle.join();
            return Err(e.into());
        }

        info!("{} session started", mode);

        Ok(Self {
            mode,
            running,
            shutdown_tx: Some(shutdown_tx),
            thread_handle: Some(handle),
            error_rx,
            stats,
            sample_rate,
        })
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Check if the streams are playing
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sample rate the session runs at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Check for errors
    pub fn check_errors(&self) -> Option<StreamError> {
        self.error_rx.try_recv().ok()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop and close every stream, input before output.
    ///
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("{} stream host thread panicked during teardown", self.mode);
            }
            info!("{} session stopped", self.mode);
        }
    }
}

impl ActiveSession for JamSession {
    fn poll_error(&mut self) -> Option<StreamError> {
        self.check_errors()
    }

    fn stats(&self) -> StatsSnapshot {
        JamSession::stats(self)
    }

    fn stop(&mut self) {
        JamSession::stop(self);
    }
}

impl Drop for JamSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Loop buffer for speaker mode; an empty one would only ever play silence.
fn speaker_tone(config: &AppConfig, sample_rate: u32) -> Result<Vec<f32>, Error> {
    let spec = config.signal_spec(sample_rate);
    let tone = synthesize(&spec, config.signal.loop_seconds);
    if tone.is_empty() {
        return Err(Error::Config(format!(
            "empty tone buffer ({} tone(s) over {} s)",
            config.signal.tone_count, config.signal.loop_seconds
        )));
    }
    Ok(tone)
}

fn start_streams(streams: StreamSet) -> Result<StreamSet, StreamError> {
    for (label, stream) in &streams {
        stream
            .play()
            .map_err(|e| StreamError::Start(format!("{} stream: {}", label, e)))?;
        debug!("{} stream playing", label);
    }
    Ok(streams)
}

/// Pause and drop in order; failures are logged, never escalated.
fn close_streams(streams: StreamSet) {
    for (label, stream) in streams {
        if let Err(e) = stream.pause() {
            warn!("Failed to stop {} stream: {}", label, e);
        }
        drop(stream);
        debug!("{} stream closed", label);
    }
}

fn error_callback(error_tx: Sender<StreamError>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        let _ = error_tx.try_send(StreamError::Runtime(err.to_string()));
    }
}

fn buffer_size(frames: Option<u32>) -> cpal::BufferSize {
    match frames {
        Some(size) => cpal::BufferSize::Fixed(size),
        None => cpal::BufferSize::Default,
    }
}

fn output_stream_config(
    device: &cpal::Device,
    settings: &DeviceConfig,
) -> Result<StreamConfig, DeviceError> {
    let default_config = device
        .default_output_config()
        .map_err(|e| DeviceError::Config(e.to_string()))?;

    Ok(StreamConfig {
        channels: settings.channels.unwrap_or(default_config.channels()),
        sample_rate: default_config.sample_rate(),
        buffer_size: buffer_size(settings.buffer_frames),
    })
}

fn input_stream_config(
    device: &cpal::Device,
    settings: &DeviceConfig,
    sample_rate: cpal::SampleRate,
) -> Result<StreamConfig, DeviceError> {
    let default_config = device
        .default_input_config()
        .map_err(|e| DeviceError::Config(e.to_string()))?;

    Ok(StreamConfig {
        channels: default_config.channels(),
        sample_rate,
        buffer_size: buffer_size(settings.buffer_frames),
    })
}
