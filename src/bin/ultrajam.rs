//! Ultrajam command-line front end
//!
//! Plays an ultrasonic tone set on the speakers, or mixes it into system
//! audio captured through a loopback device.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ultrajam::{
    audio::{ClipMode, DeviceRegistry, JamSession},
    config::AppConfig,
    lifecycle::{LifecycleController, ShutdownSignal},
    provision::{default_driver, wait_for_device, LoopbackDriver, ProvisionState, ProvisioningGate},
    signal::loop_is_seamless,
};

/// Ultrasonic tone generator and loopback mixer
#[derive(Parser)]
#[command(name = "ultrajam")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Base frequency in Hz
    #[arg(short, long)]
    frequency: Option<f64>,

    /// Number of stacked tones
    #[arg(short, long)]
    tones: Option<usize>,

    /// Spacing between stacked tones in Hz
    #[arg(long)]
    spread: Option<f64>,

    /// Length of the looped speaker buffer in seconds
    #[arg(long)]
    loop_seconds: Option<f64>,

    /// Output device name (use 'devices' to list)
    #[arg(short, long)]
    output: Option<String>,

    /// Output channel count
    #[arg(long)]
    channels: Option<u16>,

    /// Fixed callback size in frames
    #[arg(short, long)]
    buffer_frames: Option<u32>,

    /// Show debug output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Loop the tone set on the output device
    Speaker,

    /// Mix the tone set into system audio captured from a loopback device
    System {
        /// Tone level in the mix (0.0-1.0)
        #[arg(short, long)]
        gain: Option<f32>,

        /// Clipping curve: hard or soft
        #[arg(long)]
        clip: Option<ClipMode>,

        /// Loopback capture device name
        #[arg(short, long)]
        loopback: Option<String>,

        /// Fail instead of installing a missing loopback driver
        #[arg(long)]
        no_install: bool,
    },

    /// List audio devices
    Devices,

    /// Install the loopback driver if it is missing, then exit
    Provision,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load().context("Failed to load config")?,
    };
    apply_overrides(&mut config, &cli);

    let registry = DeviceRegistry::new();

    match cli.command {
        Commands::Devices => list_devices(&registry)?,
        Commands::Provision => {
            let gate = ProvisioningGate::new(default_driver(&config.provisioning));
            gate.ensure_present()
                .await
                .context("Loopback provisioning failed")?;
            info!("Loopback device '{}' is present", gate.driver().device_name());
        }
        Commands::Speaker => run_speaker(&registry, &config).await?,
        Commands::System {
            gain,
            clip,
            loopback,
            no_install,
        } => {
            if let Some(gain) = gain {
                config.mix.ultrasonic_gain = gain;
            }
            if let Some(clip) = clip {
                config.mix.clip_mode = clip;
            }
            if loopback.is_some() {
                config.devices.loopback = loopback;
            }
            if no_install {
                config.provisioning.auto_install = false;
            }
            run_system(&registry, &config).await?;
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(frequency) = cli.frequency {
        config.signal.frequency = frequency;
    }
    if let Some(tones) = cli.tones {
        config.signal.tone_count = tones;
    }
    if let Some(spread) = cli.spread {
        config.signal.spread_hz = spread;
    }
    if let Some(seconds) = cli.loop_seconds {
        config.signal.loop_seconds = seconds;
    }
    if cli.output.is_some() {
        config.devices.output = cli.output.clone();
    }
    if cli.channels.is_some() {
        config.devices.channels = cli.channels;
    }
    if cli.buffer_frames.is_some() {
        config.devices.buffer_frames = cli.buffer_frames;
    }
}

/// Validation is advisory: out-of-band tones are reported, never rejected.
fn warn_about_signal(config: &AppConfig, sample_rate: u32) {
    let spec = config.signal_spec(sample_rate);
    if let Err(e) = spec.validate() {
        warn!("{}", e);
    }
    for freq in spec.aliasing_tones() {
        warn!(
            "{:.0} Hz is at or above Nyquist for {} Hz and will alias",
            freq, sample_rate
        );
    }
}

fn list_devices(registry: &DeviceRegistry) -> Result<()> {
    let devices = registry.list_devices()?;

    println!("\n=== Available Audio Devices ===");
    for device in &devices {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        println!("  {} ({})", device.name, device_type);
        println!("    Channels: {}", device.channel_count);
        println!("    Native rate: {} Hz", device.native_sample_rate);
    }
    println!();

    Ok(())
}

async fn run_speaker(registry: &DeviceRegistry, config: &AppConfig) -> Result<()> {
    let mut session =
        JamSession::speaker(registry, config).context("Failed to start speaker session")?;
    warn_about_signal(config, session.sample_rate());

    let spec = config.signal_spec(session.sample_rate());
    if !loop_is_seamless(&spec, config.signal.loop_seconds) {
        warn!(
            "Tone set does not complete whole cycles in {} s; expect a faint click per loop",
            config.signal.loop_seconds
        );
    }

    drive(&mut session).await;
    Ok(())
}

async fn run_system(registry: &DeviceRegistry, config: &AppConfig) -> Result<()> {
    let gate = ProvisioningGate::new(default_driver(&config.provisioning));

    if config.provisioning.auto_install {
        gate.ensure_present()
            .await
            .context("Loopback device is unavailable")?;
    } else if gate.refresh() != ProvisionState::Present {
        bail!(
            "Loopback device '{}' is not installed (run 'ultrajam provision')",
            gate.driver().device_name()
        );
    }

    let loopback = config
        .devices
        .loopback
        .clone()
        .unwrap_or_else(|| gate.driver().device_name().to_string());

    let device = wait_for_device(
        || registry.find_by_name(&loopback),
        Duration::from_millis(config.provisioning.settle_timeout_ms),
        Duration::from_millis(config.provisioning.settle_interval_ms),
    )
    .await
    .with_context(|| format!("Loopback device '{}' did not appear", loopback))?;
    info!(
        "Capturing from '{}' ({} ch, {} Hz native)",
        device.name, device.channel_count, device.native_sample_rate
    );

    let mut session = JamSession::duplex(registry, config, &device.name)
        .context("Failed to start duplex session")?;
    warn_about_signal(config, session.sample_rate());

    drive(&mut session).await;
    Ok(())
}

async fn drive(session: &mut JamSession) {
    let signal = ShutdownSignal::new();
    let _interrupts = signal.listen_for_interrupts();

    info!("Running {} session - press Ctrl+C to stop", session.mode());
    LifecycleController::new(signal).run(session).await;
}
