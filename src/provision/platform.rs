//! Per-platform loopback drivers
//!
//! - macOS: BlackHole, installed from its `.pkg` with the system installer
//! - Linux: a PulseAudio/PipeWire null sink, captured through its monitor
//! - Windows: VB-Audio Virtual Cable, which must be installed by hand

use std::path::PathBuf;
use std::process::Command as StdCommand;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::audio::device::DeviceRegistry;
use crate::config::ProvisioningConfig;
use crate::error::ProvisionError;
use crate::provision::LoopbackDriver;

/// BlackHole virtual audio driver (macOS)
#[derive(Debug, Clone)]
pub struct BlackHoleDriver {
    device_name: String,
    driver_path: PathBuf,
    package_url: String,
    download_path: PathBuf,
}

impl BlackHoleDriver {
    pub const DEVICE_NAME: &'static str = "BlackHole 2ch";
    pub const DRIVER_PATH: &'static str = "/Library/Audio/Plug-Ins/HAL/BlackHole.driver";

    pub fn new(package_url: impl Into<String>) -> Self {
        Self {
            device_name: Self::DEVICE_NAME.to_string(),
            driver_path: PathBuf::from(Self::DRIVER_PATH),
            package_url: package_url.into(),
            download_path: std::env::temp_dir().join("BlackHole.pkg"),
        }
    }

    /// Look for the driver bundle somewhere else (tests, custom installs)
    pub fn with_driver_path(mut self, driver_path: impl Into<PathBuf>) -> Self {
        self.driver_path = driver_path.into();
        self
    }

    pub fn with_download_path(mut self, download_path: impl Into<PathBuf>) -> Self {
        self.download_path = download_path.into();
        self
    }

    async fn download(&self) -> Result<(), ProvisionError> {
        info!("Downloading loopback driver from {}", self.package_url);

        let response = reqwest::get(&self.package_url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProvisionError::Download(e.to_string()))?;
        let package = response
            .bytes()
            .await
            .map_err(|e| ProvisionError::Download(e.to_string()))?;

        tokio::fs::write(&self.download_path, &package)
            .await
            .map_err(ProvisionError::Write)?;
        debug!(
            "Saved {} bytes to {}",
            package.len(),
            self.download_path.display()
        );
        Ok(())
    }

    async fn run_installer(&self) -> Result<(), ProvisionError> {
        warn!(
            "Installing the '{}' driver requires your administrator password",
            self.device_name
        );

        let status = Command::new("sudo")
            .arg("installer")
            .arg("-pkg")
            .arg(&self.download_path)
            .args(["-target", "/"])
            .status()
            .await
            .map_err(|e| ProvisionError::Installer(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(ProvisionError::Installer(format!(
                "installer exited with {}; install BlackHole manually from https://existential.audio/blackhole/",
                status
            )))
        }
    }
}

impl LoopbackDriver for BlackHoleDriver {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn is_present(&self) -> bool {
        self.driver_path.exists()
    }

    async fn install(&self) -> Result<(), ProvisionError> {
        self.download().await?;
        let result = self.run_installer().await;

        if let Err(e) = tokio::fs::remove_file(&self.download_path).await {
            warn!(
                "Failed to remove {}: {}",
                self.download_path.display(),
                e
            );
        }
        result
    }
}

/// PulseAudio/PipeWire null sink (Linux)
///
/// Applications play into the sink; its `.monitor` source is the capture
/// endpoint.
#[derive(Debug, Clone)]
pub struct NullSinkDriver {
    sink_name: String,
    monitor_name: String,
}

impl NullSinkDriver {
    pub const SINK_NAME: &'static str = "ultrajam_sink";

    pub fn new(sink_name: impl Into<String>) -> Self {
        let sink_name = sink_name.into();
        let monitor_name = format!("{}.monitor", sink_name);
        Self {
            sink_name,
            monitor_name,
        }
    }

    pub fn sink_name(&self) -> &str {
        &self.sink_name
    }

    /// `pactl list sinks short` prints one sink per line, name in column 2
    fn listed_in(&self, listing: &str) -> bool {
        listing
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .any(|name| name == self.sink_name)
    }
}

impl Default for NullSinkDriver {
    fn default() -> Self {
        Self::new(Self::SINK_NAME)
    }
}

impl LoopbackDriver for NullSinkDriver {
    fn device_name(&self) -> &str {
        &self.monitor_name
    }

    fn is_present(&self) -> bool {
        StdCommand::new("pactl")
            .args(["list", "sinks", "short"])
            .output()
            .map(|o| o.status.success() && self.listed_in(&String::from_utf8_lossy(&o.stdout)))
            .unwrap_or(false)
    }

    async fn install(&self) -> Result<(), ProvisionError> {
        info!("Creating null sink '{}'", self.sink_name);

        let output = Command::new("pactl")
            .arg("load-module")
            .arg("module-null-sink")
            .arg(format!("sink_name={}", self.sink_name))
            .arg("sink_properties=device.description=Ultrajam_Loopback")
            .output()
            .await
            .map_err(|e| {
                ProvisionError::Unsupported(format!(
                    "pactl unavailable ({}); install PulseAudio or PipeWire's pulse layer",
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(ProvisionError::Installer(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        info!(
            "Null sink ready; route call audio to '{}' in your sound settings",
            self.sink_name
        );
        Ok(())
    }
}

/// VB-Audio Virtual Cable (Windows)
#[derive(Debug, Clone)]
pub struct VbCableDriver {
    device_name: String,
}

impl VbCableDriver {
    pub const DEVICE_NAME: &'static str = "CABLE Output (VB-Audio Virtual Cable)";

    pub fn new() -> Self {
        Self {
            device_name: Self::DEVICE_NAME.to_string(),
        }
    }
}

impl Default for VbCableDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackDriver for VbCableDriver {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn is_present(&self) -> bool {
        DeviceRegistry::new().is_present(&self.device_name)
    }

    async fn install(&self) -> Result<(), ProvisionError> {
        Err(ProvisionError::Unsupported(
            "install VB-Audio Virtual Cable from https://vb-audio.com/Cable/, \
             set 'CABLE Input' as the default playback device, then retry"
                .to_string(),
        ))
    }
}

#[cfg(target_os = "macos")]
pub type PlatformDriver = BlackHoleDriver;

#[cfg(target_os = "windows")]
pub type PlatformDriver = VbCableDriver;

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub type PlatformDriver = NullSinkDriver;

/// The loopback driver for the current platform
#[cfg(target_os = "macos")]
pub fn default_driver(config: &ProvisioningConfig) -> PlatformDriver {
    BlackHoleDriver::new(config.package_url.clone())
}

/// The loopback driver for the current platform
#[cfg(target_os = "windows")]
pub fn default_driver(_config: &ProvisioningConfig) -> PlatformDriver {
    VbCableDriver::new()
}

/// The loopback driver for the current platform
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub fn default_driver(_config: &ProvisioningConfig) -> PlatformDriver {
    NullSinkDriver::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::{ProvisionState, ProvisioningGate};

    #[test]
    fn test_blackhole_presence_follows_driver_path() {
        let dir = std::env::temp_dir().join(format!("ultrajam-hal-{}", std::process::id()));
        let bundle = dir.join("BlackHole.driver");
        let driver = BlackHoleDriver::new("http://127.0.0.1:9/BlackHole.pkg")
            .with_driver_path(&bundle);

        assert!(!driver.is_present());
        std::fs::create_dir_all(&bundle).unwrap();
        assert!(driver.is_present());
        assert_eq!(driver.device_name(), "BlackHole 2ch");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_blackhole_already_present_performs_no_download() {
        let dir = std::env::temp_dir().join(format!("ultrajam-present-{}", std::process::id()));
        let bundle = dir.join("BlackHole.driver");
        std::fs::create_dir_all(&bundle).unwrap();

        // Unroutable URL: any download attempt would fail the call
        let driver = BlackHoleDriver::new("http://127.0.0.1:9/BlackHole.pkg")
            .with_driver_path(&bundle)
            .with_download_path(dir.join("BlackHole.pkg"));
        let gate = ProvisioningGate::new(driver);

        gate.ensure_present().await.unwrap();
        assert_eq!(gate.state(), ProvisionState::Present);
        assert!(!dir.join("BlackHole.pkg").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_blackhole_download_failure_fails_gate() {
        let dir = std::env::temp_dir().join(format!("ultrajam-absent-{}", std::process::id()));
        let driver = BlackHoleDriver::new("http://127.0.0.1:9/BlackHole.pkg")
            .with_driver_path(dir.join("BlackHole.driver"))
            .with_download_path(dir.join("BlackHole.pkg"));
        let gate = ProvisioningGate::new(driver);

        let err = gate.ensure_present().await.unwrap_err();
        assert!(matches!(err, ProvisionError::Download(_)));
        assert!(matches!(gate.state(), ProvisionState::Failed(_)));
    }

    #[test]
    fn test_null_sink_listing_parse() {
        let driver = NullSinkDriver::default();
        let listing = "0\talsa_output.pci-0000_00_1f.3.analog-stereo\tmodule-alsa-card.c\ts16le 2ch 44100Hz\tSUSPENDED\n\
                       1\tultrajam_sink\tmodule-null-sink.c\tfloat32le 2ch 48000Hz\tIDLE\n";
        assert!(driver.listed_in(listing));

        let other = NullSinkDriver::new("ultrajam");
        assert!(!other.listed_in(listing));
        assert_eq!(driver.device_name(), "ultrajam_sink.monitor");
    }

    #[tokio::test]
    async fn test_vb_cable_install_is_unsupported() {
        let driver = VbCableDriver::new();
        assert!(matches!(
            driver.install().await,
            Err(ProvisionError::Unsupported(_))
        ));
    }
}
