//! Application configuration
//!
//! Loaded from `config.toml` in the platform config directory. Every field
//! has a default, so a partial file (or none at all) is fine; command-line
//! flags override whatever was loaded.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::mixer::{ClipMode, MixConfig};
use crate::constants::*;
use crate::error::{Error, Result};
use crate::signal::SignalSpec;

/// URL of the macOS loopback driver package
pub const BLACKHOLE_PACKAGE_URL: &str =
    "https://github.com/ExistentialAudio/BlackHole/releases/download/v0.6.0/BlackHole-2ch.v0.6.0.pkg";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub signal: SignalConfig,
    pub mix: MixSettings,
    pub devices: DeviceConfig,
    pub provisioning: ProvisioningConfig,
}

/// Tone set for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Base frequency in Hz
    pub frequency: f64,
    /// Number of stacked tones
    pub tone_count: usize,
    /// Spacing between stacked tones in Hz
    pub spread_hz: f64,
    /// Length of the looped speaker-mode buffer in seconds
    pub loop_seconds: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            tone_count: DEFAULT_TONE_COUNT,
            spread_hz: DEFAULT_SPREAD_HZ,
            loop_seconds: DEFAULT_LOOP_SECONDS,
        }
    }
}

/// Duplex mixing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixSettings {
    /// Tone level mixed into captured audio (0.0-1.0)
    pub ultrasonic_gain: f32,
    pub clip_mode: ClipMode,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            ultrasonic_gain: DEFAULT_ULTRASONIC_GAIN,
            clip_mode: ClipMode::Soft,
        }
    }
}

/// Device selection and stream shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Output device name (host default when unset)
    pub output: Option<String>,
    /// Loopback capture device name (platform default when unset)
    pub loopback: Option<String>,
    /// Output channel count (device default when unset)
    pub channels: Option<u16>,
    /// Fixed callback size in frames (driver default when unset)
    pub buffer_frames: Option<u32>,
}

/// Loopback driver provisioning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Install the loopback driver when it is missing
    pub auto_install: bool,
    /// How long to wait for a new device to enumerate
    pub settle_timeout_ms: u64,
    /// Poll interval while waiting
    pub settle_interval_ms: u64,
    /// Installer package location (macOS)
    pub package_url: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            auto_install: true,
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
            settle_interval_ms: DEFAULT_SETTLE_INTERVAL_MS,
            package_url: BLACKHOLE_PACKAGE_URL.to_string(),
        }
    }
}

impl AppConfig {
    /// Default location of the config file
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ultrajam").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the default location, falling back to defaults if absent
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Write to an explicit path, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Tone set at the stream's sample rate
    pub fn signal_spec(&self, sample_rate: u32) -> SignalSpec {
        SignalSpec::multi_tone(
            self.signal.frequency,
            sample_rate,
            self.signal.tone_count,
            self.signal.spread_hz,
        )
    }

    pub fn mix_config(&self) -> MixConfig {
        MixConfig::new(self.mix.ultrasonic_gain, self.mix.clip_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.signal.frequency, 23000.0);
        assert_eq!(config.signal.tone_count, 3);
        assert_eq!(config.mix.clip_mode, ClipMode::Soft);
        assert!(config.provisioning.auto_install);
        assert!(config.devices.output.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [signal]
            frequency = 25000.0

            [mix]
            clip_mode = "hard"

            [devices]
            loopback = "BlackHole 2ch"
            "#,
        )
        .unwrap();

        assert_eq!(config.signal.frequency, 25000.0);
        assert_eq!(config.signal.spread_hz, DEFAULT_SPREAD_HZ);
        assert_eq!(config.mix.clip_mode, ClipMode::Hard);
        assert_eq!(config.mix.ultrasonic_gain, DEFAULT_ULTRASONIC_GAIN);
        assert_eq!(config.devices.loopback.as_deref(), Some("BlackHole 2ch"));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = AppConfig::from_toml("[mix]\nclip_mode = \"fuzz\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("ultrajam-config-{}", std::process::id()))
            .join("config.toml");

        let mut config = AppConfig::default();
        config.devices.buffer_frames = Some(256);
        config.mix.ultrasonic_gain = 0.3;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_runtime_types() {
        let config = AppConfig::default();
        let spec = config.signal_spec(48000);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.resolved_frequencies(), vec![23000.0, 23300.0, 23600.0]);
        assert_eq!(config.mix_config().ultrasonic_gain(), 0.5);
    }
}
