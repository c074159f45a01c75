//! Audio device enumeration and lookup
//!
//! Every call goes back to the host: devices come and go (a loopback
//! driver may appear right after provisioning), so nothing is cached.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::DeviceError;

/// Read-only snapshot of an audio endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    /// Channels of the default configuration (0 if unknown)
    pub channel_count: u16,
    /// Sample rate of the default configuration in Hz (0.0 if unknown)
    pub native_sample_rate: f64,
}

/// Live view of the platform's audio endpoints
pub struct DeviceRegistry {
    host: cpal::Host,
}

impl DeviceRegistry {
    /// Registry over the platform's default host
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// List all input and output endpoints, merging duplex devices by name.
    pub fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        let mut devices: Vec<DeviceDescriptor> = Vec::new();

        let inputs = self
            .host
            .input_devices()
            .map_err(|e| DeviceError::Enumeration(e.to_string()))?;
        for device in inputs {
            if let Ok(name) = device.name() {
                let (channel_count, native_sample_rate) = default_config(&device, true);
                devices.push(DeviceDescriptor {
                    name,
                    is_input: true,
                    is_output: false,
                    channel_count,
                    native_sample_rate,
                });
            }
        }

        let outputs = self
            .host
            .output_devices()
            .map_err(|e| DeviceError::Enumeration(e.to_string()))?;
        for device in outputs {
            if let Ok(name) = device.name() {
                let (channel_count, native_sample_rate) = default_config(&device, false);

                if let Some(existing) = devices.iter_mut().find(|d| d.name == name) {
                    existing.is_output = true;
                    existing.channel_count = existing.channel_count.max(channel_count);
                    if existing.native_sample_rate == 0.0 {
                        existing.native_sample_rate = native_sample_rate;
                    }
                } else {
                    devices.push(DeviceDescriptor {
                        name,
                        is_input: false,
                        is_output: true,
                        channel_count,
                        native_sample_rate,
                    });
                }
            }
        }

        Ok(devices)
    }

    /// Find a device by exact, case-sensitive name.
    pub fn find_by_name(&self, name: &str) -> Result<DeviceDescriptor, DeviceError> {
        find_descriptor(&self.list_devices()?, name)
    }

    /// Whether a device with this exact name is currently enumerable.
    pub fn is_present(&self, name: &str) -> bool {
        self.find_by_name(name).is_ok()
    }

    /// The host's default output endpoint
    pub fn default_output_device(&self) -> Result<DeviceDescriptor, DeviceError> {
        let device = self
            .host
            .default_output_device()
            .ok_or(DeviceError::NoDefaultOutput)?;
        let name = device
            .name()
            .map_err(|e| DeviceError::Enumeration(e.to_string()))?;
        let (channel_count, native_sample_rate) = default_config(&device, false);

        Ok(DeviceDescriptor {
            name,
            is_input: false,
            is_output: true,
            channel_count,
            native_sample_rate,
        })
    }

    /// Resolve a capture endpoint for opening a stream
    pub(crate) fn input_device(&self, name: &str) -> Result<cpal::Device, DeviceError> {
        let devices = self
            .host
            .input_devices()
            .map_err(|e| DeviceError::Enumeration(e.to_string()))?;

        devices
            .into_iter()
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))
    }

    /// Resolve a render endpoint, the default one when `name` is `None`
    pub(crate) fn output_device(&self, name: Option<&str>) -> Result<cpal::Device, DeviceError> {
        let Some(name) = name else {
            return self
                .host
                .default_output_device()
                .ok_or(DeviceError::NoDefaultOutput);
        };

        let devices = self
            .host
            .output_devices()
            .map_err(|e| DeviceError::Enumeration(e.to_string()))?;

        devices
            .into_iter()
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Exact, case-sensitive lookup in an already enumerated list
pub fn find_descriptor(
    devices: &[DeviceDescriptor],
    name: &str,
) -> Result<DeviceDescriptor, DeviceError> {
    devices
        .iter()
        .find(|d| d.name == name)
        .cloned()
        .ok_or_else(|| DeviceError::NotFound(name.to_string()))
}

/// Channels and sample rate of a device's default configuration
fn default_config(device: &cpal::Device, is_input: bool) -> (u16, f64) {
    let config = if is_input {
        device.default_input_config()
    } else {
        device.default_output_config()
    };

    match config {
        Ok(config) => (config.channels(), config.sample_rate().0 as f64),
        Err(e) => {
            tracing::debug!("No default config for device: {}", e);
            (0, 0.0)
        }
    }
}
