//! Loopback device provisioning
//!
//! Duplex mode needs a virtual loopback endpoint to capture from. The
//! [`ProvisioningGate`] checks for it and installs it when missing:
//!
//! ```text
//! Absent ──▶ Installing ──▶ Present
//!                 │
//!                 └──────▶ Failed
//! ```
//!
//! A failure is returned to the caller as-is. Falling back to speaker mode
//! is the caller's decision, never the gate's, and nothing is retried.

pub mod platform;

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::audio::device::DeviceDescriptor;
use crate::error::{DeviceError, ProvisionError};

pub use platform::{default_driver, BlackHoleDriver, NullSinkDriver, PlatformDriver, VbCableDriver};

/// Platform hook for the virtual loopback device
pub trait LoopbackDriver: Send + Sync {
    /// Name the capture endpoint enumerates under once installed
    fn device_name(&self) -> &str;

    /// Whether the device is installed right now
    fn is_present(&self) -> bool;

    /// Install the device. May need network access and elevated privileges.
    fn install(&self) -> impl Future<Output = Result<(), ProvisionError>> + Send;
}

/// Where the gate is in its check-then-install workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionState {
    Absent,
    Installing,
    Present,
    /// Last install attempt failed with this message
    Failed(String),
}

/// Idempotent check-then-install guard in front of duplex mode
pub struct ProvisioningGate<D> {
    driver: D,
    state: Mutex<ProvisionState>,
}

impl<D: LoopbackDriver> ProvisioningGate<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            state: Mutex::new(ProvisionState::Absent),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn state(&self) -> ProvisionState {
        self.state.lock().clone()
    }

    /// Re-check presence without installing anything.
    pub fn refresh(&self) -> ProvisionState {
        // Check before locking: drivers may shell out
        let present = self.driver.is_present();

        let mut state = self.state.lock();
        if *state != ProvisionState::Installing {
            *state = if present {
                ProvisionState::Present
            } else {
                ProvisionState::Absent
            };
        }
        state.clone()
    }

    /// Make sure the loopback device is installed.
    ///
    /// Returns immediately when it already is. Otherwise runs the driver's
    /// installer once; a concurrent call while that is in flight fails with
    /// [`ProvisionError::InProgress`]. Dropping the returned future before it
    /// completes leaves the gate `Failed`, so a later call can try again.
    pub async fn ensure_present(&self) -> Result<(), ProvisionError> {
        {
            let mut state = self.state.lock();
            match *state {
                ProvisionState::Present => return Ok(()),
                ProvisionState::Installing => return Err(ProvisionError::InProgress),
                _ => *state = ProvisionState::Installing,
            }
        }
        let guard = InstallGuard::new(&self.state);

        if self.driver.is_present() {
            guard.finish(ProvisionState::Present);
            return Ok(());
        }

        info!("Loopback device '{}' not found, installing", self.driver.device_name());

        match self.driver.install().await {
            Ok(()) => {
                guard.finish(ProvisionState::Present);
                info!("Loopback device '{}' installed", self.driver.device_name());
                Ok(())
            }
            Err(e) => {
                warn!("Loopback installation failed: {}", e);
                guard.finish(ProvisionState::Failed(e.to_string()));
                Err(e)
            }
        }
    }
}

/// Holds the gate in `Installing`; marks it `Failed` if dropped unfinished.
struct InstallGuard<'a> {
    state: &'a Mutex<ProvisionState>,
    armed: bool,
}

impl<'a> InstallGuard<'a> {
    fn new(state: &'a Mutex<ProvisionState>) -> Self {
        Self { state, armed: true }
    }

    fn finish(mut self, outcome: ProvisionState) {
        self.armed = false;
        *self.state.lock() = outcome;
    }
}

impl Drop for InstallGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Loopback installation cancelled");
            *self.state.lock() = ProvisionState::Failed("installation cancelled".to_string());
        }
    }
}

/// Poll `lookup` until the device enumerates or `timeout` passes.
///
/// A freshly installed driver can take a moment to show up. Only
/// [`DeviceError::NotFound`] is retried; other errors return at once.
pub async fn wait_for_device<F>(
    mut lookup: F,
    timeout: Duration,
    interval: Duration,
) -> Result<DeviceDescriptor, DeviceError>
where
    F: FnMut() -> Result<DeviceDescriptor, DeviceError>,
{
    let deadline = Instant::now() + timeout;

    loop {
        match lookup() {
            Ok(device) => return Ok(device),
            Err(DeviceError::NotFound(name)) => {
                if Instant::now() >= deadline {
                    return Err(DeviceError::NotFound(name));
                }
                tokio::time::sleep(interval).await;
            }
            Err(e) => return Err(e),
        }
    }
}
