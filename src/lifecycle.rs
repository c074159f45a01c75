//! Shutdown signalling and the foreground driver loop
//!
//! The audio work happens on driver threads. The only application task is
//! the one parked in [`LifecycleController::run`], waiting for the
//! cancellation signal while draining stream errors.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audio::mixer::StatsSnapshot;
use crate::constants::ERROR_POLL_INTERVAL_MS;
use crate::error::StreamError;

/// Something the controller can supervise and tear down
pub trait ActiveSession {
    /// Next pending runtime error, if any
    fn poll_error(&mut self) -> Option<StreamError>;

    fn stats(&self) -> StatsSnapshot;

    /// Stop every stream; must not fail
    fn stop(&mut self);
}

/// One-shot cancellation flag shared between the interrupt handler and the
/// driver loop
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the signal. Returns `true` only for the call that set it.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal has been set
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Trigger on Ctrl-C, or SIGTERM on Unix.
    pub fn listen_for_interrupts(&self) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            wait_for_interrupt().await;
            if signal.trigger() {
                info!("Shutdown signal received, stopping...");
            }
        })
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_interrupt() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
    }
}

/// Keeps a session alive until cancellation, then tears it down
pub struct LifecycleController {
    signal: ShutdownSignal,
    poll_interval: Duration,
}

impl LifecycleController {
    pub fn new(signal: ShutdownSignal) -> Self {
        Self {
            signal,
            poll_interval: Duration::from_millis(ERROR_POLL_INTERVAL_MS),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn signal(&self) -> &ShutdownSignal {
        &self.signal
    }

    /// Drive `session` until the signal fires, then stop it.
    ///
    /// Runtime stream errors are logged; teardown always completes.
    pub async fn run<S: ActiveSession>(&self, session: &mut S) -> StatsSnapshot {
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = self.signal.cancelled() => break,
                _ = ticker.tick() => {
                    while let Some(e) = session.poll_error() {
                        warn!("Audio stream error: {}", e);
                    }
                }
            }
        }

        session.stop();
        let stats = session.stats();
        info!(
            "Session ended: {} render / {} capture callbacks, {} under-run frames, {} truncated samples",
            stats.render_callbacks,
            stats.capture_callbacks,
            stats.underrun_frames,
            stats.truncated_samples
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeSession {
        errors: VecDeque<StreamError>,
        polled: usize,
        stop_calls: usize,
    }

    impl ActiveSession for FakeSession {
        fn poll_error(&mut self) -> Option<StreamError> {
            self.polled += 1;
            self.errors.pop_front()
        }

        fn stats(&self) -> StatsSnapshot {
            StatsSnapshot {
                render_callbacks: 7,
                ..Default::default()
            }
        }

        fn stop(&mut self) {
            self.stop_calls += 1;
        }
    }

    #[test]
    fn test_trigger_is_one_shot() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());
        assert!(signal.trigger());
        assert!(!signal.trigger());
        assert!(signal.clone().is_triggered());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_trigger() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();

        // Already triggered: resolves immediately
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn test_run_stops_session_once_and_drains_errors() {
        let signal = ShutdownSignal::new();
        let controller =
            LifecycleController::new(signal.clone()).with_poll_interval(Duration::from_millis(5));

        let mut session = FakeSession {
            errors: VecDeque::from(vec![StreamError::Runtime("device unplugged".to_string())]),
            ..Default::default()
        };

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            signal.trigger();
        });

        let stats = tokio::time::timeout(Duration::from_secs(2), controller.run(&mut session))
            .await
            .expect("controller should return after cancellation");
        trigger.await.unwrap();

        assert_eq!(session.stop_calls, 1);
        assert!(session.errors.is_empty());
        assert!(session.polled >= 2);
        assert_eq!(stats.render_callbacks, 7);
    }
}
