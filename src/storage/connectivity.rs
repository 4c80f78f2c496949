//! Database connectivity tracking.
//!
//! The service layer asks a [`ConnectivityGate`] on every call whether the
//! database can be used. [`ConnectionState`] is the production gate: a
//! [`ConnectionMonitor`] task probes the database periodically and the
//! PostgreSQL store reports dropped connections as they happen.
//!
//! # Ready States
//!
//! ```text
//! +--------------+   probe ok    +-----------+
//! | Disconnected | ------------> | Connected |
//! +--------------+ <------------ +-----------+
//!        ^         probe failed        |
//!        |         or query found      |
//!        |         connection closed   | shutdown
//!        |                             v
//!        |                     +---------------+
//!        +-------------------- | Disconnecting |
//!                              +---------------+
//! ```
//!
//! `Connecting` is only held before the first probe completes.

use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Decides whether the persistent store should serve the next call.
///
/// Implementations must be cheap and free of side effects: the service
/// calls `is_connected` once per operation.
pub trait ConnectivityGate: Send + Sync + fmt::Debug {
    /// Returns true if the persistent store is usable right now.
    fn is_connected(&self) -> bool;
}

/// Readiness of the database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    /// No usable connection.
    Disconnected = 0,
    /// Probed successfully and schema is in place.
    Connected = 1,
    /// First probe has not finished yet.
    Connecting = 2,
    /// The process is shutting down.
    Disconnecting = 3,
}

impl ReadyState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connected,
            2 => Self::Connecting,
            3 => Self::Disconnecting,
            _ => Self::Disconnected,
        }
    }

    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Connecting => "connecting",
            Self::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared readiness of the database connection.
#[derive(Debug)]
pub struct ConnectionState {
    state: AtomicU8,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    /// Creates a state that starts out disconnected.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ReadyState::Disconnected as u8),
        }
    }

    /// Returns the current ready state.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves to `next` and returns the previous state.
    ///
    /// Each actual change is logged once.
    pub fn transition(&self, next: ReadyState) -> ReadyState {
        let previous = ReadyState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));
        if previous == next {
            return previous;
        }

        match (previous, next) {
            (_, ReadyState::Connected) => {
                tracing::info!(from = %previous, "Database connected; serving from persistent store");
            },
            (ReadyState::Connected, ReadyState::Disconnected) => {
                tracing::warn!("Database connection lost; serving from in-memory store");
            },
            _ => {
                tracing::debug!(from = %previous, to = %next, "Database ready state changed");
            },
        }
        metrics::gauge!("database_ready_state").set(f64::from(next as u8));

        previous
    }

    /// Marks the connection usable.
    pub fn mark_connected(&self) -> ReadyState {
        self.transition(ReadyState::Connected)
    }

    /// Marks the connection unusable.
    pub fn mark_disconnected(&self) -> ReadyState {
        self.transition(ReadyState::Disconnected)
    }
}

impl ConnectivityGate for ConnectionState {
    fn is_connected(&self) -> bool {
        self.ready_state() == ReadyState::Connected
    }
}

/// Gate whose answer is set by hand.
///
/// Used when no database is configured (always `false`) and in tests.
#[derive(Debug, Default)]
pub struct ManualGate {
    connected: AtomicBool,
}

impl ManualGate {
    /// Creates a gate with the given initial answer.
    #[must_use]
    pub const fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
        }
    }

    /// Changes the answer for subsequent calls.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

impl ConnectivityGate for ManualGate {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// A cheap liveness check against the database.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Succeeds if the database answered and is ready for queries.
    async fn probe(&self) -> Result<()>;
}

/// Probe cadence configuration.
#[derive(Debug, Clone)]
pub struct ConnectionMonitorConfig {
    /// Delay between probes.
    pub interval: Duration,
}

impl Default for ConnectionMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

impl ConnectionMonitorConfig {
    /// Sets the probe interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Background task keeping a [`ConnectionState`] current.
pub struct ConnectionMonitor;

impl ConnectionMonitor {
    /// Probes once and records the outcome.
    ///
    /// Returns true if the database is connected afterwards.
    pub async fn check_once(probe: &dyn HealthProbe, state: &ConnectionState) -> bool {
        match probe.probe().await {
            Ok(()) => {
                state.mark_connected();
                true
            },
            Err(e) => {
                let previous = state.mark_disconnected();
                if previous == ReadyState::Connected {
                    tracing::warn!(error = %e, "Database probe failed");
                } else {
                    tracing::debug!(error = %e, "Database still unreachable");
                }
                false
            },
        }
    }

    /// Spawns the probe loop.
    ///
    /// The loop runs until `shutdown` flips to `true` or its sender is
    /// dropped, then leaves the state `Disconnected`.
    pub fn spawn(
        probe: Arc<dyn HealthProbe>,
        state: Arc<ConnectionState>,
        config: ConnectionMonitorConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            if state.ready_state() == ReadyState::Disconnected {
                state.transition(ReadyState::Connecting);
            }

            loop {
                Self::check_once(probe.as_ref(), &state).await;

                tokio::select! {
                    () = tokio::time::sleep(config.interval) => {},
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    },
                }
            }

            state.transition(ReadyState::Disconnecting);
            state.mark_disconnected();
            tracing::debug!("Connection monitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[derive(Default)]
    struct FlakyProbe {
        up: AtomicBool,
    }

    #[async_trait]
    impl HealthProbe for FlakyProbe {
        async fn probe(&self) -> Result<()> {
            if self.up.load(Ordering::Acquire) {
                Ok(())
            } else {
                Err(Error::store("probe", "connection refused"))
            }
        }
    }

    #[test]
    fn test_state_starts_disconnected() {
        let state = ConnectionState::new();
        assert_eq!(state.ready_state(), ReadyState::Disconnected);
        assert!(!state.is_connected());
    }

    #[test]
    fn test_only_connected_opens_gate() {
        let state = ConnectionState::new();
        for next in [
            ReadyState::Connecting,
            ReadyState::Disconnecting,
            ReadyState::Disconnected,
        ] {
            state.transition(next);
            assert!(!state.is_connected(), "{next} must not open the gate");
        }
        state.mark_connected();
        assert!(state.is_connected());
    }

    #[test]
    fn test_transition_returns_previous() {
        let state = ConnectionState::new();
        assert_eq!(state.mark_connected(), ReadyState::Disconnected);
        assert_eq!(state.mark_connected(), ReadyState::Connected);
        assert_eq!(state.mark_disconnected(), ReadyState::Connected);
    }

    #[test]
    fn test_manual_gate() {
        let gate = ManualGate::new(false);
        assert!(!gate.is_connected());
        gate.set_connected(true);
        assert!(gate.is_connected());
    }

    #[test]
    fn test_monitor_config_builder() {
        let config = ConnectionMonitorConfig::default().with_interval(Duration::from_millis(250));
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(
            ConnectionMonitorConfig::default().interval,
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn test_check_once_follows_probe() {
        let probe = FlakyProbe::default();
        let state = ConnectionState::new();

        assert!(!ConnectionMonitor::check_once(&probe, &state).await);
        assert!(!state.is_connected());

        probe.up.store(true, Ordering::Release);
        assert!(ConnectionMonitor::check_once(&probe, &state).await);
        assert!(state.is_connected());

        probe.up.store(false, Ordering::Release);
        assert!(!ConnectionMonitor::check_once(&probe, &state).await);
        assert!(!state.is_connected());
    }

    #[tokio::test]
    async fn test_monitor_stops_on_shutdown() {
        let probe = Arc::new(FlakyProbe::default());
        probe.up.store(true, Ordering::Release);
        let state = Arc::new(ConnectionState::new());
        let (tx, rx) = watch::channel(false);

        let handle = ConnectionMonitor::spawn(
            probe,
            Arc::clone(&state),
            ConnectionMonitorConfig::default().with_interval(Duration::from_millis(10)),
            rx,
        );

        for _ in 0..100 {
            if state.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(state.is_connected());

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(state.ready_state(), ReadyState::Disconnected);
    }
}
