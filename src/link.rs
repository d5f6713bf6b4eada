//! Controller link and connection management
//!
//! The engine talks to the controller through the [`PlcLink`] trait and
//! treats any non-zero result code as a failure signal; codes are never
//! interpreted beyond success/failure. The [`ConnectionManager`] owns the
//! connection state machine and runs the single reconnect loop per device.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{PlcConfig, ReconnectConfig};

/// Result code a controller link reports for a successful operation
pub const LINK_OK: i32 = 0;

/// Asynchronous controller link
///
/// `disconnect` must be idempotent: the reconnect loop calls it before every
/// connection attempt regardless of the previous link state.
#[async_trait]
pub trait PlcLink: Send {
    /// Open the link. Returns a result code, zero on success.
    async fn connect(&mut self, address: &str, rack: u16, slot: u16) -> i32;

    /// Close the link. Safe to call on a link that is already closed.
    async fn disconnect(&mut self);

    /// Read `buf.len()` bytes from a register block starting at `start`.
    /// Returns a result code, zero on success.
    async fn read_block(&mut self, db: u16, start: usize, buf: &mut [u8]) -> i32;

    /// Human-readable description of a result code.
    fn error_text(&self, code: i32) -> String;
}

/// Connection state of one controller link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Offline,
    Connecting,
    Online,
    ErrorRead,
    ErrorWrite,
}

/// Reconnect cadence
///
/// With `backoff_multiplier == 1.0` every attempt waits `interval`; larger
/// multipliers back off exponentially up to `max_delay`. Jitter spreads
/// delays by up to ±25%.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            backoff_multiplier: config.backoff_multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt (1-based). Attempt 0 is the initial
    /// wait and always uses the base interval.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let mut delay = self
            .interval
            .mul_f64(self.backoff_multiplier.powi(exponent as i32));
        if delay > self.max_delay {
            delay = self.max_delay;
        }
        if self.jitter && !delay.is_zero() {
            let jitter_range = delay.as_millis() as f64 * 0.25;
            let jitter = rand::thread_rng().gen_range(-jitter_range..jitter_range);
            let delay_ms = (delay.as_millis() as f64 + jitter).max(0.0);
            delay = Duration::from_millis(delay_ms as u64);
        }
        delay
    }
}

/// Owns the controller link, its connection state, and the reconnect loop
#[derive(Clone)]
pub struct ConnectionManager {
    link: Arc<AsyncMutex<Box<dyn PlcLink>>>,
    state: Arc<Mutex<ConnectionState>>,
    plc: PlcConfig,
    policy: ReconnectPolicy,
}

impl ConnectionManager {
    pub fn new(link: Box<dyn PlcLink>, plc: PlcConfig, policy: ReconnectPolicy) -> Self {
        Self {
            link: Arc::new(AsyncMutex::new(link)),
            state: Arc::new(Mutex::new(ConnectionState::Offline)),
            plc,
            policy,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock() = next;
    }

    /// Demote an online link after a failed block read. The reconnect loop
    /// picks the link up from here.
    pub fn mark_read_error(&self) {
        self.set_state(ConnectionState::ErrorRead);
    }

    /// Shared handle to the link, used by the poll cycle for block reads
    pub(crate) fn link(&self) -> Arc<AsyncMutex<Box<dyn PlcLink>>> {
        Arc::clone(&self.link)
    }

    /// Close the link and leave the state machine at `Offline`.
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        link.disconnect().await;
        self.set_state(ConnectionState::Offline);
    }

    async fn try_reconnect(&self) {
        self.set_state(ConnectionState::Connecting);

        let mut link = self.link.lock().await;
        link.disconnect().await;
        let code = link
            .connect(&self.plc.address, self.plc.rack, self.plc.slot)
            .await;

        if code == LINK_OK {
            info!(
                address = %self.plc.address,
                rack = self.plc.rack,
                slot = self.plc.slot,
                "controller link established"
            );
            self.set_state(ConnectionState::Online);
        } else {
            warn!(
                address = %self.plc.address,
                code,
                "connect attempt failed: {}",
                link.error_text(code)
            );
            self.set_state(ConnectionState::Offline);
        }
    }

    /// Spawn the reconnect loop. Only this task moves a disconnected link
    /// toward `Online`; it runs as a single instance per device until the
    /// token is cancelled.
    pub fn spawn_reconnect_loop(&self, token: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut attempt: u32 = 0;
            loop {
                let delay = manager.policy.delay_for(attempt);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {},
                }

                if manager.state() == ConnectionState::Online {
                    attempt = 0;
                    continue;
                }

                attempt = attempt.saturating_add(1);
                debug!(attempt, "controller link not online, reconnecting");
                manager.try_reconnect().await;
                if manager.state() == ConnectionState::Online {
                    attempt = 0;
                }
            }
            debug!("reconnect loop stopped");
        })
    }
}
