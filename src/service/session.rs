//! Per-connection session state.

use crate::error::{Result, WireError};
use crate::protocol::Protocol;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

/// Identifier for one connection, unique within its manager for the
/// manager's lifetime. Ids are never reused, even after the connection
/// closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection lifecycle state. Transitions only move forward; a closed
/// connection never reopens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    /// Outbound connect in flight. Server-side connections skip this.
    Connecting = 0,
    /// Live and exchanging frames.
    Connected = 1,
    /// Teardown started, hooks still running.
    Closing = 2,
    /// Fully torn down.
    Closed = 3,
}

impl LinkState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LinkState::Connecting,
            1 => LinkState::Connected,
            2 => LinkState::Closing,
            _ => LinkState::Closed,
        }
    }
}

/// Handle to a live connection.
///
/// A `Session` is created when the connection is established and handed to
/// every hook and consumer for that connection. It can queue outbound
/// messages, report liveness, and request close from any task. All methods
/// take `&self`; the session is designed to be shared as `Arc<Session>`.
pub struct Session {
    id: ConnId,
    peer: SocketAddr,
    state: AtomicU8,
    closed: AtomicBool,
    // Milliseconds since `created_at`; zero means no heartbeat seen yet.
    last_heartbeat: AtomicU64,
    outbound: UnboundedSender<Box<dyn Protocol>>,
    shutdown: Notify,
    fault: Mutex<Option<WireError>>,
    created_at: Instant,
}

impl Session {
    pub(crate) fn new(
        id: ConnId,
        peer: SocketAddr,
        initial: LinkState,
    ) -> (Arc<Self>, UnboundedReceiver<Box<dyn Protocol>>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id,
            peer,
            state: AtomicU8::new(initial as u8),
            closed: AtomicBool::new(false),
            last_heartbeat: AtomicU64::new(0),
            outbound,
            shutdown: Notify::new(),
            fault: Mutex::new(None),
            created_at: Instant::now(),
        });
        (session, outbound_rx)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Advance the lifecycle state. Regressions are ignored, so the state
    /// only ever moves toward [`LinkState::Closed`].
    pub(crate) fn advance_state(&self, to: LinkState) {
        self.state.fetch_max(to as u8, Ordering::SeqCst);
    }

    /// Whether close has been requested or completed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queue a message for transmission.
    ///
    /// Messages queue in call order and are written by the connection's
    /// writer. Fails with [`WireError::ConnectionClosed`] once close has
    /// been requested.
    pub fn send(&self, msg: impl Protocol) -> Result<()> {
        self.send_boxed(Box::new(msg))
    }

    /// Queue an already boxed message for transmission.
    pub fn send_boxed(&self, msg: Box<dyn Protocol>) -> Result<()> {
        if self.is_closed() {
            return Err(WireError::ConnectionClosed);
        }
        self.outbound
            .send(msg)
            .map_err(|_| WireError::ConnectionClosed)
    }

    /// Request close. Idempotent; the first call wins and later calls do
    /// nothing. Teardown itself happens on the connection's driver task.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.advance_state(LinkState::Closing);
            self.shutdown.notify_one();
        }
    }

    /// Close abnormally, recording `err` as the reason if no earlier close
    /// already won.
    pub(crate) fn abort(&self, err: WireError) {
        if self.is_closed() {
            return;
        }
        if let Ok(mut fault) = self.fault.lock() {
            if fault.is_none() {
                *fault = Some(err);
            }
        }
        self.close();
    }

    pub(crate) fn take_fault(&self) -> Option<WireError> {
        self.fault.lock().ok().and_then(|mut fault| fault.take())
    }

    /// Resolves once close has been requested. A close that happened before
    /// the call resolves immediately.
    pub(crate) async fn wait_close(&self) {
        self.shutdown.notified().await;
    }

    /// Record heartbeat receipt at the current instant.
    pub fn touch_heartbeat(&self) {
        let elapsed = self.created_at.elapsed().as_millis() as u64;
        self.last_heartbeat.store(elapsed, Ordering::SeqCst);
    }

    /// Time since the last heartbeat receipt, counted from session creation
    /// when none has arrived yet.
    pub fn heartbeat_idle(&self) -> Duration {
        let now = self.created_at.elapsed().as_millis() as u64;
        let last = self.last_heartbeat.load(Ordering::SeqCst);
        Duration::from_millis(now.saturating_sub(last))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}
