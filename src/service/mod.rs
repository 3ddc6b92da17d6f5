//! # Connection Services
//!
//! Servers, clients, sessions, and the lifecycle hooks that observe them.
//!
//! ## Architecture
//!
//! A [`Server`] or [`Client`] owns the sockets and runs one driver task per
//! live connection. Each connection is represented by a [`Session`]
//! wrapped in `Arc`, shared with user code through [`Hooks`] callbacks and
//! dispatcher consumers.
//!
//! ## Lifecycle
//!
//! Establishment runs `on_connect` then `on_add_session`; if `on_connect`
//! closes the session the connection is rejected and `on_add_session`
//! never fires. Teardown runs `on_except` (abnormal closes only), then
//! `on_del_session` exactly once per added session, then `on_close`, in
//! that order, after which the session is [`LinkState::Closed`].
//!
//! ## Example
//!
//! ```no_run
//! use sockwire::config::Config;
//! use sockwire::protocol::{Dispatcher, RegistryBuilder};
//! use sockwire::service::{NoopHooks, Server};
//!
//! # async fn run() -> sockwire::Result<()> {
//! let registry = RegistryBuilder::new().build();
//! let mut server = Server::new(
//!     Config::new(7000),
//!     registry,
//!     Dispatcher::new(),
//!     NoopHooks,
//! );
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub(crate) mod conn;
pub mod server;
pub mod session;

pub use client::Client;
pub use server::Server;
pub use session::{ConnId, LinkState, Session};

use crate::config::Config;
use crate::error::WireError;
use crate::protocol::{Dispatcher, Protocol, Registry};
use std::sync::Arc;

/// Observation and lifecycle callbacks for a server or client.
///
/// All methods default to no-ops, so implementors override only what they
/// need. Callbacks run on the connection's driver task and must not block;
/// slow work belongs on a separate task.
pub trait Hooks: Send + Sync + 'static {
    /// A connection has been established, before it is registered.
    ///
    /// Calling [`Session::close`] here rejects the connection: it will be
    /// torn down without ever firing `on_add_session`.
    fn on_connect(&self, session: &Arc<Session>) {
        let _ = session;
    }

    /// The connection passed `on_connect` and is now registered.
    fn on_add_session(&self, session: &Arc<Session>) {
        let _ = session;
    }

    /// The connection is being unregistered. Fires exactly once per
    /// session that saw `on_add_session`.
    fn on_del_session(&self, session: &Arc<Session>) {
        let _ = session;
    }

    /// Final teardown notification.
    fn on_close(&self, session: &Arc<Session>) {
        let _ = session;
    }

    /// The connection is closing abnormally. Fires before `on_del_session`
    /// and `on_close`.
    fn on_except(&self, session: &Arc<Session>, error: &WireError) {
        let _ = (session, error);
    }

    /// An outbound message is about to be encoded.
    fn on_before_encode(&self, msg: &dyn Protocol) {
        let _ = msg;
    }

    /// An outbound message has been encoded; `wire` is the frame body as
    /// it will appear on the wire, security transform applied.
    fn on_after_encode(&self, msg: &dyn Protocol, wire: &[u8]) {
        let _ = (msg, wire);
    }

    /// A complete frame body arrived, before any transform or parsing.
    fn on_before_decode(&self, conn: ConnId, wire: &[u8]) {
        let _ = (conn, wire);
    }

    /// An inbound message decoded cleanly, before dispatch.
    fn on_after_decode(&self, conn: ConnId, msg: &dyn Protocol) {
        let _ = (conn, msg);
    }

    /// A message arrived that nothing will consume: either its type id is
    /// unregistered, or no consumer claims it. Return `true` to keep the
    /// connection open; the default closes it.
    fn on_unknown_message(&self, session: &Arc<Session>, type_id: u32, payload: &[u8]) -> bool {
        let _ = (session, type_id, payload);
        false
    }
}

/// The do-nothing [`Hooks`] implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl Hooks for NoopHooks {}

/// Immutable state shared by every connection of one server or client.
pub(crate) struct Shared {
    pub(crate) config: Arc<Config>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) hooks: Arc<dyn Hooks>,
}

impl Shared {
    pub(crate) fn new(
        config: Config,
        registry: Registry,
        dispatcher: Dispatcher,
        hooks: impl Hooks,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            dispatcher: Arc::new(dispatcher),
            hooks: Arc::new(hooks),
        })
    }
}
