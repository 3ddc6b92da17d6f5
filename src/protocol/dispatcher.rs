//! Typed message dispatch.
//!
//! A [`Dispatcher`] maps each message type id to at most one consumer.
//! Consumers are registered against a concrete message type before any
//! connection starts; once running, every decoded message on a connection
//! is handed to its consumer in arrival order, on the connection's own
//! driver task. A consumer that needs to do slow work should hand it off
//! rather than stall the connection.
//!
//! ## Example
//!
//! ```no_run
//! use sockwire::protocol::{Dispatcher, Ping};
//!
//! let mut dispatcher = Dispatcher::new();
//! // Heartbeat ids are reserved, so this fails:
//! assert!(dispatcher.register::<Ping, _>(|_session, _ping| {}).is_err());
//! ```

use crate::error::{Result, WireError};
use crate::protocol::message::{PING_TYPE_ID, PONG_TYPE_ID};
use crate::protocol::Protocol;
use crate::service::Session;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

type Consumer = dyn Fn(&Arc<Session>, Box<dyn Protocol>) -> bool + Send + Sync;

/// What happened to a message offered to the dispatcher.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A consumer accepted the message.
    Consumed,
    /// A consumer was registered for this id but the concrete type did not
    /// match its expectation. The message is dropped after logging.
    Mismatched(u32),
    /// No consumer is registered for this id; the message is handed back.
    Unconsumed(Box<dyn Protocol>),
}

/// Routes decoded messages to typed consumers, one per type id.
#[derive(Default)]
pub struct Dispatcher {
    consumers: HashMap<u32, Box<Consumer>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `consumer` for the message type `M`.
    ///
    /// The type id comes from `M`'s own [`Protocol::type_id`]. Heartbeat
    /// ids are reserved, and a second consumer for an id already claimed is
    /// a startup mistake; both fail loudly rather than silently replacing.
    pub fn register<M, F>(&mut self, consumer: F) -> Result<()>
    where
        M: Protocol + Default,
        F: Fn(&Arc<Session>, M) + Send + Sync + 'static,
    {
        let type_id = M::default().type_id();
        if type_id == PING_TYPE_ID || type_id == PONG_TYPE_ID {
            return Err(WireError::ReservedType(type_id));
        }
        if self.consumers.contains_key(&type_id) {
            return Err(WireError::DuplicateConsumer(type_id));
        }

        let erased = move |session: &Arc<Session>, boxed: Box<dyn Protocol>| {
            match boxed.into_any().downcast::<M>() {
                Ok(msg) => {
                    consumer(session, *msg);
                    true
                }
                Err(_) => false,
            }
        };
        self.consumers.insert(type_id, Box::new(erased));
        Ok(())
    }

    /// Offer a decoded message to its consumer.
    pub fn dispatch(&self, session: &Arc<Session>, msg: Box<dyn Protocol>) -> DispatchOutcome {
        let type_id = msg.type_id();
        match self.consumers.get(&type_id) {
            None => DispatchOutcome::Unconsumed(msg),
            Some(consumer) => {
                if consumer(session, msg) {
                    DispatchOutcome::Consumed
                } else {
                    warn!(type_id, conn = %session.id(), "consumer type mismatch, message dropped");
                    DispatchOutcome::Mismatched(type_id)
                }
            }
        }
    }

    /// Whether a consumer is registered for `type_id`.
    pub fn is_registered(&self, type_id: u32) -> bool {
        self.consumers.contains_key(&type_id)
    }

    /// Number of registered consumers.
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<u32> = self.consumers.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("Dispatcher").field("type_ids", &ids).finish()
    }
}
