//! # Protocol Layer
//!
//! Typed messages, the wire envelope, and message dispatch.
//!
//! ## Architecture
//!
//! A message type implements [`Protocol`]: it can marshal itself, report a
//! stable numeric type id, and be cloned as a prototype. A [`Registry`]
//! holds one prototype per type id and is consulted when decoding; unknown
//! ids surface as [`Decoded::Unknown`] rather than an error so callers can
//! decide how to react.
//!
//! The [`Dispatcher`] routes fully decoded messages to at most one typed
//! consumer per type id, in arrival order per connection.
//!
//! Type ids `1` and `2` are reserved for the built-in [`Ping`] and [`Pong`]
//! heartbeat messages.
//!
//! ## Example
//!
//! ```
//! use sockwire::protocol::{Ping, Protocol};
//!
//! let ping = Ping::now();
//! assert_eq!(ping.type_id(), sockwire::protocol::PING_TYPE_ID);
//! ```

pub mod dispatcher;
pub mod envelope;
pub mod message;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use envelope::{Decoded, Registry, RegistryBuilder};
pub use message::{Ping, Pong, PING_TYPE_ID, PONG_TYPE_ID};

use crate::marshal::Marshal;
use std::any::Any;
use std::fmt;

/// A self-describing wire message.
///
/// Implementors pair a stable `type_id` with [`Marshal`] so the envelope can
/// name the payload on the wire and the decoder can reconstruct it. Boxed
/// prototypes are cloned by the [`Registry`] before each decode, so a
/// freshly cloned value must be ready to accept `unmarshal`.
pub trait Protocol: Marshal + Send + Sync + fmt::Debug + 'static {
    /// Stable numeric identifier for this message type.
    ///
    /// Must be unique within a registry and must not collide with the
    /// reserved heartbeat ids.
    fn type_id(&self) -> u32;

    /// Clone this value as a boxed trait object.
    fn boxed_clone(&self) -> Box<dyn Protocol>;

    /// Convert into [`Any`] for downcasting to the concrete type.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}
