//! # sockwire
//!
//! Connection-oriented messaging for Rust services: typed marshaling,
//! length-prefixed framing, pluggable security transforms, lifecycle
//! hooks, heartbeats, and automatic reconnect over TCP or TLS.
//!
//! ## Features
//! - **Typed messages**: implement [`Marshal`] and [`Protocol`] (or lean
//!   on the serde bridge) and register one prototype per type id
//! - **Framing**: 4-byte length prefix with size limits enforced in both
//!   directions, oversized claims rejected before allocation
//! - **Security**: independent inbound and outbound XChaCha20-Poly1305
//!   transforms that compose with TLS beneath the codec
//! - **Lifecycle**: hooks fire in a fixed order from `on_connect` through
//!   `on_close`, with `on_except` on abnormal teardown
//! - **Liveness**: built-in ping/pong heartbeats with expiry on both roles
//! - **Resilience**: clients reconnect at a fixed interval until stopped
//!
//! ## Quick Start
//! ```no_run
//! use sockwire::{Client, Config, Dispatcher, NoopHooks, RegistryBuilder};
//!
//! #[tokio::main]
//! async fn main() -> sockwire::Result<()> {
//!     sockwire::utils::logging::init();
//!
//!     let registry = RegistryBuilder::new().build();
//!     let mut client = Client::new(
//!         Config::with_ip("127.0.0.1", 7000),
//!         registry,
//!         Dispatcher::new(),
//!         NoopHooks,
//!     );
//!     client.start().await?;
//!     // exchange messages through client.session() ...
//!     client.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//! - [`marshal`]: the byte-level encode/decode contract and compact varints
//! - [`protocol`]: typed messages, the wire envelope, prototype registry,
//!   and dispatch
//! - [`core`]: the frame codec tying length prefix, security, and envelope
//!   together
//! - [`security`]: per-direction frame body transforms
//! - [`service`]: servers, clients, sessions, and lifecycle hooks
//! - [`transport`]: TCP socket setup and TLS wrapping
//! - [`config`]: one TOML-loadable structure for both roles

#![warn(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod core;
pub mod error;
pub mod marshal;
pub mod protocol;
pub mod security;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::Config;
pub use error::{Result, WireError};
pub use marshal::Marshal;
pub use protocol::{
    Decoded, DispatchOutcome, Dispatcher, Ping, Pong, Protocol, Registry, RegistryBuilder,
};
pub use security::{ChaChaSecurity, NoSecurity, Security, SecurityKind};
pub use service::{Client, ConnId, Hooks, LinkState, NoopHooks, Server, Session};
