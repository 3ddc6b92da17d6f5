//! # Core Framing
//!
//! Length-prefixed frame handling over byte streams.
//!
//! This module turns a raw byte stream into a sequence of discrete frames
//! and back. Each frame carries one envelope, optionally passed through the
//! connection's security transforms.
//!
//! ## Wire Format
//! ```text
//! [Length(4, big-endian)] [Body(N)]       body = security(envelope)
//! ```
//!
//! ## Safety
//! - Length is validated against the configured maximum before any
//!   buffering, so an oversized claim never allocates.
//! - Partial reads accumulate until a frame completes; no frame is
//!   surfaced twice and none is skipped.

pub mod codec;

pub use codec::{Coder, Inbound};
