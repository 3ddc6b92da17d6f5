//! Built-in heartbeat messages.
//!
//! Clients send [`Ping`] at the configured send interval; servers answer
//! each one with a [`Pong`] echoing the same timestamp. Receipt of either
//! refreshes the connection's heartbeat clock. Both are handled inside the
//! connection driver and never reach user consumers.

use crate::error::{Result, WireError};
use crate::marshal::Marshal;
use crate::protocol::Protocol;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::any::Any;
use std::time::{SystemTime, UNIX_EPOCH};

/// Reserved type id for [`Ping`].
pub const PING_TYPE_ID: u32 = 1;
/// Reserved type id for [`Pong`].
pub const PONG_TYPE_ID: u32 = 2;

/// Heartbeat request carrying the sender's clock in unix milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ping {
    pub timestamp_ms: u64,
}

impl Ping {
    /// A ping stamped with the current wall clock.
    pub fn now() -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self { timestamp_ms }
    }
}

impl Marshal for Ping {
    fn marshal(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u64(self.timestamp_ms);
        Ok(())
    }

    fn unmarshal(&mut self, buf: &mut Bytes) -> Result<()> {
        if buf.remaining() < 8 {
            return Err(WireError::MalformedFrame("truncated ping".to_string()));
        }
        self.timestamp_ms = buf.get_u64();
        Ok(())
    }
}

impl Protocol for Ping {
    fn type_id(&self) -> u32 {
        PING_TYPE_ID
    }

    fn boxed_clone(&self) -> Box<dyn Protocol> {
        Box::new(*self)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Heartbeat reply echoing the timestamp of the ping it answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pong {
    pub timestamp_ms: u64,
}

impl Pong {
    /// The reply for a received ping.
    pub fn answering(ping: &Ping) -> Self {
        Self {
            timestamp_ms: ping.timestamp_ms,
        }
    }
}

impl Marshal for Pong {
    fn marshal(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u64(self.timestamp_ms);
        Ok(())
    }

    fn unmarshal(&mut self, buf: &mut Bytes) -> Result<()> {
        if buf.remaining() < 8 {
            return Err(WireError::MalformedFrame("truncated pong".to_string()));
        }
        self.timestamp_ms = buf.get_u64();
        Ok(())
    }
}

impl Protocol for Pong {
    fn type_id(&self) -> u32 {
        PONG_TYPE_ID
    }

    fn boxed_clone(&self) -> Box<dyn Protocol> {
        Box::new(*self)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}
