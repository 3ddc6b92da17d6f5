//! Frame codec: length prefix, security transforms, envelope.

use crate::error::{Result, WireError};
use crate::protocol::envelope::{self, Decoded};
use crate::protocol::{Protocol, Registry};
use crate::security::Security;
use crate::service::session::ConnId;
use crate::service::Hooks;
use crate::utils::metrics::global_metrics;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

/// Length prefix size in bytes.
const LEN_PREFIX: usize = 4;

/// One decoded frame, before dispatch.
#[derive(Debug)]
pub enum Inbound {
    /// A registered message, fully parsed.
    Message(Box<dyn Protocol>),
    /// An unregistered type id with its raw payload.
    Unknown { type_id: u32, payload: Bytes },
}

/// Per-connection frame codec.
///
/// Sits on a [`tokio_util::codec::Framed`] stream and converts between
/// typed messages and `[length][body]` frames, applying this connection's
/// security transforms and observation hooks along the way.
///
/// Outbound: `on_before_encode`, envelope encode, encrypt, size check,
/// prefix, `on_after_encode`. Inbound: size check before buffering,
/// `on_before_decode` on the raw body, decrypt, envelope decode,
/// `on_after_decode` for registered messages.
pub struct Coder {
    registry: Arc<Registry>,
    hooks: Arc<dyn Hooks>,
    conn: ConnId,
    decrypt: Option<Box<dyn Security>>,
    encrypt: Option<Box<dyn Security>>,
    max_msg_size: usize,
}

impl Coder {
    pub fn new(
        registry: Arc<Registry>,
        hooks: Arc<dyn Hooks>,
        conn: ConnId,
        decrypt: Option<Box<dyn Security>>,
        encrypt: Option<Box<dyn Security>>,
        max_msg_size: usize,
    ) -> Self {
        Self {
            registry,
            hooks,
            conn,
            decrypt,
            encrypt,
            max_msg_size,
        }
    }
}

impl Decoder for Coder {
    type Item = Inbound;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }

        let mut len_bytes = [0u8; LEN_PREFIX];
        len_bytes.copy_from_slice(&src[..LEN_PREFIX]);
        let body_len = u32::from_be_bytes(len_bytes) as usize;

        // Reject an oversized claim before reserving a byte for it.
        if body_len > self.max_msg_size {
            return Err(WireError::FrameTooLarge {
                size: body_len,
                limit: self.max_msg_size,
            });
        }

        if src.len() < LEN_PREFIX + body_len {
            src.reserve(LEN_PREFIX + body_len - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        let raw = src.split_to(body_len).freeze();
        global_metrics().message_received((LEN_PREFIX + body_len) as u64);
        self.hooks.on_before_decode(self.conn, &raw);

        let mut body = match &self.decrypt {
            Some(security) => Bytes::from(security.decrypt(&raw)?),
            None => raw,
        };

        match envelope::decode(&self.registry, &mut body)? {
            Decoded::Message(msg) => {
                self.hooks.on_after_decode(self.conn, msg.as_ref());
                Ok(Some(Inbound::Message(msg)))
            }
            Decoded::Unknown { type_id, payload } => {
                Ok(Some(Inbound::Unknown { type_id, payload }))
            }
        }
    }
}

impl Encoder<Box<dyn Protocol>> for Coder {
    type Error = WireError;

    fn encode(&mut self, msg: Box<dyn Protocol>, dst: &mut BytesMut) -> Result<()> {
        self.hooks.on_before_encode(msg.as_ref());

        let mut scratch = BytesMut::with_capacity(64);
        envelope::encode(msg.as_ref(), &mut scratch)?;

        let body: Bytes = match &self.encrypt {
            Some(security) => Bytes::from(security.encrypt(&scratch)?),
            None => scratch.freeze(),
        };

        if body.len() > self.max_msg_size {
            return Err(WireError::FrameTooLarge {
                size: body.len(),
                limit: self.max_msg_size,
            });
        }

        dst.reserve(LEN_PREFIX + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        global_metrics().message_sent((LEN_PREFIX + body.len()) as u64);

        self.hooks.on_after_encode(msg.as_ref(), &body);
        Ok(())
    }
}
