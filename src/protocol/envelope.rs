//! Wire envelope and prototype registry.
//!
//! Every frame body is an envelope: a compact varint type id followed by
//! the message payload. Encoding writes the id then delegates to the
//! message's own [`Marshal`] impl. Decoding looks the id up in a
//! [`Registry`] of prototypes; a registered id yields a fresh clone filled
//! from the payload, an unregistered id yields [`Decoded::Unknown`] with
//! the raw payload preserved for the caller.

use crate::error::{Result, WireError};
use crate::marshal::{read_compact_u32, write_compact_u32};
use crate::protocol::message::{Ping, Pong};
use crate::protocol::Protocol;
use bytes::{Buf, Bytes, BytesMut};
use std::collections::HashMap;

/// Outcome of decoding one envelope.
#[derive(Debug)]
pub enum Decoded {
    /// The type id was registered and the payload parsed cleanly.
    Message(Box<dyn Protocol>),
    /// The type id had no registered prototype; the payload is untouched.
    Unknown { type_id: u32, payload: Bytes },
}

/// Encode `msg` as an envelope appended to `buf`.
pub fn encode(msg: &dyn Protocol, buf: &mut BytesMut) -> Result<()> {
    write_compact_u32(buf, msg.type_id());
    msg.marshal(buf)
}

/// Decode one envelope occupying the whole of `buf`.
///
/// The payload must be consumed exactly: trailing bytes after a registered
/// message's `unmarshal` mean the peer and this registry disagree about the
/// message layout, which is treated as malformed rather than silently
/// ignored.
pub fn decode(registry: &Registry, buf: &mut Bytes) -> Result<Decoded> {
    let type_id = read_compact_u32(buf)?;

    let Some(proto) = registry.prototype(type_id) else {
        let payload = buf.copy_to_bytes(buf.remaining());
        return Ok(Decoded::Unknown { type_id, payload });
    };

    let mut msg = proto.boxed_clone();
    msg.unmarshal(buf)?;
    if buf.has_remaining() {
        return Err(WireError::MalformedFrame(format!(
            "{} trailing bytes after message type {}",
            buf.remaining(),
            type_id
        )));
    }
    Ok(Decoded::Message(msg))
}

/// Immutable prototype table mapping type ids to message templates.
///
/// Built once through [`RegistryBuilder`] before any connection starts and
/// shared read-only afterwards.
pub struct Registry {
    prototypes: HashMap<u32, Box<dyn Protocol>>,
}

impl Registry {
    /// The prototype registered for `type_id`, if any.
    pub fn prototype(&self, type_id: u32) -> Option<&dyn Protocol> {
        self.prototypes.get(&type_id).map(|p| p.as_ref())
    }

    /// Whether `type_id` has a registered prototype.
    pub fn contains(&self, type_id: u32) -> bool {
        self.prototypes.contains_key(&type_id)
    }

    /// Number of registered prototypes, heartbeats included.
    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    /// True only for a registry stripped of even the built-in heartbeats.
    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<u32> = self.prototypes.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("Registry").field("type_ids", &ids).finish()
    }
}

/// Builder collecting message prototypes.
///
/// Starts pre-seeded with the heartbeat messages, so user registrations
/// that collide with their ids fail the same way any duplicate does.
pub struct RegistryBuilder {
    prototypes: HashMap<u32, Box<dyn Protocol>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        let mut prototypes: HashMap<u32, Box<dyn Protocol>> = HashMap::new();
        prototypes.insert(Ping::default().type_id(), Box::new(Ping::default()));
        prototypes.insert(Pong::default().type_id(), Box::new(Pong::default()));
        Self { prototypes }
    }

    /// Register `proto` as the prototype for its own type id.
    ///
    /// Registering two prototypes with the same id is a startup mistake and
    /// fails with [`WireError::DuplicateProtocol`].
    pub fn register(mut self, proto: impl Protocol) -> Result<Self> {
        let type_id = proto.type_id();
        if self.prototypes.contains_key(&type_id) {
            return Err(WireError::DuplicateProtocol(type_id));
        }
        self.prototypes.insert(type_id, Box::new(proto));
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            prototypes: self.prototypes,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::Marshal;
    use crate::protocol::message::{PING_TYPE_ID, PONG_TYPE_ID};
    use bytes::BufMut;
    use std::any::Any;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Probe {
        value: u32,
    }

    impl Marshal for Probe {
        fn marshal(&self, buf: &mut BytesMut) -> Result<()> {
            buf.put_u32(self.value);
            Ok(())
        }

        fn unmarshal(&mut self, buf: &mut Bytes) -> Result<()> {
            if buf.remaining() < 4 {
                return Err(WireError::MalformedFrame("truncated probe".to_string()));
            }
            self.value = buf.get_u32();
            Ok(())
        }
    }

    impl Protocol for Probe {
        fn type_id(&self) -> u32 {
            77
        }

        fn boxed_clone(&self) -> Box<dyn Protocol> {
            Box::new(self.clone())
        }

        fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
            self
        }
    }

    #[allow(clippy::expect_used)]
    fn registry_with_probe() -> Registry {
        RegistryBuilder::new()
            .register(Probe::default())
            .expect("register")
            .build()
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn builder_seeds_heartbeats() {
        let registry = RegistryBuilder::new().build();
        assert!(registry.contains(PING_TYPE_ID));
        assert!(registry.contains(PONG_TYPE_ID));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_registration_fails() {
        let result = RegistryBuilder::new()
            .register(Probe::default())
            .and_then(|b| b.register(Probe { value: 9 }));
        assert!(matches!(result, Err(WireError::DuplicateProtocol(77))));
    }

    #[test]
    fn heartbeat_ids_cannot_be_taken() {
        #[derive(Debug, Clone, Default)]
        struct Imposter;

        impl Marshal for Imposter {
            fn marshal(&self, _buf: &mut BytesMut) -> Result<()> {
                Ok(())
            }
            fn unmarshal(&mut self, _buf: &mut Bytes) -> Result<()> {
                Ok(())
            }
        }

        impl Protocol for Imposter {
            fn type_id(&self) -> u32 {
                PING_TYPE_ID
            }
            fn boxed_clone(&self) -> Box<dyn Protocol> {
                Box::new(Imposter)
            }
            fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
                self
            }
        }

        let result = RegistryBuilder::new().register(Imposter);
        assert!(matches!(
            result,
            Err(WireError::DuplicateProtocol(PING_TYPE_ID))
        ));
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn envelope_round_trip() {
        let registry = registry_with_probe();
        let msg = Probe { value: 0xDEAD_BEEF };

        let mut buf = BytesMut::new();
        encode(&msg, &mut buf).expect("encode");

        let mut wire = buf.freeze();
        let decoded = decode(&registry, &mut wire).expect("decode");
        match decoded {
            Decoded::Message(boxed) => {
                let probe = boxed
                    .into_any()
                    .downcast::<Probe>()
                    .expect("downcast");
                assert_eq!(*probe, msg);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn unknown_id_preserves_payload() {
        let registry = RegistryBuilder::new().build();

        let mut buf = BytesMut::new();
        write_compact_u32(&mut buf, 999);
        buf.put_slice(b"opaque bytes");

        let mut wire = buf.freeze();
        match decode(&registry, &mut wire).expect("decode") {
            Decoded::Unknown { type_id, payload } => {
                assert_eq!(type_id, 999);
                assert_eq!(payload.as_ref(), b"opaque bytes");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn trailing_bytes_are_rejected() {
        let registry = registry_with_probe();

        let mut buf = BytesMut::new();
        encode(&Probe { value: 1 }, &mut buf).expect("encode");
        buf.put_u8(0xEE);

        let mut wire = buf.freeze();
        assert!(matches!(
            decode(&registry, &mut wire),
            Err(WireError::MalformedFrame(_))
        ));
    }

    #[test]
    fn empty_body_is_malformed() {
        let registry = RegistryBuilder::new().build();
        let mut wire = Bytes::new();
        assert!(matches!(
            decode(&registry, &mut wire),
            Err(WireError::MalformedFrame(_))
        ));
    }
}
