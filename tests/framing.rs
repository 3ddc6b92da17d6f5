//! Frame codec behavior over raw buffers: length prefixes, fragmentation,
//! size limits, unknown types, and encrypted bodies.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use bytes::{BufMut, BytesMut};
use common::{chat_registry, Chat};
use sockwire::core::{Coder, Inbound};
use sockwire::marshal::write_compact_u32;
use sockwire::protocol::PING_TYPE_ID;
use sockwire::security::ChaChaSecurity;
use sockwire::service::{ConnId, NoopHooks};
use sockwire::WireError;
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

fn coder(max_msg_size: usize) -> Coder {
    Coder::new(
        Arc::new(chat_registry()),
        Arc::new(NoopHooks),
        ConnId(1),
        None,
        None,
        max_msg_size,
    )
}

fn secured_coder(secret: &str, max_msg_size: usize) -> Coder {
    Coder::new(
        Arc::new(chat_registry()),
        Arc::new(NoopHooks),
        ConnId(1),
        Some(Box::new(ChaChaSecurity::from_secret(secret))),
        Some(Box::new(ChaChaSecurity::from_secret(secret))),
        max_msg_size,
    )
}

/// Wrap an envelope body in a length-prefixed frame by hand.
fn frame(body: &[u8]) -> BytesMut {
    let mut wire = BytesMut::new();
    wire.put_u32(body.len() as u32);
    wire.extend_from_slice(body);
    wire
}

fn expect_chat(decoded: Inbound) -> Chat {
    match decoded {
        Inbound::Message(msg) => *msg.into_any().downcast::<Chat>().unwrap(),
        other => panic!("expected a chat message, got {other:?}"),
    }
}

#[test]
fn typed_message_round_trips() {
    let mut coder = coder(64 * 1024);
    let sent = Chat::new(7, "hello");

    let mut wire = BytesMut::new();
    coder.encode(Box::new(sent.clone()), &mut wire).unwrap();
    let decoded = coder.decode(&mut wire).unwrap().unwrap();

    assert_eq!(expect_chat(decoded), sent);
    assert!(wire.is_empty());
}

#[test]
fn length_prefix_matches_body() {
    let mut coder = coder(64 * 1024);
    let mut wire = BytesMut::new();
    coder.encode(Box::new(Chat::new(1, "abc")), &mut wire).unwrap();

    let claimed = u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]) as usize;
    assert_eq!(claimed, wire.len() - 4);
}

#[test]
fn two_messages_in_one_chunk_decode_in_order() {
    let mut coder = coder(64 * 1024);
    let mut wire = BytesMut::new();
    coder.encode(Box::new(Chat::new(1, "first")), &mut wire).unwrap();
    coder.encode(Box::new(Chat::new(2, "second")), &mut wire).unwrap();

    let first = expect_chat(coder.decode(&mut wire).unwrap().unwrap());
    let second = expect_chat(coder.decode(&mut wire).unwrap().unwrap());
    assert_eq!(first.seq, 1);
    assert_eq!(second.seq, 2);
    assert!(coder.decode(&mut wire).unwrap().is_none());
}

#[test]
fn decoder_waits_for_a_complete_frame() {
    let mut coder = coder(64 * 1024);
    let sent = Chat::new(3, "fragmented");
    let mut wire = BytesMut::new();
    coder.encode(Box::new(sent.clone()), &mut wire).unwrap();

    let mut feed = BytesMut::new();
    let mut decoded = None;
    for (i, byte) in wire.iter().enumerate() {
        feed.put_u8(*byte);
        if let Some(got) = coder.decode(&mut feed).unwrap() {
            assert_eq!(i, wire.len() - 1, "decoded before the last byte arrived");
            decoded = Some(got);
        }
    }

    let decoded = decoded.unwrap();
    assert_eq!(expect_chat(decoded), sent);
}

#[test]
fn oversized_length_claim_is_rejected_from_the_prefix_alone() {
    let mut coder = coder(16);
    let mut wire = BytesMut::new();
    wire.put_u32(1_000_000);

    let err = coder.decode(&mut wire).unwrap_err();
    assert!(matches!(
        err,
        WireError::FrameTooLarge {
            size: 1_000_000,
            limit: 16
        }
    ));
}

#[test]
fn oversized_outbound_message_is_refused() {
    let mut coder = coder(8);
    let mut wire = BytesMut::new();

    let err = coder
        .encode(Box::new(Chat::new(1, "far too long for the limit")), &mut wire)
        .unwrap_err();
    assert!(matches!(err, WireError::FrameTooLarge { .. }));
    assert!(wire.is_empty(), "nothing may reach the wire after a refusal");
}

#[test]
fn unregistered_type_surfaces_with_payload_intact() {
    let mut coder = coder(64 * 1024);
    let mut body = BytesMut::new();
    write_compact_u32(&mut body, 99);
    body.extend_from_slice(b"opaque-payload");
    let mut wire = frame(&body);

    match coder.decode(&mut wire).unwrap().unwrap() {
        Inbound::Unknown { type_id, payload } => {
            assert_eq!(type_id, 99);
            assert_eq!(&payload[..], b"opaque-payload");
        }
        other => panic!("expected an unknown message, got {other:?}"),
    }
}

#[test]
fn truncated_type_id_is_malformed() {
    let mut coder = coder(64 * 1024);
    // A lone continuation byte promises more varint bytes than the body has.
    let mut wire = frame(&[0x80]);

    let err = coder.decode(&mut wire).unwrap_err();
    assert!(matches!(err, WireError::MalformedFrame(_)));
}

#[test]
fn trailing_bytes_after_a_message_are_malformed() {
    let mut coder = coder(64 * 1024);
    let mut body = BytesMut::new();
    write_compact_u32(&mut body, PING_TYPE_ID);
    body.put_u64(12345);
    body.put_u8(0xFF);
    let mut wire = frame(&body);

    let err = coder.decode(&mut wire).unwrap_err();
    assert!(matches!(err, WireError::MalformedFrame(_)));
}

#[test]
fn encrypted_frames_round_trip() {
    let mut coder = secured_coder("shared-secret", 64 * 1024);
    let sent = Chat::new(11, "sealed");

    let mut wire = BytesMut::new();
    coder.encode(Box::new(sent.clone()), &mut wire).unwrap();
    let decoded = coder.decode(&mut wire).unwrap().unwrap();

    assert_eq!(expect_chat(decoded), sent);
}

#[test]
fn encrypted_bodies_do_not_leak_plaintext() {
    let mut plain = coder(64 * 1024);
    let mut sealed = secured_coder("shared-secret", 64 * 1024);
    let msg = Chat::new(4, "confidential");

    let mut plain_wire = BytesMut::new();
    plain.encode(Box::new(msg.clone()), &mut plain_wire).unwrap();
    let mut sealed_wire = BytesMut::new();
    sealed.encode(Box::new(msg), &mut sealed_wire).unwrap();

    let needle = b"confidential";
    assert!(plain_wire.windows(needle.len()).any(|w| w == needle));
    assert!(!sealed_wire.windows(needle.len()).any(|w| w == needle));
}

#[test]
fn tampered_ciphertext_is_rejected() {
    let mut coder = secured_coder("shared-secret", 64 * 1024);
    let mut wire = BytesMut::new();
    coder.encode(Box::new(Chat::new(5, "integrity")), &mut wire).unwrap();

    let last = wire.len() - 1;
    wire[last] ^= 0x01;

    let err = coder.decode(&mut wire).unwrap_err();
    assert!(matches!(err, WireError::SecurityError(_)));
}

#[test]
fn mismatched_secrets_cannot_exchange_frames() {
    let mut sender = secured_coder("secret-a", 64 * 1024);
    let mut receiver = secured_coder("secret-b", 64 * 1024);

    let mut wire = BytesMut::new();
    sender.encode(Box::new(Chat::new(6, "sealed")), &mut wire).unwrap();

    let err = receiver.decode(&mut wire).unwrap_err();
    assert!(matches!(err, WireError::SecurityError(_)));
}
