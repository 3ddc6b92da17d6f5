//! # Marshaling Contract
//!
//! Self-describing binary encode/decode for message types.
//!
//! Every message carried by the framework implements [`Marshal`]: it appends
//! its own encoding to a buffer and restores itself in place from one. Decode
//! is prototype-style so registry-driven decoding can clone a template value
//! and fill it from the wire.
//!
//! ## Components
//! - **Marshal**: the encode/decode trait implemented by message types
//! - **Compact integers**: LEB128-style unsigned varints used for type ids
//! - **serde bridge**: one-line `Marshal` implementations via bincode for
//!   `#[derive(Serialize, Deserialize)]` message types
//!
//! ## Example Usage
//! ```rust
//! use bytes::BytesMut;
//! use sockwire::marshal::{read_compact_u32, write_compact_u32};
//!
//! let mut buf = BytesMut::new();
//! write_compact_u32(&mut buf, 300);
//! let mut bytes = buf.freeze();
//! assert_eq!(read_compact_u32(&mut bytes).unwrap(), 300);
//! ```

use crate::error::{Result, WireError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Self-describing binary encoding for message types.
///
/// `unmarshal` must consume exactly the bytes `marshal` produced, so that
/// several values can be concatenated in one frame body.
pub trait Marshal {
    /// Append this value's encoding to `buf`.
    fn marshal(&self, buf: &mut BytesMut) -> Result<()>;

    /// Restore this value in place from the front of `buf`.
    fn unmarshal(&mut self, buf: &mut Bytes) -> Result<()>;
}

/// Append `value` as a compact unsigned integer.
///
/// Seven value bits per byte, least-significant group first, high bit set on
/// every byte except the last. A `u32` takes between 1 and 5 bytes.
pub fn write_compact_u32(buf: &mut impl BufMut, value: u32) {
    let mut v = value;
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// Read a compact unsigned integer from the front of `buf`.
///
/// Truncated input, a continuation past the fifth byte, or bits beyond 32
/// are all reported as [`WireError::MalformedFrame`].
pub fn read_compact_u32(buf: &mut impl Buf) -> Result<u32> {
    let mut value: u32 = 0;
    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(WireError::MalformedFrame(
                "truncated compact integer".to_string(),
            ));
        }
        let byte = buf.get_u8();
        let bits = u32::from(byte & 0x7f);
        if shift == 28 && bits > 0x0f {
            return Err(WireError::MalformedFrame(
                "compact integer overflows 32 bits".to_string(),
            ));
        }
        value |= bits << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 28 {
            return Err(WireError::MalformedFrame(
                "compact integer longer than 5 bytes".to_string(),
            ));
        }
    }
}

/// Append a serde-serializable value to `buf` using bincode.
///
/// Together with [`unmarshal_serde`] this implements the [`Marshal`]
/// contract for `#[derive(Serialize, Deserialize)]` message types.
pub fn marshal_serde<T: Serialize>(value: &T, buf: &mut BytesMut) -> Result<()> {
    let mut writer = BufMut::writer(&mut *buf);
    bincode::serialize_into(&mut writer, value)?;
    Ok(())
}

/// Read a serde-deserializable value from the front of `buf` using bincode.
///
/// Consumes exactly the bytes the value occupies; anything following it in
/// the buffer is left untouched.
pub fn unmarshal_serde<T: DeserializeOwned>(buf: &mut Bytes) -> Result<T> {
    let mut reader = Buf::reader(&mut *buf);
    let value = bincode::deserialize_from(&mut reader)?;
    Ok(value)
}
