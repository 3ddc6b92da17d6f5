//! # Security Transforms
//!
//! Pluggable per-direction byte transforms applied to frame bodies.
//!
//! A [`Security`] transform sits between the envelope and the length
//! prefix: outbound frame bodies are passed through `encrypt` after envelope
//! encoding, inbound bodies through `decrypt` before envelope decoding. The
//! inbound and outbound transforms are configured independently and stay
//! fixed for the life of a connection.
//!
//! The default is no transform at all. [`ChaChaSecurity`] provides
//! authenticated encryption with XChaCha20-Poly1305: every message gets a
//! fresh random 24-byte nonce, transmitted as a prefix of the ciphertext.
//!
//! These transforms are independent of TLS. TLS (when enabled) wraps the
//! whole byte stream beneath the framing layer; a `Security` transform
//! additionally protects each frame body and composes with it.

use crate::error::{Result, WireError};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Nonce length for XChaCha20-Poly1305, also the ciphertext prefix length.
const NONCE_LEN: usize = 24;

/// A byte transform applied to frame bodies in one direction.
///
/// `decrypt(encrypt(x))` must equal `x` for any byte string `x`. A failure
/// of either operation on live traffic is fatal to that connection.
pub trait Security: Send + Sync {
    /// Transform an outbound frame body.
    fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>>;

    /// Restore an inbound frame body.
    fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>>;
}

/// Identity transform. Equivalent to configuring no security at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSecurity;

impl Security for NoSecurity {
    fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>> {
        Ok(plain.to_vec())
    }

    fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>> {
        Ok(cipher.to_vec())
    }
}

/// XChaCha20-Poly1305 authenticated encryption.
///
/// Output layout is `nonce(24) || ciphertext`; the nonce is generated
/// randomly per message. Tampered or truncated input fails authentication.
pub struct ChaChaSecurity {
    cipher: XChaCha20Poly1305,
}

impl ChaChaSecurity {
    /// Create a transform from a raw 32-byte key.
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Create a transform from a shared secret string.
    ///
    /// The key is the SHA-256 digest of the secret, so both peers only need
    /// to agree on a passphrase.
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self::new(&key)
    }
}

impl Security for ChaChaSecurity {
    fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), plain)
            .map_err(|_| WireError::SecurityError("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>> {
        if cipher.len() < NONCE_LEN {
            return Err(WireError::SecurityError(
                "ciphertext shorter than nonce".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = cipher.split_at(NONCE_LEN);
        self.cipher
            .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| WireError::SecurityError("decryption failed".to_string()))
    }
}

/// Configuration selector for a per-direction transform.
///
/// In TOML: `in_security = { kind = "chacha20", secret = "..." }` or
/// `in_security = { kind = "none" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SecurityKind {
    /// No transform; frame bodies pass through unchanged.
    #[default]
    None,
    /// XChaCha20-Poly1305 keyed from a shared secret string.
    Chacha20 { secret: String },
}

impl SecurityKind {
    /// Build the configured transform, `None` when no transform applies.
    pub fn build(&self) -> Option<Box<dyn Security>> {
        match self {
            SecurityKind::None => None,
            SecurityKind::Chacha20 { secret } => Some(Box::new(ChaChaSecurity::from_secret(secret))),
        }
    }
}
