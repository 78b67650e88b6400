// File: ledgerseal-hash/src/lib.rs
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

pub const DIGEST_LEN: usize = 32; // 256-bit output
pub const DIGEST_HEX_LEN: usize = DIGEST_LEN * 2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("invalid hex digest: {0}")]
    InvalidHex(String),
    #[error("expected 64 hex characters, got {0}")]
    InvalidLength(usize),
}

/// A SHA-256 output. Rendered as 64 lowercase hex characters on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self { Self(bytes) }
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] { &self.0 }
    pub fn to_hex(&self) -> String { hex::encode(self.0) }

    /// Parse the ledger wire form. Upper-case input is accepted, output is always lower-case.
    pub fn from_hex(s: &str) -> Result<Self, DigestError> {
        let s = s.trim();
        if s.len() != DIGEST_HEX_LEN {
            return Err(DigestError::InvalidLength(s.len()));
        }
        let mut out = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut out).map_err(|e| DigestError::InvalidHex(e.to_string()))?;
        Ok(Self(out))
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] { &self.0 }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.to_hex()) }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Digest({})", self.to_hex()) }
}

impl FromStr for Digest {
    type Err = DigestError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::from_hex(s) }
}

#[inline]
pub fn sha256(data: &[u8]) -> Digest {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&Sha256::digest(data));
    Digest(out)
}

/// Internal node digest: `sha256(left || right)`, no domain label.
#[inline]
pub fn digest_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(left.0);
    hasher.update(right.0);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hasher.finalize());
    Digest(out)
}
