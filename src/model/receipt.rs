use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use data_encoding::BASE64;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::credential::ProofValue;

pub type HmacSha256 = Hmac<Sha256>;

/// MAC digests are truncated to this many bytes, i.e. 24 base64 characters.
pub const SIGNATURE_BYTES: usize = 18;

/// Receipts are cut down to this many characters so voters can write them down.
pub const RECEIPT_LENGTH: usize = 8;

/// Random bytes in a freshly generated [`ElectionKey`].
pub const KEY_BYTES: usize = 24;

/// A per-election secret used to derive receipts or verifiers.
///
/// The verify key is published after the election for auditing; the
/// election key never leaves the server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElectionKey(String);

impl ElectionKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0; KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(BASE64.encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for ElectionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ElectionKey(<redacted>)")
    }
}

impl FromStr for ElectionKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            Err(KeyError::Empty)
        } else {
            Ok(Self(s.to_string()))
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key is empty")]
    Empty,
}

/// `base64(HMAC-SHA256(SHA-256(key), message)[..18])`.
///
/// The key is hashed first so that keys of any length give a MAC key of
/// the same strength.
pub fn sign(message: &str, key: &ElectionKey) -> String {
    let mac_key = Sha256::digest(key.0.as_bytes());
    let mut hmac = HmacSha256::new_from_slice(&mac_key).expect("HMAC can take key of any size");
    hmac.update(message.as_bytes());
    let digest = hmac.finalize().into_bytes();
    BASE64.encode(&digest[..SIGNATURE_BYTES])
}

/// Short public token identifying a stored ballot; the ballot's primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptToken(String);

impl ReceiptToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ReceiptToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a receipt as typed back in by a voter.
impl FromStr for ReceiptToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.chars().count() != RECEIPT_LENGTH {
            return Err(TokenError::Length(s.chars().count()));
        }
        Ok(Self(s.to_string()))
    }
}

/// Public token recorded once per credential that voted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerifierToken(String);

impl VerifierToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VerifierToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VerifierToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let expected = SIGNATURE_BYTES / 3 * 4;
        if s.len() != expected {
            return Err(TokenError::Length(s.len()));
        }
        Ok(Self(s.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has the wrong length ({0} characters)")]
    Length(usize),
}

/// Derive the receipt for a proof value.
pub fn receipt(proof: &ProofValue, election_key: &ElectionKey) -> ReceiptToken {
    let mut token = sign(proof.as_str(), election_key);
    token.truncate(RECEIPT_LENGTH);
    ReceiptToken(token)
}

/// Derive the verifier for a proof value. Not truncated.
pub fn verifier(proof: &ProofValue, verify_key: &ElectionKey) -> VerifierToken {
    VerifierToken(sign(proof.as_str(), verify_key))
}

/// Probability that at least two of `voters` distinct credentials share a
/// receipt within one election (birthday bound over 48-bit receipts).
///
/// A receipt collision makes one voter's resubmission overwrite the other's
/// ballot, so election sizes should keep this negligible.
pub fn receipt_collision_probability(voters: u64) -> f64 {
    let bits = (RECEIPT_LENGTH * 6) as i32;
    let pairs = voters as f64 * voters.saturating_sub(1) as f64 / 2.0;
    -(-pairs / 2f64.powi(bits)).exp_m1()
}
