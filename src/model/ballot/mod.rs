use std::fmt::{Debug, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::receipt::ReceiptToken;

/// Longest nonce a voter may attach to their ballot.
pub const MAX_NONCE_LENGTH: usize = 16;

/// A stored ballot, keyed by its receipt.
///
/// `ranks[i]` is the rank the voter gave option `i`; lower is better and
/// equal ranks express no preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub receipt: ReceiptToken,
    /// Voter-chosen text, shown next to the ballot so the voter can
    /// recognise it in the published list.
    pub nonce: String,
    pub ranks: Vec<u32>,
}

/// One vote submission, as handed over by the presentation layer.
#[derive(Clone)]
pub struct Submission {
    /// The credential exactly as typed by the voter.
    pub credential: String,
    pub nonce: String,
    pub ranks: Vec<u32>,
}

impl Submission {
    pub fn new(credential: impl Into<String>, nonce: impl Into<String>, ranks: Vec<u32>) -> Self {
        Self {
            credential: credential.into(),
            nonce: nonce.into(),
            ranks,
        }
    }

    /// Check the ballot part of the submission against an election with
    /// `num_options` options.
    pub fn validate(&self, num_options: usize) -> Result<(), BallotError> {
        let nonce_len = self.nonce.chars().count();
        if nonce_len == 0 {
            return Err(BallotError::EmptyNonce);
        }
        if nonce_len > MAX_NONCE_LENGTH {
            return Err(BallotError::NonceTooLong(nonce_len));
        }
        if self.ranks.len() != num_options {
            return Err(BallotError::WrongRankCount {
                expected: num_options,
                found: self.ranks.len(),
            });
        }
        Ok(())
    }
}

// The credential must never end up in logs.
impl Debug for Submission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("credential", &"<redacted>")
            .field("nonce", &self.nonce)
            .field("ranks", &self.ranks)
            .finish()
    }
}

/// A submission that does not fit the election; always a bug in the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BallotError {
    #[error("nonce is required")]
    EmptyNonce,
    #[error("nonce is {0} characters long, at most {} are allowed", MAX_NONCE_LENGTH)]
    NonceTooLong(usize),
    #[error("ballot ranks {found} options, the election has {expected}")]
    WrongRankCount { expected: usize, found: usize },
}
