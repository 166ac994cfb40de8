//! Storage seam for elections and their records.
//!
//! All reads and writes go through a [`Transaction`] handed out by
//! [`Store::transaction`]; a closure that returns `Err` leaves the store
//! exactly as it found it.

use thiserror::Error;

pub use memory::MemoryStore;

use super::{
    ballot::Ballot,
    credential::EligibilityHash,
    election::Election,
    receipt::{ReceiptToken, VerifierToken},
    results::ResultSnapshot,
};

mod memory;

pub trait Store: Send + Sync {
    /// Run `f` atomically. Writes made by `f` are discarded if it fails.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StoreError>;
}

/// Operations available inside a transaction.
///
/// Methods taking an election ident fail with [`StoreError::UnknownElection`]
/// if no such election has been inserted.
pub trait Transaction {
    fn election(&self, ident: &str) -> Result<Option<Election>, StoreError>;

    /// All elections, ordered by ident.
    fn elections(&self) -> Result<Vec<Election>, StoreError>;

    /// Insert a new election. Returns `false`, changing nothing, if one with
    /// the same ident exists.
    fn insert_election(&mut self, election: Election) -> Result<bool, StoreError>;

    /// Replace an existing election record.
    fn update_election(&mut self, election: Election) -> Result<(), StoreError>;

    /// Insert-or-ignore. Returns whether the hash was new.
    fn insert_eligibility(&mut self, ident: &str, hash: EligibilityHash) -> Result<bool, StoreError>;

    fn is_eligible(&self, ident: &str, hash: &EligibilityHash) -> Result<bool, StoreError>;

    fn count_eligible(&self, ident: &str) -> Result<usize, StoreError>;

    /// Insert-or-ignore. Returns whether the verifier was new.
    fn insert_verifier(&mut self, ident: &str, verifier: VerifierToken) -> Result<bool, StoreError>;

    /// All verifiers, sorted.
    fn verifiers(&self, ident: &str) -> Result<Vec<VerifierToken>, StoreError>;

    /// Insert-or-replace by receipt. Returns whether a ballot was replaced.
    fn upsert_ballot(&mut self, ident: &str, ballot: Ballot) -> Result<bool, StoreError>;

    fn ballot(&self, ident: &str, receipt: &ReceiptToken) -> Result<Option<Ballot>, StoreError>;

    /// All ballots, sorted by receipt.
    fn ballots(&self, ident: &str) -> Result<Vec<Ballot>, StoreError>;

    /// Store the published result, replacing any previous one.
    fn publish_result(&mut self, ident: &str, result: ResultSnapshot) -> Result<(), StoreError>;

    fn result(&self, ident: &str) -> Result<Option<ResultSnapshot>, StoreError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store lock poisoned by a panicked transaction")]
    Poisoned,
    #[error("no records for election {0}")]
    UnknownElection(String),
    #[error("storage backend failed: {0}")]
    Backend(String),
}
