//! Recording of vote submissions.

use log::{debug, info, warn};
use thiserror::Error;

use crate::logging::SubmissionId;
use crate::model::{
    ballot::{Ballot, BallotError, Submission},
    credential::{Credential, EligibilityHash},
    election::Election,
    receipt::{receipt, verifier, ReceiptToken},
    store::{Store, StoreError, Transaction},
};

/// Outcome of a vote submission that did not record a ballot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VoteError {
    #[error("Election {0} is not accepting votes")]
    ElectionNotOpen(String),
    #[error("This credential is not valid for this election")]
    InvalidCredential,
    #[error("Malformed ballot: {0}")]
    MalformedBallot(#[from] BallotError),
    #[error("Election {0} does not exist")]
    UnknownElection(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl VoteError {
    /// Is this a rejection the voter can act on, as opposed to a bug or an
    /// outage?
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::ElectionNotOpen(_) | Self::InvalidCredential)
    }
}

/// Record one submission against `election` inside `tx`.
///
/// On success exactly one ballot has been upserted and at most one verifier
/// inserted. The caller must roll `tx` back on error; [`Store::transaction`]
/// does so.
pub fn record_vote(
    tx: &mut dyn Transaction,
    election: &Election,
    submission: &Submission,
) -> Result<ReceiptToken, VoteError> {
    // Ballots are frozen outside the voting phase.
    if !election.phase.accepts_votes() {
        return Err(VoteError::ElectionNotOpen(election.ident.clone()));
    }

    // Check eligibility.
    let credential = eligible_credential(tx, &election.ident, &submission.credential)?;

    // Check the ballot fits the election.
    submission.validate(election.num_options())?;

    // Derive the tokens. The proof value lives only for the rest of this call.
    let proof = credential.proof_value();
    let receipt = receipt(&proof, &election.election_key);
    let verifier = verifier(&proof, &election.verify_key);

    // Record that this credential voted, then store or replace its ballot.
    tx.insert_verifier(&election.ident, verifier)?;
    tx.upsert_ballot(
        &election.ident,
        Ballot {
            receipt: receipt.clone(),
            nonce: submission.nonce.clone(),
            ranks: submission.ranks.clone(),
        },
    )?;

    Ok(receipt)
}

fn eligible_credential(
    tx: &dyn Transaction,
    ident: &str,
    submitted: &str,
) -> Result<Credential, VoteError> {
    let credential: Credential = submitted
        .parse()
        .map_err(|_| VoteError::InvalidCredential)?;
    let hash: EligibilityHash = credential.eligibility_hash();
    if tx.is_eligible(ident, &hash)? {
        Ok(credential)
    } else {
        Err(VoteError::InvalidCredential)
    }
}

fn open_election(tx: &dyn Transaction, ident: &str) -> Result<Election, VoteError> {
    let election = tx
        .election(ident)?
        .ok_or_else(|| VoteError::UnknownElection(ident.to_string()))?;
    if election.phase.accepts_votes() {
        Ok(election)
    } else {
        Err(VoteError::ElectionNotOpen(election.ident))
    }
}

/// Voter-facing operations on one store.
pub struct VoteRecorder<'s, S: Store> {
    store: &'s S,
}

impl<'s, S: Store> VoteRecorder<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Record a submission for the election `ident` and return its receipt.
    ///
    /// The whole submission runs in one transaction, so concurrent
    /// submissions never see each other's partial writes.
    pub fn record(&self, ident: &str, submission: &Submission) -> Result<ReceiptToken, VoteError> {
        let id = SubmissionId::next();
        debug!("[{id}] Vote submission for election {ident}");

        let result = self.store.transaction(|tx| {
            let election = tx
                .election(ident)?
                .ok_or_else(|| VoteError::UnknownElection(ident.to_string()))?;
            record_vote(tx, &election, submission)
        });

        match &result {
            Ok(receipt) => {
                info!("[{id}] Ballot recorded for election {ident}");
                debug!("[{id}] Receipt {receipt}");
            }
            Err(err) if err.is_rejection() => warn!("[{id}] Vote rejected: {err}"),
            Err(err) => warn!("[{id}] Vote failed: {err}"),
        }
        result
    }

    /// Check a credential without voting, e.g. before showing a ballot form.
    pub fn check_credential(&self, ident: &str, credential: &str) -> Result<(), VoteError> {
        self.store.transaction(|tx| {
            open_election(tx, ident)?;
            eligible_credential(tx, ident, credential).map(|_| ())
        })
    }

    /// Let a voter look up their ballot while voting is open.
    pub fn lookup_ballot(&self, ident: &str, receipt: &ReceiptToken) -> Result<Option<Ballot>, VoteError> {
        self.store.transaction(|tx| {
            open_election(tx, ident)?;
            Ok(tx.ballot(ident, receipt)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::model::store::MemoryStore;

    fn submission(credential: &Credential, nonce: &str, ranks: Vec<u32>) -> Submission {
        Submission::new(credential.expose(), nonce, ranks)
    }

    fn counts(store: &MemoryStore, ident: &str) -> (usize, usize) {
        store
            .transaction(|tx| Ok::<_, StoreError>((tx.verifiers(ident)?.len(), tx.ballots(ident)?.len())))
            .unwrap()
    }

    #[store_test(voting)]
    fn records_ballot_under_receipt(store: MemoryStore, election: Election) {
        let recorder = VoteRecorder::new(&store);
        let credential = &Credential::examples()[0];

        let receipt = recorder
            .record(&election.ident, &submission(credential, "tulip", vec![1, 2, 3, 4]))
            .unwrap();

        assert_eq!(receipt, crate::model::receipt::receipt(&credential.proof_value(), &election.election_key));
        let ballot = recorder.lookup_ballot(&election.ident, &receipt).unwrap().unwrap();
        assert_eq!(ballot.nonce, "tulip");
        assert_eq!(ballot.ranks, vec![1, 2, 3, 4]);
        assert_eq!(counts(&store, &election.ident), (1, 1));
    }

    #[store_test(voting)]
    fn resubmission_replaces_ballot(store: MemoryStore, election: Election) {
        let recorder = VoteRecorder::new(&store);
        let credential = &Credential::examples()[1];

        let first = recorder
            .record(&election.ident, &submission(credential, "first", vec![1, 2, 3, 4]))
            .unwrap();
        let second = recorder
            .record(&election.ident, &submission(credential, "second", vec![4, 3, 2, 1]))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(counts(&store, &election.ident), (1, 1));
        let ballot = recorder.lookup_ballot(&election.ident, &second).unwrap().unwrap();
        assert_eq!(ballot.nonce, "second");
        assert_eq!(ballot.ranks, vec![4, 3, 2, 1]);
    }

    #[store_test(voting)]
    fn credentials_are_normalised(store: MemoryStore, election: Election) {
        let recorder = VoteRecorder::new(&store);
        let typed = format!("  {}\n", Credential::examples()[2].expose().to_lowercase());

        let from_typed = recorder
            .record(&election.ident, &Submission::new(typed, "n", vec![1, 1, 1, 1]))
            .unwrap();
        let from_exact = recorder
            .record(&election.ident, &submission(&Credential::examples()[2], "n", vec![1, 1, 1, 1]))
            .unwrap();
        assert_eq!(from_typed, from_exact);
        assert_eq!(counts(&store, &election.ident), (1, 1));
    }

    #[store_test(voting)]
    fn rejects_unregistered_credential(store: MemoryStore, election: Election) {
        let recorder = VoteRecorder::new(&store);
        let unregistered = Credential::unregistered_example();

        for typed in [unregistered.expose(), "", "K8Q2-ZR7M"] {
            let result = recorder.record(&election.ident, &Submission::new(typed, "n", vec![1, 2, 3, 4]));
            assert_eq!(result, Err(VoteError::InvalidCredential));
            assert!(result.unwrap_err().is_rejection());
        }
        assert_eq!(
            recorder.check_credential(&election.ident, unregistered.expose()),
            Err(VoteError::InvalidCredential)
        );
        assert_eq!(
            recorder.check_credential(&election.ident, Credential::examples()[3].expose()),
            Ok(())
        );
        assert_eq!(counts(&store, &election.ident), (0, 0));
    }

    #[store_test(counting)]
    fn rejects_votes_outside_voting(store: MemoryStore, election: Election) {
        let recorder = VoteRecorder::new(&store);
        let credential = &Credential::examples()[0];

        let result = recorder.record(&election.ident, &submission(credential, "n", vec![1, 2, 3, 4]));
        assert_eq!(result, Err(VoteError::ElectionNotOpen(election.ident.clone())));
        assert_eq!(
            recorder.check_credential(&election.ident, credential.expose()),
            Err(VoteError::ElectionNotOpen(election.ident.clone()))
        );
        assert_eq!(counts(&store, &election.ident), (0, 0));
    }

    #[store_test(init)]
    fn record_vote_checks_phase_first(store: MemoryStore, election: Election) {
        // Even an unregistered credential is reported as a closed election.
        let result = store.transaction(|tx| {
            record_vote(
                tx,
                &election,
                &submission(&Credential::unregistered_example(), "n", vec![1, 2, 3, 4]),
            )
        });
        assert_eq!(result, Err(VoteError::ElectionNotOpen(election.ident.clone())));
    }

    #[store_test(voting)]
    fn malformed_ballot_has_no_side_effects(store: MemoryStore, election: Election) {
        let recorder = VoteRecorder::new(&store);
        let credential = &Credential::examples()[0];

        let result = recorder.record(&election.ident, &submission(credential, "n", vec![1, 2, 3]));
        assert_eq!(
            result,
            Err(VoteError::MalformedBallot(BallotError::WrongRankCount { expected: 4, found: 3 }))
        );
        assert!(!result.unwrap_err().is_rejection());

        let result = recorder.record(&election.ident, &submission(credential, &"x".repeat(17), vec![1, 2, 3, 4]));
        assert_eq!(result, Err(VoteError::MalformedBallot(BallotError::NonceTooLong(17))));
        assert_eq!(counts(&store, &election.ident), (0, 0));
    }

    #[store_test]
    fn unknown_election(store: MemoryStore) {
        let recorder = VoteRecorder::new(&store);
        let result = recorder.record("nope", &submission(&Credential::examples()[0], "n", vec![1, 2]));
        assert_eq!(result, Err(VoteError::UnknownElection("nope".to_string())));
    }

    #[store_test(voting)]
    fn lookup_of_unknown_receipt(store: MemoryStore, election: Election) {
        let recorder = VoteRecorder::new(&store);
        let receipt: ReceiptToken = "AAAAAAAA".parse().unwrap();
        assert_eq!(recorder.lookup_ballot(&election.ident, &receipt), Ok(None));
    }

    #[store_test(voting)]
    fn concurrent_submissions(store: MemoryStore, election: Election) {
        let recorder = VoteRecorder::new(&store);
        let credentials = Credential::examples();

        thread::scope(|scope| {
            for (i, credential) in credentials.iter().enumerate() {
                for round in 0..10u32 {
                    let recorder = &recorder;
                    let ident = &election.ident;
                    scope.spawn(move || {
                        let ranks = vec![round, i as u32, 1, 2];
                        recorder
                            .record(ident, &submission(credential, "race", ranks))
                            .unwrap();
                    });
                }
            }
        });

        assert_eq!(counts(&store, &election.ident), (credentials.len(), credentials.len()));
        // Each ballot is one whole submission from its own credential.
        for (i, credential) in credentials.iter().enumerate() {
            let receipt = crate::model::receipt::receipt(&credential.proof_value(), &election.election_key);
            let ballot = recorder.lookup_ballot(&election.ident, &receipt).unwrap().unwrap();
            assert_eq!(ballot.ranks[1], i as u32);
            assert!(ballot.ranks[0] < 10);
        }
    }

    #[test]
    fn rejection_classification() {
        assert!(VoteError::ElectionNotOpen("x".to_string()).is_rejection());
        assert!(VoteError::InvalidCredential.is_rejection());
        assert!(!VoteError::UnknownElection("x".to_string()).is_rejection());
        assert!(!VoteError::Store(StoreError::Poisoned).is_rejection());
    }
}
