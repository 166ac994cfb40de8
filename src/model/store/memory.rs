use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use std::sync::Mutex;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{Store, StoreError, Transaction};
use crate::model::{
    ballot::Ballot,
    credential::EligibilityHash,
    election::Election,
    receipt::{ReceiptToken, VerifierToken},
    results::ResultSnapshot,
};

/// Reference [`Store`] keeping everything in memory behind one mutex.
///
/// The mutex is held for the whole of a transaction, so transactions are
/// serialised. State can be snapshotted to and restored from a JSON file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Records {
    elections: BTreeMap<String, ElectionRecords>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ElectionRecords {
    election: Election,
    eligible: BTreeSet<EligibilityHash>,
    verifiers: BTreeSet<VerifierToken>,
    ballots: BTreeMap<ReceiptToken, Ballot>,
    result: Option<ResultSnapshot>,
}

impl ElectionRecords {
    fn new(election: Election) -> Self {
        Self {
            election,
            eligible: BTreeSet::new(),
            verifiers: BTreeSet::new(),
            ballots: BTreeMap::new(),
            result: None,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`MemoryStore::save`]. A missing file
    /// gives an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("No data file at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(err) => return Err(backend(path, err)),
        };
        let records: Records =
            serde_json::from_reader(BufReader::new(file)).map_err(|err| backend(path, err))?;
        debug!(
            "Loaded {} election(s) from {}",
            records.elections.len(),
            path.display()
        );
        Ok(Self {
            records: Mutex::new(records),
        })
    }

    /// Write a snapshot of the whole store to `path`.
    ///
    /// The snapshot goes to a sibling temporary file first and is then
    /// renamed over `path`, so a crash never leaves a truncated file.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let tmp = path.with_extension("json.tmp");
        let write = || -> std::io::Result<()> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &*records)?;
            writer.flush()?;
            drop(writer);
            fs::rename(&tmp, path)
        };
        write().map_err(|err| backend(path, err))?;
        debug!("Saved store to {}", path.display());
        Ok(())
    }
}

fn backend(path: &Path, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("{}: {err}", path.display()))
}

impl Store for MemoryStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let mut tx = MemoryTransaction {
            records: &mut *records,
            undo: Vec::new(),
        };
        let result = f(&mut tx);
        if result.is_err() {
            tx.rollback();
        }
        result
    }
}

/// Reverse of one write made inside a transaction.
enum Undo {
    RemoveElection(String),
    RestoreElection(Election),
    RemoveEligibility(String, EligibilityHash),
    RemoveVerifier(String, VerifierToken),
    RestoreBallot(String, ReceiptToken, Option<Ballot>),
    RestoreResult(String, Option<ResultSnapshot>),
}

struct MemoryTransaction<'r> {
    records: &'r mut Records,
    undo: Vec<Undo>,
}

impl MemoryTransaction<'_> {
    fn get(&self, ident: &str) -> Result<&ElectionRecords, StoreError> {
        self.records
            .elections
            .get(ident)
            .ok_or_else(|| StoreError::UnknownElection(ident.to_string()))
    }

    fn get_mut(&mut self, ident: &str) -> Result<&mut ElectionRecords, StoreError> {
        self.records
            .elections
            .get_mut(ident)
            .ok_or_else(|| StoreError::UnknownElection(ident.to_string()))
    }

    fn rollback(&mut self) {
        debug!("Rolling back {} write(s)", self.undo.len());
        while let Some(undo) = self.undo.pop() {
            let elections = &mut self.records.elections;
            match undo {
                Undo::RemoveElection(ident) => {
                    elections.remove(&ident);
                }
                Undo::RestoreElection(election) => {
                    if let Some(records) = elections.get_mut(&election.ident) {
                        records.election = election;
                    }
                }
                Undo::RemoveEligibility(ident, hash) => {
                    if let Some(records) = elections.get_mut(&ident) {
                        records.eligible.remove(&hash);
                    }
                }
                Undo::RemoveVerifier(ident, verifier) => {
                    if let Some(records) = elections.get_mut(&ident) {
                        records.verifiers.remove(&verifier);
                    }
                }
                Undo::RestoreBallot(ident, receipt, previous) => {
                    if let Some(records) = elections.get_mut(&ident) {
                        match previous {
                            Some(ballot) => records.ballots.insert(receipt, ballot),
                            None => records.ballots.remove(&receipt),
                        };
                    }
                }
                Undo::RestoreResult(ident, previous) => {
                    if let Some(records) = elections.get_mut(&ident) {
                        records.result = previous;
                    }
                }
            }
        }
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn election(&self, ident: &str) -> Result<Option<Election>, StoreError> {
        Ok(self
            .records
            .elections
            .get(ident)
            .map(|records| records.election.clone()))
    }

    fn elections(&self) -> Result<Vec<Election>, StoreError> {
        Ok(self
            .records
            .elections
            .values()
            .map(|records| records.election.clone())
            .collect())
    }

    fn insert_election(&mut self, election: Election) -> Result<bool, StoreError> {
        if self.records.elections.contains_key(&election.ident) {
            return Ok(false);
        }
        let ident = election.ident.clone();
        self.records
            .elections
            .insert(ident.clone(), ElectionRecords::new(election));
        self.undo.push(Undo::RemoveElection(ident));
        Ok(true)
    }

    fn update_election(&mut self, election: Election) -> Result<(), StoreError> {
        let records = self.get_mut(&election.ident)?;
        let previous = std::mem::replace(&mut records.election, election);
        self.undo.push(Undo::RestoreElection(previous));
        Ok(())
    }

    fn insert_eligibility(&mut self, ident: &str, hash: EligibilityHash) -> Result<bool, StoreError> {
        let inserted = self.get_mut(ident)?.eligible.insert(hash.clone());
        if inserted {
            self.undo
                .push(Undo::RemoveEligibility(ident.to_string(), hash));
        }
        Ok(inserted)
    }

    fn is_eligible(&self, ident: &str, hash: &EligibilityHash) -> Result<bool, StoreError> {
        Ok(self.get(ident)?.eligible.contains(hash))
    }

    fn count_eligible(&self, ident: &str) -> Result<usize, StoreError> {
        Ok(self.get(ident)?.eligible.len())
    }

    fn insert_verifier(&mut self, ident: &str, verifier: VerifierToken) -> Result<bool, StoreError> {
        let inserted = self.get_mut(ident)?.verifiers.insert(verifier.clone());
        if inserted {
            self.undo
                .push(Undo::RemoveVerifier(ident.to_string(), verifier));
        }
        Ok(inserted)
    }

    fn verifiers(&self, ident: &str) -> Result<Vec<VerifierToken>, StoreError> {
        Ok(self.get(ident)?.verifiers.iter().cloned().collect())
    }

    fn upsert_ballot(&mut self, ident: &str, ballot: Ballot) -> Result<bool, StoreError> {
        let receipt = ballot.receipt.clone();
        let previous = self.get_mut(ident)?.ballots.insert(receipt.clone(), ballot);
        let replaced = previous.is_some();
        self.undo
            .push(Undo::RestoreBallot(ident.to_string(), receipt, previous));
        Ok(replaced)
    }

    fn ballot(&self, ident: &str, receipt: &ReceiptToken) -> Result<Option<Ballot>, StoreError> {
        Ok(self.get(ident)?.ballots.get(receipt).cloned())
    }

    fn ballots(&self, ident: &str) -> Result<Vec<Ballot>, StoreError> {
        Ok(self.get(ident)?.ballots.values().cloned().collect())
    }

    fn publish_result(&mut self, ident: &str, result: ResultSnapshot) -> Result<(), StoreError> {
        let previous = self.get_mut(ident)?.result.replace(result);
        self.undo
            .push(Undo::RestoreResult(ident.to_string(), previous));
        Ok(())
    }

    fn result(&self, ident: &str) -> Result<Option<ResultSnapshot>, StoreError> {
        Ok(self.get(ident)?.result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{credential::Credential, election::ElectionPhase, receipt::receipt};

    fn example_ballot(election: &Election, credential: &Credential, ranks: Vec<u32>) -> Ballot {
        Ballot {
            receipt: receipt(&credential.proof_value(), &election.election_key),
            nonce: "tulip".to_string(),
            ranks,
        }
    }

    #[store_test]
    fn unknown_election(store: MemoryStore) {
        let result = store.transaction(|tx| tx.count_eligible("nope"));
        assert_eq!(result, Err(StoreError::UnknownElection("nope".to_string())));
        let result = store.transaction(|tx| tx.election("nope"));
        assert_eq!(result, Ok(None));
    }

    #[store_test(init)]
    fn insert_election_is_insert_or_ignore(store: MemoryStore, election: Election) {
        let renamed = Election {
            phase: ElectionPhase::Voting,
            ..election.clone()
        };
        let inserted = store.transaction(|tx| tx.insert_election(renamed));
        assert_eq!(inserted, Ok(false));
        let stored = store.transaction(|tx| tx.election(&election.ident)).unwrap();
        assert_eq!(stored, Some(election));
    }

    #[store_test(init)]
    fn eligibility_is_insert_or_ignore(store: MemoryStore, election: Election) {
        let hash = Credential::examples()[0].eligibility_hash();
        let (inserted, count) = store
            .transaction(|tx| {
                let inserted = tx.insert_eligibility(&election.ident, hash.clone())?;
                Ok::<_, StoreError>((inserted, tx.count_eligible(&election.ident)?))
            })
            .unwrap();
        assert!(!inserted);
        assert_eq!(count, Credential::examples().len());
    }

    #[store_test(voting)]
    fn failed_transaction_rolls_back(store: MemoryStore, election: Election) {
        let credential = &Credential::examples()[0];
        let first = example_ballot(&election, credential, vec![1, 2, 3, 4]);
        store
            .transaction(|tx| tx.upsert_ballot(&election.ident, first.clone()))
            .unwrap();

        let result: Result<(), StoreError> = store.transaction(|tx| {
            let new = Credential::unregistered_example();
            tx.insert_eligibility(&election.ident, new.eligibility_hash())?;
            tx.upsert_ballot(
                &election.ident,
                example_ballot(&election, credential, vec![4, 3, 2, 1]),
            )?;
            tx.update_election(Election {
                phase: ElectionPhase::Counting,
                ..election.clone()
            })?;
            Err(StoreError::Backend("simulated failure".to_string()))
        });
        assert!(result.is_err());

        store
            .transaction(|tx| {
                assert_eq!(tx.count_eligible(&election.ident)?, Credential::examples().len());
                assert_eq!(tx.ballots(&election.ident)?, vec![first.clone()]);
                assert_eq!(
                    tx.election(&election.ident)?.map(|e| e.phase),
                    Some(ElectionPhase::Voting)
                );
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }

    #[store_test(voting)]
    fn rollback_removes_inserted_election(store: MemoryStore, election: Election) {
        let result: Result<(), StoreError> = store.transaction(|tx| {
            tx.insert_election(Election {
                ident: "board".to_string(),
                ..election.clone()
            })?;
            Err(StoreError::Backend("simulated failure".to_string()))
        });
        assert!(result.is_err());
        let idents: Vec<_> = store
            .transaction(|tx| tx.elections())
            .unwrap()
            .into_iter()
            .map(|e| e.ident)
            .collect();
        assert_eq!(idents, vec![election.ident]);
    }

    #[store_test(voting)]
    fn snapshot_survives_save_and_load(store: MemoryStore, election: Election) {
        let credential = &Credential::examples()[1];
        let ballot = example_ballot(&election, credential, vec![2, 1, 2, 3]);
        store
            .transaction(|tx| tx.upsert_ballot(&election.ident, ballot.clone()))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icelect.json");
        store.save(&path).unwrap();
        let loaded = MemoryStore::load(&path).unwrap();
        let (stored, eligible) = loaded
            .transaction(|tx| {
                Ok::<_, StoreError>((
                    tx.ballot(&election.ident, &ballot.receipt)?,
                    tx.count_eligible(&election.ident)?,
                ))
            })
            .unwrap();
        assert_eq!(stored, Some(ballot));
        assert_eq!(eligible, Credential::examples().len());
    }

    #[test]
    fn loading_missing_file_gives_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(store.transaction(|tx| tx.elections()), Ok(vec![]));
    }

    #[test]
    fn loading_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            MemoryStore::load(&path),
            Err(StoreError::Backend(_))
        ));
    }
}
