//! Operator-facing election management.

use std::fmt::{Display, Formatter};
use std::io::BufRead;

use log::{debug, info, warn};

use crate::audit::AuditExport;
use crate::error::{Error, Result};
use crate::model::{
    ballot::Ballot,
    credential::EligibilityHash,
    election::{Election, ElectionPhase, ElectionSpec},
    results::ResultSnapshot,
    store::{Store, Transaction},
};
use crate::tally::TallyResult;

/// Create a new election in [`ElectionPhase::Init`] with fresh keys.
pub fn create_election<S: Store>(store: &S, ident: &str, spec: ElectionSpec) -> Result<Election> {
    let election = Election::new(ident, spec);
    store.transaction(|tx| {
        if tx.insert_election(election.clone())? {
            Ok(())
        } else {
            Err(Error::DuplicateElection(ident.to_string()))
        }
    })?;
    info!(
        "Created election {ident} ({}) with {} options",
        election.title(),
        election.num_options()
    );
    Ok(election)
}

/// Replace the definition of an election that has not started yet.
pub fn update_election<S: Store>(store: &S, ident: &str, spec: ElectionSpec) -> Result<Election> {
    let election = store.transaction(|tx| {
        let mut election = existing(tx, ident)?;
        if election.phase != ElectionPhase::Init {
            return Err(Error::ElectionRunning(ident.to_string()));
        }
        election.spec = spec;
        tx.update_election(election.clone())?;
        Ok(election)
    })?;
    info!("Updated definition of election {ident}");
    Ok(election)
}

/// Counts reported by [`register_voters`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegistrationReport {
    /// Hashes read from the input.
    pub processed: usize,
    /// Registered voters before and after.
    pub before: usize,
    pub after: usize,
}

impl Display for RegistrationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Processed {} hashes. Registered voters: {} before, {} after.",
            self.processed, self.before, self.after
        )
    }
}

/// Merge a list of eligibility hashes into an election's eligibility set.
///
/// Blank lines and `#` comments are skipped. A malformed line aborts the
/// whole registration before anything is stored.
pub fn register_voters<S: Store>(store: &S, ident: &str, input: impl BufRead) -> Result<RegistrationReport> {
    let hashes = read_hashes(input)?;
    debug!("Read {} eligibility hashes for election {ident}", hashes.len());

    let report = store.transaction(|tx| {
        let election = existing(tx, ident)?;
        if !matches!(election.phase, ElectionPhase::Init | ElectionPhase::Voting) {
            return Err(Error::wrong_phase(ident, election.phase, "register voters"));
        }
        let before = tx.count_eligible(ident)?;
        for hash in &hashes {
            tx.insert_eligibility(ident, hash.clone())?;
        }
        Ok(RegistrationReport {
            processed: hashes.len(),
            before,
            after: tx.count_eligible(ident)?,
        })
    })?;
    info!("Election {ident}: {report}");
    Ok(report)
}

fn read_hashes(input: impl BufRead) -> Result<Vec<EligibilityHash>> {
    let mut hashes = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let hash: EligibilityHash = line.parse().map_err(|e| Error::Registration {
            line: i + 1,
            reason: format!("{e}"),
        })?;
        hashes.push(hash);
    }
    Ok(hashes)
}

/// Move an election to the next phase.
///
/// Entering [`ElectionPhase::Results`] tallies the frozen ballots and
/// publishes the outcome in the same transaction; if the tally fails the
/// election stays in counting.
pub fn advance_phase<S: Store>(store: &S, ident: &str, to: ElectionPhase) -> Result<Election> {
    let election = store.transaction(|tx| {
        let mut election = existing(tx, ident)?;
        election.phase = election.phase.transition(to)?;
        if to == ElectionPhase::Results {
            let snapshot = tally(tx, &election)?;
            tx.publish_result(ident, snapshot)?;
        }
        tx.update_election(election.clone())?;
        Ok(election)
    });

    match &election {
        Ok(_) => info!("Election {ident} is now in phase {to}"),
        Err(err) => warn!("Election {ident} not moved to phase {to}: {err}"),
    }
    election
}

/// Tally the current ballots without publishing anything.
pub fn compute_results<S: Store>(store: &S, ident: &str) -> Result<ResultSnapshot> {
    store.transaction(|tx| {
        let election = existing(tx, ident)?;
        tally(tx, &election)
    })
}

fn tally(tx: &dyn Transaction, election: &Election) -> Result<ResultSnapshot> {
    let ballots = tx.ballots(&election.ident)?;
    let result = TallyResult::compute(election.num_options(), ballots.iter().map(|b| &b.ranks))?;
    debug!(
        "Tallied {} ballots of election {}",
        result.ballots, election.ident
    );
    Ok(ResultSnapshot::new(election, result))
}

/// The published results.
pub fn results<S: Store>(store: &S, ident: &str) -> Result<ResultSnapshot> {
    store.transaction(|tx| {
        let election = existing(tx, ident)?;
        match tx.result(ident)? {
            Some(result) if election.phase == ElectionPhase::Results => Ok(result),
            _ => Err(Error::wrong_phase(ident, election.phase, "show results")),
        }
    })
}

/// All ballots, sorted by receipt. Only available once results are out.
pub fn ballots<S: Store>(store: &S, ident: &str) -> Result<Vec<Ballot>> {
    store.transaction(|tx| {
        let election = existing(tx, ident)?;
        if election.phase != ElectionPhase::Results {
            return Err(Error::wrong_phase(ident, election.phase, "list ballots"));
        }
        Ok(tx.ballots(ident)?)
    })
}

/// The verifier list for the turnout audit. Only available once voting
/// has closed.
pub fn export_verifiers<S: Store>(store: &S, ident: &str) -> Result<AuditExport> {
    store.transaction(|tx| {
        let election = existing(tx, ident)?;
        if !matches!(election.phase, ElectionPhase::Counting | ElectionPhase::Results) {
            return Err(Error::wrong_phase(ident, election.phase, "export verifiers"));
        }
        Ok(AuditExport::new(election.verify_key, tx.verifiers(ident)?))
    })
}

/// All elections, ordered by ident.
pub fn list_elections<S: Store>(store: &S) -> Result<Vec<Election>> {
    store.transaction(|tx| Ok(tx.elections()?))
}

fn existing(tx: &dyn Transaction, ident: &str) -> Result<Election> {
    tx.election(ident)?
        .ok_or_else(|| Error::UnknownElection(ident.to_string()))
}
