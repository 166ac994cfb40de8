//! Turnout audit: checking published verifiers against the credentials
//! that were issued.
//!
//! After voting the authority publishes every recorded verifier together
//! with the election's verify key. Whoever generated the credentials holds
//! the matching proof values and can recompute each credential's verifier,
//! proving that every recorded voter held an issued credential.

use std::collections::{BTreeMap, HashSet};
use std::fmt::{Display, Formatter};
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::model::{
    credential::ProofValue,
    receipt::{verifier, ElectionKey, VerifierToken},
};

/// Prefix of the header line carrying the verify key.
pub const KEY_HEADER: &str = "# verify-key ";

/// The published verifier list of one election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditExport {
    pub verify_key: ElectionKey,
    /// Sorted.
    pub verifiers: Vec<VerifierToken>,
}

impl AuditExport {
    pub fn new(verify_key: ElectionKey, mut verifiers: Vec<VerifierToken>) -> Self {
        verifiers.sort_unstable();
        Self {
            verify_key,
            verifiers,
        }
    }

    pub fn write_to(&self, mut out: impl Write) -> io::Result<()> {
        writeln!(out, "{KEY_HEADER}{}", self.verify_key.as_str())?;
        for verifier in &self.verifiers {
            writeln!(out, "{verifier}")?;
        }
        out.flush()
    }

    /// Parse an export. Comment lines other than the key header and blank
    /// lines are ignored.
    pub fn read_from(input: impl BufRead) -> Result<Self, AuditError> {
        let mut verify_key: Option<ElectionKey> = None;
        let mut verifiers = Vec::new();

        for (number, line) in numbered_lines(input) {
            let line = line?;
            if let Some(key) = line.strip_prefix(KEY_HEADER.trim_end()) {
                let key: ElectionKey = key.parse().map_err(|e| AuditError::format(number, e))?;
                if verify_key.replace(key).is_some() {
                    return Err(AuditError::format(number, "second verify-key header"));
                }
            } else if !is_comment(&line) {
                let verifier: VerifierToken =
                    line.parse().map_err(|e| AuditError::format(number, e))?;
                verifiers.push(verifier);
            }
        }

        let verify_key = verify_key.ok_or(AuditError::MissingKey)?;
        Ok(Self::new(verify_key, verifiers))
    }
}

/// Read a private verification list, one proof value per line.
pub fn read_verification_list(input: impl BufRead) -> Result<Vec<ProofValue>, AuditError> {
    let mut proofs = Vec::new();
    for (number, line) in numbered_lines(input) {
        let line = line?;
        if !is_comment(&line) {
            let proof: ProofValue = line.parse().map_err(|e| AuditError::format(number, e))?;
            proofs.push(proof);
        }
    }
    Ok(proofs)
}

/// Trimmed lines with 1-based line numbers.
fn numbered_lines(input: impl BufRead) -> impl Iterator<Item = (usize, Result<String, AuditError>)> {
    input.lines().enumerate().map(|(i, line)| {
        (
            i + 1,
            line.map(|l| l.trim().to_string())
                .map_err(|e| AuditError::Io(e.to_string())),
        )
    })
}

fn is_comment(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

/// Outcome of checking an [`AuditExport`] against a verification list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    /// Distinct verifiers published.
    pub published: usize,
    /// Proof values in the verification list.
    pub issued: usize,
    /// Published verifiers belonging to an issued credential.
    pub matched: usize,
    /// Published verifiers belonging to no issued credential.
    pub unknown: Vec<VerifierToken>,
    /// Verifiers published more than once.
    pub duplicates: Vec<VerifierToken>,
}

impl AuditReport {
    pub fn is_verified(&self) -> bool {
        self.unknown.is_empty() && self.duplicates.is_empty()
    }
}

impl Display for AuditReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Published verifiers: {}", self.published)?;
        writeln!(f, "Issued credentials: {}", self.issued)?;
        writeln!(f, "Matched: {}", self.matched)?;
        if !self.unknown.is_empty() {
            writeln!(f, "Unknown verifiers: {}", self.unknown.len())?;
            for verifier in &self.unknown {
                writeln!(f, "  {verifier}")?;
            }
        }
        if !self.duplicates.is_empty() {
            writeln!(f, "Duplicated verifiers: {}", self.duplicates.len())?;
            for verifier in &self.duplicates {
                writeln!(f, "  {verifier}")?;
            }
        }
        Ok(())
    }
}

/// Recompute the verifier of every issued proof value under the published
/// key and match the published list against them.
pub fn audit(proofs: &[ProofValue], export: &AuditExport) -> AuditReport {
    let expected: HashSet<VerifierToken> = proofs
        .iter()
        .map(|proof| verifier(proof, &export.verify_key))
        .collect();

    let mut occurrences = BTreeMap::new();
    for verifier in &export.verifiers {
        *occurrences.entry(verifier).or_insert(0usize) += 1;
    }

    let duplicates = occurrences
        .iter()
        .filter(|(_, &count)| count > 1)
        .map(|(&verifier, _)| verifier.clone())
        .collect();
    let unknown: Vec<VerifierToken> = occurrences
        .keys()
        .filter(|verifier| !expected.contains(**verifier))
        .map(|&verifier| verifier.clone())
        .collect();

    AuditReport {
        published: occurrences.len(),
        issued: proofs.len(),
        matched: occurrences.len() - unknown.len(),
        unknown,
        duplicates,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("missing '{}' header", KEY_HEADER.trim_end())]
    MissingKey,
    #[error("line {line}: {reason}")]
    Format { line: usize, reason: String },
}

impl AuditError {
    fn format(line: usize, reason: impl Display) -> Self {
        Self::Format {
            line,
            reason: reason.to_string(),
        }
    }
}
