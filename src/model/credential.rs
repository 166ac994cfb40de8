use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt::{Debug, Display, Formatter};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use data_encoding::{BASE32, BASE64};
use log::warn;
use rand::{rngs::OsRng, CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Random bytes per credential. Five bytes encode to exactly eight base-32
/// characters, so no padding is produced.
pub const CREDENTIAL_BYTES: usize = 5;

/// Digests are truncated to this many bytes, i.e. 24 base64 characters.
pub const HASH_BYTES: usize = 18;

/// Length of an encoded [`EligibilityHash`] or [`ProofValue`].
pub const HASH_LENGTH: usize = HASH_BYTES / 3 * 4;

/// Longest credential we are willing to hash.
pub const MAX_CREDENTIAL_LENGTH: usize = 64;

const ELIGIBILITY_DOMAIN: &str = "eligibility:";
const PROOF_DOMAIN: &str = "proof:";

/// Extensions of the three files produced for a credential batch.
pub const CREDENTIALS_EXTENSION: &str = "cred";
pub const VERIFICATION_EXTENSION: &str = "verify";
pub const ELIGIBILITY_EXTENSION: &str = "eligible";

/// A voter's secret credential.
///
/// Never serialised, and redacted from `Debug` output; the only way to see
/// the secret is [`Credential::expose`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    /// Draw a new credential from the operating system's CSPRNG.
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Draw a new credential from the given CSPRNG.
    ///
    /// `O` and `I` are replaced by `8` and `9`, which the base-32 alphabet
    /// does not otherwise use, so a credential cannot be mistyped as `0`/`1`.
    pub fn generate_with(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let mut bytes = [0; CREDENTIAL_BYTES];
        rng.fill_bytes(&mut bytes);
        let encoded = BASE32.encode(&bytes).replace('O', "8").replace('I', "9");
        Self(encoded)
    }

    /// The public hash registered with the election authority.
    pub fn eligibility_hash(&self) -> EligibilityHash {
        EligibilityHash(domain_hash(ELIGIBILITY_DOMAIN, &self.0))
    }

    /// The private value receipts and verifiers are derived from.
    pub fn proof_value(&self) -> ProofValue {
        ProofValue(domain_hash(PROOF_DOMAIN, &self.0))
    }

    /// The secret itself, for handing to the voter.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Parse a credential as typed by a voter: surrounding whitespace is ignored
/// and letters are upper-cased, as generated credentials only contain
/// upper-case letters.
impl FromStr for Credential {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CredentialError::Empty);
        }
        let len = trimmed.chars().count();
        if len > MAX_CREDENTIAL_LENGTH {
            return Err(CredentialError::TooLong(len));
        }
        if let Some(c) = trimmed.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(CredentialError::InvalidChar(c));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential is empty")]
    Empty,
    #[error("credential is {0} characters long, at most {} are allowed", MAX_CREDENTIAL_LENGTH)]
    TooLong(usize),
    #[error("credential must only contain letters and digits, found '{0}'")]
    InvalidChar(char),
}

/// `base64(SHA-256(domain || credential)[..18])`.
fn domain_hash(domain: &str, credential: &str) -> String {
    let digest = Sha256::new()
        .chain_update(domain.as_bytes())
        .chain_update(credential.as_bytes())
        .finalize();
    BASE64.encode(&digest[..HASH_BYTES])
}

/// Check that `s` looks like the output of [`domain_hash`].
fn parse_hash(s: &str) -> Result<String, HashFormatError> {
    let s = s.trim();
    if s.len() != HASH_LENGTH {
        return Err(HashFormatError::Length(s.len()));
    }
    match BASE64.decode(s.as_bytes()) {
        Ok(bytes) if bytes.len() == HASH_BYTES => Ok(s.to_string()),
        _ => Err(HashFormatError::Encoding),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashFormatError {
    #[error("expected {} characters, found {0}", HASH_LENGTH)]
    Length(usize),
    #[error("not valid base64")]
    Encoding,
}

/// Public one-way derivative of a credential proving the right to vote.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EligibilityHash(String);

impl EligibilityHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EligibilityHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EligibilityHash {
    type Err = HashFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hash(s).map(Self)
    }
}

/// Second one-way derivative of a credential, independent of the
/// [`EligibilityHash`]. Only the credential generator keeps these.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProofValue(String);

impl ProofValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for ProofValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProofValue(<redacted>)")
    }
}

impl FromStr for ProofValue {
    type Err = HashFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hash(s).map(Self)
    }
}

/// One generated credential together with its derived values.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub credential: Credential,
    pub proof_value: ProofValue,
    pub eligibility_hash: EligibilityHash,
}

impl BatchEntry {
    fn new(credential: Credential) -> Self {
        Self {
            proof_value: credential.proof_value(),
            eligibility_hash: credential.eligibility_hash(),
            credential,
        }
    }
}

/// A batch of distinct credentials, generated offline before an election.
#[derive(Debug, Clone)]
pub struct CredentialBatch {
    pub entries: Vec<BatchEntry>,
}

impl CredentialBatch {
    /// Generate `count` distinct credentials from the operating system's CSPRNG.
    pub fn generate(count: usize) -> Self {
        Self::generate_with(count, &mut OsRng)
    }

    /// Generate `count` distinct credentials. Duplicates drawn from the RNG
    /// are discarded and redrawn.
    pub fn generate_with(count: usize, rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let mut seen = HashSet::with_capacity(count);
        let mut entries = Vec::with_capacity(count);
        while entries.len() < count {
            let credential = Credential::generate_with(rng);
            if !seen.insert(credential.clone()) {
                warn!("Discarding duplicate credential, drawing another");
                continue;
            }
            entries.push(BatchEntry::new(credential));
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write `BASE.cred`, `BASE.verify` and `BASE.eligible`, one token per
    /// line in matching order. Returns the paths in that order.
    pub fn write_files(&self, base: &Path) -> io::Result<[PathBuf; 3]> {
        let paths = [
            with_suffix(base, CREDENTIALS_EXTENSION),
            with_suffix(base, VERIFICATION_EXTENSION),
            with_suffix(base, ELIGIBILITY_EXTENSION),
        ];
        let mut credentials = BufWriter::new(File::create(&paths[0])?);
        let mut proofs = BufWriter::new(File::create(&paths[1])?);
        let mut hashes = BufWriter::new(File::create(&paths[2])?);
        for entry in &self.entries {
            writeln!(credentials, "{}", entry.credential.expose())?;
            writeln!(proofs, "{}", entry.proof_value.as_str())?;
            writeln!(hashes, "{}", entry.eligibility_hash)?;
        }
        credentials.flush()?;
        proofs.flush()?;
        hashes.flush()?;
        Ok(paths)
    }
}

/// `base` with `.extension` appended, keeping any dots already in it.
fn with_suffix(base: &Path, extension: &str) -> PathBuf {
    let mut path = OsString::from(base.as_os_str());
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}
