use std::io::Error as IoError;

use serde_json::Error as JsonError;
use thiserror::Error;

use crate::model::{
    election::{ConfigError, ElectionPhase, TransitionError},
    store::StoreError,
};
use crate::tally::TallyError;

pub type Result<T> = std::result::Result<T, Error>;

/// Operator-facing errors of administrative operations.
///
/// Voter-facing rejections are not part of this type; see
/// [`crate::recorder::VoteError`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid election configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Election {0} does not exist")]
    UnknownElection(String),
    #[error("Election {0} already exists")]
    DuplicateElection(String),
    #[error("Election {0} is already running, cannot change its configuration")]
    ElectionRunning(String),
    #[error("Election {ident} is in phase {phase}, cannot {action}")]
    WrongPhase {
        ident: String,
        phase: ElectionPhase,
        action: &'static str,
    },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Tally aborted: {0}")]
    Tally(#[from] TallyError),
    #[error("Line {line}: {reason}")]
    Registration { line: usize, reason: String },
    #[error("Failed to initialise logging: {0}")]
    Logging(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Json(#[from] JsonError),
}

impl Error {
    /// Shorthand for a [`Error::WrongPhase`].
    pub fn wrong_phase(ident: impl Into<String>, phase: ElectionPhase, action: &'static str) -> Self {
        Self::WrongPhase {
            ident: ident.into(),
            phase,
            action,
        }
    }
}
