use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phases in the election lifecycle. Elections only ever move forward,
/// one phase at a time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionPhase {
    /// Being set up; only visible to administrators.
    Init,
    /// Accepting and revising ballots.
    Voting,
    /// Ballots are frozen, results not yet published.
    Counting,
    /// Results and ballots are public.
    Results,
}

impl ElectionPhase {
    pub const ALL: [ElectionPhase; 4] = [Self::Init, Self::Voting, Self::Counting, Self::Results];

    /// The only phase this one may move to.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Voting),
            Self::Voting => Some(Self::Counting),
            Self::Counting => Some(Self::Results),
            Self::Results => None,
        }
    }

    /// Check that moving to `to` follows the transition table.
    pub fn transition(self, to: Self) -> Result<Self, TransitionError> {
        if self.next() == Some(to) {
            Ok(to)
        } else {
            Err(TransitionError { from: self, to })
        }
    }

    /// Are ballots accepted in this phase?
    pub fn accepts_votes(self) -> bool {
        self == Self::Voting
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Voting => "voting",
            Self::Counting => "counting",
            Self::Results => "results",
        }
    }
}

impl Display for ElectionPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ElectionPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot move election from {from} to {to}")]
pub struct TransitionError {
    pub from: ElectionPhase,
    pub to: ElectionPhase,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown election phase '{0}'")]
pub struct UnknownPhase(pub String);
