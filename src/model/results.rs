use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::election::Election;
use crate::tally::TallyResult;

/// Published outcome of an election, frozen when it enters the results phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub election: String,
    pub title: String,
    /// Option names, indexed like the tally matrices.
    pub options: Vec<String>,
    pub computed_at: DateTime<Utc>,
    pub tally: TallyResult,
}

impl ResultSnapshot {
    pub fn new(election: &Election, tally: TallyResult) -> Self {
        Self {
            election: election.ident.clone(),
            title: election.spec.title.clone(),
            options: election.spec.options.clone(),
            computed_at: Utc::now(),
            tally,
        }
    }

    /// Names of the winning options.
    pub fn winner_names(&self) -> Vec<&str> {
        self.tally
            .winners()
            .iter()
            .map(|&i| self.options[i].as_str())
            .collect()
    }

    fn names(&self, layer: &[usize]) -> String {
        layer
            .iter()
            .map(|&i| self.options[i].as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Human-readable ranking, one line per place.
impl Display for ResultSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(
            f,
            "{} ballot(s), computed {}",
            self.tally.ballots,
            self.computed_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        match self.tally.condorcet_winner {
            Some(winner) => writeln!(f, "Condorcet winner: {}", self.options[winner])?,
            None => writeln!(f, "No Condorcet winner")?,
        }

        let mut place = 1;
        for layer in &self.tally.schulze_order {
            let tie = if layer.len() > 1 { " (tie)" } else { "" };
            writeln!(f, "{place:>3}. {}{tie}", self.names(layer))?;
            place += layer.len();
        }
        Ok(())
    }
}
