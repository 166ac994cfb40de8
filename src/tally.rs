//! Ranking of election options with the Schulze method.
//!
//! See Markus Schulze, "A new monotonic, clone-independent, reversal
//! symmetric, and Condorcet-consistent single-winner election method",
//! Social Choice and Welfare 36(2), 2011, and
//! <https://electowiki.org/wiki/Schulze_method>.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::election::MIN_OPTIONS;

/// Dense square matrix indexed by option index.
pub type Matrix = Vec<Vec<u64>>;

/// The full outcome of a tally, recomputed from scratch from a ballot set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyResult {
    pub num_options: usize,
    /// Number of ballots counted.
    pub ballots: u64,
    /// `beats[i][j]`: ballots ranking option `i` strictly ahead of `j`.
    pub beats: Matrix,
    /// `weights[i][j]`: margin by which `i` beats `j`, or zero.
    pub weights: Matrix,
    /// `strengths[i][j]`: width of the widest path from `i` to `j` in the
    /// weight graph.
    pub strengths: Matrix,
    /// Option beating every other option head-to-head, if any.
    pub condorcet_winner: Option<usize>,
    /// Options not beaten head-to-head by any other option.
    pub weak_condorcet_winners: Vec<usize>,
    /// Winner layers, best first. Each layer is sorted by option index.
    pub schulze_order: Vec<Vec<usize>>,
}

/// Input that cannot be tallied. Nothing may be published for it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TallyError {
    #[error("cannot rank {0} option(s), at least {} are required", MIN_OPTIONS)]
    TooFewOptions(usize),
    #[error("ballot #{index} ranks {found} options, expected {expected}")]
    BallotLength {
        index: usize,
        expected: usize,
        found: usize,
    },
}

impl TallyResult {
    /// Tally `ballots`, each a rank per option where lower is better and
    /// equal ranks mean no preference.
    pub fn compute<I, B>(num_options: usize, ballots: I) -> Result<Self, TallyError>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u32]>,
    {
        if num_options < MIN_OPTIONS {
            return Err(TallyError::TooFewOptions(num_options));
        }

        let (beats, count) = beat_matrix(num_options, ballots)?;
        let (condorcet_winner, weak_condorcet_winners) = condorcet_winners(&beats);
        let weights = weight_matrix(&beats);
        let strengths = widest_paths(&weights);

        let mut result = Self {
            num_options,
            ballots: count,
            beats,
            weights,
            strengths,
            condorcet_winner,
            weak_condorcet_winners,
            schulze_order: Vec::new(),
        };
        result.schulze_order = result.layers();
        Ok(result)
    }

    /// Is the strongest path from `i` to `j` wider than the one back?
    pub fn stronger(&self, i: usize, j: usize) -> bool {
        self.strengths[i][j] > self.strengths[j][i]
    }

    /// The overall winners: a single option unless tied.
    pub fn winners(&self) -> &[usize] {
        self.schulze_order.first().map(Vec::as_slice).unwrap_or_default()
    }

    /// Repeatedly peel off the options no remaining option is stronger than.
    fn layers(&self) -> Vec<Vec<usize>> {
        let mut remaining: Vec<usize> = (0..self.num_options).collect();
        let mut order = Vec::new();

        while !remaining.is_empty() {
            let (layer, rest): (Vec<usize>, Vec<usize>) = remaining
                .iter()
                .partition(|&&j| !remaining.iter().any(|&i| self.stronger(i, j)));
            // The stronger-than relation of path strengths is transitive.
            assert!(!layer.is_empty(), "every remaining option is dominated");
            order.push(layer);
            remaining = rest;
        }

        order
    }
}

fn beat_matrix<I, B>(n: usize, ballots: I) -> Result<(Matrix, u64), TallyError>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u32]>,
{
    let mut beats = vec![vec![0; n]; n];
    let mut count = 0;

    for (index, ballot) in ballots.into_iter().enumerate() {
        let ranks = ballot.as_ref();
        if ranks.len() != n {
            return Err(TallyError::BallotLength {
                index,
                expected: n,
                found: ranks.len(),
            });
        }
        for (i, row) in beats.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                if ranks[i] < ranks[j] {
                    *cell += 1;
                }
            }
        }
        count += 1;
    }

    Ok((beats, count))
}

/// The strict Condorcet winner, if any, and all weak Condorcet winners.
fn condorcet_winners(beats: &Matrix) -> (Option<usize>, Vec<usize>) {
    let n = beats.len();
    let others = |i: usize| (0..n).filter(move |&j| j != i);

    let strict = (0..n).find(|&i| others(i).all(|j| beats[i][j] > beats[j][i]));
    let weak = (0..n)
        .filter(|&i| others(i).all(|j| beats[i][j] >= beats[j][i]))
        .collect();

    (strict, weak)
}

fn weight_matrix(beats: &Matrix) -> Matrix {
    let n = beats.len();
    (0..n)
        .map(|i| {
            (0..n)
                .map(|j| beats[i][j].saturating_sub(beats[j][i]))
                .collect()
        })
        .collect()
}

/// Widest-path closure, Floyd-Warshall style.
///
/// Iteration `k` reads values written by earlier iterations, so the
/// `k` loop must stay outermost and run in order.
fn widest_paths(weights: &Matrix) -> Matrix {
    let n = weights.len();
    let mut strengths = weights.clone();

    for k in 0..n {
        for i in (0..n).filter(|&i| i != k) {
            for j in (0..n).filter(|&j| j != i && j != k) {
                let via_k = strengths[i][k].min(strengths[k][j]);
                if via_k > strengths[i][j] {
                    strengths[i][j] = via_k;
                }
            }
        }
    }

    strengths
}
