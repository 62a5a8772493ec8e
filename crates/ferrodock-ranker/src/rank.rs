//! Top-K selection by binding affinity.

use std::cmp::Ordering;
use std::fmt;

use ferrodock_common::naming::{BEST_LABEL, WORST_LABEL};

use crate::table::ScoredRecord;

/// Which end of the affinity scale to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Lowest (most negative) energies first
    Best,
    /// Highest energies first
    Worst,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Best => BEST_LABEL,
            Direction::Worst => WORST_LABEL,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered subset of a table; `entries[0]` is rank 1.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSelection {
    pub direction: Direction,
    pub entries: Vec<ScoredRecord>,
}

/// NaN sorts after every number in both directions.
fn compare_affinity(a: f64, b: f64, direction: Direction) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match direction {
            Direction::Best => a.total_cmp(&b),
            Direction::Worst => b.total_cmp(&a),
        },
    }
}

/// The first `k` records after a stable sort by affinity; ties keep their
/// table order.
pub fn rank(records: &[ScoredRecord], direction: Direction, k: usize) -> RankedSelection {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| compare_affinity(a.affinity, b.affinity, direction));
    sorted.truncate(k);
    RankedSelection { direction, entries: sorted }
}
