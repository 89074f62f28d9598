//! First-order memory test.
//!
//! For each (previous, current) pair, compare the next-state distribution of
//! customers who arrived in `current` from `previous` with the row of P for
//! `current`. Under the Markov property the previous state carries no extra
//! information and the two distributions agree.

use crate::{
    error::{ChainError, ChainResult},
    panel::Panel,
    transition::TransitionMatrix,
    types::{State, STATE_COUNT},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryGroup {
    pub prev:          State,
    pub curr:          State,
    /// Number of (prev, curr, next) triples in the group.
    pub sample:        u64,
    /// Next-state distribution conditioned on (prev, curr).
    pub conditional:   [f64; STATE_COUNT],
    /// Row `curr` of the fitted P.
    pub unconditional: [f64; STATE_COUNT],
    /// Mean absolute difference between the two distributions.
    pub divergence:    f64,
    /// False when the sample is below the configured minimum.
    pub reliable:      bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryReport {
    pub triples: u64,
    /// Sorted by divergence, largest first.
    pub groups:  Vec<MemoryGroup>,
}

impl MemoryReport {
    /// Largest divergence among groups with an adequate sample.
    pub fn max_reliable_divergence(&self) -> Option<f64> {
        self.groups
            .iter()
            .filter(|g| g.reliable)
            .map(|g| g.divergence)
            .fold(None, |acc, d| Some(acc.map_or(d, |a: f64| a.max(d))))
    }
}

pub fn memory_test(panel: &Panel, p: &TransitionMatrix, min_reliable_sample: u64) -> ChainResult<MemoryReport> {
    let mut counts: BTreeMap<(State, State), [u64; STATE_COUNT]> = BTreeMap::new();
    let mut triples = 0u64;

    for customer in panel.customers() {
        for w in customer.windows(3) {
            counts.entry((w[0].state, w[1].state)).or_default()[w[2].state.index()] += 1;
            triples += 1;
        }
    }

    if triples == 0 {
        return Err(ChainError::insufficient(
            "memory test needs at least 3 consecutive months for some customer",
        ));
    }

    let mut groups: Vec<MemoryGroup> = counts
        .into_iter()
        .map(|((prev, curr), next_counts)| {
            let sample: u64 = next_counts.iter().sum();
            let conditional = next_counts.map(|c| c as f64 / sample as f64);
            let unconditional = p.row(curr);
            let divergence = conditional
                .iter()
                .zip(unconditional.iter())
                .map(|(a, b)| (a - b).abs())
                .sum::<f64>()
                / STATE_COUNT as f64;
            MemoryGroup {
                prev,
                curr,
                sample,
                conditional,
                unconditional,
                divergence,
                reliable: sample >= min_reliable_sample,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.divergence
            .partial_cmp(&a.divergence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then((a.prev, a.curr).cmp(&(b.prev, b.curr)))
    });

    let unreliable = groups.iter().filter(|g| !g.reliable).count();
    if unreliable > 0 {
        log::warn!("memory test: {unreliable} of {} groups below {min_reliable_sample} samples", groups.len());
    }

    Ok(MemoryReport { triples, groups })
}
