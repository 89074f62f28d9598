//! Absorbing-chain analytics over the transient states {Active, AtRisk}.
//!
//! With Q the transient block of P:
//!   fundamental matrix  N̂ = (I − Q)⁻¹   (expected visits before churn)
//!   absorption time     t = N̂ · 1
//!   lifetime value      V = (I − γQ)⁻¹ · r
//!
//! (I − Q) is only invertible when every transient state eventually reaches
//! Churned. A transient cycle that never leaks is reported as
//! `SingularChain`; it never affects estimation or horizon queries.

use crate::{
    config::{validate_discount, ActivityMetric},
    error::{ChainError, ChainResult},
    linalg,
    panel::Panel,
    transition::TransitionMatrix,
    types::{State, STATE_COUNT, TRANSIENT_COUNT},
};
use serde::{Deserialize, Serialize};

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AbsorptionAnalysis {
    /// Rows/columns ordered Active, AtRisk.
    pub fundamental:     [[f64; TRANSIENT_COUNT]; TRANSIENT_COUNT],
    /// Expected months until churn, starting from Active / AtRisk.
    pub absorption_time: [f64; TRANSIENT_COUNT],
}

impl AbsorptionAnalysis {
    pub fn expected_time(&self, start: State) -> Option<f64> {
        transient_position(start).map(|i| self.absorption_time[i])
    }
}

/// Average per-period reward per state. Churned is always zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RewardVector {
    pub rewards: [f64; STATE_COUNT],
}

impl RewardVector {
    pub fn new(active: f64, at_risk: f64) -> Self {
        Self { rewards: [active, at_risk, 0.0] }
    }

    pub fn get(&self, state: State) -> f64 {
        self.rewards[state.index()]
    }

    fn transient(&self) -> [f64; TRANSIENT_COUNT] {
        [self.get(State::Active), self.get(State::AtRisk)]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifetimeValue {
    pub discount: f64,
    pub rewards:  RewardVector,
    /// Discounted expected reward before churn, from Active / AtRisk.
    pub values:   [f64; TRANSIENT_COUNT],
}

impl LifetimeValue {
    pub fn value(&self, start: State) -> Option<f64> {
        transient_position(start).map(|i| self.values[i])
    }

    /// LTV(Active) − LTV(AtRisk): what moving one at-risk customer back to
    /// active is worth.
    pub fn recovery_value(&self) -> f64 {
        self.values[0] - self.values[1]
    }
}

fn transient_position(state: State) -> Option<usize> {
    State::TRANSIENT.iter().position(|s| *s == state)
}

// ── Computations ─────────────────────────────────────────────────────────────

fn warn_if_not_absorbing(p: &TransitionMatrix) {
    if !p.is_absorbing(State::Churned) {
        log::warn!("absorbing: churned row {:?} is not absorbing; results describe Q only", p.row(State::Churned));
    }
}

/// (I − Q)⁻¹.
pub fn fundamental_matrix(p: &TransitionMatrix) -> ChainResult<[[f64; TRANSIENT_COUNT]; TRANSIENT_COUNT]> {
    warn_if_not_absorbing(p);
    let q = p.transient_block();
    linalg::invert(&linalg::identity_minus_scaled(&q, 1.0))
        .ok_or(ChainError::SingularChain { discount: 1.0 })
}

/// Fundamental matrix plus expected time to absorption (row sums).
pub fn absorption_analysis(p: &TransitionMatrix) -> ChainResult<AbsorptionAnalysis> {
    let fundamental = fundamental_matrix(p)?;
    let absorption_time = linalg::mat_vec(&fundamental, &[1.0; TRANSIENT_COUNT]);

    if absorption_time.iter().any(|t| !t.is_finite() || *t < 0.0) {
        return Err(ChainError::SingularChain { discount: 1.0 });
    }
    log::debug!("absorbing: expected time to churn A={:.3} R={:.3}", absorption_time[0], absorption_time[1]);

    Ok(AbsorptionAnalysis { fundamental, absorption_time })
}

/// V = (I − γQ)⁻¹ · r over transient states.
pub fn lifetime_value(p: &TransitionMatrix, rewards: RewardVector, discount: f64) -> ChainResult<LifetimeValue> {
    validate_discount(discount)?;
    warn_if_not_absorbing(p);

    let q = p.transient_block();
    let inv = linalg::invert(&linalg::identity_minus_scaled(&q, discount))
        .ok_or(ChainError::SingularChain { discount })?;
    let values = linalg::mat_vec(&inv, &rewards.transient());

    Ok(LifetimeValue { discount, rewards, values })
}

/// Mean monthly metric per state over the panel.
///
/// Uses summed amount for the amount metric and event count for the count
/// metric. With `drop_negative`, months whose amount is negative are left out
/// of the mean. States with no cells get zero; Churned is forced to zero.
pub fn reward_by_state(panel: &Panel, drop_negative: bool) -> RewardVector {
    let mut sums = [0.0; STATE_COUNT];
    let mut counts = [0u64; STATE_COUNT];

    for cell in panel.cells() {
        if drop_negative && cell.amount < 0.0 {
            continue;
        }
        let value = match panel.metric() {
            ActivityMetric::Amount => cell.amount,
            ActivityMetric::Count  => cell.event_count as f64,
        };
        sums[cell.state.index()] += value;
        counts[cell.state.index()] += 1;
    }

    let mut rewards = [0.0; STATE_COUNT];
    for (i, r) in rewards.iter_mut().enumerate() {
        if counts[i] > 0 {
            *r = sums[i] / counts[i] as f64;
        }
    }
    rewards[State::Churned.index()] = 0.0;
    RewardVector { rewards }
}
