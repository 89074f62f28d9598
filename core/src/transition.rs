//! Transition estimator: observed state changes into a row-stochastic matrix.
//!
//! N[i][j] counts panel cells in state i whose following month is state j.
//! P is N normalized per row. A row with no observations stays all-zero
//! rather than dividing by zero, except the churned row under forced
//! absorption, which becomes [0, 0, 1].

use crate::{
    config::EstimationConfig,
    error::{ChainError, ChainResult},
    panel::Panel,
    types::{MonthWindow, State, STATE_COUNT, TRANSIENT_COUNT},
};
use serde::{Deserialize, Serialize};

/// Tolerance for row sums and absorbing-row checks.
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

// ── Counts ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionCounts {
    pub counts: [[u64; STATE_COUNT]; STATE_COUNT],
}

impl TransitionCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every (state, next_state) pair in the panel, optionally keeping
    /// only transitions whose both months fall inside `window`.
    pub fn from_panel(panel: &Panel, window: Option<MonthWindow>) -> Self {
        panel
            .cells()
            .iter()
            .filter(|c| window.map(|w| w.contains_transition(c.month_index)).unwrap_or(true))
            .filter_map(|c| c.next_state.map(|next| (c.state, next)))
            .collect()
    }

    pub fn record(&mut self, from: State, to: State) {
        self.counts[from.index()][to.index()] += 1;
    }

    pub fn get(&self, from: State, to: State) -> u64 {
        self.counts[from.index()][to.index()]
    }

    pub fn row_total(&self, from: State) -> u64 {
        self.counts[from.index()].iter().sum()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    /// Row-normalize into a transition matrix.
    pub fn normalize(&self, force_absorbing: bool) -> TransitionMatrix {
        let mut rows = [[0.0; STATE_COUNT]; STATE_COUNT];
        for from in State::ALL {
            let total = self.row_total(from);
            // Degenerate row: no observed outgoing transitions. Leave zeros.
            if total == 0 {
                continue;
            }
            for to in State::ALL {
                rows[from.index()][to.index()] = self.get(from, to) as f64 / total as f64;
            }
        }
        if force_absorbing {
            rows[State::Churned.index()] = absorbing_row(State::Churned);
        }
        TransitionMatrix { rows }
    }
}

impl FromIterator<(State, State)> for TransitionCounts {
    fn from_iter<T: IntoIterator<Item = (State, State)>>(iter: T) -> Self {
        let mut counts = Self::new();
        for (from, to) in iter {
            counts.record(from, to);
        }
        counts
    }
}

fn absorbing_row(state: State) -> [f64; STATE_COUNT] {
    let mut row = [0.0; STATE_COUNT];
    row[state.index()] = 1.0;
    row
}

// ── Matrix ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TransitionMatrix {
    rows: [[f64; STATE_COUNT]; STATE_COUNT],
}

impl TransitionMatrix {
    /// Accept a caller-supplied matrix. Every entry must lie in [0, 1] and
    /// every row must sum to 1 or be entirely zero.
    pub fn from_rows(rows: [[f64; STATE_COUNT]; STATE_COUNT]) -> ChainResult<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.iter().any(|p| !(0.0..=1.0).contains(p)) {
                return Err(ChainError::config(format!(
                    "row {i} has an entry outside [0, 1]: {row:?}"
                )));
            }
            let sum: f64 = row.iter().sum();
            if sum != 0.0 && (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(ChainError::config(format!(
                    "row {i} sums to {sum}, expected 1 or 0"
                )));
            }
        }
        Ok(Self { rows })
    }

    pub fn identity() -> Self {
        let mut rows = [[0.0; STATE_COUNT]; STATE_COUNT];
        for (i, row) in rows.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self { rows }
    }

    pub fn rows(&self) -> &[[f64; STATE_COUNT]; STATE_COUNT] {
        &self.rows
    }

    pub fn row(&self, from: State) -> [f64; STATE_COUNT] {
        self.rows[from.index()]
    }

    pub fn get(&self, from: State, to: State) -> f64 {
        self.rows[from.index()][to.index()]
    }

    /// One-step churn probability from `from`: P[from][Churned].
    pub fn churn_probability(&self, from: State) -> f64 {
        self.get(from, State::Churned)
    }

    pub fn row_sum(&self, from: State) -> f64 {
        self.rows[from.index()].iter().sum()
    }

    /// Every row sums to 1 within tolerance, or is exactly all-zero.
    pub fn is_row_stochastic(&self) -> bool {
        State::ALL.iter().all(|&s| {
            let sum = self.row_sum(s);
            sum == 0.0 || (sum - 1.0).abs() <= ROW_SUM_TOLERANCE
        })
    }

    /// True when `state` returns to itself with probability 1.
    pub fn is_absorbing(&self, state: State) -> bool {
        let row = self.row(state);
        State::ALL.iter().all(|&to| {
            let expected = if to == state { 1.0 } else { 0.0 };
            (row[to.index()] - expected).abs() <= ROW_SUM_TOLERANCE
        })
    }

    /// Matrix product self · other.
    pub fn multiply(&self, other: &TransitionMatrix) -> TransitionMatrix {
        let mut rows = [[0.0; STATE_COUNT]; STATE_COUNT];
        for (i, out_row) in rows.iter_mut().enumerate() {
            for (j, out) in out_row.iter_mut().enumerate() {
                *out = (0..STATE_COUNT).map(|k| self.rows[i][k] * other.rows[k][j]).sum();
            }
        }
        TransitionMatrix { rows }
    }

    /// Row vector π · self.
    pub fn apply(&self, pi: &[f64; STATE_COUNT]) -> [f64; STATE_COUNT] {
        let mut out = [0.0; STATE_COUNT];
        for (j, o) in out.iter_mut().enumerate() {
            *o = (0..STATE_COUNT).map(|i| pi[i] * self.rows[i][j]).sum();
        }
        out
    }

    /// Q: rows and columns restricted to the transient states {A, R}.
    pub fn transient_block(&self) -> [[f64; TRANSIENT_COUNT]; TRANSIENT_COUNT] {
        let mut q = [[0.0; TRANSIENT_COUNT]; TRANSIENT_COUNT];
        for (i, from) in State::TRANSIENT.iter().enumerate() {
            for (j, to) in State::TRANSIENT.iter().enumerate() {
                q[i][j] = self.get(*from, *to);
            }
        }
        q
    }

    /// Mean absolute element-wise difference to another matrix.
    pub fn mean_abs_diff(&self, other: &TransitionMatrix) -> f64 {
        let total: f64 = self
            .rows
            .iter()
            .flatten()
            .zip(other.rows.iter().flatten())
            .map(|(a, b)| (a - b).abs())
            .sum();
        total / (STATE_COUNT * STATE_COUNT) as f64
    }
}

// ── Estimation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEstimate {
    pub counts:          TransitionCounts,
    pub matrix:          TransitionMatrix,
    pub window:          Option<MonthWindow>,
    pub force_absorbing: bool,
}

/// Estimate N and P from the panel under the given options.
pub fn estimate(panel: &Panel, config: &EstimationConfig) -> ChainResult<TransitionEstimate> {
    config.validate()?;

    let counts = TransitionCounts::from_panel(panel, config.training_window);
    let matrix = counts.normalize(config.force_absorbing);

    for state in State::ALL {
        if counts.row_total(state) == 0 {
            log::debug!("transition: no observed transitions out of {state}, row left as {:?}", matrix.row(state));
        }
    }
    log::info!(
        "transition matrix estimated: transitions={} window={:?} force_absorbing={}",
        counts.total(), config.training_window, config.force_absorbing,
    );

    Ok(TransitionEstimate {
        counts,
        matrix,
        window: config.training_window,
        force_absorbing: config.force_absorbing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rows_normalize_to_zero_not_nan() {
        let counts = TransitionCounts::new();
        let p = counts.normalize(false);
        for s in State::ALL {
            assert_eq!(p.row(s), [0.0; STATE_COUNT]);
        }
        let p = counts.normalize(true);
        assert_eq!(p.row(State::Churned), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn from_rows_rejects_non_stochastic_rows() {
        assert!(TransitionMatrix::from_rows([[0.5, 0.5, 0.1], [0.0; 3], [0.0, 0.0, 1.0]]).is_err());
        assert!(TransitionMatrix::from_rows([[1.5, -0.5, 0.0], [0.0; 3], [0.0, 0.0, 1.0]]).is_err());
        assert!(TransitionMatrix::from_rows([[0.5, 0.5, 0.0], [0.0; 3], [0.0, 0.0, 1.0]]).is_ok());
    }

    #[test]
    fn mean_abs_diff_of_identical_matrices_is_zero() {
        let p = TransitionMatrix::identity();
        assert_eq!(p.mean_abs_diff(&p), 0.0);
    }
}
