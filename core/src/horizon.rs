//! Horizon analyzer: n-step probabilities and distribution forecasts.
//!
//! Pⁿ is built by repeated multiplication starting from the identity, so
//! P⁰ = I and P¹ = P exactly. All entries stay in [0, 1]; a few hundred
//! steps neither overflow nor underflow.

use crate::{
    error::{ChainError, ChainResult},
    transition::{TransitionMatrix, ROW_SUM_TOLERANCE},
    types::{State, STATE_COUNT},
};

/// Pⁿ. `n = 0` returns the identity.
pub fn matrix_power(p: &TransitionMatrix, n: u32) -> TransitionMatrix {
    if n == 0 {
        return TransitionMatrix::identity();
    }
    let mut acc = *p;
    for _ in 1..n {
        acc = acc.multiply(p);
    }
    acc
}

/// Check that π is a probability vector.
pub fn validate_distribution(pi: &[f64; STATE_COUNT]) -> ChainResult<()> {
    if pi.iter().any(|x| !x.is_finite() || *x < 0.0) {
        return Err(ChainError::config(format!("distribution has a negative or non-finite entry: {pi:?}")));
    }
    let sum: f64 = pi.iter().sum();
    if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
        return Err(ChainError::config(format!("distribution sums to {sum}, expected 1")));
    }
    Ok(())
}

/// π · Pⁿ.
pub fn distribution_after(
    pi: &[f64; STATE_COUNT],
    p: &TransitionMatrix,
    n: u32,
) -> ChainResult<[f64; STATE_COUNT]> {
    validate_distribution(pi)?;
    Ok(matrix_power(p, n).apply(pi))
}

/// P(in Churned after n steps | start) = (Pⁿ)[start][Churned].
///
/// With Churned absorbing this is the probability of having been absorbed
/// within n steps.
pub fn churn_within(p: &TransitionMatrix, n: u32, start: State) -> f64 {
    matrix_power(p, n).churn_probability(start)
}

/// Cumulative churn curve for n = 1..=max_n from one start state.
pub fn churn_curve(p: &TransitionMatrix, start: State, max_n: u32) -> Vec<f64> {
    let mut out = Vec::with_capacity(max_n as usize);
    let mut acc = TransitionMatrix::identity();
    for _ in 0..max_n {
        acc = acc.multiply(p);
        out.push(acc.churn_probability(start));
    }
    out
}

/// Forecast path π₀·Pⁿ for n = 0..=horizon.
pub fn forecast_path(
    pi0: &[f64; STATE_COUNT],
    p: &TransitionMatrix,
    horizon: u32,
) -> ChainResult<Vec<[f64; STATE_COUNT]>> {
    validate_distribution(pi0)?;
    let mut path = Vec::with_capacity(horizon as usize + 1);
    let mut current = *pi0;
    path.push(current);
    for _ in 0..horizon {
        current = p.apply(&current);
        path.push(current);
    }
    Ok(path)
}
