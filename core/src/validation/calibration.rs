//! Probabilistic calibration of the one-step churn prediction.
//!
//! Every cell with a following month is one evaluation row: the prediction
//! is P[state][Churned], the label is whether the next state is Churned.

use crate::{
    config::validate_threshold,
    error::{ChainError, ChainResult},
    panel::Panel,
    transition::TransitionMatrix,
    types::State,
};
use serde::{Deserialize, Serialize};

/// Probabilities are clipped to [ε, 1 − ε] before taking logs.
pub const LOG_LOSS_EPSILON: f64 = 1e-15;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfusionCounts {
    pub true_positive:  u64,
    pub false_positive: u64,
    pub true_negative:  u64,
    pub false_negative: u64,
}

impl ConfusionCounts {
    pub fn total(&self) -> u64 {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalibrationReport {
    pub threshold:      f64,
    pub rows:           u64,
    pub confusion:      ConfusionCounts,
    pub precision:      f64,
    pub recall:         f64,
    pub accuracy:       f64,
    pub log_loss:       f64,
    pub brier:          f64,
    pub observed_rate:  f64,
    pub mean_predicted: f64,
}

/// Confusion counts at `threshold`; a prediction at or above it is positive.
pub fn confusion_counts(labels: &[bool], probs: &[f64], threshold: f64) -> ConfusionCounts {
    let mut c = ConfusionCounts::default();
    for (&y, &p) in labels.iter().zip(probs) {
        match (p >= threshold, y) {
            (true, true)   => c.true_positive += 1,
            (true, false)  => c.false_positive += 1,
            (false, false) => c.true_negative += 1,
            (false, true)  => c.false_negative += 1,
        }
    }
    c
}

/// Mean binary cross-entropy with clipped probabilities. Zero for no rows.
pub fn log_loss(labels: &[bool], probs: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = labels
        .iter()
        .zip(probs)
        .map(|(&y, &p)| {
            let p = p.clamp(LOG_LOSS_EPSILON, 1.0 - LOG_LOSS_EPSILON);
            if y { -p.ln() } else { -(1.0 - p).ln() }
        })
        .sum();
    total / labels.len() as f64
}

/// Mean squared difference between probability and outcome.
pub fn brier_score(labels: &[bool], probs: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = labels
        .iter()
        .zip(probs)
        .map(|(&y, &p)| (p - if y { 1.0 } else { 0.0 }).powi(2))
        .sum();
    total / labels.len() as f64
}

pub fn calibration(panel: &Panel, p: &TransitionMatrix, threshold: f64) -> ChainResult<CalibrationReport> {
    validate_threshold(threshold)?;

    let (labels, probs): (Vec<bool>, Vec<f64>) = panel
        .cells()
        .iter()
        .filter_map(|c| {
            c.next_state
                .map(|next| (next == State::Churned, p.churn_probability(c.state)))
        })
        .unzip();

    if labels.is_empty() {
        return Err(ChainError::insufficient("no cells with a following month to evaluate"));
    }

    let confusion = confusion_counts(&labels, &probs, threshold);
    let n = labels.len() as f64;
    let report = CalibrationReport {
        threshold,
        rows: labels.len() as u64,
        confusion,
        precision: confusion.precision(),
        recall: confusion.recall(),
        accuracy: confusion.accuracy(),
        log_loss: log_loss(&labels, &probs),
        brier: brier_score(&labels, &probs),
        observed_rate: labels.iter().filter(|y| **y).count() as f64 / n,
        mean_predicted: probs.iter().sum::<f64>() / n,
    };

    log::info!(
        "calibration: rows={} log_loss={:.4} brier={:.4} precision={:.3} recall={:.3}",
        report.rows, report.log_loss, report.brier, report.precision, report.recall,
    );
    Ok(report)
}
