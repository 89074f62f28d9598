//! Out-of-time backtest: fit P on a training window, push the empirical
//! distribution of an apply month one step forward, compare with what the
//! following month actually looked like.

use crate::{
    config::EstimationConfig,
    error::{ChainError, ChainResult},
    panel::Panel,
    transition::estimate,
    types::{MonthIndex, MonthWindow, State, STATE_COUNT},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BacktestParams {
    pub train:       MonthWindow,
    pub apply_month: MonthIndex,
}

impl BacktestParams {
    /// Default split over a panel's months: train on the first three months,
    /// apply at the fourth, shrinking both when the panel is shorter. The
    /// apply month always keeps two panel months after it.
    pub fn default_for(months: MonthWindow) -> ChainResult<Self> {
        let len = months.len() as MonthIndex;
        if len < 3 {
            return Err(ChainError::insufficient(format!(
                "backtest needs at least 3 panel months, have {len}"
            )));
        }
        if len < 6 {
            log::warn!("backtest: only {len} panel months, 6+ recommended");
        }
        Ok(Self {
            train: MonthWindow::new(months.start, months.start + (len - 3).min(2)),
            apply_month: months.start + (len - 3).min(3),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateComparison {
    pub state:     State,
    pub predicted: f64,
    pub real:      f64,
    pub abs_error: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestReport {
    pub train:             MonthWindow,
    pub apply_month:       MonthIndex,
    pub target_month:      MonthIndex,
    pub train_transitions: u64,
    pub states:            Vec<StateComparison>,
    /// Mean absolute error across the state shares.
    pub mae:               f64,
}

pub fn backtest(panel: &Panel, params: BacktestParams) -> ChainResult<BacktestReport> {
    if params.train.end < params.train.start {
        return Err(ChainError::config(format!(
            "training window end ({}) precedes start ({})",
            params.train.end, params.train.start
        )));
    }

    let months = panel.months();
    let target_month = params.apply_month + 1;
    // The month after the target must also be observed, so the target's
    // state mix is not read off the panel's trailing edge.
    if !months.contains(params.apply_month) || !months.contains(params.apply_month + 2) {
        return Err(ChainError::insufficient(format!(
            "backtest needs the apply month {} and the two months after it inside the panel ({}..={})",
            params.apply_month, months.start, months.end
        )));
    }

    let pi_apply = panel.state_distribution(params.apply_month);
    if pi_apply.iter().sum::<f64>() == 0.0 {
        return Err(ChainError::insufficient(format!(
            "no customers observed in apply month {}", params.apply_month
        )));
    }
    let pi_real = panel.state_distribution(target_month);

    let fitted = estimate(panel, &EstimationConfig {
        force_absorbing: true,
        training_window: Some(params.train),
    })?;
    let pi_pred = fitted.matrix.apply(&pi_apply);

    let states: Vec<StateComparison> = State::ALL
        .iter()
        .map(|&s| {
            let i = s.index();
            StateComparison {
                state: s,
                predicted: pi_pred[i],
                real: pi_real[i],
                abs_error: (pi_pred[i] - pi_real[i]).abs(),
            }
        })
        .collect();
    let mae = states.iter().map(|c| c.abs_error).sum::<f64>() / STATE_COUNT as f64;

    log::info!(
        "backtest: train={}..={} apply={} target={} mae={mae:.4}",
        params.train.start, params.train.end, params.apply_month, target_month,
    );

    Ok(BacktestReport {
        train: params.train,
        apply_month: params.apply_month,
        target_month,
        train_transitions: fitted.counts.total(),
        states,
        mae,
    })
}
