//! Validation suite: four independent checks of the fitted chain.
//!
//! RULE: Checks share no state. Each one gets the panel and the fitted P
//! and returns its own result; a failing check is recorded in its slot
//! and never stops the others.

pub mod backtest;
pub mod calibration;
pub mod memory;
pub mod stationarity;

use crate::{
    config::ValidationConfig,
    error::ChainResult,
    panel::Panel,
    transition::TransitionMatrix,
};
use serde::{Deserialize, Serialize};

pub use backtest::{backtest, BacktestParams, BacktestReport};
pub use calibration::{calibration, CalibrationReport};
pub use memory::{memory_test, MemoryReport};
pub use stationarity::{stationarity_test, StationarityReport};

/// Result of one check, in a form the presentation side can serialize.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome<T> {
    Completed { report: T },
    Failed { reason: String },
}

impl<T> CheckOutcome<T> {
    pub fn report(&self) -> Option<&T> {
        match self {
            Self::Completed { report } => Some(report),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

impl<T> From<ChainResult<T>> for CheckOutcome<T> {
    fn from(result: ChainResult<T>) -> Self {
        match result {
            Ok(report) => Self::Completed { report },
            Err(e) => Self::Failed { reason: e.to_string() },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub backtest:     CheckOutcome<BacktestReport>,
    pub memory:       CheckOutcome<MemoryReport>,
    pub stationarity: CheckOutcome<StationarityReport>,
    pub calibration:  CheckOutcome<CalibrationReport>,
}

impl ValidationReport {
    pub fn completed_checks(&self) -> usize {
        [
            self.backtest.is_completed(),
            self.memory.is_completed(),
            self.stationarity.is_completed(),
            self.calibration.is_completed(),
        ]
        .iter()
        .filter(|done| **done)
        .count()
    }
}

/// Run all four checks. `backtest_params` defaults to the panel's standard split.
pub fn run_suite(
    panel: &Panel,
    p: &TransitionMatrix,
    config: &ValidationConfig,
    backtest_params: Option<BacktestParams>,
) -> ValidationReport {
    let backtest = backtest_params
        .map(Ok)
        .unwrap_or_else(|| BacktestParams::default_for(panel.months()))
        .and_then(|params| backtest(panel, params));

    let report = ValidationReport {
        backtest:     backtest.into(),
        memory:       memory_test(panel, p, config.min_reliable_sample).into(),
        stationarity: stationarity_test(panel, p).into(),
        calibration:  calibration(panel, p, config.classification_threshold).into(),
    };

    for (name, failed) in [
        ("backtest", report.backtest.report().is_none()),
        ("memory", report.memory.report().is_none()),
        ("stationarity", report.stationarity.report().is_none()),
        ("calibration", report.calibration.report().is_none()),
    ] {
        if failed {
            log::warn!("validation: {name} check did not complete");
        }
    }
    report
}
