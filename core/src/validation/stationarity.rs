//! Stationarity test: one transition matrix per calendar month, each
//! compared element-wise with the globally fitted P.

use crate::{
    error::{ChainError, ChainResult},
    panel::Panel,
    transition::{TransitionCounts, TransitionMatrix},
    types::MonthIndex,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyDrift {
    /// Month the transitions start from.
    pub month:         MonthIndex,
    pub transitions:   u64,
    pub matrix:        TransitionMatrix,
    /// Mean absolute element-wise difference to the global P.
    pub mean_abs_diff: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationarityReport {
    pub months:      Vec<MonthlyDrift>,
    pub mean_diff:   f64,
    /// Population standard deviation of the monthly differences.
    pub std_dev:     f64,
    /// Least-squares slope of difference against month; > 0 means drifting away.
    pub trend_slope: f64,
}

pub fn stationarity_test(panel: &Panel, global: &TransitionMatrix) -> ChainResult<StationarityReport> {
    let mut per_month: BTreeMap<MonthIndex, TransitionCounts> = BTreeMap::new();
    for cell in panel.cells() {
        if let Some(next) = cell.next_state {
            per_month.entry(cell.month_index).or_default().record(cell.state, next);
        }
    }

    if per_month.is_empty() {
        return Err(ChainError::insufficient("no transitions to estimate monthly matrices"));
    }

    let months: Vec<MonthlyDrift> = per_month
        .into_iter()
        .map(|(month, counts)| {
            let matrix = counts.normalize(true);
            MonthlyDrift {
                month,
                transitions: counts.total(),
                mean_abs_diff: matrix.mean_abs_diff(global),
                matrix,
            }
        })
        .collect();

    let n = months.len() as f64;
    let mean_diff = months.iter().map(|m| m.mean_abs_diff).sum::<f64>() / n;
    let variance = months.iter().map(|m| (m.mean_abs_diff - mean_diff).powi(2)).sum::<f64>() / n;
    let trend_slope = least_squares_slope(
        months.iter().map(|m| (m.month as f64, m.mean_abs_diff)),
    );

    log::info!(
        "stationarity: months={} mean_diff={mean_diff:.4} std_dev={:.4} slope={trend_slope:.5}",
        months.len(), variance.sqrt(),
    );

    Ok(StationarityReport {
        months,
        mean_diff,
        std_dev: variance.sqrt(),
        trend_slope,
    })
}

/// Slope of the ordinary least-squares line. Zero when x has no spread.
fn least_squares_slope(points: impl Iterator<Item = (f64, f64)> + Clone) -> f64 {
    let n = points.clone().count() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean_x = points.clone().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.clone().map(|(_, y)| y).sum::<f64>() / n;
    let (sxy, sxx) = points.fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
        (sxy + (x - mean_x) * (y - mean_y), sxx + (x - mean_x).powi(2))
    });
    if sxx == 0.0 { 0.0 } else { sxy / sxx }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slope_of_a_line() {
        let pts = vec![(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)];
        assert!((least_squares_slope(pts.into_iter()) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn slope_of_single_point_is_zero() {
        assert_eq!(least_squares_slope(vec![(5.0, 1.0)].into_iter()), 0.0);
    }
}
