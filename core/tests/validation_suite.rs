//! Validation suite tests: backtest, memory, stationarity, calibration, and
//! independence of the four checks.

use lifecycle_core::{
    config::{EstimationConfig, ValidationConfig},
    error::ChainError,
    panel::Panel,
    transition::{estimate, TransitionMatrix},
    types::{MonthWindow, State},
    validation::{
        backtest, calibration,
        calibration::{brier_score, log_loss},
        memory_test, run_suite, stationarity_test, BacktestParams, CheckOutcome,
    },
};

use State::{Active as A, AtRisk as R, Churned as C};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn fitted(panel: &Panel) -> TransitionMatrix {
    estimate(panel, &EstimationConfig { force_absorbing: true, training_window: None })
        .unwrap()
        .matrix
}

/// c1 = [A, A, R, C], c2 = [A, R, A, A], both starting at month 100.
/// Fitted P: A → [½, ½, 0], R → [½, 0, ½], C absorbing.
fn two_customer_panel() -> Panel {
    Panel::from_state_sequences(vec![
        ("c1".to_string(), 100, vec![A, A, R, C]),
        ("c2".to_string(), 100, vec![A, R, A, A]),
    ])
    .unwrap()
}

fn default_validation() -> ValidationConfig {
    ValidationConfig { classification_threshold: 0.5, min_reliable_sample: 30 }
}

// ── Calibration ──────────────────────────────────────────────────────────────

/// Six rows; only the two AtRisk rows predict churn (0.5), one of which churns.
#[test]
fn calibration_on_hand_computed_panel() {
    let panel = two_customer_panel();
    let p = fitted(&panel);
    assert_eq!(p.row(A), [0.5, 0.5, 0.0]);
    assert_eq!(p.row(R), [0.5, 0.0, 0.5]);

    let report = calibration(&panel, &p, 0.5).unwrap();
    assert_eq!(report.rows, 6);
    assert_eq!(report.confusion.true_positive, 1);
    assert_eq!(report.confusion.false_positive, 1);
    assert_eq!(report.confusion.true_negative, 4);
    assert_eq!(report.confusion.false_negative, 0);
    assert!((report.precision - 0.5).abs() < 1e-12);
    assert!((report.recall - 1.0).abs() < 1e-12);
    assert!((report.accuracy - 5.0 / 6.0).abs() < 1e-12);
    assert!((report.brier - 0.5 / 6.0).abs() < 1e-12);
    assert!((report.log_loss - 2.0 * std::f64::consts::LN_2 / 6.0).abs() < 1e-9);
    assert!((report.observed_rate - 1.0 / 6.0).abs() < 1e-12);
    assert!((report.mean_predicted - 1.0 / 6.0).abs() < 1e-12);
}

/// Predicting the base rate everywhere scores exactly the label entropy.
#[test]
fn constant_rate_log_loss_is_entropy() {
    let labels = [true, false, false, false];
    let probs = [0.25; 4];
    let entropy = -(0.25_f64 * 0.25_f64.ln() + 0.75 * 0.75_f64.ln());
    assert!((log_loss(&labels, &probs) - entropy).abs() < 1e-12);
}

/// Certain and wrong predictions are clipped rather than infinite.
#[test]
fn log_loss_is_finite_and_brier_bounded() {
    let labels = [true, false, true];
    let probs = [0.0, 1.0, 1.0];
    let ll = log_loss(&labels, &probs);
    assert!(ll.is_finite() && ll >= 0.0);
    let brier = brier_score(&labels, &probs);
    assert!((0.0..=1.0).contains(&brier));
    assert!((brier - 2.0 / 3.0).abs() < 1e-12);
}

#[test]
fn threshold_outside_unit_interval_is_rejected() {
    let panel = two_customer_panel();
    let p = fitted(&panel);
    for threshold in [0.0, 1.0, 1.5] {
        let err = calibration(&panel, &p, threshold).unwrap_err();
        assert!(matches!(err, ChainError::Configuration(_)), "threshold={threshold}");
    }
}

// ── Memory test ──────────────────────────────────────────────────────────────

/// Triples: (A,A,R), (A,R,C), (A,R,A), (R,A,A). The (A,R) group matches row R
/// exactly; (A,A) and (R,A) each diverge by 1/3.
#[test]
fn memory_groups_on_hand_computed_panel() {
    let panel = two_customer_panel();
    let p = fitted(&panel);
    let report = memory_test(&panel, &p, 30).unwrap();

    assert_eq!(report.triples, 4);
    assert_eq!(report.groups.len(), 3);

    let order: Vec<(State, State)> = report.groups.iter().map(|g| (g.prev, g.curr)).collect();
    assert_eq!(order, vec![(A, A), (R, A), (A, R)]);

    assert_eq!(report.groups[0].conditional, [0.0, 1.0, 0.0]);
    assert!((report.groups[0].divergence - 1.0 / 3.0).abs() < 1e-12);
    assert_eq!(report.groups[2].sample, 2);
    assert_eq!(report.groups[2].conditional, [0.5, 0.0, 0.5]);
    assert_eq!(report.groups[2].divergence, 0.0);

    // Every group is far below 30 samples.
    assert!(report.groups.iter().all(|g| !g.reliable));
    assert_eq!(report.max_reliable_divergence(), None);

    let lenient = memory_test(&panel, &p, 2).unwrap();
    assert_eq!(lenient.max_reliable_divergence(), Some(0.0));
}

#[test]
fn memory_test_needs_three_month_runs() {
    let panel = Panel::from_state_sequences(vec![
        ("a".to_string(), 0, vec![A, R]),
        ("b".to_string(), 0, vec![A, A]),
    ])
    .unwrap();
    let err = memory_test(&panel, &fitted(&panel), 30).unwrap_err();
    assert!(matches!(err, ChainError::InsufficientData(_)), "got {err:?}");
}

// ── Stationarity ─────────────────────────────────────────────────────────────

/// Monthly differences to the global P are 1/9, 2/9, 2/9.
#[test]
fn stationarity_on_hand_computed_panel() {
    let panel = two_customer_panel();
    let p = fitted(&panel);
    let report = stationarity_test(&panel, &p).unwrap();

    let months: Vec<i32> = report.months.iter().map(|m| m.month).collect();
    assert_eq!(months, vec![100, 101, 102]);
    let diffs: Vec<f64> = report.months.iter().map(|m| m.mean_abs_diff).collect();
    for (got, want) in diffs.iter().zip([1.0 / 9.0, 2.0 / 9.0, 2.0 / 9.0]) {
        assert!((got - want).abs() < 1e-12, "{diffs:?}");
    }
    assert!(report.months.iter().all(|m| m.transitions == 2));

    assert!((report.mean_diff - 5.0 / 27.0).abs() < 1e-12);
    assert!((report.trend_slope - 1.0 / 18.0).abs() < 1e-12);
    let var = ((1.0 / 9.0 - 5.0 / 27.0_f64).powi(2) + 2.0 * (2.0 / 9.0 - 5.0 / 27.0_f64).powi(2)) / 3.0;
    assert!((report.std_dev - var.sqrt()).abs() < 1e-12);
}

/// A perfectly stationary panel shows no drift.
#[test]
fn stationary_panel_has_zero_drift() {
    let panel = Panel::from_state_sequences(vec![
        ("a".to_string(), 0, vec![A, A, A, A]),
        ("b".to_string(), 0, vec![A, A, A, A]),
    ])
    .unwrap();
    let report = stationarity_test(&panel, &fitted(&panel)).unwrap();
    assert_eq!(report.mean_diff, 0.0);
    assert_eq!(report.std_dev, 0.0);
    assert_eq!(report.trend_slope, 0.0);
}

// ── Backtest ─────────────────────────────────────────────────────────────────

/// Train on months 200..=202 (transitions out of 200 and 201), apply at 203.
/// P_train: A → [⅔, ⅓, 0], R → [0, 0, 1]. π(203) = [½, 0, ½] predicts
/// [⅓, ⅙, ½] against a real [½, 0, ½], so MAE = 1/9. Month 205 is the
/// extra month the apply month needs after its target.
#[test]
fn backtest_on_hand_computed_panel() {
    let panel = Panel::from_state_sequences(vec![
        ("c1".to_string(), 200, vec![A, A, A, A, A, A]),
        ("c2".to_string(), 200, vec![A, R, C, C, C, C]),
    ])
    .unwrap();
    let params = BacktestParams { train: MonthWindow::new(200, 202), apply_month: 203 };
    let report = backtest(&panel, params).unwrap();

    assert_eq!(report.target_month, 204);
    assert_eq!(report.train_transitions, 4);
    let predicted: Vec<f64> = report.states.iter().map(|s| s.predicted).collect();
    let real: Vec<f64> = report.states.iter().map(|s| s.real).collect();
    for (got, want) in predicted.iter().zip([1.0 / 3.0, 1.0 / 6.0, 0.5]) {
        assert!((got - want).abs() < 1e-12, "{predicted:?}");
    }
    assert_eq!(real, vec![0.5, 0.0, 0.5]);
    assert!((report.mae - 1.0 / 9.0).abs() < 1e-12);

    // Default split over six months is the same one.
    assert_eq!(BacktestParams::default_for(panel.months()).unwrap(), params);
}

/// The apply month needs two observed months after it: the target and one more.
#[test]
fn backtest_needs_two_months_after_apply() {
    let panel = two_customer_panel();
    let last = panel.months().end;
    for apply_month in [last, last - 1] {
        let err = backtest(&panel, BacktestParams {
            train: MonthWindow::new(100, 101),
            apply_month,
        })
        .unwrap_err();
        assert!(matches!(err, ChainError::InsufficientData(_)), "apply {apply_month}: got {err:?}");
    }
    let report = backtest(&panel, BacktestParams {
        train: MonthWindow::new(100, 101),
        apply_month: last - 2,
    })
    .unwrap();
    assert_eq!(report.target_month, last - 1);

    for months in [MonthWindow::single(100), MonthWindow::new(100, 101)] {
        let err = BacktestParams::default_for(months).unwrap_err();
        assert!(matches!(err, ChainError::InsufficientData(_)));
    }
    let short = BacktestParams::default_for(MonthWindow::new(100, 102)).unwrap();
    assert_eq!(short, BacktestParams { train: MonthWindow::single(100), apply_month: 100 });
}

// ── Suite ────────────────────────────────────────────────────────────────────

/// A failing check is recorded in its own slot; the others still run.
#[test]
fn failures_stay_local_to_their_check() {
    let panel = Panel::from_state_sequences(vec![
        ("a".to_string(), 10, vec![A, R]),
        ("b".to_string(), 11, vec![A, A]),
    ])
    .unwrap();
    let p = fitted(&panel);

    let report = run_suite(&panel, &p, &default_validation(), None);
    assert!(matches!(report.memory, CheckOutcome::Failed { .. }));
    assert!(report.backtest.is_completed());
    assert!(report.stationarity.is_completed());
    assert!(report.calibration.is_completed());
    assert_eq!(report.completed_checks(), 3);

    let bad_backtest = Some(BacktestParams { train: MonthWindow::new(10, 10), apply_month: 11 });
    let report = run_suite(&panel, &p, &default_validation(), bad_backtest);
    assert!(!report.backtest.is_completed());
    assert!(report.calibration.is_completed());
    assert_eq!(report.completed_checks(), 2);
}

#[test]
fn full_suite_metrics_are_in_range() {
    let panel = two_customer_panel();
    let p = fitted(&panel);
    let report = run_suite(&panel, &p, &default_validation(), None);
    assert_eq!(report.completed_checks(), 4);

    let cal = report.calibration.report().unwrap();
    assert!(cal.log_loss >= 0.0);
    assert!((0.0..=1.0).contains(&cal.brier));
    let bt = report.backtest.report().unwrap();
    assert!(bt.mae >= 0.0 && bt.mae <= 1.0);
}
