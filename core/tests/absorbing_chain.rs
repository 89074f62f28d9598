//! Absorbing-chain analytics tests: fundamental matrix, absorption times,
//! lifetime value, rewards.

use chrono::NaiveDate;
use lifecycle_core::{
    absorbing::{absorption_analysis, fundamental_matrix, lifetime_value, reward_by_state, RewardVector},
    config::{ActivityMetric, EstimationConfig, PanelConfig},
    error::ChainError,
    event::Event,
    panel::Panel,
    transition::{estimate, TransitionMatrix},
    types::State,
};

use State::{Active as A, AtRisk as R, Churned as C};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn canonical() -> TransitionMatrix {
    TransitionMatrix::from_rows([
        [0.7, 0.2, 0.1],
        [0.3, 0.4, 0.3],
        [0.0, 0.0, 1.0],
    ])
    .unwrap()
}

/// Closed-form (I − γQ)⁻¹ · r for a 2×2 block.
fn closed_form_ltv(q: [[f64; 2]; 2], r: [f64; 2], gamma: f64) -> [f64; 2] {
    let a = 1.0 - gamma * q[0][0];
    let b = -gamma * q[0][1];
    let c = -gamma * q[1][0];
    let d = 1.0 - gamma * q[1][1];
    let det = a * d - b * c;
    [(d * r[0] - b * r[1]) / det, (-c * r[0] + a * r[1]) / det]
}

fn ev(customer: &str, m: u32, amount: f64) -> Event {
    Event::new(customer, NaiveDate::from_ymd_opt(2023, m, 15).unwrap(), amount)
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// (I − Q) = [[0.3, −0.2], [−0.3, 0.6]], det 0.12, so N̂ = [[5, 5/3], [2.5, 2.5]]
/// and the expected times to churn are 20/3 from Active and 5 from AtRisk.
#[test]
fn canonical_absorption_times() {
    let analysis = absorption_analysis(&canonical()).unwrap();
    let n = analysis.fundamental;
    assert!((n[0][0] - 5.0).abs() < 1e-9);
    assert!((n[0][1] - 5.0 / 3.0).abs() < 1e-9);
    assert!((n[1][0] - 2.5).abs() < 1e-9);
    assert!((n[1][1] - 2.5).abs() < 1e-9);

    assert!((analysis.expected_time(A).unwrap() - 20.0 / 3.0).abs() < 1e-9);
    assert!((analysis.expected_time(R).unwrap() - 5.0).abs() < 1e-9);
    assert_eq!(analysis.expected_time(C), None);
}

/// A transient pair that never leaks to Churned has no finite absorption time.
#[test]
fn closed_transient_cycle_is_singular() {
    for rows in [
        [[0.5, 0.5, 0.0], [0.5, 0.5, 0.0], [0.0, 0.0, 1.0]],
        [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        [[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
    ] {
        let p = TransitionMatrix::from_rows(rows).unwrap();
        let err = absorption_analysis(&p).unwrap_err();
        assert!(matches!(err, ChainError::SingularChain { .. }), "got {err:?}");
        assert!(fundamental_matrix(&p).is_err());

        let err = lifetime_value(&p, RewardVector::new(10.0, 5.0), 1.0).unwrap_err();
        assert!(matches!(err, ChainError::SingularChain { discount } if discount == 1.0));
    }
}

/// Discounting makes (I − γQ) invertible even when (I − Q) is not.
#[test]
fn discounting_rescues_a_closed_cycle() {
    let p = TransitionMatrix::from_rows([[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]).unwrap();
    let ltv = lifetime_value(&p, RewardVector::new(10.0, 5.0), 0.9).unwrap();
    let expected = closed_form_ltv([[0.0, 1.0], [1.0, 0.0]], [10.0, 5.0], 0.9);
    assert!((ltv.values[0] - expected[0]).abs() < 1e-9);
    assert!((ltv.values[1] - expected[1]).abs() < 1e-9);
}

#[test]
fn lifetime_value_matches_closed_form() {
    let p = canonical();
    let q = p.transient_block();
    let rewards = RewardVector::new(100.0, 20.0);

    for gamma in [1.0, 0.98, 0.9, 0.5] {
        let ltv = lifetime_value(&p, rewards, gamma).unwrap();
        let expected = closed_form_ltv(q, [100.0, 20.0], gamma);
        assert!((ltv.value(A).unwrap() - expected[0]).abs() < 1e-9, "gamma={gamma}");
        assert!((ltv.value(R).unwrap() - expected[1]).abs() < 1e-9, "gamma={gamma}");
        assert!((ltv.recovery_value() - (expected[0] - expected[1])).abs() < 1e-9);
    }

    // Undiscounted: N̂ · r = [5·100 + 5/3·20, 2.5·100 + 2.5·20].
    let ltv = lifetime_value(&p, rewards, 1.0).unwrap();
    assert!((ltv.values[0] - (500.0 + 100.0 / 3.0)).abs() < 1e-9);
    assert!((ltv.values[1] - 300.0).abs() < 1e-9);
}

#[test]
fn discount_outside_unit_interval_is_rejected() {
    let p = canonical();
    for gamma in [0.0, -0.5, 1.01, f64::NAN] {
        let err = lifetime_value(&p, RewardVector::new(1.0, 1.0), gamma).unwrap_err();
        assert!(matches!(err, ChainError::Configuration(_)), "gamma={gamma}: {err:?}");
    }
}

/// Expected absorption times are never negative for a chain that leaks.
#[test]
fn absorption_times_are_non_negative() {
    let panel = Panel::from_state_sequences(vec![
        ("a".to_string(), 0, vec![A, A, R, A, A, R, R, C]),
        ("b".to_string(), 0, vec![A, R, R, R, C, C]),
        ("c".to_string(), 3, vec![A, A, A, A, A]),
    ])
    .unwrap();
    let p = estimate(&panel, &EstimationConfig { force_absorbing: true, training_window: None })
        .unwrap()
        .matrix;

    let analysis = absorption_analysis(&p).unwrap();
    assert!(analysis.absorption_time.iter().all(|t| t.is_finite() && *t >= 0.0));
    for row in analysis.fundamental {
        assert!(row.iter().all(|x| *x >= 0.0));
    }
}

/// Per-state rewards are mean monthly amounts; Churned earns nothing.
#[test]
fn rewards_are_mean_amount_per_state() {
    let events = vec![
        ev("c1", 1, 100.0),
        ev("c1", 2, 50.0),
        ev("c1", 3, -10.0), // a net return: inactive, and the month is at risk
        ev("c2", 4, 30.0),
    ];
    let panel = Panel::build(&events, &PanelConfig::new(1, 3, ActivityMetric::Amount)).unwrap();

    let kept = reward_by_state(&panel, false);
    assert!((kept.get(A) - 60.0).abs() < 1e-12);
    assert!((kept.get(R) - -5.0).abs() < 1e-12);
    assert_eq!(kept.get(C), 0.0);

    let dropped = reward_by_state(&panel, true);
    assert!((dropped.get(A) - 60.0).abs() < 1e-12);
    assert_eq!(dropped.get(R), 0.0);
}
