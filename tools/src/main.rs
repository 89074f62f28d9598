//! chain-runner: headless lifecycle-chain analysis.
//!
//! Usage:
//!   chain-runner --seed 42 --customers 500 --months 24 --db session.db
//!   chain-runner --events events.json --config analysis.json --horizon 12
//!   chain-runner --seed 7 --json

use anyhow::{Context, Result};
use chrono::NaiveDate;
use lifecycle_core::{
    analysis::ChainAnalysis,
    config::AnalysisConfig,
    event::Event,
    snapshot::AnalysisSnapshot,
    store::SessionStore,
    synthetic::{generate_history, SyntheticConfig},
    types::{month_start, State, STATE_COUNT},
    validation::CheckOutcome,
};
use std::env;

/// Compact machine-readable summary for `--json`.
#[derive(serde::Serialize)]
struct RunSummary<'a> {
    session_id:             &'a str,
    customers:              usize,
    cells:                  usize,
    transitions:            u64,
    matrix:                 [[f64; STATE_COUNT]; STATE_COUNT],
    churn_12m_active:       f64,
    churn_12m_at_risk:      f64,
    expected_months_active: Option<f64>,
    ltv_active:             Option<f64>,
    ltv_at_risk:            Option<f64>,
    completed_checks:       usize,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let customers = parse_arg(&args, "--customers", 500usize);
    let months = parse_arg(&args, "--months", 24u32);
    let horizon = parse_arg(&args, "--horizon", 12u32);
    let json_mode = args.iter().any(|a| a == "--json");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let events_path = flag_value(&args, "--events");
    let config_path = flag_value(&args, "--config");
    let start = flag_value(&args, "--start")
        .map(|s| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"))
        .transpose()
        .context("--start expects YYYY-MM")?;

    let config = match config_path {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };

    if !json_mode {
        println!("Customer lifecycle chain: chain-runner");
        match events_path {
            Some(path) => println!("  events:    {path}"),
            None => println!("  events:    synthetic (seed={seed}, customers={customers}, months={months})"),
        }
        println!("  config:    {}", config_path.unwrap_or("defaults"));
        println!("  horizon:   {horizon}");
        println!("  db:        {db}");
        println!();
    }

    let events = match events_path {
        Some(path) => load_events(path)?,
        None => {
            let mut synthetic = SyntheticConfig { customers, months, seed, ..Default::default() };
            synthetic.acquisition_months = synthetic.acquisition_months.min(months);
            if let Some(start) = start {
                synthetic.start = start;
            }
            generate_history(&synthetic)?
        }
    };
    log::info!("loaded {} events", events.len());

    let analysis = ChainAnalysis::build(&events, config)?;
    let snapshot = analysis.snapshot(horizon, None);

    let store = SessionStore::open(db)?;
    store.migrate()?;
    analysis.persist(&store, &snapshot)?;

    if json_mode {
        print_json(&analysis, &snapshot)?;
    } else {
        print_summary(&analysis, &snapshot, horizon);
    }
    Ok(())
}

fn load_events(path: &str) -> Result<Vec<Event>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    let events: Vec<Event> = serde_json::from_str(&content)
        .with_context(|| format!("{path} is not a JSON list of events"))?;
    Ok(events)
}

fn print_json(analysis: &ChainAnalysis, snapshot: &AnalysisSnapshot) -> Result<()> {
    let absorption = snapshot.absorption.report();
    let ltv = snapshot.ltv.report();
    let summary = RunSummary {
        session_id: &analysis.session_id,
        customers: snapshot.panel.customers,
        cells: snapshot.panel.cells,
        transitions: snapshot.counts.total(),
        matrix: *snapshot.matrix.rows(),
        churn_12m_active: analysis.churn_within(State::Active, 12),
        churn_12m_at_risk: analysis.churn_within(State::AtRisk, 12),
        expected_months_active: absorption.and_then(|a| a.expected_time(State::Active)),
        ltv_active: ltv.and_then(|l| l.value(State::Active)),
        ltv_at_risk: ltv.and_then(|l| l.value(State::AtRisk)),
        completed_checks: snapshot.validation.completed_checks(),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn print_summary(analysis: &ChainAnalysis, snapshot: &AnalysisSnapshot, horizon: u32) {
    let panel = &snapshot.panel;
    let first = month_label(panel.months.start);
    let last = month_label(panel.months.end);

    println!("=== PANEL ===");
    println!("  session_id:   {}", analysis.session_id);
    println!("  customers:    {}", panel.customers);
    println!("  cells:        {}", panel.cells);
    println!("  months:       {first} .. {last}");
    println!(
        "  last month:   A={} R={} C={}",
        panel.last_month_customers[0], panel.last_month_customers[1], panel.last_month_customers[2],
    );
    if let Some(audit) = &panel.label_audit {
        println!(
            "  labels:       {} supplied, {} mismatched, {} overridden",
            audit.labelled_cells, audit.mismatches, audit.overridden,
        );
    }

    println!();
    println!("=== TRANSITION MATRIX ({} transitions) ===", snapshot.counts.total());
    println!("           {:>8} {:>8} {:>8}", "A", "R", "C");
    for from in State::ALL {
        let row = snapshot.matrix.row(from);
        println!("  {:<8} {:>8.4} {:>8.4} {:>8.4}", from.code(), row[0], row[1], row[2]);
    }

    println!();
    println!("=== HORIZON ({horizon} months) ===");
    match &snapshot.horizon {
        CheckOutcome::Completed { report } => {
            for n in [1u32, 3, 6, 12].into_iter().filter(|n| *n <= horizon) {
                let i = n as usize - 1;
                println!(
                    "  churn within {n:>2}m: from A {:.3} | from R {:.3}",
                    report.churn_curve_active[i], report.churn_curve_at_risk[i],
                );
            }
            if let Some(end) = report.forecast.last() {
                println!("  forecast at +{horizon}m: A={:.3} R={:.3} C={:.3}", end[0], end[1], end[2]);
            }
        }
        CheckOutcome::Failed { reason } => println!("  (unavailable: {reason})"),
    }

    println!();
    println!("=== ABSORBING CHAIN ===");
    match &snapshot.absorption {
        CheckOutcome::Completed { report } => println!(
            "  expected months to churn: from A {:.1} | from R {:.1}",
            report.absorption_time[0], report.absorption_time[1],
        ),
        CheckOutcome::Failed { reason } => println!("  absorption: {reason}"),
    }
    println!(
        "  reward per month: A {:.2} | R {:.2}",
        snapshot.rewards.get(State::Active), snapshot.rewards.get(State::AtRisk),
    );
    match &snapshot.ltv {
        CheckOutcome::Completed { report } => println!(
            "  LTV (γ={}): A {:.2} | R {:.2} | recovery {:.2}",
            report.discount, report.values[0], report.values[1], report.recovery_value(),
        ),
        CheckOutcome::Failed { reason } => println!("  LTV: {reason}"),
    }

    println!();
    println!("=== VALIDATION ({}/4 checks completed) ===", snapshot.validation.completed_checks());
    let v = &snapshot.validation;
    match &v.backtest {
        CheckOutcome::Completed { report } => println!(
            "  backtest:     MAE {:.4} (apply {} → {})",
            report.mae, month_label(report.apply_month), month_label(report.target_month),
        ),
        CheckOutcome::Failed { reason } => println!("  backtest:     {reason}"),
    }
    match &v.memory {
        CheckOutcome::Completed { report } => println!(
            "  memory:       {} triples, max reliable divergence {}",
            report.triples,
            report
                .max_reliable_divergence()
                .map(|d| format!("{d:.4}"))
                .unwrap_or_else(|| "n/a".to_string()),
        ),
        CheckOutcome::Failed { reason } => println!("  memory:       {reason}"),
    }
    match &v.stationarity {
        CheckOutcome::Completed { report } => println!(
            "  stationarity: mean diff {:.4} ± {:.4}, slope {:+.5}",
            report.mean_diff, report.std_dev, report.trend_slope,
        ),
        CheckOutcome::Failed { reason } => println!("  stationarity: {reason}"),
    }
    match &v.calibration {
        CheckOutcome::Completed { report } => println!(
            "  calibration:  log-loss {:.4} | brier {:.4} | precision {:.3} | recall {:.3}",
            report.log_loss, report.brier, report.precision, report.recall,
        ),
        CheckOutcome::Failed { reason } => println!("  calibration:  {reason}"),
    }
}

fn month_label(index: i32) -> String {
    month_start(index)
        .map(|d| d.format("%Y-%m").to_string())
        .unwrap_or_else(|| index.to_string())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
