//! The analysis session: the single entry point the collaborators use.
//!
//! DATA FLOW (fixed, strictly forward):
//!   1. Configuration is validated
//!   2. Events → Panel (built once, reused by every later stage)
//!   3. Panel → TransitionEstimate (N and P)
//!   4. P → horizon queries, absorbing analytics, validation suite
//!
//! RULES:
//!   - A session is immutable. A parameter change means a new session.
//!   - Configuration and panel errors abort the build.
//!   - Absorbing analytics and validation checks fail locally; their
//!     errors are reported in place and never poison other outputs.

use crate::{
    absorbing::{self, AbsorptionAnalysis, LifetimeValue, RewardVector},
    config::AnalysisConfig,
    error::ChainResult,
    event::Event,
    horizon,
    panel::Panel,
    snapshot::{AnalysisSnapshot, HorizonSummary, PanelSummary},
    store::SessionStore,
    transition::{self, TransitionCounts, TransitionEstimate, TransitionMatrix},
    types::{SessionId, State, STATE_COUNT},
    validation::{self, BacktestParams, ValidationReport},
};

pub struct ChainAnalysis {
    pub session_id: SessionId,
    pub config:     AnalysisConfig,
    panel:          Panel,
    estimate:       TransitionEstimate,
}

impl ChainAnalysis {
    /// Validate the configuration, build the panel and fit the chain.
    pub fn build(events: &[Event], config: AnalysisConfig) -> ChainResult<Self> {
        config.validate()?;
        let panel = Panel::build(events, &config.panel)?;
        Self::from_panel(panel, config)
    }

    /// Fit the chain on an already-built panel.
    pub fn from_panel(panel: Panel, config: AnalysisConfig) -> ChainResult<Self> {
        config.validate()?;
        let estimate = transition::estimate(&panel, &config.estimation)?;
        let session_id = uuid::Uuid::new_v4().to_string();

        log::info!(
            "session={session_id} fitted: customers={} cells={} transitions={}",
            panel.customer_count(), panel.len(), estimate.counts.total(),
        );

        Ok(Self { session_id, config, panel, estimate })
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn estimate(&self) -> &TransitionEstimate {
        &self.estimate
    }

    pub fn counts(&self) -> &TransitionCounts {
        &self.estimate.counts
    }

    pub fn matrix(&self) -> &TransitionMatrix {
        &self.estimate.matrix
    }

    // ── Horizon ────────────────────────────────────────────────

    pub fn power(&self, n: u32) -> TransitionMatrix {
        horizon::matrix_power(self.matrix(), n)
    }

    pub fn churn_within(&self, start: State, n: u32) -> f64 {
        horizon::churn_within(self.matrix(), n, start)
    }

    pub fn distribution_after(&self, pi: &[f64; STATE_COUNT], n: u32) -> ChainResult<[f64; STATE_COUNT]> {
        horizon::distribution_after(pi, self.matrix(), n)
    }

    /// Empirical distribution of the last panel month.
    pub fn current_distribution(&self) -> [f64; STATE_COUNT] {
        self.panel.state_distribution(self.panel.months().end)
    }

    pub fn horizon_summary(&self, horizon_months: u32) -> ChainResult<HorizonSummary> {
        let p = self.matrix();
        Ok(HorizonSummary {
            horizon: horizon_months,
            churn_curve_active: horizon::churn_curve(p, State::Active, horizon_months),
            churn_curve_at_risk: horizon::churn_curve(p, State::AtRisk, horizon_months),
            forecast: horizon::forecast_path(&self.current_distribution(), p, horizon_months)?,
        })
    }

    // ── Absorbing chain ────────────────────────────────────────

    pub fn absorption(&self) -> ChainResult<AbsorptionAnalysis> {
        absorbing::absorption_analysis(self.matrix())
    }

    pub fn rewards(&self) -> RewardVector {
        absorbing::reward_by_state(&self.panel, self.config.reward.drop_negative_rewards)
    }

    /// LTV at the configured discount factor.
    pub fn lifetime_value(&self) -> ChainResult<LifetimeValue> {
        self.lifetime_value_at(self.config.reward.discount)
    }

    pub fn lifetime_value_at(&self, discount: f64) -> ChainResult<LifetimeValue> {
        absorbing::lifetime_value(self.matrix(), self.rewards(), discount)
    }

    // ── Validation ─────────────────────────────────────────────

    pub fn validate(&self, backtest: Option<BacktestParams>) -> ValidationReport {
        validation::run_suite(&self.panel, self.matrix(), &self.config.validation, backtest)
    }

    // ── Outputs ────────────────────────────────────────────────

    pub fn panel_summary(&self) -> PanelSummary {
        let months = self.panel.months();
        PanelSummary {
            customers: self.panel.customer_count(),
            cells: self.panel.len(),
            months,
            state_counts: self.panel.state_counts(),
            state_shares: self.panel.overall_distribution(),
            monthly_shares: self.panel.monthly_distribution(),
            last_month_customers: self.panel.state_counts_in_month(months.end),
            label_audit: self.panel.label_audit().cloned(),
        }
    }

    /// Everything the presentation side reads, in one serializable value.
    pub fn snapshot(&self, horizon_months: u32, backtest: Option<BacktestParams>) -> AnalysisSnapshot {
        AnalysisSnapshot {
            session_id: self.session_id.clone(),
            config: self.config.clone(),
            panel: self.panel_summary(),
            counts: self.counts().clone(),
            matrix: *self.matrix(),
            horizon: self.horizon_summary(horizon_months).into(),
            absorption: self.absorption().into(),
            rewards: self.rewards(),
            ltv: self.lifetime_value().into(),
            validation: self.validate(backtest),
        }
    }

    /// Write the session, its panel, N/P and the snapshot to the store.
    pub fn persist(&self, store: &SessionStore, snapshot: &AnalysisSnapshot) -> ChainResult<()> {
        store.insert_session(&self.session_id, &self.config, env!("CARGO_PKG_VERSION"))?;
        let rows = store.save_panel(&self.session_id, &self.panel)?;
        store.save_transition_estimate(&self.session_id, &self.estimate)?;
        store.save_report(&self.session_id, "snapshot", snapshot)?;
        log::debug!("session={} persisted: {rows} panel rows", self.session_id);
        Ok(())
    }
}
