//! Snapshot serialization: every read-only output of one analysis as JSON.
//!
//! The presentation side consumes this bundle; nothing flows back into the
//! core except new configuration, which triggers a full rebuild.

use crate::{
    absorbing::{AbsorptionAnalysis, LifetimeValue, RewardVector},
    config::AnalysisConfig,
    panel::LabelAudit,
    transition::{TransitionCounts, TransitionMatrix},
    types::{MonthIndex, MonthWindow, SessionId, STATE_COUNT},
    validation::{CheckOutcome, ValidationReport},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PanelSummary {
    pub customers:            usize,
    pub cells:                usize,
    pub months:               MonthWindow,
    pub state_counts:         [u64; STATE_COUNT],
    pub state_shares:         [f64; STATE_COUNT],
    pub monthly_shares:       Vec<(MonthIndex, [f64; STATE_COUNT])>,
    /// Unique customers per state in the last panel month.
    pub last_month_customers: [u64; STATE_COUNT],
    pub label_audit:          Option<LabelAudit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HorizonSummary {
    pub horizon:            u32,
    /// P(churned within n | Active), n = 1..=horizon.
    pub churn_curve_active: Vec<f64>,
    /// P(churned within n | AtRisk), n = 1..=horizon.
    pub churn_curve_at_risk: Vec<f64>,
    /// π₀·Pⁿ for n = 0..=horizon, π₀ = last month's distribution.
    pub forecast:           Vec<[f64; STATE_COUNT]>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisSnapshot {
    pub session_id:  SessionId,
    pub config:      AnalysisConfig,
    pub panel:       PanelSummary,
    pub counts:      TransitionCounts,
    pub matrix:      TransitionMatrix,
    pub horizon:     CheckOutcome<HorizonSummary>,
    pub absorption:  CheckOutcome<AbsorptionAnalysis>,
    pub rewards:     RewardVector,
    pub ltv:         CheckOutcome<LifetimeValue>,
    pub validation:  ValidationReport,
}

impl AnalysisSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
