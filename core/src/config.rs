use crate::{
    error::{ChainError, ChainResult},
    types::MonthWindow,
};
use serde::{Deserialize, Serialize};

// ── Panel construction ─────────────────────────────────────────────

/// Which per-month quantity decides whether a customer was active.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityMetric {
    /// Sum of event amounts in the month must be positive.
    Amount,
    /// At least one event in the month.
    Count,
}

/// What to do with negative amounts (returns, reversals) before aggregation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NegativeAmountPolicy {
    Keep,
    ClampToZero,
    Drop,
}

/// How pre-assigned state labels on events interact with the gap rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabelPolicy {
    /// Supplied labels are not read.
    Ignore,
    /// A supplied label replaces the computed state for that month.
    Override,
    /// Computed states are kept; disagreements are counted.
    Validate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleConfig {
    pub size: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PanelConfig {
    /// Months without activity before a customer is at risk.
    pub risk_gap:        u32,
    /// Months without activity before a customer is churned.
    pub churn_gap:       u32,
    pub activity_metric: ActivityMetric,
    #[serde(default = "default_negative_policy")]
    pub negative_amounts: NegativeAmountPolicy,
    #[serde(default = "default_label_policy")]
    pub label_policy:    LabelPolicy,
    #[serde(default)]
    pub sample:          Option<SampleConfig>,
}

fn default_negative_policy() -> NegativeAmountPolicy { NegativeAmountPolicy::Keep }
fn default_label_policy() -> LabelPolicy { LabelPolicy::Ignore }

impl PanelConfig {
    pub fn new(risk_gap: u32, churn_gap: u32, activity_metric: ActivityMetric) -> Self {
        Self {
            risk_gap,
            churn_gap,
            activity_metric,
            negative_amounts: NegativeAmountPolicy::Keep,
            label_policy: LabelPolicy::Ignore,
            sample: None,
        }
    }

    pub fn validate(&self) -> ChainResult<()> {
        if self.risk_gap < 1 {
            return Err(ChainError::config(format!(
                "risk_gap must be >= 1, got {}", self.risk_gap
            )));
        }
        if self.churn_gap <= self.risk_gap {
            return Err(ChainError::config(format!(
                "churn_gap ({}) must be greater than risk_gap ({})",
                self.churn_gap, self.risk_gap
            )));
        }
        if let Some(sample) = &self.sample {
            if sample.size == 0 {
                return Err(ChainError::config("sample size must be positive"));
            }
        }
        Ok(())
    }
}

// ── Transition estimation ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimationConfig {
    pub force_absorbing: bool,
    #[serde(default)]
    pub training_window: Option<MonthWindow>,
}

impl EstimationConfig {
    pub fn validate(&self) -> ChainResult<()> {
        if let Some(w) = self.training_window {
            if w.end < w.start {
                return Err(ChainError::config(format!(
                    "training window end ({}) precedes start ({})", w.end, w.start
                )));
            }
        }
        Ok(())
    }
}

// ── Lifetime value ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewardConfig {
    /// Discount factor γ in (0, 1]. 1.0 = no discounting.
    pub discount:              f64,
    /// Exclude negative-amount months from the per-state reward mean.
    pub drop_negative_rewards: bool,
}

impl RewardConfig {
    pub fn validate(&self) -> ChainResult<()> {
        validate_discount(self.discount)
    }
}

pub fn validate_discount(discount: f64) -> ChainResult<()> {
    if !(discount > 0.0 && discount <= 1.0) {
        return Err(ChainError::config(format!(
            "discount factor must be in (0, 1], got {discount}"
        )));
    }
    Ok(())
}

// ── Validation suite ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationConfig {
    /// Churn probability at or above which a row is predicted to churn.
    pub classification_threshold: f64,
    /// Memory-test groups smaller than this are flagged unreliable.
    pub min_reliable_sample:      u64,
}

impl ValidationConfig {
    pub fn validate(&self) -> ChainResult<()> {
        validate_threshold(self.classification_threshold)
    }
}

pub fn validate_threshold(threshold: f64) -> ChainResult<()> {
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(ChainError::config(format!(
            "classification threshold must be in (0, 1), got {threshold}"
        )));
    }
    Ok(())
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    pub panel:      PanelConfig,
    pub estimation: EstimationConfig,
    pub reward:     RewardConfig,
    pub validation: ValidationConfig,
}

impl AnalysisConfig {
    /// Load a JSON configuration file and validate it.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AnalysisConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every parameter. Must pass before any computation starts.
    pub fn validate(&self) -> ChainResult<()> {
        self.panel.validate()?;
        self.estimation.validate()?;
        self.reward.validate()?;
        self.validation.validate()?;
        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            panel: PanelConfig::new(1, 3, ActivityMetric::Amount),
            estimation: EstimationConfig {
                force_absorbing: true,
                training_window: None,
            },
            reward: RewardConfig {
                discount: 0.98,
                drop_negative_rewards: true,
            },
            validation: ValidationConfig {
                classification_threshold: 0.5,
                min_reliable_sample: 30,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AnalysisConfig::default().validate().unwrap();
    }

    #[test]
    fn churn_gap_must_exceed_risk_gap() {
        let mut cfg = AnalysisConfig::default();
        cfg.panel.risk_gap = 3;
        cfg.panel.churn_gap = 3;
        assert!(matches!(cfg.validate(), Err(ChainError::Configuration(_))));
    }

    #[test]
    fn discount_and_threshold_bounds() {
        assert!(validate_discount(1.0).is_ok());
        assert!(validate_discount(0.0).is_err());
        assert!(validate_discount(1.01).is_err());
        assert!(validate_threshold(0.5).is_ok());
        assert!(validate_threshold(1.0).is_err());
        assert!(validate_threshold(0.0).is_err());
    }

    #[test]
    fn json_round_trip_uses_snake_case_enums() {
        let json = r#"{
            "panel": { "risk_gap": 2, "churn_gap": 4, "activity_metric": "count",
                       "label_policy": "validate" },
            "estimation": { "force_absorbing": false,
                            "training_window": { "start": 24121, "end": 24126 } },
            "reward": { "discount": 0.9, "drop_negative_rewards": false },
            "validation": { "classification_threshold": 0.3, "min_reliable_sample": 10 }
        }"#;
        let cfg: AnalysisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.panel.activity_metric, ActivityMetric::Count);
        assert_eq!(cfg.panel.label_policy, LabelPolicy::Validate);
        assert_eq!(cfg.panel.negative_amounts, NegativeAmountPolicy::Keep);
        assert_eq!(cfg.estimation.training_window.unwrap().len(), 6);
        cfg.validate().unwrap();
    }
}
