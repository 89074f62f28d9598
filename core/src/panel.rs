//! Panel builder: raw events into a gap-filled customer × month grid.
//!
//! Steps:
//!   1. Apply the negative-amount policy and bucket events per (customer, month)
//!   2. Drop customers that were never active (no state before acquisition)
//!   3. Optionally sample customers with a seeded RNG
//!   4. Walk each customer's months from first activity to the global last
//!      month, classifying every cell and carrying the churn flag forward
//!   5. Link each cell to the following month's state
//!
//! Cells are stored customer-major, month-ascending. Every customer's run is
//! contiguous and starts at that customer's first active month.

use crate::{
    config::{ActivityMetric, LabelPolicy, NegativeAmountPolicy, PanelConfig},
    error::{ChainError, ChainResult},
    event::Event,
    rng::{RngStream, SeededRng},
    types::{CustomerId, MonthIndex, MonthWindow, State, STATE_COUNT},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PanelCell {
    pub customer_id:                CustomerId,
    pub month_index:                MonthIndex,
    /// Summed event amount for the month (after the negative-amount policy).
    pub amount:                     f64,
    pub event_count:                u32,
    pub had_activity:               bool,
    /// Zero in active months; cells start at first activity so this is always defined.
    pub months_since_last_activity: u32,
    pub state:                      State,
    /// State in the following month; `None` for the customer's last cell.
    pub next_state:                 Option<State>,
}

/// Outcome of comparing supplied labels against computed states.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelAudit {
    pub labelled_cells: u64,
    pub mismatches:     u64,
    pub overridden:     u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panel {
    cells:      Vec<PanelCell>,
    spans:      Vec<Range<usize>>,
    months:     MonthWindow,
    metric:     ActivityMetric,
    label_audit: Option<LabelAudit>,
}

#[derive(Debug, Default)]
struct Bucket {
    amount:      f64,
    event_count: u32,
    label:       Option<(NaiveDate, State)>,
}

/// Classify one month from its activity flag and the gap since last activity.
///
/// Active months are `Active`. An inactive month is churned once the gap
/// reaches `churn_gap` and at risk otherwise, so `[risk_gap, churn_gap)` is
/// at risk and `[churn_gap, ∞)` is churned. There is no grace period: with
/// `risk_gap >= 2` an inactive month below it is still at risk.
pub fn classify(had_activity: bool, gap: u32, churn_gap: u32) -> State {
    if had_activity {
        State::Active
    } else if gap < churn_gap {
        State::AtRisk
    } else {
        State::Churned
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

impl Panel {
    /// Build the full panel from raw events.
    pub fn build(events: &[Event], config: &PanelConfig) -> ChainResult<Self> {
        config.validate()?;

        let buckets = bucket_events(events, config.negative_amounts, config.label_policy);
        if buckets.is_empty() {
            return Err(ChainError::insufficient("no usable events to build a panel"));
        }
        let global_first = buckets.keys().map(|(_, m)| *m).min().unwrap_or_default();
        let global_last = buckets.keys().map(|(_, m)| *m).max().unwrap_or_default();

        // Group buckets per customer; BTreeMap keeps customers and months ordered.
        let mut per_customer: BTreeMap<&CustomerId, BTreeMap<MonthIndex, &Bucket>> = BTreeMap::new();
        for ((customer, month), bucket) in &buckets {
            per_customer.entry(customer).or_default().insert(*month, bucket);
        }

        let metric_of = |b: &Bucket| -> f64 {
            match config.activity_metric {
                ActivityMetric::Amount => b.amount,
                ActivityMetric::Count  => b.event_count as f64,
            }
        };

        let mut eligible: Vec<(&CustomerId, MonthIndex)> = per_customer
            .iter()
            .filter_map(|(customer, months)| {
                months
                    .iter()
                    .find(|(_, b)| metric_of(**b) > 0.0)
                    .map(|(m, _)| (*customer, *m))
            })
            .collect();

        let excluded = per_customer.len() - eligible.len();
        if excluded > 0 {
            log::debug!("panel: {excluded} customers never active, excluded");
        }

        if let Some(sample) = &config.sample {
            if sample.size < eligible.len() {
                let mut rng = SeededRng::new(sample.seed, RngStream::CustomerSample);
                eligible = rng.choose_without_replacement(&eligible, sample.size);
                eligible.sort_by(|a, b| a.0.cmp(b.0));
                log::info!(
                    "panel: sampled {} customers (stream={}, seed={})",
                    eligible.len(), rng.name, sample.seed,
                );
            }
        }

        if eligible.is_empty() {
            return Err(ChainError::insufficient("no customer has any active month"));
        }

        let mut cells = Vec::new();
        let mut spans = Vec::with_capacity(eligible.len());
        let mut audit = LabelAudit::default();

        for (customer, first_active) in eligible {
            let months = &per_customer[customer];
            let start = cells.len();

            let mut last_active = first_active;
            let mut ever_churned = false;

            for month in first_active..=global_last {
                let bucket = months.get(&month).copied();
                let amount = bucket.map(|b| b.amount).unwrap_or(0.0);
                let event_count = bucket.map(|b| b.event_count).unwrap_or(0);
                let had_activity = bucket.map(|b| metric_of(b) > 0.0).unwrap_or(false);
                if had_activity {
                    last_active = month;
                }
                let gap = (month - last_active) as u32;

                let mut state = classify(had_activity, gap, config.churn_gap);
                let supplied = bucket.and_then(|b| b.label.map(|(_, s)| s));

                if let (LabelPolicy::Override, Some(label)) = (config.label_policy, supplied) {
                    audit.labelled_cells += 1;
                    if label != state {
                        audit.overridden += 1;
                        state = label;
                    }
                }

                // Absorption: once churned, always churned.
                if ever_churned {
                    state = State::Churned;
                }
                ever_churned |= state == State::Churned;

                if let (LabelPolicy::Validate, Some(label)) = (config.label_policy, supplied) {
                    audit.labelled_cells += 1;
                    if label != state {
                        audit.mismatches += 1;
                    }
                }

                cells.push(PanelCell {
                    customer_id: customer.clone(),
                    month_index: month,
                    amount,
                    event_count,
                    had_activity,
                    months_since_last_activity: gap,
                    state,
                    next_state: None,
                });
            }

            link_next_states(&mut cells[start..]);
            spans.push(start..cells.len());
        }

        let label_audit = match config.label_policy {
            LabelPolicy::Ignore => None,
            _ => Some(audit),
        };
        if let Some(a) = &label_audit {
            if a.mismatches > 0 {
                log::warn!(
                    "panel: {} of {} supplied labels disagree with the gap rule",
                    a.mismatches, a.labelled_cells,
                );
            }
        }

        let panel_first = cells.iter().map(|c| c.month_index).min().unwrap_or(global_first);
        log::info!(
            "panel built: customers={} cells={} months={}..={} (risk_gap={}, churn_gap={})",
            spans.len(), cells.len(), panel_first, global_last, config.risk_gap, config.churn_gap,
        );

        Ok(Self {
            cells,
            spans,
            months: MonthWindow::new(panel_first, global_last),
            metric: config.activity_metric,
            label_audit,
        })
    }

    /// Assemble a panel from already-classified state sequences, one per
    /// customer, each starting at the given month. Absorption is enforced and
    /// a month counts as active exactly when its state is `Active`.
    pub fn from_state_sequences<I>(sequences: I) -> ChainResult<Self>
    where
        I: IntoIterator<Item = (CustomerId, MonthIndex, Vec<State>)>,
    {
        let mut cells = Vec::new();
        let mut spans = Vec::new();

        for (customer, start_month, states) in sequences {
            if states.is_empty() {
                continue;
            }
            let start = cells.len();
            let mut last_active: Option<MonthIndex> = None;
            let mut ever_churned = false;

            for (offset, supplied) in states.into_iter().enumerate() {
                let month = start_month + offset as MonthIndex;
                let state = if ever_churned { State::Churned } else { supplied };
                ever_churned |= state == State::Churned;
                let had_activity = state == State::Active;
                if had_activity {
                    last_active = Some(month);
                }
                let gap = last_active.map(|m| (month - m) as u32).unwrap_or(0);

                cells.push(PanelCell {
                    customer_id: customer.clone(),
                    month_index: month,
                    amount: 0.0,
                    event_count: 0,
                    had_activity,
                    months_since_last_activity: gap,
                    state,
                    next_state: None,
                });
            }
            link_next_states(&mut cells[start..]);
            spans.push(start..cells.len());
        }

        if cells.is_empty() {
            return Err(ChainError::insufficient("no state sequences supplied"));
        }
        let first = cells.iter().map(|c| c.month_index).min().unwrap_or_default();
        let last = cells.iter().map(|c| c.month_index).max().unwrap_or_default();

        Ok(Self {
            cells,
            spans,
            months: MonthWindow::new(first, last),
            metric: ActivityMetric::Count,
            label_audit: None,
        })
    }
}

fn bucket_events(
    events: &[Event],
    negative: NegativeAmountPolicy,
    labels: LabelPolicy,
) -> BTreeMap<(CustomerId, MonthIndex), Bucket> {
    let mut buckets: BTreeMap<(CustomerId, MonthIndex), Bucket> = BTreeMap::new();

    for event in events {
        let amount = match negative {
            NegativeAmountPolicy::Keep => event.amount,
            NegativeAmountPolicy::ClampToZero => event.amount.max(0.0),
            NegativeAmountPolicy::Drop if event.amount < 0.0 => continue,
            NegativeAmountPolicy::Drop => event.amount,
        };
        if !amount.is_finite() {
            log::warn!("panel: skipping non-finite amount for {}", event.customer_id);
            continue;
        }

        let bucket = buckets
            .entry((event.customer_id.clone(), event.month_index()))
            .or_default();
        bucket.amount += amount;
        bucket.event_count += 1;

        // Latest-dated label in the month wins.
        if labels != LabelPolicy::Ignore {
            if let Some(label) = event.state_label {
                let newer = bucket.label.map(|(d, _)| event.date >= d).unwrap_or(true);
                if newer {
                    bucket.label = Some((event.date, label));
                }
            }
        }
    }

    buckets
}

fn link_next_states(cells: &mut [PanelCell]) {
    for i in 0..cells.len() {
        cells[i].next_state = cells.get(i + 1).map(|c| c.state);
    }
}

// ── Queries ──────────────────────────────────────────────────────────────────

impl Panel {
    pub fn cells(&self) -> &[PanelCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn metric(&self) -> ActivityMetric {
        self.metric
    }

    pub fn label_audit(&self) -> Option<&LabelAudit> {
        self.label_audit.as_ref()
    }

    /// The month span covered by at least one cell.
    pub fn months(&self) -> MonthWindow {
        self.months
    }

    pub fn customer_count(&self) -> usize {
        self.spans.len()
    }

    /// Each customer's contiguous, month-ordered run of cells.
    pub fn customers(&self) -> impl Iterator<Item = &[PanelCell]> + '_ {
        self.spans.iter().map(move |r| &self.cells[r.clone()])
    }

    pub fn cells_in_month(&self, month: MonthIndex) -> impl Iterator<Item = &PanelCell> + '_ {
        self.cells.iter().filter(move |c| c.month_index == month)
    }

    /// Number of cells per state in `month`. Each customer has at most one
    /// cell per month, so this is also the number of unique customers.
    pub fn state_counts_in_month(&self, month: MonthIndex) -> [u64; STATE_COUNT] {
        let mut counts = [0u64; STATE_COUNT];
        for cell in self.cells_in_month(month) {
            counts[cell.state.index()] += 1;
        }
        counts
    }

    /// Empirical state shares in `month`. All zeros when the month has no cells.
    pub fn state_distribution(&self, month: MonthIndex) -> [f64; STATE_COUNT] {
        shares(self.state_counts_in_month(month))
    }

    /// Cell counts per state over the whole panel.
    pub fn state_counts(&self) -> [u64; STATE_COUNT] {
        let mut counts = [0u64; STATE_COUNT];
        for cell in &self.cells {
            counts[cell.state.index()] += 1;
        }
        counts
    }

    pub fn overall_distribution(&self) -> [f64; STATE_COUNT] {
        shares(self.state_counts())
    }

    /// State shares for every month of the panel, ascending.
    pub fn monthly_distribution(&self) -> Vec<(MonthIndex, [f64; STATE_COUNT])> {
        let mut counts: BTreeMap<MonthIndex, [u64; STATE_COUNT]> = BTreeMap::new();
        for cell in &self.cells {
            counts.entry(cell.month_index).or_default()[cell.state.index()] += 1;
        }
        counts.into_iter().map(|(m, c)| (m, shares(c))).collect()
    }
}

pub(crate) fn shares(counts: [u64; STATE_COUNT]) -> [f64; STATE_COUNT] {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return [0.0; STATE_COUNT];
    }
    counts.map(|c| c as f64 / total as f64)
}
