//! Synthetic purchase histories for demos and tests.
//!
//! Each customer carries a hidden engagement level that drifts month to
//! month (engaged → lapsing → gone, with some win-backs). Purchases are
//! drawn from that hidden level, so the observed gap-rule states are a
//! noisy view of it, much like real transaction data.
//!
//! RULE: All draws come from the `SyntheticHistory` stream. The same
//! config always yields the same events, in the same order.

use crate::{
    error::{ChainError, ChainResult},
    event::Event,
    rng::{RngStream, SeededRng},
    types::{month_index, month_start, MonthIndex},
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyntheticConfig {
    pub customers:          usize,
    pub months:             u32,
    pub start:              NaiveDate,
    pub seed:               u64,
    /// Customers are acquired uniformly over this many leading months.
    pub acquisition_months: u32,
    // Monthly engagement dynamics
    pub lapse_rate:         f64,
    pub recover_rate:       f64,
    pub leave_rate:         f64,
    pub winback_rate:       f64,
    // Purchase behaviour per engagement level
    pub engaged_buy_rate:   f64,
    pub lapsing_buy_rate:   f64,
    pub max_orders:         u32,
    pub amount_min:         f64,
    pub amount_alpha:       f64,
    /// Chance that an order is followed by a refund of part of it.
    pub refund_rate:        f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            customers:          500,
            months:             24,
            start:              NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            seed:               42,
            acquisition_months: 6,
            lapse_rate:         0.08,
            recover_rate:       0.30,
            leave_rate:         0.25,
            winback_rate:       0.02,
            engaged_buy_rate:   0.85,
            lapsing_buy_rate:   0.20,
            max_orders:         3,
            amount_min:         20.0,
            amount_alpha:       2.5,
            refund_rate:        0.03,
        }
    }
}

impl SyntheticConfig {
    pub fn validate(&self) -> ChainResult<()> {
        if self.customers == 0 || self.months == 0 {
            return Err(ChainError::config("synthetic history needs customers > 0 and months > 0"));
        }
        if self.acquisition_months == 0 || self.acquisition_months > self.months {
            return Err(ChainError::config(format!(
                "acquisition_months must be in 1..={}, got {}",
                self.months, self.acquisition_months
            )));
        }
        for (name, p) in [
            ("lapse_rate", self.lapse_rate),
            ("recover_rate", self.recover_rate),
            ("leave_rate", self.leave_rate),
            ("winback_rate", self.winback_rate),
            ("engaged_buy_rate", self.engaged_buy_rate),
            ("lapsing_buy_rate", self.lapsing_buy_rate),
            ("refund_rate", self.refund_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ChainError::config(format!("{name} must be in [0, 1], got {p}")));
            }
        }
        if self.recover_rate + self.leave_rate > 1.0 {
            return Err(ChainError::config("recover_rate + leave_rate must not exceed 1"));
        }
        if self.max_orders == 0 || self.amount_min <= 0.0 || self.amount_alpha <= 0.0 {
            return Err(ChainError::config("max_orders, amount_min and amount_alpha must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engagement {
    Engaged,
    Lapsing,
    Gone,
}

/// Generate the full event history, sorted by customer then date.
pub fn generate_history(config: &SyntheticConfig) -> ChainResult<Vec<Event>> {
    config.validate()?;
    let mut rng = SeededRng::new(config.seed, RngStream::SyntheticHistory);
    let first_month = month_index(config.start);
    let mut events = Vec::new();

    for i in 0..config.customers {
        let customer_id = format!("CUST-{i:05}");
        let acquired = first_month + rng.next_u64_below(config.acquisition_months as u64) as MonthIndex;
        let last_month = first_month + config.months as MonthIndex - 1;
        let mut level = Engagement::Engaged;

        for month in acquired..=last_month {
            // Acquisition month always has a purchase.
            let buy_rate = match level {
                _ if month == acquired => 1.0,
                Engagement::Engaged => config.engaged_buy_rate,
                Engagement::Lapsing => config.lapsing_buy_rate,
                Engagement::Gone    => config.winback_rate,
            };
            if rng.chance(buy_rate) {
                push_orders(&mut events, &mut rng, config, &customer_id, month)?;
                if level == Engagement::Gone {
                    level = Engagement::Engaged;
                }
            }
            level = next_level(level, &mut rng, config);
        }
    }

    log::info!(
        "synthetic history: customers={} months={} events={} (stream={}, seed={})",
        config.customers, config.months, events.len(), rng.name, config.seed,
    );
    Ok(events)
}

fn next_level(level: Engagement, rng: &mut SeededRng, config: &SyntheticConfig) -> Engagement {
    match level {
        Engagement::Engaged if rng.chance(config.lapse_rate) => Engagement::Lapsing,
        Engagement::Engaged => Engagement::Engaged,
        Engagement::Lapsing => {
            let roll = rng.next_f64();
            if roll < config.recover_rate {
                Engagement::Engaged
            } else if roll < config.recover_rate + config.leave_rate {
                Engagement::Gone
            } else {
                Engagement::Lapsing
            }
        }
        Engagement::Gone => Engagement::Gone,
    }
}

fn push_orders(
    events: &mut Vec<Event>,
    rng: &mut SeededRng,
    config: &SyntheticConfig,
    customer_id: &str,
    month: MonthIndex,
) -> ChainResult<()> {
    let first_day = month_start(month)
        .ok_or_else(|| ChainError::config(format!("month index {month} is out of the calendar range")))?;
    let orders = 1 + rng.next_u64_below(config.max_orders as u64) as u32;

    for _ in 0..orders {
        let date = day_in_month(first_day, rng);
        let amount = (rng.pareto(config.amount_min, config.amount_alpha) * 100.0).round() / 100.0;
        events.push(Event::new(customer_id, date, amount));

        if rng.chance(config.refund_rate) {
            let refund = (amount * (0.2 + 0.8 * rng.next_f64()) * 100.0).round() / 100.0;
            events.push(Event::new(customer_id, day_in_month(first_day, rng), -refund));
        }
    }
    Ok(())
}

/// A day in 1..=28 of the month starting at `first_day`.
fn day_in_month(first_day: NaiveDate, rng: &mut SeededRng) -> NaiveDate {
    let day = 1 + rng.next_u64_below(28) as u32;
    first_day.with_day(day).unwrap_or(first_day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_history() {
        let cfg = SyntheticConfig { customers: 30, months: 8, ..Default::default() };
        let a = generate_history(&cfg).unwrap();
        let b = generate_history(&cfg).unwrap();
        assert_eq!(a, b);

        let other = generate_history(&SyntheticConfig { seed: 7, ..cfg }).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn events_stay_inside_the_requested_months() {
        let cfg = SyntheticConfig { customers: 50, months: 5, acquisition_months: 2, ..Default::default() };
        let first = month_index(cfg.start);
        for e in generate_history(&cfg).unwrap() {
            let m = e.month_index();
            assert!(m >= first && m < first + 5, "month {m} outside window");
        }
    }

    #[test]
    fn rejects_bad_rates() {
        let cfg = SyntheticConfig { lapse_rate: 1.5, ..Default::default() };
        assert!(matches!(generate_history(&cfg), Err(ChainError::Configuration(_))));
        let cfg = SyntheticConfig { acquisition_months: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }
}
