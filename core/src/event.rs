//! Transactional input records.
//!
//! RULE: Events are immutable. The panel builder reads them and never
//! writes back. Parsing uploaded files is the ingestion collaborator's job;
//! the core only sees already-typed `Event` values.

use crate::types::{month_index, CustomerId, MonthIndex, State};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One transactional record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub customer_id: CustomerId,
    pub date:        NaiveDate,
    /// Activity amount, e.g. price × quantity. May be negative (returns).
    pub amount:      f64,
    /// Optional pre-assigned lifecycle label for this customer-month.
    #[serde(default)]
    pub state_label: Option<State>,
}

impl Event {
    pub fn new(customer_id: impl Into<CustomerId>, date: NaiveDate, amount: f64) -> Self {
        Self {
            customer_id: customer_id.into(),
            date,
            amount,
            state_label: None,
        }
    }

    pub fn with_label(mut self, label: State) -> Self {
        self.state_label = Some(label);
        self
    }

    pub fn month_index(&self) -> MonthIndex {
        month_index(self.date)
    }
}
