//! Customer lifecycle Markov chain: panel construction, transition
//! estimation, horizon and absorbing-chain analytics, and model validation.

pub mod absorbing;
pub mod analysis;
pub mod config;
pub mod error;
pub mod event;
pub mod horizon;
pub mod linalg;
pub mod panel;
pub mod rng;
pub mod snapshot;
pub mod store;
pub mod synthetic;
pub mod transition;
pub mod types;
pub mod validation;
