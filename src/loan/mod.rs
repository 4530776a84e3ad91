//! Loan aggregate domain module
//!
//! Contains the loan model, balance math, and the service owning loan
//! lifecycle and aggregate balance updates.

mod model;
mod service;

pub use model::*;
pub use service::LoanService;
