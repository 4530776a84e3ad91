//! Installment ledger domain module
//!
//! Contains models, fine accrual math, and the ledger service owning
//! installment status transitions.

mod model;
mod service;

pub use model::*;
pub use service::InstallmentService;
