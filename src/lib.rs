//! Lendcore server library
//!
//! Core modules for the loan-servicing backend: amortization math, the
//! installment ledger, loan aggregates, payment reconciliation, and the
//! scheduled sweeps.

pub mod amortization;
pub mod config;
pub mod error;
pub mod handlers;
pub mod installment;
pub mod loan;
pub mod middleware;
pub mod models;
pub mod notification;
pub mod payment;
pub mod routes;
pub mod scanner;
pub mod state;
