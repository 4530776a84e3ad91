//! Route definitions for the lending API

mod admin;
mod loan;
mod payment;

pub use admin::admin_routes;
pub use loan::loan_routes;
pub use payment::payment_routes;
