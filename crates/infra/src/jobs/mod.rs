//! Scheduled background jobs.
//!
//! ## Components
//!
//! - `RetryPendingInvoices`: periodic sweep that numbers invoices left
//!   pending by a crash or an abandoned handler
//! - `chunk`: fixed-size grouping used to bound sweep concurrency

pub mod retry_pending;

pub use retry_pending::{RetryPendingInvoices, SweepReport, chunk};
