//! Invoicing domain module.
//!
//! Business rules for invoice numbering, implemented as deterministic domain
//! logic (no IO, no HTTP, no storage). The only randomness is the failure
//! injector, which takes its RNG as a parameter when determinism matters.

pub mod backoff;
pub mod fault;
pub mod invoice;

pub use backoff::BackoffPolicy;
pub use fault::FailureInjector;
pub use invoice::{Invoice, InvoiceNumber, InvoiceStatus};
