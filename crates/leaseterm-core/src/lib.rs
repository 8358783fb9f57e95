//! Lease term engine: chains of dated terms, indexation, proration and
//! idempotent invoice item reconciliation.

pub mod break_option;
pub mod chain;
pub mod clock;
pub mod error;
pub mod frequency;
pub mod indexation;
pub mod interval;
pub mod invoice;
pub mod item;
pub mod lease;
pub mod occupancy;
pub mod proration;
pub mod reconcile;
pub mod settings;
pub mod term;
pub mod types;
pub mod workbook;

pub use error::LeaseError;
pub use types::*;

/// Standard result type for all lease term operations
pub type LeaseResult<T> = Result<T, LeaseError>;
