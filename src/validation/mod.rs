//! Validation of jaspel-relevant records.
//!
//! - [`rules`]: the composite input rule applied before a JaspelEntry is stored
//! - [`workflow`]: the status state machine and its side effects (audit,
//!   validator stamp, entry generation, cache invalidation)

pub mod rules;
pub mod workflow;

pub use rules::{JaspelEntryRule, RuleOutcome};
pub use workflow::{BulkItem, TransitionOutcome, TransitionRequest, ValidationWorkflow};
