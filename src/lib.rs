//! # Jaspel
//!
//! Back-office core for clinic service fees (jasa pelayanan): fee
//! calculation, the validation and audit workflow, cached dashboard read
//! models, reports and a transport-independent REST API.
//!
//! The HTTP server lives in the `jaspel-server` workspace member.

pub mod api;
pub mod audit;
pub mod cache;
pub mod calculation;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod metrics;
pub mod model;
pub mod report;
pub mod service;
pub mod status;
pub mod store;
pub mod validation;

pub use config::AppConfig;
pub use error::{JaspelError, Result, StoreError, ValidationErrors};
pub use service::AppState;
pub use status::ValidationStatus;
pub use store::Database;
