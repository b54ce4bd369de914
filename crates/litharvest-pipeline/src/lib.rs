//! Litharvest Pipeline — record deduplication, merge, and fallback PDF acquisition.

pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod identifiers;
pub mod merge;
pub mod pipeline;
pub mod resolve;
pub mod store;
pub mod strategies;

pub use audit::{
    AcquisitionResult, AttemptOutcome, AuditLog, DownloadAttempt, DownloadOutcome, RunReport,
};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use merge::MergePolicy;
pub use pipeline::{Acquirer, StopHandle};
pub use resolve::IdentityResolver;
pub use strategies::{AttemptResult, Strategy};
