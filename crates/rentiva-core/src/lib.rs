//! Rentiva Core Library
//!
//! This crate provides the domain models, error types, configuration, and
//! shared traits used by the upload security pipeline and its services.

pub mod capacity;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod telemetry;

// Re-export commonly used types
pub use capacity::CapacityChecker;
pub use config::UploadSecurityConfig;
pub use error::{RejectionReason, Severity, UploadError};
pub use ledger::UploadLedger;
pub use models::{Identity, Role, ScanStatus, UploadedFileRecord};
