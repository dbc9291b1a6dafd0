//! Upload security pipeline.
//!
//! Sequences the untrusted-input checks for each uploaded file in a fixed,
//! auditable order: whitelist → signature → polyglot → content validation →
//! sanitization → hashing → duplicate lookup → malware scan → ledger write.
//! Each stage either transforms the file context or produces a terminal
//! typed rejection; no partial acceptance.

pub mod audit;
pub mod hasher;
pub mod pipeline;
pub mod polyglot;
pub mod sanitizer;
pub mod signature;
pub mod test_helpers;
pub mod traits;
pub mod types;
pub mod validator;

pub use pipeline::UploadPipeline;
pub use traits::{QuarantineSink, ScanVerdict, VirusScanner};
pub use types::{FinalizedFile, IncomingFile};
