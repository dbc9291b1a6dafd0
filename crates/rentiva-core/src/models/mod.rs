pub mod upload;

pub use upload::{Identity, Role, ScanStatus, UploadedFileRecord};
