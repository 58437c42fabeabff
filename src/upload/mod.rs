//! Upload manager with request validation and event routing
//!
//! Provides the host side of the background upload service:
//! - Request validation with the exact failure messages callers match on
//! - Defaults for method, notification title, headers and parameters
//! - A single shared callback for every upload lifecycle event
//! - Pass-through remove/acknowledge/destroy commands with per-call replies

mod config;
mod manager;
mod types;
mod validate;

pub use config::{ManagerOptions, DEFAULT_PARALLEL_UPLOADS_LIMIT};
pub use manager::{EventCallback, UploadManager};
pub use types::{
    ManagerState, UploadEvent, UploadPayload, UploadState, DEFAULT_NOTIFICATION_TITLE,
    DEFAULT_REQUEST_METHOD,
};
pub use validate::{validate_upload, ValidatedUpload, ValidationError};
