//! Host-side control surface for a background file upload service.
//!
//! The crate validates upload requests, fills in defaults and forwards them
//! as typed [`bridge::Command`]s to an out-of-process uploader. Everything the
//! uploader reports comes back through the single callback registered with
//! [`UploadManager::init`].
//!
//! - [`upload`] holds the manager, request/event types and validation.
//! - [`bridge`] defines the transport seam and an in-process channel transport.
//! - [`error`] is the crate error type.
//! - `plugin` (feature `tauri-plugin`) exposes the manager to a Tauri webview.

pub mod bridge;
pub mod error;
#[cfg(feature = "tauri-plugin")]
pub mod plugin;
pub mod upload;

pub use bridge::{Bridge, Command, ReplyCallback, SERVICE_NAME};
pub use error::ManagerError;
pub use upload::{ManagerOptions, UploadEvent, UploadManager, UploadPayload, UploadState};
