//! Command transport between the upload manager and the transfer service
//!
//! - [`Command`] is the closed set of operations the service understands.
//! - [`Bridge`] is the seam a transport implements; the manager only ever
//!   talks to `dyn Bridge`.
//! - [`channel`] provides an in-process transport over a tokio channel.
//! - [`reply`] turns per-call sinks into an awaitable result.

pub mod channel;
pub mod reply;

use serde_json::{json, Value};
use std::sync::Arc;

use crate::upload::{ManagerOptions, UploadPayload};

/// Name of the service every command is addressed to
pub const SERVICE_NAME: &str = "FileTransferBackground";

/// Sink for replies crossing the bridge. Sinks may be called more than once
/// (the shared event sink receives every event for an upload).
pub type ReplyCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Wrap a closure as a [`ReplyCallback`].
pub fn callback<F>(f: F) -> ReplyCallback
where
    F: Fn(Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    InitManager(ManagerOptions),
    StartUpload(UploadPayload),
    RemoveUpload(String),
    AcknowledgeEvent(String),
    Destroy,
}

impl Command {
    /// Command name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Command::InitManager(_) => "initManager",
            Command::StartUpload(_) => "startUpload",
            Command::RemoveUpload(_) => "removeUpload",
            Command::AcknowledgeEvent(_) => "acknowledgeEvent",
            Command::Destroy => "destroy",
        }
    }

    /// Positional arguments on the wire
    pub fn args(&self) -> Vec<Value> {
        match self {
            Command::InitManager(options) => vec![json!(options)],
            Command::StartUpload(payload) => vec![json!(payload)],
            Command::RemoveUpload(id) | Command::AcknowledgeEvent(id) => vec![json!(id)],
            Command::Destroy => Vec::new(),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Transport to the out-of-process transfer service.
///
/// `forward` must not block: replies arrive later through the sinks, which
/// the transport invokes verbatim with whatever the service sent.
pub trait Bridge: Send + Sync {
    fn forward(
        &self,
        on_success: Option<ReplyCallback>,
        on_error: Option<ReplyCallback>,
        service: &'static str,
        command: Command,
    );
}
