//! In-process transport: commands travel over an unbounded tokio channel to
//! a task that dispatches them to a [`TransferService`].

use log::{debug, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Bridge, Command, ReplyCallback, SERVICE_NAME};
use crate::upload::UploadEvent;

/// One forwarded command with the sinks its replies go to
pub struct Envelope {
    pub service: String,
    pub command: Command,
    pub on_success: Option<ReplyCallback>,
    pub on_error: Option<ReplyCallback>,
}

/// Reply handle given to the service for a single command
#[derive(Clone)]
pub struct Responder {
    command: &'static str,
    on_success: Option<ReplyCallback>,
    on_error: Option<ReplyCallback>,
}

impl Responder {
    fn new(
        command: &'static str,
        on_success: Option<ReplyCallback>,
        on_error: Option<ReplyCallback>,
    ) -> Self {
        Self {
            command,
            on_success,
            on_error,
        }
    }

    pub fn success(&self, value: Value) {
        match &self.on_success {
            Some(sink) => sink(value),
            None => debug!("{}: success reply without sink dropped", self.command),
        }
    }

    pub fn error(&self, value: Value) {
        match &self.on_error {
            Some(sink) => sink(value),
            None => warn!("{}: error reply without sink dropped: {}", self.command, value),
        }
    }

    /// Send an upload event on the success sink
    pub fn event(&self, event: &UploadEvent) {
        self.success(json!(event));
    }
}

/// The out-of-process side of the bridge.
///
/// `handle` runs on the dispatch task and should not block; long-running
/// work is expected to be spawned and report back through the responder.
pub trait TransferService: Send + Sync + 'static {
    fn handle(&self, command: Command, responder: Responder);
}

#[derive(Clone)]
pub struct ChannelBridge {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelBridge {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Create a bridge and run `service` behind it on the current runtime.
    pub fn spawn<S: TransferService>(service: S) -> (Arc<Self>, JoinHandle<()>) {
        let (bridge, rx) = Self::new();
        let handle = tokio::spawn(serve(rx, service));
        (Arc::new(bridge), handle)
    }
}

impl Bridge for ChannelBridge {
    fn forward(
        &self,
        on_success: Option<ReplyCallback>,
        on_error: Option<ReplyCallback>,
        service: &'static str,
        command: Command,
    ) {
        let envelope = Envelope {
            service: service.to_string(),
            command,
            on_success,
            on_error,
        };
        if let Err(mpsc::error::SendError(envelope)) = self.tx.send(envelope) {
            warn!("bridge: {} not delivered, service stopped", envelope.command);
            let responder =
                Responder::new(envelope.command.name(), envelope.on_success, envelope.on_error);
            responder.error(json!({ "error": "Transfer service is not running" }));
        }
    }
}

/// Dispatch envelopes to `service` until every sender is dropped.
pub async fn serve<S: TransferService>(mut rx: mpsc::UnboundedReceiver<Envelope>, service: S) {
    while let Some(envelope) = rx.recv().await {
        let responder =
            Responder::new(envelope.command.name(), envelope.on_success, envelope.on_error);
        if envelope.service != SERVICE_NAME {
            warn!("bridge: unknown service {}", envelope.service);
            responder.error(json!({ "error": format!("Unknown service: {}", envelope.service) }));
            continue;
        }
        debug!("bridge: dispatch {}", envelope.command);
        service.handle(envelope.command, responder);
    }
    info!("bridge: channel closed, transfer service stopped");
}
