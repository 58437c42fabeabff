//! The upload manager: validates requests, applies defaults and forwards
//! commands to the transfer service through a [`Bridge`].

use log::{debug, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;

use super::config::ManagerOptions;
use super::types::{ManagerState, UploadEvent, UploadPayload};
use super::validate::{read_payload, validate_upload};
use crate::bridge::{callback, Bridge, Command, ReplyCallback, SERVICE_NAME};
use crate::error::ManagerError;

/// Shared sink for every upload lifecycle event
pub type EventCallback = Arc<dyn Fn(UploadEvent) + Send + Sync>;

pub struct UploadManager {
    options: ManagerOptions,
    callback: Option<EventCallback>,
    bridge: Arc<dyn Bridge>,
}

impl UploadManager {
    /// Create a manager and send `initManager` to the transfer service.
    /// `callback` receives the init reply and every later event.
    pub fn init<F>(options: Option<ManagerOptions>, bridge: Arc<dyn Bridge>, callback: F) -> Self
    where
        F: Fn(UploadEvent) + Send + Sync + 'static,
    {
        Self::connect(options, bridge, Arc::new(callback))
    }

    /// Same as [`init`](Self::init) for callers holding an optional sink,
    /// e.g. one resolved at runtime. Fails without forwarding anything when
    /// no sink is given.
    pub fn init_with_sink(
        options: Option<ManagerOptions>,
        bridge: Arc<dyn Bridge>,
        callback: Option<EventCallback>,
    ) -> Result<Self, ManagerError> {
        let callback = callback.ok_or(ManagerError::MissingEventHandler)?;
        Ok(Self::connect(options, bridge, callback))
    }

    fn connect(
        options: Option<ManagerOptions>,
        bridge: Arc<dyn Bridge>,
        callback: EventCallback,
    ) -> Self {
        let options = options.unwrap_or_default().finalize();
        info!(
            "upload_manager: init parallel_uploads_limit={}",
            options.parallel_uploads_limit()
        );
        bridge.forward(
            Some(event_sink(&callback)),
            None,
            SERVICE_NAME,
            Command::InitManager(options.clone()),
        );
        Self {
            options,
            callback: Some(callback),
            bridge,
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn state(&self) -> ManagerState {
        match self.callback {
            Some(_) => ManagerState::Ready,
            None => ManagerState::Destroyed,
        }
    }

    fn live_callback(&self) -> Result<&EventCallback, ManagerError> {
        self.callback.as_ref().ok_or(ManagerError::Destroyed)
    }

    /// Validate and forward an upload.
    ///
    /// A rejected request is reported as a single `FAILED` event on the
    /// shared callback and `Ok(())` is returned; `Err` only signals that the
    /// manager was already destroyed.
    pub fn start_upload(&self, payload: Option<UploadPayload>) -> Result<(), ManagerError> {
        let events = self.live_callback()?;
        match validate_upload(payload) {
            Ok(upload) => {
                debug!("upload_manager: start {}", upload.id());
                self.bridge.forward(
                    Some(event_sink(events)),
                    None,
                    SERVICE_NAME,
                    Command::StartUpload(upload.into_payload()),
                );
            }
            Err(rejection) => {
                warn!(
                    "upload_manager: start rejected id={} error={}",
                    rejection.id().unwrap_or("-"),
                    rejection
                );
                events(rejection.to_event());
            }
        }
        Ok(())
    }

    /// [`start_upload`](Self::start_upload) for an untyped request. Null or
    /// anything that is not an object counts as missing; an object that
    /// still does not read as an upload is reported against its `id`.
    pub fn start_upload_value(&self, payload: Value) -> Result<(), ManagerError> {
        let events = self.live_callback()?;
        match read_payload(payload) {
            Ok(payload) => self.start_upload(payload),
            Err(rejection) => {
                warn!(
                    "upload_manager: start rejected id={} error={}",
                    rejection.id().unwrap_or("-"),
                    rejection
                );
                events(rejection.to_event());
                Ok(())
            }
        }
    }

    /// Ask the service to cancel and forget an upload.
    pub fn remove_upload(
        &self,
        id: Option<&str>,
        on_success: Option<ReplyCallback>,
        on_error: Option<ReplyCallback>,
    ) -> Result<(), ManagerError> {
        self.live_callback()?;
        self.forward_with_id(id, "Upload ID is required", on_success, on_error, Command::RemoveUpload)
    }

    /// Tell the service an event was durably handled and need not be
    /// redelivered.
    pub fn acknowledge_event(
        &self,
        id: Option<&str>,
        on_success: Option<ReplyCallback>,
        on_error: Option<ReplyCallback>,
    ) -> Result<(), ManagerError> {
        self.live_callback()?;
        self.forward_with_id(
            id,
            "Event ID is required",
            on_success,
            on_error,
            Command::AcknowledgeEvent,
        )
    }

    fn forward_with_id(
        &self,
        id: Option<&str>,
        missing: &str,
        on_success: Option<ReplyCallback>,
        on_error: Option<ReplyCallback>,
        command: fn(String) -> Command,
    ) -> Result<(), ManagerError> {
        match id.filter(|id| !id.is_empty()) {
            Some(id) => {
                let command = command(id.to_string());
                debug!("upload_manager: {} {}", command, id);
                self.bridge.forward(on_success, on_error, SERVICE_NAME, command);
            }
            None => match on_error {
                Some(on_error) => on_error(json!({ "error": missing })),
                // Kept for compatibility: callers without an error sink never
                // hear about this.
                None => warn!("upload_manager: {} (no error sink, dropped)", missing),
            },
        }
        Ok(())
    }

    /// Tear down the manager. The shared callback is released before the
    /// `destroy` command is forwarded, so no further events reach it from
    /// this instance.
    pub fn destroy(
        &mut self,
        on_success: Option<ReplyCallback>,
        on_error: Option<ReplyCallback>,
    ) -> Result<(), ManagerError> {
        if self.callback.take().is_none() {
            return Err(ManagerError::Destroyed);
        }
        info!("upload_manager: destroy");
        self.bridge
            .forward(on_success, on_error, SERVICE_NAME, Command::Destroy);
        Ok(())
    }
}

/// Adapt the shared event callback to the bridge's reply sink.
fn event_sink(events: &EventCallback) -> ReplyCallback {
    let events = Arc::clone(events);
    callback(move |value| match serde_json::from_value::<UploadEvent>(value) {
        Ok(event) => events(event),
        Err(e) => warn!("upload_manager: undecodable event dropped: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::{EventCallback, UploadManager};
    use crate::bridge::channel::{ChannelBridge, Responder, TransferService};
    use crate::bridge::reply::reply_channel;
    use crate::bridge::{callback, Bridge, Command, ReplyCallback};
    use crate::error::ManagerError;
    use crate::upload::{ManagerOptions, ManagerState, UploadEvent, UploadPayload, UploadState};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    struct Forwarded {
        service: &'static str,
        command: Command,
        on_success: Option<ReplyCallback>,
        on_error: Option<ReplyCallback>,
    }

    #[derive(Default)]
    struct RecordingBridge {
        forwarded: Mutex<Vec<Forwarded>>,
    }

    impl RecordingBridge {
        fn commands(&self) -> Vec<Command> {
            self.forwarded
                .lock()
                .unwrap()
                .iter()
                .map(|f| f.command.clone())
                .collect()
        }

        /// Play a service reply into the success sink of forward `index`.
        fn reply(&self, index: usize, value: Value) {
            let sink = self.forwarded.lock().unwrap()[index].on_success.clone();
            sink.expect("success sink")(value);
        }
    }

    impl Bridge for RecordingBridge {
        fn forward(
            &self,
            on_success: Option<ReplyCallback>,
            on_error: Option<ReplyCallback>,
            service: &'static str,
            command: Command,
        ) {
            self.forwarded.lock().unwrap().push(Forwarded {
                service,
                command,
                on_success,
                on_error,
            });
        }
    }

    fn capture() -> (Arc<Mutex<Vec<UploadEvent>>>, impl Fn(UploadEvent) + Send + Sync) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |event| sink.lock().unwrap().push(event))
    }

    fn manager() -> (UploadManager, Arc<RecordingBridge>, Arc<Mutex<Vec<UploadEvent>>>) {
        let bridge = Arc::new(RecordingBridge::default());
        let (events, sink) = capture();
        let manager = UploadManager::init(None, bridge.clone(), sink);
        (manager, bridge, events)
    }

    #[test]
    fn init_defaults_options_and_sends_init_manager() {
        let (manager, bridge, _) = manager();
        assert_eq!(manager.options().parallel_uploads_limit, Some(1));
        assert_eq!(manager.state(), ManagerState::Ready);

        let forwarded = bridge.forwarded.lock().unwrap();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].service, "FileTransferBackground");
        assert_eq!(
            forwarded[0].command.args(),
            vec![json!({ "parallelUploadsLimit": 1 })]
        );
        assert!(forwarded[0].on_success.is_some());
        assert!(forwarded[0].on_error.is_none());
    }

    #[test]
    fn init_keeps_configured_limit() {
        let bridge = Arc::new(RecordingBridge::default());
        let manager = UploadManager::init(
            Some(ManagerOptions::default().with_parallel_uploads_limit(3)),
            bridge,
            |_| {},
        );
        assert_eq!(manager.options().parallel_uploads_limit(), 3);
    }

    #[test]
    fn init_without_sink_fails_before_forwarding() {
        let bridge = Arc::new(RecordingBridge::default());
        let result = UploadManager::init_with_sink(None, bridge.clone(), None);
        assert_eq!(result.err(), Some(ManagerError::MissingEventHandler));
        assert!(bridge.commands().is_empty());

        let sink: EventCallback = Arc::new(|_: UploadEvent| {});
        assert!(UploadManager::init_with_sink(None, bridge, Some(sink)).is_ok());
    }

    #[test]
    fn service_replies_reach_the_shared_callback() {
        let (_manager, bridge, events) = manager();
        bridge.reply(0, json!({ "state": "INITIALIZED" }));
        bridge.reply(0, json!({ "no": "state" }));
        bridge.reply(0, json!("not an event"));
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].state, Some(UploadState::Initialized));
        assert_eq!(events[0].id, None);
        assert_eq!(events[1].state, None);
        assert_eq!(events[1].extra.get("no"), Some(&json!("state")));
    }

    #[test]
    fn invalid_requests_emit_one_failure_and_forward_nothing() {
        let (manager, bridge, events) = manager();
        manager.start_upload(None).unwrap();
        manager
            .start_upload(Some(UploadPayload {
                server_url: Some("http://x".into()),
                ..UploadPayload::default()
            }))
            .unwrap();
        manager
            .start_upload(Some(UploadPayload::new("a", "  ", "x")))
            .unwrap();
        manager
            .start_upload_value(json!({ "id": "b", "serverUrl": "http://x" }))
            .unwrap();

        let events: Vec<Value> = events
            .lock()
            .unwrap()
            .iter()
            .map(|e| serde_json::to_value(e).unwrap())
            .collect();
        assert_eq!(
            events,
            vec![
                json!({
                    "state": "FAILED",
                    "error": "Upload Settings object is missing or has invalid arguments"
                }),
                json!({ "state": "FAILED", "error": "Upload ID is required" }),
                json!({ "id": "a", "state": "FAILED", "error": "Invalid server URL" }),
                json!({ "id": "b", "state": "FAILED", "error": "filePath is required" }),
            ]
        );
        assert_eq!(bridge.commands().len(), 1);
    }

    #[test]
    fn untyped_requests_that_are_not_objects_count_as_missing() {
        let (manager, _, events) = manager();
        manager.start_upload_value(Value::Null).unwrap();
        manager.start_upload_value(json!(["a"])).unwrap();
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.id.is_none()
            && e.error.as_deref()
                == Some("Upload Settings object is missing or has invalid arguments")));
    }

    #[test]
    fn valid_request_is_forwarded_with_defaults() {
        let (manager, bridge, events) = manager();
        manager
            .start_upload_value(json!({
                "id": "a",
                "serverUrl": "http://x",
                "filePath": "f",
                "fileKey": null
            }))
            .unwrap();

        assert!(events.lock().unwrap().is_empty());
        let commands = bridge.commands();
        assert_eq!(commands[1].name(), "startUpload");
        assert_eq!(
            commands[1].args(),
            vec![json!({
                "id": "a",
                "serverUrl": "http://x",
                "filePath": "f",
                "requestMethod": "POST",
                "notificationTitle": "Uploading files",
                "headers": {},
                "parameters": {}
            })]
        );

        bridge.reply(1, json!({ "id": "a", "state": "UPLOADING", "progress": 40 }));
        let events = events.lock().unwrap();
        assert_eq!(events[0].state, Some(UploadState::Uploading));
        assert_eq!(events[0].progress, Some(40.0));
    }

    #[test]
    fn terminal_events_with_unexpected_field_types_are_relayed_unchanged() {
        let (manager, bridge, events) = manager();
        manager
            .start_upload(Some(UploadPayload::new("a", "http://x", "f")))
            .unwrap();

        let replies = vec![
            json!({ "id": "a", "state": "UPLOADING", "progress": "50" }),
            json!({ "id": "a", "state": "SUCCESS", "eventId": 42, "statusCode": 200 }),
            json!({ "id": "a", "state": "FAILED", "error": { "code": -1, "message": "timeout" } }),
        ];
        for reply in &replies {
            bridge.reply(1, reply.clone());
        }

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(events[1].is_terminal() && events[2].is_terminal());
        assert_eq!(events[1].status_code, Some(200));
        let relayed: Vec<Value> = events
            .iter()
            .map(|e| serde_json::to_value(e).unwrap())
            .collect();
        assert_eq!(relayed, replies);
    }

    #[test]
    fn untyped_request_with_scalar_headers_is_forwarded() {
        let (manager, bridge, events) = manager();
        manager
            .start_upload_value(json!({
                "id": "a",
                "serverUrl": "http://x",
                "filePath": "f",
                "headers": { "X-Len": 12, "X-Retry": true },
                "parameters": { "page": 2 }
            }))
            .unwrap();

        assert!(events.lock().unwrap().is_empty());
        let args = bridge.commands()[1].args();
        assert_eq!(args[0]["headers"], json!({ "X-Len": "12", "X-Retry": "true" }));
        assert_eq!(args[0]["parameters"], json!({ "page": "2" }));
    }

    #[test]
    fn unreadable_request_with_an_id_reports_against_that_id() {
        let (manager, bridge, events) = manager();
        manager
            .start_upload_value(json!({
                "id": "a",
                "serverUrl": "http://x",
                "filePath": "f",
                "headers": { "X-Nested": { "a": 1 } }
            }))
            .unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            serde_json::to_value(&events[0]).unwrap(),
            json!({
                "id": "a",
                "state": "FAILED",
                "error": "Upload Settings object is missing or has invalid arguments"
            })
        );
        assert_eq!(bridge.commands().len(), 1);
    }

    #[test]
    fn remove_without_id_uses_the_error_sink_only() {
        let (manager, bridge, events) = manager();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&errors);
        let successes = Arc::new(Mutex::new(0));
        let hits = Arc::clone(&successes);

        manager
            .remove_upload(
                None,
                Some(callback(move |_| *hits.lock().unwrap() += 1)),
                Some(callback(move |v| seen.lock().unwrap().push(v))),
            )
            .unwrap();

        assert_eq!(
            *errors.lock().unwrap(),
            vec![json!({ "error": "Upload ID is required" })]
        );
        assert_eq!(*successes.lock().unwrap(), 0);
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(bridge.commands().len(), 1);
    }

    #[test]
    fn acknowledge_without_id_and_without_sink_is_dropped() {
        let (manager, bridge, events) = manager();
        manager.acknowledge_event(Some(""), None, None).unwrap();
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(bridge.commands().len(), 1);
    }

    #[test]
    fn acknowledge_without_id_reports_event_message() {
        let (manager, _, _) = manager();
        let (ok, err, mut rx) = reply_channel();
        manager.acknowledge_event(None, Some(ok), Some(err)).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Err(json!({ "error": "Event ID is required" }))
        );
    }

    #[test]
    fn remove_and_acknowledge_forward_with_per_call_sinks() {
        let (manager, bridge, _) = manager();
        let (ok, err, _rx) = reply_channel();
        manager.remove_upload(Some("a"), Some(ok), Some(err)).unwrap();
        manager.acknowledge_event(Some("7"), None, None).unwrap();

        let forwarded = bridge.forwarded.lock().unwrap();
        assert_eq!(forwarded[1].command, Command::RemoveUpload("a".into()));
        assert!(forwarded[1].on_success.is_some() && forwarded[1].on_error.is_some());
        assert_eq!(forwarded[2].command, Command::AcknowledgeEvent("7".into()));
        assert!(forwarded[2].on_success.is_none() && forwarded[2].on_error.is_none());
    }

    #[test]
    fn destroy_releases_the_callback_before_any_reply() {
        let (mut manager, bridge, events) = manager();
        let (ok, err, mut rx) = reply_channel();
        manager.destroy(Some(ok), Some(err)).unwrap();

        assert_eq!(manager.state(), ManagerState::Destroyed);
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.commands().last(), Some(&Command::Destroy));

        assert_eq!(manager.start_upload(None), Err(ManagerError::Destroyed));
        assert_eq!(
            manager.remove_upload(Some("a"), None, None),
            Err(ManagerError::Destroyed)
        );
        assert_eq!(
            manager.acknowledge_event(Some("7"), None, None),
            Err(ManagerError::Destroyed)
        );
        assert_eq!(manager.destroy(None, None), Err(ManagerError::Destroyed));
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(bridge.commands().len(), 2);
    }

    struct FakeUploader;

    impl TransferService for FakeUploader {
        fn handle(&self, command: Command, responder: Responder) {
            match command {
                Command::InitManager(_) => {
                    responder.event(&UploadEvent::new(None, UploadState::Initialized))
                }
                Command::StartUpload(payload) => {
                    let mut progress = UploadEvent::new(payload.id.clone(), UploadState::Uploading);
                    progress.progress = Some(50.0);
                    responder.event(&progress);
                    let mut done = UploadEvent::new(payload.id, UploadState::Success);
                    done.event_id = Some("e1".into());
                    responder.event(&done);
                }
                Command::RemoveUpload(id) | Command::AcknowledgeEvent(id) => {
                    responder.success(json!({ "id": id }))
                }
                Command::Destroy => responder.success(Value::Null),
            }
        }
    }

    #[tokio::test]
    async fn drives_an_upload_through_the_channel_bridge() {
        let (bridge, _handle) = ChannelBridge::spawn(FakeUploader);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut manager = UploadManager::init(None, bridge, move |event| {
            let _ = tx.send(event);
        });

        assert_eq!(rx.recv().await.unwrap().state, Some(UploadState::Initialized));

        manager
            .start_upload(Some(UploadPayload::new("a", "https://example.com", "/tmp/f")))
            .unwrap();
        let progress = rx.recv().await.unwrap();
        assert_eq!((progress.id.as_deref(), progress.progress), (Some("a"), Some(50.0)));
        let done = rx.recv().await.unwrap();
        assert_eq!(done.state, Some(UploadState::Success));

        let (ok, err, reply) = reply_channel();
        manager
            .acknowledge_event(done.event_id.as_deref(), Some(ok), Some(err))
            .unwrap();
        assert_eq!(reply.await.unwrap(), Ok(json!({ "id": "e1" })));

        let (ok, err, reply) = reply_channel();
        manager.destroy(Some(ok), Some(err)).unwrap();
        assert_eq!(reply.await.unwrap(), Ok(Value::Null));
    }
}
