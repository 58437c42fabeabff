//! Tauri plugin exposing the upload manager to the webview
//!
//! Shared-callback events are emitted as `file-transfer://event`; the
//! remove/acknowledge/destroy commands resolve with the service's reply.

use log::warn;
use serde_json::{json, Value};
use std::sync::Arc;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{AppHandle, Emitter, Manager, Runtime, State};
use tokio::sync::Mutex;

use crate::bridge::reply::reply_channel;
use crate::bridge::Bridge;
use crate::upload::{ManagerOptions, UploadManager};

/// Event name carrying every [`UploadEvent`](crate::upload::UploadEvent)
pub const UPLOAD_EVENT: &str = "file-transfer://event";

pub struct TransferState {
    bridge: Arc<dyn Bridge>,
    manager: Mutex<Option<UploadManager>>,
}

pub fn init<R: Runtime>(bridge: Arc<dyn Bridge>) -> TauriPlugin<R> {
    Builder::new("file-transfer-background")
        .invoke_handler(tauri::generate_handler![
            init_manager,
            start_upload,
            remove_upload,
            acknowledge_event,
            destroy
        ])
        .setup(move |app, _api| {
            app.manage(TransferState {
                bridge,
                manager: Mutex::new(None),
            });
            Ok(())
        })
        .build()
}

#[tauri::command]
async fn init_manager<R: Runtime>(
    app: AppHandle<R>,
    state: State<'_, TransferState>,
    options: Option<ManagerOptions>,
) -> Result<ManagerOptions, String> {
    let mut slot = state.manager.lock().await;
    if slot.is_some() {
        return Err("Upload manager is already initialized".to_string());
    }
    let manager = UploadManager::init(options, Arc::clone(&state.bridge), move |event| {
        if let Err(e) = app.emit(UPLOAD_EVENT, event) {
            warn!("plugin: failed to emit upload event: {}", e);
        }
    });
    let options = manager.options().clone();
    *slot = Some(manager);
    Ok(options)
}

#[tauri::command]
async fn start_upload(state: State<'_, TransferState>, payload: Value) -> Result<(), String> {
    let slot = state.manager.lock().await;
    let manager = slot.as_ref().ok_or_else(not_initialized)?;
    manager.start_upload_value(payload).map_err(|e| e.to_string())
}

#[tauri::command]
async fn remove_upload(
    state: State<'_, TransferState>,
    id: Option<String>,
) -> Result<Value, Value> {
    let (on_success, on_error, reply) = reply_channel();
    {
        let slot = state.manager.lock().await;
        let manager = slot.as_ref().ok_or_else(|| json!({ "error": not_initialized() }))?;
        manager
            .remove_upload(id.as_deref(), Some(on_success), Some(on_error))
            .map_err(|e| json!({ "error": e.to_string() }))?;
    }
    reply.await.unwrap_or_else(|_| Err(no_reply()))
}

#[tauri::command]
async fn acknowledge_event(
    state: State<'_, TransferState>,
    id: Option<String>,
) -> Result<Value, Value> {
    let (on_success, on_error, reply) = reply_channel();
    {
        let slot = state.manager.lock().await;
        let manager = slot.as_ref().ok_or_else(|| json!({ "error": not_initialized() }))?;
        manager
            .acknowledge_event(id.as_deref(), Some(on_success), Some(on_error))
            .map_err(|e| json!({ "error": e.to_string() }))?;
    }
    reply.await.unwrap_or_else(|_| Err(no_reply()))
}

#[tauri::command]
async fn destroy(state: State<'_, TransferState>) -> Result<Value, Value> {
    let (on_success, on_error, reply) = reply_channel();
    {
        let mut manager = state
            .manager
            .lock()
            .await
            .take()
            .ok_or_else(|| json!({ "error": not_initialized() }))?;
        manager
            .destroy(Some(on_success), Some(on_error))
            .map_err(|e| json!({ "error": e.to_string() }))?;
    }
    reply.await.unwrap_or_else(|_| Err(no_reply()))
}

fn not_initialized() -> String {
    "Upload manager is not initialized".to_string()
}

fn no_reply() -> Value {
    json!({ "error": "Transfer service dropped the request without replying" })
}
