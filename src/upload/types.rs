//! Upload payload and event types exchanged with the transfer service

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Request method used when the payload does not name one
pub const DEFAULT_REQUEST_METHOD: &str = "POST";

/// Notification title used when the payload does not name one
pub const DEFAULT_NOTIFICATION_TITLE: &str = "Uploading files";

/// A single upload request as handed to `start_upload`.
///
/// Every field is optional on the wire so that malformed requests can be
/// reported through the event channel instead of failing deserialization.
/// Unknown keys are kept in `extra` and forwarded untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Multipart field name. Absent means the file is sent as the raw body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UploadPayload {
    pub fn new(
        id: impl Into<String>,
        server_url: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            server_url: Some(server_url.into()),
            file_path: Some(file_path.into()),
            ..Self::default()
        }
    }

    pub fn with_file_key(mut self, file_key: impl Into<String>) -> Self {
        self.file_key = Some(file_key.into());
        self
    }

    pub fn with_request_method(mut self, method: impl Into<String>) -> Self {
        self.request_method = Some(method.into());
        self
    }

    pub fn with_notification_title(mut self, title: impl Into<String>) -> Self {
        self.notification_title = Some(title.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }
}

/// Lifecycle state carried by an [`UploadEvent`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UploadState {
    Initialized,
    Uploading,
    Success,
    Failed,
    /// Any state this crate does not interpret, kept verbatim
    Other(String),
}

impl UploadState {
    pub fn as_str(&self) -> &str {
        match self {
            UploadState::Initialized => "INITIALIZED",
            UploadState::Uploading => "UPLOADING",
            UploadState::Success => "SUCCESS",
            UploadState::Failed => "FAILED",
            UploadState::Other(value) => value,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Success | UploadState::Failed)
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for UploadState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "INITIALIZED" => UploadState::Initialized,
            "UPLOADING" => UploadState::Uploading,
            "SUCCESS" => UploadState::Success,
            "FAILED" => UploadState::Failed,
            _ => UploadState::Other(value),
        }
    }
}

impl From<UploadState> for String {
    fn from(value: UploadState) -> Self {
        match value {
            UploadState::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

/// Event delivered to the shared callback, either synthesized by the
/// manager for a rejected request or relayed from the transfer service.
///
/// Decoding never fails for a JSON object: a known key whose value has an
/// unexpected type stays in `extra` under its own name, so serializing the
/// event gives back what the service sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Value")]
pub struct UploadEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<UploadState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_response: Option<String>,
    /// Identifier to pass to `acknowledge_event` once the event is handled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UploadEvent {
    pub fn new(id: Option<String>, state: UploadState) -> Self {
        Self {
            id,
            state: Some(state),
            error: None,
            progress: None,
            status_code: None,
            server_response: None,
            event_id: None,
            extra: Map::new(),
        }
    }

    pub fn failed(id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(id, UploadState::Failed)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.as_ref().is_some_and(UploadState::is_terminal)
    }
}

/// Move `key` out of `fields` when it holds a non-null value of type `T`.
fn take_field<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = fields.get(key).filter(|v| !v.is_null())?;
    let typed = serde_json::from_value(value.clone()).ok()?;
    fields.remove(key);
    Some(typed)
}

impl TryFrom<Value> for UploadEvent {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => return Err(format!("expected an event object, got {}", other)),
        };
        Ok(Self {
            id: take_field(&mut fields, "id"),
            state: take_field::<String>(&mut fields, "state").map(UploadState::from),
            error: take_field(&mut fields, "error"),
            progress: take_field(&mut fields, "progress"),
            status_code: take_field(&mut fields, "statusCode"),
            server_response: take_field(&mut fields, "serverResponse"),
            event_id: take_field(&mut fields, "eventId"),
            extra: fields,
        })
    }
}

/// Lifecycle of a manager instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Ready,
    Destroyed,
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerState::Ready => write!(f, "ready"),
            ManagerState::Destroyed => write!(f, "destroyed"),
        }
    }
}
