//! Request validation and defaulting for `start_upload`

use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use super::types::{
    UploadEvent, UploadPayload, DEFAULT_NOTIFICATION_TITLE, DEFAULT_REQUEST_METHOD,
};

/// Reason a request was rejected before reaching the transfer service.
/// `Display` is the exact message carried by the `FAILED` event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Upload Settings object is missing or has invalid arguments")]
    MissingPayload,
    /// The request is an object with an id but its fields cannot be read
    #[error("Upload Settings object is missing or has invalid arguments")]
    InvalidSettings { id: String },
    #[error("Upload ID is required")]
    MissingId,
    #[error("Server URL is required")]
    MissingServerUrl { id: String },
    #[error("Invalid server URL")]
    InvalidServerUrl { id: String },
    #[error("filePath is required")]
    MissingFilePath { id: String },
}

impl ValidationError {
    /// Upload id the failure is reported against, when one was supplied
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::MissingPayload | Self::MissingId => None,
            Self::InvalidSettings { id }
            | Self::MissingServerUrl { id }
            | Self::InvalidServerUrl { id }
            | Self::MissingFilePath { id } => Some(id),
        }
    }

    pub fn to_event(&self) -> UploadEvent {
        UploadEvent::failed(self.id().map(str::to_string), self.to_string())
    }
}

/// A payload that passed validation and has its defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedUpload(UploadPayload);

impl ValidatedUpload {
    pub fn id(&self) -> &str {
        self.0.id.as_deref().unwrap_or_default()
    }

    pub fn payload(&self) -> &UploadPayload {
        &self.0
    }

    pub fn into_payload(self) -> UploadPayload {
        self.0
    }
}

/// Read an untyped request. `Ok(None)` means there is no usable object.
///
/// Scalar `id`, header and parameter values are turned into strings before
/// decoding, matching how the transfer service reads them.
pub fn read_payload(raw: Value) -> Result<Option<UploadPayload>, ValidationError> {
    let mut fields = match raw {
        Value::Object(fields) => fields,
        other => {
            debug!("upload settings: not an object: {}", other);
            return Ok(None);
        }
    };

    if let Some(id) = fields.get_mut("id") {
        stringify_scalar(id);
    }
    for key in ["headers", "parameters"] {
        if let Some(Value::Object(entries)) = fields.get_mut(key) {
            entries.values_mut().for_each(stringify_scalar);
        }
    }

    let id = fields
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    match serde_json::from_value::<UploadPayload>(Value::Object(fields)) {
        Ok(payload) => Ok(Some(payload)),
        Err(e) => {
            debug!("upload settings: unreadable: {}", e);
            match id {
                Some(id) => Err(ValidationError::InvalidSettings { id }),
                None => Ok(None),
            }
        }
    }
}

fn stringify_scalar(value: &mut Value) {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return,
    };
    *value = Value::String(text);
}

/// Empty strings count as missing, same as an absent key.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Check a request in order, stopping at the first failure, then fill in
/// defaults. `file_key` is never defaulted.
pub fn validate_upload(payload: Option<UploadPayload>) -> Result<ValidatedUpload, ValidationError> {
    let mut payload = payload.ok_or(ValidationError::MissingPayload)?;

    let id = present(&payload.id)
        .ok_or(ValidationError::MissingId)?
        .to_string();

    let server_url = present(&payload.server_url).ok_or_else(|| {
        ValidationError::MissingServerUrl { id: id.clone() }
    })?;
    if server_url.trim().is_empty() {
        return Err(ValidationError::InvalidServerUrl { id });
    }

    if present(&payload.file_path).is_none() {
        return Err(ValidationError::MissingFilePath { id });
    }

    if present(&payload.request_method).is_none() {
        payload.request_method = Some(DEFAULT_REQUEST_METHOD.to_string());
    }
    if present(&payload.notification_title).is_none() {
        payload.notification_title = Some(DEFAULT_NOTIFICATION_TITLE.to_string());
    }
    payload.headers.get_or_insert_with(HashMap::new);
    payload.parameters.get_or_insert_with(HashMap::new);

    Ok(ValidatedUpload(payload))
}
