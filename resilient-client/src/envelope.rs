//! Response envelope shared by every API endpoint.
//!
//! Success: `{ "success": true, "data": ..., "timestamp": ..., "requestId": ..., "version": ... }`
//! Failure: `{ "success": false, "error": { "code": ..., "message": ..., "details": ... } }`

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Envelope version reported when the server did not send one.
pub const DEFAULT_ENVELOPE_VERSION: &str = "1.0";

/// Structured error carried by a failure envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Application error code
    pub code: String,
    /// Human readable message
    pub message: String,
    /// Optional structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiErrorBody {
    /// Decode an error body from raw response text.
    ///
    /// Accepts both a full failure envelope and a bare `{code, message}` object.
    #[must_use]
    pub fn decode(text: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct Wrapped {
            error: ApiErrorBody,
        }

        if text.trim().is_empty() {
            return None;
        }
        serde_json::from_str::<Wrapped>(text)
            .map(|w| w.error)
            .or_else(|_| serde_json::from_str::<Self>(text))
            .ok()
    }

    /// Field name reported in `details.field`, if present.
    #[must_use]
    pub fn field(&self) -> Option<String> {
        self.details
            .as_ref()
            .and_then(|d| d.get("field"))
            .and_then(serde_json::Value::as_str)
            .map(String::from)
    }
}

/// Response envelope. Exactly one of `data` / `error` is meaningful, selected
/// by `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Discriminator
    pub success: bool,
    /// Payload on success; `None` for empty (204) responses
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
    /// Server timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Request identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Envelope version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Build a success envelope stamped with the current time.
    #[must_use]
    pub fn success(data: Option<T>, request_id: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            request_id: Some(request_id.into()),
            version: Some(DEFAULT_ENVELOPE_VERSION.to_string()),
        }
    }

    /// Build a failure envelope.
    #[must_use]
    pub fn failure(error: ApiErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            request_id: None,
            version: Some(DEFAULT_ENVELOPE_VERSION.to_string()),
        }
    }

    /// Collapse the envelope into its payload.
    ///
    /// # Errors
    ///
    /// Returns an `Api` error for failure envelopes.
    pub fn into_result(self) -> SdkResult<Option<T>> {
        if self.success {
            return Ok(self.data);
        }
        let error = self.error.unwrap_or_else(|| ApiErrorBody {
            code: "UNKNOWN".to_string(),
            message: "request failed without an error body".to_string(),
            details: None,
        });
        Err(SdkError::Api {
            status: 200,
            code: error.code,
            message: error.message,
            details: error.details,
            request_id: self.request_id,
            retry_count: 0,
        })
    }
}

impl ApiResponse<serde_json::Value> {
    /// Decode the untyped payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns a `Serialization` error if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(self) -> SdkResult<ApiResponse<T>> {
        let data = match self.data {
            Some(serde_json::Value::Null) | None => None,
            Some(value) => Some(serde_json::from_value(value)?),
        };
        Ok(ApiResponse {
            success: self.success,
            data,
            error: self.error,
            timestamp: self.timestamp,
            request_id: self.request_id,
            version: self.version,
        })
    }

    /// Normalize a successful response body.
    ///
    /// Bodies that already are an envelope are decoded as such; any other
    /// JSON value is wrapped into a success envelope.
    ///
    /// # Errors
    ///
    /// Returns a `Serialization` error for bodies that are not JSON.
    pub fn from_body(body: &str, request_id: impl Into<String>) -> SdkResult<Self> {
        if body.trim().is_empty() {
            return Ok(Self::success(None, request_id));
        }
        let value: serde_json::Value = serde_json::from_str(body)?;
        let is_envelope = value
            .get("success")
            .is_some_and(serde_json::Value::is_boolean);
        if is_envelope {
            let mut envelope: Self = serde_json::from_value(value)?;
            if envelope.request_id.is_none() {
                envelope.request_id = Some(request_id.into());
            }
            return Ok(envelope);
        }
        Ok(Self::success(Some(value), request_id))
    }
}
