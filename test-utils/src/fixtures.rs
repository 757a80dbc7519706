//! Response body fixtures.
//!
//! Bodies follow the API envelope: `{"success", "data" | "error",
//! "timestamp", "requestId", "version"}`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Sample resource used across tests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleWidget {
    /// Identifier
    pub id: u32,
    /// Display name
    pub name: String,
    /// Stock level
    pub quantity: u32,
}

impl SampleWidget {
    /// A sample widget.
    #[must_use]
    pub fn gear() -> Self {
        Self {
            id: 1,
            name: "gear".to_string(),
            quantity: 12,
        }
    }

    /// A second sample widget.
    #[must_use]
    pub fn sprocket() -> Self {
        Self {
            id: 2,
            name: "sprocket".to_string(),
            quantity: 0,
        }
    }
}

/// A success envelope around `data`.
#[must_use]
pub fn success_envelope(data: &Value) -> Value {
    json!({
        "success": true,
        "data": data,
        "timestamp": "2026-01-01T00:00:00Z",
        "requestId": "req-fixture",
        "version": "1.0",
    })
}

/// A failure envelope.
#[must_use]
pub fn error_envelope(code: &str, message: &str) -> Value {
    json!({
        "success": false,
        "error": { "code": code, "message": message },
        "timestamp": "2026-01-01T00:00:00Z",
        "requestId": "req-fixture",
        "version": "1.0",
    })
}

/// A validation failure naming the offending field.
#[must_use]
pub fn validation_error(field: &str, message: &str) -> Value {
    json!({
        "success": false,
        "error": {
            "code": "VALIDATION_ERROR",
            "message": message,
            "details": { "field": field },
        },
    })
}

/// Envelope listing the sample widgets.
#[must_use]
pub fn widget_list() -> Value {
    success_envelope(&json!([SampleWidget::gear(), SampleWidget::sprocket()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use resilient_client::ApiResponse;

    #[test]
    fn test_widget_list_decodes() {
        let response: ApiResponse<Vec<SampleWidget>> =
            serde_json::from_value(widget_list()).unwrap();
        assert!(response.success);
        assert_eq!(response.data.unwrap()[0], SampleWidget::gear());
        assert_eq!(response.request_id.as_deref(), Some("req-fixture"));
    }

    #[test]
    fn test_error_envelope_shape() {
        let body = error_envelope("NOT_FOUND", "missing");
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
    }
}
