//! Pluggable HTTP transport.
//!
//! [`Transport`] performs exactly one network exchange. The default
//! implementation wraps a pooled reqwest client; tests substitute their own.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use url::Url;

use crate::error::{ErrorFactory, SdkError, SdkResult};
use crate::http::{HttpConfig, build_http_client};

/// One part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    /// Plain text field
    Text {
        /// Field name
        name: String,
        /// Field value
        value: String,
    },
    /// File upload
    File {
        /// Field name
        name: String,
        /// File name sent to the server
        file_name: String,
        /// MIME type of the content
        content_type: Option<String>,
        /// File content
        bytes: Vec<u8>,
    },
}

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON document
    Json(serde_json::Value),
    /// Raw text
    Text(String),
    /// Multipart form; the transport chooses the boundary
    Multipart(Vec<FormPart>),
}

impl RequestBody {
    /// Content type sent with this body. Multipart returns `None`; reqwest
    /// writes that header with the form boundary.
    #[must_use]
    pub const fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Json(_) => Some("application/json"),
            Self::Text(_) => Some("text/plain; charset=utf-8"),
            Self::Multipart(_) => None,
        }
    }
}

/// Everything the transport needs besides the URL.
#[derive(Debug, Clone)]
pub struct RequestInit {
    /// HTTP method
    pub method: Method,
    /// Request headers
    pub headers: HeaderMap,
    /// Optional body
    pub body: Option<RequestBody>,
}

/// Raw response as received from the wire.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Body text
    pub body: String,
}

/// Performs a single HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the raw response, whatever its status.
    async fn send(&self, url: &Url, init: RequestInit) -> SdkResult<RawResponse>;
}

/// Transport backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport from HTTP settings.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the client cannot be built.
    pub fn new(config: &HttpConfig) -> SdkResult<Self> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    /// Wrap an existing reqwest client.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn multipart(parts: Vec<FormPart>) -> SdkResult<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for part in parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name, value),
                FormPart::File {
                    name,
                    file_name,
                    content_type,
                    bytes,
                } => {
                    let mut file = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
                    if let Some(mime) = content_type {
                        file = file.mime_str(&mime).map_err(|e| {
                            SdkError::validation(format!("invalid content type {mime}: {e}"))
                        })?;
                    }
                    form.part(name, file)
                }
            };
        }
        Ok(form)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, url: &Url, init: RequestInit) -> SdkResult<RawResponse> {
        let mut request = self
            .client
            .request(init.method, url.clone())
            .headers(init.headers);

        request = match init.body {
            Some(RequestBody::Json(value)) => request.body(serde_json::to_vec(&value)?),
            Some(RequestBody::Text(text)) => request.body(text),
            Some(RequestBody::Multipart(parts)) => request.multipart(Self::multipart(parts)?),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| ErrorFactory::from_reqwest(&e, None))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ErrorFactory::from_reqwest(&e, None))?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_transport() {
        assert!(ReqwestTransport::new(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn test_body_content_types() {
        assert_eq!(RequestBody::Multipart(Vec::new()).content_type(), None);
        assert_eq!(
            RequestBody::Json(serde_json::json!({})).content_type(),
            Some("application/json")
        );
        assert_eq!(
            RequestBody::Text("hi".to_string()).content_type(),
            Some("text/plain; charset=utf-8")
        );
    }

    #[test]
    fn test_multipart_rejects_bad_mime() {
        let parts = vec![FormPart::File {
            name: "doc".to_string(),
            file_name: "a.txt".to_string(),
            content_type: Some("not a mime".to_string()),
            bytes: b"hi".to_vec(),
        }];
        assert!(matches!(
            ReqwestTransport::multipart(parts),
            Err(SdkError::Validation { .. })
        ));
    }
}
