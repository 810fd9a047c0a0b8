//! HTTP transport to the PgManage backend.
//!
//! The [`Transport`] trait is the seam between the stores and the network;
//! [`HttpTransport`] implements it with `reqwest`.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{ClientError, PasswordKind};

/// Header carrying the CSRF token on state-changing calls.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Form field carrying the CSRF token in the unload beacon.
pub const CSRF_FORM_FIELD: &str = "csrfmiddlewaretoken";

/// A file sent through a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// File name reported to the server
    pub file_name: String,
    /// File contents
    pub bytes: Vec<u8>,
    /// Extra text fields sent alongside the file
    pub fields: Vec<(String, String)>,
}

/// Request/response channel to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET a JSON resource.
    async fn get(&self, path: &str) -> Result<Value, ClientError>;

    /// POST a JSON body and return the JSON response (`Value::Null` when empty).
    async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError>;

    /// POST a multipart upload.
    async fn upload(&self, path: &str, file: UploadFile) -> Result<Value, ClientError>;

    /// POST a JSON body and return the raw response bytes.
    async fn download(&self, path: &str, body: Value) -> Result<Vec<u8>, ClientError>;

    /// Fire-and-forget form post. Returns whether the beacon was queued.
    fn send_beacon(&self, path: &str, form: Vec<(String, String)>) -> bool;

    /// CSRF token currently attached to requests.
    fn csrf_token(&self) -> Option<String>;
}

/// Error body returned by the backend on 4xx/5xx.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    data: Value,
    #[serde(default)]
    password_timeout: bool,
    #[serde(default)]
    kind: Option<String>,
}

/// Map a non-success status and body to a client error.
pub fn error_from_response(status: u16, body: &str) -> ClientError {
    if status == 401 {
        return ClientError::authentication("User not authenticated");
    }

    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = match parsed.data {
        Value::String(s) => s,
        Value::Null if body.trim().is_empty() => format!("Request failed with status {status}"),
        Value::Null => body.to_string(),
        other => other.to_string(),
    };

    if parsed.password_timeout {
        let kind = parsed.kind.as_deref().map(PasswordKind::parse).unwrap_or_default();
        return ClientError::password_timeout(message, kind);
    }

    ClientError::backend(status, message)
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    csrf_token: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Build a transport from client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::network_with_source("Failed to create HTTP client", e))?;

        tracing::debug!(base_url = %config.base_url, "HTTP transport created");

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            csrf_token: RwLock::new(config.csrf_token.clone()),
        })
    }

    /// Replace the CSRF token, e.g. after reading the CSRF cookie.
    pub fn set_csrf_token(&self, token: impl Into<String>) {
        *self.csrf_token.write() = Some(token.into());
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn with_csrf(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.csrf_token.read().as_deref() {
            Some(token) => builder.header(CSRF_HEADER, token),
            None => builder,
        }
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status.as_u16(), &body))
    }

    async fn json_body(response: reqwest::Response) -> Result<Value, ClientError> {
        let bytes = Self::checked(response).await?.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        // Plain-text bodies (e.g. snippet text) come back as a JSON string
        Ok(serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<Value, ClientError> {
        tracing::trace!(path, "GET");
        let response = self.client.get(self.url(path)).send().await?;
        Self::json_body(response).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        tracing::trace!(path, "POST");
        let response = self.with_csrf(self.client.post(self.url(path))).json(&body).send().await?;
        Self::json_body(response).await
    }

    async fn upload(&self, path: &str, file: UploadFile) -> Result<Value, ClientError> {
        tracing::trace!(path, file_name = %file.file_name, size = file.bytes.len(), "UPLOAD");
        let mut form = reqwest::multipart::Form::new();
        for (key, value) in file.fields {
            form = form.text(key, value);
        }
        let part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);
        form = form.part("file", part);

        let response = self.with_csrf(self.client.post(self.url(path))).multipart(form).send().await?;
        Self::json_body(response).await
    }

    async fn download(&self, path: &str, body: Value) -> Result<Vec<u8>, ClientError> {
        tracing::trace!(path, "DOWNLOAD");
        let response = self.with_csrf(self.client.post(self.url(path))).json(&body).send().await?;
        let bytes = Self::checked(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    fn send_beacon(&self, path: &str, form: Vec<(String, String)>) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(path, "No runtime available for beacon");
            return false;
        };
        let request = self.client.post(self.url(path)).form(&form);
        let path = path.to_string();
        handle.spawn(async move {
            if let Err(e) = request.send().await {
                tracing::debug!(path = %path, error = %e, "Beacon failed");
            }
        });
        true
    }

    fn csrf_token(&self) -> Option<String> {
        self.csrf_token.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_401_is_authentication() {
        let err = error_from_response(401, "");
        assert!(err.is_authentication());
    }

    #[test]
    fn test_password_timeout_body() {
        let err = error_from_response(
            400,
            r#"{ "data": "Password timeout", "password_timeout": true, "kind": "ssh" }"#,
        );
        match err {
            ClientError::PasswordTimeout { message, kind } => {
                assert_eq!(message, "Password timeout");
                assert_eq!(kind, PasswordKind::Ssh);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_backend_message_from_data_field() {
        let err = error_from_response(400, r#"{ "data": "permission denied for table t" }"#);
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.to_string(), "permission denied for table t");
    }

    #[test]
    fn test_non_json_error_body() {
        let err = error_from_response(502, "Bad Gateway");
        assert_eq!(err.to_string(), "Bad Gateway");

        let err = error_from_response(500, "");
        assert_eq!(err.to_string(), "Request failed with status 500");
    }

    #[test]
    fn test_url_joining() {
        let config = ClientConfig { base_url: "http://localhost:8000/pgmanage/".into(), ..Default::default() };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.url("/sign_in/"), "http://localhost:8000/pgmanage/sign_in/");
        assert_eq!(transport.url("sign_in/"), "http://localhost:8000/pgmanage/sign_in/");
    }
}
