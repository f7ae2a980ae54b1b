//! Buffered REST responses.

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde::de::DeserializeOwned;
use serde_json::Value;

use qgate_core::ApiResult;

/// Header carrying the server's correlation id on error responses.
pub const TRACE_ID_HEADER: &str = "x-tps-trace-id";

/// A response whose body has been read completely.
///
/// Non-2xx responses are ordinary values; inspect [`status`](Self::status)
/// or [`is_success`](Self::is_success).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    /// Assembles a response from its parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Reads a reqwest response to the end.
    pub(crate) async fn read(response: reqwest::Response) -> reqwest::Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(Self::new(status, headers, body))
    }

    /// Status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// `true` for 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The server's trace id, if present.
    pub fn trace_id(&self) -> Option<&str> {
        self.header(TRACE_ID_HEADER)
    }

    /// Whether the body is declared as JSON.
    pub fn is_json(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.trim_start().starts_with("application/json"))
    }

    /// Raw body.
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The integer `code` field of a JSON error body.
    pub fn error_code(&self) -> Option<i64> {
        if !self.is_json() {
            return None;
        }
        serde_json::from_slice::<Value>(&self.body)
            .ok()?
            .get("code")?
            .as_i64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn response(content_type: &str, body: &str) -> ApiResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers.insert(TRACE_ID_HEADER, HeaderValue::from_static("trace-1"));
        ApiResponse::new(StatusCode::TOO_MANY_REQUESTS, headers, body.as_bytes().to_vec())
    }

    #[test]
    fn error_code_requires_json() {
        let json = response("application/json; charset=utf-8", r#"{"code":11298,"message":"x"}"#);
        assert_eq!(json.error_code(), Some(11298));
        assert_eq!(json.trace_id(), Some("trace-1"));
        assert!(!json.is_success());

        let text = response("text/plain", r#"{"code":11298}"#);
        assert_eq!(text.error_code(), None);

        let string_code = response("application/json", r#"{"code":"11298"}"#);
        assert_eq!(string_code.error_code(), None);

        let array = response("application/json", "[1,2]");
        assert_eq!(array.error_code(), None);
    }
}
