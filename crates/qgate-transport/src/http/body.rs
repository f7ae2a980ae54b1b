//! Request descriptions.

use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;

use qgate_core::ApiResult;

/// Body of an outbound request.
///
/// Applying a body to a request builder never consumes it, so the same
/// value can be sent again on retry.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// JSON document.
    Json(Value),
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    /// Raw bytes with an explicit content type.
    Bytes {
        /// Value of the `Content-Type` header.
        content_type: String,
        /// Payload.
        data: Vec<u8>,
    },
}

impl RequestBody {
    /// Serializes a value into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> ApiResult<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    pub(crate) fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Empty => builder,
            Self::Json(value) => builder.json(value),
            Self::Form(fields) => builder.form(fields),
            Self::Bytes { content_type, data } => builder
                .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
                .body(data.clone()),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// A complete request: verb, path or absolute URL, query and body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) target: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: RequestBody,
}

impl ApiRequest {
    /// Creates a request. `target` is either a path below the API base URL
    /// or an absolute `http(s)://` URL.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// The HTTP verb.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path or URL.
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_survives_repeated_use() {
        let client = reqwest::Client::new();
        let body = RequestBody::json(&json!({"content": "hi"})).unwrap();

        for _ in 0..2 {
            let request = body
                .apply(client.post("http://localhost/"))
                .build()
                .unwrap();
            let bytes = request.body().and_then(|b| b.as_bytes()).unwrap();
            assert_eq!(bytes, br#"{"content":"hi"}"#);
        }
        assert_eq!(body, RequestBody::Json(json!({"content": "hi"})));
    }

    #[test]
    fn request_builder() {
        let request = ApiRequest::new(Method::GET, "/guilds/1/members")
            .query("limit", 100)
            .query("after", "0");
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.target(), "/guilds/1/members");
        assert_eq!(request.query.len(), 2);
        assert_eq!(request.body, RequestBody::Empty);
    }
}
