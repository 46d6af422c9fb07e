//! Application requests as issued through the coordinator.

use uuid::Uuid;

use crate::traits::{Headers, Method};

/// A request against the mailpilot API, relative to the configured base URL.
///
/// The coordinator attaches the `Authorization` header; callers never set it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path beginning with `/`, optionally with a query string.
    pub path: String,
    pub headers: Headers,
    pub body: Option<String>,
    id: Uuid,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Headers::new(),
            body: None,
            id: Uuid::new_v4(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: &serde_json::Value) -> Self {
        Self::new(Method::Post, path).with_json(body)
    }

    pub fn put(path: impl Into<String>, body: &serde_json::Value) -> Self {
        Self::new(Method::Put, path).with_json(body)
    }

    pub fn patch(path: impl Into<String>, body: &serde_json::Value) -> Self {
        Self::new(Method::Patch, path).with_json(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set a JSON body and content type.
    pub fn with_json(mut self, body: &serde_json::Value) -> Self {
        self.body = Some(body.to_string());
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self
    }

    /// Correlation id for log lines about this request.
    pub fn id(&self) -> Uuid {
        self.id
    }
}
