//! Mock HTTP client for testing.
//!
//! Responses can be fixed per URL or computed per request by a responder
//! closure, which is how tests model an endpoint that rejects a stale bearer
//! and accepts a renewed one.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::{HttpClient, HttpError, HttpRequest, Response};

/// Configuration for a mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a response (any status)
    Success(Response),
    /// Fail without a response
    Error(HttpError),
    /// Wait on the tokio clock, then resolve the inner response
    Delayed(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// Shorthand for a response with `status` and an empty body.
    pub fn status(status: u16) -> Self {
        MockResponse::Success(Response::new(status, bytes::Bytes::new()))
    }

    pub fn json(status: u16, value: serde_json::Value) -> Self {
        MockResponse::Success(Response::json_body(status, &value))
    }

    pub fn delayed(self, delay: Duration) -> Self {
        MockResponse::Delayed(delay, Box::new(self))
    }
}

type Responder = Arc<dyn Fn(&HttpRequest) -> MockResponse + Send + Sync>;

/// Mock HTTP client for testing.
///
/// # Example
///
/// ```ignore
/// use mailpilot::adapters::mock::{MockHttpClient, MockResponse};
///
/// let client = MockHttpClient::new();
/// client.set_responder("http://api.test/emails", |req| {
///     if req.authorization() == Some("Bearer fresh") {
///         MockResponse::status(200)
///     } else {
///         MockResponse::status(401)
///     }
/// });
/// ```
#[derive(Clone, Default)]
pub struct MockHttpClient {
    /// Fixed responses by exact URL
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    /// Per-request responders by exact URL
    responders: Arc<Mutex<HashMap<String, Responder>>>,
    /// Fallback when nothing matches
    default_response: Arc<Mutex<Option<MockResponse>>>,
    /// Requests in the order they were sent
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a fixed response for a URL.
    pub fn set_response(&self, url: &str, response: MockResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// Compute the response for a URL from each request.
    pub fn set_responder<F>(&self, url: &str, responder: F)
    where
        F: Fn(&HttpRequest) -> MockResponse + Send + Sync + 'static,
    {
        self.responders
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::new(responder));
    }

    /// Set a default response for URLs without specific matches.
    pub fn set_default_response(&self, response: MockResponse) {
        *self.default_response.lock().unwrap() = Some(response);
    }

    /// All recorded requests.
    pub fn get_requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded requests sent to `url`.
    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn lookup(&self, request: &HttpRequest) -> Option<MockResponse> {
        let responder = self.responders.lock().unwrap().get(&request.url).cloned();
        if let Some(responder) = responder {
            return Some(responder(request));
        }
        if let Some(response) = self.responses.lock().unwrap().get(&request.url) {
            return Some(response.clone());
        }
        self.default_response.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for MockHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHttpClient")
            .field("requests", &self.requests.lock().unwrap().len())
            .finish()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: &HttpRequest) -> Result<Response, HttpError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut next = self.lookup(request).ok_or_else(|| {
            HttpError::Other(format!("No mock response for URL: {}", request.url))
        })?;
        loop {
            match next {
                MockResponse::Success(response) => return Ok(response),
                MockResponse::Error(err) => return Err(err),
                MockResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    next = *inner;
                }
            }
        }
    }
}
