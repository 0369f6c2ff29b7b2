use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::models::{ListQuery, NewTodo, TodoPatch};

/// Upper bound on one upstream round trip; the tool channel's per-call
/// timeout is the outer bound.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest upstream error body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Client for the todo REST service, bound to one bearer token.
pub struct TodoClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl TodoClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::Config(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /api/todos`. Returns the created record as the service sent it.
    pub async fn create_todo(&self, todo: &NewTodo) -> Result<Value, ServiceError> {
        self.send(self.request(Method::POST, "/api/todos").json(todo)).await
    }

    /// `GET /api/todos`. Returns the whole page body, unknown fields included.
    pub async fn list_todos(&self, query: &ListQuery) -> Result<Value, ServiceError> {
        self.send(self.request(Method::GET, "/api/todos").query(query)).await
    }

    /// `GET /api/todos/{id}`
    pub async fn get_todo(&self, id: i64) -> Result<Value, ServiceError> {
        self.send(self.request(Method::GET, &format!("/api/todos/{id}"))).await
    }

    /// `PUT /api/todos/{id}`
    pub async fn update_todo(&self, id: i64, patch: &TodoPatch) -> Result<Value, ServiceError> {
        self.send(self.request(Method::PUT, &format!("/api/todos/{id}")).json(patch))
            .await
    }

    /// `DELETE /api/todos/{id}`. Returns the service's confirmation body.
    pub async fn delete_todo(&self, id: i64) -> Result<Value, ServiceError> {
        self.send(self.request(Method::DELETE, &format!("/api/todos/{id}"))).await
    }

    /// `PATCH /api/todos/{id}/toggle-complete`
    pub async fn toggle_complete(&self, id: i64) -> Result<Value, ServiceError> {
        self.send(self.request(Method::PATCH, &format!("/api/todos/{id}/toggle-complete")))
            .await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    /// Success bodies are returned as parsed JSON without reinterpretation.
    async fn send(&self, request: RequestBuilder) -> Result<Value, ServiceError> {
        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        debug!(status, url = %response.url(), "Todo service responded");

        if response.status().is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| ServiceError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let detail = error_detail(&body);
        match status {
            404 => Err(ServiceError::NotFound(detail)),
            401 | 403 => Err(ServiceError::Unauthorized(detail)),
            _ => {
                warn!(status, body = %detail, "Todo service returned error");
                Err(ServiceError::Upstream { status, body: detail })
            }
        }
    }
}

impl std::fmt::Debug for TodoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoClient")
            .field("base_url", &self.base_url)
            .field("token", &"***")
            .finish()
    }
}

/// Pull the `detail` message out of an error body, or fall back to the
/// (truncated) raw text.
fn error_detail(body: &str) -> String {
    let detail = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        _ => body.to_string(),
    };
    if detail.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !detail.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &detail[..end])
    } else {
        detail
    }
}
