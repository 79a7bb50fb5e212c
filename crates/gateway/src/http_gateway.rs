//! HTTP gateway implementation.
//!
//! Maps each [`Action`] onto the service's REST routes and normalizes
//! failures: error bodies carry a `detail` field whose text becomes the
//! error message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Action, Gateway, GatewayError, Result};

/// HTTP gateway configuration.
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Service root, including the API prefix
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// A resolved request.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// HTTP method
    pub method: Method,
    /// Path below the base URL
    pub path: String,
    /// Query parameters
    pub query: Vec<(&'static str, String)>,
    /// JSON body
    pub body: Option<Value>,
}

impl Route {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None }
    }

    fn query(mut self, key: &'static str, value: Option<impl ToString>) -> Self {
        if let Some(value) = value {
            self.query.push((key, value.to_string()));
        }
        self
    }

    fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Resolve an action to its REST route.
pub fn route(action: &Action) -> Result<Route> {
    let route = match action {
        Action::ListAccounts => Route::new(Method::GET, "/auth/users"),
        Action::RegisterAccount { username } => Route::new(Method::POST, "/auth/users")
            .body(serde_json::json!({ "username": username })),
        Action::LoginStatus { account_id } => {
            Route::new(Method::GET, format!("/auth/status/{account_id}"))
        }
        Action::LoginQrCode { account_id } => {
            Route::new(Method::POST, format!("/auth/qrcode/{account_id}"))
        }
        Action::LoginQrStatus { account_id, uuid } => {
            Route::new(Method::GET, format!("/auth/qrcode/{account_id}/status"))
                .query("uuid", Some(uuid))
        }
        Action::Logout { account_id } => {
            Route::new(Method::POST, format!("/auth/logout/{account_id}"))
        }
        Action::DeleteAccount { account_id } => {
            Route::new(Method::DELETE, format!("/auth/users/{account_id}"))
        }
        Action::ListTasks { filter } => Route::new(Method::GET, "/tasks")
            .query("user_id", filter.account_id)
            .query("status", filter.status.map(|s| s.query_value()))
            .query("skip", filter.skip)
            .query("limit", filter.limit),
        Action::GetTask { task_id } => Route::new(Method::GET, format!("/tasks/{task_id}")),
        Action::CreateTask { account_id, draft } => Route::new(Method::POST, "/tasks")
            .query("user_id", Some(account_id))
            .body(encode(action, draft)?),
        Action::UpdateTask { task_id, patch } => {
            Route::new(Method::PUT, format!("/tasks/{task_id}")).body(encode(action, patch)?)
        }
        Action::DeleteTask { task_id } => {
            Route::new(Method::DELETE, format!("/tasks/{task_id}"))
        }
        Action::StartTask { task_id } => {
            Route::new(Method::POST, format!("/tasks/{task_id}/start"))
        }
        Action::StopTask { task_id } => Route::new(Method::POST, format!("/tasks/{task_id}/stop")),
        Action::CancelTask { task_id } => {
            Route::new(Method::POST, format!("/tasks/{task_id}/cancel"))
        }
        Action::TaskLogs { task_id, query } => {
            Route::new(Method::GET, format!("/tasks/{task_id}/logs"))
                .query("level", query.level.as_deref())
                .query("skip", query.skip)
                .query("limit", query.limit)
        }
    };
    Ok(route)
}

fn encode<T: serde::Serialize>(action: &Action, payload: &T) -> Result<Value> {
    serde_json::to_value(payload)
        .map_err(|source| GatewayError::Decode { action: action.name(), source })
}

/// Human-readable message for an error response.
///
/// Prefers the body's `detail` (a string, or a list of validation errors
/// with `msg` fields), then `message`, then the status line.
pub fn error_message(status: reqwest::StatusCode, body: &[u8]) -> String {
    let fallback = || {
        status
            .canonical_reason()
            .map(|reason| format!("{} {}", status.as_u16(), reason))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
    };

    let Ok(json) = serde_json::from_slice::<Value>(body) else {
        return fallback();
    };

    match json.get("detail") {
        Some(Value::String(detail)) => return detail.clone(),
        Some(Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if !msgs.is_empty() {
                return msgs.join("; ");
            }
        }
        _ => {}
    }

    json.get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(fallback)
}

/// Gateway over the service's HTTP API.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    /// Create a gateway with the given configuration.
    pub fn new(config: HttpGatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn request(&self, action: Action) -> Result<Value> {
        let name = action.name();
        let route = route(&action)?;
        debug!(action = name, method = %route.method, path = %route.path, "sending request");

        let mut request = self.client.request(route.method, self.url(&route.path));
        if !route.query.is_empty() {
            request = request.query(&route.query);
        }
        if let Some(body) = &route.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(action = name, error = %e, "request failed");
            GatewayError::Transport(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = error_message(status, &body);
            warn!(action = name, status = status.as_u16(), %message, "request rejected");
            return Err(GatewayError::Rejected(message));
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|source| GatewayError::Decode { action: name, source })
    }
}
