//! Backend REST API client.
//!
//! Provides bearer-authenticated HTTP communication with the ordering
//! backend: sign-in, catalog and cart, order creation and status, and the
//! chat bootstrap calls. Every JSON reply carries a boolean `success` flag;
//! a reply without `success: true` is reported as a `Remote` error.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::chat::{ChatBackend, ChatMessage};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::payments::{CreateOrderRequest, CreatedOrder, OrderBackend};
use crate::session::Session;

pub(crate) const PATH_LOGIN: &str = "/api/user/login";
pub(crate) const PATH_REGISTER: &str = "/api/user/register";
pub(crate) const PATH_FOOD_LIST: &str = "/api/food/list";
pub(crate) const PATH_CART_GET: &str = "/api/cart/get";
pub(crate) const PATH_CART_ADD: &str = "/api/cart/add";
pub(crate) const PATH_CART_REMOVE: &str = "/api/cart/remove";
const PATH_ORDER: &str = "/api/order";
const PATH_CHAT_INIT: &str = "/api/chat/user/initialize";
const PATH_CHAT_HISTORY: &str = "/api/chat/user/history";

/// Backend phrases meaning "no conversation history yet".
const HISTORY_NOT_FOUND_MARKERS: &[&str] = &["tidak ditemukan", "not found"];

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise a backend URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/api` segment
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.contains("://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-facing transport error.
fn friendly_error(url: &str, err: &reqwest::Error) -> ClientError {
    if err.is_connect() {
        return ClientError::Transport(format!("cannot reach server at {url}"));
    }
    if err.is_timeout() {
        return ClientError::Transport(format!("connection to {url} timed out"));
    }
    if err.is_builder() {
        return ClientError::Transport(format!("invalid server URL: {url}"));
    }
    ClientError::Transport(format!("network error communicating with {url}: {err}"))
}

/// Convert a non-success HTTP status (plus optional server message) into an error.
fn status_error(status: StatusCode, server_message: Option<String>) -> ClientError {
    let code = status.as_u16();
    match code {
        401 | 403 => ClientError::Auth(
            server_message.unwrap_or_else(|| "session is invalid or expired".to_string()),
        ),
        _ => {
            let fallback = match code {
                404 => "endpoint not found".to_string(),
                s if s >= 500 => format!("server error (HTTP {s})"),
                s => format!("unexpected response (HTTP {s})"),
            };
            ClientError::Remote(server_message.unwrap_or(fallback))
        }
    }
}

fn message_of(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Require `success: true`; otherwise surface the server message (or `fallback`).
pub(crate) fn ensure_success(body: &Value, fallback: &str) -> ClientResult<()> {
    if body.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    Err(ClientError::Remote(
        message_of(body).unwrap_or_else(|| fallback.to_string()),
    ))
}

pub(crate) fn decode<T: DeserializeOwned>(body: Value, what: &str) -> ClientResult<T> {
    serde_json::from_value(body)
        .map_err(|e| ClientError::Remote(format!("unexpected {what} response: {e}")))
}

pub(crate) fn is_history_not_found(message: &str) -> bool {
    let lowered = message.to_lowercase();
    HISTORY_NOT_FOUND_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: normalize_base_url(&config.api_base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform a request and return the JSON body.
    ///
    /// `path` includes the leading slash, e.g. `/api/order`. A bearer header
    /// is attached when `token` is given. Non-2xx statuses become errors that
    /// keep the server's `message` when it sent one.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> ClientResult<Value> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.http.request(method.clone(), &url);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let started = Instant::now();
        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        debug!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "backend request finished"
        );

        let parsed = if body_text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str::<Value>(&body_text) {
                Ok(v) => v,
                Err(e) if status.is_success() => {
                    return Err(ClientError::Remote(format!("invalid JSON from server: {e}")));
                }
                Err(_) => Value::Null,
            }
        };

        if !status.is_success() {
            warn!(path = %path, status = status.as_u16(), "backend request rejected");
            return Err(status_error(status, message_of(&parsed)));
        }
        Ok(parsed)
    }
}

// ---------------------------------------------------------------------------
// Chat bootstrap
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatInitReply {
    conversation_id: String,
}

#[derive(Deserialize)]
struct ChatHistoryReply {
    #[serde(default)]
    data: Vec<ChatMessage>,
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn initialize_chat(&self, session: &Session) -> ClientResult<String> {
        let token = session.require_user_and_token()?;
        let body = serde_json::json!({ "userName": session.user().name });
        let reply = self
            .call(Method::POST, PATH_CHAT_INIT, Some(token), &[], Some(&body))
            .await?;
        ensure_success(&reply, "failed to initialize chat")?;
        let init: ChatInitReply = decode(reply, "chat init")?;
        if init.conversation_id.trim().is_empty() {
            return Err(ClientError::Remote("server returned an empty conversation id".into()));
        }
        Ok(init.conversation_id)
    }

    async fn chat_history(
        &self,
        session: &Session,
        conversation_id: &str,
    ) -> ClientResult<Vec<ChatMessage>> {
        let token = session.require_token()?;
        let outcome = self
            .call(
                Method::GET,
                PATH_CHAT_HISTORY,
                Some(token),
                &[("conversationId", conversation_id)],
                None,
            )
            .await
            .and_then(|reply| {
                ensure_success(&reply, "failed to load chat history")?;
                decode::<ChatHistoryReply>(reply, "chat history")
            });
        match outcome {
            Ok(history) => Ok(history.data),
            Err(ClientError::Remote(message)) if is_history_not_found(&message) => {
                debug!(conversation_id = %conversation_id, "No chat history yet");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct OrderRef {
    #[serde(rename = "_id", alias = "id")]
    id: String,
}

#[derive(Deserialize)]
struct CreateOrderReply {
    order: OrderRef,
    #[serde(default)]
    redirect_url: Option<String>,
}

#[derive(Deserialize)]
struct OrderStatusData {
    status: String,
}

#[derive(Deserialize)]
struct OrderStatusReply {
    data: OrderStatusData,
}

#[async_trait]
impl OrderBackend for ApiClient {
    async fn create_order(
        &self,
        session: &Session,
        request: &CreateOrderRequest,
    ) -> ClientResult<CreatedOrder> {
        let token = session.require_token()?;
        let body = serde_json::to_value(request)
            .map_err(|e| ClientError::Remote(format!("cannot encode order: {e}")))?;
        let reply = self
            .call(Method::POST, PATH_ORDER, Some(token), &[], Some(&body))
            .await?;
        ensure_success(&reply, "failed to create order")?;
        let created: CreateOrderReply = decode(reply, "create order")?;
        info!(order_id = %created.order.id, has_redirect = created.redirect_url.is_some(), "Order created");
        Ok(CreatedOrder {
            order_id: created.order.id,
            redirect_url: created
                .redirect_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
        })
    }

    async fn order_status(&self, session: &Session, order_id: &str) -> ClientResult<String> {
        let token = session.require_token()?;
        let path = format!("{PATH_ORDER}/{order_id}");
        let reply = self.call(Method::GET, &path, Some(token), &[], None).await?;
        ensure_success(&reply, "failed to read order status")?;
        let status: OrderStatusReply = decode(reply, "order status")?;
        Ok(status.data.status)
    }
}
