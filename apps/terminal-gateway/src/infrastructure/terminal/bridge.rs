//! Terminal Bridge Adapter
//!
//! Talks to a bridge process running next to the terminal. Every native call
//! is `POST {base_url}/{method}` with the arguments as a JSON object; the
//! bridge answers
//!
//! ```json
//! { "result": <value or null>, "error": [code, "description"] }
//! ```
//!
//! where `error` is the terminal's last error after the call. Transport
//! failures are reported the way the terminal reports a lost connection: a
//! null result and a recorded last error.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::application::ports::{NativeError, Payload, PositionsQuery, TerminalPort};
use crate::domain::catalog::NativeCode;
use crate::domain::session::Credential;

use super::TerminalError;

/// Bridge response envelope.
#[derive(Debug, Deserialize)]
struct BridgeResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<(i64, String)>,
}

/// HTTP client for the terminal bridge.
#[derive(Debug)]
pub struct BridgeTerminal {
    client: Client,
    base_url: String,
    last_error: Mutex<NativeError>,
}

impl BridgeTerminal {
    /// Create a bridge client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TerminalError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TerminalError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            last_error: Mutex::new(NativeError::success()),
        })
    }

    /// Base URL of the bridge.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call(&self, method: &str, args: Value) -> Option<Value> {
        let url = format!("{}/{method}", self.base_url);

        let response = match self.client.post(&url).json(&args).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(method, error = %e, "Terminal bridge unreachable");
                let native = if e.is_timeout() {
                    NativeError::timeout(format!("bridge call {method} timed out"))
                } else {
                    NativeError::connect_fail(format!("bridge unreachable: {e}"))
                };
                self.record(native);
                return None;
            }
        };

        let status = response.status();
        let body = match response.json::<BridgeResponse>().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(method, status = status.as_u16(), error = %e, "Malformed bridge response");
                self.record(NativeError::internal_fail(format!(
                    "malformed bridge response ({status}): {e}"
                )));
                return None;
            }
        };

        self.record(
            body.error
                .map_or_else(NativeError::success, |(code, description)| {
                    NativeError::new(code, description)
                }),
        );

        if body.result.is_null() {
            tracing::debug!(method, "Terminal returned null");
            None
        } else {
            Some(body.result)
        }
    }

    async fn call_flag(&self, method: &str, args: Value) -> Result<(), NativeError> {
        match self.call(method, args).await.as_ref().and_then(Value::as_bool) {
            Some(true) => Ok(()),
            _ => {
                let native = self.last_error.lock().clone();
                if native == NativeError::success() {
                    Err(NativeError::generic_fail(format!("{method} returned false")))
                } else {
                    Err(native)
                }
            }
        }
    }

    async fn call_list(&self, method: &str, args: Value) -> Option<Vec<Payload>> {
        match self.call(method, args).await? {
            Value::Array(items) => Some(items),
            other => {
                self.record(NativeError::internal_fail(format!(
                    "{method} returned {} instead of a list",
                    kind(&other)
                )));
                None
            }
        }
    }

    fn record(&self, native: NativeError) {
        *self.last_error.lock() = native;
    }
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl TerminalPort for BridgeTerminal {
    async fn initialize(&self) -> Result<(), NativeError> {
        self.call_flag("initialize", json!({})).await
    }

    async fn login(&self, credential: &Credential) -> Result<(), NativeError> {
        let args = json!({
            "login": credential.account(),
            "password": credential.password(),
            "server": credential.server(),
        });
        self.call_flag("login", args).await
    }

    async fn shutdown(&self) {
        let _ = self.call("shutdown", json!({})).await;
    }

    async fn last_error(&self) -> NativeError {
        self.last_error.lock().clone()
    }

    async fn account_info(&self) -> Option<Payload> {
        self.call("account_info", json!({})).await
    }

    async fn copy_rates_from_pos(
        &self,
        symbol: &str,
        timeframe: NativeCode,
        start_pos: u32,
        count: u32,
    ) -> Option<Vec<Payload>> {
        let args = json!({
            "symbol": symbol,
            "timeframe": timeframe,
            "start_pos": start_pos,
            "count": count,
        });
        self.call_list("copy_rates_from_pos", args).await
    }

    async fn order_send(&self, request: &Payload) -> Option<Payload> {
        self.call("order_send", json!({ "request": request })).await
    }

    async fn positions_get(&self, query: &PositionsQuery) -> Option<Vec<Payload>> {
        let args = serde_json::to_value(query).unwrap_or_else(|_| json!({}));
        self.call_list("positions_get", args).await
    }

    async fn symbol_info(&self, symbol: &str) -> Option<Payload> {
        self.call("symbol_info", json!({ "symbol": symbol })).await
    }

    async fn symbol_info_tick(&self, symbol: &str) -> Option<Payload> {
        self.call("symbol_info_tick", json!({ "symbol": symbol }))
            .await
    }

    async fn symbol_select(&self, symbol: &str, enable: bool) -> bool {
        self.call("symbol_select", json!({ "symbol": symbol, "enable": enable }))
            .await
            .and_then(|result| result.as_bool())
            .unwrap_or(false)
    }

    async fn history_deals_get(&self, query: &Payload) -> Option<Vec<Payload>> {
        self.call_list("history_deals_get", query.clone()).await
    }
}
