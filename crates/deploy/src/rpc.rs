//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::{Duration, Instant};

use alloy_core::primitives::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC error code geth and anvil use for `execution reverted`.
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Failures talking to a JSON-RPC endpoint.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to send {method} request: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} failed with code {code}: {message}")]
    Server {
        method: String,
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("no result in {method} response")]
    MissingResult { method: String },

    #[error("failed to deserialize {method} result: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RpcError {
    /// Whether the node rejected the request because execution reverted.
    pub fn is_revert(&self) -> bool {
        match self {
            Self::Server { code, message, .. } => {
                *code == EXECUTION_REVERTED_CODE || message.to_lowercase().contains("revert")
            }
            _ => false,
        }
    }

    /// Raw revert data attached to a server error, if any.
    ///
    /// Nodes disagree on the shape: geth puts a hex string in `data`, some
    /// providers nest it as `data.data`.
    pub fn revert_data(&self) -> Option<Bytes> {
        let Self::Server {
            data: Some(data), ..
        } = self
        else {
            return None;
        };

        let hex = match data {
            Value::String(hex) => hex.as_str(),
            Value::Object(object) => object.get("data")?.as_str()?,
            _ => return None,
        };

        hex.parse().ok()
    }

    /// The server-side message, if the node answered with an error object.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, RpcError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(RpcError::Client)
}

/// Make a JSON-RPC call and deserialize the result.
///
/// A `null` result deserializes fine into an `Option<T>`, which is how pending
/// receipts are reported.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, RpcError> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|source| RpcError::Transport {
            method: method.to_string(),
            source,
        })?;

    let result: Value = response.json().await.map_err(|source| RpcError::Transport {
        method: method.to_string(),
        source,
    })?;

    if let Some(error) = result.get("error") {
        return Err(RpcError::Server {
            method: method.to_string(),
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            data: error.get("data").cloned(),
        });
    }

    let result_value = result
        .get("result")
        .cloned()
        .ok_or_else(|| RpcError::MissingResult {
            method: method.to_string(),
        })?;

    serde_json::from_value(result_value).map_err(|source| RpcError::Decode {
        method: method.to_string(),
        source,
    })
}

/// Repeatedly run `check_fn` until it yields a value or `timeout` elapses.
///
/// Errors returned by `check_fn` are treated as "not ready yet": a flaky
/// endpoint must not abort a wait that is otherwise within its deadline.
pub async fn poll_until<T, F, Fut>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    mut check_fn: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, RpcError>>,
{
    let start = Instant::now();

    loop {
        match check_fn().await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {
                tracing::trace!(target_name = %name, elapsed = ?start.elapsed(), "Not ready yet, polling again...");
            }
            Err(e) => {
                tracing::trace!(error = %e, target_name = %name, "Poll failed, retrying...");
            }
        }

        if start.elapsed() >= timeout {
            return None;
        }

        tokio::time::sleep(interval).await;
    }
}
