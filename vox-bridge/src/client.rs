//! Typed HTTP surface of the bridge.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default deadline for scripting actions.
pub const STANDARD_DEADLINE: Duration = Duration::from_secs(30);

/// Default deadline for preregistered reads on the fast pool.
pub const FAST_DEADLINE: Duration = Duration::from_secs(5);

/// Result of a script execution or function call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptOutcome {
    /// Whether the script ran to completion.
    pub success: bool,
    /// Script return value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error body when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BridgeErrorBody>,
}

/// Upstream error object: `{code, message, details?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeErrorBody {
    /// Well-known code (`NETWORK_ERROR`, `TIMEOUT`, `UNKNOWN_FUNCTION`,
    /// `SCRIPT_ERROR`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional detail payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Bridge liveness report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// The bridge process is up.
    pub bridge_up: bool,
    /// The in-game scripting endpoint is reachable from the bridge.
    pub remote_up: bool,
    /// Bridge uptime in seconds.
    pub uptime: f64,
    /// Bridge version string.
    pub version: String,
}

/// HTTP client for the bridge, holding the two connection pools.
///
/// Cloning is cheap and shares the pools.
#[derive(Clone)]
pub struct BridgeClient {
    base_url: String,
    standard: reqwest::Client,
    fast: reqwest::Client,
    // SSE connections stay open indefinitely; this pool has no total
    // request timeout, only a connect timeout.
    stream: reqwest::Client,
}

impl BridgeClient {
    /// Build a client for the given base URL (e.g.
    /// `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, BridgeError> {
        let standard = reqwest::Client::builder()
            .pool_max_idle_per_host(50)
            .timeout(STANDARD_DEADLINE)
            .build()
            .map_err(|e| BridgeError::Network(e.to_string()))?;
        let fast = reqwest::Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(FAST_DEADLINE)
            .build()
            .map_err(|e| BridgeError::Network(e.to_string()))?;
        let stream = reqwest::Client::builder()
            .connect_timeout(FAST_DEADLINE)
            .build()
            .map_err(|e| BridgeError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            standard,
            fast,
            stream,
        })
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Compile and run a script once.
    pub async fn execute(
        &self,
        script: &str,
        deadline: Option<Duration>,
    ) -> Result<serde_json::Value, BridgeError> {
        let body = serde_json::json!({ "script": script });
        let outcome = self
            .post(&self.standard, "/script/exec", &body, deadline)
            .await?;
        unwrap_outcome(outcome)
    }

    /// Invoke a previously registered function on the standard pool.
    pub async fn call(
        &self,
        function: &str,
        args: &[serde_json::Value],
        deadline: Option<Duration>,
    ) -> Result<serde_json::Value, BridgeError> {
        let body = serde_json::json!({ "function": function, "args": args });
        let outcome = self
            .post(&self.standard, "/script/call", &body, deadline)
            .await?;
        unwrap_outcome(outcome)
    }

    /// Invoke a preregistered read on the low-latency pool.
    pub async fn call_fast(
        &self,
        function: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, BridgeError> {
        let body = serde_json::json!({ "function": function, "args": args });
        let outcome = self.post(&self.fast, "/script/call", &body, None).await?;
        unwrap_outcome(outcome)
    }

    /// Liveness check on the fast pool.
    pub async fn health(&self) -> Result<HealthStatus, BridgeError> {
        let url = format!("{}/health", self.base_url);
        let response = self.fast.get(&url).send().await.map_err(map_reqwest)?;
        response
            .error_for_status()
            .map_err(map_reqwest)?
            .json()
            .await
            .map_err(|e| BridgeError::InvalidResponse(e.to_string()))
    }

    /// The SSE endpoint URL, used by the event broker.
    pub(crate) fn events_url(&self) -> String {
        format!("{}/events", self.base_url)
    }

    pub(crate) fn stream_http(&self) -> &reqwest::Client {
        &self.stream
    }

    async fn post(
        &self,
        client: &reqwest::Client,
        path: &str,
        body: &serde_json::Value,
        deadline: Option<Duration>,
    ) -> Result<ScriptOutcome, BridgeError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = client.post(&url).json(body);
        if let Some(deadline) = deadline {
            request = request.timeout(deadline);
        }
        let response = request.send().await.map_err(map_reqwest)?;
        response
            .error_for_status()
            .map_err(map_reqwest)?
            .json()
            .await
            .map_err(|e| BridgeError::InvalidResponse(e.to_string()))
    }
}

fn unwrap_outcome(outcome: ScriptOutcome) -> Result<serde_json::Value, BridgeError> {
    if outcome.success {
        return Ok(outcome.result.unwrap_or(serde_json::Value::Null));
    }
    match outcome.error {
        Some(body) => Err(BridgeError::Script {
            code: body.code,
            message: body.message,
            details: body.details,
        }),
        None => Err(BridgeError::InvalidResponse(
            "failure without error body".into(),
        )),
    }
}

fn map_reqwest(e: reqwest::Error) -> BridgeError {
    if e.is_timeout() {
        BridgeError::Timeout(e.to_string())
    } else {
        BridgeError::Network(e.to_string())
    }
}
