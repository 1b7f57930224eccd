//! Authenticated HTTP client for the Microsoft Fabric REST API.
//!
//! Responses are passed through with their original payloads: the tool layer
//! decides what a non-2xx status means, and service diagnostics reach the
//! agent untouched. Nothing here retries — item creation is not idempotent by
//! name, so retry policy belongs to the caller.

use reqwest::Method;
use serde_json::{Value, json};

use crate::ToolError;
use crate::util;

pub const DEFAULT_API_BASE: &str = "https://api.fabric.microsoft.com/v1";

#[derive(Debug)]
pub struct ApiCallResult {
    pub status: u16,
    pub body: Value,
}

impl ApiCallResult {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn to_value(&self) -> Value {
        json!({
            "ok": self.is_success(),
            "status": self.status,
            "body": self.body
        })
    }
}

pub struct FabricClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl FabricClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http: util::client(),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn bearer(&self) -> Result<&str, ToolError> {
        self.token.as_deref().ok_or_else(|| {
            ToolError::new(
                "auth_required",
                "No Fabric API token available; this tool needs one to reach the service.",
            )
            .with_docs_hint("Set FABRIC_API_TOKEN (or pass --token) and restart the server.")
        })
    }

    /// Issue one request against the Fabric API. 204 becomes a small success
    /// body; non-JSON responses are wrapped rather than dropped.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        payload: Option<&Value>,
    ) -> Result<ApiCallResult, ToolError> {
        let token = self.bearer()?;
        let url = format!("{}{}", self.base_url, endpoint);

        let mut builder = self
            .http
            .request(method.clone(), url.as_str())
            .bearer_auth(token)
            .header("Accept", "application/json");
        if let Some(payload) = payload {
            builder = builder.json(payload);
        }

        let response = builder.send().await.map_err(|err| {
            ToolError::new(
                "fabric_api_unreachable",
                format!("Fabric API request failed: {err}"),
            )
            .with_details(json!({ "method": method.as_str(), "endpoint": endpoint }))
        })?;

        let status = response.status().as_u16();
        if status == 204 {
            return Ok(ApiCallResult {
                status,
                body: json!({ "success": true, "message": "Operation completed successfully" }),
            });
        }

        let text = response.text().await.map_err(|err| {
            ToolError::new(
                "fabric_api_unreachable",
                format!("Failed to read Fabric API response: {err}"),
            )
        })?;
        let body = match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => parsed,
            Err(_) if text.is_empty() => json!({ "success": (200..=299).contains(&status) }),
            Err(_) => json!({ "raw": text }),
        };

        Ok(ApiCallResult { status, body })
    }
}
