//! Thin client for Kusto (Eventhouse) clusters over their public REST
//! endpoints.
//!
//! The tools built on this are pass-throughs: they compose KQL or management
//! text and return the service's `Tables` response verbatim. Query results are
//! the agent's to interpret.

use reqwest::Method;
use serde_json::{Value, json};
use url::Url;

use crate::ToolError;
use crate::util;

const QUERY_ENDPOINT: &str = "/v1/rest/query";
const MGMT_ENDPOINT: &str = "/v1/rest/mgmt";

pub struct KustoClient {
    token: Option<String>,
    http: reqwest::Client,
}

impl KustoClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            http: util::client(),
        }
    }

    fn bearer(&self) -> Result<&str, ToolError> {
        self.token.as_deref().ok_or_else(|| {
            ToolError::new(
                "auth_required",
                "No Kusto token available; query tools need one to reach the cluster.",
            )
            .with_docs_hint(
                "Set KUSTO_TOKEN (or FABRIC_API_TOKEN with a cluster-scoped token) and restart the server.",
            )
        })
    }

    /// Run a KQL query against a database.
    pub async fn query(
        &self,
        cluster_uri: &str,
        database: &str,
        csl: &str,
    ) -> Result<Value, ToolError> {
        self.execute(cluster_uri, QUERY_ENDPOINT, database, csl).await
    }

    /// Run a management command. Management text always starts with a dot;
    /// anything else belongs on the query endpoint.
    pub async fn mgmt(
        &self,
        cluster_uri: &str,
        database: &str,
        csl: &str,
    ) -> Result<Value, ToolError> {
        if !csl.trim_start().starts_with('.') {
            return Err(ToolError::new(
                "validation_failed",
                "Management commands must start with '.'",
            )
            .with_field("command")
            .with_docs_hint("Use kusto_query for KQL query text."));
        }
        self.execute(cluster_uri, MGMT_ENDPOINT, database, csl).await
    }

    async fn execute(
        &self,
        cluster_uri: &str,
        endpoint: &str,
        database: &str,
        csl: &str,
    ) -> Result<Value, ToolError> {
        let token = self.bearer()?;
        let base = sanitize_cluster_uri(cluster_uri)?;
        let url = format!("{base}{endpoint}");
        let payload = json!({ "db": database, "csl": csl });

        let response = self
            .http
            .request(Method::POST, url.as_str())
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                ToolError::new(
                    "kusto_api_unreachable",
                    format!("Kusto request to {base} failed: {err}"),
                )
            })?;

        let status = response.status().as_u16();
        let body: Value = response.json().await.map_err(|err| {
            ToolError::new(
                "kusto_api_unreachable",
                format!("Failed to read Kusto response: {err}"),
            )
        })?;

        if !(200..=299).contains(&status) {
            return Err(ToolError::new(
                "kusto_api_error",
                format!("Kusto request failed with status {status}"),
            )
            .with_details(json!({ "status": status, "body": body })));
        }
        Ok(body)
    }
}

/// Normalize a cluster URI: a bare host gets an https scheme, trailing
/// slashes go away, and anything unparseable is rejected before a request is
/// built from it.
pub fn sanitize_cluster_uri(cluster_uri: &str) -> Result<String, ToolError> {
    let trimmed = cluster_uri.trim();
    if trimmed.is_empty() {
        return Err(
            ToolError::new("validation_failed", "'cluster_uri' must not be empty")
                .with_field("cluster_uri"),
        );
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = Url::parse(&candidate).map_err(|err| {
        ToolError::new(
            "validation_failed",
            format!("'cluster_uri' is not a valid URI: {err}"),
        )
        .with_field("cluster_uri")
    })?;
    if parsed.scheme() != "https" {
        return Err(ToolError::new(
            "validation_failed",
            "'cluster_uri' must use https",
        )
        .with_field("cluster_uri"));
    }
    Ok(candidate.trim_end_matches('/').to_string())
}

/// KQL text for the table-sampling tool. Table names are bracket-escaped the
/// way the service expects.
pub fn sample_query(table_name: &str, sample_size: u64) -> String {
    format!("['{table_name}'] | sample {sample_size}")
}

pub fn table_schema_command(table_name: &str) -> String {
    format!(".show table ['{table_name}'] cslschema")
}
