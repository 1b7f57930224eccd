//! MCP runtime for Microsoft Fabric Real-Time Intelligence.
//!
//! Implements the Model Context Protocol over stdio (JSON-RPC 2.0 with
//! `Content-Length` framing) and exposes three tool families:
//!
//! - the eventstream definition builder (session-based, fully local),
//! - eventstream item CRUD against the Fabric REST API,
//! - Kusto query/management pass-throughs against Eventhouse clusters.
//!
//! Builder sessions live in this process and need no network; only the
//! create/CRUD/Kusto tools reach out, and their service errors are passed to
//! the agent verbatim.

use clap::{Args, Subcommand};
use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use fabric_rti_core::catalog::{OperatorKind, SampleDataKind, catalog_snapshot};
use fabric_rti_core::definition::{EventhouseConfig, IngestionMode};
use fabric_rti_core::error::BuilderError;
use fabric_rti_core::packaging;
use fabric_rti_core::session::SessionStore;

mod fabric;
mod kusto;
mod util;

pub use fabric::{ApiCallResult, DEFAULT_API_BASE, FabricClient};
pub use kusto::KustoClient;

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "fabric-rti-mcp";

#[derive(Subcommand, Clone, Debug)]
pub enum McpCommands {
    /// Run the Fabric RTI MCP server over stdio
    Serve(McpServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct McpServeArgs {
    /// Explicit Fabric bearer token (otherwise FABRIC_API_TOKEN or the stored
    /// credential file)
    #[arg(long, env = "FABRIC_API_TOKEN")]
    pub token: Option<String>,

    /// Bearer token for Kusto clusters (falls back to the Fabric token)
    #[arg(long, env = "KUSTO_TOKEN")]
    pub kusto_token: Option<String>,
}

pub async fn run(api_url: &str, command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve(args) => {
            let fabric_token = match args.token {
                Some(token) => Some(token),
                None => match util::resolve_token() {
                    Ok(token) => Some(token),
                    Err(reason) => {
                        tracing::warn!(
                            %reason,
                            "no Fabric token resolved; builder tools still work, service calls will fail with auth_required"
                        );
                        None
                    }
                },
            };
            let kusto_token = args.kusto_token.or_else(|| fabric_token.clone());

            let mut server = McpServer::new(RuntimeConfig {
                api_url: api_url.to_string(),
                fabric_token,
                kusto_token,
            });
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err,
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub api_url: String,
    pub fabric_token: Option<String>,
    pub kusto_token: Option<String>,
}

pub struct McpServer {
    fabric: FabricClient,
    kusto: KustoClient,
    sessions: SessionStore,
}

impl McpServer {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            fabric: FabricClient::new(&config.api_url, config.fabric_token),
            kusto: KustoClient::new(config.kusto_token),
            sessions: SessionStore::new(),
        }
    }

    pub async fn serve_stdio(&mut self) -> Result<(), String> {
        tracing::info!(
            server = MCP_SERVER_NAME,
            version = env!("CARGO_PKG_VERSION"),
            authenticated = self.fabric.has_token(),
            "serving MCP over stdio"
        );

        let stdin = io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut stdout = io::stdout();

        loop {
            let incoming = read_framed_json(&mut reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some(incoming) = incoming else {
                break;
            };

            let responses = self.handle_incoming_message(incoming).await;
            for response in responses {
                write_framed_json(&mut stdout, &response)
                    .await
                    .map_err(|e| format!("Failed to write MCP response: {e}"))?;
            }
        }

        Ok(())
    }

    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // No method means a client response; this server never issues
            // outbound requests, so there is nothing to match it against.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            self.handle_notification(method, params).await;
            None
        }
    }

    async fn handle_notification(&self, method: &str, _params: Value) {
        if !matches!(
            method,
            "notifications/initialized" | "notifications/cancelled"
        ) {
            tracing::debug!(method, "ignoring unknown notification");
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "prompts/list" => Ok(json!({ "prompts": [] })),
            "resources/list" => Ok(json!({ "resources": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        let instructions = "Build eventstreams incrementally: eventstream_start_definition opens a session, then add sources, wire them into streams, and attach destinations. Nodes may only reference nodes added before them. Run eventstream_validate_definition before eventstream_create_from_definition; creation refuses unvalidated graphs. Sessions are memory-resident and do not survive a server restart. Use eventstream_list_available_components to discover legal component types. Kusto tools are pass-throughs to the cluster: kusto_query for KQL, kusto_command for dot-prefixed management commands only.";
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                },
                "prompts": {
                    "listChanged": false
                },
                "resources": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": instructions
        })
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = tool_definitions()
            .into_iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        Ok(match self.execute_tool(name, &args).await {
            Ok(payload) => {
                let envelope = json!({
                    "status": "ok",
                    "tool": name,
                    "data": payload
                });
                build_tool_call_response(envelope, false)
            }
            Err(err) => {
                tracing::debug!(tool = name, code = %err.code, "tool call failed");
                let envelope = json!({
                    "status": "error",
                    "tool": name,
                    "error": err.to_value()
                });
                build_tool_call_response(envelope, true)
            }
        })
    }

    async fn execute_tool(&self, tool_name: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        match tool_name {
            "eventstream_start_definition" => self.tool_start_definition(args).await,
            "eventstream_get_current_definition" => self.tool_get_current_definition(args).await,
            "eventstream_clear_definition" => self.tool_clear_definition(args).await,
            "eventstream_add_sample_data_source" => self.tool_add_sample_data_source(args).await,
            "eventstream_add_custom_endpoint_source" => {
                self.tool_add_custom_endpoint_source(args).await
            }
            "eventstream_add_default_stream" => self.tool_add_default_stream(args).await,
            "eventstream_add_derived_stream" => self.tool_add_derived_stream(args).await,
            "eventstream_add_operator" => self.tool_add_operator(args).await,
            "eventstream_add_eventhouse_destination" => {
                self.tool_add_eventhouse_destination(args).await
            }
            "eventstream_add_custom_endpoint_destination" => {
                self.tool_add_custom_endpoint_destination(args).await
            }
            "eventstream_validate_definition" => self.tool_validate_definition(args).await,
            "eventstream_create_from_definition" => self.tool_create_from_definition(args).await,
            "eventstream_list_available_components" => {
                self.tool_list_available_components(args).await
            }
            "eventstream_list" => self.tool_eventstream_list(args).await,
            "eventstream_get" => self.tool_eventstream_get(args).await,
            "eventstream_create_simple" => self.tool_eventstream_create_simple(args).await,
            "eventstream_delete" => self.tool_eventstream_delete(args).await,
            "eventstream_get_definition" => self.tool_eventstream_get_definition(args).await,
            "kusto_query" => self.tool_kusto_query(args).await,
            "kusto_command" => self.tool_kusto_command(args).await,
            "kusto_list_databases" => self.tool_kusto_list_databases(args).await,
            "kusto_list_tables" => self.tool_kusto_list_tables(args).await,
            "kusto_get_table_schema" => self.tool_kusto_get_table_schema(args).await,
            "kusto_sample_table_data" => self.tool_kusto_sample_table_data(args).await,
            _ => Err(ToolError::new(
                "unknown_tool",
                format!("Unknown tool '{tool_name}'"),
            )),
        }
    }

    // --- eventstream definition builder ---

    async fn tool_start_definition(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let name = required_string(args, "name")?;
        let description = arg_optional_string(args, "description")?;
        let started = self.sessions.start(&name, description)?;
        to_json(&started)
    }

    async fn tool_get_current_definition(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let session_id = required_string(args, "session_id")?;
        let snapshot = self.sessions.snapshot(&session_id)?;
        to_json(&snapshot)
    }

    async fn tool_clear_definition(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let session_id = required_string(args, "session_id")?;
        self.sessions.clear(&session_id)?;
        Ok(json!({
            "session_id": session_id,
            "status": "cleared",
            "message": format!("Definition cleared for session {session_id}")
        }))
    }

    async fn tool_add_sample_data_source(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let session_id = required_string(args, "session_id")?;
        let name = arg_optional_string(args, "name")?;
        let sample_type = SampleDataKind::parse(&arg_string(args, "sample_type", "Bicycles")?)?;
        let added =
            self.sessions
                .add_sample_data_source(&session_id, name.as_deref(), sample_type)?;
        to_json(&added)
    }

    async fn tool_add_custom_endpoint_source(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let session_id = required_string(args, "session_id")?;
        let name = arg_optional_string(args, "name")?;
        let url = required_string(args, "url")?;
        let added =
            self.sessions
                .add_custom_endpoint_source(&session_id, name.as_deref(), &url)?;
        to_json(&added)
    }

    async fn tool_add_default_stream(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let session_id = required_string(args, "session_id")?;
        let name = required_string(args, "name")?;
        let input_sources = required_string_array(args, "input_source_names")?;
        let added = self
            .sessions
            .add_default_stream(&session_id, &name, &input_sources)?;
        to_json(&added)
    }

    async fn tool_add_derived_stream(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let session_id = required_string(args, "session_id")?;
        let name = required_string(args, "name")?;
        let input_names = arg_optional_string_array(args, "input_names")?;
        let added =
            self.sessions
                .add_derived_stream(&session_id, &name, input_names.as_deref())?;
        to_json(&added)
    }

    async fn tool_add_operator(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let session_id = required_string(args, "session_id")?;
        let name = required_string(args, "name")?;
        let kind = OperatorKind::parse(&required_string(args, "operator_type")?)?;
        let input_names = required_string_array(args, "input_names")?;
        let properties = match args.get("properties") {
            None | Some(Value::Null) => json!({}),
            Some(value @ Value::Object(_)) => value.clone(),
            Some(_) => {
                return Err(ToolError::new(
                    "validation_failed",
                    "'properties' must be a JSON object",
                )
                .with_field("properties"));
            }
        };
        let added =
            self.sessions
                .add_operator(&session_id, &name, kind, &input_names, properties)?;
        to_json(&added)
    }

    async fn tool_add_eventhouse_destination(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let session_id = required_string(args, "session_id")?;
        let name = arg_optional_string(args, "name")?;
        let workspace_id = required_string(args, "workspace_id")?;
        let item_id = required_string(args, "item_id")?;
        let database = required_string(args, "database")?;
        let table = required_string(args, "table")?;
        let input_names = required_string_array(args, "input_names")?;
        let data_ingestion_mode =
            IngestionMode::parse(&arg_string(args, "data_ingestion_mode", "ProcessedIngestion")?)?;
        let encoding = arg_string(args, "encoding", "UTF8")?;

        let added = self.sessions.add_eventhouse_destination(
            &session_id,
            name.as_deref(),
            EventhouseConfig {
                workspace_id,
                item_id,
                database_name: database,
                table_name: table,
                data_ingestion_mode,
                encoding,
            },
            &input_names,
        )?;
        to_json(&added)
    }

    async fn tool_add_custom_endpoint_destination(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let session_id = required_string(args, "session_id")?;
        let name = arg_optional_string(args, "name")?;
        let url = required_string(args, "url")?;
        let input_names = required_string_array(args, "input_names")?;
        let added = self.sessions.add_custom_endpoint_destination(
            &session_id,
            name.as_deref(),
            &url,
            &input_names,
        )?;
        to_json(&added)
    }

    async fn tool_validate_definition(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let session_id = required_string(args, "session_id")?;
        let outcome = self.sessions.validate(&session_id)?;
        to_json(&outcome)
    }

    async fn tool_create_from_definition(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let session_id = required_string(args, "session_id")?;
        let workspace_id = required_string(args, "workspace_id")?;

        // Re-validate (recording the outcome on the session), then package.
        // Packaging refuses an invalid graph before any network is touched.
        self.sessions.validate(&session_id)?;
        let request = self.sessions.package(&session_id)?;
        let payload = to_json(&request)?;

        let endpoint = format!("/workspaces/{workspace_id}/items");
        match self.fabric.request(Method::POST, &endpoint, Some(&payload)).await {
            Ok(result) if result.is_success() => {
                let item_id = result
                    .body
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                self.sessions.mark_created(&session_id, item_id);
                Ok(json!({
                    "session_id": session_id,
                    "status": "created",
                    "workspace_id": workspace_id,
                    "eventstream": result.body
                }))
            }
            Ok(result) => {
                self.sessions.mark_error(&session_id);
                Err(fabric_error("Eventstream creation failed", result).with_docs_hint(
                    "The service response is included verbatim in details. Creation is not retried automatically; retry with a different name if the item already exists.",
                ))
            }
            Err(err) => {
                self.sessions.mark_error(&session_id);
                Err(err)
            }
        }
    }

    async fn tool_list_available_components(
        &self,
        _args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        Ok(catalog_snapshot())
    }

    // --- eventstream item CRUD ---

    async fn tool_eventstream_list(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let workspace_id = required_string(args, "workspace_id")?;
        let endpoint = format!("/workspaces/{workspace_id}/items");
        let result = self.fabric.request(Method::GET, &endpoint, None).await?;
        if !result.is_success() {
            return Err(fabric_error("Listing workspace items failed", result));
        }
        let eventstreams: Vec<Value> = result
            .body
            .get("value")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.get("type").and_then(Value::as_str) == Some("Eventstream"))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({
            "workspace_id": workspace_id,
            "eventstreams": eventstreams
        }))
    }

    async fn tool_eventstream_get(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let workspace_id = required_string(args, "workspace_id")?;
        let item_id = required_string(args, "item_id")?;
        let endpoint = format!("/workspaces/{workspace_id}/items/{item_id}");
        let result = self.fabric.request(Method::GET, &endpoint, None).await?;
        if !result.is_success() {
            return Err(fabric_error("Fetching the eventstream failed", result));
        }
        Ok(result.body)
    }

    async fn tool_eventstream_create_simple(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let workspace_id = required_string(args, "workspace_id")?;
        let name = required_string(args, "name")?;
        let description = arg_optional_string(args, "description")?;
        let request = packaging::package_skeleton(&name, description.as_deref())?;
        let payload = to_json(&request)?;

        let endpoint = format!("/workspaces/{workspace_id}/items");
        let result = self
            .fabric
            .request(Method::POST, &endpoint, Some(&payload))
            .await?;
        if !result.is_success() {
            return Err(fabric_error("Eventstream creation failed", result));
        }
        Ok(result.body)
    }

    async fn tool_eventstream_delete(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let workspace_id = required_string(args, "workspace_id")?;
        let item_id = required_string(args, "item_id")?;
        let endpoint = format!("/workspaces/{workspace_id}/items/{item_id}");
        let result = self.fabric.request(Method::DELETE, &endpoint, None).await?;
        if !result.is_success() {
            return Err(fabric_error("Deleting the eventstream failed", result));
        }
        Ok(result.body)
    }

    async fn tool_eventstream_get_definition(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let workspace_id = required_string(args, "workspace_id")?;
        let item_id = required_string(args, "item_id")?;
        let endpoint = format!("/workspaces/{workspace_id}/items/{item_id}/getDefinition");
        let result = self.fabric.request(Method::POST, &endpoint, None).await?;
        if !result.is_success() {
            return Err(fabric_error(
                "Fetching the eventstream definition failed",
                result,
            ));
        }
        Ok(result.body)
    }

    // --- Kusto pass-throughs ---

    async fn tool_kusto_query(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let cluster_uri = required_string(args, "cluster_uri")?;
        let database = required_string(args, "database")?;
        let query = required_string(args, "query")?;
        self.kusto.query(&cluster_uri, &database, &query).await
    }

    async fn tool_kusto_command(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let cluster_uri = required_string(args, "cluster_uri")?;
        let database = required_string(args, "database")?;
        let command = required_string(args, "command")?;
        self.kusto.mgmt(&cluster_uri, &database, &command).await
    }

    async fn tool_kusto_list_databases(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let cluster_uri = required_string(args, "cluster_uri")?;
        // `.show databases` is cluster-scoped; the db field only anchors the
        // request and any existing database works.
        let database = arg_string(args, "database", "NetDefaultDB")?;
        self.kusto
            .mgmt(&cluster_uri, &database, ".show databases")
            .await
    }

    async fn tool_kusto_list_tables(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let cluster_uri = required_string(args, "cluster_uri")?;
        let database = required_string(args, "database")?;
        self.kusto.mgmt(&cluster_uri, &database, ".show tables").await
    }

    async fn tool_kusto_get_table_schema(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let cluster_uri = required_string(args, "cluster_uri")?;
        let database = required_string(args, "database")?;
        let table_name = required_string(args, "table_name")?;
        self.kusto
            .mgmt(&cluster_uri, &database, &kusto::table_schema_command(&table_name))
            .await
    }

    async fn tool_kusto_sample_table_data(
        &self,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let cluster_uri = required_string(args, "cluster_uri")?;
        let database = required_string(args, "database")?;
        let table_name = required_string(args, "table_name")?;
        let sample_size = arg_optional_u64(args, "sample_size")?.unwrap_or(10);
        if !(1..=1000).contains(&sample_size) {
            return Err(ToolError::new(
                "validation_failed",
                "'sample_size' must be between 1 and 1000",
            )
            .with_field("sample_size"));
        }
        self.kusto
            .query(
                &cluster_uri,
                &database,
                &kusto::sample_query(&table_name, sample_size),
            )
            .await
    }
}

fn fabric_error(context: &str, result: ApiCallResult) -> ToolError {
    ToolError::new(
        "fabric_api_error",
        format!("{context} with status {}", result.status),
    )
    .with_details(result.to_value())
}

// --- error envelopes ---

struct RpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

impl RpcError {
    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }
}

/// Tool-level failure surfaced to the agent inside the result envelope
/// (`isError: true`), never as a JSON-RPC protocol error.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
    pub docs_hint: Option<String>,
    pub details: Option<Value>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
            docs_hint: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.code,
            "message": self.message
        });
        if let Some(field) = &self.field {
            payload["field"] = Value::String(field.clone());
        }
        if let Some(docs_hint) = &self.docs_hint {
            payload["docs_hint"] = Value::String(docs_hint.clone());
        }
        if let Some(details) = &self.details {
            payload["details"] = details.clone();
        }
        payload
    }
}

impl From<BuilderError> for ToolError {
    fn from(err: BuilderError) -> Self {
        let mut tool_error = ToolError::new(err.code(), err.to_string());
        if let Some(field) = err.field() {
            tool_error = tool_error.with_field(field);
        }
        match &err {
            BuilderError::SessionNotFound(_) => tool_error.with_docs_hint(
                "Sessions are memory-resident and per-process. Start a new one with eventstream_start_definition.",
            ),
            BuilderError::Serialization { errors } => tool_error
                .with_docs_hint(
                    "Run eventstream_validate_definition and fix the reported errors before creating.",
                )
                .with_details(json!({ "errors": errors })),
            _ => tool_error,
        }
    }
}

// --- tool surface ---

struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

fn session_id_property() -> Value {
    json!({ "type": "string", "description": "Builder session ID from eventstream_start_definition" })
}

fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "eventstream_start_definition",
            description: "Start a new eventstream definition builder session with an empty graph.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Display name of the eventstream to build" },
                    "description": { "type": "string" }
                },
                "required": ["name"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_get_current_definition",
            description: "Inspect a session: metadata, status, and the current definition graph.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_property()
                },
                "required": ["session_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_clear_definition",
            description: "Reset a session's definition graph to empty, keeping its name and description.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_property()
                },
                "required": ["session_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_add_sample_data_source",
            description: "Add a synthetic sample-data source to the definition.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_property(),
                    "sample_type": {
                        "type": "string",
                        "enum": ["Bicycles", "Buses", "SemanticModelLogs", "SP500Stocks", "StockMarket", "YellowTaxi"],
                        "default": "Bicycles"
                    },
                    "name": { "type": "string", "description": "Source name; auto-generated from the sample type when omitted" }
                },
                "required": ["session_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_add_custom_endpoint_source",
            description: "Add a custom HTTP endpoint source to the definition.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_property(),
                    "url": { "type": "string", "description": "Endpoint URL events are pushed to" },
                    "name": { "type": "string", "description": "Source name; auto-generated sequentially when omitted" }
                },
                "required": ["session_id", "url"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_add_default_stream",
            description: "Add a default (passthrough) stream fed by one or more declared sources.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_property(),
                    "name": { "type": "string" },
                    "input_source_names": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "description": "Names of already-declared sources feeding this stream"
                    }
                },
                "required": ["session_id", "name", "input_source_names"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_add_derived_stream",
            description: "Add a derived stream consuming declared streams, sources, or operators. With no input_names it auto-connects when exactly one stream exists.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_property(),
                    "name": { "type": "string" },
                    "input_names": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Upstream node names; omit to auto-connect to the only stream"
                    }
                },
                "required": ["session_id", "name"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_add_operator",
            description: "Add a processing operator (Filter, Join, ManageFields, Aggregate, GroupBy, Union, Expand) between declared nodes.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_property(),
                    "name": { "type": "string" },
                    "operator_type": {
                        "type": "string",
                        "enum": ["Filter", "Join", "ManageFields", "Aggregate", "GroupBy", "Union", "Expand"]
                    },
                    "input_names": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1
                    },
                    "properties": {
                        "type": "object",
                        "description": "Operator-specific configuration, passed through to the definition"
                    }
                },
                "required": ["session_id", "name", "operator_type", "input_names"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_add_eventhouse_destination",
            description: "Add an Eventhouse (KQL database) destination fed by declared streams.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_property(),
                    "name": { "type": "string", "description": "Destination name; auto-generated when omitted" },
                    "workspace_id": { "type": "string", "description": "Fabric workspace ID of the Eventhouse" },
                    "item_id": { "type": "string", "description": "Eventhouse item ID" },
                    "database": { "type": "string", "description": "Target KQL database name" },
                    "table": { "type": "string", "description": "Target table name" },
                    "input_names": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "description": "Names of already-declared streams feeding this destination"
                    },
                    "data_ingestion_mode": {
                        "type": "string",
                        "enum": ["ProcessedIngestion", "DirectIngestion"],
                        "default": "ProcessedIngestion"
                    },
                    "encoding": { "type": "string", "default": "UTF8" }
                },
                "required": ["session_id", "workspace_id", "item_id", "database", "table", "input_names"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_add_custom_endpoint_destination",
            description: "Add a custom HTTP endpoint destination fed by declared streams.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_property(),
                    "name": { "type": "string", "description": "Destination name; auto-generated sequentially when omitted" },
                    "url": { "type": "string" },
                    "input_names": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1
                    }
                },
                "required": ["session_id", "url", "input_names"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_validate_definition",
            description: "Check the session's graph for structural and referential problems. Read-only and idempotent.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_property()
                },
                "required": ["session_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_create_from_definition",
            description: "Re-validate, package, and create the eventstream in a Fabric workspace. Fails before any network call if the graph is invalid.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "session_id": session_id_property(),
                    "workspace_id": { "type": "string", "description": "Target Fabric workspace ID" }
                },
                "required": ["session_id", "workspace_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_list_available_components",
            description: "List the component types the builder accepts, per category.",
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_list",
            description: "List eventstream items in a Fabric workspace.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "workspace_id": { "type": "string" }
                },
                "required": ["workspace_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_get",
            description: "Get one eventstream item by workspace and item ID.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "workspace_id": { "type": "string" },
                    "item_id": { "type": "string" }
                },
                "required": ["workspace_id", "item_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_create_simple",
            description: "Create a minimal eventstream (one empty default stream) without a builder session. Good for quick starts.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "workspace_id": { "type": "string" },
                    "name": { "type": "string" },
                    "description": { "type": "string" }
                },
                "required": ["workspace_id", "name"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_delete",
            description: "Delete an eventstream item by workspace and item ID.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "workspace_id": { "type": "string" },
                    "item_id": { "type": "string" }
                },
                "required": ["workspace_id", "item_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "eventstream_get_definition",
            description: "Fetch the stored definition parts of an existing eventstream item.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "workspace_id": { "type": "string" },
                    "item_id": { "type": "string" }
                },
                "required": ["workspace_id", "item_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "kusto_query",
            description: "Run a KQL query against an Eventhouse/Kusto database and return the service response verbatim.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "cluster_uri": { "type": "string", "description": "Cluster URI, e.g. https://mycluster.kusto.windows.net" },
                    "database": { "type": "string" },
                    "query": { "type": "string" }
                },
                "required": ["cluster_uri", "database", "query"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "kusto_command",
            description: "Run a dot-prefixed management command against a Kusto database.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "cluster_uri": { "type": "string" },
                    "database": { "type": "string" },
                    "command": { "type": "string", "description": "Management command, must start with '.'" }
                },
                "required": ["cluster_uri", "database", "command"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "kusto_list_databases",
            description: "List the databases on a Kusto cluster.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "cluster_uri": { "type": "string" },
                    "database": { "type": "string", "description": "Anchor database; any existing one works", "default": "NetDefaultDB" }
                },
                "required": ["cluster_uri"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "kusto_list_tables",
            description: "List the tables in a Kusto database.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "cluster_uri": { "type": "string" },
                    "database": { "type": "string" }
                },
                "required": ["cluster_uri", "database"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "kusto_get_table_schema",
            description: "Get the CSL schema of one table.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "cluster_uri": { "type": "string" },
                    "database": { "type": "string" },
                    "table_name": { "type": "string" }
                },
                "required": ["cluster_uri", "database", "table_name"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "kusto_sample_table_data",
            description: "Sample rows from a table.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "cluster_uri": { "type": "string" },
                    "database": { "type": "string" },
                    "table_name": { "type": "string" },
                    "sample_size": { "type": "integer", "minimum": 1, "maximum": 1000, "default": 10 }
                },
                "required": ["cluster_uri", "database", "table_name"],
                "additionalProperties": false
            }),
        },
    ]
}

// --- argument extraction ---

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = args.get(key).ok_or_else(|| {
        ToolError::new(
            "validation_failed",
            format!("Missing required field '{key}'"),
        )
        .with_field(key)
    })?;
    match value {
        Value::String(v) if !v.trim().is_empty() => Ok(v.clone()),
        Value::String(_) => Err(ToolError::new(
            "validation_failed",
            format!("'{key}' must not be empty"),
        )
        .with_field(key)),
        _ => Err(
            ToolError::new("validation_failed", format!("'{key}' must be a string"))
                .with_field(key),
        ),
    }
}

fn arg_string(args: &Map<String, Value>, key: &str, default: &str) -> Result<String, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(v)) => Ok(v.clone()),
        Some(_) => Err(
            ToolError::new("validation_failed", format!("'{key}' must be a string"))
                .with_field(key),
        ),
    }
}

fn arg_optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(
            ToolError::new("validation_failed", format!("'{key}' must be a string"))
                .with_field(key),
        ),
    }
}

fn arg_optional_string_array(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>, ToolError> {
    let Some(value) = args.get(key) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let items = value.as_array().ok_or_else(|| {
        ToolError::new(
            "validation_failed",
            format!("'{key}' must be an array of strings"),
        )
        .with_field(key)
    })?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let text = item.as_str().ok_or_else(|| {
            ToolError::new(
                "validation_failed",
                format!("'{key}' items must be strings"),
            )
            .with_field(key)
        })?;
        let normalized = text.trim();
        if !normalized.is_empty() {
            out.push(normalized.to_string());
        }
    }
    Ok(Some(out))
}

fn required_string_array(args: &Map<String, Value>, key: &str) -> Result<Vec<String>, ToolError> {
    arg_optional_string_array(args, key)?.ok_or_else(|| {
        ToolError::new(
            "validation_failed",
            format!("Missing required field '{key}'"),
        )
        .with_field(key)
    })
}

fn arg_optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| {
                ToolError::new(
                    "validation_failed",
                    format!("'{key}' must be an unsigned integer"),
                )
                .with_field(key)
            })
            .map(Some),
        Some(_) => Err(ToolError::new(
            "validation_failed",
            format!("'{key}' must be an unsigned integer"),
        )
        .with_field(key)),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|err| {
        ToolError::new(
            "internal_error",
            format!("Failed to serialize tool result: {err}"),
        )
    })
}

// --- JSON-RPC plumbing ---

fn build_tool_call_response(envelope: Value, is_error: bool) -> Value {
    let text = to_pretty_json(&envelope);
    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    let mut payload = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    });
    if let Some(data) = error.data {
        payload["error"]["data"] = data;
    }
    payload
}

async fn read_framed_json(
    reader: &mut BufReader<tokio::io::Stdin>,
) -> Result<Option<Value>, std::io::Error> {
    use std::io::{Error, ErrorKind};

    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            // Clean EOF only between frames.
            return if content_length.is_none() {
                Ok(None)
            } else {
                Err(Error::new(
                    ErrorKind::UnexpectedEof,
                    "EOF inside MCP frame header",
                ))
            };
        }

        if line == "\r\n" {
            break;
        }

        let header = line.trim_end_matches(['\r', '\n']);
        if let Some((key, value)) = header.split_once(':') {
            if key.eq_ignore_ascii_case("content-length") {
                let parsed = value.trim().parse::<usize>().map_err(|_| {
                    Error::new(ErrorKind::InvalidData, "Invalid Content-Length header")
                })?;
                content_length = Some(parsed);
            }
        }
    }

    let content_length = content_length
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Missing Content-Length header"))?;
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(|e| Error::new(ErrorKind::InvalidData, format!("Invalid JSON payload: {e}")))
}

async fn write_framed_json(
    writer: &mut tokio::io::Stdout,
    value: &Value,
) -> Result<(), std::io::Error> {
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    let header = format!(
        "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
        body.len()
    );
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_server() -> McpServer {
        McpServer::new(RuntimeConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            fabric_token: None,
            kusto_token: None,
        })
    }

    fn string_args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    async fn call(server: &McpServer, tool: &str, pairs: &[(&str, Value)]) -> Result<Value, ToolError> {
        server.execute_tool(tool, &string_args(pairs)).await
    }

    #[test]
    fn initialize_payload_explains_the_builder_workflow() {
        let server = offline_server();
        let payload = server.initialize_payload();
        assert_eq!(payload["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(payload["serverInfo"]["name"], MCP_SERVER_NAME);
        let instructions = payload["instructions"].as_str().unwrap();
        assert!(instructions.contains("eventstream_start_definition"));
        assert!(instructions.contains("eventstream_validate_definition"));
        assert!(instructions.contains("memory-resident"));
    }

    #[test]
    fn tool_names_are_unique_and_schemas_are_objects() {
        let tools = tool_definitions();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total, "duplicate tool name");
        for tool in &tools {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
            assert_eq!(
                tool.input_schema["additionalProperties"], false,
                "{}",
                tool.name
            );
        }
    }

    #[tokio::test]
    async fn every_listed_tool_dispatches() {
        let server = offline_server();
        for tool in tool_definitions() {
            let result = server.execute_tool(tool.name, &Map::new()).await;
            if let Err(err) = result {
                assert_ne!(err.code, "unknown_tool", "{} is listed but unhandled", tool.name);
            }
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_with_a_machine_code() {
        let server = offline_server();
        let err = server
            .execute_tool("eventstream_explode", &Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, "unknown_tool");
    }

    #[tokio::test]
    async fn builder_happy_path_runs_entirely_offline() {
        let server = offline_server();

        let started = call(
            &server,
            "eventstream_start_definition",
            &[("name", json!("Demo"))],
        )
        .await
        .unwrap();
        let sid = started["session_id"].as_str().unwrap().to_string();

        call(
            &server,
            "eventstream_add_sample_data_source",
            &[
                ("session_id", json!(sid)),
                ("name", json!("S1")),
                ("sample_type", json!("Bicycles")),
            ],
        )
        .await
        .unwrap();

        call(
            &server,
            "eventstream_add_default_stream",
            &[
                ("session_id", json!(sid)),
                ("name", json!("Str1")),
                ("input_source_names", json!(["S1"])),
            ],
        )
        .await
        .unwrap();

        let outcome = call(
            &server,
            "eventstream_validate_definition",
            &[("session_id", json!(sid))],
        )
        .await
        .unwrap();
        assert_eq!(outcome["is_valid"], true);
        assert_eq!(outcome["errors"].as_array().unwrap().len(), 0);

        let snapshot = call(
            &server,
            "eventstream_get_current_definition",
            &[("session_id", json!(sid))],
        )
        .await
        .unwrap();
        assert_eq!(snapshot["definition"]["sources"][0]["name"], "S1");
        assert_eq!(snapshot["status"], "valid");
    }

    #[tokio::test]
    async fn unknown_default_stream_input_is_flagged_by_validation() {
        let server = offline_server();
        let started = call(
            &server,
            "eventstream_start_definition",
            &[("name", json!("Demo"))],
        )
        .await
        .unwrap();
        let sid = started["session_id"].as_str().unwrap().to_string();

        call(
            &server,
            "eventstream_add_sample_data_source",
            &[("session_id", json!(sid)), ("name", json!("S1"))],
        )
        .await
        .unwrap();

        // default-stream wiring is deferred to the validator
        call(
            &server,
            "eventstream_add_default_stream",
            &[
                ("session_id", json!(sid)),
                ("name", json!("Str1")),
                ("input_source_names", json!(["Unknown"])),
            ],
        )
        .await
        .unwrap();

        let outcome = call(
            &server,
            "eventstream_validate_definition",
            &[("session_id", json!(sid))],
        )
        .await
        .unwrap();
        assert_eq!(outcome["is_valid"], false);
        assert!(
            outcome["errors"]
                .as_array()
                .unwrap()
                .iter()
                .any(|e| e.as_str().unwrap().contains("'Unknown'"))
        );

        // derived streams resolve their inputs at add time instead
        let err = call(
            &server,
            "eventstream_add_derived_stream",
            &[
                ("session_id", json!(sid)),
                ("name", json!("Derived1")),
                ("input_names", json!(["Ghost"])),
            ],
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "unknown_node");
        assert!(err.message.contains("'Ghost'"));
    }

    #[tokio::test]
    async fn duplicate_names_conflict_through_the_tool_surface() {
        let server = offline_server();
        let started = call(
            &server,
            "eventstream_start_definition",
            &[("name", json!("Demo"))],
        )
        .await
        .unwrap();
        let sid = started["session_id"].as_str().unwrap().to_string();

        for expected in [Ok(()), Err("conflict")] {
            let result = call(
                &server,
                "eventstream_add_sample_data_source",
                &[("session_id", json!(sid)), ("name", json!("S1"))],
            )
            .await;
            match expected {
                Ok(()) => assert!(result.is_ok()),
                Err(code) => assert_eq!(result.unwrap_err().code, code),
            }
        }
    }

    #[tokio::test]
    async fn create_from_invalid_definition_fails_before_any_network_call() {
        // No token is configured, so reaching the network would fail with
        // auth_required; serialization_failed proves we stopped earlier.
        let server = offline_server();
        let started = call(
            &server,
            "eventstream_start_definition",
            &[("name", json!("Demo"))],
        )
        .await
        .unwrap();
        let sid = started["session_id"].as_str().unwrap().to_string();

        let err = call(
            &server,
            "eventstream_create_from_definition",
            &[("session_id", json!(sid)), ("workspace_id", json!("ws-1"))],
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "serialization_failed");
        let details = err.details.unwrap();
        assert!(
            details["errors"]
                .as_array()
                .unwrap()
                .iter()
                .any(|e| e.as_str().unwrap().contains("At least one source"))
        );
    }

    #[tokio::test]
    async fn unknown_session_error_includes_a_docs_hint() {
        let server = offline_server();
        let err = call(
            &server,
            "eventstream_get_current_definition",
            &[("session_id", json!("stale-id"))],
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "not_found");
        assert!(err.docs_hint.unwrap().contains("eventstream_start_definition"));
    }

    #[tokio::test]
    async fn list_available_components_matches_the_catalog() {
        let server = offline_server();
        let snapshot = call(&server, "eventstream_list_available_components", &[])
            .await
            .unwrap();
        assert!(
            snapshot["sources"]
                .as_array()
                .unwrap()
                .contains(&json!("SampleData"))
        );
        assert!(
            snapshot["operators"]
                .as_array()
                .unwrap()
                .contains(&json!("Filter"))
        );
    }

    #[tokio::test]
    async fn bad_jsonrpc_version_yields_invalid_request() {
        let server = offline_server();
        let responses = server
            .handle_incoming_message(json!({ "jsonrpc": "1.0", "id": 1, "method": "ping" }))
            .await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn tools_call_wraps_failures_in_an_error_envelope() {
        let server = offline_server();
        let responses = server
            .handle_incoming_message(json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": {
                    "name": "eventstream_clear_definition",
                    "arguments": { "session_id": "missing" }
                }
            }))
            .await;
        assert_eq!(responses.len(), 1);
        let result = &responses[0]["result"];
        assert_eq!(result["isError"], true);
        assert_eq!(result["structuredContent"]["status"], "error");
        assert_eq!(result["structuredContent"]["error"]["error"], "not_found");
    }

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let server = offline_server();
        let responses = server
            .handle_incoming_message(json!({
                "jsonrpc": "2.0",
                "method": "notifications/initialized"
            }))
            .await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn kusto_tools_fail_closed_without_a_token() {
        let server = offline_server();
        let err = call(
            &server,
            "kusto_query",
            &[
                ("cluster_uri", json!("https://c.kusto.windows.net")),
                ("database", json!("db")),
                ("query", json!("T | take 1")),
            ],
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "auth_required");
    }

    #[tokio::test]
    async fn sample_size_bounds_are_enforced_locally() {
        let server = offline_server();
        let err = call(
            &server,
            "kusto_sample_table_data",
            &[
                ("cluster_uri", json!("https://c.kusto.windows.net")),
                ("database", json!("db")),
                ("table_name", json!("T")),
                ("sample_size", json!(5000)),
            ],
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "validation_failed");
        assert_eq!(err.field.as_deref(), Some("sample_size"));
    }

    #[test]
    fn required_string_rejects_blank_and_non_string_values() {
        let args = string_args(&[("name", json!("  ")), ("count", json!(3))]);
        assert_eq!(
            required_string(&args, "name").unwrap_err().code,
            "validation_failed"
        );
        assert_eq!(
            required_string(&args, "count").unwrap_err().code,
            "validation_failed"
        );
        assert_eq!(
            required_string(&args, "absent").unwrap_err().code,
            "validation_failed"
        );
    }

    #[test]
    fn string_array_extraction_trims_and_drops_empties() {
        let args = string_args(&[("input_names", json!([" A ", "", "B"]))]);
        let names = required_string_array(&args, "input_names").unwrap();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }
}
