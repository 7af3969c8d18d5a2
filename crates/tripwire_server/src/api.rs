//! Tool-call API over the packet router.
//!
//! Frames are JSON lines: `{"id": .., "name": "<tool>", "arguments": {..}}`
//! in, `{"id": .., "result": ..}` or `{"id": .., "error": {..}}` out.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tripwire_core::{CoreError, DescriptorId, PacketId};
use tripwire_runtime::{
    BatchMode, ConfigError, EvictionPolicy, HybridWeights, ManagerError, PacketRouter, RouterError,
};

/// Every tool call the server answers
pub const TOOL_CALLS: [&str; 13] = [
    "execute_packet",
    "batch_execute",
    "get_packet_status",
    "list_services",
    "get_service_schema",
    "list_tools",
    "load_tool",
    "unload_tool",
    "get_tool_status",
    "get_performance_metrics",
    "optimize_cache",
    "set_cache_policy",
    "set_max_tools",
];

/// API errors, reported to the caller as an `error` frame
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No such tool call
    #[error("Unknown tool call '{name}'")]
    UnknownTool {
        /// Requested name
        name: String,
    },
    /// Arguments did not match the tool call
    #[error("Invalid arguments for {tool}: {source}")]
    InvalidArguments {
        /// Tool call
        tool: String,
        /// Decode error
        source: serde_json::Error,
    },
    /// Frame was not a tool call
    #[error("Invalid request frame: {0}")]
    InvalidRequest(serde_json::Error),
    /// Frame bytes were not UTF-8
    #[error("Invalid request frame: {0}")]
    InvalidUtf8(std::str::Utf8Error),
    /// Packet id did not parse
    #[error("Invalid packet id: {0}")]
    InvalidPacketId(#[from] CoreError),
    /// No status recorded for the packet
    #[error("No status recorded for packet {packet_id}")]
    PacketNotFound {
        /// Packet id
        packet_id: PacketId,
    },
    /// Router rejected the call
    #[error(transparent)]
    Router(#[from] RouterError),
    /// Tool manager rejected the call
    #[error(transparent)]
    Manager(#[from] ManagerError),
    /// Invalid policy or weights
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Result could not be encoded
    #[error("Failed to encode result: {0}")]
    Encode(serde_json::Error),
}

impl ApiError {
    /// Stable code for the error frame
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownTool { .. } => "UNKNOWN_TOOL",
            Self::InvalidArguments { .. } => "INVALID_ARGUMENTS",
            Self::InvalidRequest(_) | Self::InvalidUtf8(_) => "INVALID_REQUEST",
            Self::InvalidPacketId(_) => "INVALID_PACKET_ID",
            Self::PacketNotFound { .. } => "PACKET_NOT_FOUND",
            Self::Router(RouterError::BatchTooLarge { .. }) => "BATCH_TOO_LARGE",
            Self::Router(RouterError::Registry(_)) => "SERVICE_NOT_FOUND",
            Self::Router(_) => "ROUTER_ERROR",
            Self::Manager(ManagerError::NotRegistered { .. }) => "TOOL_NOT_FOUND",
            Self::Manager(ManagerError::InvalidCapacity { .. }) | Self::Config(_) => "INVALID_CONFIG",
            Self::Encode(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    #[serde(default)]
    id: Value,
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ExecuteArgs {
    packet: Value,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BatchArgs {
    packets: Vec<Value>,
    #[serde(default)]
    mode: BatchMode,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PacketIdArgs {
    packet_id: String,
}

#[derive(Debug, Deserialize)]
struct ServiceArgs {
    service: String,
}

#[derive(Debug, Default, Deserialize)]
struct ListToolsArgs {
    #[serde(default)]
    loaded_only: bool,
}

#[derive(Debug, Deserialize)]
struct ToolIdArgs {
    tool_id: String,
}

#[derive(Debug, Deserialize)]
struct OptimizeArgs {
    #[serde(default = "default_threshold")]
    threshold: u64,
}

const fn default_threshold() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
struct PolicyArgs {
    policy: String,
    #[serde(default)]
    usage_weight: Option<f64>,
    #[serde(default)]
    recency_weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MaxToolsArgs {
    max_tools: usize,
}

/// Answers tool calls against one router
#[derive(Clone)]
pub struct ApiServer {
    router: Arc<PacketRouter>,
}

impl ApiServer {
    /// Create a server over a router
    #[must_use]
    pub fn new(router: Arc<PacketRouter>) -> Self {
        Self { router }
    }

    /// The router
    #[must_use]
    pub fn router(&self) -> &PacketRouter {
        &self.router
    }

    /// Answer one tool call
    ///
    /// # Errors
    ///
    /// Returns error for unknown calls, bad arguments, or a rejected
    /// administrative request. Packet failures are not errors here; they
    /// come back inside the packet response.
    pub async fn handle_tool_call(&self, name: &str, arguments: Value) -> Result<Value, ApiError> {
        tracing::debug!(tool = name, "Tool call");
        match name {
            "execute_packet" => {
                let args: ExecuteArgs = parse_args(name, arguments)?;
                let response = self
                    .router
                    .execute(&args.packet, args.timeout_ms.map(Duration::from_millis))
                    .await;
                encode(&response)
            }
            "batch_execute" => {
                let args: BatchArgs = parse_args(name, arguments)?;
                let batch = self
                    .router
                    .execute_batch(&args.packets, args.mode, args.timeout_ms.map(Duration::from_millis))
                    .await?;
                encode(&batch)
            }
            "get_packet_status" => {
                let args: PacketIdArgs = parse_args(name, arguments)?;
                let packet_id = PacketId::parse(&args.packet_id)?;
                let snapshot = self
                    .router
                    .status(&packet_id)
                    .await
                    .ok_or(ApiError::PacketNotFound { packet_id })?;
                encode(&snapshot)
            }
            "list_services" => {
                let services = self.router.list_services().await;
                Ok(json!({ "count": services.len(), "services": encode(&services)? }))
            }
            "get_service_schema" => {
                let args: ServiceArgs = parse_args(name, arguments)?;
                encode(&self.router.service_schema(&args.service).await?)
            }
            "list_tools" => {
                let args: ListToolsArgs = if arguments.is_null() {
                    ListToolsArgs::default()
                } else {
                    parse_args(name, arguments)?
                };
                let manager = self.router.manager();
                let tools = if args.loaded_only {
                    manager.list_loaded().await
                } else {
                    manager.list_registered().await
                };
                let loaded = tools.iter().filter(|t| t.is_loaded()).count();
                Ok(json!({
                    "count": tools.len(),
                    "loaded": loaded,
                    "capacity": manager.capacity().await,
                    "tools": encode(&tools)?,
                }))
            }
            "load_tool" => {
                let args: ToolIdArgs = parse_args(name, arguments)?;
                let id = DescriptorId::from(args.tool_id.as_str());
                let outcome = self.router.manager().ensure_loaded(&id).await?;
                Ok(json!({ "tool_id": id, "result": encode(&outcome)? }))
            }
            "unload_tool" => {
                let args: ToolIdArgs = parse_args(name, arguments)?;
                let id = DescriptorId::from(args.tool_id.as_str());
                let was_loaded = self.router.manager().unload(&id).await?;
                Ok(json!({ "tool_id": id, "unloaded": was_loaded }))
            }
            "get_tool_status" => {
                let args: ToolIdArgs = parse_args(name, arguments)?;
                let id = DescriptorId::from(args.tool_id.as_str());
                let descriptor = self
                    .router
                    .manager()
                    .descriptor(&id)
                    .await
                    .ok_or(ManagerError::NotRegistered { id })?;
                encode(&descriptor)
            }
            "get_performance_metrics" => {
                let packets = self.router.metrics().snapshot();
                let tools = self.router.manager().stats().await;
                Ok(json!({ "packets": encode(&packets)?, "tools": encode(&tools)? }))
            }
            "optimize_cache" => {
                let args: OptimizeArgs = parse_args(name, or_empty(arguments))?;
                let unloaded = self.router.manager().optimize(args.threshold).await;
                Ok(json!({
                    "threshold": args.threshold,
                    "unloaded_count": unloaded.len(),
                    "unloaded": unloaded,
                }))
            }
            "set_cache_policy" => {
                let args: PolicyArgs = parse_args(name, arguments)?;
                let policy: EvictionPolicy = args.policy.parse()?;
                let weights = match (args.usage_weight, args.recency_weight) {
                    (None, None) => None,
                    (usage, recency) => {
                        let defaults = HybridWeights::default();
                        Some(HybridWeights {
                            usage_weight: usage.unwrap_or(defaults.usage_weight),
                            recency_weight: recency.unwrap_or(defaults.recency_weight),
                        })
                    }
                };
                if let Some(weights) = weights {
                    check_weight("usage_weight", weights.usage_weight)?;
                    check_weight("recency_weight", weights.recency_weight)?;
                }
                self.router.manager().set_policy(policy, weights).await;
                Ok(json!({ "policy": policy, "weights": weights }))
            }
            "set_max_tools" => {
                let args: MaxToolsArgs = parse_args(name, arguments)?;
                let evicted = self.router.manager().set_capacity(args.max_tools).await?;
                Ok(json!({
                    "max_tools": args.max_tools,
                    "evicted_count": evicted.len(),
                    "evicted": evicted,
                }))
            }
            _ => Err(ApiError::UnknownTool {
                name: name.to_string(),
            }),
        }
    }

    /// Answer one JSON frame, always producing a response frame
    pub async fn handle_frame(&self, line: &str) -> Value {
        let call: ToolCall = match serde_json::from_str(line) {
            Ok(call) => call,
            Err(err) => return error_frame(Value::Null, &ApiError::InvalidRequest(err)),
        };
        match self.handle_tool_call(&call.name, call.arguments).await {
            Ok(result) => json!({ "id": call.id, "result": result }),
            Err(err) => {
                tracing::warn!(tool = %call.name, code = err.code(), error = %err, "Tool call failed");
                error_frame(call.id, &err)
            }
        }
    }

    /// Serve JSON-lines frames until `reader` reaches end of input.
    ///
    /// A line that is not UTF-8 is answered with an `INVALID_REQUEST`
    /// frame; serving continues.
    ///
    /// # Errors
    ///
    /// Returns error if reading or writing fails
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        let mut served = 0u64;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let frame = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_frame(line).await,
                Err(err) => {
                    tracing::warn!(error = %err, "Undecodable frame");
                    error_frame(Value::Null, &ApiError::InvalidUtf8(err))
                }
            };
            let mut out = frame.to_string();
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
            served += 1;
        }
        tracing::info!(frames = served, "Input closed, stopping");
        Ok(())
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ApiError> {
    serde_json::from_value(arguments).map_err(|source| ApiError::InvalidArguments {
        tool: tool.to_string(),
        source,
    })
}

fn or_empty(arguments: Value) -> Value {
    if arguments.is_null() {
        json!({})
    } else {
        arguments
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(ApiError::Encode)
}

fn check_weight(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidWeight { field, value })
    }
}

fn error_frame(id: Value, err: &ApiError) -> Value {
    let mut frame = json!({
        "id": id,
        "error": {
            "code": err.code(),
            "message": err.to_string(),
        },
    });
    if let ApiError::UnknownTool { .. } = err {
        frame["error"]["available"] = json!(TOOL_CALLS);
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripwire_runtime::RouterConfig;
    use tripwire_tool::ServiceFactory;

    fn server(config: RouterConfig) -> ApiServer {
        let router =
            PacketRouter::with_services(config, ServiceFactory::new().build_builtin()).unwrap();
        ApiServer::new(Arc::new(router))
    }

    fn create_task(content: &str) -> Value {
        json!({
            "packet": {
                "tool_type": "todoist",
                "action": "create",
                "item_type": "task",
                "payload": {"content": content}
            }
        })
    }

    #[tokio::test]
    async fn test_execute_then_status() {
        let api = server(RouterConfig::new());
        let response = api
            .handle_tool_call("execute_packet", create_task("Buy milk"))
            .await
            .unwrap();
        assert_eq!(response["success"], true);
        assert_eq!(response["data"]["item"]["content"], "Buy milk");

        let packet_id = response["packet_id"].as_str().unwrap().to_string();
        let status = api
            .handle_tool_call("get_packet_status", json!({"packet_id": packet_id}))
            .await
            .unwrap();
        assert_eq!(status["status"], "success");
    }

    #[tokio::test]
    async fn test_failed_packet_is_not_api_error() {
        let api = server(RouterConfig::new());
        let response = api
            .handle_tool_call("execute_packet", json!({"packet": {"tool_type": "nope"}}))
            .await
            .unwrap();
        assert_eq!(response["success"], false);
        assert_eq!(response["error"]["error_type"], "FORMAT_ERROR");
    }

    #[tokio::test]
    async fn test_batch_execute() {
        let api = server(RouterConfig::new());
        let args = json!({
            "mode": "parallel",
            "packets": [create_task("a")["packet"], create_task("b")["packet"]]
        });
        let batch = api.handle_tool_call("batch_execute", args).await.unwrap();
        assert_eq!(batch["total"], 2);
        assert_eq!(batch["succeeded"], 2);
        assert_eq!(batch["results"][1]["data"]["item"]["content"], "b");
    }

    #[tokio::test]
    async fn test_service_introspection() {
        let api = server(RouterConfig::new());
        let services = api.handle_tool_call("list_services", Value::Null).await.unwrap();
        assert_eq!(services["count"], 4);
        assert_eq!(services["services"][0]["name"], "todoist");

        let schema = api
            .handle_tool_call("get_service_schema", json!({"service": "gmail"}))
            .await
            .unwrap();
        assert_eq!(schema["service"], "gmail");

        let err = api
            .handle_tool_call("get_service_schema", json!({"service": "nope"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SERVICE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_tool_administration() {
        let api = server(RouterConfig::new().with_max_loaded_tools(3));
        let tool = json!({"tool_id": "gcal:list:event"});

        let loaded = api.handle_tool_call("load_tool", tool.clone()).await.unwrap();
        assert_eq!(loaded["result"]["outcome"], "loaded");

        let status = api.handle_tool_call("get_tool_status", tool.clone()).await.unwrap();
        assert_eq!(status["loaded"], true);
        assert_eq!(status["usage_count"], 1);

        let listed = api
            .handle_tool_call("list_tools", json!({"loaded_only": true}))
            .await
            .unwrap();
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["capacity"], 3);

        let unloaded = api.handle_tool_call("unload_tool", tool.clone()).await.unwrap();
        assert_eq!(unloaded["unloaded"], true);

        let missing = api
            .handle_tool_call("get_tool_status", json!({"tool_id": "gcal:fly:event"}))
            .await
            .unwrap_err();
        assert_eq!(missing.code(), "TOOL_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_cache_controls() {
        let api = server(RouterConfig::new());
        for id in ["gcal:list:event", "gcal:read:event", "gcal:list:event"] {
            api.handle_tool_call("load_tool", json!({"tool_id": id})).await.unwrap();
        }

        let optimized = api.handle_tool_call("optimize_cache", Value::Null).await.unwrap();
        assert_eq!(optimized["unloaded"], json!(["gcal:read:event"]));

        let policy = api
            .handle_tool_call("set_cache_policy", json!({"policy": "hybrid", "recency_weight": 2.0}))
            .await
            .unwrap();
        assert_eq!(policy["policy"], "hybrid");
        assert_eq!(policy["weights"]["usage_weight"], 1.0);

        let bad = api
            .handle_tool_call("set_cache_policy", json!({"policy": "mru"}))
            .await
            .unwrap_err();
        assert_eq!(bad.code(), "INVALID_CONFIG");

        let resized = api
            .handle_tool_call("set_max_tools", json!({"max_tools": 1}))
            .await
            .unwrap();
        assert_eq!(resized["max_tools"], 1);

        let zero = api
            .handle_tool_call("set_max_tools", json!({"max_tools": 0}))
            .await
            .unwrap_err();
        assert_eq!(zero.code(), "INVALID_CONFIG");

        let metrics = api
            .handle_tool_call("get_performance_metrics", Value::Null)
            .await
            .unwrap();
        assert_eq!(metrics["tools"]["capacity"], 1);
        assert_eq!(metrics["tools"]["policy"], "hybrid");
    }

    #[tokio::test]
    async fn test_bad_calls() {
        let api = server(RouterConfig::new());
        let unknown = api.handle_tool_call("launch", Value::Null).await.unwrap_err();
        assert_eq!(unknown.code(), "UNKNOWN_TOOL");

        let bad_args = api
            .handle_tool_call("get_packet_status", json!({"id": 3}))
            .await
            .unwrap_err();
        assert_eq!(bad_args.code(), "INVALID_ARGUMENTS");

        let bad_id = api
            .handle_tool_call("get_packet_status", json!({"packet_id": "nope"}))
            .await
            .unwrap_err();
        assert_eq!(bad_id.code(), "INVALID_PACKET_ID");

        let unknown_id = api
            .handle_tool_call("get_packet_status", json!({"packet_id": PacketId::new().to_string()}))
            .await
            .unwrap_err();
        assert_eq!(unknown_id.code(), "PACKET_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_serve_json_lines() {
        let api = server(RouterConfig::new());
        let input = concat!(
            r#"{"id": 1, "name": "list_services"}"#,
            "\n\n",
            "not json\n",
            r#"{"id": "x", "name": "warp"}"#,
            "\n",
        );
        let mut output = Vec::new();
        api.serve(input.as_bytes(), &mut output).await.unwrap();

        let frames: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["id"], 1);
        assert_eq!(frames[0]["result"]["count"], 4);
        assert_eq!(frames[1]["error"]["code"], "INVALID_REQUEST");
        assert_eq!(frames[2]["id"], "x");
        assert_eq!(frames[2]["error"]["code"], "UNKNOWN_TOOL");
        assert_eq!(frames[2]["error"]["available"][0], "execute_packet");
    }

    #[tokio::test]
    async fn test_serve_survives_non_utf8_frame() {
        let api = server(RouterConfig::new());
        let mut input = Vec::new();
        input.extend_from_slice(br#"{"id": 1, "name": "list_services"}"#);
        input.extend_from_slice(b"\n{\"id\": 2, \xff}\n");
        input.extend_from_slice(br#"{"id": 3, "name": "list_services"}"#);
        input.push(b'\n');
        let mut output = Vec::new();
        api.serve(input.as_slice(), &mut output).await.unwrap();

        let frames: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["id"], 1);
        assert_eq!(frames[1]["id"], Value::Null);
        assert_eq!(frames[1]["error"]["code"], "INVALID_REQUEST");
        assert_eq!(frames[2]["id"], 3);
        assert_eq!(frames[2]["result"]["count"], 4);
    }
}
