//! Outbound envelopes and the MCP payloads this client speaks.
//!
//! Replies are not modelled here: they arrive as [`crate::WireValue`] and go
//! through the decoder, since peers do not reliably send well-formed
//! JSON-RPC.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value of every envelope's `jsonrpc` member.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision offered in the handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// The four methods this client uses.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// An outbound request (`id` set) or notification (`id` absent).
///
/// Ids are decimal strings handed out by the correlator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Envelope {
    /// A request awaiting exactly one reply.
    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::notification(method, params)
        }
    }

    /// A fire-and-forget message.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Whether no reply will be awaited.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// The `error` member of a failed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Used when a peer's error object is not shaped like one.
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Capabilities offered in the handshake. This client offers none, so the
/// object serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
}

/// `clientInfo` in the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "quill".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `initialize` params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo::default(),
        }
    }
}

/// `serverInfo` from the handshake reply, when readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// One entry of a `tools/list` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the tool's arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl ToolInfo {
    /// Name of the parameter a bare string argument should bind to.
    ///
    /// The first `required` property typed as a string wins, then the string
    /// property that sorts first by name.
    pub fn primary_string_param(&self) -> Option<&str> {
        let schema = self.input_schema.as_ref()?;
        let properties = schema.get("properties")?.as_object()?;
        let is_string = |name: &str| {
            properties
                .get(name)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str)
                == Some("string")
        };

        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str);
        for name in required {
            if is_string(name) {
                return Some(name);
            }
        }

        properties
            .keys()
            .find(|name| is_string(name.as_str()))
            .map(String::as_str)
    }
}

/// `tools/call` params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_shape() {
        let req = Envelope::request("1", methods::INITIALIZE, Some(json!({"test": true})));
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"jsonrpc": "2.0", "id": "1", "method": "initialize", "params": {"test": true}})
        );
    }

    #[test]
    fn test_notification_omits_id() {
        let note = Envelope::notification(methods::INITIALIZED, None);
        assert!(note.is_notification());
        let json = serde_json::to_value(&note).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("params").is_none());
    }

    #[test]
    fn test_error_object_without_data() {
        let err: JsonRpcError =
            serde_json::from_value(json!({"code": -32601, "message": "Method not found"}))
                .unwrap();
        assert_eq!(err.code, JsonRpcError::METHOD_NOT_FOUND);
        assert_eq!(err.data, None);
    }

    #[test]
    fn test_initialize_params() {
        let json = serde_json::to_value(InitializeParams::default()).unwrap();
        assert_eq!(json["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(json["clientInfo"]["name"], "quill");
        assert_eq!(json["capabilities"], json!({}));
    }

    #[test]
    fn test_tool_info_deserialization() {
        let json = r#"{
            "name": "postgres_query_select",
            "description": "Run a read-only query",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string"}
                },
                "required": ["query"]
            }
        }"#;
        let tool: ToolInfo = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "postgres_query_select");
        assert!(tool.description.is_some());
        assert_eq!(tool.primary_string_param(), Some("query"));
    }

    #[test]
    fn test_primary_param_prefers_required() {
        let tool = ToolInfo {
            name: "t".into(),
            description: None,
            input_schema: Some(json!({
                "type": "object",
                "properties": {
                    "limit": {"type": "integer"},
                    "note": {"type": "string"},
                    "schema_name": {"type": "string"}
                },
                "required": ["limit", "schema_name"]
            })),
        };
        assert_eq!(tool.primary_string_param(), Some("schema_name"));
    }

    #[test]
    fn test_primary_param_absent() {
        let tool = ToolInfo {
            name: "random_uint64".into(),
            description: None,
            input_schema: Some(json!({"type": "object", "properties": {}})),
        };
        assert_eq!(tool.primary_string_param(), None);
    }
}
