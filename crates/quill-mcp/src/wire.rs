//! Values as they arrive off a transport, before any decoding.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// `id=` of the outermost constructor in a debug dump, optionally after
/// `jsonrpc=`.
static DUMP_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(?:\w+\s*=\s*)?\w+\(\s*(?:jsonrpc\s*=\s*['"][^'"]*['"]\s*,\s*)?id\s*=\s*(?:'([^']*)'|"([^"]*)"|(-?\d+))"#,
    )
    .expect("valid regex")
});

/// A data-shaped value delivered by a transport.
///
/// Peers do not agree on a single reply shape: some send a proper JSON-RPC
/// object, others send the debug dump of one, others raw text. The decoder
/// accepts any of these.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// A parsed JSON value.
    Structured(Value),
    /// Anything that did not parse as a JSON object or array.
    Text(String),
}

impl WireValue {
    /// Classify one raw frame.
    ///
    /// Objects and arrays become [`WireValue::Structured`]. A JSON string is
    /// unwrapped into [`WireValue::Text`], every other input is kept verbatim
    /// as text.
    pub fn from_frame(frame: &str) -> Self {
        match serde_json::from_str::<Value>(frame) {
            Ok(Value::String(s)) => Self::Text(s),
            Ok(value @ (Value::Object(_) | Value::Array(_))) => Self::Structured(value),
            _ => Self::Text(frame.to_string()),
        }
    }

    /// The structured value, if any.
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(v) => Some(v),
            Self::Text(_) => None,
        }
    }

    /// The raw text, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Structured(_) => None,
        }
    }

    /// The JSON-RPC id carried by a reply.
    ///
    /// Numeric ids are rendered in decimal so they compare equal to the
    /// string ids this client sends. Text only yields an id when it is a
    /// debug dump whose outermost call names one up front.
    pub fn reply_id(&self) -> Option<String> {
        match self {
            Self::Structured(v) => match v.get("id")? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            },
            Self::Text(text) => {
                let caps = DUMP_ID.captures(text)?;
                (1..=3)
                    .find_map(|i| caps.get(i))
                    .map(|m| m.as_str().to_string())
            }
        }
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<Value> for WireValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            other => Self::Structured(other),
        }
    }
}

impl From<String> for WireValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for WireValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// An error object a transport delivered in place of data.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerFault {
    /// Human-readable description.
    pub message: String,
    /// Extra detail when the transport has any (HTTP body, raw frame).
    pub detail: Option<String>,
    /// Request the fault answers, when the transport can tell.
    pub request_id: Option<String>,
}

impl PeerFault {
    /// Create a fault with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
            request_id: None,
        }
    }

    /// Attach detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Tie the fault to the request it answers.
    pub fn for_request(mut self, id: Option<String>) -> Self {
        self.request_id = id;
        self
    }
}

impl fmt::Display for PeerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({})", self.message, detail),
            None => f.write_str(&self.message),
        }
    }
}

/// One item received from a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Data of unknown shape, to be decoded.
    Data(WireValue),
    /// An error object; must never be decoded.
    Fault(PeerFault),
}

impl From<WireValue> for Inbound {
    fn from(value: WireValue) -> Self {
        Self::Data(value)
    }
}

impl From<PeerFault> for Inbound {
    fn from(fault: PeerFault) -> Self {
        Self::Fault(fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_frame_object() {
        let v = WireValue::from_frame(r#"{"jsonrpc":"2.0","id":"1","result":{}}"#);
        assert!(v.as_structured().is_some());
        assert_eq!(v.reply_id().as_deref(), Some("1"));
    }

    #[test]
    fn test_from_frame_debug_dump_is_text() {
        let raw = "root=JSONRPCResponse(id='1', result={})";
        assert_eq!(WireValue::from_frame(raw), WireValue::Text(raw.to_string()));
    }

    #[test]
    fn test_debug_dump_reply_id() {
        let id = |raw: &str| WireValue::from(raw).reply_id();
        assert_eq!(id("root=JSONRPCResponse(id='3', result={})").as_deref(), Some("3"));
        assert_eq!(
            id("root=JSONRPCResponse(jsonrpc='2.0', id=12, result={}, error=None)").as_deref(),
            Some("12")
        );
        assert_eq!(id(r#"JSONRPCResponse(id="7", result={})"#).as_deref(), Some("7"));
        // Only the outermost call counts.
        assert_eq!(id("root=JSONRPCResponse(result={'id': '4'})"), None);
        assert_eq!(id("Result: 42"), None);
    }

    #[test]
    fn test_from_frame_json_string_is_unwrapped() {
        let v = WireValue::from_frame(r#""root=JSONRPCResponse()""#);
        assert_eq!(v.as_text(), Some("root=JSONRPCResponse()"));
    }

    #[test]
    fn test_from_frame_scalar_stays_verbatim() {
        assert_eq!(WireValue::from_frame("42").as_text(), Some("42"));
    }

    #[test]
    fn test_numeric_reply_id() {
        let v = WireValue::Structured(json!({"id": 7}));
        assert_eq!(v.reply_id().as_deref(), Some("7"));
        assert_eq!(WireValue::from("text").reply_id(), None);
    }

    #[test]
    fn test_fault_display() {
        let fault = PeerFault::new("HTTP 500").with_detail("internal");
        assert_eq!(fault.to_string(), "HTTP 500 (internal)");
    }
}
