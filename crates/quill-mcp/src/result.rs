//! Canonical tool result model.
//!
//! Every reply shape the decoder understands converges on [`ToolResult`].

use serde_json::{Map, Value, json};

/// One unit of a tool's reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    /// A `{"type": "text", "text": ...}` item.
    Text {
        /// The text content.
        value: String,
    },
    /// Any other item, kept as received.
    Opaque {
        /// The raw object.
        raw: Map<String, Value>,
    },
}

impl ContentItem {
    /// Create a text item.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    /// Classify a raw content object.
    pub fn from_object(raw: &Map<String, Value>) -> Self {
        let is_text = raw.get("type").and_then(Value::as_str) == Some("text");
        match raw.get("text").and_then(Value::as_str) {
            Some(text) if is_text => Self::text(text),
            _ => Self::Opaque { raw: raw.clone() },
        }
    }

    /// The text this item carries, if any.
    pub fn text_value(&self) -> Option<&str> {
        match self {
            Self::Text { value } => Some(value),
            Self::Opaque { raw } => raw.get("text").and_then(Value::as_str),
        }
    }

    /// Wire rendering.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text { value } => json!({"type": "text", "text": value}),
            Self::Opaque { raw } => Value::Object(raw.clone()),
        }
    }
}

/// The canonical result of a tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolResult {
    /// Content returned by the tool, possibly empty.
    pub content: Vec<ContentItem>,
    /// Whether the tool reported a failure.
    pub is_error: bool,
    /// Failure reason, when the peer sends one separately from `content`.
    pub message: Option<String>,
}

impl ToolResult {
    /// A successful result with a single text item.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(value)],
            ..Default::default()
        }
    }

    /// A failed result carrying a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            content: Vec::new(),
            is_error: true,
            message: Some(message.into()),
        }
    }

    /// Map a recovered `result` object onto the canonical shape.
    ///
    /// The object must carry a `content` array of objects. `isError` and
    /// `message` are optional, `null` counts as absent, and any other type
    /// for them rejects the shape.
    pub fn from_result_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let content = obj
            .get("content")?
            .as_array()?
            .iter()
            .map(|item| item.as_object().map(ContentItem::from_object))
            .collect::<Option<Vec<_>>>()?;

        let is_error = match obj.get("isError") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => return None,
        };

        let message = match obj.get("message") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return None,
        };

        Some(Self {
            content,
            is_error,
            message,
        })
    }

    /// The value of the first content item, if it carries text.
    ///
    /// Only the first item is consulted; a text item further down the list
    /// does not count.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(ContentItem::text_value)
    }

    /// Whether the tool reported a failure.
    pub fn is_failure(&self) -> bool {
        self.is_error
    }

    /// Human-readable failure reason: `message`, else the first item's text.
    pub fn failure_message(&self) -> Option<&str> {
        self.message.as_deref().or_else(|| self.first_text())
    }

    /// Canonical wire rendering of this result.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(
            "content".to_string(),
            Value::Array(self.content.iter().map(ContentItem::to_value).collect()),
        );
        obj.insert("isError".to_string(), Value::Bool(self.is_error));
        if let Some(message) = &self.message {
            obj.insert("message".to_string(), Value::String(message.clone()));
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_text_from_text_item() {
        let result = ToolResult::text("42");
        assert_eq!(result.first_text(), Some("42"));
        assert!(!result.is_failure());
    }

    #[test]
    fn test_first_text_from_opaque_with_text_key() {
        let value = json!({"content": [{"type": "markdown", "text": "# hi"}]});
        let result = ToolResult::from_result_value(&value).unwrap();
        assert!(matches!(result.content[0], ContentItem::Opaque { .. }));
        assert_eq!(result.first_text(), Some("# hi"));
    }

    #[test]
    fn test_first_text_only_looks_at_first_item() {
        let value = json!({"content": [
            {"type": "image", "data": "AAAA", "mimeType": "image/png"},
            {"type": "text", "text": "caption"}
        ]});
        let result = ToolResult::from_result_value(&value).unwrap();
        assert_eq!(result.first_text(), None);
    }

    #[test]
    fn test_first_text_empty_content() {
        assert_eq!(ToolResult::default().first_text(), None);
    }

    #[test]
    fn test_empty_content_is_a_valid_shape() {
        let result = ToolResult::from_result_value(&json!({"content": []})).unwrap();
        assert!(result.content.is_empty());
        assert!(!result.is_error);
        assert_eq!(result.message, None);
    }

    #[test]
    fn test_shape_requires_content_array() {
        assert!(ToolResult::from_result_value(&json!({"tools": []})).is_none());
        assert!(ToolResult::from_result_value(&json!({"content": "text"})).is_none());
        assert!(ToolResult::from_result_value(&json!({"content": ["bare"]})).is_none());
        assert!(ToolResult::from_result_value(&json!([])).is_none());
    }

    #[test]
    fn test_shape_rejects_mistyped_flags() {
        let value = json!({"content": [], "isError": "yes"});
        assert!(ToolResult::from_result_value(&value).is_none());
        let value = json!({"content": [], "message": 3});
        assert!(ToolResult::from_result_value(&value).is_none());
    }

    #[test]
    fn test_null_flags_count_as_absent() {
        let value = json!({"content": [], "isError": null, "message": null});
        let result = ToolResult::from_result_value(&value).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.message, None);
    }

    #[test]
    fn test_failure_message_prefers_message() {
        let mut result = ToolResult::text("Unknown tool: nope");
        result.is_error = true;
        assert_eq!(result.failure_message(), Some("Unknown tool: nope"));

        result.message = Some("relation does not exist".into());
        assert_eq!(result.failure_message(), Some("relation does not exist"));
    }

    #[test]
    fn test_to_value_round_trips_through_shape_match() {
        let mut result = ToolResult::failure("bad");
        result.content.push(ContentItem::text("detail"));
        let back = ToolResult::from_result_value(&result.to_value()).unwrap();
        assert_eq!(back, result);
    }
}
