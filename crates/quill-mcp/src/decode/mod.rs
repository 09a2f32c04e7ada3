//! Multi-stage response decoder.
//!
//! Peers reply in more than one shape: a proper JSON-RPC object, the debug
//! dump of that object (`root=JSONRPCResponse(id='1', result={...})`), or
//! text that only loosely resembles either. [`ResponseDecoder`] tries a fixed
//! list of strategies, most trustworthy first, and stops at the first one that
//! yields a [`ToolResult`]:
//!
//! ```text
//! ┌──────────────────┐   ┌───────────────────┐   ┌────────────────────┐   ┌────────────┐
//! │ Native           │ → │ PrefixedLiteral   │ → │ LiteralStructure   │ → │ TextField  │ → Unrecognized
//! │ result object    │   │ quote-swap + JSON │   │ permissive literal │   │ regex      │
//! └──────────────────┘   └───────────────────┘   └────────────────────┘   └────────────┘
//! ```
//!
//! Giving up is a value ([`DecodeOutcome::Unrecognized`]), never an error.

pub mod literal;

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::protocol::ToolInfo;
use crate::result::ToolResult;
use crate::wire::WireValue;

/// Debug-dump markers recognised by default.
pub const DEFAULT_MARKERS: &[&str] = &["root="];

/// Start of the `result={` fragment inside a debug dump.
static RESULT_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s,(])result\s*=\s*\{").expect("valid regex"));

/// Bounded fallback when the balanced scan cannot close the fragment.
static RESULT_BOUNDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)result\s*=\s*(\{.*\})(?:,\s*error\s*=|\)\s*$)").expect("valid regex")
});

/// A single labelled text value: `'text': '...'`, `text='...'`, `"text": "..."`.
static TEXT_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)(?:^|[^A-Za-z0-9_])text['"]?\s*[:=]\s*('(?:[^'\\]|\\.)+'|"(?:[^"\\]|\\.)+")"#,
    )
    .expect("valid regex")
});

/// Decoding strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeStage {
    /// A structured reply whose `result` already has the canonical shape.
    Native,
    /// A debug dump whose `result={...}` fragment becomes JSON after
    /// quote and literal normalisation.
    PrefixedLiteral,
    /// The same fragment read by the permissive literal parser.
    LiteralStructure,
    /// Last resort: one labelled `text` value found anywhere in the string.
    TextField,
}

impl DecodeStage {
    /// All stages, in order.
    pub const ORDER: [DecodeStage; 4] = [
        DecodeStage::Native,
        DecodeStage::PrefixedLiteral,
        DecodeStage::LiteralStructure,
        DecodeStage::TextField,
    ];

    /// Stages that recover a whole `result` object (everything but the regex).
    pub const PAYLOAD: [DecodeStage; 3] = [
        DecodeStage::Native,
        DecodeStage::PrefixedLiteral,
        DecodeStage::LiteralStructure,
    ];

    /// Short name for logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::PrefixedLiteral => "prefixed_literal",
            Self::LiteralStructure => "literal_structure",
            Self::TextField => "text_field",
        }
    }
}

/// Result of decoding one wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// A canonical result was recovered.
    Decoded(ToolResult),
    /// No stage succeeded; the original value is handed back untouched.
    Unrecognized(WireValue),
}

impl DecodeOutcome {
    /// The decoded result, if any.
    pub fn result(&self) -> Option<&ToolResult> {
        match self {
            Self::Decoded(result) => Some(result),
            Self::Unrecognized(_) => None,
        }
    }

    /// Whether a result was recovered.
    pub fn is_decoded(&self) -> bool {
        matches!(self, Self::Decoded(_))
    }
}

/// Turns wire values of unknown shape into canonical results.
#[derive(Debug, Clone)]
pub struct ResponseDecoder {
    markers: Vec<String>,
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::with_markers(DEFAULT_MARKERS.iter().copied())
    }
}

impl ResponseDecoder {
    /// Create a decoder with the default markers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder recognising the given debug-dump markers.
    ///
    /// An empty list disables the two literal stages.
    pub fn with_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    /// Configured markers.
    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Decode a tool reply using the first stage that succeeds.
    pub fn decode(&self, value: &WireValue) -> DecodeOutcome {
        for stage in DecodeStage::ORDER {
            if let Some(result) = self.stage(stage, value) {
                tracing::debug!(
                    stage = stage.name(),
                    items = result.content.len(),
                    is_error = result.is_error,
                    "decoded tool reply"
                );
                return DecodeOutcome::Decoded(result);
            }
        }
        tracing::debug!("no decode stage matched reply");
        DecodeOutcome::Unrecognized(value.clone())
    }

    /// Run a single stage on its own.
    pub fn stage(&self, stage: DecodeStage, value: &WireValue) -> Option<ToolResult> {
        match stage {
            DecodeStage::TextField => text_field(value.as_text()?),
            _ => self
                .recover(stage, value)
                .and_then(|payload| ToolResult::from_result_value(&payload)),
        }
    }

    /// Recover the raw `result` object of any reply, e.g. a handshake.
    pub fn decode_payload(&self, value: &WireValue) -> Option<Value> {
        DecodeStage::PAYLOAD
            .into_iter()
            .find_map(|stage| self.recover(stage, value))
    }

    /// Recover the tool descriptors of a `tools/list` reply.
    ///
    /// `Some(vec![])` means the peer listed no tools; `None` means the reply
    /// could not be read as a listing at all.
    pub fn decode_tools(&self, value: &WireValue) -> Option<Vec<ToolInfo>> {
        DecodeStage::PAYLOAD.into_iter().find_map(|stage| {
            let payload = self.recover(stage, value)?;
            let tools = payload.get("tools")?.as_array()?;
            tracing::debug!(stage = stage.name(), count = tools.len(), "decoded tool listing");
            Some(
                tools
                    .iter()
                    .filter_map(|tool| match serde_json::from_value::<ToolInfo>(tool.clone()) {
                        Ok(info) => Some(info),
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping malformed tool descriptor");
                            None
                        }
                    })
                    .collect(),
            )
        })
    }

    /// Recover the `result` object with one of the payload stages.
    fn recover(&self, stage: DecodeStage, value: &WireValue) -> Option<Value> {
        match stage {
            DecodeStage::Native => value.as_structured()?.get("result").cloned(),
            DecodeStage::PrefixedLiteral => {
                let fragment = self.literal_fragment(value)?;
                // A swapped `\'` would still be valid JSON, as `\"`.
                if fragment.contains("\\'") {
                    tracing::debug!("escaped quote in result fragment, skipping quote swap");
                    return None;
                }
                serde_json::from_str(&normalize_literal(fragment)).ok()
            }
            DecodeStage::LiteralStructure => {
                let fragment = self.literal_fragment(value)?;
                match literal::parse(fragment) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        tracing::debug!(error = %e, "literal parse of result fragment failed");
                        None
                    }
                }
            }
            DecodeStage::TextField => None,
        }
    }

    /// The `{...}` fragment of a marker-prefixed debug dump.
    fn literal_fragment<'v>(&self, value: &'v WireValue) -> Option<&'v str> {
        let text = value.as_text()?.trim_start();
        if !self.markers.iter().any(|m| text.starts_with(m.as_str())) {
            return None;
        }
        isolate_result_fragment(text)
    }
}

/// Locate the `result={...}` span without parsing it.
///
/// A quote-aware brace scan handles nesting; if quoting is too broken for the
/// scan to close, a bounded pattern anchored on `, error=` or the closing
/// parenthesis is tried instead.
pub fn isolate_result_fragment(text: &str) -> Option<&str> {
    let m = RESULT_START.find(text)?;
    let open = m.end() - 1;
    if let Some(close) = balanced_close(&text[open..]) {
        return Some(&text[open..open + close + 1]);
    }
    RESULT_BOUNDED
        .captures(&text[m.start()..])
        .and_then(|c| c.get(1))
        .map(|g| g.as_str())
}

/// Byte index of the brace closing the one at `s[0]`.
fn balanced_close(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Rewrite a debug-dump fragment into candidate JSON.
///
/// Every single quote becomes a double quote; bare `None`, `True` and
/// `False` outside string literals become their JSON spelling. Text that
/// itself contains quotes does not survive this and is left to the literal
/// stage.
pub fn normalize_literal(fragment: &str) -> String {
    let swapped = fragment.replace('\'', "\"");
    let mut out = String::with_capacity(swapped.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut word = String::new();

    let flush = |word: &mut String, out: &mut String| {
        out.push_str(match word.as_str() {
            "None" => "null",
            "True" => "true",
            "False" => "false",
            other => other,
        });
        word.clear();
    };

    for c in swapped.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        flush(&mut word, &mut out);
        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    flush(&mut word, &mut out);
    out
}

/// Last-resort extraction of a single `text` value.
fn text_field(text: &str) -> Option<ToolResult> {
    let quoted = TEXT_FIELD.captures(text)?.get(1)?.as_str();
    let value = match literal::parse(quoted) {
        Ok(Value::String(s)) => s,
        _ => quoted[1..quoted.len() - 1].to_string(),
    };
    Some(ToolResult::text(value))
}
