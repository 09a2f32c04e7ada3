//! `quill call` - invoke one tool and print what it produced.

use anyhow::{Result, bail};
use clap::Args;
use serde_json::{Map, Value, json};

use quill_mcp::{CallOutcome, ToolInfo};

use super::Context;

/// Arguments for `quill call`.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Tool to invoke
    pub tool: String,

    /// Tool arguments: a JSON object, or a bare string bound to the tool's
    /// main string parameter
    #[arg(long, short)]
    pub args: Option<String>,
}

/// Run `quill call`.
pub async fn run(args: CallArgs, ctx: &Context) -> Result<()> {
    let mut client = ctx.connect().await?;

    let arguments = coerce_arguments(args.args.as_deref(), &args.tool, client.available_tools())?;
    tracing::debug!(tool = %args.tool, %arguments, "calling tool");

    let outcome = client.call_tool(&args.tool, arguments).await;
    if let Err(e) = client.close().await {
        tracing::debug!(error = %e, "close failed");
    }
    let outcome = outcome?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);
    } else {
        println!("{}", render_outcome(&outcome));
    }
    Ok(())
}

/// Build `tools/call` arguments from the `--args` value.
///
/// A JSON object is passed through. Anything else is bound as a string to the
/// tool's primary string parameter.
fn coerce_arguments(raw: Option<&str>, tool: &str, tools: &[ToolInfo]) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Map::new()));
    };
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(raw) {
        return Ok(value);
    }

    let param = tools
        .iter()
        .find(|t| t.name == tool)
        .and_then(ToolInfo::primary_string_param);
    match param {
        Some(param) => Ok(json!({ param: raw })),
        None => {
            let simple: Vec<String> = tools
                .iter()
                .filter_map(|t| {
                    t.primary_string_param()
                        .map(|p| format!("{} ({})", t.name, p))
                })
                .collect();
            if simple.is_empty() {
                bail!("'{}' needs JSON object arguments", tool);
            }
            bail!(
                "'{}' needs JSON object arguments; tools that take a simple argument: {}",
                tool,
                simple.join(", ")
            )
        }
    }
}

fn render_outcome(outcome: &CallOutcome) -> String {
    match outcome {
        CallOutcome::Text(text) => format!("Result: {}", text),
        CallOutcome::ToolError { message } => format!("Error: {}", message),
        CallOutcome::Content(result) => serde_json::to_string_pretty(&result.to_value())
            .unwrap_or_else(|_| result.to_value().to_string()),
        CallOutcome::Unrecognized(raw) => format!("could not interpret response\n{}", raw),
    }
}

fn outcome_json(outcome: &CallOutcome) -> Value {
    match outcome {
        CallOutcome::Text(text) => json!({"status": "ok", "text": text}),
        CallOutcome::ToolError { message } => json!({"status": "tool_error", "message": message}),
        CallOutcome::Content(result) => json!({"status": "ok", "result": result.to_value()}),
        CallOutcome::Unrecognized(raw) => json!({"status": "unrecognized", "raw": raw.to_string()}),
    }
}
