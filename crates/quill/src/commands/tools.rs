//! `quill tools` - list the tools a server offers.

use anyhow::Result;
use clap::Args;

use quill_mcp::ToolInfo;

use super::Context;

/// Arguments for `quill tools`.
#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Show full input schemas
    #[arg(long)]
    pub full: bool,
}

/// Run `quill tools`.
pub async fn run(args: ToolsArgs, ctx: &Context) -> Result<()> {
    let mut client = ctx.connect().await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(client.available_tools())?);
    } else {
        if ctx.verbose
            && let Some(info) = client.server_info()
        {
            println!(
                "Server: {} {}",
                info.name,
                info.version.as_deref().unwrap_or("")
            );
        }
        print!("{}", render_tools(client.available_tools(), args.full));
    }

    if let Err(e) = client.close().await {
        tracing::debug!(error = %e, "close failed");
    }
    Ok(())
}

fn render_tools(tools: &[ToolInfo], full: bool) -> String {
    if tools.is_empty() {
        return "No tools available.\n".to_string();
    }

    let mut out = format!("Tools ({}):\n", tools.len());
    for tool in tools {
        match &tool.description {
            Some(description) => out.push_str(&format!("  {}: {}\n", tool.name, description)),
            None => out.push_str(&format!("  {}\n", tool.name)),
        }
        if full && let Some(schema) = &tool.input_schema {
            let pretty = serde_json::to_string_pretty(schema).unwrap_or_default();
            for line in pretty.lines() {
                out.push_str(&format!("      {}\n", line));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str, description: Option<&str>) -> ToolInfo {
        ToolInfo {
            name: name.to_string(),
            description: description.map(str::to_string),
            input_schema: Some(json!({"type": "object"})),
        }
    }

    #[test]
    fn test_render_tools() {
        let tools = [tool("echo", Some("Echo back the input")), tool("bare", None)];
        let out = render_tools(&tools, false);
        assert_eq!(out, "Tools (2):\n  echo: Echo back the input\n  bare\n");
    }

    #[test]
    fn test_render_tools_full() {
        let out = render_tools(&[tool("echo", None)], true);
        assert!(out.contains("      \"type\": \"object\""));
    }

    #[test]
    fn test_render_no_tools() {
        assert_eq!(render_tools(&[], false), "No tools available.\n");
    }
}
