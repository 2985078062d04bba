//! Markdown to HTML conversion tool.

use proto::ToolResult;
use pulldown_cmark::{Parser, html};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{Tool, string_arg};

/// Tool that renders Markdown text as HTML.
pub struct MarkdownTool;

impl Tool for MarkdownTool {
    fn name(&self) -> &str {
        "format_markdown_to_html"
    }

    fn description(&self) -> &str {
        "Convert markdown text into HTML."
    }

    fn parameters(&self) -> Vec<(&'static str, &'static str)> {
        vec![("text", "string - markdown content")]
    }

    fn execute(&self, args: &Map<String, Value>) -> ToolResult {
        let text = string_arg(args, "text").unwrap_or_default();
        debug!(chars = text.len(), "Rendering markdown");
        ToolResult::success(self.name(), render_html(&text))
    }
}

/// Renders CommonMark `text` to an HTML fragment.
pub fn render_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, Parser::new(text));
    out
}
