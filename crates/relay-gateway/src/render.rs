//! Terminal rendering of relay events

use nu_ansi_term::Color;
use serde_json::Value;

/// Longest JSON preview shown for tools without a dedicated summary
const INPUT_PREVIEW_CHARS: usize = 80;

/// Turns relay events into colored terminal output.
///
/// One renderer lives for one chat turn; it remembers the last text block
/// so a block repeated by the agent is printed once.
#[derive(Debug, Default)]
pub struct Renderer {
    resuming: bool,
    last_text: Option<String>,
}

impl Renderer {
    pub fn new(resuming: bool) -> Self {
        Self {
            resuming,
            last_text: None,
        }
    }

    /// Render one event; `None` when nothing should be printed
    pub fn render(&mut self, event: &Value) -> Option<String> {
        let data = event.get("data").unwrap_or(&Value::Null);
        match event.get("type").and_then(Value::as_str)? {
            "system" if data.get("subtype").and_then(Value::as_str) == Some("init") => {
                Some(self.render_init(data))
            }
            "assistant" => self.render_assistant(data),
            "tool_progress" => Some(render_progress(data)),
            "result" => Some(render_result(data)),
            "error" => {
                let message = event.get("error").and_then(Value::as_str).unwrap_or("unknown error");
                Some(format!("\n❌ {} {}", Color::Red.paint("Error:"), message))
            }
            _ => None,
        }
    }

    fn render_init(&self, data: &Value) -> String {
        let model = data.get("model").and_then(Value::as_str).unwrap_or("unknown");
        let tools = data.get("tools").and_then(Value::as_array).map_or(0, Vec::len);
        let resume = if self.resuming { " (resuming)" } else { "" };
        format!(
            "\n🤖 {} ({}){}\n   Tools: {} available",
            Color::Cyan.paint("Initialized"),
            model,
            resume,
            tools
        )
    }

    fn render_assistant(&mut self, data: &Value) -> Option<String> {
        let blocks = data.pointer("/message/content").and_then(Value::as_array)?;

        let mut out = Vec::new();
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    let Some(text) = block.get("text").and_then(Value::as_str) else {
                        continue;
                    };
                    if text.is_empty() || self.last_text.as_deref() == Some(text) {
                        continue;
                    }
                    out.push(format!("\n📝 {}", Color::White.paint(text)));
                    self.last_text = Some(text.to_string());
                }
                Some("tool_use") => {
                    let name = block.get("name").and_then(Value::as_str).unwrap_or("tool");
                    out.push(format!("\n🔧 {} {}", Color::Yellow.paint("Tool:"), name));
                    if let Some(summary) = block.get("input").and_then(|input| summarize_tool_input(name, input)) {
                        out.push(format!("   {}", Color::DarkGray.paint(summary)));
                    }
                }
                Some("thinking") => {
                    out.push(format!("\n💭 {}", Color::DarkGray.paint("Thinking...")));
                }
                _ => {}
            }
        }

        if out.is_empty() { None } else { Some(out.join("\n")) }
    }
}

fn render_progress(data: &Value) -> String {
    let tool = data.get("tool_name").and_then(Value::as_str).unwrap_or("Working");
    let elapsed = data
        .get("elapsed_time_seconds")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    format!("\r   ⏳ {}... ({}s)", tool, elapsed.round() as u64)
}

fn render_result(data: &Value) -> String {
    let cost = data.get("total_cost_usd").and_then(Value::as_f64).unwrap_or(0.0);
    let duration_ms = data.get("duration_ms").and_then(Value::as_f64).unwrap_or(0.0);
    let status = if data.get("is_error").and_then(Value::as_bool).unwrap_or(false) {
        "❌ Error"
    } else {
        "✅ Done"
    };
    format!(
        "\n{} {}\n",
        status,
        Color::DarkGray.paint(format!("({:.1}s, ${:.4})", duration_ms / 1000.0, cost))
    )
}

/// Short human summary of a tool invocation's input
pub fn summarize_tool_input(tool: &str, input: &Value) -> Option<String> {
    if input.is_null() {
        return None;
    }
    let field = |name: &str| input.get(name).and_then(Value::as_str).unwrap_or("");

    let summary = match tool {
        "Bash" => format!("$ {}", field("command")),
        "Read" | "Edit" => field("file_path").to_string(),
        "Write" => format!(
            "{} ({} chars)",
            field("file_path"),
            field("content").chars().count()
        ),
        "Glob" => field("pattern").to_string(),
        "Grep" => format!("/{}/", field("pattern")),
        "WebSearch" => format!("\"{}\"", field("query")),
        "WebFetch" => field("url").to_string(),
        _ => {
            let json = input.to_string();
            let preview: String = json.chars().take(INPUT_PREVIEW_CHARS).collect();
            format!("{}...", preview)
        }
    };
    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assistant(blocks: Value) -> Value {
        json!({"type": "assistant", "sessionId": "s", "data": {"message": {"content": blocks}}})
    }

    #[test]
    fn test_init_banner() {
        let event = json!({
            "type": "system",
            "sessionId": "s",
            "data": {"subtype": "init", "model": "sonnet", "tools": ["Bash", "Read"]}
        });
        let out = Renderer::new(true).render(&event).unwrap();
        assert!(out.contains("sonnet"));
        assert!(out.contains("(resuming)"));
        assert!(out.contains("Tools: 2 available"));

        let out = Renderer::new(false).render(&event).unwrap();
        assert!(!out.contains("resuming"));
    }

    #[test]
    fn test_repeated_text_block_printed_once() {
        let mut renderer = Renderer::default();
        let event = assistant(json!([{"type": "text", "text": "hello"}]));
        assert!(renderer.render(&event).unwrap().contains("hello"));
        assert!(renderer.render(&event).is_none());

        let other = assistant(json!([{"type": "text", "text": "world"}]));
        assert!(renderer.render(&other).is_some());
        assert!(renderer.render(&event).is_some());
    }

    #[test]
    fn test_tool_use_and_thinking_blocks() {
        let mut renderer = Renderer::default();
        let out = renderer
            .render(&assistant(json!([
                {"type": "thinking", "thinking": "..."},
                {"type": "tool_use", "name": "Bash", "input": {"command": "ls -la"}},
            ])))
            .unwrap();
        assert!(out.contains("Thinking..."));
        assert!(out.contains("Bash"));
        assert!(out.contains("$ ls -la"));
    }

    #[test]
    fn test_progress_result_and_error() {
        let mut renderer = Renderer::default();
        let progress = renderer
            .render(&json!({"type": "tool_progress", "data": {"tool_name": "Grep", "elapsed_time_seconds": 2.6}}))
            .unwrap();
        assert!(progress.contains("Grep... (3s)"));

        let result = renderer
            .render(&json!({"type": "result", "data": {"duration_ms": 1500, "total_cost_usd": 0.01234, "is_error": false}}))
            .unwrap();
        assert!(result.contains("✅ Done"));
        assert!(result.contains("1.5s"));
        assert!(result.contains("$0.0123"));

        let error = renderer
            .render(&json!({"type": "error", "sessionId": "s", "error": "agent crashed"}))
            .unwrap();
        assert!(error.contains("agent crashed"));

        assert!(renderer.render(&json!({"type": "done", "sessionId": "s"})).is_none());
        assert!(renderer.render(&json!({"type": "user", "data": {}})).is_none());
    }

    #[test]
    fn test_summarize_tool_input() {
        assert_eq!(
            summarize_tool_input("Read", &json!({"file_path": "/etc/hosts"})).as_deref(),
            Some("/etc/hosts")
        );
        assert_eq!(
            summarize_tool_input("Write", &json!({"file_path": "a.txt", "content": "héllo"})).as_deref(),
            Some("a.txt (5 chars)")
        );
        assert_eq!(
            summarize_tool_input("Grep", &json!({"pattern": "fn main"})).as_deref(),
            Some("/fn main/")
        );
        assert_eq!(
            summarize_tool_input("WebSearch", &json!({"query": "rust"})).as_deref(),
            Some("\"rust\"")
        );
        assert!(summarize_tool_input("Bash", &Value::Null).is_none());

        let long = json!({"payload": "x".repeat(200)});
        let summary = summarize_tool_input("Custom", &long).unwrap();
        assert_eq!(summary.chars().count(), INPUT_PREVIEW_CHARS + 3);
    }
}
