//! Size limits for client tool output before it enters the history.

use serde_json::Value;

use crate::RunConfig;
use crate::tools::ToolName;

const FALLBACK_MAX_CHARS: usize = 20_000;

/// Which part of an oversized output survives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TruncationMode {
    /// Keep the start and the end, drop the middle.
    HeadTail,
    /// Keep only the end. Used for logs and search hits where the latest
    /// lines matter most.
    Tail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputLimit {
    pub max_chars: usize,
    pub max_lines: Option<usize>,
    pub mode: TruncationMode,
}

impl OutputLimit {
    pub fn for_tool(tool_name: &str, config: &RunConfig) -> Self {
        let mode = match ToolName::parse(tool_name) {
            Some(ToolName::CodeSearch | ToolName::BrowserLogs) => TruncationMode::Tail,
            _ => TruncationMode::HeadTail,
        };
        Self {
            max_chars: config
                .tool_output_limits
                .get(tool_name)
                .copied()
                .unwrap_or(FALLBACK_MAX_CHARS),
            max_lines: config.tool_line_limits.get(tool_name).copied(),
            mode,
        }
    }

    pub fn apply(&self, text: &str) -> String {
        let limited = truncate_chars(text, self.max_chars, self.mode);
        match self.max_lines {
            Some(max_lines) => truncate_lines(&limited, max_lines),
            None => limited,
        }
    }
}

pub fn truncate_tool_output(output: &str, tool_name: &str, config: &RunConfig) -> String {
    OutputLimit::for_tool(tool_name, config).apply(output)
}

/// Truncates every string leaf of a JSON tool output. Numbers, booleans and
/// the shape of the value are kept.
pub fn truncate_tool_value(value: Value, tool_name: &str, config: &RunConfig) -> Value {
    let limit = OutputLimit::for_tool(tool_name, config);
    limit_strings(value, &limit)
}

fn limit_strings(value: Value, limit: &OutputLimit) -> Value {
    match value {
        Value::String(text) => Value::String(limit.apply(&text)),
        Value::Array(items) => items
            .into_iter()
            .map(|item| limit_strings(item, limit))
            .collect(),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, field)| (key, limit_strings(field, limit)))
                .collect(),
        ),
        scalar => scalar,
    }
}

pub fn truncate_chars(text: &str, max_chars: usize, mode: TruncationMode) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    let dropped = chars.len() - max_chars;

    match mode {
        TruncationMode::HeadTail => {
            let keep_head = max_chars / 2;
            let keep_tail = max_chars - keep_head;
            let head: String = chars[..keep_head].iter().collect();
            let tail: String = chars[chars.len() - keep_tail..].iter().collect();
            format!("{head}\n\n[output truncated: {dropped} characters omitted from the middle]\n\n{tail}")
        }
        TruncationMode::Tail => {
            let tail: String = chars[dropped..].iter().collect();
            format!("[output truncated: first {dropped} characters omitted]\n\n{tail}")
        }
    }
}

pub fn truncate_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.to_string();
    }
    let keep_head = max_lines / 2;
    let keep_tail = max_lines - keep_head;
    let skipped = lines.len() - max_lines;

    let mut kept = lines[..keep_head].to_vec();
    let marker = format!("[... {skipped} lines omitted ...]");
    kept.push(&marker);
    kept.extend_from_slice(&lines[lines.len() - keep_tail..]);
    kept.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn head_tail_keeps_both_ends_of_long_output() {
        let output = truncate_chars("abcdefghij", 6, TruncationMode::HeadTail);
        assert!(output.starts_with("abc"));
        assert!(output.ends_with("hij"));
        assert!(output.contains("4 characters omitted"));
    }

    #[test]
    fn tail_mode_keeps_the_latest_characters() {
        let output = truncate_chars("0123456789", 3, TruncationMode::Tail);
        assert!(output.starts_with("[output truncated: first 7 characters omitted]"));
        assert!(output.ends_with("789"));
    }

    #[test]
    fn line_limit_marks_the_gap() {
        let output = truncate_lines("1\n2\n3\n4\n5\n6", 4);
        assert_eq!(output, "1\n2\n[... 2 lines omitted ...]\n5\n6");
    }

    #[test]
    fn search_tools_truncate_from_the_front() {
        let config = RunConfig::default();
        assert_eq!(
            OutputLimit::for_tool("code_search", &config).mode,
            TruncationMode::Tail
        );
        assert_eq!(
            OutputLimit::for_tool("run_terminal_command", &config).max_lines,
            Some(256)
        );
        assert_eq!(
            OutputLimit::for_tool("read_files", &config).max_lines,
            None
        );
    }

    #[test]
    fn json_outputs_truncate_string_leaves_only() {
        let mut config = RunConfig::default();
        config
            .tool_output_limits
            .insert("run_terminal_command".to_string(), 4);
        let value = json!({
            "stdout": "0123456789",
            "exitCode": 0,
            "lines": ["ab", "abcdefgh"]
        });

        let truncated = truncate_tool_value(value, "run_terminal_command", &config);
        assert_eq!(truncated["exitCode"], json!(0));
        assert_eq!(truncated["lines"][0], json!("ab"));
        let stdout = truncated["stdout"].as_str().expect("stdout string");
        assert!(stdout.starts_with("01"));
        assert!(stdout.ends_with("89"));
    }
}
