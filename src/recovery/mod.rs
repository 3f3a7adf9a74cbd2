//! Recovery of tool calls that a model wrote as plain text.
//!
//! Some models describe tool calls in their message content instead of
//! using structured tool calls. The recoverer tries, in order and stopping
//! at the first that yields calls: the whole message as one JSON call, fenced
//! `json`/`bash` blocks, then concatenated top-level JSON values. Literal
//! patch envelopes not already covered by an earlier step always become
//! `apply_patch` calls.

pub mod fences;
pub mod patch;
pub mod splitter;

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::tools::names::{NameNormalizer, ToolName};
use crate::tools::validation::{decode_arguments, validate};
use crate::types::{ToolCall, ToolCallOrigin};
use fences::{tagged_fences, FenceKind};
use patch::{patch_blocks, BEGIN_MARKER};

static CALL_SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:name|tool|tool_name|function|tool_calls)"\s*:"#)
        .expect("call shape regex must compile")
});

const NAME_KEYS: &[&str] = &["name", "tool", "tool_name", "function"];
const ARGUMENT_KEYS: &[&str] = &["arguments", "args", "parameters", "input"];

#[derive(Debug, Clone, Default)]
pub struct ToolCallRecoverer {
    normalizer: NameNormalizer,
}

impl ToolCallRecoverer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_normalizer(normalizer: NameNormalizer) -> Self {
        Self { normalizer }
    }

    /// Cheap check for whether `content` might hold a textual tool call.
    pub fn looks_like_tool_invocation(&self, content: &str) -> bool {
        if content.trim().is_empty() {
            return false;
        }
        content.contains(BEGIN_MARKER)
            || fences::has_tagged_fence(content)
            || (content.contains('{') && CALL_SHAPE_RE.is_match(content))
    }

    /// Extract validated tool calls from message content.
    pub fn recover(&self, content: &str) -> Vec<ToolCall> {
        let mut captured: Vec<Range<usize>> = Vec::new();
        let mut calls = self.direct(content);
        if !calls.is_empty() {
            captured.push(0..content.len());
        } else {
            let (found, ranges) = self.from_fences(content);
            if found.is_empty() {
                let (found, ranges) = self.from_splitter(content);
                calls = found;
                captured = ranges;
            } else {
                calls = found;
                captured = ranges;
            }
        }

        for block in patch_blocks(content) {
            let overlaps = captured
                .iter()
                .any(|range| range.start < block.end && block.start < range.end);
            if overlaps {
                continue;
            }
            let arguments = json!({ "cmd": ["apply_patch", block.text] });
            if let Some(call) = self.build_call(ToolCallOrigin::PatchFallback, "shell", Some(arguments)) {
                calls.push(call);
            }
        }

        if !calls.is_empty() {
            tracing::debug!(
                count = calls.len(),
                origin = ?calls[0].origin,
                "recovered tool calls from message content"
            );
        }
        calls
    }

    fn direct(&self, content: &str) -> Vec<ToolCall> {
        match serde_json::from_str::<Value>(content.trim()) {
            Ok(value @ Value::Object(_)) => self.calls_from_value(value, ToolCallOrigin::DirectJson),
            _ => Vec::new(),
        }
    }

    fn from_fences(&self, content: &str) -> (Vec<ToolCall>, Vec<Range<usize>>) {
        let mut calls = Vec::new();
        let mut ranges = Vec::new();
        for fence in tagged_fences(content) {
            let found = match fence.kind {
                FenceKind::Json => match serde_json::from_str::<Value>(fence.body.trim()) {
                    Ok(value @ (Value::Object(_) | Value::Array(_))) => {
                        self.calls_from_value(value, ToolCallOrigin::FencedBlock)
                    }
                    _ => splitter::parse_values(fence.body)
                        .into_iter()
                        .flat_map(|(_, value)| self.calls_from_value(value, ToolCallOrigin::FencedBlock))
                        .collect(),
                },
                FenceKind::Shell => {
                    let script = fence.body.trim();
                    if script.is_empty() {
                        Vec::new()
                    } else {
                        let arguments = json!({ "cmd": ["bash", "-lc", script] });
                        self.build_call(ToolCallOrigin::FencedBlock, "shell", Some(arguments))
                            .into_iter()
                            .collect()
                    }
                }
            };
            if !found.is_empty() {
                ranges.push(fence.start..fence.end);
                calls.extend(found);
            }
        }
        (calls, ranges)
    }

    fn from_splitter(&self, content: &str) -> (Vec<ToolCall>, Vec<Range<usize>>) {
        let mut calls = Vec::new();
        let mut ranges = Vec::new();
        for (candidate, value) in splitter::parse_values(content) {
            let found = self.calls_from_value(value, ToolCallOrigin::Splitter);
            if !found.is_empty() {
                ranges.push(candidate.start..candidate.end);
                calls.extend(found);
            }
        }
        (calls, ranges)
    }

    fn calls_from_value(&self, value: Value, origin: ToolCallOrigin) -> Vec<ToolCall> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .flat_map(|item| self.calls_from_value(item, origin))
                .collect(),
            Value::Object(mut map) => {
                if let Some(Value::Array(nested)) = map.remove("tool_calls") {
                    return self.calls_from_value(Value::Array(nested), origin);
                }
                if let Some(Value::Object(mut function)) = map.remove("function") {
                    let name = function.remove("name");
                    let arguments = take_first(&mut function, ARGUMENT_KEYS)
                        .or_else(|| take_first(&mut map, ARGUMENT_KEYS));
                    return match name {
                        Some(Value::String(name)) => self.build_call(origin, &name, arguments).into_iter().collect(),
                        _ => Vec::new(),
                    };
                }
                let Some(Value::String(name)) = take_first(&mut map, NAME_KEYS) else {
                    return Vec::new();
                };
                let arguments = take_first(&mut map, ARGUMENT_KEYS);
                self.build_call(origin, &name, arguments).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Normalize and validate one candidate. Unknown tools and invalid
    /// arguments yield nothing.
    fn build_call(&self, origin: ToolCallOrigin, raw_name: &str, arguments: Option<Value>) -> Option<ToolCall> {
        let tool = self.normalizer.resolve(raw_name)?;
        let canonical = tool.as_str();
        let raw = match arguments {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };

        match validate(canonical, &raw) {
            Ok(_) => {
                let mut values = decode_arguments(canonical, &raw).ok()?;
                let value = if values.len() == 1 {
                    values.pop()?
                } else {
                    Value::Array(values)
                };
                Some(ToolCall::recovered(origin, canonical, value))
            }
            Err(err) if matches!(tool, ToolName::Shell) && serde_json::from_str::<Value>(&raw).is_err() => {
                let wrapped = json!({ "command": raw });
                match validate(canonical, &wrapped.to_string()) {
                    Ok(_) => Some(ToolCall::recovered(origin, canonical, wrapped)),
                    Err(_) => {
                        tracing::debug!(tool = canonical, error = %err, "dropping recovered candidate");
                        None
                    }
                }
            }
            Err(err) => {
                tracing::debug!(tool = canonical, error = %err, "dropping recovered candidate");
                None
            }
        }
    }
}

fn take_first(map: &mut serde_json::Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|key| map.remove(*key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recover(content: &str) -> Vec<ToolCall> {
        ToolCallRecoverer::new().recover(content)
    }

    #[test]
    fn direct_json_with_object_arguments() {
        let calls = recover(r#"{"name":"read_file","arguments":{"path":"src/main.rs"}}"#);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].origin, ToolCallOrigin::DirectJson);
        assert!(calls[0].id.starts_with("call_direct_"));
    }

    #[test]
    fn fenced_json_with_string_arguments_decodes_them() {
        let content = "```json\n{\"name\":\"shell\",\"arguments\":\"{\\\"cmd\\\":[\\\"ls\\\"]}\"}\n```";
        let calls = recover(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "shell");
        assert_eq!(calls[0].raw_arguments, r#"{"cmd":["ls"]}"#);
        assert_eq!(calls[0].origin, ToolCallOrigin::FencedBlock);
    }

    #[test]
    fn aliases_are_normalized() {
        let calls = recover(r#"{"name":"repo_browser.ls","arguments":{"path":"."}}"#);
        assert_eq!(calls[0].name, "list_directory");
    }

    #[test]
    fn bash_fence_becomes_shell_call() {
        let calls = recover("Let me look:\n```bash\nls -la src\n```");
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].parsed_arguments,
            Some(json!({"cmd": ["bash", "-lc", "ls -la src"]}))
        );
    }

    #[test]
    fn concatenated_objects_are_split() {
        let content = r#"{"name":"read_file","arguments":{"path":"a"}} {"name":"read_file","arguments":{"path":"b"}}"#;
        let calls = recover(content);
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.origin == ToolCallOrigin::Splitter));
    }

    #[test]
    fn function_and_tool_calls_wrappers_are_understood() {
        let calls = recover(
            r#"{"tool_calls":[{"function":{"name":"shell","arguments":"{\"cmd\":[\"pwd\"]}"}}]}"#,
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].raw_arguments, r#"{"cmd":["pwd"]}"#);
    }

    #[test]
    fn invalid_candidates_are_dropped() {
        assert!(recover(r#"{"name":"read_file","arguments":{}}"#).is_empty());
        assert!(recover(r#"{"name":"Alice","arguments":{"age":3}}"#).is_empty());
    }

    #[test]
    fn literal_patch_becomes_apply_patch_call() {
        let content = "I'll fix it.\n*** Begin Patch\n*** Add File: a.txt\n+hi\n*** End Patch\n";
        let calls = recover(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].origin, ToolCallOrigin::PatchFallback);
        let argv = calls[0].parsed_arguments.as_ref().unwrap()["cmd"].clone();
        assert_eq!(argv[0], "apply_patch");
        assert!(argv[1].as_str().unwrap().starts_with("*** Begin Patch"));
    }

    #[test]
    fn patch_inside_captured_call_is_not_duplicated() {
        let call = json!({
            "name": "apply_patch",
            "arguments": {"patch": "*** Begin Patch\n*** Add File: a.txt\n+hi\n*** End Patch"}
        });
        let calls = recover(&call.to_string());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].origin, ToolCallOrigin::DirectJson);
    }

    #[test]
    fn patch_fallback_runs_after_an_earlier_success() {
        let content = "```bash\nls\n```\n*** Begin Patch\n*** Add File: b.txt\n+x\n*** End Patch";
        let origins: Vec<_> = recover(content).into_iter().map(|c| c.origin).collect();
        assert_eq!(origins, vec![ToolCallOrigin::FencedBlock, ToolCallOrigin::PatchFallback]);
    }

    #[test]
    fn plain_prose_yields_nothing() {
        let recoverer = ToolCallRecoverer::new();
        let content = "The answer is 42. Use a map {like this} if you want.";
        assert!(!recoverer.looks_like_tool_invocation(content));
        assert!(recoverer.recover(content).is_empty());
    }

    #[test]
    fn detects_likely_invocations() {
        let recoverer = ToolCallRecoverer::new();
        assert!(recoverer.looks_like_tool_invocation(r#"{"name": "shell"}"#));
        assert!(recoverer.looks_like_tool_invocation("```sh\nls\n```"));
        assert!(recoverer.looks_like_tool_invocation("*** Begin Patch"));
        assert!(!recoverer.looks_like_tool_invocation("   "));
    }
}
