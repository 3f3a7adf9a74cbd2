//! Tool-call recovery and name normalization properties.

use agent_turn::recovery::splitter::split_top_level;
use agent_turn::recovery::ToolCallRecoverer;
use agent_turn::tools::{NameNormalizer, ToolName};
use agent_turn::types::ToolCallOrigin;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use strum::IntoEnumIterator;

fn arguments(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap()
}

#[test]
fn single_embedded_call_is_recovered_exactly() {
    let content = r#"Let me look at that file. {"name":"read_file","arguments":{"path":"src/lib.rs"}} Then I'll continue."#;
    let recoverer = ToolCallRecoverer::new();

    assert!(recoverer.looks_like_tool_invocation(content));
    let calls = recoverer.recover(content);

    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "read_file");
    assert_eq!(arguments(&calls[0].raw_arguments), json!({"path": "src/lib.rs"}));
}

#[test]
fn fenced_call_with_string_arguments_is_decoded() {
    let content = "```json\n{\"name\":\"shell\",\"arguments\":\"{\\\"cmd\\\":[\\\"ls\\\"]}\"}\n```";
    let calls = ToolCallRecoverer::new().recover(content);

    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "shell");
    assert_eq!(calls[0].origin, ToolCallOrigin::FencedBlock);
    assert_eq!(arguments(&calls[0].raw_arguments), json!({"cmd": ["ls"]}));
}

#[test]
fn concatenated_objects_split_contiguously() {
    let parts = [r#"{"a":1}"#, r#"{"b":"}{"}"#, r#"{"c":[1,{"d":2}]}"#, r#"[3,4]"#];
    let input = parts.concat();

    let outcome = split_top_level(&input);

    assert_eq!(outcome.candidates.len(), parts.len());
    assert!(outcome.incomplete.is_none());
    let mut cursor = 0;
    for (candidate, expected) in outcome.candidates.iter().zip(parts) {
        assert_eq!(candidate.start, cursor);
        assert_eq!(candidate.text, expected);
        serde_json::from_str::<Value>(candidate.text).unwrap();
        cursor = candidate.end;
    }
    assert_eq!(cursor, input.len());
}

#[test]
fn several_concatenated_calls_become_several_tool_calls() {
    let content = r#"{"name":"read_file","arguments":{"path":"a"}}{"name":"read_file","arguments":{"path":"b"}}"#;
    let calls = ToolCallRecoverer::new().recover(content);

    let paths: Vec<_> = calls
        .iter()
        .map(|call| arguments(&call.raw_arguments)["path"].clone())
        .collect();
    assert_eq!(paths, vec![json!("a"), json!("b")]);
}

#[test]
fn patch_envelope_in_prose_becomes_apply_patch() {
    let content = "Here is the fix:\n*** Begin Patch\n*** Update File: src/main.rs\n@@\n-old\n+new\n*** End Patch\n";
    let calls = ToolCallRecoverer::new().recover(content);

    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "shell");
    assert_eq!(calls[0].origin, ToolCallOrigin::PatchFallback);
    let cmd = arguments(&calls[0].raw_arguments)["cmd"].clone();
    assert_eq!(cmd[0], "apply_patch");
    assert!(cmd[1].as_str().unwrap().starts_with("*** Begin Patch"));
}

#[test]
fn plain_prose_recovers_nothing() {
    let recoverer = ToolCallRecoverer::new();
    let content = "The build passes now. Nothing else to do.";
    assert!(!recoverer.looks_like_tool_invocation(content));
    assert!(recoverer.recover(content).is_empty());
}

#[test]
fn normalizing_canonical_names_is_a_no_op() {
    let normalizer = NameNormalizer::new();
    for tool in ToolName::iter() {
        let name = tool.as_str();
        assert_eq!(normalizer.normalize(name), name);
        assert_eq!(normalizer.normalize(&normalizer.normalize(name)), name);
    }
}

#[test]
fn provider_decorations_are_stripped() {
    let normalizer = NameNormalizer::new();
    assert_eq!(normalizer.normalize("functions.read_file"), "read_file");
    assert_eq!(normalizer.normalize("`shell`<|channel|>commentary"), "shell");
    assert_eq!(normalizer.resolve("container.exec"), Some(ToolName::Shell));
}
