//! Recorded provider streams replayed through the turn loop.

use std::sync::Arc;

use agent_turn::agent_loop::{TurnLoop, TurnLoopOptions, TurnStatus};
use agent_turn::config::AgentConfig;
use agent_turn::provider::{ReplayFormat, ReplayProvider};
use agent_turn::tools::builtin::default_registry;
use agent_turn::types::Role;
use pretty_assertions::assert_eq;

const CHAT_RECORDING: &str = r#"data: {"choices":[{"delta":{"role":"assistant","tool_calls":[{"index":0,"id":"call_w","function":{"name":"write_file","arguments":"{\"path\":\"out.txt\","}}]}}]}
data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"content\":\"hello\"}"}}]}}]}
data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}
data: [DONE]

data: {"choices":[{"delta":{"content":"Wrote out.txt."},"finish_reason":"stop"}]}
data: [DONE]
"#;

const PARTS_RECORDING: &str = r#"{"candidates":[{"content":{"parts":[{"text":"checking","thought":true},{"functionCall":{"name":"list_directory","args":{"path":"."}}}]},"finishReason":"STOP"}]}

{"candidates":[{"content":{"parts":[{"text":"One file: seed.txt"}]},"finishReason":"STOP"}]}
"#;

fn config(cwd: &std::path::Path) -> AgentConfig {
    AgentConfig {
        cwd: Some(cwd.to_path_buf()),
        ..AgentConfig::default()
    }
}

#[tokio::test]
async fn chat_completions_recording_writes_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ReplayProvider::from_jsonl(CHAT_RECORDING, ReplayFormat::ChatCompletions).unwrap());
    let turn_loop = TurnLoop::new(
        TurnLoopOptions::builder()
            .provider(provider.clone())
            .registry(default_registry())
            .config(config(dir.path()))
            .build(),
    );

    let outcome = turn_loop.run("write hello to out.txt").await.unwrap();

    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hello");
    let call = &outcome.messages[1].tool_calls[0];
    assert_eq!(call.id, "call_w");
    assert_eq!(call.raw_arguments, r#"{"path":"out.txt","content":"hello"}"#);
    assert_eq!(outcome.final_text().as_deref(), Some("Wrote out.txt."));
    assert_eq!(provider.remaining_rounds(), 0);
}

#[tokio::test]
async fn parts_recording_lists_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("seed.txt"), "").unwrap();
    let provider = ReplayProvider::from_jsonl(PARTS_RECORDING, ReplayFormat::Parts).unwrap();
    let turn_loop = TurnLoop::new(
        TurnLoopOptions::builder()
            .provider(Arc::new(provider))
            .registry(default_registry())
            .config(config(dir.path()))
            .build(),
    );

    let outcome = turn_loop.run("what is here?").await.unwrap();

    let assistant = &outcome.messages[1];
    assert_eq!(assistant.reasoning().as_deref(), Some("checking"));
    assert_eq!(assistant.tool_calls[0].name, "list_directory");
    let listing = outcome.messages[2].as_tool_result().unwrap();
    assert_eq!(listing.tool_call_id, assistant.tool_calls[0].id);
    assert!(listing.output_text.contains("seed.txt"));
    let roles: Vec<_> = outcome.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
}
