//! CLI for replaying recorded sessions through the turn loop.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use futures::FutureExt;

use crate::agent_loop::{
    ApprovalHandler, ApprovalRequest, CommandConfirmation, HostEvent, HostEventSink, TurnLoop, TurnLoopOptions,
    TurnStatus,
};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::provider::{ReplayFormat, ReplayProvider};
use crate::tools::builtin::default_registry;
use crate::types::{Message, Role};
use crate::util::text::snippet;

const RESULT_PREVIEW_CHARS: usize = 200;
const MISSING_PATCH_EXECUTOR: &str = "Unknown tool `apply_patch`";
const PATCH_EXECUTOR_HINT: &str =
    "  hint: replay ships no patch executor; register an `apply_patch` handler to apply patches";

/// agent-turn CLI
#[derive(Parser, Debug)]
#[command(name = "agent-turn", version, about = "Drive the agent turn loop from recorded model output")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a recorded provider stream through the turn loop
    Replay(ReplayArgs),
}

/// Arguments for `agent-turn replay`.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Recorded stream (JSONL, rounds separated by blank lines)
    pub file: PathBuf,

    /// Config file (defaults to the platform config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Describe side effects instead of performing them
    #[arg(long)]
    pub dry_run: bool,

    /// User message that starts the turn
    #[arg(short, long, default_value = "Continue.")]
    pub prompt: String,

    /// Wire format of the recording
    #[arg(long, value_enum, default_value_t = RecordingFormat::Chat)]
    pub format: RecordingFormat,

    /// Approve every command without asking
    #[arg(long)]
    pub approve: bool,

    /// Print host events as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordingFormat {
    /// OpenAI-style chat-completion deltas
    Chat,
    /// Candidates/parts events
    Parts,
}

impl From<RecordingFormat> for ReplayFormat {
    fn from(format: RecordingFormat) -> Self {
        match format {
            RecordingFormat::Chat => ReplayFormat::ChatCompletions,
            RecordingFormat::Parts => ReplayFormat::Parts,
        }
    }
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Run one turn against the recording and print what the host would see.
pub async fn run_replay(args: ReplayArgs) -> Result<TurnStatus> {
    let mut config = AgentConfig::load(args.config.as_deref())?;
    if args.dry_run {
        config.dry_run = true;
    }
    let provider = ReplayProvider::from_file(&args.file, args.format.into())?;

    let json = args.json;
    let sink: HostEventSink = Arc::new(move |event| render(&event, json));
    let approval: Option<ApprovalHandler> = args.approve.then(|| {
        let handler: ApprovalHandler = Arc::new(|_request: ApprovalRequest| async { CommandConfirmation::approved() }.boxed());
        handler
    });

    let turn_loop = Arc::new(TurnLoop::new(
        TurnLoopOptions::builder()
            .provider(Arc::new(provider))
            .registry(default_registry())
            .config(config)
            .event_sink(sink)
            .maybe_approval_handler(approval)
            .build(),
    ));

    let interrupt = {
        let turn_loop = turn_loop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                turn_loop.cancel();
            }
        })
    };
    let outcome = turn_loop.run(args.prompt).await;
    interrupt.abort();

    let outcome = outcome?;
    tracing::info!(status = %outcome.status, rounds = outcome.rounds, "replay finished");
    Ok(outcome.status)
}

fn render(event: &HostEvent, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }

    match event {
        HostEvent::Item { message } => render_message(message),
        HostEvent::PartialUpdate { .. } => {}
        HostEvent::Loading { active } => {
            if *active {
                eprintln!("...");
            }
        }
        HostEvent::Reset => eprintln!("(context reset)"),
        HostEvent::FileAccess { path } => eprintln!("  touched {}", path.display()),
    }
    let _ = std::io::stdout().flush();
}

fn render_message(message: &Message) {
    match message.role {
        Role::Assistant => {
            let text = message.text();
            if !text.is_empty() {
                println!("{text}");
            }
            for call in &message.tool_calls {
                eprintln!("> {} {}", call.name, call.raw_arguments);
            }
        }
        Role::Tool => {
            if let Some(result) = message.as_tool_result() {
                let marker = if result.is_success() { "ok" } else { "failed" };
                eprintln!(
                    "  [{marker}] {}",
                    snippet(result.output_text.trim(), RESULT_PREVIEW_CHARS)
                );
                if let Some(hint) = unhandled_tool_hint(&result.output_text) {
                    eprintln!("{hint}");
                }
            }
        }
        Role::User => eprintln!("you: {}", message.text()),
        Role::System => {}
    }
}

fn unhandled_tool_hint(output: &str) -> Option<&'static str> {
    output
        .starts_with(MISSING_PATCH_EXECUTOR)
        .then_some(PATCH_EXECUTOR_HINT)
}
