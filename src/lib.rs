//! agent-turn: the turn-orchestration core of a terminal coding agent.
//!
//! A [`TurnLoop`](agent_loop::TurnLoop) sends the conversation to a model
//! provider, reassembles the streamed reply, recovers tool calls the model
//! wrote as plain text, dispatches every call concurrently, and feeds the
//! results back until the model answers without calling a tool. Provider
//! failures are retried or turned into a notice; a host can cancel a turn at
//! any point without leaving a tool call unanswered.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use agent_turn::prelude::*;
//! use agent_turn::provider::{ReplayFormat, ReplayProvider};
//! use agent_turn::tools::builtin::default_registry;
//!
//! # async fn example() -> agent_turn::error::Result<()> {
//! let provider = ReplayProvider::from_file("session.jsonl".as_ref(), ReplayFormat::ChatCompletions)?;
//! let turn_loop = TurnLoop::new(
//!     TurnLoopOptions::builder()
//!         .provider(Arc::new(provider))
//!         .registry(default_registry())
//!         .config(AgentConfig::load(None)?)
//!         .build(),
//! );
//! let outcome = turn_loop.run("list the files in src").await?;
//! println!("{}", outcome.final_text().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod recovery;
pub mod stream;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
