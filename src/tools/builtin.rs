//! Reference handlers for the local filesystem and shell.
//!
//! `read_file`, `write_file`, `delete_file`, `list_directory` and `shell`.
//! Mutating handlers honor dry run, and `shell` asks the host for
//! confirmation before running anything.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::arguments::{CommandArgs, ToolArgs};
use super::handler::{ExecutionContext, FnHandler, HandlerRegistry, ToolHandler, ToolInvocation, ToolOutput};
use super::types::ToolParameters;
use crate::error::AgentError;
use crate::types::ABORTED_OUTPUT;
use crate::util::text::truncate_utf8;

const SHELL_OUTPUT_MAX_BYTES: usize = 32_768;
const READ_FILE_MAX_BYTES: usize = 65_536;
const LIST_MAX_ENTRIES: usize = 1_000;
const SHELL_TIMEOUT: Duration = Duration::from_secs(30);

fn unexpected_args(invocation: &ToolInvocation) -> AgentError {
    AgentError::tool(&invocation.tool, "handler received arguments of the wrong shape")
}

fn with_truncation_note(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut out = truncate_utf8(text, max_bytes);
    out.push_str("\n... (truncated)");
    out
}

/// `shell`: run an argv with a timeout, after host confirmation.
pub fn shell_handler() -> Arc<dyn ToolHandler> {
    Arc::new(FnHandler::new(
        "shell",
        "Run a command. `command` is an argv array; use [\"bash\", \"-lc\", \"...\"] for pipelines.",
        ToolParameters::object()
            .string_array("command", "Program and arguments", true)
            .string("workdir", "Working directory, relative to the project root", false)
            .integer("timeout_ms", "Timeout in milliseconds", false)
            .build(),
        |invocation: ToolInvocation, ctx: ExecutionContext| async move {
            let ToolArgs::Command(args) = &invocation.args else {
                return Err(unexpected_args(&invocation));
            };
            run_command(args, &ctx).await
        },
    ))
}

async fn run_command(args: &CommandArgs, ctx: &ExecutionContext) -> Result<ToolOutput, AgentError> {
    let Some((program, rest)) = args.argv.split_first() else {
        return Err(AgentError::tool("shell", "empty command"));
    };
    let command_line = shlex::try_join(args.argv.iter().map(String::as_str))
        .unwrap_or_else(|_| args.argv.join(" "));

    if ctx.dry_run {
        return Ok(ToolOutput::dry_run(format!("[Dry Run] Would run: {command_line}")));
    }

    let confirmation = ctx.request_confirmation(&args.argv, args.patch_text()).await;
    if !confirmation.decision.is_approved() {
        let reason = confirmation
            .custom_deny_message
            .unwrap_or_else(|| "the user declined".to_string());
        return Ok(ToolOutput::failure(format!("Command was not run: {reason}"), 1));
    }

    let workdir = args
        .workdir
        .as_deref()
        .map(|dir| ctx.resolve_path(dir))
        .unwrap_or_else(|| ctx.cwd.clone());
    let timeout = args.timeout_ms.map(Duration::from_millis).unwrap_or(SHELL_TIMEOUT);

    let child = tokio::process::Command::new(program)
        .args(rest)
        .current_dir(&workdir)
        .kill_on_drop(true)
        .output();

    let result = tokio::select! {
        _ = ctx.cancel.cancelled() => return Ok(ToolOutput::failure(ABORTED_OUTPUT, 1)),
        result = tokio::time::timeout(timeout, child) => result,
    };

    let output = match result {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => return Err(AgentError::tool("shell", format!("{program}: {err}"))),
        Err(_) => {
            return Err(AgentError::tool(
                "shell",
                format!("command timed out after {}ms", timeout.as_millis()),
            ))
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let combined = with_truncation_note(&format!("{stdout}{stderr}"), SHELL_OUTPUT_MAX_BYTES);
    let exit_code = output.status.code().unwrap_or(-1);
    tracing::debug!(command = %command_line, exit_code, "shell command finished");

    let mut out = ToolOutput::success(combined);
    out.metadata.exit_code = exit_code;
    Ok(out)
}

/// `read_file`: UTF-8 contents, optionally a 1-based inclusive line range.
pub fn read_file_handler() -> Arc<dyn ToolHandler> {
    Arc::new(FnHandler::new(
        "read_file",
        "Read a file's contents as UTF-8 text",
        ToolParameters::object()
            .string("path", "Path to the file to read", true)
            .integer("start_line", "First line to return (1-based)", false)
            .integer("end_line", "Last line to return (inclusive)", false)
            .build(),
        |invocation: ToolInvocation, ctx: ExecutionContext| async move {
            let ToolArgs::ReadFile(args) = &invocation.args else {
                return Err(unexpected_args(&invocation));
            };
            let path = ctx.resolve_path(&args.path);
            ctx.report_file_access(&path);
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| AgentError::tool("read_file", format!("{}: {e}", args.path)))?;

            let content = match (args.start_line, args.end_line) {
                (None, None) => content,
                (start, end) => {
                    let skip = start.unwrap_or(1).max(1) as usize - 1;
                    let take = end.map_or(usize::MAX, |end| (end as usize).saturating_sub(skip));
                    content.lines().skip(skip).take(take).collect::<Vec<_>>().join("\n")
                }
            };
            Ok(ToolOutput::success(with_truncation_note(&content, READ_FILE_MAX_BYTES)))
        },
    ))
}

/// `write_file`: create or replace a file, creating parent directories.
pub fn write_file_handler() -> Arc<dyn ToolHandler> {
    Arc::new(FnHandler::new(
        "write_file",
        "Write content to a file, creating parent directories if needed",
        ToolParameters::object()
            .string("path", "Path to the file to write", true)
            .string("content", "Content to write to the file", true)
            .build(),
        |invocation: ToolInvocation, ctx: ExecutionContext| async move {
            let ToolArgs::WriteFile(args) = &invocation.args else {
                return Err(unexpected_args(&invocation));
            };
            if ctx.dry_run {
                return Ok(ToolOutput::dry_run(format!(
                    "[Dry Run] Would write {} characters to {}",
                    args.content.chars().count(),
                    args.path
                )));
            }

            let path = ctx.resolve_path(&args.path);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        AgentError::tool(
                            "write_file",
                            format!("failed to create directories for {}: {e}", args.path),
                        )
                    })?;
                }
            }
            tokio::fs::write(&path, &args.content)
                .await
                .map_err(|e| AgentError::tool("write_file", format!("{}: {e}", args.path)))?;
            ctx.report_file_access(&path);

            Ok(ToolOutput::success(format!(
                "Wrote {} bytes to {}",
                args.content.len(),
                args.path
            )))
        },
    ))
}

/// `delete_file`: remove a single file.
pub fn delete_file_handler() -> Arc<dyn ToolHandler> {
    Arc::new(FnHandler::new(
        "delete_file",
        "Delete a file",
        ToolParameters::object()
            .string("path", "Path to the file to delete", true)
            .build(),
        |invocation: ToolInvocation, ctx: ExecutionContext| async move {
            let ToolArgs::DeleteFile(args) = &invocation.args else {
                return Err(unexpected_args(&invocation));
            };
            if ctx.dry_run {
                return Ok(ToolOutput::dry_run(format!("[Dry Run] Would delete {}", args.path)));
            }
            let path = ctx.resolve_path(&args.path);
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| AgentError::tool("delete_file", format!("{}: {e}", args.path)))?;
            ctx.report_file_access(&path);
            Ok(ToolOutput::success(format!("Deleted {}", args.path)))
        },
    ))
}

/// `list_directory`: sorted entries, directories suffixed with `/`.
pub fn list_directory_handler() -> Arc<dyn ToolHandler> {
    Arc::new(FnHandler::new(
        "list_directory",
        "List files and directories in a given path",
        ToolParameters::object()
            .string("path", "Directory to list (defaults to '.')", false)
            .integer("depth", "How many levels to descend (defaults to 1)", false)
            .build(),
        |invocation: ToolInvocation, ctx: ExecutionContext| async move {
            let ToolArgs::ListDirectory(args) = &invocation.args else {
                return Err(unexpected_args(&invocation));
            };
            let root = ctx.resolve_path(&args.path);
            let depth = args.depth.unwrap_or(1).max(1);
            let entries = list_entries(root, depth)
                .await
                .map_err(|e| AgentError::tool("list_directory", format!("{}: {e}", args.path)))?;
            if entries.is_empty() {
                return Ok(ToolOutput::success(format!("{} is empty", args.path)));
            }
            Ok(ToolOutput::success(entries.join("\n")))
        },
    ))
}

async fn list_entries(root: PathBuf, depth: u64) -> std::io::Result<Vec<String>> {
    let mut entries = Vec::new();
    let mut pending = vec![(root.clone(), 1)];
    while let Some((dir, level)) = pending.pop() {
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            let relative = path.strip_prefix(&root).unwrap_or(path.as_path()).to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                entries.push(format!("{relative}/"));
                if level < depth {
                    pending.push((path, level + 1));
                }
            } else {
                entries.push(relative);
            }
            if entries.len() >= LIST_MAX_ENTRIES {
                entries.sort();
                entries.push("... (truncated)".to_string());
                return Ok(entries);
            }
        }
    }
    entries.sort();
    Ok(entries)
}

/// All reference handlers.
pub fn all_handlers() -> Vec<Arc<dyn ToolHandler>> {
    vec![
        shell_handler(),
        read_file_handler(),
        write_file_handler(),
        delete_file_handler(),
        list_directory_handler(),
    ]
}

/// A registry holding every reference handler.
///
/// There is no `apply_patch` handler here. Patches run in the host's
/// sandboxed executor, which registers itself under that name; without it,
/// patch calls are answered as an unknown tool.
pub fn default_registry() -> HandlerRegistry {
    all_handlers()
        .into_iter()
        .fold(HandlerRegistry::new(), HandlerRegistry::with)
}
