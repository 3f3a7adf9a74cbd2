//! Concurrent tool dispatch.
//!
//! Every call in a batch starts immediately; results come back in the order
//! the calls were issued, whatever order they finish in. Nothing a handler
//! does can fail the dispatch: errors become failed results.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use super::loop_guard::{GuardVerdict, LoopGuard};
use crate::recovery::patch::touched_files;
use crate::tools::validation::{check_schema, validate};
use crate::tools::{
    DefaultSyntaxValidator, ExecutionContext, HandlerRegistry, NameNormalizer, SyntaxValidator,
    ToolArgs, ToolInvocation, ToolName, ToolOutput,
};
use crate::types::{ToolCall, ToolResult, ToolResultMetadata};

pub struct ToolDispatcher {
    registry: Arc<HandlerRegistry>,
    normalizer: NameNormalizer,
    guard: Arc<LoopGuard>,
    syntax: Arc<dyn SyntaxValidator>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, guard: Arc<LoopGuard>) -> Self {
        Self {
            registry,
            normalizer: NameNormalizer::default(),
            guard,
            syntax: Arc::new(DefaultSyntaxValidator),
        }
    }

    pub fn with_syntax_validator(mut self, syntax: Arc<dyn SyntaxValidator>) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn with_normalizer(mut self, normalizer: NameNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn guard(&self) -> &Arc<LoopGuard> {
        &self.guard
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Run every call concurrently. One result per call, in input order.
    pub async fn dispatch(&self, calls: &[ToolCall], ctx: &ExecutionContext) -> Vec<ToolResult> {
        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        let mut running: FuturesUnordered<_> = calls
            .iter()
            .enumerate()
            .map(|(index, call)| async move { (index, self.execute(call, ctx).await) })
            .collect();

        while let Some((index, result)) = running.next().await {
            slots[index] = Some(result);
        }

        slots
            .into_iter()
            .zip(calls)
            .map(|(slot, call)| slot.unwrap_or_else(|| ToolResult::aborted(&call.id)))
            .collect()
    }

    /// Execute one call: loop check, validation, routing, syntax check, bookkeeping.
    pub async fn execute(&self, call: &ToolCall, ctx: &ExecutionContext) -> ToolResult {
        let tool = self.normalizer.normalize(&call.name);

        if let GuardVerdict::Blocked { attempts, last_error } = self.guard.check(&tool, &call.raw_arguments) {
            tracing::warn!(call_id = %call.id, tool = %tool, attempts, "blocking repeated failing tool call");
            let mut result = ToolResult::failure(&call.id, loop_message(&tool, attempts, &last_error));
            result.metadata.loop_detected = Some(true);
            return result;
        }

        let result = match validate(&tool, &call.raw_arguments) {
            Err(err) => {
                tracing::debug!(call_id = %call.id, tool = %tool, error = %err, "rejected tool arguments");
                ToolResult::failure(&call.id, format!("Invalid arguments for `{tool}`: {err}"))
            }
            Ok(batch) => {
                let ctx = ctx.clone().with_call_id(&call.id);
                let mut outputs = Vec::with_capacity(batch.len());
                for args in batch {
                    outputs.push(self.invoke(call, &tool, args, &ctx).await);
                }
                merge_outputs(outputs).into_result(&call.id)
            }
        };

        if result.is_success() {
            self.guard.record_success(&tool, &call.raw_arguments);
        } else {
            self.guard
                .record_failure(&tool, &call.raw_arguments, &result.output_text);
        }
        tracing::debug!(
            call_id = %call.id,
            tool = %tool,
            exit_code = result.metadata.exit_code,
            "tool call finished"
        );
        result
    }

    async fn invoke(&self, call: &ToolCall, tool: &str, args: ToolArgs, ctx: &ExecutionContext) -> ToolOutput {
        let route = match &args {
            ToolArgs::Command(command) if tool == ToolName::Shell.as_str() && command.is_apply_patch() => {
                ToolName::ApplyPatch.as_str()
            }
            _ => tool,
        };

        let Some(handler) = self.registry.get(route) else {
            return ToolOutput::failure(
                format!(
                    "Unknown tool `{route}`. Available tools: {}",
                    self.registry.names().join(", ")
                ),
                1,
            );
        };

        if let ToolArgs::Custom(map) = &args {
            if let Err(err) = check_schema(route, map, &handler.parameters().schema) {
                return ToolOutput::failure(format!("Invalid arguments for `{route}`: {err}"), 1);
            }
        }

        let patch = args
            .as_command()
            .and_then(|command| command.patch_text())
            .map(str::to_string);
        let invocation = ToolInvocation {
            call_id: call.id.clone(),
            tool: route.to_string(),
            raw_arguments: call.raw_arguments.clone(),
            args,
        };

        let output = match handler.handle(&invocation, ctx).await {
            Ok(output) => output,
            Err(err) => ToolOutput::failure(err.to_string(), 1),
        };

        match patch {
            Some(patch)
                if route == ToolName::ApplyPatch.as_str()
                    && output.is_success()
                    && output.metadata.dry_run != Some(true) =>
            {
                self.check_patched_files(&patch, ctx, output).await
            }
            _ => output,
        }
    }

    async fn check_patched_files(&self, patch: &str, ctx: &ExecutionContext, mut output: ToolOutput) -> ToolOutput {
        let mut failures = Vec::new();
        for file in touched_files(patch) {
            if let Some(err) = self.syntax.check(&ctx.resolve_path(&file)).await {
                failures.push(format!("- {file}: {err}"));
            }
        }
        if failures.is_empty() {
            return output;
        }

        tracing::warn!(files = failures.len(), "patch left files that no longer parse");
        output.metadata.exit_code = 1;
        output.metadata.syntax_error = Some(true);
        if !output.output_text.is_empty() {
            output.output_text.push_str("\n\n");
        }
        output.output_text.push_str(&format!(
            "Syntax check failed after applying the patch:\n{}\nThe patch was applied, but these files no longer parse. Send a corrective patch.",
            failures.join("\n")
        ));
        output
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("registry", &self.registry)
            .finish()
    }
}

fn loop_message(tool: &str, attempts: u32, last_error: &str) -> String {
    format!(
        "Loop detected: `{tool}` already failed {attempts} times with these exact arguments. \
         Last error: {last_error}\nDo not repeat this call. Change the arguments or ask the user how to proceed."
    )
}

/// Fold a batch's outputs into one. The first non-zero exit code wins.
fn merge_outputs(outputs: Vec<ToolOutput>) -> ToolOutput {
    if outputs.len() == 1 {
        if let Some(output) = outputs.into_iter().next() {
            return output;
        }
        return ToolOutput::default();
    }

    let mut merged = ToolOutput {
        metadata: ToolResultMetadata::exit(0),
        ..Default::default()
    };
    let mut texts = Vec::with_capacity(outputs.len());
    for output in outputs {
        texts.push(output.output_text);
        let metadata = output.metadata;
        if merged.metadata.exit_code == 0 {
            merged.metadata.exit_code = metadata.exit_code;
        }
        merged.metadata.dry_run = merged.metadata.dry_run.or(metadata.dry_run);
        if metadata.syntax_error == Some(true) {
            merged.metadata.syntax_error = Some(true);
        }
        merged.metadata.extra.extend(metadata.extra);
        merged.additional_messages.extend(output.additional_messages);
    }
    merged.output_text = texts.join("\n\n");
    merged
}
