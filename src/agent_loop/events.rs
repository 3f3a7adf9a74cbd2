//! Host-facing events.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use super::cancellation::CancellationController;
use crate::stream::PartialUpdate;
use crate::types::Message;

/// Everything the loop tells its host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// A message was committed to history.
    Item { message: Message },
    /// The in-flight assistant message changed.
    PartialUpdate { update: PartialUpdate },
    Loading { active: bool },
    /// Loop-guard history and context were cleared.
    Reset,
    FileAccess { path: PathBuf },
}

pub type HostEventSink = Arc<dyn Fn(HostEvent) + Send + Sync>;

/// Delivers events only while the emitting run's generation is current.
#[derive(Clone)]
pub struct EventEmitter {
    sink: Option<HostEventSink>,
    controller: Arc<CancellationController>,
}

impl EventEmitter {
    pub fn new(sink: Option<HostEventSink>, controller: Arc<CancellationController>) -> Self {
        Self { sink, controller }
    }

    /// Returns false when the event was dropped as stale.
    pub fn emit(&self, generation: u64, event: HostEvent) -> bool {
        if !self.controller.is_current(generation) {
            tracing::trace!(generation, "dropping event from a stale run");
            return false;
        }
        self.emit_now(event);
        true
    }

    /// Deliver regardless of generation. For events raised by the host's own calls.
    pub fn emit_now(&self, event: HostEvent) {
        if let Some(sink) = &self.sink {
            sink(event);
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
