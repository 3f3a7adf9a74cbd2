//! Run generations, cancellation tokens and the pending-abort set.
//!
//! Every run gets a generation number. Canceling bumps the generation, so
//! anything the old run does afterwards is recognizably stale and dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::stream::CallSnapshot;

/// A tool call issued by the model and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    pub name: String,
    pub raw_arguments: String,
}

/// Handle for one run.
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub generation: u64,
    pub token: CancellationToken,
}

#[derive(Debug)]
pub struct CancellationController {
    generation: AtomicU64,
    canceled: AtomicBool,
    terminated: AtomicBool,
    master: CancellationToken,
    run_token: Mutex<CancellationToken>,
    pending: Mutex<IndexMap<String, PendingCall>>,
}

impl Default for CancellationController {
    fn default() -> Self {
        let master = CancellationToken::new();
        Self {
            generation: AtomicU64::new(0),
            canceled: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            run_token: Mutex::new(master.child_token()),
            master,
            pending: Mutex::new(IndexMap::new()),
        }
    }
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation. Any previous run's token is canceled.
    pub fn begin_run(&self) -> Result<RunTicket> {
        if self.is_terminated() {
            return Err(AgentError::Terminated);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.canceled.store(false, Ordering::SeqCst);
        let token = self.master.child_token();
        let previous = std::mem::replace(&mut *lock(&self.run_token), token.clone());
        previous.cancel();
        Ok(RunTicket { generation, token })
    }

    /// Cancel the current run. Returns whether any tool call was unanswered.
    pub fn cancel(&self) -> bool {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.canceled.store(true, Ordering::SeqCst);
        lock(&self.run_token).cancel();
        !lock(&self.pending).is_empty()
    }

    /// Cancel everything, permanently.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.master.cancel();
    }

    pub fn is_current(&self, generation: u64) -> bool {
        !self.is_terminated() && self.generation.load(Ordering::SeqCst) == generation
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Record or refresh an in-flight call. Ignored for stale generations.
    pub fn track_call(&self, generation: u64, call: &CallSnapshot) {
        if !self.is_current(generation) {
            return;
        }
        lock(&self.pending).insert(
            call.id.clone(),
            PendingCall {
                name: call.name.clone(),
                raw_arguments: call.raw_arguments.clone(),
            },
        );
    }

    /// Mark a call answered. Ignored for stale generations.
    pub fn resolve_call(&self, generation: u64, call_id: &str) {
        if self.is_current(generation) {
            lock(&self.pending).shift_remove(call_id);
        }
    }

    /// Forget all pending calls of the current generation.
    pub fn clear_pending(&self, generation: u64) {
        if self.is_current(generation) {
            lock(&self.pending).clear();
        }
    }

    /// Remove and return every pending call, in issue order.
    pub fn take_pending(&self) -> Vec<(String, PendingCall)> {
        lock(&self.pending).drain(..).collect()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        lock(&self.pending).keys().cloned().collect()
    }

    pub fn has_pending(&self) -> bool {
        !lock(&self.pending).is_empty()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
