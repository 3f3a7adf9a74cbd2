//! Agent loop primitives (turns, dispatch, cancellation, events, approvals).

pub mod approvals;
pub mod cancellation;
pub mod dispatcher;
pub mod events;
pub mod flush;
pub mod loop_guard;
pub mod turn;
pub mod types;

pub use approvals::*;
pub use cancellation::{CancellationController, PendingCall, RunTicket};
pub use dispatcher::ToolDispatcher;
pub use events::{EventEmitter, HostEvent, HostEventSink};
pub use flush::{ScheduledTransition, TransitionOutcome};
pub use loop_guard::{FailureRecord, GuardVerdict, LoopGuard};
pub use turn::{TurnLoop, TurnLoopOptions};
pub use types::*;
