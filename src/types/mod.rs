//! Core types for agent-turn.

pub mod generation;
pub mod message;
pub mod stream;

pub use generation::*;
pub use message::*;
pub use stream::*;
