//! Core turn types for the agent loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::types::{Message, Role};

/// Unique turn identifier.
pub type TurnId = Uuid;

/// Where the turn state machine currently is.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Idle,
    Requesting,
    Streaming,
    ToolDispatch,
    Flushing,
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    /// A terminal provider failure or the round limit ended the turn with a notice.
    EndedWithNotice,
    Canceled,
}

/// Result of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub turn_id: TurnId,
    pub status: TurnStatus,
    /// Messages committed to history during this turn, in order.
    pub messages: Vec<Message>,
    /// Provider rounds started.
    pub rounds: u32,
    #[serde(default)]
    pub finished_at: DateTime<Utc>,
}

impl TurnOutcome {
    pub fn new(turn_id: TurnId, status: TurnStatus, messages: Vec<Message>, rounds: u32) -> Self {
        Self {
            turn_id,
            status,
            messages,
            rounds,
            finished_at: Utc::now(),
        }
    }

    pub fn completed(turn_id: TurnId, messages: Vec<Message>, rounds: u32) -> Self {
        Self::new(turn_id, TurnStatus::Completed, messages, rounds)
    }

    pub fn ended_with_notice(turn_id: TurnId, messages: Vec<Message>, rounds: u32) -> Self {
        Self::new(turn_id, TurnStatus::EndedWithNotice, messages, rounds)
    }

    pub fn canceled(turn_id: TurnId, messages: Vec<Message>, rounds: u32) -> Self {
        Self::new(turn_id, TurnStatus::Canceled, messages, rounds)
    }

    /// Text of the last assistant message, if any.
    pub fn final_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(Message::text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_text_is_the_last_assistant_message() {
        let outcome = TurnOutcome::completed(
            Uuid::new_v4(),
            vec![
                Message::user("hi"),
                Message::assistant("first"),
                Message::assistant("second"),
            ],
            2,
        );
        assert_eq!(outcome.final_text().as_deref(), Some("second"));
    }

    #[test]
    fn phases_display_in_snake_case() {
        assert_eq!(TurnPhase::ToolDispatch.to_string(), "tool_dispatch");
        assert_eq!(TurnStatus::EndedWithNotice.to_string(), "ended_with_notice");
    }
}
