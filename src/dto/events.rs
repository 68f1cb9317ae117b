//! Events pushed over the per-match SSE stream.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{ConsumableKind, OptionKey},
    dto::battle::{LeaderboardEntry, PlayerResult, QuestionPublic},
};

/// Event names used on the match stream.
pub mod names {
    /// The match left the waiting room and the countdown began.
    pub const MATCH_STARTED: &str = "match.started";
    /// A new question is open for answers.
    pub const QUESTION_NEW: &str = "question.new";
    /// The answer window closed and the correct option is published.
    pub const ANSWER_REVEAL: &str = "answer.reveal";
    /// A player's score changed.
    pub const SCORE_UPDATE: &str = "score.update";
    /// The leaderboard changed.
    pub const LEADERBOARD_UPDATE: &str = "leaderboard.update";
    /// Finalization completed and results are available.
    pub const MATCH_FINISHED: &str = "match.finished";
    /// A player activated a consumable.
    pub const ITEM_USED: &str = "item.used";
}

#[derive(Clone, Debug)]
/// Dispatched payload carried across the match SSE stream.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event from a name and a pre-serialized data string.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<T>(event: &str, payload: &T) -> serde_json::Result<Self>
    where
        T: Serialize,
    {
        Ok(Self {
            event: Some(event.to_string()),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the match starts and the pre-question countdown begins.
pub struct MatchStartedEvent {
    pub match_id: Uuid,
    pub room_name: String,
    pub question_count: u32,
    /// Answer window per question, in seconds.
    pub seconds_per_question: u32,
    /// Seconds until the first question is revealed.
    pub first_question_in_secs: u64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a question opens for answers.
pub struct QuestionRevealedEvent {
    /// Zero-based index of the question.
    pub index: u32,
    pub question: QuestionPublic,
    /// Full answer window in milliseconds.
    pub window_ms: u64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the answer window closes.
pub struct AnswerRevealEvent {
    /// Index of the question being revealed.
    pub index: u32,
    pub correct_option: OptionKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after each scored submission.
pub struct ScoreUpdateEvent {
    pub player_id: Uuid,
    pub correct: bool,
    /// Points gained by the submission.
    pub gained: i64,
    pub total_score: i64,
    pub streak: u32,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever the standings change.
pub struct LeaderboardUpdateEvent {
    /// Rows ordered best first.
    pub rows: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast exactly once when finalization completes.
pub struct MatchFinishedEvent {
    pub match_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<Uuid>,
    pub results: Vec<PlayerResult>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a player activates a consumable. The payload names the kind
/// but never leaks private effects such as a revealed answer.
pub struct ItemUsedEvent {
    pub player_id: Uuid,
    pub kind: ConsumableKind,
}
