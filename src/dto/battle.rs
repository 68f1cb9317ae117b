//! Request and response bodies of the match endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{ConsumableKind, ContentKind, MatchReward, MatchStatus, OptionKey},
    scoring::RuleMode,
    state::session::QuestionSnapshot,
};

/// Body of owner-only lifecycle actions (start, finish).
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct OwnerActionRequest {
    /// Player performing the action; must match the room owner.
    pub player_id: Uuid,
}

/// Body of an answer submission.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitAnswerRequest {
    /// Player submitting the answer.
    pub player_id: Uuid,
    /// Zero-based index of the question being answered. Must match the
    /// question currently open.
    #[validate(range(max = 1000))]
    pub question_index: u32,
    /// Chosen option.
    pub chosen: OptionKey,
}

/// Body of a consumable activation.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UseConsumableRequest {
    /// Player activating the item.
    pub player_id: Uuid,
    /// Item to activate.
    pub kind: ConsumableKind,
}

/// Question as visible to players, with the answer key stripped.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionPublic {
    /// Primary key of the question.
    pub id: Uuid,
    /// Prompt text.
    pub prompt: String,
    /// Media kind of the prompt.
    pub content_kind: ContentKind,
    /// Optional media resource backing the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_path: Option<String>,
    /// The four options in A..D order.
    pub options: [String; 4],
}

impl From<&QuestionSnapshot> for QuestionPublic {
    fn from(snapshot: &QuestionSnapshot) -> Self {
        Self {
            id: snapshot.id,
            prompt: snapshot.prompt.clone(),
            content_kind: snapshot.content_kind,
            media_path: snapshot.media_path.clone(),
            options: snapshot.options.clone(),
        }
    }
}

/// One leaderboard row, ordered best first.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// Player the row belongs to.
    pub player_id: Uuid,
    /// Display name.
    pub name: String,
    /// Running total score.
    pub score: i64,
    /// Questions answered correctly so far.
    pub correct_count: u32,
    /// Current combo streak.
    pub streak: u32,
}

/// Response to a successful match start.
#[derive(Debug, Serialize, ToSchema)]
pub struct StartMatchResponse {
    /// Match that started.
    pub match_id: Uuid,
    /// Number of questions that will be served.
    pub question_count: u32,
    /// Seconds until the first question is revealed.
    pub first_question_in_secs: u64,
}

/// The question currently open for answers, as seen by a reconnecting client.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentQuestionState {
    /// Zero-based index of the question.
    pub index: u32,
    /// Question payload without the answer key.
    pub question: QuestionPublic,
    /// Milliseconds left in the answer window.
    pub remaining_ms: u64,
}

/// Private per-player state included in a resync when the caller identifies
/// themselves.
#[derive(Debug, Serialize, ToSchema)]
pub struct SelfState {
    /// Whether the caller already answered the open question.
    pub answered_current: bool,
    /// Whether the caller skipped the open question.
    pub skipped_current: bool,
    /// Current combo streak.
    pub streak: u32,
    /// Whether a combo shield is armed.
    pub shielded: bool,
    /// Whether a point multiplier is armed.
    pub multiplier_armed: bool,
    /// Options hidden for the caller by a fifty-fifty hint.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hidden_options: Vec<OptionKey>,
}

/// Full view of a match for state resynchronization.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchStateResponse {
    /// Match identifier.
    pub match_id: Uuid,
    /// Durable lifecycle status.
    pub status: MatchStatus,
    /// Scoring rule fixed at creation.
    pub rule: RuleMode,
    /// Whether the match affects the rating economy.
    pub ranked: bool,
    /// Number of questions in the match; absent once the session is torn down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_count: Option<u32>,
    /// Present while a question is open for answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<CurrentQuestionState>,
    /// Leaderboard rows, best first.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Private state of the requesting player, when identified and known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub you: Option<SelfState>,
}

/// Outcome of one scored submission, echoed to the submitting client.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitAnswerResponse {
    /// Whether the submission counted as correct.
    pub correct: bool,
    /// Base points before multipliers.
    pub base: i64,
    /// Combo multiplier applied.
    pub combo_multiplier: f64,
    /// Consumable multiplier applied.
    pub powerup_multiplier: f64,
    /// Points gained by this submission.
    pub gained: i64,
    /// Combo streak after the submission.
    pub streak: u32,
    /// Whether an armed shield absorbed an incorrect answer.
    pub shield_consumed: bool,
    /// Running total score after the submission.
    pub total_score: i64,
}

/// Outcome of a consumable activation.
#[derive(Debug, Serialize, ToSchema)]
pub struct UseConsumableResponse {
    /// Item that was activated.
    pub kind: ConsumableKind,
    /// Units of this kind left in the player's inventory.
    pub remaining: u32,
    /// Options hidden for the player; set by the fifty-fifty hint.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hidden_options: Vec<OptionKey>,
    /// Correct option revealed privately; set by the answer reveal item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revealed_option: Option<OptionKey>,
}

/// Final standing of one player in a finished match.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerResult {
    /// Player the row belongs to.
    pub player_id: Uuid,
    /// Display name.
    pub name: String,
    /// 1-based final rank.
    pub rank: u32,
    /// Final total score.
    pub total_score: i64,
    /// Questions answered correctly.
    pub correct_count: u32,
    /// Sum of per-answer elapsed times.
    pub total_time_ms: u64,
    /// Highest combo streak reached.
    pub max_combo: u32,
    /// Reward payload; present only for ranked matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<MatchReward>,
}

/// Final results of a match.
///
/// The caller that wins the finalization race gets `settled = true` with the
/// full standings; racing losers get `settled = false` while the winner is
/// still computing, and callers arriving after settlement get the stored
/// result. Never an error, so finish stays idempotent.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MatchResultResponse {
    /// Match identifier.
    pub match_id: Uuid,
    /// Whether the standings below are final.
    pub settled: bool,
    /// Winner, absent when the match ended with an empty roster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<Uuid>,
    /// Standings, best first.
    pub results: Vec<PlayerResult>,
}
