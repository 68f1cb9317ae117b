//! Plain data records exchanged with the collaborator interfaces.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::scoring::RuleMode;

/// Lifecycle status of a match as recorded durably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Players are gathering in the room; the match has not started.
    Waiting,
    /// The phase driver is running and questions are being served.
    InProgress,
    /// Finalization completed; results are persisted.
    Finished,
    /// Cancelled administratively before completion.
    Cancelled,
}

/// Whether the match outcome affects the persistent rating economy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Practice match with no rating or reward impact.
    Casual,
    /// Outcome feeds the rating/reward economy.
    Ranked,
}

/// One of the four answer options of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum OptionKey {
    /// First option.
    A,
    /// Second option.
    B,
    /// Third option.
    C,
    /// Fourth option.
    D,
}

impl OptionKey {
    /// All options in display order.
    pub const ALL: [OptionKey; 4] = [OptionKey::A, OptionKey::B, OptionKey::C, OptionKey::D];

    /// Position of this option inside a four-element options array.
    pub fn index(self) -> usize {
        match self {
            OptionKey::A => 0,
            OptionKey::B => 1,
            OptionKey::C => 2,
            OptionKey::D => 3,
        }
    }

    /// Letter used in logs and durable answer records.
    pub fn letter(self) -> char {
        match self {
            OptionKey::A => 'A',
            OptionKey::B => 'B',
            OptionKey::C => 'C',
            OptionKey::D => 'D',
        }
    }
}

impl std::fmt::Display for OptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Media kind attached to a question prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Plain text prompt.
    Text,
    /// Prompt accompanied by an image.
    Image,
    /// Prompt accompanied by an audio clip.
    Audio,
}

/// Durable record describing one match room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Primary key of the match.
    pub id: Uuid,
    /// Display name of the room.
    pub room_name: String,
    /// Player designated as room owner; the only actor allowed to start or
    /// explicitly finish the match.
    pub owner_id: Uuid,
    /// Question set served during the match.
    pub question_set_id: Uuid,
    /// Casual or ranked.
    pub kind: MatchKind,
    /// Scoring rule mode fixed at creation.
    pub rule: RuleMode,
    /// Answer window per question; `None` falls back to the configured default.
    pub seconds_per_question: Option<u32>,
    /// Current lifecycle status.
    pub status: MatchStatus,
    /// Set when the match transitions to in-progress.
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Set by finalization.
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    /// Winner recorded by finalization.
    pub winner_id: Option<Uuid>,
}

impl MatchRecord {
    /// Whether the match affects the rating economy.
    pub fn is_ranked(&self) -> bool {
        self.kind == MatchKind::Ranked
    }
}

/// Roster entry for one player inside a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Player identifier.
    pub player_id: Uuid,
    /// Display name shown on leaderboards.
    pub name: String,
    /// Join timestamp; roster order doubles as the ranking tie-break.
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

/// Question as served by the question source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionEntity {
    /// Primary key of the question.
    pub id: Uuid,
    /// Prompt text shown to players.
    pub prompt: String,
    /// Media kind of the prompt.
    pub content_kind: ContentKind,
    /// Optional media resource backing the prompt.
    pub media_path: Option<String>,
    /// The four answer options in A..D order.
    pub options: [String; 4],
    /// The correct option.
    pub correct_option: OptionKey,
    /// Explanation revealed after the answer window closes.
    pub explanation: Option<String>,
}

/// Append-only record of one answer submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Match the answer belongs to.
    pub match_id: Uuid,
    /// Player who submitted.
    pub player_id: Uuid,
    /// Question answered.
    pub question_id: Uuid,
    /// Zero-based index of the question within the match.
    pub question_index: usize,
    /// Option chosen by the player.
    pub chosen: OptionKey,
    /// Whether the submission counted as correct.
    pub correct: bool,
    /// Milliseconds between reveal and submission.
    pub elapsed_ms: u64,
    /// Wall-clock submission time.
    #[serde(with = "time::serde::rfc3339")]
    pub answered_at: OffsetDateTime,
}

/// Per-player match history row persisted by finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Match the row belongs to.
    pub match_id: Uuid,
    /// Player the row belongs to.
    pub player_id: Uuid,
    /// Final total score.
    pub total_score: i64,
    /// Number of correctly answered questions.
    pub correct_count: u32,
    /// Sum of per-answer elapsed times.
    pub total_time_ms: u64,
    /// 1-based final rank.
    pub rank: u32,
    /// Highest combo streak reached during the match.
    pub max_combo: u32,
    /// Finalization timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

/// Persistent rank tier reported by the reward collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RankTier {
    /// Entry tier.
    Bronze,
    /// Second tier.
    Silver,
    /// Third tier.
    Gold,
    /// Fourth tier.
    Platinum,
    /// Top tier.
    Diamond,
}

/// Reward payload computed per player after a ranked match.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchReward {
    /// Experience gained.
    pub xp_gained: i64,
    /// Gold gained.
    pub gold_gained: i64,
    /// Level before applying the reward.
    pub level_before: u32,
    /// Level after applying the reward.
    pub level_after: u32,
    /// Whether the player leveled up.
    pub leveled_up: bool,
    /// Rank tier before the match.
    pub rank_tier_before: RankTier,
    /// Rank tier after the match.
    pub rank_tier_after: RankTier,
}

/// Limited-use items players can activate during a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConsumableKind {
    /// Double the points of the next correct answer.
    DoublePoints,
    /// Triple the points of the next correct answer.
    TriplePoints,
    /// Hide two wrong options for the current question.
    FiftyFifty,
    /// Preserve the combo streak through the next incorrect answer.
    Shield,
    /// Opt out of the current question without scoring impact.
    SkipQuestion,
    /// Privately reveal the correct option.
    RevealAnswer,
}

impl ConsumableKind {
    /// Human-readable label used in events and limit messages.
    pub fn label(self) -> &'static str {
        match self {
            ConsumableKind::DoublePoints => "double points",
            ConsumableKind::TriplePoints => "triple points",
            ConsumableKind::FiftyFifty => "fifty-fifty hint",
            ConsumableKind::Shield => "combo shield",
            ConsumableKind::SkipQuestion => "question skip",
            ConsumableKind::RevealAnswer => "answer reveal",
        }
    }
}
