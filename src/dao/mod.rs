//! Collaborator interfaces at the boundary of the session engine.
//!
//! Everything the engine needs from the outside world (durable match records,
//! question bank, roster, answer log, history, rewards, quest hooks,
//! item inventory) is expressed as a trait here. The binary wires in the
//! in-memory backends from [`memory`]; deployments can substitute real ones.

pub mod memory;
pub mod models;
pub mod storage;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{
        AnswerRecord, ConsumableKind, HistoryRecord, MatchRecord, MatchReward, Participant,
        QuestionEntity,
    },
    storage::StorageResult,
};

/// Durable store of match room records.
pub trait MatchRepository: Send + Sync {
    /// Fetch a match record by id.
    fn find(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchRecord>>>;
    /// Upsert a match record, replacing any previous state.
    fn save(&self, record: MatchRecord) -> BoxFuture<'static, StorageResult<()>>;
}

/// Read-only source of question sets.
///
/// Implementations may cache; callers copy the returned list before shuffling
/// so a cached set is never mutated in place.
pub trait QuestionSource: Send + Sync {
    /// Ordered question snapshots for one set.
    fn questions_for_set(
        &self,
        set_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>>;
}

/// Roster row of one player together with the last durably written score.
#[derive(Debug, Clone)]
pub struct RosterStanding {
    /// Roster entry, in join order.
    pub participant: Participant,
    /// Last score written through by the engine.
    pub score: i64,
    /// Last correct count written through by the engine.
    pub correct_count: u32,
}

/// Roster of players inside a match, with durable score write-through.
pub trait RosterStore: Send + Sync {
    /// Participants in join order.
    fn participants(&self, match_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<Participant>>>;
    /// Participants in join order, with the scores written through so far.
    fn standings(&self, match_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<RosterStanding>>>;
    /// Write the current score and correct count for one player.
    fn persist_score(
        &self,
        match_id: Uuid,
        player_id: Uuid,
        score: i64,
        correct_count: u32,
    ) -> BoxFuture<'static, StorageResult<()>>;
}

/// Append-only log of answer submissions.
pub trait AnswerLog: Send + Sync {
    /// Append one answer record.
    fn append(&self, record: AnswerRecord) -> BoxFuture<'static, StorageResult<()>>;
    /// All records for a match, in submission order.
    fn entries_for_match(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerRecord>>>;
}

/// Store of per-player match history rows.
pub trait HistoryStore: Send + Sync {
    /// Append the history rows produced by one finalization.
    fn append_all(&self, records: Vec<HistoryRecord>) -> BoxFuture<'static, StorageResult<()>>;
    /// History rows of one match, used to rebuild results after teardown.
    fn rows_for_match(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryRecord>>>;
}

/// Ranking/reward collaborator consulted for ranked matches.
pub trait RewardService: Send + Sync {
    /// Compute the reward payload for one player.
    fn compute_match_reward(
        &self,
        player_id: Uuid,
        correct_count: u32,
        total_questions: u32,
        won: bool,
        ranked: bool,
        speed_mode: bool,
    ) -> BoxFuture<'static, StorageResult<MatchReward>>;
}

/// Fire-and-forget notifications towards the quest/achievement subsystems.
///
/// Failures here are logged and never affect the match outcome.
pub trait ProgressHooks: Send + Sync {
    /// A player finished a match.
    fn on_match_played(&self, player_id: Uuid, ranked: bool) -> BoxFuture<'static, ()>;
    /// A player won a match.
    fn on_match_won(&self, player_id: Uuid, ranked: bool) -> BoxFuture<'static, ()>;
    /// A player answered `count` questions correctly.
    fn on_correct_answers(&self, player_id: Uuid, count: u32) -> BoxFuture<'static, ()>;
    /// A player reached a combo streak of `count`.
    fn on_combo_achieved(&self, player_id: Uuid, count: u32) -> BoxFuture<'static, ()>;
    /// A player placed in the top three of a match with at least three players.
    fn on_top_three(&self, player_id: Uuid) -> BoxFuture<'static, ()>;
}

/// Result of attempting to consume one inventory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeOutcome {
    /// One unit was consumed; `remaining` units are left.
    Taken {
        /// Units left after consumption.
        remaining: u32,
    },
    /// The player owns no unit of this kind.
    Empty,
    /// The player already used this kind today.
    DailyLimitReached,
}

/// Consumable inventory with per-day usage limits.
pub trait InventoryStore: Send + Sync {
    /// Consume one unit of the given item for the player.
    fn take(
        &self,
        player_id: Uuid,
        kind: ConsumableKind,
    ) -> BoxFuture<'static, StorageResult<TakeOutcome>>;
}
