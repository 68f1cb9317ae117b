//! In-memory collaborator backends.
//!
//! These back the binary in standalone deployments and every test. They keep
//! the same contracts as a database-backed implementation: upsert semantics,
//! append-only logs, and join-ordered rosters.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::dao::{
    AnswerLog, HistoryStore, InventoryStore, MatchRepository, ProgressHooks, QuestionSource,
    RewardService, RosterStanding, RosterStore, TakeOutcome,
    models::{
        AnswerRecord, ConsumableKind, HistoryRecord, MatchRecord, MatchReward, Participant,
        QuestionEntity, RankTier,
    },
    storage::StorageResult,
};

/// In-memory match record store.
#[derive(Default)]
pub struct MemoryMatchRepository {
    records: Arc<DashMap<Uuid, MatchRecord>>,
}

impl MemoryMatchRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the async interface. Test helper.
    pub fn insert(&self, record: MatchRecord) {
        self.records.insert(record.id, record);
    }
}

impl MatchRepository for MemoryMatchRepository {
    fn find(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchRecord>>> {
        let records = self.records.clone();
        Box::pin(async move { Ok(records.get(&id).map(|entry| entry.clone())) })
    }

    fn save(&self, record: MatchRecord) -> BoxFuture<'static, StorageResult<()>> {
        let records = self.records.clone();
        Box::pin(async move {
            records.insert(record.id, record);
            Ok(())
        })
    }
}

/// In-memory question bank keyed by set id.
#[derive(Default)]
pub struct MemoryQuestionSource {
    sets: Arc<DashMap<Uuid, Vec<QuestionEntity>>>,
}

impl MemoryQuestionSource {
    /// Create an empty question bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a question set.
    pub fn insert_set(&self, set_id: Uuid, questions: Vec<QuestionEntity>) {
        self.sets.insert(set_id, questions);
    }
}

impl QuestionSource for MemoryQuestionSource {
    fn questions_for_set(
        &self,
        set_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let sets = self.sets.clone();
        // Cloning here is what makes the cached set re-shuffle safe.
        Box::pin(async move {
            Ok(sets
                .get(&set_id)
                .map(|entry| entry.clone())
                .unwrap_or_default())
        })
    }
}

/// In-memory roster with join order preserved per match.
#[derive(Default)]
pub struct MemoryRosterStore {
    rosters: Arc<DashMap<Uuid, Vec<RosterStanding>>>,
}

impl MemoryRosterStore {
    /// Create an empty roster store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant to a match roster.
    pub fn join(&self, match_id: Uuid, player_id: Uuid, name: impl Into<String>) {
        let mut roster = self.rosters.entry(match_id).or_default();
        if roster.iter().any(|row| row.participant.player_id == player_id) {
            return;
        }
        roster.push(RosterStanding {
            participant: Participant {
                player_id,
                name: name.into(),
                joined_at: OffsetDateTime::now_utc(),
            },
            score: 0,
            correct_count: 0,
        });
    }

    /// Durable score currently recorded for one player. Test helper.
    pub fn recorded_score(&self, match_id: Uuid, player_id: Uuid) -> Option<i64> {
        self.rosters.get(&match_id).and_then(|roster| {
            roster
                .iter()
                .find(|row| row.participant.player_id == player_id)
                .map(|row| row.score)
        })
    }
}

impl RosterStore for MemoryRosterStore {
    fn participants(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<Participant>>> {
        let rosters = self.rosters.clone();
        Box::pin(async move {
            Ok(rosters
                .get(&match_id)
                .map(|roster| roster.iter().map(|row| row.participant.clone()).collect())
                .unwrap_or_default())
        })
    }

    fn standings(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<RosterStanding>>> {
        let rosters = self.rosters.clone();
        Box::pin(async move {
            Ok(rosters
                .get(&match_id)
                .map(|roster| roster.clone())
                .unwrap_or_default())
        })
    }

    fn persist_score(
        &self,
        match_id: Uuid,
        player_id: Uuid,
        score: i64,
        correct_count: u32,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let rosters = self.rosters.clone();
        Box::pin(async move {
            if let Some(mut roster) = rosters.get_mut(&match_id)
                && let Some(row) = roster
                    .iter_mut()
                    .find(|row| row.participant.player_id == player_id)
            {
                row.score = score;
                row.correct_count = correct_count;
            }
            Ok(())
        })
    }
}

/// In-memory append-only answer log.
#[derive(Default)]
pub struct MemoryAnswerLog {
    entries: Arc<Mutex<Vec<AnswerRecord>>>,
}

impl MemoryAnswerLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnswerLog for MemoryAnswerLog {
    fn append(&self, record: AnswerRecord) -> BoxFuture<'static, StorageResult<()>> {
        let entries = self.entries.clone();
        Box::pin(async move {
            entries.lock().await.push(record);
            Ok(())
        })
    }

    fn entries_for_match(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerRecord>>> {
        let entries = self.entries.clone();
        Box::pin(async move {
            Ok(entries
                .lock()
                .await
                .iter()
                .filter(|record| record.match_id == match_id)
                .cloned()
                .collect())
        })
    }
}

/// In-memory history store.
#[derive(Default)]
pub struct MemoryHistoryStore {
    rows: Arc<Mutex<Vec<HistoryRecord>>>,
}

impl MemoryHistoryStore {
    /// Create an empty history store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append_all(&self, records: Vec<HistoryRecord>) -> BoxFuture<'static, StorageResult<()>> {
        let rows = self.rows.clone();
        Box::pin(async move {
            rows.lock().await.extend(records);
            Ok(())
        })
    }

    fn rows_for_match(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<HistoryRecord>>> {
        let rows = self.rows.clone();
        Box::pin(async move {
            Ok(rows
                .lock()
                .await
                .iter()
                .filter(|row| row.match_id == match_id)
                .cloned()
                .collect())
        })
    }
}

/// Reward stub paying a fixed rate per correct answer plus a win bonus.
///
/// Real deployments substitute the rating service; the engine only relays the
/// payload it gets back.
#[derive(Default)]
pub struct FlatRewardService;

impl FlatRewardService {
    /// Create the stub.
    pub fn new() -> Self {
        Self
    }
}

impl RewardService for FlatRewardService {
    fn compute_match_reward(
        &self,
        _player_id: Uuid,
        correct_count: u32,
        _total_questions: u32,
        won: bool,
        ranked: bool,
        _speed_mode: bool,
    ) -> BoxFuture<'static, StorageResult<MatchReward>> {
        Box::pin(async move {
            let base_xp = i64::from(correct_count) * 20;
            let xp_gained = if won { base_xp + 50 } else { base_xp };
            let gold_gained = if ranked {
                i64::from(correct_count) * 10 + if won { 30 } else { 0 }
            } else {
                0
            };
            Ok(MatchReward {
                xp_gained,
                gold_gained,
                level_before: 1,
                level_after: 1,
                leveled_up: false,
                rank_tier_before: RankTier::Bronze,
                rank_tier_after: RankTier::Bronze,
            })
        })
    }
}

/// Progress-hook sink that only counts invocations.
#[derive(Default)]
pub struct RecordingProgressHooks {
    played: Arc<DashMap<Uuid, u32>>,
    won: Arc<DashMap<Uuid, u32>>,
    correct: Arc<DashMap<Uuid, u32>>,
    combos: Arc<DashMap<Uuid, u32>>,
    top_three: Arc<DashMap<Uuid, u32>>,
}

impl RecordingProgressHooks {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `on_match_won` calls for a player. Test helper.
    pub fn won_count(&self, player_id: Uuid) -> u32 {
        self.won.get(&player_id).map(|count| *count).unwrap_or(0)
    }

    /// Number of `on_match_played` calls for a player. Test helper.
    pub fn played_count(&self, player_id: Uuid) -> u32 {
        self.played.get(&player_id).map(|count| *count).unwrap_or(0)
    }
}

fn bump(map: &Arc<DashMap<Uuid, u32>>, player_id: Uuid) -> BoxFuture<'static, ()> {
    let map = map.clone();
    Box::pin(async move {
        *map.entry(player_id).or_insert(0) += 1;
    })
}

impl ProgressHooks for RecordingProgressHooks {
    fn on_match_played(&self, player_id: Uuid, _ranked: bool) -> BoxFuture<'static, ()> {
        bump(&self.played, player_id)
    }

    fn on_match_won(&self, player_id: Uuid, _ranked: bool) -> BoxFuture<'static, ()> {
        bump(&self.won, player_id)
    }

    fn on_correct_answers(&self, player_id: Uuid, count: u32) -> BoxFuture<'static, ()> {
        let map = self.correct.clone();
        Box::pin(async move {
            *map.entry(player_id).or_insert(0) += count;
        })
    }

    fn on_combo_achieved(&self, player_id: Uuid, count: u32) -> BoxFuture<'static, ()> {
        let map = self.combos.clone();
        Box::pin(async move {
            map.entry(player_id)
                .and_modify(|best| *best = (*best).max(count))
                .or_insert(count);
        })
    }

    fn on_top_three(&self, player_id: Uuid) -> BoxFuture<'static, ()> {
        bump(&self.top_three, player_id)
    }
}

/// In-memory consumable inventory enforcing the one-use-per-day limit.
#[derive(Default)]
pub struct MemoryInventoryStore {
    quantities: Arc<DashMap<(Uuid, ConsumableKind), u32>>,
    last_used: Arc<DashMap<(Uuid, ConsumableKind), time::Date>>,
}

impl MemoryInventoryStore {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant units of an item to a player.
    pub fn grant(&self, player_id: Uuid, kind: ConsumableKind, quantity: u32) {
        *self.quantities.entry((player_id, kind)).or_insert(0) += quantity;
    }
}

impl InventoryStore for MemoryInventoryStore {
    fn take(
        &self,
        player_id: Uuid,
        kind: ConsumableKind,
    ) -> BoxFuture<'static, StorageResult<TakeOutcome>> {
        let quantities = self.quantities.clone();
        let last_used = self.last_used.clone();
        Box::pin(async move {
            let key = (player_id, kind);
            let today = OffsetDateTime::now_utc().date();

            if last_used.get(&key).is_some_and(|used| *used == today) {
                return Ok(TakeOutcome::DailyLimitReached);
            }

            let Some(mut quantity) = quantities.get_mut(&key) else {
                return Ok(TakeOutcome::Empty);
            };
            if *quantity == 0 {
                return Ok(TakeOutcome::Empty);
            }

            *quantity -= 1;
            let remaining = *quantity;
            drop(quantity);
            last_used.insert(key, today);
            Ok(TakeOutcome::Taken { remaining })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roster_preserves_join_order_and_dedupes() {
        let roster = MemoryRosterStore::new();
        let match_id = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        roster.join(match_id, first, "Alice");
        roster.join(match_id, second, "Bob");
        roster.join(match_id, first, "Alice again");

        let participants = roster.participants(match_id).await.unwrap();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0].player_id, first);
        assert_eq!(participants[1].player_id, second);
    }

    #[tokio::test]
    async fn inventory_enforces_quantity_and_daily_limit() {
        let inventory = MemoryInventoryStore::new();
        let player = Uuid::new_v4();

        assert_eq!(
            inventory
                .take(player, ConsumableKind::Shield)
                .await
                .unwrap(),
            TakeOutcome::Empty
        );

        inventory.grant(player, ConsumableKind::Shield, 2);
        assert_eq!(
            inventory
                .take(player, ConsumableKind::Shield)
                .await
                .unwrap(),
            TakeOutcome::Taken { remaining: 1 }
        );
        assert_eq!(
            inventory
                .take(player, ConsumableKind::Shield)
                .await
                .unwrap(),
            TakeOutcome::DailyLimitReached
        );
    }

    #[tokio::test]
    async fn answer_log_filters_by_match() {
        let log = MemoryAnswerLog::new();
        let match_a = Uuid::new_v4();
        let match_b = Uuid::new_v4();

        for (target, index) in [(match_a, 0), (match_b, 0), (match_a, 1)] {
            log.append(AnswerRecord {
                match_id: target,
                player_id: Uuid::new_v4(),
                question_id: Uuid::new_v4(),
                question_index: index,
                chosen: crate::dao::models::OptionKey::A,
                correct: true,
                elapsed_ms: 2000,
                answered_at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();
        }

        assert_eq!(log.entries_for_match(match_a).await.unwrap().len(), 2);
        assert_eq!(log.entries_for_match(match_b).await.unwrap().len(), 1);
    }
}
