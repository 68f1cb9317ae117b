//! Mutable state of one running match.
//!
//! A [`BattleSession`] is always accessed under its store mutex, so the
//! methods here are plain synchronous mutations. Anything involving timers,
//! broadcasting, or durable writes lives in the service layer.

use std::collections::HashSet;

use indexmap::IndexMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    dao::models::{ConsumableKind, ContentKind, OptionKey, QuestionEntity},
    scoring::RuleMode,
};

/// Question data frozen at match start, including the answer key.
///
/// The answer key never leaves the session until the reveal broadcast.
#[derive(Debug, Clone)]
pub struct QuestionSnapshot {
    /// Primary key of the question.
    pub id: Uuid,
    /// Prompt text.
    pub prompt: String,
    /// Media kind of the prompt.
    pub content_kind: ContentKind,
    /// Optional media resource backing the prompt.
    pub media_path: Option<String>,
    /// The four options in A..D order.
    pub options: [String; 4],
    /// Correct option.
    pub correct_option: OptionKey,
    /// Explanation revealed after the window closes.
    pub explanation: Option<String>,
}

impl From<QuestionEntity> for QuestionSnapshot {
    fn from(entity: QuestionEntity) -> Self {
        Self {
            id: entity.id,
            prompt: entity.prompt,
            content_kind: entity.content_kind,
            media_path: entity.media_path,
            options: entity.options,
            correct_option: entity.correct_option,
            explanation: entity.explanation,
        }
    }
}

/// Per-player running state inside a session.
#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    /// Display name copied from the roster.
    pub name: String,
    /// Running total score.
    pub score: i64,
    /// Questions answered correctly so far.
    pub correct_count: u32,
    /// Current consecutive-correct streak.
    pub streak: u32,
    /// Highest streak reached during the match.
    pub max_combo: u32,
    /// Sum of elapsed times across all submissions.
    pub total_time_ms: u64,
    /// Point multiplier armed by a consumable, taken on the next submission.
    pub pending_multiplier: Option<f64>,
    /// Whether a combo shield is armed.
    pub shielded: bool,
    /// Options hidden for the current question by a fifty-fifty hint.
    pub hidden_options: Vec<OptionKey>,
    /// Whether the player skipped the current question.
    pub skipped_current: bool,
    /// Consumable kinds already used during this match.
    pub used_consumables: HashSet<ConsumableKind>,
}

/// Outcome of updating a player's streak after a scored submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    /// Streak value after the update.
    pub streak: u32,
    /// Whether an armed shield absorbed an incorrect answer.
    pub shield_consumed: bool,
}

/// In-memory state of one match from start to finalization.
pub struct BattleSession {
    /// Match this session belongs to.
    pub match_id: Uuid,
    /// Scoring rule fixed at creation.
    pub rule: RuleMode,
    /// Whether the match feeds the rating economy.
    pub ranked: bool,
    /// Answer window per question, in seconds.
    pub seconds_per_question: u32,
    questions: Vec<QuestionSnapshot>,
    /// `None` until the first reveal; only ever moves forward.
    current_question: Option<usize>,
    current_started_at: Option<Instant>,
    /// Players keyed by id, in roster join order. The insertion order is the
    /// leaderboard tie-break.
    players: IndexMap<Uuid, PlayerState>,
    answered: HashSet<(usize, Uuid)>,
    finished: bool,
}

impl BattleSession {
    /// Build a session from frozen match data. `roster` must be in join order.
    pub fn new(
        match_id: Uuid,
        rule: RuleMode,
        ranked: bool,
        seconds_per_question: u32,
        questions: Vec<QuestionSnapshot>,
        roster: impl IntoIterator<Item = (Uuid, String)>,
    ) -> Self {
        let players = roster
            .into_iter()
            .map(|(player_id, name)| {
                (
                    player_id,
                    PlayerState {
                        name,
                        ..PlayerState::default()
                    },
                )
            })
            .collect();

        Self {
            match_id,
            rule,
            ranked,
            seconds_per_question,
            questions,
            current_question: None,
            current_started_at: None,
            players,
            answered: HashSet::new(),
            finished: false,
        }
    }

    /// Number of questions served during the match.
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Index of the question currently open for answers.
    pub fn current_index(&self) -> Option<usize> {
        self.current_question
    }

    /// The question currently open for answers.
    pub fn current_question(&self) -> Option<&QuestionSnapshot> {
        self.current_question.and_then(|idx| self.questions.get(idx))
    }

    /// Question at a given index.
    pub fn question_at(&self, index: usize) -> Option<&QuestionSnapshot> {
        self.questions.get(index)
    }

    /// Full answer window for the current question, in milliseconds.
    pub fn window_ms(&self) -> u64 {
        u64::from(self.seconds_per_question) * 1000
    }

    /// Milliseconds since the current question was revealed.
    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        self.current_started_at
            .map(|started| now.saturating_duration_since(started).as_millis() as u64)
            .unwrap_or(0)
    }

    /// Reveal the next question, resetting all per-question player state.
    ///
    /// The index only moves forward. Returns `None` when the set is exhausted.
    pub fn advance_question(&mut self, now: Instant) -> Option<usize> {
        let next = self.current_question.map(|idx| idx + 1).unwrap_or(0);
        if next >= self.questions.len() {
            return None;
        }

        self.current_question = Some(next);
        self.current_started_at = Some(now);
        for state in self.players.values_mut() {
            state.hidden_options.clear();
            state.skipped_current = false;
        }
        Some(next)
    }

    /// Record that a player answered the given question.
    ///
    /// Returns `false` when the pair was already recorded; the first write
    /// wins and the duplicate must be rejected.
    pub fn record_answer(&mut self, question_index: usize, player_id: Uuid) -> bool {
        self.answered.insert((question_index, player_id))
    }

    /// Whether a player already answered the given question.
    pub fn has_answered(&self, question_index: usize, player_id: Uuid) -> bool {
        self.answered.contains(&(question_index, player_id))
    }

    /// Whether every non-skipped player answered the current question.
    pub fn all_answered(&self) -> bool {
        let Some(index) = self.current_question else {
            return false;
        };
        self.players.iter().all(|(player_id, state)| {
            state.skipped_current || self.answered.contains(&(index, *player_id))
        })
    }

    /// Per-player state, if the player is on the roster.
    pub fn player(&self, player_id: Uuid) -> Option<&PlayerState> {
        self.players.get(&player_id)
    }

    /// Mutable per-player state.
    pub fn player_mut(&mut self, player_id: Uuid) -> Option<&mut PlayerState> {
        self.players.get_mut(&player_id)
    }

    /// Add a late joiner with a zero baseline. No-op when already present;
    /// the insertion lands last, which is exactly their tie-break position.
    pub fn add_player(&mut self, player_id: Uuid, name: String) {
        self.players.entry(player_id).or_insert_with(|| PlayerState {
            name,
            ..PlayerState::default()
        });
    }

    /// Players in join order.
    pub fn players(&self) -> impl Iterator<Item = (&Uuid, &PlayerState)> {
        self.players.iter()
    }

    /// Update a player's streak after a scored submission.
    ///
    /// A correct answer extends the streak. An incorrect one resets it unless
    /// a shield is armed, in which case the shield is consumed and the streak
    /// survives.
    pub fn update_streak(&mut self, player_id: Uuid, correct: bool) -> StreakUpdate {
        let Some(state) = self.players.get_mut(&player_id) else {
            return StreakUpdate {
                streak: 0,
                shield_consumed: false,
            };
        };

        if correct {
            state.streak += 1;
            state.max_combo = state.max_combo.max(state.streak);
            StreakUpdate {
                streak: state.streak,
                shield_consumed: false,
            }
        } else if state.shielded {
            state.shielded = false;
            StreakUpdate {
                streak: state.streak,
                shield_consumed: true,
            }
        } else {
            state.streak = 0;
            StreakUpdate {
                streak: 0,
                shield_consumed: false,
            }
        }
    }

    /// Take the armed multiplier, leaving none behind.
    ///
    /// The multiplier is consumed by the submission whether or not the answer
    /// turns out correct.
    pub fn take_multiplier(&mut self, player_id: Uuid) -> Option<f64> {
        self.players
            .get_mut(&player_id)
            .and_then(|state| state.pending_multiplier.take())
    }

    /// Leaderboard rows ordered by score descending, join order breaking ties.
    ///
    /// The sort is stable and the map preserves insertion order, so equal
    /// scores keep the earlier joiner first.
    pub fn leaderboard(&self) -> Vec<(Uuid, i64)> {
        let mut rows: Vec<(Uuid, i64)> = self
            .players
            .iter()
            .map(|(player_id, state)| (*player_id, state.score))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        rows
    }

    /// Whether finalization already ran for this session.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Flip the finished flag, returning `true` only for the first caller.
    ///
    /// Every finalization path races through here; losers drop out without
    /// side effects.
    pub fn mark_finished_once(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(label: &str) -> QuestionSnapshot {
        QuestionSnapshot {
            id: Uuid::new_v4(),
            prompt: label.to_string(),
            content_kind: ContentKind::Text,
            media_path: None,
            options: [
                "one".to_string(),
                "two".to_string(),
                "three".to_string(),
                "four".to_string(),
            ],
            correct_option: OptionKey::B,
            explanation: None,
        }
    }

    fn session(player_count: usize) -> (BattleSession, Vec<Uuid>) {
        let players: Vec<Uuid> = (0..player_count).map(|_| Uuid::new_v4()).collect();
        let roster = players
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, format!("player-{i}")));
        let session = BattleSession::new(
            Uuid::new_v4(),
            RuleMode::Standard,
            false,
            15,
            vec![question("q0"), question("q1")],
            roster,
        );
        (session, players)
    }

    #[tokio::test]
    async fn advance_is_monotonic_and_exhausts() {
        let (mut session, _) = session(1);
        assert_eq!(session.current_index(), None);
        assert_eq!(session.advance_question(Instant::now()), Some(0));
        assert_eq!(session.advance_question(Instant::now()), Some(1));
        assert_eq!(session.advance_question(Instant::now()), None);
        assert_eq!(session.current_index(), Some(1));
    }

    #[tokio::test]
    async fn duplicate_answer_is_rejected() {
        let (mut session, players) = session(1);
        session.advance_question(Instant::now());
        assert!(session.record_answer(0, players[0]));
        assert!(!session.record_answer(0, players[0]));
    }

    #[tokio::test]
    async fn shield_absorbs_one_incorrect_answer() {
        let (mut session, players) = session(1);
        let player = players[0];

        session.update_streak(player, true);
        session.update_streak(player, true);
        session.player_mut(player).unwrap().shielded = true;

        let update = session.update_streak(player, false);
        assert!(update.shield_consumed);
        assert_eq!(update.streak, 2);

        let update = session.update_streak(player, false);
        assert!(!update.shield_consumed);
        assert_eq!(update.streak, 0);
    }

    #[tokio::test]
    async fn multiplier_is_taken_exactly_once() {
        let (mut session, players) = session(1);
        let player = players[0];
        session.player_mut(player).unwrap().pending_multiplier = Some(2.0);

        assert_eq!(session.take_multiplier(player), Some(2.0));
        assert_eq!(session.take_multiplier(player), None);
    }

    #[tokio::test]
    async fn leaderboard_breaks_ties_by_join_order() {
        let (mut session, players) = session(3);
        session.player_mut(players[0]).unwrap().score = 100;
        session.player_mut(players[1]).unwrap().score = 300;
        session.player_mut(players[2]).unwrap().score = 100;

        let rows = session.leaderboard();
        assert_eq!(rows[0].0, players[1]);
        assert_eq!(rows[1].0, players[0]);
        assert_eq!(rows[2].0, players[2]);
    }

    #[tokio::test]
    async fn finished_flag_flips_exactly_once() {
        let (mut session, _) = session(1);
        assert!(session.mark_finished_once());
        assert!(!session.mark_finished_once());
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn all_answered_counts_skipped_players() {
        let (mut session, players) = session(2);
        session.advance_question(Instant::now());

        session.record_answer(0, players[0]);
        assert!(!session.all_answered());

        session.player_mut(players[1]).unwrap().skipped_current = true;
        assert!(session.all_answered());
    }

    #[tokio::test]
    async fn advancing_clears_per_question_state() {
        let (mut session, players) = session(1);
        session.advance_question(Instant::now());
        {
            let state = session.player_mut(players[0]).unwrap();
            state.hidden_options = vec![OptionKey::A, OptionKey::C];
            state.skipped_current = true;
        }

        session.advance_question(Instant::now());
        let state = session.player(players[0]).unwrap();
        assert!(state.hidden_options.is_empty());
        assert!(!state.skipped_current);
    }
}
