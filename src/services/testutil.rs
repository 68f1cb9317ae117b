//! Shared fixtures for service-level tests.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        memory::{
            FlatRewardService, MemoryAnswerLog, MemoryHistoryStore, MemoryInventoryStore,
            MemoryMatchRepository, MemoryQuestionSource, MemoryRosterStore,
            RecordingProgressHooks,
        },
        models::{ContentKind, MatchKind, MatchRecord, MatchStatus, OptionKey, QuestionEntity},
    },
    scoring::RuleMode,
    state::{AppState, Collaborators, SharedState},
};

/// A wired application state plus handles to the backends behind it.
pub struct TestWorld {
    pub state: SharedState,
    pub match_id: Uuid,
    pub owner: Uuid,
    pub players: Vec<Uuid>,
    pub matches: Arc<MemoryMatchRepository>,
    pub roster: Arc<MemoryRosterStore>,
    pub answers: Arc<MemoryAnswerLog>,
    pub history: Arc<MemoryHistoryStore>,
    pub inventory: Arc<MemoryInventoryStore>,
    pub progress: Arc<RecordingProgressHooks>,
}

/// A question whose correct option is always B.
pub fn question(prompt: &str) -> QuestionEntity {
    QuestionEntity {
        id: Uuid::new_v4(),
        prompt: prompt.to_string(),
        content_kind: ContentKind::Text,
        media_path: None,
        options: [
            "alpha".to_string(),
            "beta".to_string(),
            "gamma".to_string(),
            "delta".to_string(),
        ],
        correct_option: OptionKey::B,
        explanation: Some("beta is right".to_string()),
    }
}

/// Build a waiting match with the given roster size and question count.
///
/// The first player is the room owner. The timing configuration is shortened
/// so paused-clock tests do not crawl through long countdowns.
pub fn world(
    player_count: usize,
    question_count: usize,
    kind: MatchKind,
    rule: RuleMode,
) -> TestWorld {
    let mut config = AppConfig::default();
    config.timing.pre_countdown_secs = 1;
    config.timing.interlude_secs = 1;

    let matches = Arc::new(MemoryMatchRepository::new());
    let questions = Arc::new(MemoryQuestionSource::new());
    let roster = Arc::new(MemoryRosterStore::new());
    let answers = Arc::new(MemoryAnswerLog::new());
    let history = Arc::new(MemoryHistoryStore::new());
    let inventory = Arc::new(MemoryInventoryStore::new());
    let progress = Arc::new(RecordingProgressHooks::new());

    let match_id = Uuid::new_v4();
    let question_set_id = Uuid::new_v4();
    let players: Vec<Uuid> = (0..player_count).map(|_| Uuid::new_v4()).collect();
    let owner = players[0];

    matches.insert(MatchRecord {
        id: match_id,
        room_name: "test room".to_string(),
        owner_id: owner,
        question_set_id,
        kind,
        rule,
        seconds_per_question: Some(15),
        status: MatchStatus::Waiting,
        started_at: None,
        ended_at: None,
        winner_id: None,
    });
    questions.insert_set(
        question_set_id,
        (0..question_count)
            .map(|i| question(&format!("question {i}")))
            .collect(),
    );
    for (i, player_id) in players.iter().enumerate() {
        roster.join(match_id, *player_id, format!("player-{i}"));
    }

    let state = AppState::new(
        config,
        Collaborators {
            matches: matches.clone(),
            questions: questions.clone(),
            roster: roster.clone(),
            answers: answers.clone(),
            history: history.clone(),
            rewards: Arc::new(FlatRewardService::new()),
            progress: progress.clone(),
            inventory: inventory.clone(),
        },
    );

    TestWorld {
        state,
        match_id,
        owner,
        players,
        matches,
        roster,
        answers,
        history,
        inventory,
        progress,
    }
}
