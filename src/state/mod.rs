pub mod events;
pub mod session;
pub mod store;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        AnswerLog, HistoryStore, InventoryStore, MatchRepository, ProgressHooks, QuestionSource,
        RewardService, RosterStore,
    },
    dto::battle::MatchResultResponse,
};

pub use self::events::{EventHub, EventHubs};
pub use self::session::{BattleSession, PlayerState, QuestionSnapshot, StreakUpdate};
pub use self::store::SessionStore;

pub type SharedState = Arc<AppState>;

/// Broadcast channel capacity per match event stream.
const EVENT_HUB_CAPACITY: usize = 64;

/// Upper bound on cached final results. Evicted results are rebuilt from
/// durable history rows when replayed.
const RESULT_CACHE_LIMIT: usize = 1024;

/// Everything the engine needs from the outside world, bundled for wiring.
pub struct Collaborators {
    /// Durable match records.
    pub matches: Arc<dyn MatchRepository>,
    /// Question bank.
    pub questions: Arc<dyn QuestionSource>,
    /// Roster with score write-through.
    pub roster: Arc<dyn RosterStore>,
    /// Append-only answer log.
    pub answers: Arc<dyn AnswerLog>,
    /// Per-player match history.
    pub history: Arc<dyn HistoryStore>,
    /// Ranked reward computation.
    pub rewards: Arc<dyn RewardService>,
    /// Quest and achievement notifications.
    pub progress: Arc<dyn ProgressHooks>,
    /// Consumable inventory.
    pub inventory: Arc<dyn InventoryStore>,
}

/// Central application state shared by routes, services, and phase drivers.
pub struct AppState {
    config: AppConfig,
    sessions: SessionStore,
    events: EventHubs,
    /// Cancellation handle of each running phase driver. Sending `true` wakes
    /// the driver out of whatever suspension it is in.
    drivers: DashMap<Uuid, watch::Sender<bool>>,
    /// Final results kept after session teardown so repeated finish calls
    /// stay idempotent.
    results: DashMap<Uuid, MatchResultResponse>,
    collaborators: Collaborators,
}

impl AppState {
    /// Construct the shared state wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, collaborators: Collaborators) -> SharedState {
        Arc::new(Self {
            config,
            sessions: SessionStore::new(),
            events: EventHubs::new(EVENT_HUB_CAPACITY),
            drivers: DashMap::new(),
            results: DashMap::new(),
            collaborators,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Live session registry.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Per-match event hubs.
    pub fn events(&self) -> &EventHubs {
        &self.events
    }

    /// Outside-world collaborators.
    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Register a phase driver for a match, returning its cancellation watch.
    ///
    /// Replaces any stale handle left behind by a previous driver.
    pub fn register_driver(&self, match_id: Uuid) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.drivers.insert(match_id, tx);
        rx
    }

    /// Wake the match's phase driver so it stops waiting and re-checks state.
    pub fn nudge_driver(&self, match_id: Uuid) {
        if let Some(handle) = self.drivers.get(&match_id) {
            let _ = handle.send(true);
        }
    }

    /// Drop the driver handle once its loop has exited.
    pub fn clear_driver(&self, match_id: Uuid) {
        self.drivers.remove(&match_id);
    }

    /// Whether a phase driver is currently registered for the match.
    pub fn driver_running(&self, match_id: Uuid) -> bool {
        self.drivers.contains_key(&match_id)
    }

    /// Remember the final result of a settled match.
    pub fn store_result(&self, result: MatchResultResponse) {
        if self.results.len() >= RESULT_CACHE_LIMIT {
            self.results.clear();
        }
        self.results.insert(result.match_id, result);
    }

    /// Final result of a settled match, if this process computed it.
    pub fn result_of(&self, match_id: Uuid) -> Option<MatchResultResponse> {
        self.results.get(&match_id).map(|entry| entry.clone())
    }
}
