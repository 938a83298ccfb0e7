pub mod appreciation;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod moderation;
pub mod notification;
pub mod quarter;
pub mod reward;
pub mod telemetry;
pub mod validation;

pub use crate::appreciation::AppreciationEngine;
pub use crate::config::Settings;
pub use crate::db::Database;
pub use crate::errors::{AppError, AppResult, ErrorKind};
pub use crate::moderation::ModerationEngine;
pub use crate::notification::{Notifier, PushMessage, PushSender, TracingPushSender};
pub use crate::quarter::{Clock, FixedClock, SystemClock};
pub use crate::reward::RewardEngine;

use crate::models::{
    Appreciation, AppreciationFilter, AppreciationPage, AppreciationView, CreateAppreciationRequest, GiveRewardRequest,
    Reward,
};
use std::path::Path;
use std::sync::Arc;

/// Application state: one store, one clock, and the engines built on them.
#[derive(Clone)]
pub struct PeerlyCore {
    settings: Arc<Settings>,
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    appreciations: AppreciationEngine,
    rewards: RewardEngine,
    moderation: ModerationEngine,
}

impl PeerlyCore {
    /// Loads settings from `config_path`, installs logging, and opens the store.
    pub fn bootstrap(config_path: &Path) -> AppResult<Self> {
        let settings = Settings::load(config_path)?;
        telemetry::init_tracing(&settings.log_dir, &settings.log_level)?;
        let core = Self::open(settings)?;
        tracing::info!(database = ?core.db.path(), "peerly core ready");
        Ok(core)
    }

    pub fn open(settings: Settings) -> AppResult<Self> {
        let db = Arc::new(Database::new(&settings.database_path)?);
        Self::with_parts(settings, db, Arc::new(SystemClock), Arc::new(TracingPushSender))
    }

    pub fn in_memory(settings: Settings) -> AppResult<Self> {
        let db = Arc::new(Database::in_memory()?);
        Self::with_parts(settings, db, Arc::new(SystemClock), Arc::new(TracingPushSender))
    }

    pub fn with_parts(
        settings: Settings,
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        push: Arc<dyn PushSender>,
    ) -> AppResult<Self> {
        settings.validate()?;
        let notifier = Notifier::new(db.clone(), push).with_topic(&settings.broadcast_topic);
        let appreciations = AppreciationEngine::new(db.clone(), clock.clone(), notifier.clone(), &settings);
        let rewards = RewardEngine::new(db.clone(), clock.clone(), notifier, &settings);
        let moderation = ModerationEngine::new(db.clone(), clock.clone(), &settings);
        Ok(Self {
            settings: Arc::new(settings),
            db,
            clock,
            appreciations,
            rewards,
            moderation,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn appreciations(&self) -> &AppreciationEngine {
        &self.appreciations
    }

    pub fn rewards(&self) -> &RewardEngine {
        &self.rewards
    }

    pub fn moderation(&self) -> &ModerationEngine {
        &self.moderation
    }

    pub async fn give_reward(&self, sender_id: i64, request: &GiveRewardRequest) -> AppResult<Reward> {
        self.rewards.give_reward(sender_id, request).await
    }

    pub async fn create_appreciation(
        &self,
        sender_id: i64,
        request: &CreateAppreciationRequest,
    ) -> AppResult<Appreciation> {
        self.appreciations.create_appreciation(sender_id, request).await
    }

    pub async fn get_appreciation_by_id(&self, viewer_id: i64, appreciation_id: i64) -> AppResult<AppreciationView> {
        self.appreciations.get_appreciation_by_id(viewer_id, appreciation_id).await
    }

    pub async fn list_appreciations(&self, viewer_id: i64, filter: &AppreciationFilter) -> AppResult<AppreciationPage> {
        self.appreciations.list_appreciations(viewer_id, filter).await
    }
}
