pub mod battle;
pub mod dice;
pub mod lifecycle;
pub mod powers;
pub mod rejection;
pub mod resolver;
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{
    config::{AppConfig, BattleRules},
    dao::session_store::SessionStore,
    error::ServiceError,
    services::scheduler::TaskScheduler,
    state::battle::BattleTemplate,
};

pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, rules and the per-session task scheduler.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    scheduler: TaskScheduler,
    templates: DashMap<Uuid, Arc<BattleTemplate>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            degraded: degraded_tx,
            config,
            scheduler: TaskScheduler::default(),
            templates: DashMap::new(),
        })
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Like [`AppState::session_store`] but failing with [`ServiceError::Degraded`].
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Battle rules in effect.
    pub fn rules(&self) -> &BattleRules {
        self.config.rules()
    }

    /// Delayed tasks keyed by session.
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Templates already loaded, keyed by identifier. Templates are read-only once stored.
    pub fn template_cache(&self) -> &DashMap<Uuid, Arc<BattleTemplate>> {
        &self.templates
    }
}
