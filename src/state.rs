use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Config;
use crate::session::{Backends, Session};

pub type SharedSession = Arc<Mutex<Session>>;

struct SessionSlot {
    session: SharedSession,
    last_seen: Instant,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub backends: Backends,
    sessions: Arc<RwLock<HashMap<Uuid, SessionSlot>>>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("repo-chat/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        let backends = Backends::from_config(client, &config)?;
        Ok(Self::with_backends(config, backends))
    }

    /// State over caller-supplied services (tests swap in stubs here).
    pub fn with_backends(config: Config, backends: Backends) -> Self {
        Self {
            config,
            backends,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn create_session(&self) -> Uuid {
        let id = Uuid::new_v4();
        let slot = SessionSlot {
            session: Arc::new(Mutex::new(Session::new(id, self.backends.clone()))),
            last_seen: Instant::now(),
        };
        let active = {
            let mut sessions = self.sessions.write();
            sessions.insert(id, slot);
            sessions.len()
        };
        tracing::info!("Session {id} started ({active} active)");
        id
    }

    /// Look up a session and mark it as used.
    pub fn session(&self, id: &Uuid) -> Option<SharedSession> {
        let mut sessions = self.sessions.write();
        let slot = sessions.get_mut(id)?;
        slot.last_seen = Instant::now();
        Some(Arc::clone(&slot.session))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Drop a session. A message still being handled finishes on its own copy.
    pub fn remove_session(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if removed {
            tracing::info!("Session {id} closed");
        }
        removed
    }

    /// Drop sessions unused for at least `max_idle`. Sessions busy with a
    /// message are kept. Returns how many were dropped.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|id, slot| {
            let idle = now.saturating_duration_since(slot.last_seen) >= max_idle;
            let busy = slot.session.try_lock().is_err();
            if idle && !busy {
                tracing::info!("Session {id} expired after {}s idle", max_idle.as_secs());
            }
            !idle || busy
        });
        before - sessions.len()
    }

    /// Prune idle sessions in the background, checking a few times per
    /// `max_idle` period.
    pub fn spawn_idle_reaper(&self, max_idle: Duration) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        let period = (max_idle / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let dropped = state.prune_idle(max_idle);
                if dropped > 0 {
                    tracing::debug!("Pruned {dropped} idle sessions");
                }
            }
        })
    }
}
