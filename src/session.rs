//! Lifecycle of the single engine session.
//!
//! The [`SessionManager`] owns one slot holding the current state. The slot's
//! mutex is held only to move between states, never across the connection
//! probe, so `status()` always answers immediately and a second `init()`
//! observes `Initializing` and fails fast instead of queueing.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::{ChatEngine, EngineConnector};
use crate::models::{ModelConfig, SessionInfo, SessionState, SessionStatus};
use crate::stage::StageError;

/// Session initialization failures.
#[derive(Debug, Clone, Error)]
pub enum InitError {
    #[error("inference engine unreachable at {base_url}: {reason}")]
    Unreachable { base_url: String, reason: String },

    #[error("another initialization is already in progress")]
    AlreadyInitializing,

    #[error("model {model_id} is not served by the engine (serving: {})", served.join(", "))]
    ModelNotServed { model_id: String, served: Vec<String> },

    #[error("invalid model config: {0}")]
    InvalidConfig(String),
}

/// A live handle to the inference engine.
///
/// Cloning is cheap and clones share readiness: once the manager replaces
/// this session every clone reports not ready.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    info: SessionInfo,
    config: ModelConfig,
    engine: Arc<dyn ChatEngine>,
    retired: AtomicBool,
}

impl Session {
    fn new(config: ModelConfig, engine: Arc<dyn ChatEngine>) -> Self {
        let info = SessionInfo {
            id: Uuid::new_v4(),
            model_id: config.model_id.clone(),
            base_url: config.base_url.clone(),
            initialized_at: Utc::now(),
        };
        Self {
            inner: Arc::new(SessionInner {
                info,
                config,
                engine,
                retired: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.info.id
    }

    pub fn info(&self) -> &SessionInfo {
        &self.inner.info
    }

    pub fn config(&self) -> &ModelConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &Arc<dyn ChatEngine> {
        &self.inner.engine
    }

    /// `false` once the session has been replaced by a re-init.
    pub fn is_ready(&self) -> bool {
        !self.inner.retired.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same initialized session.
    pub fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn retire(&self) {
        self.inner.retired.store(true, Ordering::Release);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.info.id)
            .field("model_id", &self.inner.info.model_id)
            .field("base_url", &self.inner.info.base_url)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Outcome of a successful `init`.
#[derive(Debug, Clone)]
pub struct Initialized {
    pub session: Session,
    /// `true` when the existing ready session was returned unchanged.
    pub reused: bool,
}

enum Slot {
    Uninitialized,
    Initializing { model_id: String },
    Ready(Session),
    Failed { model_id: String, error: String },
}

/// Owns the process-wide session slot.
pub struct SessionManager {
    connector: Arc<dyn EngineConnector>,
    slot: Mutex<Slot>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn EngineConnector>) -> Self {
        Self {
            connector,
            slot: Mutex::new(Slot::Uninitialized),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        lock_slot(&self.slot)
    }

    /// Initialize (or reuse) the engine session.
    ///
    /// Returns the current session untouched when it is ready with the same
    /// config. A different config retires the current session and connects
    /// anew.
    pub async fn init(&self, config: ModelConfig) -> Result<Initialized, InitError> {
        validate_config(&config)?;

        {
            let mut slot = self.lock();
            match &*slot {
                Slot::Ready(session) if session.config() == &config => {
                    tracing::debug!("Reusing ready session {}", session.id());
                    return Ok(Initialized {
                        session: session.clone(),
                        reused: true,
                    });
                }
                Slot::Initializing { model_id } => {
                    tracing::warn!("Rejecting init: {} is still initializing", model_id);
                    return Err(InitError::AlreadyInitializing);
                }
                Slot::Ready(session) => {
                    tracing::info!(
                        "Re-initializing: retiring session {} ({})",
                        session.id(),
                        session.info().model_id
                    );
                    session.retire();
                }
                Slot::Uninitialized | Slot::Failed { .. } => {}
            }
            *slot = Slot::Initializing {
                model_id: config.model_id.clone(),
            };
        }

        tracing::info!(
            "Initializing session for {} at {}",
            config.model_id,
            config.base_url
        );

        let mut guard = InitGuard {
            slot: &self.slot,
            model_id: config.model_id.clone(),
            armed: true,
        };
        let connected = self.connector.connect(&config).await;
        guard.armed = false;

        let mut slot = self.lock();
        match connected {
            Ok(engine) => {
                let session = Session::new(config, engine);
                tracing::info!(
                    "Session {} ready ({})",
                    session.id(),
                    session.info().model_id
                );
                *slot = Slot::Ready(session.clone());
                Ok(Initialized {
                    session,
                    reused: false,
                })
            }
            Err(err) => {
                tracing::error!("Session init failed: {}", err);
                *slot = Slot::Failed {
                    model_id: config.model_id,
                    error: err.to_string(),
                };
                Err(err)
            }
        }
    }

    /// Snapshot of the current state. Never fails.
    pub fn status(&self) -> SessionStatus {
        match &*self.lock() {
            Slot::Uninitialized => SessionStatus {
                status: SessionState::Uninitialized,
                model_id: None,
                session: None,
                error: None,
            },
            Slot::Initializing { model_id } => SessionStatus {
                status: SessionState::Initializing,
                model_id: Some(model_id.clone()),
                session: None,
                error: None,
            },
            Slot::Ready(session) => SessionStatus {
                status: SessionState::Ready,
                model_id: Some(session.info().model_id.clone()),
                session: Some(session.info().clone()),
                error: None,
            },
            Slot::Failed { model_id, error } => SessionStatus {
                status: SessionState::Failed,
                model_id: Some(model_id.clone()),
                session: None,
                error: Some(error.clone()),
            },
        }
    }

    /// The ready session, if any.
    pub fn current(&self) -> Option<Session> {
        match &*self.lock() {
            Slot::Ready(session) => Some(session.clone()),
            _ => None,
        }
    }

    /// The ready session, or `SessionNotReady`.
    pub fn ready_session(&self) -> Result<Session, StageError> {
        self.current().ok_or(StageError::SessionNotReady)
    }
}

/// Marks the slot `Failed` if an in-flight init is dropped before finishing.
struct InitGuard<'a> {
    slot: &'a Mutex<Slot>,
    model_id: String,
    armed: bool,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("Initialization of {} was cancelled", self.model_id);
            *lock_slot(self.slot) = Slot::Failed {
                model_id: std::mem::take(&mut self.model_id),
                error: "initialization cancelled".to_string(),
            };
        }
    }
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    // State transitions are single assignments, so a poisoned slot is still consistent.
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn validate_config(config: &ModelConfig) -> Result<(), InitError> {
    if config.model_id.trim().is_empty() {
        return Err(InitError::InvalidConfig("model_id must not be empty".into()));
    }
    let base_url = config.base_url.trim();
    if base_url.is_empty() {
        return Err(InitError::InvalidConfig("base_url must not be empty".into()));
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(InitError::InvalidConfig(format!(
            "base_url must be an http(s) URL, got {}",
            base_url
        )));
    }
    Ok(())
}
