//! At-most-one active pull per model name.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::backend::PullBackend;
use crate::error::PullError;
use crate::progress::bus::PullBus;
use crate::progress::event::{ProgressEvent, PullUpdate, SessionState};
use crate::progress::session::{PullSession, SessionHandle, SessionShared};
use crate::progress::transport::{Transport, TransportKind};

type SessionMap = Mutex<HashMap<String, SessionHandle>>;

/// Tracks active pull sessions by key. Cloning shares the same map.
#[derive(Clone)]
pub struct PullRegistry {
    sessions: Arc<SessionMap>,
    backend: Option<Arc<dyn PullBackend>>,
    bus: PullBus,
    stall_timeout: Option<Duration>,
}

impl PullRegistry {
    pub fn new(backend: Arc<dyn PullBackend>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            backend: Some(backend),
            bus: PullBus::default(),
            stall_timeout: None,
        }
    }

    /// A registry without a backend; sessions are added with [`attach`](Self::attach).
    pub fn detached() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            backend: None,
            bus: PullBus::default(),
            stall_timeout: None,
        }
    }

    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Ask the backend to start pulling `key` and track the resulting session.
    pub async fn start_pull(&self, key: &str, kind: TransportKind) -> Result<PullSession, PullError> {
        let backend = self
            .backend
            .clone()
            .ok_or_else(|| PullError::Backend("no pull backend configured".to_string()))?;
        let reservation = self.reserve(key)?;
        match backend.open(key, kind).await {
            Ok(transport) => Ok(reservation.into_session(transport)),
            Err(err) => {
                warn!(key = %key, error = %err, "Pull request was not accepted");
                Err(err)
            }
        }
    }

    /// Track a session over a transport the caller already opened.
    pub fn attach(&self, key: &str, transport: Transport) -> Result<PullSession, PullError> {
        Ok(self.reserve(key)?.into_session(transport))
    }

    /// Cancel and forget the session for `key`. Returns false if none was active.
    ///
    /// The key is free again as soon as this returns. The session itself owns
    /// the connection: it is closed when the consumer next polls (a consumer
    /// blocked on `next_event` is woken for this) or when the session is dropped.
    /// A consumer that neither polls nor drops its session keeps the socket open.
    pub fn abort(&self, key: &str) -> bool {
        let handle = self.sessions.lock().remove(key);
        match handle {
            Some(handle) => {
                handle.cancel();
                info!(key = %key, session_id = handle.id(), "Pull aborted");
                true
            }
            None => false,
        }
    }

    /// Keys with a pending or active session at this instant.
    pub fn snapshot(&self) -> BTreeSet<String> {
        self.sessions
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.state().is_terminal())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn state(&self, key: &str) -> Option<SessionState> {
        self.sessions.lock().get(key).map(SessionHandle::state)
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.state(key).map(|s| !s.is_terminal()).unwrap_or(false)
    }

    pub fn handle(&self, key: &str) -> Option<SessionHandle> {
        self.sessions.lock().get(key).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PullUpdate> {
        self.bus.subscribe()
    }

    fn reserve(&self, key: &str) -> Result<Reservation, PullError> {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(key) {
            if !existing.state().is_terminal() {
                return Err(PullError::AlreadyActive(key.to_string()));
            }
        }
        let shared = SessionShared::new(key);
        sessions.insert(key.to_string(), SessionHandle::new(shared.clone()));
        debug!(key = %key, session_id = shared.id(), "Pull slot reserved");
        Ok(Reservation {
            registry: self.clone(),
            shared,
            armed: true,
        })
    }

    fn wrap(&self, shared: Arc<SessionShared>, transport: Transport) -> PullSession {
        let sessions = Arc::downgrade(&self.sessions);
        let bus = self.bus.clone();
        let key = shared.key().to_string();
        let id = shared.id();
        let hook = Box::new(move |event: &ProgressEvent| {
            if event.is_terminal() {
                remove_if_owned(&sessions, &key, id);
            }
            bus.emit(key.clone(), id, event.clone());
        });
        let session = PullSession::from_shared(shared, transport).with_hook(hook);
        match self.stall_timeout {
            Some(timeout) => session.with_stall_timeout(timeout),
            None => session,
        }
    }
}

impl fmt::Debug for PullRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullRegistry")
            .field("active", &self.snapshot())
            .field("has_backend", &self.backend.is_some())
            .finish()
    }
}

/// Removes the entry only while it still belongs to session `id`, so a late
/// terminal event never evicts a newer pull for the same key.
fn remove_if_owned(sessions: &Weak<SessionMap>, key: &str, id: u64) {
    let Some(sessions) = sessions.upgrade() else {
        return;
    };
    let mut sessions = sessions.lock();
    if sessions.get(key).map(SessionHandle::id) == Some(id) {
        sessions.remove(key);
    }
}

/// A claimed slot. Released on drop unless turned into a session, so a
/// `start_pull` that fails or is itself dropped never leaves the key stuck.
struct Reservation {
    registry: PullRegistry,
    shared: Arc<SessionShared>,
    armed: bool,
}

impl Reservation {
    fn into_session(mut self, transport: Transport) -> PullSession {
        self.armed = false;
        self.registry.wrap(self.shared.clone(), transport)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            remove_if_owned(
                &Arc::downgrade(&self.registry.sessions),
                self.shared.key(),
                self.shared.id(),
            );
        }
    }
}
