//! Progress stream sessions: one transport in, one ordered event sequence out.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::{PullError, GENERIC_PULL_FAILURE};
use crate::progress::decoder::{Record, StreamDecoder};
use crate::progress::event::{ProgressEvent, SessionState};
use crate::progress::transport::{Frame, Transport};
use crate::progress::wire::{map_push_event, map_stream_record, WireUpdate};

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

pub const STALLED_MESSAGE: &str = "download stalled";

/// Called with every event right before the consumer receives it.
pub(crate) type DeliveryHook = Box<dyn FnMut(&ProgressEvent) + Send>;

pub fn new_session_id() -> u64 {
    SESSION_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// State visible to both the consumer and any number of cancel handles.
pub(crate) struct SessionShared {
    key: String,
    id: u64,
    state: Mutex<SessionState>,
    cancelled: AtomicBool,
    wake: Notify,
}

impl SessionShared {
    pub(crate) fn new(key: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            id: new_session_id(),
            state: Mutex::new(SessionState::Pending),
            cancelled: AtomicBool::new(false),
            wake: Notify::new(),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns true only for the call that actually requested cancellation.
    fn cancel(&self) -> bool {
        let state = self.state.lock();
        if state.is_terminal() || self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        drop(state);
        self.wake.notify_one();
        debug!(key = %self.key, session_id = self.id, "Pull cancellation requested");
        true
    }

    fn mark_active(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Pending {
            *state = SessionState::Active;
        }
    }
}

/// Cloneable handle used to observe or cancel a session owned elsewhere.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    pub fn key(&self) -> &str {
        &self.shared.key
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.lock().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Request cancellation. Idempotent; a no-op once a terminal event has
    /// been delivered. The consumer sees exactly one `Aborted` at its next poll.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("key", &self.shared.key)
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

enum Step {
    Woken,
    Frame(Option<Result<Frame, PullError>>),
    Stalled,
}

/// A single pull's event sequence. Single consumer, not restartable.
pub struct PullSession {
    shared: Arc<SessionShared>,
    transport: Option<Transport>,
    decoder: StreamDecoder,
    pending: VecDeque<WireUpdate>,
    delivered_any: bool,
    last_counts: (u64, Option<u64>),
    finished: bool,
    stall_timeout: Option<Duration>,
    hook: Option<DeliveryHook>,
}

impl PullSession {
    /// A session not tracked by any registry.
    pub fn new(key: impl Into<String>, transport: Transport) -> Self {
        Self::from_shared(SessionShared::new(key), transport)
    }

    pub(crate) fn from_shared(shared: Arc<SessionShared>, transport: Transport) -> Self {
        debug!(
            key = %shared.key,
            session_id = shared.id,
            transport = transport.kind().as_str(),
            "Pull session created"
        );
        Self {
            shared,
            transport: Some(transport),
            decoder: StreamDecoder::new(),
            pending: VecDeque::new(),
            delivered_any: false,
            last_counts: (0, None),
            finished: false,
            stall_timeout: None,
            hook: None,
        }
    }

    /// Fail the pull if no frame arrives within `timeout`.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    pub(crate) fn with_hook(mut self, hook: DeliveryHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn key(&self) -> &str {
        &self.shared.key
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.lock().clone()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.shared.clone())
    }

    /// Whether the underlying connection is still held.
    pub fn holds_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Cancel from the consuming side; the connection is closed immediately.
    pub fn cancel(&mut self) -> bool {
        let requested = self.shared.cancel();
        if requested {
            self.release_transport();
        }
        requested
    }

    /// The remaining events as a stream.
    pub fn events(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(self, |mut session| async move {
            session.next_event().await.map(|event| (event, session))
        })
    }

    /// Next event in wire order, or `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            if self.finished {
                return None;
            }
            if self.shared.is_cancelled() {
                return Some(self.conclude(ProgressEvent::Aborted));
            }
            if let Some(update) = self.pending.pop_front() {
                return Some(self.deliver(update));
            }
            let step = match self.transport.as_mut() {
                Some(transport) => {
                    let wake = self.shared.wake.notified();
                    tokio::select! {
                        biased;
                        _ = wake => Step::Woken,
                        step = read_frame(transport, self.stall_timeout) => step,
                    }
                }
                None => {
                    return Some(self.conclude(ProgressEvent::Failed {
                        message: GENERIC_PULL_FAILURE.to_string(),
                    }))
                }
            };
            match step {
                Step::Woken => continue,
                Step::Frame(frame) => self.handle_frame(frame),
                Step::Stalled => {
                    warn!(key = %self.shared.key, session_id = self.shared.id, "Pull stalled");
                    self.release_transport();
                    self.pending.push_back(WireUpdate::Event(ProgressEvent::Failed {
                        message: STALLED_MESSAGE.to_string(),
                    }));
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Option<Result<Frame, PullError>>) {
        match frame {
            Some(Ok(Frame::Event(event))) => {
                self.shared.mark_active();
                match map_push_event(&event) {
                    Some(mapped) => self.enqueue(mapped),
                    None => debug!(event = %event.name, "Ignoring push-channel event"),
                }
            }
            Some(Ok(Frame::Chunk(chunk))) => {
                self.shared.mark_active();
                let records = self.decoder.feed(&chunk);
                self.enqueue_records(records);
            }
            Some(Err(err)) => {
                warn!(
                    key = %self.shared.key,
                    session_id = self.shared.id,
                    error = %err,
                    "Pull transport failed"
                );
                self.release_transport();
                self.pending.push_back(WireUpdate::Event(ProgressEvent::Failed {
                    message: GENERIC_PULL_FAILURE.to_string(),
                }));
            }
            None => {
                let records = self.decoder.finish();
                self.enqueue_records(records);
                self.release_transport();
            }
        }
    }

    fn enqueue_records(&mut self, records: Vec<Record>) {
        for record in records {
            match record {
                Record::Data(value) => {
                    if let Some(update) = map_stream_record(value) {
                        let terminal = is_terminal(&update);
                        self.enqueue(update);
                        if terminal {
                            self.decoder.reset();
                            self.release_transport();
                            return;
                        }
                    }
                }
                Record::Malformed(err) => {
                    warn!(
                        key = %self.shared.key,
                        session_id = self.shared.id,
                        error = %err,
                        "Skipping malformed progress record"
                    );
                }
            }
        }
    }

    fn enqueue(&mut self, update: WireUpdate) {
        let terminal = is_terminal(&update);
        self.pending.push_back(update);
        if terminal {
            self.release_transport();
        }
    }

    /// `Started` opens the sequence; a status-only update after that keeps
    /// the last known byte counts and carries its own text.
    fn resolve(&self, update: WireUpdate) -> ProgressEvent {
        match update {
            WireUpdate::Event(event) => event,
            WireUpdate::Status(_) if !self.delivered_any => ProgressEvent::Started,
            WireUpdate::Status(status) => {
                let (completed, total) = self.last_counts;
                let status = if status.is_empty() {
                    "downloading".to_string()
                } else {
                    status
                };
                ProgressEvent::downloading(completed, total, status)
            }
        }
    }

    fn deliver(&mut self, update: WireUpdate) -> ProgressEvent {
        let event = self.resolve(update);
        if event.is_terminal() {
            return self.conclude(event);
        }
        {
            // Cancellation and delivery are ordered by the state lock.
            let _state = self.shared.state.lock();
            if self.shared.is_cancelled() {
                drop(_state);
                return self.conclude(ProgressEvent::Aborted);
            }
        }
        if let ProgressEvent::Downloading {
            completed_bytes,
            total_bytes,
            ..
        } = &event
        {
            self.last_counts = (*completed_bytes, *total_bytes);
        }
        self.delivered_any = true;
        if let Some(hook) = self.hook.as_mut() {
            hook(&event);
        }
        event
    }

    /// Enter the terminal state. A pending cancellation turns any terminal
    /// event into `Aborted`.
    fn conclude(&mut self, event: ProgressEvent) -> ProgressEvent {
        self.release_transport();
        self.pending.clear();
        self.decoder.reset();
        self.finished = true;
        let event = {
            let mut state = self.shared.state.lock();
            let event = if self.shared.is_cancelled() {
                ProgressEvent::Aborted
            } else {
                event
            };
            *state = SessionState::Terminal(event.clone());
            event
        };
        info!(
            key = %self.shared.key,
            session_id = self.shared.id,
            outcome = event.kind(),
            "Pull session finished"
        );
        if let Some(hook) = self.hook.as_mut() {
            hook(&event);
        }
        event
    }

    fn release_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            debug!(
                key = %self.shared.key,
                session_id = self.shared.id,
                transport = transport.kind().as_str(),
                "Releasing pull transport"
            );
            drop(transport);
        }
    }
}

impl Drop for PullSession {
    fn drop(&mut self) {
        if !self.finished {
            // An unconsumed session must not keep its registry slot.
            self.shared.cancelled.store(true, Ordering::Release);
            self.conclude(ProgressEvent::Aborted);
        }
    }
}

impl fmt::Debug for PullSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullSession")
            .field("key", &self.shared.key)
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("holds_transport", &self.transport.is_some())
            .finish()
    }
}

fn is_terminal(update: &WireUpdate) -> bool {
    matches!(update, WireUpdate::Event(event) if event.is_terminal())
}

async fn read_frame(transport: &mut Transport, stall_timeout: Option<Duration>) -> Step {
    match stall_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, transport.next_frame()).await {
            Ok(frame) => Step::Frame(frame),
            Err(_) => Step::Stalled,
        },
        None => Step::Frame(transport.next_frame().await),
    }
}
