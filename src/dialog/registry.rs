//! In-memory map of active sessions, one per user key.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::watch;

use super::platform::InboundMessage;

/// Lifecycle of a session.
///
/// ```text
/// STARTING → RUNNING ⇄ AWAITING_REPLY → TERMINATED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Starting = 0,
    Running = 1,
    AwaitingReply = 2,
    Terminated = 3,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SessionState::Starting,
            1 => SessionState::Running,
            2 => SessionState::AwaitingReply,
            _ => SessionState::Terminated,
        }
    }
}

/// State cell shared between a session's registry entry and its context.
#[derive(Debug, Clone)]
pub(crate) struct SessionStatus(Arc<AtomicU8>);

impl SessionStatus {
    pub(crate) fn new() -> Self {
        SessionStatus(Arc::new(AtomicU8::new(SessionState::Starting as u8)))
    }

    pub(crate) fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

pub(crate) struct SessionEntry {
    pub(crate) id: u64,
    replies: UnboundedSender<InboundMessage>,
    status: SessionStatus,
}

impl SessionEntry {
    pub(crate) fn new(id: u64, replies: UnboundedSender<InboundMessage>, status: SessionStatus) -> Self {
        Self { id, replies, status }
    }
}

/// Held by a session task until its cache is flushed. Dropping it releases
/// everyone waiting in [`SessionRegistry::wait_for_teardown`].
#[derive(Debug)]
pub(crate) struct TeardownGate {
    _open: watch::Sender<()>,
}

/// Outcome of offering a message to the registry.
pub(crate) enum Route {
    /// Queued on the active session's reply channel.
    Delivered,
    /// No session for this user.
    Vacant(InboundMessage),
    /// The session stopped reading replies and is tearing down.
    Closing(InboundMessage),
}

/// Active sessions keyed by user. Cloning shares the same map.
///
/// A session stays in `teardowns` from registration until its cache is
/// flushed, which outlives its entry in `sessions`.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionEntry>>,
    teardowns: Arc<DashMap<String, (u64, watch::Receiver<()>)>>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").field("active", &self.sessions.len()).finish()
    }
}

impl SessionRegistry {
    pub fn is_active(&self, user_key: &str) -> bool {
        self.sessions.contains_key(user_key)
    }

    /// Current state of `user_key`'s session, if one is registered.
    pub fn state(&self, user_key: &str) -> Option<SessionState> {
        self.sessions.get(user_key).map(|entry| entry.status.get())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }

    /// Register `entry` and return the gate its task holds until teardown
    /// is complete.
    pub(crate) fn register(&self, user_key: &str, entry: SessionEntry) -> TeardownGate {
        let (open, closed) = watch::channel(());
        self.teardowns.insert(user_key.to_string(), (entry.id, closed));
        if let Some(previous) = self.sessions.insert(user_key.to_string(), entry) {
            tracing::warn!(user = user_key, session = previous.id, "replaced a session that never deregistered");
        }
        TeardownGate { _open: open }
    }

    /// Wait until the last session registered for `user_key` has flushed its
    /// cache. Returns at once when there is none.
    pub(crate) async fn wait_for_teardown(&self, user_key: &str) {
        let pending = self.teardowns.get(user_key).map(|entry| entry.1.clone());
        if let Some(mut closed) = pending {
            // Nothing is ever sent, so this only resolves when the gate drops.
            let _ = closed.changed().await;
        }
    }

    /// Release session `id`'s gate once its cache is flushed.
    pub(crate) fn finish_teardown(&self, user_key: &str, id: u64, gate: TeardownGate) {
        self.teardowns.remove_if(user_key, |_, (gate_id, _)| *gate_id == id);
        drop(gate);
    }

    /// Offer `message` to the active session of `user_key`.
    pub(crate) fn route(&self, user_key: &str, message: InboundMessage) -> Route {
        let sent = match self.sessions.get(user_key) {
            Some(entry) => entry.replies.send(message),
            None => return Route::Vacant(message),
        };

        match sent {
            Ok(()) => Route::Delivered,
            Err(SendError(message)) => Route::Closing(message),
        }
    }

    /// Remove session `id` of `user_key`. A newer session under the same key
    /// is left alone.
    pub(crate) fn deregister(&self, user_key: &str, id: u64) -> bool {
        self.sessions.remove_if(user_key, |_, entry| entry.id == id).is_some()
    }
}
