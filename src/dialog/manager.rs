use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Notify;
use tracing::Instrument;

use super::cache::{CacheStore, StoreError, flush_cache, load_cache};
use super::context::Context;
use super::handlers::{Handler, HandlerSet};
use super::platform::{ChatPlatform, InboundMessage};
use super::registry::{Route, SessionEntry, SessionRegistry, SessionStatus, TeardownGate};
use crate::IntentClassifier;
use crate::IntentMeta;
use crate::settings::DEFAULT_APOLOGY;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no handler registered for intent {0:?}")]
    MissingHandler(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("failed to load cache for user {user}: {source}")]
    CacheLoad {
        user: String,
        #[source]
        source: StoreError,
    },
    #[error("no handler registered for intent {0:?}")]
    UnknownHandler(String),
}

/// What [`DialogManager::handle`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Queued for the user's running session.
    Resumed,
    /// Opened a new session.
    Started { session: u64, intent: IntentMeta },
}

/// Routes inbound messages to per-user sessions.
///
/// Every user has at most one session. A message from a user with a running
/// session is queued for it; any other message is classified and starts a
/// new session on its own task. When a session ends it is deregistered and
/// its cache is flushed, in that order, whether the handler returned, failed
/// or panicked.
pub struct DialogManager {
    classifier: IntentClassifier,
    handlers: HandlerSet,
    registry: SessionRegistry,
    store: Arc<dyn CacheStore>,
    platform: Arc<dyn ChatPlatform>,
    apology: Arc<str>,
    next_session: AtomicU64,
    live: Arc<LiveSessions>,
}

impl std::fmt::Debug for DialogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogManager")
            .field("handlers", &self.handlers)
            .field("registry", &self.registry)
            .field("live", &self.live.count.load(Ordering::Acquire))
            .finish()
    }
}

#[derive(Default)]
struct LiveSessions {
    count: AtomicUsize,
    idle: Notify,
}

impl LiveSessions {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn exit(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl DialogManager {
    /// Fails when some intent the classifier can produce has no handler.
    pub fn new(
        classifier: IntentClassifier,
        handlers: HandlerSet,
        store: Arc<dyn CacheStore>,
        platform: Arc<dyn ChatPlatform>,
    ) -> Result<Self, ConfigError> {
        handlers.validate(&classifier)?;
        Ok(Self {
            classifier,
            handlers,
            registry: SessionRegistry::default(),
            store,
            platform,
            apology: Arc::from(DEFAULT_APOLOGY),
            next_session: AtomicU64::new(1),
            live: Arc::new(LiveSessions::default()),
        })
    }

    /// Text sent to the user when a conversation fails.
    pub fn with_apology(mut self, apology: impl Into<String>) -> Self {
        self.apology = Arc::from(apology.into());
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Route one inbound message. Returns as soon as the message is queued or
    /// its session is spawned; it never waits for a handler to finish.
    pub async fn handle(&self, message: InboundMessage) -> Result<Dispatch, DialogError> {
        let user_key = message.sender.to_string();
        let span = tracing::debug_span!("dispatch", user = %user_key, message = %message.id);

        async move {
            match self.registry.route(&user_key, message) {
                Route::Delivered => {
                    tracing::debug!("queued for running session");
                    Ok(Dispatch::Resumed)
                }
                Route::Vacant(message) => self.start_session(user_key, message).await,
                Route::Closing(message) => {
                    tracing::debug!("previous session is closing, starting a new one after its teardown");
                    self.start_session(user_key, message).await
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Resolve once no session is running.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.live.idle.notified();
            if self.live.count.load(Ordering::Acquire) == 0 {
                return;
            }
            idle.await;
        }
    }

    async fn start_session(&self, user_key: String, message: InboundMessage) -> Result<Dispatch, DialogError> {
        let intent = self.classifier.classify(&message.text);
        let handler = self
            .handlers
            .get(intent.handler_id())
            .ok_or_else(|| DialogError::UnknownHandler(intent.handler_id().to_string()))?;

        // The previous session of this user may still be flushing.
        self.registry.wait_for_teardown(&user_key).await;
        let mut cache = load_cache(self.store.as_ref(), &user_key)
            .await
            .map_err(|source| DialogError::CacheLoad { user: user_key.clone(), source })?;
        cache.last_phrase = Some(message.text.clone());

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let status = SessionStatus::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let gate = self.registry.register(&user_key, SessionEntry::new(id, tx, status.clone()));

        let ctx = Context::new(
            user_key.clone(),
            message,
            intent.clone(),
            rx,
            cache,
            self.platform.clone(),
            self.classifier.clone(),
            status,
        );
        let teardown = Teardown {
            registry: self.registry.clone(),
            store: self.store.clone(),
            apology: self.apology.clone(),
            live: self.live.clone(),
            gate,
        };

        tracing::info!(session = id, intent = %intent, "session started");
        let span = tracing::info_span!("session", user = %user_key, id, intent = %intent);
        self.live.enter();
        tokio::spawn(run_session(id, handler, ctx, teardown).instrument(span));

        Ok(Dispatch::Started { session: id, intent })
    }
}

/// What a session task needs once its handler is done.
struct Teardown {
    registry: SessionRegistry,
    store: Arc<dyn CacheStore>,
    apology: Arc<str>,
    live: Arc<LiveSessions>,
    gate: TeardownGate,
}

async fn run_session(id: u64, handler: Arc<dyn Handler>, mut ctx: Context, teardown: Teardown) {
    ctx.mark_running();

    let failed = match AssertUnwindSafe(handler.handle(&mut ctx)).catch_unwind().await {
        Ok(Ok(())) => false,
        Ok(Err(err)) => {
            tracing::error!(error = %err, "handler failed");
            true
        }
        Err(panic) => {
            tracing::error!(panic = panic_message(panic.as_ref()), "handler panicked");
            true
        }
    };
    if failed {
        if let Err(err) = ctx.reply(&teardown.apology).await {
            tracing::warn!(error = %err, "could not deliver apology");
        }
    }

    let (user_key, cache, unread) = ctx.finish();
    for message in &unread {
        tracing::debug!(message = %message.id, text = %message.text, "dropping message that arrived after the last wait");
    }

    let Teardown { registry, store, live, gate, .. } = teardown;
    registry.deregister(&user_key, id);
    if let Err(err) = flush_cache(store.as_ref(), &user_key, &cache).await {
        tracing::error!(error = %err, "failed to flush cache");
    }
    registry.finish_teardown(&user_key, id, gate);
    tracing::debug!("session finished");
    live.exit();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
