//! Test doubles for the dialog engine.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};

use super::cache::{Cache, CacheStore, MemoryCacheStore, StoreError};
use super::context::Context;
use super::platform::{ChatPlatform, InboundMessage, MessageId, PlatformError, RichContent};
use super::registry::SessionStatus;
use crate::IntentClassifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { to: MessageId, text: String },
    Rich { to: MessageId, content: RichContent },
    Reaction { to: MessageId, emoji: String },
}

/// Platform that records every outbound action.
#[derive(Default)]
pub struct RecordingPlatform {
    sent: Mutex<Vec<Sent>>,
    emoji: HashMap<String, String>,
    failing: AtomicBool,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_emoji(name: &str, token: &str) -> Self {
        Self { emoji: HashMap::from([(name.to_string(), token.to_string())]), ..Self::default() }
    }

    /// Make every outbound call fail from now on.
    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn rich(&self) -> Vec<RichContent> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Rich { content, .. } => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn reactions(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Reaction { emoji, .. } => Some(emoji),
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) -> Result<(), PlatformError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PlatformError::Delivery("platform offline".into()));
        }
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    async fn send_text(&self, to: &InboundMessage, text: &str) -> Result<(), PlatformError> {
        self.record(Sent::Text { to: to.id, text: text.to_string() })
    }

    async fn send_rich(&self, to: &InboundMessage, content: &RichContent) -> Result<(), PlatformError> {
        self.record(Sent::Rich { to: to.id, content: content.clone() })
    }

    async fn add_reaction(&self, to: &InboundMessage, emoji: &str) -> Result<(), PlatformError> {
        self.record(Sent::Reaction { to: to.id, emoji: emoji.to_string() })
    }

    fn custom_emoji(&self, name: &str) -> Option<String> {
        self.emoji.get(name).cloned()
    }
}

/// Memory store that counts writes per key. With a write delay, `set`
/// suspends before the value lands.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryCacheStore,
    sets: Mutex<HashMap<String, usize>>,
    write_delay: Option<Duration>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_delay(delay: Duration) -> Self {
        Self { write_delay: Some(delay), ..Self::default() }
    }

    pub fn set_count(&self, key: &str) -> usize {
        self.sets.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub async fn cache(&self, key: &str) -> Cache {
        super::cache::load_cache(&self.inner, key).await.unwrap()
    }
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        *self.sets.lock().unwrap().entry(key.to_string()).or_default() += 1;
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.set(key, value).await
    }
}

/// A context for user `10` opened by `text`, plus the sending half of its
/// reply channel.
pub fn context_with_channel(
    platform: Arc<dyn ChatPlatform>,
    text: &str,
) -> (Context, UnboundedSender<InboundMessage>) {
    let classifier = IntentClassifier::new().unwrap();
    let intent = classifier.classify(text);
    let (tx, rx) = mpsc::unbounded_channel();
    let ctx = Context::new(
        "10".to_string(),
        InboundMessage::new(1, 10, text),
        intent,
        rx,
        Cache::default(),
        platform,
        classifier,
        SessionStatus::new(),
    );
    (ctx, tx)
}
