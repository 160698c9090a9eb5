use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use super::cache::Cache;
use super::platform::{ChatPlatform, InboundMessage, PlatformError, RichContent, UserId, normalize_emoji};
use super::registry::{SessionState, SessionStatus};
use crate::{IntentClassifier, IntentMeta};

/// Everything a handler can see and do during one session.
///
/// The only place a handler suspends waiting for the user is
/// [`wait_for_reply`](Context::wait_for_reply).
pub struct Context {
    user_key: String,
    message: InboundMessage,
    intent: IntentMeta,
    replies: UnboundedReceiver<InboundMessage>,
    cache: Cache,
    platform: Arc<dyn ChatPlatform>,
    classifier: IntentClassifier,
    status: SessionStatus,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("user_key", &self.user_key)
            .field("message", &self.message)
            .field("intent", &self.intent)
            .field("cache", &self.cache)
            .field("state", &self.status.get())
            .finish()
    }
}

impl Context {
    pub(crate) fn new(
        user_key: String,
        message: InboundMessage,
        intent: IntentMeta,
        replies: UnboundedReceiver<InboundMessage>,
        cache: Cache,
        platform: Arc<dyn ChatPlatform>,
        classifier: IntentClassifier,
        status: SessionStatus,
    ) -> Self {
        Self { user_key, message, intent, replies, cache, platform, classifier, status }
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    /// Text of the current message: the opening one, or the latest reply.
    pub fn text(&self) -> &str {
        &self.message.text
    }

    pub fn sender(&self) -> UserId {
        self.message.sender
    }

    pub fn message(&self) -> &InboundMessage {
        &self.message
    }

    /// Intent of the message that opened the session.
    pub fn intent(&self) -> &IntentMeta {
        &self.intent
    }

    /// Classify the current message with the session's classifier.
    pub fn classify_current(&self) -> IntentMeta {
        self.classifier.classify(&self.message.text)
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut Cache {
        &mut self.cache
    }

    pub fn state(&self) -> SessionState {
        self.status.get()
    }

    pub(crate) fn mark_running(&self) {
        self.status.set(SessionState::Running);
    }

    pub async fn reply(&self, text: &str) -> Result<(), PlatformError> {
        self.platform.send_text(&self.message, text).await
    }

    pub async fn reply_with_rich_content(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
        color: u32,
        thumbnail_url: Option<String>,
    ) -> Result<(), PlatformError> {
        let content = RichContent { title: title.into(), body: body.into(), color, thumbnail_url };
        self.platform.send_rich(&self.message, &content).await
    }

    /// React to the current message. `emoji` goes through [`normalize_emoji`].
    pub async fn add_reaction(&self, emoji: &str) -> Result<(), PlatformError> {
        let emoji = normalize_emoji(self.platform.as_ref(), emoji);
        self.platform.add_reaction(&self.message, &emoji).await
    }

    /// Park until the user sends another message or `timeout` elapses.
    ///
    /// Returns `true` with the current message replaced by the reply, or
    /// `false` with the current message unchanged. The session stays open
    /// either way.
    pub async fn wait_for_reply(&mut self, timeout: Duration) -> bool {
        self.status.set(SessionState::AwaitingReply);
        let outcome = tokio::time::timeout(timeout, self.replies.recv()).await;
        self.status.set(SessionState::Running);

        match outcome {
            Ok(Some(message)) => {
                tracing::debug!(message = %message.id, "reply received");
                self.message = message;
                true
            }
            Ok(None) => {
                tracing::warn!("reply channel closed while waiting");
                false
            }
            Err(_) => {
                tracing::debug!(?timeout, "reply wait timed out");
                false
            }
        }
    }

    /// Stop accepting replies and hand back the cache plus any messages that
    /// arrived after the last wait.
    pub(crate) fn finish(mut self) -> (String, Cache, Vec<InboundMessage>) {
        self.replies.close();
        let mut unread = Vec::new();
        while let Ok(message) = self.replies.try_recv() {
            unread.push(message);
        }
        self.status.set(SessionState::Terminated);
        (self.user_key, self.cache, unread)
    }
}
