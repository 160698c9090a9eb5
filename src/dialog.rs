//! Per-user dialog engine.
//!
//! ```text
//! InboundMessage ── DialogManager::handle
//!                     │
//!                     ├─ active session? ── push onto its reply channel
//!                     │
//!                     └─ classify ── HandlerSet ── load Cache ── Context
//!                                                               │
//!                                              spawn(run_session) ──> Handler::handle
//!                                                               │
//!                                              deregister, then flush Cache
//! ```
//!
//! - `platform.rs`: chat boundary ([`ChatPlatform`]) and message types.
//! - `cache.rs`: per-user [`Cache`] record and the [`CacheStore`]s.
//! - `registry.rs`: the [`SessionRegistry`] of running sessions.
//! - `context.rs`: what a handler sees, including `wait_for_reply`.
//! - `handlers.rs`: the built-in conversations.
//! - `manager.rs`: routing, session spawn and teardown.

#[path = "dialog/cache.rs"]
mod cache;
#[path = "dialog/context.rs"]
mod context;
#[path = "dialog/handlers.rs"]
mod handlers;
#[path = "dialog/manager.rs"]
mod manager;
#[path = "dialog/platform.rs"]
mod platform;
#[path = "dialog/registry.rs"]
mod registry;
#[cfg(test)]
#[path = "dialog/testing.rs"]
pub(crate) mod testing;

pub use cache::{Cache, CacheStore, JsonFileCacheStore, MemoryCacheStore, StoreError};
pub use context::Context;
pub use handlers::{
    GreetingHandler, Handler, HandlerError, HandlerSet, LastMatchHandler, LinkAccountHandler, SilenceHandler,
};
pub use manager::{ConfigError, DialogError, DialogManager, Dispatch};
pub use platform::{ChatPlatform, InboundMessage, MessageId, PlatformError, RichContent, UserId, normalize_emoji};
pub use registry::{SessionRegistry, SessionState};
