//! Conversation bodies, keyed by the intent id that starts them.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::context::Context;
use super::manager::ConfigError;
use super::platform::PlatformError;
use crate::settings::Settings;
use crate::stats::{Hero, MatchStats, RecentMatch, StatsError};
use crate::{Game, IntentClassifier, intent_ids};

const COLOR_WIN: u32 = 0x2ecc71;
const COLOR_LOSS: u32 = 0xe74c3c;
const COLOR_UNKNOWN: u32 = 0x95a5a6;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error("{0}")]
    Failed(String),
}

/// A resumable conversation. It may call
/// [`Context::wait_for_reply`] any number of times before returning.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut Context) -> Result<(), HandlerError>;
}

/// Handlers by intent id.
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: BTreeMap<String, Arc<dyn Handler>>,
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, intent_id: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.insert(intent_id, handler);
        self
    }

    pub fn insert(&mut self, intent_id: impl Into<String>, handler: impl Handler + 'static) {
        self.handlers.insert(intent_id.into(), Arc::new(handler));
    }

    pub fn get(&self, intent_id: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(intent_id).cloned()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Check that every intent `classifier` can produce has a handler.
    pub fn validate(&self, classifier: &IntentClassifier) -> Result<(), ConfigError> {
        let produced = classifier.intent_ids();
        if let Some(missing) = produced.iter().find(|id| !self.handlers.contains_key(**id)) {
            return Err(ConfigError::MissingHandler(missing.to_string()));
        }
        for id in self.handlers.keys().filter(|id| !produced.contains(&id.as_str())) {
            tracing::warn!(intent = %id, "handler is registered for an intent the grammar never produces");
        }
        Ok(())
    }

    /// The bot's built-in conversations.
    pub fn standard(stats: Arc<dyn MatchStats>, settings: &Settings) -> Self {
        HandlerSet::new()
            .with(intent_ids::GREETING, GreetingHandler)
            .with(intent_ids::SILENCE, SilenceHandler)
            .with(intent_ids::LINK_ACCOUNT, LinkAccountHandler)
            .with(intent_ids::LAST_MATCH, LastMatchHandler::new(stats, settings.reply_timeout, settings.reply_attempts))
    }
}

pub struct GreetingHandler;

#[async_trait]
impl Handler for GreetingHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<(), HandlerError> {
        ctx.reply("Здарова").await?;
        Ok(())
    }
}

/// Fallback: the bot has nothing to say, so it just reacts.
pub struct SilenceHandler;

#[async_trait]
impl Handler for SilenceHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<(), HandlerError> {
        ctx.add_reaction("clueless").await?;
        Ok(())
    }
}

pub struct LinkAccountHandler;

#[async_trait]
impl Handler for LinkAccountHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<(), HandlerError> {
        let account_id =
            ctx.intent().account_id().ok_or_else(|| HandlerError::Failed("link intent without account id".into()))?;

        ctx.cache_mut().linked_account_id = Some(account_id);
        tracing::info!(account_id, "account linked");

        ctx.add_reaction("ok_hand").await?;
        ctx.reply(&format!("Запомнил, твой аккаунт OpenDota: {account_id}")).await?;
        Ok(())
    }
}

/// Shows the user's latest Dota match, asking for a profile link first when
/// none is linked yet.
pub struct LastMatchHandler {
    stats: Arc<dyn MatchStats>,
    reply_timeout: Duration,
    attempts: u32,
}

impl LastMatchHandler {
    pub fn new(stats: Arc<dyn MatchStats>, reply_timeout: Duration, attempts: u32) -> Self {
        Self { stats, reply_timeout, attempts: attempts.max(1) }
    }

    /// Ask for an OpenDota profile link. `None` when the user went quiet or
    /// never sent anything usable.
    async fn ask_for_account(&self, ctx: &mut Context) -> Result<Option<u64>, HandlerError> {
        ctx.reply("Скинь ссылку на свой профиль OpenDota").await?;

        for attempt in 1..=self.attempts {
            if !ctx.wait_for_reply(self.reply_timeout).await {
                return Ok(None);
            }
            if let Some(account_id) = ctx.classify_current().account_id() {
                return Ok(Some(account_id));
            }
            if attempt < self.attempts {
                ctx.reply("Это не ссылка на профиль OpenDota, попробуй ещё раз").await?;
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Handler for LastMatchHandler {
    async fn handle(&self, ctx: &mut Context) -> Result<(), HandlerError> {
        let game = ctx.intent().game().unwrap_or(Game::Dota);
        if game == Game::Pubg {
            ctx.reply(&format!("Ты что, играешь в {game}?")).await?;
            return Ok(());
        }

        let account_id = match ctx.cache().linked_account_id {
            Some(id) => id,
            None => match self.ask_for_account(ctx).await? {
                Some(id) => {
                    ctx.cache_mut().linked_account_id = Some(id);
                    id
                }
                None => {
                    ctx.reply("Не дождался ссылки, спроси ещё раз когда найдёшь").await?;
                    return Ok(());
                }
            },
        };

        let Some(recent) = self.stats.recent_match(account_id).await? else {
            ctx.reply("Не нашёл у тебя ни одной игры").await?;
            return Ok(());
        };
        let hero = match recent.hero_id {
            Some(hero_id) => self.stats.hero(hero_id).await?,
            None => None,
        };

        let card = MatchCard::new(&recent, hero.as_ref());
        ctx.reply_with_rich_content(card.title, card.body, card.color, card.thumbnail_url).await?;
        Ok(())
    }
}

struct MatchCard {
    title: String,
    body: String,
    color: u32,
    thumbnail_url: Option<String>,
}

impl MatchCard {
    fn new(recent: &RecentMatch, hero: Option<&Hero>) -> Self {
        let hero_name = hero.map(|h| h.localized_name.as_str()).unwrap_or("Неизвестный герой");
        let (outcome, color) = match recent.won() {
            Some(true) => ("Победа", COLOR_WIN),
            Some(false) => ("Поражение", COLOR_LOSS),
            None => ("Результат неизвестен", COLOR_UNKNOWN),
        };

        let mut lines = vec![format!("K/D/A: {}", recent.kda())];
        if let (Some(gpm), Some(xpm)) = (recent.gold_per_min, recent.xp_per_min) {
            lines.push(format!("GPM/XPM: {gpm}/{xpm}"));
        }
        if let Some(duration) = recent.duration_label() {
            lines.push(format!("Длительность: {duration}"));
        }
        lines.push(format!("Режим: {}", recent.game_mode_name()));
        if let Some(date) = recent.start_date() {
            lines.push(format!("Дата: {date}"));
        }
        lines.push(recent.url());

        MatchCard {
            title: format!("{hero_name}: {outcome}"),
            body: lines.join("\n"),
            color,
            thumbnail_url: hero.map(Hero::icon_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::testing::{RecordingPlatform, context_with_channel};
    use crate::stats::MockMatchStats;
    use crate::{InboundMessage, settings::Settings};
    use mockall::predicate::eq;

    fn recent(won: bool) -> RecentMatch {
        RecentMatch {
            match_id: 99,
            player_slot: Some(1),
            radiant_win: Some(won),
            duration: Some(1805),
            game_mode: Some(23),
            hero_id: Some(8),
            start_time: Some(1700000000),
            kills: Some(5),
            deaths: Some(1),
            assists: Some(9),
            xp_per_min: Some(800),
            gold_per_min: Some(700),
            last_hits: Some(200),
        }
    }

    fn juggernaut() -> Hero {
        Hero { id: 8, name: "npc_dota_hero_juggernaut".into(), localized_name: "Juggernaut".into() }
    }

    #[test]
    fn match_card_reflects_outcome() {
        let card = MatchCard::new(&recent(true), Some(&juggernaut()));
        assert_eq!(card.title, "Juggernaut: Победа");
        assert_eq!(card.color, COLOR_WIN);
        assert!(card.body.contains("K/D/A: 5/1/9"));
        assert!(card.body.contains("GPM/XPM: 700/800"));
        assert!(card.body.contains("Длительность: 30:05"));
        assert!(card.body.contains("Режим: Turbo"));
        assert!(card.body.ends_with("https://www.opendota.com/matches/99"));
        assert_eq!(card.thumbnail_url.as_deref(), Some("https://steamcdn-a.akamaihd.net/apps/dota2/images/heroes/juggernaut_icon.png"));

        let card = MatchCard::new(&recent(false), None);
        assert_eq!(card.title, "Неизвестный герой: Поражение");
        assert_eq!(card.color, COLOR_LOSS);
        assert_eq!(card.thumbnail_url, None);
    }

    #[test]
    fn validate_reports_missing_handlers() {
        let classifier = IntentClassifier::new().unwrap();
        let handlers = HandlerSet::new().with(intent_ids::GREETING, GreetingHandler);
        assert!(matches!(handlers.validate(&classifier), Err(ConfigError::MissingHandler(_))));

        let stats: Arc<dyn MatchStats> = Arc::new(MockMatchStats::new());
        let handlers = HandlerSet::standard(stats, &Settings::default()).with("unused", GreetingHandler);
        assert!(handlers.validate(&classifier).is_ok());
        assert_eq!(handlers.ids(), vec!["greeting", "lastmatch", "link_account", "silence", "unused"]);
    }

    #[tokio::test]
    async fn pubg_is_answered_without_stats() {
        let platform = Arc::new(RecordingPlatform::new());
        let (mut ctx, _tx) = context_with_channel(platform.clone(), "lm pubg");
        let handler = LastMatchHandler::new(Arc::new(MockMatchStats::new()), Duration::from_secs(1), 1);

        handler.handle(&mut ctx).await.unwrap();
        assert_eq!(platform.texts(), vec!["Ты что, играешь в PUBG?".to_string()]);
    }

    #[tokio::test]
    async fn linked_account_goes_straight_to_stats() {
        let mut stats = MockMatchStats::new();
        stats.expect_recent_match().with(eq(55136643)).times(1).returning(|_| Ok(Some(recent(true))));
        stats.expect_hero().with(eq(8)).times(1).returning(|_| Ok(Some(juggernaut())));

        let platform = Arc::new(RecordingPlatform::new());
        let (mut ctx, _tx) = context_with_channel(platform.clone(), "lm");
        ctx.cache_mut().linked_account_id = Some(55136643);
        let handler = LastMatchHandler::new(Arc::new(stats), Duration::from_secs(1), 1);

        handler.handle(&mut ctx).await.unwrap();
        assert!(platform.texts().is_empty());
        assert_eq!(platform.rich()[0].title, "Juggernaut: Победа");
    }

    #[tokio::test(start_paused = true)]
    async fn asks_again_after_unusable_reply() {
        let mut stats = MockMatchStats::new();
        stats.expect_recent_match().with(eq(7)).times(1).returning(|_| Ok(None));

        let platform = Arc::new(RecordingPlatform::new());
        let (mut ctx, tx) = context_with_channel(platform.clone(), "last match");
        tx.send(InboundMessage::new(2, 10, "чего?")).unwrap();
        tx.send(InboundMessage::new(3, 10, "opendota.com/players/7")).unwrap();
        let handler = LastMatchHandler::new(Arc::new(stats), Duration::from_secs(30), 2);

        handler.handle(&mut ctx).await.unwrap();
        assert_eq!(ctx.cache().linked_account_id, Some(7));
        assert_eq!(
            platform.texts(),
            vec![
                "Скинь ссылку на свой профиль OpenDota".to_string(),
                "Это не ссылка на профиль OpenDota, попробуй ещё раз".to_string(),
                "Не нашёл у тебя ни одной игры".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_when_user_goes_quiet() {
        let platform = Arc::new(RecordingPlatform::new());
        let (mut ctx, _tx) = context_with_channel(platform.clone(), "lm");
        let handler = LastMatchHandler::new(Arc::new(MockMatchStats::new()), Duration::from_secs(30), 3);

        handler.handle(&mut ctx).await.unwrap();
        assert_eq!(ctx.cache().linked_account_id, None);
        assert_eq!(platform.texts().last().map(String::as_str), Some("Не дождался ссылки, спроси ещё раз когда найдёшь"));
    }

    #[tokio::test]
    async fn stats_failure_surfaces_as_error() {
        let mut stats = MockMatchStats::new();
        stats.expect_recent_match().returning(|_| Err(StatsError::Request("connection refused".into())));

        let platform = Arc::new(RecordingPlatform::new());
        let (mut ctx, _tx) = context_with_channel(platform, "lm");
        ctx.cache_mut().linked_account_id = Some(1);
        let handler = LastMatchHandler::new(Arc::new(stats), Duration::from_secs(1), 1);

        assert!(matches!(handler.handle(&mut ctx).await, Err(HandlerError::Stats(_))));
    }

    #[tokio::test]
    async fn link_account_stores_id_and_confirms() {
        let platform = Arc::new(RecordingPlatform::with_emoji("ok_hand", "👌"));
        let (mut ctx, _tx) = context_with_channel(platform.clone(), "привяжи https://www.opendota.com/players/55136643");

        LinkAccountHandler.handle(&mut ctx).await.unwrap();
        assert_eq!(ctx.cache().linked_account_id, Some(55136643));
        assert_eq!(platform.reactions(), vec!["👌".to_string()]);
        assert_eq!(platform.texts(), vec!["Запомнил, твой аккаунт OpenDota: 55136643".to_string()]);
    }

    #[tokio::test]
    async fn greeting_and_silence() {
        let platform = Arc::new(RecordingPlatform::new());
        let (mut ctx, _tx) = context_with_channel(platform.clone(), "привет");
        GreetingHandler.handle(&mut ctx).await.unwrap();

        let (mut ctx, _tx) = context_with_channel(platform.clone(), "бла бла");
        SilenceHandler.handle(&mut ctx).await.unwrap();

        assert_eq!(platform.texts(), vec!["Здарова".to_string()]);
        assert_eq!(platform.reactions(), vec![":clueless:".to_string()]);
    }
}
