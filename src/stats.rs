//! Match statistics port and its OpenDota implementation.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default OpenDota API base URL.
pub const DEFAULT_OPENDOTA_BASE_URL: &str = "https://api.opendota.com";

/// How long the hero catalog is reused before it is fetched again.
pub const HERO_CATALOG_TTL: Duration = Duration::from_secs(60 * 60 * 24);

const HERO_IMAGE_BASE: &str = "https://steamcdn-a.akamaihd.net/apps/dota2/images/heroes";
const HERO_NAME_PREFIX: &str = "npc_dota_hero_";

const GAME_MODES: &[&str] = &[
    "Unknown",
    "All pick",
    "Captains mode",
    "Random draft",
    "Single draft",
    "All random",
    "Intro",
    "Diretide",
    "Reverse captains mode",
    "Greeviling",
    "Tutorial",
    "Mid only",
    "Least played",
    "Limited heroes",
    "Compendium matchmaking",
    "Custom",
    "Captains draft",
    "Balanced draft",
    "Ability draft",
    "Event",
    "All random death match",
    "1v1 mid",
    "All draft",
    "Turbo",
    "Mutation",
];

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("stats request failed: {0}")]
    Request(String),
    #[error("stats service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid stats response: {0}")]
    InvalidResponse(String),
}

/// A player's most recent match as reported by OpenDota.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecentMatch {
    pub match_id: u64,
    pub player_slot: Option<u16>,
    pub radiant_win: Option<bool>,
    /// Seconds.
    pub duration: Option<u32>,
    pub game_mode: Option<usize>,
    pub hero_id: Option<u32>,
    /// Unix seconds.
    pub start_time: Option<i64>,
    pub kills: Option<u32>,
    pub deaths: Option<u32>,
    pub assists: Option<u32>,
    pub xp_per_min: Option<u32>,
    pub gold_per_min: Option<u32>,
    pub last_hits: Option<u32>,
}

impl RecentMatch {
    /// Player slots below 128 are on the Radiant side.
    pub fn is_radiant(&self) -> bool {
        self.player_slot.is_none_or(|slot| slot < 128)
    }

    pub fn won(&self) -> Option<bool> {
        self.radiant_win.map(|radiant_win| radiant_win == self.is_radiant())
    }

    pub fn url(&self) -> String {
        format!("https://www.opendota.com/matches/{}", self.match_id)
    }

    /// Match start as `dd/mm/YYYY` (UTC).
    pub fn start_date(&self) -> Option<String> {
        let started = DateTime::from_timestamp(self.start_time?, 0)?;
        Some(started.format("%d/%m/%Y").to_string())
    }

    pub fn duration_label(&self) -> Option<String> {
        let secs = self.duration?;
        let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
        Some(if hours > 0 { format!("{hours}:{minutes:02}:{seconds:02}") } else { format!("{minutes}:{seconds:02}") })
    }

    pub fn game_mode_name(&self) -> &'static str {
        self.game_mode.and_then(|mode| GAME_MODES.get(mode).copied()).unwrap_or(GAME_MODES[0])
    }

    /// `kills/deaths/assists`, with `?` for missing values.
    pub fn kda(&self) -> String {
        let show = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string());
        format!("{}/{}/{}", show(self.kills), show(self.deaths), show(self.assists))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hero {
    pub id: u32,
    /// Internal name such as `npc_dota_hero_antimage`.
    pub name: String,
    pub localized_name: String,
}

impl Hero {
    pub fn icon_url(&self) -> String {
        let short = self.name.strip_prefix(HERO_NAME_PREFIX).unwrap_or(&self.name);
        format!("{HERO_IMAGE_BASE}/{short}_icon.png")
    }
}

/// Source of match statistics used by the last-match handler.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatchStats: Send + Sync {
    /// The most recent match of `account_id`, if the player has any.
    async fn recent_match(&self, account_id: u64) -> Result<Option<RecentMatch>, StatsError>;
    async fn hero(&self, hero_id: u32) -> Result<Option<Hero>, StatsError>;
}

struct HeroCatalog {
    fetched_at: Instant,
    by_id: HashMap<u32, Hero>,
}

impl HeroCatalog {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Client for the public OpenDota API.
pub struct OpenDotaClient {
    client: Client,
    base_url: String,
    heroes: RwLock<Option<HeroCatalog>>,
}

impl OpenDotaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|_| Client::new());

        Self { client, base_url: base_url.trim_end_matches('/').to_string(), heroes: RwLock::new(None) }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, StatsError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "opendota request");

        let response = self.client.get(&url).send().await.map_err(|e| StatsError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StatsError::Status { status: status.as_u16(), body });
        }

        response.json().await.map_err(|e| StatsError::InvalidResponse(e.to_string()))
    }

    async fn cached_hero(&self, hero_id: u32) -> Option<Option<Hero>> {
        let guard = self.heroes.read().await;
        let catalog = guard.as_ref().filter(|c| c.is_fresh(HERO_CATALOG_TTL))?;
        Some(catalog.by_id.get(&hero_id).cloned())
    }
}

impl Default for OpenDotaClient {
    fn default() -> Self {
        Self::new(DEFAULT_OPENDOTA_BASE_URL, Duration::from_secs(10))
    }
}

#[async_trait]
impl MatchStats for OpenDotaClient {
    async fn recent_match(&self, account_id: u64) -> Result<Option<RecentMatch>, StatsError> {
        let matches: Vec<RecentMatch> = self.get_json(&format!("/api/players/{account_id}/recentMatches?limit=1")).await?;
        Ok(matches.into_iter().next())
    }

    async fn hero(&self, hero_id: u32) -> Result<Option<Hero>, StatsError> {
        if let Some(hit) = self.cached_hero(hero_id).await {
            return Ok(hit);
        }

        let heroes: Vec<Hero> = self.get_json("/api/heroes").await?;
        tracing::info!(count = heroes.len(), "hero catalog refreshed");
        let by_id: HashMap<u32, Hero> = heroes.into_iter().map(|h| (h.id, h)).collect();
        let hero = by_id.get(&hero_id).cloned();
        *self.heroes.write().await = Some(HeroCatalog { fetched_at: Instant::now(), by_id });
        Ok(hero)
    }
}
