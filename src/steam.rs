//! Steam Web API client
//!
//! Read-only lookups used by the status API and the server-health poller:
//! current player count, game-server status, and the news feed. Responses
//! are cached behind a read/write lock with a short freshness window so the
//! HTTP handlers never hammer the upstream API.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

const API_BASE_URL: &str = "https://api.steampowered.com";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const CACHE_DURATION: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum SteamWebError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("player count unavailable")]
    PlayerCountUnavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub steam: String,
    pub cs2: String,
    pub matchmaking: String,
    pub sessions: String,
    pub scheduler: String,
    pub online_count: u64,
    pub timestamp: i64,
    pub cached: bool,
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self {
            steam: "unknown".to_string(),
            cs2: "unknown".to_string(),
            matchmaking: "unknown".to_string(),
            sessions: "unknown".to_string(),
            scheduler: "unknown".to_string(),
            online_count: 0,
            timestamp: 0,
            cached: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(default)]
    pub gid: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub contents: String,
    #[serde(default, rename = "feedlabel")]
    pub feed_label: String,
    #[serde(default)]
    pub date: i64,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    appnews: AppNews,
}

#[derive(Debug, Deserialize)]
struct AppNews {
    #[serde(default)]
    newsitems: Vec<NewsItem>,
}

#[derive(Debug, Deserialize)]
struct PlayerCountResponse {
    response: PlayerCountBody,
}

#[derive(Debug, Deserialize)]
struct PlayerCountBody {
    #[serde(default)]
    player_count: u64,
    #[serde(default)]
    result: i32,
}

#[derive(Debug, Default, Deserialize)]
struct GameServersResponse {
    #[serde(default)]
    result: GameServersResult,
}

#[derive(Debug, Default, Deserialize)]
struct GameServersResult {
    #[serde(default)]
    services: GameServices,
    #[serde(default)]
    matchmaking: Matchmaking,
}

#[derive(Debug, Default, Deserialize)]
struct GameServices {
    #[serde(default, rename = "SessionsLogon")]
    sessions_logon: String,
}

#[derive(Debug, Default, Deserialize)]
struct Matchmaking {
    #[serde(default)]
    scheduler: String,
    #[serde(default)]
    online_players: u64,
}

#[derive(Default)]
struct Cache {
    server_status: Option<(ServerStatus, Instant)>,
    player_count: Option<(u64, Instant)>,
}

pub struct SteamWebClient {
    http: reqwest::Client,
    api_key: Option<String>,
    cache: RwLock<Cache>,
}

impl SteamWebClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("TLS backend initializes"),
            api_key,
            cache: RwLock::new(Cache::default()),
        }
    }

    pub async fn get_player_count(&self, app_id: u32) -> Result<u64, SteamWebError> {
        {
            let cache = self.cache.read().await;
            if let Some((count, at)) = cache.player_count {
                if at.elapsed() < CACHE_DURATION && count > 0 {
                    return Ok(count);
                }
            }
        }

        let url = format!(
            "{API_BASE_URL}/ISteamUserStats/GetNumberOfCurrentPlayers/v1/?appid={app_id}"
        );
        let body: PlayerCountResponse = self.http.get(&url).send().await?.json().await?;

        if body.response.result != 1 {
            return Err(SteamWebError::PlayerCountUnavailable);
        }

        let count = body.response.player_count;
        self.cache.write().await.player_count = Some((count, Instant::now()));
        debug!(count, "refreshed player count");
        Ok(count)
    }

    /// Coarse service status, derived from the player count alone when no
    /// API key is configured.
    pub async fn get_server_status(&self, app_id: u32) -> ServerStatus {
        {
            let cache = self.cache.read().await;
            if let Some((status, at)) = &cache.server_status {
                if at.elapsed() < CACHE_DURATION {
                    let mut cached = status.clone();
                    cached.cached = true;
                    return cached;
                }
            }
        }

        let mut status = ServerStatus {
            timestamp: chrono::Utc::now().timestamp(),
            ..ServerStatus::default()
        };

        let player_count = self.get_player_count(app_id).await.unwrap_or(0);
        if player_count > 0 {
            status.steam = "online".to_string();
            status.cs2 = "online".to_string();
            status.online_count = player_count;
        }

        match &self.api_key {
            None => {
                if player_count > 100_000 {
                    status.matchmaking = "normal".to_string();
                } else if player_count > 0 {
                    status.matchmaking = "low".to_string();
                }
            }
            Some(key) => {
                if let Some(upstream) = self.fetch_game_servers_status(key).await {
                    let result = upstream.result;
                    status.sessions = non_empty_or(result.services.sessions_logon, "unknown");
                    let scheduler = non_empty_or(result.matchmaking.scheduler, "unknown");
                    status.matchmaking = scheduler.clone();
                    status.scheduler = scheduler;
                    if result.matchmaking.online_players > 0 {
                        status.online_count = result.matchmaking.online_players;
                    }
                }
            }
        }

        self.cache.write().await.server_status = Some((status.clone(), Instant::now()));
        status
    }

    async fn fetch_game_servers_status(&self, api_key: &str) -> Option<GameServersResponse> {
        let url = format!(
            "{API_BASE_URL}/ICSGOServers_730/GetGameServersStatus/v1/?key={api_key}"
        );
        let response = self.http.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json().await.ok()
    }

    pub async fn get_news(&self, app_id: u32, count: usize) -> Result<Vec<NewsItem>, SteamWebError> {
        let url = format!(
            "{API_BASE_URL}/ISteamNews/GetNewsForApp/v0002/?appid={app_id}&count={count}&maxlength=500&format=json"
        );
        let body: NewsResponse = self.http.get(&url).send().await?.json().await?;
        Ok(body.appnews.newsitems)
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
