//! API handlers and response shapes

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Serialize;

use crate::diff::{categorize_strings, CategoryBlock, DepotChange, UpdateType};

use super::SharedApiState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub app_id: u32,
    pub app_name: String,
    pub change_number: String,
    pub build_id: String,
    pub player_count: u64,
    pub status: String,
    pub uptime_seconds: u64,
    pub has_update: bool,
    pub last_check: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<UpdateSummary>,
}

#[derive(Serialize)]
pub struct UpdateSummary {
    pub old_version: String,
    pub new_version: String,
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    pub type_reason: String,
    pub depots_changed: usize,
    pub new_protobufs: usize,
    pub new_strings: usize,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
}

#[derive(Default, Serialize)]
pub struct DiffResponse {
    pub has_diff: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub old_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub new_version: String,
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub type_reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depots: Vec<DepotChange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub new_protobufs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub new_strings: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub analysis: String,
}

#[derive(Serialize)]
pub struct DiffDetailsResponse {
    pub has_data: bool,
    pub old_version: String,
    pub new_version: String,
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    pub type_reason: String,
    pub analysis: String,
    pub string_blocks: Vec<CategoryBlock>,
    pub protobuf_list: Vec<String>,
    pub depot_blocks: Vec<DepotBlock>,
    pub timestamp: i64,
}

#[derive(Serialize)]
pub struct DepotBlock {
    pub id: String,
    pub name: String,
    pub old_gid: String,
    pub new_gid: String,
    pub platform: String,
}

#[derive(Serialize)]
pub struct DepotsResponse {
    pub app_id: u32,
    pub total_depots: usize,
    pub depots: Vec<DepotDescriptor>,
    pub last_changed: Vec<DepotChange>,
}

#[derive(Serialize)]
pub struct DepotDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub platform: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Serialize)]
pub struct PlayersResponse {
    pub app_id: u32,
    pub player_count: u64,
    pub timestamp: i64,
}

#[derive(Serialize)]
pub struct NewsResponse {
    pub app_id: u32,
    pub count: usize,
    pub news: Vec<NewsEntry>,
}

#[derive(Serialize)]
pub struct NewsEntry {
    pub title: String,
    pub url: String,
    pub author: String,
    pub contents: String,
    pub date: i64,
    pub feed: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().timestamp(),
    })
}

pub async fn status(State(state): State<SharedApiState>) -> Json<StatusResponse> {
    let monitor = state.monitor.read().await.clone();
    let player_count = state.web.get_player_count(state.app_id).await.unwrap_or(0);

    let last_update = monitor.last_diff.as_ref().map(|diff| UpdateSummary {
        old_version: diff.old_version.clone(),
        new_version: diff.new_version.clone(),
        update_type: diff.update_type,
        type_reason: diff.type_reason.clone(),
        depots_changed: diff.changed_depots.len(),
        new_protobufs: diff.new_protobufs.len(),
        new_strings: diff.new_strings.len(),
    });

    Json(StatusResponse {
        app_id: state.app_id,
        app_name: monitor.app_name,
        change_number: monitor.change_number,
        build_id: monitor.build_id,
        player_count,
        status: "monitoring".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        has_update: last_update.is_some(),
        last_check: chrono::Utc::now().timestamp(),
        last_update,
    })
}

pub async fn diff(State(state): State<SharedApiState>) -> Json<DiffResponse> {
    let monitor = state.monitor.read().await;

    let Some(diff) = monitor.last_diff.as_ref() else {
        return Json(DiffResponse::default());
    };

    Json(DiffResponse {
        has_diff: true,
        old_version: diff.old_version.clone(),
        new_version: diff.new_version.clone(),
        update_type: diff.update_type,
        type_reason: diff.type_reason.clone(),
        depots: diff.changed_depots.clone(),
        new_protobufs: diff.new_protobufs.clone(),
        new_strings: diff.new_strings.clone(),
        analysis: diff.analysis.clone(),
    })
}

pub async fn diff_details(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let monitor = state.monitor.read().await;

    let Some(diff) = monitor.last_diff.as_ref() else {
        return Json(DiffDetailsResponse {
            has_data: false,
            old_version: String::new(),
            new_version: String::new(),
            update_type: UpdateType::Unknown,
            type_reason: String::new(),
            analysis: String::new(),
            string_blocks: Vec::new(),
            protobuf_list: Vec::new(),
            depot_blocks: Vec::new(),
            timestamp: chrono::Utc::now().timestamp(),
        })
        .into_response();
    };

    // The payload only changes when the change number does.
    let etag = format!("W/\"{}\"", monitor.change_number);
    if headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        == Some(etag.as_str())
    {
        return StatusCode::NOT_MODIFIED.into_response();
    }

    // Records persisted before categorization landed carry no blocks;
    // derive them on the fly.
    let string_blocks = if diff.categorized_strings.is_empty() {
        categorize_strings(&diff.new_strings)
    } else {
        diff.categorized_strings.clone()
    };

    let depot_blocks = diff
        .changed_depots
        .iter()
        .map(|d| DepotBlock {
            id: d.id.clone(),
            name: d.name.clone(),
            old_gid: d.old_gid.clone(),
            new_gid: d.new_gid.clone(),
            platform: depot_platform(&d.id).to_string(),
        })
        .collect();

    let body = DiffDetailsResponse {
        has_data: true,
        old_version: diff.old_version.clone(),
        new_version: diff.new_version.clone(),
        update_type: diff.update_type,
        type_reason: diff.type_reason.clone(),
        analysis: diff.analysis.clone(),
        string_blocks,
        protobuf_list: diff.new_protobufs.clone(),
        depot_blocks,
        timestamp: chrono::Utc::now().timestamp(),
    };

    (
        [
            (header::ETAG, etag),
            (
                header::CACHE_CONTROL,
                "public, max-age=60".to_string(),
            ),
        ],
        Json(body),
    )
        .into_response()
}

pub async fn depots(State(state): State<SharedApiState>) -> Json<DepotsResponse> {
    let known = known_depots();
    let monitor = state.monitor.read().await;

    let last_changed = monitor
        .last_diff
        .as_ref()
        .map(|d| d.changed_depots.clone())
        .unwrap_or_default();

    Json(DepotsResponse {
        app_id: state.app_id,
        total_depots: known.len(),
        depots: known,
        last_changed,
    })
}

pub async fn players(State(state): State<SharedApiState>) -> impl IntoResponse {
    match state.web.get_player_count(state.app_id).await {
        Ok(player_count) => Json(PlayersResponse {
            app_id: state.app_id,
            player_count,
            timestamp: chrono::Utc::now().timestamp(),
        })
        .into_response(),
        Err(err) => Json(ErrorResponse {
            error: err.to_string(),
        })
        .into_response(),
    }
}

pub async fn servers(State(state): State<SharedApiState>) -> impl IntoResponse {
    Json(state.web.get_server_status(state.app_id).await)
}

pub async fn news(State(state): State<SharedApiState>) -> impl IntoResponse {
    match state.web.get_news(state.app_id, 10).await {
        Ok(items) => {
            let news: Vec<NewsEntry> = items
                .into_iter()
                .map(|n| NewsEntry {
                    title: n.title,
                    url: n.url,
                    author: n.author,
                    contents: n.contents,
                    date: n.date,
                    feed: n.feed_label,
                })
                .collect();
            Json(NewsResponse {
                app_id: state.app_id,
                count: news.len(),
                news,
            })
            .into_response()
        }
        Err(err) => Json(ErrorResponse {
            error: err.to_string(),
        })
        .into_response(),
    }
}

fn known_depots() -> Vec<DepotDescriptor> {
    vec![
        DepotDescriptor { id: "731", name: "Public", platform: "all", kind: "content" },
        DepotDescriptor { id: "732", name: "Public (Beta)", platform: "all", kind: "content" },
        DepotDescriptor { id: "733", name: "Public (Debug)", platform: "all", kind: "content" },
        DepotDescriptor { id: "734", name: "Binaries", platform: "windows32", kind: "binary" },
        DepotDescriptor { id: "735", name: "Binaries Win64", platform: "windows64", kind: "binary" },
        DepotDescriptor { id: "736", name: "Binaries Linux", platform: "linux64", kind: "binary" },
        DepotDescriptor { id: "737", name: "Binaries Mac", platform: "macos", kind: "binary" },
        DepotDescriptor { id: "738", name: "Binaries Mac ARM", platform: "macos_arm", kind: "binary" },
        DepotDescriptor { id: "2347770", name: "CS2 Content", platform: "all", kind: "content" },
        DepotDescriptor { id: "2347771", name: "CS2 Low Violence", platform: "all", kind: "content" },
        DepotDescriptor { id: "2347779", name: "CS2 Dedicated Server", platform: "all", kind: "server" },
    ]
}

fn depot_platform(depot_id: &str) -> &'static str {
    match depot_id {
        "731" | "732" | "733" | "2347770" | "2347771" | "2347779" => "all",
        "734" => "windows32",
        "735" => "windows64",
        "736" => "linux64",
        "737" => "macos",
        "738" => "macos_arm",
        _ => "common",
    }
}
