//! Webhook notification
//!
//! Formats a finished [`DiffResult`] (or a service-status transition) as an
//! embed payload and POSTs it to every registered webhook. Delivery is
//! fan-out parallel with one task per URL; the broadcast waits for all of
//! them and failures are logged, never retried.

use serde::Serialize;
use tracing::{info, warn};

use crate::diff::{DiffResult, UpdateType};

/// Notable strings included inline in the embed.
const MAX_EMBED_STRINGS: usize = 10;

/// Changed depots listed in the embed before truncation.
const MAX_EMBED_DEPOTS: usize = 5;

/// Strings longer than this are noise in an embed field.
const MAX_EMBED_STRING_LEN: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub inline: bool,
}

/// A transition reported by the server-health poller.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub service: String,
    pub old_status: String,
    pub new_status: String,
    pub is_maintenance: bool,
}

pub struct WebhookNotifier {
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Broadcast a detected update to every webhook URL.
    pub async fn notify_update(&self, urls: &[String], app_name: &str, result: &DiffResult) {
        if urls.is_empty() {
            return;
        }

        let payload = build_update_payload(app_name, result);

        let mut files = Vec::new();
        if !result.raw_diff.is_empty() {
            files.push(("vdf_diff.txt", result.raw_diff.clone().into_bytes()));
        }
        if !result.analysis.is_empty() {
            files.push(("analysis.md", result.analysis.clone().into_bytes()));
        }

        self.broadcast(urls, payload, files).await;
    }

    /// Broadcast a service-status transition.
    pub async fn notify_status(&self, urls: &[String], update: &StatusUpdate) {
        if urls.is_empty() {
            return;
        }
        let payload = build_status_payload(update);
        self.broadcast(urls, payload, Vec::new()).await;
    }

    async fn broadcast(
        &self,
        urls: &[String],
        payload: WebhookPayload,
        files: Vec<(&'static str, Vec<u8>)>,
    ) {
        let tasks: Vec<_> = urls
            .iter()
            .map(|url| {
                let http = self.http.clone();
                let url = url.clone();
                let payload = payload.clone();
                let files = files.clone();
                tokio::spawn(async move {
                    if let Err(err) = send(&http, &url, &payload, files).await {
                        warn!(url, error = %err, "failed to deliver webhook");
                    }
                })
            })
            .collect();

        let _ = futures::future::join_all(tasks).await;

        info!(count = urls.len(), "webhook broadcast finished");
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

async fn send(
    http: &reqwest::Client,
    url: &str,
    payload: &WebhookPayload,
    files: Vec<(&'static str, Vec<u8>)>,
) -> Result<(), NotifyError> {
    let payload_json =
        serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());

    let mut form = reqwest::multipart::Form::new().text("payload_json", payload_json);
    for (filename, content) in files {
        form = form.part(
            format!("files[{filename}]"),
            reqwest::multipart::Part::bytes(content).file_name(filename),
        );
    }

    let response = http.post(url).multipart(form).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(NotifyError::Status(status.as_u16()));
    }
    Ok(())
}

fn build_update_payload(app_name: &str, result: &DiffResult) -> WebhookPayload {
    let mut embed = Embed {
        title: format!("{app_name} — Update Detected"),
        description: format!("~~*{}*~~ → `{}`", result.old_version, result.new_version),
        color: color_for_type(result.update_type),
        timestamp: chrono::Utc::now().to_rfc3339(),
        ..Embed::default()
    };

    if result.update_type != UpdateType::Unknown {
        embed.fields.push(EmbedField {
            name: "Update Type".to_string(),
            value: format!("**{}**", result.update_type),
            inline: true,
        });
    }

    if !result.type_reason.is_empty() {
        embed.fields.push(EmbedField {
            name: "Reason".to_string(),
            value: result.type_reason.clone(),
            inline: true,
        });
    }

    if !result.changed_depots.is_empty() {
        let mut value = String::new();
        for (i, depot) in result.changed_depots.iter().enumerate() {
            if i >= MAX_EMBED_DEPOTS {
                value.push_str(&format!(
                    "... and {} more\n",
                    result.changed_depots.len() - MAX_EMBED_DEPOTS
                ));
                break;
            }
            let name = if depot.name.is_empty() {
                "Unknown Depot"
            } else {
                depot.name.as_str()
            };
            value.push_str(&format!("**{}** (`{}`)\n", name, depot.id));
        }
        embed.fields.push(EmbedField {
            name: "Changed Depots".to_string(),
            value,
            inline: false,
        });
    }

    let notable = notable_strings_field(result);
    if !notable.is_empty() {
        embed.fields.push(EmbedField {
            name: "Notable Strings".to_string(),
            value: notable,
            inline: false,
        });
    }

    WebhookPayload {
        content: None,
        embeds: vec![embed],
    }
}

fn notable_strings_field(result: &DiffResult) -> String {
    let mut out = String::new();
    let mut count = 0usize;

    'blocks: for block in &result.categorized_strings {
        for s in &block.strings {
            if count >= MAX_EMBED_STRINGS {
                out.push_str("... and more");
                break 'blocks;
            }
            if s.len() < MAX_EMBED_STRING_LEN {
                out.push_str(&format!("`{s}`\n"));
                count += 1;
            }
        }
    }

    out
}

fn build_status_payload(update: &StatusUpdate) -> WebhookPayload {
    let (title, description, color) = if update.new_status == "offline"
        || update.new_status == "critical"
    {
        if update.is_maintenance {
            (
                "Steam Maintenance".to_string(),
                "Routine maintenance window detected; services may be unstable.".to_string(),
                0xFFA500,
            )
        } else {
            (
                format!("Service Alert: {}", update.service),
                format!(
                    "The service is currently **{}**.",
                    update.new_status.to_uppercase()
                ),
                0xFF0000,
            )
        }
    } else if update.new_status == "online" && update.old_status != "online" {
        (
            format!("Service Recovered: {}", update.service),
            "The service is operating normally again.".to_string(),
            0x00FF00,
        )
    } else {
        (
            format!("Service Status: {}", update.service),
            format!("Status changed to **{}**.", update.new_status),
            0x00FF00,
        )
    };

    WebhookPayload {
        content: None,
        embeds: vec![Embed {
            title,
            description,
            color,
            timestamp: chrono::Utc::now().to_rfc3339(),
            ..Embed::default()
        }],
    }
}

fn color_for_type(update_type: UpdateType) -> u32 {
    match update_type {
        UpdateType::Unknown => 0x808080,
        UpdateType::Feature => 0x00FF00,
        UpdateType::Patch => 0x00BFFF,
        UpdateType::Map => 0xFFD700,
        UpdateType::Item => 0xFF69B4,
        UpdateType::Localization => 0x9370DB,
        UpdateType::Server => 0xFF4500,
        UpdateType::Balance => 0xFFA500,
        UpdateType::AntiCheat => 0xFF0000,
        UpdateType::Cosmetic => 0xFF1493,
        UpdateType::Protobuf => 0x7B68EE,
    }
}

#[cfg(test)]
mod tests {
    use crate::diff::{CategoryBlock, DepotChange};

    use super::*;

    fn sample_result() -> DiffResult {
        DiffResult {
            old_version: "98000".to_string(),
            new_version: "99999".to_string(),
            update_type: UpdateType::Server,
            type_reason: "CS2 Dedicated Server depot changed".to_string(),
            changed_depots: vec![DepotChange {
                id: "2347779".to_string(),
                old_gid: "G_OLD".to_string(),
                new_gid: "G_NEW".to_string(),
                name: "CS2 Dedicated Server".to_string(),
            }],
            categorized_strings: vec![CategoryBlock {
                category: "network".to_string(),
                icon: String::new(),
                count: 2,
                strings: vec!["CMsgServerHello".to_string(), "x".repeat(60)],
            }],
            ..DiffResult::default()
        }
    }

    #[test]
    fn test_update_payload_fields() {
        let payload = build_update_payload("Counter-Strike 2", &sample_result());

        assert_eq!(payload.embeds.len(), 1);
        let embed = &payload.embeds[0];
        assert_eq!(embed.title, "Counter-Strike 2 — Update Detected");
        assert!(embed.description.contains("98000"));
        assert!(embed.description.contains("99999"));
        assert_eq!(embed.color, 0xFF4500);

        let names: Vec<&str> = embed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Update Type", "Reason", "Changed Depots", "Notable Strings"]
        );
    }

    #[test]
    fn test_long_strings_excluded_from_embed() {
        let payload = build_update_payload("App", &sample_result());
        let notable = payload
            .embeds[0]
            .fields
            .iter()
            .find(|f| f.name == "Notable Strings")
            .unwrap();

        assert!(notable.value.contains("CMsgServerHello"));
        assert!(!notable.value.contains(&"x".repeat(60)));
    }

    #[test]
    fn test_unknown_type_omits_type_field() {
        let mut result = sample_result();
        result.update_type = UpdateType::Unknown;
        result.type_reason.clear();

        let payload = build_update_payload("App", &result);
        assert!(payload.embeds[0]
            .fields
            .iter()
            .all(|f| f.name != "Update Type" && f.name != "Reason"));
    }

    #[test]
    fn test_depot_list_truncation() {
        let mut result = sample_result();
        result.changed_depots = (0..8)
            .map(|i| DepotChange {
                id: format!("73{i}"),
                old_gid: "a".to_string(),
                new_gid: "b".to_string(),
                name: String::new(),
            })
            .collect();

        let payload = build_update_payload("App", &result);
        let depots = payload.embeds[0]
            .fields
            .iter()
            .find(|f| f.name == "Changed Depots")
            .unwrap();

        assert!(depots.value.contains("... and 3 more"));
    }

    #[test]
    fn test_maintenance_status_payload() {
        let payload = build_status_payload(&StatusUpdate {
            service: "Steam".to_string(),
            old_status: "online".to_string(),
            new_status: "offline".to_string(),
            is_maintenance: true,
        });

        assert_eq!(payload.embeds[0].title, "Steam Maintenance");
        assert_eq!(payload.embeds[0].color, 0xFFA500);
    }

    #[test]
    fn test_recovery_status_payload() {
        let payload = build_status_payload(&StatusUpdate {
            service: "CS2".to_string(),
            old_status: "offline".to_string(),
            new_status: "online".to_string(),
            is_maintenance: false,
        });

        assert!(payload.embeds[0].title.starts_with("Service Recovered"));
    }
}
