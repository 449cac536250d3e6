//! Update monitor
//!
//! The long-lived control loop: poll the manifest tool, detect change-number
//! movement, materialize the diff, analyze changed binary depots, persist,
//! and notify. Each iteration runs to completion before the next; any
//! iteration error is logged and the loop keeps going.
//!
//! The loop's latest state is published through a shared snapshot
//! ([`SharedMonitorState`]) that the HTTP handlers read; the monitor is the
//! only writer.

pub mod status;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::db::{AppState, Database};
use crate::depot::Downloader;
use crate::diff::{
    categorize_strings, enhance_with_string_analysis, generate_unified_diff, process_update,
    DiffResult,
};
use crate::extractor::{extract_protobufs, extract_strings};
use crate::notifier::WebhookNotifier;
use crate::steamcmd::{parse_app_info, AppInfo, SteamCmd};

/// Cadence of upstream checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Depots worth downloading for string analysis: the client binaries.
const ANALYZABLE_DEPOTS: [&str; 2] = ["734", "735"];

/// Binary files scanned inside a downloaded depot.
const BINARY_PATTERNS: [&str; 3] = ["*.exe", "*.dll", "*.so"];

/// Snapshot of the monitor's latest knowledge, shared with the HTTP API.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    pub change_number: String,
    pub build_id: String,
    pub app_name: String,
    pub last_diff: Option<DiffResult>,
}

pub type SharedMonitorState = Arc<RwLock<MonitorState>>;

pub struct Monitor {
    app_id: u32,
    client: SteamCmd,
    db: Database,
    downloader: Downloader,
    notifier: WebhookNotifier,
    state: SharedMonitorState,
}

impl Monitor {
    pub fn new(
        app_id: u32,
        client: SteamCmd,
        db: Database,
        downloader: Downloader,
        notifier: WebhookNotifier,
    ) -> Self {
        Self {
            app_id,
            client,
            db,
            downloader,
            notifier,
            state: Arc::new(RwLock::new(MonitorState::default())),
        }
    }

    /// Handle for readers; the monitor remains the single writer.
    pub fn state(&self) -> SharedMonitorState {
        self.state.clone()
    }

    /// Restore the persisted change number, app metadata, and last diff.
    ///
    /// A corrupted stored diff is treated as no prior diff.
    pub async fn load_state(&self) {
        let mut state = self.state.write().await;

        match self.db.get_app_state(self.app_id) {
            Ok(Some(stored)) => {
                state.change_number = stored.change_number;
                state.build_id = stored.build_id;
                if let Ok(info) = serde_json::from_str::<AppInfo>(&stored.app_info_json) {
                    state.app_name = info.name;
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to load persisted state"),
        }

        match self.db.get_last_diff(self.app_id) {
            Ok(Some(raw)) => match serde_json::from_slice::<DiffResult>(&raw) {
                Ok(diff) => {
                    info!(
                        update_type = %diff.update_type,
                        strings = diff.new_strings.len(),
                        "loaded last diff"
                    );
                    state.last_diff = Some(diff);
                }
                Err(err) => warn!(error = %err, "stored diff is unreadable, ignoring"),
            },
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to load last diff"),
        }

        info!(change_number = %state.change_number, "state loaded");
    }

    /// Run the poll loop forever.
    pub async fn run(self) {
        info!(app_id = self.app_id, "starting update monitor");
        self.load_state().await;

        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(err) = self.check_once().await {
                error!(error = %err, "update check failed");
            }
        }
    }

    /// One full check: poll, compare, and process a change when present.
    pub async fn check_once(&self) -> anyhow::Result<()> {
        info!("checking for updates");

        let output = self
            .client
            .app_info_print(self.app_id)
            .await
            .context("requesting app info")?;

        let info = parse_app_info(&output);
        if info.change_number.is_empty() {
            warn!("could not parse a change number from tool output, skipping");
            return Ok(());
        }

        let last_change_number = self.state.read().await.change_number.clone();
        if info.change_number == last_change_number {
            info!("No changes. Current: {}", info.change_number);
            return Ok(());
        }

        info!(
            old = %last_change_number,
            new = %info.change_number,
            "new update detected"
        );
        self.process_change(info, &output, &last_change_number)
            .await;

        Ok(())
    }

    async fn process_change(&self, info: AppInfo, raw_dump: &str, last_change_number: &str) {
        let previous = match self.db.get_app_state(self.app_id) {
            Ok(stored) => stored.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "failed to load previous state, diffing against empty");
                Default::default()
            }
        };

        let old_info = if previous.app_info_json.is_empty() {
            AppInfo {
                change_number: last_change_number.to_string(),
                ..AppInfo::default()
            }
        } else {
            serde_json::from_str(&previous.app_info_json).unwrap_or_else(|err| {
                warn!(error = %err, "stored app info is unreadable, diffing against empty");
                AppInfo {
                    change_number: last_change_number.to_string(),
                    ..AppInfo::default()
                }
            })
        };

        let mut result = process_update(&old_info, &info);
        result.raw_diff = generate_unified_diff(&previous.raw_vdf, raw_dump, "old", "new");

        self.analyze_depot_changes(&mut result).await;

        result.categorized_strings = categorize_strings(&result.new_strings);
        result.analysis = result.render_summary();

        info!(
            update_type = %result.update_type,
            reason = %result.type_reason,
            depots = result.changed_depots.len(),
            "diff materialized"
        );

        {
            let mut state = self.state.write().await;
            if !info.name.is_empty() {
                state.app_name = info.name.clone();
            }
            state.build_id = info.build_id.clone();
            state.last_diff = Some(result.clone());
        }

        // Persist before notifying. The in-memory change number only moves
        // on a successful save, so a failed save makes the next iteration
        // re-process the same change (idempotent: upserts, same diff).
        if self.persist(&info, raw_dump, &result) {
            self.state.write().await.change_number = info.change_number.clone();
        }

        let app_name = {
            let state = self.state.read().await;
            if state.app_name.is_empty() {
                format!("App {}", self.app_id)
            } else {
                state.app_name.clone()
            }
        };
        match self.db.all_webhooks() {
            Ok(urls) => {
                self.notifier
                    .notify_update(&urls, &app_name, &result)
                    .await;
            }
            Err(err) => warn!(error = %err, "failed to enumerate webhooks"),
        }
    }

    fn persist(&self, info: &AppInfo, raw_dump: &str, result: &DiffResult) -> bool {
        let app_info_json = match serde_json::to_string(info) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize app info");
                return false;
            }
        };

        let state = AppState {
            change_number: info.change_number.clone(),
            build_id: info.build_id.clone(),
            app_info_json,
            raw_vdf: raw_dump.to_string(),
        };
        if let Err(err) = self.db.update_app_state(self.app_id, &state) {
            warn!(error = %err, "failed to save app state");
            return false;
        }

        match serde_json::to_vec(result) {
            Ok(diff_json) => {
                if let Err(err) = self.db.save_last_diff(self.app_id, &diff_json) {
                    warn!(error = %err, "failed to save last diff");
                    return false;
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to serialize diff");
                return false;
            }
        }

        true
    }

    /// Download and scan the analyzable binary depots among the changes.
    ///
    /// Failures here only reduce the amount of string data on the result;
    /// the diff itself still completes.
    async fn analyze_depot_changes(&self, result: &mut DiffResult) {
        let changes: Vec<_> = result
            .changed_depots
            .iter()
            .filter(|c| ANALYZABLE_DEPOTS.contains(&c.id.as_str()))
            .cloned()
            .collect();
        if changes.is_empty() {
            return;
        }

        let mut new_values = Vec::new();
        let mut old_values = Vec::new();

        for change in changes {
            info!(depot = %change.id, name = %change.name, "analyzing depot");

            if let Err(err) = self.downloader.cleanup_old_cache() {
                warn!(error = %err, "cache cleanup failed");
            }

            let Ok(depot_id) = change.id.parse::<u32>() else {
                continue;
            };

            let new_path = match self
                .downloader
                .download_depot(depot_id, &change.new_gid, None)
                .await
            {
                Ok(path) => path,
                Err(err) => {
                    warn!(depot = %change.id, error = %err, "failed to download new depot");
                    continue;
                }
            };

            let old_path = if change.old_gid.is_empty() {
                None
            } else {
                match self
                    .downloader
                    .download_depot(depot_id, &change.old_gid, None)
                    .await
                {
                    Ok(path) => Some(path),
                    Err(err) => {
                        warn!(depot = %change.id, error = %err, "failed to download old depot");
                        None
                    }
                }
            };

            scan_depot(&new_path, old_path.as_deref(), &mut new_values, &mut old_values);
        }

        dedup_preserving_order(&mut new_values);
        dedup_preserving_order(&mut old_values);

        let protobufs = extract_protobufs(&new_values);
        result
            .new_protobufs
            .extend(protobufs.into_iter().map(|p| p.name));

        if old_values.is_empty() {
            result.new_strings = new_values;
        } else {
            enhance_with_string_analysis(result, &new_values, &old_values);
        }
    }
}

/// Glob the depot directory for binaries and extract strings from each,
/// pairing every new file with its old counterpart when available.
fn scan_depot(
    new_path: &Path,
    old_path: Option<&Path>,
    new_values: &mut Vec<String>,
    old_values: &mut Vec<String>,
) {
    for pattern in BINARY_PATTERNS {
        let full_pattern = format!("{}/**/{}", new_path.display(), pattern);
        let Ok(paths) = glob::glob(&full_pattern) else {
            continue;
        };

        for file in paths.filter_map(Result::ok) {
            info!(file = %file.display(), "extracting strings");
            match extract_strings(&file) {
                Ok(matches) => {
                    info!(file = %file.display(), count = matches.len(), "extracted strings");
                    new_values.extend(matches.into_iter().map(|m| m.value));
                }
                Err(err) => {
                    warn!(file = %file.display(), error = %err, "extraction failed");
                    continue;
                }
            }

            if let Some(old_root) = old_path {
                let Ok(rel) = file.strip_prefix(new_path) else {
                    continue;
                };
                let old_file = old_root.join(rel);
                match extract_strings(&old_file) {
                    Ok(matches) => {
                        old_values.extend(matches.into_iter().map(|m| m.value));
                    }
                    Err(err) => {
                        warn!(file = %old_file.display(), error = %err, "old-side extraction failed");
                    }
                }
            }
        }
    }
}

fn dedup_preserving_order(values: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    values.retain(|v| seen.insert(v.clone()));
}
