//! Server-health poller
//!
//! Watches the coarse Steam/CS2 service status on a slow cadence and
//! notifies webhooks on meaningful transitions. Independent of the update
//! monitor; shares nothing with it but the web client.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Timelike, Utc, Weekday};
use tracing::{info, warn};

use crate::db::Database;
use crate::notifier::{StatusUpdate, WebhookNotifier};
use crate::steam::SteamWebClient;

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct StatusMonitor {
    app_id: u32,
    web: Arc<SteamWebClient>,
    notifier: WebhookNotifier,
    db: Database,
    last_steam_status: String,
    last_cs2_status: String,
}

impl StatusMonitor {
    pub fn new(app_id: u32, web: Arc<SteamWebClient>, notifier: WebhookNotifier, db: Database) -> Self {
        Self {
            app_id,
            web,
            notifier,
            db,
            last_steam_status: "online".to_string(),
            last_cs2_status: "online".to_string(),
        }
    }

    pub async fn run(mut self) {
        info!("starting status monitor");
        let mut ticker = tokio::time::interval(STATUS_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.check().await;
        }
    }

    async fn check(&mut self) {
        let status = self.web.get_server_status(self.app_id).await;
        let maintenance = is_maintenance_window();

        let steam = status.steam.clone();
        let cs2 = status.cs2.clone();
        self.evaluate("Steam", steam, maintenance).await;
        self.evaluate("CS2", cs2, maintenance).await;
    }

    async fn evaluate(&mut self, service: &str, current: String, maintenance: bool) {
        let last = if service == "Steam" {
            &mut self.last_steam_status
        } else {
            &mut self.last_cs2_status
        };

        if current == *last {
            return;
        }

        info!(service, old = %last, new = %current, "service status changed");

        let update = StatusUpdate {
            service: service.to_string(),
            old_status: last.clone(),
            new_status: current.clone(),
            is_maintenance: maintenance,
        };
        *last = current;

        // An `unknown` reading is usually our own lookup failing, not theirs.
        if update.new_status == "unknown" {
            return;
        }

        match self.db.all_webhooks() {
            Ok(urls) => self.notifier.notify_status(&urls, &update).await,
            Err(err) => warn!(error = %err, "failed to enumerate webhooks"),
        }
    }
}

/// Routine upstream maintenance lands Tuesday evening US time, roughly
/// 21:00-23:59 UTC.
pub fn is_maintenance_window() -> bool {
    let now = Utc::now();
    now.weekday() == Weekday::Tue && now.hour() >= 21
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maintenance_window_matches_clock() {
        let now = Utc::now();
        let expected = now.weekday() == Weekday::Tue && now.hour() >= 21;
        assert_eq!(is_maintenance_window(), expected);
    }
}
