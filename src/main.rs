use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use astranet::api::{create_router, ApiState};
use astranet::config::{AdminCommand, Cli, SteamCredentials, WebhookCommand};
use astranet::db::Database;
use astranet::depot::Downloader;
use astranet::monitor::status::StatusMonitor;
use astranet::monitor::Monitor;
use astranet::notifier::WebhookNotifier;
use astranet::steam::SteamWebClient;
use astranet::steamcmd::SteamCmd;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("astranet=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let db = Database::open(&cli.db_path).context("opening state database")?;

    if let Some(command) = cli.command {
        return run_admin_command(&db, command);
    }

    info!(app_id = cli.app_id, "starting astranet");

    let credentials = SteamCredentials::new(cli.steam_user.clone(), cli.steam_pass.clone());
    if credentials.user.is_none() {
        info!("no Steam credentials configured, using anonymous login");
    }

    let web = Arc::new(SteamWebClient::new(cli.steam_api_key.clone()));

    let client = SteamCmd::new(cli.steamcmd_path.clone(), credentials.clone());
    let downloader = Downloader::new(
        cli.app_id,
        cli.depot_cache_path.clone(),
        cli.steamcmd_path.clone(),
        credentials,
    )
    .context("creating depot cache directory")?;

    let monitor = Monitor::new(
        cli.app_id,
        client,
        db,
        downloader,
        WebhookNotifier::new(),
    );
    let monitor_state = monitor.state();
    tokio::spawn(monitor.run());

    // The status poller opens its own connection; SQLite WAL handles the
    // concurrent readers.
    match Database::open(&cli.db_path) {
        Ok(status_db) => {
            let status_monitor = StatusMonitor::new(
                cli.app_id,
                web.clone(),
                WebhookNotifier::new(),
                status_db,
            );
            tokio::spawn(status_monitor.run());
        }
        Err(err) => warn!(error = %err, "status monitor disabled"),
    }

    let api_state = Arc::new(ApiState {
        app_id: cli.app_id,
        monitor: monitor_state,
        web,
        started_at: Instant::now(),
    });
    let app = create_router(api_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.api_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding API listener on {addr}"))?;
    info!("API listening on http://{addr}");

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(error = %err, "API server exited");
        }
    });

    shutdown_signal().await;
    info!("shutting down");

    Ok(())
}

fn run_admin_command(db: &Database, command: AdminCommand) -> anyhow::Result<()> {
    match command {
        AdminCommand::Webhook(WebhookCommand::Add { url }) => {
            db.add_webhook(&url).context("adding webhook")?;
            println!("added {url}");
        }
        AdminCommand::Webhook(WebhookCommand::Remove { url }) => {
            db.remove_webhook(&url).context("removing webhook")?;
            println!("removed {url}");
        }
        AdminCommand::Webhook(WebhookCommand::List) => {
            for url in db.all_webhooks().context("listing webhooks")? {
                println!("{url}");
            }
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("SIGTERM handler installs");
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
