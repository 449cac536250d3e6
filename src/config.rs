//! Process configuration
//!
//! Everything is settable from the environment (the deployment target is a
//! container), with CLI flags taking precedence. One app per process: the
//! monitor, downloader, and API all work against the single configured AppID.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Default tool used for both manifest polling and depot downloads.
pub const DEFAULT_STEAMCMD_PATH: &str = "/opt/steamcmd/steamcmd.sh";

#[derive(Debug, Parser)]
#[command(name = "astranet")]
#[command(about = "Update-monitoring pipeline for a Steam app")]
pub struct Cli {
    /// AppID to monitor
    #[arg(long, env = "APP_ID", default_value_t = 730)]
    pub app_id: u32,

    /// Path to the SQLite state database
    #[arg(long, env = "DB_PATH", default_value = "astranet.db")]
    pub db_path: PathBuf,

    /// HTTP status API port
    #[arg(long, env = "API_PORT", default_value_t = 8080)]
    pub api_port: u16,

    /// Directory for downloaded depot contents
    #[arg(long, env = "DEPOT_CACHE_PATH", default_value = "/data/depot_cache")]
    pub depot_cache_path: PathBuf,

    /// Path to the steamcmd executable
    #[arg(long, env = "STEAMCMD_PATH", default_value = DEFAULT_STEAMCMD_PATH)]
    pub steamcmd_path: PathBuf,

    /// Steam account name (anonymous login when unset)
    #[arg(long, env = "STEAM_USER", hide_env_values = true)]
    pub steam_user: Option<String>,

    /// Steam account password
    #[arg(long, env = "STEAM_PASS", hide_env_values = true)]
    pub steam_pass: Option<String>,

    /// Steam Web API key (richer /servers data when set)
    #[arg(long, env = "STEAM_API_KEY", hide_env_values = true)]
    pub steam_api_key: Option<String>,

    /// Administrative subcommand; the daemon does not start when one is given
    #[command(subcommand)]
    pub command: Option<AdminCommand>,
}

/// Manual operations against the state database.
#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    /// Manage notification webhooks
    #[command(subcommand)]
    Webhook(WebhookCommand),
}

#[derive(Debug, Subcommand)]
pub enum WebhookCommand {
    /// Register a webhook URL
    Add { url: String },
    /// Remove a webhook URL
    Remove { url: String },
    /// List registered webhooks
    List,
}

/// Login identity for the external tool. Anonymous unless both the account
/// name and password are present.
#[derive(Debug, Clone, Default)]
pub struct SteamCredentials {
    pub user: Option<String>,
    pub pass: Option<String>,
}

impl SteamCredentials {
    pub fn new(user: Option<String>, pass: Option<String>) -> Self {
        Self { user, pass }
    }

    /// `+login` arguments for a tool invocation.
    pub fn login_args(&self) -> Vec<String> {
        match (&self.user, &self.pass) {
            (Some(user), Some(pass)) => {
                vec!["+login".to_string(), user.clone(), pass.clone()]
            }
            _ => vec!["+login".to_string(), "anonymous".to_string()],
        }
    }

    /// Same arguments with the password masked, safe for logging.
    pub fn redacted_args(&self) -> Vec<String> {
        let mut args = self.login_args();
        if args.len() == 3 {
            args[2] = "*****".to_string();
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["astranet"]).unwrap();
        assert_eq!(cli.app_id, 730);
        assert_eq!(cli.api_port, 8080);
        assert_eq!(cli.db_path, PathBuf::from("astranet.db"));
        assert_eq!(cli.depot_cache_path, PathBuf::from("/data/depot_cache"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_flag_overrides() {
        let cli = Cli::try_parse_from([
            "astranet",
            "--app-id",
            "570",
            "--api-port",
            "9000",
            "--db-path",
            "/tmp/state.db",
        ])
        .unwrap();
        assert_eq!(cli.app_id, 570);
        assert_eq!(cli.api_port, 9000);
        assert_eq!(cli.db_path, PathBuf::from("/tmp/state.db"));
    }

    #[test]
    fn test_webhook_subcommand() {
        let cli =
            Cli::try_parse_from(["astranet", "webhook", "add", "https://example.com/hook"])
                .unwrap();
        match cli.command {
            Some(AdminCommand::Webhook(WebhookCommand::Add { url })) => {
                assert_eq!(url, "https://example.com/hook");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_anonymous_login_args() {
        let creds = SteamCredentials::default();
        assert_eq!(creds.login_args(), vec!["+login", "anonymous"]);
    }

    #[test]
    fn test_credential_redaction() {
        let creds =
            SteamCredentials::new(Some("user".to_string()), Some("hunter2".to_string()));
        assert_eq!(creds.login_args(), vec!["+login", "user", "hunter2"]);
        assert_eq!(creds.redacted_args(), vec!["+login", "user", "*****"]);
    }
}
