//! Driver for the external manifest tool
//!
//! Wraps invocations of steamcmd for app-info polling. Depot downloads go
//! through [`crate::depot`], which shares the same [`CommandRunner`]
//! capability and login handling.

pub mod parser;

use std::time::Duration;

use tracing::debug;

use crate::command::{CommandError, CommandRunner, ProcessRunner};
use crate::config::SteamCredentials;

pub use parser::{parse_app_info, AppInfo, BranchInfo, DepotInfo};

/// Deadline for a single app-info invocation. Authenticated sessions can be
/// slow on first login while the sentry file is negotiated.
pub const APP_INFO_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum SteamCmdError {
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Client for the manifest tool.
pub struct SteamCmd {
    credentials: SteamCredentials,
    runner: Box<dyn CommandRunner>,
}

impl SteamCmd {
    pub fn new(tool_path: std::path::PathBuf, credentials: SteamCredentials) -> Self {
        Self {
            credentials,
            runner: Box::new(ProcessRunner::new(tool_path, APP_INFO_TIMEOUT)),
        }
    }

    /// Construct with an injected runner. Tests use this to feed captured
    /// dumps through the pipeline without a real tool install.
    pub fn with_runner(credentials: SteamCredentials, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            credentials,
            runner,
        }
    }

    /// Refresh and print the app's manifest, returning the raw dump.
    ///
    /// The tool's exit code is unreliable when the session is anonymous; a
    /// nonzero exit whose output still contains the quoted app id is
    /// treated as success.
    pub async fn app_info_print(&self, app_id: u32) -> Result<String, SteamCmdError> {
        let mut args = self.credentials.login_args();
        args.extend([
            "+app_info_update".to_string(),
            "1".to_string(),
            "+app_info_print".to_string(),
            app_id.to_string(),
            "+quit".to_string(),
        ]);

        debug!(args = ?self.credentials.redacted_args(), app_id, "requesting app info");

        match self.runner.run(&args).await {
            Ok(output) => Ok(output),
            Err(CommandError::Failed { output, .. })
                if output.contains(&format!("\"{app_id}\"")) =>
            {
                Ok(output)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;

    struct CannedRunner {
        result: Result<String, String>,
        calls: Arc<Mutex<Vec<Vec<String>>>>,
    }

    #[async_trait]
    impl CommandRunner for CannedRunner {
        async fn run(&self, args: &[String]) -> Result<String, CommandError> {
            self.calls.lock().unwrap().push(args.to_vec());
            match &self.result {
                Ok(output) => Ok(output.clone()),
                Err(output) => Err(CommandError::Failed {
                    status: "exit status: 8".to_string(),
                    output: output.clone(),
                }),
            }
        }
    }

    fn canned(result: Result<String, String>) -> (SteamCmd, Arc<Mutex<Vec<Vec<String>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = CannedRunner {
            result,
            calls: calls.clone(),
        };
        let client = SteamCmd::with_runner(SteamCredentials::default(), Box::new(runner));
        (client, calls)
    }

    #[tokio::test]
    async fn test_app_info_print_arguments() {
        let (client, calls) = canned(Ok("change number : 1\n".to_string()));

        client.app_info_print(730).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec![
                "+login",
                "anonymous",
                "+app_info_update",
                "1",
                "+app_info_print",
                "730",
                "+quit"
            ]
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_app_block_is_accepted() {
        let (client, _) = canned(Err("\"730\"\n{\n}\n".to_string()));

        let out = client.app_info_print(730).await.unwrap();
        assert!(out.contains("\"730\""));
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_app_block_is_an_error() {
        let (client, _) = canned(Err("FAILED login\n".to_string()));

        assert!(client.app_info_print(730).await.is_err());
    }
}
