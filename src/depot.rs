//! Depot download coordination
//!
//! Keeps an idempotent directory cache keyed by `(depot, manifest)` and
//! invokes the external tool only on a miss. The tool writes its output to
//! one of several install-dependent locations, so the result is located by
//! probing well-known paths first and falling back to a bounded recursive
//! search, then moved (or copied across filesystems) into the cache.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::command::{CommandError, CommandRunner, ProcessRunner};
use crate::config::SteamCredentials;

/// Total cache size allowed before eviction kicks in.
const MAX_CACHE_SIZE: u64 = 20 * 1024 * 1024 * 1024;

/// Eviction stops once the cache is back under this fraction of the limit.
const EVICTION_TARGET_PERCENT: u64 = 80;

/// Depot downloads are large; give the tool half an hour.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Directory depth for the fallback output search.
const SEARCH_MAX_DEPTH: usize = 6;

/// A download below this size almost always means an authentication failure
/// or a protected depot.
const SUSPICIOUS_SIZE_BYTES: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum DepotError {
    #[error("failed to download depot: {0}")]
    Command(#[from] CommandError),

    #[error("failed to move depot files: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Downloader {
    cache_path: PathBuf,
    app_id: u32,
    credentials: SteamCredentials,
    runner: Box<dyn CommandRunner>,
}

impl Downloader {
    pub fn new(
        app_id: u32,
        cache_path: PathBuf,
        tool_path: PathBuf,
        credentials: SteamCredentials,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(&cache_path)?;
        Ok(Self {
            cache_path,
            app_id,
            credentials,
            runner: Box::new(ProcessRunner::new(tool_path, DOWNLOAD_TIMEOUT)),
        })
    }

    #[cfg(test)]
    pub fn with_runner(
        app_id: u32,
        cache_path: PathBuf,
        credentials: SteamCredentials,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            cache_path,
            app_id,
            credentials,
            runner,
        }
    }

    /// Fetch one depot manifest into the cache and return its directory.
    ///
    /// Returns the cached directory immediately when it already exists; the
    /// manifest id makes the cache key stable across re-checks.
    pub async fn download_depot(
        &self,
        depot_id: u32,
        manifest_id: &str,
        file_filter: Option<&str>,
    ) -> Result<PathBuf, DepotError> {
        let output_dir = self.cache_path.join(format!("{depot_id}_{manifest_id}"));

        if output_dir.exists() {
            debug!(depot_id, path = %output_dir.display(), "depot already cached");
            return Ok(output_dir);
        }

        let mut args = self.credentials.login_args();
        args.extend([
            "+@sSteamCmdForcePlatformType".to_string(),
            "windows".to_string(),
            "+download_depot".to_string(),
            self.app_id.to_string(),
            depot_id.to_string(),
        ]);
        if let Some(filter) = file_filter {
            args.push(filter.to_string());
        }
        args.push("+quit".to_string());

        info!(depot_id, manifest_id, "downloading depot");
        self.runner.run(&args).await?;

        if let Some(depot_path) = find_depot_output(self.app_id, depot_id) {
            let size = dir_size(&depot_path);
            if size < SUSPICIOUS_SIZE_BYTES {
                warn!(
                    depot_id,
                    size,
                    "downloaded depot is suspiciously small; likely an authentication \
                     failure or a protected depot"
                );
            }
            move_or_copy(&depot_path, &output_dir)?;
        }

        Ok(output_dir)
    }

    /// Evict cache entries in enumeration order until the total size is
    /// back under the target fraction of the limit.
    pub fn cleanup_old_cache(&self) -> std::io::Result<()> {
        let entries: Vec<_> = std::fs::read_dir(&self.cache_path)?
            .filter_map(Result::ok)
            .collect();

        let mut total: u64 = entries.iter().map(|e| dir_size(&e.path())).sum();
        if total <= MAX_CACHE_SIZE {
            return Ok(());
        }

        info!(total, limit = MAX_CACHE_SIZE, "depot cache over limit, evicting");
        let target = MAX_CACHE_SIZE * EVICTION_TARGET_PERCENT / 100;

        for entry in entries {
            if total <= target {
                break;
            }
            let path = entry.path();
            let size = dir_size(&path);
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
            total = total.saturating_sub(size);
            info!(path = %path.display(), freed = size, "evicted cache entry");
        }

        Ok(())
    }
}

/// Locate the tool's output directory for a finished download.
fn find_depot_output(app_id: u32, depot_id: u32) -> Option<PathBuf> {
    let patterns = [
        format!("/root/Steam/steamapps/content/app_{app_id}/depot_{depot_id}"),
        format!("/home/*/.steam/steamapps/content/app_{app_id}/depot_{depot_id}"),
        format!("/opt/steamcmd/steamapps/content/app_{app_id}/depot_{depot_id}"),
        format!("/opt/steamcmd/linux32/steamapps/content/app_{app_id}/depot_{depot_id}"),
    ];

    for pattern in &patterns {
        let Ok(matches) = glob::glob(pattern) else {
            continue;
        };
        for path in matches.filter_map(Result::ok) {
            if path.is_dir() && dir_size(&path) > 0 {
                return Some(path);
            }
        }
    }

    // Fallback: the tool sometimes nests its content directory elsewhere.
    let target = format!("depot_{depot_id}");
    for root in ["/opt/steamcmd", "/root", "/data"] {
        if let Some(found) = find_dir_named(Path::new(root), &target, SEARCH_MAX_DEPTH) {
            info!(path = %found.display(), "found depot output via recursive search");
            return Some(found);
        }
    }

    None
}

fn find_dir_named(root: &Path, name: &str, depth_left: usize) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    let mut subdirs = Vec::new();

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if path.file_name().is_some_and(|n| n == name) {
            return Some(path);
        }
        subdirs.push(path);
    }

    if depth_left == 0 {
        return None;
    }
    subdirs
        .into_iter()
        .find_map(|dir| find_dir_named(&dir, name, depth_left - 1))
}

fn dir_size(path: &Path) -> u64 {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return 0;
    };
    if meta.is_file() {
        return meta.len();
    }
    if !meta.is_dir() {
        return 0;
    }

    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| dir_size(&entry.path()))
        .sum()
}

/// Rename when possible, falling back to a recursive copy-and-delete for
/// cross-device moves.
fn move_or_copy(src: &Path, dst: &Path) -> std::io::Result<()> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    debug!(src = %src.display(), dst = %dst.display(), "rename failed, copying");
    copy_tree(src, dst)?;
    std::fs::remove_dir_all(src)
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;

    struct RecordingRunner {
        calls: Arc<Mutex<Vec<Vec<String>>>>,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, args: &[String]) -> Result<String, CommandError> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok(String::new())
        }
    }

    fn downloader_with_recorder(cache: &TempDir) -> (Downloader, Arc<Mutex<Vec<Vec<String>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let runner = RecordingRunner {
            calls: calls.clone(),
        };
        let downloader = Downloader::with_runner(
            730,
            cache.path().to_path_buf(),
            SteamCredentials::default(),
            Box::new(runner),
        );
        (downloader, calls)
    }

    #[tokio::test]
    async fn test_cached_depot_skips_download() {
        let cache = TempDir::new().unwrap();
        let cached = cache.path().join("735_MANIFEST1");
        std::fs::create_dir_all(&cached).unwrap();

        let (downloader, calls) = downloader_with_recorder(&cache);

        let path = downloader
            .download_depot(735, "MANIFEST1", None)
            .await
            .unwrap();

        assert_eq!(path, cached);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_invocation_arguments() {
        let cache = TempDir::new().unwrap();
        let (downloader, calls) = downloader_with_recorder(&cache);

        downloader
            .download_depot(735, "MANIFEST2", Some("regex:.*dll"))
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec![
                "+login",
                "anonymous",
                "+@sSteamCmdForcePlatformType",
                "windows",
                "+download_depot",
                "730",
                "735",
                "regex:.*dll",
                "+quit"
            ]
        );
    }

    #[test]
    fn test_dir_size_sums_nested_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a"), vec![0u8; 10]).unwrap();
        std::fs::write(dir.path().join("sub/b"), vec![0u8; 32]).unwrap();

        assert_eq!(dir_size(dir.path()), 42);
    }

    #[test]
    fn test_move_or_copy_preserves_tree() {
        let root = TempDir::new().unwrap();
        let src = root.path().join("src");
        let dst = root.path().join("dst");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested/file.dll"), b"payload").unwrap();

        move_or_copy(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(
            std::fs::read(dst.join("nested/file.dll")).unwrap(),
            b"payload"
        );
    }

    #[test]
    fn test_find_dir_named_respects_depth() {
        let root = TempDir::new().unwrap();
        let deep = root.path().join("a/b/target");
        std::fs::create_dir_all(&deep).unwrap();

        assert_eq!(
            find_dir_named(root.path(), "target", 3),
            Some(deep.clone())
        );
        assert_eq!(find_dir_named(root.path(), "target", 0), None);
    }
}
