//! SQLite-backed persistent state
//!
//! One row per monitored app in `app_state`, upserted after every
//! successfully processed change, plus the `webhooks` table enumerated for
//! notification fan-out. The last diff is stored gzipped and base64-wrapped
//! so the row stays readable with ordinary SQLite tooling.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("compression error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored diff is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Persisted snapshot of the last successfully processed manifest.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub change_number: String,
    pub build_id: String,
    pub app_info_json: String,
    pub raw_vdf: String,
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS app_state (
                app_id INTEGER PRIMARY KEY,
                change_number TEXT,
                build_id TEXT,
                app_info_json TEXT,
                raw_vdf TEXT,
                last_diff_gz TEXT,
                last_updated DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS webhooks (
                url TEXT PRIMARY KEY,
                added_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );",
        )?;

        info!(path = %path.display(), "State database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn get_app_state(&self, app_id: u32) -> Result<Option<AppState>, DbError> {
        let conn = self.conn.lock().unwrap();
        let state = conn
            .prepare_cached(
                "SELECT change_number, build_id, app_info_json, raw_vdf
                 FROM app_state WHERE app_id = ?1",
            )?
            .query_row([app_id], |row| {
                // Columns are NULL when the diff landed before the first
                // full state write.
                Ok(AppState {
                    change_number: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    build_id: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    app_info_json: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    raw_vdf: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                })
            })
            .optional()?;

        Ok(state)
    }

    pub fn update_app_state(&self, app_id: u32, state: &AppState) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO app_state (app_id, change_number, build_id, app_info_json, raw_vdf, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)
             ON CONFLICT(app_id) DO UPDATE
             SET change_number = excluded.change_number,
                 build_id = excluded.build_id,
                 app_info_json = excluded.app_info_json,
                 raw_vdf = excluded.raw_vdf,
                 last_updated = CURRENT_TIMESTAMP",
            rusqlite::params![
                app_id,
                state.change_number,
                state.build_id,
                state.app_info_json,
                state.raw_vdf,
            ],
        )?;
        Ok(())
    }

    /// Store the serialized diff record, replacing any previous one.
    ///
    /// Upserts rather than updating in place so the diff survives even when
    /// it lands before the first `update_app_state` for this app.
    pub fn save_last_diff(&self, app_id: u32, diff_json: &[u8]) -> Result<(), DbError> {
        let encoded = BASE64.encode(compress_gzip(diff_json)?);

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO app_state (app_id, last_diff_gz) VALUES (?1, ?2)
             ON CONFLICT(app_id) DO UPDATE SET last_diff_gz = excluded.last_diff_gz",
            rusqlite::params![app_id, encoded],
        )?;
        Ok(())
    }

    pub fn get_last_diff(&self, app_id: u32) -> Result<Option<Vec<u8>>, DbError> {
        let conn = self.conn.lock().unwrap();
        let encoded: Option<Option<String>> = conn
            .prepare_cached("SELECT last_diff_gz FROM app_state WHERE app_id = ?1")?
            .query_row([app_id], |row| row.get(0))
            .optional()?;

        match encoded.flatten() {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => {
                let compressed = BASE64.decode(s)?;
                Ok(Some(decompress_gzip(&compressed)?))
            }
        }
    }

    pub fn add_webhook(&self, url: &str) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO webhooks (url) VALUES (?1) ON CONFLICT(url) DO NOTHING",
            [url],
        )?;
        Ok(())
    }

    pub fn remove_webhook(&self, url: &str) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM webhooks WHERE url = ?1", [url])?;
        Ok(())
    }

    pub fn all_webhooks(&self) -> Result<Vec<String>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT url FROM webhooks")?;
        let urls = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls)
    }
}

fn compress_gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    encoder.finish()
}

fn decompress_gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
