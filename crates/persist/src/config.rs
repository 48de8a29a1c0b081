// Persistence service configuration.
//
// Environment only; every variable has a local-development default.

use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_MAX_BACKUPS: usize = 20;

#[derive(Debug, Clone)]
pub struct PersistConfig {
    pub listen_addr: SocketAddr,
    /// Directory holding the durable copy and its `backups/` folder.
    pub data_dir: PathBuf,
    /// File name of the durable copy inside `data_dir`.
    pub file_name: String,
    /// Backups kept after each save; older ones are deleted.
    pub max_backups: usize,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    pub log_filter: String,
}

impl PersistConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `ATELIER_PERSIST_HOST` | `127.0.0.1` |
    /// | `ATELIER_PERSIST_PORT` | `3001` |
    /// | `ATELIER_PERSIST_DATA_DIR` | `./data` |
    /// | `ATELIER_PERSIST_FILE` | `design.json` |
    /// | `ATELIER_PERSIST_MAX_BACKUPS` | `20` |
    /// | `ATELIER_PERSIST_CORS_ORIGINS` | *(none, dev origins)* |
    /// | `ATELIER_PERSIST_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("ATELIER_PERSIST_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let port: u16 =
            env("ATELIER_PERSIST_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(3001);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], port)));

        let data_dir = env("ATELIER_PERSIST_DATA_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));

        // A file name only; anything path-like falls back to the default.
        let file_name = env("ATELIER_PERSIST_FILE")
            .ok()
            .filter(|v| !v.is_empty() && !v.contains(['/', '\\']) && v != "." && v != "..")
            .unwrap_or_else(|| "design.json".into());

        let max_backups = env("ATELIER_PERSIST_MAX_BACKUPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_BACKUPS);

        let cors_origins = env("ATELIER_PERSIST_CORS_ORIGINS").ok();
        let log_filter = env("ATELIER_PERSIST_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self { listen_addr, data_dir, file_name, max_backups, cors_origins, log_filter }
    }
}
