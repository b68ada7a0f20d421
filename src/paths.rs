//! XDG Base Directory compliant path resolution.
//!
//! Every directory is resolved through a two-level fallback:
//! 1. PageGuard-specific env var (PAGEGUARD_CONFIG_DIR, PAGEGUARD_STATE_DIR)
//! 2. XDG base strategy via `etcetera` (~/.config, ~/.local/state, ...)
//!
//! Relative paths from env vars are ignored per the XDG spec.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Resolved directory paths, created once at startup and threaded through
/// [`Config`](crate::config::Config).
#[derive(Debug, Clone, Default)]
pub struct Paths {
    /// Config directory: config.toml lives here
    pub config_dir: PathBuf,

    /// State directory: exported incident ledgers
    pub state_dir: PathBuf,
}

impl Paths {
    /// Resolve all paths using real environment variables.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(|key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let config_dir = env_or(&env_fn, "PAGEGUARD_CONFIG_DIR", || {
            strategy.config_dir().join("pageguard")
        });

        let state_dir = env_or(&env_fn, "PAGEGUARD_STATE_DIR", || {
            let base_state = strategy.state_dir().unwrap_or_else(|| strategy.data_dir());
            base_state.join("pageguard")
        });

        Ok(Self {
            config_dir,
            state_dir,
        })
    }

    /// Config file: config_dir/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Default ledger export for a session: state_dir/ledgers/{session_id}.jsonl
    pub fn ledger_export(&self, session_id: &str) -> PathBuf {
        self.state_dir
            .join("ledgers")
            .join(format!("{}.jsonl", session_id))
    }
}

fn env_or<F, D>(env_fn: &F, key: &str, default: D) -> PathBuf
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    D: FnOnce() -> PathBuf,
{
    match env_fn(key) {
        Ok(value) if Path::new(&value).is_absolute() => PathBuf::from(value),
        _ => default(),
    }
}
