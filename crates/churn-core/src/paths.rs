use crate::error::{ChurnError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File and key constants
// ---------------------------------------------------------------------------

pub const APP_DIR: &str = "churnbuster";
pub const CONFIG_FILE: &str = "config.yaml";
pub const STORAGE_FILE: &str = "storage.json";

/// Durable storage key holding the bearer token.
pub const AUTH_TOKEN_KEY: &str = "auth_token";
/// Durable storage key holding the JSON-serialized user record.
pub const AUTH_USER_KEY: &str = "auth_user";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(state_dir: &Path) -> PathBuf {
    state_dir.join(CONFIG_FILE)
}

pub fn storage_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STORAGE_FILE)
}

/// Resolve the state directory.
///
/// Priority:
/// 1. `explicit` (the `--state-dir` flag or `CHURN_STATE_DIR`)
/// 2. `<data_local_dir>/churnbuster`
pub fn resolve_state_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .ok_or(ChurnError::StateDirNotFound)
}
