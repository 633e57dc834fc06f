use crate::error::Result;
use crate::io;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// BackendKind
// ---------------------------------------------------------------------------

/// Which backend the API client talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// The HTTP API at `api_base_url`.
    Http,
    /// In-process fixtures; no network.
    #[default]
    Mock,
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Base URL of the churn model service (`POST /predict`).
    #[serde(default = "default_model_api_url")]
    pub model_api_url: String,
    #[serde(default = "default_customer_id")]
    pub default_customer_id: String,
    #[serde(default = "default_range_days")]
    pub default_range_days: u32,
    /// No timeout when unset; requests wait on the transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// YAML file with mock backend fixtures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_fixtures: Option<PathBuf>,
}

fn default_api_base_url() -> String {
    "http://localhost:3001/api".to_string()
}

fn default_model_api_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_customer_id() -> String {
    "cust-001".to_string()
}

fn default_range_days() -> u32 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            api_base_url: default_api_base_url(),
            model_api_url: default_model_api_url(),
            default_customer_id: default_customer_id(),
            default_range_days: default_range_days(),
            request_timeout_secs: None,
            mock_fixtures: None,
        }
    }
}

impl ClientConfig {
    /// Load `<state_dir>/config.yaml`, falling back to defaults when absent.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = paths::config_path(state_dir);
        match io::read_optional(&path)? {
            Some(data) if !data.trim().is_empty() => Ok(serde_yaml::from_str(&data)?),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let path = paths::config_path(state_dir);
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for (field, url) in [
            ("api_base_url", &self.api_base_url),
            ("model_api_url", &self.model_api_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{field} '{url}' must start with http:// or https://"),
                });
            }
        }

        if self.default_range_days == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "default_range_days must be at least 1".to_string(),
            });
        }

        if self.default_customer_id.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "default_customer_id must not be empty".to_string(),
            });
        }

        if self.request_timeout_secs == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "request_timeout_secs is 0; every request will time out".to_string(),
            });
        }

        if self.backend == BackendKind::Http && self.mock_fixtures.is_some() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "mock_fixtures is ignored when backend is http".to_string(),
            });
        }

        if let Some(path) = &self.mock_fixtures {
            if !path.exists() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("mock_fixtures file '{}' does not exist", path.display()),
                });
            }
        }

        warnings
    }

    /// Set a field by its YAML key. Returns an error message for unknown keys
    /// or unparseable values.
    pub fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        match key {
            "backend" => {
                self.backend = match value {
                    "http" => BackendKind::Http,
                    "mock" => BackendKind::Mock,
                    other => return Err(format!("unknown backend '{other}': use http or mock")),
                }
            }
            "api_base_url" => self.api_base_url = value.trim_end_matches('/').to_string(),
            "model_api_url" => self.model_api_url = value.trim_end_matches('/').to_string(),
            "default_customer_id" => self.default_customer_id = value.to_string(),
            "default_range_days" => {
                self.default_range_days = value
                    .parse()
                    .map_err(|_| format!("default_range_days must be a number, got '{value}'"))?
            }
            "request_timeout_secs" => {
                self.request_timeout_secs = if value.is_empty() || value == "none" {
                    None
                } else {
                    Some(value.parse().map_err(|_| {
                        format!("request_timeout_secs must be a number, got '{value}'")
                    })?)
                }
            }
            "mock_fixtures" => {
                self.mock_fixtures = if value.is_empty() || value == "none" {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            other => return Err(format!("unknown config key '{other}'")),
        }
        Ok(())
    }
}
