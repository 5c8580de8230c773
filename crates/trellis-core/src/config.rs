use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::model::OwnerType;
use crate::model::project::DEFAULT_PROJECT_COLOR;
use crate::model::task::Priority;
use crate::reconcile::DEFAULT_SOURCE;

/// Directory holding the store and project config, under the project root.
pub const STORE_DIR: &str = ".trellis";
pub const DB_FILE: &str = "trellis.sqlite3";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; relative paths resolve against the project root.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_source")]
    pub source: String,
    /// Feed file read by `trellis sync` when no `--feed` is given.
    #[serde(default)]
    pub feed: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            feed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_owner_type")]
    pub owner_type: OwnerType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_project_color")]
    pub project_color: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            owner_type: default_owner_type(),
            priority: Priority::default(),
            project_color: default_project_color(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    /// Actor name used when no flag or env var names one.
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
    pub db_path: PathBuf,
}

/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(STORE_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// # Errors
///
/// Returns an error if the user config exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("trellis/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// # Errors
///
/// Returns an error if either config file is unreadable.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let resolved_output = resolve_output(
        cli_json,
        user.output.clone(),
        env::var("TRELLIS_FORMAT").ok(),
    );
    let db_path = resolve_db_path(project_root, &project, env::var("TRELLIS_DB").ok());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
        db_path,
    })
}

/// `TRELLIS_DB` wins, then `[store] path`, then `.trellis/trellis.sqlite3`.
#[must_use]
pub fn resolve_db_path(project_root: &Path, config: &ProjectConfig, env_db: Option<String>) -> PathBuf {
    if let Some(path) = env_db.filter(|raw| !raw.trim().is_empty()) {
        return PathBuf::from(path);
    }
    match &config.store.path {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => project_root.join(path),
        None => project_root.join(STORE_DIR).join(DB_FILE),
    }
}

fn resolve_output(cli_json: bool, user_output: Option<String>, env_format: Option<String>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

const fn default_owner_type() -> OwnerType {
    OwnerType::Human
}

fn default_project_color() -> String {
    DEFAULT_PROJECT_COLOR.to_string()
}
