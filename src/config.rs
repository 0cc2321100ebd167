use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ReflensError, Result};

/// Name of the configuration file stored inside the `.reflens` directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Name of the hidden directory holding per-workspace settings.
pub const REFLENS_DIR: &str = ".reflens";

/// Which implementation answers revision lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupBackend {
    /// Shell out to the `git` binary.
    #[default]
    Cli,
    /// Read the object database in-process with gix.
    Gix,
}

/// Configuration for a reflens workspace.
///
/// Controls which documents get links and hovers, the accepted hash lengths,
/// and how hover actions are wired up in the host editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflensConfig {
    /// Schema version of the configuration.
    pub version: u32,
    /// Language ids whose documents get `@reference` links. Empty means all.
    pub link_languages: Vec<String>,
    /// Language ids whose documents get hash hovers. Empty means all.
    pub hover_languages: Vec<String>,
    /// Shortest hex run treated as a hash.
    pub min_hash_len: usize,
    /// Longest hex run treated as a hash.
    pub max_hash_len: usize,
    /// Characters of the hash shown for a resolved commit.
    pub short_hash_len: usize,
    /// Characters of the hash shown in fallback hovers.
    pub fallback_hash_len: usize,
    /// Host command that opens the full commit view.
    pub view_command: String,
    /// Terminal command prefix used to resume an external session.
    pub terminal_verb: String,
    /// Revision lookup implementation.
    pub backend: LookupBackend,
    /// Upper bound on a single `git` invocation, in milliseconds.
    pub git_timeout_ms: u64,
}

impl Default for ReflensConfig {
    fn default() -> Self {
        Self {
            version: 1,
            link_languages: vec![
                "markdown".to_string(),
                "swift".to_string(),
                "typescript".to_string(),
                "python".to_string(),
            ],
            hover_languages: vec![
                "markdown".to_string(),
                "typescript".to_string(),
                "javascript".to_string(),
                "python".to_string(),
            ],
            min_hash_len: 7,
            max_hash_len: 40,
            short_hash_len: 7,
            fallback_hash_len: 8,
            view_command: "git.viewCommit".to_string(),
            terminal_verb: "resume".to_string(),
            backend: LookupBackend::Cli,
            git_timeout_ms: 2_000,
        }
    }
}

impl ReflensConfig {
    /// Returns the git invocation timeout as a `Duration`.
    pub fn git_timeout(&self) -> Duration {
        Duration::from_millis(self.git_timeout_ms)
    }

    /// Checks that the hash length settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.min_hash_len == 0 || self.max_hash_len == 0 {
            return Err(ReflensError::Config {
                message: "hash lengths must be greater than zero".to_string(),
            });
        }
        if self.min_hash_len > self.max_hash_len {
            return Err(ReflensError::Config {
                message: format!(
                    "min_hash_len ({}) is greater than max_hash_len ({})",
                    self.min_hash_len, self.max_hash_len
                ),
            });
        }
        if self.short_hash_len == 0 || self.fallback_hash_len == 0 {
            return Err(ReflensError::Config {
                message: "displayed hash lengths must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Returns the path to the `.reflens` directory within the given workspace root.
pub fn get_reflens_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join(REFLENS_DIR)
}

/// Returns the path to the workspace configuration file.
pub fn get_config_path(workspace_root: &Path) -> PathBuf {
    get_reflens_dir(workspace_root).join(CONFIG_FILENAME)
}

/// Returns the path to the user-level configuration file, if the platform
/// has a config directory.
pub fn get_user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reflens").join(CONFIG_FILENAME))
}

/// Loads the configuration for a workspace.
///
/// Looks at `<root>/.reflens/config.json` first, then the user-level config
/// file, and falls back to defaults when neither exists.
pub fn load_config(workspace_root: &Path) -> Result<ReflensConfig> {
    let workspace_path = get_config_path(workspace_root);
    if workspace_path.exists() {
        return read_config_file(&workspace_path);
    }

    if let Some(user_path) = get_user_config_path() {
        if user_path.exists() {
            return read_config_file(&user_path);
        }
    }

    Ok(ReflensConfig::default())
}

/// Reads and validates a single configuration file.
pub fn read_config_file(config_path: &Path) -> Result<ReflensConfig> {
    let contents = fs::read_to_string(config_path).map_err(|e| ReflensError::Config {
        message: format!(
            "failed to read config file '{}': {}",
            config_path.display(),
            e
        ),
    })?;

    let config: ReflensConfig =
        serde_json::from_str(&contents).map_err(|e| ReflensError::Config {
            message: format!(
                "failed to parse config file '{}': {}",
                config_path.display(),
                e
            ),
        })?;

    config.validate()?;
    tracing::debug!(path = %config_path.display(), "loaded config");
    Ok(config)
}

/// Saves the configuration to disk using an atomic write.
///
/// Writes to a temporary file first and then renames it into place.
pub fn save_config(workspace_root: &Path, config: &ReflensConfig) -> Result<()> {
    let reflens_dir = get_reflens_dir(workspace_root);
    fs::create_dir_all(&reflens_dir).map_err(|e| ReflensError::Config {
        message: format!(
            "failed to create config directory '{}': {}",
            reflens_dir.display(),
            e
        ),
    })?;

    let config_path = get_config_path(workspace_root);
    let tmp_path = config_path.with_extension("tmp");

    let json = serde_json::to_string_pretty(config).map_err(|e| ReflensError::Config {
        message: format!("failed to serialize config: {}", e),
    })?;

    fs::write(&tmp_path, &json).map_err(|e| ReflensError::Config {
        message: format!(
            "failed to write temporary config file '{}': {}",
            tmp_path.display(),
            e
        ),
    })?;

    fs::rename(&tmp_path, &config_path).map_err(|e| ReflensError::Config {
        message: format!(
            "failed to rename temporary config file '{}' to '{}': {}",
            tmp_path.display(),
            config_path.display(),
            e
        ),
    })?;

    Ok(())
}

/// Returns `true` if a provider configured with `languages` should run on a
/// document with the given language id. An empty list enables every language.
pub fn language_enabled(languages: &[String], language_id: &str) -> bool {
    languages.is_empty() || languages.iter().any(|l| l == language_id)
}
