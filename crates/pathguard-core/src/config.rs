//! Configuration management for pathguard services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`PATHGUARD__` prefix, `__` separator)
//! 2. Config file (`pathguard.toml`, or the prefix given with `--config`)
//! 3. Defaults

use serde::Deserialize;

use crate::error::PathguardError;

/// Mirror and evaluation switches.
///
/// Loaded from the `[settings]` section or `PATHGUARD__SETTINGS__*`
/// environment variables.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Master switch. When off, mirror sync and graph evaluation are
    /// bypassed and only relational permission codes apply.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Derive relationship labels from field names instead of a generic label.
    #[serde(default = "default_true")]
    pub named_relationships: bool,

    /// Kinds that are never mirrored: `app.model`, `app.*`, or `app`.
    #[serde(default = "default_ignore_models")]
    pub ignore_models: Vec<String>,

    /// How far a sync propagates into related rows.
    #[serde(default = "default_max_connection_depth")]
    pub max_connection_depth: u32,

    /// Also connect instance nodes to their kind's meta node.
    #[serde(default)]
    pub connect_meta_nodes: bool,
}

impl Settings {
    /// Whether rows of `kind` (`"<app_label>.<model_name>"`) are excluded
    /// from the mirror.
    pub fn is_ignored(&self, kind: &str) -> bool {
        let kind = kind.to_lowercase();
        let app_label = kind.split_once('.').map_or(kind.as_str(), |(app, _)| app);

        self.ignore_models.iter().any(|pattern| {
            let pattern = pattern.to_lowercase();
            match pattern.strip_suffix(".*") {
                Some(app) => app == app_label,
                None if pattern.contains('.') => pattern == kind,
                None => pattern == app_label,
            }
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            named_relationships: true,
            ignore_models: default_ignore_models(),
            max_connection_depth: default_max_connection_depth(),
            connect_meta_nodes: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ignore_models() -> Vec<String> {
    vec![
        "admin.logentry".to_string(),
        "migrations.migration".to_string(),
    ]
}

fn default_max_connection_depth() -> u32 {
    1
}

/// Build the layered configuration source shared by every binary.
pub fn load_source(file_prefix: &str) -> Result<config::Config, PathguardError> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("PATHGUARD")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("settings.ignore_models")
                .try_parsing(true),
        )
        .build()?;
    Ok(cfg)
}

/// Read the `[settings]` section, falling back to defaults when absent.
pub fn load_settings(cfg: &config::Config) -> Result<Settings, PathguardError> {
    match cfg.get::<Settings>("settings") {
        Ok(settings) => Ok(settings),
        Err(config::ConfigError::NotFound(_)) => Ok(Settings::default()),
        Err(e) => Err(e.into()),
    }
}
