use std::{collections::HashMap, fs, path::PathBuf};

use anyhow::Context;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Authoring backend. Without one the console works on the local data directory and
    /// generation is unavailable.
    pub backend_url: Option<String>,
    pub data_dir: PathBuf,
    pub outputs_dir: PathBuf,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: None,
            data_dir: PathBuf::from("./data"),
            outputs_dir: PathBuf::from("./outputs"),
            log_filter: "info".into(),
        }
    }
}

/// Command-line values that win over the file and the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub outputs_dir: Option<PathBuf>,
    pub offline: bool,
}

pub fn load_settings(config_path: Option<PathBuf>, overrides: Overrides) -> Settings {
    let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let raw = fs::read_to_string(path).ok();
    let mut settings = settings_from_sources(raw.as_deref(), |key| std::env::var(key).ok());
    apply_overrides(&mut settings, overrides);
    settings
}

/// Defaults, then the config file, then environment variables.
pub fn settings_from_sources(
    raw_file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = raw_file {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
            if let Some(v) = file_cfg.get("backend_url") {
                settings.backend_url = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("data_dir") {
                settings.data_dir = PathBuf::from(v);
            }
            if let Some(v) = file_cfg.get("outputs_dir") {
                settings.outputs_dir = PathBuf::from(v);
            }
            if let Some(v) = file_cfg.get("log_filter") {
                settings.log_filter = v.clone();
            }
        }
    }

    if let Some(v) = env("CONSOLE_BACKEND_URL") {
        settings.backend_url = Some(v);
    }
    if let Some(v) = env("APP__BACKEND_URL") {
        settings.backend_url = Some(v);
    }

    if let Some(v) = env("APP__DATA_DIR") {
        settings.data_dir = PathBuf::from(v);
    }
    if let Some(v) = env("APP__OUTPUTS_DIR") {
        settings.outputs_dir = PathBuf::from(v);
    }

    if let Some(v) = env("RUST_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = env("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    settings
}

pub fn apply_overrides(settings: &mut Settings, overrides: Overrides) {
    if let Some(v) = overrides.backend_url {
        settings.backend_url = Some(v);
    }
    if let Some(v) = overrides.data_dir {
        settings.data_dir = v;
    }
    if let Some(v) = overrides.outputs_dir {
        settings.outputs_dir = v;
    }
    if overrides.offline {
        settings.backend_url = None;
    }
    if settings
        .backend_url
        .as_deref()
        .is_some_and(|url| url.trim().is_empty())
    {
        settings.backend_url = None;
    }
}

impl Settings {
    /// Parsed backend url, if one is configured.
    pub fn backend(&self) -> anyhow::Result<Option<Url>> {
        let Some(raw) = self.backend_url.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(raw.trim())
            .with_context(|| format!("invalid backend url '{raw}'"))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("backend url '{raw}' must use http or https");
        }
        Ok(Some(url))
    }
}
