use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CONFIG_FILE_PATH: &str = "portal.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub chat_model: Option<String>,
    /// Model for document and sheet generation; falls back to `chat_model`.
    #[serde(default)]
    pub coder_model: Option<String>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            api_key: None,
            chat_model: None,
            coder_model: None,
            stream: default_stream(),
        }
    }
}

fn portal_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".portal")
}

pub fn portal_config_json_path() -> PathBuf {
    portal_dir().join("config.json")
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl PortalConfig {
    /// `~/.portal/config.json`, else `./portal.toml`, then environment
    /// overrides.
    pub fn load() -> Self {
        let mut config = Self::load_from(&portal_config_json_path(), Path::new(CONFIG_FILE_PATH));
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn load_from(json_path: &Path, toml_path: &Path) -> Self {
        if let Ok(content) = std::fs::read_to_string(json_path) {
            match serde_json::from_str::<PortalConfig>(&content) {
                Ok(config) => return config,
                Err(error) => log::warn!("Ignoring {}: {}", json_path.display(), error),
            }
        }

        if let Ok(content) = std::fs::read_to_string(toml_path) {
            match toml::from_str::<PortalConfig>(&content) {
                Ok(config) => return config,
                Err(error) => log::warn!("Ignoring {}: {}", toml_path.display(), error),
            }
        }

        Self::default()
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_base) = lookup("PORTAL_API_BASE") {
            self.api_base = Some(api_base);
        }
        if let Some(api_key) = lookup("PORTAL_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(model) = lookup("PORTAL_CHAT_MODEL") {
            self.chat_model = Some(model);
        }
        if let Some(model) = lookup("PORTAL_CODER_MODEL") {
            self.coder_model = Some(model);
        }
        if let Some(stream) = lookup("PORTAL_STREAM") {
            self.stream = parse_bool_env(&stream);
        }
    }

    pub fn artifact_model(&self) -> Option<String> {
        self.coder_model.clone().or_else(|| self.chat_model.clone())
    }
}
