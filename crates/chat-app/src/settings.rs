use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use quantalex_llm::{DEFAULT_OPENROUTER_MODEL, OPENROUTER_BASE_URL, ProviderConfig};

pub const SETTINGS_DIRECTORY_NAME: &str = "quantalex";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SETTINGS_ENV_PREFIX: &str = "QUANTALEX_";
pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";
pub const APP_TITLE: &str = "QuantaLex AI Assistant";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sent as the attribution referer on every completion request.
    #[serde(default = "default_site_url")]
    pub site_url: String,
    #[serde(default = "default_app_title")]
    pub app_title: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            default_model: default_model(),
            site_url: default_site_url(),
            app_title: default_app_title(),
        }
    }
}

impl Settings {
    pub fn is_valid(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Creates a provider config from these settings.
    /// Returns None if the API key is empty.
    pub fn to_provider_config(&self) -> Option<ProviderConfig> {
        if !self.is_valid() {
            return None;
        }

        Some(ProviderConfig::new(
            &self.api_key,
            &self.base_url,
            &self.site_url,
            &self.app_title,
            Some(self.default_model.clone()),
        ))
    }

    pub fn normalized(mut self) -> Self {
        self.api_key = self.api_key.trim().to_string();
        self.base_url = non_empty_or(self.base_url, default_base_url);
        self.default_model = non_empty_or(self.default_model, default_model);
        self.site_url = non_empty_or(self.site_url, default_site_url);
        self.app_title = non_empty_or(self.app_title, default_app_title);
        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<Settings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".quantalex"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Default location for conversation and identity blobs.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".quantalex"))
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: Settings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &PathBuf) -> Settings {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }
        figment = figment.merge(Env::prefixed(SETTINGS_ENV_PREFIX));

        let mut settings = match figment.extract::<Settings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                Settings::default()
            }
        };

        // The provider's own env var wins when nothing else supplied a key.
        if settings.api_key.is_empty()
            && let Ok(env_key) = std::env::var("OPENROUTER_API_KEY")
        {
            settings.api_key = env_key.trim().to_string();
        }

        settings
    }

    fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_base_url() -> String {
    OPENROUTER_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_OPENROUTER_MODEL.to_string()
}

fn default_site_url() -> String {
    DEFAULT_SITE_URL.to_string()
}

fn default_app_title() -> String {
    APP_TITLE.to_string()
}

fn non_empty_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_openrouter() {
        let settings = Settings::default();
        assert_eq!(settings.base_url, OPENROUTER_BASE_URL);
        assert_eq!(settings.default_model, DEFAULT_OPENROUTER_MODEL);
        assert!(!settings.is_valid());
        assert!(settings.to_provider_config().is_none());
    }

    #[test]
    fn normalization_backfills_blank_fields() {
        let settings = Settings {
            api_key: "  sk-or-key  ".to_string(),
            base_url: "   ".to_string(),
            default_model: String::new(),
            site_url: "https://quantalex.example".to_string(),
            app_title: String::new(),
        }
        .normalized();

        assert_eq!(settings.api_key, "sk-or-key");
        assert_eq!(settings.base_url, OPENROUTER_BASE_URL);
        assert_eq!(settings.default_model, DEFAULT_OPENROUTER_MODEL);
        assert_eq!(settings.site_url, "https://quantalex.example");
        assert_eq!(settings.app_title, APP_TITLE);
    }

    #[test]
    fn settings_round_trip_through_the_store() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("settings.json");

        let store = SettingsStore::new(path.clone());
        store
            .update(Settings {
                api_key: "sk-or-key".to_string(),
                ..Settings::default()
            })
            .unwrap();

        let reloaded = SettingsStore::new(path);
        assert_eq!(reloaded.settings().api_key, "sk-or-key");
        assert!(reloaded.settings().to_provider_config().is_some());
    }
}
