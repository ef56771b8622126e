use crate::settings::Settings;
use eyre::Result;
use serde_json;
use std::{fs, path::PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    filepath: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            filepath: PathBuf::from("configuration.json"),
        }
    }
}

impl Config {
    pub fn new() -> Result<Self> {
        let prefix = get_app_data_prefix()?;
        let filepath = prefix.join("configuration.json");

        if filepath.exists() {
            return Self::load_from(filepath);
        }

        // Save initial config if it doesn't exist
        let settings = Settings::default();
        let initial_config = serde_json::json!({ "Setting": settings });
        fs::create_dir_all(&prefix)?;
        fs::write(&filepath, serde_json::to_string_pretty(&initial_config)?)?;

        Ok(Self { settings, filepath })
    }

    /// Get the configuration file path
    pub fn filepath(&self) -> &PathBuf {
        &self.filepath
    }

    /// Load configuration from a custom path. A missing file yields defaults;
    /// unparseable JSON is ignored in the same way.
    pub fn load_from(filepath: PathBuf) -> Result<Self> {
        let mut settings = Settings::default();

        if filepath.exists() {
            let config_str = fs::read_to_string(&filepath)?;
            if let Ok(user_config) = serde_json::from_str::<serde_json::Value>(&config_str) {
                if let Some(user_settings) = user_config.get("Setting") {
                    match serde_json::from_value::<Settings>(user_settings.clone()) {
                        Ok(parsed) => settings = parsed,
                        Err(err) => crate::logging::warn(format!(
                            "Ignoring invalid settings in {}: {err}",
                            filepath.display()
                        )),
                    }
                }
            }
        }

        Ok(Self {
            settings: settings.sanitized(),
            filepath,
        })
    }
}

pub fn get_app_data_prefix() -> Result<PathBuf> {
    if let Some(config_home) = std::env::var_os("XDG_CONFIG_HOME") {
        let path = PathBuf::from(config_home).join("lexicon-reader");
        return Ok(path);
    } else if let Some(home) = std::env::var_os("HOME") {
        let path = PathBuf::from(home.clone()).join(".config").join("lexicon-reader");
        if path.exists() {
            return Ok(path);
        } else {
            return Ok(PathBuf::from(home).join(".lexicon-reader"));
        }
    } else if let Some(user_profile) = std::env::var_os("USERPROFILE") {
        return Ok(PathBuf::from(user_profile).join(".lexicon-reader"));
    }

    Err(eyre::eyre!(
        "Could not determine application data directory"
    ))
}
