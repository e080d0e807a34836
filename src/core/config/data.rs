use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::transport::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::utils::url::normalize_base_url;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Gemini model identifier (e.g., "gemini-2.0-flash")
    pub model: Option<String>,
    /// Base URL of the models collection; the model and action are appended
    pub base_url: Option<String>,
    /// Keep the API key in the system keyring (default on)
    pub use_keyring: Option<bool>,
}

/// Keys accepted by `gemchat set` / `gemchat unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Model,
    BaseUrl,
    UseKeyring,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 3] = [ConfigKey::Model, ConfigKey::BaseUrl, ConfigKey::UseKeyring];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::Model => "model",
            ConfigKey::BaseUrl => "base-url",
            ConfigKey::UseKeyring => "use-keyring",
        }
    }
}

impl TryFrom<&str> for ConfigKey {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.as_str() == value)
            .ok_or_else(|| {
                let known = ConfigKey::ALL.map(ConfigKey::as_str).join(", ");
                format!("Unknown config key: {value} (expected one of: {known})")
            })
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Config {
    /// Command-line value, then config value, then the built-in default.
    pub fn resolve_model(&self, cli_model: Option<&str>) -> String {
        non_blank(cli_model)
            .or_else(|| non_blank(self.model.as_deref()))
            .unwrap_or(DEFAULT_MODEL)
            .to_string()
    }

    pub fn resolve_base_url(&self, cli_base_url: Option<&str>) -> String {
        normalize_base_url(
            non_blank(cli_base_url)
                .or_else(|| non_blank(self.base_url.as_deref()))
                .unwrap_or(DEFAULT_BASE_URL),
        )
    }

    pub fn use_keyring(&self) -> bool {
        self.use_keyring.unwrap_or(true)
    }

    pub fn set_value(&mut self, key: ConfigKey, value: &str) -> Result<(), String> {
        let value = value.trim();
        if value.is_empty() {
            return Err(format!("A value is required for {key}"));
        }
        match key {
            ConfigKey::Model => self.model = Some(value.to_string()),
            ConfigKey::BaseUrl => {
                check_base_url(value)?;
                self.base_url = Some(normalize_base_url(value));
            }
            ConfigKey::UseKeyring => self.use_keyring = Some(parse_toggle(value)?),
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: ConfigKey) {
        match key {
            ConfigKey::Model => self.model = None,
            ConfigKey::BaseUrl => self.base_url = None,
            ConfigKey::UseKeyring => self.use_keyring = None,
        }
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.model {
            Some(model) => println!("  model: {model}"),
            None => println!("  model: (unset, using {DEFAULT_MODEL})"),
        }
        match &self.base_url {
            Some(base_url) => println!("  base-url: {base_url}"),
            None => println!("  base-url: (unset, using {DEFAULT_BASE_URL})"),
        }
        match self.use_keyring() {
            true => println!("  use-keyring: on"),
            false => println!("  use-keyring: off"),
        }
    }
}

/// Accepts only http(s) URLs, whether they come from `set` or `--base-url`.
pub fn check_base_url(value: &str) -> Result<(), String> {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(format!(
            "{} must start with http:// or https:// (got '{value}')",
            ConfigKey::BaseUrl
        ))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_toggle(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("Expected on/off, got '{other}'")),
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
