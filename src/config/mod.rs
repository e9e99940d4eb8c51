mod store;

pub use store::{load_config, save_config, FileSettingsStore, MemoryStore, SettingsStore};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL: &str = "gpt-4-turbo-preview";
pub const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";
pub const LMSTUDIO_MODEL: &str = "local-model";

/// Backend flavor the client talks to. Affects default endpoint/model and
/// whether an API key is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    LmStudio,
    Other,
}

impl Provider {
    /// Pre-fill values when the user switches provider. `Other` has no
    /// opinion and leaves the current fields alone.
    pub fn defaults(self) -> Option<(&'static str, &'static str)> {
        match self {
            Provider::OpenAi => Some((OPENAI_BASE_URL, OPENAI_MODEL)),
            Provider::LmStudio => Some((LMSTUDIO_BASE_URL, LMSTUDIO_MODEL)),
            Provider::Other => None,
        }
    }

    /// Whether this provider requires an API key before issuing requests.
    pub fn requires_api_key(self) -> bool {
        matches!(self, Provider::OpenAi)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::LmStudio => "lmstudio",
            Provider::Other => "other",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Provider::OpenAi),
            "lmstudio" => Ok(Provider::LmStudio),
            "other" => Ok(Provider::Other),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// Connection settings for the assistant. Persisted as a single JSON record
/// and overwritten wholesale on every save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    pub provider: Provider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig {
            provider: Provider::OpenAi,
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: String::new(),
            model: OPENAI_MODEL.to_string(),
        }
    }
}

impl AiConfig {
    /// Chat-completions endpoint, with trailing slashes stripped from the
    /// configured base URL.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}
