use std::env;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_X_TITLE: &str = "MakeCode AI";

/// Process-level settings, read from the environment once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub openrouter_api_base: Option<String>,
    pub openrouter_referer: Option<String>,
    pub openrouter_title: Option<String>,
    pub app_token: Option<String>,
    pub config_path: Option<PathBuf>,
    pub events_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            openai_api_key: lookup("OPENAI_API_KEY"),
            openai_api_base: lookup("OPENAI_API_BASE"),
            openrouter_api_key: lookup("OPENROUTER_API_KEY"),
            openrouter_api_base: lookup("OPENROUTER_API_BASE")
                .or_else(|| lookup("OPENROUTER_BASE_URL")),
            openrouter_referer: lookup("OPENROUTER_HTTP_REFERER"),
            openrouter_title: lookup("OPENROUTER_X_TITLE"),
            app_token: lookup("SERVER_APP_TOKEN"),
            config_path: lookup("MCAI_CONFIG_PATH").map(PathBuf::from),
            events_path: lookup("MCAI_EVENTS_PATH").map(PathBuf::from),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn openrouter_title(&self) -> &str {
        self.openrouter_title.as_deref().unwrap_or(DEFAULT_X_TITLE)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
