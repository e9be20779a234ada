use std::sync::LazyLock;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PRESET: &str = "openai/chatgpt-4o-latest";
pub const AUTO_ROUTE_MODEL: &str = "openrouter/auto";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderBinding {
    pub provider: ProviderKind,
    pub model_id: String,
}

impl ProviderBinding {
    pub fn new(provider: ProviderKind, model_id: &str) -> Self {
        Self {
            provider,
            model_id: model_id.to_string(),
        }
    }

    pub fn auto_routed() -> Self {
        Self::new(ProviderKind::OpenRouter, AUTO_ROUTE_MODEL)
    }
}

/// Label -> provider/model routing table.
///
/// Labels are what users pick; model ids are what the provider catalog
/// actually serves, so the two do not always agree.
#[derive(Debug, Clone)]
pub struct PresetTable {
    routes: IndexMap<String, ProviderBinding>,
}

impl PresetTable {
    pub fn new(routes: Option<IndexMap<String, ProviderBinding>>) -> Self {
        Self {
            routes: routes.unwrap_or_else(default_routes),
        }
    }

    pub fn get(&self, label: &str) -> Option<&ProviderBinding> {
        self.routes.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Total over every string; unknown labels take the auto route.
    pub fn resolve(&self, label: &str) -> ProviderBinding {
        self.get(label)
            .cloned()
            .unwrap_or_else(ProviderBinding::auto_routed)
    }
}

static DEFAULT_TABLE: LazyLock<PresetTable> = LazyLock::new(|| PresetTable::new(None));

pub fn resolve(label: &str) -> ProviderBinding {
    DEFAULT_TABLE.resolve(label)
}

pub fn default_catalog() -> Vec<String> {
    DEFAULT_TABLE.labels().map(str::to_string).collect()
}

fn default_routes() -> IndexMap<String, ProviderBinding> {
    let mut map = IndexMap::new();

    let mut insert = |label: &str, model_id: &str| {
        map.insert(
            label.to_string(),
            ProviderBinding::new(ProviderKind::OpenRouter, model_id),
        );
    };

    insert(DEFAULT_PRESET, "openai/gpt-4o");
    insert("openai/gpt-5", "openai/gpt-5");
    insert("google/gemini-2.5-pro", "google/gemini-2.5-pro");
    insert("google/gemini-2.5-flash", "google/gemini-2.5-flash");
    insert("anthropic/claude-sonnet-4.5", "anthropic/claude-3.7-sonnet");
    insert("x-ai/grok-code-fast-1", "x-ai/grok-code-fast-1");
    insert("qwen/qwen3-coder", "qwen/qwen-3-coder");
    insert(
        "deepseek/deepseek-chat-v3.1:free",
        "deepseek/deepseek-chat-v3.1:free",
    );
    insert(AUTO_ROUTE_MODEL, AUTO_ROUTE_MODEL);

    map
}
