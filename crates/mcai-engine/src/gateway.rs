use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use mcai_contracts::presets::{ProviderBinding, ProviderKind, AUTO_ROUTE_MODEL};
use mcai_contracts::prompts::PromptPair;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::Url;
use serde_json::{json, Value};

use crate::settings::Settings;

pub const TEMPERATURE: f64 = 0.1;
pub const MAX_OUTPUT_TOKENS: u64 = 3072;

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "chatgpt-4o-latest";
const OPENROUTER_DEFAULT_BASE: &str = "https://openrouter.ai/api/v1";

/// One call shape over every provider: system + user in, trimmed text out.
///
/// No retries happen behind this trait.
pub trait CompletionGateway: Send + Sync {
    fn complete(&self, binding: &ProviderBinding, prompt: &PromptPair) -> Result<String>;
}

pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn complete(&self, model: &str, prompt: &PromptPair) -> Result<String>;
}

#[derive(Default)]
pub struct ProviderGateway {
    providers: BTreeMap<ProviderKind, Box<dyn ChatProvider>>,
}

impl ProviderGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut gateway = Self::new();
        gateway.register(OpenAiProvider::new(settings));
        gateway.register(OpenRouterProvider::new(settings));
        gateway
    }

    pub fn register<P: ChatProvider + 'static>(&mut self, provider: P) {
        self.providers.insert(provider.kind(), Box::new(provider));
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&dyn ChatProvider> {
        self.providers.get(&kind).map(|provider| provider.as_ref())
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.providers.keys().copied().collect()
    }
}

impl CompletionGateway for ProviderGateway {
    fn complete(&self, binding: &ProviderBinding, prompt: &PromptPair) -> Result<String> {
        let Some(provider) = self.get(binding.provider) else {
            bail!("no provider registered for {}", binding.provider.as_str());
        };
        provider.complete(&binding.model_id, prompt)
    }
}

struct OpenAiProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl OpenAiProvider {
    fn new(settings: &Settings) -> Self {
        Self {
            api_base: api_base(settings.openai_api_base.as_deref(), OPENAI_DEFAULT_BASE),
            api_key: settings.openai_api_key.clone(),
            http: HttpClient::new(),
        }
    }
}

impl ChatProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn complete(&self, model: &str, prompt: &PromptPair) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("OPENAI_API_KEY missing");
        };
        let endpoint = format!("{}/chat/completions", self.api_base);
        let payload = chat_payload(model_or(model, OPENAI_DEFAULT_MODEL), prompt);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .with_context(|| format!("OpenAI request failed ({endpoint})"))?;
        let parsed = response_json_or_error("OpenAI", response)?;
        Ok(extract_message_text(&parsed))
    }
}

struct OpenRouterProvider {
    api_base: String,
    api_key: Option<String>,
    referer: Option<String>,
    title: String,
    http: HttpClient,
}

impl OpenRouterProvider {
    fn new(settings: &Settings) -> Self {
        Self {
            api_base: api_base(
                settings.openrouter_api_base.as_deref(),
                OPENROUTER_DEFAULT_BASE,
            ),
            api_key: settings.openrouter_api_key.clone(),
            referer: settings
                .openrouter_referer
                .as_deref()
                .and_then(normalize_referer),
            title: settings.openrouter_title().to_string(),
            http: HttpClient::new(),
        }
    }
}

impl ChatProvider for OpenRouterProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenRouter
    }

    fn complete(&self, model: &str, prompt: &PromptPair) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("OPENROUTER_API_KEY missing");
        };
        let endpoint = format!("{}/chat/completions", self.api_base);
        let payload = chat_payload(model_or(model, AUTO_ROUTE_MODEL), prompt);
        let mut request = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .header("X-Title", self.title.as_str());
        if let Some(referer) = self.referer.as_deref() {
            request = request.header("HTTP-Referer", referer);
        }
        let response = request
            .json(&payload)
            .send()
            .with_context(|| format!("OpenRouter request failed ({endpoint})"))?;
        let parsed = response_json_or_error("OpenRouter", response)?;
        Ok(extract_message_text(&parsed))
    }
}

fn api_base(configured: Option<&str>, default: &str) -> String {
    configured
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn model_or<'a>(model: &'a str, default: &'a str) -> &'a str {
    if model.trim().is_empty() {
        default
    } else {
        model
    }
}

fn chat_payload(model: &str, prompt: &PromptPair) -> Value {
    json!({
        "model": model,
        "temperature": TEMPERATURE,
        "max_tokens": MAX_OUTPUT_TOKENS,
        "messages": [
            { "role": "system", "content": prompt.system_text },
            { "role": "user", "content": prompt.user_text },
        ],
    })
}

fn extract_message_text(payload: &Value) -> String {
    payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.pointer("/message/content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Reduces a referer to `scheme://host[:port]`.
fn normalize_referer(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let origin = url.origin();
    origin
        .is_tuple()
        .then(|| origin.ascii_serialization())
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
