use mcai_contracts::config::{ConfigSnapshot, ConfigStore};
use mcai_contracts::events::{EventPayload, EventWriter};
use mcai_contracts::presets;
use mcai_contracts::request::{GenerationOutcome, GenerationRequest};
use mcai_contracts::targets::Target;
use mcai_contracts::validation::PatternValidator;
use mcai_contracts::McaiError;
use serde::Serialize;
use serde_json::Value;

use crate::gateway::{CompletionGateway, ProviderGateway};
use crate::orchestrator::Orchestrator;
use crate::settings::Settings;

const BEARER_PREFIX: &str = "bearer ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetConfigResponse {
    pub ok: bool,
    pub active_preset: String,
}

/// Operation surface shared by every transport: bearer gate, preset config
/// and code generation.
pub struct GenerationService {
    store: ConfigStore,
    gateway: Box<dyn CompletionGateway>,
    validator: PatternValidator,
    events: EventWriter,
    app_token: Option<String>,
}

impl GenerationService {
    pub fn new(store: ConfigStore, gateway: Box<dyn CompletionGateway>, events: EventWriter) -> Self {
        Self {
            store,
            gateway,
            validator: PatternValidator,
            events,
            app_token: None,
        }
    }

    pub fn with_app_token(mut self, token: Option<String>) -> Self {
        self.app_token = token.filter(|token| !token.trim().is_empty());
        self
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, McaiError> {
        let store = ConfigStore::open(settings.config_path())?;
        let events = settings
            .events_path
            .as_ref()
            .map(EventWriter::new)
            .unwrap_or_else(EventWriter::disabled);
        let gateway = ProviderGateway::from_settings(settings);
        Ok(Self::new(store, Box::new(gateway), events).with_app_token(settings.app_token.clone()))
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Passes everything when no token is configured. Otherwise the credential,
    /// with any `Bearer ` prefix removed, must equal the token exactly.
    pub fn authorize(&self, credential: Option<&str>) -> Result<(), McaiError> {
        let Some(expected) = self.app_token.as_deref() else {
            return Ok(());
        };
        let presented = credential.map(strip_bearer).unwrap_or_default();
        if presented == expected {
            Ok(())
        } else {
            Err(McaiError::Unauthorized)
        }
    }

    pub fn get_config(&self) -> ConfigSnapshot {
        self.store.snapshot()
    }

    pub fn set_config(&self, preset: Option<&str>) -> Result<SetConfigResponse, McaiError> {
        let label = preset
            .filter(|label| !label.trim().is_empty())
            .ok_or(McaiError::MissingField("preset"))?;
        let previous = self.store.active_preset();
        let snapshot = self.store.set_active(label)?;
        tracing::info!(from = previous.as_str(), to = label, "active preset changed");
        let mut payload = EventPayload::new();
        payload.insert("from".to_string(), Value::String(previous));
        payload.insert("to".to_string(), Value::String(snapshot.active_preset.clone()));
        if let Err(err) = self.events.emit("preset_changed", payload) {
            tracing::warn!("event log write failed: {err:#}");
        }
        Ok(SetConfigResponse {
            ok: true,
            active_preset: snapshot.active_preset,
        })
    }

    pub fn generate(
        &self,
        target: Option<&str>,
        request: Option<&str>,
        current_code: Option<&str>,
    ) -> Result<GenerationOutcome, McaiError> {
        let target = target
            .filter(|target| !target.trim().is_empty())
            .ok_or(McaiError::MissingField("target"))?;
        let request_text = request
            .filter(|request| !request.trim().is_empty())
            .ok_or(McaiError::MissingField("request"))?;
        let target: Target = target.parse()?;
        let request = GenerationRequest::new(target, request_text, current_code)?;

        let label = self.store.active_preset();
        let binding = presets::resolve(&label);
        let events = self.events.for_request(uuid::Uuid::new_v4().to_string());
        let mut started = EventPayload::new();
        started.insert("target".to_string(), Value::String(target.as_str().to_string()));
        started.insert("preset".to_string(), Value::String(label.clone()));
        started.insert(
            "provider".to_string(),
            Value::String(binding.provider.as_str().to_string()),
        );
        started.insert("model".to_string(), Value::String(binding.model_id.clone()));
        emit_or_warn(&events, "generation_started", started);

        let orchestrator = Orchestrator::new(self.gateway.as_ref(), &self.validator, events.clone());
        match orchestrator.run(&binding, &request) {
            Ok(outcome) => {
                let mut finished = EventPayload::new();
                finished.insert(
                    "code_chars".to_string(),
                    Value::from(outcome.code.chars().count()),
                );
                finished.insert(
                    "feedback_lines".to_string(),
                    Value::from(outcome.feedback.len()),
                );
                emit_or_warn(&events, "generation_finished", finished);
                Ok(outcome)
            }
            Err(err) => {
                tracing::error!(preset = label.as_str(), "generation failed: {err}");
                let mut failed = EventPayload::new();
                failed.insert("error".to_string(), Value::String(err.to_string()));
                emit_or_warn(&events, "generation_failed", failed);
                Err(err)
            }
        }
    }
}

fn strip_bearer(credential: &str) -> &str {
    let trimmed = credential.trim();
    match trimmed.get(..BEARER_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(BEARER_PREFIX) => {
            trimmed[BEARER_PREFIX.len()..].trim()
        }
        _ => trimmed,
    }
}

fn emit_or_warn(events: &EventWriter, event_type: &str, payload: EventPayload) {
    if let Err(err) = events.emit(event_type, payload) {
        tracing::warn!(event = event_type, "event log write failed: {err:#}");
    }
}
