pub mod gateway;
pub mod orchestrator;
pub mod service;
pub mod settings;

pub use gateway::{CompletionGateway, ProviderGateway};
pub use orchestrator::{next_attempt, AttemptKind, Orchestrator, MAX_ATTEMPTS};
pub use service::{GenerationService, SetConfigResponse};
pub use settings::Settings;
