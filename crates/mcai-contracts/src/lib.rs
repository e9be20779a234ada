pub mod config;
pub mod editor;
pub mod error;
pub mod events;
pub mod presets;
pub mod prompts;
pub mod request;
pub mod response;
pub mod targets;
pub mod validation;

pub use error::McaiError;
