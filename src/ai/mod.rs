//! AI-assisted transformations of note content.
//!
//! [`AiGateway`] is the seam to the remote text-generation service and
//! [`coordinator::AiCoordinator`] drives one request at a time against it for
//! the open note.

use clap::ValueEnum;
use strum::{Display, EnumIter};
use thiserror::Error;

pub mod coordinator;
pub mod gemini;

pub use coordinator::{AiCoordinator, AiEvent, AiStatus, RequestOutcome, SessionAiState};
pub use gemini::GeminiGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no API key found in ${var}")]
    MissingApiKey { var: String },
    #[error("request to generation service failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response from generation service: {0}")]
    Decode(String),
}

/// Remote text generation. Implementations return the generated text
/// trimmed; an empty string means the service produced nothing usable.
pub trait AiGateway: Send + Sync {
    fn generate_title(&self, content: &str) -> Result<String, GatewayError>;
    fn summarize(&self, content: &str) -> Result<String, GatewayError>;
    fn polish(&self, content: &str) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, ValueEnum)]
pub enum AiAction {
    #[strum(serialize = "generate title")]
    #[value(name = "title")]
    GenerateTitle,
    #[strum(serialize = "summarize")]
    Summarize,
    #[strum(serialize = "polish")]
    Polish,
}

impl AiAction {
    pub fn invoke(self, gateway: &dyn AiGateway, input: &str) -> Result<String, GatewayError> {
        match self {
            AiAction::GenerateTitle => gateway.generate_title(input),
            AiAction::Summarize => gateway.summarize(input),
            AiAction::Polish => gateway.polish(input),
        }
    }

    pub fn success_message(self) -> &'static str {
        match self {
            AiAction::GenerateTitle => "Title generated!",
            AiAction::Summarize => "Summary added!",
            AiAction::Polish => "Text polished!",
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            AiAction::GenerateTitle => "Failed to generate title.",
            AiAction::Summarize => "Failed to summarize.",
            AiAction::Polish => "Failed to polish.",
        }
    }
}
