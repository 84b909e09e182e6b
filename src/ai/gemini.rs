use std::env;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::ai::{AiGateway, GatewayError};
use crate::config::AiConfig;

const FALLBACK_API_KEY_ENV: &str = "API_KEY";

/// Gemini `generateContent` over blocking HTTP. Calls run on the
/// coordinator's worker threads, never on the thread that owns the notes.
pub struct GeminiGateway {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl GeminiGateway {
    pub fn from_config(config: &AiConfig) -> Result<Self, GatewayError> {
        let api_key = env::var(&config.api_key_env)
            .or_else(|_| env::var(FALLBACK_API_KEY_ENV))
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(var = %config.api_key_env, "no API key configured; AI actions will fail");
        }
        Self::new(config, api_key)
    }

    pub fn new(config: &AiConfig, api_key: Option<String>) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );
        tracing::info!(%endpoint, "initialised Gemini gateway");
        Ok(Self {
            client,
            endpoint,
            api_key,
            api_key_env: config.api_key_env.clone(),
        })
    }

    fn generate(&self, prompt: String) -> Result<String, GatewayError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GatewayError::MissingApiKey {
                var: self.api_key_env.clone(),
            });
        };
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }
        let payload: GenerateResponse = response
            .json()
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        Ok(payload.text().trim().to_string())
    }
}

impl AiGateway for GeminiGateway {
    fn generate_title(&self, content: &str) -> Result<String, GatewayError> {
        self.generate(format!(
            "Generate a short, concise, and engaging title (max 5-6 words) for the following note. Do not use quotes. \n\nNote Content:\n{content}"
        ))
    }

    fn summarize(&self, content: &str) -> Result<String, GatewayError> {
        self.generate(format!(
            "Provide a concise summary (bullet points) of the following text. \n\nText:\n{content}"
        ))
    }

    fn polish(&self, content: &str) -> Result<String, GatewayError> {
        self.generate(format!(
            "Fix grammar, improve flow, and professionally polish the following text without changing the original meaning significantly. Return only the polished text.\n\nText:\n{content}"
        ))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

impl GenerateResponse {
    /// Text parts of the first candidate, concatenated.
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}
