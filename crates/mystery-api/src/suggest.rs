//! Question suggestions for the public send page.
//!
//! Asks a Mistral chat-completions endpoint for three `||`-separated
//! questions. The generator is optional: without an API key, or when the
//! upstream call fails for any reason, a static set is served instead.

use std::time::Duration;

use axum::{extract::State, http::header, response::IntoResponse};
use rand::seq::IndexedRandom;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::AppState;
use crate::error::ApiError;

pub const DEFAULT_MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";
pub const DEFAULT_MODEL: &str = "mistral-small-latest";

/// Upper bound for one generation call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const PROMPT: &str = "Create a list of three open-ended and engaging questions formatted as a \
    single string. Each question should be separated by '||'. These questions are for an \
    anonymous social messaging platform, like Qooh.me, and should be suitable for a diverse \
    audience. Avoid personal or sensitive topics, focusing instead on universal themes that \
    encourage friendly interaction. Ensure the output is strictly the questions separated by \
    '||', with no intro or outro text.";

pub const FALLBACK_SETS: [&str; 3] = [
    "What's a hobby you've always wanted to pick up?||If you could have dinner with any historical figure, who would it be?||What's the best piece of advice you've ever received?",
    "What's your favorite way to spend a weekend?||If you could travel anywhere right now, where would you go?||What's a movie you can watch over and over again?",
    "What's a talent you wish you had?||What's the most interesting thing you've read recently?||If you could live in any fictional world, which one would it be?",
];

#[derive(Debug, Clone)]
pub struct SuggesterOptions {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for SuggesterOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_MISTRAL_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Suggester {
    http_client: Client,
    options: SuggesterOptions,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponseRaw {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

impl Suggester {
    pub fn new(options: SuggesterOptions) -> Self {
        Self {
            http_client: Client::new(),
            options,
        }
    }

    /// Suggestions from the generator, or a fallback set when it is
    /// unavailable. Never fails.
    pub async fn suggest(&self) -> String {
        if self.options.api_key.is_none() {
            warn!("MISTRAL_API_KEY is not set, serving fallback suggestions");
            return fallback_suggestions().to_string();
        }

        match self.generate().await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Suggestion generation failed, serving fallback suggestions");
                fallback_suggestions().to_string()
            }
        }
    }

    pub async fn generate(&self) -> Result<String, ApiError> {
        let api_key = self
            .options
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::Upstream("suggestion service is not configured".into()))?;

        let request = ChatRequest {
            model: &self.options.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: PROMPT.to_string(),
            }],
            temperature: 0.8,
        };

        let start = std::time::Instant::now();
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.options.base_url))
            .bearer_auth(api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!("{}: {}", status, error_text)));
        }

        let raw: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("unparsable response: {}", e)))?;

        let text = raw
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ApiError::Upstream("empty completion".into()))?;

        debug!(
            model = %self.options.model,
            duration_ms = start.elapsed().as_millis(),
            "Suggestion completion"
        );
        Ok(text)
    }
}

pub fn fallback_suggestions() -> &'static str {
    FALLBACK_SETS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(FALLBACK_SETS[0])
}

/// POST /api/suggest-messages: Plain text, questions joined by `||`.
pub async fn suggest_messages(State(state): State<AppState>) -> impl IntoResponse {
    let text = state.suggester.suggest().await;
    info!("Served message suggestions");
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text)
}
