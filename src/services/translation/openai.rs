// OpenAI-compatible chat completions client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::{TranslationError, TranslationResult};
use crate::core::types::TranslationEngine;
use crate::services::translation::http::send_with_retry;
use crate::services::translation::llm::ChatCompletion;

const TEMPERATURE: f32 = 0.3;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    /// Expects a base URL without trailing slash (see `Config::openai_base_url`)
    pub fn new(http_client: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            http_client,
            base_url: base_url.to_string(),
            model: model.to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

fn extract_content(body: &str) -> TranslationResult<String> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| TranslationError::InvalidResponse("no message content in choices".into()))
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    fn engine(&self) -> TranslationEngine {
        TranslationEngine::OpenAi
    }

    async fn complete(&self, system: &str, user: &str, api_key: &str) -> TranslationResult<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
        };

        let builder = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request);
        let body = send_with_retry(builder, "OpenAI").await?;
        extract_content(&body)
    }
}
