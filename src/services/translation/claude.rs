// Anthropic Messages API client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::{TranslationError, TranslationResult};
use crate::core::types::TranslationEngine;
use crate::services::translation::http::send_with_retry;
use crate::services::translation::llm::ChatCompletion;

const MESSAGES_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

pub struct ClaudeClient {
    http_client: reqwest::Client,
    model: String,
}

impl ClaudeClient {
    pub fn new(http_client: reqwest::Client, model: &str) -> Self {
        Self {
            http_client,
            model: model.to_string(),
        }
    }
}

fn extract_text(body: &str) -> TranslationResult<String> {
    let response: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;
    response
        .content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .ok_or_else(|| TranslationError::InvalidResponse("no text content block".into()))
}

#[async_trait]
impl ChatCompletion for ClaudeClient {
    fn engine(&self) -> TranslationEngine {
        TranslationEngine::Claude
    }

    async fn complete(&self, system: &str, user: &str, api_key: &str) -> TranslationResult<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![Message {
                role: "user",
                content: user,
            }],
        };

        let builder = self
            .http_client
            .post(MESSAGES_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request);
        let body = send_with_retry(builder, "Claude").await?;
        extract_text(&body)
    }
}
