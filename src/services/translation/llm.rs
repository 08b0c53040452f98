// Batch LLM translation with bounded parse retries and a line-split fallback

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::core::errors::{TranslationError, TranslationResult};
use crate::core::types::{BubbleCluster, Language, TranslatedBubble, TranslationEngine};
use crate::services::credentials::CredentialStore;
use crate::services::translation::prompt::{fallback_parse, parse_response, system_prompt, user_prompt};
use crate::services::translation::TranslationBackend;
use crate::utils::metrics::Metrics;

/// One chat round trip: system + user message in, assistant text out
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    fn engine(&self) -> TranslationEngine;

    async fn complete(&self, system: &str, user: &str, api_key: &str) -> TranslationResult<String>;
}

pub struct LlmBackend<C> {
    client: C,
    credentials: Arc<dyn CredentialStore>,
    max_parse_retries: u32,
    metrics: Metrics,
}

impl<C: ChatCompletion> LlmBackend<C> {
    pub fn new(
        client: C,
        credentials: Arc<dyn CredentialStore>,
        max_parse_retries: u32,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            credentials,
            max_parse_retries,
            metrics,
        }
    }

    async fn call(&self, system: &str, user: &str, api_key: &str) -> TranslationResult<String> {
        let start = Instant::now();
        let result = self.client.complete(system, user, api_key).await;
        self.metrics
            .record_api_call(self.client.engine().id(), result.is_ok(), start.elapsed());
        result
    }
}

#[async_trait]
impl<C: ChatCompletion> TranslationBackend for LlmBackend<C> {
    fn engine(&self) -> TranslationEngine {
        self.client.engine()
    }

    async fn translate(
        &self,
        bubbles: &[BubbleCluster],
        source: Language,
        target: Language,
    ) -> TranslationResult<Vec<TranslatedBubble>> {
        let engine = self.client.engine();
        let api_key = self
            .credentials
            .retrieve(engine)
            .ok_or(TranslationError::MissingApiKey(engine))?;

        if bubbles.is_empty() {
            return Ok(Vec::new());
        }

        let system = system_prompt(source, target);
        let user = user_prompt(bubbles);
        let attempts = self.max_parse_retries + 1;

        info!("{}: translating {} bubbles in one batch", engine.display_name(), bubbles.len());

        let mut attempt = 1;
        loop {
            let response = self.call(&system, &user, &api_key).await?;

            match parse_response(&response, bubbles) {
                Ok(translated) => {
                    debug!(
                        "{}: parsed {} translations on attempt {}",
                        engine.display_name(),
                        translated.len(),
                        attempt
                    );
                    return Ok(translated);
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "{}: unparseable response (attempt {}/{}): {}",
                        engine.display_name(),
                        attempt,
                        attempts,
                        e
                    );
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        "{}: giving up on structured parse after {} attempts ({}), using line split",
                        engine.display_name(),
                        attempts,
                        e
                    );
                    return Ok(fallback_parse(&response, bubbles));
                }
            }
        }
    }
}
