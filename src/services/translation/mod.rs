// Translation backends behind one trait, selected per engine

pub mod cache;
pub mod claude;
pub mod deepl;
pub mod google;
pub mod http;
pub mod llm;
pub mod openai;
pub mod phrase;
pub mod prompt;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::core::config::Config;
use crate::core::errors::TranslationResult;
use crate::core::types::{BubbleCluster, Language, TranslatedBubble, TranslationEngine};
use crate::services::credentials::CredentialStore;
use crate::utils::metrics::Metrics;

pub use cache::ResultCache;
pub use llm::{ChatCompletion, LlmBackend};
pub use phrase::{PhraseBackend, PhraseTranslator};

#[async_trait]
pub trait TranslationBackend: Send + Sync {
    fn engine(&self) -> TranslationEngine;

    /// Translate bubbles already in reading order.
    ///
    /// Fails with `MissingApiKey` before any network call when no key is stored.
    async fn translate(
        &self,
        bubbles: &[BubbleCluster],
        source: Language,
        target: Language,
    ) -> TranslationResult<Vec<TranslatedBubble>>;
}

/// Engine → backend map
#[derive(Clone)]
pub struct TranslationBackends {
    backends: HashMap<TranslationEngine, Arc<dyn TranslationBackend>>,
}

impl TranslationBackends {
    pub fn new(backends: HashMap<TranslationEngine, Arc<dyn TranslationBackend>>) -> Self {
        Self { backends }
    }

    /// All four engines sharing one HTTP client
    pub fn from_config(
        config: &Config,
        credentials: Arc<dyn CredentialStore>,
        metrics: Metrics,
    ) -> TranslationResult<Self> {
        let http_client = http::build_client(config.translation.api_timeout_seconds)?;
        let retries = config.translation.llm_max_parse_retries;

        let mut backends: HashMap<TranslationEngine, Arc<dyn TranslationBackend>> = HashMap::new();
        backends.insert(
            TranslationEngine::DeepL,
            Arc::new(PhraseBackend::new(
                deepl::DeepLClient::new(http_client.clone()),
                Arc::clone(&credentials),
                metrics.clone(),
            )),
        );
        backends.insert(
            TranslationEngine::Google,
            Arc::new(PhraseBackend::new(
                google::GoogleClient::new(http_client.clone()),
                Arc::clone(&credentials),
                metrics.clone(),
            )),
        );
        backends.insert(
            TranslationEngine::OpenAi,
            Arc::new(LlmBackend::new(
                openai::OpenAiClient::new(
                    http_client.clone(),
                    config.openai_base_url(),
                    config.openai_model(),
                ),
                Arc::clone(&credentials),
                retries,
                metrics.clone(),
            )),
        );
        backends.insert(
            TranslationEngine::Claude,
            Arc::new(LlmBackend::new(
                claude::ClaudeClient::new(http_client, &config.translation.claude_model),
                credentials,
                retries,
                metrics,
            )),
        );

        Ok(Self { backends })
    }

    pub fn get(&self, engine: TranslationEngine) -> Option<Arc<dyn TranslationBackend>> {
        self.backends.get(&engine).cloned()
    }
}

/// Translate with bubbles that need no translation routed around the backend.
///
/// Identical languages pass everything through; punctuation-only bubbles always pass
/// through. Results are merged and sorted by index.
pub async fn translate_with_passthrough(
    backend: &dyn TranslationBackend,
    bubbles: &[BubbleCluster],
    source: Language,
    target: Language,
) -> TranslationResult<Vec<TranslatedBubble>> {
    if source == target {
        return Ok(bubbles.iter().map(TranslatedBubble::passthrough).collect());
    }

    let (passthrough, to_translate): (Vec<&BubbleCluster>, Vec<&BubbleCluster>) =
        bubbles.iter().partition(|b| b.is_punctuation_only());

    let mut results: Vec<TranslatedBubble> = passthrough
        .into_iter()
        .map(TranslatedBubble::passthrough)
        .collect();

    if !to_translate.is_empty() {
        let to_translate: Vec<BubbleCluster> = to_translate.into_iter().cloned().collect();
        debug!(
            "Sending {} bubbles to {} ({} passed through)",
            to_translate.len(),
            backend.engine(),
            results.len()
        );
        results.extend(backend.translate(&to_translate, source, target).await?);
    }

    results.sort_by_key(|t| t.index);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::TranslationError;
    use crate::core::types::Rect;
    use parking_lot::Mutex;

    /// Echoes text in brackets and records what it was asked to translate
    struct EchoBackend {
        received: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TranslationBackend for EchoBackend {
        fn engine(&self) -> TranslationEngine {
            TranslationEngine::OpenAi
        }

        async fn translate(
            &self,
            bubbles: &[BubbleCluster],
            _source: Language,
            _target: Language,
        ) -> TranslationResult<Vec<TranslatedBubble>> {
            let mut received = self.received.lock();
            Ok(bubbles
                .iter()
                .rev()
                .map(|b| {
                    received.push(b.text.clone());
                    TranslatedBubble {
                        bubble: b.clone(),
                        translated_text: format!("[{}]", b.text),
                        index: b.index,
                    }
                })
                .collect())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl TranslationBackend for FailingBackend {
        fn engine(&self) -> TranslationEngine {
            TranslationEngine::Google
        }

        async fn translate(
            &self,
            _bubbles: &[BubbleCluster],
            _source: Language,
            _target: Language,
        ) -> TranslationResult<Vec<TranslatedBubble>> {
            Err(TranslationError::MissingApiKey(TranslationEngine::Google))
        }
    }

    fn page(texts: &[&str]) -> Vec<BubbleCluster> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut b = BubbleCluster::new(Rect::default(), t.to_string(), vec![]);
                b.index = i;
                b
            })
            .collect()
    }

    #[tokio::test]
    async fn test_same_language_passes_everything_through() {
        let backend = FailingBackend;
        let bubbles = page(&["hello", "!!", "world"]);
        let result = translate_with_passthrough(&backend, &bubbles, Language::English, Language::English)
            .await
            .unwrap();
        assert_eq!(result.len(), 3);
        for (t, b) in result.iter().zip(&bubbles) {
            assert_eq!(t.translated_text, b.text);
        }
    }

    #[tokio::test]
    async fn test_punctuation_bubbles_skip_backend_and_merge_by_index() {
        let backend = EchoBackend { received: Mutex::new(vec![]) };
        let bubbles = page(&["えっ", "……！？", "なに"]);
        let result = translate_with_passthrough(&backend, &bubbles, Language::Japanese, Language::English)
            .await
            .unwrap();

        assert_eq!(*backend.received.lock(), vec!["なに", "えっ"]);
        let pairs: Vec<_> = result
            .iter()
            .map(|t| (t.index, t.translated_text.as_str()))
            .collect();
        assert_eq!(pairs, vec![(0, "[えっ]"), (1, "……！？"), (2, "[なに]")]);
    }

    #[tokio::test]
    async fn test_all_punctuation_never_calls_backend() {
        let result = translate_with_passthrough(&FailingBackend, &page(&["!?", "…"]), Language::Japanese, Language::English)
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_registry_covers_every_engine() {
        let backends = TranslationBackends::from_config(
            &Config::default(),
            Arc::new(crate::services::credentials::MemoryCredentialStore::new()),
            Metrics::new(),
        )
        .unwrap();
        for engine in TranslationEngine::ALL {
            assert_eq!(backends.get(engine).unwrap().engine(), engine);
        }
    }
}
