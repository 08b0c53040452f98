// Per-bubble phrase translation: one remote call per bubble, all-or-nothing

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::core::errors::{TranslationError, TranslationResult};
use crate::core::types::{BubbleCluster, Language, TranslatedBubble, TranslationEngine};
use crate::services::credentials::CredentialStore;
use crate::services::translation::TranslationBackend;
use crate::utils::metrics::Metrics;

/// Translate a single text snippet
#[async_trait]
pub trait PhraseTranslator: Send + Sync {
    fn engine(&self) -> TranslationEngine;

    async fn translate_text(
        &self,
        text: &str,
        source: Language,
        target: Language,
        api_key: &str,
    ) -> TranslationResult<String>;
}

pub struct PhraseBackend<P> {
    translator: P,
    credentials: Arc<dyn CredentialStore>,
    metrics: Metrics,
}

impl<P: PhraseTranslator> PhraseBackend<P> {
    pub fn new(translator: P, credentials: Arc<dyn CredentialStore>, metrics: Metrics) -> Self {
        Self {
            translator,
            credentials,
            metrics,
        }
    }
}

#[async_trait]
impl<P: PhraseTranslator> TranslationBackend for PhraseBackend<P> {
    fn engine(&self) -> TranslationEngine {
        self.translator.engine()
    }

    async fn translate(
        &self,
        bubbles: &[BubbleCluster],
        source: Language,
        target: Language,
    ) -> TranslationResult<Vec<TranslatedBubble>> {
        let engine = self.translator.engine();
        let api_key = self
            .credentials
            .retrieve(engine)
            .ok_or(TranslationError::MissingApiKey(engine))?;

        info!("{}: translating {} bubbles", engine.display_name(), bubbles.len());

        let mut results = Vec::with_capacity(bubbles.len());
        for bubble in bubbles {
            let start = Instant::now();
            let result = self
                .translator
                .translate_text(&bubble.text, source, target, &api_key)
                .await;
            self.metrics
                .record_api_call(engine.id(), result.is_ok(), start.elapsed());

            results.push(TranslatedBubble {
                bubble: bubble.clone(),
                translated_text: result?,
                index: bubble.index,
            });
        }

        debug!("{}: translated {} bubbles", engine.display_name(), results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Rect;
    use crate::services::credentials::MemoryCredentialStore;
    use parking_lot::Mutex;

    struct UppercaseTranslator {
        fail_on: Option<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PhraseTranslator for UppercaseTranslator {
        fn engine(&self) -> TranslationEngine {
            TranslationEngine::DeepL
        }

        async fn translate_text(
            &self,
            text: &str,
            _source: Language,
            _target: Language,
            _api_key: &str,
        ) -> TranslationResult<String> {
            self.seen.lock().push(text.to_string());
            if Some(text) == self.fail_on {
                return Err(TranslationError::ApiError("456 - quota exceeded".into()));
            }
            Ok(text.to_uppercase())
        }
    }

    fn keyed() -> Arc<dyn CredentialStore> {
        let store = MemoryCredentialStore::new();
        store.store(TranslationEngine::DeepL, "key:fx");
        Arc::new(store)
    }

    fn bubbles() -> Vec<BubbleCluster> {
        ["abc", "def", "ghi"]
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut b = BubbleCluster::new(Rect::default(), t.to_string(), vec![]);
                b.index = i + 10;
                b
            })
            .collect()
    }

    #[tokio::test]
    async fn test_preserves_order_and_indices() {
        let backend = PhraseBackend::new(
            UppercaseTranslator { fail_on: None, seen: Mutex::new(vec![]) },
            keyed(),
            Metrics::new(),
        );
        let result = backend
            .translate(&bubbles(), Language::English, Language::Japanese)
            .await
            .unwrap();
        let pairs: Vec<_> = result
            .iter()
            .map(|t| (t.index, t.translated_text.as_str()))
            .collect();
        assert_eq!(pairs, vec![(10, "ABC"), (11, "DEF"), (12, "GHI")]);
    }

    #[tokio::test]
    async fn test_single_failure_aborts_request() {
        let backend = PhraseBackend::new(
            UppercaseTranslator { fail_on: Some("def"), seen: Mutex::new(vec![]) },
            keyed(),
            Metrics::new(),
        );
        let err = backend
            .translate(&bubbles(), Language::English, Language::Japanese)
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::ApiError(_)));
        assert_eq!(backend.translator.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let backend = PhraseBackend::new(
            UppercaseTranslator { fail_on: None, seen: Mutex::new(vec![]) },
            Arc::new(MemoryCredentialStore::new()),
            Metrics::new(),
        );
        let err = backend
            .translate(&bubbles(), Language::English, Language::Japanese)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "API key not found for DeepL. Please add it first.");
        assert!(backend.translator.seen.lock().is_empty());
    }
}
