// API key storage per translation engine

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::core::types::TranslationEngine;

/// Key store consulted before any translation call
pub trait CredentialStore: Send + Sync {
    /// Replaces any key already stored for the engine
    fn store(&self, engine: TranslationEngine, api_key: &str);
    fn retrieve(&self, engine: TranslationEngine) -> Option<String>;
    fn delete(&self, engine: TranslationEngine);

    fn has_key(&self, engine: TranslationEngine) -> bool {
        self.retrieve(engine).is_some()
    }
}

/// In-process store, seeded from the environment at startup
#[derive(Default)]
pub struct MemoryCredentialStore {
    keys: RwLock<HashMap<TranslationEngine, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment variable holding the initial key for an engine
    pub fn env_var(engine: TranslationEngine) -> &'static str {
        match engine {
            TranslationEngine::DeepL => "DEEPL_API_KEY",
            TranslationEngine::Google => "GOOGLE_API_KEY",
            TranslationEngine::OpenAi => "OPENAI_API_KEY",
            TranslationEngine::Claude => "ANTHROPIC_API_KEY",
        }
    }

    pub fn from_env() -> Self {
        let store = Self::new();
        for engine in TranslationEngine::ALL {
            if let Ok(key) = std::env::var(Self::env_var(engine)) {
                store.store(engine, &key);
                if store.has_key(engine) {
                    info!("API key for {} loaded from environment", engine.display_name());
                }
            }
        }
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn store(&self, engine: TranslationEngine, api_key: &str) {
        let mut keys = self.keys.write();
        keys.remove(&engine);
        let api_key = api_key.trim();
        if !api_key.is_empty() {
            keys.insert(engine, api_key.to_string());
            debug!("Stored API key for {}", engine);
        }
    }

    fn retrieve(&self, engine: TranslationEngine) -> Option<String> {
        self.keys.read().get(&engine).cloned()
    }

    fn delete(&self, engine: TranslationEngine) {
        if self.keys.write().remove(&engine).is_some() {
            debug!("Deleted API key for {}", engine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_replaces_and_delete_removes() {
        let store = MemoryCredentialStore::new();
        assert!(!store.has_key(TranslationEngine::DeepL));

        store.store(TranslationEngine::DeepL, "first");
        store.store(TranslationEngine::DeepL, "second");
        assert_eq!(store.retrieve(TranslationEngine::DeepL).as_deref(), Some("second"));
        assert!(!store.has_key(TranslationEngine::Google));

        store.delete(TranslationEngine::DeepL);
        assert!(store.retrieve(TranslationEngine::DeepL).is_none());
    }

    #[test]
    fn test_blank_key_counts_as_absent() {
        let store = MemoryCredentialStore::new();
        store.store(TranslationEngine::Claude, "sk-old");
        store.store(TranslationEngine::Claude, "   ");
        assert!(!store.has_key(TranslationEngine::Claude));
    }
}
