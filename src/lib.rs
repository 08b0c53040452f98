// Library exports for the manga page translation pipeline

pub mod core;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{CacheError, ConfigError, InputError, OcrError, PipelineError, TranslationError},
    types::{
        BatchSnapshot, BubbleCluster, CacheKey, Language, PageSnapshot, PageState, Rect,
        TextObservation, TranslatedBubble, TranslationEngine,
    },
};

pub use orchestration::{PageProcessingCoordinator, PipelineSettings};

pub use services::{
    CredentialStore, MemoryCredentialStore, OcrRouter, PageOcr, ResultCache, TranslationBackends,
};

pub use utils::{load_page_image, Metrics};
