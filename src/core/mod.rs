pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    CacheError, ConfigError, InputError, OcrError, PipelineError, TranslationError,
};
pub use types::{
    BubbleCluster, CacheKey, Language, MangaPage, PageState, Rect, TextObservation,
    TranslatedBubble, TranslationEngine,
};
