// Error types for the translation pipeline
//
// Each stage owns its error enum; PipelineError aggregates them so a page
// failure can be reported as a single human-readable message.

use thiserror::Error;

use crate::core::types::TranslationEngine;

/// Detection / recognition / fallback OCR errors
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Model asset not found: {0}")]
    ModelNotFound(String),

    #[error("Vocabulary not found: {0}")]
    VocabNotFound(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Fallback OCR failed: {0}")]
    FallbackFailed(String),
}

/// Translation backend errors
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("API key not found for {}. Please add it first.", .0.display_name())]
    MissingApiKey(TranslationEngine),

    #[error("Failed to parse translation response: {0}")]
    InvalidResponse(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Folder / archive expansion errors
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to extract archive: {0}")]
    ExtractionFailed(String),

    #[error("Input not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache directory creation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache task failed: {0}")]
    TaskJoin(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown language code: {0}")]
    UnknownLanguage(String),

    #[error("Unknown translation engine: {0}")]
    UnknownEngine(String),

    #[error("Confidence threshold must be in [0.0, 1.0], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("IoU threshold must be in [0.0, 1.0], got {0}")]
    InvalidIoUThreshold(f32),

    #[error("Invalid detection config: {0}")]
    InvalidDetectionConfig(String),

    #[error("Value must be > 0: {0}")]
    InvalidCount(&'static str),

    #[error("Invalid cache path: {0}")]
    InvalidCachePath(String),
}

/// Per-page pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Failed to load image {path}: {detail}")]
    ImageLoad { path: String, detail: String },

    #[error("Page index {0} out of range")]
    PageOutOfRange(usize),

    #[error("Task join failed: {0}")]
    TaskJoin(String),
}

pub type OcrResult<T> = Result<T, OcrError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type CacheResult<T> = Result<T, CacheError>;
pub type PipelineResult<T> = Result<T, PipelineError>;

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        PipelineError::TaskJoin(e.to_string())
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(e: tokio::task::JoinError) -> Self {
        CacheError::TaskJoin(e.to_string())
    }
}
