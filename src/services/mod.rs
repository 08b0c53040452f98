pub mod credentials;
pub mod detection;
pub mod input;
pub mod layout;
pub mod ocr;
pub mod onnx_builder; // Shared ONNX session builder for detector, encoder and decoder
pub mod translation;

// Re-export commonly used services
pub use credentials::{CredentialStore, MemoryCredentialStore};
pub use detection::TextRegionDetector;
pub use layout::{BubbleClusterer, ReadingOrderResolver};
pub use ocr::{OcrRouter, PageOcr, TextRecognizer};
pub use translation::{ResultCache, TranslationBackend, TranslationBackends};
