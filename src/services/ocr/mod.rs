// OCR: primary Japanese recognizer, general fallback, and the router between them

pub mod fallback;
pub mod recognizer;
pub mod router;
pub mod tokenizer;

pub use fallback::{FallbackOcr, TesseractOcr};
pub use recognizer::TextRecognizer;
pub use router::{OcrRouter, PageOcr, PrimaryOcr};
pub use tokenizer::Tokenizer;
