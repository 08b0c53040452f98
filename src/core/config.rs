use crate::core::errors::ConfigError;
use crate::core::types::{Language, TranslationEngine};
use std::env;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// Model assets and inference settings
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub models_dir: PathBuf,
    /// Square detector input side
    pub detector_input_size: u32,
    pub confidence_threshold: f32,
    pub nms_iou_threshold: f32,
    pub inference_backend: Option<String>,
    pub intra_threads: usize,
}

/// Translation defaults
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub source_language: Language,
    pub target_language: Language,
    pub engine: TranslationEngine,
    pub claude_model: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub api_timeout_seconds: u64,
    /// Extra LLM calls allowed after an unparseable response
    pub llm_max_parse_retries: u32,
}

/// Batch scheduling configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_concurrent_pages: usize,
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_dir: String,
    pub memory_entries: usize,
}

/// Fallback OCR configuration
#[derive(Debug, Clone)]
pub struct FallbackOcrConfig {
    pub tesseract_bin: String,
    pub min_confidence: f32,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub models: ModelConfig,
    pub translation: TranslationConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
    pub fallback_ocr: FallbackOcrConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let source_language = match env::var("SOURCE_LANGUAGE") {
            Ok(s) => s.parse()?,
            Err(_) => Language::Japanese,
        };
        let target_language = match env::var("TARGET_LANGUAGE") {
            Ok(s) => s.parse()?,
            Err(_) => Language::TraditionalChinese,
        };
        let engine = match env::var("TRANSLATION_ENGINE") {
            Ok(s) => s.parse()?,
            Err(_) => TranslationEngine::Claude,
        };

        Ok(Self {
            server: ServerConfig {
                port: env_parse("SERVER_PORT").unwrap_or(1420),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
            },
            models: ModelConfig {
                models_dir: env::var("MODELS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("models")),
                detector_input_size: env_parse("DETECTOR_INPUT_SIZE").unwrap_or(1024),
                confidence_threshold: env_parse("DETECTION_CONFIDENCE").unwrap_or(0.4),
                nms_iou_threshold: env_parse("DETECTION_NMS_IOU").unwrap_or(0.35),
                inference_backend: env::var("INFERENCE_BACKEND")
                    .ok()
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty()),
                intra_threads: env_parse("INTRA_THREADS")
                    .unwrap_or_else(|| num_cpus::get().clamp(1, 6)),
            },
            translation: TranslationConfig {
                source_language,
                target_language,
                engine,
                claude_model: env::var("CLAUDE_MODEL")
                    .unwrap_or_else(|_| "claude-sonnet-4-5-20250929".to_string()),
                openai_model: env::var("OPENAI_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                openai_base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                api_timeout_seconds: env_parse("API_TIMEOUT_SECONDS").unwrap_or(60),
                llm_max_parse_retries: env_parse("LLM_MAX_PARSE_RETRIES").unwrap_or(2),
            },
            batch: BatchConfig {
                max_concurrent_pages: env_parse("MAX_CONCURRENT_PAGES").unwrap_or(3),
            },
            cache: CacheConfig {
                cache_dir: env::var("CACHE_DIR").unwrap_or_else(|_| ".cache".to_string()),
                memory_entries: env_parse("CACHE_MEMORY_ENTRIES").unwrap_or(256),
            },
            fallback_ocr: FallbackOcrConfig {
                tesseract_bin: env::var("TESSERACT_BIN")
                    .unwrap_or_else(|_| "tesseract".to_string()),
                min_confidence: env_parse("FALLBACK_MIN_CONFIDENCE").unwrap_or(0.15),
            },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.models.confidence_threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                self.models.confidence_threshold,
            ));
        }

        if !(0.0..=1.0).contains(&self.models.nms_iou_threshold) {
            return Err(ConfigError::InvalidIoUThreshold(self.models.nms_iou_threshold));
        }

        if !(320..=2048).contains(&self.models.detector_input_size) {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "detector_input_size must be between 320 and 2048, got {}",
                self.models.detector_input_size
            )));
        }

        if !(0.0..=1.0).contains(&self.fallback_ocr.min_confidence) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                self.fallback_ocr.min_confidence,
            ));
        }

        if self.batch.max_concurrent_pages == 0 {
            return Err(ConfigError::InvalidCount("MAX_CONCURRENT_PAGES"));
        }
        if self.cache.memory_entries == 0 {
            return Err(ConfigError::InvalidCount("CACHE_MEMORY_ENTRIES"));
        }
        if self.models.intra_threads == 0 {
            return Err(ConfigError::InvalidCount("INTRA_THREADS"));
        }

        // Validate cache directory parent exists
        let cache_path = Path::new(&self.cache.cache_dir);
        if let Some(parent) = cache_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidCachePath(format!(
                    "Parent directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn models_dir(&self) -> &Path {
        &self.models.models_dir
    }

    pub fn detector_model_path(&self) -> PathBuf {
        self.models.models_dir.join("comic-text-detector.onnx")
    }

    pub fn encoder_model_path(&self) -> PathBuf {
        self.models.models_dir.join("encoder_model.onnx")
    }

    pub fn decoder_model_path(&self) -> PathBuf {
        self.models.models_dir.join("decoder_model.onnx")
    }

    pub fn vocab_path(&self) -> PathBuf {
        self.models.models_dir.join("vocab.txt")
    }

    pub fn max_concurrent_pages(&self) -> usize {
        self.batch.max_concurrent_pages
    }

    pub fn cache_dir(&self) -> &str {
        &self.cache.cache_dir
    }

    /// OpenAI-compatible base URL without trailing slashes
    pub fn openai_base_url(&self) -> &str {
        self.translation.openai_base_url.trim_end_matches('/')
    }

    /// OpenAI model id without leading slashes
    pub fn openai_model(&self) -> &str {
        self.translation.openai_model.trim_start_matches('/')
    }
}

impl Default for Config {
    /// Built-in defaults without reading the environment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 1420,
                host: "0.0.0.0".to_string(),
                log_level: Level::INFO,
            },
            models: ModelConfig {
                models_dir: PathBuf::from("models"),
                detector_input_size: 1024,
                confidence_threshold: 0.4,
                nms_iou_threshold: 0.35,
                inference_backend: None,
                intra_threads: 4,
            },
            translation: TranslationConfig {
                source_language: Language::Japanese,
                target_language: Language::TraditionalChinese,
                engine: TranslationEngine::Claude,
                claude_model: "claude-sonnet-4-5-20250929".to_string(),
                openai_model: "gpt-4o-mini".to_string(),
                openai_base_url: "https://api.openai.com/v1".to_string(),
                api_timeout_seconds: 60,
                llm_max_parse_retries: 2,
            },
            batch: BatchConfig {
                max_concurrent_pages: 3,
            },
            cache: CacheConfig {
                cache_dir: ".cache".to_string(),
                memory_entries: 256,
            },
            fallback_ocr: FallbackOcrConfig {
                tesseract_bin: "tesseract".to_string(),
                min_confidence: 0.15,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.batch.max_concurrent_pages = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCount("MAX_CONCURRENT_PAGES"))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_thresholds() {
        let mut config = Config::default();
        config.models.nms_iou_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.models.detector_input_size = 64;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_openai_url_sanitizing() {
        let mut config = Config::default();
        config.translation.openai_base_url = "http://localhost:8080/v1//".to_string();
        config.translation.openai_model = "/local-model".to_string();
        assert_eq!(config.openai_base_url(), "http://localhost:8080/v1");
        assert_eq!(config.openai_model(), "local-model");
    }
}
