// Shared data model for the translation workflow

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::errors::ConfigError;

/// Axis-aligned box in image pixel coordinates (origin top-left)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from corner coordinates
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: (x2 - x1).max(0.0),
            height: (y2 - y1).max(0.0),
        }
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::from_corners(
            self.x.min(other.x),
            self.y.min(other.y),
            self.max_x().max(other.max_x()),
            self.max_y().max(other.max_y()),
        )
    }

    /// Intersection area (0 when disjoint)
    pub fn intersection_area(&self, other: &Rect) -> f32 {
        let w = self.max_x().min(other.max_x()) - self.x.max(other.x);
        let h = self.max_y().min(other.max_y()) - self.y.max(other.y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    pub fn iou(&self, other: &Rect) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Minimum Euclidean distance between box edges; 0 when touching or overlapping
    pub fn edge_distance(&self, other: &Rect) -> f32 {
        let dx = if self.max_x() < other.x {
            other.x - self.max_x()
        } else if other.max_x() < self.x {
            self.x - other.max_x()
        } else {
            0.0
        };

        let dy = if self.max_y() < other.y {
            other.y - self.max_y()
        } else if other.max_y() < self.y {
            self.y - other.max_y()
        } else {
            0.0
        };

        (dx * dx + dy * dy).sqrt()
    }
}

/// Source/target language (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "ja")]
    Japanese,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "zh-Hant")]
    TraditionalChinese,
}

impl Language {
    pub const ALL: [Language; 3] = [
        Language::Japanese,
        Language::English,
        Language::TraditionalChinese,
    ];

    /// Stable code used in cache keys and configuration
    pub fn code(&self) -> &'static str {
        match self {
            Language::Japanese => "ja",
            Language::English => "en",
            Language::TraditionalChinese => "zh-Hant",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Japanese => "Japanese",
            Language::English => "English",
            Language::TraditionalChinese => "Traditional Chinese",
        }
    }

    /// Scripts written without spaces between words
    pub fn is_cjk(&self) -> bool {
        matches!(self, Language::Japanese | Language::TraditionalChinese)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|l| l.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownLanguage(s.to_string()))
    }
}

/// Translation provider (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationEngine {
    #[serde(rename = "deepl")]
    DeepL,
    Google,
    #[serde(rename = "openai")]
    OpenAi,
    Claude,
}

impl TranslationEngine {
    pub const ALL: [TranslationEngine; 4] = [
        TranslationEngine::DeepL,
        TranslationEngine::Google,
        TranslationEngine::OpenAi,
        TranslationEngine::Claude,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            TranslationEngine::DeepL => "deepl",
            TranslationEngine::Google => "google",
            TranslationEngine::OpenAi => "openai",
            TranslationEngine::Claude => "claude",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TranslationEngine::DeepL => "DeepL",
            TranslationEngine::Google => "Google Translate",
            TranslationEngine::OpenAi => "OpenAI",
            TranslationEngine::Claude => "Claude",
        }
    }

    pub fn is_llm(&self) -> bool {
        matches!(self, TranslationEngine::OpenAi | TranslationEngine::Claude)
    }
}

impl fmt::Display for TranslationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for TranslationEngine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TranslationEngine::ALL
            .into_iter()
            .find(|e| e.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownEngine(s.to_string()))
    }
}

/// Raw recognized text line/region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextObservation {
    pub bbox: Rect,
    pub text: String,
    pub confidence: f32,
}

/// Group of observations belonging to one dialogue bubble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BubbleCluster {
    pub id: Uuid,
    pub bbox: Rect,
    pub text: String,
    pub observations: Vec<TextObservation>,
    /// Display/ordering slot, reassigned by reading-order resolution
    pub index: usize,
}

impl BubbleCluster {
    pub fn new(bbox: Rect, text: String, observations: Vec<TextObservation>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bbox,
            text,
            observations,
            index: 0,
        }
    }

    /// True when the text holds nothing but punctuation/symbols and whitespace
    pub fn is_punctuation_only(&self) -> bool {
        self.text
            .chars()
            .all(|c| c.is_whitespace() || is_punctuation(c))
    }
}

fn is_punctuation(c: char) -> bool {
    if c.is_ascii_punctuation() {
        return true;
    }
    // General/CJK/fullwidth punctuation blocks
    matches!(c,
        '\u{2000}'..='\u{206F}'
        | '\u{3000}'..='\u{303F}'
        | '\u{30FB}'
        | '\u{FE30}'..='\u{FE4F}'
        | '\u{FF01}'..='\u{FF0F}'
        | '\u{FF1A}'..='\u{FF20}'
        | '\u{FF3B}'..='\u{FF40}'
        | '\u{FF5B}'..='\u{FF65}'
        | '\u{00A1}' | '\u{00A7}' | '\u{00AB}' | '\u{00B6}' | '\u{00B7}' | '\u{00BB}' | '\u{00BF}'
    )
}

/// Translation result for one bubble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatedBubble {
    pub bubble: BubbleCluster,
    pub translated_text: String,
    pub index: usize,
}

impl TranslatedBubble {
    /// Identity translation used for bubbles routed around the backend
    pub fn passthrough(bubble: &BubbleCluster) -> Self {
        Self {
            bubble: bubble.clone(),
            translated_text: bubble.text.clone(),
            index: bubble.index,
        }
    }
}

/// Unique cache lookup/write key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub image_hash: String,
    pub source: Language,
    pub target: Language,
    pub engine: TranslationEngine,
}

/// Per-page processing state
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum PageState {
    Pending,
    Processing,
    Translated(Vec<TranslatedBubble>),
    Error(String),
}

impl PageState {
    pub fn is_translated(&self) -> bool {
        matches!(self, PageState::Translated(_))
    }
}

/// One page of the currently loaded work
#[derive(Clone)]
pub struct MangaPage {
    pub id: Uuid,
    pub image_path: PathBuf,
    pub state: PageState,
    /// SHA-256 of the raw file bytes, computed once
    pub image_hash: Option<String>,
    /// Decoded pixels, kept for retries
    pub image: Option<Arc<DynamicImage>>,
}

impl MangaPage {
    pub fn new(image_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            image_path,
            state: PageState::Pending,
            image_hash: None,
            image: None,
        }
    }
}

/// Serializable view of a page
#[derive(Debug, Clone, Serialize)]
pub struct PageSnapshot {
    pub index: usize,
    pub id: Uuid,
    pub image_path: String,
    #[serde(flatten)]
    pub state: PageState,
}

/// Batch progress and page states
#[derive(Debug, Clone, Serialize)]
pub struct BatchSnapshot {
    pub translated: usize,
    pub total: usize,
    pub pages: Vec<PageSnapshot>,
}

/// History entry for an opened folder/archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub path: String,
    pub page_count: Option<i64>,
    pub last_opened: chrono::DateTime<chrono::Utc>,
}
