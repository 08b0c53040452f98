// Picks the recognition path for a page and normalizes its output to ordered bubbles

use async_trait::async_trait;
use image::DynamicImage;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::core::config::Config;
use crate::core::errors::{OcrError, OcrResult};
use crate::core::types::{BubbleCluster, Language, Rect, TextObservation};
use crate::services::detection::TextRegionDetector;
use crate::services::layout::{BubbleClusterer, ReadingOrderResolver};
use crate::services::ocr::fallback::{FallbackOcr, TesseractOcr};
use crate::services::ocr::recognizer::TextRecognizer;
use crate::utils::image_ops::crop_region;
use crate::utils::metrics::Metrics;

/// Regions smaller than this on either side are treated as noise
const MIN_REGION_SIDE: f32 = 10.0;

/// Page-level OCR producing reading-ordered bubbles
#[async_trait]
pub trait PageOcr: Send + Sync {
    async fn recognize_page(
        &self,
        image: Arc<DynamicImage>,
        language: Language,
    ) -> OcrResult<Vec<BubbleCluster>>;
}

/// Detect-then-recognize pipeline for Japanese pages (blocking)
pub trait PrimaryOcr: Send + Sync {
    fn recognize_regions(&self, image: &DynamicImage) -> OcrResult<Vec<BubbleCluster>>;
}

/// Region crop recognizer, split out so region handling can be exercised without models
pub trait RegionRecognizer: Send + Sync {
    fn recognize(&self, crop: &DynamicImage) -> OcrResult<(String, f32)>;
}

impl RegionRecognizer for TextRecognizer {
    fn recognize(&self, crop: &DynamicImage) -> OcrResult<(String, f32)> {
        TextRecognizer::recognize(self, crop)
    }
}

pub struct MangaOcrPipeline {
    detector: TextRegionDetector,
    recognizer: TextRecognizer,
    metrics: Metrics,
}

impl MangaOcrPipeline {
    pub fn new(config: &Config, metrics: Metrics) -> OcrResult<Self> {
        info!("Initializing detection and recognition models");
        Ok(Self {
            detector: TextRegionDetector::new(config)?,
            recognizer: TextRecognizer::new(config)?,
            metrics,
        })
    }
}

impl PrimaryOcr for MangaOcrPipeline {
    fn recognize_regions(&self, image: &DynamicImage) -> OcrResult<Vec<BubbleCluster>> {
        let regions = self.detector.detect(image)?;
        info!("Found {} text regions", regions.len());
        Ok(recognize_regions(
            image,
            regions.iter().map(|r| r.bbox),
            &self.recognizer,
            &self.metrics,
        ))
    }
}

/// One single-observation bubble per recognizable region.
///
/// Tiny regions and empty results are skipped; per-region errors are logged and skipped.
pub fn recognize_regions(
    image: &DynamicImage,
    regions: impl IntoIterator<Item = Rect>,
    recognizer: &dyn RegionRecognizer,
    metrics: &Metrics,
) -> Vec<BubbleCluster> {
    let mut bubbles = Vec::new();
    for (i, bbox) in regions.into_iter().enumerate() {
        if bbox.width < MIN_REGION_SIDE || bbox.height < MIN_REGION_SIDE {
            continue;
        }
        let Some(crop) = crop_region(image, &bbox) else {
            continue;
        };

        match recognizer.recognize(&crop) {
            Ok((text, _)) if text.is_empty() => {}
            Ok((text, confidence)) => {
                let observation = TextObservation {
                    bbox,
                    text: text.clone(),
                    confidence,
                };
                let mut bubble = BubbleCluster::new(bbox, text, vec![observation]);
                bubble.index = i;
                bubbles.push(bubble);
            }
            Err(e) => {
                metrics.record_region_failure();
                warn!("OCR failed for region {}: {}", i, e);
            }
        }
    }
    bubbles
}

pub struct OcrRouter {
    config: Arc<Config>,
    primary: Arc<OnceCell<Arc<dyn PrimaryOcr>>>,
    fallback: Arc<dyn FallbackOcr>,
    clusterer: BubbleClusterer,
    resolver: ReadingOrderResolver,
    metrics: Metrics,
}

impl OcrRouter {
    /// Models are loaded on the first Japanese page, not here
    pub fn new(config: Arc<Config>, metrics: Metrics) -> Self {
        let fallback = Arc::new(TesseractOcr::new(&config.fallback_ocr));
        Self {
            config,
            primary: Arc::new(OnceCell::new()),
            fallback,
            clusterer: BubbleClusterer::new(),
            resolver: ReadingOrderResolver::new(),
            metrics,
        }
    }

    /// Router with preloaded engines
    pub fn with_engines(
        primary: Option<Arc<dyn PrimaryOcr>>,
        fallback: Arc<dyn FallbackOcr>,
        metrics: Metrics,
    ) -> Self {
        let cell = OnceCell::new();
        if let Some(primary) = primary {
            let _ = cell.set(primary);
        }
        Self {
            config: Arc::new(Config::default()),
            primary: Arc::new(cell),
            fallback,
            clusterer: BubbleClusterer::new(),
            resolver: ReadingOrderResolver::new(),
            metrics,
        }
    }

    /// Load the detection/recognition models ahead of the first page
    pub async fn warm_up(&self) -> OcrResult<()> {
        let cell = Arc::clone(&self.primary);
        let config = Arc::clone(&self.config);
        let metrics = self.metrics.clone();
        tokio::task::spawn_blocking(move || {
            cell.get_or_try_init(|| load_primary(&config, metrics)).map(|_| ())
        })
        .await
        .map_err(|e| OcrError::InferenceError(format!("model loading task failed: {}", e)))?
    }

    async fn primary_path(&self, image: Arc<DynamicImage>) -> OcrResult<Vec<BubbleCluster>> {
        let cell = Arc::clone(&self.primary);
        let config = Arc::clone(&self.config);
        let metrics = self.metrics.clone();
        let bubbles = tokio::task::spawn_blocking(move || {
            let pipeline = cell.get_or_try_init(|| load_primary(&config, metrics))?;
            pipeline.recognize_regions(&image)
        })
        .await
        .map_err(|e| OcrError::InferenceError(format!("recognition task failed: {}", e)))??;

        Ok(self.resolver.resolve(bubbles))
    }

    async fn fallback_path(
        &self,
        image: Arc<DynamicImage>,
        language: Language,
    ) -> OcrResult<Vec<BubbleCluster>> {
        self.metrics.record_fallback_ocr();
        let observations = self.fallback.recognize(image, language).await?;
        debug!("Fallback OCR returned {} observations", observations.len());
        let bubbles = self.clusterer.cluster(observations);
        Ok(self.resolver.resolve(bubbles))
    }
}

fn load_primary(config: &Config, metrics: Metrics) -> OcrResult<Arc<dyn PrimaryOcr>> {
    MangaOcrPipeline::new(config, metrics).map(|p| Arc::new(p) as Arc<dyn PrimaryOcr>)
}

#[async_trait]
impl PageOcr for OcrRouter {
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    async fn recognize_page(
        &self,
        image: Arc<DynamicImage>,
        language: Language,
    ) -> OcrResult<Vec<BubbleCluster>> {
        let start = Instant::now();

        let result = if language == Language::Japanese {
            match self.primary_path(Arc::clone(&image)).await {
                Ok(bubbles) => Ok(bubbles),
                Err(e) => {
                    warn!("Primary OCR failed, falling back: {}", e);
                    self.fallback_path(image, language).await
                }
            }
        } else {
            self.fallback_path(image, language).await
        };

        self.metrics.record_ocr_duration(start.elapsed());
        if let Ok(ref bubbles) = result {
            info!(
                "✓ OCR: {} bubbles in {:.2}ms",
                bubbles.len(),
                start.elapsed().as_secs_f64() * 1000.0
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct FixedPrimary(OcrResult<Vec<BubbleCluster>>);

    impl PrimaryOcr for FixedPrimary {
        fn recognize_regions(&self, _image: &DynamicImage) -> OcrResult<Vec<BubbleCluster>> {
            match &self.0 {
                Ok(bubbles) => Ok(bubbles.clone()),
                Err(e) => Err(OcrError::InferenceError(e.to_string())),
            }
        }
    }

    struct RecordingFallback {
        calls: Mutex<Vec<Language>>,
        observations: Vec<TextObservation>,
    }

    #[async_trait]
    impl FallbackOcr for RecordingFallback {
        async fn recognize(
            &self,
            _image: Arc<DynamicImage>,
            language: Language,
        ) -> OcrResult<Vec<TextObservation>> {
            self.calls.lock().push(language);
            Ok(self.observations.clone())
        }
    }

    fn obs(x: f32, y: f32, text: &str) -> TextObservation {
        TextObservation {
            bbox: Rect::new(x, y, 40.0, 20.0),
            text: text.to_string(),
            confidence: 0.8,
        }
    }

    fn fallback() -> Arc<RecordingFallback> {
        Arc::new(RecordingFallback {
            calls: Mutex::new(Vec::new()),
            observations: vec![obs(0.0, 500.0, "second"), obs(0.0, 0.0, "first")],
        })
    }

    fn page() -> Arc<DynamicImage> {
        Arc::new(DynamicImage::new_rgb8(600, 800))
    }

    #[tokio::test]
    async fn test_japanese_uses_primary_and_orders() {
        let fb = fallback();
        let primary = FixedPrimary(Ok(vec![
            BubbleCluster::new(Rect::new(10.0, 0.0, 50.0, 50.0), "left".into(), vec![]),
            BubbleCluster::new(Rect::new(300.0, 5.0, 50.0, 50.0), "right".into(), vec![]),
        ]));
        let router = OcrRouter::with_engines(Some(Arc::new(primary)), fb.clone(), Metrics::new());

        let bubbles = router.recognize_page(page(), Language::Japanese).await.unwrap();
        let texts: Vec<_> = bubbles.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["right", "left"]);
        assert_eq!(bubbles[1].index, 1);
        assert!(fb.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back() {
        let fb = fallback();
        let metrics = Metrics::new();
        let primary = FixedPrimary(Err(OcrError::InferenceError("boom".into())));
        let router = OcrRouter::with_engines(Some(Arc::new(primary)), fb.clone(), metrics.clone());

        let bubbles = router.recognize_page(page(), Language::Japanese).await.unwrap();
        assert_eq!(bubbles.len(), 2);
        assert_eq!(bubbles[0].text, "first");
        assert_eq!(*fb.calls.lock(), vec![Language::Japanese]);
        assert_eq!(metrics.snapshot().fallback_ocr_uses, 1);
    }

    #[tokio::test]
    async fn test_other_languages_skip_primary() {
        let fb = fallback();
        let primary = FixedPrimary(Ok(vec![]));
        let router = OcrRouter::with_engines(Some(Arc::new(primary)), fb.clone(), Metrics::new());

        router.recognize_page(page(), Language::English).await.unwrap();
        assert_eq!(*fb.calls.lock(), vec![Language::English]);
    }

    struct ScriptedRecognizer;

    impl RegionRecognizer for ScriptedRecognizer {
        fn recognize(&self, crop: &DynamicImage) -> OcrResult<(String, f32)> {
            match crop.width() {
                30 => Ok(("セリフ".to_string(), 0.9)),
                40 => Ok((String::new(), 0.1)),
                _ => Err(OcrError::InferenceError("decoder exploded".into())),
            }
        }
    }

    #[test]
    fn test_region_failures_are_skipped() {
        let metrics = Metrics::new();
        let image = DynamicImage::new_rgb8(200, 200);
        let regions = vec![
            Rect::new(0.0, 0.0, 30.0, 30.0),
            Rect::new(50.0, 0.0, 9.0, 40.0),
            Rect::new(50.0, 50.0, 40.0, 40.0),
            Rect::new(100.0, 100.0, 50.0, 50.0),
        ];
        let bubbles = recognize_regions(&image, regions, &ScriptedRecognizer, &metrics);

        assert_eq!(bubbles.len(), 1);
        assert_eq!(bubbles[0].text, "セリフ");
        assert_eq!(bubbles[0].observations.len(), 1);
        assert_eq!(metrics.snapshot().region_failures, 1);
    }
}
