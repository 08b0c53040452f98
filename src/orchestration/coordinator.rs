// Page coordinator: per-page state machine and the bounded batch scheduler

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::core::config::Config;
use crate::core::errors::{PipelineError, PipelineResult, TranslationError};
use crate::core::types::{
    BatchSnapshot, CacheKey, HistoryEntry, Language, MangaPage, PageSnapshot, PageState,
    TranslatedBubble, TranslationEngine,
};
use crate::services::credentials::CredentialStore;
use crate::services::input;
use crate::services::ocr::{OcrRouter, PageOcr};
use crate::services::translation::{translate_with_passthrough, ResultCache, TranslationBackends};
use crate::utils::{load_page_image, Metrics};

/// Language pair and engine used for the next page runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub source: Language,
    pub target: Language,
    pub engine: TranslationEngine,
}

impl PipelineSettings {
    pub fn needs_translation(&self) -> bool {
        self.source != self.target
    }
}

/// Owns the page arena and drives pages through OCR, translation and caching.
///
/// Page state is only touched under the arena lock, never across an await. Workers
/// tag their writes with the page id so a run started before `load_pages` cannot
/// land on the replacement page at the same position.
pub struct PageProcessingCoordinator {
    pages: Mutex<Vec<MangaPage>>,
    settings: RwLock<PipelineSettings>,
    ocr: Arc<dyn PageOcr>,
    backends: TranslationBackends,
    cache: ResultCache,
    credentials: Arc<dyn CredentialStore>,
    metrics: Metrics,
    missing_key_alert: AtomicBool,
    max_concurrent: usize,
}

impl PageProcessingCoordinator {
    pub fn new(
        ocr: Arc<dyn PageOcr>,
        backends: TranslationBackends,
        cache: ResultCache,
        credentials: Arc<dyn CredentialStore>,
        settings: PipelineSettings,
        max_concurrent: usize,
        metrics: Metrics,
    ) -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
            settings: RwLock::new(settings),
            ocr,
            backends,
            cache,
            credentials,
            metrics,
            missing_key_alert: AtomicBool::new(false),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Wire the production services from configuration
    #[instrument(skip_all)]
    pub async fn from_config(
        config: Arc<Config>,
        credentials: Arc<dyn CredentialStore>,
        metrics: Metrics,
    ) -> Result<Self> {
        info!("Initializing services...");

        let router = OcrRouter::new(Arc::clone(&config), metrics.clone());
        if let Err(e) = router.warm_up().await {
            warn!("Primary OCR models unavailable, pages will use fallback OCR: {}", e);
        }

        let backends =
            TranslationBackends::from_config(&config, Arc::clone(&credentials), metrics.clone())
                .context("Failed to build translation clients")?;
        let cache = ResultCache::open(config.cache_dir(), config.cache.memory_entries, metrics.clone())
            .await
            .context("Failed to open result cache")?;

        let settings = PipelineSettings {
            source: config.translation.source_language,
            target: config.translation.target_language,
            engine: config.translation.engine,
        };

        info!(
            "✓ Ready ({} → {} via {}, {} pages in flight)",
            settings.source,
            settings.target,
            settings.engine.display_name(),
            config.max_concurrent_pages()
        );

        Ok(Self::new(
            Arc::new(router),
            backends,
            cache,
            credentials,
            settings,
            config.max_concurrent_pages(),
            metrics,
        ))
    }

    pub fn settings(&self) -> PipelineSettings {
        *self.settings.read()
    }

    pub fn set_settings(&self, settings: PipelineSettings) {
        info!(
            "Settings: {} → {} via {}",
            settings.source,
            settings.target,
            settings.engine.display_name()
        );
        *self.settings.write() = settings;
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Replace the loaded work; every page starts Pending
    pub fn load_pages(&self, paths: Vec<PathBuf>) -> usize {
        let mut pages = self.pages.lock();
        *pages = paths.into_iter().map(MangaPage::new).collect();
        info!("Loaded {} pages", pages.len());
        pages.len()
    }

    /// Expand a folder, archive or single image, record it in history and load its pages
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn open(&self, path: &Path) -> PipelineResult<usize> {
        let paths = input::expand_input(path).await?;
        let count = paths.len();

        if let Err(e) = self
            .cache
            .add_history(&path.display().to_string(), Some(count as i64))
            .await
        {
            warn!("Failed to record history for {}: {}", path.display(), e);
        }

        Ok(self.load_pages(paths))
    }

    pub async fn history(&self) -> PipelineResult<Vec<HistoryEntry>> {
        Ok(self.cache.history().await?)
    }

    /// Run every page with at most `max_concurrent` in flight.
    ///
    /// Slots are handed out in page order and refilled as soon as any page finishes.
    #[instrument(skip(self))]
    pub async fn translate_all(&self, bypass_cache: bool) -> BatchSnapshot {
        let start = Instant::now();
        let total = self.pages.lock().len();
        self.missing_key_alert.store(false, Ordering::SeqCst);

        info!("Processing {} pages ({} at a time)", total, self.max_concurrent);

        stream::iter(0..total)
            .map(|index| self.process_page(index, bypass_cache))
            .buffer_unordered(self.max_concurrent)
            .for_each(|_| async {})
            .await;

        self.metrics.record_batch_processed();
        let snapshot = self.snapshot();
        info!(
            "Batch completed in {:.2}s: {}/{} translated",
            start.elapsed().as_secs_f64(),
            snapshot.translated,
            snapshot.total
        );
        snapshot
    }

    /// Reprocess one page, skipping the cache lookup
    pub async fn retranslate(&self, index: usize) -> PipelineResult<PageSnapshot> {
        self.process_page(index, true).await?;
        self.page_snapshot(index)
            .ok_or(PipelineError::PageOutOfRange(index))
    }

    /// Drop cached translations and put every page back to Pending
    pub async fn clear_cache_and_reset(&self) -> PipelineResult<usize> {
        let cleared = self.cache.clear().await?;
        for page in self.pages.lock().iter_mut() {
            page.state = PageState::Pending;
        }
        info!("Cleared {} cached pages and reset page states", cleared);
        Ok(cleared)
    }

    /// True once per batch after a page stopped on a missing API key
    pub fn take_missing_key_alert(&self) -> bool {
        self.missing_key_alert.swap(false, Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        let pages = self.pages.lock();
        let snapshots: Vec<PageSnapshot> = pages
            .iter()
            .enumerate()
            .map(|(index, page)| to_snapshot(index, page))
            .collect();
        BatchSnapshot {
            translated: pages.iter().filter(|p| p.state.is_translated()).count(),
            total: pages.len(),
            pages: snapshots,
        }
    }

    pub fn page_snapshot(&self, index: usize) -> Option<PageSnapshot> {
        self.pages.lock().get(index).map(|p| to_snapshot(index, p))
    }

    /// Drive one page to Translated or Error.
    ///
    /// Only an out-of-range index is returned as an error; every pipeline failure is
    /// recorded on the page itself.
    pub async fn process_page(&self, index: usize, bypass_cache: bool) -> PipelineResult<()> {
        let page_id = {
            let mut pages = self.pages.lock();
            let page = pages
                .get_mut(index)
                .ok_or(PipelineError::PageOutOfRange(index))?;
            page.state = PageState::Processing;
            page.id
        };

        let settings = self.settings();
        let state = match self.run_page(index, page_id, settings, bypass_cache).await {
            Ok(bubbles) => {
                self.metrics.record_page_result(true);
                PageState::Translated(bubbles)
            }
            Err(e) => {
                self.metrics.record_page_result(false);
                if matches!(e, PipelineError::Translation(TranslationError::MissingApiKey(_))) {
                    self.missing_key_alert.store(true, Ordering::SeqCst);
                }
                error!("Page {} failed: {}", index, e);
                PageState::Error(e.to_string())
            }
        };

        self.update_page(index, page_id, |page| page.state = state);
        Ok(())
    }

    #[instrument(skip(self, settings), fields(engine = %settings.engine))]
    async fn run_page(
        &self,
        index: usize,
        page_id: Uuid,
        settings: PipelineSettings,
        bypass_cache: bool,
    ) -> PipelineResult<Vec<TranslatedBubble>> {
        let start = Instant::now();

        if settings.needs_translation() && !self.credentials.has_key(settings.engine) {
            return Err(TranslationError::MissingApiKey(settings.engine).into());
        }

        let (image, image_hash) = self.ensure_image(index, page_id).await?;
        let key = CacheKey {
            image_hash,
            source: settings.source,
            target: settings.target,
            engine: settings.engine,
        };

        if !bypass_cache {
            match self.cache.lookup(&key).await {
                Ok(Some(bubbles)) => {
                    debug!("Page {} served from cache", index);
                    return Ok(bubbles);
                }
                Ok(None) => {}
                Err(e) => warn!("Cache lookup failed for page {}: {}", index, e),
            }
        }

        let ordered = self.ocr.recognize_page(image, settings.source).await?;

        let backend = self.backends.get(settings.engine).ok_or_else(|| {
            TranslationError::ApiError(format!(
                "{} backend is not configured",
                settings.engine.display_name()
            ))
        })?;
        let translated =
            translate_with_passthrough(backend.as_ref(), &ordered, settings.source, settings.target)
                .await?;

        if let Err(e) = self.cache.store(&key, &translated).await {
            warn!("Failed to cache page {}: {}", index, e);
        }

        info!(
            "✓ Page {}: {} bubbles in {:.2}s",
            index,
            translated.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(translated)
    }

    /// Decoded image and content hash, loaded once per page and kept for retries
    async fn ensure_image(
        &self,
        index: usize,
        page_id: Uuid,
    ) -> PipelineResult<(Arc<DynamicImage>, String)> {
        let (path, cached) = {
            let pages = self.pages.lock();
            let page = pages
                .get(index)
                .filter(|p| p.id == page_id)
                .ok_or(PipelineError::PageOutOfRange(index))?;
            let cached = match (&page.image, &page.image_hash) {
                (Some(image), Some(hash)) => Some((Arc::clone(image), hash.clone())),
                _ => None,
            };
            (page.image_path.clone(), cached)
        };

        if let Some(loaded) = cached {
            return Ok(loaded);
        }

        let (image, hash) = load_page_image(&path).await?;
        self.update_page(index, page_id, |page| {
            page.image = Some(Arc::clone(&image));
            page.image_hash = Some(hash.clone());
        });
        Ok((image, hash))
    }

    /// Apply a write to the page at `index` if it is still the same page
    fn update_page(&self, index: usize, page_id: Uuid, f: impl FnOnce(&mut MangaPage)) {
        let mut pages = self.pages.lock();
        match pages.get_mut(index) {
            Some(page) if page.id == page_id => f(page),
            _ => debug!("Page {} was replaced while processing, dropping result", index),
        }
    }
}

fn to_snapshot(index: usize, page: &MangaPage) -> PageSnapshot {
    PageSnapshot {
        index,
        id: page.id,
        image_path: page.image_path.display().to_string(),
        state: page.state.clone(),
    }
}
