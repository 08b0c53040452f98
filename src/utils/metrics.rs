use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Process-wide counters for the translation pipeline.
///
/// Cheap to clone; every clone records into the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Translation API
    api_calls_total: AtomicUsize,
    api_calls_success: AtomicUsize,
    api_calls_failed: AtomicUsize,
    api_latency_ms: RwLock<Vec<u64>>,
    engine_calls: DashMap<String, AtomicUsize>,

    // Cache
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,

    // OCR
    region_failures: AtomicUsize,
    fallback_ocr_uses: AtomicUsize,
    ocr_duration_ms: RwLock<Vec<u64>>,

    // Pages
    pages_translated: AtomicUsize,
    pages_failed: AtomicUsize,
    batches_processed: AtomicUsize,

    endpoint_counters: DashMap<String, AtomicUsize>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                api_calls_total: AtomicUsize::new(0),
                api_calls_success: AtomicUsize::new(0),
                api_calls_failed: AtomicUsize::new(0),
                api_latency_ms: RwLock::new(Vec::new()),
                engine_calls: DashMap::new(),
                cache_hits: AtomicUsize::new(0),
                cache_misses: AtomicUsize::new(0),
                region_failures: AtomicUsize::new(0),
                fallback_ocr_uses: AtomicUsize::new(0),
                ocr_duration_ms: RwLock::new(Vec::new()),
                pages_translated: AtomicUsize::new(0),
                pages_failed: AtomicUsize::new(0),
                batches_processed: AtomicUsize::new(0),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_api_call(&self, engine: &str, success: bool, duration: Duration) {
        self.inner.api_calls_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.api_calls_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.api_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner
            .engine_calls
            .entry(engine.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
        self.inner.api_latency_ms.write().push(duration.as_millis() as u64);
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_region_failure(&self) {
        self.inner.region_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_ocr(&self) {
        self.inner.fallback_ocr_uses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ocr_duration(&self, duration: Duration) {
        self.inner.ocr_duration_ms.write().push(duration.as_millis() as u64);
    }

    pub fn record_page_result(&self, success: bool) {
        if success {
            self.inner.pages_translated.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.pages_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_batch_processed(&self) {
        self.inner.batches_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let api_latency = self.inner.api_latency_ms.read();
        let api_latency_avg = avg(&api_latency);
        let api_latency_p50 = percentile(&api_latency, 0.5);
        let api_latency_p95 = percentile(&api_latency, 0.95);
        drop(api_latency);

        let ocr_durations = self.inner.ocr_duration_ms.read();
        let ocr_avg = avg(&ocr_durations);
        drop(ocr_durations);

        let cache_hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            cache_hits as f64 / cache_total as f64
        } else {
            0.0
        };

        let engine_calls = self
            .inner
            .engine_calls
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        let endpoint_requests = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            api_calls_total: self.inner.api_calls_total.load(Ordering::Relaxed),
            api_calls_success: self.inner.api_calls_success.load(Ordering::Relaxed),
            api_calls_failed: self.inner.api_calls_failed.load(Ordering::Relaxed),
            api_latency_avg_ms: api_latency_avg,
            api_latency_p50_ms: api_latency_p50,
            api_latency_p95_ms: api_latency_p95,
            engine_calls,
            cache_hits,
            cache_misses,
            cache_hit_rate,
            region_failures: self.inner.region_failures.load(Ordering::Relaxed),
            fallback_ocr_uses: self.inner.fallback_ocr_uses.load(Ordering::Relaxed),
            ocr_avg_ms: ocr_avg,
            pages_translated: self.inner.pages_translated.load(Ordering::Relaxed),
            pages_failed: self.inner.pages_failed.load(Ordering::Relaxed),
            batches_processed: self.inner.batches_processed.load(Ordering::Relaxed),
            endpoint_requests,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = format!(
            r#"# HELP translation_api_calls_total Total number of translation API calls made
# TYPE translation_api_calls_total counter
translation_api_calls_total {{}} {}

# HELP translation_api_calls_failed Number of failed translation API calls
# TYPE translation_api_calls_failed counter
translation_api_calls_failed {{}} {}

# HELP translation_api_latency_avg_ms Average translation API latency in milliseconds
# TYPE translation_api_latency_avg_ms gauge
translation_api_latency_avg_ms {{}} {}

# HELP cache_hit_rate Cache hit rate (0.0 to 1.0)
# TYPE cache_hit_rate gauge
cache_hit_rate {{}} {}

# HELP ocr_region_failures_total Text regions skipped after a recognition error
# TYPE ocr_region_failures_total counter
ocr_region_failures_total {{}} {}

# HELP ocr_fallback_total Pages recognized by the fallback OCR
# TYPE ocr_fallback_total counter
ocr_fallback_total {{}} {}

# HELP ocr_avg_duration_ms Average page OCR duration in milliseconds
# TYPE ocr_avg_duration_ms gauge
ocr_avg_duration_ms {{}} {}

# HELP pages_translated_total Pages that reached the translated state
# TYPE pages_translated_total counter
pages_translated_total {{}} {}

# HELP pages_failed_total Pages that ended in an error state
# TYPE pages_failed_total counter
pages_failed_total {{}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            snapshot.api_calls_total,
            snapshot.api_calls_failed,
            snapshot.api_latency_avg_ms,
            snapshot.cache_hit_rate,
            snapshot.region_failures,
            snapshot.fallback_ocr_uses,
            snapshot.ocr_avg_ms,
            snapshot.pages_translated,
            snapshot.pages_failed,
            snapshot.uptime_seconds,
        );

        if !snapshot.engine_calls.is_empty() {
            out.push_str("\n# HELP translation_engine_calls_total API calls per engine\n");
            out.push_str("# TYPE translation_engine_calls_total counter\n");
            for (engine, count) in &snapshot.engine_calls {
                out.push_str(&format!(
                    "translation_engine_calls_total {{engine=\"{}\"}} {}\n",
                    engine, count
                ));
            }
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub api_calls_total: usize,
    pub api_calls_success: usize,
    pub api_calls_failed: usize,
    pub api_latency_avg_ms: u64,
    pub api_latency_p50_ms: u64,
    pub api_latency_p95_ms: u64,
    pub engine_calls: BTreeMap<String, usize>,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_hit_rate: f64,
    pub region_failures: usize,
    pub fallback_ocr_uses: usize,
    pub ocr_avg_ms: u64,
    pub pages_translated: usize,
    pub pages_failed: usize,
    pub batches_processed: usize,
    pub endpoint_requests: BTreeMap<String, usize>,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
