use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::errors::{CacheError, CacheResult};
use crate::core::types::{BubbleCluster, CacheKey, HistoryEntry, Rect, TranslatedBubble};
use crate::utils::Metrics;

const DB_FILE_NAME: &str = "cache.sqlite";

/// SHA-256 of raw image bytes as lowercase hex
pub fn image_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persisted form of one translated bubble
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedBubble {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    original_text: String,
    translated_text: String,
    index: usize,
}

impl From<&TranslatedBubble> for CachedBubble {
    fn from(t: &TranslatedBubble) -> Self {
        Self {
            x: t.bubble.bbox.x,
            y: t.bubble.bbox.y,
            width: t.bubble.bbox.width,
            height: t.bubble.bbox.height,
            original_text: t.bubble.text.clone(),
            translated_text: t.translated_text.clone(),
            index: t.index,
        }
    }
}

impl From<CachedBubble> for TranslatedBubble {
    /// Per-observation detail is not persisted; the cluster comes back with none
    fn from(c: CachedBubble) -> Self {
        let mut bubble = BubbleCluster::new(
            Rect::new(c.x, c.y, c.width, c.height),
            c.original_text,
            Vec::new(),
        );
        bubble.index = c.index;
        Self {
            bubble,
            translated_text: c.translated_text,
            index: c.index,
        }
    }
}

/// Content-addressed translation cache: SQLite on disk with an LRU hot layer in front.
///
/// Also keeps the history of opened folders/archives, which `clear` leaves alone.
#[derive(Clone)]
pub struct ResultCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    conn: Mutex<Connection>,
    hot: Mutex<LruCache<CacheKey, Vec<TranslatedBubble>>>,
    metrics: Metrics,
}

impl ResultCache {
    /// Open (or create) `cache.sqlite` inside `cache_dir`
    pub async fn open(cache_dir: &str, memory_entries: usize, metrics: Metrics) -> CacheResult<Self> {
        let dir = Path::new(cache_dir);
        tokio::fs::create_dir_all(dir).await?;
        let db_path = dir.join(DB_FILE_NAME);

        let conn = tokio::task::spawn_blocking(move || Connection::open(db_path)).await??;
        let cache = Self::from_connection(conn, memory_entries, metrics)?;
        info!("Result cache ready at {}/{}", cache_dir, DB_FILE_NAME);
        Ok(cache)
    }

    /// Non-persistent cache, used by tools and tests
    pub fn in_memory(memory_entries: usize, metrics: Metrics) -> CacheResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, memory_entries, metrics)
    }

    fn from_connection(conn: Connection, memory_entries: usize, metrics: Metrics) -> CacheResult<Self> {
        init_schema(&conn)?;
        let capacity = NonZeroUsize::new(memory_entries).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            inner: Arc::new(CacheInner {
                conn: Mutex::new(conn),
                hot: Mutex::new(LruCache::new(capacity)),
                metrics,
            }),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> CacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> CacheResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let conn = inner.conn.lock();
            f(&conn)
        })
        .await?
    }

    /// Exact-key lookup
    pub async fn lookup(&self, key: &CacheKey) -> CacheResult<Option<Vec<TranslatedBubble>>> {
        if let Some(hit) = self.inner.hot.lock().get(key).cloned() {
            self.inner.metrics.record_cache_hit();
            debug!("Cache hit (memory) for {}", short_hash(&key.image_hash));
            return Ok(Some(hit));
        }

        let db_key = key.clone();
        let row: Option<String> = self
            .with_conn(move |conn| {
                let json = conn
                    .query_row(
                        "SELECT bubbles_json FROM translation_cache
                         WHERE image_hash = ?1 AND source_lang = ?2 AND target_lang = ?3 AND engine = ?4",
                        params![
                            db_key.image_hash,
                            db_key.source.code(),
                            db_key.target.code(),
                            db_key.engine.id()
                        ],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(json)
            })
            .await?;

        let Some(json) = row else {
            self.inner.metrics.record_cache_miss();
            debug!("Cache miss for {}", short_hash(&key.image_hash));
            return Ok(None);
        };

        let cached: Vec<CachedBubble> = serde_json::from_str(&json)?;
        let bubbles: Vec<TranslatedBubble> = cached.into_iter().map(Into::into).collect();
        self.inner.hot.lock().put(key.clone(), bubbles.clone());
        self.inner.metrics.record_cache_hit();
        debug!("Cache hit (disk) for {}", short_hash(&key.image_hash));
        Ok(Some(bubbles))
    }

    /// Insert or replace the entry for `key`
    pub async fn store(&self, key: &CacheKey, bubbles: &[TranslatedBubble]) -> CacheResult<()> {
        let cached: Vec<CachedBubble> = bubbles.iter().map(CachedBubble::from).collect();
        let json = serde_json::to_string(&cached)?;

        let db_key = key.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO translation_cache
                     (image_hash, source_lang, target_lang, engine, bubbles_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(image_hash, source_lang, target_lang, engine)
                 DO UPDATE SET bubbles_json = excluded.bubbles_json, created_at = excluded.created_at",
                params![
                    db_key.image_hash,
                    db_key.source.code(),
                    db_key.target.code(),
                    db_key.engine.id(),
                    json,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(())
        })
        .await?;

        let round_tripped: Vec<TranslatedBubble> = cached.into_iter().map(Into::into).collect();
        self.inner.hot.lock().put(key.clone(), round_tripped);
        debug!("Cached {} bubbles for {}", bubbles.len(), short_hash(&key.image_hash));
        Ok(())
    }

    /// Drop every cached translation; history is kept
    pub async fn clear(&self) -> CacheResult<usize> {
        let removed = self
            .with_conn(|conn| Ok(conn.execute("DELETE FROM translation_cache", [])?))
            .await?;
        self.inner.hot.lock().clear();
        info!("Cleared {} cached translations", removed);
        Ok(removed)
    }

    pub async fn add_history(&self, path: &str, page_count: Option<i64>) -> CacheResult<()> {
        let path = path.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO history (file_path, page_count, last_opened) VALUES (?1, ?2, ?3)
                 ON CONFLICT(file_path)
                 DO UPDATE SET page_count = excluded.page_count, last_opened = excluded.last_opened",
                params![path, page_count, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    /// History entries, most recently opened first
    pub async fn history(&self) -> CacheResult<Vec<HistoryEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT file_path, page_count, last_opened FROM history
                 ORDER BY last_opened DESC, id DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                let last_opened: String = row.get(2)?;
                Ok(HistoryEntry {
                    path: row.get(0)?,
                    page_count: row.get(1)?,
                    last_opened: parse_datetime(&last_opened),
                })
            })?;
            let entries = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> CacheResult<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM translation_cache", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

fn init_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS translation_cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image_hash TEXT NOT NULL,
            source_lang TEXT NOT NULL,
            target_lang TEXT NOT NULL,
            engine TEXT NOT NULL,
            bubbles_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(image_hash, source_lang, target_lang, engine)
        );
        CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT NOT NULL UNIQUE,
            page_count INTEGER,
            last_opened TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_last_opened ON history(last_opened DESC);
    "#,
    )?;
    Ok(())
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
