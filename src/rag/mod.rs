//! ScratchpadRAG (§4.2/L2): embedding cache + cosine-similarity search over
//! Scratchpad summaries. Local ONNX embeddings via `fastembed`, no API key.

use crate::config::RagConfig;
use crate::scratchpad::{EntryType, Scratchpad, SummaryView};
use anyhow::Result;
use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Local embedding generation, matching the teacher's memory-embeddings shape:
/// a single loaded ONNX model plus a small LRU cache of query embeddings.
pub struct EmbeddingService {
    model: Mutex<TextEmbedding>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingService {
    pub fn new(model_name: &str, query_cache_size: usize) -> Result<Self> {
        let model_type = match model_name {
            "BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "BAAI/bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            _ => anyhow::bail!(
                "unsupported embedding model '{}'; use BAAI/bge-small-en-v1.5 or BAAI/bge-base-en-v1.5",
                model_name
            ),
        };

        let model = TextEmbedding::try_new(
            TextInitOptions::new(model_type).with_show_download_progress(true),
        )?;

        let cap = NonZeroUsize::new(query_cache_size.max(1)).unwrap();
        Ok(Self {
            model: Mutex::new(model),
            query_cache: Mutex::new(LruCache::new(cap)),
        })
    }

    /// Embed multiple texts in one batch call. Used when indexing scratchpad
    /// summaries, where each text is unique and not worth caching.
    pub fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let docs: Vec<String> = texts.iter().map(|s| (*s).to_string()).collect();
        let mut model = self.model.lock().map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(model.embed(docs, None)?)
    }

    /// Embed a single query string, cached by exact text match.
    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        {
            let mut cache = self.query_cache.lock().map_err(|e| anyhow::anyhow!("{e}"))?;
            if let Some(cached) = cache.get(query) {
                return Ok(cached.clone());
            }
        }

        let embedding = {
            let mut model = self.model.lock().map_err(|e| anyhow::anyhow!("{e}"))?;
            model
                .embed(vec![query.to_string()], None)?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("empty embedding result"))?
        };

        self.query_cache
            .lock()
            .map_err(|e| anyhow::anyhow!("{e}"))?
            .put(query.to_string(), embedding.clone());

        Ok(embedding)
    }
}

/// Cosine similarity. `fastembed` produces L2-normalized vectors, so the dot
/// product already equals cosine similarity.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

struct CachedEmbedding {
    vector: Vec<f32>,
    created_at: Instant,
}

/// Semantic search over a `Scratchpad`'s live summaries.
///
/// Summary embeddings are computed lazily (on first search that touches a
/// key) and cached by scratchpad key, bounded by `max_cache_size` and TTL'd
/// by `embedding_ttl`. Every search drops cache entries for keys no longer
/// present in the scratchpad, keeping the cache in sync with live content.
pub struct ScratchpadRag {
    config: RagConfig,
    embedder: EmbeddingService,
    cache: Mutex<LruCache<String, CachedEmbedding>>,
}

impl ScratchpadRag {
    pub fn new(config: RagConfig, embedder: EmbeddingService) -> Self {
        let cap = NonZeroUsize::new(config.max_cache_size.max(1)).unwrap();
        Self {
            config,
            embedder,
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    fn embedding_for(&self, key: &str, summary: &str) -> Option<Vec<f32>> {
        let ttl: Duration = self.config.embedding_ttl();
        {
            let mut cache = self.cache.lock().expect("rag cache poisoned");
            if let Some(cached) = cache.get(key) {
                if cached.created_at.elapsed() < ttl {
                    return Some(cached.vector.clone());
                }
                cache.pop(key);
            }
        }

        let vector = match self.embedder.embed_texts(&[summary]) {
            Ok(mut v) => v.pop()?,
            Err(e) => {
                warn!("rag: failed to embed summary for '{}': {}", key, e);
                return None;
            }
        };

        self.cache.lock().expect("rag cache poisoned").put(
            key.to_string(),
            CachedEmbedding {
                vector: vector.clone(),
                created_at: Instant::now(),
            },
        );
        Some(vector)
    }

    /// Drop cached embeddings for keys no longer present in `live_keys`.
    fn sync_to_live_keys(&self, live_keys: &std::collections::HashSet<String>) {
        let mut cache = self.cache.lock().expect("rag cache poisoned");
        let stale: Vec<String> = cache
            .iter()
            .map(|(k, _)| k.clone())
            .filter(|k| !live_keys.contains(k))
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    /// Rank live scratchpad summaries (optionally filtered by `entry_type`)
    /// against `query`, returning up to `limit` above `min_similarity`.
    pub fn search(
        &self,
        scratchpad: &Scratchpad,
        query: &str,
        entry_type: Option<EntryType>,
        limit: usize,
    ) -> Vec<(SummaryView, f32)> {
        let candidates: Vec<SummaryView> = match entry_type {
            Some(t) => scratchpad.list_summaries_by_type(t, usize::MAX),
            None => scratchpad.list_summaries(usize::MAX),
        };

        let live_keys: std::collections::HashSet<String> =
            candidates.iter().map(|s| s.key.clone()).collect();
        self.sync_to_live_keys(&live_keys);

        let query_vec = match self.embedder.embed_query(query) {
            Ok(v) => v,
            Err(e) => {
                warn!("rag: failed to embed query: {}", e);
                return Vec::new();
            }
        };

        let mut scored: Vec<(SummaryView, f32)> = candidates
            .into_iter()
            .filter_map(|view| {
                let vector = self.embedding_for(&view.key, &view.summary)?;
                let score = cosine_similarity(&query_vec, &vector);
                (score >= self.config.min_similarity).then_some((view, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(limit);
        debug!("rag: search returned {} of {} candidates", scored.len(), live_keys.len());
        scored
    }
}
