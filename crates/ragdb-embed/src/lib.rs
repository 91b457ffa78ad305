//! ragdb-embed
//!
//! Local embedding capabilities. `HashEmbedder` is a deterministic
//! feature-hashing model that needs no weights, good for offline use and
//! tests. `CachingEmbedder` memoizes any embedder by content hash.
use async_trait::async_trait;
use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use twox_hash::XxHash64;

use ragdb_core::error::{Error, Result};
use ragdb_core::terms::tokenize;
use ragdb_core::traits::Embedder;

/// Hashes every token into one of `dim` buckets with a pseudo-random sign
/// and magnitude, then L2-normalizes. Text without tokens maps to the zero
/// vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder { dim: usize }

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim } }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        if self.dim == 0 { return v; }
        for token in tokenize(text) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let magnitude = 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32) * 0.5;
            let sign = if h & (1 << 31) == 0 { 1.0 } else { -1.0 };
            v[idx] += sign * magnitude;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-6 { for x in &mut v { *x /= norm; } }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> { Ok(self.embed_sync(text)) }
}

/// Memoizes vectors keyed by the blake3 hash of the input text, so the same
/// text yields the same vector for the lifetime of the cache even when the
/// wrapped model is not deterministic. Once `capacity` entries are held,
/// new texts pass straight through.
pub struct CachingEmbedder {
    inner: Arc<dyn Embedder>,
    cache: DashMap<blake3::Hash, Arc<[f32]>>,
    capacity: usize,
}

impl CachingEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, capacity: usize) -> Self {
        Self { inner, cache: DashMap::new(), capacity }
    }

    pub fn cached(&self) -> usize { self.cache.len() }
}

#[async_trait]
impl Embedder for CachingEmbedder {
    fn dim(&self) -> usize { self.inner.dim() }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = blake3::hash(text.as_bytes());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.to_vec());
        }
        let vector = self.inner.embed(text).await?;
        if vector.len() != self.inner.dim() {
            return Err(Error::DimensionMismatch { expected: self.inner.dim(), actual: vector.len() });
        }
        if self.cache.len() < self.capacity {
            // A concurrent miss may have filled the slot first; keep that one.
            let stored = self.cache.entry(key).or_insert_with(|| Arc::from(vector.as_slice())).clone();
            return Ok(stored.to_vec());
        }
        tracing::debug!(capacity = self.capacity, "embedding cache full, not caching");
        Ok(vector)
    }
}
