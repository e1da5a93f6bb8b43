use crate::engine::RouteSearchResponse;
use crate::types::RouteRequest;
use ahash::AHasher;
use moka::future::Cache;
use std::{hash::Hasher, sync::Arc, time::Duration};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(pub u64);

impl CacheKey {
    /// Every field that can change the search result participates; the
    /// dataset revision keys out stale snapshots after a reload. Pricing
    /// fields (term, currency) deliberately do not: they never affect
    /// routing.
    pub fn derive(dataset_revision: &str, req: &RouteRequest) -> Self {
        let mut hasher = AHasher::default();
        hasher.write(dataset_revision.as_bytes());
        hasher.write(req.source.as_bytes());
        hasher.write(req.destination.as_bytes());
        hasher.write_u64(req.bandwidth_mbps.to_bits());
        hasher.write_u8(req.protection_required as u8);
        hasher.write_u32(req.mtu);
        hasher.write_u8(req.include_ull as u8);
        hasher.write_u8(req.include_cisco as u8);
        let mut avoid: Vec<String> = req
            .avoid_carriers
            .iter()
            .map(|name| name.to_ascii_lowercase())
            .collect();
        avoid.sort();
        for name in avoid {
            hasher.write(name.as_bytes());
        }
        CacheKey(hasher.finish())
    }
}

/// Short-lived cache of complete search outcomes; a hit returns the same
/// response a fresh computation would, exclusion report included.
#[derive(Clone)]
pub struct SearchCache {
    inner: Cache<CacheKey, Arc<RouteSearchResponse>>,
}

impl SearchCache {
    pub fn new(capacity: u64, ttl_ms: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(Duration::from_millis(ttl_ms))
            .build();
        Self { inner }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Arc<RouteSearchResponse>> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: CacheKey, response: Arc<RouteSearchResponse>) {
        self.inner.insert(key, response).await;
    }

    pub async fn clear(&self) {
        self.inner.invalidate_all();
    }
}
