//! # delve-cache
//!
//! Key/value cache layer for the Delve research engine.
//!
//! Two backends implement the `Cache` trait from `delve-core`: an in-process
//! TTL map and a Redis client. The Redis backend never surfaces transport
//! errors to callers; every failed operation falls back to the in-process
//! map, so a flaky Redis deployment degrades to per-process caching instead
//! of breaking retrievals.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use delve_core::defaults::CACHE_TTL_SECS;
use delve_core::{Cache, CacheHandle, Result};

// ============================================================================
// Key generation
// ============================================================================

/// Hex-encoded SHA-256 of the input, used to keep keys short and
/// charset-safe regardless of the content hashed.
pub fn content_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds a namespaced cache key: `{namespace}:{sha256(raw)}`.
pub fn generate_key(namespace: &str, raw: &str) -> String {
    format!("{namespace}:{}", content_hash(raw))
}

/// Glob-style match with `*` wildcards, the same dialect Redis `KEYS`
/// understands for the patterns we use (`embedding:*`, `rag-retrieval:*`).
fn key_matches(pattern: &str, key: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == key,
        Some((prefix, rest)) => {
            let Some(key) = key.strip_prefix(prefix) else {
                return false;
            };
            if rest.is_empty() {
                return true;
            }
            (0..=key.len())
                .filter(|i| key.is_char_boundary(*i))
                .any(|i| key_matches(rest, &key[i..]))
        }
    }
}

// ============================================================================
// In-process backend
// ============================================================================

/// In-process TTL map. Expired entries are dropped lazily on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn clear(&self, pattern: Option<&str>) -> Result<()> {
        let mut entries = self.entries.lock().await;
        match pattern {
            Some(pattern) => entries.retain(|key, _| !key_matches(pattern, key)),
            None => entries.clear(),
        }
        Ok(())
    }
}

// ============================================================================
// Redis backend
// ============================================================================

/// Redis-backed cache with silent fallback to an in-process map.
pub struct RedisCache {
    manager: redis::aio::ConnectionManager,
    fallback: MemoryCache,
}

impl RedisCache {
    /// Connects to Redis at `url`. Connection failures are returned so the
    /// caller can decide to run memory-only instead.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| delve_core::Error::Cache(format!("invalid redis url: {e}")))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| delve_core::Error::Cache(format!("redis connect failed: {e}")))?;
        Ok(Self {
            manager,
            fallback: MemoryCache::new(),
        })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(key, error = %e, "redis get failed, using in-process fallback");
                self.fallback.get(key).await
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.manager.clone();
        match conn.set_ex::<_, _, ()>(key, value, ttl_secs).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(key, error = %e, "redis set failed, using in-process fallback");
                self.fallback.set(key, value, ttl_secs).await
            }
        }
    }

    async fn clear(&self, pattern: Option<&str>) -> Result<()> {
        let mut conn = self.manager.clone();
        let result = match pattern {
            Some(pattern) => self.clear_matching(&mut conn, pattern).await,
            None => redis::cmd("FLUSHDB")
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| delve_core::Error::Cache(format!("redis flush failed: {e}"))),
        };
        if let Err(e) = result {
            warn!(error = %e, "redis clear failed, clearing in-process fallback only");
        }
        self.fallback.clear(pattern).await
    }
}

impl RedisCache {
    async fn clear_matching(
        &self,
        conn: &mut redis::aio::ConnectionManager,
        pattern: &str,
    ) -> Result<()> {
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(conn)
            .await
            .map_err(|e| delve_core::Error::Cache(format!("redis keys failed: {e}")))?;
        if keys.is_empty() {
            return Ok(());
        }
        redis::cmd("DEL")
            .arg(&keys)
            .query_async::<()>(conn)
            .await
            .map_err(|e| delve_core::Error::Cache(format!("redis del failed: {e}")))
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Cache configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_enabled: bool,
    pub redis_url: String,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_enabled: false,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            ttl_secs: CACHE_TTL_SECS,
        }
    }
}

impl CacheConfig {
    /// Reads `REDIS_ENABLED`, `REDIS_URL` and `CACHE_TTL_SECS`, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let redis_enabled = std::env::var("REDIS_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.redis_enabled);
        let redis_url = std::env::var("REDIS_URL").unwrap_or(defaults.redis_url);
        let ttl_secs = std::env::var("CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.ttl_secs);
        Self {
            redis_enabled,
            redis_url,
            ttl_secs,
        }
    }

    /// Builds the configured cache. A Redis that is enabled but unreachable
    /// degrades to the in-process map with a warning.
    pub async fn build(&self) -> CacheHandle {
        if self.redis_enabled {
            match RedisCache::connect(&self.redis_url).await {
                Ok(redis) => {
                    debug!(url = %self.redis_url, "redis cache connected");
                    return CacheHandle::new(Arc::new(redis));
                }
                Err(e) => {
                    warn!(error = %e, "redis unavailable, falling back to in-process cache");
                }
            }
        }
        CacheHandle::new(Arc::new(MemoryCache::new()))
    }
}
