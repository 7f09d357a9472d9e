//! Response Cache - TTL-Bounded Tool Result Caching
//!
//! Maps a deterministic cache key to a previously computed tool result.
//! TTLs resolve per tool with a default fallback; a TTL of zero disables
//! caching for that tool. Capacity is bounded: a write against a full cache
//! first sweeps expired entries, then falls back to evicting the oldest
//! insertion (FIFO). Reads are lazy about expiry and may leave dead entries
//! in place.
//!
//! # Key Format
//!
//! `lowercase(tool) ":" (action ?? "") ":" hex16(sha256(canonical_json(args)))`
//! where the reserved `action` and `_meta` keys are excluded from hashing.
//! The 16-hex-char prefix discriminates invocations; it is not a
//! cryptographic commitment.

use crate::arguments::{canonical_json, ArgumentMap, RESERVED_KEYS};
use crate::clock::TimeSource;
use crate::protocol::ToolCallResult;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Deterministic fingerprint of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the key for (tool, action, arguments).
    pub fn build(tool: &str, action: Option<&str>, arguments: &ArgumentMap) -> Self {
        let canon = canonical_json(arguments, RESERVED_KEYS);
        let digest = hex::encode(Sha256::digest(canon.as_bytes()));
        Self(format!(
            "{}:{}:{}",
            tool.to_lowercase(),
            action.unwrap_or(""),
            &digest[..16]
        ))
    }

    /// The key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Cache behavior behind the pipeline.
pub trait ToolResultCache: Send + Sync {
    /// Look up a fresh entry. Expired entries are treated as misses.
    fn try_get(&self, tool: &str, key: &CacheKey) -> Option<ToolCallResult>;

    /// Store a result. No-op when the resolved TTL is zero.
    fn set(&self, tool: &str, key: &CacheKey, result: &ToolCallResult);
}

/// Null cache: always misses, stores nothing. Used when caching is disabled.
#[derive(Debug, Default)]
pub struct NullCache;

impl ToolResultCache for NullCache {
    fn try_get(&self, _tool: &str, _key: &CacheKey) -> Option<ToolCallResult> {
        None
    }

    fn set(&self, _tool: &str, _key: &CacheKey, _result: &ToolCallResult) {}
}

/// Response cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Capacity bound; `|cache| ≤ max_entries` holds after every write.
    pub max_entries: usize,

    /// Default TTL in seconds for tools without an override.
    pub default_ttl_secs: u64,

    /// Per-tool TTL overrides (tool name, case-insensitive). Zero disables
    /// caching for that tool.
    pub ttl_overrides: HashMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl_secs: 300,
            ttl_overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: ToolCallResult,
    inserted_at: SystemTime,
    expires_at: SystemTime,
}

/// In-memory TTL cache with bounded capacity.
///
/// One mutex guards the map; it is held only for map operations, never
/// across I/O or tool execution.
pub struct ResponseCache {
    config: CacheConfig,
    clock: Arc<dyn TimeSource>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    /// Create a cache from config and a time source.
    pub fn new(config: CacheConfig, clock: Arc<dyn TimeSource>) -> Self {
        let mut config = config;
        // Override lookups are case-insensitive; normalize once.
        config.ttl_overrides = config
            .ttl_overrides
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Self {
            config,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the TTL for a tool: override first, default otherwise.
    fn ttl_for(&self, tool: &str) -> Duration {
        let secs = self
            .config
            .ttl_overrides
            .get(&tool.to_lowercase())
            .copied()
            .unwrap_or(self.config.default_ttl_secs);
        Duration::from_secs(secs)
    }

    /// Current number of entries (expired ones included until evicted).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("Cache lock poisoned").len()
    }

    /// True when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when a live entry exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = self.clock.now();
        let entries = self.entries.lock().expect("Cache lock poisoned");
        entries
            .get(key.as_str())
            .map(|e| now < e.expires_at)
            .unwrap_or(false)
    }
}

impl ToolResultCache for ResponseCache {
    fn try_get(&self, _tool: &str, key: &CacheKey) -> Option<ToolCallResult> {
        let now = self.clock.now();
        let entries = self.entries.lock().expect("Cache lock poisoned");
        match entries.get(key.as_str()) {
            Some(entry) if now < entry.expires_at => Some(entry.result.clone()),
            // Expired entries stay in place; eviction reclaims them on write.
            _ => None,
        }
    }

    fn set(&self, tool: &str, key: &CacheKey, result: &ToolCallResult) {
        let ttl = self.ttl_for(tool);
        if ttl.is_zero() {
            return;
        }

        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("Cache lock poisoned");

        if !entries.contains_key(key.as_str()) && entries.len() >= self.config.max_entries {
            // Pass 1: reclaim expired entries.
            entries.retain(|_, e| e.expires_at > now);

            // Pass 2: still full, evict the oldest insertion.
            while entries.len() >= self.config.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        debug!("Cache full, evicting {}", k);
                        entries.remove(&k);
                    }
                    None => break,
                }
            }
        }

        entries.insert(
            key.as_str().to_string(),
            CacheEntry {
                result: result.clone(),
                inserted_at: now,
                expires_at: now + ttl,
            },
        );
    }
}
