//! Shared (out-of-process) cache tier over Redis.
//!
//! All operations are best-effort: command failures are logged and reported
//! as misses or no-ops so that cache unavailability can never fail a
//! request. Only the constructor surfaces errors, so the server can log a
//! clear warning and run without the tier.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::error::CacheError;

/// Redis-backed shared cache tier.
#[derive(Clone)]
pub struct SharedCache {
    conn: ConnectionManager,
    url: String,
}

impl SharedCache {
    /// Connects and pings the endpoint.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::SharedUnavailable {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let mut conn = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::SharedUnavailable {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| CacheError::SharedUnavailable {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        info!(url, "shared cache connected");
        Ok(Self {
            conn,
            url: url.to_string(),
        })
    }

    /// Returns the configured endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Reads and decodes a JSON value; errors become misses.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "shared cache entry failed to decode");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "shared cache read failed");
                None
            }
        }
    }

    /// Encodes and writes a JSON value with a TTL; errors are swallowed.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "shared cache value failed to encode");
                return;
            }
        };

        let mut conn = self.conn.clone();
        let ttl_secs = ttl.as_secs().max(1);
        if let Err(e) = conn.set_ex::<_, _, ()>(key, raw, ttl_secs).await {
            warn!(key, error = %e, "shared cache write failed");
        } else {
            debug!(key, ttl_secs, "shared cache entry stored");
        }
    }

    /// Deletes every key matching the pattern; returns the count removed.
    pub async fn delete_pattern(&self, pattern: &str) -> usize {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = match conn.keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(pattern, error = %e, "shared cache scan failed");
                return 0;
            }
        };

        if keys.is_empty() {
            return 0;
        }

        match conn.del::<_, usize>(keys).await {
            Ok(deleted) => {
                info!(pattern, deleted, "shared cache namespace cleared");
                deleted
            }
            Err(e) => {
                warn!(pattern, error = %e, "shared cache delete failed");
                0
            }
        }
    }

    /// Counts keys matching the pattern.
    pub async fn count_pattern(&self, pattern: &str) -> usize {
        let mut conn = self.conn.clone();
        conn.keys::<_, Vec<String>>(pattern)
            .await
            .map(|keys| keys.len())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCache").field("url", &self.url).finish()
    }
}
