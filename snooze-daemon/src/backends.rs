//! Backend selection for the daemon process.
//!
//! The shared cache follows `[cache] backend` (memory or redis). Documents
//! are kept in memory and notifications are written to the tracing log.

use anyhow::Result;

use snooze_core::config::CacheConfig;
use snooze_processor::backend::{CacheBackend, LogNotifier, MemoryStore};
use snooze_processor::{AppContext, Backends};

/// Backends used by `snooze-daemon`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DaemonBackends;

impl Backends for DaemonBackends {
    type Cache = CacheBackend;
    type Store = MemoryStore;
    type Notifier = LogNotifier;
}

/// Connect the configured cache and assemble the processor context.
///
/// # Errors
///
/// Returns an error if the redis connection cannot be established.
pub async fn build_context(config: &CacheConfig) -> Result<AppContext<DaemonBackends>> {
    let cache = CacheBackend::from_config(config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect shared cache: {}", e))?;
    tracing::info!(backend = %config.backend, "shared cache ready");
    Ok(AppContext::new(cache, MemoryStore::new(), LogNotifier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use snooze_processor::backend::SharedCache;

    #[tokio::test]
    async fn memory_cache_context() {
        let ctx = build_context(&CacheConfig::default()).await.unwrap();
        ctx.cache.set("k", "v", None).await.unwrap();
        assert_eq!(ctx.cache.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn unreachable_redis_fails() {
        let config = CacheConfig {
            backend: "redis".to_owned(),
            redis_url: "not a url".to_owned(),
        };
        let Err(err) = build_context(&config).await else {
            panic!("called `Result::unwrap_err()` on an `Ok` value");
        };
        assert!(err.to_string().contains("failed to connect shared cache"));
    }
}
