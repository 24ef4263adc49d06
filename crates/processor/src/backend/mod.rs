//! 외부 시스템 경계 -- 큐, 공유 캐시, 문서 저장소, 알림 채널
//!
//! 각 경계는 `impl Future + Send`를 반환하는 trait이며, 단계들은
//! [`AppContext`]를 통해 구현체에 접근합니다. 전역 싱글턴은 없습니다.

pub mod cache;
pub mod notify;
pub mod queue;
pub mod redis_cache;
pub mod store;

use std::sync::Arc;

pub use cache::{CacheBackend, MemoryCache, SharedCache};
pub use notify::{LogNotifier, MemoryNotifier, Notifier};
pub use queue::{Delivery, MemoryMessage, MemoryQueue, Outcome, Queue};
pub use redis_cache::RedisCache;
pub use store::{BulkOp, Document, DocumentStore, Filter, MemoryStore, Query, SearchResult};

/// 백엔드 구현 묶음
///
/// 단계와 파이프라인은 이 trait 하나로 제네릭화되어 타입 인자가 늘어나지 않습니다.
pub trait Backends: Send + Sync + 'static {
    type Cache: SharedCache;
    type Store: DocumentStore;
    type Notifier: Notifier;
}

/// 처리기 공유 컨텍스트
pub struct AppContext<B: Backends> {
    pub cache: Arc<B::Cache>,
    pub store: Arc<B::Store>,
    pub notifier: Arc<B::Notifier>,
}

impl<B: Backends> AppContext<B> {
    pub fn new(cache: B::Cache, store: B::Store, notifier: B::Notifier) -> Self {
        Self {
            cache: Arc::new(cache),
            store: Arc::new(store),
            notifier: Arc::new(notifier),
        }
    }
}

// derive(Clone)은 B: Clone을 요구하므로 직접 구현
impl<B: Backends> Clone for AppContext<B> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

/// 인메모리 백엔드 묶음 (테스트, 단독 실행)
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryBackends;

impl Backends for MemoryBackends {
    type Cache = MemoryCache;
    type Store = MemoryStore;
    type Notifier = MemoryNotifier;
}

impl AppContext<MemoryBackends> {
    /// 빈 인메모리 컨텍스트
    pub fn in_memory() -> Self {
        Self::new(MemoryCache::new(), MemoryStore::new(), MemoryNotifier::new())
    }
}
