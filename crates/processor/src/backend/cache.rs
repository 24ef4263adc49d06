//! 공유 캐시 -- 레플리카 간 원자적 상태 (그룹 존재, 스누즈 조회, GCRA, 락)
//!
//! [`SharedCache`]는 처리기가 쓰는 캐시 명령의 최소 집합입니다.
//! 여러 키를 다루는 명령(`exists_many`, `hget_all_many`, `set_many`)은
//! 한 번의 왕복(pipeline)으로 실행됩니다.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use snooze_core::config::CacheConfig;
use snooze_core::error::CacheError;
use tokio::time::Instant;

use super::redis_cache::RedisCache;
use crate::gcra::{self, Gcra, GcraMode, GcraStatus};

/// 공유 캐시 trait
pub trait SharedCache: Send + Sync + 'static {
    /// 문자열 값을 읽습니다.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, CacheError>> + Send;

    /// 문자열 값을 씁니다. `ttl`이 `None`이면 만료 없음.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// 여러 키를 같은 TTL로 씁니다 (pipeline).
    fn set_many(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// 키를 삭제합니다. 삭제되었으면 `true`.
    fn del(&self, key: &str) -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// 각 키의 존재 여부 (pipeline)
    fn exists_many(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<bool>, CacheError>> + Send;

    /// 만료 시간을 갱신합니다. 키가 없으면 `false`.
    fn expire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// 키가 없을 때만 쓰고, 이미 있으면 기존 값을 돌려줍니다 (`SET NX GET`).
    fn set_nx_get(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<Option<String>, CacheError>> + Send;

    /// 해시 필드들을 씁니다.
    fn hset(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// 각 해시 전체를 읽습니다 (pipeline). 없는 키는 빈 맵.
    fn hget_all_many(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<BTreeMap<String, String>>, CacheError>> + Send;

    /// 해시 필드를 정수만큼 증가시킵니다.
    fn hincr(
        &self,
        key: &str,
        field: &str,
        by: i64,
    ) -> impl Future<Output = Result<i64, CacheError>> + Send;

    /// 해시 필드를 삭제합니다.
    fn hdel(&self, key: &str, field: &str)
    -> impl Future<Output = Result<bool, CacheError>> + Send;

    /// GCRA를 원자적으로 평가합니다.
    fn gcra(
        &self,
        key: &str,
        gcra: &Gcra,
        mode: GcraMode,
    ) -> impl Future<Output = Result<GcraStatus, CacheError>> + Send;

    /// 정렬 집합에 멤버를 추가하거나 점수를 갱신합니다.
    fn zadd(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// 점수가 `max` 이하인 멤버를 점수 순으로 돌려줍니다.
    fn zrange_by_score(
        &self,
        key: &str,
        max: f64,
    ) -> impl Future<Output = Result<Vec<String>, CacheError>> + Send;

    /// 정렬 집합에서 멤버를 제거합니다.
    fn zrem(&self, key: &str, member: &str)
    -> impl Future<Output = Result<bool, CacheError>> + Send;
}

// ─── 인메모리 구현 ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Slot {
    Str(String),
    Hash(BTreeMap<String, String>),
    ZSet(HashMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

/// 단일 프로세스용 인메모리 캐시
///
/// 만료는 `tokio::time::Instant` 기준이라 일시정지된 테스트 시계와 함께 동작합니다.
/// GCRA 시각도 같은 시계에서 파생됩니다.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    epoch: Instant,
    failing: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            epoch: Instant::now(),
            failing: AtomicBool::new(false),
        }
    }

    /// 이후 모든 명령이 연결 에러를 내도록 합니다 (장애 주입).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 만료되지 않은 키 수
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|entries| entries.values().filter(|e| !expired(e, now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 남은 TTL (만료 없음이면 `None`)
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.lock().ok()?;
        let entry = entries.get(key).filter(|e| !expired(e, now))?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("memory cache is failing".to_owned()));
        }
        self.entries
            .lock()
            .map_err(|_| CacheError::Connection("memory cache lock poisoned".to_owned()))
    }

    fn now_micros(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn expired(entry: &Entry, now: Instant) -> bool {
    entry.expires_at.is_some_and(|at| at <= now)
}

fn wrong_type(command: &str) -> CacheError {
    CacheError::Command {
        command: command.to_owned(),
        reason: "WRONGTYPE operation against a key holding the wrong kind of value".to_owned(),
    }
}

/// 만료된 항목을 치우고 살아 있는 항목을 돌려줍니다.
fn live<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|e| expired(e, now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

impl SharedCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.lock()?;
        match live(&mut entries, key, Instant::now()) {
            None => Ok(None),
            Some(Entry {
                slot: Slot::Str(s), ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type("GET")),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_owned(),
            Entry {
                slot: Slot::Str(value.to_owned()),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn set_many(&self, items: &[(String, String)], ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.lock()?;
        let expires_at = Some(Instant::now() + ttl);
        for (key, value) in items {
            entries.insert(
                key.clone(),
                Entry {
                    slot: Slot::Str(value.clone()),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.lock()?;
        let existed = live(&mut entries, key, Instant::now()).is_some();
        entries.remove(key);
        Ok(existed)
    }

    async fn exists_many(&self, keys: &[String]) -> Result<Vec<bool>, CacheError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        Ok(keys
            .iter()
            .map(|k| live(&mut entries, k, now).is_some())
            .collect())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        match live(&mut entries, key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_nx_get(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<Option<String>, CacheError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        match live(&mut entries, key, now) {
            Some(Entry {
                slot: Slot::Str(s), ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type("SET")),
            None => {
                entries.insert(
                    key.to_owned(),
                    Entry {
                        slot: Slot::Str(value.to_owned()),
                        expires_at: Some(now + ttl),
                    },
                );
                Ok(None)
            }
        }
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<(), CacheError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        if live(&mut entries, key, now).is_none() {
            entries.insert(
                key.to_owned(),
                Entry {
                    slot: Slot::Hash(BTreeMap::new()),
                    expires_at: None,
                },
            );
        }
        match entries.get_mut(key) {
            Some(Entry {
                slot: Slot::Hash(hash),
                ..
            }) => {
                for (f, v) in fields {
                    hash.insert(f.clone(), v.clone());
                }
                Ok(())
            }
            _ => Err(wrong_type("HSET")),
        }
    }

    async fn hget_all_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<BTreeMap<String, String>>, CacheError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        keys.iter()
            .map(|k| match live(&mut entries, k, now) {
                None => Ok(BTreeMap::new()),
                Some(Entry {
                    slot: Slot::Hash(h),
                    ..
                }) => Ok(h.clone()),
                Some(_) => Err(wrong_type("HGETALL")),
            })
            .collect()
    }

    async fn hincr(&self, key: &str, field: &str, by: i64) -> Result<i64, CacheError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        if live(&mut entries, key, now).is_none() {
            entries.insert(
                key.to_owned(),
                Entry {
                    slot: Slot::Hash(BTreeMap::new()),
                    expires_at: None,
                },
            );
        }
        let Some(Entry {
            slot: Slot::Hash(hash),
            ..
        }) = entries.get_mut(key)
        else {
            return Err(wrong_type("HINCRBY"));
        };
        let current = match hash.get(field) {
            Some(v) => v.parse::<i64>().map_err(|_| CacheError::Command {
                command: "HINCRBY".to_owned(),
                reason: "hash value is not an integer".to_owned(),
            })?,
            None => 0,
        };
        let next = current + by;
        hash.insert(field.to_owned(), next.to_string());
        Ok(next)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        let mut entries = self.lock()?;
        let removed = match live(&mut entries, key, Instant::now()) {
            None => return Ok(false),
            Some(Entry {
                slot: Slot::Hash(h),
                ..
            }) => h.remove(field).is_some(),
            Some(_) => return Err(wrong_type("HDEL")),
        };
        if entries
            .get(key)
            .is_some_and(|e| matches!(&e.slot, Slot::Hash(h) if h.is_empty()))
        {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn gcra(
        &self,
        key: &str,
        params: &Gcra,
        mode: GcraMode,
    ) -> Result<GcraStatus, CacheError> {
        let now_micros = self.now_micros();
        let mut entries = self.lock()?;
        let now = Instant::now();
        let stored = match live(&mut entries, key, now) {
            None => None,
            Some(Entry {
                slot: Slot::Str(s), ..
            }) => s.parse::<u64>().ok(),
            Some(_) => return Err(wrong_type("GCRA")),
        };
        let (status, update) = gcra::evaluate(params, stored, now_micros, mode);
        if let Some(update) = update {
            entries.insert(
                key.to_owned(),
                Entry {
                    slot: Slot::Str(update.tat.to_string()),
                    expires_at: Some(now + update.ttl),
                },
            );
        }
        Ok(status)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), CacheError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        if live(&mut entries, key, now).is_none() {
            entries.insert(
                key.to_owned(),
                Entry {
                    slot: Slot::ZSet(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match entries.get_mut(key) {
            Some(Entry {
                slot: Slot::ZSet(z),
                ..
            }) => {
                z.insert(member.to_owned(), score);
                Ok(())
            }
            _ => Err(wrong_type("ZADD")),
        }
    }

    async fn zrange_by_score(&self, key: &str, max: f64) -> Result<Vec<String>, CacheError> {
        let mut entries = self.lock()?;
        match live(&mut entries, key, Instant::now()) {
            None => Ok(Vec::new()),
            Some(Entry {
                slot: Slot::ZSet(z),
                ..
            }) => {
                let mut due: Vec<(&String, f64)> = z
                    .iter()
                    .filter(|(_, score)| **score <= max)
                    .map(|(m, s)| (m, *s))
                    .collect();
                due.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
                Ok(due.into_iter().map(|(m, _)| m.clone()).collect())
            }
            Some(_) => Err(wrong_type("ZRANGEBYSCORE")),
        }
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let mut entries = self.lock()?;
        match live(&mut entries, key, Instant::now()) {
            None => Ok(false),
            Some(Entry {
                slot: Slot::ZSet(z),
                ..
            }) => Ok(z.remove(member).is_some()),
            Some(_) => Err(wrong_type("ZREM")),
        }
    }
}

// ─── 런타임 선택 ─────────────────────────────────────────────────────

/// 설정으로 고르는 캐시 백엔드
pub enum CacheBackend {
    Memory(MemoryCache),
    Redis(RedisCache),
}

impl CacheBackend {
    /// `[cache] backend` 값에 따라 연결합니다.
    pub async fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        match config.backend.as_str() {
            "memory" => Ok(Self::Memory(MemoryCache::new())),
            "redis" => Ok(Self::Redis(RedisCache::connect(&config.redis_url).await?)),
            other => Err(CacheError::Connection(format!(
                "unknown cache backend '{other}'"
            ))),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $cache:ident => $call:expr) => {
        match $self {
            CacheBackend::Memory($cache) => $call.await,
            CacheBackend::Redis($cache) => $call.await,
        }
    };
}

impl SharedCache for CacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        dispatch!(self, c => c.get(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        dispatch!(self, c => c.set(key, value, ttl))
    }

    async fn set_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<(), CacheError> {
        dispatch!(self, c => c.set_many(entries, ttl))
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        dispatch!(self, c => c.del(key))
    }

    async fn exists_many(&self, keys: &[String]) -> Result<Vec<bool>, CacheError> {
        dispatch!(self, c => c.exists_many(keys))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        dispatch!(self, c => c.expire(key, ttl))
    }

    async fn set_nx_get(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<Option<String>, CacheError> {
        dispatch!(self, c => c.set_nx_get(key, value, ttl))
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<(), CacheError> {
        dispatch!(self, c => c.hset(key, fields))
    }

    async fn hget_all_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<BTreeMap<String, String>>, CacheError> {
        dispatch!(self, c => c.hget_all_many(keys))
    }

    async fn hincr(&self, key: &str, field: &str, by: i64) -> Result<i64, CacheError> {
        dispatch!(self, c => c.hincr(key, field, by))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        dispatch!(self, c => c.hdel(key, field))
    }

    async fn gcra(&self, key: &str, gcra: &Gcra, mode: GcraMode) -> Result<GcraStatus, CacheError> {
        dispatch!(self, c => c.gcra(key, gcra, mode))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), CacheError> {
        dispatch!(self, c => c.zadd(key, member, score))
    }

    async fn zrange_by_score(&self, key: &str, max: f64) -> Result<Vec<String>, CacheError> {
        dispatch!(self, c => c.zrange_by_score(key, max))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        dispatch!(self, c => c.zrem(key, member))
    }
}
