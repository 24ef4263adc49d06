//! 문서 저장소 -- 로그, 그룹, 스누즈, 레이트리밋 이력의 영속화
//!
//! 검색 엔진 내부는 범위 밖이며, 처리기가 쓰는 연산(색인, 부분 갱신,
//! 단순 필터 검색, 쿼리 갱신, 벌크)만 정의합니다.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::{Map, Value};
use snooze_core::error::StorageError;

/// 로그 인덱스
pub const LOGS_INDEX: &str = "v2-logs";
/// 그룹 인덱스
pub const GROUPS_INDEX: &str = "v2-groups";
/// 스누즈 인덱스
pub const SNOOZES_INDEX: &str = "v2-snoozes";
/// 레이트리밋 이력 인덱스
pub const RATELIMIT_HISTORY_INDEX: &str = "v2-ratelimit-history";

/// 검색 필터. `field`는 점으로 구분된 경로입니다.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    Lt { field: String, value: f64 },
    Gt { field: String, value: f64 },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lt(field: impl Into<String>, value: f64) -> Self {
        Self::Lt {
            field: field.into(),
            value,
        }
    }

    pub fn gt(field: impl Into<String>, value: f64) -> Self {
        Self::Gt {
            field: field.into(),
            value,
        }
    }

    fn matches(&self, doc: &Value) -> bool {
        match self {
            Self::Eq { field, value } => lookup(doc, field) == Some(value),
            Self::Lt { field, value } => {
                lookup(doc, field).and_then(Value::as_f64).is_some_and(|v| v < *value)
            }
            Self::Gt { field, value } => {
                lookup(doc, field).and_then(Value::as_f64).is_some_and(|v| v > *value)
            }
        }
    }
}

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |v, key| v.get(key))
}

/// 모든 필터를 만족하는 문서 검색 (AND)
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    /// 최대 반환 개수
    pub size: usize,
}

impl Query {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self {
            filters,
            size: 100,
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }
}

/// 저장된 문서
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub source: Value,
}

/// 검색 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub items: Vec<Document>,
    /// 조건을 만족하는 전체 문서 수
    pub total: u64,
    /// `size`를 넘어 남은 문서가 있는지
    pub more: bool,
}

/// 벌크 연산 단위
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOp {
    Index {
        index: String,
        id: Option<String>,
        doc: Value,
    },
    Upsert {
        index: String,
        id: String,
        doc: Value,
    },
    Update {
        index: String,
        id: String,
        partial: Value,
    },
    Delete {
        index: String,
        id: String,
    },
}

/// 문서 저장소 trait
pub trait DocumentStore: Send + Sync + 'static {
    /// 문서를 색인하고 문서 ID를 돌려줍니다. `id`가 없으면 새로 만듭니다.
    fn index(
        &self,
        index: &str,
        id: Option<&str>,
        doc: Value,
    ) -> impl Future<Output = Result<String, StorageError>> + Send;

    /// 문서를 통째로 쓰거나 교체합니다.
    fn upsert(
        &self,
        index: &str,
        id: &str,
        doc: Value,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// 기존 문서에 최상위 필드를 병합합니다. 문서가 없으면 `NotFound`.
    fn update(
        &self,
        index: &str,
        id: &str,
        partial: Value,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get(
        &self,
        index: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Value>, StorageError>> + Send;

    fn search(
        &self,
        index: &str,
        query: &Query,
    ) -> impl Future<Output = Result<SearchResult, StorageError>> + Send;

    /// 조건을 만족하는 모든 문서에 병합하고 갱신된 수를 돌려줍니다.
    fn update_by_query(
        &self,
        index: &str,
        query: &Query,
        partial: Value,
    ) -> impl Future<Output = Result<u64, StorageError>> + Send;

    fn bulk(&self, ops: Vec<BulkOp>) -> impl Future<Output = Result<(), StorageError>> + Send;
}

// ─── 인메모리 구현 ───────────────────────────────────────────────────

type Indices = HashMap<String, BTreeMap<String, Value>>;

/// 단일 프로세스용 인메모리 저장소
#[derive(Debug, Default)]
pub struct MemoryStore {
    indices: Mutex<Indices>,
    failing: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후 모든 연산이 연결 에러를 내도록 합니다 (장애 주입).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 지금까지 호출된 쓰기 연산 수
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// 인덱스의 문서 수
    pub fn count(&self, index: &str) -> usize {
        self.indices
            .lock()
            .map(|i| i.get(index).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// 인덱스의 모든 문서 (ID 순)
    pub fn documents(&self, index: &str) -> Vec<Document> {
        self.indices
            .lock()
            .map(|i| {
                i.get(index)
                    .map(|docs| {
                        docs.iter()
                            .map(|(id, source)| Document {
                                id: id.clone(),
                                source: source.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Indices>, StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("memory store is failing".to_owned()));
        }
        self.indices
            .lock()
            .map_err(|_| StorageError::Connection("memory store lock poisoned".to_owned()))
    }

    fn write_lock(&self) -> Result<std::sync::MutexGuard<'_, Indices>, StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.lock()
    }
}

fn merge(target: &mut Value, partial: Value) -> Result<(), StorageError> {
    let Value::Object(fields) = partial else {
        return Err(StorageError::Query("partial document must be an object".to_owned()));
    };
    match target {
        Value::Object(existing) => {
            for (k, v) in fields {
                existing.insert(k, v);
            }
        }
        other => *other = Value::Object(fields),
    }
    Ok(())
}

fn apply(indices: &mut Indices, op: BulkOp) -> Result<Option<String>, StorageError> {
    match op {
        BulkOp::Index { index, id, doc } => {
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            indices.entry(index).or_default().insert(id.clone(), doc);
            Ok(Some(id))
        }
        BulkOp::Upsert { index, id, doc } => {
            indices.entry(index).or_default().insert(id, doc);
            Ok(None)
        }
        BulkOp::Update { index, id, partial } => {
            let Some(doc) = indices.get_mut(&index).and_then(|docs| docs.get_mut(&id)) else {
                return Err(StorageError::NotFound { index, id });
            };
            merge(doc, partial)?;
            Ok(None)
        }
        BulkOp::Delete { index, id } => {
            if let Some(docs) = indices.get_mut(&index) {
                docs.remove(&id);
            }
            Ok(None)
        }
    }
}

impl DocumentStore for MemoryStore {
    async fn index(&self, index: &str, id: Option<&str>, doc: Value) -> Result<String, StorageError> {
        let mut indices = self.write_lock()?;
        let op = BulkOp::Index {
            index: index.to_owned(),
            id: id.map(str::to_owned),
            doc,
        };
        apply(&mut indices, op)?
            .ok_or_else(|| StorageError::Query("index returned no id".to_owned()))
    }

    async fn upsert(&self, index: &str, id: &str, doc: Value) -> Result<(), StorageError> {
        let mut indices = self.write_lock()?;
        let op = BulkOp::Upsert {
            index: index.to_owned(),
            id: id.to_owned(),
            doc,
        };
        apply(&mut indices, op).map(|_| ())
    }

    async fn update(&self, index: &str, id: &str, partial: Value) -> Result<(), StorageError> {
        let mut indices = self.write_lock()?;
        let op = BulkOp::Update {
            index: index.to_owned(),
            id: id.to_owned(),
            partial,
        };
        apply(&mut indices, op).map(|_| ())
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Value>, StorageError> {
        let indices = self.lock()?;
        Ok(indices.get(index).and_then(|docs| docs.get(id)).cloned())
    }

    async fn search(&self, index: &str, query: &Query) -> Result<SearchResult, StorageError> {
        let indices = self.lock()?;
        let Some(docs) = indices.get(index) else {
            return Ok(SearchResult::default());
        };
        let matched: Vec<Document> = docs
            .iter()
            .filter(|(_, doc)| query.matches(doc))
            .map(|(id, source)| Document {
                id: id.clone(),
                source: source.clone(),
            })
            .collect();
        let total = matched.len();
        Ok(SearchResult {
            more: total > query.size,
            total: total as u64,
            items: matched.into_iter().take(query.size).collect(),
        })
    }

    async fn update_by_query(
        &self,
        index: &str,
        query: &Query,
        partial: Value,
    ) -> Result<u64, StorageError> {
        let mut indices = self.write_lock()?;
        let Some(docs) = indices.get_mut(index) else {
            return Ok(0);
        };
        let mut updated = 0;
        for doc in docs.values_mut().filter(|doc| query.matches(doc)) {
            merge(doc, partial.clone())?;
            updated += 1;
        }
        Ok(updated)
    }

    async fn bulk(&self, ops: Vec<BulkOp>) -> Result<(), StorageError> {
        let mut indices = self.write_lock()?;
        for op in ops {
            apply(&mut indices, op)?;
        }
        Ok(())
    }
}

/// 최상위 필드 몇 개로 부분 문서를 만듭니다.
pub fn partial<const N: usize>(fields: [(&str, Value); N]) -> Value {
    let map: Map<String, Value> = fields
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect();
    Value::Object(map)
}
