//! Snooze 단계 -- 그룹 단위 일시 알림 중지
//!
//! 스누즈 항목은 캐시 해시 `snooze:<group>:<hash>`에 (스누즈 ID → JSON)으로
//! 저장되고, 같은 내용이 저장소 `v2-snoozes` 인덱스에 기록됩니다.
//! [`SnoozeRegistry`]가 항목의 등록, 취소, 만료 정리를 담당합니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use snooze_core::metrics as m;
use snooze_core::{Group, Log, StatusKind};
use tracing::{debug, info, warn};

use crate::backend::store::{SNOOZES_INDEX, partial};
use crate::backend::{AppContext, Backends, BulkOp, DocumentStore, Filter, Query, SharedCache};
use crate::decision::Decision;
use crate::error::ProcessorError;
use crate::lang::Condition;

/// 스누즈 적중 횟수 해시 (필드 = 스누즈 ID)
pub const SNOOZE_HITS_KEY: &str = "snooze:hits";

const PURGE_PAGE_SIZE: usize = 500;

/// 컴파일된 스누즈 조건 캐시 크기 (넘으면 비움)
const CONDITION_CACHE_CAPACITY: usize = 1024;

/// 그룹의 스누즈 해시 키
pub fn snooze_key(group: &str, hash: &str) -> String {
    format!("snooze:{group}:{hash}")
}

/// 캐시에 저장되는 스누즈 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnoozeLookup {
    pub id: String,
    /// 추가 조건식 원문
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub hits: u64,
}

impl SnoozeLookup {
    /// `starts_at ≤ now ≤ ends_at`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now <= self.ends_at
    }
}

/// 스누즈 단계
pub struct SnoozeStage<B: Backends> {
    ctx: AppContext<B>,
    /// 조건식 원문 → 컴파일 결과 (컴파일 실패는 `None`)
    conditions: Mutex<HashMap<String, Option<Arc<Condition>>>>,
}

impl<B: Backends> SnoozeStage<B> {
    pub fn new(ctx: AppContext<B>) -> Self {
        Self {
            ctx,
            conditions: Mutex::new(HashMap::new()),
        }
    }

    /// 캐시된 조건을 돌려주고, 없으면 한 번만 컴파일합니다.
    fn condition(&self, snooze_id: &str, source: &str) -> Option<Arc<Condition>> {
        let mut conditions = self.conditions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = conditions.get(source) {
            return cached.clone();
        }
        let compiled = match Condition::compile(source) {
            Ok(condition) => Some(Arc::new(condition)),
            Err(e) => {
                warn!(snooze = %snooze_id, error = %e, "invalid snooze condition");
                None
            }
        };
        if conditions.len() >= CONDITION_CACHE_CAPACITY {
            conditions.clear();
        }
        conditions.insert(source.to_owned(), compiled.clone());
        compiled
    }

    /// 조건이 없으면 참. 컴파일/평가 에러는 불일치로 봅니다.
    fn matches_log(&self, snooze: &SnoozeLookup, log: &Log) -> bool {
        let Some(source) = &snooze.condition else {
            return true;
        };
        let Some(condition) = self.condition(&snooze.id, source) else {
            return false;
        };
        match condition.matches(log) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(snooze = %snooze.id, error = %e, "snooze condition failed");
                false
            }
        }
    }

    pub async fn process(&self, log: &mut Log) -> Decision {
        if log.groups.is_empty() {
            return Decision::Ok;
        }
        let keys: Vec<String> = log
            .groups
            .iter()
            .map(|g| snooze_key(&g.name, &g.hash))
            .collect();
        let hashes = match self.ctx.cache.hget_all_many(&keys).await {
            Ok(hashes) => hashes,
            Err(e) => return Decision::retry(e),
        };

        let now = Utc::now();
        let Some(snooze) = hashes
            .iter()
            .flat_map(|entries| entries.values())
            .filter_map(|raw| decode(raw))
            .find(|snooze| snooze.is_active(now) && self.matches_log(snooze, log))
        else {
            return Decision::Ok;
        };

        if log.status.change(StatusKind::Snoozed) {
            log.status.reason = format!("Snoozed by '{}'", snooze.id);
            log.status.object_id = Some(snooze.id.clone());
        }
        log.status.skip_notification = true;
        debug!(snooze = %snooze.id, "log snoozed");
        metrics::counter!(m::PROCESSOR_LOGS_BY_STATUS_TOTAL, m::LABEL_STATUS => "snoozed")
            .increment(1);

        if let Err(e) = self.ctx.cache.hincr(SNOOZE_HITS_KEY, &snooze.id, 1).await {
            warn!(snooze = %snooze.id, error = %e, "failed to count snooze hit");
        }
        Decision::Ok
    }
}

fn decode(raw: &str) -> Option<SnoozeLookup> {
    match serde_json::from_str(raw) {
        Ok(snooze) => Some(snooze),
        Err(e) => {
            warn!(error = %e, "skipping malformed snooze entry");
            None
        }
    }
}

// ─── 항목 관리 ───────────────────────────────────────────────────────

/// 스누즈 항목 등록/취소/만료 정리
pub struct SnoozeRegistry<B: Backends> {
    ctx: AppContext<B>,
}

impl<B: Backends> SnoozeRegistry<B> {
    pub fn new(ctx: AppContext<B>) -> Self {
        Self { ctx }
    }

    /// 그룹에 스누즈를 등록합니다. 조건식은 미리 검증합니다.
    pub async fn insert(&self, group: &Group, snooze: &SnoozeLookup) -> Result<(), ProcessorError> {
        if let Some(source) = &snooze.condition {
            Condition::compile(source)?;
        }
        let doc = json!({
            "id": snooze.id,
            "if": snooze.condition,
            "startsAt": snooze.starts_at.timestamp_millis(),
            "endsAt": snooze.ends_at.timestamp_millis(),
            "group": group.name,
            "hash": group.hash,
            "expired": false,
        });
        self.ctx.store.upsert(SNOOZES_INDEX, &snooze.id, doc).await?;
        self.ctx
            .cache
            .hset(
                &snooze_key(&group.name, &group.hash),
                &[(snooze.id.clone(), serde_json::to_string(snooze)?)],
            )
            .await?;
        info!(snooze = %snooze.id, group = %group.name, "snooze registered");
        Ok(())
    }

    /// 스누즈를 취소합니다. 캐시 항목이 있었으면 `true`.
    pub async fn cancel(&self, group: &Group, id: &str) -> Result<bool, ProcessorError> {
        let removed = self
            .ctx
            .cache
            .hdel(&snooze_key(&group.name, &group.hash), id)
            .await?;
        self.ctx
            .store
            .update_by_query(
                SNOOZES_INDEX,
                &Query::new(vec![Filter::eq("id", id)]),
                partial([("expired", json!(true))]),
            )
            .await?;
        Ok(removed)
    }

    /// 종료 시각이 지난 항목을 캐시에서 지우고 저장소에 만료로 표시합니다.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, ProcessorError> {
        let query = Query::new(vec![
            Filter::eq("expired", false),
            Filter::lt("endsAt", now.timestamp_millis() as f64),
        ])
        .with_size(PURGE_PAGE_SIZE);

        let mut expired = 0;
        loop {
            let found = self.ctx.store.search(SNOOZES_INDEX, &query).await?;
            let mut ops = Vec::with_capacity(found.items.len());
            for doc in &found.items {
                let group = doc.source["group"].as_str().unwrap_or_default();
                let hash = doc.source["hash"].as_str().unwrap_or_default();
                self.ctx.cache.hdel(&snooze_key(group, hash), &doc.id).await?;
                // 적중 수는 만료와 함께 정리
                self.ctx.cache.hdel(SNOOZE_HITS_KEY, &doc.id).await?;
                ops.push(BulkOp::Update {
                    index: SNOOZES_INDEX.to_owned(),
                    id: doc.id.clone(),
                    partial: partial([("expired", json!(true))]),
                });
            }
            expired += ops.len() as u64;
            if !ops.is_empty() {
                self.ctx.store.bulk(ops).await?;
            }
            if !found.more {
                break;
            }
        }
        if expired > 0 {
            debug!(expired, "expired snoozes purged");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackends;
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn sample_group() -> Group {
        Group::new(
            "by-host",
            BTreeMap::from([("host".to_owned(), "db-01".to_owned())]),
        )
    }

    fn sample_log() -> Log {
        let mut log = Log {
            message: "replication lag".to_owned(),
            ..Log::default()
        };
        log.add_group(sample_group());
        log
    }

    fn sample_snooze(id: &str, from: i64, to: i64) -> SnoozeLookup {
        let now = Utc::now();
        SnoozeLookup {
            id: id.to_owned(),
            condition: None,
            starts_at: now + Duration::minutes(from),
            ends_at: now + Duration::minutes(to),
            hits: 0,
        }
    }

    fn sample_setup() -> (
        AppContext<MemoryBackends>,
        SnoozeStage<MemoryBackends>,
        SnoozeRegistry<MemoryBackends>,
    ) {
        let ctx = AppContext::in_memory();
        (
            ctx.clone(),
            SnoozeStage::new(ctx.clone()),
            SnoozeRegistry::new(ctx),
        )
    }

    #[tokio::test]
    async fn active_snooze_applies() {
        let (ctx, stage, registry) = sample_setup();
        registry
            .insert(&sample_group(), &sample_snooze("maint", -5, 60))
            .await
            .unwrap();

        let mut log = sample_log();
        assert_eq!(stage.process(&mut log).await, Decision::Ok);
        assert_eq!(log.status.kind, StatusKind::Snoozed);
        assert!(log.status.skip_notification);
        assert_eq!(log.status.object_id.as_deref(), Some("maint"));

        let hits = ctx
            .cache
            .hget_all_many(&[SNOOZE_HITS_KEY.to_owned()])
            .await
            .unwrap()
            .remove(0);
        assert_eq!(hits.get("maint").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn expired_and_future_snoozes_are_ignored() {
        let (_, stage, registry) = sample_setup();
        let group = sample_group();
        registry.insert(&group, &sample_snooze("past", -60, -5)).await.unwrap();
        registry.insert(&group, &sample_snooze("future", 5, 60)).await.unwrap();

        let mut log = sample_log();
        assert_eq!(stage.process(&mut log).await, Decision::Ok);
        assert_eq!(log.status.kind, StatusKind::Active);
        assert!(!log.status.skip_notification);
    }

    #[tokio::test]
    async fn condition_narrows_snooze() {
        let (_, stage, registry) = sample_setup();
        let mut snooze = sample_snooze("only-disk", -5, 60);
        snooze.condition = Some(r#"message =~ "disk""#.to_owned());
        registry.insert(&sample_group(), &snooze).await.unwrap();

        let mut other = sample_log();
        stage.process(&mut other).await;
        assert_eq!(other.status.kind, StatusKind::Active);

        let mut disk = sample_log();
        disk.message = "disk full".to_owned();
        stage.process(&mut disk).await;
        assert_eq!(disk.status.kind, StatusKind::Snoozed);
    }

    #[tokio::test]
    async fn condition_is_compiled_once_per_source() {
        let (ctx, stage, registry) = sample_setup();
        let group = sample_group();
        let mut snooze = sample_snooze("only-disk", -5, 60);
        snooze.condition = Some(r#"message =~ "disk""#.to_owned());
        registry.insert(&group, &snooze).await.unwrap();
        // 저장소를 거치지 않은 잘못된 조건
        let mut broken = sample_snooze("broken", -5, 60);
        broken.condition = Some(format!("{}true", "!".repeat(10_000)));
        ctx.cache
            .hset(
                &snooze_key(&group.name, &group.hash),
                &[("broken".to_owned(), serde_json::to_string(&broken).unwrap())],
            )
            .await
            .unwrap();

        for _ in 0..3 {
            let mut log = sample_log();
            stage.process(&mut log).await;
            assert_eq!(log.status.kind, StatusKind::Active);
        }
        let conditions = stage.conditions.lock().unwrap();
        assert_eq!(conditions.len(), 2);
        assert!(conditions[broken.condition.as_deref().unwrap()].is_none());
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped() {
        let (ctx, stage, registry) = sample_setup();
        let group = sample_group();
        ctx.cache
            .hset(
                &snooze_key(&group.name, &group.hash),
                &[("broken".to_owned(), "{not json".to_owned())],
            )
            .await
            .unwrap();
        registry.insert(&group, &sample_snooze("ok", -5, 5)).await.unwrap();

        let mut log = sample_log();
        stage.process(&mut log).await;
        assert_eq!(log.status.object_id.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn cache_failure_retries() {
        let (ctx, stage, _) = sample_setup();
        ctx.cache.set_failing(true);
        assert!(matches!(
            stage.process(&mut sample_log()).await,
            Decision::Retry(_)
        ));
    }

    #[tokio::test]
    async fn cancel_and_purge() {
        let (ctx, stage, registry) = sample_setup();
        let group = sample_group();
        registry.insert(&group, &sample_snooze("a", -5, 60)).await.unwrap();
        registry.insert(&group, &sample_snooze("b", -60, -1)).await.unwrap();

        assert_eq!(registry.purge_expired(Utc::now()).await.unwrap(), 1);
        assert_eq!(registry.purge_expired(Utc::now()).await.unwrap(), 0);

        assert!(registry.cancel(&group, "a").await.unwrap());
        let mut log = sample_log();
        stage.process(&mut log).await;
        assert_eq!(log.status.kind, StatusKind::Active);
        assert!(ctx.cache.is_empty());
    }

    #[tokio::test]
    async fn insert_rejects_bad_condition() {
        let (_, _, registry) = sample_setup();
        let mut snooze = sample_snooze("bad", -1, 1);
        snooze.condition = Some("message ==".to_owned());
        assert!(registry.insert(&sample_group(), &snooze).await.is_err());
        snooze.condition = Some(format!("{}true", "(".repeat(10_000)));
        assert!(registry.insert(&sample_group(), &snooze).await.is_err());
    }
}
