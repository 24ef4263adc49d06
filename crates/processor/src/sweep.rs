//! 주기 정리 작업 -- 레이트리밋 해제와 만료 스누즈 정리
//!
//! 여러 복제본 중 분산 락을 쥔 하나만 실행합니다.
//!
//! 해제 스윕은 `ratelimit:active`에서 예상 해제 시각이 지난 셀을 읽어 GCRA를
//! inspect합니다. 아직 제한 중이면 새 해제 시각으로 다시 등록하고, 풀렸으면
//! 이력 문서를 닫은 뒤 상태 해시와 멤버를 지웁니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use snooze_core::config::SweeperConfig;
use snooze_core::error::{PipelineError, SnoozeError};
use snooze_core::metrics as m;
use snooze_core::{HealthStatus, Service};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::store::{RATELIMIT_HISTORY_INDEX, partial};
use crate::backend::{AppContext, Backends, BulkOp, DocumentStore, SharedCache};
use crate::error::ProcessorError;
use crate::gcra::GcraMode;
use crate::lock::{DistributedLock, LockOptions, run_periodic};
use crate::pipeline::Manager;
use crate::stage::RatelimitRule;
use crate::stage::ratelimit::{ACTIVE_SET_KEY, ActiveCell};
use crate::stage::snooze::SnoozeRegistry;

/// 스윕 한 번의 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// 닫힌 제한 구간
    pub closed: usize,
    /// 아직 제한 중이라 다시 등록된 셀
    pub extended: usize,
    /// 만료 처리된 스누즈
    pub snoozes_expired: u64,
}

/// 해제 시각이 지난 레이트리밋 셀을 정리합니다.
pub async fn sweep_ratelimits<B: Backends>(
    ctx: &AppContext<B>,
    rules: &[RatelimitRule],
    now: DateTime<Utc>,
) -> Result<SweepReport, ProcessorError> {
    let now_ms = now.timestamp_millis();
    let due = ctx
        .cache
        .zrange_by_score(ACTIVE_SET_KEY, now_ms as f64)
        .await?;

    let mut report = SweepReport::default();
    let mut closing = Vec::new();
    for member in due {
        let cell: ActiveCell = match serde_json::from_str(&member) {
            Ok(cell) => cell,
            Err(e) => {
                warn!(member = %member, error = %e, "removing malformed ratelimit member");
                ctx.cache.zrem(ACTIVE_SET_KEY, &member).await?;
                continue;
            }
        };

        // 규칙이 사라졌으면 바로 닫음
        if let Some(rule) = rules.iter().find(|r| r.name == cell.rule) {
            let status = ctx
                .cache
                .gcra(&cell.cell_key(), &rule.gcra(), GcraMode::Inspect)
                .await?;
            if status.limited {
                let wait = status
                    .retry_after
                    .unwrap_or(Duration::ZERO)
                    .max(Duration::from_secs(1));
                ctx.cache
                    .zadd(ACTIVE_SET_KEY, &member, (now_ms + wait.as_millis() as i64) as f64)
                    .await?;
                report.extended += 1;
                continue;
            }
        }
        closing.push((cell, member));
    }
    if closing.is_empty() {
        return Ok(report);
    }

    let ops = closing
        .iter()
        .map(|(cell, _)| BulkOp::Update {
            index: RATELIMIT_HISTORY_INDEX.to_owned(),
            id: cell.history_id.clone(),
            partial: partial([("active", json!(false)), ("endsAt", json!(now_ms))]),
        })
        .collect();
    ctx.store.bulk(ops).await?;

    for (cell, member) in closing {
        let key = cell.status_key();
        let fields = ctx
            .cache
            .hget_all_many(std::slice::from_ref(&key))
            .await?
            .pop()
            .unwrap_or_default();
        // 그 사이 새 구간이 열렸으면 상태 해시는 남김
        if fields.get("historyId") == Some(&cell.history_id) {
            ctx.cache.del(&key).await?;
        }
        ctx.cache.zrem(ACTIVE_SET_KEY, &member).await?;
        info!(cell = %cell, "ratelimit closed");
        metrics::counter!(m::RATELIMIT_CLOSED_TOTAL, m::LABEL_RULE => cell.rule.clone())
            .increment(1);
        report.closed += 1;
    }
    Ok(report)
}

/// 현재 파이프라인 기준으로 정리 작업 한 번을 실행합니다.
pub async fn sweep_once<B: Backends>(manager: &Manager<B>) -> Result<SweepReport, ProcessorError> {
    let pipeline = manager.get_processor();
    let ctx = manager.context();
    let now = Utc::now();

    let mut report = sweep_ratelimits(ctx, pipeline.ratelimit_rules(), now).await?;
    report.snoozes_expired = SnoozeRegistry::new(ctx.clone()).purge_expired(now).await?;
    if report != SweepReport::default() {
        debug!(?report, "sweep finished");
    }
    Ok(report)
}

/// 스위퍼 동작 설정
#[derive(Debug, Clone)]
pub struct SweeperSettings {
    pub lock_name: String,
    pub interval: Duration,
    pub retry_interval: Duration,
    pub lock: LockOptions,
}

impl SweeperSettings {
    pub fn from_config(config: &SweeperConfig) -> Self {
        Self {
            lock_name: config.lock_name.clone(),
            interval: Duration::from_secs(config.interval_secs),
            retry_interval: Duration::from_secs(config.retry_interval_secs),
            lock: LockOptions::default(),
        }
    }
}

/// 락 아래에서 주기적으로 [`sweep_once`]를 실행하는 서비스
pub struct Sweeper<B: Backends> {
    manager: Arc<Manager<B>>,
    settings: SweeperSettings,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl<B: Backends> Sweeper<B> {
    pub fn new(manager: Arc<Manager<B>>, settings: SweeperSettings) -> Self {
        Self {
            manager,
            settings,
            cancel: CancellationToken::new(),
            handle: None,
            running: Arc::default(),
        }
    }
}

impl<B: Backends> Service for Sweeper<B> {
    fn name(&self) -> &str {
        "sweeper"
    }

    async fn start(&mut self) -> Result<(), SnoozeError> {
        if self.handle.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        self.cancel = CancellationToken::new();
        let lock = DistributedLock::with_options(
            Arc::clone(&self.manager.context().cache),
            self.settings.lock_name.clone(),
            self.settings.lock,
        );
        let manager = Arc::clone(&self.manager);
        let settings = self.settings.clone();
        let cancel = self.cancel.clone();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        self.handle = Some(tokio::spawn(async move {
            info!(lock = %settings.lock_name, "sweeper started");
            run_periodic(
                &lock,
                || {
                    let manager = Arc::clone(&manager);
                    async move { sweep_once(&manager).await.map(|_| ()) }
                },
                settings.interval,
                settings.retry_interval,
                &cancel,
            )
            .await;
            running.store(false, Ordering::SeqCst);
            info!("sweeper stopped");
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SnoozeError> {
        let Some(handle) = self.handle.take() else {
            return Err(PipelineError::NotRunning.into());
        };
        self.cancel.cancel();
        handle
            .await
            .map_err(|e| PipelineError::InitFailed(format!("sweeper task failed: {e}")))?;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if self.running.load(Ordering::SeqCst) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy("not running".to_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackends;
    use crate::stage::ratelimit::status_key;
    use crate::stage::{RatelimitPolicy, RatelimitStage};
    use crate::decision::Decision;
    use snooze_core::{Group, Log};
    use std::collections::BTreeMap;

    fn sample_rules() -> Vec<RatelimitRule> {
        serde_yaml::from_str("- { name: flood, group: by-host, burst: 1, period: 2s }").unwrap()
    }

    fn sample_log() -> Log {
        let mut log = Log::default();
        log.add_group(Group::new(
            "by-host",
            BTreeMap::from([("host".to_owned(), "web-01".to_owned())]),
        ));
        log
    }

    async fn throttle(ctx: &AppContext<MemoryBackends>) -> String {
        let stage =
            RatelimitStage::new(sample_rules(), RatelimitPolicy::Abort, ctx.clone()).unwrap();
        assert_eq!(stage.process(&mut sample_log()).await, Decision::Ok);
        let mut limited = sample_log();
        assert!(matches!(stage.process(&mut limited).await, Decision::Abort(_)));
        limited.status.object_id.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn still_limited_cells_are_rescheduled() {
        let ctx = AppContext::in_memory();
        throttle(&ctx).await;

        let later = Utc::now() + chrono::Duration::seconds(10);
        let report = sweep_ratelimits(&ctx, &sample_rules(), later).await.unwrap();
        assert_eq!(report.extended, 1);
        assert_eq!(report.closed, 0);
        assert_eq!(
            ctx.cache.zrange_by_score(ACTIVE_SET_KEY, f64::MAX).await.unwrap().len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn released_cells_close_history() {
        let ctx = AppContext::in_memory();
        let history_id = throttle(&ctx).await;

        tokio::time::advance(Duration::from_secs(5)).await;
        let later = Utc::now() + chrono::Duration::seconds(10);
        let report = sweep_ratelimits(&ctx, &sample_rules(), later).await.unwrap();
        assert_eq!(report.closed, 1);

        let history = ctx
            .store
            .get(RATELIMIT_HISTORY_INDEX, &history_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(history["active"], json!(false));
        assert!(history["endsAt"].is_i64());

        let group = &sample_log().groups[0];
        let key = status_key("flood", &group.name, &group.hash);
        assert!(ctx.cache.hget_all_many(&[key]).await.unwrap()[0].is_empty());
        assert!(
            ctx.cache
                .zrange_by_score(ACTIVE_SET_KEY, f64::MAX)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn removed_rule_closes_immediately() {
        let ctx = AppContext::in_memory();
        throttle(&ctx).await;

        let later = Utc::now() + chrono::Duration::seconds(10);
        let report = sweep_ratelimits(&ctx, &[], later).await.unwrap();
        assert_eq!(report.closed, 1);
    }

    #[tokio::test]
    async fn nothing_due_is_a_noop() {
        let ctx = AppContext::<MemoryBackends>::in_memory();
        let report = sweep_ratelimits(&ctx, &sample_rules(), Utc::now()).await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(ctx.store.writes(), 0);
    }
}
