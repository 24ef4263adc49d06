//! 파이프라인과 핫 리로드 관리자
//!
//! [`Pipeline`]은 규칙 설정에서 만든 단계들을 고정된 순서로 실행합니다.
//! [`Manager`]는 현재 파이프라인을 `Arc`로 보관하고, 리로드 시 새 파이프라인을
//! 만든 뒤 포인터만 교체합니다. 처리 중인 로그는 시작할 때 받은 파이프라인으로
//! 끝까지 처리됩니다.
//!
//! ```text
//! transform → silence → profile → grouping → ratelimit → snooze
//!           → activecheck → notification → store
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use snooze_core::Log;
use snooze_core::metrics as m;
use tracing::{info, trace, warn};

use crate::backend::{AppContext, Backends};
use crate::config::PipelineConfig;
use crate::decision::Decision;
use crate::error::ProcessorError;
use crate::stage::{
    ActiveCheckStage, GroupingStage, NotificationStage, ProfileStage, RatelimitRule,
    RatelimitStage, SilenceStage, SnoozeStage, StoreStage, TransformStage,
};

/// 구성된 처리 파이프라인
pub struct Pipeline<B: Backends> {
    transform: TransformStage,
    silence: SilenceStage,
    profile: ProfileStage,
    grouping: GroupingStage<B>,
    ratelimit: RatelimitStage<B>,
    snooze: SnoozeStage<B>,
    activecheck: ActiveCheckStage<B>,
    notification: NotificationStage<B>,
    store: StoreStage<B>,
}

impl<B: Backends> Pipeline<B> {
    /// 검증된 설정으로 파이프라인을 만듭니다.
    pub fn build(config: PipelineConfig, ctx: AppContext<B>) -> Result<Self, ProcessorError> {
        config.validate()?;
        Ok(Self {
            transform: TransformStage::new(config.transforms),
            silence: SilenceStage::new(config.silences),
            profile: ProfileStage::new(config.profiles)?,
            grouping: GroupingStage::new(config.groupings, ctx.clone())?,
            ratelimit: RatelimitStage::new(
                config.ratelimits,
                config.ratelimit_policy,
                ctx.clone(),
            )?,
            snooze: SnoozeStage::new(ctx.clone()),
            activecheck: ActiveCheckStage::new(ctx.clone()),
            notification: NotificationStage::new(
                config.notifications,
                config.default_destinations,
                ctx.clone(),
            ),
            store: StoreStage::new(ctx),
        })
    }

    /// 레이트리밋 규칙 (해제 스윕에서 사용)
    pub fn ratelimit_rules(&self) -> &[RatelimitRule] {
        self.ratelimit.rules()
    }

    /// 단계를 순서대로 실행하고 첫 번째 비-`Ok` 결정에서 멈춥니다.
    pub async fn process(&self, log: &mut Log) -> Decision {
        let decision = self.run_stages(log).await;
        metrics::counter!(m::PROCESSOR_LOGS_PROCESSED_TOTAL, m::LABEL_OUTCOME => decision.outcome())
            .increment(1);
        decision
    }

    async fn run_stages(&self, log: &mut Log) -> Decision {
        macro_rules! run {
            ($name:literal, $stage:expr) => {{
                let started = Instant::now();
                let decision = $stage.process(log).await;
                metrics::histogram!(m::PROCESSOR_STAGE_DURATION_SECONDS, m::LABEL_STAGE => $name)
                    .record(started.elapsed().as_secs_f64());
                if !decision.is_continue() {
                    trace!(stage = $name, decision = %decision, "pipeline stopped");
                    return decision;
                }
            }};
        }

        run!("transform", self.transform);
        run!("silence", self.silence);
        run!("profile", self.profile);
        run!("grouping", self.grouping);
        run!("ratelimit", self.ratelimit);
        run!("snooze", self.snooze);
        run!("activecheck", self.activecheck);
        run!("notification", self.notification);
        run!("store", self.store);
        Decision::Ok
    }
}

// ─── Manager ─────────────────────────────────────────────────────────

/// 현재 파이프라인 보관과 리로드
pub struct Manager<B: Backends> {
    source: PathBuf,
    ctx: AppContext<B>,
    current: Mutex<Arc<Pipeline<B>>>,
}

impl<B: Backends> Manager<B> {
    /// 규칙 파일을 읽어 첫 파이프라인을 만듭니다.
    pub async fn new(source: impl Into<PathBuf>, ctx: AppContext<B>) -> Result<Self, ProcessorError> {
        let source = source.into();
        let pipeline = Self::load(&source, &ctx).await?;
        Ok(Self {
            source,
            ctx,
            current: Mutex::new(Arc::new(pipeline)),
        })
    }

    async fn load(source: &Path, ctx: &AppContext<B>) -> Result<Pipeline<B>, ProcessorError> {
        let config = PipelineConfig::load_file(source).await?;
        let rules = config.rule_count();
        let pipeline = Pipeline::build(config, ctx.clone())?;
        info!(source = %source.display(), rules, "pipeline loaded");
        Ok(pipeline)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn context(&self) -> &AppContext<B> {
        &self.ctx
    }

    /// 현재 파이프라인
    pub fn get_processor(&self) -> Arc<Pipeline<B>> {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    /// 규칙 파일을 다시 읽어 파이프라인을 교체합니다.
    ///
    /// 실패하면 현재 파이프라인을 유지하고 에러를 돌려줍니다.
    pub async fn reload(&self) -> Result<(), ProcessorError> {
        match Self::load(&self.source, &self.ctx).await {
            Ok(pipeline) => {
                *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(pipeline);
                metrics::counter!(m::PROCESSOR_PIPELINE_RELOADS_TOTAL, m::LABEL_RESULT => "success")
                    .increment(1);
                Ok(())
            }
            Err(e) => {
                warn!(source = %self.source.display(), error = %e, "pipeline reload failed, keeping current pipeline");
                metrics::counter!(m::PROCESSOR_PIPELINE_RELOADS_TOTAL, m::LABEL_RESULT => "failure")
                    .increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackends;
    use crate::backend::store::LOGS_INDEX;
    use snooze_core::StatusKind;

    const SAMPLE: &str = r#"
silences:
  - name: drop-debug
    if: 'severity_text == "debug"'
    drop: true
groupings:
  - name: by-host
    group_by: [identity.host]
default_destinations:
  - { queue: mail }
"#;

    fn sample_pipeline(ctx: &AppContext<MemoryBackends>) -> Pipeline<MemoryBackends> {
        let config = PipelineConfig::parse(SAMPLE, "sample").unwrap();
        Pipeline::build(config, ctx.clone()).unwrap()
    }

    fn sample_log(severity: &str) -> Log {
        let mut log = Log {
            severity_text: severity.to_owned(),
            message: "something happened".to_owned(),
            ..Log::default()
        };
        log.identity.insert("host".to_owned(), "web-01".to_owned());
        log
    }

    #[tokio::test]
    async fn full_pass_notifies_and_stores() {
        let ctx = AppContext::in_memory();
        let pipeline = sample_pipeline(&ctx);
        let mut log = sample_log("error");

        assert_eq!(pipeline.process(&mut log).await, Decision::Ok);
        assert_eq!(log.groups.len(), 1);
        assert!(log.id.is_some());
        assert_eq!(ctx.store.count(LOGS_INDEX), 1);
        assert_eq!(ctx.notifier.notifications().len(), 1);
    }

    #[tokio::test]
    async fn drop_silence_stops_before_store() {
        let ctx = AppContext::in_memory();
        let pipeline = sample_pipeline(&ctx);
        let mut log = sample_log("debug");

        assert_eq!(pipeline.process(&mut log).await, Decision::Done);
        assert_eq!(log.status.kind, StatusKind::Dropped);
        assert_eq!(ctx.store.writes(), 0);
        assert!(ctx.notifier.published().is_empty());
    }

    #[tokio::test]
    async fn infrastructure_error_retries() {
        let ctx = AppContext::in_memory();
        let pipeline = sample_pipeline(&ctx);
        ctx.store.set_failing(true);

        assert!(matches!(
            pipeline.process(&mut sample_log("error")).await,
            Decision::Retry(_)
        ));
    }

    #[tokio::test]
    async fn reload_swaps_and_keeps_current_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let manager = Manager::<MemoryBackends>::new(&path, AppContext::in_memory())
            .await
            .unwrap();
        let first = manager.get_processor();

        std::fs::write(&path, "silences: []").unwrap();
        manager.reload().await.unwrap();
        let second = manager.get_processor();
        assert!(!Arc::ptr_eq(&first, &second));

        std::fs::write(&path, "silences: [").unwrap();
        assert!(manager.reload().await.is_err());
        assert!(Arc::ptr_eq(&second, &manager.get_processor()));
    }

    #[tokio::test]
    async fn missing_file_fails_construction() {
        let result =
            Manager::<MemoryBackends>::new("/nonexistent/pipeline.yaml", AppContext::in_memory())
                .await;
        assert!(result.is_err());
    }
}
