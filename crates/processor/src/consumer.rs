//! 큐 컨슈머 -- 메시지를 가져와 워커 슬롯 안에서 파이프라인으로 처리
//!
//! # 처리 흐름
//! ```text
//! pool.ready() → queue.fetch(capacity) → 메시지마다 try_acquire
//!   ├─ 슬롯 없음 → nak (즉시 재전달)
//!   └─ spawn: decode → normalize → pipeline.process → ack / nak_with_delay / term
//! ```
//!
//! 정지 요청은 가져오기 루프만 멈추며, 이미 시작한 처리 태스크는 끝까지 실행됩니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use snooze_core::config::ProcessorConfig;
use snooze_core::error::{PipelineError, SnoozeError};
use snooze_core::metrics as m;
use snooze_core::{HealthStatus, Log, Service};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::backend::{Backends, Delivery, Queue};
use crate::decision::Decision;
use crate::pipeline::Manager;
use crate::pool::WorkerPool;

/// 연속 가져오기 실패가 이 수 이상이면 Degraded
const DEGRADED_FETCH_FAILURES: u64 = 3;

/// 컨슈머 동작 설정
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub max_workers: usize,
    pub retry_delay: Duration,
    pub fetch_backoff: Duration,
    pub future_tolerance: chrono::Duration,
}

impl ConsumerSettings {
    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_timeout: Duration::from_secs(config.batch_timeout_secs),
            max_workers: config.max_workers,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            fetch_backoff: Duration::from_millis(config.fetch_backoff_ms),
            future_tolerance: chrono::Duration::try_seconds(config.future_tolerance_secs as i64)
                .unwrap_or_else(chrono::Duration::zero),
        }
    }
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self::from_config(&ProcessorConfig::default())
    }
}

#[derive(Debug, Default)]
struct ConsumerStats {
    processed: AtomicU64,
    fetch_failures: AtomicU64,
    running: AtomicBool,
}

/// 가져오기 루프와 처리 태스크가 공유하는 상태
struct Worker<B: Backends, Q: Queue> {
    queue: Arc<Q>,
    manager: Arc<Manager<B>>,
    pool: WorkerPool,
    settings: ConsumerSettings,
    stats: Arc<ConsumerStats>,
}

impl<B: Backends, Q: Queue> Clone for Worker<B, Q> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            manager: Arc::clone(&self.manager),
            pool: self.pool.clone(),
            settings: self.settings.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<B: Backends, Q: Queue> Worker<B, Q> {
    async fn run(self, cancel: CancellationToken) {
        info!(max_workers = self.pool.max(), "consumer started");
        loop {
            let capacity = tokio::select! {
                free = self.pool.ready() => free,
                _ = cancel.cancelled() => break,
            };
            let max = capacity.min(self.settings.batch_size);

            let fetched = tokio::select! {
                result = self.queue.fetch(max, self.settings.batch_timeout) => result,
                _ = cancel.cancelled() => break,
            };
            let batch = match fetched {
                Ok(batch) => {
                    self.stats.fetch_failures.store(0, Ordering::Relaxed);
                    batch
                }
                Err(e) => {
                    let failures = self.stats.fetch_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(error = %e, failures, "fetch failed, backing off");
                    tokio::select! {
                        () = tokio::time::sleep(self.settings.fetch_backoff) => continue,
                        _ = cancel.cancelled() => break,
                    }
                }
            };

            for message in batch {
                let Some(permit) = self.pool.try_acquire() else {
                    metrics::counter!(m::PROCESSOR_NAKS_NO_CAPACITY_TOTAL).increment(1);
                    if let Err(e) = message.nak().await {
                        warn!(error = %e, "failed to nak message");
                    }
                    continue;
                };
                let worker = self.clone();
                tokio::spawn(async move {
                    worker.handle(message).await;
                    drop(permit);
                });
            }
            metrics::gauge!(m::PROCESSOR_WORKERS_BUSY).set(self.pool.busy() as f64);
        }
        info!("consumer stopped");
    }

    async fn handle(&self, message: Q::Message) {
        let now = Utc::now();
        if let Some(delay) = message
            .published_at()
            .and_then(|published| (now - published).to_std().ok())
        {
            metrics::histogram!(m::PROCESSOR_QUEUE_DELAY_SECONDS).record(delay.as_secs_f64());
        }

        let mut log = Log::decode(message.data(), now);
        if log.error.is_some() {
            metrics::counter!(m::PROCESSOR_DECODE_ERRORS_TOTAL).increment(1);
        }
        log.normalize_timestamps(now, self.settings.future_tolerance);

        let span = info_span!(
            "process",
            trace_id = message.headers().get("traceparent").map(String::as_str).unwrap_or_default(),
        );
        let pipeline = self.manager.get_processor();
        let decision = pipeline.process(&mut log).instrument(span).await;
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        let settled = match decision {
            Decision::Ok | Decision::Done => message.ack().await,
            Decision::Retry(reason) => {
                debug!(reason = %reason, "retrying message later");
                message.nak_with_delay(self.settings.retry_delay).await
            }
            Decision::Abort(reason) => {
                warn!(reason = %reason, "message rejected");
                message.term().await
            }
        };
        if let Err(e) = settled {
            warn!(error = %e, "failed to settle message");
        }
    }
}

/// 큐 컨슈머 서비스
pub struct Consumer<B: Backends, Q: Queue> {
    worker: Worker<B, Q>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl<B: Backends, Q: Queue> Consumer<B, Q> {
    pub fn new(queue: Arc<Q>, manager: Arc<Manager<B>>, settings: ConsumerSettings) -> Self {
        Self {
            worker: Worker {
                queue,
                manager,
                pool: WorkerPool::new(settings.max_workers),
                settings,
                stats: Arc::default(),
            },
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// 지금까지 처리한 메시지 수
    pub fn processed(&self) -> u64 {
        self.worker.stats.processed.load(Ordering::Relaxed)
    }

    /// 사용 중인 워커 슬롯 수
    pub fn busy_workers(&self) -> usize {
        self.worker.pool.busy()
    }
}

impl<B: Backends, Q: Queue> Service for Consumer<B, Q> {
    fn name(&self) -> &str {
        "consumer"
    }

    async fn start(&mut self) -> Result<(), SnoozeError> {
        if self.handle.is_some() {
            return Err(PipelineError::AlreadyRunning.into());
        }
        self.cancel = CancellationToken::new();
        self.worker.stats.running.store(true, Ordering::SeqCst);
        let worker = self.worker.clone();
        let cancel = self.cancel.clone();
        let stats = Arc::clone(&self.worker.stats);
        self.handle = Some(tokio::spawn(async move {
            worker.run(cancel).await;
            stats.running.store(false, Ordering::SeqCst);
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
            .map_err(|e| PipelineError::InitFailed(format!("consumer task failed: {e}")))?;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        if !self.worker.stats.running.load(Ordering::SeqCst) {
            return HealthStatus::Unhealthy("not running".to_owned());
        }
        let failures = self.worker.stats.fetch_failures.load(Ordering::Relaxed);
        if failures >= DEGRADED_FETCH_FAILURES {
            HealthStatus::Degraded(format!("{failures} consecutive fetch failures"))
        } else {
            HealthStatus::Healthy
        }
    }
}
