//! 분산 락 -- 레플리카 중 하나만 주기 작업을 실행하도록 보장
//!
//! 공유 캐시의 `SET NX GET`으로 임대(lease)를 얻고, 백그라운드 태스크가
//! 주기적으로 소유권을 확인하며 TTL을 연장합니다. 다른 보유자가 확인되면
//! 락을 잃은 것으로 보고 연장을 멈춥니다.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use snooze_core::metrics as m;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::SharedCache;
use crate::error::ProcessorError;

/// 임대 TTL
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(10);

/// 획득 재시도 / 연장 간격
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// 락 타이밍 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub ttl: Duration,
    pub retry_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_LEASE_TTL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

struct Renewal {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// 공유 캐시 기반 분산 락
pub struct DistributedLock<C: SharedCache> {
    cache: Arc<C>,
    name: String,
    holder: String,
    options: LockOptions,
    held: Arc<AtomicBool>,
    renewal: Mutex<Option<Renewal>>,
}

impl<C: SharedCache> DistributedLock<C> {
    /// 보유자 ID는 `<hostname>:<uuid>`입니다.
    pub fn new(cache: Arc<C>, name: impl Into<String>) -> Self {
        Self::with_options(cache, name, LockOptions::default())
    }

    pub fn with_options(cache: Arc<C>, name: impl Into<String>, options: LockOptions) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_owned());
        Self {
            cache,
            name: name.into(),
            holder: format!("{host}:{}", uuid::Uuid::new_v4()),
            options,
            held: Arc::new(AtomicBool::new(false)),
            renewal: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// 현재 락을 보유하고 있다고 믿는지 여부
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// 락을 얻을 때까지 재시도합니다.
    ///
    /// 취소되면 `ProcessorError::Lock`을 돌려줍니다.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), ProcessorError> {
        loop {
            match self
                .cache
                .set_nx_get(&self.name, &self.holder, self.options.ttl)
                .await
            {
                Ok(None) => break,
                Ok(Some(current)) if current == self.holder => {
                    // 이미 보유 중 (이전 연장 태스크가 끝난 뒤 재획득)
                    if let Err(e) = self.cache.expire(&self.name, self.options.ttl).await {
                        warn!(lock = %self.name, error = %e, "failed to refresh own lock");
                    }
                    break;
                }
                Ok(Some(current)) => {
                    debug!(lock = %self.name, holder = %current, "lock held elsewhere");
                }
                Err(e) => {
                    warn!(lock = %self.name, error = %e, "lock acquisition failed");
                }
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(ProcessorError::Lock {
                        name: self.name.clone(),
                        reason: "cancelled while waiting".to_owned(),
                    });
                }
                () = tokio::time::sleep(self.options.retry_interval) => {}
            }
        }

        info!(lock = %self.name, holder = %self.holder, "lock acquired");
        self.held.store(true, Ordering::SeqCst);
        metrics::gauge!(m::LOCK_HELD, m::LABEL_LOCK => self.name.clone()).set(1.0);
        self.spawn_renewal().await;
        Ok(())
    }

    async fn spawn_renewal(&self) {
        // 이전 연장 태스크가 남아 있으면 정리
        self.stop_renewal().await;

        let stop = CancellationToken::new();
        let handle = tokio::spawn(renew(
            Arc::clone(&self.cache),
            self.name.clone(),
            self.holder.clone(),
            self.options,
            Arc::clone(&self.held),
            stop.clone(),
        ));
        if let Ok(mut slot) = self.renewal.lock() {
            *slot = Some(Renewal { stop, handle });
        }
    }

    async fn stop_renewal(&self) {
        let renewal = self.renewal.lock().ok().and_then(|mut slot| slot.take());
        if let Some(Renewal { stop, handle }) = renewal {
            stop.cancel();
            if let Err(e) = handle.await {
                warn!(lock = %self.name, error = %e, "lock renewal task failed");
            }
        }
    }

    /// 연장을 멈추고, 아직 보유자일 때만 키를 삭제합니다.
    pub async fn release(&self) -> Result<(), ProcessorError> {
        self.stop_renewal().await;
        let was_held = self.held.swap(false, Ordering::SeqCst);
        metrics::gauge!(m::LOCK_HELD, m::LABEL_LOCK => self.name.clone()).set(0.0);

        let current = self.cache.get(&self.name).await?;
        if current.as_deref() == Some(self.holder.as_str()) {
            self.cache.del(&self.name).await?;
            info!(lock = %self.name, "lock released");
        } else if was_held {
            debug!(lock = %self.name, "lock already taken over, nothing to release");
        }
        Ok(())
    }
}

async fn renew<C: SharedCache>(
    cache: Arc<C>,
    name: String,
    holder: String,
    options: LockOptions,
    held: Arc<AtomicBool>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            () = tokio::time::sleep(options.retry_interval) => {}
        }

        match cache.get(&name).await {
            Ok(Some(current)) if current == holder => {
                if let Err(e) = cache.expire(&name, options.ttl).await {
                    warn!(lock = %name, error = %e, "failed to extend lock");
                }
            }
            Ok(current) => {
                warn!(
                    lock = %name,
                    holder = current.as_deref().unwrap_or("<none>"),
                    "lost the lock"
                );
                held.store(false, Ordering::SeqCst);
                metrics::gauge!(m::LOCK_HELD, m::LABEL_LOCK => name.clone()).set(0.0);
                metrics::counter!(m::LOCK_LOST_TOTAL, m::LABEL_LOCK => name.clone()).increment(1);
                return;
            }
            Err(e) => {
                warn!(lock = %name, error = %e, "lock renewal check failed, retrying");
            }
        }
    }
}

/// 락을 쥔 채로 작업을 주기적으로 실행합니다.
///
/// 작업이 성공하면 `interval`, 실패하면 `retry_interval`만큼 쉽니다. 실패해도
/// 락은 놓지 않습니다. 락을 잃으면 다시 획득을 기다립니다. 취소되면 락을
/// 해제하고 돌아옵니다.
pub async fn run_periodic<C, F, Fut>(
    lock: &DistributedLock<C>,
    mut job: F,
    interval: Duration,
    retry_interval: Duration,
    cancel: &CancellationToken,
) where
    C: SharedCache,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ProcessorError>>,
{
    while !cancel.is_cancelled() {
        if !lock.is_held() && lock.acquire(cancel).await.is_err() {
            break;
        }

        let pause = match job().await {
            Ok(()) => interval,
            Err(e) => {
                warn!(lock = %lock.name(), error = %e, "periodic job failed");
                retry_interval
            }
        };

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(pause) => {}
        }
    }

    if let Err(e) = lock.release().await {
        warn!(lock = %lock.name(), error = %e, "failed to release lock");
    }
}
