//! 동시 처리 수 제한

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 세마포어 기반 워커 슬롯
///
/// 허가(permit)가 드롭되면 슬롯이 반환됩니다.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl WorkerPool {
    /// `max`개 슬롯을 가진 풀 (최소 1)
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// 사용 중인 슬롯 수
    pub fn busy(&self) -> usize {
        self.max - self.semaphore.available_permits()
    }

    /// 빈 슬롯이 하나 이상 생길 때까지 기다린 뒤 빈 슬롯 수를 돌려줍니다.
    pub async fn ready(&self) -> usize {
        loop {
            let free = self.semaphore.available_permits();
            if free > 0 {
                return free;
            }
            // 슬롯 하나를 잠시 잡았다 놓아 반환을 기다림
            match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => drop(permit),
                Err(_) => return 0,
            }
        }
    }

    /// 슬롯을 즉시 얻거나 `None`
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).try_acquire_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn permits_are_bounded() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.ready().await, 2);

        let a = pool.try_acquire().unwrap();
        let _b = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.busy(), 2);

        drop(a);
        assert_eq!(pool.ready().await, 1);
        assert!(pool.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn ready_waits_for_release() {
        let pool = WorkerPool::new(1);
        let permit = pool.try_acquire().unwrap();

        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.ready().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[test]
    fn zero_is_clamped() {
        assert_eq!(WorkerPool::new(0).max(), 1);
    }
}
