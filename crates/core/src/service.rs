//! 서비스 생명주기 trait -- 데몬이 관리하는 장기 실행 컴포넌트
//!
//! 큐 컨슈머와 주기 작업(sweeper)이 [`Service`]를 구현하고,
//! 데몬은 [`DynService`] 트레이트 객체로 이들을 한 목록에서 관리합니다.
//!
//! # 생명주기
//! ```text
//! Created → start() → Running → stop() → Stopped
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::SnoozeError;

/// 힙에 고정된 `Send` future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 컴포넌트 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 여부
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 여부
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 장기 실행 서비스 trait
///
/// `start()`는 백그라운드 태스크를 띄우고 즉시 반환해야 합니다.
/// `stop()`은 새 작업 수락을 멈추고 루프가 끝날 때까지 기다립니다.
pub trait Service: Send + Sync {
    /// 서비스 이름 (로그, 건강 보고용)
    fn name(&self) -> &str;

    /// 서비스를 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), SnoozeError>> + Send;

    /// 서비스를 정지합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), SnoozeError>> + Send;

    /// 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// [`Service`]의 dyn-compatible 버전
///
/// `impl Future` 반환 메서드는 트레이트 객체로 쓸 수 없으므로
/// `BoxFuture`로 감싼 버전을 제공합니다. 모든 `Service` 구현체에
/// 자동으로 구현됩니다.
pub trait DynService: Send + Sync {
    fn name(&self) -> &str;

    fn start(&mut self) -> BoxFuture<'_, Result<(), SnoozeError>>;

    fn stop(&mut self) -> BoxFuture<'_, Result<(), SnoozeError>>;

    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Service> DynService for T {
    fn name(&self) -> &str {
        Service::name(self)
    }

    fn start(&mut self) -> BoxFuture<'_, Result<(), SnoozeError>> {
        Box::pin(Service::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), SnoozeError>> {
        Box::pin(Service::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Service::health_check(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    struct CountingService {
        running: bool,
        starts: usize,
    }

    impl Service for CountingService {
        fn name(&self) -> &str {
            "counting"
        }

        async fn start(&mut self) -> Result<(), SnoozeError> {
            if self.running {
                return Err(PipelineError::AlreadyRunning.into());
            }
            self.running = true;
            self.starts += 1;
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), SnoozeError> {
            if !self.running {
                return Err(PipelineError::NotRunning.into());
            }
            self.running = false;
            Ok(())
        }

        async fn health_check(&self) -> HealthStatus {
            if self.running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy("stopped".to_owned())
            }
        }
    }

    #[tokio::test]
    async fn dyn_service_delegates_to_service() {
        let mut svc: Box<dyn DynService> = Box::new(CountingService {
            running: false,
            starts: 0,
        });
        assert_eq!(svc.name(), "counting");
        assert!(svc.health_check().await.is_unhealthy());

        svc.start().await.unwrap();
        assert!(svc.health_check().await.is_healthy());
        assert!(svc.start().await.is_err());

        svc.stop().await.unwrap();
        assert!(svc.stop().await.is_err());
    }

    #[test]
    fn health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(
            HealthStatus::Degraded("slow".to_owned()).to_string(),
            "degraded: slow"
        );
    }
}
