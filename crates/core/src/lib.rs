#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod service;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{CacheError, ConfigError, PipelineError, QueueError, SnoozeError, StorageError};

// 설정
pub use config::SnoozeConfig;

// 서비스 생명주기
pub use service::{BoxFuture, DynService, HealthStatus, Service};

// 도메인 타입
pub use hash::compute_hash;
pub use types::{
    Destination, Group, Log, Notification, Source, Status, StatusKind, TimestampWarning,
};
