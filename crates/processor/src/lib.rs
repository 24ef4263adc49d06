#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`lang`]: 조건식, 필드 경로, 템플릿
//! - [`schedule`]: 일/주 단위 시간 창
//! - [`gcra`]: GCRA 레이트리밋 계산
//! - [`backend`]: 큐, 공유 캐시(인메모리/Redis), 문서 저장소, 알림 채널
//! - [`lock`]: 공유 캐시 기반 분산 락과 주기 작업
//! - [`stage`]: 파이프라인 단계 (transform ~ store)
//! - [`config`]: 파이프라인 규칙 YAML
//! - [`pipeline`]: 파이프라인 실행과 핫 리로드 관리자
//! - [`pool`], [`consumer`]: 워커 슬롯과 큐 컨슈머
//! - [`sweep`]: 레이트리밋 해제 / 스누즈 만료 정리
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Queue ─fetch→ Consumer ─spawn→ Pipeline::process ─→ ack / nak / term
//!                                   │
//!                  SharedCache ◄────┼────► DocumentStore
//!                                   ▼
//!                               Notifier (NOTIFY.<queue>)
//! ```

pub mod backend;
pub mod config;
pub mod consumer;
pub mod decision;
pub mod error;
pub mod gcra;
pub mod lang;
pub mod lock;
pub mod pipeline;
pub mod pool;
pub mod schedule;
pub mod stage;
pub mod sweep;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{Manager, Pipeline};

// 설정
pub use config::PipelineConfig;

// 결정 / 에러
pub use decision::Decision;
pub use error::ProcessorError;

// 백엔드
pub use backend::{AppContext, Backends, MemoryBackends};

// 실행
pub use consumer::{Consumer, ConsumerSettings};
pub use pool::WorkerPool;
pub use sweep::{Sweeper, SweeperSettings};
