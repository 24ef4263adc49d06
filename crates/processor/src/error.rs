//! 처리기 에러 타입
//!
//! [`ProcessorError`]는 파이프라인 구성과 실행 중 발생하는 모든 에러를 표현합니다.
//! `From<ProcessorError> for SnoozeError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use snooze_core::error::{
    CacheError, ConfigError, PipelineError, QueueError, SnoozeError, StorageError,
};

use crate::lang::LangError;

/// 처리기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// 파이프라인 규칙 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 규칙 유효성 검증 실패
    #[error("rule validation error: {section} '{rule}': {reason}")]
    RuleValidation {
        /// 규칙 구역 (silences, ratelimits ...)
        section: String,
        /// 문제가 된 규칙 이름
        rule: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 조건식 / 필드 / 템플릿 에러
    #[error("lang error: {0}")]
    Lang(#[from] LangError),

    /// 스케줄 정의 에러
    #[error("schedule error: {0}")]
    Schedule(String),

    /// 공유 캐시 에러
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// 문서 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 큐 / 알림 발행 에러
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// 분산 락 에러
    #[error("lock '{name}': {reason}")]
    Lock {
        /// 락 이름
        name: String,
        /// 실패 사유
        reason: String,
    },

    /// 직렬화 에러
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessorError> for SnoozeError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::Cache(e) => SnoozeError::Cache(e),
            ProcessorError::Storage(e) => SnoozeError::Storage(e),
            ProcessorError::Queue(e) => SnoozeError::Queue(e),
            ProcessorError::Io(e) => SnoozeError::Io(e),
            ProcessorError::RuleLoad { path, reason } => {
                SnoozeError::Config(ConfigError::ParseFailed {
                    reason: format!("{path}: {reason}"),
                })
            }
            ProcessorError::RuleValidation {
                section,
                rule,
                reason,
            } => SnoozeError::Config(ConfigError::InvalidValue {
                field: format!("{section}.{rule}"),
                reason,
            }),
            other => SnoozeError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_validation_error_display() {
        let err = ProcessorError::RuleValidation {
            section: "ratelimits".to_owned(),
            rule: "noisy".to_owned(),
            reason: "period must be at least 1s".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ratelimits"));
        assert!(msg.contains("noisy"));
        assert!(msg.contains("at least 1s"));
    }

    #[test]
    fn converts_cache_error_to_snooze_error() {
        let err = ProcessorError::Cache(CacheError::Connection("refused".to_owned()));
        let snooze: SnoozeError = err.into();
        assert!(matches!(snooze, SnoozeError::Cache(_)));
    }

    #[test]
    fn converts_rule_validation_to_config_error() {
        let err = ProcessorError::RuleValidation {
            section: "silences".to_owned(),
            rule: "night".to_owned(),
            reason: "bad".to_owned(),
        };
        let snooze: SnoozeError = err.into();
        assert!(matches!(
            snooze,
            SnoozeError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "silences.night"
        ));
    }

    #[test]
    fn converts_lock_error_to_pipeline_error() {
        let err = ProcessorError::Lock {
            name: "sweeper".to_owned(),
            reason: "cancelled".to_owned(),
        };
        let snooze: SnoozeError = err.into();
        assert!(matches!(snooze, SnoozeError::Pipeline(_)));
    }
}
