//! 단계 처리 결과

use std::fmt;

/// 파이프라인 단계의 처리 결정
///
/// `Ok`만 다음 단계로 진행합니다. 나머지는 파이프라인을 멈추고
/// 컨슈머가 큐 응답을 정합니다.
///
/// | 결정 | 큐 응답 |
/// |------|---------|
/// | `Ok`, `Done` | ack |
/// | `Retry` | nak (지연 재전달) |
/// | `Abort` | term (독성 메시지 제거) |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// 다음 단계로 진행
    Ok,
    /// 에러 없이 처리 종료
    Done,
    /// 일시적 실패, 나중에 재시도
    Retry(String),
    /// 영구 실패, 재시도하지 않음
    Abort(String),
}

impl Decision {
    /// 재시도 결정을 만듭니다.
    pub fn retry(err: impl fmt::Display) -> Self {
        Self::Retry(err.to_string())
    }

    /// 중단 결정을 만듭니다.
    pub fn abort(err: impl fmt::Display) -> Self {
        Self::Abort(err.to_string())
    }

    /// 다음 단계로 진행하는지 여부
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// 메트릭 레이블용 이름
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Done => "done",
            Self::Retry(_) => "retry",
            Self::Abort(_) => "abort",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Done => f.write_str("done"),
            Self::Retry(reason) => write!(f, "retry: {reason}"),
            Self::Abort(reason) => write!(f, "abort: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ok_continues() {
        assert!(Decision::Ok.is_continue());
        assert!(!Decision::Done.is_continue());
        assert!(!Decision::retry("x").is_continue());
        assert!(!Decision::abort("x").is_continue());
    }

    #[test]
    fn display_includes_reason() {
        assert_eq!(Decision::retry("cache down").to_string(), "retry: cache down");
        assert_eq!(Decision::abort("throttled").outcome(), "abort");
    }
}
