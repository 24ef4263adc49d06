//! 에러 타입 -- 도메인별 에러 정의

/// Snooze 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum SnoozeError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 공유 캐시 에러
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// 문서 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 메시지 큐 / 알림 발행 에러
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("not running")]
    NotRunning,
}

/// 공유 캐시 에러
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 명령 실행 실패
    #[error("command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    /// 응답 형식이 예상과 다름
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// 문서 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 문서를 찾을 수 없음
    #[error("document not found: {index}/{id}")]
    NotFound { index: String, id: String },
}

/// 메시지 큐 / 알림 발행 에러
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// 메시지 가져오기 실패
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// 응답(ack/nak/term) 전송 실패
    #[error("acknowledge failed: {0}")]
    Acknowledge(String),

    /// 발행 실패
    #[error("publish to '{subject}' failed: {reason}")]
    Publish { subject: String, reason: String },

    /// 큐가 닫힘
    #[error("queue closed")]
    Closed,
}
