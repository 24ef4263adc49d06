//! 설정 관리 -- snooze.toml 파싱 및 런타임 설정
//!
//! [`SnoozeConfig`]는 프로세스 전체 설정을 담는 최상위 구조체입니다.
//! 파이프라인 규칙(silence, grouping, ratelimit 등)은 별도의 YAML 파일에 있으며
//! `[processor] pipeline_file`이 그 경로를 가리킵니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SNOOZE_PROCESSOR_MAX_WORKERS=100` 형식)
//! 3. 설정 파일 (`snooze.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), snooze_core::error::SnoozeError> {
//! use snooze_core::config::SnoozeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = SnoozeConfig::load("snooze.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = SnoozeConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, SnoozeError};

/// Snooze 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnoozeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 처리기(컨슈머 + 워커 풀) 설정
    #[serde(default)]
    pub processor: ProcessorConfig,
    /// 공유 캐시 설정
    #[serde(default)]
    pub cache: CacheConfig,
    /// 싱글톤 주기 작업 설정
    #[serde(default)]
    pub sweeper: SweeperConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl SnoozeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SnoozeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SnoozeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SnoozeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                SnoozeError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, SnoozeError> {
        toml::from_str(toml_str).map_err(|e| {
            SnoozeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SNOOZE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SNOOZE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SNOOZE_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "SNOOZE_GENERAL_PID_FILE");

        // Processor
        override_string(
            &mut self.processor.pipeline_file,
            "SNOOZE_PROCESSOR_PIPELINE_FILE",
        );
        override_usize(
            &mut self.processor.batch_size,
            "SNOOZE_PROCESSOR_BATCH_SIZE",
        );
        override_u64(
            &mut self.processor.batch_timeout_secs,
            "SNOOZE_PROCESSOR_BATCH_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.processor.max_workers,
            "SNOOZE_PROCESSOR_MAX_WORKERS",
        );
        override_u64(
            &mut self.processor.retry_delay_secs,
            "SNOOZE_PROCESSOR_RETRY_DELAY_SECS",
        );
        override_u64(
            &mut self.processor.fetch_backoff_ms,
            "SNOOZE_PROCESSOR_FETCH_BACKOFF_MS",
        );
        override_u64(
            &mut self.processor.future_tolerance_secs,
            "SNOOZE_PROCESSOR_FUTURE_TOLERANCE_SECS",
        );

        // Cache
        override_string(&mut self.cache.backend, "SNOOZE_CACHE_BACKEND");
        override_string(&mut self.cache.redis_url, "SNOOZE_CACHE_REDIS_URL");

        // Sweeper
        override_bool(&mut self.sweeper.enabled, "SNOOZE_SWEEPER_ENABLED");
        override_string(&mut self.sweeper.lock_name, "SNOOZE_SWEEPER_LOCK_NAME");
        override_u64(
            &mut self.sweeper.interval_secs,
            "SNOOZE_SWEEPER_INTERVAL_SECS",
        );
        override_u64(
            &mut self.sweeper.retry_interval_secs,
            "SNOOZE_SWEEPER_RETRY_INTERVAL_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "SNOOZE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "SNOOZE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "SNOOZE_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), SnoozeError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.processor.pipeline_file.is_empty() {
            return Err(invalid("processor.pipeline_file", "must not be empty"));
        }
        if self.processor.batch_size == 0 {
            return Err(invalid("processor.batch_size", "must be greater than 0"));
        }
        if self.processor.max_workers == 0 {
            return Err(invalid("processor.max_workers", "must be greater than 0"));
        }
        if self.processor.batch_timeout_secs == 0 {
            return Err(invalid(
                "processor.batch_timeout_secs",
                "must be greater than 0",
            ));
        }

        match self.cache.backend.as_str() {
            "memory" => {}
            "redis" => {
                if self.cache.redis_url.is_empty() {
                    return Err(invalid(
                        "cache.redis_url",
                        "required when cache.backend is 'redis'",
                    ));
                }
            }
            other => {
                return Err(invalid(
                    "cache.backend",
                    format!("unknown backend '{other}', expected 'memory' or 'redis'"),
                ));
            }
        }

        if self.sweeper.enabled {
            if self.sweeper.lock_name.is_empty() {
                return Err(invalid("sweeper.lock_name", "must not be empty"));
            }
            if self.sweeper.interval_secs == 0 {
                return Err(invalid("sweeper.interval_secs", "must be greater than 0"));
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> SnoozeError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 처리기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// 파이프라인 규칙 YAML 경로
    pub pipeline_file: String,
    /// 한 번에 가져올 최대 메시지 수 (워커 여유분과 함께 상한으로 쓰임)
    pub batch_size: usize,
    /// 메시지 가져오기 대기 시간 (초)
    pub batch_timeout_secs: u64,
    /// 동시에 처리할 최대 메시지 수
    pub max_workers: usize,
    /// Retry 결정 시 재전달 지연 (초)
    pub retry_delay_secs: u64,
    /// 가져오기 실패 후 대기 시간 (밀리초)
    pub fetch_backoff_ms: u64,
    /// 미래 타임스탬프 허용 오차 (초)
    pub future_tolerance_secs: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            pipeline_file: "/etc/snooze/pipeline.yaml".to_owned(),
            batch_size: 20,
            batch_timeout_secs: 1,
            max_workers: 50,
            retry_delay_secs: 30,
            fetch_backoff_ms: 500,
            future_tolerance_secs: 60,
        }
    }
}

/// 공유 캐시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 백엔드 (memory, redis)
    pub backend: String,
    /// Redis 연결 URL
    pub redis_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            redis_url: String::new(),
        }
    }
}

/// 싱글톤 주기 작업 (레이트리밋 종료 처리) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 분산 락 이름
    pub lock_name: String,
    /// 성공 후 다음 실행까지 간격 (초)
    pub interval_secs: u64,
    /// 실패 후 재시도 간격 (초)
    pub retry_interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_name: "lock:ratelimit-sweeper".to_owned(),
            interval_secs: 10,
            retry_interval_secs: 5,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
