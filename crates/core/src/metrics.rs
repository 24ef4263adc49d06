//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `snooze_`
//! - 모듈명: `processor_`, `ratelimit_`, `lock_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(snooze_core::metrics::PROCESSOR_LOGS_PROCESSED_TOTAL, "outcome" => "ok").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 파이프라인 단계 레이블 키 (transform, silence, grouping ...)
pub const LABEL_STAGE: &str = "stage";

/// 처리 결과 레이블 키 (ok, done, retry, abort)
pub const LABEL_OUTCOME: &str = "outcome";

/// 로그 상태 레이블 키 (silenced, snoozed, ratelimited ...)
pub const LABEL_STATUS: &str = "status";

/// 규칙 이름 레이블 키
pub const LABEL_RULE: &str = "rule";

/// 알림 큐 레이블 키
pub const LABEL_QUEUE: &str = "queue";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 락 이름 레이블 키
pub const LABEL_LOCK: &str = "lock";

// ─── Processor 메트릭 ──────────────────────────────────────────────

/// Processor: 처리 완료된 로그 수 (counter, label: outcome)
pub const PROCESSOR_LOGS_PROCESSED_TOTAL: &str = "snooze_processor_logs_processed_total";

/// Processor: 최종 상태별 로그 수 (counter, label: status)
pub const PROCESSOR_LOGS_BY_STATUS_TOTAL: &str = "snooze_processor_logs_by_status_total";

/// Processor: 디코딩 실패 페이로드 수 (counter)
pub const PROCESSOR_DECODE_ERRORS_TOTAL: &str = "snooze_processor_decode_errors_total";

/// Processor: 단계별 처리 시간 (histogram, 초, label: stage)
pub const PROCESSOR_STAGE_DURATION_SECONDS: &str = "snooze_processor_stage_duration_seconds";

/// Processor: 큐 대기 시간 (histogram, 초)
pub const PROCESSOR_QUEUE_DELAY_SECONDS: &str = "snooze_processor_queue_delay_seconds";

/// Processor: 워커 여유가 없어 즉시 Nak된 메시지 수 (counter)
pub const PROCESSOR_NAKS_NO_CAPACITY_TOTAL: &str = "snooze_processor_naks_no_capacity_total";

/// Processor: 현재 사용 중인 워커 수 (gauge)
pub const PROCESSOR_WORKERS_BUSY: &str = "snooze_processor_workers_busy";

/// Processor: 파이프라인 리로드 수 (counter, label: result)
pub const PROCESSOR_PIPELINE_RELOADS_TOTAL: &str = "snooze_processor_pipeline_reloads_total";

/// Processor: 발행된 알림 수 (counter, label: queue)
pub const PROCESSOR_NOTIFICATIONS_SENT_TOTAL: &str = "snooze_processor_notifications_sent_total";

/// Processor: 새로 생성된 그룹 수 (counter, label: rule)
pub const PROCESSOR_GROUPS_CREATED_TOTAL: &str = "snooze_processor_groups_created_total";

// ─── Rate limit 메트릭 ─────────────────────────────────────────────

/// Rate limit: 제한된 로그 수 (counter, label: rule)
pub const RATELIMIT_THROTTLED_TOTAL: &str = "snooze_ratelimit_throttled_total";

/// Rate limit: 종료 처리된 제한 구간 수 (counter)
pub const RATELIMIT_CLOSED_TOTAL: &str = "snooze_ratelimit_closed_total";

// ─── Lock 메트릭 ───────────────────────────────────────────────────

/// Lock: 보유 여부 (gauge, 0/1, label: lock)
pub const LOCK_HELD: &str = "snooze_lock_held";

/// Lock: 보유 중 락을 잃은 횟수 (counter, label: lock)
pub const LOCK_LOST_TOTAL: &str = "snooze_lock_lost_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "snooze_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "snooze_daemon_build_info";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Processor
    describe_counter!(
        PROCESSOR_LOGS_PROCESSED_TOTAL,
        "Total number of logs processed, by pipeline outcome"
    );
    describe_counter!(
        PROCESSOR_LOGS_BY_STATUS_TOTAL,
        "Total number of processed logs, by final status"
    );
    describe_counter!(
        PROCESSOR_DECODE_ERRORS_TOTAL,
        "Total number of queue payloads that failed to decode"
    );
    describe_histogram!(
        PROCESSOR_STAGE_DURATION_SECONDS,
        "Per-stage processing latency in seconds"
    );
    describe_histogram!(
        PROCESSOR_QUEUE_DELAY_SECONDS,
        "Time between publish and processing start in seconds"
    );
    describe_counter!(
        PROCESSOR_NAKS_NO_CAPACITY_TOTAL,
        "Messages negatively acknowledged because no worker slot was free"
    );
    describe_gauge!(PROCESSOR_WORKERS_BUSY, "Number of busy worker slots");
    describe_counter!(
        PROCESSOR_PIPELINE_RELOADS_TOTAL,
        "Pipeline configuration reloads, by result"
    );
    describe_counter!(
        PROCESSOR_NOTIFICATIONS_SENT_TOTAL,
        "Notifications published, by destination queue"
    );
    describe_counter!(
        PROCESSOR_GROUPS_CREATED_TOTAL,
        "First-seen groups, by grouping rule"
    );

    // Rate limit
    describe_counter!(
        RATELIMIT_THROTTLED_TOTAL,
        "Logs throttled by a rate limit rule"
    );
    describe_counter!(
        RATELIMIT_CLOSED_TOTAL,
        "Rate limit periods closed by the sweeper"
    );

    // Lock
    describe_gauge!(LOCK_HELD, "Whether this replica holds the named lock");
    describe_counter!(LOCK_LOST_TOTAL, "Times a held lock was lost");

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        PROCESSOR_LOGS_PROCESSED_TOTAL,
        PROCESSOR_LOGS_BY_STATUS_TOTAL,
        PROCESSOR_DECODE_ERRORS_TOTAL,
        PROCESSOR_STAGE_DURATION_SECONDS,
        PROCESSOR_QUEUE_DELAY_SECONDS,
        PROCESSOR_NAKS_NO_CAPACITY_TOTAL,
        PROCESSOR_WORKERS_BUSY,
        PROCESSOR_PIPELINE_RELOADS_TOTAL,
        PROCESSOR_NOTIFICATIONS_SENT_TOTAL,
        PROCESSOR_GROUPS_CREATED_TOTAL,
        RATELIMIT_THROTTLED_TOTAL,
        RATELIMIT_CLOSED_TOTAL,
        LOCK_HELD,
        LOCK_LOST_TOTAL,
        DAEMON_UPTIME_SECONDS,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_have_snooze_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(name.starts_with("snooze_"), "{name} lacks prefix");
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names: Vec<&str> = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn counters_end_with_total() {
        for name in ALL_METRIC_NAMES {
            if name.contains("_total") {
                assert!(name.ends_with("_total"), "{name}");
            }
        }
    }

    #[test]
    fn describe_all_without_recorder_does_not_panic() {
        describe_all();
    }
}
