//! Silence 단계 -- 조건과 스케줄이 맞는 로그의 알림(또는 저장까지) 억제

use serde::Deserialize;
use snooze_core::metrics as m;
use snooze_core::{Log, StatusKind};
use tracing::debug;

use super::rule_matches;
use crate::decision::Decision;
use crate::lang::Condition;
use crate::schedule::Schedule;

/// 사일런스 규칙
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SilenceRule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "if")]
    pub condition: Condition,
    /// 생략하면 항상
    #[serde(default)]
    pub schedule: Schedule,
    /// 저장까지 생략하고 파이프라인 종료
    #[serde(default)]
    pub drop: bool,
}

/// 사일런스 단계
#[derive(Debug, Clone, Default)]
pub struct SilenceStage {
    rules: Vec<SilenceRule>,
}

impl SilenceStage {
    pub fn new(rules: Vec<SilenceRule>) -> Self {
        Self { rules }
    }

    /// 첫 번째로 맞는 규칙을 적용합니다.
    ///
    /// 스케줄은 로그의 발생 시각으로 판단합니다.
    pub async fn process(&self, log: &mut Log) -> Decision {
        let Some(rule) = self.rules.iter().find(|rule| {
            rule_matches(&rule.condition, log, "silence", &rule.name)
                && rule.schedule.matches(log.actual_time)
        }) else {
            return Decision::Ok;
        };

        let reason = format!("Silenced by '{}'", rule.name);
        if rule.drop {
            if log.status.change(StatusKind::Dropped) {
                log.status.reason = reason;
            }
            log.status.skip_notification = true;
            log.status.skip_storage = true;
            debug!(rule = %rule.name, "log dropped by silence");
            metrics::counter!(m::PROCESSOR_LOGS_BY_STATUS_TOTAL, m::LABEL_STATUS => "dropped")
                .increment(1);
            return Decision::Done;
        }

        if log.status.change(StatusKind::Silenced) {
            log.status.reason = reason;
        }
        log.status.skip_notification = true;
        debug!(rule = %rule.name, "log silenced");
        Decision::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_stage() -> SilenceStage {
        let rules: Vec<SilenceRule> = serde_yaml::from_str(
            r#"
- name: drop-debug
  if: 'severity_text == "debug"'
  drop: true
- name: night-maintenance
  description: nightly batch window
  if: 'identity.env == "batch"'
  schedule:
    daily: { from: "22:00", to: "06:00", timezone: Asia/Tokyo }
"#,
        )
        .unwrap();
        SilenceStage::new(rules)
    }

    fn sample_log(hour_utc: u32) -> Log {
        let mut log = Log {
            actual_time: Utc.with_ymd_and_hms(2024, 5, 1, hour_utc, 0, 0).unwrap(),
            ..Log::default()
        };
        log.identity.insert("env".to_owned(), "batch".to_owned());
        log
    }

    #[tokio::test]
    async fn drop_rule_skips_everything_and_stops() {
        let stage = sample_stage();
        let mut log = sample_log(3);
        log.severity_text = "debug".to_owned();

        assert_eq!(stage.process(&mut log).await, Decision::Done);
        assert_eq!(log.status.kind, StatusKind::Dropped);
        assert!(log.status.skip_notification);
        assert!(log.status.skip_storage);
        assert_eq!(log.status.reason, "Silenced by 'drop-debug'");
    }

    #[tokio::test]
    async fn scheduled_silence_only_inside_window() {
        let stage = sample_stage();

        // 14:00 UTC = 23:00 JST
        let mut inside = sample_log(14);
        assert_eq!(stage.process(&mut inside).await, Decision::Ok);
        assert_eq!(inside.status.kind, StatusKind::Silenced);
        assert!(inside.status.skip_notification);
        assert!(!inside.status.skip_storage);
        assert_eq!(inside.status.reason, "Silenced by 'night-maintenance'");

        // 03:00 UTC = 12:00 JST
        let mut outside = sample_log(3);
        assert_eq!(stage.process(&mut outside).await, Decision::Ok);
        assert_eq!(outside.status.kind, StatusKind::Active);
        assert!(!outside.status.skip_notification);
    }

    #[tokio::test]
    async fn silence_does_not_downgrade_higher_status() {
        let stage = sample_stage();
        let mut log = sample_log(14);
        log.status.change(StatusKind::Ratelimited);
        log.status.reason = "earlier".to_owned();

        stage.process(&mut log).await;
        assert_eq!(log.status.kind, StatusKind::Ratelimited);
        assert_eq!(log.status.reason, "earlier");
        assert!(log.status.skip_notification);
    }
}
