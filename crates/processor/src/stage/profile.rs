//! Profile 단계 -- 출처별 정규식 패턴으로 로그를 분류하고 보강
//!
//! 프로필은 `switch` (필드, 값) 쌍으로 선택됩니다. 단계 생성 시 모든 스위치를
//! `(필드 경로, 값) → 프로필 목록` 맵으로 색인하므로 로그마다 프로필을 순회하지
//! 않습니다.
//!
//! ```yaml
//! profiles:
//!   - name: sshd
//!     switch: { key: identity.process, value: sshd }
//!     patterns:
//!       - name: failed-password
//!         regex: 'Failed password for (?P<user>\S+) from (?P<ip>\S+)'
//!         group_by: { host: "{{ identity.host }}", user: "{{ capture.user }}" }
//!         dropped_labels: [pid]
//! ```

use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use serde::Deserialize;
use snooze_core::{Group, Log, StatusKind};
use tracing::debug;

use super::Action;
use super::action::capture_into;
use crate::decision::Decision;
use crate::error::ProcessorError;
use crate::lang::{Captures, Field, Template};

/// 프로필 선택 조건
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchConfig {
    pub key: Field,
    pub value: String,
}

/// 메시지 패턴
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 메시지에 적용할 정규식
    pub regex: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    /// 그룹 레이블 (이름 → 템플릿)
    #[serde(default)]
    pub group_by: BTreeMap<String, Template>,
    #[serde(default)]
    pub dropped_labels: Vec<String>,
    #[serde(default)]
    pub drop: bool,
    #[serde(default)]
    pub silence: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub name: String,
    pub switch: SwitchConfig,
    #[serde(default)]
    pub patterns: Vec<PatternConfig>,
}

#[derive(Debug, Clone)]
struct Pattern {
    config: PatternConfig,
    regex: Regex,
}

#[derive(Debug, Clone)]
struct Profile {
    name: String,
    patterns: Vec<Pattern>,
}

/// 프로필 단계
#[derive(Debug, Clone, Default)]
pub struct ProfileStage {
    /// 스위치 필드 (처음 등장한 순서)
    keys: Vec<Field>,
    /// (필드 경로, 값) → 프로필 인덱스
    index: HashMap<(String, String), Vec<usize>>,
    profiles: Vec<Profile>,
}

impl ProfileStage {
    pub fn new(configs: Vec<ProfileConfig>) -> Result<Self, ProcessorError> {
        let mut stage = Self::default();
        for config in configs {
            let mut patterns = Vec::with_capacity(config.patterns.len());
            for pattern in config.patterns {
                let regex = Regex::new(&pattern.regex).map_err(|e| {
                    ProcessorError::RuleValidation {
                        section: "profiles".to_owned(),
                        rule: format!("{}.{}", config.name, pattern.name),
                        reason: format!("invalid regex: {e}"),
                    }
                })?;
                patterns.push(Pattern {
                    config: pattern,
                    regex,
                });
            }

            let id = stage.profiles.len();
            let path = config.switch.key.canonical_name().into_owned();
            if !stage.keys.iter().any(|k| k.canonical_name() == path) {
                stage.keys.push(config.switch.key.clone());
            }
            stage
                .index
                .entry((path, config.switch.value))
                .or_default()
                .push(id);
            stage.profiles.push(Profile {
                name: config.name,
                patterns,
            });
        }
        Ok(stage)
    }

    pub async fn process(&self, log: &mut Log) -> Decision {
        for key in &self.keys {
            let Ok(value) = key.extract(log) else {
                continue;
            };
            let Some(ids) = self.index.get(&(key.canonical_name().into_owned(), value)) else {
                continue;
            };
            // 값이 맞는 첫 스위치 필드의 프로필만 사용
            for &id in ids {
                let profile = &self.profiles[id];
                for pattern in &profile.patterns {
                    let mut captures = Captures::new();
                    if capture_into(&pattern.regex, &log.message, &mut captures) {
                        return apply(profile, pattern, log, captures);
                    }
                }
            }
            return Decision::Ok;
        }
        Decision::Ok
    }
}

fn apply(profile: &Profile, pattern: &Pattern, log: &mut Log, mut captures: Captures) -> Decision {
    let config = &pattern.config;
    debug!(profile = %profile.name, pattern = %config.name, "pattern matched");
    log.profile = Some(profile.name.clone());
    log.pattern = Some(config.name.clone());

    if config.drop {
        if log.status.change(StatusKind::Dropped) {
            log.status.reason = format!("Dropped by pattern '{}'", config.name);
        }
        log.status.skip_notification = true;
        log.status.skip_storage = true;
        return Decision::Done;
    }
    if config.silence {
        if log.status.change(StatusKind::Silenced) {
            log.status.reason = format!("Silenced by pattern '{}'", config.name);
        }
        log.status.skip_notification = true;
    }

    for action in &config.actions {
        action.apply(log, &mut captures);
    }

    if !config.group_by.is_empty() {
        let labels: BTreeMap<String, String> = config
            .group_by
            .iter()
            .map(|(k, t)| (k.clone(), t.render(log, &captures)))
            .collect();
        log.add_group(Group::new(
            format!("{}.{}", profile.name, config.name),
            labels,
        ));
    }

    for label in &config.dropped_labels {
        log.labels.remove(label);
    }
    Decision::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stage() -> ProfileStage {
        let configs: Vec<ProfileConfig> = serde_yaml::from_str(
            r#"
- name: sshd
  switch: { key: identity.process, value: sshd }
  patterns:
    - name: failed-password
      regex: 'Failed password for (?P<user>\S+) from (?P<ip>\S+)'
      actions:
        - set: { labels: { user: "{{ capture.user }}" } }
      group_by: { host: "{{ identity.host }}", user: "{{ capture.user }}" }
      dropped_labels: [pid]
    - name: session-noise
      regex: 'session (opened|closed)'
      drop: true
    - name: accepted
      regex: 'Accepted publickey'
      silence: true
- name: cron
  switch: { key: source.name, value: cron }
  patterns:
    - name: any
      regex: '.*'
"#,
        )
        .unwrap();
        ProfileStage::new(configs).unwrap()
    }

    fn sample_log(process: &str, message: &str) -> Log {
        let mut log = Log {
            message: message.to_owned(),
            ..Log::default()
        };
        log.identity.insert("process".to_owned(), process.to_owned());
        log.identity.insert("host".to_owned(), "bastion".to_owned());
        log.labels.insert("pid".to_owned(), "77".to_owned());
        log
    }

    #[tokio::test]
    async fn matching_pattern_enriches_and_groups() {
        let stage = sample_stage();
        let mut log = sample_log("sshd", "Failed password for root from 10.1.1.1 port 22");

        assert_eq!(stage.process(&mut log).await, Decision::Ok);
        assert_eq!(log.profile.as_deref(), Some("sshd"));
        assert_eq!(log.pattern.as_deref(), Some("failed-password"));
        assert_eq!(log.labels.get("user").map(String::as_str), Some("root"));
        assert!(!log.labels.contains_key("pid"));

        let group = log.group("sshd.failed-password").unwrap();
        assert_eq!(group.labels.get("host").map(String::as_str), Some("bastion"));
        assert_eq!(group.labels.get("user").map(String::as_str), Some("root"));
    }

    #[tokio::test]
    async fn drop_pattern_stops_pipeline() {
        let stage = sample_stage();
        let mut log = sample_log("sshd", "pam_unix: session opened for user git");

        assert_eq!(stage.process(&mut log).await, Decision::Done);
        assert_eq!(log.status.kind, StatusKind::Dropped);
        assert!(log.status.skip_storage && log.status.skip_notification);
        assert_eq!(log.status.reason, "Dropped by pattern 'session-noise'");
    }

    #[tokio::test]
    async fn silence_pattern_continues() {
        let stage = sample_stage();
        let mut log = sample_log("sshd", "Accepted publickey for deploy");

        assert_eq!(stage.process(&mut log).await, Decision::Ok);
        assert_eq!(log.status.kind, StatusKind::Silenced);
        assert!(log.status.skip_notification);
    }

    #[tokio::test]
    async fn unknown_switch_value_is_untouched() {
        let stage = sample_stage();
        let mut log = sample_log("nginx", "Failed password for root from 10.1.1.1");
        let before = log.clone();

        assert_eq!(stage.process(&mut log).await, Decision::Ok);
        assert_eq!(log, before);
    }

    #[tokio::test]
    async fn second_switch_key_is_consulted() {
        let stage = sample_stage();
        let mut log = Log {
            message: "job done".to_owned(),
            ..Log::default()
        };
        log.source.name = "cron".to_owned();

        stage.process(&mut log).await;
        assert_eq!(log.profile.as_deref(), Some("cron"));
        assert_eq!(log.pattern.as_deref(), Some("any"));
    }

    #[test]
    fn invalid_regex_is_rejected_with_context() {
        let configs: Vec<ProfileConfig> = serde_yaml::from_str(
            "- { name: p, switch: { key: message, value: x }, patterns: [{ name: bad, regex: '(' }] }",
        )
        .unwrap();
        let err = ProfileStage::new(configs).unwrap_err();
        assert!(err.to_string().contains("p.bad"));
    }
}
