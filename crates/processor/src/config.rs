//! 파이프라인 규칙 설정
//!
//! 파이프라인 규칙은 YAML 문서 하나로 정의됩니다. 조건식, 필드 경로,
//! 템플릿, 스케줄, 액션은 역직렬화 시점에 컴파일되므로 여기서는 구역 간
//! 관계(이름 중복, 그룹 참조)만 검증합니다.
//!
//! ```yaml
//! transforms: [...]
//! silences: [...]
//! profiles: [...]
//! groupings: [...]
//! ratelimits: [...]
//! notifications: [...]
//! default_destinations:
//!   - { queue: mail, profile: default }
//! ratelimit_policy: abort
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use snooze_core::Destination;

use crate::error::ProcessorError;
use crate::stage::{
    GroupingRule, NotificationRule, ProfileConfig, RatelimitPolicy, RatelimitRule, SilenceRule,
    TransformRule,
};

/// 규칙 파일 최대 크기
const MAX_PIPELINE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// 파이프라인 규칙 전체
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub transforms: Vec<TransformRule>,
    pub silences: Vec<SilenceRule>,
    pub profiles: Vec<ProfileConfig>,
    pub groupings: Vec<GroupingRule>,
    pub ratelimits: Vec<RatelimitRule>,
    pub notifications: Vec<NotificationRule>,
    /// 맞는 알림 규칙이 없을 때의 목적지
    pub default_destinations: Vec<Destination>,
    pub ratelimit_policy: RatelimitPolicy,
}

impl PipelineConfig {
    /// 규칙 파일을 읽고 검증합니다.
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Self, ProcessorError> {
        let path = path.as_ref();
        let source = path.display().to_string();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ProcessorError::RuleLoad {
                path: source.clone(),
                reason: format!("failed to read file metadata: {e}"),
            })?;
        if metadata.len() > MAX_PIPELINE_FILE_SIZE {
            return Err(ProcessorError::RuleLoad {
                path: source,
                reason: format!(
                    "file too large: {} bytes (max: {MAX_PIPELINE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ProcessorError::RuleLoad {
                    path: source.clone(),
                    reason: format!("failed to read file: {e}"),
                })?;

        Self::parse(&content, &source)
    }

    /// YAML 문자열을 파싱하고 검증합니다. `source`는 에러 메시지용입니다.
    pub fn parse(yaml: &str, source: &str) -> Result<Self, ProcessorError> {
        // 빈 문서는 빈 파이프라인
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ProcessorError::RuleLoad {
            path: source.to_owned(),
            reason: format!("YAML parse error: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 구역별 이름 유일성과 레이트리밋 그룹 참조를 검증합니다.
    pub fn validate(&self) -> Result<(), ProcessorError> {
        unique_names("transforms", self.transforms.iter().map(|r| r.name.as_str()))?;
        unique_names("silences", self.silences.iter().map(|r| r.name.as_str()))?;
        unique_names("profiles", self.profiles.iter().map(|p| p.name.as_str()))?;
        for profile in &self.profiles {
            unique_names(
                "profiles",
                profile.patterns.iter().map(|p| p.name.as_str()),
            )?;
        }
        unique_names("groupings", self.groupings.iter().map(|r| r.name.as_str()))?;
        unique_names("ratelimits", self.ratelimits.iter().map(|r| r.name.as_str()))?;
        unique_names(
            "notifications",
            self.notifications.iter().map(|r| r.name.as_str()),
        )?;

        let groups = self.group_names();
        for rule in &self.ratelimits {
            rule.validate()?;
            if !groups.contains(rule.group.as_str()) {
                return Err(ProcessorError::RuleValidation {
                    section: "ratelimits".to_owned(),
                    rule: rule.name.clone(),
                    reason: format!("unknown group '{}'", rule.group),
                });
            }
        }
        for rule in &self.notifications {
            if rule.destinations.is_empty() {
                return Err(ProcessorError::RuleValidation {
                    section: "notifications".to_owned(),
                    rule: rule.name.clone(),
                    reason: "at least one destination is required".to_owned(),
                });
            }
        }
        Ok(())
    }

    /// 로그가 가질 수 있는 그룹 이름 (그룹핑 규칙 + 그룹을 만드는 패턴)
    fn group_names(&self) -> HashSet<String> {
        let patterns = self.profiles.iter().flat_map(|profile| {
            profile
                .patterns
                .iter()
                .filter(|p| !p.group_by.is_empty())
                .map(move |p| format!("{}.{}", profile.name, p.name))
        });
        self.groupings
            .iter()
            .map(|g| g.name.clone())
            .chain(patterns)
            .collect()
    }

    /// 규칙 수 합계 (로그용)
    pub fn rule_count(&self) -> usize {
        self.transforms.len()
            + self.silences.len()
            + self.profiles.len()
            + self.groupings.len()
            + self.ratelimits.len()
            + self.notifications.len()
    }
}

fn unique_names<'a>(
    section: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), ProcessorError> {
    let mut seen = HashSet::new();
    for name in names {
        let reason = if name.trim().is_empty() {
            "name must not be empty"
        } else if !seen.insert(name) {
            "duplicate rule name"
        } else {
            continue;
        };
        return Err(ProcessorError::RuleValidation {
            section: section.to_owned(),
            rule: name.to_owned(),
            reason: reason.to_owned(),
        });
    }
    Ok(())
}
