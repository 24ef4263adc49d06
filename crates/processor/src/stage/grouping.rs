//! Grouping 단계 -- 규칙별 그룹 계산과 최초 발견 그룹 저장
//!
//! 그룹 존재 여부는 공유 캐시의 `grouping:<name>:<hash>` 키(TTL 6시간)로 판단합니다.
//! 캐시에 없는 그룹만 저장소의 그룹 인덱스에 upsert하므로 같은 그룹의 반복
//! 로그는 저장소를 건드리지 않습니다.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use snooze_core::metrics as m;
use snooze_core::{Group, Log};
use tracing::debug;

use super::rule_matches;
use crate::backend::store::GROUPS_INDEX;
use crate::backend::{AppContext, Backends, DocumentStore, SharedCache};
use crate::decision::Decision;
use crate::error::ProcessorError;
use crate::lang::{Condition, Field};

/// 그룹 캐시 TTL
pub const GROUP_CACHE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// 미리 정의된 맵 선택자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupByMap {
    /// `{kind, name}`
    Source,
    Identity,
    Labels,
}

/// 그룹핑 규칙. `group_by`와 `group_by_map` 중 하나만 지정합니다.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupingRule {
    pub name: String,
    #[serde(default, rename = "if")]
    pub condition: Condition,
    #[serde(default)]
    pub group_by: Vec<Field>,
    #[serde(default)]
    pub group_by_map: Option<GroupByMap>,
}

impl GroupingRule {
    fn labels(&self, log: &Log) -> BTreeMap<String, String> {
        match self.group_by_map {
            Some(GroupByMap::Source) => BTreeMap::from([
                ("kind".to_owned(), log.source.kind.clone()),
                ("name".to_owned(), log.source.name.clone()),
            ]),
            Some(GroupByMap::Identity) => log.identity.clone(),
            Some(GroupByMap::Labels) => log.labels.clone(),
            // 없는 필드는 빈 값으로 그룹을 이룸
            None => self
                .group_by
                .iter()
                .map(|f| (f.canonical_name().into_owned(), f.extract(log).unwrap_or_default()))
                .collect(),
        }
    }
}

/// 캐시 키
pub fn group_cache_key(group: &Group) -> String {
    format!("grouping:{}:{}", group.name, group.hash)
}

/// 그룹핑 단계
pub struct GroupingStage<B: Backends> {
    rules: Vec<GroupingRule>,
    ctx: AppContext<B>,
}

impl<B: Backends> GroupingStage<B> {
    pub fn new(rules: Vec<GroupingRule>, ctx: AppContext<B>) -> Result<Self, ProcessorError> {
        for rule in &rules {
            let reason = match (rule.group_by.is_empty(), rule.group_by_map) {
                (false, Some(_)) => "group_by and group_by_map are mutually exclusive",
                (true, None) => "one of group_by or group_by_map is required",
                _ => continue,
            };
            return Err(ProcessorError::RuleValidation {
                section: "groupings".to_owned(),
                rule: rule.name.clone(),
                reason: reason.to_owned(),
            });
        }
        Ok(Self { rules, ctx })
    }

    /// 그룹을 계산하고 캐시/저장소에 반영합니다.
    ///
    /// 이전 단계(프로필 패턴)가 붙인 그룹도 함께 처리합니다.
    /// 캐시나 저장소 에러는 `Retry`입니다.
    pub async fn process(&self, log: &mut Log) -> Decision {
        for rule in &self.rules {
            if rule_matches(&rule.condition, log, "grouping", &rule.name) {
                let group = Group::new(rule.name.clone(), rule.labels(log));
                log.add_group(group);
            }
        }
        if log.groups.is_empty() {
            return Decision::Ok;
        }

        match self.record(&log.groups).await {
            Ok(()) => Decision::Ok,
            Err(e) => Decision::retry(e),
        }
    }

    async fn record(&self, groups: &[Group]) -> Result<(), ProcessorError> {
        let keys: Vec<String> = groups.iter().map(group_cache_key).collect();
        let known = self.ctx.cache.exists_many(&keys).await?;

        let now = Utc::now().timestamp_millis();
        for (group, _) in groups.iter().zip(&known).filter(|(_, known)| !**known) {
            let doc = json!({
                "name": group.name,
                "hash": group.hash,
                "labels": group.labels,
                "firstSeen": now,
            });
            self.ctx
                .store
                .upsert(GROUPS_INDEX, &group.document_id(), doc)
                .await?;
            debug!(group = %group.name, hash = %group.hash, "new group");
            metrics::counter!(m::PROCESSOR_GROUPS_CREATED_TOTAL, m::LABEL_RULE => group.name.clone())
                .increment(1);
        }

        // 모든 그룹의 TTL 갱신
        let entries: Vec<(String, String)> = keys
            .into_iter()
            .zip(groups)
            .map(|(key, group)| (key, group.name.clone()))
            .collect();
        self.ctx.cache.set_many(&entries, GROUP_CACHE_TTL).await?;
        Ok(())
    }
}
