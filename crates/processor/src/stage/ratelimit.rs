//! Rate limit 단계 -- 그룹별 GCRA 제한과 제한 상태 기록
//!
//! 셀은 (규칙, 그룹 이름, 그룹 해시)로 식별됩니다. 처음 제한되면 저장소에
//! 이력 문서를 열고 캐시에 상태 해시를 만들며, 이후 제한된 요청마다
//! `hits`/`lastHit`을 갱신합니다. 셀은 정렬 집합 `ratelimit:active`에
//! 예상 해제 시각으로 등록되고, [`crate::sweep`]이 해제된 셀의 이력을 닫습니다.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use snooze_core::metrics as m;
use snooze_core::{Group, Log, StatusKind};
use tracing::{debug, info};

use super::rule_matches;
use crate::backend::store::RATELIMIT_HISTORY_INDEX;
use crate::backend::{AppContext, Backends, DocumentStore, SharedCache};
use crate::decision::Decision;
use crate::error::ProcessorError;
use crate::gcra::{Gcra, GcraMode, GcraStatus};
use crate::lang::Condition;

/// 활성 셀 정렬 집합 키
pub const ACTIVE_SET_KEY: &str = "ratelimit:active";

/// 제한된 로그 처리 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatelimitPolicy {
    /// 큐에서 제거 (재시도 없음)
    #[default]
    Abort,
    /// 지연 후 재전달
    Retry,
}

/// 레이트리밋 규칙
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RatelimitRule {
    pub name: String,
    #[serde(default, rename = "if")]
    pub condition: Condition,
    /// 제한 단위가 되는 그룹핑 규칙 이름
    pub group: String,
    pub burst: u32,
    /// 생략하면 `burst`
    #[serde(default)]
    pub rate: Option<u32>,
    /// `"30s"`, `"5m"`, `"1h"` 또는 초 단위 정수
    #[serde(deserialize_with = "deserialize_period")]
    pub period: Duration,
}

impl RatelimitRule {
    pub fn gcra(&self) -> Gcra {
        Gcra {
            burst: self.burst,
            rate: self.rate.unwrap_or(self.burst),
            period: self.period,
        }
    }

    /// 규칙 자체의 값 검증 (이름 중복과 그룹 참조는 파이프라인 설정에서 확인)
    pub fn validate(&self) -> Result<(), ProcessorError> {
        let invalid = |reason: &str| ProcessorError::RuleValidation {
            section: "ratelimits".to_owned(),
            rule: self.name.clone(),
            reason: reason.to_owned(),
        };
        if self.burst == 0 {
            return Err(invalid("burst must be at least 1"));
        }
        if self.rate == Some(0) {
            return Err(invalid("rate must be at least 1"));
        }
        if self.period < Duration::from_secs(1) {
            return Err(invalid("period must be at least 1s"));
        }
        Ok(())
    }

    /// GCRA 셀 키
    pub fn cell_key(&self, group: &Group) -> String {
        format!("ratelimit:{}:{}:{}", self.name, group.name, group.hash)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PeriodRepr {
    Secs(u64),
    Text(String),
}

fn deserialize_period<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    match PeriodRepr::deserialize(d)? {
        PeriodRepr::Secs(secs) => Ok(Duration::from_secs(secs)),
        PeriodRepr::Text(text) => parse_period(&text).map_err(serde::de::Error::custom),
    }
}

/// `"90"`, `"90s"`, `"5m"`, `"2h"`, `"1d"`를 해석합니다.
pub fn parse_period(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid period '{text}'"))?;
    let scale = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        other => return Err(format!("unknown period unit '{other}' in '{text}'")),
    };
    Ok(Duration::from_secs(value.saturating_mul(scale)))
}

/// `ratelimit:active`에 등록되는 셀 정보 (정렬 집합 멤버로 직렬화)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCell {
    pub rule: String,
    pub group: String,
    pub hash: String,
    pub history_id: String,
}

impl ActiveCell {
    pub fn status_key(&self) -> String {
        status_key(&self.rule, &self.group, &self.hash)
    }

    pub fn cell_key(&self) -> String {
        format!("ratelimit:{}:{}:{}", self.rule, self.group, self.hash)
    }
}

impl fmt::Display for ActiveCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.rule, self.group, self.hash)
    }
}

/// 상태 해시 키
pub fn status_key(rule: &str, group: &str, hash: &str) -> String {
    format!("ratelimit:status:{rule}:{group}:{hash}")
}

/// 레이트리밋 단계
pub struct RatelimitStage<B: Backends> {
    rules: Vec<RatelimitRule>,
    policy: RatelimitPolicy,
    ctx: AppContext<B>,
}

impl<B: Backends> RatelimitStage<B> {
    pub fn new(
        rules: Vec<RatelimitRule>,
        policy: RatelimitPolicy,
        ctx: AppContext<B>,
    ) -> Result<Self, ProcessorError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            rule.validate()?;
            if !seen.insert(rule.name.as_str()) {
                return Err(ProcessorError::RuleValidation {
                    section: "ratelimits".to_owned(),
                    rule: rule.name.clone(),
                    reason: "duplicate rule name".to_owned(),
                });
            }
        }
        Ok(Self { rules, policy, ctx })
    }

    pub fn rules(&self) -> &[RatelimitRule] {
        &self.rules
    }

    pub async fn process(&self, log: &mut Log) -> Decision {
        for rule in &self.rules {
            if !rule_matches(&rule.condition, log, "ratelimit", &rule.name) {
                continue;
            }
            let Some(group) = log.group(&rule.group) else {
                continue;
            };

            let status = match self
                .ctx
                .cache
                .gcra(&rule.cell_key(group), &rule.gcra(), GcraMode::Perform)
                .await
            {
                Ok(status) => status,
                Err(e) => return Decision::retry(e),
            };
            if !status.limited {
                continue;
            }

            let history_id = match self.record_throttle(rule, group, &status).await {
                Ok(id) => id,
                Err(e) => return Decision::retry(e),
            };

            if log.status.change(StatusKind::Ratelimited) {
                log.status.reason = format!("Ratelimited by '{}'", rule.name);
                log.status.object_id = Some(history_id);
            }
            metrics::counter!(m::RATELIMIT_THROTTLED_TOTAL, m::LABEL_RULE => rule.name.clone())
                .increment(1);
            metrics::counter!(m::PROCESSOR_LOGS_BY_STATUS_TOTAL, m::LABEL_STATUS => "ratelimited")
                .increment(1);

            let reason = format!("ratelimited by '{}'", rule.name);
            return match self.policy {
                RatelimitPolicy::Abort => Decision::Abort(reason),
                RatelimitPolicy::Retry => Decision::Retry(reason),
            };
        }
        Decision::Ok
    }

    /// 제한 상태를 열거나 갱신하고 이력 문서 ID를 돌려줍니다.
    async fn record_throttle(
        &self,
        rule: &RatelimitRule,
        group: &Group,
        status: &GcraStatus,
    ) -> Result<String, ProcessorError> {
        let key = status_key(&rule.name, &group.name, &group.hash);
        let ttl = status
            .retry_after
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_secs(1));
        let now = Utc::now().timestamp_millis();

        let existing = self
            .ctx
            .cache
            .hget_all_many(std::slice::from_ref(&key))
            .await?
            .pop()
            .unwrap_or_default();

        let history_id = match existing.get("historyId") {
            Some(id) if existing.get("active").map(String::as_str) == Some("true") => {
                self.ctx.cache.hincr(&key, "hits", 1).await?;
                self.ctx
                    .cache
                    .hset(&key, &[("lastHit".to_owned(), now.to_string())])
                    .await?;
                id.clone()
            }
            _ => {
                let id = self
                    .ctx
                    .store
                    .index(
                        RATELIMIT_HISTORY_INDEX,
                        None,
                        json!({
                            "startsAt": now,
                            "endsAt": null,
                            "active": true,
                            "rule": rule.name,
                            "group": group.name,
                            "hash": group.hash,
                        }),
                    )
                    .await?;
                let fields = [
                    ("active", "true".to_owned()),
                    ("startsAt", now.to_string()),
                    ("lastHit", now.to_string()),
                    ("hits", "1".to_owned()),
                    ("rule", rule.name.clone()),
                    ("group", group.name.clone()),
                    ("hash", group.hash.clone()),
                    ("historyId", id.clone()),
                ]
                .map(|(k, v)| (k.to_owned(), v));
                self.ctx.cache.hset(&key, &fields).await?;
                info!(rule = %rule.name, group = %group.name, hash = %group.hash, "ratelimit opened");
                id
            }
        };
        self.ctx.cache.expire(&key, ttl).await?;

        let cell = ActiveCell {
            rule: rule.name.clone(),
            group: group.name.clone(),
            hash: group.hash.clone(),
            history_id: history_id.clone(),
        };
        let release_at = now as f64 + ttl.as_millis() as f64;
        self.ctx
            .cache
            .zadd(ACTIVE_SET_KEY, &serde_json::to_string(&cell)?, release_at)
            .await?;
        debug!(cell = %cell, retry_after_ms = ttl.as_millis() as u64, "ratelimit hit");
        Ok(history_id)
    }
}
