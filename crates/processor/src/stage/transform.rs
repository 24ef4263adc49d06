//! Transform 단계 -- 조건부 필드 재작성

use serde::Deserialize;
use snooze_core::Log;
use tracing::trace;

use super::{Action, rule_matches};
use crate::decision::Decision;
use crate::lang::{Captures, Condition};

/// 이름 있는 변환 규칙
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformRule {
    pub name: String,
    #[serde(default, rename = "if")]
    pub condition: Condition,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// 변환 단계
#[derive(Debug, Clone, Default)]
pub struct TransformStage {
    rules: Vec<TransformRule>,
}

impl TransformStage {
    pub fn new(rules: Vec<TransformRule>) -> Self {
        Self { rules }
    }

    /// 조건이 맞는 규칙의 액션을 순서대로 적용합니다. 항상 `Ok`입니다.
    pub async fn process(&self, log: &mut Log) -> Decision {
        for rule in &self.rules {
            if !rule_matches(&rule.condition, log, "transform", &rule.name) {
                continue;
            }
            trace!(rule = %rule.name, "applying transform");
            // 캡처는 규칙 안에서만 유효
            let mut captures = Captures::new();
            for action in &rule.actions {
                action.apply(log, &mut captures);
            }
        }
        Decision::Ok
    }
}
