//! 파이프라인 단계
//!
//! 각 단계는 `async fn process(&self, log: &mut Log) -> Decision`을 제공하며
//! [`crate::pipeline::Pipeline`]이 고정된 순서로 호출합니다.
//!
//! ```text
//! transform → silence → profile → grouping → ratelimit → snooze
//!           → activecheck → notification → store
//! ```
//!
//! 규칙 조건 평가 에러는 해당 규칙에만 영향을 주며 warn 로그 후 불일치로 처리합니다.

pub mod action;
pub mod activecheck;
pub mod grouping;
pub mod notification;
pub mod profile;
pub mod ratelimit;
pub mod silence;
pub mod snooze;
pub mod store;
pub mod transform;

use snooze_core::Log;
use tracing::warn;

use crate::lang::Condition;

pub use action::Action;
pub use activecheck::ActiveCheckStage;
pub use grouping::{GroupByMap, GroupingRule, GroupingStage};
pub use notification::{NotificationRule, NotificationStage};
pub use profile::{PatternConfig, ProfileConfig, ProfileStage, SwitchConfig};
pub use ratelimit::{RatelimitPolicy, RatelimitRule, RatelimitStage};
pub use silence::{SilenceRule, SilenceStage};
pub use snooze::{SnoozeLookup, SnoozeRegistry, SnoozeStage};
pub use store::StoreStage;
pub use transform::{TransformRule, TransformStage};

/// 규칙 조건을 평가합니다. 평가 에러는 경고 후 불일치로 취급합니다.
pub(crate) fn rule_matches(condition: &Condition, log: &Log, stage: &str, rule: &str) -> bool {
    match condition.matches(log) {
        Ok(matched) => matched,
        Err(e) => {
            warn!(stage, rule, condition = %condition, error = %e, "condition evaluation failed");
            false
        }
    }
}
