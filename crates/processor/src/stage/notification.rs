//! Notification 단계 -- 조건이 맞는 규칙의 목적지로 알림 발행

use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use snooze_core::metrics as m;
use snooze_core::{Destination, Log, Notification};
use tracing::debug;

use super::rule_matches;
use crate::backend::notify::NOTIFY_SUBJECT_PREFIX;
use crate::backend::{AppContext, Backends, Notifier};
use crate::decision::Decision;
use crate::error::ProcessorError;
use crate::lang::Condition;

/// 알림 규칙
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationRule {
    pub name: String,
    #[serde(default, rename = "if")]
    pub condition: Condition,
    pub destinations: Vec<Destination>,
}

pub struct NotificationStage<B: Backends> {
    rules: Vec<NotificationRule>,
    defaults: Vec<Destination>,
    ctx: AppContext<B>,
}

impl<B: Backends> NotificationStage<B> {
    pub fn new(
        rules: Vec<NotificationRule>,
        defaults: Vec<Destination>,
        ctx: AppContext<B>,
    ) -> Self {
        Self {
            rules,
            defaults,
            ctx,
        }
    }

    /// 맞는 규칙들의 목적지 합집합 (처음 나온 순서). 없으면 기본 목적지.
    pub fn destinations(&self, log: &Log) -> Vec<Destination> {
        let mut found: Vec<Destination> = Vec::new();
        for rule in &self.rules {
            if !rule_matches(&rule.condition, log, "notification", &rule.name) {
                continue;
            }
            for dest in &rule.destinations {
                if !found.contains(dest) {
                    found.push(dest.clone());
                }
            }
        }
        if found.is_empty() {
            found = self.defaults.clone();
        }
        found
    }

    pub async fn process(&self, log: &mut Log) -> Decision {
        if log.status.skip_notification {
            return Decision::Ok;
        }
        match self.notify(log).await {
            Ok(()) => Decision::Ok,
            Err(e) => Decision::retry(e),
        }
    }

    async fn notify(&self, log: &Log) -> Result<(), ProcessorError> {
        let now = Utc::now();
        for dest in self.destinations(log) {
            let subject = format!("{NOTIFY_SUBJECT_PREFIX}{}", dest.queue);
            let queue = dest.queue.clone();
            let payload = serde_json::to_vec(&Notification::for_log(log, dest, now))?;
            self.ctx.notifier.publish(&subject, Bytes::from(payload)).await?;
            debug!(subject = %subject, "notification published");
            metrics::counter!(m::PROCESSOR_NOTIFICATIONS_SENT_TOTAL, m::LABEL_QUEUE => queue)
                .increment(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackends;

    fn dest(queue: &str, profile: &str) -> Destination {
        Destination {
            queue: queue.to_owned(),
            profile: profile.to_owned(),
        }
    }

    fn sample_stage(ctx: &AppContext<MemoryBackends>) -> NotificationStage<MemoryBackends> {
        let rules: Vec<NotificationRule> = serde_yaml::from_str(
            r#"
- name: critical
  if: 'severity_number >= 17'
  destinations:
    - { queue: mail, profile: oncall }
    - { queue: chat, profile: ops }
- name: db-team
  if: 'identity.team == "db"'
  destinations:
    - { queue: chat, profile: ops }
    - { queue: chat, profile: db }
"#,
        )
        .unwrap();
        NotificationStage::new(rules, vec![dest("mail", "default")], ctx.clone())
    }

    #[tokio::test]
    async fn union_of_destinations_in_first_seen_order() {
        let ctx = AppContext::in_memory();
        let stage = sample_stage(&ctx);
        let mut log = Log {
            severity_number: 21,
            ..Log::default()
        };
        log.identity.insert("team".to_owned(), "db".to_owned());

        assert_eq!(
            stage.destinations(&log),
            vec![dest("mail", "oncall"), dest("chat", "ops"), dest("chat", "db")]
        );
        assert_eq!(stage.process(&mut log).await, Decision::Ok);

        let subjects: Vec<String> = ctx.notifier.published().into_iter().map(|(s, _)| s).collect();
        assert_eq!(subjects, ["NOTIFY.mail", "NOTIFY.chat", "NOTIFY.chat"]);
        assert_eq!(ctx.notifier.notifications()[2].destination, dest("chat", "db"));
    }

    #[tokio::test]
    async fn defaults_when_nothing_matches() {
        let ctx = AppContext::in_memory();
        let stage = sample_stage(&ctx);
        let mut log = Log::default();

        stage.process(&mut log).await;
        let sent = ctx.notifier.notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, dest("mail", "default"));
    }

    #[tokio::test]
    async fn skipped_logs_are_not_notified() {
        let ctx = AppContext::in_memory();
        let stage = sample_stage(&ctx);
        let mut log = Log::default();
        log.status.skip_notification = true;

        assert_eq!(stage.process(&mut log).await, Decision::Ok);
        assert!(ctx.notifier.published().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_retries() {
        let ctx = AppContext::in_memory();
        let stage = sample_stage(&ctx);
        ctx.notifier.set_failing(true);

        assert!(matches!(
            stage.process(&mut Log::default()).await,
            Decision::Retry(_)
        ));
    }
}
