//! Active check 단계 -- 외부 점검 요청에 대한 응답 발행
//!
//! `active_check_url`이 있는 로그는 파이프라인 동작 확인용입니다.
//! 알림과 저장을 생략하고 `activecheck` subject로 응답만 보냅니다.

use bytes::Bytes;
use serde::Serialize;
use snooze_core::metrics as m;
use snooze_core::{Log, StatusKind};
use tracing::debug;

use crate::backend::notify::ACTIVECHECK_SUBJECT;
use crate::backend::{AppContext, Backends, Notifier};
use crate::decision::Decision;

/// 액티브 체크 응답
#[derive(Debug, Serialize)]
struct ActiveCheckReply<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

pub struct ActiveCheckStage<B: Backends> {
    ctx: AppContext<B>,
}

impl<B: Backends> ActiveCheckStage<B> {
    pub fn new(ctx: AppContext<B>) -> Self {
        Self { ctx }
    }

    /// 발행 실패는 `Abort`입니다. 점검 요청은 재시도하지 않습니다.
    pub async fn process(&self, log: &mut Log) -> Decision {
        let Some(url) = log.active_check_url.clone() else {
            return Decision::Ok;
        };

        log.status.change(StatusKind::ActiveCheck);
        log.status.skip_notification = true;
        log.status.skip_storage = true;

        let reply = ActiveCheckReply {
            url: &url,
            error: log.error.as_deref(),
        };
        let payload = match serde_json::to_vec(&reply) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => return Decision::abort(e),
        };
        if let Err(e) = self.ctx.notifier.publish(ACTIVECHECK_SUBJECT, payload).await {
            return Decision::abort(e);
        }
        debug!(url = %url, "active check answered");
        metrics::counter!(m::PROCESSOR_LOGS_BY_STATUS_TOTAL, m::LABEL_STATUS => "activecheck")
            .increment(1);
        Decision::Ok
    }
}
