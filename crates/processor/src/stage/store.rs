//! Store 단계 -- 로그를 `v2-logs` 인덱스에 기록

use snooze_core::Log;
use tracing::trace;

use crate::backend::store::LOGS_INDEX;
use crate::backend::{AppContext, Backends, DocumentStore};
use crate::decision::Decision;

pub struct StoreStage<B: Backends> {
    ctx: AppContext<B>,
}

impl<B: Backends> StoreStage<B> {
    pub fn new(ctx: AppContext<B>) -> Self {
        Self { ctx }
    }

    /// 저장 후 문서 ID를 `log.id`에 기록합니다.
    pub async fn process(&self, log: &mut Log) -> Decision {
        if log.status.skip_storage {
            return Decision::Ok;
        }
        let doc = match serde_json::to_value(&*log) {
            Ok(doc) => doc,
            Err(e) => return Decision::abort(e),
        };
        match self.ctx.store.index(LOGS_INDEX, log.id.as_deref(), doc).await {
            Ok(id) => {
                trace!(id = %id, "log stored");
                log.id = Some(id);
                Decision::Ok
            }
            Err(e) => Decision::retry(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_assigns_id() {
        let ctx = AppContext::in_memory();
        let stage = StoreStage::new(ctx.clone());
        let mut log = Log {
            message: "kernel: oom".to_owned(),
            ..Log::default()
        };

        assert_eq!(stage.process(&mut log).await, Decision::Ok);
        let id = log.id.clone().unwrap();
        let docs = ctx.store.documents(LOGS_INDEX);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, id);
        assert_eq!(docs[0].source["message"], "kernel: oom");
    }

    #[tokio::test]
    async fn skip_storage_is_honored() {
        let ctx = AppContext::in_memory();
        let stage = StoreStage::new(ctx.clone());
        let mut log = Log::default();
        log.status.skip_storage = true;

        assert_eq!(stage.process(&mut log).await, Decision::Ok);
        assert_eq!(ctx.store.writes(), 0);
        assert!(log.id.is_none());
    }

    #[tokio::test]
    async fn store_failure_retries() {
        let ctx = AppContext::in_memory();
        let stage = StoreStage::new(ctx.clone());
        ctx.store.set_failing(true);
        assert!(matches!(
            stage.process(&mut Log::default()).await,
            Decision::Retry(_)
        ));
    }
}
