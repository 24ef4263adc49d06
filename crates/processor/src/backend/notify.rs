//! 알림 발행 채널
//!
//! 실제 전송(메일, 웹훅 등)은 큐 건너편의 소비자가 담당합니다.
//! 처리기는 subject 하나에 직렬화된 페이로드를 발행할 뿐입니다.

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use snooze_core::Notification;
use snooze_core::error::QueueError;
use tracing::info;

/// 알림 큐 subject 접두어
pub const NOTIFY_SUBJECT_PREFIX: &str = "NOTIFY.";

/// 액티브 체크 응답 subject
pub const ACTIVECHECK_SUBJECT: &str = "activecheck";

/// 알림 발행 trait
pub trait Notifier: Send + Sync + 'static {
    fn publish(
        &self,
        subject: &str,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), QueueError>> + Send;
}

/// 발행 내역을 기록하는 인메모리 구현
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    published: Mutex<Vec<(String, Bytes)>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후 모든 발행이 실패하도록 합니다 (장애 주입).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 발행된 (subject, payload) 목록
    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// `NOTIFY.*`로 발행된 알림을 디코딩해 돌려줍니다.
    pub fn notifications(&self) -> Vec<Notification> {
        self.published()
            .into_iter()
            .filter(|(subject, _)| subject.starts_with(NOTIFY_SUBJECT_PREFIX))
            .filter_map(|(_, payload)| serde_json::from_slice(&payload).ok())
            .collect()
    }
}

impl Notifier for MemoryNotifier {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), QueueError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueueError::Publish {
                subject: subject.to_owned(),
                reason: "memory notifier is failing".to_owned(),
            });
        }
        self.published
            .lock()
            .map_err(|_| QueueError::Publish {
                subject: subject.to_owned(),
                reason: "notifier lock poisoned".to_owned(),
            })?
            .push((subject.to_owned(), payload));
        Ok(())
    }
}

/// 발행 내용을 tracing 로그로 남기는 구현 (단독 실행용)
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), QueueError> {
        info!(
            subject,
            bytes = payload.len(),
            payload = %String::from_utf8_lossy(&payload),
            "notification published"
        );
        Ok(())
    }
}
