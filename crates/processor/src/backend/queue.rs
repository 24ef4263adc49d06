//! 작업 큐 -- at-least-once 전달과 메시지 단위 응답
//!
//! 컨슈머는 [`Queue::fetch`]로 메시지를 배치로 가져오고, 처리 결과에 따라
//! 각 [`Delivery`]를 ack / nak / nak_with_delay / term 중 하나로 소비합니다.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use snooze_core::error::QueueError;
use tokio::sync::Notify;
use tracing::debug;

/// 전달된 메시지 하나
///
/// 응답 메서드는 `self`를 소비하므로 메시지마다 정확히 한 번만 응답합니다.
pub trait Delivery: Send + 'static {
    /// 페이로드
    fn data(&self) -> &[u8];

    /// 발행 시각 (큐 대기 시간 측정용)
    fn published_at(&self) -> Option<DateTime<Utc>>;

    /// 메시지 헤더 (트레이스 전파 등)
    fn headers(&self) -> &BTreeMap<String, String>;

    /// 처리 완료
    fn ack(self) -> impl Future<Output = Result<(), QueueError>> + Send;

    /// 즉시 재전달
    fn nak(self) -> impl Future<Output = Result<(), QueueError>> + Send;

    /// 지연 후 재전달
    fn nak_with_delay(self, delay: Duration)
    -> impl Future<Output = Result<(), QueueError>> + Send;

    /// 재전달하지 않고 제거
    fn term(self) -> impl Future<Output = Result<(), QueueError>> + Send;
}

/// 메시지 큐 trait
pub trait Queue: Send + Sync + 'static {
    type Message: Delivery;

    /// 최대 `max`개를 가져옵니다. `timeout` 안에 메시지가 없으면 빈 배치를 돌려줍니다.
    fn fetch(
        &self,
        max: usize,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<Self::Message>, QueueError>> + Send;
}

// ─── 인메모리 구현 ───────────────────────────────────────────────────

/// 메시지 응답 기록
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ack,
    Nak,
    NakWithDelay(Duration),
    Term,
}

#[derive(Debug, Clone)]
struct Envelope {
    seq: u64,
    data: Bytes,
    published_at: DateTime<Utc>,
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct Shared {
    pending: Mutex<VecDeque<Envelope>>,
    outcomes: Mutex<Vec<(u64, Outcome)>>,
    notify: Notify,
    next_seq: AtomicU64,
    settled: AtomicU64,
}

impl Shared {
    fn push(&self, envelope: Envelope) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_back(envelope);
        }
        self.notify.notify_one();
    }

    fn record(&self, seq: u64, outcome: Outcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push((seq, outcome));
        }
        if matches!(outcome, Outcome::Ack | Outcome::Term) {
            self.settled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// 단일 프로세스용 인메모리 큐
///
/// 재전달은 큐 뒤쪽으로 다시 들어가며, 지연 재전달은 타이머 태스크가 처리합니다.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 메시지를 발행하고 시퀀스 번호를 돌려줍니다.
    pub fn publish(&self, data: impl Into<Bytes>) -> u64 {
        self.publish_with_headers(data, BTreeMap::new())
    }

    pub fn publish_with_headers(
        &self,
        data: impl Into<Bytes>,
        headers: BTreeMap<String, String>,
    ) -> u64 {
        let seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);
        self.shared.push(Envelope {
            seq,
            data: data.into(),
            published_at: Utc::now(),
            headers,
        });
        seq
    }

    /// 지금까지 기록된 응답 (시간 순)
    pub fn outcomes(&self) -> Vec<(u64, Outcome)> {
        self.shared
            .outcomes
            .lock()
            .map(|o| o.clone())
            .unwrap_or_default()
    }

    /// 대기 중인 메시지 수
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// ack 또는 term으로 끝나지 않은 메시지 수
    pub fn outstanding(&self) -> u64 {
        let published = self.shared.next_seq.load(Ordering::SeqCst);
        published.saturating_sub(self.shared.settled.load(Ordering::SeqCst))
    }
}

impl Queue for MemoryQueue {
    type Message = MemoryMessage;

    async fn fetch(&self, max: usize, timeout: Duration) -> Result<Vec<MemoryMessage>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let batch: Vec<Envelope> = {
                let mut pending = self
                    .shared
                    .pending
                    .lock()
                    .map_err(|_| QueueError::Fetch("queue lock poisoned".to_owned()))?;
                let n = max.min(pending.len());
                pending.drain(..n).collect()
            };
            if !batch.is_empty() || max == 0 {
                return Ok(batch
                    .into_iter()
                    .map(|envelope| MemoryMessage {
                        shared: Arc::clone(&self.shared),
                        envelope,
                    })
                    .collect());
            }
            if tokio::time::timeout_at(deadline, self.shared.notify.notified())
                .await
                .is_err()
            {
                return Ok(Vec::new());
            }
        }
    }
}

/// [`MemoryQueue`]에서 가져온 메시지
#[derive(Debug)]
pub struct MemoryMessage {
    shared: Arc<Shared>,
    envelope: Envelope,
}

impl MemoryMessage {
    /// 발행 시 부여된 시퀀스 번호
    pub fn seq(&self) -> u64 {
        self.envelope.seq
    }
}

impl Delivery for MemoryMessage {
    fn data(&self) -> &[u8] {
        &self.envelope.data
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        Some(self.envelope.published_at)
    }

    fn headers(&self) -> &BTreeMap<String, String> {
        &self.envelope.headers
    }

    async fn ack(self) -> Result<(), QueueError> {
        self.shared.record(self.envelope.seq, Outcome::Ack);
        Ok(())
    }

    async fn nak(self) -> Result<(), QueueError> {
        self.shared.record(self.envelope.seq, Outcome::Nak);
        self.shared.push(self.envelope);
        Ok(())
    }

    async fn nak_with_delay(self, delay: Duration) -> Result<(), QueueError> {
        let seq = self.envelope.seq;
        self.shared.record(seq, Outcome::NakWithDelay(delay));
        let shared = self.shared;
        let envelope = self.envelope;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(seq, "redelivering delayed message");
            shared.push(envelope);
        });
        Ok(())
    }

    async fn term(self) -> Result<(), QueueError> {
        self.shared.record(self.envelope.seq, Outcome::Term);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_returns_up_to_max() {
        let queue = MemoryQueue::new();
        for i in 0..5 {
            queue.publish(format!("m{i}"));
        }
        let batch = queue.fetch(3, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].data(), b"m0");
        assert_eq!(queue.pending(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_times_out_with_empty_batch() {
        let queue = MemoryQueue::new();
        let batch = queue.fetch(10, Duration::from_secs(1)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn fetch_wakes_on_publish() {
        let queue = MemoryQueue::new();
        let publisher = queue.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("late");
        });
        let batch = queue.fetch(1, Duration::from_secs(5)).await.unwrap();
        assert_eq!(batch.len(), 1);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn outcomes_are_recorded() {
        let queue = MemoryQueue::new();
        queue.publish("a");
        queue.publish("b");
        queue.publish("c");
        let mut batch = queue.fetch(3, Duration::from_millis(10)).await.unwrap();
        let c = batch.pop().unwrap();
        let b = batch.pop().unwrap();
        let a = batch.pop().unwrap();
        a.ack().await.unwrap();
        b.term().await.unwrap();
        c.nak().await.unwrap();

        assert_eq!(
            queue.outcomes(),
            vec![(0, Outcome::Ack), (1, Outcome::Term), (2, Outcome::Nak)]
        );
        // nak된 메시지는 다시 대기열에
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.outstanding(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nak_with_delay_redelivers_later() {
        let queue = MemoryQueue::new();
        queue.publish("retry me");
        let msg = queue
            .fetch(1, Duration::from_millis(10))
            .await
            .unwrap()
            .pop()
            .unwrap();
        msg.nak_with_delay(Duration::from_secs(30)).await.unwrap();
        assert_eq!(queue.pending(), 0);

        let redelivered = queue.fetch(1, Duration::from_secs(31)).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].seq(), 0);
    }

    #[tokio::test]
    async fn headers_are_preserved() {
        let queue = MemoryQueue::new();
        let mut headers = BTreeMap::new();
        headers.insert("traceparent".to_owned(), "00-abc-def-01".to_owned());
        queue.publish_with_headers("x", headers);
        let msg = queue
            .fetch(1, Duration::from_millis(10))
            .await
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(
            msg.headers().get("traceparent").map(String::as_str),
            Some("00-abc-def-01")
        );
        assert!(msg.published_at().is_some());
    }
}
