//! Replay of JSON-lines files into the in-memory queue.

use std::path::Path;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use snooze_processor::backend::{MemoryQueue, Outcome};

/// Result of a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Lines published to the queue.
    pub published: u64,
    pub acked: u64,
    pub terminated: u64,
    /// Redeliveries requested by the pipeline.
    pub retried: u64,
}

impl ReplaySummary {
    /// Count the settled outcomes recorded by `queue`.
    pub fn collect(published: u64, queue: &MemoryQueue) -> Self {
        let mut summary = Self {
            published,
            ..Self::default()
        };
        for (_, outcome) in queue.outcomes() {
            match outcome {
                Outcome::Ack => summary.acked += 1,
                Outcome::Term => summary.terminated += 1,
                Outcome::Nak | Outcome::NakWithDelay(_) => summary.retried += 1,
            }
        }
        summary
    }
}

/// Publish every non-blank line of `path` to `queue`.
///
/// Lines are published as-is; payloads that are not valid JSON are
/// turned into error logs by the consumer.
pub async fn publish_lines(path: &Path, queue: &MemoryQueue) -> Result<u64> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to open replay file {}: {}", path.display(), e))?;
    let mut lines = BufReader::new(file).lines();

    let mut published = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        queue.publish(line.to_owned());
        published += 1;
    }
    tracing::info!(path = %path.display(), published, "replay file queued");
    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.jsonl");
        std::fs::write(&path, "{\"message\":\"a\"}\n\n  \n{\"message\":\"b\"}\n").unwrap();

        let queue = MemoryQueue::new();
        assert_eq!(publish_lines(&path, &queue).await.unwrap(), 2);
        assert_eq!(queue.pending(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let queue = MemoryQueue::new();
        let err = publish_lines(Path::new("/nonexistent/logs.jsonl"), &queue)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to open replay file"));
    }
}
