//! Flat bounded span buffer and its optional periodic exporter.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Span {
    pub id: Uuid,
    pub trace_id: Uuid,
    pub name: String,
    pub status: SpanStatus,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_ms: i64,
    pub tags: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Ok,
    Error,
}

pub struct SpanBuffer {
    max_spans: usize,
    spans: Mutex<VecDeque<Span>>,
}

impl SpanBuffer {
    pub fn new(max_spans: usize) -> Self {
        Self {
            max_spans,
            spans: Mutex::new(VecDeque::with_capacity(max_spans)),
        }
    }

    pub fn record(
        &self,
        trace_id: Uuid,
        name: impl Into<String>,
        status: SpanStatus,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tags: Vec<(String, String)>,
    ) {
        let span = Span {
            id: Uuid::new_v4(),
            trace_id,
            name: name.into(),
            status,
            start,
            end,
            duration_ms: (end - start).num_milliseconds().max(0),
            tags,
        };
        let mut spans = self.spans.lock().unwrap();
        if spans.len() == self.max_spans {
            spans.pop_front();
        }
        spans.push_back(span);
    }

    pub fn snapshot(&self) -> Vec<Span> {
        self.spans.lock().unwrap().iter().cloned().collect()
    }

    /// Drains the buffer so a failed export doesn't resend the same spans
    /// forever; callers re-queue on failure if they want at-least-once.
    pub fn drain(&self) -> Vec<Span> {
        self.spans.lock().unwrap().drain(..).collect()
    }
}

/// POSTs a batch of spans to a configured endpoint. Export failures are
/// logged and swallowed — they must never affect request processing.
pub async fn export_spans(client: &reqwest::Client, endpoint: &str, timeout: Duration, spans: &[Span]) {
    if spans.is_empty() {
        return;
    }
    let result = client
        .post(endpoint)
        .timeout(timeout)
        .json(spans)
        .send()
        .await;
    if let Err(e) = result {
        tracing::warn!(error = %e, endpoint, "span export failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn buffer_drops_oldest_when_full() {
        let buffer = SpanBuffer::new(2);
        let now = Utc::now();
        for i in 0..3 {
            buffer.record(Uuid::new_v4(), format!("span-{i}"), SpanStatus::Ok, now, now + ChronoDuration::milliseconds(5), vec![]);
        }
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "span-1");
        assert_eq!(snapshot[1].name, "span-2");
    }

    #[test]
    fn drain_empties_the_buffer() {
        let buffer = SpanBuffer::new(10);
        let now = Utc::now();
        buffer.record(Uuid::new_v4(), "a", SpanStatus::Ok, now, now, vec![]);
        assert_eq!(buffer.drain().len(), 1);
        assert!(buffer.snapshot().is_empty());
    }
}
