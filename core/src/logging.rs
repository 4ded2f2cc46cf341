//! Captured process output: a bounded ring buffer and the per-process
//! distributor that serves it to any number of log streams.
//!
//! Publishing never blocks. When the ring is full the oldest line is evicted
//! and counted in `total_dropped`. Every [`LogSubscription`] keeps its own
//! sequence cursor, so reading does not consume lines for other subscribers.

use schema::LogStream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Longest captured line in bytes. Longer output is split into several
/// entries, so one entry still fits in an IPC frame when JSON-escaped.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// A single line captured from a process's stdout/stderr
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Monotonic sequence number for the entry
    pub seq: u64,
    /// Stream kind (stdout or stderr)
    pub stream: LogStream,
    /// Raw content of the log line, without trailing newline
    pub content: String,
    /// Timestamp in RFC3339 format
    pub timestamp: String,
}

/// A bounded-capacity ring buffer to store recent log entries.
///
/// - When capacity is exceeded, oldest entries are dropped and `total_dropped` is incremented.
/// - Sequence numbers increase monotonically and are attached to each entry when pushed.
#[derive(Debug)]
pub struct LogRing {
    capacity: usize,
    total_dropped: u64,
    next_seq: u64,
    entries: VecDeque<LogEntry>,
}

impl LogRing {
    /// Create a new `LogRing`; a zero capacity is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            total_dropped: 0,
            next_seq: 0,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Push a line, assigning the next sequence number.
    /// If the ring is full, evicts the oldest entry and increments the drop counter.
    pub fn push(&mut self, stream: LogStream, content: String) {
        let entry = LogEntry {
            seq: self.next_seq,
            stream,
            content,
            timestamp: schema::current_timestamp(),
        };
        self.next_seq += 1;

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.total_dropped = self.total_dropped.saturating_add(1);
        }
        self.entries.push_back(entry);
    }

    /// Current number of entries retained
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ring is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of entries ever dropped due to capacity
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped
    }

    /// Current high-water sequence value (the next seq to be assigned)
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Sequence number of the oldest retained entry
    pub fn first_seq(&self) -> u64 {
        self.next_seq - self.entries.len() as u64
    }

    /// Returns retained entries with `from_seq <= seq < until_seq`.
    ///
    /// Entries already evicted are silently skipped, so a slow reader resumes
    /// at the oldest line still available.
    pub fn entries_between(&self, from_seq: u64, until_seq: u64) -> Vec<LogEntry> {
        let skip = from_seq.saturating_sub(self.first_seq()) as usize;
        self.entries
            .iter()
            .skip(skip)
            .take_while(|e| e.seq < until_seq)
            .cloned()
            .collect()
    }
}

#[derive(Debug)]
struct DistributorState {
    ring: LogRing,
    closed: bool,
}

/// Per-process log buffer shared by the output readers and log streams
#[derive(Debug)]
pub struct LogDistributor {
    name: String,
    poll_interval: Duration,
    state: Mutex<DistributorState>,
}

impl LogDistributor {
    /// Create an open distributor retaining up to `capacity` lines
    pub fn new(name: impl Into<String>, capacity: usize, poll_interval: Duration) -> Self {
        Self {
            name: name.into(),
            poll_interval,
            state: Mutex::new(DistributorState {
                ring: LogRing::new(capacity),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DistributorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Name of the process this distributor belongs to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a line. Never blocks on readers.
    pub fn publish(&self, stream: LogStream, line: String) {
        self.lock().ring.push(stream, line);
    }

    /// Mark the stream as finished: followers end once they drain the buffer
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of lines currently retained
    pub fn len(&self) -> usize {
        self.lock().ring.len()
    }

    /// Whether no lines are retained
    pub fn is_empty(&self) -> bool {
        self.lock().ring.is_empty()
    }

    /// Lines evicted because the buffer was full
    pub fn total_dropped(&self) -> u64 {
        self.lock().ring.total_dropped()
    }

    /// Start reading from the oldest retained line.
    ///
    /// Without `follow` the subscription ends at the high-water mark observed
    /// now; with `follow` it keeps yielding new lines until the distributor is
    /// closed and drained.
    pub fn subscribe(self: &Arc<Self>, follow: bool) -> LogSubscription {
        let guard = self.lock();
        let cursor = guard.ring.first_seq();
        let until = (!follow).then(|| guard.ring.next_seq());
        drop(guard);

        LogSubscription {
            distributor: Arc::clone(self),
            cursor,
            until,
            pending: VecDeque::new(),
        }
    }
}

/// A reader over one [`LogDistributor`], owning its own cursor
///
/// [`next_line`](Self::next_line) is cancellation safe: dropping its future
/// never loses a line, so callers can race it against a disconnect.
#[derive(Debug)]
pub struct LogSubscription {
    distributor: Arc<LogDistributor>,
    cursor: u64,
    until: Option<u64>,
    pending: VecDeque<LogEntry>,
}

impl LogSubscription {
    /// Whether this subscription keeps waiting for new lines
    pub fn is_following(&self) -> bool {
        self.until.is_none()
    }

    /// Next line, or `None` once the stream has ended
    pub async fn next_line(&mut self) -> Option<LogEntry> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(entry);
            }

            let closed = {
                let state = self.distributor.lock();
                let until = self.until.unwrap_or(u64::MAX);
                let batch = state.ring.entries_between(self.cursor, until);
                if let Some(last) = batch.last() {
                    self.cursor = last.seq + 1;
                }
                self.pending.extend(batch);
                state.closed
            };

            if !self.pending.is_empty() {
                continue;
            }
            if self.until.is_some() || closed {
                return None;
            }
            tokio::time::sleep(self.distributor.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distributor(capacity: usize) -> Arc<LogDistributor> {
        Arc::new(LogDistributor::new("test", capacity, Duration::from_millis(10)))
    }

    async fn collect(sub: &mut LogSubscription) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(entry) = sub.next_line().await {
            out.push(entry.content);
        }
        out
    }

    #[test]
    fn test_wrap_around_and_drop_count() {
        let mut ring = LogRing::new(3);
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.total_dropped(), 0);

        for line in ["a", "b", "c", "d", "e"] {
            ring.push(LogStream::Stdout, line.to_string());
        }

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.total_dropped(), 2);
        assert_eq!(ring.first_seq(), 2);

        let snap = ring.entries_between(0, u64::MAX);
        let contents: Vec<_> = snap.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["c", "d", "e"]);
        let seqs: Vec<_> = snap.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[test]
    fn test_entries_between_bounds() {
        let mut ring = LogRing::new(10);
        for line in ["a", "b", "c", "d"] {
            ring.push(LogStream::Stdout, line.to_string());
        }
        let v = ring.entries_between(1, 3);
        let contents: Vec<_> = v.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "c"]);
        assert!(ring.entries_between(4, u64::MAX).is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_subscription_ends_at_high_water_mark() {
        let dist = distributor(100);
        dist.publish(LogStream::Stdout, "one".to_string());
        dist.publish(LogStream::Stdout, "two".to_string());

        let mut sub = dist.subscribe(false);
        dist.publish(LogStream::Stdout, "three".to_string());

        assert!(!sub.is_following());
        assert_eq!(collect(&mut sub).await, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_subscribers_do_not_consume_each_others_lines() {
        let dist = distributor(100);
        dist.publish(LogStream::Stdout, "shared".to_string());

        let mut first = dist.subscribe(false);
        let mut second = dist.subscribe(false);
        assert_eq!(collect(&mut first).await, vec!["shared"]);
        assert_eq!(collect(&mut second).await, vec!["shared"]);
    }

    #[tokio::test]
    async fn test_follow_sees_new_lines_and_ends_on_close() {
        let dist = distributor(100);
        dist.publish(LogStream::Stdout, "before".to_string());
        let mut sub = dist.subscribe(true);

        let producer = {
            let dist = Arc::clone(&dist);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                dist.publish(LogStream::Stderr, "after".to_string());
                tokio::time::sleep(Duration::from_millis(30)).await;
                dist.close();
            })
        };

        let lines = tokio::time::timeout(Duration::from_secs(2), collect(&mut sub))
            .await
            .expect("follow did not end after close");
        assert_eq!(lines, vec!["before", "after"]);
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_never_blocks_when_full() {
        let dist = distributor(2);
        for i in 0..1000 {
            dist.publish(LogStream::Stdout, format!("line {}", i));
        }
        assert_eq!(dist.len(), 2);
        assert_eq!(dist.total_dropped(), 998);

        dist.close();
        let mut sub = dist.subscribe(true);
        assert_eq!(collect(&mut sub).await, vec!["line 998", "line 999"]);
    }

    #[tokio::test]
    async fn test_slow_follower_skips_evicted_lines() {
        let dist = distributor(2);
        dist.publish(LogStream::Stdout, "a".to_string());
        let mut sub = dist.subscribe(true);
        for line in ["b", "c", "d"] {
            dist.publish(LogStream::Stdout, line.to_string());
        }
        dist.close();
        assert_eq!(collect(&mut sub).await, vec!["c", "d"]);
    }
}
