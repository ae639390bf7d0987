//! Bounded, file-backed query and stats log.
//!
//! ```text
//!  append() ──► Mutex<HistoryLog> ──(evict + insert, serialise)──► mpsc ──► writer thread
//!                     ▲                                                       │
//!  list()/aggregate() ┘                                   history.json.tmp ──► rename
//! ```
//!
//! The in-memory log is the source of truth for readers.  Appenders never
//! wait for the disk: the serialised log is queued for the writer thread,
//! which coalesces bursts and writes only the newest state.  [`flush`]
//! blocks until everything queued before it is on disk.
//!
//! [`flush`]: HistoryStore::flush

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;

use chrono::{DateTime, Duration as ChronoDuration, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{HistoryEntry, Record, RecordKind, StatsSample};
use super::StoreError;

/// Default number of query entries kept.
pub const MAX_QUERY_HISTORY: usize = 500;
/// Default number of stats samples kept (12 h at one sample per minute).
pub const MAX_STATS_HISTORY: usize = 720;

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

/// Per-kind bounds.  Eviction is FIFO.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Retention {
    pub max_queries: usize,
    pub max_stats: usize,
    /// Records older than this are evicted on the next append.
    pub max_age: Option<ChronoDuration>,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            max_queries: MAX_QUERY_HISTORY,
            max_stats: MAX_STATS_HISTORY,
            max_age: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Query analytics computed on demand from the in-memory log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAggregate {
    pub total_queries: usize,
    pub total_tokens: u64,
    pub avg_latency_ms: u64,
    pub avg_tokens_per_query: u64,
    pub queries_today: usize,
    pub queries_this_week: usize,
    /// Queries in the last 24 h bucketed by local hour of day.
    pub queries_by_hour: [u32; 24],
    /// `(YYYY-MM-DD, count)` for the last 7 days, oldest first.
    pub queries_by_day: Vec<(String, u32)>,
}

// ---------------------------------------------------------------------------
// HistoryLog (on-disk shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryLog {
    #[serde(default)]
    queries: VecDeque<HistoryEntry>,
    #[serde(default)]
    stats: VecDeque<StatsSample>,
}

impl HistoryLog {
    fn enforce(&mut self, retention: &Retention, now: DateTime<Utc>) {
        while self.queries.len() > retention.max_queries {
            self.queries.pop_front();
        }
        while self.stats.len() > retention.max_stats {
            self.stats.pop_front();
        }
        if let Some(max_age) = retention.max_age {
            let cutoff = now - max_age;
            while self.queries.front().is_some_and(|e| e.timestamp < cutoff) {
                self.queries.pop_front();
            }
            while self.stats.front().is_some_and(|s| s.timestamp < cutoff) {
                self.stats.pop_front();
            }
        }
    }
}

enum WriteRequest {
    Persist(String),
    Flush(mpsc::Sender<()>),
}

// ---------------------------------------------------------------------------
// HistoryStore
// ---------------------------------------------------------------------------

/// Shared history log.  Construct once at startup and share via `Arc`.
pub struct HistoryStore {
    path: PathBuf,
    retention: Retention,
    log: Mutex<HistoryLog>,
    writer: Mutex<Option<mpsc::Sender<WriteRequest>>>,
    writer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl HistoryStore {
    /// Open (or create) the log at `path` with default retention.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_retention(path, Retention::default())
    }

    /// Open with explicit bounds.
    ///
    /// A missing file starts an empty log.  A file that cannot be parsed is
    /// moved aside to `<name>.corrupt` and an empty log is started.
    pub fn open_with_retention(
        path: impl AsRef<Path>,
        retention: Retention,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut log = load(&path)?;
        log.enforce(&retention, Utc::now());

        log::info!(
            "history: loaded {} queries, {} stats samples from {}",
            log.queries.len(),
            log.stats.len(),
            path.display()
        );

        let (tx, rx) = mpsc::channel();
        let writer_path = path.clone();
        let handle = std::thread::Builder::new()
            .name("history-writer".into())
            .spawn(move || writer_loop(&writer_path, rx))?;

        Ok(Self {
            path,
            retention,
            log: Mutex::new(log),
            writer: Mutex::new(Some(tx)),
            writer_handle: Mutex::new(Some(handle)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record.  Eviction and insertion happen under one lock;
    /// persistence happens later on the writer thread.
    pub fn append(&self, record: impl Into<Record>) {
        let record = record.into();
        let mut log = self.lock_log();

        match record {
            Record::Query(entry) => log.queries.push_back(entry),
            Record::Stats(sample) => log.stats.push_back(sample),
        }
        log.enforce(&self.retention, Utc::now());

        // Serialise and enqueue while still holding the lock so the writer
        // sees states in append order.
        match serde_json::to_string_pretty(&*log) {
            Ok(json) => self.enqueue(WriteRequest::Persist(json)),
            Err(e) => log::warn!("history: {}", StoreError::Serde(e)),
        }
    }

    /// Records of one kind, newest first.
    pub fn list(&self, kind: RecordKind, limit: usize, offset: usize) -> Vec<Record> {
        match kind {
            RecordKind::Query => self
                .queries(limit, offset)
                .into_iter()
                .map(Record::Query)
                .collect(),
            RecordKind::Stats => self
                .stats(limit, offset)
                .into_iter()
                .map(Record::Stats)
                .collect(),
        }
    }

    /// Query entries, newest first.
    pub fn queries(&self, limit: usize, offset: usize) -> Vec<HistoryEntry> {
        let log = self.lock_log();
        log.queries.iter().rev().skip(offset).take(limit).cloned().collect()
    }

    /// Stats samples, newest first.
    pub fn stats(&self, limit: usize, offset: usize) -> Vec<StatsSample> {
        let log = self.lock_log();
        log.stats.iter().rev().skip(offset).take(limit).copied().collect()
    }

    /// The last `limit` stats samples in chronological order (for charts).
    pub fn recent_stats(&self, limit: usize) -> Vec<StatsSample> {
        let mut samples = self.stats(limit, 0);
        samples.reverse();
        samples
    }

    pub fn query_count(&self) -> usize {
        self.lock_log().queries.len()
    }

    /// Analytics over the retained queries as of now.
    pub fn aggregate(&self) -> QueryAggregate {
        self.aggregate_at(Utc::now())
    }

    /// Analytics over the retained queries as of `now`.
    pub fn aggregate_at(&self, now: DateTime<Utc>) -> QueryAggregate {
        let log = self.lock_log();
        let queries = &log.queries;

        let day_ago = now - ChronoDuration::hours(24);
        let week_ago = now - ChronoDuration::days(7);

        let total_queries = queries.len();
        let total_tokens: u64 = queries
            .iter()
            .map(|q| u64::from(q.token_count.unwrap_or(0)))
            .sum();
        let total_latency: u64 = queries.iter().map(|q| q.latency_ms).sum();

        let mut queries_today = 0;
        let mut queries_this_week = 0;
        let mut queries_by_hour = [0u32; 24];
        let mut by_day: BTreeMap<String, u32> = BTreeMap::new();

        for q in queries {
            if q.timestamp > day_ago {
                queries_today += 1;
                let hour = q.timestamp.with_timezone(&Local).hour() as usize;
                queries_by_hour[hour] += 1;
            }
            if q.timestamp > week_ago {
                queries_this_week += 1;
                let day = q.timestamp.with_timezone(&Local).format("%Y-%m-%d").to_string();
                *by_day.entry(day).or_insert(0) += 1;
            }
        }

        let avg = |total: u64| {
            if total_queries == 0 {
                0
            } else {
                (total as f64 / total_queries as f64).round() as u64
            }
        };

        QueryAggregate {
            total_queries,
            total_tokens,
            avg_latency_ms: avg(total_latency),
            avg_tokens_per_query: avg(total_tokens),
            queries_today,
            queries_this_week,
            queries_by_hour,
            queries_by_day: by_day.into_iter().collect(),
        }
    }

    /// Drop every query entry.  Stats samples are kept.
    pub fn clear_queries(&self) {
        let mut log = self.lock_log();
        log.queries.clear();
        match serde_json::to_string_pretty(&*log) {
            Ok(json) => self.enqueue(WriteRequest::Persist(json)),
            Err(e) => log::warn!("history: {}", StoreError::Serde(e)),
        }
        log::info!("history: query log cleared");
    }

    /// Block until every append made before this call has been written.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.enqueue(WriteRequest::Flush(ack_tx));
        // A closed channel means the writer already exited after draining.
        let _ = ack_rx.recv();
    }

    /// Flush and stop the writer thread.  Further appends stay in memory only.
    pub fn close(&self) {
        let sender = match self.writer.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let handle = match self.writer_handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("history: writer thread panicked");
            }
        }
    }

    fn enqueue(&self, request: WriteRequest) {
        let guard = match self.writer.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(request).is_err() {
                    log::warn!("history: writer thread is gone, record kept in memory only");
                }
            }
            None => log::debug!("history: store closed, record kept in memory only"),
        }
    }

    fn lock_log(&self) -> MutexGuard<'_, HistoryLog> {
        match self.log.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

fn load(path: &Path) -> Result<HistoryLog, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HistoryLog::default()),
        Err(e) => return Err(StoreError::Io(e)),
    };

    match serde_json::from_str::<HistoryLog>(&content) {
        Ok(log) => Ok(log),
        Err(e) => {
            let aside = path.with_extension("json.corrupt");
            log::warn!(
                "history: {} is unreadable ({e}); moving it to {} and starting empty",
                path.display(),
                aside.display()
            );
            std::fs::rename(path, &aside)?;
            Ok(HistoryLog::default())
        }
    }
}

fn writer_loop(path: &Path, rx: mpsc::Receiver<WriteRequest>) {
    while let Ok(first) = rx.recv() {
        let mut latest: Option<String> = None;
        let mut acks: Vec<mpsc::Sender<()>> = Vec::new();

        // Coalesce everything already queued into one write.
        for request in std::iter::once(first).chain(rx.try_iter()) {
            match request {
                WriteRequest::Persist(json) => latest = Some(json),
                WriteRequest::Flush(ack) => acks.push(ack),
            }
        }

        if let Some(json) = latest {
            if let Err(e) = write_atomic(path, &json) {
                log::warn!("history: persist failed: {e}");
            }
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
    log::debug!("history: writer stopped");
}

fn write_atomic(path: &Path, json: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::entry::TokenUsage;
    use tempfile::TempDir;

    fn store_with(dir: &TempDir, retention: Retention) -> HistoryStore {
        HistoryStore::open_with_retention(dir.path().join("history.json"), retention).unwrap()
    }

    fn query(i: usize) -> HistoryEntry {
        HistoryEntry::built_in(format!("q{i}"), &format!("r{i}"), i as u64)
    }

    #[test]
    fn list_never_exceeds_bound_and_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let store = store_with(
            &dir,
            Retention {
                max_queries: 5,
                ..Retention::default()
            },
        );

        for i in 0..12 {
            store.append(query(i));
        }

        let listed = store.queries(100, 0);
        assert_eq!(listed.len(), 5);
        let names: Vec<_> = listed.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(names, ["q11", "q10", "q9", "q8", "q7"]);
    }

    #[test]
    fn list_paginates_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Retention::default());
        for i in 0..6 {
            store.append(query(i));
        }

        let page = store.list(RecordKind::Query, 2, 2);
        let names: Vec<_> = page
            .iter()
            .map(|r| match r {
                Record::Query(e) => e.query.clone(),
                Record::Stats(_) => panic!("unexpected stats record"),
            })
            .collect();
        assert_eq!(names, ["q3", "q2"]);
    }

    #[test]
    fn kinds_are_bounded_independently() {
        let dir = TempDir::new().unwrap();
        let store = store_with(
            &dir,
            Retention {
                max_queries: 2,
                max_stats: 3,
                max_age: None,
            },
        );
        for i in 0..4 {
            store.append(query(i));
            store.append(StatsSample::new(i as f32, 0.0, 0.0));
        }
        assert_eq!(store.queries(10, 0).len(), 2);
        assert_eq!(store.stats(10, 0).len(), 3);
    }

    #[test]
    fn max_age_evicts_old_records() {
        let dir = TempDir::new().unwrap();
        let store = store_with(
            &dir,
            Retention {
                max_age: Some(ChronoDuration::hours(1)),
                ..Retention::default()
            },
        );
        store.append(query(0).with_timestamp(Utc::now() - ChronoDuration::hours(2)));
        store.append(query(1));

        let names: Vec<_> = store.queries(10, 0).into_iter().map(|e| e.query).collect();
        assert_eq!(names, ["q1"]);
    }

    #[test]
    fn flush_persists_and_reopen_restores() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        {
            let store = HistoryStore::open(&path).unwrap();
            store.append(query(1));
            store.append(StatsSample::new(10.0, 20.0, 30.0));
            store.flush();
            assert!(path.exists());
        }

        let reopened = HistoryStore::open(&path).unwrap();
        assert_eq!(reopened.queries(10, 0)[0].query, "q1");
        assert_eq!(reopened.stats(10, 0).len(), 1);
    }

    #[test]
    fn file_is_human_readable_json() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Retention::default());
        store.append(query(7));
        store.flush();

        let text = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["queries"][0]["query"], "q7");
        assert_eq!(value["queries"][0]["handler"], "built_in");
        assert!(text.contains('\n'));
    }

    #[test]
    fn corrupt_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = HistoryStore::open(&path).unwrap();
        assert_eq!(store.query_count(), 0);
        assert!(dir.path().join("history.json.corrupt").exists());
    }

    #[test]
    fn aggregate_sums_tokens_and_latency() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Retention::default());
        let now = Utc::now();

        store.append(HistoryEntry::built_in("time", "noon", 100));
        store.append(HistoryEntry::llm(
            "why",
            "because",
            TokenUsage {
                prompt: Some(10),
                completion: Some(20),
                total: 30,
            },
            Some("gpt-4o-mini".into()),
            300,
        ));
        store.append(
            HistoryEntry::built_in("old", "x", 200).with_timestamp(now - ChronoDuration::days(3)),
        );

        let agg = store.aggregate_at(now);
        assert_eq!(agg.total_queries, 3);
        assert_eq!(agg.total_tokens, 30);
        assert_eq!(agg.avg_latency_ms, 200);
        assert_eq!(agg.avg_tokens_per_query, 10);
        assert_eq!(agg.queries_today, 2);
        assert_eq!(agg.queries_this_week, 3);
        assert_eq!(agg.queries_by_hour.iter().sum::<u32>(), 2);
        assert_eq!(agg.queries_by_day.iter().map(|(_, n)| n).sum::<u32>(), 3);
    }

    #[test]
    fn aggregate_of_empty_log_is_zero() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Retention::default());
        let agg = store.aggregate();
        assert_eq!(agg.total_queries, 0);
        assert_eq!(agg.avg_latency_ms, 0);
        assert!(agg.queries_by_day.is_empty());
    }

    #[test]
    fn clear_queries_keeps_stats() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, Retention::default());
        store.append(query(1));
        store.append(StatsSample::new(1.0, 2.0, 3.0));

        store.clear_queries();
        assert_eq!(store.query_count(), 0);
        assert_eq!(store.stats(10, 0).len(), 1);
    }

    #[test]
    fn concurrent_appends_respect_bound() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(store_with(
            &dir,
            Retention {
                max_queries: 10,
                ..Retention::default()
            },
        ));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.append(query(t * 100 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.query_count(), 10);
        store.flush();
    }
}
