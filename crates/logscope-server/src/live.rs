//! Live-tail broadcaster.
//!
//! Each live connection runs three roles inside one cancellation scope:
//! - reader: applies client [`LiveQuery`] messages to the shared [`Cursor`]
//! - fetcher: polls the searcher and queues a [`LiveBatch`] of new entries
//! - writer: drains the queue into the client
//!
//! Whichever role stops first cancels the other two.
//!
//! The search lower bound is inclusive. The cursor remembers which entries it
//! delivered at its watermark, so an entry is never sent twice while later
//! entries sharing that exact timestamp are still sent.

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, Stream, StreamExt};
use logscope_core::{EntryId, EntrySearcher, LogEntry, SearchRequest};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::LiveTailConfig;
use crate::error::LiveTailError;

/// Client to server message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LiveQuery {
    /// Lower bound of the feed; honored only before anything was delivered.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Query string.
    #[serde(default)]
    pub q: String,
}

/// Server to client message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveBatch {
    /// New entries, most recent first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<LogEntry>,
    /// Search failure, if this batch reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl LiveBatch {
    /// A batch of entries.
    #[must_use]
    pub const fn entries(entries: Vec<LogEntry>) -> Self {
        Self { entries, err: None }
    }

    /// A batch reporting an error.
    #[must_use]
    pub fn error(err: impl Display) -> Self {
        Self {
            entries: Vec::new(),
            err: Some(err.to_string()),
        }
    }
}

/// Per-connection progress of the feed.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    since: Option<DateTime<Utc>>,
    query: String,
    delivered: HashSet<EntryId>,
    watermarked: bool,
}

impl Cursor {
    /// Current lower bound.
    #[must_use]
    pub const fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    /// Current query string.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Applies a client message.
    ///
    /// The query is always replaced. `since` is taken only while no entry has
    /// been delivered; afterwards the watermark owns the lower bound.
    pub fn apply(&mut self, message: LiveQuery) {
        self.query = message.q;
        if !self.watermarked {
            self.since = message.since;
        }
    }

    /// Builds the next search.
    #[must_use]
    pub fn request(&self, page_size: i64) -> SearchRequest {
        SearchRequest {
            since: self.since,
            until: None,
            query: self.query.clone(),
            page_size,
        }
    }

    /// Drops already delivered entries and advances the watermark.
    ///
    /// `entries` must be ordered most recent first. Returns `None` when
    /// nothing new remains.
    pub fn advance(&mut self, mut entries: Vec<LogEntry>) -> Option<Vec<LogEntry>> {
        entries.retain(|e| e.id.is_none_or(|id| !self.delivered.contains(&id)));
        let newest = entries.first()?.timestamp;

        if !self.watermarked || newest != self.since {
            self.delivered.clear();
        }
        self.since = newest;
        self.watermarked = true;
        self.delivered.extend(
            entries
                .iter()
                .filter(|e| e.timestamp == newest)
                .filter_map(|e| e.id),
        );
        Some(entries)
    }
}

/// Runs live-tail sessions against a searcher.
#[derive(Clone)]
pub struct LiveTail {
    searcher: Arc<dyn EntrySearcher>,
    config: LiveTailConfig,
}

impl std::fmt::Debug for LiveTail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveTail")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LiveTail {
    /// Creates a broadcaster over `searcher`.
    #[must_use]
    pub fn new(searcher: Arc<dyn EntrySearcher>, config: LiveTailConfig) -> Self {
        Self { searcher, config }
    }

    /// Runs one session until the client leaves, a send fails, or `cancel`
    /// fires. On return every role has stopped and `cancel` is cancelled.
    pub async fn run<R, W>(&self, reader: R, writer: W, cancel: CancellationToken)
    where
        R: Stream<Item = Result<LiveQuery, LiveTailError>> + Unpin,
        W: Sink<LiveBatch> + Unpin,
        W::Error: Display,
    {
        let cursor = Mutex::new(Cursor::default());
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        tokio::join!(
            read(reader, &cursor, cancel.clone()),
            self.fetch(&cursor, tx, cancel.clone()),
            write(writer, rx, cancel.clone()),
        );
    }

    async fn fetch(
        &self,
        cursor: &Mutex<Cursor>,
        tx: mpsc::Sender<LiveBatch>,
        cancel: CancellationToken,
    ) {
        let _guard = cancel.clone().drop_guard();

        while !cancel.is_cancelled() {
            let request = cursor.lock().request(self.config.page_size);
            let searcher = Arc::clone(&self.searcher);
            let result = tokio::task::spawn_blocking(move || searcher.search(&request)).await;

            let batch = match result {
                Ok(Ok(response)) => cursor.lock().advance(response.entries).map(LiveBatch::entries),
                Ok(Err(e)) => {
                    warn!(error = %e, "Live tail search failed");
                    Some(LiveBatch::error(e))
                }
                Err(e) => Some(LiveBatch::error(e)),
            };

            if let Some(batch) = batch {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    sent = tx.send(batch) => if sent.is_err() { break },
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }
}

async fn read<R>(mut reader: R, cursor: &Mutex<Cursor>, cancel: CancellationToken)
where
    R: Stream<Item = Result<LiveQuery, LiveTailError>> + Unpin,
{
    let _guard = cancel.clone().drop_guard();

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = reader.next() => next,
        };
        match next {
            Some(Ok(message)) => {
                debug!(query = %message.q, "Live tail query updated");
                cursor.lock().apply(message);
            }
            Some(Err(e)) => {
                debug!(error = %e, "Live tail reader stopped");
                break;
            }
            None => break,
        }
    }
}

async fn write<W>(mut writer: W, mut rx: mpsc::Receiver<LiveBatch>, cancel: CancellationToken)
where
    W: Sink<LiveBatch> + Unpin,
    W::Error: Display,
{
    let _guard = cancel.clone().drop_guard();

    loop {
        let batch = tokio::select! {
            () = cancel.cancelled() => break,
            batch = rx.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
        };
        let sent = tokio::select! {
            () = cancel.cancelled() => break,
            sent = writer.send(batch) => sent,
        };
        if let Err(e) = sent {
            debug!(error = %e, "Live tail writer stopped");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use futures::channel::mpsc as fmpsc;
    use logscope_core::{SearchError, SearchResponse, SearchResult};
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    fn make_entry(n: u128, secs: i64) -> LogEntry {
        let mut entry = LogEntry::new(format!("entry {n}")).with_timestamp(at(secs));
        entry.id = Some(EntryId::from_parts(1, n));
        entry
    }

    fn messages(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.message.as_str()).collect()
    }

    /// In-memory searcher: inclusive `since`, newest first, optional failure.
    #[derive(Default)]
    struct MemorySearcher {
        entries: Mutex<Vec<LogEntry>>,
        fail: Mutex<bool>,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl MemorySearcher {
        fn push(&self, entry: LogEntry) {
            self.entries.lock().push(entry);
        }
    }

    impl EntrySearcher for MemorySearcher {
        fn search(&self, request: &SearchRequest) -> SearchResult<SearchResponse> {
            self.requests.lock().push(request.clone());
            if *self.fail.lock() {
                return Err(SearchError::Corrupt("index unavailable".to_string()));
            }
            let mut entries: Vec<LogEntry> = self
                .entries
                .lock()
                .iter()
                .filter(|e| request.since.is_none_or(|since| e.timestamp >= Some(since)))
                .filter(|e| request.query.is_empty() || e.message.contains(&request.query))
                .cloned()
                .collect();
            entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            let count = entries.len() as u64;
            entries.truncate(request.effective_page_size());
            Ok(SearchResponse {
                count,
                entries,
                duration: Duration::ZERO,
            })
        }

        fn entries_count(&self) -> u64 {
            self.entries.lock().len() as u64
        }
    }

    #[test]
    fn cursor_adopts_client_since_until_watermark() {
        let mut cursor = Cursor::default();
        cursor.apply(LiveQuery {
            since: Some(at(5)),
            q: "boom".to_string(),
        });
        assert_eq!(cursor.since(), Some(at(5)));
        assert_eq!(cursor.query(), "boom");

        cursor.advance(vec![make_entry(1, 7)]).unwrap();
        cursor.apply(LiveQuery {
            since: Some(at(0)),
            q: "other".to_string(),
        });
        assert_eq!(cursor.since(), Some(at(7)));
        assert_eq!(cursor.query(), "other");
    }

    #[test]
    fn cursor_request_carries_state() {
        let mut cursor = Cursor::default();
        cursor.apply(LiveQuery {
            since: Some(at(1)),
            q: "level:error".to_string(),
        });
        let request = cursor.request(15);
        assert_eq!(request.since, Some(at(1)));
        assert_eq!(request.until, None);
        assert_eq!(request.query, "level:error");
        assert_eq!(request.page_size, 15);
    }

    #[test]
    fn cursor_never_repeats_watermark_entry() {
        let mut cursor = Cursor::default();
        let first = cursor.advance(vec![make_entry(2, 2), make_entry(1, 1)]).unwrap();
        assert_eq!(messages(&first), ["entry 2", "entry 1"]);
        assert_eq!(cursor.since(), Some(at(2)));

        // The inclusive bound returns the watermark entry again.
        assert!(cursor.advance(vec![make_entry(2, 2)]).is_none());
        assert_eq!(cursor.since(), Some(at(2)));
    }

    #[test]
    fn cursor_delivers_later_entry_with_same_timestamp() {
        let mut cursor = Cursor::default();
        cursor.advance(vec![make_entry(1, 2)]).unwrap();

        let next = cursor.advance(vec![make_entry(2, 2), make_entry(1, 2)]).unwrap();
        assert_eq!(messages(&next), ["entry 2"]);
        assert!(cursor.advance(vec![make_entry(2, 2), make_entry(1, 2)]).is_none());
    }

    #[test]
    fn cursor_forgets_old_watermark_ids() {
        let mut cursor = Cursor::default();
        cursor.advance(vec![make_entry(1, 2)]).unwrap();
        let next = cursor.advance(vec![make_entry(3, 4), make_entry(1, 2)]).unwrap();
        assert_eq!(messages(&next), ["entry 3"]);
        assert_eq!(cursor.since(), Some(at(4)));
        assert_eq!(cursor.delivered.len(), 1);
    }

    #[test]
    fn cursor_empty_search_is_noop() {
        let mut cursor = Cursor::default();
        assert!(cursor.advance(Vec::new()).is_none());
        assert_eq!(cursor.since(), None);
        cursor.apply(LiveQuery {
            since: Some(at(3)),
            q: String::new(),
        });
        assert_eq!(cursor.since(), Some(at(3)));
    }

    #[test]
    fn cursor_handles_undated_entries() {
        let mut cursor = Cursor::default();
        let mut undated = LogEntry::new("undated");
        undated.id = Some(EntryId::from_parts(1, 9));

        assert!(cursor.advance(vec![undated.clone()]).is_some());
        assert!(cursor.advance(vec![undated]).is_none());
    }

    #[test]
    fn batch_serialization_omits_empty_parts() {
        let json = serde_json::to_value(LiveBatch::error("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"err": "boom"}));

        let json = serde_json::to_value(LiveBatch::entries(vec![LogEntry::new("x")])).unwrap();
        assert!(json.get("err").is_none());
        assert_eq!(json["entries"][0]["message"], "x");
    }

    #[test]
    fn query_deserialization_defaults() {
        let query: LiveQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query, LiveQuery::default());

        let query: LiveQuery =
            serde_json::from_str(r#"{"since":"2023-11-14T22:13:25Z","q":"boom"}"#).unwrap();
        assert_eq!(query.since, Some(at(5)));
        assert_eq!(query.q, "boom");
    }

    type Session = (
        fmpsc::UnboundedSender<Result<LiveQuery, LiveTailError>>,
        fmpsc::UnboundedReceiver<LiveBatch>,
        CancellationToken,
        tokio::task::JoinHandle<()>,
    );

    fn start(searcher: Arc<MemorySearcher>, queued: Vec<LiveQuery>) -> Session {
        let (client_tx, client_rx) = fmpsc::unbounded();
        let (server_tx, server_rx) = fmpsc::unbounded();
        for query in queued {
            client_tx.unbounded_send(Ok(query)).unwrap();
        }
        let cancel = CancellationToken::new();
        let tail = LiveTail::new(searcher, LiveTailConfig::default());
        let token = cancel.clone();
        let handle = tokio::spawn(async move { tail.run(client_rx, server_tx, token).await });
        (client_tx, server_rx, cancel, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn session_streams_only_new_entries() {
        let searcher = Arc::new(MemorySearcher::default());
        searcher.push(make_entry(1, 1));
        searcher.push(make_entry(2, 2));
        let (client, mut batches, _cancel, handle) = start(Arc::clone(&searcher), Vec::new());

        let first = batches.next().await.unwrap();
        assert_eq!(messages(&first.entries), ["entry 2", "entry 1"]);

        searcher.push(make_entry(3, 2));
        searcher.push(make_entry(4, 3));
        let second = batches.next().await.unwrap();
        assert_eq!(messages(&second.entries), ["entry 4", "entry 3"]);

        let idle = tokio::time::timeout(Duration::from_secs(5), batches.next()).await;
        assert!(idle.is_err(), "no batch expected without new entries");

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn session_polls_at_interval() {
        let searcher = Arc::new(MemorySearcher::default());
        let (_client, _batches, cancel, handle) = start(Arc::clone(&searcher), Vec::new());

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        cancel.cancel();
        handle.await.unwrap();

        // Ticks at 0s, 1s, 2s and 3s.
        assert_eq!(searcher.requests.lock().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn session_uses_client_query_and_since() {
        let searcher = Arc::new(MemorySearcher::default());
        searcher.push(make_entry(1, 1));
        searcher.push(make_entry(2, 5));
        let query = LiveQuery {
            since: Some(at(3)),
            q: String::new(),
        };
        let (_client, mut batches, cancel, handle) = start(Arc::clone(&searcher), vec![query]);

        let first = batches.next().await.unwrap();
        assert_eq!(messages(&first.entries), ["entry 2"]);
        assert_eq!(searcher.requests.lock()[0].since, Some(at(3)));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn session_reports_search_errors() {
        let searcher = Arc::new(MemorySearcher::default());
        *searcher.fail.lock() = true;
        let (_client, mut batches, cancel, handle) = start(Arc::clone(&searcher), Vec::new());

        let first = batches.next().await.unwrap();
        assert!(first.entries.is_empty());
        assert!(first.err.unwrap().contains("index unavailable"));
        let second = batches.next().await.unwrap();
        assert!(second.err.is_some());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reader_error_ends_session() {
        let searcher = Arc::new(MemorySearcher::default());
        let (client, _batches, cancel, handle) = start(searcher, Vec::new());

        client.unbounded_send(Err(LiveTailError::Closed)).unwrap();
        handle.await.unwrap();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn writer_failure_ends_session() {
        let searcher = Arc::new(MemorySearcher::default());
        searcher.push(make_entry(1, 1));
        let (_client, batches, cancel, handle) = start(searcher, Vec::new());

        drop(batches);
        handle.await.unwrap();
        assert!(cancel.is_cancelled());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cursor_delivers_each_entry_once(
                secs in prop::collection::vec(0_i64..20, 1..40),
                page in 1_usize..10,
            ) {
                let store: Vec<LogEntry> = secs
                    .iter()
                    .enumerate()
                    .map(|(n, s)| make_entry(n as u128, *s))
                    .collect();

                let mut cursor = Cursor::default();
                let mut seen = HashSet::new();
                let mut last_since = None;
                for _ in 0..store.len() + 1 {
                    let mut hits: Vec<LogEntry> = store
                        .iter()
                        .filter(|e| cursor.since().is_none_or(|s| e.timestamp >= Some(s)))
                        .cloned()
                        .collect();
                    hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                    hits.truncate(page);
                    if let Some(batch) = cursor.advance(hits) {
                        for entry in batch {
                            prop_assert!(seen.insert(entry.id));
                        }
                    }
                    prop_assert!(cursor.since() >= last_since);
                    last_since = cursor.since();
                }
            }
        }
    }
}
