//! Background workers and the async engine interface.
//!
//! The line formatter and the store/search engine run as independent stateful
//! tokio tasks; the viewer talks to them exclusively through channels. Every
//! query is fire-and-forget with a correlated async response, so the UI loop
//! never blocks on formatting or indexing work.
//!
//! Appends flow through the formatter task into the store task, which keeps
//! per-stream submission order. `reset` travels the same path and bumps the
//! generation id; any work still in flight for an earlier generation is
//! dropped when it reaches the store, and responses carry their generation so
//! the viewer can discard stale ones too.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};

use crate::format::{LineFormatter, LineRecord, RawChunk, TextMeasure};
use crate::minimap::SampleRow;
use crate::search::{MatchWindow, SearchIndex};
use crate::store::{FoldStep, LogStore};

/// Generation id; bumped on every reset so stale responses are identifiable
pub type Generation = u64;

const CHANNEL_BUFFER: usize = 256;

/// Jobs for the formatter task
enum FormatJob {
    Format {
        stream_id: String,
        chunks: Vec<RawChunk>,
        target_width: u32,
        generation: Generation,
    },
    Reset {
        stream_id: String,
        generation: Generation,
    },
}

/// Commands for the store/search task
enum StoreCommand {
    Init {
        stream_ids: Vec<String>,
    },
    Reset {
        stream_id: String,
        generation: Generation,
    },
    ApplyBatch {
        stream_id: String,
        lines: Vec<LineRecord>,
        generation: Generation,
    },
    GetSlice {
        stream_id: String,
        start: usize,
        count: usize,
        sample_start: usize,
        sample_count: usize,
        reply: oneshot::Sender<SliceResponse>,
    },
    Fold {
        stream_id: String,
        start_index: u64,
        reply: oneshot::Sender<FoldResponse>,
    },
    Search {
        stream_ids: Vec<String>,
        query: String,
        reply: oneshot::Sender<SearchResponse>,
    },
    GetMatchWindow {
        pivot: usize,
        reply: oneshot::Sender<MatchWindow>,
    },
}

/// A viewport slice plus its minimap sampling window
#[derive(Debug)]
pub struct SliceResponse {
    pub stream_id: String,
    /// First active position of `lines`
    pub start: usize,
    pub lines: Vec<LineRecord>,
    pub sample: Vec<SampleRow>,
    /// First active position of `sample`
    pub sample_start: usize,
    pub total_count: usize,
    pub generation: Generation,
}

#[derive(Debug)]
pub struct FoldResponse {
    pub stream_id: String,
    pub start_index: u64,
    pub total_count: usize,
    pub generation: Generation,
}

#[derive(Debug)]
pub struct SearchResponse {
    pub total_matches: usize,
    pub window: MatchWindow,
    /// Real index of the first match, for the initial scroll-to
    pub pivot_real_index: Option<u64>,
    pub generation: Generation,
}

/// Unsolicited engine → viewer notifications and forwarded responses
#[derive(Debug)]
pub enum EngineEvent {
    /// A formatted batch landed in the store
    Appended {
        stream_id: String,
        total_count: usize,
        generation: Generation,
    },
    Slice(SliceResponse),
    FoldDone(FoldResponse),
    SearchDone(SearchResponse),
    MatchWindowReady(MatchWindow),
}

/// Async interface to the engine workers. Cheap to clone.
#[derive(Clone)]
pub struct EngineHandle {
    format_tx: mpsc::Sender<FormatJob>,
    store_tx: mpsc::Sender<StoreCommand>,
    event_tx: mpsc::Sender<EngineEvent>,
    generation: Arc<AtomicU64>,
}

impl EngineHandle {
    /// Current generation; responses carrying an older one are stale
    pub fn generation(&self) -> Generation {
        self.generation.load(Ordering::SeqCst)
    }

    /// Allocate state for a set of streams
    pub async fn init(&self, stream_ids: Vec<String>) -> Result<()> {
        self.store_tx
            .send(StoreCommand::Init { stream_ids })
            .await
            .ok()
            .context("store worker gone")
    }

    /// Clear a stream. Bumps the generation so in-flight work for the old
    /// state is dropped on arrival.
    pub async fn reset(&self, stream_id: String) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.format_tx
            .send(FormatJob::Reset {
                stream_id,
                generation,
            })
            .await
            .ok()
            .context("formatter worker gone")
    }

    /// Queue raw chunks for formatting and appending. Fire-and-forget; the
    /// store emits [`EngineEvent::Appended`] per landed batch.
    pub async fn append(
        &self,
        stream_id: String,
        chunks: Vec<RawChunk>,
        target_width: u32,
    ) -> Result<()> {
        self.format_tx
            .send(FormatJob::Format {
                stream_id,
                chunks,
                target_width,
                generation: self.generation(),
            })
            .await
            .ok()
            .context("formatter worker gone")
    }

    /// Fetch a viewport slice and minimap sample, awaiting the response
    pub async fn get_slice(
        &self,
        stream_id: String,
        start: usize,
        count: usize,
        sample_start: usize,
        sample_count: usize,
    ) -> Result<SliceResponse> {
        let (reply, rx) = oneshot::channel();
        self.store_tx
            .send(StoreCommand::GetSlice {
                stream_id,
                start,
                count,
                sample_start,
                sample_count,
                reply,
            })
            .await
            .ok()
            .context("store worker gone")?;
        rx.await.context("store worker dropped the request")
    }

    /// Toggle a fold, awaiting the new total
    pub async fn fold(&self, stream_id: String, start_index: u64) -> Result<FoldResponse> {
        let (reply, rx) = oneshot::channel();
        self.store_tx
            .send(StoreCommand::Fold {
                stream_id,
                start_index,
                reply,
            })
            .await
            .ok()
            .context("store worker gone")?;
        rx.await.context("store worker dropped the request")
    }

    /// Run a search, awaiting the first match window
    pub async fn search(&self, stream_ids: Vec<String>, query: String) -> Result<SearchResponse> {
        let (reply, rx) = oneshot::channel();
        self.store_tx
            .send(StoreCommand::Search {
                stream_ids,
                query,
                reply,
            })
            .await
            .ok()
            .context("store worker gone")?;
        rx.await.context("store worker dropped the request")
    }

    /// Fetch a re-centered match window, awaiting it
    pub async fn match_window(&self, pivot: usize) -> Result<MatchWindow> {
        let (reply, rx) = oneshot::channel();
        self.store_tx
            .send(StoreCommand::GetMatchWindow { pivot, reply })
            .await
            .ok()
            .context("store worker gone")?;
        rx.await.context("store worker dropped the request")
    }

    /// Fire-and-forget slice request; the response arrives as
    /// [`EngineEvent::Slice`].
    pub fn request_slice(
        &self,
        stream_id: String,
        start: usize,
        count: usize,
        sample_start: usize,
        sample_count: usize,
    ) {
        let handle = self.clone();
        tokio::spawn(async move {
            if let Ok(response) = handle
                .get_slice(stream_id, start, count, sample_start, sample_count)
                .await
            {
                let _ = handle.event_tx.send(EngineEvent::Slice(response)).await;
            }
        });
    }

    /// Fire-and-forget fold toggle; completion arrives as
    /// [`EngineEvent::FoldDone`].
    pub fn request_fold(&self, stream_id: String, start_index: u64) {
        let handle = self.clone();
        tokio::spawn(async move {
            if let Ok(response) = handle.fold(stream_id, start_index).await {
                let _ = handle.event_tx.send(EngineEvent::FoldDone(response)).await;
            }
        });
    }

    /// Fire-and-forget search; the result arrives as
    /// [`EngineEvent::SearchDone`].
    pub fn request_search(&self, stream_ids: Vec<String>, query: String) {
        let handle = self.clone();
        tokio::spawn(async move {
            if let Ok(response) = handle.search(stream_ids, query).await {
                let _ = handle.event_tx.send(EngineEvent::SearchDone(response)).await;
            }
        });
    }

    /// Fire-and-forget window refresh; arrives as
    /// [`EngineEvent::MatchWindowReady`].
    pub fn request_match_window(&self, pivot: usize) {
        let handle = self.clone();
        tokio::spawn(async move {
            if let Ok(window) = handle.match_window(pivot).await {
                let _ = handle
                    .event_tx
                    .send(EngineEvent::MatchWindowReady(window))
                    .await;
            }
        });
    }
}

/// Spawn the formatter and store/search workers.
///
/// `measure_factory` builds the text-measurement backend for each stream's
/// formatter. Returns the engine handle and the event stream for the viewer's
/// select loop.
pub fn spawn_engine(
    measure_factory: impl Fn() -> Box<dyn TextMeasure> + Send + 'static,
) -> (EngineHandle, mpsc::Receiver<EngineEvent>) {
    let (format_tx, format_rx) = mpsc::channel(CHANNEL_BUFFER);
    let (store_tx, store_rx) = mpsc::channel(CHANNEL_BUFFER);
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_BUFFER);

    tokio::spawn(run_formatter(format_rx, store_tx.clone(), measure_factory));
    tokio::spawn(run_store(store_rx, event_tx.clone()));

    (
        EngineHandle {
            format_tx,
            store_tx,
            event_tx,
            generation: Arc::new(AtomicU64::new(0)),
        },
        event_rx,
    )
}

async fn run_formatter(
    mut rx: mpsc::Receiver<FormatJob>,
    store_tx: mpsc::Sender<StoreCommand>,
    measure_factory: impl Fn() -> Box<dyn TextMeasure> + Send + 'static,
) {
    let mut formatters: HashMap<String, LineFormatter> = HashMap::new();

    while let Some(job) = rx.recv().await {
        match job {
            FormatJob::Format {
                stream_id,
                chunks,
                target_width,
                generation,
            } => {
                let formatter = formatters
                    .entry(stream_id.clone())
                    .or_insert_with(|| LineFormatter::new(measure_factory()));
                for batch in formatter.format_chunks(&chunks, target_width) {
                    let sent = store_tx
                        .send(StoreCommand::ApplyBatch {
                            stream_id: stream_id.clone(),
                            lines: batch,
                            generation,
                        })
                        .await;
                    if sent.is_err() {
                        return;
                    }
                }
            }
            FormatJob::Reset {
                stream_id,
                generation,
            } => {
                if let Some(formatter) = formatters.get_mut(&stream_id) {
                    formatter.reset();
                }
                // Forward through the same pipeline so the store observes the
                // reset after every batch submitted before it.
                if store_tx
                    .send(StoreCommand::Reset {
                        stream_id,
                        generation,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}

/// Store/search worker state
struct StoreWorker {
    store: LogStore,
    generation: Generation,
    search_query: Option<String>,
    search_streams: Vec<String>,
    search_index: Option<SearchIndex>,
}

impl StoreWorker {
    fn new() -> Self {
        Self {
            store: LogStore::new(),
            generation: 0,
            search_query: None,
            search_streams: Vec::new(),
            search_index: None,
        }
    }

    /// Rebuild the match list if the store changed since the last build
    fn ensure_search(&mut self) -> &SearchIndex {
        if self.search_index.is_none() {
            let query = self.search_query.clone().unwrap_or_default();
            self.search_index = Some(SearchIndex::build(
                &self.store,
                &self.search_streams,
                &query,
            ));
        }
        self.search_index.as_ref().expect("just built")
    }

    fn invalidate_search(&mut self) {
        self.search_index = None;
    }
}

async fn run_store(mut rx: mpsc::Receiver<StoreCommand>, events: mpsc::Sender<EngineEvent>) {
    let mut worker = StoreWorker::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::Init { stream_ids } => {
                worker.store.init(&stream_ids);
            }
            StoreCommand::Reset {
                stream_id,
                generation,
            } => {
                worker.generation = worker.generation.max(generation);
                worker.store.reset(&stream_id);
                worker.invalidate_search();
            }
            StoreCommand::ApplyBatch {
                stream_id,
                lines,
                generation,
            } => {
                if generation < worker.generation {
                    tracing::debug!(stream_id = %stream_id, generation, "dropping stale batch");
                    continue;
                }
                let total_count = worker.store.append(&stream_id, lines);
                worker.invalidate_search();
                let _ = events
                    .send(EngineEvent::Appended {
                        stream_id,
                        total_count,
                        generation,
                    })
                    .await;
            }
            StoreCommand::GetSlice {
                stream_id,
                start,
                count,
                sample_start,
                sample_count,
                reply,
            } => {
                let response = SliceResponse {
                    lines: worker.store.slice(&stream_id, start, count),
                    sample: worker.store.sample(&stream_id, sample_start, sample_count),
                    total_count: worker.store.total_count(&stream_id),
                    generation: worker.generation,
                    stream_id,
                    start,
                    sample_start,
                };
                let _ = reply.send(response);
            }
            StoreCommand::Fold {
                stream_id,
                start_index,
                reply,
            } => {
                // Bounded slices with yields in between keep the worker
                // responsive while a huge group moves.
                let total_count = loop {
                    match worker.store.fold_step(&stream_id, start_index) {
                        FoldStep::Done(total) => break total,
                        FoldStep::More => tokio::task::yield_now().await,
                    }
                };
                worker.invalidate_search();
                let _ = reply.send(FoldResponse {
                    stream_id,
                    start_index,
                    total_count,
                    generation: worker.generation,
                });
            }
            StoreCommand::Search {
                stream_ids,
                query,
                reply,
            } => {
                worker.search_query = Some(query);
                worker.search_streams = stream_ids;
                worker.invalidate_search();
                let generation = worker.generation;
                let index = worker.ensure_search();
                let window = index.window(0);
                let _ = reply.send(SearchResponse {
                    total_matches: index.len(),
                    pivot_real_index: window.entries.first().map(|m| m.real_index),
                    window,
                    generation,
                });
            }
            StoreCommand::GetMatchWindow { pivot, reply } => {
                let window = worker.ensure_search().window(pivot);
                let _ = reply.send(window);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ApproxMeasure;

    fn chunks(messages: &[&str]) -> Vec<RawChunk> {
        messages
            .iter()
            .map(|m| RawChunk {
                message: m.to_string(),
                timestamp: None,
            })
            .collect()
    }

    fn engine() -> (EngineHandle, mpsc::Receiver<EngineEvent>) {
        spawn_engine(|| Box::new(ApproxMeasure::default()) as Box<dyn TextMeasure>)
    }

    async fn wait_for_total(
        events: &mut mpsc::Receiver<EngineEvent>,
        want: usize,
    ) -> Generation {
        loop {
            match events.recv().await.expect("engine alive") {
                EngineEvent::Appended {
                    total_count,
                    generation,
                    ..
                } if total_count >= want => return generation,
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_append_then_slice_round_trip() {
        let (handle, mut events) = engine();
        handle.init(vec!["x".into()]).await.unwrap();
        handle
            .append("x".into(), chunks(&["a", "b", "c"]), 8000)
            .await
            .unwrap();
        wait_for_total(&mut events, 3).await;

        let slice = handle.get_slice("x".into(), 0, 3, 0, 3).await.unwrap();
        assert_eq!(slice.total_count, 3);
        assert_eq!(
            slice.lines.iter().map(|l| l.message.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(slice.sample.len(), 3);
    }

    #[tokio::test]
    async fn test_appends_reflect_in_submission_order() {
        let (handle, mut events) = engine();
        handle.init(vec!["x".into()]).await.unwrap();
        for batch in [&["one"][..], &["two"][..], &["three"][..]] {
            handle.append("x".into(), chunks(batch), 8000).await.unwrap();
        }
        wait_for_total(&mut events, 3).await;

        let slice = handle.get_slice("x".into(), 0, 10, 0, 0).await.unwrap();
        assert_eq!(
            slice.lines.iter().map(|l| l.message.as_str()).collect::<Vec<_>>(),
            vec!["one", "two", "three"]
        );
    }

    #[tokio::test]
    async fn test_search_and_fold_flow() {
        let (handle, mut events) = engine();
        handle.init(vec!["x".into()]).await.unwrap();
        handle
            .append(
                "x".into(),
                chunks(&["##[group]g1", "x", "y", "##[endgroup]", "b"]),
                8000,
            )
            .await
            .unwrap();
        wait_for_total(&mut events, 5).await;

        let found = handle.search(vec!["x".into()], "b".into()).await.unwrap();
        assert_eq!(found.total_matches, 1);
        assert_eq!(found.pivot_real_index, Some(4));

        let folded = handle.fold("x".into(), 0).await.unwrap();
        assert_eq!(folded.total_count, 3);

        // Hidden lines now collapse to one flagged match.
        let found = handle.search(vec!["x".into()], "x".into()).await.unwrap();
        assert_eq!(found.total_matches, 1);
        assert!(found.window.entries[0].in_fold);

        let unfolded = handle.fold("x".into(), 0).await.unwrap();
        assert_eq!(unfolded.total_count, 5);
    }

    #[tokio::test]
    async fn test_reset_drops_stale_generation_work() {
        let (handle, mut events) = engine();
        handle.init(vec!["x".into()]).await.unwrap();

        handle.append("x".into(), chunks(&["old"]), 8000).await.unwrap();
        handle.reset("x".into()).await.unwrap();
        handle.append("x".into(), chunks(&["new"]), 8000).await.unwrap();

        // Wait for the post-reset generation's batch to land.
        loop {
            match events.recv().await.expect("engine alive") {
                EngineEvent::Appended { generation, .. } if generation >= 1 => break,
                _ => {}
            }
        }

        let slice = handle.get_slice("x".into(), 0, 10, 0, 0).await.unwrap();
        assert_eq!(slice.total_count, 1);
        assert_eq!(slice.lines[0].message, "new");
        assert_eq!(slice.generation, 1);
        assert_eq!(handle.generation(), 1);
    }

    #[tokio::test]
    async fn test_search_sees_post_append_state() {
        let (handle, mut events) = engine();
        handle.init(vec!["x".into()]).await.unwrap();
        handle.append("x".into(), chunks(&["alpha"]), 8000).await.unwrap();
        wait_for_total(&mut events, 1).await;

        let found = handle.search(vec!["x".into()], "alpha".into()).await.unwrap();
        assert_eq!(found.total_matches, 1);

        handle.append("x".into(), chunks(&["alpha again"]), 8000).await.unwrap();
        wait_for_total(&mut events, 2).await;

        // The match list is rebuilt against the appended state on demand.
        let window = handle.match_window(0).await.unwrap();
        assert_eq!(window.total, 2);
    }

    #[tokio::test]
    async fn test_request_slice_arrives_as_event() {
        let (handle, mut events) = engine();
        handle.init(vec!["x".into()]).await.unwrap();
        handle.append("x".into(), chunks(&["a"]), 8000).await.unwrap();
        wait_for_total(&mut events, 1).await;

        handle.request_slice("x".into(), 0, 1, 0, 1);
        loop {
            match events.recv().await.expect("engine alive") {
                EngineEvent::Slice(slice) => {
                    assert_eq!(slice.lines.len(), 1);
                    assert_eq!(slice.start, 0);
                    break;
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_empty_query_yields_empty_result() {
        let (handle, _events) = engine();
        handle.init(vec!["x".into()]).await.unwrap();
        let found = handle.search(vec!["x".into()], String::new()).await.unwrap();
        assert_eq!(found.total_matches, 0);
        assert!(found.window.entries.is_empty());
    }
}
