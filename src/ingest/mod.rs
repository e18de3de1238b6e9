//! Ingestion coordinator: drives file events through chunking, embedding
//! and both indexers while keeping them consistent.
//!
//! Events are debounced per path (latest kind wins inside the window),
//! then processed by a worker pool. Updates for a single path are
//! serialized; different paths proceed concurrently. A failing indexer
//! side is retried with backoff until both sides agree or the file is
//! marked failed and surfaced in status.

pub mod watcher;

use crate::chunking;
use crate::config::AppConfig;
use crate::constants::{INGEST_MAX_RETRIES, MAX_FILE_SIZE_BYTES};
use crate::embed::CachingEmbedder;
use crate::error::{Error, Result};
use crate::lexical::{detect_language, LexicalIndex};
use crate::types::{CancelToken, IndexStatus};
use crate::vector::{ChunkEmbedding, VectorIndex};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// What happened to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEventKind {
    Create,
    Modify,
    Delete,
    Rename { to: PathBuf },
}

/// One file-change event. For renames, `path` is the source.
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    pub fn new(path: PathBuf, kind: FileEventKind) -> Self {
        Self {
            path,
            kind,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Default)]
struct StatusInner {
    total_files: usize,
    lexical_files: usize,
    semantic_files: usize,
    failed: HashMap<String, String>,
    last_updated: Option<DateTime<Utc>>,
}

struct Shared {
    lexical: Arc<dyn LexicalIndex>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<CachingEmbedder>,
    /// chunk_id -> text hash of what both indexers currently hold.
    chunk_hashes: Mutex<HashMap<String, String>>,
    status: Mutex<StatusInner>,
    inflight: Mutex<HashSet<PathBuf>>,
    inflight_cv: Condvar,
    /// Paths whose events overflowed the queue; rebuilt on the next quiet
    /// period.
    overflow: Mutex<HashSet<PathBuf>>,
    repository: String,
    max_file_size: u64,
    token: CancelToken,
}

impl Shared {
    /// Blocks until no other worker is touching `path`, then claims it.
    fn claim(&self, path: &Path) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        while inflight.contains(path) {
            inflight = self
                .inflight_cv
                .wait(inflight)
                .unwrap_or_else(|e| e.into_inner());
        }
        inflight.insert(path.to_path_buf());
    }

    fn release(&self, path: &Path) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        inflight.remove(path);
        self.inflight_cv.notify_all();
    }

    fn mark_failed(&self, path: &Path, reason: &str) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        status
            .failed
            .insert(path.to_string_lossy().into_owned(), reason.to_string());
        status.last_updated = Some(Utc::now());
    }

    fn mark_done(&self, path: &Path, new_file: bool) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        status.failed.remove(path.to_string_lossy().as_ref());
        if new_file {
            status.lexical_files += 1;
            status.semantic_files += 1;
            // Files discovered outside a bulk batch grow the total.
            status.total_files = status.total_files.max(status.lexical_files);
        }
        status.last_updated = Some(Utc::now());
    }

    fn mark_removed(&self, path: &Path, existed: bool) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        status.failed.remove(path.to_string_lossy().as_ref());
        if existed {
            status.total_files = status.total_files.saturating_sub(1);
            status.lexical_files = status.lexical_files.saturating_sub(1);
            status.semantic_files = status.semantic_files.saturating_sub(1);
        }
        status.last_updated = Some(Utc::now());
    }

    /// Retries `op` with exponential backoff until it succeeds, the retry
    /// budget runs out, or the token is cancelled.
    fn retry<T, F: FnMut() -> Result<T>>(&self, what: &str, mut op: F) -> Result<T> {
        let mut last: Option<Error> = None;
        for attempt in 0..INGEST_MAX_RETRIES.max(1) {
            self.token.check()?;
            if attempt > 0 {
                let backoff = Duration::from_millis(50 * (1 << attempt.min(6)));
                debug!("Retrying {} (attempt {}) after {:?}", what, attempt + 1, backoff);
                thread::sleep(backoff);
            }
            match op() {
                Ok(value) => return Ok(value),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!("{} failed: {}", what, e);
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| Error::Internal(format!("{}: retries exhausted", what))))
    }

    /// Known chunk ids for a file, from the consistency ledger.
    fn chunks_for(&self, prefix: &str) -> HashMap<String, String> {
        let hashes = self.chunk_hashes.lock().unwrap_or_else(|e| e.into_inner());
        hashes
            .iter()
            .filter(|(id, _)| id.starts_with(prefix))
            .map(|(id, hash)| (id.clone(), hash.clone()))
            .collect()
    }

    /// Re-chunks and re-indexes one file on both sides.
    fn sync_file(&self, path: &Path) -> Result<()> {
        self.token.check()?;
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            // Vanished between event and processing: treat as a delete.
            Err(_) => return self.remove_file(path),
        };
        if metadata.len() > self.max_file_size {
            return Err(Error::FileTooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit: self.max_file_size,
            });
        }
        let content = fs::read_to_string(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let language = detect_language(path);
        let chunks = chunking::chunk_file(path, &content, &language);

        let prefix = format!("{}:", path.display());
        let stored = self.chunks_for(&prefix);
        let new_ids: HashSet<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        let stale: Vec<String> = stored
            .keys()
            .filter(|id| !new_ids.contains(id.as_str()))
            .cloned()
            .collect();
        // Unchanged chunks (same id, same content hash) are skipped.
        let changed: Vec<_> = chunks
            .iter()
            .filter(|c| stored.get(&c.chunk_id) != Some(&c.text_hash))
            .collect();

        debug!(
            "Sync {}: {} chunks ({} changed, {} stale)",
            path.display(),
            chunks.len(),
            changed.len(),
            stale.len()
        );

        let was_known = !stored.is_empty();

        // Lexical side is file-granular: reindex the whole file.
        let lexical = Arc::clone(&self.lexical);
        let token = self.token.clone();
        self.retry("lexical index", || {
            lexical
                .index_files(&[path.to_path_buf()], &token)
                .map(|_| ())
        })?;

        // Vector side: delete stale ids, then insert changed chunks.
        if !stale.is_empty() {
            let vectors = Arc::clone(&self.vectors);
            let stale_ref = &stale;
            self.retry("vector delete", || vectors.delete(stale_ref))?;
        }
        if !changed.is_empty() {
            let texts: Vec<&str> = changed.iter().map(|c| c.text.as_str()).collect();
            // The embedder call happens outside any index lock.
            let encoded = self.embedder.encode_batch(&texts)?;
            let embeddings: Vec<ChunkEmbedding> = changed
                .iter()
                .zip(encoded)
                .map(|(c, vector)| ChunkEmbedding {
                    chunk_id: c.chunk_id.clone(),
                    vector,
                })
                .collect();
            let vectors = Arc::clone(&self.vectors);
            let token = self.token.clone();
            let embeddings_ref = &embeddings;
            self.retry("vector insert", || {
                vectors.add_vectors(embeddings_ref, &token)
            })?;
        }

        // Both sides agree; update the ledger.
        {
            let mut hashes = self.chunk_hashes.lock().unwrap_or_else(|e| e.into_inner());
            for id in &stale {
                hashes.remove(id);
            }
            for c in &chunks {
                hashes.insert(c.chunk_id.clone(), c.text_hash.clone());
            }
        }
        self.mark_done(path, !was_known);
        Ok(())
    }

    /// Removes a file from both indexers by chunk-id prefix.
    fn remove_file(&self, path: &Path) -> Result<()> {
        let prefix = format!("{}:", path.display());
        let existed = {
            let hashes = self.chunk_hashes.lock().unwrap_or_else(|e| e.into_inner());
            hashes.keys().any(|id| id.starts_with(&prefix))
        };

        let lexical = Arc::clone(&self.lexical);
        self.retry("lexical delete", || {
            lexical.delete_files(&[path.to_path_buf()])
        })?;
        let vectors = Arc::clone(&self.vectors);
        let prefix_ref = prefix.as_str();
        self.retry("vector delete", || {
            vectors.delete_prefix(prefix_ref).map(|_| ())
        })?;

        let mut hashes = self.chunk_hashes.lock().unwrap_or_else(|e| e.into_inner());
        hashes.retain(|id, _| !id.starts_with(&prefix));
        drop(hashes);
        self.mark_removed(path, existed);
        Ok(())
    }

    /// Runs `op` with the path claimed; never holds two claims at once.
    fn with_claim<T>(&self, path: &Path, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.claim(path);
        let result = op();
        self.release(path);
        result
    }

    fn process(&self, event: &FileEvent) {
        let result = match &event.kind {
            FileEventKind::Create | FileEventKind::Modify => {
                self.with_claim(&event.path, || self.sync_file(&event.path))
            }
            FileEventKind::Delete => self.with_claim(&event.path, || self.remove_file(&event.path)),
            FileEventKind::Rename { to } => self
                .with_claim(&event.path, || self.remove_file(&event.path))
                .and_then(|_| self.with_claim(to, || self.sync_file(to))),
        };
        if let Err(e) = result {
            warn!("Ingest of {} failed: {}", event.path.display(), e);
            self.mark_failed(&event.path, &e.to_string());
        }
    }
}

/// The coordinator: owns the event queue, the debounce collector and the
/// worker pool.
pub struct IngestCoordinator {
    shared: Arc<Shared>,
    event_tx: Sender<FileEvent>,
    collector: Option<thread::JoinHandle<()>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl IngestCoordinator {
    pub fn new(
        lexical: Arc<dyn LexicalIndex>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<CachingEmbedder>,
        config: &AppConfig,
        repository: String,
        token: CancelToken,
    ) -> Self {
        let shared = Arc::new(Shared {
            lexical,
            vectors,
            embedder,
            chunk_hashes: Mutex::new(HashMap::new()),
            status: Mutex::new(StatusInner::default()),
            inflight: Mutex::new(HashSet::new()),
            inflight_cv: Condvar::new(),
            overflow: Mutex::new(HashSet::new()),
            repository,
            max_file_size: MAX_FILE_SIZE_BYTES,
            token: token.clone(),
        });

        let (event_tx, event_rx) = bounded::<FileEvent>(config.watcher.queue_capacity);
        let worker_count = num_cpus::get().max(1);
        let (work_tx, work_rx) = bounded::<FileEvent>(worker_count * 2);

        let collector = {
            let shared = Arc::clone(&shared);
            let debounce = Duration::from_millis(config.watcher.debounce_ms.max(1));
            thread::spawn(move || collector_loop(shared, event_rx, work_tx, debounce))
        };

        let workers = (0..worker_count)
            .map(|i| {
                let shared = Arc::clone(&shared);
                let work_rx = work_rx.clone();
                thread::Builder::new()
                    .name(format!("ingest-{}", i))
                    .spawn(move || worker_loop(shared, work_rx))
                    .expect("spawn ingest worker")
            })
            .collect();

        Self {
            shared,
            event_tx,
            collector: Some(collector),
            workers,
        }
    }

    /// Enqueues an event. A full queue coalesces the path into the
    /// overflow set, to be rebuilt on the next quiet period.
    pub fn submit(&self, event: FileEvent) {
        if let Err(crossbeam_channel::TrySendError::Full(event)) = self.event_tx.try_send(event) {
            debug!("Event queue full; deferring {}", event.path.display());
            self.shared
                .overflow
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(event.path);
        }
    }

    /// Indexes a set of files synchronously, in parallel. Used for the
    /// initial bulk build; progress is reported as (done, total).
    pub fn bulk_index<F: Fn(usize, usize) + Sync>(
        &self,
        paths: &[PathBuf],
        progress: F,
    ) -> Result<usize> {
        {
            let mut status = self.shared.status.lock().unwrap_or_else(|e| e.into_inner());
            status.total_files = status.total_files.max(paths.len());
        }
        let done = std::sync::atomic::AtomicUsize::new(0);
        let succeeded: usize = paths
            .par_iter()
            .map(|path| {
                if self.shared.token.is_cancelled() {
                    return 0usize;
                }
                let result = self.shared.with_claim(path, || self.shared.sync_file(path));
                let finished = done.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                progress(finished, paths.len());
                match result {
                    Ok(()) => 1,
                    Err(e) => {
                        warn!("Bulk index of {} failed: {}", path.display(), e);
                        self.shared.mark_failed(path, &e.to_string());
                        0
                    }
                }
            })
            .sum();
        self.shared.token.check()?;
        info!("Bulk indexed {}/{} files", succeeded, paths.len());
        Ok(succeeded)
    }

    /// Current indexing status snapshot.
    pub fn status(&self) -> IndexStatus {
        let status = self.shared.status.lock().unwrap_or_else(|e| e.into_inner());
        let pct = |done: usize| {
            if status.total_files == 0 {
                100.0
            } else {
                (done as f32 / status.total_files as f32 * 100.0).min(100.0)
            }
        };
        IndexStatus {
            repository: self.shared.repository.clone(),
            lexical_progress_pct: pct(status.lexical_files),
            semantic_progress_pct: pct(status.semantic_files),
            total_files: status.total_files,
            indexed_files: status.lexical_files,
            failed_files: status.failed.keys().cloned().collect(),
            last_updated: status.last_updated,
        }
    }

    /// Drains the pipeline and joins all threads.
    pub fn shutdown(mut self) {
        drop(self.event_tx);
        if let Some(collector) = self.collector.take() {
            let _ = collector.join();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Debounce loop: coalesces events per path inside the window (latest
/// kind wins) and flushes on quiet, including overflowed paths.
fn collector_loop(
    shared: Arc<Shared>,
    event_rx: Receiver<FileEvent>,
    work_tx: Sender<FileEvent>,
    debounce: Duration,
) {
    let mut pending: HashMap<PathBuf, FileEvent> = HashMap::new();
    loop {
        match event_rx.recv_timeout(debounce) {
            Ok(event) => {
                pending.insert(event.path.clone(), event);
            }
            Err(RecvTimeoutError::Timeout) => {
                // Quiet period: flush pending work and overflowed paths.
                let overflowed: Vec<PathBuf> = {
                    let mut overflow =
                        shared.overflow.lock().unwrap_or_else(|e| e.into_inner());
                    overflow.drain().collect()
                };
                for path in overflowed {
                    pending
                        .entry(path.clone())
                        .or_insert_with(|| FileEvent::new(path, FileEventKind::Modify));
                }
                for (_, event) in pending.drain() {
                    if work_tx.send(event).is_err() {
                        return;
                    }
                }
                if shared.token.is_cancelled() {
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                for (_, event) in pending.drain() {
                    let _ = work_tx.send(event);
                }
                return;
            }
        }
    }
}

fn worker_loop(shared: Arc<Shared>, work_rx: Receiver<FileEvent>) {
    while let Ok(event) = work_rx.recv() {
        if shared.token.is_cancelled() {
            return;
        }
        shared.process(&event);
    }
}
