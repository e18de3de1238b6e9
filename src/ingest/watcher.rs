//! Filesystem watcher feeding the ingest coordinator.
//!
//! Wraps notify's debounced watcher and maps its event stream onto
//! [`FileEvent`]s. Only the event shape matters to the coordinator; the
//! watcher can be replaced by anything producing the same stream.

use crate::error::{Error, Result};
use crate::ingest::{FileEvent, FileEventKind, IngestCoordinator};
use crate::types::CancelToken;
use log::{debug, error, warn};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebouncedEvent};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A running watch; dropping it stops nothing — call [`WatchHandle::stop`].
pub struct WatchHandle {
    thread: Option<thread::JoinHandle<()>>,
    token: CancelToken,
}

impl WatchHandle {
    pub fn stop(mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Starts watching `roots` recursively, forwarding debounced events to
/// the coordinator until the token is cancelled.
pub fn watch(
    roots: &[PathBuf],
    coordinator: Arc<IngestCoordinator>,
    debounce_ms: u64,
    token: CancelToken,
) -> Result<WatchHandle> {
    let (tx, rx) = mpsc::channel();
    let mut debouncer = new_debouncer(Duration::from_millis(debounce_ms.max(1)), None, tx)
        .map_err(|e| Error::Internal(format!("failed to create watcher: {}", e)))?;
    for root in roots {
        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| Error::Internal(format!("failed to watch {}: {}", root.display(), e)))?;
        debug!("Watching {}", root.display());
    }

    let thread_token = token.clone();
    let thread = thread::Builder::new()
        .name("fs-watcher".to_string())
        .spawn(move || {
            // Owning the debouncer keeps the underlying watcher alive.
            let _debouncer = debouncer;
            loop {
                match rx.recv_timeout(Duration::from_millis(500)) {
                    Ok(Ok(events)) => {
                        for event in events {
                            for file_event in map_event(&event) {
                                coordinator.submit(file_event);
                            }
                        }
                    }
                    Ok(Err(errors)) => {
                        for e in errors {
                            warn!("Watcher error: {}", e);
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if thread_token.is_cancelled() {
                            return;
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        error!("Watcher channel closed");
                        return;
                    }
                }
            }
        })
        .map_err(|e| Error::Internal(format!("failed to spawn watcher thread: {}", e)))?;

    Ok(WatchHandle {
        thread: Some(thread),
        token,
    })
}

/// Maps one debounced notify event onto zero or more file events.
fn map_event(event: &DebouncedEvent) -> Vec<FileEvent> {
    let paths = &event.paths;
    match &event.kind {
        EventKind::Create(_) => paths
            .iter()
            .filter(|p| p.is_file())
            .map(|p| FileEvent::new(p.clone(), FileEventKind::Create))
            .collect(),
        EventKind::Remove(_) => paths
            .iter()
            .map(|p| FileEvent::new(p.clone(), FileEventKind::Delete))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            vec![FileEvent::new(
                paths[0].clone(),
                FileEventKind::Rename {
                    to: paths[1].clone(),
                },
            )]
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            // Half of a rename: a vanished path is the source, a present
            // one is the destination.
            paths
                .iter()
                .map(|p| {
                    if p.exists() {
                        FileEvent::new(p.clone(), FileEventKind::Create)
                    } else {
                        FileEvent::new(p.clone(), FileEventKind::Delete)
                    }
                })
                .collect()
        }
        EventKind::Modify(_) => paths
            .iter()
            .filter(|p| p.is_file())
            .map(|p| FileEvent::new(p.clone(), FileEventKind::Modify))
            .collect(),
        _ => Vec::new(),
    }
}
