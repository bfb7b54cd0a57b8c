use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crossbeam_channel::{bounded, Receiver};
use notify::{
    event::{EventKind, ModifyKind, RenameMode},
    RecommendedWatcher, RecursiveMode, Watcher,
};
use tracing::{debug, trace};

use crate::result::Result;

/// Extensions a finished download may carry.
const FINAL_EXTENSIONS: [&str; 1] = [".mp4"];

/// Suffixes the browser gives partial transfers. Never a completion signal.
const IN_PROGRESS_SUFFIXES: [&str; 3] = [".crdownload", ".part", ".tmp"];

/// One live directory watch bound to one task. Resolves at most once.
pub trait DownloadWatch {
    /// The final resting path of the download, once known. Consumes the
    /// resolution; polled by the worker loop at a fixed interval.
    fn try_found(&self) -> Option<PathBuf>;
}

/// Factory seam for the completion watch, so the state machine can be tested
/// with a scripted watch instead of a live directory.
pub trait WatchDownloads: Sync {
    fn watch(&self, dir: &Path, video_id: &str) -> Result<Box<dyn DownloadWatch>>;
}

/// True for a filename that looks like a finished video download.
fn is_completed_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();

    if IN_PROGRESS_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        return false;
    }
    FINAL_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// The destination path of a rename event, when that rename marks a finished
/// download. The browser writes an in-progress file and renames it to its
/// final name only after the transfer completes, so the rename destination is
/// the completion signal. Create events are only provisional candidates.
fn resolution(kind: &EventKind, paths: &[PathBuf]) -> Option<PathBuf> {
    let dest = match kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => paths.first(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => paths.last(),
        _ => return None,
    };
    dest.filter(|p| is_completed_name(p)).cloned()
}

/// Completion watch factory backed by `notify`'s native watcher, which
/// delivers events on its own notification thread.
pub struct NotifyWatcher;

impl WatchDownloads for NotifyWatcher {
    fn watch(&self, dir: &Path, video_id: &str) -> Result<Box<dyn DownloadWatch>> {
        let (tx, rx) = bounded(1);
        let video_id: Arc<str> = Arc::from(video_id);
        let watched_id = video_id.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else { return };
            trace!("Filesystem event: {event:?}");

            if matches!(event.kind, EventKind::Create(_)) {
                for path in &event.paths {
                    debug!(
                        "Provisional download candidate for video {video_id}: {}",
                        path.display()
                    );
                }
                return;
            }

            if let Some(path) = resolution(&event.kind, &event.paths) {
                // First resolution wins; the channel holds one slot and
                // later sends are dropped
                if tx.try_send(path.clone()).is_ok() {
                    debug!(
                        "Download for video {video_id} completed: {}",
                        path.display()
                    );
                } else {
                    debug!("Watch for video {video_id} already resolved, ignoring event");
                }
            }
        })?;

        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        debug!("Watching {} for video {watched_id}", dir.display());

        Ok(Box::new(NotifyWatch {
            _watcher: watcher,
            rx,
        }))
    }
}

/// Dropping this deregisters the watch and winds down the notify thread.
struct NotifyWatch {
    _watcher: RecommendedWatcher,
    rx: Receiver<PathBuf>,
}

impl DownloadWatch for NotifyWatch {
    fn try_found(&self) -> Option<PathBuf> {
        self.rx.try_recv().ok()
    }
}
