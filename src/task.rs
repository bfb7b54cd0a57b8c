use std::{
    fmt::Display,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;
use tracing::warn;

/// Where a task currently stands in its pipeline.
///
/// Transitions are monotonic: once a terminal status is reached the task
/// never leaves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Pending,
    Navigated,
    AwaitingFile,
    Completed,
    TimedOut,
    Failed(String),
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::TimedOut | Status::Failed(_))
    }

    /// The status string written into the external record.
    pub fn label(&self) -> String {
        match self {
            Status::Completed => "Downloaded".to_owned(),
            Status::TimedOut => "Failed - Download timeout".to_owned(),
            Status::Failed(reason) => format!("Failed - {reason}"),
            _ => "In progress".to_owned(),
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Navigated => write!(f, "navigated"),
            Status::AwaitingFile => write!(f, "awaiting file"),
            Status::Completed => write!(f, "completed"),
            Status::TimedOut => write!(f, "timed out"),
            Status::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// One video's journey through the pipeline, from accepted intent to
/// terminal record.
#[derive(Debug)]
pub struct DownloadTask {
    pub video_id: String,
    pub source_url: String,
    pub description: Option<String>,
    pub uploader: Option<String>,

    status: Status,
    found_file: Option<PathBuf>,
}

impl DownloadTask {
    pub fn new(video_id: String, source_url: String) -> Self {
        Self {
            video_id,
            source_url,
            description: None,
            uploader: None,
            status: Status::Pending,
            found_file: None,
        }
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn found_file(&self) -> Option<&Path> {
        self.found_file.as_deref()
    }

    /// Move the task to its next status. A terminal status is never left;
    /// a late transition attempt is dropped.
    pub fn advance(&mut self, next: Status) {
        if self.status.is_terminal() {
            warn!(
                "Ignoring transition {} -> {next} for terminal task {}",
                self.status, self.video_id
            );
            return;
        }
        self.status = next;
    }

    pub fn complete(&mut self, path: PathBuf) {
        if self.status.is_terminal() {
            warn!("Ignoring late completion for terminal task {}", self.video_id);
            return;
        }
        self.found_file = Some(path);
        self.status = Status::Completed;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.advance(Status::Failed(reason.into()));
    }
}

static VIDEO_ID_RE: OnceLock<Regex> = OnceLock::new();

fn video_id_re() -> &'static Regex {
    VIDEO_ID_RE.get_or_init(|| Regex::new(r"/video/(\d+)").unwrap())
}

/// Extract the stable video id out of a TikTok video URL.
///
/// The id is the natural key on the external record, so an intent URL
/// without one cannot be processed.
pub fn extract_video_id(url: &str) -> Option<String> {
    video_id_re()
        .captures(url)
        .map(|cap| cap[1].to_owned())
}
