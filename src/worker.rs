use std::{
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use tracing::{debug, error, info, warn};

use crate::{
    clock::{Clock, Deadline},
    outside::{Browser, Element, Lookup},
    page::FavoritesPage,
    recorder::Recorder,
    result::{bail, Error, Result},
    task::{extract_video_id, DownloadTask, Status},
    watcher::WatchDownloads,
    windows::Windows,
};

/// Pause between intent polls and between watcher polls.
const POLL: Duration = Duration::from_secs(1);
/// How long a download gets to land on disk before the task times out.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
/// How long the video element gets to appear on the ephemeral page.
const ELEMENT_TIMEOUT: Duration = Duration::from_secs(10);
/// How long the context menu gets to render its items.
const MENU_TIMEOUT: Duration = Duration::from_secs(5);
const MENU_SETTLE: Duration = Duration::from_secs(1);
const PAGE_SETTLE: Duration = Duration::from_secs(3);

const DESCRIPTION_SELECTOR: &str = "span.css-j2a19r-SpanText";
const UPLOADER_SELECTOR: &str = "h3[data-e2e='browse-username']";
const VIDEO_SELECTOR: &str = "video";
const MENU_ITEM_SELECTOR: &str = "span.css-108oj9l-SpanItemText";
const DOWNLOAD_ITEM_TEXT: &str = "download video";

/// The single background loop that advances the pipeline.
///
/// Polls the intent bridge once per second and processes each accepted
/// intent end-to-end before polling again, so at most one task is ever in
/// flight. That serialization is what keeps a single directory watch and a
/// single native download trigger active at a time.
pub struct Worker<'a> {
    page: FavoritesPage<'a>,
    browser: &'a dyn Browser,
    windows: Windows<'a>,
    recorder: Recorder<'a>,
    watcher: &'a dyn WatchDownloads,
    clock: &'a dyn Clock,
    download_dir: &'a Path,
    shutdown: &'a AtomicBool,
}

impl<'a> Worker<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        page: FavoritesPage<'a>,
        browser: &'a dyn Browser,
        windows: Windows<'a>,
        recorder: Recorder<'a>,
        watcher: &'a dyn WatchDownloads,
        clock: &'a dyn Clock,
        download_dir: &'a Path,
        shutdown: &'a AtomicBool,
    ) -> Self {
        Self {
            page,
            browser,
            windows,
            recorder,
            watcher,
            clock,
            download_dir,
            shutdown,
        }
    }

    pub fn run(self) -> Result<()> {
        debug!("Worker started, polling for download intents");

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                debug!("Shutdown requested, worker stopping");
                return Ok(());
            }

            match self.page.poll_intent() {
                Ok(Some(url)) => match self.process(url) {
                    Ok(()) => {}
                    Err(Error::SessionLost) => break,
                    Err(err) => warn!("Task failed unexpectedly: {}", err.reason()),
                },
                Ok(None) => {}
                Err(Error::SessionLost) => break,
                Err(err) => warn!("Intent poll failed: {}", err.reason()),
            }

            self.clock.sleep(POLL);
        }

        info!("Browser session ended, worker stopping");
        self.shutdown.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Process one accepted intent end-to-end: open the ephemeral tab, run
    /// the download state machine in it, record the terminal outcome, and
    /// hand focus back to the home window whichever way it went.
    fn process(&self, url: String) -> Result<()> {
        let Some(video_id) = extract_video_id(&url) else {
            warn!("No video id in intent URL {url}, skipping");
            return Ok(());
        };

        info!("Processing video {video_id} ({url})");
        let mut task = DownloadTask::new(video_id, url);

        if let Err(err) = self.windows.open_ephemeral(&task.source_url) {
            if matches!(err, Error::SessionLost) {
                return Err(Error::SessionLost);
            }
            task.fail(err.reason());
            self.record(&task);
            return self.windows.focus_home();
        }
        task.advance(Status::Navigated);

        let outcome = self.drive(&mut task);
        if matches!(outcome, Err(Error::SessionLost)) {
            let _ = self.windows.release_ephemeral();
            return Err(Error::SessionLost);
        }
        if let Err(err) = outcome {
            warn!("Task for video {} failed: {}", task.video_id, err.reason());
            task.fail(err.reason());
        }

        info!("Video {} finished: {}", task.video_id, task.status());
        self.record(&task);
        self.windows.release_ephemeral()
    }

    /// The per-video state machine, run inside the ephemeral tab. Leaves the
    /// task terminal on success; any error is turned into a failure status
    /// by the caller.
    fn drive(&self, task: &mut DownloadTask) -> Result<()> {
        self.clock.sleep(PAGE_SETTLE);

        // Best-effort scrape; absence never blocks the pipeline
        task.description = self.scrape_text(DESCRIPTION_SELECTOR)?;
        task.uploader = self.scrape_text(UPLOADER_SELECTOR)?;
        debug!(
            "Scraped description: {:?}, uploader: {:?}",
            task.description, task.uploader
        );

        // The watch must be live before the trigger, or a fast download
        // could finish unobserved
        let watch = self
            .watcher
            .watch(self.download_dir, &task.video_id)
            .map_err(|err| err.wrap_err_with(|| "Could not start the download watch"))?;

        self.trigger_native_download()?;
        task.advance(Status::AwaitingFile);

        info!(
            "Download triggered, waiting up to {}s for the file",
            DOWNLOAD_TIMEOUT.as_secs()
        );
        let deadline = Deadline::after(self.clock, DOWNLOAD_TIMEOUT, POLL);
        match deadline.poll_until(|| watch.try_found()) {
            Some(path) => {
                info!("Download completed: {}", path.display());
                task.complete(path);
            }
            None => {
                warn!("No file within {}s", DOWNLOAD_TIMEOUT.as_secs());
                task.advance(Status::TimedOut);
            }
        }

        // The subscription ends here, before the caller releases the window
        drop(watch);
        Ok(())
    }

    /// Right-click the video element and pick the native "Download video"
    /// menu item. Both the element and the menu get a bounded wait.
    fn trigger_native_download(&self) -> Result<()> {
        let deadline = Deadline::after(self.clock, ELEMENT_TIMEOUT, POLL);
        let video = deadline.poll_until(|| match self.browser.find(VIDEO_SELECTOR) {
            Ok(Lookup::Found(element)) => Some(Ok(element)),
            Ok(Lookup::NotFound) => None,
            Err(err) => Some(Err(err)),
        });
        let video = match video {
            Some(video) => video?,
            None => return bail("Video element not found"),
        };

        debug!("Video element found, opening context menu");
        self.browser.context_click(&video)?;
        self.clock.sleep(MENU_SETTLE);

        let deadline = Deadline::after(self.clock, MENU_TIMEOUT, POLL);
        let item = deadline.poll_until(|| self.find_download_item().transpose());
        match item {
            Some(item) => {
                let item = item?;
                info!("Download option found, clicking");
                self.browser.click(&item)
            }
            None => bail("Download video option not found"),
        }
    }

    /// The context-menu item whose text is "Download video", if rendered.
    fn find_download_item(&self) -> Result<Option<Element>> {
        for item in self.browser.find_all(MENU_ITEM_SELECTOR)? {
            let text = self.browser.text(&item)?;
            if text.trim().eq_ignore_ascii_case(DOWNLOAD_ITEM_TEXT) {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    /// Read an element's trimmed text, swallowing everything except session
    /// loss. Used for the metadata scrape, which must not fail the task.
    fn scrape_text(&self, selector: &str) -> Result<Option<String>> {
        let element = match self.browser.find(selector) {
            Ok(lookup) => lookup.found(),
            Err(Error::SessionLost) => return Err(Error::SessionLost),
            Err(_) => None,
        };
        let Some(element) = element else {
            return Ok(None);
        };

        match self.browser.text(&element) {
            Ok(text) => {
                let text = text.trim();
                Ok((!text.is_empty()).then(|| text.to_owned()))
            }
            Err(Error::SessionLost) => Err(Error::SessionLost),
            Err(_) => Ok(None),
        }
    }

    /// Record the terminal task. A store outage is logged and swallowed:
    /// re-triggering a scrape is cheaper than stalling the pipeline.
    fn record(&self, task: &DownloadTask) {
        if let Err(err) = self.recorder.record(task) {
            error!(
                "Could not record video {}: {}",
                task.video_id,
                err.reason()
            );
        }
    }
}
