use tracing::{debug, warn};

use crate::{
    outside::{Browser, WindowHandle},
    result::{Error, Result},
};

/// Tracks the home window (the long-lived favorites listing) and the one
/// ephemeral tab a task is processed in.
///
/// Invariant: after every task, whatever way it ended, the ephemeral tab is
/// closed and the home window is focused again. Losing the home window is
/// fatal for the pipeline.
pub struct Windows<'a> {
    browser: &'a dyn Browser,
    home: WindowHandle,
}

impl<'a> Windows<'a> {
    /// Capture the currently focused window as home.
    pub fn new(browser: &'a dyn Browser) -> Result<Self> {
        let home = browser.focused_window()?;
        debug!("Home window is {home:?}");
        Ok(Self { browser, home })
    }

    pub fn home(&self) -> &WindowHandle {
        &self.home
    }

    /// Open a fresh tab, focus it, and load the video page in it.
    ///
    /// A tab that was created but never became usable is closed again before
    /// the error is reported, so a failed open leaves only the home window.
    pub fn open_ephemeral(&self, url: &str) -> Result<WindowHandle> {
        let handle = self.browser.new_window()?;
        let opened = self
            .browser
            .switch_to(&handle)
            .and_then(|()| self.browser.navigate(url));
        if let Err(err) = opened {
            if matches!(err, Error::SessionLost) {
                return Err(Error::SessionLost);
            }
            self.discard(&handle)?;
            return Err(err);
        }
        debug!("Opened ephemeral window {handle:?} for {url}");
        Ok(handle)
    }

    /// Close a half-opened tab and put focus back on home.
    fn discard(&self, handle: &WindowHandle) -> Result<()> {
        match self
            .browser
            .switch_to(handle)
            .and_then(|()| self.browser.close_window())
        {
            Ok(()) => {}
            Err(Error::SessionLost) => return Err(Error::SessionLost),
            Err(err) => warn!("Could not close unusable window: {}", err.reason()),
        }
        self.focus_home()
    }

    /// Close the ephemeral tab and give focus back to the home window.
    ///
    /// Called on every exit path of a task. A failure to close the tab is
    /// tolerated (it may already be gone), but a failure to refocus home
    /// means the session is unusable and is escalated as fatal.
    pub fn release_ephemeral(&self) -> Result<()> {
        match self.browser.close_window() {
            Ok(()) => {}
            Err(Error::SessionLost) => return Err(Error::SessionLost),
            Err(err) => warn!("Could not close ephemeral window: {}", err.reason()),
        }
        self.focus_home()
    }

    /// Focus the home window. The worker's next poll must always start here.
    pub fn focus_home(&self) -> Result<()> {
        self.browser.switch_to(&self.home).map_err(|_| {
            // Home gone (e.g. closed by the operator): nothing left to
            // drive, stop the pipeline
            Error::SessionLost
        })
    }
}
