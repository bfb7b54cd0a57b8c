use std::time::Duration;

use indoc::indoc;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    clock::{Clock, Deadline},
    outside::Browser,
    result::{bail, Result},
};

/// How long the operator gets to scan the login QR code.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(120);
const LOGIN_POLL: Duration = Duration::from_secs(2);
const PAGE_SETTLE: Duration = Duration::from_secs(3);

/// Container of one favorited video tile in the listing grid.
const TILE_SELECTOR: &str = r#"div[class*="DivContainer-StyledDivContainerV2"]"#;

/// True when the Favorites tab is rendered and visible, which is how a
/// completed login shows up.
pub(crate) const JS_FAVORITES_VISIBLE: &str = indoc! {r#"
    const el = document.evaluate(
        "//*[contains(text(), 'Favorites')]",
        document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null,
    ).singleNodeValue;
    return !!el && el.offsetParent !== null;
"#};

/// Click the Favorites tab. Returns whether it was found.
pub(crate) const JS_CLICK_FAVORITES: &str = indoc! {r#"
    const el = document.evaluate(
        "//*[contains(text(), 'Favorites')]",
        document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null,
    ).singleNodeValue;
    if (!el) return false;
    el.click();
    return true;
"#};

/// Read and clear the pending-intent slot in one script execution, so the
/// same click is never dispatched twice.
pub(crate) const JS_TAKE_INTENT: &str = indoc! {r#"
    const url = window.__tiksavePendingUrl;
    window.__tiksavePendingUrl = null;
    return url;
"#};

/// Overlay a Save button on every video tile. Clicking one writes the video
/// URL into the single-slot mailbox the worker polls; the page itself never
/// opens a tab.
const JS_INJECT_OVERLAY: &str = indoc! {r#"
    const style = document.createElement('style');
    style.textContent = `
        .tiksave-btn {
            position: absolute;
            top: 10px;
            right: 10px;
            background: rgba(0, 0, 0, 0.7);
            color: white;
            padding: 8px 15px;
            border: none;
            border-radius: 4px;
            cursor: pointer;
            z-index: 9999;
            font-family: Arial, sans-serif;
        }
        .tiksave-btn:hover { background: rgba(0, 0, 0, 0.9); }
    `;
    document.head.appendChild(style);

    function addButtons() {
        const tiles = document.querySelectorAll('TILE_SELECTOR');
        tiles.forEach((tile) => {
            if (tile.querySelector('.tiksave-btn')) return;
            const btn = document.createElement('button');
            btn.className = 'tiksave-btn';
            btn.textContent = 'Save';
            btn.onclick = (e) => {
                e.preventDefault();
                e.stopPropagation();
                const link = tile.querySelector("a[href*='/video/']");
                if (link) window.__tiksavePendingUrl = link.href;
            };
            tile.style.position = 'relative';
            tile.appendChild(btn);
        });
    }

    addButtons();
    new MutationObserver(addButtons).observe(document.body, {
        childList: true,
        subtree: true,
    });
    // Catch tiles the observer misses while scrolling
    setInterval(addButtons, 2000);
"#};

/// The long-lived favorites listing: session bootstrap plus the intent
/// bridge the worker polls.
pub struct FavoritesPage<'a> {
    browser: &'a dyn Browser,
    clock: &'a dyn Clock,
}

impl<'a> FavoritesPage<'a> {
    pub fn new(browser: &'a dyn Browser, clock: &'a dyn Clock) -> Self {
        Self { browser, clock }
    }

    /// Navigate to the operator's profile, wait for them to log in, open
    /// the Favorites tab, and inject the Save-button overlay.
    ///
    /// Failing to reach the favorites surface leaves nothing to orchestrate,
    /// so every error here is fatal for the pipeline.
    pub fn open(&self, username: &str) -> Result<()> {
        info!("Navigating to profile of @{username}");
        self.browser
            .navigate(&format!("https://www.tiktok.com/@{username}"))?;
        self.clock.sleep(PAGE_SETTLE);

        info!("Please log in using the QR code...");
        self.wait_for_login()?;
        self.clock.sleep(PAGE_SETTLE);

        info!("Opening the Favorites tab");
        match self.browser.execute(JS_CLICK_FAVORITES)? {
            Value::Bool(true) => {}
            _ => return bail("Favorites tab disappeared before it could be clicked"),
        }
        self.clock.sleep(PAGE_SETTLE);

        debug!("Injecting the save-button overlay (tiles: {TILE_SELECTOR})");
        self.browser
            .execute(&JS_INJECT_OVERLAY.replace("TILE_SELECTOR", TILE_SELECTOR))?;

        info!("Ready. Click the Save button on any favorited video.");
        Ok(())
    }

    fn wait_for_login(&self) -> Result<()> {
        let deadline = Deadline::after(self.clock, LOGIN_TIMEOUT, LOGIN_POLL);
        let logged_in = deadline.poll_until(|| {
            match self.browser.execute(JS_FAVORITES_VISIBLE) {
                Ok(Value::Bool(true)) => Some(Ok(())),
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            }
        });

        match logged_in {
            Some(Ok(())) => {
                info!("Login detected");
                Ok(())
            }
            Some(Err(err)) => Err(err),
            None => bail("Login timeout, run again and log in faster"),
        }
    }

    /// Non-blocking intent poll: the URL of a video the operator asked to
    /// save, if one is pending. Clears the slot as it reads it.
    pub fn poll_intent(&self) -> Result<Option<String>> {
        match self.browser.execute(JS_TAKE_INTENT)? {
            Value::String(url) if !url.is_empty() => Ok(Some(url)),
            _ => Ok(None),
        }
    }
}
