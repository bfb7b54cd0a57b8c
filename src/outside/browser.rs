use std::{path::Path, time::Duration};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::result::{bail, Error, Result};

/// Opaque browser window/tab identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle(pub String);

/// Opaque in-page element identifier.
#[derive(Debug, Clone)]
pub struct Element(pub(crate) String);

/// Outcome of an element query. Element absence is an expected branch of the
/// state machine, not an exception.
#[derive(Debug)]
pub enum Lookup {
    Found(Element),
    NotFound,
}

impl Lookup {
    pub fn found(self) -> Option<Element> {
        match self {
            Lookup::Found(element) => Some(element),
            Lookup::NotFound => None,
        }
    }
}

/// Interface for driving the authenticated browser session.
///
/// Everything the pipeline needs from the browser: load a URL, run a script
/// in the page context, enumerate and switch windows, and query elements.
/// Any error implying the session itself is gone must surface as
/// [`Error::SessionLost`] so the pipeline stops instead of looping against a
/// dead browser.
pub trait Browser: Sync {
    fn navigate(&self, url: &str) -> Result<()>;

    /// Execute a script in the page context and return its completion value.
    fn execute(&self, script: &str) -> Result<Value>;

    /// Every open window handle. Needs no current browsing context, which
    /// makes it the session liveness probe for the keepalive loop.
    fn windows(&self) -> Result<Vec<WindowHandle>>;

    fn focused_window(&self) -> Result<WindowHandle>;

    /// Open a fresh tab without focusing it.
    fn new_window(&self) -> Result<WindowHandle>;

    fn switch_to(&self, window: &WindowHandle) -> Result<()>;

    /// Close the focused window. Focus afterwards is unspecified; callers
    /// must switch to a known window before the next command.
    fn close_window(&self) -> Result<()>;

    fn find(&self, selector: &str) -> Result<Lookup>;

    fn find_all(&self, selector: &str) -> Result<Vec<Element>>;

    fn text(&self, element: &Element) -> Result<String>;

    fn click(&self, element: &Element) -> Result<()>;

    fn context_click(&self, element: &Element) -> Result<()>;
}

// W3C WebDriver element identifier key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const CSS: &str = "css selector";

/// Errors that mean the session or its window no longer exists.
const FATAL_WIRE_ERRORS: [&str; 3] = ["invalid session id", "no such window", "chrome not reachable"];

#[derive(Debug, Deserialize)]
struct WireResponse {
    value: Value,
}

/// W3C WebDriver client over the JSON wire protocol, attached to a locally
/// running chromedriver.
pub struct WebDriver {
    http: reqwest::blocking::Client,
    session_url: String,
}

impl WebDriver {
    /// Create a browser session on the chromedriver at `base_url`, with the
    /// browser's own download target pointed at `download_dir`.
    pub fn connect(base_url: &str, download_dir: &Path) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "prefs": {
                            "download.default_directory": download_dir.to_string_lossy(),
                            "download.prompt_for_download": false,
                        },
                    },
                },
            },
        });

        let response: WireResponse = http
            .post(format!("{}/session", base_url.trim_end_matches('/')))
            .json(&capabilities)
            .send()?
            .json()?;

        let session_id = response
            .value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Miette(miette::miette!(
                    "Chromedriver refused the session: {}",
                    response.value
                ))
            })?;

        debug!("WebDriver session {session_id} created");

        Ok(Self {
            http,
            session_url: format!("{}/session/{session_id}", base_url.trim_end_matches('/')),
        })
    }

    /// Issue one wire command and unwrap its `value` payload.
    fn cmd(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{path}", self.session_url);
        trace!("{method} {url}");

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        } else {
            // Chromedriver rejects bodyless POSTs
            request = request.json(&json!({}));
        }

        // A transport failure means the driver process itself is gone
        let response: WireResponse = request
            .send()
            .map_err(|_| Error::SessionLost)?
            .json()
            .map_err(|_| Error::SessionLost)?;

        if let Some(code) = response.value.get("error").and_then(Value::as_str) {
            if FATAL_WIRE_ERRORS.contains(&code) {
                return Err(Error::SessionLost);
            }
            let message = response
                .value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(code);
            return bail(format!("{code}: {message}"));
        }

        Ok(response.value)
    }

    fn get(&self, path: &str) -> Result<Value> {
        self.cmd(reqwest::Method::GET, path, None)
    }

    fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.cmd(reqwest::Method::POST, path, Some(body))
    }

    fn find_with(&self, path: &str, selector: &str) -> Result<Value> {
        self.post(path, json!({ "using": CSS, "value": selector }))
    }
}

fn element_of(value: &Value) -> Result<Element> {
    match value.get(ELEMENT_KEY).and_then(Value::as_str) {
        Some(id) => Ok(Element(id.to_owned())),
        None => bail(format!("Malformed element in wire response: {value}")),
    }
}

impl Browser for WebDriver {
    fn navigate(&self, url: &str) -> Result<()> {
        self.post("/url", json!({ "url": url }))?;
        Ok(())
    }

    fn execute(&self, script: &str) -> Result<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": [] }))
    }

    fn windows(&self) -> Result<Vec<WindowHandle>> {
        let value = self.get("/window/handles")?;
        let handles = value
            .as_array()
            .ok_or_else(|| Error::Miette(miette::miette!("Window handles is not an array")))?;

        handles
            .iter()
            .map(|h| match h.as_str() {
                Some(h) => Ok(WindowHandle(h.to_owned())),
                None => bail("Window handle is not a string"),
            })
            .collect()
    }

    fn focused_window(&self) -> Result<WindowHandle> {
        match self.get("/window")? {
            Value::String(handle) => Ok(WindowHandle(handle)),
            other => bail(format!("Window handle is not a string: {other}")),
        }
    }

    fn new_window(&self) -> Result<WindowHandle> {
        let value = self.post("/window/new", json!({ "type": "tab" }))?;
        match value.get("handle").and_then(Value::as_str) {
            Some(handle) => Ok(WindowHandle(handle.to_owned())),
            None => bail(format!("New window response carries no handle: {value}")),
        }
    }

    fn switch_to(&self, window: &WindowHandle) -> Result<()> {
        self.post("/window", json!({ "handle": window.0 }))?;
        Ok(())
    }

    fn close_window(&self) -> Result<()> {
        self.cmd(reqwest::Method::DELETE, "/window", None)?;
        Ok(())
    }

    fn find(&self, selector: &str) -> Result<Lookup> {
        // The plural endpoint reports absence as an empty list rather than a
        // "no such element" error, which keeps absence out of the error path
        let value = self.find_with("/elements", selector)?;
        match value.as_array().and_then(|elements| elements.first()) {
            Some(first) => Ok(Lookup::Found(element_of(first)?)),
            None => Ok(Lookup::NotFound),
        }
    }

    fn find_all(&self, selector: &str) -> Result<Vec<Element>> {
        let value = self.find_with("/elements", selector)?;
        let elements = value
            .as_array()
            .ok_or_else(|| Error::Miette(miette::miette!("Elements is not an array")))?;

        elements.iter().map(element_of).collect()
    }

    fn text(&self, element: &Element) -> Result<String> {
        match self.get(&format!("/element/{}/text", element.0))? {
            Value::String(text) => Ok(text),
            other => bail(format!("Element text is not a string: {other}")),
        }
    }

    fn click(&self, element: &Element) -> Result<()> {
        self.post(&format!("/element/{}/click", element.0), json!({}))?;
        Ok(())
    }

    fn context_click(&self, element: &Element) -> Result<()> {
        // Right click = pointer move to the element, then press/release
        // the secondary button
        self.post(
            "/actions",
            json!({
                "actions": [{
                    "type": "pointer",
                    "id": "mouse",
                    "parameters": { "pointerType": "mouse" },
                    "actions": [
                        {
                            "type": "pointerMove",
                            "duration": 0,
                            "origin": { (ELEMENT_KEY): element.0 },
                            "x": 0,
                            "y": 0,
                        },
                        { "type": "pointerDown", "button": 2 },
                        { "type": "pointerUp", "button": 2 },
                    ],
                }],
            }),
        )?;
        Ok(())
    }
}
