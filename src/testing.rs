//! Shared test doubles: a scriptable browser, in-memory collaborators, a
//! fake clock, and a scripted completion watch.

use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use serde_json::Value;

use crate::{
    clock::Clock,
    outside::{
        Browser, Element, FileHost, Lookup, RecordFields, RecordId, RecordStore, WindowHandle,
    },
    page::{JS_CLICK_FAVORITES, JS_FAVORITES_VISIBLE, JS_TAKE_INTENT},
    result::{bail, Error, Result},
    watcher::{DownloadWatch, WatchDownloads},
};

/// Deterministic clock: `sleep` advances virtual time instead of blocking.
pub struct FakeClock {
    base: Instant,
    elapsed: Mutex<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
    }
}

struct Window {
    handle: WindowHandle,
    url: String,
}

struct BrowserState {
    windows: Vec<Window>,
    focused: Option<WindowHandle>,
    home: WindowHandle,
    next_window: u32,
    intents: VecDeque<String>,
    logged_in: bool,
    favorites_clicked: bool,
    texts: HashMap<String, String>,
    menu_items: Vec<String>,
    menu_open: bool,
    video_present: bool,
    fail_navigation: Option<String>,
    fail_context_click: bool,
    die_when_idle: bool,
    dead: bool,
}

/// Scriptable in-memory [`Browser`]: one home window, a pending-intent
/// queue, and configurable page content.
pub struct MockBrowser {
    state: Mutex<BrowserState>,
}

impl MockBrowser {
    pub fn new() -> Self {
        let home = WindowHandle("w0".to_owned());
        Self {
            state: Mutex::new(BrowserState {
                windows: vec![Window {
                    handle: home.clone(),
                    url: "about:blank".to_owned(),
                }],
                focused: Some(home.clone()),
                home,
                next_window: 1,
                intents: VecDeque::new(),
                logged_in: true,
                favorites_clicked: false,
                texts: HashMap::new(),
                menu_items: Vec::new(),
                menu_open: false,
                video_present: false,
                fail_navigation: None,
                fail_context_click: false,
                die_when_idle: false,
                dead: false,
            }),
        }
    }

    pub fn queue_intent(&self, url: &str) {
        self.state
            .lock()
            .unwrap()
            .intents
            .push_back(url.to_owned());
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.state.lock().unwrap().logged_in = logged_in;
    }

    pub fn favorites_clicked(&self) -> bool {
        self.state.lock().unwrap().favorites_clicked
    }

    pub fn set_video_present(&self, present: bool) {
        self.state.lock().unwrap().video_present = present;
    }

    pub fn set_menu_items(&self, items: &[&str]) {
        self.state.lock().unwrap().menu_items = items.iter().map(|s| (*s).to_owned()).collect();
    }

    pub fn set_text(&self, selector: &str, text: &str) {
        self.state
            .lock()
            .unwrap()
            .texts
            .insert(selector.to_owned(), text.to_owned());
    }

    /// Make navigation fail for URLs containing the given fragment.
    pub fn fail_navigation_to(&self, fragment: &str) {
        self.state.lock().unwrap().fail_navigation = Some(fragment.to_owned());
    }

    pub fn fail_context_clicks(&self) {
        self.state.lock().unwrap().fail_context_click = true;
    }

    /// Take focus away from every window without closing any, like the gap
    /// in the middle of a tab teardown where no browsing context is current.
    pub fn blur(&self) {
        self.state.lock().unwrap().focused = None;
    }

    /// End the session outright.
    pub fn kill_session(&self) {
        self.state.lock().unwrap().dead = true;
    }

    /// End the session the next time the intent queue is polled empty, so a
    /// worker loop under test winds down instead of spinning forever.
    pub fn die_when_idle(&self) {
        self.state.lock().unwrap().die_when_idle = true;
    }

    pub fn home(&self) -> WindowHandle {
        self.state.lock().unwrap().home.clone()
    }

    pub fn focused(&self) -> WindowHandle {
        self.state.lock().unwrap().focused.clone().unwrap()
    }

    pub fn url_of(&self, handle: &WindowHandle) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .windows
            .iter()
            .find(|w| &w.handle == handle)
            .map(|w| w.url.clone())
    }

    pub fn open_window_count(&self) -> usize {
        self.state.lock().unwrap().windows.len()
    }

    /// Simulate the operator closing a window by hand.
    pub fn drop_window(&self, handle: &WindowHandle) {
        let mut state = self.state.lock().unwrap();
        state.windows.retain(|w| &w.handle != handle);
        if state.focused.as_ref() == Some(handle) {
            state.focused = None;
        }
    }

    fn guard(state: &BrowserState) -> Result<()> {
        if state.dead {
            Err(Error::SessionLost)
        } else {
            Ok(())
        }
    }
}

impl Browser for MockBrowser {
    fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::guard(&state)?;
        if let Some(fragment) = &state.fail_navigation {
            if url.contains(fragment) {
                return bail(format!("Could not load {url}"));
            }
        }
        let focused = match state.focused.clone() {
            Some(handle) => handle,
            None => return bail("No focused window"),
        };
        let window = state
            .windows
            .iter_mut()
            .find(|w| w.handle == focused)
            .expect("focused window exists");
        window.url = url.to_owned();
        Ok(())
    }

    fn execute(&self, script: &str) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        Self::guard(&state)?;

        if script == JS_TAKE_INTENT {
            return match state.intents.pop_front() {
                Some(url) => Ok(Value::String(url)),
                None if state.die_when_idle => {
                    state.dead = true;
                    Err(Error::SessionLost)
                }
                None => Ok(Value::Null),
            };
        }
        if script == JS_FAVORITES_VISIBLE {
            return Ok(Value::Bool(state.logged_in));
        }
        if script == JS_CLICK_FAVORITES {
            if state.logged_in {
                state.favorites_clicked = true;
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(false));
        }
        Ok(Value::Null)
    }

    fn windows(&self) -> Result<Vec<WindowHandle>> {
        let state = self.state.lock().unwrap();
        Self::guard(&state)?;
        Ok(state.windows.iter().map(|w| w.handle.clone()).collect())
    }

    fn focused_window(&self) -> Result<WindowHandle> {
        let state = self.state.lock().unwrap();
        Self::guard(&state)?;
        match &state.focused {
            Some(handle) => Ok(handle.clone()),
            None => bail("No focused window"),
        }
    }

    fn new_window(&self) -> Result<WindowHandle> {
        let mut state = self.state.lock().unwrap();
        Self::guard(&state)?;
        let handle = WindowHandle(format!("w{}", state.next_window));
        state.next_window += 1;
        state.windows.push(Window {
            handle: handle.clone(),
            url: "about:blank".to_owned(),
        });
        Ok(handle)
    }

    fn switch_to(&self, window: &WindowHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::guard(&state)?;
        if state.windows.iter().any(|w| &w.handle == window) {
            state.focused = Some(window.clone());
            // Window scope changed, any open context menu is gone
            state.menu_open = false;
            Ok(())
        } else {
            bail(format!("No such window: {}", window.0))
        }
    }

    fn close_window(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::guard(&state)?;
        let Some(focused) = state.focused.take() else {
            return bail("No focused window");
        };
        state.windows.retain(|w| w.handle != focused);
        state.menu_open = false;
        Ok(())
    }

    fn find(&self, selector: &str) -> Result<Lookup> {
        let state = self.state.lock().unwrap();
        Self::guard(&state)?;
        if selector == "video" {
            return Ok(if state.video_present {
                Lookup::Found(Element("video".to_owned()))
            } else {
                Lookup::NotFound
            });
        }
        if state.texts.contains_key(selector) {
            return Ok(Lookup::Found(Element(selector.to_owned())));
        }
        Ok(Lookup::NotFound)
    }

    fn find_all(&self, _selector: &str) -> Result<Vec<Element>> {
        let state = self.state.lock().unwrap();
        Self::guard(&state)?;
        if !state.menu_open {
            return Ok(Vec::new());
        }
        Ok(state
            .menu_items
            .iter()
            .map(|text| Element(format!("menu:{text}")))
            .collect())
    }

    fn text(&self, element: &Element) -> Result<String> {
        let state = self.state.lock().unwrap();
        Self::guard(&state)?;
        if let Some(text) = element.0.strip_prefix("menu:") {
            return Ok(text.to_owned());
        }
        match state.texts.get(&element.0) {
            Some(text) => Ok(text.clone()),
            None => bail(format!("No text for element {}", element.0)),
        }
    }

    fn click(&self, _element: &Element) -> Result<()> {
        let state = self.state.lock().unwrap();
        Self::guard(&state)?;
        Ok(())
    }

    fn context_click(&self, _element: &Element) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::guard(&state)?;
        if state.fail_context_click {
            return bail("Context click rejected");
        }
        state.menu_open = true;
        Ok(())
    }
}

/// In-memory [`RecordStore`] collecting created records.
pub struct MemoryStore {
    records: Mutex<Vec<RecordFields>>,
    fail: AtomicBool,
    next_id: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn fail_creates(&self) {
        self.fail.store(true, Ordering::Relaxed);
    }

    pub fn records(&self) -> Vec<RecordFields> {
        self.records.lock().unwrap().clone()
    }
}

impl RecordStore for MemoryStore {
    fn create(&self, fields: &RecordFields) -> Result<RecordId> {
        if self.fail.load(Ordering::Relaxed) {
            return bail("Record store unavailable");
        }
        self.records.lock().unwrap().push(fields.clone());
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(RecordId(format!("rec{n}")))
    }
}

/// In-memory [`FileHost`] returning predictable links.
pub struct MemoryHost {
    uploads: Mutex<Vec<PathBuf>>,
    fail: AtomicBool,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail_uploads(&self) {
        self.fail.store(true, Ordering::Relaxed);
    }

    pub fn uploads(&self) -> Vec<PathBuf> {
        self.uploads.lock().unwrap().clone()
    }
}

impl FileHost for MemoryHost {
    fn upload(&self, path: &Path) -> Result<String> {
        if self.fail.load(Ordering::Relaxed) {
            return bail("File host unavailable");
        }
        self.uploads.lock().unwrap().push(path.to_path_buf());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("https://host.example/{name}"))
    }
}

/// Scripted completion-watch factory. Each `watch` call consumes the next
/// plan entry: resolve with a path after that many polls, or never resolve
/// when the plan is exhausted. Tracks how many watches were live at once.
pub struct ScriptedWatcher {
    plan: Mutex<VecDeque<(usize, PathBuf)>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl ScriptedWatcher {
    pub fn never_resolving() -> Self {
        Self {
            plan: Mutex::new(VecDeque::new()),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn resolve_after_polls(&self, polls: usize, path: PathBuf) {
        self.plan.lock().unwrap().push_back((polls, path));
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl WatchDownloads for ScriptedWatcher {
    fn watch(&self, _dir: &Path, _video_id: &str) -> Result<Box<dyn DownloadWatch>> {
        let live = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(live, Ordering::SeqCst);
        let outcome = self.plan.lock().unwrap().pop_front();
        Ok(Box::new(ScriptedWatch {
            outcome: Mutex::new(outcome),
            active: self.active.clone(),
        }))
    }
}

struct ScriptedWatch {
    outcome: Mutex<Option<(usize, PathBuf)>>,
    active: Arc<AtomicUsize>,
}

impl DownloadWatch for ScriptedWatch {
    fn try_found(&self) -> Option<PathBuf> {
        let mut outcome = self.outcome.lock().unwrap();
        match outcome.as_mut() {
            None => None,
            Some((0, path)) => {
                let path = path.clone();
                *outcome = None;
                Some(path)
            }
            Some((polls, _)) => {
                *polls -= 1;
                None
            }
        }
    }
}

impl Drop for ScriptedWatch {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
