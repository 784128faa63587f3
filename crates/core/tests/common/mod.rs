//! Shared fixtures for the integration tests: an in-process editor host
//! that records what the core asks of it, and a conflict file set on disk.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use mergepane_core::config::ScrollConfig;
use mergepane_core::db::Database;
use mergepane_core::errors::HostError;
use mergepane_core::git::GitClient;
use mergepane_core::host::{
    DiffPaneRequest, EditorHost, HostEvents, LocalFs, PaneId, PaneInfo, TextPane,
};
use mergepane_core::layout::{
    DiffLayouterManager, LayoutDescription, LayoutKind, LayoutServices, TemporarySettings,
};
use mergepane_core::uris::DiffedUris;

pub const SIDE_BY_SIDE: &str = "diffEditor.renderSideBySide";

pub const MERGED_WITH_CONFLICT: &str =
    "fn main() {\n<<<<<<< LOCAL\n    println!(\"ours\");\n=======\n    println!(\"theirs\");\n>>>>>>> REMOTE\n}\n";

// ===========================================================================
// Fake panes
// ===========================================================================

pub struct FakePane {
    id: PaneId,
    document: PathBuf,
    text: Mutex<String>,
    top: Mutex<Option<usize>>,
    cursor: Mutex<usize>,
}

impl FakePane {
    fn new(id: PaneId, document: PathBuf, text: String) -> Self {
        Self {
            id,
            document,
            text: Mutex::new(text),
            top: Mutex::new(Some(0)),
            cursor: Mutex::new(0),
        }
    }
}

impl TextPane for FakePane {
    fn id(&self) -> PaneId {
        self.id
    }

    fn document(&self) -> PathBuf {
        self.document.clone()
    }

    fn text(&self) -> String {
        self.text.lock().unwrap().clone()
    }

    fn line_count(&self) -> usize {
        self.text.lock().unwrap().lines().count().max(1)
    }

    fn visible_top_line(&self) -> Option<usize> {
        *self.top.lock().unwrap()
    }

    fn reveal_line_at_top(&self, line: usize) {
        *self.top.lock().unwrap() = Some(line);
    }

    fn cursor_line(&self) -> usize {
        *self.cursor.lock().unwrap()
    }

    fn select_line(&self, line: usize) {
        *self.cursor.lock().unwrap() = line;
    }
}

// ===========================================================================
// Fake host
// ===========================================================================

#[derive(Default)]
pub struct FakeHostState {
    next_id: u64,
    pub panes: Vec<PaneInfo>,
    pub active: Option<PaneId>,
    pub settings: HashMap<String, Value>,
    pub layouts: Vec<LayoutDescription>,
    pub opened: Vec<DiffPaneRequest>,
    pub closed: Vec<PaneId>,
    pub saved: Vec<PathBuf>,
    pub infos: Vec<String>,
    pub errors: Vec<String>,
    pub prompts: Vec<String>,
    pub answers: VecDeque<Option<usize>>,
    pub status: Option<String>,
    pub fail_layout: bool,
    /// Yield to the scheduler at the start of every pane command.
    pub yield_in_commands: bool,
    /// When set, each `open_diff_pane` consumes one permit first.
    pub open_gate: Option<Arc<Semaphore>>,
}

/// Editor host double. Pane changes are not broadcast on their own; tests
/// fire [`HostEvents`] explicitly.
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<FakeHostState>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeHostState> {
        self.state.lock().unwrap()
    }

    /// Simulate the user opening `document` in a plain editor pane.
    pub fn open_user_pane(&self, document: &Path) -> PaneInfo {
        let mut state = self.state();
        state.next_id += 1;
        let info = PaneInfo {
            id: PaneId(state.next_id),
            document: document.to_path_buf(),
            column: 1,
        };
        state.panes.push(info.clone());
        state.active = Some(info.id);
        info
    }

    /// Queue the answer for the next `pick` prompt.
    pub fn answer(&self, choice: Option<usize>) {
        self.state().answers.push_back(choice);
    }

    pub fn setting(&self, key: &str) -> Option<Value> {
        self.state().settings.get(key).cloned()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.state().prompts.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.state().errors.clone()
    }

    pub fn status(&self) -> Option<String> {
        self.state().status.clone()
    }

    fn yields(&self) -> bool {
        self.state().yield_in_commands
    }

    async fn pause(&self) {
        let (yield_now, gate) = {
            let state = self.state();
            (state.yield_in_commands, state.open_gate.clone())
        };
        if yield_now {
            tokio::task::yield_now().await;
        }
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
    }
}

#[async_trait]
impl EditorHost for FakeHost {
    async fn set_pane_layout(&self, layout: &LayoutDescription) -> Result<(), HostError> {
        if self.yields() {
            tokio::task::yield_now().await;
        }
        let mut state = self.state();
        if state.fail_layout {
            return Err(HostError::CommandFailed {
                command: "setPaneLayout".into(),
                detail: "refused by test".into(),
            });
        }
        state.layouts.push(layout.clone());
        Ok(())
    }

    async fn open_diff_pane(&self, request: DiffPaneRequest) -> Result<Arc<dyn TextPane>, HostError> {
        self.pause().await;
        let text = std::fs::read_to_string(&request.new).unwrap_or_default();
        let mut state = self.state();
        state.next_id += 1;
        let id = PaneId(state.next_id);
        state.panes.push(PaneInfo {
            id,
            document: request.new.clone(),
            column: request.column,
        });
        state.active = Some(id);
        let pane = Arc::new(FakePane::new(id, request.new.clone(), text));
        state.opened.push(request);
        Ok(pane)
    }

    async fn focus_pane(&self, pane: PaneId) -> Result<(), HostError> {
        let mut state = self.state();
        if !state.panes.iter().any(|p| p.id == pane) {
            return Err(HostError::PaneGone(pane.0));
        }
        state.active = Some(pane);
        Ok(())
    }

    async fn focus_column(&self, column: u32) -> Result<(), HostError> {
        let mut state = self.state();
        state.active = state.panes.iter().find(|p| p.column == column).map(|p| p.id);
        Ok(())
    }

    async fn close_active_pane(&self) -> Result<(), HostError> {
        if self.yields() {
            tokio::task::yield_now().await;
        }
        let mut state = self.state();
        if let Some(active) = state.active.take() {
            state.panes.retain(|p| p.id != active);
            state.closed.push(active);
        }
        Ok(())
    }

    async fn save_document(&self, document: &Path) -> Result<bool, HostError> {
        self.state().saved.push(document.to_path_buf());
        Ok(true)
    }

    fn visible_panes(&self) -> Vec<PaneInfo> {
        self.state().panes.clone()
    }

    fn get_setting(&self, key: &str) -> Option<Value> {
        self.setting(key)
    }

    async fn update_setting(&self, key: &str, value: Option<Value>) -> Result<(), HostError> {
        let mut state = self.state();
        match value {
            Some(value) => state.settings.insert(key.to_string(), value),
            None => state.settings.remove(key),
        };
        Ok(())
    }

    async fn show_info(&self, message: &str) {
        self.state().infos.push(message.to_string());
    }

    async fn show_error(&self, message: &str) {
        self.state().errors.push(message.to_string());
    }

    async fn pick(&self, prompt: &str, _options: &[&str]) -> Option<usize> {
        let mut state = self.state();
        state.prompts.push(prompt.to_string());
        state.answers.pop_front().flatten()
    }

    fn set_status(&self, text: Option<&str>) {
        self.state().status = text.map(str::to_string);
    }
}

// ===========================================================================
// Conflict file set
// ===========================================================================

/// Writes `notes_{BASE,LOCAL,REMOTE}_4242.txt` and `notes.txt` into a
/// temporary directory.
pub fn write_conflict_files(dir: &Path, merged: &str) -> DiffedUris {
    write_conflict_set(dir, "notes", merged)
}

/// Writes `{stem}_{BASE,LOCAL,REMOTE}_4242.txt` and `{stem}.txt` into `dir`.
pub fn write_conflict_set(dir: &Path, stem: &str, merged: &str) -> DiffedUris {
    let uris = DiffedUris::from_sibling_path(&dir.join(format!("{stem}_LOCAL_4242.txt")))
        .expect("fixture name follows the sibling convention");
    std::fs::write(&uris.base, "fn main() {\n    println!(\"base\");\n}\n").unwrap();
    std::fs::write(&uris.local, "fn main() {\n    println!(\"ours\");\n}\n").unwrap();
    std::fs::write(&uris.remote, "fn main() {\n    println!(\"theirs\");\n}\n").unwrap();
    std::fs::write(&uris.merged, merged).unwrap();
    uris
}

// ===========================================================================
// Harness
// ===========================================================================

pub struct Harness {
    pub dir: TempDir,
    pub host: Arc<FakeHost>,
    pub events: Arc<HostEvents>,
    pub db: Arc<Database>,
    pub services: LayoutServices,
    pub uris: DiffedUris,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_merged(MERGED_WITH_CONFLICT)
    }

    pub fn with_merged(merged: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let uris = write_conflict_files(dir.path(), merged);
        let host = FakeHost::new();
        let events = HostEvents::new();
        let db = Arc::new(Database::in_memory().unwrap());
        db.initialize().unwrap();

        let mut overrides = BTreeMap::new();
        overrides.insert(SIDE_BY_SIDE.to_string(), Value::Bool(false));
        let settings = Arc::new(TemporarySettings::new(
            host.clone() as Arc<dyn EditorHost>,
            Arc::clone(&db),
            overrides,
        ));
        let services = LayoutServices {
            host: host.clone() as Arc<dyn EditorHost>,
            events: Arc::clone(&events),
            content: Arc::new(LocalFs),
            settings,
            scroll: ScrollConfig::default(),
        };

        Self {
            dir,
            host,
            events,
            db,
            services,
            uris,
        }
    }

    pub fn git(&self) -> GitClient {
        GitClient::new("git", Duration::from_millis(1500))
    }

    pub async fn manager(&self) -> Arc<DiffLayouterManager> {
        self.manager_with(LayoutKind::ALL.to_vec(), LayoutKind::default())
            .await
    }

    pub async fn manager_with(
        &self,
        registry: Vec<LayoutKind>,
        default_kind: LayoutKind,
    ) -> Arc<DiffLayouterManager> {
        DiffLayouterManager::new(
            self.services.clone(),
            Arc::clone(&self.db),
            self.git(),
            registry,
            default_kind,
        )
        .await
        .unwrap()
    }
}

/// Poll `check` until it holds, giving spawned tasks time to run.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Let spawned tasks settle when asserting that something did *not* happen.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
