//! Lifecycle of one arrangement shown for one file set.
//!
//! A [`SplitDiffLayouter`] is created per activation attempt and moves
//! through `not employed -> activating -> active -> not employed`. Once
//! deactivated it is retired for good; showing the files again takes a new
//! instance. All transitions run inside the layouter's [`Monitor`].
//!
//! A layouter created by the manager also watches the manager's monitor: a
//! request queued there while panes are still being opened supersedes the
//! activation, which then stops and tears down what it already opened.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info, instrument, warn};

use super::arrangements::LayoutKind;
use super::description::Zoom;
use super::{spawn_detached, LayoutServices};
use crate::conflict_markers::{find_conflict_marker, SearchDirection};
use crate::errors::LayoutError;
use crate::events::{EventEmitter, Subscription};
use crate::host::{DiffPaneRequest, PaneId, PaneInfo, TextPane};
use crate::monitor::Monitor;
use crate::scroll_sync::ScrollSynchronizer;
use crate::uris::{paths_equal, DiffedUris};

#[derive(Default)]
struct LayouterState {
    employed: bool,
    activating: bool,
    retired: bool,
    zoom: Zoom,
    /// Panes opened by this layouter, in column order.
    panes: Vec<Arc<dyn TextPane>>,
    save_panes: Vec<Arc<dyn TextPane>>,
    merge_pane: Option<Arc<dyn TextPane>>,
    subscriptions: Vec<Subscription>,
    scroll_sync: Option<Arc<ScrollSynchronizer>>,
    /// Merge pane text captured when the layout was torn down.
    merge_text_at_close: Option<String>,
    deactivation_fired: bool,
}

/// Shows a [`LayoutKind`] for one [`DiffedUris`] file set.
pub struct SplitDiffLayouter {
    kind: LayoutKind,
    uris: DiffedUris,
    services: LayoutServices,
    monitor: Monitor,
    /// Queue of the owner; waiters on it supersede an activation.
    owner: Option<Monitor>,
    state: Mutex<LayouterState>,
    did_deactivate: EventEmitter<()>,
    weak: Weak<Self>,
}

impl std::fmt::Debug for SplitDiffLayouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitDiffLayouter")
            .field("kind", &self.kind)
            .field("merged", &self.uris.merged)
            .field("employed", &self.is_employed())
            .finish_non_exhaustive()
    }
}

impl SplitDiffLayouter {
    pub fn new(kind: LayoutKind, uris: DiffedUris, services: LayoutServices) -> Arc<Self> {
        Self::build(kind, uris, services, None)
    }

    /// Like [`new`](Self::new), but an activation gives up with
    /// [`LayoutError::Superseded`] as soon as a request queues on `owner`.
    pub fn with_owner(
        kind: LayoutKind,
        uris: DiffedUris,
        services: LayoutServices,
        owner: Monitor,
    ) -> Arc<Self> {
        Self::build(kind, uris, services, Some(owner))
    }

    fn build(
        kind: LayoutKind,
        uris: DiffedUris,
        services: LayoutServices,
        owner: Option<Monitor>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            kind,
            uris,
            services,
            monitor: Monitor::new(),
            owner,
            state: Mutex::new(LayouterState::default()),
            did_deactivate: EventEmitter::new(),
            weak: weak.clone(),
        })
    }

    fn state(&self) -> MutexGuard<'_, LayouterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn owner_has_waiter(&self) -> bool {
        self.owner.as_ref().is_some_and(Monitor::someone_is_waiting)
    }

    /// Fails once the owner has a request queued. Requests queued on this
    /// layouter's own monitor wait for the activation instead.
    fn check_superseded(&self) -> Result<(), LayoutError> {
        if self.owner_has_waiter() {
            debug!("a queued request supersedes this activation");
            return Err(LayoutError::Superseded);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Activation
    // -----------------------------------------------------------------------

    /// Open all panes of the arrangement.
    ///
    /// Returns whether a conflict marker was found (and focused) in the merge
    /// pane. Fails without side effects if this instance is already
    /// employed, retired, or another request is queued on its monitor or its
    /// owner's. A request queued on the owner while panes are being opened
    /// stops the activation with [`LayoutError::Superseded`] after tearing
    /// down.
    #[instrument(skip(self), fields(layout = %self.kind, merged = %self.uris.merged.display()))]
    pub async fn try_activate(&self, zoom: Zoom) -> Result<bool, LayoutError> {
        let guard = self.monitor.lock_guard().await;
        {
            let mut state = self.state();
            if state.retired {
                return Err(LayoutError::Retired);
            }
            if state.employed {
                return Err(LayoutError::AlreadyEmployed);
            }
            if self.monitor.someone_is_waiting() || self.owner_has_waiter() {
                return Err(LayoutError::Superseded);
            }
            state.employed = true;
            state.activating = true;
            state.zoom = zoom;
        }

        let result = self.activate_employed(zoom).await;
        let torn_down = match &result {
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "layout activation failed, tearing down");
                self.teardown(false).await
            }
        };
        drop(guard);

        if torn_down {
            self.fire_deactivated();
        }
        result
    }

    async fn activate_employed(&self, zoom: Zoom) -> Result<bool, LayoutError> {
        let services = &self.services;

        let weak = self.weak.clone();
        let uris = self.uris.clone();
        let on_deleted = services.events.file_deleted.subscribe(move |path: &PathBuf| {
            if !uris.contains(path) {
                return;
            }
            if let Some(layouter) = weak.upgrade() {
                info!(path = %path.display(), "sibling file deleted, deactivating layout");
                spawn_detached("sibling deleted", async move {
                    layouter.deactivate(false).await;
                });
            }
        });
        self.state().subscriptions.push(on_deleted);

        if let Err(e) = services.settings.apply().await {
            warn!(error = %e, "could not apply temporary settings");
        }

        self.check_superseded()?;
        let description = self.kind.describe(&self.uris, zoom);
        services.host.set_pane_layout(&description).await?;

        let mut merge_index = None;
        for (index, leaf) in description.leaves().into_iter().enumerate() {
            self.check_superseded()?;
            let column = index as u32 + 1;
            let pane = services
                .host
                .open_diff_pane(DiffPaneRequest {
                    old: leaf.old.clone(),
                    new: leaf.new.clone(),
                    title: leaf.title.clone(),
                    column,
                })
                .await?;
            debug!(column, pane = %pane.id(), title = %leaf.title, "opened diff pane");

            let mut state = self.state();
            if leaf.save {
                state.save_panes.push(Arc::clone(&pane));
            }
            if leaf.is_merge_editor {
                state.merge_pane = Some(Arc::clone(&pane));
                merge_index = Some(index);
            }
            state.panes.push(pane);
        }

        let found = self.focus_merge_conflict(SearchDirection::First).unwrap_or(false);
        if let Some(index) = merge_index {
            services.host.focus_column(index as u32 + 1).await?;
        }

        let mut subscriptions = Vec::new();
        let mut scroll_sync = None;
        if services.scroll.enabled {
            let panes = self.panes();
            let sync = Arc::new(ScrollSynchronizer::new(panes, merge_index, services.scroll.clone()));
            let on_range = Arc::clone(&sync);
            subscriptions.push(services.events.visible_range_changed.subscribe(move |pane: &PaneId| {
                on_range.on_visible_range_changed(*pane);
            }));
            let on_change = Arc::clone(&sync);
            subscriptions.push(services.events.document_changed.subscribe(move |path: &PathBuf| {
                on_change.on_document_changed(path);
            }));
            scroll_sync = Some(sync);
        }

        let weak = self.weak.clone();
        subscriptions.push(services.events.visible_panes_changed.subscribe(
            move |visible: &Vec<PaneInfo>| {
                let Some(layouter) = weak.upgrade() else {
                    return;
                };
                if !layouter.is_active() || layouter.grid_intact(visible) {
                    return;
                }
                info!(layout = %layouter.kind, "layout disrupted, deactivating");
                spawn_detached("layout disrupted", async move {
                    layouter.deactivate(false).await;
                });
            },
        ));

        {
            let mut state = self.state();
            state.subscriptions.extend(subscriptions);
            state.scroll_sync = scroll_sync;
            state.activating = false;
        }
        info!(found_conflict = found, "layout active");
        Ok(found)
    }

    /// Whether every pane of this layout is still visible.
    fn grid_intact(&self, visible: &[PaneInfo]) -> bool {
        let state = self.state();
        let mut remaining: Vec<&PaneInfo> = visible.iter().collect();
        state.panes.iter().all(|pane| {
            let id = pane.id();
            let document = pane.document();
            let found = remaining
                .iter()
                .position(|info| info.id == id)
                .or_else(|| remaining.iter().position(|info| paths_equal(&info.document, &document)));
            match found {
                Some(pos) => {
                    remaining.swap_remove(pos);
                    true
                }
                None => false,
            }
        })
    }

    // -----------------------------------------------------------------------
    // Deactivation
    // -----------------------------------------------------------------------

    /// Tear the layout down. Unless `grid_is_ok`, the panes this layouter
    /// opened are closed. Returns `false` if it was not employed.
    #[instrument(skip(self), fields(layout = %self.kind))]
    pub async fn deactivate(&self, grid_is_ok: bool) -> bool {
        let deactivated = {
            let _guard = self.monitor.lock_guard().await;
            self.teardown(grid_is_ok).await
        };
        if deactivated {
            self.fire_deactivated();
        }
        deactivated
    }

    /// Must be called inside the monitor.
    async fn teardown(&self, grid_is_ok: bool) -> bool {
        let (subscriptions, panes) = {
            let mut state = self.state();
            if !state.employed {
                return false;
            }
            state.employed = false;
            state.activating = false;
            state.retired = true;
            state.scroll_sync = None;
            state.save_panes.clear();
            state.merge_text_at_close = state.merge_pane.take().map(|pane| pane.text());
            (
                std::mem::take(&mut state.subscriptions),
                std::mem::take(&mut state.panes),
            )
        };
        drop(subscriptions);

        if !grid_is_ok {
            self.close_panes(&panes).await;
        }
        if let Err(e) = self.services.settings.restore().await {
            warn!(error = %e, "could not restore temporary settings");
        }
        info!("layout deactivated");
        true
    }

    /// Close `panes`, best effort.
    ///
    /// The host may have recreated a pane since it was opened, so a pane
    /// whose id is gone is matched by document instead. Two visible panes on
    /// the same document can be confused this way.
    async fn close_panes(&self, panes: &[Arc<dyn TextPane>]) {
        let host = &self.services.host;
        let mut visible = host.visible_panes();
        for pane in panes {
            let id = pane.id();
            let document = pane.document();
            let found = visible
                .iter()
                .position(|info| info.id == id)
                .or_else(|| visible.iter().position(|info| paths_equal(&info.document, &document)));
            let Some(pos) = found else {
                debug!(pane = %id, document = %document.display(), "pane already closed");
                continue;
            };
            let info = visible.remove(pos);
            if let Err(e) = host.focus_pane(info.id).await {
                warn!(pane = %info.id, error = %e, "could not focus pane for closing");
                continue;
            }
            if let Err(e) = host.close_active_pane().await {
                warn!(pane = %info.id, error = %e, "could not close pane");
            }
        }
    }

    fn fire_deactivated(&self) {
        let first = {
            let mut state = self.state();
            !std::mem::replace(&mut state.deactivation_fired, true)
        };
        if first {
            self.did_deactivate.fire(&());
        }
    }

    // -----------------------------------------------------------------------
    // Operations on an active layout
    // -----------------------------------------------------------------------

    /// Save the panes flagged for saving, in order. Returns whether all of
    /// them were written.
    pub async fn save(&self) -> bool {
        let panes = self.state().save_panes.clone();
        let mut all_saved = true;
        for pane in panes {
            let document = pane.document();
            match self.services.host.save_document(&document).await {
                Ok(true) => debug!(document = %document.display(), "saved"),
                Ok(false) => {
                    warn!(document = %document.display(), "document was not saved");
                    all_saved = false;
                }
                Err(e) => {
                    warn!(document = %document.display(), error = %e, "save failed");
                    all_saved = false;
                }
            }
        }
        all_saved
    }

    /// Move the merge pane's cursor to a conflict marker. `None` when there
    /// is no merge pane.
    pub fn focus_merge_conflict(&self, direction: SearchDirection) -> Option<bool> {
        let pane = self.state().merge_pane.clone()?;
        let text = pane.text();
        match find_conflict_marker(&text, pane.cursor_line(), direction) {
            Some(line) => {
                debug!(line, ?direction, "focusing conflict marker");
                pane.select_line(line);
                Some(true)
            }
            None => Some(false),
        }
    }

    /// Re-arrange the grid for `zoom` without reopening panes. Returns
    /// `false` when the layout is not active.
    #[instrument(skip(self), fields(layout = %self.kind))]
    pub async fn set_zoom(&self, zoom: Zoom) -> Result<bool, LayoutError> {
        let _guard = self.monitor.lock_guard().await;
        {
            let mut state = self.state();
            if !state.employed || state.activating {
                return Ok(false);
            }
            state.zoom = zoom;
        }
        let description = self.kind.describe(&self.uris, zoom);
        self.services.host.set_pane_layout(&description).await?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn kind(&self) -> LayoutKind {
        self.kind
    }

    pub fn uris(&self) -> &DiffedUris {
        &self.uris
    }

    pub fn zoom(&self) -> Zoom {
        self.state().zoom
    }

    pub fn is_employed(&self) -> bool {
        self.state().employed
    }

    pub fn is_activating(&self) -> bool {
        self.state().activating
    }

    pub fn is_active(&self) -> bool {
        let state = self.state();
        state.employed && !state.activating
    }

    pub fn panes(&self) -> Vec<Arc<dyn TextPane>> {
        self.state().panes.clone()
    }

    pub fn merge_pane(&self) -> Option<Arc<dyn TextPane>> {
        self.state().merge_pane.clone()
    }

    /// Text of the merge pane when the layout was torn down, including
    /// edits that were never saved.
    pub fn merge_text_at_close(&self) -> Option<String> {
        self.state().merge_text_at_close.clone()
    }

    pub fn scroll_synchronizer(&self) -> Option<Arc<ScrollSynchronizer>> {
        self.state().scroll_sync.clone()
    }

    /// Fires once, when this instance is deactivated.
    pub fn on_did_deactivate(&self) -> &EventEmitter<()> {
        &self.did_deactivate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::Semaphore;

    use crate::config::ScrollConfig;
    use crate::db::Database;
    use crate::errors::HostError;
    use crate::host::{EditorHost, HostEvents, LocalFs};
    use crate::layout::{LayoutDescription, TemporarySettings};

    const MERGED: &str = "a\n<<<<<<< LOCAL\nb\n=======\nc\n>>>>>>> REMOTE\n";

    struct StaticPane {
        id: PaneId,
        document: PathBuf,
        cursor: Mutex<usize>,
    }

    impl TextPane for StaticPane {
        fn id(&self) -> PaneId {
            self.id
        }
        fn document(&self) -> PathBuf {
            self.document.clone()
        }
        fn text(&self) -> String {
            MERGED.to_string()
        }
        fn line_count(&self) -> usize {
            MERGED.lines().count()
        }
        fn visible_top_line(&self) -> Option<usize> {
            Some(0)
        }
        fn reveal_line_at_top(&self, _line: usize) {}
        fn cursor_line(&self) -> usize {
            *self.cursor.lock().unwrap()
        }
        fn select_line(&self, line: usize) {
            *self.cursor.lock().unwrap() = line;
        }
    }

    /// Host that opens static panes and reports a fixed save result.
    struct StubHost {
        next_id: AtomicUsize,
        panes: Mutex<Vec<PaneInfo>>,
        layouts: Mutex<Vec<LayoutDescription>>,
        saves_succeed: AtomicBool,
        open_gate: Arc<Semaphore>,
    }

    impl StubHost {
        fn new() -> Arc<Self> {
            Self::with_open_permits(Semaphore::MAX_PERMITS)
        }

        fn with_open_permits(permits: usize) -> Arc<Self> {
            Arc::new(Self {
                next_id: AtomicUsize::new(0),
                panes: Mutex::new(Vec::new()),
                layouts: Mutex::new(Vec::new()),
                saves_succeed: AtomicBool::new(true),
                open_gate: Arc::new(Semaphore::new(permits)),
            })
        }

        fn layouts(&self) -> Vec<LayoutDescription> {
            self.layouts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EditorHost for StubHost {
        async fn set_pane_layout(&self, layout: &LayoutDescription) -> Result<(), HostError> {
            self.layouts.lock().unwrap().push(layout.clone());
            Ok(())
        }

        async fn open_diff_pane(&self, request: DiffPaneRequest) -> Result<Arc<dyn TextPane>, HostError> {
            self.open_gate.acquire().await.unwrap().forget();
            let id = PaneId(self.next_id.fetch_add(1, Ordering::SeqCst) as u64 + 1);
            self.panes.lock().unwrap().push(PaneInfo {
                id,
                document: request.new.clone(),
                column: request.column,
            });
            Ok(Arc::new(StaticPane {
                id,
                document: request.new,
                cursor: Mutex::new(0),
            }))
        }

        async fn focus_pane(&self, _pane: PaneId) -> Result<(), HostError> {
            Ok(())
        }

        async fn focus_column(&self, _column: u32) -> Result<(), HostError> {
            Ok(())
        }

        async fn close_active_pane(&self) -> Result<(), HostError> {
            Ok(())
        }

        async fn save_document(&self, _document: &Path) -> Result<bool, HostError> {
            Ok(self.saves_succeed.load(Ordering::SeqCst))
        }

        fn visible_panes(&self) -> Vec<PaneInfo> {
            self.panes.lock().unwrap().clone()
        }

        fn get_setting(&self, _key: &str) -> Option<Value> {
            None
        }

        async fn update_setting(&self, _key: &str, _value: Option<Value>) -> Result<(), HostError> {
            Ok(())
        }

        async fn show_info(&self, _message: &str) {}

        async fn show_error(&self, _message: &str) {}

        async fn pick(&self, _prompt: &str, _options: &[&str]) -> Option<usize> {
            None
        }

        fn set_status(&self, _text: Option<&str>) {}
    }

    fn layouter(host: &Arc<StubHost>) -> Arc<SplitDiffLayouter> {
        let db = Arc::new(Database::in_memory().unwrap());
        db.initialize().unwrap();
        let host_dyn = Arc::clone(host) as Arc<dyn EditorHost>;
        let services = LayoutServices {
            host: Arc::clone(&host_dyn),
            events: HostEvents::new(),
            content: Arc::new(LocalFs),
            settings: Arc::new(TemporarySettings::new(host_dyn, db, BTreeMap::new())),
            scroll: ScrollConfig::default(),
        };
        let uris = DiffedUris::from_sibling_path(Path::new("/work/notes_LOCAL_7.txt")).unwrap();
        SplitDiffLayouter::new(LayoutKind::ThreeDiffToMerged, uris, services)
    }

    #[tokio::test]
    async fn test_operations_before_activation_do_nothing() {
        let host = StubHost::new();
        let layouter = layouter(&host);

        assert_eq!(layouter.focus_merge_conflict(SearchDirection::Next), None);
        assert!(!layouter.set_zoom(Zoom::Left).await.unwrap());
        assert!(layouter.save().await, "nothing to save");
        assert!(host.layouts().is_empty());
    }

    #[tokio::test]
    async fn test_deactivate_never_employed_is_a_no_op() {
        let host = StubHost::new();
        let layouter = layouter(&host);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _sub = layouter.on_did_deactivate().subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!layouter.deactivate(false).await);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        // Still usable; only a real deactivation retires it.
        assert!(layouter.try_activate(Zoom::Default).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_zoom_waits_for_activation() {
        let host = StubHost::with_open_permits(0);
        let layouter = layouter(&host);

        let activation = {
            let layouter = Arc::clone(&layouter);
            tokio::spawn(async move { layouter.try_activate(Zoom::Default).await })
        };
        while !layouter.is_activating() {
            tokio::task::yield_now().await;
        }
        let zoom = {
            let layouter = Arc::clone(&layouter);
            tokio::spawn(async move { layouter.set_zoom(Zoom::Left).await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!zoom.is_finished(), "zoom is queued behind the activation");
        assert_eq!(host.layouts().len(), 1);

        host.open_gate.add_permits(16);
        assert!(activation.await.unwrap().unwrap());
        assert!(zoom.await.unwrap().unwrap());
        assert_eq!(host.layouts().len(), 2);
        assert_eq!(layouter.zoom(), Zoom::Left);
    }

    #[tokio::test]
    async fn test_save_reports_unsaved_document() {
        let host = StubHost::new();
        let layouter = layouter(&host);
        layouter.try_activate(Zoom::Default).await.unwrap();

        assert!(layouter.save().await);
        host.saves_succeed.store(false, Ordering::SeqCst);
        assert!(!layouter.save().await);
    }

    #[tokio::test]
    async fn test_teardown_keeps_merge_text() {
        let host = StubHost::new();
        let layouter = layouter(&host);
        layouter.try_activate(Zoom::Default).await.unwrap();
        assert_eq!(layouter.merge_text_at_close(), None);
        assert_eq!(layouter.focus_merge_conflict(SearchDirection::First), Some(true));

        assert!(layouter.deactivate(true).await);
        assert_eq!(layouter.merge_text_at_close().as_deref(), Some(MERGED));
        assert_eq!(layouter.focus_merge_conflict(SearchDirection::First), None);
    }
}
