//! Single owner of the active merge layout.
//!
//! The manager watches the visible panes for a BASE/LOCAL/REMOTE sibling
//! file being opened, resolves which arrangement to use, and swaps layouts
//! so that at most one [`SplitDiffLayouter`] is employed at a time. Every
//! switch runs inside the manager's [`Monitor`].

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, info, instrument, warn};

use super::arrangements::LayoutKind;
use super::description::Zoom;
use super::split_layouter::SplitDiffLayouter;
use super::{spawn_detached, LayoutServices};
use crate::config::AppConfig;
use crate::conflict_markers::{contains_conflict_markers, SearchDirection};
use crate::db::{Database, KEY_PREFIX};
use crate::errors::{CoreError, LayoutError};
use crate::events::{EventEmitter, Subscription};
use crate::git::{GitClient, MergeFileOutput};
use crate::host::{ContentAccess, EditorHost, HostEvents, PaneInfo};
use crate::merge::MergeActions;
use crate::monitor::Monitor;
use crate::uris::DiffedUris;

/// Persisted key holding the selected arrangement.
pub fn layout_state_key() -> String {
    format!("{KEY_PREFIX}layout")
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const UNKNOWN_LAYOUT_CHOICES: [&str; 3] = ["Restore default", "Use default once", "Cancel"];
const REOPEN_CHOICES: [&str; 2] = ["Reopen", "Keep closed"];

#[derive(Default)]
struct ManagerState {
    layouter: Option<Arc<SplitDiffLayouter>>,
    /// Keeps the handler for the current layouter's deactivation registered.
    layouter_subscription: Option<Subscription>,
    zoom: Zoom,
    merge_tool_flow: bool,
}

/// Arbitrates which layout, if any, is active.
pub struct DiffLayouterManager {
    services: LayoutServices,
    db: Arc<Database>,
    registry: Vec<LayoutKind>,
    default_kind: LayoutKind,
    merge: MergeActions,
    monitor: Monitor,
    state: Mutex<ManagerState>,
    did_activate: EventEmitter<DiffedUris>,
    did_deactivate: EventEmitter<DiffedUris>,
    subscriptions: Mutex<Vec<Subscription>>,
    weak: Weak<Self>,
}

impl std::fmt::Debug for DiffLayouterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffLayouterManager")
            .field("registry", &self.registry)
            .field("default_kind", &self.default_kind)
            .finish_non_exhaustive()
    }
}

impl DiffLayouterManager {
    /// Create the manager and start watching visible panes.
    ///
    /// Fails only if `registry` is empty. A `default_kind` missing from the
    /// registry is replaced by the first registered arrangement. Setting
    /// backups left behind by an earlier session are restored.
    pub async fn new(
        services: LayoutServices,
        db: Arc<Database>,
        git: GitClient,
        registry: Vec<LayoutKind>,
        default_kind: LayoutKind,
    ) -> Result<Arc<Self>, LayoutError> {
        let Some(&first) = registry.first() else {
            return Err(LayoutError::NoLayouts);
        };
        let default_kind = if registry.contains(&default_kind) {
            default_kind
        } else {
            warn!(%default_kind, fallback = %first, "default layout is not registered");
            first
        };

        if let Err(e) = services.settings.restore().await {
            warn!(error = %e, "could not restore settings left over from a previous session");
        }

        let merge = MergeActions::new(git, Arc::clone(&services.content), Arc::clone(&services.host));
        let manager = Arc::new_cyclic(|weak: &Weak<Self>| Self {
            services,
            db,
            registry,
            default_kind,
            merge,
            monitor: Monitor::new(),
            state: Mutex::new(ManagerState::default()),
            did_activate: EventEmitter::new(),
            did_deactivate: EventEmitter::new(),
            subscriptions: Mutex::new(Vec::new()),
            weak: weak.clone(),
        });

        let weak = Arc::downgrade(&manager);
        let on_visible = manager.services.events.visible_panes_changed.subscribe(
            move |panes: &Vec<PaneInfo>| {
                let Some(manager) = weak.upgrade() else {
                    return;
                };
                let panes = panes.clone();
                spawn_detached("visible panes changed", async move {
                    manager.handle_visible_panes_changed(panes).await;
                });
            },
        );
        manager.subscriptions().push(on_visible);

        info!(layouts = manager.registry.len(), default = %manager.default_kind, "layout manager ready");
        Ok(manager)
    }

    /// Build a manager with every arrangement registered, wired from `config`.
    ///
    /// Opens (and migrates) the state database under `config.state`.
    pub async fn from_config(
        config: &AppConfig,
        host: Arc<dyn EditorHost>,
        events: Arc<HostEvents>,
        content: Arc<dyn ContentAccess>,
    ) -> Result<Arc<Self>, CoreError> {
        let default_kind = LayoutKind::from_setting_value(&config.layout.default)
            .ok_or_else(|| LayoutError::UnknownLayout(config.layout.default.clone()))?;
        let db = Arc::new(Database::open_initialized(config.state.database_path())?);
        let settings = Arc::new(super::TemporarySettings::new(
            Arc::clone(&host),
            Arc::clone(&db),
            config.editor.overrides.clone(),
        ));
        let services = LayoutServices {
            host,
            events,
            content,
            settings,
            scroll: config.scroll.clone(),
        };
        let git = GitClient::from_config(&config.git);
        Ok(Self::new(services, db, git, LayoutKind::ALL.to_vec(), default_kind).await?)
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Opening
    // -----------------------------------------------------------------------

    /// Show `uris` in a layout, replacing any other active layout. Returns
    /// whether a layout is active for `uris` afterwards.
    #[instrument(skip(self, uris), fields(merged = %uris.merged.display()))]
    pub async fn open_diffed_uris(&self, uris: DiffedUris) -> bool {
        let _guard = self.monitor.lock_guard().await;
        self.open_locked(uris, None, true).await
    }

    /// Must be called inside the monitor.
    ///
    /// Boxed because the deactivation handler installed here can lead back
    /// into this function.
    fn open_locked(
        &self,
        uris: DiffedUris,
        kind: Option<LayoutKind>,
        close_active: bool,
    ) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let current = self.state().layouter.clone();
            if let Some(current) = &current {
                let same_kind = kind.map_or(true, |k| k == current.kind());
                if same_kind && current.is_employed() && current.uris().equals_without_backup(&uris) {
                    debug!("requested files are already shown");
                    return true;
                }
            }

            let kind = match kind {
                Some(kind) => kind,
                None => match self.resolve_kind().await {
                    Some(kind) => kind,
                    None => {
                        info!("opening the merge layout was cancelled");
                        return false;
                    }
                },
            };

            if close_active {
                if let Err(e) = self.services.host.close_active_pane().await {
                    warn!(error = %e, "could not close the active pane");
                }
            }
            self.retire_current().await;

            let layouter =
                SplitDiffLayouter::with_owner(kind, uris.clone(), self.services.clone(), self.monitor.clone());
            // A failed activation is handled below, not by the reopen flow.
            let activated = Arc::new(AtomicBool::new(false));
            let seen = Arc::clone(&activated);
            let weak_manager = self.weak.clone();
            let weak_layouter = Arc::downgrade(&layouter);
            let subscription = layouter.on_did_deactivate().subscribe(move |_| {
                if !seen.load(Ordering::SeqCst) {
                    return;
                }
                let (Some(manager), Some(layouter)) = (weak_manager.upgrade(), weak_layouter.upgrade()) else {
                    return;
                };
                spawn_detached("layout deactivated", async move {
                    manager.handle_layouter_deactivated(layouter).await;
                });
            });
            let zoom = {
                let mut state = self.state();
                state.layouter = Some(Arc::clone(&layouter));
                state.layouter_subscription = Some(subscription);
                state.zoom
            };

            match layouter.try_activate(zoom).await {
                Ok(found_conflict) => {
                    activated.store(true, Ordering::SeqCst);
                    self.services.host.set_status(Some(kind.setting_value()));
                    info!(layout = %kind, found_conflict, "merge layout activated");
                    self.did_activate.fire(&uris);
                    true
                }
                Err(e) => {
                    warn!(layout = %kind, error = %e, "merge layout could not be activated");
                    {
                        let mut state = self.state();
                        if state.layouter.as_ref().is_some_and(|l| Arc::ptr_eq(l, &layouter)) {
                            state.layouter = None;
                            state.layouter_subscription = None;
                        }
                    }
                    if !matches!(e, LayoutError::Superseded) {
                        self.services.host.show_error(&e.to_string()).await;
                    }
                    false
                }
            }
        })
    }

    /// Deactivate the current layouter, if any, without reacting to its
    /// deactivation event. Must be called inside the monitor.
    async fn retire_current(&self) -> Option<DiffedUris> {
        let (layouter, subscription) = {
            let mut state = self.state();
            (state.layouter.take(), state.layouter_subscription.take())
        };
        drop(subscription);
        let layouter = layouter?;
        layouter.deactivate(false).await;
        self.services.host.set_status(None);
        self.did_deactivate.fire(layouter.uris());
        Some(layouter.uris().clone())
    }

    /// Arrangement to use: the persisted choice, else the default. An unknown
    /// persisted key is resolved interactively; `None` means cancelled.
    async fn resolve_kind(&self) -> Option<LayoutKind> {
        let key = layout_state_key();
        let stored = match self.db.get_state(&key) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "could not read the persisted layout");
                None
            }
        };
        let Some(stored) = stored else {
            return Some(self.default_kind);
        };
        if let Some(kind) = LayoutKind::from_setting_value(&stored).filter(|k| self.registry.contains(k)) {
            return Some(kind);
        }

        warn!(layout = %stored, "persisted layout is unknown");
        let prompt = format!("Unknown merge layout '{stored}'.");
        match self.services.host.pick(&prompt, &UNKNOWN_LAYOUT_CHOICES).await {
            Some(0) => {
                if let Err(e) = self.db.set_state(&key, self.default_kind.setting_value()) {
                    warn!(error = %e, "could not persist the default layout");
                }
                Some(self.default_kind)
            }
            Some(1) => Some(self.default_kind),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Event handling
    // -----------------------------------------------------------------------

    /// React to a change of the visible panes: if one of them is a sibling
    /// file of a conflict whose files all exist, show its layout.
    pub async fn handle_visible_panes_changed(&self, panes: Vec<PaneInfo>) {
        if self.monitor.in_use() {
            debug!("layout switch in progress, ignoring visible pane change");
            return;
        }
        for pane in &panes {
            let Some(mut uris) = DiffedUris::from_sibling_path(&pane.document) else {
                continue;
            };
            if let Some(current) = self.active_layouter() {
                if current.uris().equals_without_backup(&uris) {
                    return;
                }
            }
            if !self.all_required_exist(&uris).await {
                debug!(path = %pane.document.display(), "sibling files are incomplete");
                continue;
            }
            if let Some(backup) = &uris.backup {
                if self.services.content.get_stats(backup).await.is_none() {
                    uris.backup = None;
                }
            }
            info!(path = %pane.document.display(), "conflict sibling opened");
            self.open_diffed_uris(uris).await;
            return;
        }
    }

    async fn all_required_exist(&self, uris: &DiffedUris) -> bool {
        for path in uris.required_paths() {
            if self.services.content.get_stats(path).await.is_none() {
                return false;
            }
        }
        true
    }

    async fn handle_layouter_deactivated(&self, layouter: Arc<SplitDiffLayouter>) {
        {
            let _guard = self.monitor.lock_guard().await;
            {
                let mut state = self.state();
                if !state.layouter.as_ref().is_some_and(|l| Arc::ptr_eq(l, &layouter)) {
                    return;
                }
                state.layouter = None;
                state.layouter_subscription = None;
            }
            self.services.host.set_status(None);
            self.did_deactivate.fire(layouter.uris());
        }
        info!(merged = %layouter.uris().merged.display(), "merge layout closed");

        if self.state().merge_tool_flow {
            return;
        }
        let uris = layouter.uris().clone();
        let Some(on_disk) = self.services.content.get_contents(&uris.merged).await else {
            return;
        };
        // Unsaved edits in the closed merge pane win over the file on disk.
        let contents = layouter.merge_text_at_close().unwrap_or(on_disk);
        if !contains_conflict_markers(&contents) {
            return;
        }

        let prompt = format!(
            "'{}' still contains merge conflict markers.",
            uris.merged.display()
        );
        if self.services.host.pick(&prompt, &REOPEN_CHOICES).await == Some(0) {
            let _guard = self.monitor.lock_guard().await;
            self.open_locked(uris, Some(layouter.kind()), false).await;
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Tear down the active layout. Returns whether there was one.
    #[instrument(skip(self))]
    pub async fn deactivate_layout(&self) -> bool {
        let _guard = self.monitor.lock_guard().await;
        self.retire_current().await.is_some()
    }

    /// Persist `kind` as the arrangement to use and reopen the active file
    /// set with it.
    #[instrument(skip(self))]
    pub async fn switch_layout(&self, kind: LayoutKind) -> Result<bool, LayoutError> {
        if !self.registry.contains(&kind) {
            return Err(LayoutError::UnknownLayout(kind.setting_value().to_string()));
        }
        if let Err(e) = self.db.set_state(&layout_state_key(), kind.setting_value()) {
            warn!(error = %e, "could not persist the layout choice");
        }

        let _guard = self.monitor.lock_guard().await;
        let Some(current) = self.state().layouter.clone() else {
            return Ok(false);
        };
        if current.kind() == kind {
            return Ok(true);
        }
        let uris = current.uris().clone();
        Ok(self.open_locked(uris, Some(kind), false).await)
    }

    /// Change the zoom of the active layout and of layouts opened later.
    pub async fn set_zoom(&self, zoom: Zoom) -> Result<bool, LayoutError> {
        let current = {
            let mut state = self.state();
            state.zoom = zoom;
            state.layouter.clone()
        };
        match current {
            Some(layouter) => layouter.set_zoom(zoom).await,
            None => Ok(false),
        }
    }

    /// Save the active layout's merged file.
    pub async fn save(&self) -> bool {
        match self.active_layouter() {
            Some(layouter) => layouter.save().await,
            None => false,
        }
    }

    /// Jump to a conflict marker in the active merge pane.
    pub fn focus_merge_conflict(&self, direction: SearchDirection) -> Option<bool> {
        self.active_layouter()?.focus_merge_conflict(direction)
    }

    /// Regenerate the merged file with `git merge-file`.
    pub async fn reset_merged_file(&self) -> Result<MergeFileOutput, CoreError> {
        let uris = self.require_active_merge().await?;
        self.merge.reset_merged_file(&uris).await
    }

    /// Replace the merged file with its backup.
    pub async fn restore_backup(&self) -> Result<(), CoreError> {
        let uris = self.require_active_merge().await?;
        self.merge.restore_backup(&uris).await
    }

    async fn require_active_merge(&self) -> Result<DiffedUris, LayoutError> {
        match self.active_layouter() {
            Some(layouter) if layouter.is_employed() => Ok(layouter.uris().clone()),
            _ => {
                let err = LayoutError::NoActiveMerge;
                self.services.host.show_error(&err.to_string()).await;
                Err(err)
            }
        }
    }

    /// Mark an orchestrated merge-tool flow; deactivations during it do not
    /// prompt to reopen.
    pub fn set_merge_tool_flow(&self, active: bool) {
        self.state().merge_tool_flow = active;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn active_layouter(&self) -> Option<Arc<SplitDiffLayouter>> {
        self.state().layouter.clone()
    }

    pub fn active_uris(&self) -> Option<DiffedUris> {
        self.active_layouter().map(|l| l.uris().clone())
    }

    pub fn zoom(&self) -> Zoom {
        self.state().zoom
    }

    pub fn registry(&self) -> &[LayoutKind] {
        &self.registry
    }

    pub fn default_kind(&self) -> LayoutKind {
        self.default_kind
    }

    /// Fires with the file set whenever a layout becomes active.
    pub fn on_did_activate(&self) -> &EventEmitter<DiffedUris> {
        &self.did_activate
    }

    /// Fires with the file set whenever the active layout goes away.
    pub fn on_did_deactivate(&self) -> &EventEmitter<DiffedUris> {
        &self.did_deactivate
    }
}
