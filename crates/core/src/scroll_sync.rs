//! Viewport synchronization across the panes of a layout.
//!
//! When the user scrolls one pane, every other pane is scrolled so that the
//! corresponding content is visible at the same height. Correspondence is
//! computed with a [`DiffLineMapper`] per pane pair, built lazily and cached
//! until either document changes.
//!
//! Scrolling a pane programmatically makes the host report a visible range
//! change for it, just like a user scroll would. Each such reveal adds one
//! unit of "ignore strength" to the target pane; range changes arriving while
//! the (exponentially decaying) strength is above one half are consumed
//! instead of being propagated again.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::ScrollConfig;
use crate::host::{PaneId, TextPane};
use crate::mapping::{normalized_lines, DiffLineMapper, IdentityLineMapper, LineMapper};
use crate::uris::paths_equal;

/// Strength above which a range change is treated as self-inflicted.
const IGNORE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
struct IgnoreStrength {
    value: f64,
    updated: Instant,
}

impl IgnoreStrength {
    fn decay_to(&mut self, now: Instant, decay_per_sec: f64) {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.value *= decay_per_sec.powf(elapsed);
        self.updated = now;
    }
}

/// Cached line sequence of one pane.
struct PaneLines {
    lines: Arc<Vec<String>>,
    /// Whether the document exceeds the diff size limit.
    too_large: bool,
}

#[derive(Default)]
struct SyncState {
    ignore: Vec<IgnoreStrength>,
    lines: Vec<Option<PaneLines>>,
    /// `None` entries mark pairs that fall back to proportional mapping.
    mappers: HashMap<(usize, usize), Option<Arc<dyn LineMapper>>>,
}

/// Keeps the visible top lines of a set of panes aligned.
pub struct ScrollSynchronizer {
    panes: Vec<Arc<dyn TextPane>>,
    config: ScrollConfig,
    state: Mutex<SyncState>,
}

impl std::fmt::Debug for ScrollSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrollSynchronizer")
            .field("panes", &self.panes.len())
            .finish_non_exhaustive()
    }
}

impl ScrollSynchronizer {
    /// Create a synchronizer over `panes`. If `source_of_truth` is given, the
    /// viewport of that pane is propagated to all others right away.
    pub fn new(
        panes: Vec<Arc<dyn TextPane>>,
        source_of_truth: Option<usize>,
        config: ScrollConfig,
    ) -> Self {
        let now = Instant::now();
        let state = SyncState {
            ignore: vec![IgnoreStrength { value: 0.0, updated: now }; panes.len()],
            lines: panes.iter().map(|_| None).collect(),
            mappers: HashMap::new(),
        };
        let sync = Self {
            panes,
            config,
            state: Mutex::new(state),
        };
        if let Some(source) = source_of_truth.filter(|&i| i < sync.panes.len()) {
            sync.sync_visible_ranges(source);
        }
        sync
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pane_count(&self) -> usize {
        self.panes.len()
    }

    pub fn pane_index(&self, id: PaneId) -> Option<usize> {
        self.panes.iter().position(|p| p.id() == id)
    }

    /// Scroll every other pane to the position corresponding to the top of
    /// `source`.
    pub fn sync_visible_ranges(&self, source: usize) {
        let Some(source_pane) = self.panes.get(source) else {
            return;
        };
        let Some(top) = source_pane.visible_top_line() else {
            trace!(source, "source pane has no visible range");
            return;
        };
        let surrounding = self.config.surrounding_lines;
        let anchor = (top + surrounding) as f64;
        let now = Instant::now();

        // Reveals run after the lock is released: they may re-enter through
        // the host's range change notification.
        let mut reveals = Vec::new();
        {
            let mut state = self.state();
            for (target, pane) in self.panes.iter().enumerate() {
                if target == source {
                    continue;
                }
                let line_count = pane.line_count();
                let mapped = match self.mapper(&mut state, source, target) {
                    Some(mapper) => mapper.map(anchor),
                    None => {
                        let source_count = source_pane.line_count().max(1) as f64;
                        anchor * line_count as f64 / source_count
                    }
                };

                let max_line = line_count.saturating_sub(1);
                let target_line = (mapped.round() as usize)
                    .min(max_line)
                    .max(surrounding.min(max_line));
                let new_top = target_line.saturating_sub(surrounding);
                if pane.visible_top_line() == Some(new_top) {
                    continue;
                }

                let strength = &mut state.ignore[target];
                strength.decay_to(now, self.config.decay_per_sec);
                strength.value += 1.0;
                reveals.push((target, new_top));
            }
        }

        for (target, new_top) in reveals {
            trace!(source, target, line = new_top, "revealing synchronized line");
            self.panes[target].reveal_line_at_top(new_top);
        }
    }

    /// Handle a visible range change reported for `pane`. Returns whether the
    /// change was propagated to the other panes.
    pub fn on_visible_range_changed(&self, pane: PaneId) -> bool {
        match self.pane_index(pane) {
            Some(index) => self.on_visible_range_changed_at(index, Instant::now()),
            None => false,
        }
    }

    /// Like [`on_visible_range_changed`](Self::on_visible_range_changed) with
    /// an explicit pane index and clock reading.
    pub fn on_visible_range_changed_at(&self, index: usize, now: Instant) -> bool {
        {
            let mut state = self.state();
            let Some(strength) = state.ignore.get_mut(index) else {
                return false;
            };
            strength.decay_to(now, self.config.decay_per_sec);
            if strength.value > IGNORE_THRESHOLD {
                strength.value = (strength.value - 1.0).max(0.0);
                trace!(index, remaining = strength.value, "ignoring self-triggered scroll");
                return false;
            }
        }
        self.sync_visible_ranges(index);
        true
    }

    /// Drop cached lines and mappers of every pane showing `document`.
    pub fn on_document_changed(&self, document: &Path) {
        let affected: Vec<usize> = self
            .panes
            .iter()
            .enumerate()
            .filter(|(_, p)| paths_equal(&p.document(), document))
            .map(|(i, _)| i)
            .collect();
        if affected.is_empty() {
            return;
        }

        let mut state = self.state();
        for &index in &affected {
            state.lines[index] = None;
        }
        state
            .mappers
            .retain(|(a, b), _| !affected.contains(a) && !affected.contains(b));
        debug!(document = %document.display(), panes = ?affected, "invalidated line mappings");
    }

    /// Current ignore strength of a pane, decayed to `now`.
    pub fn ignore_strength_at(&self, index: usize, now: Instant) -> f64 {
        let state = self.state();
        state.ignore.get(index).map_or(0.0, |s| {
            let mut s = *s;
            s.decay_to(now, self.config.decay_per_sec);
            s.value
        })
    }

    fn lines(&self, state: &mut SyncState, index: usize) -> (Arc<Vec<String>>, bool) {
        if let Some(cached) = &state.lines[index] {
            return (Arc::clone(&cached.lines), cached.too_large);
        }
        let text = self.panes[index].text();
        let too_large = text.chars().count() > self.config.max_diff_chars;
        let lines = Arc::new(normalized_lines(&text));
        state.lines[index] = Some(PaneLines {
            lines: Arc::clone(&lines),
            too_large,
        });
        (lines, too_large)
    }

    fn mapper(&self, state: &mut SyncState, from: usize, to: usize) -> Option<Arc<dyn LineMapper>> {
        if let Some(cached) = state.mappers.get(&(from, to)) {
            return cached.clone();
        }

        let (forward, backward): (Option<Arc<dyn LineMapper>>, Option<Arc<dyn LineMapper>>) =
            if paths_equal(&self.panes[from].document(), &self.panes[to].document()) {
                (Some(Arc::new(IdentityLineMapper)), Some(Arc::new(IdentityLineMapper)))
            } else {
                let (from_lines, from_large) = self.lines(state, from);
                let (to_lines, to_large) = self.lines(state, to);
                if from_large || to_large {
                    debug!(from, to, "document too large for diff mapping, using proportional scrolling");
                    (None, None)
                } else {
                    let mapper = DiffLineMapper::new(from_lines.as_slice(), to_lines.as_slice());
                    let reversed = mapper.create_reversed();
                    (Some(Arc::new(mapper)), Some(Arc::new(reversed)))
                }
            };

        state.mappers.insert((to, from), backward);
        state.mappers.insert((from, to), forward.clone());
        forward
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakePane {
        id: PaneId,
        document: PathBuf,
        text: Mutex<String>,
        top: Mutex<Option<usize>>,
        reveals: AtomicUsize,
    }

    impl FakePane {
        fn new(id: u64, document: &str, text: &str) -> Arc<Self> {
            Arc::new(Self {
                id: PaneId(id),
                document: PathBuf::from(document),
                text: Mutex::new(text.to_string()),
                top: Mutex::new(Some(0)),
                reveals: AtomicUsize::new(0),
            })
        }

        fn top(&self) -> Option<usize> {
            *self.top.lock().unwrap()
        }

        fn scroll_to(&self, line: usize) {
            *self.top.lock().unwrap() = Some(line);
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
            self.text.lock().unwrap().split('\n').count()
        }
        fn visible_top_line(&self) -> Option<usize> {
            self.top()
        }
        fn reveal_line_at_top(&self, line: usize) {
            self.reveals.fetch_add(1, Ordering::SeqCst);
            self.scroll_to(line);
        }
        fn cursor_line(&self) -> usize {
            0
        }
        fn select_line(&self, _line: usize) {}
    }

    fn numbered(range: std::ops::Range<usize>) -> String {
        range.map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n")
    }

    fn config(surrounding: usize) -> ScrollConfig {
        ScrollConfig {
            surrounding_lines: surrounding,
            ..ScrollConfig::default()
        }
    }

    fn as_panes(panes: &[Arc<FakePane>]) -> Vec<Arc<dyn TextPane>> {
        panes.iter().map(|p| Arc::clone(p) as Arc<dyn TextPane>).collect()
    }

    #[tokio::test]
    async fn test_source_of_truth_propagates_on_construction() {
        let a = FakePane::new(1, "/a", &numbered(0..100));
        let b = FakePane::new(2, "/b", &numbered(0..100));
        a.scroll_to(40);

        let _sync = ScrollSynchronizer::new(as_panes(&[a.clone(), b.clone()]), Some(0), config(3));
        assert_eq!(b.top(), Some(40));
    }

    #[tokio::test]
    async fn test_insertion_shifts_target() {
        // "b" has ten extra lines inserted at the top.
        let a = FakePane::new(1, "/a", &numbered(0..100));
        let b = FakePane::new(2, "/b", &format!("{}\n{}", numbered(1000..1010), numbered(0..100)));
        let sync = ScrollSynchronizer::new(as_panes(&[a.clone(), b.clone()]), None, config(0));

        a.scroll_to(50);
        assert!(sync.on_visible_range_changed(PaneId(1)));
        assert_eq!(b.top(), Some(60));
    }

    #[tokio::test]
    async fn test_self_triggered_scroll_is_suppressed() {
        let a = FakePane::new(1, "/a", &numbered(0..100));
        let b = FakePane::new(2, "/b", &numbered(0..100));
        let sync = ScrollSynchronizer::new(as_panes(&[a.clone(), b.clone()]), None, config(3));

        a.scroll_to(20);
        assert!(sync.on_visible_range_changed(PaneId(1)));
        assert_eq!(b.reveals.load(Ordering::SeqCst), 1);

        // The host echoes our reveal back; it must not propagate.
        assert!(!sync.on_visible_range_changed(PaneId(2)));
        assert_eq!(a.reveals.load(Ordering::SeqCst), 0);

        // A genuine user scroll afterwards propagates again.
        b.scroll_to(30);
        assert!(sync.on_visible_range_changed(PaneId(2)));
        assert_eq!(a.top(), Some(30));
    }

    #[tokio::test]
    async fn test_ignore_strength_decays() {
        let a = FakePane::new(1, "/a", &numbered(0..100));
        let b = FakePane::new(2, "/b", &numbered(0..100));
        let sync = ScrollSynchronizer::new(as_panes(&[a.clone(), b.clone()]), None, config(0));

        a.scroll_to(10);
        sync.sync_visible_ranges(0);
        let start = Instant::now();
        assert!(sync.ignore_strength_at(1, start) > 0.9);

        // With 5% retained per second, one second later the echo is stale.
        let later = start + Duration::from_secs(1);
        assert!(sync.ignore_strength_at(1, later) < IGNORE_THRESHOLD);
        assert!(sync.on_visible_range_changed_at(1, later));
    }

    #[tokio::test]
    async fn test_no_reveal_when_already_aligned() {
        let a = FakePane::new(1, "/a", &numbered(0..100));
        let b = FakePane::new(2, "/b", &numbered(0..100));
        let sync = ScrollSynchronizer::new(as_panes(&[a.clone(), b.clone()]), None, config(3));

        a.scroll_to(0);
        sync.sync_visible_ranges(0);
        assert_eq!(b.reveals.load(Ordering::SeqCst), 0);
        assert_eq!(sync.ignore_strength_at(1, Instant::now()), 0.0);
    }

    #[tokio::test]
    async fn test_target_clamped_to_document() {
        let a = FakePane::new(1, "/a", &numbered(0..200));
        let b = FakePane::new(2, "/b", &numbered(0..200));
        let short = FakePane::new(3, "/c", &numbered(500..505));
        let sync = ScrollSynchronizer::new(
            as_panes(&[a.clone(), b.clone(), short.clone()]),
            None,
            config(3),
        );

        a.scroll_to(150);
        sync.sync_visible_ranges(0);
        assert_eq!(b.top(), Some(150));
        // Last line of a 5-line document, minus the surrounding margin.
        assert_eq!(short.top(), Some(1));
    }

    #[tokio::test]
    async fn test_large_documents_scroll_proportionally() {
        let a = FakePane::new(1, "/a", &numbered(0..100));
        let b = FakePane::new(2, "/b", &numbered(0..200));
        let cfg = ScrollConfig {
            surrounding_lines: 0,
            max_diff_chars: 10,
            ..ScrollConfig::default()
        };
        let sync = ScrollSynchronizer::new(as_panes(&[a.clone(), b.clone()]), None, cfg);

        a.scroll_to(25);
        sync.sync_visible_ranges(0);
        assert_eq!(b.top(), Some(50));
    }

    #[tokio::test]
    async fn test_document_change_invalidates_mappers() {
        let a = FakePane::new(1, "/a", &numbered(0..50));
        let b = FakePane::new(2, "/b", &numbered(0..50));
        let sync = ScrollSynchronizer::new(as_panes(&[a.clone(), b.clone()]), None, config(0));

        a.scroll_to(20);
        sync.sync_visible_ranges(0);
        assert_eq!(b.top(), Some(20));
        assert_eq!(sync.state().mappers.len(), 2);

        *b.text.lock().unwrap() = format!("{}\n{}", numbered(900..905), numbered(0..50));
        sync.on_document_changed(Path::new("/b"));
        assert!(sync.state().mappers.is_empty());
        assert!(sync.state().lines[1].is_none());

        a.scroll_to(21);
        sync.sync_visible_ranges(0);
        assert_eq!(b.top(), Some(26));
    }

    #[tokio::test]
    async fn test_same_document_uses_identity() {
        let a = FakePane::new(1, "/merged", &numbered(0..80));
        let b = FakePane::new(2, "/merged", &numbered(0..80));
        let sync = ScrollSynchronizer::new(as_panes(&[a.clone(), b.clone()]), None, config(2));

        a.scroll_to(33);
        sync.sync_visible_ranges(0);
        assert_eq!(b.top(), Some(33));
        assert!(sync.state().lines.iter().all(Option::is_none));
    }
}
