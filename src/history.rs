use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::Settings;
use crate::graph::GraphStore;
use crate::node::{Edge, Node};
use crate::timer::Debounce;

/// Deep copy of the persistent node/edge state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Snapshot {
    pub fn capture(store: &GraphStore) -> Self {
        Self {
            nodes: store.nodes().to_vec(),
            edges: store.edges().to_vec(),
        }
    }

    fn apply(&self, store: &mut GraphStore) {
        store.set_nodes(self.nodes.clone());
        store.set_edges(self.edges.clone());
    }
}

/// Bounded linear undo/redo stack fed by a debounced capture.
///
/// Changes are reported with [`History::record_change`]; once the store has
/// been quiet for the debounce delay, [`History::tick`] captures a snapshot.
/// Changes reported while an undo/redo is being applied are not recorded.
#[derive(Debug)]
pub struct History {
    snapshots: VecDeque<Snapshot>,
    /// `None` is the empty position (-1).
    index: Option<usize>,
    capacity: usize,
    debounce: Debounce,
    apply_window: Duration,
    applying_until: Option<Instant>,
}

impl History {
    pub fn new(capacity: usize, debounce: Duration, apply_window: Duration) -> Self {
        Self {
            snapshots: VecDeque::new(),
            index: None,
            capacity: capacity.max(1),
            debounce: Debounce::new(debounce),
            apply_window,
            applying_until: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.history_capacity,
            Duration::from_millis(settings.history_debounce_ms),
            Duration::from_millis(settings.history_apply_window_ms),
        )
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn can_undo(&self) -> bool {
        self.index.is_some_and(|i| i > 0)
    }

    pub fn can_redo(&self) -> bool {
        match self.index {
            Some(i) => i + 1 < self.snapshots.len(),
            None => !self.snapshots.is_empty(),
        }
    }

    pub fn is_applying(&self, now: Instant) -> bool {
        self.applying_until.is_some_and(|until| now < until)
    }

    pub fn has_pending_capture(&self) -> bool {
        self.debounce.is_pending()
    }

    /// Reports a node/edge change. Restarts the quiet period unless the
    /// change is the echo of an undo/redo.
    pub fn record_change(&mut self, now: Instant) {
        if self.is_applying(now) {
            return;
        }
        self.debounce.schedule(now);
    }

    /// Captures a snapshot if the quiet period has elapsed.
    pub fn tick(&mut self, now: Instant, store: &GraphStore) -> bool {
        if self.debounce.poll(now) {
            self.push(Snapshot::capture(store));
            return true;
        }
        false
    }

    /// Appends a snapshot, discarding any redo tail and evicting the oldest
    /// entry past capacity.
    pub fn push(&mut self, snapshot: Snapshot) {
        let keep = self.index.map_or(0, |i| i + 1);
        self.snapshots.truncate(keep);
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
        self.index = Some(self.snapshots.len() - 1);
        debug!(len = self.snapshots.len(), "history snapshot captured");
    }

    pub fn undo(&mut self, store: &mut GraphStore, now: Instant) -> bool {
        // An edit still inside its quiet period becomes the redo target
        if self.debounce.flush_on_teardown() {
            self.push(Snapshot::capture(store));
        }
        let Some(current) = self.index else {
            return false;
        };
        if current == 0 {
            return false;
        }
        self.step_to(current - 1, store, now)
    }

    pub fn redo(&mut self, store: &mut GraphStore, now: Instant) -> bool {
        let target = self.index.map_or(0, |i| i + 1);
        if target >= self.snapshots.len() {
            return false;
        }
        self.debounce.cancel();
        self.step_to(target, store, now)
    }

    fn step_to(&mut self, target: usize, store: &mut GraphStore, now: Instant) -> bool {
        let Some(snapshot) = self.snapshots.get(target) else {
            return false;
        };
        self.applying_until = Some(now + self.apply_window);
        snapshot.apply(store);
        self.index = Some(target);
        debug!(index = target, len = self.snapshots.len(), "history step applied");
        true
    }

    /// Stops the debounce timer, capturing any edit still waiting on it.
    pub fn flush_on_teardown(&mut self, store: &GraphStore) {
        if self.debounce.flush_on_teardown() {
            self.push(Snapshot::capture(store));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::node::{NodeFields, NodeType};
    use pretty_assertions::assert_eq;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn history() -> History {
        History::new(50, ms(1000), ms(100))
    }

    #[test]
    fn rapid_edits_collapse_into_one_snapshot() {
        let t0 = Instant::now();
        let mut store = GraphStore::new();
        let mut h = history();
        for i in 0..5 {
            store.add_node(NodeType::Text, Point::ORIGIN, &NodeFields::default());
            h.record_change(t0 + ms(i * 200));
            assert!(!h.tick(t0 + ms(i * 200 + 100), &store));
        }
        assert!(h.tick(t0 + ms(800 + 1000), &store));
        assert_eq!(h.len(), 1);
        assert_eq!(h.snapshots[0].nodes.len(), 5);
    }

    #[test]
    fn undo_at_start_is_noop() {
        let t0 = Instant::now();
        let mut store = GraphStore::new();
        let mut h = history();
        assert!(!h.undo(&mut store, t0));
        h.push(Snapshot::capture(&store));
        assert!(!h.undo(&mut store, t0));
        assert!(!h.redo(&mut store, t0));
    }

    #[test]
    fn undo_then_redo_restores_state() {
        let t0 = Instant::now();
        let mut store = GraphStore::new();
        let mut h = history();
        h.push(Snapshot::capture(&store));
        store.add_node(NodeType::Text, Point::ORIGIN, &NodeFields::default());
        h.push(Snapshot::capture(&store));
        let before = Snapshot::capture(&store);

        assert!(h.undo(&mut store, t0));
        assert!(store.is_empty());
        assert!(h.redo(&mut store, t0));
        assert_eq!(Snapshot::capture(&store), before);
    }

    #[test]
    fn change_echo_during_apply_window_is_ignored() {
        let t0 = Instant::now();
        let mut store = GraphStore::new();
        let mut h = history();
        h.push(Snapshot::capture(&store));
        store.add_node(NodeType::Text, Point::ORIGIN, &NodeFields::default());
        h.push(Snapshot::capture(&store));

        h.undo(&mut store, t0);
        h.record_change(t0 + ms(10));
        assert!(!h.has_pending_capture());
        h.record_change(t0 + ms(150));
        assert!(h.has_pending_capture());
    }

    #[test]
    fn new_edit_after_undo_truncates_redo() {
        let t0 = Instant::now();
        let mut store = GraphStore::new();
        let mut h = history();
        h.push(Snapshot::capture(&store));
        store.add_node(NodeType::Text, Point::ORIGIN, &NodeFields::default());
        h.push(Snapshot::capture(&store));
        store.add_node(NodeType::Text, Point::ORIGIN, &NodeFields::default());
        h.push(Snapshot::capture(&store));

        h.undo(&mut store, t0);
        h.undo(&mut store, t0);
        assert!(!h.can_undo());
        store.add_node(NodeType::Sticky, Point::ORIGIN, &NodeFields::default());
        h.push(Snapshot::capture(&store));

        assert_eq!(h.len(), 2);
        assert!(h.can_undo());
        assert!(!h.can_redo());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut store = GraphStore::new();
        let mut h = History::new(3, ms(1000), ms(100));
        for _ in 0..5 {
            store.add_node(NodeType::Text, Point::ORIGIN, &NodeFields::default());
            h.push(Snapshot::capture(&store));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.index(), Some(2));
        assert_eq!(h.snapshots[0].nodes.len(), 3);
    }

    #[test]
    fn undo_flushes_pending_edit_so_it_can_be_redone() {
        let t0 = Instant::now();
        let mut store = GraphStore::new();
        let mut h = history();
        h.push(Snapshot::capture(&store));
        store.add_node(NodeType::Text, Point::ORIGIN, &NodeFields::default());
        h.record_change(t0);

        assert!(h.undo(&mut store, t0 + ms(300)));
        assert!(store.is_empty());
        assert!(h.redo(&mut store, t0 + ms(600)));
        assert_eq!(store.nodes().len(), 1);
    }
}
