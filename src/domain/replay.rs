//! Replay Engine
//!
//! Step-by-step playback over the BFS edge sequence. [`ReplayState`]
//! transitions are pure (`state + event -> state`); [`ReplaySession`] owns the
//! immutable timeline plus the current state and answers rendering queries.

use crate::domain::callgraph::CallGraph;
use crate::domain::traversal::TraversalRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub const CURRENT_COLOR: &str = "#ff0000";
pub const PREVIOUS_COLOR: &str = "#ff7f50";
pub const BASE_COLOR: &str = "#aaaaaa";
pub const OUTGOING_COLOR: &str = "#008000";
pub const INCOMING_COLOR: &str = "#800080";

/// One call edge on the replay timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEvent {
    pub index: usize,
    pub caller: String,
    pub callee: String,
}

impl EdgeEvent {
    /// `caller->callee`, the key clients use to bind drawn edges.
    pub fn key(&self) -> String {
        format!("{}->{}", self.caller, self.callee)
    }
}

/// Flatten the traversal into the replay timeline: for each node in BFS
/// order, one event per outgoing edge whose target was also reached.
pub fn edge_sequence(graph: &CallGraph, record: &TraversalRecord) -> Vec<EdgeEvent> {
    let mut events = Vec::new();
    for caller in &record.order {
        for callee in graph.callees(caller) {
            if record.contains(callee) {
                events.push(EdgeEvent {
                    index: events.len(),
                    caller: caller.clone(),
                    callee: callee.to_string(),
                });
            }
        }
    }
    events
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Idle,
    Forward,
    Backward,
}

/// Coarse state-machine view of a [`ReplayState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Positioned,
    PlayingForward,
    PlayingBackward,
}

/// Inputs to [`ReplayState::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayEvent {
    StepForward,
    StepBack,
    Play(Direction),
    Pause,
    /// One cooperative playback step in the active direction.
    Tick,
    Seek(Option<usize>),
    Select(Option<String>),
    SetHighlightMode(HighlightMode),
}

/// Which neighbour edges of the selected node are highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightMode {
    pub outgoing: bool,
    pub incoming: bool,
}

impl Default for HighlightMode {
    fn default() -> Self {
        Self {
            outgoing: true,
            incoming: false,
        }
    }
}

/// Mutable part of a replay session. `cursor == None` means nothing is drawn.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplayState {
    pub cursor: Option<usize>,
    pub direction: Direction,
    pub selected: Option<String>,
    #[serde(default)]
    pub highlight: HighlightMode,
}

impl ReplayState {
    pub fn phase(&self) -> Phase {
        match (self.direction, self.cursor) {
            (Direction::Forward, _) => Phase::PlayingForward,
            (Direction::Backward, _) => Phase::PlayingBackward,
            (Direction::Idle, None) => Phase::Idle,
            (Direction::Idle, Some(_)) => Phase::Positioned,
        }
    }

    /// Transition for a timeline of `len` edges. Misuse (stepping past a
    /// boundary, replaying the active direction) is a no-op.
    pub fn apply(self, event: ReplayEvent, len: usize) -> ReplayState {
        match event {
            ReplayEvent::StepForward => ReplayState {
                cursor: forward(self.cursor, len),
                ..self
            },
            ReplayEvent::StepBack => ReplayState {
                cursor: back(self.cursor),
                ..self
            },
            ReplayEvent::Play(Direction::Idle) | ReplayEvent::Pause => ReplayState {
                direction: Direction::Idle,
                ..self
            },
            ReplayEvent::Play(direction) if direction == self.direction => self,
            ReplayEvent::Play(direction) => {
                let can_move = match direction {
                    Direction::Forward => forward(self.cursor, len) != self.cursor,
                    _ => self.cursor.is_some(),
                };
                ReplayState {
                    direction: if can_move { direction } else { Direction::Idle },
                    ..self
                }
            }
            ReplayEvent::Tick => self.tick(len),
            ReplayEvent::Seek(target) => ReplayState {
                cursor: target.and_then(|i| len.checked_sub(1).map(|last| i.min(last))),
                direction: Direction::Idle,
                ..self
            },
            ReplayEvent::Select(node) => ReplayState {
                selected: node,
                ..self
            },
            ReplayEvent::SetHighlightMode(highlight) => ReplayState { highlight, ..self },
        }
    }

    fn tick(self, len: usize) -> ReplayState {
        match self.direction {
            Direction::Idle => self,
            Direction::Forward => {
                let cursor = forward(self.cursor, len);
                let at_end = cursor.is_none() || cursor == len.checked_sub(1);
                ReplayState {
                    cursor,
                    direction: if at_end { Direction::Idle } else { Direction::Forward },
                    ..self
                }
            }
            Direction::Backward => {
                let cursor = back(self.cursor);
                ReplayState {
                    cursor,
                    direction: if cursor.is_none() { Direction::Idle } else { Direction::Backward },
                    ..self
                }
            }
        }
    }
}

fn forward(cursor: Option<usize>, len: usize) -> Option<usize> {
    let next = cursor.map_or(0, |c| c + 1);
    if next < len {
        Some(next)
    } else {
        cursor
    }
}

fn back(cursor: Option<usize>) -> Option<usize> {
    cursor.and_then(|c| c.checked_sub(1))
}

/// Discovery tier of an edge relative to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeTier {
    Current,
    Previous,
    Past,
    Future,
}

impl EdgeTier {
    pub fn of(index: usize, cursor: Option<usize>) -> EdgeTier {
        match cursor {
            Some(c) if index == c => EdgeTier::Current,
            Some(c) if index + 1 == c => EdgeTier::Previous,
            Some(c) if index < c => EdgeTier::Past,
            _ => EdgeTier::Future,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            EdgeTier::Current => CURRENT_COLOR,
            EdgeTier::Previous => PREVIOUS_COLOR,
            EdgeTier::Past | EdgeTier::Future => BASE_COLOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Highlight {
    Outgoing,
    Incoming,
}

/// Edge indices touching a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HighlightSet {
    pub outgoing: BTreeSet<usize>,
    pub incoming: BTreeSet<usize>,
}

impl HighlightSet {
    /// Keep only the directions `mode` enables.
    pub fn filtered(self, mode: HighlightMode) -> HighlightSet {
        HighlightSet {
            outgoing: if mode.outgoing { self.outgoing } else { BTreeSet::new() },
            incoming: if mode.incoming { self.incoming } else { BTreeSet::new() },
        }
    }

    /// Incoming outranks outgoing (a self-call is both).
    pub fn highlight_of(&self, index: usize) -> Option<Highlight> {
        if self.incoming.contains(&index) {
            Some(Highlight::Incoming)
        } else if self.outgoing.contains(&index) {
            Some(Highlight::Outgoing)
        } else {
            None
        }
    }
}

/// Render instruction for one edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeView {
    pub index: usize,
    pub tier: EdgeTier,
    pub highlight: Option<Highlight>,
    pub visible: bool,
    pub color: &'static str,
}

impl EdgeView {
    pub fn new(index: usize, cursor: Option<usize>, highlights: &HighlightSet) -> Self {
        let tier = EdgeTier::of(index, cursor);
        let highlight = highlights.highlight_of(index);
        let color = match (tier, highlight) {
            (EdgeTier::Current, _) => CURRENT_COLOR,
            (_, Some(Highlight::Incoming)) => INCOMING_COLOR,
            (_, Some(Highlight::Outgoing)) => OUTGOING_COLOR,
            (tier, None) => tier.color(),
        };
        Self {
            index,
            tier,
            highlight,
            visible: tier != EdgeTier::Future || highlight.is_some(),
            color,
        }
    }
}

/// Role of a node relative to the selected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Selected,
    /// Calls the selected node.
    Caller,
    /// Called by the selected node.
    Callee,
}

/// Snapshot handed to the rendering layer after every state change.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub state: ReplayState,
    pub phase: Phase,
    pub edges: Vec<EdgeView>,
    pub nodes: BTreeMap<String, NodeRole>,
}

/// One replay session: an immutable timeline and the state moving over it.
#[derive(Debug, Clone)]
pub struct ReplaySession {
    nodes: Vec<String>,
    timeline: Vec<EdgeEvent>,
    state: ReplayState,
}

impl ReplaySession {
    pub fn new(nodes: Vec<String>, timeline: Vec<EdgeEvent>) -> Self {
        let mut seen: HashSet<String> = nodes.iter().cloned().collect();
        let mut nodes = nodes;
        for event in &timeline {
            for name in [&event.caller, &event.callee] {
                if seen.insert(name.clone()) {
                    nodes.push(name.clone());
                }
            }
        }
        Self {
            nodes,
            timeline,
            state: ReplayState::default(),
        }
    }

    pub fn from_traversal(graph: &CallGraph, record: &TraversalRecord) -> Self {
        Self::new(record.order.clone(), edge_sequence(graph, record))
    }

    pub fn timeline(&self) -> &[EdgeEvent] {
        &self.timeline
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn state(&self) -> &ReplayState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    pub fn current_edge(&self) -> Option<&EdgeEvent> {
        self.state.cursor.and_then(|c| self.timeline.get(c))
    }

    pub fn apply(&mut self, event: ReplayEvent) -> &ReplayState {
        let len = self.timeline.len();
        self.state = std::mem::take(&mut self.state).apply(event, len);
        &self.state
    }

    pub fn step_forward(&mut self) -> &ReplayState {
        self.apply(ReplayEvent::StepForward)
    }

    pub fn step_back(&mut self) -> &ReplayState {
        self.apply(ReplayEvent::StepBack)
    }

    /// Start playback. Returns `true` only when `direction` became active,
    /// so callers schedule at most one driver per direction change.
    pub fn play(&mut self, direction: Direction) -> bool {
        let before = self.state.direction;
        self.apply(ReplayEvent::Play(direction));
        self.state.direction != before && self.state.direction != Direction::Idle
    }

    pub fn pause(&mut self) {
        self.apply(ReplayEvent::Pause);
    }

    /// Advance playback by one step. Returns `false` once playback has stopped.
    pub fn tick(&mut self) -> bool {
        if self.state.direction == Direction::Idle {
            return false;
        }
        self.apply(ReplayEvent::Tick);
        true
    }

    pub fn seek(&mut self, index: Option<usize>) -> &ReplayState {
        self.apply(ReplayEvent::Seek(index))
    }

    pub fn select(&mut self, node: Option<String>) {
        self.apply(ReplayEvent::Select(node));
    }

    pub fn set_highlight_mode(&mut self, mode: HighlightMode) {
        self.apply(ReplayEvent::SetHighlightMode(mode));
    }

    /// Edges leaving and entering `node`, independent of the cursor.
    pub fn highlight_set(&self, node: &str) -> HighlightSet {
        let mut set = HighlightSet::default();
        for event in &self.timeline {
            if event.caller == node {
                set.outgoing.insert(event.index);
            }
            if event.callee == node {
                set.incoming.insert(event.index);
            }
        }
        set
    }

    /// Neighbour roles of the selected node, limited to the enabled
    /// highlight directions.
    pub fn node_roles(&self) -> BTreeMap<String, NodeRole> {
        let mut roles = BTreeMap::new();
        let Some(selected) = self.state.selected.as_deref() else {
            return roles;
        };
        let mode = self.state.highlight;
        if mode.outgoing {
            for event in self.timeline.iter().filter(|e| e.caller == selected) {
                roles.insert(event.callee.clone(), NodeRole::Callee);
            }
        }
        if mode.incoming {
            for event in self.timeline.iter().filter(|e| e.callee == selected) {
                roles.insert(event.caller.clone(), NodeRole::Caller);
            }
        }
        roles.insert(selected.to_string(), NodeRole::Selected);
        roles
    }

    fn active_highlights(&self) -> HighlightSet {
        self.state
            .selected
            .as_deref()
            .map(|node| self.highlight_set(node).filtered(self.state.highlight))
            .unwrap_or_default()
    }

    pub fn edge_view(&self, index: usize) -> EdgeView {
        EdgeView::new(index, self.state.cursor, &self.active_highlights())
    }

    /// Full render snapshot, recomputed from scratch.
    pub fn frame(&self) -> Frame {
        let highlights = self.active_highlights();
        Frame {
            state: self.state.clone(),
            phase: self.state.phase(),
            edges: (0..self.timeline.len())
                .map(|i| EdgeView::new(i, self.state.cursor, &highlights))
                .collect(),
            nodes: self.node_roles(),
        }
    }

    /// Select a node by exact name, else by first case-insensitive substring
    /// match in node order.
    pub fn search(&mut self, query: &str) -> Option<String> {
        if query.is_empty() {
            return None;
        }
        let needle = query.to_lowercase();
        let found = self
            .nodes
            .iter()
            .find(|n| n.as_str() == query)
            .or_else(|| self.nodes.iter().find(|n| n.to_lowercase().contains(&needle)))
            .cloned()?;
        self.select(Some(found.clone()));
        Some(found)
    }

    /// Jump to the first edge leaving `node` and stop playback.
    pub fn continue_from(&mut self, node: &str) -> Option<usize> {
        let index = self.timeline.iter().position(|e| e.caller == node)?;
        self.seek(Some(index));
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traversal::traverse;

    fn scenario() -> ReplaySession {
        let graph: CallGraph = [("A", "B"), ("A", "C"), ("B", "C")].into_iter().collect();
        let record = traverse(&graph, "A");
        ReplaySession::from_traversal(&graph, &record)
    }

    fn pairs(session: &ReplaySession) -> Vec<(&str, &str)> {
        session
            .timeline()
            .iter()
            .map(|e| (e.caller.as_str(), e.callee.as_str()))
            .collect()
    }

    #[test]
    fn test_edge_sequence_scenario() {
        let session = scenario();
        assert_eq!(pairs(&session), vec![("A", "B"), ("A", "C"), ("B", "C")]);
        assert_eq!(session.timeline()[2].key(), "B->C");
    }

    #[test]
    fn test_unreached_targets_are_excluded() {
        let graph: CallGraph = [("main", "f"), ("orphan", "g"), ("f", "main")].into_iter().collect();
        let record = traverse(&graph, "main");
        let events = edge_sequence(&graph, &record);
        let keys: Vec<String> = events.iter().map(EdgeEvent::key).collect();
        assert_eq!(keys, vec!["main->f", "f->main"]);
    }

    #[test]
    fn test_step_forward_and_back_round_trip() {
        let mut session = scenario();
        let len = session.len();
        for _ in 0..len {
            session.step_forward();
        }
        assert_eq!(session.state().cursor, Some(len - 1));
        session.step_forward();
        assert_eq!(session.state().cursor, Some(len - 1));
        for _ in 0..len {
            session.step_back();
        }
        assert_eq!(session.state().cursor, None);
        assert_eq!(session.state().phase(), Phase::Idle);
        session.step_back();
        assert_eq!(session.state().cursor, None);
    }

    #[test]
    fn test_play_forward_until_end() {
        let mut session = scenario();
        assert!(session.play(Direction::Forward));
        assert!(!session.play(Direction::Forward));
        let mut steps = 0;
        while session.tick() {
            steps += 1;
        }
        assert_eq!(steps, 3);
        assert_eq!(session.state().cursor, Some(2));
        assert_eq!(session.state().phase(), Phase::Positioned);
        assert!(!session.play(Direction::Forward));
    }

    #[test]
    fn test_play_backward_until_idle() {
        let mut session = scenario();
        session.seek(Some(1));
        assert!(session.play(Direction::Backward));
        assert_eq!(session.state().phase(), Phase::PlayingBackward);
        while session.tick() {}
        assert_eq!(session.state().cursor, None);
        assert_eq!(session.state().direction, Direction::Idle);
        assert!(!session.play(Direction::Backward));
    }

    #[test]
    fn test_pause_keeps_cursor() {
        let mut session = scenario();
        session.play(Direction::Forward);
        session.tick();
        session.pause();
        assert_eq!(session.state().cursor, Some(0));
        assert_eq!(session.state().phase(), Phase::Positioned);
        assert!(!session.tick());
        session.pause();
        assert_eq!(session.state().cursor, Some(0));
    }

    #[test]
    fn test_reversing_direction() {
        let mut session = scenario();
        session.seek(Some(1));
        assert!(session.play(Direction::Backward));
        assert!(session.play(Direction::Forward));
        assert_eq!(session.state().direction, Direction::Forward);
    }

    #[test]
    fn test_empty_timeline() {
        let mut session = ReplaySession::new(vec!["main".to_string()], Vec::new());
        session.step_forward();
        assert_eq!(session.state().cursor, None);
        assert!(!session.play(Direction::Forward));
        session.seek(Some(3));
        assert_eq!(session.state().cursor, None);
    }

    #[test]
    fn test_seek_clamps_and_stops() {
        let mut session = scenario();
        session.play(Direction::Forward);
        session.seek(Some(10));
        assert_eq!(session.state().cursor, Some(2));
        assert_eq!(session.state().direction, Direction::Idle);
        session.seek(None);
        assert_eq!(session.state().phase(), Phase::Idle);
    }

    #[test]
    fn test_tiers() {
        assert_eq!(EdgeTier::of(0, None), EdgeTier::Future);
        assert_eq!(EdgeTier::of(3, Some(3)), EdgeTier::Current);
        assert_eq!(EdgeTier::of(2, Some(3)), EdgeTier::Previous);
        assert_eq!(EdgeTier::of(1, Some(3)), EdgeTier::Past);
        assert_eq!(EdgeTier::of(4, Some(3)), EdgeTier::Future);
    }

    #[test]
    fn test_highlight_set_ignores_cursor() {
        let session = scenario();
        let set = session.highlight_set("C");
        assert!(set.outgoing.is_empty());
        assert_eq!(set.incoming.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        let set = session.highlight_set("A");
        assert_eq!(set.outgoing.iter().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_frame_reveals_highlighted_future_edges() {
        let mut session = scenario();
        session.step_forward();
        session.select(Some("B".to_string()));
        let frame = session.frame();
        assert_eq!(frame.edges[0].tier, EdgeTier::Current);
        assert_eq!(frame.edges[0].color, CURRENT_COLOR);
        assert!(frame.edges[0].visible);
        assert!(!frame.edges[1].visible);
        assert_eq!(frame.edges[2].tier, EdgeTier::Future);
        assert!(frame.edges[2].visible);
        assert_eq!(frame.edges[2].color, OUTGOING_COLOR);
        assert_eq!(frame.nodes.get("B"), Some(&NodeRole::Selected));
        assert_eq!(frame.nodes.get("C"), Some(&NodeRole::Callee));
        assert_eq!(frame.nodes.get("A"), None);
    }

    #[test]
    fn test_highlight_mode_toggles() {
        let mut session = scenario();
        session.seek(Some(0));
        session.select(Some("C".to_string()));
        // Outgoing only by default, and C calls nothing.
        let frame = session.frame();
        assert!(!frame.edges[2].visible);
        assert_eq!(frame.nodes.len(), 1);

        session.set_highlight_mode(HighlightMode {
            outgoing: true,
            incoming: true,
        });
        let frame = session.frame();
        assert_eq!(frame.edges[1].color, INCOMING_COLOR);
        assert!(frame.edges[2].visible);
        assert_eq!(frame.edges[2].highlight, Some(Highlight::Incoming));
        assert_eq!(frame.nodes.get("A"), Some(&NodeRole::Caller));
        assert_eq!(frame.nodes.get("B"), Some(&NodeRole::Caller));

        session.select(Some("A".to_string()));
        session.set_highlight_mode(HighlightMode {
            outgoing: false,
            incoming: true,
        });
        assert_eq!(session.edge_view(1).color, BASE_COLOR);
        assert!(!session.edge_view(1).visible);
        assert_eq!(session.state().cursor, Some(0));
        assert_eq!(session.highlight_set("A").outgoing.len(), 2);
    }

    #[test]
    fn test_previous_tier_color() {
        let mut session = scenario();
        session.seek(Some(2));
        assert_eq!(session.edge_view(1).color, PREVIOUS_COLOR);
        assert_eq!(session.edge_view(0).color, BASE_COLOR);
        assert!(session.edge_view(0).visible);
    }

    #[test]
    fn test_select_does_not_move_cursor() {
        let mut session = scenario();
        session.seek(Some(1));
        session.select(Some("A".to_string()));
        session.select(None);
        assert_eq!(session.state().cursor, Some(1));
        assert!(session.node_roles().is_empty());
    }

    #[test]
    fn test_search_prefers_exact_match() {
        let graph: CallGraph = [("main", "poly_ntt"), ("main", "ntt")].into_iter().collect();
        let record = traverse(&graph, "main");
        let mut session = ReplaySession::from_traversal(&graph, &record);
        assert_eq!(session.search("ntt").as_deref(), Some("ntt"));
        assert_eq!(session.search("POLY").as_deref(), Some("poly_ntt"));
        assert_eq!(session.state().selected.as_deref(), Some("poly_ntt"));
        assert_eq!(session.search("missing"), None);
    }

    #[test]
    fn test_continue_from_node() {
        let mut session = scenario();
        session.play(Direction::Forward);
        assert_eq!(session.continue_from("B"), Some(2));
        assert_eq!(session.state().cursor, Some(2));
        assert_eq!(session.state().direction, Direction::Idle);
        assert_eq!(session.continue_from("C"), None);
        assert_eq!(session.state().cursor, Some(2));
    }
}
