//! Collaboration multigraph shared by the centrality features.
//!
//! Nodes are actor ids. An edge holds one FIFO queue per edge kind, each
//! entry tagged with the timestamp and project it came from. Entries
//! leave the window in the order they entered it, so removal always pops
//! the front of the right queue. Empty queues, dead edges, and isolated
//! nodes are cleaned up eagerly to keep the graph proportional to the
//! window contents.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::features::{Feature, FeatureValue, Role, SlidingWindowFeature};
use crate::model::Event;

/// The activity an edge instance records, named source-to-target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    PullRequestIntegratorToSubmitter,
    PullRequestCommenterToSubmitter,
    PullRequestCommenterToCommenter,
    IssueCommenterToSubmitter,
    IssueCommenterToCommenter,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 5] = [
        EdgeKind::PullRequestIntegratorToSubmitter,
        EdgeKind::PullRequestCommenterToSubmitter,
        EdgeKind::PullRequestCommenterToCommenter,
        EdgeKind::IssueCommenterToSubmitter,
        EdgeKind::IssueCommenterToCommenter,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::PullRequestIntegratorToSubmitter => "PullRequestIntegratorToSubmitter",
            EdgeKind::PullRequestCommenterToSubmitter => "PullRequestCommenterToSubmitter",
            EdgeKind::PullRequestCommenterToCommenter => "PullRequestCommenterToCommenter",
            EdgeKind::IssueCommenterToSubmitter => "IssueCommenterToSubmitter",
            EdgeKind::IssueCommenterToCommenter => "IssueCommenterToCommenter",
        }
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|k| k == self).unwrap_or(0)
    }
}

/// One timestamped, project-tagged occurrence of an edge kind.
#[derive(Debug, Clone)]
pub struct EdgeInstance {
    pub at: DateTime<Utc>,
    pub project: String,
}

/// Per-kind instance queues on a single (source, target) edge. Queues
/// stay chronologically ordered because events arrive and leave the
/// window in timestamp order.
#[derive(Debug, Default)]
pub struct EdgeData {
    queues: [VecDeque<EdgeInstance>; 5],
}

impl EdgeData {
    fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }

    pub fn instances(&self, kind: EdgeKind) -> &VecDeque<EdgeInstance> {
        &self.queues[kind.index()]
    }
}

pub struct CollaborationGraph {
    graph: DiGraphMap<i64, EdgeData>,
    added_per_kind: [u64; 5],
}

impl CollaborationGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraphMap::new(),
            added_per_kind: [0; 5],
        }
    }

    /// Records one edge instance. Self-loops are ignored.
    pub fn add(&mut self, kind: EdgeKind, source: i64, target: i64, at: DateTime<Utc>, project: &str) {
        if source == target {
            return;
        }
        if self.graph.edge_weight(source, target).is_none() {
            self.graph.add_edge(source, target, EdgeData::default());
        }
        if let Some(data) = self.graph.edge_weight_mut(source, target) {
            data.queues[kind.index()].push_back(EdgeInstance {
                at,
                project: project.to_string(),
            });
            self.added_per_kind[kind.index()] += 1;
        }
    }

    /// Removes the oldest instance of the kind on the edge. Dead edges
    /// and isolated endpoints are dropped.
    pub fn remove(&mut self, kind: EdgeKind, source: i64, target: i64) {
        if source == target {
            return;
        }
        let mut edge_dead = false;
        if let Some(data) = self.graph.edge_weight_mut(source, target) {
            data.queues[kind.index()].pop_front();
            edge_dead = data.is_empty();
        }
        if edge_dead {
            self.graph.remove_edge(source, target);
            for node in [source, target] {
                if self.is_isolate(node) {
                    self.graph.remove_node(node);
                }
            }
        }
    }

    fn is_isolate(&self, node: i64) -> bool {
        self.graph.contains_node(node)
            && self.graph.neighbors_directed(node, Direction::Incoming).next().is_none()
            && self.graph.neighbors_directed(node, Direction::Outgoing).next().is_none()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Total instances added per kind over the graph's lifetime, in
    /// [`EdgeKind::ALL`] order.
    pub fn added_report(&self) -> Vec<(&'static str, u64)> {
        EdgeKind::ALL
            .iter()
            .map(|kind| (kind.label(), self.added_per_kind[kind.index()]))
            .collect()
    }

    pub fn neighbors_directed(
        &self,
        node: i64,
        direction: Direction,
    ) -> impl Iterator<Item = i64> + '_ {
        self.graph.neighbors_directed(node, direction)
    }

    pub fn edge_data(&self, source: i64, target: i64) -> Option<&EdgeData> {
        self.graph.edge_weight(source, target)
    }
}

impl Default for CollaborationGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Maintains one edge kind on the shared graph as events slide through
/// the window. Produces no output columns of its own; the centrality
/// features read the graph it builds.
pub struct EdgeBuilder {
    kind: EdgeKind,
    source: Role,
    target: Role,
    graph: Rc<RefCell<CollaborationGraph>>,
}

impl EdgeBuilder {
    pub fn new(kind: EdgeKind, source: Role, target: Role, graph: Rc<RefCell<CollaborationGraph>>) -> Self {
        Self {
            kind,
            source,
            target,
            graph,
        }
    }
}

impl Feature for EdgeBuilder {
    fn names(&self) -> Vec<String> {
        vec![self.kind.label().to_string()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        self.source.is_resolvable(event) && self.target.is_resolvable(event)
    }

    fn measure(&self, _event: &Event) -> Vec<FeatureValue> {
        Vec::new()
    }

    fn is_output(&self) -> bool {
        false
    }
}

impl SlidingWindowFeature for EdgeBuilder {
    fn add(&mut self, event: &Event) {
        let sources = self.source.actor_ids(event);
        let targets = self.target.actor_ids(event);
        let mut graph = self.graph.borrow_mut();
        for &source in &sources {
            for &target in &targets {
                graph.add(self.kind, source, target, event.closed_at, &event.project);
            }
        }
    }

    fn remove(&mut self, event: &Event) {
        let sources = self.source.actor_ids(event);
        let targets = self.target.actor_ids(event);
        let mut graph = self.graph.borrow_mut();
        for &source in &sources {
            for &target in &targets {
                graph.remove(self.kind, source, target);
            }
        }
    }
}

/// The edge builders one worker's feature set shares a graph with, in
/// the order their kinds index the centrality vectors.
pub fn build_edge_builders(
    graph: &Rc<RefCell<CollaborationGraph>>,
) -> (Vec<EdgeBuilder>, Vec<EdgeBuilder>) {
    let pr = vec![
        EdgeBuilder::new(
            EdgeKind::PullRequestIntegratorToSubmitter,
            Role::Integrator,
            Role::Submitter,
            Rc::clone(graph),
        ),
        EdgeBuilder::new(
            EdgeKind::PullRequestCommenterToSubmitter,
            Role::Commenters,
            Role::Submitter,
            Rc::clone(graph),
        ),
        EdgeBuilder::new(
            EdgeKind::PullRequestCommenterToCommenter,
            Role::Commenters,
            Role::Commenters,
            Rc::clone(graph),
        ),
    ];
    let issues = vec![
        EdgeBuilder::new(
            EdgeKind::IssueCommenterToSubmitter,
            Role::Commenters,
            Role::Submitter,
            Rc::clone(graph),
        ),
        EdgeBuilder::new(
            EdgeKind::IssueCommenterToCommenter,
            Role::Commenters,
            Role::Commenters,
            Rc::clone(graph),
        ),
    ];
    (pr, issues)
}
