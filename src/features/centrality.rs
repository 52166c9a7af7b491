//! Degree centrality over the collaboration graph.
//!
//! For the submitter of the scored pull request, every edge pointing at
//! them is a connecting edge. Each neighbor on such an edge contributes
//! its own first-order edges (in or out degree, never the ones touching
//! the submitter) as experience. An experience instance counts once per
//! connecting instance that is strictly newer than it, so activity that
//! happened after the collaboration never inflates the score.
//!
//! The output is a vector with one cell per (connecting kind, experience
//! kind) pair in [`EdgeKind::ALL`] order, 25 cells total.

use std::cell::RefCell;
use std::rc::Rc;

use petgraph::Direction;

use crate::features::graph::{CollaborationGraph, EdgeKind};
use crate::features::{Feature, FeatureValue};
use crate::model::Event;

/// Which connecting-edge instances a variant considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CentralityScope {
    /// Every instance regardless of project.
    All,
    /// Only instances recorded in the event's own project.
    IntraProject,
    /// Only instances recorded outside the event's own project.
    Ecosystem,
}

impl CentralityScope {
    fn admits(&self, instance_project: &str, current_project: &str) -> bool {
        match self {
            CentralityScope::All => true,
            CentralityScope::IntraProject => instance_project == current_project,
            CentralityScope::Ecosystem => instance_project != current_project,
        }
    }

    fn name_prefix(&self) -> &'static str {
        match self {
            CentralityScope::All => "FirstOrderDegreeCentrality",
            CentralityScope::IntraProject => "IntraProjectSecondOrderDegreeCentrality",
            CentralityScope::Ecosystem => "EcosystemSecondOrderDegreeCentrality",
        }
    }
}

pub struct DegreeCentrality {
    graph: Rc<RefCell<CollaborationGraph>>,
    direction: Direction,
    scope: CentralityScope,
}

impl DegreeCentrality {
    pub fn new(
        graph: Rc<RefCell<CollaborationGraph>>,
        direction: Direction,
        scope: CentralityScope,
    ) -> Self {
        Self {
            graph,
            direction,
            scope,
        }
    }

    fn direction_label(&self) -> &'static str {
        match self.direction {
            Direction::Incoming => "In",
            Direction::Outgoing => "Out",
        }
    }
}

impl Feature for DegreeCentrality {
    fn names(&self) -> Vec<String> {
        let prefix = self.scope.name_prefix();
        let suffix = self.direction_label();
        let mut names = Vec::with_capacity(EdgeKind::ALL.len() * EdgeKind::ALL.len());
        for connecting in EdgeKind::ALL {
            for experience in EdgeKind::ALL {
                names.push(format!(
                    "{prefix}({}.{}-{suffix})",
                    connecting.label(),
                    experience.label()
                ));
            }
        }
        names
    }

    fn is_valid(&self, event: &Event) -> bool {
        event.user.is_some()
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        let kinds = EdgeKind::ALL.len();
        let Some(submitter) = event.submitter_id() else {
            return vec![FeatureValue::Missing; kinds * kinds];
        };

        let graph = self.graph.borrow();
        let mut degrees = vec![0i64; kinds * kinds];

        for neighbor in graph.neighbors_directed(submitter, Direction::Incoming) {
            let Some(connecting_data) = graph.edge_data(neighbor, submitter) else {
                continue;
            };
            for connecting_kind in EdgeKind::ALL {
                let connecting: Vec<_> = connecting_data
                    .instances(connecting_kind)
                    .iter()
                    .filter(|i| self.scope.admits(&i.project, &event.project))
                    .map(|i| i.at)
                    .collect();
                if connecting.is_empty() {
                    continue;
                }
                let row = connecting_kind_row(connecting_kind) * kinds;

                for other in graph.neighbors_directed(neighbor, self.direction) {
                    if other == submitter {
                        continue;
                    }
                    let experience_data = match self.direction {
                        Direction::Outgoing => graph.edge_data(neighbor, other),
                        Direction::Incoming => graph.edge_data(other, neighbor),
                    };
                    let Some(experience_data) = experience_data else {
                        continue;
                    };
                    for experience_kind in EdgeKind::ALL {
                        let instances = experience_data.instances(experience_kind);
                        if instances.is_empty() {
                            continue;
                        }
                        // Instances are chronological, so a binary scan
                        // would do; windows are small enough that the
                        // linear count stays cheap.
                        let mut degree = 0i64;
                        for connecting_at in &connecting {
                            degree += instances
                                .iter()
                                .take_while(|e| e.at < *connecting_at)
                                .count() as i64;
                        }
                        degrees[row + connecting_kind_row(experience_kind)] += degree;
                    }
                }
            }
        }

        degrees.into_iter().map(FeatureValue::Int).collect()
    }
}

fn connecting_kind_row(kind: EdgeKind) -> usize {
    EdgeKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::*;

    const INTEGRATED: EdgeKind = EdgeKind::PullRequestIntegratorToSubmitter;

    fn cell(values: &[FeatureValue], connecting: EdgeKind, experience: EdgeKind) -> i64 {
        let kinds = EdgeKind::ALL.len();
        let index = connecting_kind_row(connecting) * kinds + connecting_kind_row(experience);
        match values[index] {
            FeatureValue::Int(v) => v,
            _ => panic!("expected integer cell"),
        }
    }

    fn shared_graph() -> Rc<RefCell<CollaborationGraph>> {
        Rc::new(RefCell::new(CollaborationGraph::new()))
    }

    #[test]
    fn names_and_values_are_aligned() {
        let feature = DegreeCentrality::new(shared_graph(), Direction::Incoming, CentralityScope::All);
        let probe = pull_request(1, "a/app", 1, 10, 20);
        assert_eq!(feature.names().len(), feature.measure(&probe).len());
        assert_eq!(feature.names().len(), 25);
        assert_eq!(
            feature.names()[0],
            "FirstOrderDegreeCentrality(PullRequestIntegratorToSubmitter.PullRequestIntegratorToSubmitter-In)"
        );
    }

    #[test]
    fn counts_only_experience_before_connection() {
        let graph = shared_graph();
        {
            let mut g = graph.borrow_mut();
            // 30 collaborated with someone else at day 1 and 5, then
            // integrated for submitter 10 at day 3.
            g.add(INTEGRATED, 30, 40, ts(1), "b/lib");
            g.add(INTEGRATED, 30, 40, ts(5), "b/lib");
            g.add(INTEGRATED, 30, 10, ts(3), "a/app");
        }
        let feature = DegreeCentrality::new(Rc::clone(&graph), Direction::Outgoing, CentralityScope::All);

        let probe = pull_request(1, "a/app", 6, 10, 30);
        let values = feature.measure(&probe);
        // Only the day-1 experience predates the day-3 connection.
        assert_eq!(cell(&values, INTEGRATED, INTEGRATED), 1);
    }

    #[test]
    fn skips_first_order_edges_touching_submitter() {
        let graph = shared_graph();
        {
            let mut g = graph.borrow_mut();
            g.add(INTEGRATED, 30, 10, ts(3), "a/app");
            // Neighbor's only other activity points back at the submitter.
            g.add(INTEGRATED, 30, 10, ts(1), "b/lib");
        }
        let feature = DegreeCentrality::new(Rc::clone(&graph), Direction::Outgoing, CentralityScope::All);

        let probe = pull_request(1, "a/app", 4, 10, 30);
        let values = feature.measure(&probe);
        assert_eq!(cell(&values, INTEGRATED, INTEGRATED), 0);
    }

    #[test]
    fn scope_filters_connecting_instances() {
        let graph = shared_graph();
        {
            let mut g = graph.borrow_mut();
            g.add(INTEGRATED, 30, 40, ts(1), "b/lib");
            // Two connections: one in the scored project, one elsewhere.
            g.add(INTEGRATED, 30, 10, ts(3), "a/app");
            g.add(INTEGRATED, 30, 10, ts(4), "c/tool");
        }
        let probe = pull_request(1, "a/app", 5, 10, 30);

        let intra = DegreeCentrality::new(
            Rc::clone(&graph),
            Direction::Outgoing,
            CentralityScope::IntraProject,
        );
        assert_eq!(cell(&intra.measure(&probe), INTEGRATED, INTEGRATED), 1);

        let eco = DegreeCentrality::new(
            Rc::clone(&graph),
            Direction::Outgoing,
            CentralityScope::Ecosystem,
        );
        assert_eq!(cell(&eco.measure(&probe), INTEGRATED, INTEGRATED), 1);

        let all = DegreeCentrality::new(Rc::clone(&graph), Direction::Outgoing, CentralityScope::All);
        assert_eq!(cell(&all.measure(&probe), INTEGRATED, INTEGRATED), 2);
    }

    #[test]
    fn in_degree_reads_edges_into_the_neighbor() {
        let graph = shared_graph();
        {
            let mut g = graph.borrow_mut();
            g.add(INTEGRATED, 40, 30, ts(1), "b/lib");
            g.add(INTEGRATED, 30, 10, ts(3), "a/app");
        }
        let probe = pull_request(1, "a/app", 4, 10, 30);

        let incoming = DegreeCentrality::new(Rc::clone(&graph), Direction::Incoming, CentralityScope::All);
        assert_eq!(cell(&incoming.measure(&probe), INTEGRATED, INTEGRATED), 1);

        let outgoing = DegreeCentrality::new(Rc::clone(&graph), Direction::Outgoing, CentralityScope::All);
        assert_eq!(cell(&outgoing.measure(&probe), INTEGRATED, INTEGRATED), 0);
    }
}
