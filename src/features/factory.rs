//! Assembles the feature roster for one worker.
//!
//! Every worker builds its own set from a shared factory so that no
//! window state crosses worker boundaries. The collaboration graph is
//! `Rc`-shared between the edge builders and the centrality features of
//! a single set only.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use petgraph::Direction;
use thiserror::Error;

use crate::deps::{DependencyMap, ProjectFilter, ProjectScope};
use crate::features::centrality::{CentralityScope, DegreeCentrality};
use crate::features::control;
use crate::features::ecosystem::{EcosystemExperience, EcosystemMetric};
use crate::features::graph::{build_edge_builders, CollaborationGraph};
use crate::features::intra_project;
use crate::features::shared::{PairScope, SharedExperience};
use crate::features::{Feature, FeatureValue, InvalidEntryCounter, Role, SlidingWindowFeature};
use crate::model::Event;

#[derive(Debug, Error)]
pub enum FactoryError {
    /// Two roster entries claimed the same output column.
    #[error("duplicate feature name: {0}")]
    DuplicateName(String),
}

/// Describes which parts of the roster a run uses. `Clone` so every
/// worker can build from the same description.
#[derive(Clone)]
pub struct FeatureFactory {
    use_graph: bool,
    deps: Option<Arc<DependencyMap>>,
}

/// One worker's features, grouped by the event kind that feeds them.
/// Plain features only read the scored entry; sliding-window features
/// also track the in-window population.
pub struct FeatureSet {
    pub pr_plain: Vec<Box<dyn Feature>>,
    pub pr_sw: Vec<Box<dyn SlidingWindowFeature>>,
    pub issue_sw: Vec<Box<dyn SlidingWindowFeature>>,
    /// Present when the run builds the collaboration graph.
    pub graph: Option<Rc<RefCell<CollaborationGraph>>>,
}

impl FeatureFactory {
    pub fn new(use_graph: bool, deps: Option<Arc<DependencyMap>>) -> Self {
        Self { use_graph, deps }
    }

    /// Builds a fresh feature set with empty state. Fails when the
    /// roster contains a column name twice, which otherwise surfaces as
    /// a silently misaligned dataset.
    pub fn build(&self) -> Result<FeatureSet, FactoryError> {
        let mut pr_plain: Vec<Box<dyn Feature>> = vec![
            Box::new(control::IsMerged),
            Box::new(control::IntegratedBySameUser),
            Box::new(control::LifetimeInMinutes),
            Box::new(control::HasComments),
            Box::new(control::CommitCount),
            Box::new(control::HasCommentByExternalUser),
            Box::new(control::HasHashtagInDescription),
        ];

        let mut pr_sw: Vec<Box<dyn SlidingWindowFeature>> = vec![
            Box::new(control::FirstTimeContributor::new()),
            Box::new(intra_project::IntegratorExperience::new()),
            Box::new(intra_project::SubmitterSuccessRate::new()),
            Box::new(intra_project::SubmissionCount::new(
                "IntraProjectSubmitterPullRequestSubmissionCount",
            )),
            Box::new(intra_project::CommentCount::new(
                "IntraProjectSubmitterPullRequestCommentCount",
            )),
        ];
        let mut issue_sw: Vec<Box<dyn SlidingWindowFeature>> = vec![
            Box::new(intra_project::SubmissionCount::new(
                "IntraProjectSubmitterIssueSubmissionCount",
            )),
            Box::new(intra_project::CommentCount::new(
                "IntraProjectSubmitterIssueCommentCount",
            )),
        ];

        push_shared_experience(&mut pr_sw, &mut issue_sw);
        push_ecosystem_experience(&mut pr_sw, &mut issue_sw, self.deps.as_ref());

        let graph = if self.use_graph {
            let graph = Rc::new(RefCell::new(CollaborationGraph::new()));
            let (pr_builders, issue_builders) = build_edge_builders(&graph);
            for builder in pr_builders {
                pr_sw.push(Box::new(builder));
            }
            for builder in issue_builders {
                issue_sw.push(Box::new(builder));
            }
            for scope in [
                CentralityScope::All,
                CentralityScope::IntraProject,
                CentralityScope::Ecosystem,
            ] {
                for direction in [Direction::Incoming, Direction::Outgoing] {
                    pr_plain.push(Box::new(DegreeCentrality::new(
                        Rc::clone(&graph),
                        direction,
                        scope,
                    )));
                }
            }
            Some(graph)
        } else {
            None
        };

        let set = FeatureSet {
            pr_plain,
            pr_sw,
            issue_sw,
            graph,
        };
        set.check_name_uniqueness()?;
        Ok(set)
    }
}

/// Shared experience pairs, intra-project then ecosystem scope, matching
/// the output column order.
fn push_shared_experience(
    pr_sw: &mut Vec<Box<dyn SlidingWindowFeature>>,
    issue_sw: &mut Vec<Box<dyn SlidingWindowFeature>>,
) {
    for (scope, prefix) in [
        (PairScope::IntraProject, "IntraProjectSharedExperience"),
        (PairScope::Ecosystem, "EcosystemSharedExperience"),
    ] {
        pr_sw.push(Box::new(SharedExperience::new(
            &format!("{prefix}PullRequestSubmittedBySubmitterIntegratedByIntegrator"),
            Role::Submitter,
            Role::Integrator,
            scope,
        )));
        pr_sw.push(Box::new(SharedExperience::new(
            &format!("{prefix}PullRequestSubmittedByIntegratorIntegratedBySubmitter"),
            Role::Integrator,
            Role::Submitter,
            scope,
        )));
        pr_sw.push(Box::new(SharedExperience::new(
            &format!("{prefix}PullRequestSubmittedBySubmitterCommentedOnByIntegrator"),
            Role::Submitter,
            Role::Commenters,
            scope,
        )));
        pr_sw.push(Box::new(SharedExperience::new(
            &format!("{prefix}PullRequestSubmittedByIntegratorCommentedOnBySubmitter"),
            Role::Commenters,
            Role::Submitter,
            scope,
        )));
        pr_sw.push(Box::new(SharedExperience::new(
            &format!("{prefix}PullRequestDiscussionParticipationByIntegratorAndSubmitter"),
            Role::Commenters,
            Role::Commenters,
            scope,
        )));

        issue_sw.push(Box::new(SharedExperience::new(
            &format!("{prefix}IssueSubmittedBySubmitterCommentedOnByIntegrator"),
            Role::Submitter,
            Role::Commenters,
            scope,
        )));
        issue_sw.push(Box::new(SharedExperience::new(
            &format!("{prefix}IssueSubmittedByIntegratorCommentedOnBySubmitter"),
            Role::Commenters,
            Role::Submitter,
            scope,
        )));
        issue_sw.push(Box::new(SharedExperience::new(
            &format!("{prefix}IssueDiscussionParticipationByIntegratorAndSubmitter"),
            Role::Commenters,
            Role::Commenters,
            scope,
        )));
    }
}

/// Ecosystem experience, the unscoped variants first and the
/// dependency-derived ones after, mirroring the column order of the
/// produced datasets. Dependency-derived variants only exist when a
/// dependency map is available.
fn push_ecosystem_experience(
    pr_sw: &mut Vec<Box<dyn SlidingWindowFeature>>,
    issue_sw: &mut Vec<Box<dyn SlidingWindowFeature>>,
    deps: Option<&Arc<DependencyMap>>,
) {
    push_eco_scope(pr_sw, issue_sw, "EcosystemExperience", ProjectFilter::ecosystem(), true);

    let Some(deps) = deps else {
        return;
    };
    for (scope, prefix) in [
        (ProjectScope::Dependency, "DependencyEcosystemExperience"),
        (ProjectScope::NonDependency, "NonDependencyEcosystemExperience"),
        (
            ProjectScope::InverseDependency,
            "InverseDependencyEcosystemExperience",
        ),
    ] {
        let filter = ProjectFilter::scoped(scope, Arc::clone(deps));
        push_eco_scope(pr_sw, issue_sw, prefix, filter, false);
    }
}

fn push_eco_scope(
    pr_sw: &mut Vec<Box<dyn SlidingWindowFeature>>,
    issue_sw: &mut Vec<Box<dyn SlidingWindowFeature>>,
    prefix: &str,
    filter: ProjectFilter,
    with_discussion: bool,
) {
    pr_sw.push(Box::new(EcosystemExperience::new(
        &format!("{prefix}SubmitterPullRequestSubmissionCount"),
        EcosystemMetric::SubmissionCount,
        filter.clone(),
    )));
    pr_sw.push(Box::new(EcosystemExperience::new(
        &format!("{prefix}SubmitterPullRequestSuccessRate"),
        EcosystemMetric::SuccessRate,
        filter.clone(),
    )));
    pr_sw.push(Box::new(EcosystemExperience::new(
        &format!("{prefix}SubmitterPullRequestCommentCount"),
        EcosystemMetric::CommentCount,
        filter.clone(),
    )));
    issue_sw.push(Box::new(EcosystemExperience::new(
        &format!("{prefix}SubmitterIssueSubmissionCount"),
        EcosystemMetric::SubmissionCount,
        filter.clone(),
    )));
    issue_sw.push(Box::new(EcosystemExperience::new(
        &format!("{prefix}SubmitterIssueCommentCount"),
        EcosystemMetric::CommentCount,
        filter.clone(),
    )));
    if with_discussion {
        pr_sw.push(Box::new(EcosystemExperience::new(
            &format!("{prefix}SubmitterPullRequestDiscussionParticipationCount"),
            EcosystemMetric::DiscussionParticipation,
            filter.clone(),
        )));
        issue_sw.push(Box::new(EcosystemExperience::new(
            &format!("{prefix}SubmitterIssueDiscussionParticipationCount"),
            EcosystemMetric::DiscussionParticipation,
            filter,
        )));
    }
}

impl FeatureSet {
    /// All features in output order: plain, then PR-fed, then issue-fed.
    fn all_features(&self) -> impl Iterator<Item = &dyn Feature> {
        self.pr_plain
            .iter()
            .map(|f| f.as_ref() as &dyn Feature)
            .chain(self.pr_sw.iter().map(|f| f.as_ref() as &dyn Feature))
            .chain(self.issue_sw.iter().map(|f| f.as_ref() as &dyn Feature))
    }

    /// Output column names following the preamble, in roster order.
    pub fn output_names(&self) -> Vec<String> {
        self.all_features()
            .filter(|f| f.is_output())
            .flat_map(|f| f.names())
            .collect()
    }

    /// Measures every output feature against a scored pull request.
    /// Features rejecting the entry contribute empty cells and a tally
    /// in the counter, so one sparse field never drops a whole row.
    /// `events_seen` is maintained by the window manager, which sees
    /// issues too.
    pub fn measure_output(
        &self,
        event: &Event,
        invalid: &mut InvalidEntryCounter,
    ) -> Vec<FeatureValue> {
        let mut row = Vec::new();
        for feature in self.all_features() {
            if !feature.is_output() {
                continue;
            }
            if feature.is_valid(event) {
                row.extend(feature.measure(event));
            } else {
                for name in feature.names() {
                    invalid.record(&name);
                    row.push(FeatureValue::Missing);
                }
            }
        }
        row
    }

    fn check_name_uniqueness(&self) -> Result<(), FactoryError> {
        let mut seen = std::collections::HashSet::new();
        for feature in self.all_features() {
            for name in feature.names() {
                if !seen.insert(name.clone()) {
                    return Err(FactoryError::DuplicateName(name));
                }
            }
        }
        Ok(())
    }
}
