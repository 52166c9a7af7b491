//! Intra-project experience aggregates: how active an actor has been
//! within the event's own project during the window.

use std::collections::HashMap;

use crate::features::{Feature, FeatureValue, MergeOutcomes, SlidingWindowFeature};
use crate::model::Event;

type CountTable = HashMap<i64, HashMap<String, i64>>;

fn bump(table: &mut CountTable, actor: i64, project: &str, sign: i64) {
    let buckets = table.entry(actor).or_default();
    let count = buckets.entry(project.to_string()).or_insert(0);
    *count += sign;
    if *count == 0 {
        buckets.remove(project);
        if buckets.is_empty() {
            table.remove(&actor);
        }
    }
}

fn lookup(table: &CountTable, actor: i64, project: &str) -> i64 {
    table
        .get(&actor)
        .and_then(|buckets| buckets.get(project))
        .copied()
        .unwrap_or(0)
}

/// In-window submissions by the event's submitter within its project.
/// One instance per feed (pull requests, issues), distinguished by name.
pub struct SubmissionCount {
    name: String,
    counts: CountTable,
}

impl SubmissionCount {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            counts: CountTable::new(),
        }
    }
}

impl Feature for SubmissionCount {
    fn names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        event.user.is_some()
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        let Some(submitter) = event.submitter_id() else {
            return vec![FeatureValue::Missing];
        };
        vec![FeatureValue::Int(lookup(
            &self.counts,
            submitter,
            &event.project,
        ))]
    }
}

impl SlidingWindowFeature for SubmissionCount {
    fn add(&mut self, event: &Event) {
        if let Some(submitter) = event.submitter_id() {
            bump(&mut self.counts, submitter, &event.project, 1);
        }
    }

    fn remove(&mut self, event: &Event) {
        if let Some(submitter) = event.submitter_id() {
            bump(&mut self.counts, submitter, &event.project, -1);
        }
    }
}

/// In-window comments by the event's submitter within its project.
pub struct CommentCount {
    name: String,
    counts: CountTable,
}

impl CommentCount {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            counts: CountTable::new(),
        }
    }
}

impl Feature for CommentCount {
    fn names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        event.user.is_some() && event.has_comment_data()
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        let Some(submitter) = event.submitter_id() else {
            return vec![FeatureValue::Missing];
        };
        vec![FeatureValue::Int(lookup(
            &self.counts,
            submitter,
            &event.project,
        ))]
    }
}

impl SlidingWindowFeature for CommentCount {
    fn add(&mut self, event: &Event) {
        self.handle(event, 1);
    }

    fn remove(&mut self, event: &Event) {
        self.handle(event, -1);
    }
}

impl CommentCount {
    fn handle(&mut self, event: &Event, sign: i64) {
        let Some(comments) = &event.comments_data else {
            return;
        };
        for comment in comments {
            bump(&mut self.counts, comment.user.id, &event.project, sign);
        }
    }
}

/// In-window pull requests handled (merged or closed) by the event's
/// integrator within its project.
pub struct IntegratorExperience {
    counts: CountTable,
}

impl IntegratorExperience {
    pub fn new() -> Self {
        Self {
            counts: CountTable::new(),
        }
    }
}

impl Default for IntegratorExperience {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for IntegratorExperience {
    fn names(&self) -> Vec<String> {
        vec!["ControlIntraProjectPullRequestExperienceOfIntegrator".to_string()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        event.integrator().is_some()
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        let Some(integrator) = event.integrator() else {
            return vec![FeatureValue::Missing];
        };
        vec![FeatureValue::Int(lookup(
            &self.counts,
            integrator.id,
            &event.project,
        ))]
    }
}

impl SlidingWindowFeature for IntegratorExperience {
    fn add(&mut self, event: &Event) {
        if let Some(integrator) = event.integrator() {
            bump(&mut self.counts, integrator.id, &event.project, 1);
        }
    }

    fn remove(&mut self, event: &Event) {
        if let Some(integrator) = event.integrator() {
            bump(&mut self.counts, integrator.id, &event.project, -1);
        }
    }
}

/// In-window merge success rate of the event's submitter within its
/// project. Correlates with core-member status, which is why it doubles
/// as the core-member proxy control variable.
pub struct SubmitterSuccessRate {
    outcomes: HashMap<String, HashMap<i64, MergeOutcomes>>,
}

impl SubmitterSuccessRate {
    pub fn new() -> Self {
        Self {
            outcomes: HashMap::new(),
        }
    }

    fn handle(&mut self, event: &Event, sign: i64) {
        let (Some(submitter), Some(merged)) = (event.submitter_id(), event.merged) else {
            return;
        };
        let per_actor = self.outcomes.entry(event.project.clone()).or_default();
        let outcomes = per_actor.entry(submitter).or_default();
        outcomes.record(merged, sign);
        if outcomes.is_empty() {
            per_actor.remove(&submitter);
            if per_actor.is_empty() {
                self.outcomes.remove(&event.project);
            }
        }
    }
}

impl Default for SubmitterSuccessRate {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for SubmitterSuccessRate {
    fn names(&self) -> Vec<String> {
        vec!["ControlIntraProjectPullRequestSuccessRateSubmitter".to_string()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        event.user.is_some() && event.merged.is_some()
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        let Some(submitter) = event.submitter_id() else {
            return vec![FeatureValue::Missing];
        };
        let rate = self
            .outcomes
            .get(&event.project)
            .and_then(|per_actor| per_actor.get(&submitter))
            .map(MergeOutcomes::success_rate)
            .unwrap_or(0.0);
        vec![FeatureValue::Float(rate)]
    }
}

impl SlidingWindowFeature for SubmitterSuccessRate {
    fn add(&mut self, event: &Event) {
        self.handle(event, 1);
    }

    fn remove(&mut self, event: &Event) {
        self.handle(event, -1);
    }
}
