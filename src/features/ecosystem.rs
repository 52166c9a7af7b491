//! Ecosystem-wide experience aggregates.
//!
//! State is bucketed per (actor, project); reads sum the actor's buckets
//! while a [`ProjectFilter`] decides which projects count. The event's
//! own project never contributes, which keeps "ecosystem experience"
//! disjoint from the intra-project features.

use std::collections::HashMap;

use crate::deps::ProjectFilter;
use crate::features::{Feature, FeatureValue, MergeOutcomes, SlidingWindowFeature};
use crate::model::Event;

/// Which aspect of experience the instance aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcosystemMetric {
    /// Entries submitted by the actor.
    SubmissionCount,
    /// Merge success rate over the actor's submissions (PR feeds only).
    SuccessRate,
    /// Individual comments written by the actor.
    CommentCount,
    /// Entries whose discussion the actor participated in.
    DiscussionParticipation,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    count: i64,
    outcomes: MergeOutcomes,
}

impl Bucket {
    fn is_empty(&self) -> bool {
        self.count == 0 && self.outcomes.is_empty()
    }
}

/// One parameterized ecosystem-experience instance. The original
/// expressed each (metric × scope × feed) combination as its own class;
/// here the combination is carried by the constructor arguments and the
/// output name.
pub struct EcosystemExperience {
    name: String,
    metric: EcosystemMetric,
    filter: ProjectFilter,
    buckets: HashMap<i64, HashMap<String, Bucket>>,
}

impl EcosystemExperience {
    pub fn new(name: &str, metric: EcosystemMetric, filter: ProjectFilter) -> Self {
        Self {
            name: name.to_string(),
            metric,
            filter,
            buckets: HashMap::new(),
        }
    }

    fn bump(&mut self, actor: i64, project: &str, sign: i64, merged: Option<bool>) {
        let per_project = self.buckets.entry(actor).or_default();
        let bucket = per_project.entry(project.to_string()).or_default();
        match self.metric {
            EcosystemMetric::SuccessRate => {
                if let Some(merged) = merged {
                    bucket.outcomes.record(merged, sign);
                }
            }
            _ => bucket.count += sign,
        }
        if bucket.is_empty() {
            per_project.remove(project);
            if per_project.is_empty() {
                self.buckets.remove(&actor);
            }
        }
    }

    fn handle(&mut self, event: &Event, sign: i64) {
        match self.metric {
            EcosystemMetric::SubmissionCount | EcosystemMetric::SuccessRate => {
                if let Some(submitter) = event.submitter_id() {
                    self.bump(submitter, &event.project, sign, event.merged);
                }
            }
            EcosystemMetric::CommentCount => {
                if let Some(comments) = &event.comments_data {
                    for comment in comments {
                        self.bump(comment.user.id, &event.project, sign, None);
                    }
                }
            }
            EcosystemMetric::DiscussionParticipation => {
                for commenter in event.commenter_ids() {
                    self.bump(commenter, &event.project, sign, None);
                }
            }
        }
    }

    /// The actor whose experience a read aggregates.
    fn read_actor(&self, event: &Event) -> Option<i64> {
        event.submitter_id()
    }
}

impl Feature for EcosystemExperience {
    fn names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        match self.metric {
            EcosystemMetric::SubmissionCount => event.user.is_some(),
            EcosystemMetric::SuccessRate => event.user.is_some() && event.merged.is_some(),
            EcosystemMetric::CommentCount | EcosystemMetric::DiscussionParticipation => {
                event.user.is_some() && event.has_comment_data()
            }
        }
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        let Some(actor) = self.read_actor(event) else {
            return vec![FeatureValue::Missing];
        };
        let mut count = 0i64;
        let mut outcomes = MergeOutcomes::default();
        if let Some(per_project) = self.buckets.get(&actor) {
            for (project, bucket) in per_project {
                if self.filter.is_ignored(&event.project, project) {
                    continue;
                }
                count += bucket.count;
                outcomes.merged += bucket.outcomes.merged;
                outcomes.unmerged += bucket.outcomes.unmerged;
            }
        }
        match self.metric {
            EcosystemMetric::SuccessRate => vec![FeatureValue::Float(outcomes.success_rate())],
            _ => vec![FeatureValue::Int(count)],
        }
    }
}

impl SlidingWindowFeature for EcosystemExperience {
    fn add(&mut self, event: &Event) {
        self.handle(event, 1);
    }

    fn remove(&mut self, event: &Event) {
        self.handle(event, -1);
    }
}
