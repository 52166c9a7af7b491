//! Control predictors computed per entry.

use std::collections::HashMap;

use crate::features::{Feature, FeatureValue, SlidingWindowFeature};
use crate::model::Event;

/// The dependent variable: whether the pull request was merged.
pub struct IsMerged;

impl Feature for IsMerged {
    fn names(&self) -> Vec<String> {
        vec!["PullRequestIsMerged".to_string()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        event.merged.is_some()
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        vec![FeatureValue::Bool(event.merged == Some(true))]
    }
}

/// Whether the submitter merged or closed their own pull request.
pub struct IntegratedBySameUser;

impl Feature for IntegratedBySameUser {
    fn names(&self) -> Vec<String> {
        vec!["ControlIntegratedBySameUser".to_string()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        event.user.is_some() && event.integrator().is_some()
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        let same = match (event.submitter_id(), event.integrator()) {
            (Some(submitter), Some(integrator)) => submitter == integrator.id,
            _ => false,
        };
        vec![FeatureValue::Bool(same)]
    }
}

/// Time from creation to close, in minutes.
pub struct LifetimeInMinutes;

impl Feature for LifetimeInMinutes {
    fn names(&self) -> Vec<String> {
        vec!["ControlPullRequestLifeTimeInMinutes".to_string()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        event.closed_at >= event.created_at
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        let minutes = (event.closed_at - event.created_at).num_seconds() as f64 / 60.0;
        vec![FeatureValue::Float(minutes)]
    }
}

/// Whether the pull request received any comments.
pub struct HasComments;

impl Feature for HasComments {
    fn names(&self) -> Vec<String> {
        vec!["ControlPullRequestHasComments".to_string()]
    }

    fn is_valid(&self, _event: &Event) -> bool {
        true
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        vec![FeatureValue::Bool(event.comments > 0)]
    }
}

/// Number of commits in the pull request.
pub struct CommitCount;

impl Feature for CommitCount {
    fn names(&self) -> Vec<String> {
        vec!["ControlNumberOfCommitsInPullRequest".to_string()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        event.commits.is_some()
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        vec![FeatureValue::Int(event.commits.unwrap_or(0) as i64)]
    }
}

/// Whether anyone other than submitter and integrator commented.
pub struct HasCommentByExternalUser;

impl Feature for HasCommentByExternalUser {
    fn names(&self) -> Vec<String> {
        vec!["ControlPullRequestHasCommentByExternalUser".to_string()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        event.user.is_some() && event.integrator().is_some() && event.has_comment_data()
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        let submitter = event.submitter_id();
        let integrator = event.integrator().map(|a| a.id);
        let external = event
            .commenter_ids()
            .into_iter()
            .any(|id| Some(id) != submitter && Some(id) != integrator);
        vec![FeatureValue::Bool(external)]
    }
}

/// Whether title or body reference an issue via `#`.
pub struct HasHashtagInDescription;

impl Feature for HasHashtagInDescription {
    fn names(&self) -> Vec<String> {
        vec!["ControlHasHashTagInDescription".to_string()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        event.title.is_some()
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        let in_title = event.title.as_deref().is_some_and(|t| t.contains('#'));
        // Some PRs have no body at all.
        let in_body = event.body.as_deref().is_some_and(|b| b.contains('#'));
        vec![FeatureValue::Bool(in_title || in_body)]
    }
}

/// Whether the submitter has no earlier in-window pull request in the
/// project.
///
/// Windowed rather than lifetime-wide: a worker only ever replays the
/// chunk preceding its own, which reconstructs the window but not the
/// full history, so any lifetime registry would make chunked and
/// unchunked runs disagree.
#[derive(Default)]
pub struct FirstTimeContributor {
    submissions: HashMap<(String, i64), i64>,
}

impl FirstTimeContributor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Feature for FirstTimeContributor {
    fn names(&self) -> Vec<String> {
        vec!["SubmitterIsFirstTimeContributor".to_string()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        event.user.is_some()
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        let Some(submitter) = event.submitter_id() else {
            return vec![FeatureValue::Missing];
        };
        let key = (event.project.clone(), submitter);
        vec![FeatureValue::Bool(!self.submissions.contains_key(&key))]
    }
}

impl SlidingWindowFeature for FirstTimeContributor {
    fn add(&mut self, event: &Event) {
        let Some(submitter) = event.submitter_id() else {
            return;
        };
        *self
            .submissions
            .entry((event.project.clone(), submitter))
            .or_insert(0) += 1;
    }

    fn remove(&mut self, event: &Event) {
        let Some(submitter) = event.submitter_id() else {
            return;
        };
        let key = (event.project.clone(), submitter);
        if let Some(count) = self.submissions.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.submissions.remove(&key);
            }
        }
    }
}
