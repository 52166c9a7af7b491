//! Event data model for pull-request and issue activity.
//!
//! Events arrive as newline-delimited JSON, pre-sorted by closing
//! timestamp, tagged with the project they originate from and whether
//! they describe a pull request or an issue. They are never mutated
//! after entering the window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user account referenced by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
}

impl Actor {
    pub fn new(id: i64) -> Self {
        Self { id, login: None }
    }
}

/// A single comment on a pull request or issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub user: Actor,
    pub created_at: DateTime<Utc>,
}

/// Whether an event describes a pull request or an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "pull-request", alias = "pull-requests")]
    PullRequest,
    #[serde(rename = "issue", alias = "issues")]
    Issue,
}

/// One closed pull request or issue, the unit the window operates on.
///
/// `closed_at` is the ordering key; input streams must be non-decreasing
/// in it. `merged`, `merged_by`, `closed_by`, `comments_data` and
/// `commits` are optional because upstream retrieval occasionally drops
/// them; features declare per-event validity against the fields they
/// need rather than assuming presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    #[serde(rename = "kind", alias = "data_type")]
    pub kind: EventKind,
    /// Origin identifier: `owner/repo` of the project the event came from.
    pub project: String,
    pub number: i64,
    pub created_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Actor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_by: Option<Actor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<Actor>,
    #[serde(default)]
    pub comments: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments_data: Option<Vec<Comment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commits: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl Event {
    pub fn is_pull_request(&self) -> bool {
        self.kind == EventKind::PullRequest
    }

    /// The actor who integrated the pull request: the merger when the PR
    /// was merged, the closer otherwise. Every feature that references an
    /// "integrator" resolves it through here.
    pub fn integrator(&self) -> Option<&Actor> {
        if self.merged == Some(true) {
            self.merged_by.as_ref()
        } else {
            self.closed_by.as_ref()
        }
    }

    pub fn submitter_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }

    /// Distinct commenter ids, in first-comment order.
    pub fn commenter_ids(&self) -> Vec<i64> {
        let mut seen = Vec::new();
        if let Some(comments) = &self.comments_data {
            for comment in comments {
                if !seen.contains(&comment.user.id) {
                    seen.push(comment.user.id);
                }
            }
        }
        seen
    }

    /// True when the comment list is consistent with the comment count.
    /// Events claiming comments but lacking the comment payload are the
    /// most common upstream data defect.
    pub fn has_comment_data(&self) -> bool {
        self.comments == 0 || self.comments_data.is_some()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use chrono::TimeZone;

    pub fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 1, day, 12, 0, 0).unwrap()
    }

    pub fn pull_request(id: i64, project: &str, day: u32, submitter: i64, merger: i64) -> Event {
        Event {
            id,
            kind: EventKind::PullRequest,
            project: project.to_string(),
            number: id,
            created_at: ts(day) - chrono::Duration::hours(6),
            closed_at: ts(day),
            merged: Some(true),
            user: Some(Actor::new(submitter)),
            merged_by: Some(Actor::new(merger)),
            closed_by: None,
            comments: 0,
            comments_data: None,
            commits: Some(1),
            title: Some(format!("pr-{id}")),
            body: None,
        }
    }

    pub fn issue(id: i64, project: &str, day: u32, submitter: i64) -> Event {
        Event {
            id,
            kind: EventKind::Issue,
            project: project.to_string(),
            number: id,
            created_at: ts(day) - chrono::Duration::hours(2),
            closed_at: ts(day),
            merged: None,
            user: Some(Actor::new(submitter)),
            merged_by: None,
            closed_by: Some(Actor::new(submitter)),
            comments: 0,
            comments_data: None,
            commits: None,
            title: Some(format!("issue-{id}")),
            body: None,
        }
    }

    pub fn with_comments(mut event: Event, commenters: &[i64]) -> Event {
        event.comments = commenters.len() as u32;
        event.comments_data = Some(
            commenters
                .iter()
                .map(|&id| Comment {
                    user: Actor::new(id),
                    created_at: event.closed_at - chrono::Duration::hours(1),
                })
                .collect(),
        );
        event
    }
}
