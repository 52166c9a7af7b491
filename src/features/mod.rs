//! Feature abstraction for predictor computation.
//!
//! A [`Feature`] computes output values for one event from whatever state
//! it carries; a [`SlidingWindowFeature`] additionally observes events
//! entering and leaving the time window so its state always reflects
//! exactly the in-window multiset. Removing an event must be the exact
//! inverse of adding it.

pub mod centrality;
pub mod control;
pub mod ecosystem;
pub mod factory;
pub mod graph;
pub mod intra_project;
pub mod shared;

use std::collections::HashMap;
use std::fmt;

use crate::model::Event;

pub use factory::{FactoryError, FeatureFactory, FeatureSet};

/// A single output cell. Formatted into CSV as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Emitted for output-eligible events a feature declared invalid;
    /// renders as an empty cell so downstream tooling sees a missing
    /// value instead of a fabricated zero.
    Missing,
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Bool(v) => write!(f, "{v}"),
            FeatureValue::Int(v) => write!(f, "{v}"),
            FeatureValue::Float(v) => write!(f, "{v}"),
            FeatureValue::Missing => Ok(()),
        }
    }
}

/// A per-entry predictor.
pub trait Feature {
    /// Stable output column name(s). Multi-valued features yield one name
    /// per dimension, in the same order `measure` yields values.
    fn names(&self) -> Vec<String>;

    /// Whether the event carries every field this feature needs. Checked
    /// before any state mutation or value read; invalid events are
    /// skipped for this feature only and counted.
    fn is_valid(&self, event: &Event) -> bool;

    /// Current value(s) for the event. Must not mutate observable state
    /// and must never include the event itself (it is measured before
    /// being added to the window).
    fn measure(&self, event: &Event) -> Vec<FeatureValue>;

    /// False for features that only maintain state (e.g. graph edge
    /// builders) and contribute no output columns.
    fn is_output(&self) -> bool {
        true
    }
}

/// A stateful aggregate over the in-window events.
pub trait SlidingWindowFeature: Feature {
    fn add(&mut self, event: &Event);

    /// Exact inverse of [`SlidingWindowFeature::add`] for the same event.
    fn remove(&mut self, event: &Event);
}

/// Merged/unmerged tallies used by every success-rate aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcomes {
    pub merged: i64,
    pub unmerged: i64,
}

impl MergeOutcomes {
    pub fn record(&mut self, merged: bool, sign: i64) {
        if merged {
            self.merged += sign;
        } else {
            self.unmerged += sign;
        }
    }

    pub fn total(&self) -> i64 {
        self.merged + self.unmerged
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.merged as f64 / total as f64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.merged == 0 && self.unmerged == 0
    }
}

/// Actor role an edge or pair endpoint is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Submitter,
    Integrator,
    Commenters,
}

impl Role {
    /// Actor ids the role resolves to for this event. Commenters resolve
    /// to the distinct commenter set (empty when the event has none).
    pub fn actor_ids(&self, event: &Event) -> Vec<i64> {
        match self {
            Role::Submitter => event.submitter_id().into_iter().collect(),
            Role::Integrator => event.integrator().map(|a| a.id).into_iter().collect(),
            Role::Commenters => event.commenter_ids(),
        }
    }

    /// Whether the event carries the fields needed to resolve this role.
    pub fn is_resolvable(&self, event: &Event) -> bool {
        match self {
            Role::Submitter => event.user.is_some(),
            Role::Integrator => event.integrator().is_some(),
            Role::Commenters => event.has_comment_data(),
        }
    }
}

/// Per-feature invalid-entry tallies, reported at end of run so users can
/// spot schema mismatches (a feature rejecting nearly everything points
/// at an upstream data problem).
#[derive(Debug, Clone, Default)]
pub struct InvalidEntryCounter {
    counts: HashMap<String, u64>,
    pub events_seen: u64,
}

impl InvalidEntryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, feature_name: &str) {
        *self.counts.entry(feature_name.to_string()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &InvalidEntryCounter) {
        for (name, count) in &other.counts {
            *self.counts.entry(name.clone()).or_insert(0) += count;
        }
        self.events_seen += other.events_seen;
    }

    /// (feature name, invalid count) sorted by name for stable reporting.
    pub fn report(&self) -> Vec<(String, u64)> {
        let mut rows: Vec<_> = self
            .counts
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .collect();
        rows.sort();
        rows
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
