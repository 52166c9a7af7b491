//! The sliding time window over the chronological event stream.
//!
//! For every incoming event the manager first evicts everything older
//! than the window, then (for pull requests) lets the caller score the
//! event against the current feature state, and only afterwards feeds
//! the event to the features and stores it. A feature therefore never
//! sees the entry it is scoring.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::features::{FeatureSet, FeatureValue, InvalidEntryCounter};
use crate::model::Event;

pub struct WindowManager {
    /// `None` disables pruning; the window then spans the whole stream.
    window_size: Option<Duration>,
    window: BTreeMap<DateTime<Utc>, Vec<Event>>,
}

impl WindowManager {
    pub fn new(window_size: Option<Duration>) -> Self {
        Self {
            window_size,
            window: BTreeMap::new(),
        }
    }

    /// Feeds an event into the feature state without pruning or
    /// scoring. Used to replay the chunk preceding the one a worker
    /// owns, so its window starts fully populated. Replayed events are
    /// not tallied; the worker owning their chunk already counts them.
    pub fn warm_start(&mut self, set: &mut FeatureSet, event: Event) {
        self.feed(set, &event, None);
        self.store(event);
    }

    /// Processes one event of the worker's own chunk. Returns the
    /// measured output row for pull requests and `None` for issues.
    /// Every event counts toward `events_seen`, and every feature that
    /// rejects the event is tallied exactly once.
    pub fn process(
        &mut self,
        set: &mut FeatureSet,
        event: Event,
        invalid: &mut InvalidEntryCounter,
    ) -> Option<Vec<FeatureValue>> {
        self.prune(set, event.closed_at);
        invalid.events_seen += 1;
        let row = if event.is_pull_request() {
            Some(set.measure_output(&event, invalid))
        } else {
            None
        };
        self.feed(set, &event, Some(invalid));
        self.store(event);
        row
    }

    /// Evicts events whose age relative to `now` exceeds the window
    /// size. An event exactly one window old is retained.
    fn prune(&mut self, set: &mut FeatureSet, now: DateTime<Utc>) {
        let Some(window_size) = self.window_size else {
            return;
        };
        let cutoff = now - window_size;
        let retained = self.window.split_off(&cutoff);
        let pruned = std::mem::replace(&mut self.window, retained);
        for events in pruned.values() {
            for event in events {
                let features = if event.is_pull_request() {
                    &mut set.pr_sw
                } else {
                    &mut set.issue_sw
                };
                for feature in features.iter_mut() {
                    if feature.is_valid(event) {
                        feature.remove(event);
                    }
                }
            }
        }
    }

    /// Feeds the event to the features of its kind. A rejected feature
    /// is tallied here unless the event was just scored and the feature
    /// contributed output cells, in which case the measure pass already
    /// recorded the skip.
    fn feed(
        &self,
        set: &mut FeatureSet,
        event: &Event,
        mut invalid: Option<&mut InvalidEntryCounter>,
    ) {
        let scored = event.is_pull_request();
        let features = if scored {
            &mut set.pr_sw
        } else {
            &mut set.issue_sw
        };
        for feature in features.iter_mut() {
            if feature.is_valid(event) {
                feature.add(event);
            } else if !(scored && feature.is_output()) {
                if let Some(counter) = invalid.as_deref_mut() {
                    for name in feature.names() {
                        counter.record(&name);
                    }
                }
            }
        }
    }

    fn store(&mut self, event: Event) {
        self.window.entry(event.closed_at).or_default().push(event);
    }

    pub fn len(&self) -> usize {
        self.window.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
