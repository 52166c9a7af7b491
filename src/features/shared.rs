//! Shared experience between actor pairs.
//!
//! Each instance keeps a directed pair table keyed (source, target) with
//! per-project counts underneath. Reads always look up the pair
//! (submitter, integrator) of the scored pull request; the scope decides
//! whether the current project's bucket or everything else is summed.
//! Discussion participation pairs commenters with commenters, which puts
//! both orientations in the table, so the directed lookup still yields
//! the shared count.

use std::collections::HashMap;

use crate::features::{Feature, FeatureValue, Role, SlidingWindowFeature};
use crate::model::Event;

/// Which project buckets a read sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairScope {
    /// Only experience gathered in the event's own project.
    IntraProject,
    /// Experience gathered everywhere but the event's own project.
    Ecosystem,
}

pub struct SharedExperience {
    name: String,
    source: Role,
    target: Role,
    scope: PairScope,
    pairs: HashMap<(i64, i64), HashMap<String, i64>>,
}

impl SharedExperience {
    pub fn new(name: &str, source: Role, target: Role, scope: PairScope) -> Self {
        Self {
            name: name.to_string(),
            source,
            target,
            scope,
            pairs: HashMap::new(),
        }
    }

    fn handle(&mut self, event: &Event, sign: i64) {
        let sources = self.source.actor_ids(event);
        let targets = self.target.actor_ids(event);
        for &source in &sources {
            for &target in &targets {
                if source == target {
                    continue;
                }
                let per_project = self.pairs.entry((source, target)).or_default();
                let count = per_project.entry(event.project.clone()).or_insert(0);
                *count += sign;
                if *count == 0 {
                    per_project.remove(&event.project);
                    if per_project.is_empty() {
                        self.pairs.remove(&(source, target));
                    }
                }
            }
        }
    }

    fn uses_comments(&self) -> bool {
        self.source == Role::Commenters || self.target == Role::Commenters
    }
}

impl Feature for SharedExperience {
    fn names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn is_valid(&self, event: &Event) -> bool {
        let readable = event.user.is_some() && event.integrator().is_some();
        if self.uses_comments() {
            readable && event.has_comment_data()
        } else {
            readable
        }
    }

    fn measure(&self, event: &Event) -> Vec<FeatureValue> {
        let (Some(source), Some(target)) = (
            event.submitter_id(),
            event.integrator().map(|a| a.id),
        ) else {
            return vec![FeatureValue::Missing];
        };
        let total = match self.pairs.get(&(source, target)) {
            Some(per_project) => match self.scope {
                PairScope::IntraProject => {
                    per_project.get(&event.project).copied().unwrap_or(0)
                }
                PairScope::Ecosystem => per_project
                    .iter()
                    .filter(|(project, _)| *project != &event.project)
                    .map(|(_, count)| count)
                    .sum(),
            },
            None => 0,
        };
        vec![FeatureValue::Int(total)]
    }
}

impl SlidingWindowFeature for SharedExperience {
    fn add(&mut self, event: &Event) {
        self.handle(event, 1);
    }

    fn remove(&mut self, event: &Event) {
        self.handle(event, -1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::*;

    fn submitted_integrated(scope: PairScope) -> SharedExperience {
        SharedExperience::new("SubmittedIntegrated", Role::Submitter, Role::Integrator, scope)
    }

    #[test]
    fn counts_pair_in_current_project() {
        let mut feature = submitted_integrated(PairScope::IntraProject);
        feature.add(&pull_request(1, "a/app", 1, 10, 20));
        feature.add(&pull_request(2, "b/lib", 2, 10, 20));

        let probe = pull_request(3, "a/app", 3, 10, 20);
        assert_eq!(feature.measure(&probe), vec![FeatureValue::Int(1)]);
    }

    #[test]
    fn ecosystem_scope_excludes_current_project() {
        let mut feature = submitted_integrated(PairScope::Ecosystem);
        feature.add(&pull_request(1, "a/app", 1, 10, 20));
        feature.add(&pull_request(2, "b/lib", 2, 10, 20));
        feature.add(&pull_request(3, "c/tool", 3, 10, 20));

        let probe = pull_request(4, "a/app", 4, 10, 20);
        assert_eq!(feature.measure(&probe), vec![FeatureValue::Int(2)]);
    }

    #[test]
    fn pair_lookup_is_directed() {
        let mut feature = submitted_integrated(PairScope::IntraProject);
        feature.add(&pull_request(1, "a/app", 1, 10, 20));

        // Roles swapped at read time: 20 submitted, 10 integrated.
        let swapped = pull_request(2, "a/app", 2, 20, 10);
        assert_eq!(feature.measure(&swapped), vec![FeatureValue::Int(0)]);
    }

    #[test]
    fn discussion_participation_pairs_both_orientations() {
        let mut feature = SharedExperience::new(
            "Discussion",
            Role::Commenters,
            Role::Commenters,
            PairScope::IntraProject,
        );
        feature.add(&with_comments(issue(1, "a/app", 1, 99), &[10, 20]));

        let probe = pull_request(2, "a/app", 2, 10, 20);
        assert_eq!(feature.measure(&probe), vec![FeatureValue::Int(1)]);
        let reversed = pull_request(3, "a/app", 3, 20, 10);
        assert_eq!(feature.measure(&reversed), vec![FeatureValue::Int(1)]);
    }

    #[test]
    fn add_remove_round_trip_empties_table() {
        let mut feature = submitted_integrated(PairScope::Ecosystem);
        let event = with_comments(pull_request(1, "b/lib", 1, 10, 20), &[30]);
        feature.add(&event);
        feature.remove(&event);
        assert!(feature.pairs.is_empty());
    }

    #[test]
    fn self_pairs_are_skipped() {
        let mut feature = submitted_integrated(PairScope::IntraProject);
        // Submitter merged their own pull request.
        feature.add(&pull_request(1, "a/app", 1, 10, 10));
        assert!(feature.pairs.is_empty());
    }
}
