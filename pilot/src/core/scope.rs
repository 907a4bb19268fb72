//! Deterministic dependency and anchor derivation from scope annotations.

use tracing::{debug, warn};

use crate::core::goal::{Anchor, Dependencies, Goal, Scope};

/// Where a scope reference points, relative to the referencing goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReferenceTarget {
    Earlier(usize),
    Later(usize),
    OwnGoal,
    Unknown,
}

/// Derive dependency edges from `inside:` and `after:` scopes.
///
/// A reference resolves against an earlier goal's `goal_id` or declared
/// object. Unknown references create no edge, and neither do references to
/// later goals: edges only ever point backwards in declaration order.
pub fn derive_dependencies(goals: &[Goal]) -> Dependencies {
    let mut dependencies = Dependencies::new();
    for (index, goal) in goals.iter().enumerate() {
        let Some(reference) = goal.scope.reference() else {
            continue;
        };
        match locate_reference(goals, index, reference) {
            ReferenceTarget::Earlier(parent) => {
                dependencies.entry(index).or_default().insert(parent);
            }
            ReferenceTarget::Later(target) => {
                warn!(
                    goal = %goal.goal_id,
                    reference,
                    target,
                    "ignoring forward scope reference"
                );
            }
            ReferenceTarget::OwnGoal => {
                debug!(goal = %goal.goal_id, reference, "ignoring self scope reference");
            }
            ReferenceTarget::Unknown => {
                debug!(goal = %goal.goal_id, reference, "scope reference matches no goal");
            }
        }
    }
    dependencies
}

/// Explicit base anchor carried by a goal's own scope.
///
/// Only `drive:` scopes yield an anchor, so anchors never leak from one goal
/// into an unrelated sibling.
pub fn derive_anchor(scope: &Scope) -> Option<Anchor> {
    match scope {
        Scope::Drive(letter) => Some(Anchor::Drive(*letter)),
        Scope::Root | Scope::Inside(_) | Scope::After(_) => None,
    }
}

fn locate_reference(goals: &[Goal], index: usize, reference: &str) -> ReferenceTarget {
    // Nearest earlier goal wins when several share a target name.
    if let Some(parent) = (0..index).rev().find(|&i| matches(&goals[i], reference)) {
        return ReferenceTarget::Earlier(parent);
    }
    if matches(&goals[index], reference) {
        return ReferenceTarget::OwnGoal;
    }
    match (index + 1..goals.len()).find(|&i| matches(&goals[i], reference)) {
        Some(later) => ReferenceTarget::Later(later),
        None => ReferenceTarget::Unknown,
    }
}

fn matches(goal: &Goal, reference: &str) -> bool {
    let reference = reference.trim();
    goal.goal_id == reference
        || goal
            .object
            .as_deref()
            .is_some_and(|object| object.trim().eq_ignore_ascii_case(reference))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Domain, Verb};
    use std::collections::BTreeSet;

    fn folder(id: &str, name: &str, scope: Scope) -> Goal {
        Goal::new(id, Domain::Files, Verb::Create)
            .with_object(name)
            .with_scope(scope)
    }

    #[test]
    fn inside_reference_links_to_earlier_goal_by_object() {
        let goals = vec![
            folder("g1", "Reports", Scope::Root),
            folder("g2", "2024", Scope::Inside("reports".to_string())),
        ];
        let deps = derive_dependencies(&goals);
        assert_eq!(deps.get(&1), Some(&BTreeSet::from([0])));
    }

    #[test]
    fn after_reference_links_by_goal_id() {
        let goals = vec![
            Goal::new("g1", Domain::Apps, Verb::Launch).with_object("firefox"),
            Goal::new("g2", Domain::Screen, Verb::Capture).with_scope(Scope::After("g1".into())),
        ];
        let deps = derive_dependencies(&goals);
        assert_eq!(deps.get(&1), Some(&BTreeSet::from([0])));
    }

    #[test]
    fn forward_reference_creates_no_edge() {
        let goals = vec![
            folder("g1", "Inner", Scope::Inside("Outer".to_string())),
            folder("g2", "Outer", Scope::Root),
        ];
        assert!(derive_dependencies(&goals).is_empty());
    }

    #[test]
    fn unknown_and_self_references_create_no_edge() {
        let goals = vec![
            folder("g1", "A", Scope::Inside("Nowhere".to_string())),
            folder("g2", "B", Scope::Inside("B".to_string())),
        ];
        assert!(derive_dependencies(&goals).is_empty());
    }

    #[test]
    fn drive_anchor_does_not_leak_to_root_sibling() {
        let goals = vec![
            folder("x", "X", Scope::Drive('D')),
            folder("y", "Y", Scope::Inside("x".to_string())),
            folder("z", "Z", Scope::Root),
        ];
        let anchors: Vec<Option<Anchor>> = goals.iter().map(|g| derive_anchor(&g.scope)).collect();
        assert_eq!(anchors, vec![Some(Anchor::Drive('D')), None, None]);

        let deps = derive_dependencies(&goals);
        assert_eq!(deps.get(&1), Some(&BTreeSet::from([0])));
        assert!(!deps.contains_key(&2));
    }
}
