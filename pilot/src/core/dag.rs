//! Deterministic graph helpers over goal dependency edges.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::goal::Dependencies;

/// Topologically order `count` goals with Kahn's algorithm.
///
/// Ready goals are taken lowest index first, so independent goals keep their
/// declaration order. Returns `None` if the edges contain a cycle. Parent
/// indices outside `0..count` are ignored.
pub fn topological_order(count: usize, dependencies: &Dependencies) -> Option<Vec<usize>> {
    let mut in_degree = vec![0usize; count];
    let mut children: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (&child, parents) in dependencies {
        if child >= count {
            continue;
        }
        for &parent in parents {
            if parent >= count {
                continue;
            }
            in_degree[child] += 1;
            children.entry(parent).or_default().push(child);
        }
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &child in children.get(&next).into_iter().flatten() {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    (order.len() == count).then_some(order)
}

/// Every goal reachable by following parent edges from `index`.
pub fn ancestors(dependencies: &Dependencies, index: usize) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<usize> = dependencies
        .get(&index)
        .into_iter()
        .flatten()
        .copied()
        .collect();
    while let Some(parent) = stack.pop() {
        if parent == index || !seen.insert(parent) {
            continue;
        }
        stack.extend(dependencies.get(&parent).into_iter().flatten().copied());
    }
    seen
}

/// Every goal that transitively depends on `index`.
pub fn descendants(dependencies: &Dependencies, index: usize) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut frontier = vec![index];
    while let Some(current) = frontier.pop() {
        for (&child, parents) in dependencies {
            if child != index && parents.contains(&current) && seen.insert(child) {
                frontier.push(child);
            }
        }
    }
    seen
}

/// True if `order` visits every node of `edges` after all of its predecessors.
pub fn is_topological(order: &[String], edges: &BTreeMap<String, Vec<String>>) -> bool {
    let position: BTreeMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    if position.len() != order.len() {
        return false;
    }
    edges.iter().all(|(source, targets)| {
        targets
            .iter()
            .all(|target| match (position.get(source.as_str()), position.get(target.as_str())) {
                (Some(from), Some(to)) => from < to,
                _ => false,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(pairs: &[(usize, usize)]) -> Dependencies {
        let mut deps = Dependencies::new();
        for &(child, parent) in pairs {
            deps.entry(child).or_default().insert(parent);
        }
        deps
    }

    #[test]
    fn order_respects_edges_and_declaration_order() {
        // 2 depends on 0, 1 independent.
        let order = topological_order(3, &deps(&[(2, 0)])).expect("acyclic");
        assert_eq!(order, vec![0, 1, 2]);

        // 0 depends on 2.
        let order = topological_order(3, &deps(&[(0, 2)])).expect("acyclic");
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn cycle_yields_none() {
        assert_eq!(topological_order(2, &deps(&[(0, 1), (1, 0)])), None);
    }

    #[test]
    fn ancestors_follow_chains() {
        let chain = deps(&[(1, 0), (2, 1), (3, 2)]);
        assert_eq!(ancestors(&chain, 3), BTreeSet::from([0, 1, 2]));
        assert!(ancestors(&chain, 0).is_empty());
    }

    #[test]
    fn descendants_follow_chains_but_not_siblings() {
        let graph = deps(&[(1, 0), (2, 1)]);
        assert_eq!(descendants(&graph, 0), BTreeSet::from([1, 2]));
        assert_eq!(descendants(&graph, 1), BTreeSet::from([2]));
        assert!(descendants(&graph, 3).is_empty());
    }

    #[test]
    fn is_topological_rejects_reversed_edges() {
        let mut edges = BTreeMap::new();
        edges.insert("a".to_string(), vec!["b".to_string()]);
        let good = vec!["a".to_string(), "b".to_string()];
        let bad = vec!["b".to_string(), "a".to_string()];
        assert!(is_topological(&good, &edges));
        assert!(!is_topological(&bad, &edges));
    }
}
