//! Dependency ordering of keyed resources.
//!
//! Resources without used keys go first, in discovery order. After that the
//! pending list is scanned in discovery order, placing every resource whose
//! known dependencies are all placed; a placement is visible to later
//! resources of the same pass. Keys that are not part of the set (external or
//! theme resources) never block, and neither does a self-reference.
//!
//! A pass that places nothing means a cycle. Each pass places at least one
//! resource, so the loop is bounded by the number of resources.

use crate::config::CyclePolicy;
use crate::diagnostics::{Diagnostic, Logger};
use crate::error::{CombineError, Result};
use crate::models::ResourceElement;
use rustc_hash::FxHashMap;

#[derive(Debug)]
pub struct Sequenced {
    pub resources: Vec<ResourceElement>,
    /// Keys of every cycle that had to be broken, in discovery order
    pub broken_cycles: Vec<Vec<String>>,
}

pub fn sequence(
    resources: Vec<ResourceElement>,
    policy: CyclePolicy,
    logger: &dyn Logger,
) -> Result<Sequenced> {
    let positions: FxHashMap<&str, usize> = resources
        .iter()
        .enumerate()
        .map(|(i, r)| (r.key.as_str(), i))
        .collect();

    // Known dependencies per resource, as indices.
    let dependencies: Vec<Vec<usize>> = resources
        .iter()
        .enumerate()
        .map(|(i, r)| {
            r.used_keys
                .iter()
                .filter_map(|k| positions.get(k.as_str()).copied())
                .filter(|&d| d != i)
                .collect()
        })
        .collect();

    let mut placed = vec![false; resources.len()];
    let mut order: Vec<usize> = Vec::with_capacity(resources.len());
    let mut pending: Vec<usize> = Vec::new();

    for (i, resource) in resources.iter().enumerate() {
        if resource.used_keys.is_empty() {
            placed[i] = true;
            order.push(i);
        } else {
            pending.push(i);
        }
    }

    let mut broken_cycles = Vec::new();

    while !pending.is_empty() {
        let before = pending.len();
        pending.retain(|&i| {
            if dependencies[i].iter().all(|&d| placed[d]) {
                placed[i] = true;
                order.push(i);
                false
            } else {
                true
            }
        });

        if pending.len() < before {
            continue;
        }

        let cycle = find_cycle(&pending, &dependencies, &placed);
        let keys: Vec<String> = cycle.iter().map(|&i| resources[i].key.clone()).collect();

        if policy == CyclePolicy::Strict {
            return Err(CombineError::ReferenceCycle { keys });
        }

        // cycle is sorted, so the first member is the earliest discovered
        let chosen = cycle[0];
        logger.log(&Diagnostic::ReferenceCycle {
            keys: keys.clone(),
            placed: resources[chosen].key.clone(),
        });
        placed[chosen] = true;
        order.push(chosen);
        pending.retain(|&i| i != chosen);
        broken_cycles.push(keys);
    }

    let mut slots: Vec<Option<ResourceElement>> = resources.into_iter().map(Some).collect();
    let resources: Vec<ResourceElement> = order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect();

    for resource in &resources {
        logger.log(&Diagnostic::ResourcePlaced {
            key: resource.key.clone(),
        });
    }

    Ok(Sequenced {
        resources,
        broken_cycles,
    })
}

/// Walks unplaced dependencies from the earliest pending resource until a
/// resource repeats. Every pending resource has an unplaced dependency when a
/// pass stalls, so the walk always closes a cycle. Returned indices are sorted.
fn find_cycle(pending: &[usize], dependencies: &[Vec<usize>], placed: &[bool]) -> Vec<usize> {
    let mut path: Vec<usize> = Vec::new();
    let mut current = pending[0];
    loop {
        if let Some(start) = path.iter().position(|&i| i == current) {
            let mut cycle = path[start..].to_vec();
            cycle.sort_unstable();
            return cycle;
        }
        path.push(current);
        match dependencies[current].iter().find(|&&d| !placed[d]) {
            Some(&next) => current = next,
            // unreachable while stalled
            None => return vec![current],
        }
    }
}
