//! Claim-based routing of a pool through ordered filter stages.
//!
//! For each pool entry the stages are scanned in order. Inert stages (container `0`) are
//! skipped outright. The first remaining stage whose filter matches claims the entry; every
//! later non-inert stage that also matches is recorded as contested by the claimer.
//! Unclaimed entries go to the catch-all when it is set and differs from the master,
//! otherwise they stay at their origin.
//!
//! The run is a pure function of its inputs, so repeated runs over the same
//! `(stages, pool)` produce identical results.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::host::{FormId, ItemForm, NO_REF};
use crate::network::FilterStage;

/// One aggregated item line of the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub item: ItemForm,
    pub count: i32,
}

/// Instruction to move `count` units of `item` from the master to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub item: FormId,
    pub count: i32,
    pub target: FormId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineResult {
    /// Units claimed per stage index.
    pub claimed: Vec<i64>,
    /// Units each stage matched but lost to an earlier stage.
    pub contested: Vec<i64>,
    /// Per stage: claimer stage index to units lost to it.
    pub contested_by: Vec<BTreeMap<usize, i64>>,
    pub catch_all_count: i64,
    pub origin_count: i64,
    pub routes: Vec<Route>,
}

impl PipelineResult {
    pub fn total_claimed(&self) -> i64 {
        self.claimed.iter().sum()
    }

    pub fn total_contested(&self) -> i64 {
        self.contested.iter().sum()
    }
}

/// Run the pool through `stages`. `matches(filter_id, item)` decides stage membership.
pub fn run_pipeline(
    stages: &[FilterStage],
    catch_all: FormId,
    master: FormId,
    pool: &[PoolEntry],
    resolve_refs: bool,
    matches: impl Fn(&str, &ItemForm) -> bool,
) -> PipelineResult {
    let mut result = PipelineResult {
        claimed: vec![0; stages.len()],
        contested: vec![0; stages.len()],
        contested_by: vec![BTreeMap::new(); stages.len()],
        ..Default::default()
    };

    for entry in pool.iter().filter(|e| e.count > 0) {
        let count = entry.count as i64;
        let mut claimer: Option<usize> = None;
        for (index, stage) in stages.iter().enumerate() {
            if stage.is_inert() || !matches(&stage.filter_id, &entry.item) {
                continue;
            }
            match claimer {
                None => {
                    claimer = Some(index);
                    result.claimed[index] += count;
                    if resolve_refs {
                        result.routes.push(Route {
                            item: entry.item.id,
                            count: entry.count,
                            target: stage.container,
                        });
                    }
                }
                Some(first) => {
                    result.contested[index] += count;
                    *result.contested_by[index].entry(first).or_insert(0) += count;
                }
            }
        }
        if claimer.is_some() {
            continue;
        }
        if catch_all != NO_REF && catch_all != master {
            result.catch_all_count += count;
            if resolve_refs {
                result.routes.push(Route {
                    item: entry.item.id,
                    count: entry.count,
                    target: catch_all,
                });
            }
        } else {
            result.origin_count += count;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: FormId, count: i32) -> PoolEntry {
        PoolEntry {
            item: ItemForm {
                id,
                name: format!("{id}"),
                playable: true,
                ..Default::default()
            },
            count,
        }
    }

    #[test]
    fn routes_only_when_resolving() {
        let stages = vec![FilterStage::new("all", 0x20)];
        let pool = vec![entry(1, 2)];
        let dry = run_pipeline(&stages, 0x10, 0x10, &pool, false, |_, _| true);
        assert!(dry.routes.is_empty());
        assert_eq!(dry.claimed, vec![2]);
        let live = run_pipeline(&stages, 0x10, 0x10, &pool, true, |_, _| true);
        assert_eq!(
            live.routes,
            vec![Route {
                item: 1,
                count: 2,
                target: 0x20
            }]
        );
    }

    #[test]
    fn zero_counts_are_ignored() {
        let stages = vec![FilterStage::new("all", 0x20)];
        let result = run_pipeline(&stages, 0, 0x10, &[entry(1, 0)], true, |_, _| true);
        assert_eq!(result.total_claimed(), 0);
        assert_eq!(result.origin_count, 0);
    }
}
