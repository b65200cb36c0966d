//! # Distribution
//!
//! Player-facing operations over one network:
//!
//! - **Distribute** - gather linked containers into the master, run the pipeline and move
//!   every routed line out of the master
//! - **Predict** - the same pipeline over a read-only pool, for "where would my items go"
//! - **Whoosh** - move whoosh-matched items from the player into the master
//! - **Route item** - family dispatch for a single item against the network's bindings
//!
//! Missing containers are skipped with a warning; the operations always return a report.

pub mod pipeline;

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::Serialize;

use crate::errors::StashError;
use crate::filter::{FilterRegistry, RouteTarget, TraitEvaluator};
use crate::host::{FormId, Host, ItemForm, ItemKind, GOLD_FORM, LOCKPICK_FORM};
use crate::network::{Network, NetworkManager};
pub use pipeline::{run_pipeline, PipelineResult, PoolEntry, Route};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DistributeReport {
    pub gathered: i64,
    pub moved: i64,
    /// `(container name, units)` per destination, in first-routed order.
    pub per_container: Vec<(String, i64)>,
    pub skipped_targets: usize,
}

/// Dry-run result keyed by stage index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Prediction {
    pub filter_ids: Vec<String>,
    pub filter_counts: Vec<i64>,
    pub contested_counts: Vec<i64>,
    pub contested_by: Vec<BTreeMap<usize, i64>>,
    pub catch_all_count: i64,
    pub origin_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WhooshReport {
    pub moved: i64,
    pub lines: usize,
}

/// Borrowing facade bundling what the operations need.
pub struct Distributor<'a> {
    pub filters: &'a FilterRegistry,
    pub evaluator: &'a TraitEvaluator,
    pub manager: &'a NetworkManager,
    pub host: &'a dyn Host,
}

impl<'a> Distributor<'a> {
    pub fn new(
        filters: &'a FilterRegistry,
        evaluator: &'a TraitEvaluator,
        manager: &'a NetworkManager,
        host: &'a dyn Host,
    ) -> Self {
        Self {
            filters,
            evaluator,
            manager,
            host,
        }
    }

    fn network(&self, name: &str) -> Result<Network, StashError> {
        self.manager
            .find(name)
            .ok_or_else(|| StashError::NetworkNotFound(name.to_string()))
    }

    fn matches(&self, filter_id: &str, item: &ItemForm) -> bool {
        self.filters
            .matches(filter_id, item, self.evaluator, self.host)
    }

    /// Playable, non-phantom lines of `container`, with their forms.
    fn transferable(&self, container: FormId) -> Vec<PoolEntry> {
        self.host
            .inventory(container)
            .into_iter()
            .filter(|entry| entry.count > 0)
            .filter_map(|entry| {
                let item = self.host.item(entry.item)?;
                (!self.host.is_phantom(&item)).then_some(PoolEntry {
                    item,
                    count: entry.count,
                })
            })
            .collect()
    }

    /// Aggregate lines by item across containers, keeping first-seen order.
    fn pool_of(&self, containers: &[FormId]) -> Vec<PoolEntry> {
        let mut pool: Vec<PoolEntry> = Vec::new();
        for &container in containers {
            for entry in self.transferable(container) {
                match pool.iter_mut().find(|p| p.item.id == entry.item.id) {
                    Some(existing) => existing.count += entry.count,
                    None => pool.push(entry),
                }
            }
        }
        pool
    }

    fn gather_to_master(&self, network: &Network) -> i64 {
        let mut total = 0i64;
        for source in network.linked_containers() {
            if !self.host.form_exists(source) {
                warn!(
                    "network '{}': source {:#010X} missing, skipped",
                    network.name, source
                );
                continue;
            }
            let mut moved = 0i64;
            for entry in self.transferable(source) {
                moved += self
                    .host
                    .move_item(source, entry.item.id, entry.count, network.master)
                    as i64;
            }
            if moved > 0 {
                debug!("gathered {} units from {:#010X}", moved, source);
            }
            total += moved;
        }
        total
    }

    /// Gather, route and move every item of the named network.
    pub fn distribute(&self, name: &str) -> Result<DistributeReport, StashError> {
        let network = self.network(name)?;
        let master = network.master;
        if !self.host.form_exists(master) {
            warn!("network '{}': master {:#010X} missing", name, master);
            return Ok(DistributeReport::default());
        }

        let mut report = DistributeReport {
            gathered: self.gather_to_master(&network),
            ..Default::default()
        };
        let pool = self.pool_of(&[master]);
        let result = run_pipeline(
            &network.stages,
            network.catch_all,
            master,
            &pool,
            true,
            |id, item| self.matches(id, item),
        );

        let mut per_target: Vec<(FormId, i64)> = Vec::new();
        for route in &result.routes {
            if route.target == master {
                continue;
            }
            if !self.host.form_exists(route.target) {
                warn!(
                    "network '{}': target {:#010X} missing, {} units stay in master",
                    name, route.target, route.count
                );
                report.skipped_targets += 1;
                continue;
            }
            let moved = self.host.move_item(master, route.item, route.count, route.target) as i64;
            report.moved += moved;
            match per_target.iter_mut().find(|(t, _)| *t == route.target) {
                Some((_, n)) => *n += moved,
                None => per_target.push((route.target, moved)),
            }
        }
        report.per_container = per_target
            .into_iter()
            .map(|(target, n)| {
                let label = self
                    .manager
                    .name_of(target)
                    .or_else(|| self.host.container_name(target))
                    .unwrap_or_else(|| format!("{target:#010X}"));
                (label, n)
            })
            .collect();
        info!(
            "distributed '{}': {} units moved to {} containers",
            name,
            report.moved,
            report.per_container.len()
        );
        Ok(report)
    }

    /// Dry run over the master and every linked container; nothing moves.
    pub fn predict(&self, name: &str) -> Result<Prediction, StashError> {
        let network = self.network(name)?;
        let mut containers = vec![network.master];
        containers.extend(network.linked_containers());
        let pool = self.pool_of(&containers);
        let result = run_pipeline(
            &network.stages,
            network.catch_all,
            network.master,
            &pool,
            false,
            |id, item| self.matches(id, item),
        );
        Ok(Prediction {
            filter_ids: network.stages.iter().map(|s| s.filter_id.clone()).collect(),
            filter_counts: result.claimed,
            contested_counts: result.contested,
            contested_by: result.contested_by,
            catch_all_count: result.catch_all_count,
            origin_count: result.origin_count,
        })
    }

    /// Move every whoosh-matched item from the player into the master.
    pub fn whoosh(&self, name: &str) -> Result<WhooshReport, StashError> {
        let network = self.network(name)?;
        if !network.whoosh_configured {
            return Err(StashError::WhooshNotConfigured(name.to_string()));
        }
        let player = self.host.player_ref();
        let mut report = WhooshReport::default();
        for entry in self.host.inventory(player) {
            if entry.count <= 0 || entry.quest_item || entry.equipped || entry.favorited {
                continue;
            }
            if entry.item == GOLD_FORM || entry.item == LOCKPICK_FORM {
                continue;
            }
            let Some(item) = self.host.item(entry.item) else {
                continue;
            };
            if item.kind == ItemKind::Light || self.host.is_phantom(&item) {
                continue;
            }
            if !network
                .whoosh_filters
                .iter()
                .any(|id| self.matches(id, &item))
            {
                continue;
            }
            let moved = self.host.move_item(player, item.id, entry.count, network.master);
            if moved > 0 {
                report.moved += moved as i64;
                report.lines += 1;
            }
        }
        info!("whoosh '{}': {} units", name, report.moved);
        Ok(report)
    }

    /// Where the family rooted at `filter_id` would send `item` in this network.
    pub fn route_item(
        &self,
        name: &str,
        filter_id: &str,
        item: FormId,
    ) -> Result<RouteTarget, StashError> {
        let network = self.network(name)?;
        let Some(form) = self.host.item(item) else {
            return Ok(RouteTarget::None);
        };
        Ok(self.filters.route(
            filter_id,
            &form,
            self.evaluator,
            self.host,
            |id| network.binding(id),
        ))
    }

    /// First stage-family target for `item` across the whole network, in stage order.
    pub fn explain(&self, name: &str, item: FormId) -> Result<Option<(String, FormId)>, StashError> {
        let network = self.network(name)?;
        for stage in &network.stages {
            if let RouteTarget::Container(target) = self.route_item(name, &stage.filter_id, item)? {
                return Ok(Some((stage.filter_id.clone(), target)));
            }
        }
        Ok(None)
    }
}
