//! Post-load validation.
//!
//! Runs once after state is restored, before any user action:
//!
//! 1. stale filter ids are renamed through [`FILTER_MIGRATIONS`], then duplicate stages dropped
//! 2. stages and catch-alls pointing at vanished containers are cleared, and references the
//!    last load could not resolve are counted as pruned
//! 3. networks whose master vanished are removed
//! 4. vanished tags, sell container and vendors are removed
//! 5. an overdue sell timer is pushed to now with jitter
//!
//! Validation is idempotent: a second pass over its own output changes nothing.

use std::collections::HashSet;

use log::{info, warn};
use rand::Rng;
use serde::Serialize;

use super::manager::NetworkManager;
use crate::host::{Host, NO_REF};

/// Renamed filter ids, old to new. Many-to-one is allowed.
pub const FILTER_MIGRATIONS: &[(&str, &str)] = &[
    ("hearthfire_materials", "building_materials"),
    ("dark_brotherhood", "guild_equipment"),
    ("nightingale", "guild_equipment"),
];

/// Half-width of the sell timer jitter, in game hours.
pub const SELL_JITTER_HOURS: f64 = 6.0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub pruned_networks: usize,
    pub pruned_tags: usize,
    /// Stage and catch-all references cleared plus duplicate stages removed.
    pub pruned_filters: usize,
    pub pruned_sell: usize,
    pub migrated_filters: usize,
    pub pruned_vendors: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        *self == ValidationReport::default()
    }
}

/// New id for a stale filter id, if it was renamed.
pub fn migrate_filter_id(id: &str) -> Option<&'static str> {
    FILTER_MIGRATIONS
        .iter()
        .find(|(old, _)| *old == id)
        .map(|(_, new)| *new)
}

impl NetworkManager {
    /// Prune state that no longer resolves against the live world.
    pub fn validate(&self, host: &dyn Host, sell_interval_hours: f64) -> ValidationReport {
        let mut report = ValidationReport::default();
        let now = host.game_hours();
        let mut state = self.lock();
        let lost = std::mem::take(&mut state.lost);
        if lost.filters > 0 {
            warn!("{} filter destinations did not resolve on load", lost.filters);
        }
        report.pruned_filters += lost.filters;

        for network in &mut state.networks {
            for stage in &mut network.stages {
                if let Some(new_id) = migrate_filter_id(&stage.filter_id) {
                    info!(
                        "network '{}': filter '{}' migrated to '{}'",
                        network.name, stage.filter_id, new_id
                    );
                    stage.filter_id = new_id.to_string();
                    report.migrated_filters += 1;
                }
            }
            let mut seen = HashSet::new();
            let before = network.stages.len();
            network.stages.retain(|s| seen.insert(s.filter_id.clone()));
            report.pruned_filters += before - network.stages.len();

            let whoosh = std::mem::take(&mut network.whoosh_filters);
            network.whoosh_filters = whoosh
                .into_iter()
                .map(|id| migrate_filter_id(&id).map(str::to_string).unwrap_or(id))
                .collect();

            for stage in &mut network.stages {
                if stage.container != NO_REF && !host.form_exists(stage.container) {
                    warn!(
                        "network '{}': stage '{}' container {:#010X} is gone",
                        network.name, stage.filter_id, stage.container
                    );
                    stage.container = NO_REF;
                    report.pruned_filters += 1;
                }
            }
            if network.catch_all != NO_REF && !host.form_exists(network.catch_all) {
                warn!(
                    "network '{}': catch-all {:#010X} is gone",
                    network.name, network.catch_all
                );
                network.catch_all = NO_REF;
                report.pruned_filters += 1;
            }
        }

        let before = state.networks.len();
        state.networks.retain(|n| {
            let alive = n.master != NO_REF && host.form_exists(n.master);
            if !alive {
                warn!("network '{}' removed: master {:#010X} is gone", n.name, n.master);
            }
            alive
        });
        report.pruned_networks = before - state.networks.len();

        let before = state.tags.len();
        state.tags.retain(|id, _| host.form_exists(*id));
        report.pruned_tags = before - state.tags.len() + lost.tags;

        if lost.sell {
            warn!("sell container did not resolve on load");
            state.sell.timer_started = false;
            report.pruned_sell = 1;
        }
        if state.sell.container != NO_REF && !host.form_exists(state.sell.container) {
            warn!("sell container {:#010X} is gone", state.sell.container);
            state.sell.container = NO_REF;
            state.sell.timer_started = false;
            report.pruned_sell = 1;
        }
        if state.sell.timer_started && now - state.sell.last_sell_time >= sell_interval_hours {
            let jitter = rand::thread_rng().gen_range(-SELL_JITTER_HOURS..=SELL_JITTER_HOURS);
            state.sell.last_sell_time = now + jitter;
            info!("overdue sell timer rescheduled ({:+.1}h jitter)", jitter);
        }

        let before = state.vendors.len();
        state.vendors.retain(|v| host.form_exists(v.npc));
        report.pruned_vendors = before - state.vendors.len();

        if !report.is_clean() {
            info!("validation: {:?}", report);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::network::FilterStage;

    #[test]
    fn migrates_then_dedups() {
        let host = MemoryHost::new();
        host.insert_container(0x10, "Master", "");
        host.insert_container(0x20, "Crate", "");
        let manager = NetworkManager::new();
        manager.create_network("Home", 0x10).unwrap();
        manager
            .set_filter_config(
                "Home",
                vec![
                    FilterStage::new("dark_brotherhood", 0x20),
                    FilterStage::new("nightingale", 0x20),
                    FilterStage::new("hearthfire_materials", 0),
                ],
                0x10,
            )
            .unwrap();
        let report = manager.validate(&host, 24.0);
        assert_eq!(report.migrated_filters, 3);
        assert_eq!(report.pruned_filters, 1);
        let ids: Vec<String> = manager
            .find("Home")
            .unwrap()
            .stages
            .into_iter()
            .map(|s| s.filter_id)
            .collect();
        assert_eq!(ids, vec!["guild_equipment", "building_materials"]);
        assert!(manager.validate(&host, 24.0).is_clean());
    }

    #[test]
    fn overdue_timer_gets_jittered() {
        let host = MemoryHost::new();
        host.insert_container(0x30, "Sell", "");
        host.set_game_hours(100.0);
        let manager = NetworkManager::new();
        manager.set_sell_container(0x30, 10.0);
        manager.validate(&host, 24.0);
        let last = manager.sell_state().last_sell_time;
        assert!((94.0..=106.0).contains(&last));
    }
}
