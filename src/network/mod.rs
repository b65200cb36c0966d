//! # Networks
//!
//! A network is a master container plus ordered filter stages, a catch-all and a whoosh set.
//! This module holds the network data model and everything that owns or mutates it:
//!
//! - [`manager`] - [`NetworkManager`], the single lock around all mutable state
//! - [`preset`] - `[Preset:*]` and `[ContainerList:*]` definitions
//! - [`validation`] - post-load pruning and filter id migration
//! - [`persist`] - versioned co-save records

pub mod manager;
pub mod persist;
pub mod preset;
pub mod validation;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::host::{FormId, NO_REF};

pub use manager::{NetworkManager, Snapshot, VendorSummary};
pub use persist::{LoadReport, RecordInfo};
pub use preset::{ContainerList, ContainerListEntry, Preset, PresetTarget};
pub use validation::ValidationReport;

/// Maximum transaction log length.
pub const TRANSACTION_LOG_CAP: usize = 100;

/// One routing slot: a filter id bound to a destination container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStage {
    pub filter_id: String,
    /// `0` marks an inert slot the pipeline ignores.
    pub container: FormId,
}

impl FilterStage {
    pub fn new(filter_id: &str, container: FormId) -> Self {
        Self {
            filter_id: filter_id.to_string(),
            container,
        }
    }

    pub fn is_inert(&self) -> bool {
        self.container == NO_REF
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub master: FormId,
    pub stages: Vec<FilterStage>,
    /// Destination for unclaimed items; equal to `master` means they stay put.
    pub catch_all: FormId,
    pub whoosh_filters: BTreeSet<String>,
    pub whoosh_configured: bool,
}

impl Network {
    pub fn new(name: &str, master: FormId) -> Self {
        Self {
            name: name.to_string(),
            master,
            stages: Vec::new(),
            catch_all: master,
            whoosh_filters: BTreeSet::new(),
            whoosh_configured: false,
        }
    }

    /// Container bound to `filter_id` by the first stage naming it, `0` if none.
    pub fn binding(&self, filter_id: &str) -> FormId {
        self.stages
            .iter()
            .find(|s| s.filter_id == filter_id)
            .map(|s| s.container)
            .unwrap_or(NO_REF)
    }

    /// Distinct non-master containers the network routes into, stages first, catch-all last.
    pub fn linked_containers(&self) -> Vec<FormId> {
        let mut out: Vec<FormId> = Vec::new();
        let candidates = self
            .stages
            .iter()
            .map(|s| s.container)
            .chain(std::iter::once(self.catch_all));
        for container in candidates {
            if container != NO_REF && container != self.master && !out.contains(&container) {
                out.push(container);
            }
        }
        out
    }

    /// Whether `container` appears anywhere in the network.
    pub fn references(&self, container: FormId) -> bool {
        container != NO_REF
            && (self.master == container
                || self.catch_all == container
                || self.stages.iter().any(|s| s.container == container))
    }
}

/// Sell container and lifetime totals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SellState {
    pub container: FormId,
    pub total_items_sold: u32,
    pub total_gold_earned: u32,
    /// Game hours of the last cycle (jittered).
    pub last_sell_time: f64,
    pub timer_started: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub item_name: String,
    pub vendor_name: String,
    pub vendor_assortment: String,
    pub quantity: i32,
    pub gold_earned: i32,
    pub price_per_unit: f32,
    pub game_time: f64,
}

/// Registered vendor NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub npc: FormId,
    pub faction: FormId,
    pub vendor_name: String,
    pub store_name: String,
    pub last_visit_time: f64,
    pub active: bool,
    pub invested: bool,
    pub npc_base: FormId,
}

impl Vendor {
    pub fn new(npc: FormId, faction: FormId, vendor_name: &str, store_name: &str) -> Self {
        Self {
            npc,
            faction,
            vendor_name: vendor_name.to_string(),
            store_name: store_name.to_string(),
            last_visit_time: 0.0,
            active: true,
            invested: false,
            npc_base: NO_REF,
        }
    }
}
