//! Network manager: networks, tags, sell state, transaction log, vendors, presets and
//! container lists behind a single coarse lock.
//!
//! Every public mutator takes the lock once and completes its change before releasing it.
//! Readers return owned copies. Host calls are made before the lock is taken so a host that
//! re-enters the manager cannot deadlock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use serde::Serialize;

use super::preset::{ContainerList, Preset};
use super::{FilterStage, Network, SellState, Transaction, Vendor, TRANSACTION_LOG_CAP};
use crate::config::Settings;
use crate::errors::StashError;
use crate::host::{FormId, Host, GOLD_FORM, NO_REF};

#[derive(Debug, Default)]
pub(super) struct State {
    pub(super) networks: Vec<Network>,
    pub(super) tags: BTreeMap<FormId, String>,
    pub(super) sell: SellState,
    /// Newest first.
    pub(super) transactions: Vec<Transaction>,
    pub(super) vendors: Vec<Vendor>,
    pub(super) presets: Vec<Preset>,
    pub(super) container_lists: Vec<ContainerList>,
    pub(super) disabled_lists: BTreeSet<String>,
    /// Saved references that failed to resolve on the last load, awaiting validation.
    pub(super) lost: LostRefs,
}

/// References dropped while decoding a save because they no longer resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LostRefs {
    /// Stage containers and catch-alls.
    pub(crate) filters: usize,
    pub(crate) tags: usize,
    pub(crate) sell: bool,
}

impl LostRefs {
    pub(crate) fn merge(&mut self, other: LostRefs) {
        self.filters += other.filters;
        self.tags += other.tags;
        self.sell |= other.sell;
    }
}

impl State {
    pub(super) fn network_mut(&mut self, name: &str) -> Result<&mut Network, StashError> {
        self.networks
            .iter_mut()
            .find(|n| n.name == name)
            .ok_or_else(|| StashError::NetworkNotFound(name.to_string()))
    }

    fn master_owner(&self, master: FormId) -> Option<&Network> {
        self.networks.iter().find(|n| n.master == master)
    }

    fn vendor_mut(&mut self, npc: FormId) -> Result<&mut Vendor, StashError> {
        self.vendors
            .iter_mut()
            .find(|v| v.npc == npc)
            .ok_or(StashError::VendorNotFound(npc))
    }

    pub(super) fn clear_user_state(&mut self) {
        self.networks.clear();
        self.tags.clear();
        self.sell = SellState::default();
        self.transactions.clear();
        self.vendors.clear();
        self.disabled_lists.clear();
        self.lost = LostRefs::default();
    }
}

/// Remove exactly `cost` gold from the player or nothing at all.
fn charge_player(cost: i32, host: &dyn Host) -> Result<(), StashError> {
    let player = host.player_ref();
    let available: i32 = host
        .inventory(player)
        .iter()
        .filter(|e| e.item == GOLD_FORM)
        .map(|e| e.count)
        .sum();
    if available < cost {
        return Err(StashError::InsufficientGold {
            needed: cost,
            available,
        });
    }
    let removed = host.remove_item(player, GOLD_FORM, cost);
    if removed < cost {
        if removed > 0 {
            host.add_item(player, GOLD_FORM, removed);
        }
        return Err(StashError::InsufficientGold {
            needed: cost,
            available: removed,
        });
    }
    Ok(())
}

/// Persisted portion of the manager state, for comparisons and inspection.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Snapshot {
    pub networks: Vec<Network>,
    pub tags: BTreeMap<FormId, String>,
    pub sell: SellState,
    pub transactions: Vec<Transaction>,
    pub vendors: Vec<Vendor>,
    pub disabled_lists: BTreeSet<String>,
}

/// Transaction log totals for one vendor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorSummary {
    pub vendor: String,
    pub items: i64,
    pub gold: i64,
}

#[derive(Debug, Default)]
pub struct NetworkManager {
    state: Mutex<State>,
}

impl NetworkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager seeded with the immutable definitions parsed at load.
    pub fn with_definitions(presets: Vec<Preset>, container_lists: Vec<ContainerList>) -> Self {
        let manager = Self::new();
        {
            let mut state = manager.lock();
            state.presets = presets;
            state.container_lists = container_lists;
        }
        manager
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Networks
    // ========================================================================

    pub fn create_network(&self, name: &str, master: FormId) -> Result<(), StashError> {
        let name = name.trim();
        if name.is_empty() || master == NO_REF {
            return Err(StashError::Config(format!(
                "network needs a name and a master (got '{name}', {master:#X})"
            )));
        }
        let mut state = self.lock();
        if state.networks.iter().any(|n| n.name == name) {
            return Err(StashError::DuplicateNetwork(name.to_string()));
        }
        if let Some(owner) = state.master_owner(master) {
            return Err(StashError::MasterInUse {
                master,
                network: owner.name.clone(),
            });
        }
        state.networks.push(Network::new(name, master));
        info!("created network '{}' with master {:#010X}", name, master);
        Ok(())
    }

    pub fn remove_network(&self, name: &str) -> bool {
        let mut state = self.lock();
        let before = state.networks.len();
        state.networks.retain(|n| n.name != name);
        let removed = state.networks.len() != before;
        if removed {
            info!("removed network '{}'", name);
        }
        removed
    }

    pub fn rename_network(&self, old: &str, new: &str) -> Result<(), StashError> {
        let new = new.trim();
        let mut state = self.lock();
        if new.is_empty() || state.networks.iter().any(|n| n.name == new) {
            return Err(StashError::DuplicateNetwork(new.to_string()));
        }
        state.network_mut(old)?.name = new.to_string();
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Network> {
        self.lock().networks.iter().find(|n| n.name == name).cloned()
    }

    /// Network names in creation order.
    pub fn list(&self) -> Vec<String> {
        self.lock().networks.iter().map(|n| n.name.clone()).collect()
    }

    pub fn networks(&self) -> Vec<Network> {
        self.lock().networks.clone()
    }

    /// Name of the network whose master is `container`.
    pub fn master_network(&self, container: FormId) -> Option<String> {
        self.lock().master_owner(container).map(|n| n.name.clone())
    }

    /// Replace stages and catch-all verbatim.
    pub fn set_filter_config(
        &self,
        name: &str,
        stages: Vec<FilterStage>,
        catch_all: FormId,
    ) -> Result<(), StashError> {
        let mut state = self.lock();
        let network = state.network_mut(name)?;
        network.stages = stages;
        network.catch_all = catch_all;
        debug!("network '{}': {} stages", name, network.stages.len());
        Ok(())
    }

    pub fn set_whoosh_config(&self, name: &str, filters: BTreeSet<String>) -> Result<(), StashError> {
        let mut state = self.lock();
        let network = state.network_mut(name)?;
        network.whoosh_filters = filters;
        network.whoosh_configured = true;
        Ok(())
    }

    // ========================================================================
    // Tags
    // ========================================================================

    pub fn tag(&self, container: FormId, name: &str) {
        if container == NO_REF {
            return;
        }
        self.lock().tags.insert(container, name.trim().to_string());
    }

    pub fn untag(&self, container: FormId) -> bool {
        self.lock().tags.remove(&container).is_some()
    }

    pub fn is_tagged(&self, container: FormId) -> bool {
        self.lock().tags.contains_key(&container)
    }

    pub fn name_of(&self, container: FormId) -> Option<String> {
        self.lock().tags.get(&container).cloned()
    }

    pub fn tags(&self) -> BTreeMap<FormId, String> {
        self.lock().tags.clone()
    }

    /// Null every stage and catch-all pointing at `container` and clear a matching sell
    /// container. Returns the number of references cleared.
    pub fn clear_container_references(&self, container: FormId) -> usize {
        if container == NO_REF {
            return 0;
        }
        let mut state = self.lock();
        let mut cleared = 0;
        for network in &mut state.networks {
            for stage in network.stages.iter_mut().filter(|s| s.container == container) {
                stage.container = NO_REF;
                cleared += 1;
            }
            if network.catch_all == container {
                network.catch_all = NO_REF;
                cleared += 1;
            }
        }
        if state.sell.container == container {
            state.sell.container = NO_REF;
            state.sell.timer_started = false;
            cleared += 1;
        }
        cleared
    }

    // ========================================================================
    // Sales
    // ========================================================================

    pub fn sell_state(&self) -> SellState {
        self.lock().sell.clone()
    }

    /// Designate the sell container and start its cooldown at `now`. `0` clears it.
    pub fn set_sell_container(&self, container: FormId, now: f64) {
        let mut state = self.lock();
        state.sell.container = container;
        state.sell.timer_started = container != NO_REF;
        state.sell.last_sell_time = now;
    }

    pub fn record_sale(&self, items: u32, gold: u32) {
        let mut state = self.lock();
        state.sell.total_items_sold = state.sell.total_items_sold.saturating_add(items);
        state.sell.total_gold_earned = state.sell.total_gold_earned.saturating_add(gold);
    }

    /// Stamp the sell timer, starting it if needed.
    pub fn set_last_sell_time(&self, hours: f64) {
        let mut state = self.lock();
        state.sell.last_sell_time = hours;
        state.sell.timer_started = true;
    }

    /// Prepend to the log and drop the oldest entries past the cap.
    pub fn add_transaction(&self, transaction: Transaction) {
        let mut state = self.lock();
        state.transactions.insert(0, transaction);
        state.transactions.truncate(TRANSACTION_LOG_CAP);
    }

    /// Log entries, newest first.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().transactions.clone()
    }

    /// Items and gold per vendor across the log, in first-seen (newest) order.
    pub fn transaction_summary(&self) -> Vec<VendorSummary> {
        let state = self.lock();
        let mut summary: Vec<VendorSummary> = Vec::new();
        for tx in &state.transactions {
            match summary.iter_mut().find(|s| s.vendor == tx.vendor_name) {
                Some(entry) => {
                    entry.items += tx.quantity as i64;
                    entry.gold += tx.gold_earned as i64;
                }
                None => summary.push(VendorSummary {
                    vendor: tx.vendor_name.clone(),
                    items: tx.quantity as i64,
                    gold: tx.gold_earned as i64,
                }),
            }
        }
        summary
    }

    // ========================================================================
    // Vendors
    // ========================================================================

    /// Register or re-register a vendor NPC.
    pub fn register_vendor(&self, vendor: Vendor) {
        let mut state = self.lock();
        info!("registered vendor {} ({})", vendor.vendor_name, vendor.store_name);
        match state.vendors.iter_mut().find(|v| v.npc == vendor.npc) {
            Some(existing) => *existing = vendor,
            None => state.vendors.push(vendor),
        }
    }

    pub fn unregister_vendor(&self, npc: FormId) -> Result<(), StashError> {
        let mut state = self.lock();
        let before = state.vendors.len();
        state.vendors.retain(|v| v.npc != npc);
        if state.vendors.len() == before {
            return Err(StashError::VendorNotFound(npc));
        }
        Ok(())
    }

    pub fn set_vendor_active(&self, npc: FormId, active: bool) -> Result<(), StashError> {
        self.lock().vendor_mut(npc)?.active = active;
        Ok(())
    }

    /// Charge the player `cost` gold and mark the vendor invested.
    ///
    /// The vendor is marked before the charge so concurrent calls charge once; the mark is
    /// released if the charge fails. Gold is refunded if the vendor is unregistered while
    /// the charge is in flight.
    pub fn invest_in_vendor(&self, npc: FormId, cost: i32, host: &dyn Host) -> Result<(), StashError> {
        {
            let mut state = self.lock();
            let vendor = state.vendor_mut(npc)?;
            if vendor.invested {
                return Ok(());
            }
            vendor.invested = true;
        }
        if let Err(e) = charge_player(cost, host) {
            if let Ok(vendor) = self.lock().vendor_mut(npc) {
                vendor.invested = false;
            }
            return Err(e);
        }
        if self.lock().vendor_mut(npc).is_err() {
            warn!("vendor {:#010X} vanished during investment; refunding {} gold", npc, cost);
            host.add_item(host.player_ref(), GOLD_FORM, cost);
            return Err(StashError::VendorNotFound(npc));
        }
        info!("invested {} gold in vendor {:#010X}", cost, npc);
        Ok(())
    }

    pub fn set_vendor_visit(&self, npc: FormId, hours: f64) -> Result<(), StashError> {
        self.lock().vendor_mut(npc)?.last_visit_time = hours;
        Ok(())
    }

    pub fn vendors(&self) -> Vec<Vendor> {
        self.lock().vendors.clone()
    }

    // ========================================================================
    // Presets and container lists
    // ========================================================================

    pub fn presets(&self) -> Vec<Preset> {
        self.lock().presets.clone()
    }

    pub fn preset(&self, name: &str) -> Option<Preset> {
        self.lock().presets.iter().find(|p| p.name == name).cloned()
    }

    /// Instantiate a preset as a new network of the same name.
    pub fn activate_preset(&self, name: &str, host: &dyn Host) -> Result<(), StashError> {
        let preset = self
            .preset(name)
            .ok_or_else(|| StashError::PresetNotFound(name.to_string()))?;
        let master = preset
            .master
            .resolve(host)
            .ok_or_else(|| StashError::Config(format!("preset '{name}' master does not resolve")))?;
        let stages: Vec<FilterStage> = preset
            .filters
            .iter()
            .map(|(id, target)| FilterStage::new(id, target.resolve(master, host)))
            .collect();
        let catch_all = preset.catch_all.resolve(master, host);
        let tags: Vec<(FormId, String)> = preset
            .tags
            .iter()
            .filter_map(|(spec, label)| spec.resolve(host).map(|id| (id, label.clone())))
            .collect();

        let mut state = self.lock();
        if state.networks.iter().any(|n| n.name == preset.name) {
            return Err(StashError::DuplicateNetwork(preset.name.clone()));
        }
        if let Some(owner) = state.master_owner(master) {
            return Err(StashError::MasterInUse {
                master,
                network: owner.name.clone(),
            });
        }
        let mut network = Network::new(&preset.name, master);
        network.stages = stages;
        network.catch_all = catch_all;
        if !preset.whoosh.is_empty() {
            network.whoosh_filters = preset.whoosh.iter().cloned().collect();
            network.whoosh_configured = true;
        }
        state.networks.push(network);
        for (id, label) in tags {
            state.tags.entry(id).or_insert(label);
        }
        info!("activated preset '{}'", preset.name);
        Ok(())
    }

    pub fn preset_warnings(&self, name: &str, host: &dyn Host) -> Result<String, StashError> {
        self.preset(name)
            .map(|p| p.warnings(host))
            .ok_or_else(|| StashError::PresetNotFound(name.to_string()))
    }

    pub fn container_lists(&self) -> Vec<ContainerList> {
        self.lock().container_lists.clone()
    }

    /// Lists not disabled by the player.
    pub fn enabled_container_lists(&self) -> Vec<ContainerList> {
        let state = self.lock();
        state
            .container_lists
            .iter()
            .filter(|l| !state.disabled_lists.contains(&l.name))
            .cloned()
            .collect()
    }

    pub fn set_container_list_enabled(&self, name: &str, enabled: bool) -> Result<(), StashError> {
        let mut state = self.lock();
        if !state.container_lists.iter().any(|l| l.name == name) {
            return Err(StashError::ContainerListNotFound(name.to_string()));
        }
        if enabled {
            state.disabled_lists.remove(name);
        } else {
            state.disabled_lists.insert(name.to_string());
        }
        Ok(())
    }

    pub fn disabled_container_lists(&self) -> BTreeSet<String> {
        self.lock().disabled_lists.clone()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Clear all persisted state. Preset and container-list definitions stay.
    pub fn reset(&self) {
        self.lock().clear_user_state();
        info!("network state reset");
    }

    /// Import config-declared networks, sell container and tags into an empty state.
    /// Returns the number of items applied.
    pub fn apply_config_seeds(&self, settings: &Settings, host: &dyn Host) -> usize {
        let mut applied = 0;
        for (name, spec) in &settings.seed_networks {
            match spec.resolve(host) {
                Some(master) => match self.create_network(name, master) {
                    Ok(()) => applied += 1,
                    Err(e) => warn!("seed network '{}' skipped: {}", name, e),
                },
                None => debug!("seed network '{}': master {} not found", name, spec),
            }
        }
        if let Some(spec) = &settings.seed_sell_container {
            if let Some(container) = spec.resolve(host) {
                self.set_sell_container(container, host.game_hours());
                applied += 1;
            }
        }
        for (spec, label) in &settings.seed_tags {
            if let Some(container) = spec.resolve(host) {
                if !self.is_tagged(container) {
                    self.tag(container, label);
                    applied += 1;
                }
            }
        }
        applied
    }

    /// Copy of the persisted state.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            networks: state.networks.clone(),
            tags: state.tags.clone(),
            sell: state.sell.clone(),
            transactions: state.transactions.clone(),
            vendors: state.vendors.clone(),
            disabled_lists: state.disabled_lists.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{InventoryEntry, ItemForm, MemoryHost, Recipe, VendorData};

    /// Memory host whose gold removal can be capped or hooked.
    struct HookedHost<'a> {
        inner: MemoryHost,
        remove_cap: Option<i32>,
        on_remove: Box<dyn Fn() + 'a>,
    }

    impl<'a> HookedHost<'a> {
        fn new(inner: MemoryHost) -> Self {
            Self {
                inner,
                remove_cap: None,
                on_remove: Box::new(|| {}),
            }
        }
    }

    impl Host for HookedHost<'_> {
        fn item(&self, id: FormId) -> Option<ItemForm> {
            self.inner.item(id)
        }
        fn form_exists(&self, id: FormId) -> bool {
            self.inner.form_exists(id)
        }
        fn lookup_form(&self, local_id: u32, plugin: &str) -> Option<FormId> {
            self.inner.lookup_form(local_id, plugin)
        }
        fn lookup_editor_id(&self, editor_id: &str) -> Option<FormId> {
            self.inner.lookup_editor_id(editor_id)
        }
        fn is_plugin_loaded(&self, plugin: &str) -> bool {
            self.inner.is_plugin_loaded(plugin)
        }
        fn loaded_plugins(&self) -> Vec<String> {
            self.inner.loaded_plugins()
        }
        fn resolve_saved_ref(&self, saved: FormId) -> Option<FormId> {
            self.inner.resolve_saved_ref(saved)
        }
        fn container_name(&self, container: FormId) -> Option<String> {
            self.inner.container_name(container)
        }
        fn container_location(&self, container: FormId) -> Option<String> {
            self.inner.container_location(container)
        }
        fn inventory(&self, container: FormId) -> Vec<InventoryEntry> {
            self.inner.inventory(container)
        }
        fn move_item(&self, from: FormId, item: FormId, count: i32, to: FormId) -> i32 {
            self.inner.move_item(from, item, count, to)
        }
        fn remove_item(&self, from: FormId, item: FormId, count: i32) -> i32 {
            (self.on_remove)();
            let count = self.remove_cap.map_or(count, |cap| count.min(cap));
            self.inner.remove_item(from, item, count)
        }
        fn add_item(&self, to: FormId, item: FormId, count: i32) {
            self.inner.add_item(to, item, count)
        }
        fn containers_in_current_cell(&self) -> Vec<FormId> {
            self.inner.containers_in_current_cell()
        }
        fn player_ref(&self) -> FormId {
            self.inner.player_ref()
        }
        fn game_hours(&self) -> f64 {
            self.inner.game_hours()
        }
        fn player_knows_spell(&self, spell: FormId) -> bool {
            self.inner.player_knows_spell(spell)
        }
        fn player_knows_enchantment(&self, enchantment: FormId) -> bool {
            self.inner.player_knows_enchantment(enchantment)
        }
        fn recipes(&self) -> Vec<Recipe> {
            self.inner.recipes()
        }
        fn formlist_members(&self, list: FormId) -> Option<Vec<FormId>> {
            self.inner.formlist_members(list)
        }
        fn vendor_data(&self, faction: FormId) -> Option<VendorData> {
            self.inner.vendor_data(faction)
        }
        fn notify(&self, message: &str) {
            self.inner.notify(message)
        }
    }

    fn gold_host(gold: i32) -> MemoryHost {
        let host = MemoryHost::new();
        let player = host.player_ref();
        host.stock_entry(player, InventoryEntry::new(GOLD_FORM, gold));
        host
    }

    fn belethor() -> Vendor {
        Vendor::new(0x50, 0x60, "Belethor", "Belethor's General Goods")
    }

    fn tx(vendor: &str, quantity: i32, gold: i32) -> Transaction {
        Transaction {
            item_name: "Iron Ingot".to_string(),
            vendor_name: vendor.to_string(),
            vendor_assortment: "General Goods".to_string(),
            quantity,
            gold_earned: gold,
            price_per_unit: 0.7,
            game_time: 10.0,
        }
    }

    #[test]
    fn create_rejects_duplicates_and_shared_masters() {
        let manager = NetworkManager::new();
        manager.create_network("Home", 0x10).unwrap();
        assert!(matches!(
            manager.create_network("Home", 0x11),
            Err(StashError::DuplicateNetwork(_))
        ));
        assert!(matches!(
            manager.create_network("Other", 0x10),
            Err(StashError::MasterInUse { .. })
        ));
        manager.rename_network("Home", "Breezehome").unwrap();
        assert_eq!(manager.list(), vec!["Breezehome".to_string()]);
        assert!(manager.remove_network("Breezehome"));
        assert!(!manager.remove_network("Breezehome"));
    }

    #[test]
    fn clear_references_nulls_stages_catch_all_and_sell() {
        let manager = NetworkManager::new();
        manager.create_network("Home", 0x10).unwrap();
        manager
            .set_filter_config("Home", vec![FilterStage::new("ore", 0x20)], 0x20)
            .unwrap();
        manager.set_sell_container(0x20, 5.0);
        assert_eq!(manager.clear_container_references(0x20), 3);
        let net = manager.find("Home").unwrap();
        assert_eq!(net.stages[0].container, NO_REF);
        assert_eq!(net.catch_all, NO_REF);
        assert_eq!(manager.sell_state().container, NO_REF);
    }

    #[test]
    fn transaction_log_is_capped_newest_first() {
        let manager = NetworkManager::new();
        for i in 0..105 {
            manager.add_transaction(tx("Belethor", i, i));
        }
        let log = manager.transactions();
        assert_eq!(log.len(), TRANSACTION_LOG_CAP);
        assert_eq!(log[0].quantity, 104);
        assert_eq!(log[99].quantity, 5);
    }

    #[test]
    fn summary_groups_by_vendor() {
        let manager = NetworkManager::new();
        manager.add_transaction(tx("Belethor", 2, 4));
        manager.add_transaction(tx("Arcadia", 1, 10));
        manager.add_transaction(tx("Belethor", 3, 6));
        let summary = manager.transaction_summary();
        assert_eq!(summary[0].vendor, "Belethor");
        assert_eq!(summary[0].items, 5);
        assert_eq!(summary[0].gold, 10);
        assert_eq!(summary[1].gold, 10);
    }

    #[test]
    fn invest_charges_player_gold() {
        let host = MemoryHost::new();
        let player = host.player_ref();
        host.stock_entry(player, InventoryEntry::new(GOLD_FORM, 300));
        let manager = NetworkManager::new();
        manager.register_vendor(Vendor::new(0x50, 0x60, "Belethor", "Belethor's General Goods"));
        assert!(matches!(
            manager.invest_in_vendor(0x50, 500, &host),
            Err(StashError::InsufficientGold { needed: 500, available: 300 })
        ));
        manager.invest_in_vendor(0x50, 200, &host).unwrap();
        assert!(manager.vendors()[0].invested);
        assert_eq!(host.count_of(player, GOLD_FORM), 100);
        assert!(matches!(
            manager.set_vendor_active(0x99, false),
            Err(StashError::VendorNotFound(0x99))
        ));
    }

    #[test]
    fn short_gold_removal_refunds_and_leaves_vendor_uninvested() {
        let mut host = HookedHost::new(gold_host(600));
        host.remove_cap = Some(120);
        let player = host.player_ref();
        let manager = NetworkManager::new();
        manager.register_vendor(belethor());

        assert!(matches!(
            manager.invest_in_vendor(0x50, 500, &host),
            Err(StashError::InsufficientGold { needed: 500, available: 120 })
        ));
        assert!(!manager.vendors()[0].invested);
        assert_eq!(host.inner.count_of(player, GOLD_FORM), 600);
    }

    #[test]
    fn vendor_unregistered_mid_charge_gets_a_refund() {
        let manager = NetworkManager::new();
        manager.register_vendor(belethor());
        let mut host = HookedHost::new(gold_host(600));
        host.on_remove = Box::new(|| {
            let _ = manager.unregister_vendor(0x50);
        });
        let player = host.player_ref();

        assert!(matches!(
            manager.invest_in_vendor(0x50, 500, &host),
            Err(StashError::VendorNotFound(0x50))
        ));
        assert_eq!(host.inner.count_of(player, GOLD_FORM), 600);
        assert!(manager.vendors().is_empty());
    }

    #[test]
    fn reentrant_investment_charges_once() {
        let manager = NetworkManager::new();
        manager.register_vendor(belethor());
        let mut host = HookedHost::new(gold_host(1000));
        host.on_remove = Box::new(|| {
            assert!(manager.vendors()[0].invested);
        });
        let player = host.player_ref();

        manager.invest_in_vendor(0x50, 500, &host).unwrap();
        manager.invest_in_vendor(0x50, 500, &host).unwrap();
        assert_eq!(host.inner.count_of(player, GOLD_FORM), 500);
    }
}
