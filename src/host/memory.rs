//! In-memory [`Host`] implementation.
//!
//! `MemoryHost` keeps a tiny world (plugins, item forms, container references with
//! inventories, recipes, form lists, faction vendor data and a game clock) behind a mutex.
//! Tests build it fluently; the CLI loads it from a TOML [`WorldFixture`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::{FormId, Host, InventoryEntry, ItemForm, Recipe, VendorData};
use crate::errors::StashError;

/// Default player reference handle.
pub const DEFAULT_PLAYER: FormId = 0x0000_0014;

/// Serializable description of a world, loadable from TOML.
///
/// ```toml
/// plugins = ["Skyrim.esm"]
/// game_hours = 100.0
///
/// [[items]]
/// id = 0x5ACE4
/// name = "Iron Ingot"
/// kind = "Misc"
/// value = 7
/// playable = true
///
/// [[containers]]
/// id = 0x1000
/// name = "Chest"
/// inventory = [{ item = 0x5ACE4, count = 3 }]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldFixture {
    pub plugins: Vec<String>,
    pub game_hours: f64,
    pub player: Option<FormId>,
    pub items: Vec<ItemForm>,
    pub containers: Vec<ContainerFixture>,
    /// Other live forms (keywords, NPCs, factions) that only need to exist.
    pub forms: Vec<FormId>,
    pub editor_ids: BTreeMap<String, FormId>,
    pub recipes: Vec<Recipe>,
    pub formlists: Vec<FormListFixture>,
    pub vendors: Vec<FactionFixture>,
    pub known_spells: Vec<FormId>,
    pub known_enchantments: Vec<FormId>,
    pub current_cell: Vec<FormId>,
}

impl WorldFixture {
    /// Parse a fixture from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StashError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerFixture {
    pub id: FormId,
    pub name: String,
    pub location: String,
    pub inventory: Vec<InventoryEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormListFixture {
    pub id: FormId,
    pub members: Vec<FormId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FactionFixture {
    pub faction: FormId,
    #[serde(flatten)]
    pub data: VendorData,
}

#[derive(Debug, Clone, Default)]
struct ContainerState {
    name: String,
    location: String,
    inventory: Vec<InventoryEntry>,
}

#[derive(Debug, Default)]
struct World {
    plugins: Vec<String>,
    game_hours: f64,
    player: FormId,
    items: BTreeMap<FormId, ItemForm>,
    containers: BTreeMap<FormId, ContainerState>,
    forms: BTreeSet<FormId>,
    editor_ids: HashMap<String, FormId>,
    recipes: Vec<Recipe>,
    formlists: HashMap<FormId, Vec<FormId>>,
    vendors: HashMap<FormId, VendorData>,
    known_spells: BTreeSet<FormId>,
    known_enchantments: BTreeSet<FormId>,
    current_cell: Vec<FormId>,
    saved_ref_remap: HashMap<FormId, Option<FormId>>,
    notifications: Vec<String>,
}

impl World {
    fn take(&mut self, from: FormId, item: FormId, count: i32) -> i32 {
        let Some(container) = self.containers.get_mut(&from) else {
            return 0;
        };
        let mut remaining = count;
        for entry in container.inventory.iter_mut().filter(|e| e.item == item) {
            if remaining == 0 {
                break;
            }
            let taken = entry.count.min(remaining);
            entry.count -= taken;
            remaining -= taken;
        }
        container.inventory.retain(|e| e.count > 0);
        count - remaining
    }

    fn put(&mut self, to: FormId, item: FormId, count: i32) -> bool {
        let Some(container) = self.containers.get_mut(&to) else {
            return false;
        };
        if count <= 0 {
            return true;
        }
        match container.inventory.iter_mut().find(|e| e.item == item) {
            Some(entry) => entry.count += count,
            None => container.inventory.push(InventoryEntry::new(item, count)),
        }
        true
    }
}

/// Mutex-guarded in-memory world.
#[derive(Debug)]
pub struct MemoryHost {
    world: Mutex<World>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// Empty world with a player container and `Skyrim.esm` loaded at index 0.
    pub fn new() -> Self {
        let mut world = World {
            plugins: vec!["Skyrim.esm".to_string()],
            player: DEFAULT_PLAYER,
            ..Default::default()
        };
        world.containers.insert(
            DEFAULT_PLAYER,
            ContainerState {
                name: "Player".to_string(),
                ..Default::default()
            },
        );
        Self {
            world: Mutex::new(world),
        }
    }

    /// Build a host from a parsed fixture.
    pub fn from_fixture(fixture: WorldFixture) -> Self {
        let host = Self::new();
        {
            let mut world = host.lock();
            if !fixture.plugins.is_empty() {
                world.plugins = fixture.plugins;
            }
            world.game_hours = fixture.game_hours;
            if let Some(player) = fixture.player {
                world.containers.remove(&DEFAULT_PLAYER);
                world.player = player;
                world.containers.entry(player).or_insert_with(|| ContainerState {
                    name: "Player".to_string(),
                    ..Default::default()
                });
            }
            for item in fixture.items {
                world.items.insert(item.id, item);
            }
            for container in fixture.containers {
                world.containers.insert(
                    container.id,
                    ContainerState {
                        name: container.name,
                        location: container.location,
                        inventory: container.inventory,
                    },
                );
            }
            world.forms.extend(fixture.forms);
            for (editor_id, id) in fixture.editor_ids {
                world.forms.insert(id);
                world.editor_ids.insert(editor_id.to_ascii_lowercase(), id);
            }
            world.recipes = fixture.recipes;
            for list in fixture.formlists {
                world.forms.insert(list.id);
                world.formlists.insert(list.id, list.members);
            }
            for vendor in fixture.vendors {
                world.forms.insert(vendor.faction);
                world.vendors.insert(vendor.faction, vendor.data);
            }
            world.known_spells.extend(fixture.known_spells);
            world.known_enchantments.extend(fixture.known_enchantments);
            world.current_cell = fixture.current_cell;
        }
        host
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the load order.
    pub fn with_plugins(self, plugins: &[&str]) -> Self {
        self.lock().plugins = plugins.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Compose the handle a plugin-local id gets under the current load order.
    pub fn form_id(&self, local_id: u32, plugin: &str) -> Option<FormId> {
        let world = self.lock();
        world
            .plugins
            .iter()
            .position(|p| p.eq_ignore_ascii_case(plugin))
            .map(|index| ((index as u32) << 24) | (local_id & 0x00FF_FFFF))
    }

    pub fn insert_item(&self, item: ItemForm) {
        self.lock().items.insert(item.id, item);
    }

    pub fn insert_container(&self, id: FormId, name: &str, location: &str) {
        self.lock().containers.insert(
            id,
            ContainerState {
                name: name.to_string(),
                location: location.to_string(),
                inventory: Vec::new(),
            },
        );
    }

    /// Register a bare form (keyword, NPC, faction) so it resolves.
    pub fn insert_form(&self, id: FormId) {
        self.lock().forms.insert(id);
    }

    pub fn set_editor_id(&self, editor_id: &str, id: FormId) {
        let mut world = self.lock();
        world.forms.insert(id);
        world.editor_ids.insert(editor_id.to_ascii_lowercase(), id);
    }

    /// Put `count` units of `item` into `container`.
    pub fn stock(&self, container: FormId, item: FormId, count: i32) {
        self.lock().put(container, item, count);
    }

    /// Add an inventory line with explicit flags (equipped, favourited, quest item).
    pub fn stock_entry(&self, container: FormId, entry: InventoryEntry) {
        if let Some(state) = self.lock().containers.get_mut(&container) {
            state.inventory.push(entry);
        }
    }

    pub fn insert_recipe(&self, recipe: Recipe) {
        self.lock().recipes.push(recipe);
    }

    pub fn insert_formlist(&self, id: FormId, members: Vec<FormId>) {
        let mut world = self.lock();
        world.forms.insert(id);
        world.formlists.insert(id, members);
    }

    pub fn set_vendor_data(&self, faction: FormId, data: VendorData) {
        let mut world = self.lock();
        world.forms.insert(faction);
        world.vendors.insert(faction, data);
    }

    pub fn learn_spell(&self, spell: FormId) {
        self.lock().known_spells.insert(spell);
    }

    pub fn learn_enchantment(&self, enchantment: FormId) {
        self.lock().known_enchantments.insert(enchantment);
    }

    pub fn set_game_hours(&self, hours: f64) {
        self.lock().game_hours = hours;
    }

    pub fn advance_hours(&self, hours: f64) {
        self.lock().game_hours += hours;
    }

    pub fn set_current_cell(&self, containers: Vec<FormId>) {
        self.lock().current_cell = containers;
    }

    /// Delete a form or reference from the world, as if its plugin content vanished.
    pub fn remove_form(&self, id: FormId) {
        let mut world = self.lock();
        world.items.remove(&id);
        world.containers.remove(&id);
        world.forms.remove(&id);
    }

    /// Make a saved handle rewrite to another handle, or fail to rewrite with `None`.
    pub fn remap_saved_ref(&self, saved: FormId, live: Option<FormId>) {
        self.lock().saved_ref_remap.insert(saved, live);
    }

    /// Units of `item` currently in `container`.
    pub fn count_of(&self, container: FormId, item: FormId) -> i32 {
        self.lock()
            .containers
            .get(&container)
            .map(|c| {
                c.inventory
                    .iter()
                    .filter(|e| e.item == item)
                    .map(|e| e.count)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Notifications emitted so far, oldest first.
    pub fn notifications(&self) -> Vec<String> {
        self.lock().notifications.clone()
    }
}

impl Host for MemoryHost {
    fn item(&self, id: FormId) -> Option<ItemForm> {
        self.lock().items.get(&id).cloned()
    }

    fn form_exists(&self, id: FormId) -> bool {
        let world = self.lock();
        id != 0
            && (world.items.contains_key(&id)
                || world.containers.contains_key(&id)
                || world.forms.contains(&id))
    }

    fn lookup_form(&self, local_id: u32, plugin: &str) -> Option<FormId> {
        let id = self.form_id(local_id, plugin)?;
        self.form_exists(id).then_some(id)
    }

    fn lookup_editor_id(&self, editor_id: &str) -> Option<FormId> {
        self.lock()
            .editor_ids
            .get(&editor_id.to_ascii_lowercase())
            .copied()
    }

    fn is_plugin_loaded(&self, plugin: &str) -> bool {
        self.lock()
            .plugins
            .iter()
            .any(|p| p.eq_ignore_ascii_case(plugin.trim()))
    }

    fn loaded_plugins(&self) -> Vec<String> {
        self.lock().plugins.clone()
    }

    fn resolve_saved_ref(&self, saved: FormId) -> Option<FormId> {
        match self.lock().saved_ref_remap.get(&saved) {
            Some(mapped) => *mapped,
            None => Some(saved),
        }
    }

    fn container_name(&self, container: FormId) -> Option<String> {
        self.lock()
            .containers
            .get(&container)
            .map(|c| c.name.clone())
    }

    fn container_location(&self, container: FormId) -> Option<String> {
        self.lock()
            .containers
            .get(&container)
            .map(|c| c.location.clone())
            .filter(|location| !location.is_empty())
    }

    fn inventory(&self, container: FormId) -> Vec<InventoryEntry> {
        self.lock()
            .containers
            .get(&container)
            .map(|c| c.inventory.clone())
            .unwrap_or_default()
    }

    fn move_item(&self, from: FormId, item: FormId, count: i32, to: FormId) -> i32 {
        if count <= 0 || from == to {
            return 0;
        }
        let mut world = self.lock();
        if !world.containers.contains_key(&to) {
            return 0;
        }
        let moved = world.take(from, item, count);
        world.put(to, item, moved);
        moved
    }

    fn remove_item(&self, from: FormId, item: FormId, count: i32) -> i32 {
        if count <= 0 {
            return 0;
        }
        self.lock().take(from, item, count)
    }

    fn add_item(&self, to: FormId, item: FormId, count: i32) {
        self.lock().put(to, item, count);
    }

    fn containers_in_current_cell(&self) -> Vec<FormId> {
        self.lock().current_cell.clone()
    }

    fn player_ref(&self) -> FormId {
        self.lock().player
    }

    fn game_hours(&self) -> f64 {
        self.lock().game_hours
    }

    fn advance_game_hours(&self, hours: f64) {
        self.advance_hours(hours);
    }

    fn player_knows_spell(&self, spell: FormId) -> bool {
        self.lock().known_spells.contains(&spell)
    }

    fn player_knows_enchantment(&self, enchantment: FormId) -> bool {
        self.lock().known_enchantments.contains(&enchantment)
    }

    fn recipes(&self) -> Vec<Recipe> {
        self.lock().recipes.clone()
    }

    fn formlist_members(&self, list: FormId) -> Option<Vec<FormId>> {
        self.lock().formlists.get(&list).cloned()
    }

    fn vendor_data(&self, faction: FormId) -> Option<VendorData> {
        self.lock().vendors.get(&faction).cloned()
    }

    fn notify(&self, message: &str) {
        self.lock().notifications.push(message.to_string());
    }
}
