//! Host-engine facade.
//!
//! The distribution engine never touches the game directly. Everything it needs from the
//! running world (form lookups, container inventories, item moves, the game clock, player
//! knowledge, crafting recipes, form lists and faction vendor data) goes through the
//! [`Host`] trait defined here. A production build implements it on top of the engine
//! bindings; [`MemoryHost`] implements it over plain in-memory tables for tests and the CLI.

pub mod memory;

use serde::{Deserialize, Serialize};

pub use memory::{MemoryHost, WorldFixture};

/// Opaque 32-bit handle assigned by the host world to an object instance.
pub type FormId = u32;

/// Reserved handle meaning "absent" (and "pass" when used as a stage destination).
pub const NO_REF: FormId = 0;

/// Base form of the currency item.
pub const GOLD_FORM: FormId = 0x0000_000F;

/// Base form of lockpicks, never moved by whoosh.
pub const LOCKPICK_FORM: FormId = 0x0000_000A;

/// Closed set of item kinds a filter can restrict on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum ItemKind {
    Weapon,
    Armor,
    Ammo,
    Book,
    Ingredient,
    Potion,
    Scroll,
    #[default]
    Misc,
    SoulGem,
    Key,
    Light,
}

impl ItemKind {
    /// Resolve a kind name as written in configuration files (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "weapon" | "weap" => Some(ItemKind::Weapon),
            "armor" | "armour" | "armo" => Some(ItemKind::Armor),
            "ammo" | "ammunition" => Some(ItemKind::Ammo),
            "book" => Some(ItemKind::Book),
            "ingredient" | "ingr" => Some(ItemKind::Ingredient),
            "potion" | "alchemyitem" | "alch" => Some(ItemKind::Potion),
            "scroll" | "scrl" => Some(ItemKind::Scroll),
            "misc" | "miscitem" => Some(ItemKind::Misc),
            "soulgem" | "slgm" => Some(ItemKind::SoulGem),
            "key" | "keym" => Some(ItemKind::Key),
            "light" | "ligh" => Some(ItemKind::Light),
            _ => None,
        }
    }
}

/// Weapon sub-kinds used by `weapon_type:` traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponType {
    Dagger,
    Sword,
    WarAxe,
    Mace,
    Greatsword,
    Battleaxe,
    Warhammer,
    Bow,
    Crossbow,
    Staff,
}

impl WeaponType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "dagger" => Some(WeaponType::Dagger),
            "sword" | "onehandsword" => Some(WeaponType::Sword),
            "waraxe" | "axe" | "onehandaxe" => Some(WeaponType::WarAxe),
            "mace" | "onehandmace" => Some(WeaponType::Mace),
            "greatsword" | "twohandsword" => Some(WeaponType::Greatsword),
            "battleaxe" | "twohandaxe" => Some(WeaponType::Battleaxe),
            "warhammer" => Some(WeaponType::Warhammer),
            "bow" => Some(WeaponType::Bow),
            "crossbow" => Some(WeaponType::Crossbow),
            "staff" => Some(WeaponType::Staff),
            _ => None,
        }
    }
}

/// Armour slots recognised by `slot:` traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArmorSlot {
    Ring,
    Amulet,
    Circlet,
    Shield,
    Head,
    Body,
    Hands,
    Feet,
}

impl ArmorSlot {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ring" => Some(ArmorSlot::Ring),
            "amulet" => Some(ArmorSlot::Amulet),
            "circlet" => Some(ArmorSlot::Circlet),
            "shield" => Some(ArmorSlot::Shield),
            "head" | "helmet" => Some(ArmorSlot::Head),
            "body" | "cuirass" => Some(ArmorSlot::Body),
            "hands" | "gauntlets" => Some(ArmorSlot::Hands),
            "feet" | "boots" => Some(ArmorSlot::Feet),
            _ => None,
        }
    }
}

/// Armour weight class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArmorWeight {
    Light,
    Heavy,
    Clothing,
}

impl ArmorWeight {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "light" => Some(ArmorWeight::Light),
            "heavy" => Some(ArmorWeight::Heavy),
            "clothing" => Some(ArmorWeight::Clothing),
            _ => None,
        }
    }
}

/// Snapshot of a base item form and the kind-specific attributes traits inspect.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemForm {
    pub id: FormId,
    pub name: String,
    pub kind: ItemKind,
    /// Base gold value of one unit.
    pub value: i32,
    pub playable: bool,
    /// Keyword forms carried by the item.
    pub keywords: Vec<FormId>,
    pub weapon_type: Option<WeaponType>,
    pub armor_slots: Vec<ArmorSlot>,
    pub armor_weight: Option<ArmorWeight>,
    /// Enchantment form for weapons and armour.
    pub enchantment: Option<FormId>,
    /// Spell taught by a book or cast by a scroll.
    pub spell: Option<FormId>,
    pub teaches_skill: bool,
    pub is_note: bool,
    pub is_read: bool,
    pub is_food: bool,
    pub is_poison: bool,
}

impl ItemForm {
    pub fn has_keyword(&self, keyword: FormId) -> bool {
        self.keywords.contains(&keyword)
    }
}

/// One line of a container inventory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryEntry {
    pub item: FormId,
    pub count: i32,
    pub equipped: bool,
    pub favorited: bool,
    pub quest_item: bool,
}

impl InventoryEntry {
    pub fn new(item: FormId, count: i32) -> Self {
        Self {
            item,
            count,
            ..Default::default()
        }
    }
}

/// Crafting recipe as enumerated by the host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    pub output: FormId,
    /// Bench keyword identifying the crafting station kind.
    pub bench: Option<FormId>,
    pub inputs: Vec<FormId>,
}

/// Faction vendor data relevant to selling.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorData {
    /// Keyword buy-list; `None` when the faction has no list.
    pub buy_list: Option<Vec<FormId>>,
    /// Buy everything *not* on the list.
    pub invert: bool,
}

impl VendorData {
    /// Whether a vendor with this data accepts `item`.
    pub fn buys(&self, item: &ItemForm) -> bool {
        match &self.buy_list {
            Some(list) => {
                let listed = list.iter().any(|kw| item.has_keyword(*kw));
                listed != self.invert
            }
            None => self.invert,
        }
    }
}

/// Interface to the running game world.
///
/// Implementations are called on the game thread only. Methods that mutate inventories
/// take `&self`; the host is expected to use its own interior synchronisation.
pub trait Host {
    /// Base item form data, `None` if `id` is not an item.
    fn item(&self, id: FormId) -> Option<ItemForm>;

    /// Whether `id` still resolves to a live form or reference.
    fn form_exists(&self, id: FormId) -> bool;

    /// Resolve a `(local id, plugin)` pair to a live handle.
    fn lookup_form(&self, local_id: u32, plugin: &str) -> Option<FormId>;

    /// Resolve a form by editor id.
    fn lookup_editor_id(&self, editor_id: &str) -> Option<FormId>;

    fn is_plugin_loaded(&self, plugin: &str) -> bool;

    fn loaded_plugins(&self) -> Vec<String>;

    /// Rewrite a handle stored in a save to the live handle, `None` if its plugin is gone.
    fn resolve_saved_ref(&self, saved: FormId) -> Option<FormId>;

    /// Display name of a container reference, `None` if it no longer resolves.
    fn container_name(&self, container: FormId) -> Option<String>;

    /// Cell or location name of a container reference.
    fn container_location(&self, container: FormId) -> Option<String>;

    fn inventory(&self, container: FormId) -> Vec<InventoryEntry>;

    /// Move up to `count` units of `item`; returns the number actually moved.
    fn move_item(&self, from: FormId, item: FormId, count: i32, to: FormId) -> i32;

    /// Destroy up to `count` units of `item`; returns the number removed.
    fn remove_item(&self, from: FormId, item: FormId, count: i32) -> i32;

    fn add_item(&self, to: FormId, item: FormId, count: i32);

    /// Container references attached in the player's current cell.
    fn containers_in_current_cell(&self) -> Vec<FormId>;

    fn player_ref(&self) -> FormId;

    /// Current in-game time in hours since game start.
    fn game_hours(&self) -> f64;

    /// Game seconds per real second.
    fn time_scale(&self) -> f64 {
        20.0
    }

    /// Move the calendar forward; hosts without a writable clock ignore this.
    fn advance_game_hours(&self, _hours: f64) {}

    fn player_knows_spell(&self, spell: FormId) -> bool;

    fn player_knows_enchantment(&self, enchantment: FormId) -> bool;

    fn recipes(&self) -> Vec<Recipe>;

    /// Members of a form list, `None` if `list` is not a form list.
    fn formlist_members(&self, list: FormId) -> Option<Vec<FormId>>;

    fn vendor_data(&self, faction: FormId) -> Option<VendorData>;

    /// Show a short on-screen notification.
    fn notify(&self, message: &str);

    /// Synthetic inventory entries that are not real transferable objects.
    fn is_phantom(&self, item: &ItemForm) -> bool {
        !item.playable || item.name.trim().is_empty()
    }

    /// Sum of playable, non-phantom units in a container.
    fn count_items(&self, container: FormId) -> i64 {
        self.inventory(container)
            .iter()
            .filter(|entry| entry.count > 0)
            .filter(|entry| {
                self.item(entry.item)
                    .map(|item| !self.is_phantom(&item))
                    .unwrap_or(false)
            })
            .map(|entry| entry.count as i64)
            .sum()
    }
}
