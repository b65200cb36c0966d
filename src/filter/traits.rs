//! Trait expressions and the evaluator that answers them.
//!
//! A trait is either prefixed (`prefix:suffix`) or a whole name. Strings are compiled once into
//! [`TraitExpr`] when filters are built; the [`TraitEvaluator`] owns every lookup cache:
//!
//! - keyword handles by editor id (well-known keywords pre-resolved at init)
//! - crafting recipes bucketed by bench keyword, built on first use
//! - form lists by `(editor id, plugin)`, including negative entries for absent plugins
//! - the set of unknown trait names already warned about

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use log::{debug, warn};

use crate::config::{parse_hex, Pools, Settings};
use crate::host::{ArmorSlot, ArmorWeight, FormId, Host, ItemForm, ItemKind, WeaponType};

/// Keywords resolved eagerly at init.
pub const WELL_KNOWN_KEYWORDS: &[&str] = &[
    "VendorItemOreIngot",
    "VendorItemGem",
    "VendorItemAnimalHide",
    "VendorItemAnimalPart",
    "VendorItemFood",
    "VendorItemFoodRaw",
    "VendorItemFirewood",
    "VendorItemClutter",
    "VendorItemJewelry",
    "CraftingSmelter",
    "CraftingTanningRack",
    "CraftingSmithingForge",
    "CraftingSmithingSkyforge",
    "CraftingSmithingArmorTable",
    "CraftingSmithingSharpeningWheel",
    "CraftingCookpot",
    "BYOHCraftingOven",
    "BYOHHouseCraftingCategorySmithing",
];

/// Whole-name traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedTrait {
    IsFood,
    IsPoison,
    HasEnchantment,
    HasSpell,
    TeachesSkill,
    IsNote,
    UnreadBook,
    UnlearnedSpell,
    UnknownEnchantment,
}

impl NamedTrait {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "is_food" => Some(NamedTrait::IsFood),
            "is_poison" => Some(NamedTrait::IsPoison),
            "has_enchantment" => Some(NamedTrait::HasEnchantment),
            "has_spell" => Some(NamedTrait::HasSpell),
            "teaches_skill" => Some(NamedTrait::TeachesSkill),
            "is_note" => Some(NamedTrait::IsNote),
            "unread_book" => Some(NamedTrait::UnreadBook),
            "unlearned_spell" => Some(NamedTrait::UnlearnedSpell),
            "unknown_enchantment" => Some(NamedTrait::UnknownEnchantment),
            _ => None,
        }
    }
}

/// Compiled trait.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TraitExpr {
    FormType(ItemKind),
    Keyword(String),
    WeaponType(WeaponType),
    Slot(ArmorSlot),
    ArmorWeight(ArmorWeight),
    CobjOutput(String),
    CobjInput(String),
    InPool(String),
    InGroup(String),
    FormList { list: String, plugin: String },
    Named(NamedTrait),
    /// Never matches; the original text is kept for the warning.
    Unknown(String),
}

impl TraitExpr {
    /// Compile one trait string. Anything unrecognised becomes [`TraitExpr::Unknown`].
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let lower = text.to_ascii_lowercase();
        let Some((prefix, suffix)) = lower.split_once(':') else {
            return match NamedTrait::from_name(&lower) {
                Some(named) => TraitExpr::Named(named),
                None => TraitExpr::Unknown(text.to_string()),
            };
        };
        let suffix = suffix.trim();
        // Keep the original casing of the suffix for editor-id lookups.
        let raw_suffix = text[prefix.len() + 1..].trim();
        let parsed = match prefix.trim() {
            "formtype" => ItemKind::from_name(suffix).map(TraitExpr::FormType),
            "keyword" => Some(TraitExpr::Keyword(raw_suffix.to_string())),
            "weapon_type" => WeaponType::from_name(suffix).map(TraitExpr::WeaponType),
            "slot" => ArmorSlot::from_name(suffix).map(TraitExpr::Slot),
            "armor_weight" => ArmorWeight::from_name(suffix).map(TraitExpr::ArmorWeight),
            "cobj_output" => Some(TraitExpr::CobjOutput(raw_suffix.to_string())),
            "cobj_input" => Some(TraitExpr::CobjInput(raw_suffix.to_string())),
            "in_pool" => Some(TraitExpr::InPool(suffix.to_string())),
            "in_group" => Some(TraitExpr::InGroup(suffix.to_string())),
            "formlist" => raw_suffix.split_once('@').map(|(list, plugin)| TraitExpr::FormList {
                list: list.trim().to_string(),
                plugin: plugin.trim().to_string(),
            }),
            _ => None,
        };
        match parsed {
            Some(TraitExpr::Keyword(s) | TraitExpr::CobjOutput(s) | TraitExpr::CobjInput(s))
                if s.is_empty() =>
            {
                TraitExpr::Unknown(text.to_string())
            }
            Some(expr) => expr,
            None => TraitExpr::Unknown(text.to_string()),
        }
    }

    /// Compile every item of an already split list.
    pub fn parse_list(items: &[String]) -> Vec<Self> {
        items.iter().map(|item| TraitExpr::parse(item)).collect()
    }
}

#[derive(Debug, Default)]
struct RecipeIndex {
    outputs: HashMap<FormId, HashSet<FormId>>,
    inputs: HashMap<FormId, HashSet<FormId>>,
}

type FormListKey = (String, String);

/// Answers trait expressions for items.
#[derive(Debug, Default)]
pub struct TraitEvaluator {
    pools: Pools,
    keywords: Mutex<HashMap<String, Option<FormId>>>,
    recipes: OnceLock<RecipeIndex>,
    formlists: Mutex<HashMap<FormListKey, Option<HashSet<FormId>>>>,
    warned: Mutex<HashSet<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TraitEvaluator {
    /// Resolve pools and well-known keywords. Call after settings are loaded.
    pub fn init(settings: &Settings, host: &dyn Host) -> Self {
        let evaluator = TraitEvaluator {
            pools: Pools::resolve(settings, host),
            ..Default::default()
        };

        let mut names: Vec<&str> = WELL_KNOWN_KEYWORDS.to_vec();
        names.extend(settings.categories.keys().map(String::as_str));
        let mut resolved = 0usize;
        {
            let mut cache = lock(&evaluator.keywords);
            for name in names {
                let id = host.lookup_editor_id(name).or_else(|| {
                    settings
                        .categories
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(name))
                        .and_then(|(_, spec)| spec.resolve(host))
                });
                if id.is_some() {
                    resolved += 1;
                }
                cache.insert(name.to_ascii_lowercase(), id);
            }
        }
        debug!("trait evaluator ready: {} keywords pre-resolved", resolved);
        evaluator
    }

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    /// Keyword handle for an editor id, cached (misses included).
    pub fn keyword(&self, editor_id: &str, host: &dyn Host) -> Option<FormId> {
        let key = editor_id.to_ascii_lowercase();
        if let Some(cached) = lock(&self.keywords).get(&key) {
            return *cached;
        }
        let id = host.lookup_editor_id(editor_id);
        lock(&self.keywords).insert(key, id);
        id
    }

    /// Evaluate one trait against an item.
    pub fn evaluate(&self, expr: &TraitExpr, item: &ItemForm, host: &dyn Host) -> bool {
        match expr {
            TraitExpr::FormType(kind) => item.kind == *kind,
            TraitExpr::Keyword(name) => self
                .keyword(name, host)
                .map(|kw| item.has_keyword(kw))
                .unwrap_or(false),
            TraitExpr::WeaponType(wt) => {
                item.kind == ItemKind::Weapon && item.weapon_type == Some(*wt)
            }
            TraitExpr::Slot(slot) => item.kind == ItemKind::Armor && item.armor_slots.contains(slot),
            TraitExpr::ArmorWeight(weight) => {
                item.kind == ItemKind::Armor && item.armor_weight == Some(*weight)
            }
            TraitExpr::CobjOutput(bench) => self.in_recipe_bucket(bench, item.id, host, true),
            TraitExpr::CobjInput(bench) => self.in_recipe_bucket(bench, item.id, host, false),
            TraitExpr::InPool(pool) => self.pools.in_pool(pool, item.id),
            TraitExpr::InGroup(group) => self.pools.in_group(group, item.id),
            TraitExpr::FormList { list, plugin } => self.in_formlist(list, plugin, item.id, host),
            TraitExpr::Named(named) => evaluate_named(*named, item, host),
            TraitExpr::Unknown(name) => {
                self.warn_unknown(name);
                false
            }
        }
    }

    /// Names of unknown traits reported so far.
    pub fn warned_unknown(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.warned).iter().cloned().collect();
        names.sort();
        names
    }

    fn warn_unknown(&self, name: &str) {
        if lock(&self.warned).insert(name.to_ascii_lowercase()) {
            warn!("unknown trait '{}' never matches", name);
        }
    }

    fn in_recipe_bucket(&self, bench: &str, item: FormId, host: &dyn Host, outputs: bool) -> bool {
        let Some(bench) = self.keyword(bench, host) else {
            return false;
        };
        let index = self.recipes.get_or_init(|| build_recipe_index(host));
        let buckets = if outputs { &index.outputs } else { &index.inputs };
        buckets
            .get(&bench)
            .map(|set| set.contains(&item))
            .unwrap_or(false)
    }

    fn in_formlist(&self, list: &str, plugin: &str, item: FormId, host: &dyn Host) -> bool {
        let key = (list.to_ascii_lowercase(), plugin.to_ascii_lowercase());
        if let Some(cached) = lock(&self.formlists).get(&key) {
            return cached.as_ref().map(|set| set.contains(&item)).unwrap_or(false);
        }
        let members = resolve_formlist(list, plugin, host);
        let hit = members
            .as_ref()
            .map(|set| set.contains(&item))
            .unwrap_or(false);
        lock(&self.formlists).insert(key, members);
        hit
    }
}

fn resolve_formlist(list: &str, plugin: &str, host: &dyn Host) -> Option<HashSet<FormId>> {
    if !host.is_plugin_loaded(plugin) {
        debug!("formlist {}@{}: plugin not loaded", list, plugin);
        return None;
    }
    let id = if list.starts_with("0x") || list.starts_with("0X") {
        parse_hex(list).and_then(|local| host.lookup_form(local, plugin))
    } else {
        host.lookup_editor_id(list)
    };
    let members = id.and_then(|id| host.formlist_members(id));
    if members.is_none() {
        warn!("formlist {}@{} does not resolve", list, plugin);
    }
    members.map(|m| m.into_iter().collect())
}

fn build_recipe_index(host: &dyn Host) -> RecipeIndex {
    let mut index = RecipeIndex::default();
    let recipes = host.recipes();
    for recipe in &recipes {
        let Some(bench) = recipe.bench else {
            continue;
        };
        index.outputs.entry(bench).or_default().insert(recipe.output);
        index
            .inputs
            .entry(bench)
            .or_default()
            .extend(recipe.inputs.iter().copied());
    }
    debug!(
        "indexed {} recipes across {} benches",
        recipes.len(),
        index.outputs.len()
    );
    index
}

fn evaluate_named(named: NamedTrait, item: &ItemForm, host: &dyn Host) -> bool {
    let enchantable = matches!(item.kind, ItemKind::Weapon | ItemKind::Armor);
    match named {
        NamedTrait::IsFood => item.kind == ItemKind::Potion && item.is_food,
        NamedTrait::IsPoison => item.kind == ItemKind::Potion && item.is_poison,
        NamedTrait::HasEnchantment => enchantable && item.enchantment.is_some(),
        NamedTrait::HasSpell => {
            matches!(item.kind, ItemKind::Book | ItemKind::Scroll) && item.spell.is_some()
        }
        NamedTrait::TeachesSkill => item.kind == ItemKind::Book && item.teaches_skill,
        NamedTrait::IsNote => item.kind == ItemKind::Book && item.is_note,
        NamedTrait::UnreadBook => item.kind == ItemKind::Book && !item.is_read,
        NamedTrait::UnlearnedSpell => {
            item.kind == ItemKind::Book
                && item
                    .spell
                    .map(|spell| !host.player_knows_spell(spell))
                    .unwrap_or(false)
        }
        NamedTrait::UnknownEnchantment => {
            enchantable
                && item
                    .enchantment
                    .map(|ench| !host.player_knows_enchantment(ench))
                    .unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryHost, Recipe};

    fn item(id: FormId, kind: ItemKind) -> ItemForm {
        ItemForm {
            id,
            name: format!("item {id:X}"),
            kind,
            playable: true,
            ..Default::default()
        }
    }

    #[test]
    fn parses_prefixed_and_named_traits() {
        assert_eq!(
            TraitExpr::parse("formtype:Weapon"),
            TraitExpr::FormType(ItemKind::Weapon)
        );
        assert_eq!(
            TraitExpr::parse("keyword:VendorItemGem"),
            TraitExpr::Keyword("VendorItemGem".to_string())
        );
        assert_eq!(
            TraitExpr::parse("formlist:LItemGems@Skyrim.esm"),
            TraitExpr::FormList {
                list: "LItemGems".to_string(),
                plugin: "Skyrim.esm".to_string()
            }
        );
        assert_eq!(
            TraitExpr::parse("Unread_Book"),
            TraitExpr::Named(NamedTrait::UnreadBook)
        );
        assert_eq!(
            TraitExpr::parse("formtype:Spaceship"),
            TraitExpr::Unknown("formtype:Spaceship".to_string())
        );
        assert_eq!(
            TraitExpr::parse("keyword:"),
            TraitExpr::Unknown("keyword:".to_string())
        );
    }

    #[test]
    fn unknown_traits_warn_once_and_never_match() {
        let host = MemoryHost::new();
        let evaluator = TraitEvaluator::init(&Settings::default(), &host);
        let expr = TraitExpr::parse("glows_in_dark");
        let thing = item(1, ItemKind::Misc);
        assert!(!evaluator.evaluate(&expr, &thing, &host));
        assert!(!evaluator.evaluate(&expr, &thing, &host));
        assert_eq!(evaluator.warned_unknown(), vec!["glows_in_dark".to_string()]);
    }

    #[test]
    fn keyword_falls_back_to_categories() {
        let host = MemoryHost::new();
        host.insert_form(0x914E9);
        let doc = crate::config::ini::IniDocument::parse(
            "[Categories]\nVendorItemOreIngot = Skyrim.esm|0x914E9\n",
        );
        let evaluator = TraitEvaluator::init(&Settings::from_document(&doc), &host);
        let mut ingot = item(2, ItemKind::Misc);
        ingot.keywords.push(0x914E9);
        assert!(evaluator.evaluate(
            &TraitExpr::parse("keyword:VendorItemOreIngot"),
            &ingot,
            &host
        ));
    }

    #[test]
    fn recipe_buckets_split_outputs_and_inputs() {
        let host = MemoryHost::new();
        host.set_editor_id("CraftingSmelter", 0xA5CCE);
        host.insert_recipe(Recipe {
            output: 0x5ACE4,
            bench: Some(0xA5CCE),
            inputs: vec![0x71CF3],
        });
        let evaluator = TraitEvaluator::init(&Settings::default(), &host);
        let output = TraitExpr::parse("cobj_output:CraftingSmelter");
        let input = TraitExpr::parse("cobj_input:CraftingSmelter");
        assert!(evaluator.evaluate(&output, &item(0x5ACE4, ItemKind::Misc), &host));
        assert!(!evaluator.evaluate(&input, &item(0x5ACE4, ItemKind::Misc), &host));
        assert!(evaluator.evaluate(&input, &item(0x71CF3, ItemKind::Misc), &host));
    }

    #[test]
    fn formlist_cached_negative_when_plugin_missing() {
        let host = MemoryHost::new();
        let evaluator = TraitEvaluator::init(&Settings::default(), &host);
        let expr = TraitExpr::parse("formlist:Gems@Missing.esp");
        assert!(!evaluator.evaluate(&expr, &item(3, ItemKind::Misc), &host));

        host.set_editor_id("Gems", 0x500);
        host.insert_formlist(0x500, vec![3]);
        let present = TraitExpr::parse("formlist:Gems@Skyrim.esm");
        assert!(evaluator.evaluate(&present, &item(3, ItemKind::Misc), &host));
        assert!(!evaluator.evaluate(&present, &item(4, ItemKind::Misc), &host));
    }

    #[test]
    fn named_traits_check_player_knowledge() {
        let host = MemoryHost::new();
        let evaluator = TraitEvaluator::init(&Settings::default(), &host);
        let mut tome = item(5, ItemKind::Book);
        tome.spell = Some(0x900);
        let unlearned = TraitExpr::Named(NamedTrait::UnlearnedSpell);
        assert!(evaluator.evaluate(&unlearned, &tome, &host));
        host.learn_spell(0x900);
        assert!(!evaluator.evaluate(&unlearned, &tome, &host));

        let mut sword = item(6, ItemKind::Weapon);
        sword.enchantment = Some(0x901);
        assert!(evaluator.evaluate(&TraitExpr::Named(NamedTrait::HasEnchantment), &sword, &host));
        assert!(!evaluator.evaluate(&TraitExpr::Named(NamedTrait::IsFood), &sword, &host));
    }
}
