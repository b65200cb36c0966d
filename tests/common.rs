//! Test utilities & fixtures.
//! Builds a small in-memory world and writes the matching INI files into a temp dir.

use std::sync::Arc;

use stashflow::app::App;
use stashflow::config::ini::ConfigDir;
use stashflow::host::{ArmorSlot, FormId, ItemForm, ItemKind, MemoryHost, WeaponType};

pub const KW_INGOT: FormId = 0x0000_0900;
pub const KW_WOOD: FormId = 0x0000_0901;

pub const IRON: FormId = 0x0005_ACE4;
pub const STEEL: FormId = 0x0005_ACE5;
pub const WOOD: FormId = 0x0006_F993;
pub const SWORD: FormId = 0x0001_2EB7;
pub const HELMET: FormId = 0x0001_2E4D;
pub const POTION: FormId = 0x0003_EADE;
pub const TORCH: FormId = 0x0001_D4EC;

pub const MASTER: FormId = 0x0000_1000;
pub const ORE: FormId = 0x0000_1001;
pub const WEAPONS: FormId = 0x0000_1002;
pub const MISC: FormId = 0x0000_1003;
pub const SELL: FormId = 0x0000_1004;
pub const CELLAR_BARREL: FormId = 0x0000_1005;
pub const CELLAR_CRATE: FormId = 0x0000_1006;

pub const MAIN_INI: &str = "\
[General]
bModEnabled = true

[Sales]
fSellPricePercent = 0.10
iSellBatchSize = 10
fSellIntervalHours = 24

[VendorSales]
fVendorPricePercent = 0.25
iVendorBatchSize = 25
fVendorIntervalHours = 48
iVendorCost = 500

[Filter:ingots]
Display = Ingots
FormType = Misc
RequireTrait = keyword:VendorItemOreIngot

[Filter:materials]
Display = Materials
RequireAnyTrait = keyword:VendorItemOreIngot, keyword:VendorItemWood

[Filter:wood]
RequireTrait = keyword:VendorItemWood

[Filter:weapons]
Display = Weapons
FormType = Weapon

[Filter:swords]
Parent = weapons
RequireTrait = weapon_type:sword

[Filter:armor]
FormType = Armor

[Filter:potions]
FormType = Potion
DefaultExclude = true

[Filter:retired]
Enabled = false
FormType = Misc
";

pub const PRESETS_INI: &str = "\
[Preset:Home]
Master = Skyrim.esm|0x1000
CatchAll = Skyrim.esm|0x1003

[Preset:Home:Filters]
ingots = Skyrim.esm|0x1001
weapons = Skyrim.esm|0x1002
potions = Pass

[Preset:Home:Whoosh]
ingots = true
weapons = true

[Preset:Modded]
RequirePlugin = Missing.esp
Master = Skyrim.esm|0x1000

[ContainerList:Cellar]

[ContainerList:Cellar:Containers]
Skyrim.esm|0x1005 = Cellar Barrel
Skyrim.esm|0x1006 = Cellar Crate
";

fn item(id: FormId, name: &str, kind: ItemKind, value: i32) -> ItemForm {
    ItemForm {
        id,
        name: name.to_string(),
        kind,
        value,
        playable: true,
        ..Default::default()
    }
}

/// World with the fixture items, keywords and containers; inventories are empty.
pub fn world() -> Arc<MemoryHost> {
    let host = MemoryHost::new();
    host.set_editor_id("VendorItemOreIngot", KW_INGOT);
    host.set_editor_id("VendorItemWood", KW_WOOD);

    let mut iron = item(IRON, "Iron Ingot", ItemKind::Misc, 7);
    iron.keywords = vec![KW_INGOT];
    host.insert_item(iron);
    let mut steel = item(STEEL, "Steel Ingot", ItemKind::Misc, 30);
    steel.keywords = vec![KW_INGOT];
    host.insert_item(steel);
    let mut wood = item(WOOD, "Firewood", ItemKind::Misc, 5);
    wood.keywords = vec![KW_WOOD];
    host.insert_item(wood);
    let mut sword = item(SWORD, "Iron Sword", ItemKind::Weapon, 25);
    sword.weapon_type = Some(WeaponType::Sword);
    host.insert_item(sword);
    let mut helmet = item(HELMET, "Iron Helmet", ItemKind::Armor, 60);
    helmet.armor_slots = vec![ArmorSlot::Head];
    host.insert_item(helmet);
    host.insert_item(item(POTION, "Potion of Healing", ItemKind::Potion, 36));
    host.insert_item(item(TORCH, "Torch", ItemKind::Light, 2));

    host.insert_container(MASTER, "Master Chest", "Breezehome");
    host.insert_container(ORE, "Ore Barrel", "Breezehome");
    host.insert_container(WEAPONS, "Weapon Rack", "Breezehome");
    host.insert_container(MISC, "Misc Chest", "Breezehome");
    host.insert_container(SELL, "Sell Chest", "Breezehome");
    host.insert_container(CELLAR_BARREL, "Barrel", "Cellar");
    host.insert_container(CELLAR_CRATE, "Crate", "Cellar");
    Arc::new(host)
}

/// Temp config directory holding the main INI and the preset fragment.
pub fn config_dir() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("StashFlow.ini"), MAIN_INI).unwrap();
    std::fs::write(tmp.path().join("StashFlow_Presets.ini"), PRESETS_INI).unwrap();
    tmp
}

/// Loaded app over a fresh world. Keep the returned dir alive for the app's lifetime.
#[allow(dead_code)]
pub fn app() -> (tempfile::TempDir, Arc<MemoryHost>, App) {
    let dir = config_dir();
    let host = world();
    let app = App::load(&ConfigDir::new(dir.path()), host.clone());
    (dir, host, app)
}
