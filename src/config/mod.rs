//! # Configuration
//!
//! Typed view over the merged INI configuration plus the identifier pools it declares.
//!
//! ## Sections
//!
//! - `[General]` - `bModEnabled`, `bDebugLogging`, `bShownWelcomeTutorial`
//! - `[Powers]` - `bSummonEnabled`
//! - `[Containers]` - `sGenericContainerNames`
//! - `[Categories]` - keyword constants as `Name = Plugin|0xID`
//! - `[Sales]` / `[VendorSales]` - sell rates, batch sizes and intervals
//! - `[ContainerPicker]` - `bIncludeUnlinkedContainers`
//! - `[Compatibility]` - external plugin toggles
//! - `[UniqueItems]`, `[Pool:Name]` - identifier pools
//! - `[DisplayNames]` - filter display overrides
//! - `[Network:Name]`, `[SellContainer]`, `[TaggedContainers]` - new-game seeds
//!
//! Filter, preset and container-list sections are read by their own modules.
//!
//! ```rust,no_run
//! use stashflow::config::{ini::ConfigDir, Settings};
//!
//! let dir = ConfigDir::new("Data/SKSE/Plugins");
//! let settings = Settings::from_document(&dir.merged());
//! println!("selling every {}h", settings.sales.interval_hours);
//! ```

pub mod ini;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use log::{debug, warn};
use serde::Serialize;

use crate::host::{FormId, Host};
use ini::{parse_bool, IniDocument, IniSection};

/// Name of the canonical identifier pool.
pub const UNIQUE_ITEMS_POOL: &str = "unique_items";

/// Plugin-relative form reference as written in configuration: `Plugin|0xLocalID`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FormSpec {
    pub plugin: String,
    pub local_id: u32,
}

impl FormSpec {
    /// Parse `Plugin|0xID` (the `0x` is optional, the id is always hex).
    pub fn parse(text: &str) -> Option<Self> {
        let (plugin, id) = text.split_once('|')?;
        let plugin = plugin.trim();
        if plugin.is_empty() {
            return None;
        }
        let local_id = parse_hex(id)?;
        Some(Self {
            plugin: plugin.to_string(),
            local_id,
        })
    }

    /// Resolve to a live handle through the host.
    pub fn resolve(&self, host: &dyn Host) -> Option<FormId> {
        host.lookup_form(self.local_id, &self.plugin)
    }
}

impl fmt::Display for FormSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|0x{:X}", self.plugin, self.local_id)
    }
}

/// Parse a hex id with or without `0x`.
pub fn parse_hex(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16).ok()
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneralSettings {
    pub mod_enabled: bool,
    pub debug_logging: bool,
    pub shown_welcome_tutorial: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            mod_enabled: true,
            debug_logging: false,
            shown_welcome_tutorial: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PowersSettings {
    pub summon_enabled: bool,
}

impl Default for PowersSettings {
    fn default() -> Self {
        Self {
            summon_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContainerSettings {
    /// Names of clutter containers dropped from cell scans.
    pub generic_container_names: Vec<String>,
}

impl ContainerSettings {
    pub fn is_generic(&self, name: &str) -> bool {
        self.generic_container_names
            .iter()
            .any(|generic| generic.eq_ignore_ascii_case(name.trim()))
    }
}

/// Generic sell cycle tuning.
#[derive(Debug, Clone, Serialize)]
pub struct SalesSettings {
    /// Fraction of base value paid per unit.
    pub price_percent: f32,
    /// Maximum units sold per cycle.
    pub batch_size: i32,
    pub interval_hours: f64,
}

impl Default for SalesSettings {
    fn default() -> Self {
        Self {
            price_percent: 0.10,
            batch_size: 10,
            interval_hours: 24.0,
        }
    }
}

/// Registered-vendor sell cycle tuning.
#[derive(Debug, Clone, Serialize)]
pub struct VendorSalesSettings {
    pub price_percent: f32,
    pub batch_size: i32,
    pub interval_hours: f64,
    /// Gold charged to invest in a vendor.
    pub vendor_cost: i32,
}

impl Default for VendorSalesSettings {
    fn default() -> Self {
        Self {
            price_percent: 0.25,
            batch_size: 25,
            interval_hours: 48.0,
            vendor_cost: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PickerSettings {
    pub include_unlinked_containers: bool,
}

/// Display metadata override for a filter id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayName {
    pub display: String,
    pub description: String,
}

/// `[UniqueItems]` entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniqueItemSpec {
    pub form: FormSpec,
    /// Filter id naming the subset this item also belongs to.
    pub group: Option<String>,
}

/// Parsed configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Settings {
    pub general: GeneralSettings,
    pub powers: PowersSettings,
    pub containers: ContainerSettings,
    pub categories: BTreeMap<String, FormSpec>,
    pub sales: SalesSettings,
    pub vendor_sales: VendorSalesSettings,
    pub picker: PickerSettings,
    pub compatibility: BTreeMap<String, bool>,
    pub unique_items: Vec<UniqueItemSpec>,
    /// Extra `[Pool:Name]` pools, keyed by lowercase name.
    pub pools: BTreeMap<String, Vec<FormSpec>>,
    pub display_names: BTreeMap<String, DisplayName>,
    pub seed_networks: Vec<(String, FormSpec)>,
    pub seed_sell_container: Option<FormSpec>,
    pub seed_tags: Vec<(FormSpec, String)>,
}

impl Settings {
    /// Build settings from a merged document. Malformed values are logged and defaulted.
    pub fn from_document(doc: &IniDocument) -> Self {
        let mut settings = Settings::default();

        if let Some(section) = doc.section("General") {
            read_bool(section, "bModEnabled", &mut settings.general.mod_enabled);
            read_bool(section, "bDebugLogging", &mut settings.general.debug_logging);
            read_bool(
                section,
                "bShownWelcomeTutorial",
                &mut settings.general.shown_welcome_tutorial,
            );
        }
        if let Some(section) = doc.section("Powers") {
            read_bool(section, "bSummonEnabled", &mut settings.powers.summon_enabled);
        }
        if let Some(section) = doc.section("Containers") {
            settings.containers.generic_container_names = section.get_list("sGenericContainerNames");
        }
        if let Some(section) = doc.section("Categories") {
            for (key, value) in section.entries() {
                match FormSpec::parse(value) {
                    Some(spec) => {
                        settings.categories.insert(key.clone(), spec);
                    }
                    None => warn!("[Categories] {}: cannot parse '{}'", key, value),
                }
            }
        }
        if let Some(section) = doc.section("Sales") {
            read_f32(section, "fSellPricePercent", &mut settings.sales.price_percent);
            read_i32(section, "iSellBatchSize", &mut settings.sales.batch_size);
            read_f64(section, "fSellIntervalHours", &mut settings.sales.interval_hours);
        }
        if let Some(section) = doc.section("VendorSales") {
            let vendor = &mut settings.vendor_sales;
            read_f32(section, "fVendorPricePercent", &mut vendor.price_percent);
            read_f32(section, "fSellPricePercent", &mut vendor.price_percent);
            read_i32(section, "iVendorBatchSize", &mut vendor.batch_size);
            read_i32(section, "iSellBatchSize", &mut vendor.batch_size);
            read_f64(section, "fVendorIntervalHours", &mut vendor.interval_hours);
            read_f64(section, "fSellIntervalHours", &mut vendor.interval_hours);
            read_i32(section, "iVendorCost", &mut vendor.vendor_cost);
        }
        if let Some(section) = doc.section("ContainerPicker") {
            read_bool(
                section,
                "bIncludeUnlinkedContainers",
                &mut settings.picker.include_unlinked_containers,
            );
        }
        if let Some(section) = doc.section("Compatibility") {
            for (key, value) in section.entries() {
                match parse_bool(value) {
                    Some(flag) => {
                        settings.compatibility.insert(key.clone(), flag);
                    }
                    None => warn!("[Compatibility] {}: expected boolean, got '{}'", key, value),
                }
            }
        }
        if let Some(section) = doc.section("UniqueItems") {
            settings.unique_items = parse_unique_items(section);
        }
        for (name, section) in doc.sections_with_prefix("Pool:") {
            let specs = enabled_keys(section)
                .filter_map(|key| {
                    let spec = FormSpec::parse(key);
                    if spec.is_none() {
                        warn!("[Pool:{}] cannot parse '{}'", name, key);
                    }
                    spec
                })
                .collect();
            settings.pools.insert(name.trim().to_ascii_lowercase(), specs);
        }
        if let Some(section) = doc.section("DisplayNames") {
            for key in enabled_keys(section) {
                let mut parts = key.splitn(3, '|');
                let id = parts.next().unwrap_or_default().trim();
                let display = parts.next().unwrap_or_default().trim();
                let description = parts.next().unwrap_or_default().trim();
                if id.is_empty() || display.is_empty() {
                    warn!("[DisplayNames] ignoring '{}'", key);
                    continue;
                }
                settings.display_names.insert(
                    id.to_string(),
                    DisplayName {
                        display: display.to_string(),
                        description: description.to_string(),
                    },
                );
            }
        }
        for (name, section) in doc.sections_with_prefix("Network:") {
            match section.get("Master").and_then(FormSpec::parse) {
                Some(master) => settings
                    .seed_networks
                    .push((name.trim().to_string(), master)),
                None => warn!("[Network:{}] missing or malformed Master", name),
            }
        }
        if let Some(section) = doc.section("SellContainer") {
            settings.seed_sell_container = enabled_keys(section).find_map(FormSpec::parse);
        }
        if let Some(section) = doc.section("TaggedContainers") {
            for key in enabled_keys(section) {
                let mut parts = key.splitn(3, '|');
                let plugin = parts.next().unwrap_or_default();
                let id = parts.next().unwrap_or_default();
                let display = parts.next().unwrap_or_default().trim();
                match FormSpec::parse(&format!("{plugin}|{id}")) {
                    Some(spec) if !display.is_empty() => {
                        settings.seed_tags.push((spec, display.to_string()))
                    }
                    _ => warn!("[TaggedContainers] ignoring '{}'", key),
                }
            }
        }

        debug!(
            "settings loaded: {} unique items, {} extra pools, {} display overrides",
            settings.unique_items.len(),
            settings.pools.len(),
            settings.display_names.len()
        );
        settings
    }

    /// Default log level implied by `bDebugLogging`.
    pub fn log_level(&self) -> log::LevelFilter {
        if self.general.debug_logging {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }

    pub fn compatibility_enabled(&self, name: &str) -> bool {
        self.compatibility
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, enabled)| *enabled)
            .unwrap_or(false)
    }
}

/// Resolved identifier pools. Populated once per load and never mutated.
#[derive(Debug, Clone, Default)]
pub struct Pools {
    pools: HashMap<String, HashSet<FormId>>,
    groups: HashMap<String, HashSet<FormId>>,
}

impl Pools {
    /// Resolve every configured pool through the host; unresolvable entries are skipped.
    pub fn resolve(settings: &Settings, host: &dyn Host) -> Self {
        let mut pools = Pools::default();
        let mut unique = HashSet::new();
        let mut missing = 0usize;
        for entry in &settings.unique_items {
            let Some(id) = entry.form.resolve(host) else {
                missing += 1;
                continue;
            };
            unique.insert(id);
            if let Some(group) = &entry.group {
                pools
                    .groups
                    .entry(group.to_ascii_lowercase())
                    .or_default()
                    .insert(id);
            }
        }
        pools.pools.insert(UNIQUE_ITEMS_POOL.to_string(), unique);

        for (name, specs) in &settings.pools {
            let set: HashSet<FormId> = specs.iter().filter_map(|s| s.resolve(host)).collect();
            missing += specs.len() - set.len();
            pools.pools.entry(name.clone()).or_default().extend(set);
        }
        if missing > 0 {
            debug!("{} pool entries did not resolve (plugins not loaded?)", missing);
        }
        pools
    }

    pub fn in_pool(&self, pool: &str, id: FormId) -> bool {
        self.pools
            .get(&pool.to_ascii_lowercase())
            .map(|set| set.contains(&id))
            .unwrap_or(false)
    }

    pub fn in_group(&self, group: &str, id: FormId) -> bool {
        self.groups
            .get(&group.to_ascii_lowercase())
            .map(|set| set.contains(&id))
            .unwrap_or(false)
    }

    pub fn pool_len(&self, pool: &str) -> usize {
        self.pools
            .get(&pool.to_ascii_lowercase())
            .map(HashSet::len)
            .unwrap_or(0)
    }
}

fn parse_unique_items(section: &IniSection) -> Vec<UniqueItemSpec> {
    enabled_keys(section)
        .filter_map(|key| {
            let mut parts = key.splitn(3, '|');
            let plugin = parts.next()?;
            let id = parts.next()?;
            let group = parts
                .next()
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty());
            match FormSpec::parse(&format!("{plugin}|{id}")) {
                Some(form) => Some(UniqueItemSpec { form, group }),
                None => {
                    warn!("[UniqueItems] cannot parse '{}'", key);
                    None
                }
            }
        })
        .collect()
}

/// Keys whose value is a true boolean (`Key = True` style sections).
fn enabled_keys(section: &IniSection) -> impl Iterator<Item = &str> {
    section
        .entries()
        .iter()
        .filter(|(_, value)| parse_bool(value).unwrap_or(false))
        .map(|(key, _)| key.as_str())
}

fn read_bool(section: &IniSection, key: &str, target: &mut bool) {
    if let Some(raw) = section.get(key) {
        match parse_bool(raw) {
            Some(value) => *target = value,
            None => warn!("[{}] {}: expected boolean, got '{}'", section.name(), key, raw),
        }
    }
}

fn read_f32(section: &IniSection, key: &str, target: &mut f32) {
    if let Some(raw) = section.get(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("[{}] {}: expected number, got '{}'", section.name(), key, raw),
        }
    }
}

fn read_f64(section: &IniSection, key: &str, target: &mut f64) {
    if let Some(raw) = section.get(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("[{}] {}: expected number, got '{}'", section.name(), key, raw),
        }
    }
}

fn read_i32(section: &IniSection, key: &str, target: &mut i32) {
    if let Some(raw) = section.get(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("[{}] {}: expected integer, got '{}'", section.name(), key, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    #[test]
    fn form_spec_parses_with_and_without_prefix() {
        let spec = FormSpec::parse("Skyrim.esm|0x0001A2B").unwrap();
        assert_eq!(spec.plugin, "Skyrim.esm");
        assert_eq!(spec.local_id, 0x1A2B);
        assert_eq!(FormSpec::parse("Dawnguard.esm|ff").unwrap().local_id, 0xFF);
        assert!(FormSpec::parse("NoPipe").is_none());
        assert!(FormSpec::parse("|0x10").is_none());
        assert_eq!(spec.to_string(), "Skyrim.esm|0x1A2B");
    }

    #[test]
    fn reads_typed_sections_with_defaults() {
        let doc = IniDocument::parse(
            "[General]\nbDebugLogging = true\n[Sales]\nfSellPricePercent = 0.2\niSellBatchSize = oops\n\
             [VendorSales]\niVendorCost = 1200\n[Containers]\nsGenericContainerNames = Barrel, Sack\n\
             [UniqueItems]\nSkyrim.esm|0x100|daedric_artifacts = True\nSkyrim.esm|0x200 = False\n\
             [DisplayNames]\nore|Ores & Ingots|Smelting inputs = True\n\
             [TaggedContainers]\nSkyrim.esm|0x800|Ore Chest = true\n[Network:Home]\nMaster = Skyrim.esm|0x900\n",
        );
        let settings = Settings::from_document(&doc);
        assert!(settings.general.mod_enabled);
        assert!(settings.general.debug_logging);
        assert_eq!(settings.sales.price_percent, 0.2);
        assert_eq!(settings.sales.batch_size, 10);
        assert_eq!(settings.vendor_sales.vendor_cost, 1200);
        assert!(settings.containers.is_generic("barrel"));
        assert_eq!(settings.unique_items.len(), 1);
        assert_eq!(
            settings.unique_items[0].group.as_deref(),
            Some("daedric_artifacts")
        );
        assert_eq!(settings.display_names["ore"].display, "Ores & Ingots");
        assert_eq!(settings.seed_tags[0].1, "Ore Chest");
        assert_eq!(settings.seed_networks[0].0, "Home");
    }

    #[test]
    fn pools_resolve_through_host() {
        let host = MemoryHost::new();
        host.insert_form(0x100);
        let doc = IniDocument::parse(
            "[UniqueItems]\nSkyrim.esm|0x100|artifacts = True\nMissing.esp|0x5 = True\n\
             [Pool:Gems]\nSkyrim.esm|0x100 = True\n",
        );
        let pools = Pools::resolve(&Settings::from_document(&doc), &host);
        assert!(pools.in_pool(UNIQUE_ITEMS_POOL, 0x100));
        assert!(pools.in_pool("gems", 0x100));
        assert!(pools.in_group("Artifacts", 0x100));
        assert_eq!(pools.pool_len(UNIQUE_ITEMS_POOL), 1);
    }
}
