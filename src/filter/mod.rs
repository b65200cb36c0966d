//! # Filters
//!
//! Data-driven item matching built from `[Filter:ID]` sections.
//!
//! ```ini
//! [Filter:ore]
//! Display = Ores & Ingots
//! FormType = Misc
//! RequireAnyTrait = keyword:VendorItemOreIngot, cobj_output:CraftingSmelter
//!
//! [Filter:ore_ingots]
//! Parent = ore
//! RequireTrait = keyword:VendorItemOreIngot
//! ```
//!
//! A filter matches when its kind set admits the item, every `RequireTrait` passes, no
//! `ExcludeTrait` passes and (if present) at least one `RequireAnyTrait` passes. `Parent`
//! forms one-level families; family routing tries children before the root.

pub mod traits;

use std::collections::{BTreeSet, HashMap};

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::ini::{ConfigDir, IniDocument, IniSection};
use crate::config::Settings;
use crate::host::{FormId, Host, ItemForm, ItemKind, NO_REF};
pub use traits::{NamedTrait, TraitEvaluator, TraitExpr};

/// Where a family sends an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RouteTarget {
    Container(FormId),
    /// No member matched with a bound, non-inert container.
    None,
}

/// Immutable matching rule.
#[derive(Debug, Clone)]
pub struct Filter {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub parent: Option<String>,
    /// Empty admits every kind.
    pub form_types: BTreeSet<ItemKind>,
    pub require: Vec<TraitExpr>,
    pub exclude: Vec<TraitExpr>,
    pub require_any: Vec<TraitExpr>,
    pub default_exclude_from_whoosh: bool,
    pub require_plugin: Option<String>,
}

impl Filter {
    pub fn matches(&self, item: &ItemForm, evaluator: &TraitEvaluator, host: &dyn Host) -> bool {
        if !self.form_types.is_empty() && !self.form_types.contains(&item.kind) {
            return false;
        }
        if !self.require.iter().all(|t| evaluator.evaluate(t, item, host)) {
            return false;
        }
        if self.exclude.iter().any(|t| evaluator.evaluate(t, item, host)) {
            return false;
        }
        self.require_any.is_empty()
            || self
                .require_any
                .iter()
                .any(|t| evaluator.evaluate(t, item, host))
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Raw `[Filter:ID]` section before gating.
#[derive(Debug, Clone)]
struct FilterDef {
    id: String,
    enabled: bool,
    display: Option<String>,
    description: String,
    parent: Option<String>,
    form_types: Vec<String>,
    require: Vec<String>,
    exclude: Vec<String>,
    require_any: Vec<String>,
    default_exclude: bool,
    require_plugin: Option<String>,
}

impl FilterDef {
    fn from_section(id: &str, section: &IniSection) -> Self {
        let non_empty = |key: &str| {
            section
                .get(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        FilterDef {
            id: id.trim().to_string(),
            enabled: section.get_bool("Enabled").unwrap_or(true),
            display: non_empty("Display"),
            description: non_empty("Description").unwrap_or_default(),
            parent: non_empty("Parent"),
            form_types: section.get_list("FormType"),
            require: section.get_list("RequireTrait"),
            exclude: section.get_list("ExcludeTrait"),
            require_any: section.get_list("RequireAnyTrait"),
            default_exclude: section.get_bool("DefaultExclude").unwrap_or(false),
            require_plugin: non_empty("RequirePlugin"),
        }
    }
}

/// Filter ids compare case-insensitively.
fn index_key(id: &str) -> String {
    id.to_ascii_lowercase()
}

/// Registered filters plus the family index.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    filters: Vec<Filter>,
    index: HashMap<String, usize>,
    roots: Vec<String>,
    children: HashMap<String, Vec<String>>,
}

impl FilterRegistry {
    /// Build from every file in a config directory.
    pub fn load(dir: &ConfigDir, settings: &Settings, host: &dyn Host) -> Self {
        let documents: Vec<IniDocument> = dir.documents().into_iter().map(|(_, doc)| doc).collect();
        Self::from_documents(&documents, settings, host)
    }

    /// Build from parsed documents in load order; a later definition of an id replaces the
    /// earlier one wholesale and keeps its original registration slot.
    pub fn from_documents(documents: &[IniDocument], settings: &Settings, host: &dyn Host) -> Self {
        let mut defs: Vec<FilterDef> = Vec::new();
        for doc in documents {
            for (id, section) in doc.sections_with_prefix("Filter:") {
                let def = FilterDef::from_section(id, section);
                if def.id.is_empty() {
                    continue;
                }
                match defs.iter_mut().find(|d| index_key(&d.id) == index_key(&def.id)) {
                    Some(existing) => {
                        debug!("filter '{}' overridden by a later file", def.id);
                        *existing = def;
                    }
                    None => defs.push(def),
                }
            }
        }

        let mut registry = FilterRegistry::default();
        for def in defs {
            if !def.enabled {
                debug!("filter '{}' disabled", def.id);
                continue;
            }
            if let Some(plugin) = &def.require_plugin {
                if !host.is_plugin_loaded(plugin) {
                    info!("filter '{}' skipped: {} not loaded", def.id, plugin);
                    continue;
                }
            }
            registry.register(build_filter(def, settings));
        }
        registry.link_families();

        if registry.is_empty() {
            error!("no filters loaded; distribution will not match anything");
        } else {
            info!(
                "loaded {} filters ({} families)",
                registry.filters.len(),
                registry.roots.len()
            );
        }
        registry
    }

    fn register(&mut self, filter: Filter) {
        self.index.insert(index_key(&filter.id), self.filters.len());
        self.filters.push(filter);
    }

    /// Single-level families: a parent must exist and must not declare a parent itself.
    /// Root status is taken from the declarations, so the result does not depend on order.
    fn link_families(&mut self) {
        let declared_root: Vec<bool> = self.filters.iter().map(|f| f.parent.is_none()).collect();
        for i in 0..self.filters.len() {
            let Some(parent) = self.filters[i].parent.clone() else {
                continue;
            };
            let valid = self
                .index
                .get(&index_key(&parent))
                .map(|&p| declared_root[p] && p != i)
                .unwrap_or(false);
            if !valid {
                warn!(
                    "filter '{}': parent '{}' missing, disabled or not a root; treating as root",
                    self.filters[i].id, parent
                );
                self.filters[i].parent = None;
            }
        }
        for filter in &self.filters {
            match &filter.parent {
                Some(parent) => self
                    .children
                    .entry(index_key(parent))
                    .or_default()
                    .push(filter.id.clone()),
                None => self.roots.push(filter.id.clone()),
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Filter> {
        self.index.get(&index_key(id)).map(|&i| &self.filters[i])
    }

    /// Filter ids in registration order.
    pub fn order(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.id.clone()).collect()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn children(&self, root: &str) -> &[String] {
        self.children
            .get(&index_key(root))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every id not flagged `DefaultExclude`.
    pub fn default_whoosh_set(&self) -> BTreeSet<String> {
        self.filters
            .iter()
            .filter(|f| !f.default_exclude_from_whoosh)
            .map(|f| f.id.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Match by id; unknown ids never match.
    pub fn matches(
        &self,
        id: &str,
        item: &ItemForm,
        evaluator: &TraitEvaluator,
        host: &dyn Host,
    ) -> bool {
        self.get(id)
            .map(|f| f.matches(item, evaluator, host))
            .unwrap_or(false)
    }

    /// Family dispatch: first matching child with a bound container, then the filter itself.
    pub fn route(
        &self,
        id: &str,
        item: &ItemForm,
        evaluator: &TraitEvaluator,
        host: &dyn Host,
        binding: impl Fn(&str) -> FormId,
    ) -> RouteTarget {
        let Some(filter) = self.get(id) else {
            return RouteTarget::None;
        };
        for child in self.children(id) {
            let bound = binding(child);
            if bound != NO_REF && self.matches(child, item, evaluator, host) {
                return RouteTarget::Container(bound);
            }
        }
        let own = binding(id);
        if own != NO_REF && filter.matches(item, evaluator, host) {
            return RouteTarget::Container(own);
        }
        RouteTarget::None
    }
}

fn build_filter(def: FilterDef, settings: &Settings) -> Filter {
    let mut form_types = BTreeSet::new();
    for name in &def.form_types {
        match ItemKind::from_name(name) {
            Some(kind) => {
                form_types.insert(kind);
            }
            None => warn!("filter '{}': unknown form type '{}' dropped", def.id, name),
        }
    }
    let override_name = settings.display_names.get(&def.id);
    let display_name = override_name
        .map(|d| d.display.clone())
        .or(def.display)
        .unwrap_or_else(|| def.id.clone());
    let description = override_name
        .map(|d| d.description.clone())
        .filter(|d| !d.is_empty())
        .unwrap_or(def.description);

    Filter {
        display_name,
        description,
        parent: def.parent,
        form_types,
        require: TraitExpr::parse_list(&def.require),
        exclude: TraitExpr::parse_list(&def.exclude),
        require_any: TraitExpr::parse_list(&def.require_any),
        default_exclude_from_whoosh: def.default_exclude,
        require_plugin: def.require_plugin,
        id: def.id,
    }
}
