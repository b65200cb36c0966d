//! # Container sources
//!
//! Opaque container handles are resolved to display records by a priority-ordered set of
//! [`ContainerSource`]s. Lower priority numbers win: the first source whose `owns` accepts a
//! handle resolves it, and picker entries from later sources are dropped when an earlier
//! source already listed the same handle.
//!
//! Group numbers order the picker:
//!
//! | group | archetype |
//! |---|---|
//! | 0 | special (Keep / Pass / Sell) |
//! | 1 | follower storage adapters |
//! | 2 | tagged containers, container lists |
//! | 3 | external plugins |
//! | 4 | cell scan |

pub mod sources;

use std::collections::HashSet;

use log::debug;
use serde::Serialize;

use crate::config::Settings;
use crate::host::{FormId, Host, NO_REF};
use crate::network::NetworkManager;

pub use sources::{CellScanSource, ContainerListSource, SpecialSource, TaggedSource};

/// Neutral grey used for unavailable containers and headers.
pub const COLOR_NEUTRAL: u32 = 0x80_80_80;

/// Group assigned to handles no source claims.
pub const GROUP_UNKNOWN: u8 = 255;

/// Display record for a container handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerDisplay {
    pub name: String,
    pub location: String,
    pub color: u32,
    pub available: bool,
    pub group: u8,
}

impl ContainerDisplay {
    pub fn unknown() -> Self {
        Self {
            name: "Unknown".to_string(),
            location: String::new(),
            color: COLOR_NEUTRAL,
            available: false,
            group: GROUP_UNKNOWN,
        }
    }
}

/// One row of the container picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickerEntry {
    pub name: String,
    pub location: String,
    pub container: FormId,
    pub is_tagged: bool,
    pub color: u32,
    pub group: u8,
    /// `false` for header rows.
    pub enabled: bool,
    pub sub_group: String,
}

impl PickerEntry {
    pub fn header(group: u8, sub_group: &str) -> Self {
        Self {
            name: sub_group.to_string(),
            location: String::new(),
            container: NO_REF,
            is_tagged: false,
            color: COLOR_NEUTRAL,
            group,
            enabled: false,
            sub_group: sub_group.to_string(),
        }
    }
}

/// What sources may consult. Borrowed for the duration of one query.
#[derive(Clone, Copy)]
pub struct SourceContext<'a> {
    pub host: &'a dyn Host,
    pub manager: &'a NetworkManager,
    pub settings: &'a Settings,
}

/// Pluggable resolver for a family of container handles.
pub trait ContainerSource: Send + Sync {
    fn id(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    /// Pure ownership test, no inventory access.
    fn owns(&self, ctx: &SourceContext, container: FormId) -> bool;

    /// Called only for owned handles; must return a usable record even when the
    /// container no longer exists.
    fn resolve(&self, ctx: &SourceContext, container: FormId) -> ContainerDisplay;

    /// Entries for a picker opened from `master`; every entry must satisfy `owns`.
    fn picker_entries(&self, ctx: &SourceContext, master: FormId) -> Vec<PickerEntry>;

    fn count_items(&self, ctx: &SourceContext, container: FormId) -> i64 {
        ctx.host.count_items(container)
    }
}

#[derive(Default)]
pub struct ContainerRegistry {
    sources: Vec<Box<dyn ContainerSource>>,
}

impl std::fmt::Debug for ContainerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|s| (s.id().to_string(), s.priority())))
            .finish()
    }
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in archetypes; the cell scan only when enabled in settings.
    pub fn with_default_sources(settings: &Settings) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SpecialSource));
        registry.register(Box::new(TaggedSource));
        registry.register(Box::new(ContainerListSource));
        if settings.picker.include_unlinked_containers {
            registry.register(Box::new(CellScanSource::new()));
        }
        registry
    }

    /// Add a source, keeping the list stably sorted by priority.
    pub fn register(&mut self, source: Box<dyn ContainerSource>) {
        debug!("container source '{}' at priority {}", source.id(), source.priority());
        self.sources.push(source);
        self.sources.sort_by_key(|s| s.priority());
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id().to_string()).collect()
    }

    fn owner(&self, ctx: &SourceContext, container: FormId) -> Option<&dyn ContainerSource> {
        self.sources
            .iter()
            .find(|s| s.owns(ctx, container))
            .map(|s| s.as_ref())
    }

    /// Id of the first source owning `container`.
    pub fn owner_id(&self, ctx: &SourceContext, container: FormId) -> Option<String> {
        self.owner(ctx, container).map(|s| s.id().to_string())
    }

    pub fn resolve(&self, ctx: &SourceContext, container: FormId) -> ContainerDisplay {
        match self.owner(ctx, container) {
            Some(source) => source.resolve(ctx, container),
            None => ContainerDisplay::unknown(),
        }
    }

    /// Item count through the owning source; unclaimed handles read the live container.
    pub fn count_items(&self, ctx: &SourceContext, container: FormId) -> i64 {
        match self.owner(ctx, container) {
            Some(source) => source.count_items(ctx, container),
            None => ctx.host.count_items(container),
        }
    }

    /// Merged, deduplicated and sorted picker rows with sub-group headers.
    pub fn build_picker_list(&self, ctx: &SourceContext, master: FormId) -> Vec<PickerEntry> {
        let mut seen: HashSet<FormId> = HashSet::new();
        let mut entries: Vec<PickerEntry> = Vec::new();
        for source in &self.sources {
            for entry in source.picker_entries(ctx, master) {
                if entry.container != NO_REF && !seen.insert(entry.container) {
                    continue;
                }
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| {
            (a.group, &a.sub_group, &a.name).cmp(&(b.group, &b.sub_group, &b.name))
        });
        insert_headers(entries)
    }
}

/// Insert a header row before each entry that starts a new non-empty sub-group.
pub fn insert_headers(entries: Vec<PickerEntry>) -> Vec<PickerEntry> {
    let mut out = Vec::with_capacity(entries.len());
    let mut previous: Option<(u8, String)> = None;
    for entry in entries {
        let key = (entry.group, entry.sub_group.clone());
        if !entry.sub_group.is_empty() && previous.as_ref() != Some(&key) {
            out.push(PickerEntry::header(entry.group, &entry.sub_group));
        }
        previous = Some(key);
        out.push(entry);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, container: FormId, group: u8, sub_group: &str) -> PickerEntry {
        PickerEntry {
            name: name.to_string(),
            location: String::new(),
            container,
            is_tagged: false,
            color: 0,
            group,
            enabled: true,
            sub_group: sub_group.to_string(),
        }
    }

    #[test]
    fn headers_only_on_new_non_empty_sub_group() {
        let rows = insert_headers(vec![
            entry("a", 1, 1, ""),
            entry("b", 2, 2, "Barrels"),
            entry("c", 3, 2, "Crates"),
            entry("d", 4, 2, "Crates"),
        ]);
        let names: Vec<(&str, bool)> = rows.iter().map(|r| (r.name.as_str(), r.enabled)).collect();
        assert_eq!(
            names,
            vec![
                ("a", true),
                ("Barrels", false),
                ("b", true),
                ("Crates", false),
                ("c", true),
                ("d", true),
            ]
        );
    }

    #[test]
    fn unknown_display_is_grey_and_unavailable() {
        let display = ContainerDisplay::unknown();
        assert_eq!(display.group, GROUP_UNKNOWN);
        assert!(!display.available);
        assert_eq!(display.color, COLOR_NEUTRAL);
    }
}
