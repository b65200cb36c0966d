//! Built-in container source archetypes.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use super::{ContainerDisplay, ContainerSource, PickerEntry, SourceContext, COLOR_NEUTRAL};
use crate::host::{FormId, NO_REF};

pub const COLOR_KEEP: u32 = 0x6F_C2_6F;
pub const COLOR_PASS: u32 = 0xA0_A0_A0;
pub const COLOR_SELL: u32 = 0xE8_C0_4A;
pub const COLOR_TAGGED: u32 = 0x6F_A8_DC;
pub const COLOR_LISTED: u32 = 0xB3_8F_D9;
pub const COLOR_SCANNED: u32 = 0xD0_D0_D0;

pub const GROUP_SPECIAL: u8 = 0;
pub const GROUP_TAGGED: u8 = 2;
pub const GROUP_CELL_SCAN: u8 = 4;

fn entry(name: &str, location: String, container: FormId, color: u32, group: u8) -> PickerEntry {
    PickerEntry {
        name: name.to_string(),
        location,
        container,
        is_tagged: false,
        color,
        group,
        enabled: true,
        sub_group: String::new(),
    }
}

fn availability_color(available: bool, color: u32) -> u32 {
    if available {
        color
    } else {
        COLOR_NEUTRAL
    }
}

/// Keep, Pass and Sell.
#[derive(Debug, Default)]
pub struct SpecialSource;

impl ContainerSource for SpecialSource {
    fn id(&self) -> &str {
        "special"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn owns(&self, ctx: &SourceContext, container: FormId) -> bool {
        container == NO_REF
            || container == ctx.manager.sell_state().container
            || ctx.manager.master_network(container).is_some()
    }

    fn resolve(&self, ctx: &SourceContext, container: FormId) -> ContainerDisplay {
        if container == NO_REF {
            return ContainerDisplay {
                name: "Pass".to_string(),
                location: String::new(),
                color: COLOR_PASS,
                available: true,
                group: GROUP_SPECIAL,
            };
        }
        let available = ctx.host.form_exists(container);
        if let Some(network) = ctx.manager.master_network(container) {
            return ContainerDisplay {
                name: "Keep".to_string(),
                location: network,
                color: availability_color(available, COLOR_KEEP),
                available,
                group: GROUP_SPECIAL,
            };
        }
        ContainerDisplay {
            name: "Sell".to_string(),
            location: ctx.host.container_location(container).unwrap_or_default(),
            color: availability_color(available, COLOR_SELL),
            available,
            group: GROUP_SPECIAL,
        }
    }

    fn picker_entries(&self, ctx: &SourceContext, master: FormId) -> Vec<PickerEntry> {
        let mut entries = Vec::new();
        if let Some(network) = ctx.manager.master_network(master) {
            entries.push(entry("Keep", network, master, COLOR_KEEP, GROUP_SPECIAL));
        }
        entries.push(entry("Pass", String::new(), NO_REF, COLOR_PASS, GROUP_SPECIAL));
        let sell = ctx.manager.sell_state().container;
        if sell != NO_REF && sell != master {
            let location = ctx.host.container_location(sell).unwrap_or_default();
            entries.push(entry("Sell", location, sell, COLOR_SELL, GROUP_SPECIAL));
        }
        entries
    }
}

/// User-named containers from the tag registry.
#[derive(Debug, Default)]
pub struct TaggedSource;

impl ContainerSource for TaggedSource {
    fn id(&self) -> &str {
        "tagged"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn owns(&self, ctx: &SourceContext, container: FormId) -> bool {
        ctx.manager.is_tagged(container)
    }

    fn resolve(&self, ctx: &SourceContext, container: FormId) -> ContainerDisplay {
        let available = ctx.host.form_exists(container);
        ContainerDisplay {
            name: ctx
                .manager
                .name_of(container)
                .unwrap_or_else(|| "Unknown".to_string()),
            location: ctx.host.container_location(container).unwrap_or_default(),
            color: availability_color(available, COLOR_TAGGED),
            available,
            group: GROUP_TAGGED,
        }
    }

    fn picker_entries(&self, ctx: &SourceContext, _master: FormId) -> Vec<PickerEntry> {
        ctx.manager
            .tags()
            .into_iter()
            .map(|(container, name)| {
                let available = ctx.host.form_exists(container);
                let location = ctx.host.container_location(container).unwrap_or_default();
                let mut row = entry(
                    &name,
                    location,
                    container,
                    availability_color(available, COLOR_TAGGED),
                    GROUP_TAGGED,
                );
                row.is_tagged = true;
                row.enabled = available;
                row
            })
            .collect()
    }
}

/// Containers from enabled `[ContainerList:*]` definitions; the list name is the sub-group.
#[derive(Debug, Default)]
pub struct ContainerListSource;

impl ContainerSource for ContainerListSource {
    fn id(&self) -> &str {
        "container_list"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn owns(&self, ctx: &SourceContext, container: FormId) -> bool {
        container != NO_REF
            && ctx
                .manager
                .enabled_container_lists()
                .iter()
                .any(|l| l.contains(container))
    }

    fn resolve(&self, ctx: &SourceContext, container: FormId) -> ContainerDisplay {
        let available = ctx.host.form_exists(container);
        let lists = ctx.manager.enabled_container_lists();
        let found = lists.iter().find_map(|list| {
            list.entries
                .iter()
                .find(|e| e.container == container)
                .map(|e| (list.name.clone(), e.display_name.clone()))
        });
        let (list_name, display_name) = found.unwrap_or_default();
        ContainerDisplay {
            name: display_name,
            location: list_name,
            color: availability_color(available, COLOR_LISTED),
            available,
            group: GROUP_TAGGED,
        }
    }

    fn picker_entries(&self, ctx: &SourceContext, _master: FormId) -> Vec<PickerEntry> {
        let mut rows = Vec::new();
        for list in ctx.manager.enabled_container_lists() {
            for item in &list.entries {
                let available = ctx.host.form_exists(item.container);
                let location = ctx.host.container_location(item.container).unwrap_or_default();
                let mut row = entry(
                    &item.display_name,
                    location,
                    item.container,
                    availability_color(available, COLOR_LISTED),
                    GROUP_TAGGED,
                );
                row.is_tagged = ctx.manager.is_tagged(item.container);
                row.sub_group = list.name.clone();
                rows.push(row);
            }
        }
        rows
    }
}

/// Named, non-generic containers in the player's current cell.
/// Named containers attached in the player's cell.
///
/// Ownership is answered from the set seen when the picker was last built, so `owns` does
/// not walk the cell.
#[derive(Debug, Default)]
pub struct CellScanSource {
    seen: Mutex<BTreeSet<FormId>>,
}

impl CellScanSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn candidates(ctx: &SourceContext) -> Vec<(FormId, String)> {
        ctx.host
            .containers_in_current_cell()
            .into_iter()
            .filter_map(|id| {
                let name = ctx.host.container_name(id)?;
                let usable = !name.trim().is_empty() && !ctx.settings.containers.is_generic(&name);
                usable.then_some((id, name))
            })
            .collect()
    }

    fn seen(&self) -> std::sync::MutexGuard<'_, BTreeSet<FormId>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ContainerSource for CellScanSource {
    fn id(&self) -> &str {
        "cell_scan"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn owns(&self, _ctx: &SourceContext, container: FormId) -> bool {
        container != NO_REF && self.seen().contains(&container)
    }

    fn resolve(&self, ctx: &SourceContext, container: FormId) -> ContainerDisplay {
        let name = ctx.host.container_name(container);
        ContainerDisplay {
            available: name.is_some(),
            name: name.unwrap_or_else(|| "Unknown".to_string()),
            location: ctx.host.container_location(container).unwrap_or_default(),
            color: COLOR_SCANNED,
            group: GROUP_CELL_SCAN,
        }
    }

    fn picker_entries(&self, ctx: &SourceContext, master: FormId) -> Vec<PickerEntry> {
        let candidates = Self::candidates(ctx);
        *self.seen() = candidates.iter().map(|(id, _)| *id).collect();
        candidates
            .into_iter()
            .filter(|(id, _)| *id != master)
            .map(|(id, name)| {
                let location = ctx.host.container_location(id).unwrap_or_default();
                entry(&name, location, id, COLOR_SCANNED, GROUP_CELL_SCAN)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::container::ContainerRegistry;
    use crate::host::MemoryHost;
    use crate::network::NetworkManager;

    #[test]
    fn cell_scan_skips_generic_names() {
        let host = MemoryHost::new();
        host.insert_container(0x10, "Barrel", "Inn");
        host.insert_container(0x11, "Wardrobe", "Inn");
        host.set_current_cell(vec![0x10, 0x11]);
        let manager = NetworkManager::new();
        let mut settings = Settings::default();
        settings.containers.generic_container_names = vec!["barrel".to_string()];
        settings.picker.include_unlinked_containers = true;
        let ctx = SourceContext {
            host: &host,
            manager: &manager,
            settings: &settings,
        };
        let registry = ContainerRegistry::with_default_sources(&settings);
        assert_eq!(registry.owner_id(&ctx, 0x11), None);
        registry.build_picker_list(&ctx, 0x99);
        assert_eq!(registry.owner_id(&ctx, 0x11).as_deref(), Some("cell_scan"));
        assert_eq!(registry.owner_id(&ctx, 0x10), None);

        // Leaving the cell does not change ownership until the next picker build.
        host.set_current_cell(Vec::new());
        assert_eq!(registry.owner_id(&ctx, 0x11).as_deref(), Some("cell_scan"));
        registry.build_picker_list(&ctx, 0x99);
        assert_eq!(registry.owner_id(&ctx, 0x11), None);
        let display = registry.resolve(&ctx, 0x11);
        assert_eq!(display.group, GROUP_CELL_SCAN);
        assert_eq!(display.location, "Inn");
    }

    #[test]
    fn special_source_names_keep_pass_sell() {
        let host = MemoryHost::new();
        host.insert_container(0x10, "Chest", "Home");
        host.insert_container(0x30, "Crate", "Home");
        let manager = NetworkManager::new();
        manager.create_network("Home", 0x10).unwrap();
        manager.set_sell_container(0x30, 0.0);
        let settings = Settings::default();
        let ctx = SourceContext {
            host: &host,
            manager: &manager,
            settings: &settings,
        };
        let names: Vec<String> = SpecialSource
            .picker_entries(&ctx, 0x10)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Keep", "Pass", "Sell"]);
        assert_eq!(SpecialSource.resolve(&ctx, 0x10).location, "Home");
        assert_eq!(SpecialSource.resolve(&ctx, 0).name, "Pass");
    }
}
