//! Preset and container-list definitions.
//!
//! Both are read from the merged configuration once per load and never mutated:
//!
//! ```ini
//! [Preset:Whiterun Home]
//! RequirePlugin = Skyrim.esm
//! Master = Skyrim.esm|0x10DF2B
//! CatchAll = Keep
//! Notice = Build the storage room first.
//! WarnIfPlugin1 = Hearthfire.esm|Hearthfire homes are not covered.
//!
//! [Preset:Whiterun Home:Filters]
//! ore = Skyrim.esm|0x10DF2C
//! potions = Pass
//!
//! [ContainerList:Breezehome]
//! [ContainerList:Breezehome:Containers]
//! Skyrim.esm|0x10DF2C = Ore Chest
//! ```

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::ini::{IniDocument, IniSection};
use crate::config::FormSpec;
use crate::host::{FormId, Host, NO_REF};

/// Destination of a preset row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PresetTarget {
    /// Route to the master.
    Keep,
    /// Inert stage.
    Pass,
    Form(FormSpec),
}

impl PresetTarget {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("keep") {
            Some(PresetTarget::Keep)
        } else if text.eq_ignore_ascii_case("pass") {
            Some(PresetTarget::Pass)
        } else {
            FormSpec::parse(text).map(PresetTarget::Form)
        }
    }

    /// Live handle; unresolvable forms degrade to an inert `0`.
    pub fn resolve(&self, master: FormId, host: &dyn Host) -> FormId {
        match self {
            PresetTarget::Keep => master,
            PresetTarget::Pass => NO_REF,
            PresetTarget::Form(spec) => spec.resolve(host).unwrap_or_else(|| {
                warn!("preset target {} does not resolve; using Pass", spec);
                NO_REF
            }),
        }
    }
}

/// Declarative network template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preset {
    pub name: String,
    pub required_plugins: Vec<String>,
    pub master: FormSpec,
    pub catch_all: PresetTarget,
    pub notice: Option<String>,
    /// `(plugin, message)` pairs shown only when the plugin is loaded.
    pub plugin_warnings: Vec<(String, String)>,
    pub filters: Vec<(String, PresetTarget)>,
    pub tags: Vec<(FormSpec, String)>,
    pub whoosh: Vec<String>,
}

impl Preset {
    /// Live warning lines joined by newlines, with literal `\n` expanded.
    pub fn warnings(&self, host: &dyn Host) -> String {
        let mut lines: Vec<&str> = Vec::new();
        if let Some(notice) = &self.notice {
            lines.push(notice);
        }
        for (plugin, message) in &self.plugin_warnings {
            if host.is_plugin_loaded(plugin) {
                lines.push(message);
            }
        }
        lines.join("\n").replace("\\n", "\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerListEntry {
    pub container: FormId,
    pub display_name: String,
}

/// Named declarative group of containers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerList {
    pub name: String,
    pub required_plugins: Vec<String>,
    pub entries: Vec<ContainerListEntry>,
}

impl ContainerList {
    pub fn contains(&self, container: FormId) -> bool {
        self.entries.iter().any(|e| e.container == container)
    }
}

fn missing_plugin<'a>(plugins: &'a [String], host: &dyn Host) -> Option<&'a String> {
    plugins.iter().find(|p| !host.is_plugin_loaded(p))
}

/// Top-level `[<prefix>Name]` sections (no further `:`), with their `Name`.
fn top_sections<'a>(
    doc: &'a IniDocument,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a str, &'a IniSection)> + 'a {
    doc.sections_with_prefix(prefix)
        .filter(|(rest, _)| !rest.contains(':'))
        .map(|(rest, section)| (rest.trim(), section))
}

fn sub_section<'a>(doc: &'a IniDocument, prefix: &str, name: &str, sub: &str) -> Option<&'a IniSection> {
    doc.section(&format!("{prefix}{name}:{sub}"))
}

/// Parse every preset, pruning those whose plugins or master are missing.
pub fn load_presets(doc: &IniDocument, host: &dyn Host) -> Vec<Preset> {
    let mut presets = Vec::new();
    for (name, section) in top_sections(doc, "Preset:") {
        let required_plugins = section.get_list("RequirePlugin");
        if let Some(plugin) = missing_plugin(&required_plugins, host) {
            info!("preset '{}' pruned: {} not loaded", name, plugin);
            continue;
        }
        let Some(master) = section.get("Master").and_then(FormSpec::parse) else {
            warn!("preset '{}' pruned: missing or malformed Master", name);
            continue;
        };
        if master.resolve(host).is_none() {
            info!("preset '{}' pruned: master {} does not resolve", name, master);
            continue;
        }
        let catch_all = match section.get("CatchAll") {
            Some(raw) => PresetTarget::parse(raw).unwrap_or_else(|| {
                warn!("preset '{}': bad CatchAll '{}', using Keep", name, raw);
                PresetTarget::Keep
            }),
            None => PresetTarget::Keep,
        };
        let notice = section
            .get("Notice")
            .map(str::to_string)
            .filter(|n| !n.is_empty());
        let plugin_warnings = section
            .entries()
            .iter()
            .filter(|(key, _)| key.to_ascii_lowercase().starts_with("warnifplugin"))
            .filter_map(|(_, value)| {
                let (plugin, message) = value.split_once('|')?;
                Some((plugin.trim().to_string(), message.trim().to_string()))
            })
            .collect();

        let mut filters = Vec::new();
        if let Some(rows) = sub_section(doc, "Preset:", name, "Filters") {
            for (filter_id, raw) in rows.entries() {
                match PresetTarget::parse(raw) {
                    Some(target) => filters.push((filter_id.clone(), target)),
                    None => warn!("preset '{}': filter '{}' has bad target '{}'", name, filter_id, raw),
                }
            }
        }
        let mut tags = Vec::new();
        if let Some(rows) = sub_section(doc, "Preset:", name, "Tags") {
            for (key, display) in rows.entries() {
                match FormSpec::parse(key) {
                    Some(spec) if !display.is_empty() => tags.push((spec, display.clone())),
                    _ => warn!("preset '{}': bad tag row '{}'", name, key),
                }
            }
        }
        let whoosh = sub_section(doc, "Preset:", name, "Whoosh")
            .map(|rows| {
                rows.entries()
                    .iter()
                    .filter(|(_, v)| crate::config::ini::parse_bool(v).unwrap_or(false))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();

        debug!("preset '{}': {} filter rows, {} tags", name, filters.len(), tags.len());
        presets.push(Preset {
            name: name.to_string(),
            required_plugins,
            master,
            catch_all,
            notice,
            plugin_warnings,
            filters,
            tags,
            whoosh,
        });
    }
    presets
}

/// Parse every container list, dropping unresolvable entries and empty lists.
pub fn load_container_lists(doc: &IniDocument, host: &dyn Host) -> Vec<ContainerList> {
    let mut lists = Vec::new();
    for (name, section) in top_sections(doc, "ContainerList:") {
        let required_plugins = section.get_list("RequirePlugin");
        if let Some(plugin) = missing_plugin(&required_plugins, host) {
            info!("container list '{}' pruned: {} not loaded", name, plugin);
            continue;
        }
        let mut entries = Vec::new();
        if let Some(rows) = sub_section(doc, "ContainerList:", name, "Containers") {
            for (key, display) in rows.entries() {
                let Some(container) = FormSpec::parse(key).and_then(|s| s.resolve(host)) else {
                    debug!("container list '{}': '{}' does not resolve", name, key);
                    continue;
                };
                entries.push(ContainerListEntry {
                    container,
                    display_name: display.clone(),
                });
            }
        }
        if entries.is_empty() {
            info!("container list '{}' pruned: no resolvable containers", name);
            continue;
        }
        lists.push(ContainerList {
            name: name.to_string(),
            required_plugins,
            entries,
        });
    }
    lists
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    const PRESETS: &str = "\
[Preset:Home]
Master = Skyrim.esm|0x100
CatchAll = Skyrim.esm|0x300
Notice = Line one\\nLine two
WarnIfPlugin1 = Skyrim.esm|Vanilla detected
WarnIfPlugin2 = Missing.esp|Never shown
[Preset:Home:Filters]
ore = Skyrim.esm|0x200
potions = Pass
misc = Keep
[Preset:Home:Whoosh]
ore = true
potions = false
[Preset:Dlc]
RequirePlugin = Dawnguard.esm
Master = Skyrim.esm|0x100
[Preset:Ghost]
Master = Skyrim.esm|0x999
";

    #[test]
    fn presets_prune_and_parse_rows() {
        let host = MemoryHost::new();
        host.insert_container(0x100, "Master", "");
        let presets = load_presets(&IniDocument::parse(PRESETS), &host);
        assert_eq!(presets.len(), 1);
        let home = &presets[0];
        assert_eq!(home.filters.len(), 3);
        assert_eq!(home.filters[1].1, PresetTarget::Pass);
        assert_eq!(home.filters[2].1.resolve(0x100, &host), 0x100);
        assert_eq!(home.whoosh, vec!["ore".to_string()]);
        assert_eq!(home.warnings(&host), "Line one\nLine two\nVanilla detected");
    }

    #[test]
    fn container_lists_drop_missing_entries() {
        let host = MemoryHost::new();
        host.insert_container(0x10, "Crate", "");
        let doc = IniDocument::parse(
            "[ContainerList:Shop]\n[ContainerList:Shop:Containers]\nSkyrim.esm|0x10 = Crate\n\
             Skyrim.esm|0x11 = Gone\n[ContainerList:Empty]\n",
        );
        let lists = load_container_lists(&doc, &host);
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].entries.len(), 1);
        assert!(lists[0].contains(0x10));
    }
}
