mod common;

use std::collections::BTreeSet;

use common::*;
use stashflow::app::App;
use stashflow::config::ini::ConfigDir;
use stashflow::errors::StashError;
use stashflow::host::{Host, MemoryHost};

#[test]
fn whoosh_default_set_plus_excluded_ids_cover_every_filter() {
    let (_dir, _host, app) = common::app();
    let default_set = app.filters.default_whoosh_set();
    let excluded: BTreeSet<String> = app
        .filters
        .filters()
        .iter()
        .filter(|f| f.default_exclude_from_whoosh)
        .map(|f| f.id.clone())
        .collect();
    let union: BTreeSet<String> = default_set.union(&excluded).cloned().collect();
    let all: BTreeSet<String> = app.filters.order().into_iter().collect();
    assert_eq!(union, all);
    assert!(excluded.contains("potions"));
    assert!(!all.contains("retired"));
}

#[test]
fn registration_order_and_families() {
    let (_dir, _host, app) = common::app();
    assert_eq!(
        app.filters.order(),
        vec!["ingots", "materials", "wood", "weapons", "swords", "armor", "potions"]
    );
    assert_eq!(app.filters.children("weapons"), &["swords".to_string()]);
    assert!(!app.filters.roots().contains(&"swords".to_string()));
    assert_eq!(app.filters.get("ingots").unwrap().display_name, "Ingots");
}

#[test]
fn traits_evaluate_against_live_items() {
    let (_dir, host, app) = common::app();
    let check = |id: &str, item: u32| {
        let form = host.item(item).unwrap();
        app.filters
            .matches(id, &form, &app.evaluator, app.host())
    };
    assert!(check("ingots", IRON));
    assert!(!check("ingots", WOOD));
    assert!(check("materials", WOOD));
    assert!(check("materials", STEEL));
    assert!(check("swords", SWORD));
    assert!(!check("weapons", HELMET));
    assert!(check("armor", HELMET));
    assert!(!check("nonexistent", IRON));
}

#[test]
fn later_file_replaces_definition_in_place() {
    let dir = config_dir();
    std::fs::write(
        dir.path().join("StashFlow_Override.ini"),
        "[Filter:ingots]\nDisplay = Bars\nFormType = Misc\n\n[Filter:modded]\nRequirePlugin = Missing.esp\nFormType = Misc\n\n[DisplayNames]\nwood|Lumber|Logs and planks = true\n",
    )
    .unwrap();
    let host = world();
    let app = App::load(&ConfigDir::new(dir.path()), host.clone());

    assert_eq!(app.filters.order()[0], "ingots");
    let ingots = app.filters.get("ingots").unwrap();
    assert_eq!(ingots.display_name, "Bars");
    assert!(ingots.require.is_empty());
    assert!(app.filters.get("modded").is_none());

    let wood = app.filters.get("wood").unwrap();
    assert_eq!(wood.display_name, "Lumber");
    assert_eq!(wood.description, "Logs and planks");

    // The overridden filter now takes any misc item.
    let firewood = host.item(WOOD).unwrap();
    assert!(app.filters.matches("ingots", &firewood, &app.evaluator, app.host()));
}

#[test]
fn unknown_trait_never_matches() {
    let dir = config_dir();
    std::fs::write(
        dir.path().join("StashFlow_Bad.ini"),
        "[Filter:odd]\nRequireTrait = sparkly\n\n[Filter:odd_exclude]\nFormType = Misc\nExcludeTrait = sparkly\n",
    )
    .unwrap();
    let host = world();
    let app = App::load(&ConfigDir::new(dir.path()), host.clone());
    let iron = host.item(IRON).unwrap();
    assert!(!app.filters.matches("odd", &iron, &app.evaluator, app.host()));
    assert!(app.filters.matches("odd_exclude", &iron, &app.evaluator, app.host()));
}

#[test]
fn empty_config_dir_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::load(&ConfigDir::new(dir.path()), std::sync::Arc::new(MemoryHost::new()));
    assert!(app.filters.is_empty());
    assert!(app.manager.presets().is_empty());
    assert!(app.settings.general.mod_enabled);
}

#[test]
fn presets_prune_and_instantiate() {
    let (_dir, _host, app) = common::app();
    let names: Vec<String> = app.manager.presets().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Home"]);

    app.manager.activate_preset("Home", app.host()).unwrap();
    let network = app.manager.find("Home").unwrap();
    assert_eq!(network.master, MASTER);
    assert_eq!(network.catch_all, MISC);
    assert_eq!(network.binding("ingots"), ORE);
    assert_eq!(network.binding("potions"), 0);
    assert!(network.whoosh_configured);
    assert_eq!(
        network.whoosh_filters,
        BTreeSet::from(["ingots".to_string(), "weapons".to_string()])
    );

    assert!(matches!(
        app.manager.activate_preset("Home", app.host()),
        Err(StashError::DuplicateNetwork(_))
    ));
    assert!(matches!(
        app.manager.activate_preset("Modded", app.host()),
        Err(StashError::PresetNotFound(_))
    ));
}
