mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use stashflow::app::App;
use stashflow::config::ini::ConfigDir;
use stashflow::container::{insert_headers, PickerEntry, GROUP_UNKNOWN};
use stashflow::host::{FormId, NO_REF};

fn row(name: &str, container: FormId, group: u8, sub_group: &str) -> PickerEntry {
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
fn headers_mark_each_new_sub_group() {
    let rows = insert_headers(vec![
        row("plain", 1, 1, ""),
        row("crate a", 2, 2, "Crates"),
        row("crate b", 3, 2, "Crates"),
        row("barrel", 4, 2, "Barrels"),
    ]);
    let shape: Vec<(&str, bool)> = rows.iter().map(|r| (r.name.as_str(), r.enabled)).collect();
    assert_eq!(
        shape,
        vec![
            ("plain", true),
            ("Crates", false),
            ("crate a", true),
            ("crate b", true),
            ("Barrels", false),
            ("barrel", true),
        ]
    );
}

fn picker_app() -> (tempfile::TempDir, Arc<stashflow::host::MemoryHost>, App) {
    let (dir, host, app) = common::app();
    app.manager.create_network("Home", MASTER).unwrap();
    app.manager.set_sell_container(SELL, 0.0);
    app.manager.tag(ORE, "Ore Barrel");
    app.manager.tag(WEAPONS, "Armory");
    // Also listed in the Cellar list; the tag must win.
    app.manager.tag(CELLAR_CRATE, "Tagged Crate");
    (dir, host, app)
}

#[test]
fn picker_is_sorted_deduplicated_and_headed() {
    let (_dir, _host, app) = picker_app();
    let rows = app.picker_list(MASTER);

    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Keep",
            "Pass",
            "Sell",
            "Armory",
            "Ore Barrel",
            "Tagged Crate",
            "Cellar",
            "Cellar Barrel",
        ]
    );

    let live: Vec<&PickerEntry> = rows.iter().filter(|r| r.enabled).collect();
    let keys: Vec<(u8, &str, &str)> = live
        .iter()
        .map(|r| (r.group, r.sub_group.as_str(), r.name.as_str()))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);

    let mut seen = HashSet::new();
    for r in &live {
        if r.container != NO_REF {
            assert!(seen.insert(r.container), "{:#X} listed twice", r.container);
        }
    }
    let crate_row = live.iter().find(|r| r.container == CELLAR_CRATE).unwrap();
    assert!(crate_row.is_tagged);
}

#[test]
fn enabled_rows_are_owned_by_their_resolver() {
    let (_dir, _host, app) = picker_app();
    let ctx = app.source_context();
    for r in app.picker_list(MASTER).iter().filter(|r| r.enabled) {
        let display = app.containers.resolve(&ctx, r.container);
        assert_ne!(display.group, GROUP_UNKNOWN, "{} has no owner", r.name);
        assert_eq!(display.group, r.group, "{} resolves to another group", r.name);
    }
    assert_eq!(
        app.containers.owner_id(&ctx, CELLAR_CRATE).as_deref(),
        Some("tagged")
    );
    assert_eq!(
        app.containers.owner_id(&ctx, CELLAR_BARREL).as_deref(),
        Some("container_list")
    );
    assert_eq!(app.containers.owner_id(&ctx, MASTER).as_deref(), Some("special"));
}

#[test]
fn disabled_list_drops_out_of_picker_and_resolution() {
    let (_dir, _host, app) = picker_app();
    app.manager.set_container_list_enabled("Cellar", false).unwrap();
    let rows = app.picker_list(MASTER);
    assert!(rows.iter().all(|r| r.container != CELLAR_BARREL));
    assert_eq!(app.resolve_container(CELLAR_BARREL).group, GROUP_UNKNOWN);
    assert!(app.manager.set_container_list_enabled("Attic", true).is_err());
}

#[test]
fn cell_scan_is_opt_in() {
    let dir = config_dir();
    std::fs::write(
        dir.path().join("StashFlow_Picker.ini"),
        "[ContainerPicker]\nbIncludeUnlinkedContainers = true\n\n[Containers]\nsGenericContainerNames = Barrel\n",
    )
    .unwrap();
    let host = world();
    host.set_current_cell(vec![MISC, CELLAR_BARREL, MASTER]);
    let app = App::load(&ConfigDir::new(dir.path()), host.clone());
    app.manager.create_network("Home", MASTER).unwrap();

    assert!(app.containers.source_ids().contains(&"cell_scan".to_string()));
    let rows = app.picker_list(MASTER);
    assert!(rows.iter().any(|r| r.container == MISC && r.enabled));
    // "Barrel" is a generic name, but the Cellar list already owns it.
    assert_eq!(
        rows.iter().filter(|r| r.container == CELLAR_BARREL).count(),
        1
    );
    assert_eq!(rows.iter().filter(|r| r.container == MASTER).count(), 1);

    let (_dir2, _host2, plain) = common::app();
    assert!(!plain.containers.source_ids().contains(&"cell_scan".to_string()));
}

#[test]
fn counts_go_through_the_owning_source() {
    let (_dir, host, app) = picker_app();
    host.stock(ORE, IRON, 4);
    host.stock(ORE, STEEL, 2);
    assert_eq!(app.count_items(ORE), 6);
    assert_eq!(app.count_items(NO_REF), 0);
}
