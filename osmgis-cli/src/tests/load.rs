//! End-to-end tests of the `load` command against an on-disk database.

use super::*;
use crate::load::{LoadArgs, run_load};
use osmgis_core::store::{OsmStore, RawTable};
use osmgis_data::open_database;
use rstest::rstest;
use std::fs;
use tempfile::TempDir;

const EXTRACT: &str = r#"{
  "elements": [
    {"type": "node", "id": 1, "lat": 47.6550, "lon": -2.7600},
    {"type": "node", "id": 2, "lat": 47.6550, "lon": -2.7598},
    {"type": "node", "id": 3, "lat": 47.6552, "lon": -2.7598},
    {"type": "node", "id": 4, "lat": 47.6552, "lon": -2.7600},
    {"type": "way", "id": 100, "nodes": [1, 2, 3, 4, 1], "tags": {"building": "yes"}}
  ]
}"#;

fn workspace() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
    (dir, root)
}

#[rstest]
fn load_builds_layers_into_a_fresh_database() {
    let (_dir, root) = workspace();
    let input = root.join("extract.json");
    fs::write(&input, EXTRACT).expect("write extract");
    let database = root.join("out/layers.sqlite");

    let outcomes = run_load(LoadArgs {
        input: Some(input),
        database: Some(database.clone()),
        prefix: Some("city".into()),
        epsg: Some(2154),
        layers: Some("buildings,rails".into()),
        presets_dir: None,
    })
    .expect("load succeeds");

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[1].status, LayerStatus::Empty);
    let LayerStatus::Written(table) = &outcomes[0].status else {
        panic!("buildings were not written: {:?}", outcomes[0]);
    };

    let store = open_database(&database).expect("database reopens");
    assert_eq!(store.read_layer(table).expect("layer").len(), 1);
    let prefix = TablePrefix::new("city").expect("prefix");
    assert!(
        !store
            .table_exists(&prefix.raw(RawTable::Node))
            .expect("existence check")
    );
}

#[rstest]
fn load_reports_missing_inputs() {
    let (_dir, root) = workspace();
    let err = run_load(LoadArgs {
        input: Some(root.join("absent.json")),
        database: Some(root.join("layers.sqlite")),
        ..LoadArgs::default()
    })
    .expect_err("input is missing");
    assert!(matches!(err, CliError::MissingSourceFile { .. }));
}

#[rstest]
fn load_rejects_unknown_formats() {
    let (_dir, root) = workspace();
    let input = root.join("extract.osm");
    fs::write(&input, "<osm/>").expect("write extract");
    let err = run_load(LoadArgs {
        input: Some(input),
        database: Some(root.join("layers.sqlite")),
        ..LoadArgs::default()
    })
    .expect_err("xml is unsupported");
    assert!(matches!(err, CliError::Load(_)));
}
