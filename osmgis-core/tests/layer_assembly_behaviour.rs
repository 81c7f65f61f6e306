//! Behavioural tests for generic layer extraction over the SQLite store.
#![cfg(feature = "store-sqlite")]

use std::{cell::RefCell, collections::BTreeMap, fs, path::PathBuf};

use geo::{Coord, Geometry};
use osmgis_core::{
    LayerError, LayerRequest, RelationMember, Tags,
    layer::{extract_nodes_as_points, extract_relations_as_polygons},
    store::{
        OsmStore, RawNode, RawRelation, RawSnapshot, RawWay, SqliteOsmStore, TableName,
        TablePrefix,
    },
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::json;

const PREFIX: &str = "bdd";

type Outcome = RefCell<Option<Result<TableName, LayerError>>>;

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

fn square(first_id: i64, x: f64, y: f64, size: f64) -> Vec<RawNode> {
    [(x, y), (x + size, y), (x + size, y + size), (x, y + size)]
        .into_iter()
        .zip(first_id..)
        .map(|((x, y), id)| RawNode {
            id,
            coord: Coord { x, y },
            tags: Tags::new(),
        })
        .collect()
}

fn snapshot() -> RawSnapshot {
    let mut nodes = square(1, 0.0, 0.0, 1.0);
    nodes.extend(square(11, 0.25, 0.25, 0.5));
    nodes.push(RawNode {
        id: 50,
        coord: Coord { x: 2.0, y: 2.0 },
        tags: tags(&[("amenity", "bench")]),
    });
    nodes.push(RawNode {
        id: 51,
        coord: Coord { x: 3.0, y: 2.0 },
        tags: tags(&[("name", "Fountain")]),
    });
    RawSnapshot {
        nodes,
        ways: vec![
            RawWay {
                id: 100,
                nodes: vec![1, 2, 3, 4, 1],
                tags: Tags::new(),
            },
            RawWay {
                id: 101,
                nodes: vec![11, 12, 13, 14, 11],
                tags: Tags::new(),
            },
        ],
        relations: vec![
            RawRelation {
                id: 1,
                members: vec![RelationMember::new(100, "outer")],
                tags: tags(&[("type", "multipolygon"), ("landuse", "grass")]),
            },
            RawRelation {
                id: 2,
                members: vec![
                    RelationMember::new(100, "outer"),
                    RelationMember::new(101, "inner"),
                ],
                tags: tags(&[("type", "multipolygon"), ("natural", "wood")]),
            },
        ],
    }
}

#[fixture]
fn store() -> RefCell<Option<SqliteOsmStore>> {
    RefCell::new(None)
}

#[fixture]
fn outcome() -> Outcome {
    RefCell::new(None)
}

fn request(spec: &serde_json::Value) -> LayerRequest {
    LayerRequest::new(PREFIX, 4326)
        .and_then(|request| request.with_tag_spec(spec))
        .expect("valid request")
}

fn run<F>(store: &RefCell<Option<SqliteOsmStore>>, outcome: &Outcome, operation: F)
where
    F: FnOnce(&mut SqliteOsmStore) -> Result<TableName, LayerError>,
{
    let mut guard = store.borrow_mut();
    let store = guard.as_mut().expect("store prepared");
    *outcome.borrow_mut() = Some(operation(store));
}

fn single_polygon(store: &RefCell<Option<SqliteOsmStore>>, outcome: &Outcome) -> geo::Polygon {
    let table = outcome
        .borrow()
        .as_ref()
        .expect("extraction was attempted")
        .as_ref()
        .expect("expected a layer")
        .clone();
    let guard = store.borrow();
    let layer = guard
        .as_ref()
        .expect("store prepared")
        .read_layer(&table)
        .expect("layer readable");
    assert_eq!(layer.len(), 1, "expected a single row");
    match &layer.records[0].geometry {
        Geometry::Polygon(polygon) => polygon.clone(),
        other => panic!("expected a polygon, got {other:?}"),
    }
}

#[given("a store holding grassland and woodland relations")]
fn loaded_store(#[from(store)] store: &RefCell<Option<SqliteOsmStore>>) {
    let mut sqlite = SqliteOsmStore::open_in_memory().expect("in-memory database");
    let prefix = TablePrefix::new(PREFIX).expect("prefix");
    sqlite.load_raw(&prefix, &snapshot()).expect("raw tables loaded");
    *store.borrow_mut() = Some(sqlite);
}

#[when("I extract relation polygons for grassland")]
fn extract_grassland(
    #[from(store)] store: &RefCell<Option<SqliteOsmStore>>,
    #[from(outcome)] outcome: &Outcome,
) {
    let request = request(&json!({"landuse": "grass"}));
    run(store, outcome, |store| extract_relations_as_polygons(store, &request));
}

#[when("I extract relation polygons for woodland")]
fn extract_woodland(
    #[from(store)] store: &RefCell<Option<SqliteOsmStore>>,
    #[from(outcome)] outcome: &Outcome,
) {
    let request = request(&json!({"natural": ["wood"]}));
    run(store, outcome, |store| extract_relations_as_polygons(store, &request));
}

#[when("I extract node points with a filter matching nothing")]
fn extract_nothing(
    #[from(store)] store: &RefCell<Option<SqliteOsmStore>>,
    #[from(outcome)] outcome: &Outcome,
) {
    let request = request(&json!({"toto": "tata"}));
    run(store, outcome, |store| extract_nodes_as_points(store, &request));
}

#[when("I extract node points with an empty specification")]
fn extract_everything(
    #[from(store)] store: &RefCell<Option<SqliteOsmStore>>,
    #[from(outcome)] outcome: &Outcome,
) {
    let request = request(&json!({}));
    run(store, outcome, |store| extract_nodes_as_points(store, &request));
}

#[then("the layer has one polygon without holes")]
fn hole_free(
    #[from(store)] store: &RefCell<Option<SqliteOsmStore>>,
    #[from(outcome)] outcome: &Outcome,
) {
    let polygon = single_polygon(store, outcome);
    assert!(polygon.interiors().is_empty(), "unexpected holes");
    assert_eq!(polygon.exterior().0.len(), 5);
}

#[then("the layer has one polygon with one hole")]
fn one_hole(
    #[from(store)] store: &RefCell<Option<SqliteOsmStore>>,
    #[from(outcome)] outcome: &Outcome,
) {
    let polygon = single_polygon(store, outcome);
    assert_eq!(polygon.interiors().len(), 1);
}

#[then("no matching data is reported")]
fn no_matching_data(#[from(outcome)] outcome: &Outcome) {
    let borrowed = outcome.borrow();
    match borrowed.as_ref().expect("extraction was attempted") {
        Err(err) => assert!(err.is_no_matching_data(), "unexpected error: {err}"),
        Ok(table) => panic!("expected no data, got table {table}"),
    }
}

#[then("every tagged node becomes a point")]
fn tagged_nodes_become_points(
    #[from(store)] store: &RefCell<Option<SqliteOsmStore>>,
    #[from(outcome)] outcome: &Outcome,
) {
    let table = outcome
        .borrow()
        .as_ref()
        .expect("extraction was attempted")
        .as_ref()
        .expect("expected a layer")
        .clone();
    let guard = store.borrow();
    let layer = guard
        .as_ref()
        .expect("store prepared")
        .read_layer(&table)
        .expect("layer readable");
    let ids: BTreeMap<String, Geometry> = layer
        .records
        .iter()
        .filter_map(|record| {
            let id = layer.value(record, "id")?.as_text()?.to_owned();
            Some((id, record.geometry.clone()))
        })
        .collect();
    assert_eq!(ids.keys().collect::<Vec<_>>(), ["n50", "n51"]);
    assert!(ids.values().all(|geometry| matches!(geometry, Geometry::Point(_))));
    assert_eq!(layer.column_names(), ["id", "amenity", "name"]);
}

#[test]
fn scenario_indices_follow_feature_order() {
    let feature = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/features/layer_assembly.feature");
    let contents = fs::read_to_string(&feature).unwrap_or_else(|err| {
        panic!("failed to read feature file {feature:?}: {err}");
    });
    let titles: Vec<&str> = contents
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Scenario: "))
        .collect();
    assert_eq!(
        titles,
        [
            "a single outer ring yields a hole-free polygon",
            "a contained inner ring becomes a hole",
            "a filter matching nothing reports no data",
            "an empty specification selects every tagged node",
        ]
    );
}

#[scenario(path = "tests/features/layer_assembly.feature", index = 0)]
fn single_outer_ring(store: RefCell<Option<SqliteOsmStore>>, outcome: Outcome) {
    let _ = (store, outcome);
}

#[scenario(path = "tests/features/layer_assembly.feature", index = 1)]
fn contained_inner_ring(store: RefCell<Option<SqliteOsmStore>>, outcome: Outcome) {
    let _ = (store, outcome);
}

#[scenario(path = "tests/features/layer_assembly.feature", index = 2)]
fn filter_matching_nothing(store: RefCell<Option<SqliteOsmStore>>, outcome: Outcome) {
    let _ = (store, outcome);
}

#[scenario(path = "tests/features/layer_assembly.feature", index = 3)]
fn empty_specification(store: RefCell<Option<SqliteOsmStore>>, outcome: Outcome) {
    let _ = (store, outcome);
}
