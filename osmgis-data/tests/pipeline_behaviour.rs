//! Behavioural tests for `run_pipeline` over the SQLite store.

use std::{cell::RefCell, fs, path::PathBuf};

use osmgis_core::{
    ProviderError,
    store::{OsmStore, RawTable, SqliteOsmStore, TablePrefix},
};
use osmgis_data::{
    LayerKind, LayerPresets, LayerStatus, PipelineError, PipelineReport, PipelineRequest,
    remote::test_support::{StubDownloader, StubGeocoder},
    run_pipeline,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

const PREFIX: &str = "vannes";

type Providers = RefCell<Option<(StubGeocoder, StubDownloader)>>;
type Outcome = RefCell<Option<Result<PipelineReport, PipelineError>>>;

fn prefix() -> TablePrefix {
    TablePrefix::new(PREFIX).expect("prefix")
}

#[fixture]
fn providers() -> Providers {
    RefCell::new(None)
}

#[fixture]
fn store() -> RefCell<SqliteOsmStore> {
    RefCell::new(SqliteOsmStore::open_in_memory().expect("in-memory database"))
}

#[fixture]
fn outcome() -> Outcome {
    RefCell::new(None)
}

fn sample_extract() -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/vannes_sample.json");
    fs::read(&path).unwrap_or_else(|err| panic!("failed to read fixture {path:?}: {err}"))
}

fn report(outcome: &Outcome) -> PipelineReport {
    outcome
        .borrow()
        .as_ref()
        .expect("pipeline was run")
        .as_ref()
        .expect("expected a successful run")
        .clone()
}

fn status_of(report: &PipelineReport, kind: LayerKind) -> LayerStatus {
    report
        .layers
        .iter()
        .find(|outcome| outcome.kind == kind)
        .map(|outcome| outcome.status.clone())
        .unwrap_or_else(|| panic!("no outcome for {kind}"))
}

#[given("providers serving a small extract of Vannes")]
fn serving_providers(#[from(providers)] providers: &Providers) {
    let geocoder = StubGeocoder::with_bbox("Vannes", -2.8, 47.6, -2.7, 47.7);
    let downloader = StubDownloader::with_body(sample_extract());
    *providers.borrow_mut() = Some((geocoder, downloader));
}

#[given("a geocoder that cannot find the place")]
fn failing_geocoder(#[from(providers)] providers: &Providers) {
    let geocoder = StubGeocoder::with_error(ProviderError::NotFound {
        query: "Vannes".into(),
    });
    let downloader = StubDownloader::with_body(sample_extract());
    *providers.borrow_mut() = Some((geocoder, downloader));
}

#[when("I run the pipeline for buildings, roads and rails")]
fn run_requested_layers(
    #[from(providers)] providers: &Providers,
    #[from(store)] store: &RefCell<SqliteOsmStore>,
    #[from(outcome)] outcome: &Outcome,
) {
    let presets = LayerPresets::builtin().expect("built-in presets");
    let request = PipelineRequest::new("Vannes", prefix(), 2154).with_layers([
        LayerKind::Buildings,
        LayerKind::Roads,
        LayerKind::Rails,
    ]);
    let guard = providers.borrow();
    let (geocoder, downloader) = guard.as_ref().expect("providers prepared");
    let result = run_pipeline(
        geocoder,
        downloader,
        &mut *store.borrow_mut(),
        &request,
        &presets,
    );
    *outcome.borrow_mut() = Some(result);
}

#[then("the buildings and roads layers are written")]
fn layers_written(
    #[from(store)] store: &RefCell<SqliteOsmStore>,
    #[from(outcome)] outcome: &Outcome,
) {
    let report = report(outcome);
    let written: Vec<LayerKind> = report.written().map(|(kind, _)| kind).collect();
    assert_eq!(written, [LayerKind::Buildings, LayerKind::Roads]);
    let store = store.borrow();
    for (kind, table) in report.written() {
        let layer = store.read_layer(table).expect("layer readable");
        assert_eq!(layer.len(), 1, "expected one {kind} row");
    }
}

#[then("the rails layer is reported empty")]
fn rails_empty(#[from(outcome)] outcome: &Outcome) {
    assert_eq!(status_of(&report(outcome), LayerKind::Rails), LayerStatus::Empty);
}

#[then("no raw tables remain")]
fn raw_tables_dropped(#[from(store)] store: &RefCell<SqliteOsmStore>) {
    let store = store.borrow();
    let prefix = prefix();
    for table in RawTable::ALL {
        let name = prefix.raw(table);
        assert!(
            !store.table_exists(&name).expect("existence check"),
            "raw table {name} was not dropped"
        );
    }
}

#[then("a geocoding error is returned")]
fn geocoding_error(#[from(outcome)] outcome: &Outcome) {
    let borrowed = outcome.borrow();
    match borrowed.as_ref().expect("pipeline was run") {
        Err(PipelineError::Geocode { place, source }) => {
            assert_eq!(place, "Vannes");
            assert!(matches!(source, ProviderError::NotFound { .. }));
        }
        Err(other) => panic!("expected a geocoding error, got {other:?}"),
        Ok(report) => panic!("expected a failure, got {report:?}"),
    }
}

#[then("nothing was downloaded")]
fn nothing_downloaded(#[from(providers)] providers: &Providers) {
    let guard = providers.borrow();
    let (_, downloader) = guard.as_ref().expect("providers prepared");
    assert!(downloader.queries().is_empty());
}

#[test]
fn scenario_indices_follow_feature_order() {
    let feature = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/features/pipeline.feature");
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
            "requested layers are written for a geocoded place",
            "an unknown place aborts the run",
        ]
    );
}

#[scenario(path = "tests/features/pipeline.feature", index = 0)]
fn requested_layers_written(providers: Providers, store: RefCell<SqliteOsmStore>, outcome: Outcome) {
    let _ = (providers, store, outcome);
}

#[scenario(path = "tests/features/pipeline.feature", index = 1)]
fn unknown_place_aborts(providers: Providers, store: RefCell<SqliteOsmStore>, outcome: Outcome) {
    let _ = (providers, store, outcome);
}
