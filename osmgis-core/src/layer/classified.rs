//! Layers carrying a single classified `type` column: rails, vegetation and
//! water.

use log::{debug, info};

use crate::{
    attributes::z_index,
    config::{ClassifiedLayerConfig, RailConfig, VegetationConfig, WaterConfig},
    geometry::explode,
    store::{Column, ColumnType, Layer, OsmStore, TableName, TablePrefix, Value},
};

use super::{
    Extraction, LayerError, preset_request, read_staged, run_staged,
    extract::{to_lines, to_polygons, write},
    pivot::{ID_COLUMN, record_tags},
};

fn output_layer(epsg: i32) -> Layer {
    Layer::new(
        epsg,
        vec![
            Column::new("id", ColumnType::Integer),
            Column::text("id_source"),
            Column::text("type"),
            Column::new("zindex", ColumnType::Integer),
        ],
    )
}

fn build_classified<S: OsmStore>(
    store: &mut S,
    prefix: &TablePrefix,
    epsg: i32,
    config: &ClassifiedLayerConfig,
    layer: &str,
    extraction: Extraction<S>,
) -> Result<TableName, LayerError> {
    let columns = config
        .columns
        .iter()
        .cloned()
        .chain(config.type_mapping.keys())
        .chain(std::iter::once("layer".to_owned()));
    let request = preset_request(prefix, epsg, &config.tags, columns)?;
    run_staged(store, |store, staging| {
        let source = read_staged(store, staging, extraction, &request)?;
        let available = source.column_names();
        let mut output = output_layer(epsg);
        let mut next_id: i64 = 1;
        for record in &source.records {
            let id_source = source
                .value(record, ID_COLUMN)
                .and_then(Value::as_text)
                .unwrap_or_default()
                .to_owned();
            let tags = record_tags(&source, record);
            let Some(kind) = config.type_mapping.classify_value(&tags, &available) else {
                debug!("dropping {layer} feature {id_source} without a type");
                continue;
            };
            let zindex = z_index(tags.get("layer").map(String::as_str));
            for part in explode(record.geometry.clone()) {
                output.push(
                    part,
                    vec![
                        Value::Integer(next_id),
                        Value::Text(id_source.clone()),
                        Value::from(kind),
                        Value::Integer(zindex),
                    ],
                );
                next_id += 1;
            }
        }
        if output.is_empty() {
            return Err(LayerError::no_match(layer));
        }
        info!("{} {layer} features", output.len());
        write(store, prefix, layer, &output)
    })
}

/// Build the rail layer: classified lines.
///
/// # Errors
/// Returns [`LayerError::NoMatchingData`] when no rail gets a type.
pub fn build_rails<S: OsmStore>(
    store: &mut S,
    prefix: &TablePrefix,
    epsg: i32,
    config: &RailConfig,
) -> Result<TableName, LayerError> {
    build_classified(store, prefix, epsg, &config.0, "rails", to_lines::<S>)
}

/// Build the vegetation layer: classified polygons.
///
/// # Errors
/// Returns [`LayerError::NoMatchingData`] when no area gets a type.
pub fn build_vegetation<S: OsmStore>(
    store: &mut S,
    prefix: &TablePrefix,
    epsg: i32,
    config: &VegetationConfig,
) -> Result<TableName, LayerError> {
    build_classified(store, prefix, epsg, &config.0, "vegetation", to_polygons::<S>)
}

/// Build the water layer: classified polygons.
///
/// # Errors
/// Returns [`LayerError::NoMatchingData`] when no area gets a type.
pub fn build_water<S: OsmStore>(
    store: &mut S,
    prefix: &TablePrefix,
    epsg: i32,
    config: &WaterConfig,
) -> Result<TableName, LayerError> {
    build_classified(store, prefix, epsg, &config.0, "water", to_polygons::<S>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Tags,
        config::LayerPreset,
        store::{RawSnapshot, RawWay},
        test_support::{MemoryOsmStore, square_nodes},
    };
    use rstest::{fixture, rstest};

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[fixture]
    fn store() -> (MemoryOsmStore, TablePrefix) {
        let prefix = TablePrefix::new("osm").expect("prefix");
        let mut store = MemoryOsmStore::default();
        let mut nodes = square_nodes(1, 0.0, 0.0, 0.01);
        nodes.extend(square_nodes(11, 1.0, 0.0, 0.01));
        let snapshot = RawSnapshot {
            nodes,
            ways: vec![
                RawWay {
                    id: 1,
                    nodes: vec![1, 2, 3, 4, 1],
                    tags: tags(&[("natural", "water"), ("layer", "1")]),
                },
                RawWay {
                    id: 2,
                    nodes: vec![11, 12, 13, 14, 11],
                    tags: tags(&[("natural", "wood")]),
                },
            ],
            ..RawSnapshot::default()
        };
        store.load_raw(&prefix, &snapshot).expect("load");
        (store, prefix)
    }

    #[rstest]
    fn water_keeps_only_classified_areas(store: (MemoryOsmStore, TablePrefix)) {
        let (mut store, prefix) = store;
        let config = WaterConfig::builtin().expect("preset");
        let table = build_water(&mut store, &prefix, 4326, &config).expect("layer");
        let layer = store.read_layer(&table).expect("read");
        assert_eq!(layer.len(), 1);
        let record = &layer.records[0];
        assert_eq!(layer.value(record, "id_source").and_then(Value::as_text), Some("w1"));
        assert_eq!(layer.value(record, "zindex").and_then(Value::as_integer), Some(1));
        assert!(layer.value(record, "type").and_then(Value::as_text).is_some());
    }

    #[rstest]
    fn rails_report_no_matching_data(store: (MemoryOsmStore, TablePrefix)) {
        let (mut store, prefix) = store;
        let config = RailConfig::builtin().expect("preset");
        let err = build_rails(&mut store, &prefix, 4326, &config).expect_err("no rails");
        assert!(err.is_no_matching_data());
        assert_eq!(store.layer_names().len(), 0);
    }

    #[rstest]
    fn unsupported_projection_is_rejected_before_reading(store: (MemoryOsmStore, TablePrefix)) {
        let (mut store, prefix) = store;
        let config = VegetationConfig::builtin().expect("preset");
        let err = build_vegetation(&mut store, &prefix, 1234, &config).expect_err("epsg");
        assert!(matches!(err, LayerError::UnsupportedProjection { epsg: 1234 }));
    }
}
