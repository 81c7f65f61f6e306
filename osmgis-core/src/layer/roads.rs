//! Road centre lines with type, surface, speed and direction.

use log::{debug, info};

use crate::{
    Tags,
    attributes::{speed_kmh, z_index},
    config::RoadConfig,
    geometry::explode,
    store::{Column, ColumnType, Layer, OsmStore, TableName, TablePrefix, Value},
};

use super::{
    LayerError, preset_request, read_staged, run_staged,
    extract::{to_lines, write},
    pivot::{ID_COLUMN, record_tags},
};

const LAYER: &str = "roads";
const EXTRA_KEYS: [&str; 4] = ["maxspeed", "oneway", "junction", "layer"];

fn output_layer(epsg: i32) -> Layer {
    Layer::new(
        epsg,
        vec![
            Column::new("id_road", ColumnType::Integer),
            Column::text("id_source"),
            Column::text("type"),
            Column::text("surface"),
            Column::new("maxspeed", ColumnType::Real),
            Column::text("oneway"),
            Column::new("zindex", ColumnType::Integer),
        ],
    )
}

fn is_oneway(tags: &Tags) -> bool {
    let oneway = tags
        .get("oneway")
        .is_some_and(|value| matches!(value.as_str(), "yes" | "true" | "1" | "-1"));
    oneway || tags.get("junction").is_some_and(|value| value == "roundabout")
}

/// Attribute values of one road, in output column order after the ids.
fn road_values(tags: &Tags, available: &[String], config: &RoadConfig) -> Vec<Value> {
    let kind = config
        .type_mapping
        .classify(tags, available)
        .map_or_else(|| config.default_type.clone(), |c| c.kind);
    let surface = config
        .surface_mapping
        .classify_value(tags, available)
        .map(str::to_owned);
    let maxspeed = speed_kmh(tags.get("maxspeed").map(String::as_str))
        .or_else(|| config.default_speed(&kind));
    let oneway = if is_oneway(tags) { "yes" } else { "no" };
    vec![
        Value::Text(kind),
        Value::from(surface),
        maxspeed.map_or(Value::Null, Value::Real),
        Value::from(oneway),
        Value::Integer(z_index(tags.get("layer").map(String::as_str))),
    ]
}

/// Build the road layer of `prefix` in `epsg`.
///
/// Lines come from ways and relations selected by `config.tags`; each part of
/// a multi-line becomes its own row. Rows no mapping entry matches get
/// `config.default_type`. A missing or unparseable `maxspeed` falls back to
/// the speed configured for the road type.
///
/// # Errors
/// Returns [`LayerError::NoMatchingData`] when no road is selected, and the
/// usual projection and store errors.
pub fn build_roads<S: OsmStore>(
    store: &mut S,
    prefix: &TablePrefix,
    epsg: i32,
    config: &RoadConfig,
) -> Result<TableName, LayerError> {
    let columns = config
        .columns
        .iter()
        .cloned()
        .chain(config.type_mapping.keys())
        .chain(config.surface_mapping.keys())
        .chain(EXTRA_KEYS.map(str::to_owned));
    let request = preset_request(prefix, epsg, &config.tags, columns)?;
    run_staged(store, |store, staging| {
        let source = read_staged(store, staging, to_lines::<S>, &request)?;
        let available = source.column_names();
        let mut output = output_layer(epsg);
        let mut next_id: i64 = 1;
        for record in &source.records {
            let id_source = source
                .value(record, ID_COLUMN)
                .and_then(Value::as_text)
                .unwrap_or_default()
                .to_owned();
            let values = road_values(&record_tags(&source, record), &available, config);
            let parts = explode(record.geometry.clone());
            if parts.is_empty() {
                debug!("dropping road {id_source} without line parts");
            }
            for part in parts {
                let mut row = vec![Value::Integer(next_id), Value::Text(id_source.clone())];
                row.extend(values.iter().cloned());
                output.push(part, row);
                next_id += 1;
            }
        }
        if output.is_empty() {
            return Err(LayerError::no_match(LAYER));
        }
        info!("{} road segments from {} lines", output.len(), source.len());
        write(store, prefix, LAYER, &output)
    })
}
