//! Building footprints with typed heights, levels and uses.

use log::{debug, info};

use crate::{
    BuildingHeights, Tags,
    attributes::{reconcile_heights_and_levels, z_index},
    config::BuildingConfig,
    geometry::explode,
    store::{Column, ColumnType, Layer, OsmStore, TableName, TablePrefix, Value},
};

use super::{
    LayerError, preset_request, read_staged, run_staged,
    extract::{to_polygons, write},
    pivot::{ID_COLUMN, record_tags},
};

const LAYER: &str = "buildings";
const FALLBACK_TYPE: &str = "building";
const HEIGHT_KEYS: [&str; 8] = [
    "height",
    "building:height",
    "roof:height",
    "building:roof:height",
    "building:levels",
    "roof:levels",
    "building:roof:levels",
    "layer",
];

fn output_layer(epsg: i32) -> Layer {
    Layer::new(
        epsg,
        vec![
            Column::new("id_build", ColumnType::Integer),
            Column::text("id_source"),
            Column::new("height_wall", ColumnType::Real),
            Column::new("height_roof", ColumnType::Real),
            Column::new("nb_lev", ColumnType::Integer),
            Column::text("type"),
            Column::text("main_use"),
            Column::new("zindex", ColumnType::Integer),
        ],
    )
}

/// Typed attributes of one building, or `None` when it is dropped.
#[derive(Debug, Clone, PartialEq)]
struct BuildingAttributes {
    kind: String,
    main_use: String,
    heights: BuildingHeights,
    zindex: i64,
}

fn derive(tags: &Tags, available: &[String], config: &BuildingConfig) -> Option<BuildingAttributes> {
    let (kind, main_use) = match config.type_mapping.classify(tags, available) {
        Some(classification) => (classification.kind, classification.usage),
        None => match tags.get("building").map(String::as_str) {
            Some(value) if value != "no" => (FALLBACK_TYPE.to_owned(), FALLBACK_TYPE.to_owned()),
            _ => return None,
        },
    };
    if kind.is_empty() {
        return None;
    }
    let heights = reconcile_heights_and_levels(
        BuildingHeights::from_tags(tags),
        &config.levels,
        config.level_rule(&kind),
    );
    let zindex = z_index(tags.get("layer").map(String::as_str));
    if heights.nb_levels <= 0 || zindex < 0 {
        return None;
    }
    Some(BuildingAttributes {
        kind,
        main_use,
        heights,
        zindex,
    })
}

/// Build the building layer of `prefix` in `epsg`.
///
/// Polygons come from ways and relations selected by `config.tags`. Each row
/// gets a type and use from `config.type_mapping`, and heights and levels
/// reconciled with `config.levels`. Multi-part footprints are exploded into
/// one row per polygon. Rows without a type, with no level, or below ground
/// are dropped.
///
/// # Errors
/// Returns [`LayerError::NoMatchingData`] when no building survives, and the
/// usual projection and store errors.
pub fn build_buildings<S: OsmStore>(
    store: &mut S,
    prefix: &TablePrefix,
    epsg: i32,
    config: &BuildingConfig,
) -> Result<TableName, LayerError> {
    let columns = config
        .columns
        .iter()
        .cloned()
        .chain(config.type_mapping.keys())
        .chain(HEIGHT_KEYS.map(str::to_owned));
    let request = preset_request(prefix, epsg, &config.tags, columns)?;
    run_staged(store, |store, staging| {
        let source = read_staged(store, staging, to_polygons::<S>, &request)?;
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
            let Some(attributes) = derive(&tags, &available, config) else {
                debug!("dropping building {id_source}");
                continue;
            };
            for part in explode(record.geometry.clone()) {
                output.push(
                    part,
                    vec![
                        Value::Integer(next_id),
                        Value::Text(id_source.clone()),
                        Value::Real(attributes.heights.height_wall),
                        Value::Real(attributes.heights.height_roof),
                        Value::Integer(attributes.heights.nb_levels),
                        Value::Text(attributes.kind.clone()),
                        Value::Text(attributes.main_use.clone()),
                        Value::Integer(attributes.zindex),
                    ],
                );
                next_id += 1;
            }
        }
        if output.is_empty() {
            return Err(LayerError::no_match(LAYER));
        }
        info!("{} buildings from {} footprints", output.len(), source.len());
        write(store, prefix, LAYER, &output)
    })
}
