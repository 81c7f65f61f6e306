//! Generic extractions of points, lines and polygons.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::{
    ElementKind,
    geometry::{Feature, Reprojector, Topology},
    store::{Layer, OsmStore, TableName, TablePrefix},
};

use super::{
    Extraction, LayerError, LayerRequest, read_staged, run_staged,
    pivot::{key_selection, pivot_columns, pivot_layer, pivot_values},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    NodePoints,
    WayLines,
    WayPolygons,
    RelationLines,
    RelationPolygons,
}

impl Source {
    const fn kind(self) -> ElementKind {
        match self {
            Self::NodePoints => ElementKind::Node,
            Self::WayLines | Self::WayPolygons => ElementKind::Way,
            Self::RelationLines | Self::RelationPolygons => ElementKind::Relation,
        }
    }

    const fn layer(self) -> &'static str {
        match self {
            Self::NodePoints => "points",
            Self::WayLines => "way_lines",
            Self::WayPolygons => "way_polygons",
            Self::RelationLines => "relation_lines",
            Self::RelationPolygons => "relation_polygons",
        }
    }
}

fn load_topology<S: OsmStore>(
    store: &S,
    prefix: &TablePrefix,
    kind: ElementKind,
    ids: &BTreeSet<i64>,
) -> Result<Topology, LayerError> {
    let mut topology = Topology::default();
    let way_ids = match kind {
        ElementKind::Node => {
            topology.nodes = store.node_coords(prefix, ids).map_err(LayerError::store)?;
            return Ok(topology);
        }
        ElementKind::Way => ids.clone(),
        ElementKind::Relation => {
            topology.relations = store
                .relation_members(prefix, ids)
                .map_err(LayerError::store)?;
            topology
                .relations
                .values()
                .flatten()
                .map(|member| member.way)
                .collect()
        }
    };
    topology.ways = store.way_nodes(prefix, &way_ids).map_err(LayerError::store)?;
    let node_ids: BTreeSet<i64> = topology.ways.values().flatten().copied().collect();
    topology.nodes = store.node_coords(prefix, &node_ids).map_err(LayerError::store)?;
    Ok(topology)
}

/// Filter, reconstruct, pivot and reproject into an in-memory layer.
fn collect<S: OsmStore>(
    store: &S,
    request: &LayerRequest,
    source: Source,
) -> Result<Layer, LayerError> {
    let reprojector = Reprojector::new(request.epsg)?;
    let kind = source.kind();
    let ids = store
        .matching_ids(&request.prefix, kind, &request.tags)
        .map_err(LayerError::store)?;
    if ids.is_empty() {
        return Err(LayerError::no_match(source.layer()));
    }

    let topology = load_topology(store, &request.prefix, kind, &ids)?;
    let features = match source {
        Source::NodePoints => topology.points(ids.iter().copied()),
        Source::WayLines => topology.way_lines(ids.iter().copied()),
        Source::WayPolygons => topology.way_polygons(ids.iter().copied()),
        Source::RelationLines => topology.relation_lines(ids.iter().copied()),
        Source::RelationPolygons => topology.relation_polygons(ids.iter().copied()),
    };
    if features.is_empty() {
        return Err(LayerError::no_match(source.layer()));
    }

    let tags = store
        .element_tags(&request.prefix, kind, &ids, &key_selection(request))
        .map_err(LayerError::store)?;
    let keys = pivot_columns(tags.values());
    let mut layer = pivot_layer(request.epsg, &keys);
    for Feature { id, geometry } in features {
        match reprojector.reproject(&geometry) {
            Ok(projected) => {
                layer.push(projected, pivot_values(id.to_string(), &keys, tags.get(&id.raw)));
            }
            Err(err) => debug!("dropping {id}: {err}"),
        }
    }
    if layer.is_empty() {
        return Err(LayerError::no_match(source.layer()));
    }
    Ok(layer)
}

/// Write `layer` into a fresh table named after `name`.
pub(super) fn write<S: OsmStore>(
    store: &mut S,
    prefix: &TablePrefix,
    name: &str,
    layer: &Layer,
) -> Result<TableName, LayerError> {
    let table = TableName::fresh(prefix, name)?;
    store.create_layer(&table, layer).map_err(LayerError::store)?;
    info!("wrote {} rows to {table}", layer.len());
    Ok(table)
}

fn extract<S: OsmStore>(
    store: &mut S,
    request: &LayerRequest,
    source: Source,
) -> Result<TableName, LayerError> {
    let layer = collect(store, request, source)?;
    write(store, &request.prefix, source.layer(), &layer)
}

/// One point per selected node.
///
/// # Errors
/// Returns [`LayerError::NoMatchingData`] when nothing is selected or
/// reconstructed, and [`LayerError::Store`] when the store fails.
pub fn extract_nodes_as_points<S: OsmStore>(
    store: &mut S,
    request: &LayerRequest,
) -> Result<TableName, LayerError> {
    extract(store, request, Source::NodePoints)
}

/// One line per selected way with at least two resolved nodes.
///
/// # Errors
/// As [`extract_nodes_as_points`].
pub fn extract_ways_as_lines<S: OsmStore>(
    store: &mut S,
    request: &LayerRequest,
) -> Result<TableName, LayerError> {
    extract(store, request, Source::WayLines)
}

/// One polygon per selected way forming a closed ring.
///
/// # Errors
/// As [`extract_nodes_as_points`].
pub fn extract_ways_as_polygons<S: OsmStore>(
    store: &mut S,
    request: &LayerRequest,
) -> Result<TableName, LayerError> {
    extract(store, request, Source::WayPolygons)
}

/// One multi-line per selected relation with at least two member lines.
///
/// # Errors
/// As [`extract_nodes_as_points`].
pub fn extract_relations_as_lines<S: OsmStore>(
    store: &mut S,
    request: &LayerRequest,
) -> Result<TableName, LayerError> {
    extract(store, request, Source::RelationLines)
}

/// One polygon per outer ring of each selected relation, holed by the
/// relation's inner rings it contains.
///
/// # Errors
/// As [`extract_nodes_as_points`].
pub fn extract_relations_as_polygons<S: OsmStore>(
    store: &mut S,
    request: &LayerRequest,
) -> Result<TableName, LayerError> {
    extract(store, request, Source::RelationPolygons)
}

/// Points from nodes.
///
/// # Errors
/// As [`extract_nodes_as_points`].
pub fn to_points<S: OsmStore>(
    store: &mut S,
    request: &LayerRequest,
) -> Result<TableName, LayerError> {
    extract_nodes_as_points(store, request)
}

/// Run both extractions into staging tables and merge them by column union.
fn merge_extractions<S: OsmStore>(
    store: &mut S,
    request: &LayerRequest,
    layer: &str,
    parts: [Extraction<S>; 2],
) -> Result<TableName, LayerError> {
    run_staged(store, |store, staging| {
        let mut merged: Option<Layer> = None;
        for part in parts {
            let read = match read_staged(store, staging, part, request) {
                Ok(read) => read,
                Err(err) if err.is_no_matching_data() => {
                    debug!("{err}");
                    continue;
                }
                Err(err) => return Err(err),
            };
            merged = Some(match merged {
                Some(previous) => previous.union(read),
                None => read,
            });
        }
        let merged = merged.ok_or_else(|| LayerError::no_match(layer))?;
        write(store, &request.prefix, layer, &merged)
    })
}

/// Lines from ways and relations, merged by column union.
///
/// # Errors
/// Returns [`LayerError::NoMatchingData`] when both sides are empty.
pub fn to_lines<S: OsmStore>(
    store: &mut S,
    request: &LayerRequest,
) -> Result<TableName, LayerError> {
    merge_extractions(
        store,
        request,
        "lines",
        [extract_ways_as_lines::<S>, extract_relations_as_lines::<S>],
    )
}

/// Polygons from ways and relations, merged by column union.
///
/// # Errors
/// Returns [`LayerError::NoMatchingData`] when both sides are empty.
pub fn to_polygons<S: OsmStore>(
    store: &mut S,
    request: &LayerRequest,
) -> Result<TableName, LayerError> {
    merge_extractions(
        store,
        request,
        "polygons",
        [extract_ways_as_polygons::<S>, extract_relations_as_polygons::<S>],
    )
}
