//! Decoding of Overpass API JSON responses.

use std::collections::BTreeMap;

use log::{debug, warn};
use osmgis_core::{
    RelationMember,
    store::{RawNode, RawRelation, RawSnapshot, RawWay},
};
use serde::Deserialize;

use super::{OsmLoadError, validated_coord};

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    remark: Option<String>,
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Element {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    Way {
        id: i64,
        #[serde(default)]
        nodes: Vec<i64>,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    Relation {
        id: i64,
        #[serde(default)]
        members: Vec<Member>,
        #[serde(default)]
        tags: BTreeMap<String, String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Member {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "ref")]
    reference: i64,
    #[serde(default)]
    role: String,
}

/// Decode an Overpass `[out:json]` response into a raw snapshot.
///
/// Nodes with out-of-range coordinates are skipped. Relation members other
/// than ways are ignored.
///
/// # Examples
/// ```
/// use osmgis_data::load_overpass_json;
///
/// let body = br#"{"elements": [
///     {"type": "node", "id": 1, "lat": 47.65, "lon": -2.76, "tags": {"amenity": "bench"}}
/// ]}"#;
/// let snapshot = load_overpass_json(body)?;
/// assert_eq!(snapshot.nodes.len(), 1);
/// # Ok::<(), osmgis_data::OsmLoadError>(())
/// ```
///
/// # Errors
/// Returns [`OsmLoadError::Json`] for malformed documents and
/// [`OsmLoadError::Overpass`] when the server reports a runtime error.
pub fn load_overpass_json(body: &[u8]) -> Result<RawSnapshot, OsmLoadError> {
    let response: Response =
        serde_json::from_slice(body).map_err(|source| OsmLoadError::Json { source })?;
    if let Some(remark) = response.remark {
        if remark.contains("error") {
            return Err(OsmLoadError::Overpass { remark });
        }
        warn!("overpass remark: {remark}");
    }

    let mut snapshot = RawSnapshot::default();
    for element in response.elements {
        match element {
            Element::Node { id, lat, lon, tags } => {
                let Some(coord) = validated_coord(lon, lat) else {
                    debug!("skipping node {id} with invalid coordinates");
                    continue;
                };
                snapshot.nodes.push(RawNode { id, coord, tags });
            }
            Element::Way { id, nodes, tags } => snapshot.ways.push(RawWay { id, nodes, tags }),
            Element::Relation { id, members, tags } => {
                let members = members
                    .into_iter()
                    .filter(|member| member.kind == "way")
                    .map(|member| RelationMember::new(member.reference, &member.role))
                    .collect();
                snapshot.relations.push(RawRelation { id, members, tags });
            }
            Element::Other => {}
        }
    }
    Ok(snapshot)
}
