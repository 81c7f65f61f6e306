//! Tag pivoting: one text column per observed tag key.

use std::collections::{BTreeMap, BTreeSet};

use log::warn;

use crate::{
    Tags,
    store::{Column, GEOMETRY_COLUMN, KeySelection, Layer, Record, Value},
};

use super::LayerRequest;

/// Column holding the prefixed source element id.
pub const ID_COLUMN: &str = "id";

/// Keys to read for a request: the filter keys plus the kept columns, or
/// every key when both are empty.
pub(super) fn key_selection(request: &LayerRequest) -> KeySelection {
    let keys: BTreeSet<String> = request
        .tags
        .filter_keys()
        .map(str::to_owned)
        .chain(request.columns.iter().cloned())
        .collect();
    if keys.is_empty() {
        KeySelection::All
    } else {
        KeySelection::Only(keys)
    }
}

/// Distinct keys observed in `tags`, in key order.
///
/// Keys differing only by ASCII case fold into the first one in key order,
/// since SQL column names are case-insensitive. Keys clashing with the id or
/// geometry columns are skipped.
#[must_use]
pub fn pivot_columns<'a, I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Tags>,
{
    let observed: BTreeSet<&str> = tags
        .into_iter()
        .flat_map(|element| element.keys().map(String::as_str))
        .collect();
    let mut columns: Vec<String> = Vec::new();
    for key in observed {
        if key.eq_ignore_ascii_case(ID_COLUMN) || key.eq_ignore_ascii_case(GEOMETRY_COLUMN) {
            warn!("tag key {key:?} clashes with a reserved column, skipping");
            continue;
        }
        if let Some(column) = columns.iter().find(|c| c.eq_ignore_ascii_case(key)) {
            warn!("tag key {key:?} folded into column {column:?}");
            continue;
        }
        columns.push(key.to_owned());
    }
    columns
}

/// Empty layer with the id column followed by the pivot columns.
pub(super) fn pivot_layer(epsg: i32, keys: &[String]) -> Layer {
    let columns = std::iter::once(Column::text(ID_COLUMN))
        .chain(keys.iter().map(Column::text))
        .collect();
    Layer::new(epsg, columns)
}

/// Value of a pivot column: the exact key, else a key differing only by case.
fn column_value<'t>(tags: &'t Tags, key: &str) -> Option<&'t String> {
    tags.get(key).or_else(|| {
        tags.iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    })
}

/// Values of one pivoted row: the id then one value per key.
pub(super) fn pivot_values(id: String, keys: &[String], tags: Option<&Tags>) -> Vec<Value> {
    std::iter::once(Value::Text(id))
        .chain(
            keys.iter()
                .map(|key| Value::from(tags.and_then(|t| column_value(t, key)).cloned())),
        )
        .collect()
}

/// Tags of a pivoted record, read back from its text columns.
pub(super) fn record_tags(layer: &Layer, record: &Record) -> Tags {
    layer
        .columns
        .iter()
        .zip(&record.values)
        .filter(|(column, _)| column.name != ID_COLUMN)
        .filter_map(|(column, value)| Some((column.name.clone(), value.as_text()?.to_owned())))
        .collect::<BTreeMap<_, _>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Geometry, Point};
    use rstest::rstest;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[rstest]
    fn selection_combines_filter_keys_and_columns() {
        let request = LayerRequest::new("osm", 4326)
            .expect("request")
            .with_tags(crate::TagFilter::keys(["building"]))
            .with_columns(["height"]);
        let KeySelection::Only(keys) = key_selection(&request) else {
            panic!("expected a restricted selection");
        };
        assert_eq!(keys, BTreeSet::from(["building".to_owned(), "height".to_owned()]));
    }

    #[rstest]
    fn empty_request_selects_every_key() {
        let request = LayerRequest::new("osm", 4326).expect("request");
        assert_eq!(key_selection(&request), KeySelection::All);
    }

    #[rstest]
    fn pivot_skips_case_clashes_and_reserved_names() {
        let rows = [
            tags(&[("name", "A"), ("ID", "7")]),
            tags(&[("Name", "B"), ("the_geom", "x"), ("amenity", "bench")]),
        ];
        assert_eq!(pivot_columns(rows.iter()), ["Name", "amenity"]);
    }

    #[rstest]
    fn case_variant_keys_fill_the_folded_column() {
        let rows = [tags(&[("Name", "B")]), tags(&[("name", "A")])];
        let keys = pivot_columns(rows.iter());
        assert_eq!(keys, ["Name"]);
        assert_eq!(
            pivot_values("n1".to_owned(), &keys, Some(&rows[1])),
            [Value::Text("n1".to_owned()), Value::Text("A".to_owned())]
        );
        let both = tags(&[("Name", "B"), ("name", "A")]);
        assert_eq!(
            pivot_values("n2".to_owned(), &keys, Some(&both))[1],
            Value::Text("B".to_owned())
        );
    }

    #[rstest]
    fn records_read_back_as_tags() {
        let keys = vec!["amenity".to_owned(), "name".to_owned()];
        let mut layer = pivot_layer(4326, &keys);
        let row = tags(&[("amenity", "bench")]);
        layer.push(
            Geometry::Point(Point::new(0.0, 0.0)),
            pivot_values("n1".to_owned(), &keys, Some(&row)),
        );
        let record = layer.records.first().expect("row");
        assert_eq!(record_tags(&layer, record), row);
    }
}
