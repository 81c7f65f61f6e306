//! Numeric attributes derived from OSM tag values.
//!
//! Every function here is total: unparseable or absent inputs fall back to a
//! default instead of failing.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Miles to kilometres factor applied to `mph` speeds.
pub const MPH_TO_KMH: f64 = 1.609;

fn parse_f64(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|text| text.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// Wall height: total height minus roof height.
///
/// Needs one of `height`/`b_height` and one of `roof_height`/`b_roof_height`
/// to parse. The `b_` variants win when both forms parse. Returns `0.0`
/// otherwise.
#[must_use]
pub fn height_wall(
    height: Option<&str>,
    b_height: Option<&str>,
    roof_height: Option<&str>,
    b_roof_height: Option<&str>,
) -> f64 {
    let total = parse_f64(b_height).or_else(|| parse_f64(height));
    let roof = parse_f64(b_roof_height).or_else(|| parse_f64(roof_height));
    match (total, roof) {
        (Some(total), Some(roof)) => total - roof,
        _ => 0.0,
    }
}

/// Roof height: `height`, else `b_height`, else `0.0`.
#[must_use]
pub fn height_roof(height: Option<&str>, b_height: Option<&str>) -> f64 {
    parse_f64(height)
        .or_else(|| parse_f64(b_height))
        .unwrap_or(0.0)
}

/// Level count: `b_lev` plus `roof_lev` (else `b_roof_lev`), truncated.
///
/// Returns `0` when `b_lev` does not parse.
#[must_use]
pub fn nb_levels(b_lev: Option<&str>, roof_lev: Option<&str>, b_roof_lev: Option<&str>) -> i64 {
    let Some(levels) = parse_f64(b_lev) else {
        return 0;
    };
    let roof = parse_f64(roof_lev)
        .or_else(|| parse_f64(b_roof_lev))
        .unwrap_or(0.0);
    truncate(levels + roof)
}

/// Layer ordering from the `layer` tag, `0` when absent or unparseable.
#[must_use]
pub fn z_index(layer: Option<&str>) -> i64 {
    layer
        .and_then(|text| text.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

static SPEED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d+)\s*(km/h|kmh|mph)?$").ok());

/// Speed in km/h from a `maxspeed` value such as `50`, `30 mph` or `90km/h`.
///
/// Returns `None` when the value is absent or not a speed; callers then use a
/// type-based default.
///
/// # Examples
/// ```
/// use osmgis_core::attributes::speed_kmh;
///
/// assert_eq!(speed_kmh(Some("50")), Some(50.0));
/// assert_eq!(speed_kmh(Some("walk")), None);
/// ```
#[must_use]
pub fn speed_kmh(maxspeed: Option<&str>) -> Option<f64> {
    let regex = SPEED.as_ref()?;
    let captures = regex.captures(maxspeed?.trim())?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    let is_mph = captures
        .get(2)
        .is_some_and(|unit| unit.as_str().eq_ignore_ascii_case("mph"));
    Some(if is_mph { value * MPH_TO_KMH } else { value })
}

fn truncate(value: f64) -> i64 {
    value.trunc() as i64
}

fn as_f64(levels: i64) -> f64 {
    levels as f64
}

/// How a building type maps to level handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LevelRule {
    /// Always a single level.
    #[default]
    Single,
    /// Levels derived from heights.
    Multi,
    /// Levels derived from heights above the two-level threshold only.
    MultiAboveThreshold,
}

impl From<LevelRule> for u8 {
    fn from(rule: LevelRule) -> Self {
        match rule {
            LevelRule::Single => 0,
            LevelRule::Multi => 1,
            LevelRule::MultiAboveThreshold => 2,
        }
    }
}

impl TryFrom<u8> for LevelRule {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Single),
            1 => Ok(Self::Multi),
            2 => Ok(Self::MultiAboveThreshold),
            other => Err(format!("level rule must be 0, 1 or 2, found {other}")),
        }
    }
}

/// Height thresholds used when reconciling building heights and levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelParameters {
    /// Minimum height of one level, in metres.
    pub h_lev_min: f64,
    /// Maximum height of one level, in metres.
    pub h_lev_max: f64,
    /// Wall height above which two-level buildings get multiple levels.
    pub h_threshold_lev2: f64,
}

impl Default for LevelParameters {
    fn default() -> Self {
        Self {
            h_lev_min: 3.0,
            h_lev_max: 15.0,
            h_threshold_lev2: 10.0,
        }
    }
}

/// Wall height, roof height and level count of one building.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BuildingHeights {
    /// Height of the walls, in metres.
    pub height_wall: f64,
    /// Height of the roof ridge, in metres.
    pub height_roof: f64,
    /// Number of levels.
    pub nb_levels: i64,
}

impl BuildingHeights {
    /// Derive raw values from the height and level tags of one building.
    #[must_use]
    pub fn from_tags(tags: &crate::Tags) -> Self {
        let get = |key: &str| tags.get(key).map(String::as_str);
        Self {
            height_wall: height_wall(
                get("height"),
                get("building:height"),
                get("roof:height"),
                get("building:roof:height"),
            ),
            height_roof: height_roof(get("height"), get("building:height")),
            nb_levels: nb_levels(
                get("building:levels"),
                get("roof:levels"),
                get("building:roof:levels"),
            ),
        }
    }
}

/// Fill missing heights and levels from one another, then clamp.
///
/// Type-1 buildings always get level derivation; type-2 buildings only when
/// the wall height exceeds `h_threshold_lev2`. Every other building is a
/// single level.
#[must_use]
pub fn reconcile_heights_and_levels(
    heights: BuildingHeights,
    params: &LevelParameters,
    rule: LevelRule,
) -> BuildingHeights {
    let BuildingHeights {
        mut height_wall,
        mut height_roof,
        mut nb_levels,
    } = heights;
    let LevelParameters {
        h_lev_min,
        h_lev_max,
        h_threshold_lev2,
    } = *params;
    let min_from_levels = |levels: i64| {
        if levels == 0 {
            h_lev_min
        } else {
            h_lev_min * as_f64(levels)
        }
    };

    if height_wall == 0.0 {
        height_wall = if height_roof == 0.0 {
            min_from_levels(nb_levels)
        } else {
            height_roof
        };
    }
    if height_roof == 0.0 {
        height_roof = if height_wall == 0.0 {
            min_from_levels(nb_levels)
        } else {
            height_wall
        };
    }

    let multi_level = rule == LevelRule::Multi
        || (rule == LevelRule::MultiAboveThreshold && height_wall > h_threshold_lev2);
    if multi_level {
        if nb_levels == 0 {
            nb_levels = if height_wall != 0.0 {
                truncate(height_wall / h_lev_min)
            } else if height_roof != 0.0 {
                truncate(height_roof / h_lev_min)
            } else {
                1
            };
        }
    } else {
        nb_levels = 1;
    }

    if height_wall > height_roof {
        height_roof = height_wall;
    }
    if as_f64(nb_levels) * h_lev_min > height_roof {
        height_roof = as_f64(nb_levels) * h_lev_min;
    }
    if multi_level && as_f64(nb_levels) * h_lev_max < height_wall {
        nb_levels = truncate(height_wall / h_lev_max);
    }

    BuildingHeights {
        height_wall,
        height_roof,
        nb_levels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("20"), Some("22"), Some("5"), Some("4"), 18.0)]
    #[case(Some("20"), None, Some("5"), None, 15.0)]
    #[case(Some("20"), Some("x"), None, Some("2"), 18.0)]
    #[case(Some("20"), None, None, None, 0.0)]
    #[case(None, None, Some("5"), None, 0.0)]
    fn wall_height_prefers_building_prefixed_tags(
        #[case] height: Option<&str>,
        #[case] b_height: Option<&str>,
        #[case] roof: Option<&str>,
        #[case] b_roof: Option<&str>,
        #[case] expected: f64,
    ) {
        assert!((height_wall(height, b_height, roof, b_roof) - expected).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(Some("12"), Some("9"), 12.0)]
    #[case(Some("tall"), Some("9"), 9.0)]
    #[case(None, None, 0.0)]
    fn roof_height_prefers_plain_height(
        #[case] height: Option<&str>,
        #[case] b_height: Option<&str>,
        #[case] expected: f64,
    ) {
        assert!((height_roof(height, b_height) - expected).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(Some("3"), Some("1"), Some("2"), 4)]
    #[case(Some("3"), None, Some("2"), 5)]
    #[case(Some("2.7"), None, None, 2)]
    #[case(None, Some("1"), None, 0)]
    fn levels_add_roof_levels(
        #[case] b_lev: Option<&str>,
        #[case] roof_lev: Option<&str>,
        #[case] b_roof_lev: Option<&str>,
        #[case] expected: i64,
    ) {
        assert_eq!(nb_levels(b_lev, roof_lev, b_roof_lev), expected);
    }

    #[rstest]
    #[case(Some("50"), Some(50.0))]
    #[case(Some("30 MPH"), Some(30.0 * MPH_TO_KMH))]
    #[case(Some("90km/h"), Some(90.0))]
    #[case(Some("70 kmh"), Some(70.0))]
    #[case(Some("invalid"), None)]
    #[case(Some("50;30"), None)]
    #[case(None, None)]
    fn parses_speeds(#[case] raw: Option<&str>, #[case] expected: Option<f64>) {
        assert_eq!(speed_kmh(raw), expected);
    }

    #[rstest]
    fn fifty_mph_is_about_eighty_kmh() {
        let speed = speed_kmh(Some("50 mph")).expect("mph parses");
        assert!((speed - 80.45).abs() < 1e-9, "got {speed}");
    }

    #[rstest]
    #[case(Some("-1"), -1)]
    #[case(Some(" 2 "), 2)]
    #[case(Some("ground"), 0)]
    #[case(None, 0)]
    fn parses_z_index(#[case] raw: Option<&str>, #[case] expected: i64) {
        assert_eq!(z_index(raw), expected);
    }

    #[rstest]
    fn single_level_buildings_force_one_level() {
        let out = reconcile_heights_and_levels(
            BuildingHeights {
                height_wall: 0.0,
                height_roof: 0.0,
                nb_levels: 4,
            },
            &LevelParameters::default(),
            LevelRule::Single,
        );
        assert_eq!(out.nb_levels, 1);
        assert!((out.height_wall - 12.0).abs() < f64::EPSILON);
        assert!((out.height_roof - 12.0).abs() < f64::EPSILON);
    }

    #[rstest]
    fn multi_level_derives_levels_from_wall_height() {
        let out = reconcile_heights_and_levels(
            BuildingHeights {
                height_wall: 10.0,
                height_roof: 12.0,
                nb_levels: 0,
            },
            &LevelParameters::default(),
            LevelRule::Multi,
        );
        assert_eq!(out.nb_levels, 3);
        assert!((out.height_roof - 12.0).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(8.0, 1)]
    #[case(12.0, 4)]
    fn threshold_rule_applies_above_two_level_height(#[case] wall: f64, #[case] expected: i64) {
        let out = reconcile_heights_and_levels(
            BuildingHeights {
                height_wall: wall,
                height_roof: wall,
                nb_levels: 0,
            },
            &LevelParameters::default(),
            LevelRule::MultiAboveThreshold,
        );
        assert_eq!(out.nb_levels, expected);
    }

    #[rstest]
    fn type_one_ignores_threshold() {
        let out = reconcile_heights_and_levels(
            BuildingHeights {
                height_wall: 6.0,
                height_roof: 6.0,
                nb_levels: 0,
            },
            &LevelParameters::default(),
            LevelRule::Multi,
        );
        assert_eq!(out.nb_levels, 2);
    }

    #[rstest]
    fn tall_walls_cap_levels_by_maximum_level_height() {
        let out = reconcile_heights_and_levels(
            BuildingHeights {
                height_wall: 100.0,
                height_roof: 100.0,
                nb_levels: 2,
            },
            &LevelParameters::default(),
            LevelRule::Multi,
        );
        assert_eq!(out.nb_levels, 6);
    }

    #[rstest]
    fn roof_is_raised_to_fit_levels() {
        let out = reconcile_heights_and_levels(
            BuildingHeights {
                height_wall: 5.0,
                height_roof: 6.0,
                nb_levels: 4,
            },
            &LevelParameters::default(),
            LevelRule::Multi,
        );
        assert!((out.height_roof - 12.0).abs() < f64::EPSILON);
    }

    #[rstest]
    fn level_rule_round_trips_through_integers() {
        let rule: LevelRule = serde_json::from_str("2").expect("valid rule");
        assert_eq!(rule, LevelRule::MultiAboveThreshold);
        assert!(serde_json::from_str::<LevelRule>("3").is_err());
    }

    fn tag_value() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            "[0-9]{1,3}(\\.[0-9])?".prop_map(Some),
            "[a-z ]{0,6}".prop_map(Some),
        ]
    }

    fn rule() -> impl Strategy<Value = LevelRule> {
        prop_oneof![
            Just(LevelRule::Single),
            Just(LevelRule::Multi),
            Just(LevelRule::MultiAboveThreshold),
        ]
    }

    proptest! {
        #[test]
        fn derivations_are_total(
            a in tag_value(),
            b in tag_value(),
            c in tag_value(),
            d in tag_value(),
        ) {
            let wall = height_wall(a.as_deref(), b.as_deref(), c.as_deref(), d.as_deref());
            let roof = height_roof(a.as_deref(), b.as_deref());
            let levels = nb_levels(a.as_deref(), b.as_deref(), c.as_deref());
            prop_assert!(wall.is_finite());
            prop_assert!(roof.is_finite());
            prop_assert!(levels >= 0);
        }

        #[test]
        fn reconciliation_is_stable_without_corrections(
            wall in 1.0f64..60.0,
            extra in 0.0f64..20.0,
            levels in 1i64..4,
            rule in rule(),
        ) {
            let params = LevelParameters::default();
            let roof = (wall + extra).max(params.h_lev_min * 4.0);
            let once = reconcile_heights_and_levels(
                BuildingHeights { height_wall: wall, height_roof: roof, nb_levels: levels },
                &params,
                rule,
            );
            let twice = reconcile_heights_and_levels(once, &params, rule);
            prop_assert_eq!(once, twice);
        }
    }
}
