//! Layer presets: tag filters, kept columns, mapping tables and parameters.
//!
//! Each preset deserialises from JSON. A built-in document ships with the
//! crate for every layer and is used when the caller supplies no override.
//!
//! # Examples
//! ```
//! use osmgis_core::config::{LayerPreset, RoadConfig};
//!
//! let roads = RoadConfig::builtin()?;
//! assert_eq!(roads.default_type, "Small main road");
//! assert_eq!(roads.default_speed("Highway"), Some(130.0));
//! # Ok::<(), osmgis_core::config::ConfigError>(())
//! ```

use std::{collections::BTreeMap, io::Read};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{LevelParameters, LevelRule, TagFilter, TagMapping};

/// Errors raised while loading a layer preset.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The JSON document did not describe a valid preset.
    #[error("invalid {preset} configuration: {source}")]
    Parse {
        /// Preset being loaded.
        preset: &'static str,
        /// JSON decoding failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Shared loading behaviour for layer presets.
pub trait LayerPreset: DeserializeOwned {
    /// Short preset name used in error messages.
    const NAME: &'static str;
    /// Embedded default document.
    const BUILTIN: &'static str;

    /// Parse a preset from JSON text.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] when the text is not a valid preset.
    fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            preset: Self::NAME,
            source,
        })
    }

    /// Parse a preset from a reader yielding JSON.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] when reading fails or the document is
    /// not a valid preset.
    fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        serde_json::from_reader(reader).map_err(|source| ConfigError::Parse {
            preset: Self::NAME,
            source,
        })
    }

    /// The preset shipped with the crate.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] if the embedded document is invalid.
    fn builtin() -> Result<Self, ConfigError> {
        Self::from_json_str(Self::BUILTIN)
    }
}

/// Building layer preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingConfig {
    /// Elements to select.
    #[serde(default)]
    pub tags: TagFilter,
    /// Tag columns kept alongside the filter keys.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Building type and use mapping.
    pub type_mapping: TagMapping,
    /// Level handling per building type; unknown types are single-level.
    #[serde(default)]
    pub level_by_type: BTreeMap<String, LevelRule>,
    /// Level height thresholds.
    #[serde(flatten)]
    pub levels: LevelParameters,
}

impl BuildingConfig {
    /// Level rule for a building type.
    #[must_use]
    pub fn level_rule(&self, kind: &str) -> LevelRule {
        self.level_by_type.get(kind).copied().unwrap_or_default()
    }
}

impl LayerPreset for BuildingConfig {
    const NAME: &'static str = "buildings";
    const BUILTIN: &'static str = include_str!("../../config/buildings.json");
}

fn default_road_type() -> String {
    "Small main road".to_owned()
}

/// Road layer preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadConfig {
    /// Elements to select.
    #[serde(default)]
    pub tags: TagFilter,
    /// Tag columns kept alongside the filter keys.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Road type mapping.
    pub type_mapping: TagMapping,
    /// Surface category mapping.
    #[serde(default)]
    pub surface_mapping: TagMapping,
    /// Speed in km/h used when `maxspeed` is missing or unparseable.
    #[serde(default)]
    pub maxspeed_by_type: BTreeMap<String, f64>,
    /// Type assigned when no mapping entry matches.
    #[serde(default = "default_road_type")]
    pub default_type: String,
}

impl RoadConfig {
    /// Default speed for a road type.
    #[must_use]
    pub fn default_speed(&self, kind: &str) -> Option<f64> {
        self.maxspeed_by_type.get(kind).copied()
    }
}

impl LayerPreset for RoadConfig {
    const NAME: &'static str = "roads";
    const BUILTIN: &'static str = include_str!("../../config/roads.json");
}

/// Preset for layers carrying a single classified `type` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedLayerConfig {
    /// Elements to select.
    #[serde(default)]
    pub tags: TagFilter,
    /// Tag columns kept alongside the filter keys.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Type mapping.
    pub type_mapping: TagMapping,
}

/// Rail layer preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RailConfig(pub ClassifiedLayerConfig);

/// Vegetation layer preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VegetationConfig(pub ClassifiedLayerConfig);

/// Water layer preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaterConfig(pub ClassifiedLayerConfig);

impl LayerPreset for RailConfig {
    const NAME: &'static str = "rails";
    const BUILTIN: &'static str = include_str!("../../config/rails.json");
}

impl LayerPreset for VegetationConfig {
    const NAME: &'static str = "vegetation";
    const BUILTIN: &'static str = include_str!("../../config/vegetation.json");
}

impl LayerPreset for WaterConfig {
    const NAME: &'static str = "water";
    const BUILTIN: &'static str = include_str!("../../config/water.json");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tags;
    use rstest::rstest;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[rstest]
    fn builtin_presets_parse() {
        BuildingConfig::builtin().expect("buildings preset");
        RoadConfig::builtin().expect("roads preset");
        RailConfig::builtin().expect("rails preset");
        VegetationConfig::builtin().expect("vegetation preset");
        WaterConfig::builtin().expect("water preset");
    }

    #[rstest]
    fn building_preset_keeps_catch_all_last() {
        let config = BuildingConfig::builtin().expect("buildings preset");
        let last = config.type_mapping.entries().last().expect("entries");
        assert_eq!(last.label, "building");
        assert_eq!(config.level_rule("building"), LevelRule::MultiAboveThreshold);
        assert_eq!(config.level_rule("residential"), LevelRule::Multi);
        assert_eq!(config.level_rule("unknown"), LevelRule::Single);
        assert_eq!(config.levels, LevelParameters::default());
    }

    #[rstest]
    fn building_preset_classifies_houses() {
        let config = BuildingConfig::builtin().expect("buildings preset");
        let row = tags(&[("building", "house"), ("shop", "bakery")]);
        let class = config
            .type_mapping
            .classify(&row, &config.columns)
            .expect("house matches");
        assert_eq!(class.kind, "commercial");
        assert_eq!(class.usage, "house");
    }

    #[rstest]
    fn level_parameters_default_when_absent() {
        let config = BuildingConfig::from_json_str(r#"{"type_mapping": {}}"#).expect("minimal");
        assert_eq!(config.levels, LevelParameters::default());
        assert!(config.tags.is_vacuous());
    }

    #[rstest]
    fn road_type_defaults_when_absent() {
        let config = RoadConfig::from_json_str(r#"{"type_mapping": {}}"#).expect("minimal");
        assert_eq!(config.default_type, "Small main road");
        assert_eq!(config.default_speed("Highway"), None);
    }

    #[rstest]
    fn rejects_malformed_filters() {
        let err = WaterConfig::from_json_str(r#"{"tags": 3, "type_mapping": {}}"#)
            .expect_err("scalar filter");
        assert!(matches!(err, ConfigError::Parse { preset: "water", .. }));
    }

    #[rstest]
    fn reads_from_readers() {
        let text = br#"{"tags": ["railway"], "type_mapping": {"rail": {"railway": "rail"}}}"#;
        let config = RailConfig::from_reader(&text[..]).expect("valid preset");
        assert_eq!(config.0.tags, TagFilter::keys(["railway"]));
    }
}
