//! Reprojection from stored WGS84 coordinates to a target EPSG code.

use std::fmt;

use geo::{Coord, Geometry, MapCoords};
use proj4rs::proj::Proj;
use thiserror::Error;

/// EPSG code of the stored coordinates.
pub const STORAGE_EPSG: i32 = 4326;

const WGS84: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Errors raised while preparing or applying a reprojection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    /// The code is zero or negative.
    #[error("EPSG code must be positive, got {epsg}")]
    Invalid {
        /// Offending code.
        epsg: i32,
    },
    /// No definition is known for the code.
    #[error("EPSG:{epsg} is not a supported projection")]
    Unsupported {
        /// Offending code.
        epsg: i32,
    },
    /// The projection definition could not be built.
    #[error("failed to build EPSG:{epsg}: {message}")]
    Definition {
        /// Code being built.
        epsg: i32,
        /// Message reported by the projection library.
        message: String,
    },
    /// A coordinate could not be transformed.
    #[error("failed to reproject coordinate to EPSG:{epsg}: {message}")]
    Transform {
        /// Target code.
        epsg: i32,
        /// Message reported by the projection library.
        message: String,
    },
}

/// Proj definition for an EPSG code from the bundled EPSG registry.
///
/// Codes outside the registry, or registered without a proj4 form, have no
/// definition.
#[must_use]
pub fn proj_definition(epsg: i32) -> Option<String> {
    if epsg == STORAGE_EPSG {
        return Some(WGS84.to_owned());
    }
    u16::try_from(epsg)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4.trim())
        .filter(|definition| !definition.is_empty())
        .map(str::to_owned)
}

/// Check an EPSG code without building the projection.
///
/// # Errors
/// Returns [`ProjectionError::Invalid`] for non-positive codes and
/// [`ProjectionError::Unsupported`] for codes without a known definition.
pub fn validate_epsg(epsg: i32) -> Result<(), ProjectionError> {
    if epsg <= 0 {
        return Err(ProjectionError::Invalid { epsg });
    }
    if proj_definition(epsg).is_none() {
        return Err(ProjectionError::Unsupported { epsg });
    }
    Ok(())
}

/// Transforms geometries from [`STORAGE_EPSG`] to one target code.
///
/// # Examples
/// ```
/// use geo::{Geometry, Point};
/// use osmgis_core::geometry::Reprojector;
///
/// let to_mercator = Reprojector::new(3857)?;
/// let projected = to_mercator.reproject(&Geometry::Point(Point::new(0.0, 0.0)))?;
/// let Geometry::Point(point) = projected else { unreachable!() };
/// assert!(point.x().abs() < 1e-6);
/// # Ok::<(), osmgis_core::geometry::ProjectionError>(())
/// ```
pub struct Reprojector {
    epsg: i32,
    projections: Option<(Proj, Proj)>,
}

impl fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reprojector")
            .field("epsg", &self.epsg)
            .finish_non_exhaustive()
    }
}

impl Reprojector {
    /// Prepare a reprojection to `epsg`.
    ///
    /// # Errors
    /// Returns [`ProjectionError::Invalid`] or [`ProjectionError::Unsupported`]
    /// for unusable codes, and [`ProjectionError::Definition`] if the
    /// projection library rejects the definition.
    pub fn new(epsg: i32) -> Result<Self, ProjectionError> {
        validate_epsg(epsg)?;
        if epsg == STORAGE_EPSG {
            return Ok(Self {
                epsg,
                projections: None,
            });
        }
        let definition = proj_definition(epsg).ok_or(ProjectionError::Unsupported { epsg })?;
        let build = |text: &str| {
            Proj::from_proj_string(text).map_err(|err| ProjectionError::Definition {
                epsg,
                message: err.to_string(),
            })
        };
        Ok(Self {
            epsg,
            projections: Some((build(WGS84)?, build(&definition)?)),
        })
    }

    /// Target EPSG code.
    #[must_use]
    pub const fn epsg(&self) -> i32 {
        self.epsg
    }

    /// Transform a single longitude/latitude coordinate.
    ///
    /// # Errors
    /// Returns [`ProjectionError::Transform`] when the library fails.
    pub fn project(&self, coord: Coord) -> Result<Coord, ProjectionError> {
        let Some((source, target)) = &self.projections else {
            return Ok(coord);
        };
        let mut point = (coord.x.to_radians(), coord.y.to_radians(), 0.0);
        proj4rs::transform::transform(source, target, &mut point).map_err(|err| {
            ProjectionError::Transform {
                epsg: self.epsg,
                message: err.to_string(),
            }
        })?;
        Ok(Coord {
            x: point.0,
            y: point.1,
        })
    }

    /// Transform every coordinate of a geometry.
    ///
    /// # Errors
    /// Returns [`ProjectionError::Transform`] when any coordinate fails.
    pub fn reproject(&self, geometry: &Geometry) -> Result<Geometry, ProjectionError> {
        geometry.try_map_coords(|coord| self.project(coord))
    }
}
