//! Geographic selection over a dataset's latitude and longitude axes.
//!
use ndarray::Array2;

use crate::{
    dataset::{Dataset, Indexer},
    errors::{Error, Result},
    geom::{haversine, in_range, BoundingBox, MatchMethod, Rect},
};

/// Names tried, in order, when looking for the latitude axis.
pub const LATITUDE_ALIASES: [&str; 3] = ["latitude", "lat", "y"];

/// Names tried, in order, when looking for the longitude axis.
pub const LONGITUDE_ALIASES: [&str; 4] = ["longitude", "lon", "lng", "x"];

/// Name of the dimension introduced by multi-point selection.
pub const POINT_DIMENSION: &str = "point";

/// Coordinate reference systems multi-point selection accepts. Only the dataset's own.
const NATIVE_CRS: [&str; 2] = ["native", "EPSG:4326"];

/// Explicit axis names, for datasets whose axes aren't found by alias.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Axes {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointOptions {
    pub axes: Axes,

    /// Require an exact coordinate match instead of the nearest one
    pub exact: bool,

    /// Maximum distance, in degrees, between requested and matched coordinates
    pub tolerance: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointsOptions {
    pub axes: Axes,

    /// Coordinate reference system of the requested points. `None` means native.
    pub crs: Option<String>,

    /// Snap every point to the nearest grid cell, however far away it is. Otherwise points must be
    /// within `tolerance` degrees of a grid cell.
    pub snap_to_grid: bool,

    pub tolerance: f64,
}

impl Default for PointsOptions {
    fn default() -> Self {
        Self {
            axes: Axes::default(),
            crs: None,
            snap_to_grid: true,
            tolerance: 0.1,
        }
    }
}

impl PointOptions {
    fn method(&self) -> MatchMethod {
        if self.exact {
            MatchMethod::Exact {
                tolerance: self.tolerance,
            }
        } else {
            MatchMethod::Nearest {
                tolerance: self.tolerance,
            }
        }
    }
}

/// Find the latitude and longitude dimension names of `dataset`.
///
/// Explicit names in `axes` must exist. Otherwise the aliases are tried in order.
///
pub fn find_axes(dataset: &Dataset, axes: &Axes) -> Result<(String, String)> {
    let latitude = find_axis(dataset, axes.latitude.as_deref(), &LATITUDE_ALIASES, "latitude")?;
    let longitude = find_axis(
        dataset,
        axes.longitude.as_deref(),
        &LONGITUDE_ALIASES,
        "longitude",
    )?;

    Ok((latitude, longitude))
}

fn find_axis(
    dataset: &Dataset,
    explicit: Option<&str>,
    aliases: &[&str],
    what: &str,
) -> Result<String> {
    let found = match explicit {
        Some(name) => dataset.has_dim(name).then_some(name),
        None => aliases.iter().copied().find(|alias| dataset.has_dim(alias)),
    };

    found.map(String::from).ok_or_else(|| {
        let tried = match explicit {
            Some(name) => name.to_string(),
            None => aliases.join("/"),
        };
        Error::InvalidSelection(format!(
            "no {what} axis ({tried}) in dataset with dimensions: {}",
            dataset.dims().join(", ")
        ))
    })
}

/// Select the grid cell at (`lat`, `lon`), collapsing both axes.
///
pub fn select_point(
    dataset: &Dataset,
    lat: f64,
    lon: f64,
    options: &PointOptions,
) -> Result<Dataset> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(Error::InvalidSelection(format!(
            "point ({lat}, {lon}) is not a valid coordinate"
        )));
    }
    let (lat_dim, lon_dim) = find_axes(dataset, &options.axes)?;
    let method = options.method();

    let selected = dataset
        .sel(&lat_dim, lat, method)?
        .sel(&lon_dim, lon, method)?;
    if selected.is_empty() {
        return Err(Error::NoDataFound(format!("no data at point ({lat}, {lon})")));
    }

    Ok(selected)
}

/// Select several points at once. The `i`-th point is (`lats[i]`, `lons[i]`).
///
/// Both axes are replaced by a new `point` dimension as long as the inputs.
///
pub fn select_points(
    dataset: &Dataset,
    lats: &[f64],
    lons: &[f64],
    options: &PointsOptions,
) -> Result<Dataset> {
    if lats.is_empty() || lats.len() != lons.len() {
        return Err(Error::InvalidSelection(format!(
            "latitudes and longitudes must be non-empty and of equal length, got {} and {}",
            lats.len(),
            lons.len()
        )));
    }
    if let Some(crs) = &options.crs {
        if !NATIVE_CRS.iter().any(|native| native.eq_ignore_ascii_case(crs)) {
            return Err(Error::InvalidSelection(format!(
                "unsupported coordinate reference system '{crs}', only {} are supported",
                NATIVE_CRS.join(" and ")
            )));
        }
    }
    let (lat_dim, lon_dim) = find_axes(dataset, &options.axes)?;

    let method = if options.snap_to_grid {
        MatchMethod::Nearest { tolerance: None }
    } else {
        MatchMethod::Nearest {
            tolerance: Some(options.tolerance),
        }
    };

    dataset.sel_points(
        &[(lat_dim.as_str(), lats), (lon_dim.as_str(), lons)],
        method,
        POINT_DIMENSION,
    )
}

/// Select every grid cell inside `bounds`, edges included.
///
/// The bounds must be strictly ordered on both axes and the dataset's coordinates must be valid
/// degrees. Nothing inside the box gives an empty dataset rather than an error.
///
pub fn select_rectangle(
    dataset: &Dataset,
    bounds: &BoundingBox,
    axes: &Axes,
) -> Result<Dataset> {
    let BoundingBox {
        min_lat,
        min_lon,
        max_lat,
        max_lon,
    } = *bounds;
    if [min_lat, min_lon, max_lat, max_lon].iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidSelection(format!(
            "rectangle bounds must be finite: {bounds:?}"
        )));
    }
    if min_lat >= max_lat {
        return Err(Error::InvalidSelection(format!(
            "min_lat ({min_lat}) must be less than max_lat ({max_lat})"
        )));
    }
    if min_lon >= max_lon {
        return Err(Error::InvalidSelection(format!(
            "min_lon ({min_lon}) must be less than max_lon ({max_lon})"
        )));
    }

    let (lat_dim, lon_dim) = find_axes(dataset, axes)?;
    let (lats, lons) = geographic_values(dataset, &lat_dim, &lon_dim)?;

    let lat_indices = (0..lats.len())
        .filter(|&i| bounds.contains_lat(lats[i]))
        .collect();
    let lon_indices = (0..lons.len())
        .filter(|&i| bounds.contains_lon(lons[i]))
        .collect();

    dataset
        .isel(&lat_dim, indexer(lat_indices))?
        .isel(&lon_dim, indexer(lon_indices))
}

/// Select grid cells within `radius_km` of the center, boundary included.
///
/// Cells outside the circle are set missing, then the result is cropped to the smallest index
/// window still holding data. The crop looks at the first data variable only.
///
pub fn select_circle(
    dataset: &Dataset,
    center_lat: f64,
    center_lon: f64,
    radius_km: f64,
    axes: &Axes,
) -> Result<Dataset> {
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(Error::InvalidSelection(format!(
            "radius must be greater than zero, got {radius_km}"
        )));
    }
    if !in_range(center_lat, -90.0, 90.0) || !in_range(center_lon, -180.0, 180.0) {
        return Err(Error::InvalidSelection(format!(
            "center ({center_lat}, {center_lon}) is not a valid coordinate"
        )));
    }

    let (lat_dim, lon_dim) = find_axes(dataset, axes)?;
    let (lats, lons) = geographic_values(dataset, &lat_dim, &lon_dim)?;

    let mask = Array2::from_shape_fn((lats.len(), lons.len()), |(row, col)| {
        haversine(center_lat, center_lon, lats[row], lons[col]) <= radius_km
    });
    if !mask.iter().any(|inside| *inside) {
        return empty(dataset, &lat_dim, &lon_dim);
    }

    let masked = dataset.where_mask(&lat_dim, &lon_dim, &mask)?;
    let has_data = masked
        .data_vars()
        .first()
        .and_then(|var| var.plane_has_data(&lat_dim, &lon_dim))
        .unwrap_or_else(|| mask.clone());

    match Rect::bounding(lats.len(), lons.len(), |row, col| has_data[[row, col]]) {
        None => empty(dataset, &lat_dim, &lon_dim),
        Some(rect) => masked
            .isel(&lat_dim, Indexer::Range(rect.top..rect.bottom))?
            .isel(&lon_dim, Indexer::Range(rect.left..rect.right)),
    }
}

/// Latitude and longitude values, checked to be valid degrees.
fn geographic_values(
    dataset: &Dataset,
    lat_dim: &str,
    lon_dim: &str,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let lats = numeric(dataset, lat_dim)?;
    let lons = numeric(dataset, lon_dim)?;
    if let Some(lat) = lats.iter().find(|lat| !in_range(**lat, -90.0, 90.0)) {
        return Err(Error::InvalidSelection(format!(
            "'{lat_dim}' holds {lat}, outside [-90, 90]"
        )));
    }
    if let Some(lon) = lons.iter().find(|lon| !in_range(**lon, -180.0, 180.0)) {
        return Err(Error::InvalidSelection(format!(
            "'{lon_dim}' holds {lon}, outside [-180, 180]"
        )));
    }

    Ok((lats, lons))
}

fn numeric(dataset: &Dataset, dim: &str) -> Result<Vec<f64>> {
    dataset
        .coord(dim)
        .ok_or_else(|| Error::InvalidSelection(format!("dataset has no dimension '{dim}'")))?
        .numeric_values()
}

fn indexer(indices: Vec<usize>) -> Indexer {
    if indices.is_empty() {
        Indexer::Range(0..0)
    } else {
        Indexer::Indices(indices)
    }
}

fn empty(dataset: &Dataset, lat_dim: &str, lon_dim: &str) -> Result<Dataset> {
    dataset
        .isel(lat_dim, Indexer::Range(0..0))?
        .isel(lon_dim, Indexer::Range(0..0))
}
