use std::fmt::Debug;

use num_traits::Float;

use super::helpers::rearrange;

/// Mean radius of the Earth, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometers between two points given in degrees, using the haversine
/// formula.
///
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);

    // Cancellation can push `a` slightly below zero for nearly identical points
    let a = a.abs();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).abs().sqrt());

    EARTH_RADIUS_KM * c
}

/// Index-wise haversine over sequences.
///
/// The result is as long as the longest input. Shorter inputs wrap around via modulo indexing, so
/// a single center point can be compared against many grid points. Any empty input yields an
/// empty result.
///
pub fn haversine_many(lat1: &[f64], lon1: &[f64], lat2: &[f64], lon2: &[f64]) -> Vec<f64> {
    let lens = [lat1.len(), lon1.len(), lat2.len(), lon2.len()];
    if lens.iter().any(|&len| len == 0) {
        return vec![];
    }
    let n = lens.into_iter().max().unwrap_or(0);

    (0..n)
        .map(|i| {
            haversine(
                lat1[i % lat1.len()],
                lon1[i % lon1.len()],
                lat2[i % lat2.len()],
                lon2[i % lon2.len()],
            )
        })
        .collect()
}

/// A geographic bounding box in degrees. Membership is inclusive on every edge.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    pub fn contains_lat(&self, lat: f64) -> bool {
        in_range(lat, self.min_lat, self.max_lat)
    }

    pub fn contains_lon(&self, lon: f64) -> bool {
        in_range(lon, self.min_lon, self.max_lon)
    }
}

/// Inclusive range check.
pub fn in_range<N>(value: N, lower: N, upper: N) -> bool
where
    N: PartialOrd,
{
    lower <= value && value <= upper
}

/// How to match a requested coordinate value against a coordinate array.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MatchMethod {
    /// Closest value, optionally no further away than `tolerance`.
    Nearest { tolerance: Option<f64> },

    /// Equal value, optionally within `tolerance`. Without a tolerance, floating point equality.
    Exact { tolerance: Option<f64> },
}

impl Default for MatchMethod {
    fn default() -> Self {
        MatchMethod::Nearest { tolerance: None }
    }
}

/// Index of the value closest to `target`. Ties go to the earliest index. NaN values never match.
///
pub fn nearest_index<N>(values: &[N], target: N) -> Option<usize>
where
    N: Float + Debug,
{
    let mut best: Option<(usize, N)> = None;
    for (i, value) in values.iter().enumerate() {
        let distance = (*value - target).abs();
        if distance.is_nan() {
            continue;
        }
        match best {
            Some((_, best_distance)) if best_distance <= distance => {}
            _ => best = Some((i, distance)),
        }
    }

    best.map(|(i, _)| i)
}

/// Find the index matching `target` according to `method`.
///
pub fn match_index(values: &[f64], target: f64, method: MatchMethod) -> Option<usize> {
    match method {
        MatchMethod::Nearest { tolerance } => {
            let index = nearest_index(values, target)?;
            match tolerance {
                Some(tolerance) if (values[index] - target).abs() > tolerance => None,
                _ => Some(index),
            }
        }
        MatchMethod::Exact { tolerance: None } => values.iter().position(|&v| v == target),
        MatchMethod::Exact {
            tolerance: Some(tolerance),
        } => {
            let index = nearest_index(values, target)?;
            if (values[index] - target).abs() <= tolerance {
                Some(index)
            } else {
                None
            }
        }
    }
}

/// A rectangle of grid indices. `bottom` and `right` are exclusive.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
    _private: (),
}

impl Rect {
    pub fn new(top: usize, bottom: usize, left: usize, right: usize) -> Self {
        let (top, bottom) = rearrange(top, bottom);
        let (left, right) = rearrange(left, right);
        Self {
            top,
            bottom,
            left,
            right,
            _private: (),
        }
    }

    /// Smallest rectangle containing every `true` cell of `cells`, or `None` if there are none.
    ///
    /// `cells` is indexed as `cells(row, col)` over a `rows` x `cols` grid.
    ///
    pub fn bounding<F>(rows: usize, cols: usize, cells: F) -> Option<Self>
    where
        F: Fn(usize, usize) -> bool,
    {
        let mut bounds: Option<(usize, usize, usize, usize)> = None;
        for row in 0..rows {
            for col in 0..cols {
                if cells(row, col) {
                    bounds = Some(match bounds {
                        None => (row, row, col, col),
                        Some((top, bottom, left, right)) => {
                            (top.min(row), bottom.max(row), left.min(col), right.max(col))
                        }
                    });
                }
            }
        }

        bounds.map(|(top, bottom, left, right)| Self::new(top, bottom + 1, left, right + 1))
    }
}
