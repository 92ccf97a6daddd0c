use std::sync::Arc;

use chrono::{DateTime, Utc};
use cid::Cid;
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::{
    catalog::{ConcatenationPlan, ResolutionMethod, ResolvedSource},
    dataset::{Dataset, Indexer},
    errors::{Error, Result},
    geom::BoundingBox,
    select::{self, Axes, PointOptions, PointsOptions},
    time::{normalize_time_range, TimeValue},
};

/// Names tried, in order, when looking for the time axis.
pub const TIME_ALIASES: [&str; 4] = ["time", "t", "date", "datetime"];

/// Where a dataset came from. Shared, unchanged, by every view derived from it.
///
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatasetMetadata {
    pub dataset: String,
    pub collection: String,
    pub variant: String,
    pub organization: Option<String>,
    pub path: String,

    #[serde(serialize_with = "serialize_cid")]
    pub cid: Cid,

    /// Variants merged into this dataset, in priority order. Empty unless concatenated.
    pub concatenated_variants: Vec<String>,

    pub source: ResolutionMethod,
    pub fetched_at: DateTime<Utc>,
}

fn serialize_cid<S: Serializer>(cid: &Cid, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(cid)
}

impl DatasetMetadata {
    pub fn from_resolved(resolved: &ResolvedSource, fetched_at: DateTime<Utc>) -> Self {
        Self {
            dataset: resolved.dataset.clone(),
            collection: resolved.collection.clone(),
            variant: resolved.variant.clone(),
            organization: resolved.organization.clone(),
            path: resolved.path.clone(),
            cid: resolved.cid,
            concatenated_variants: vec![],
            source: resolved.method,
            fetched_at,
        }
    }

    /// Metadata for a concatenated dataset. `cid` is that of the highest priority variant.
    pub fn from_plan(plan: &ConcatenationPlan, cid: Cid, fetched_at: DateTime<Utc>) -> Self {
        Self {
            dataset: plan.dataset.clone(),
            collection: plan.collection.clone(),
            variant: plan.variant_names().join("+"),
            organization: plan.organization.clone(),
            path: plan.path(),
            cid,
            concatenated_variants: plan.variant_names(),
            source: plan.method,
            fetched_at,
        }
    }
}

/// An opened dataset paired with its provenance.
///
/// Selections never modify a view, they return new ones sharing the same metadata.
///
#[derive(Clone, Debug)]
pub struct GeotemporalDataset {
    dataset: Arc<Dataset>,
    metadata: Arc<DatasetMetadata>,
    axes: Axes,
}

/// What `GeotemporalDataset::select` should do. Unset parts are skipped.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    pub point: Option<(f64, f64)>,
    pub time_range: Option<(TimeValue, TimeValue)>,
}

impl Selection {
    pub fn point(mut self, lat: f64, lon: f64) -> Self {
        self.point = Some((lat, lon));
        self
    }

    pub fn time_range<S: Into<TimeValue>, E: Into<TimeValue>>(mut self, start: S, end: E) -> Self {
        self.time_range = Some((start.into(), end.into()));
        self
    }
}

/// Result of `GeotemporalDataset::select_with_outcome`.
///
#[derive(Debug)]
pub enum SelectOutcome {
    /// Every requested selection was applied.
    Complete(GeotemporalDataset),

    /// The point selection succeeded but the time range then failed. The view is the point
    /// selection alone.
    PointOnly {
        view: GeotemporalDataset,
        reason: Error,
    },
}

impl SelectOutcome {
    pub fn into_view(self) -> GeotemporalDataset {
        match self {
            SelectOutcome::Complete(view) => view,
            SelectOutcome::PointOnly { view, .. } => view,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, SelectOutcome::Complete(_))
    }
}

impl GeotemporalDataset {
    pub fn new(dataset: Dataset, metadata: DatasetMetadata) -> Self {
        Self {
            dataset: Arc::new(dataset),
            metadata: Arc::new(metadata),
            axes: Axes::default(),
        }
    }

    /// Use explicitly named latitude/longitude axes for geographic selections.
    pub fn with_axes(mut self, axes: Axes) -> Self {
        self.axes = axes;
        self
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// Whether both views carry the very same metadata, i.e. derive from the same load.
    pub fn same_origin(&self, other: &GeotemporalDataset) -> bool {
        Arc::ptr_eq(&self.metadata, &other.metadata)
    }

    fn derive(&self, dataset: Dataset) -> Self {
        Self {
            dataset: Arc::new(dataset),
            metadata: Arc::clone(&self.metadata),
            axes: self.axes.clone(),
        }
    }

    /// Nearest grid cell to (`lat`, `lon`).
    pub fn point(&self, lat: f64, lon: f64) -> Result<Self> {
        let options = PointOptions {
            axes: self.axes.clone(),
            ..Default::default()
        };
        self.point_with(lat, lon, &options)
    }

    pub fn point_with(&self, lat: f64, lon: f64, options: &PointOptions) -> Result<Self> {
        Ok(self.derive(select::select_point(&self.dataset, lat, lon, options)?))
    }

    /// Several grid cells, snapped to the nearest grid point.
    pub fn points(&self, lats: &[f64], lons: &[f64]) -> Result<Self> {
        let options = PointsOptions {
            axes: self.axes.clone(),
            ..Default::default()
        };
        self.points_with(lats, lons, &options)
    }

    pub fn points_with(&self, lats: &[f64], lons: &[f64], options: &PointsOptions) -> Result<Self> {
        Ok(self.derive(select::select_points(&self.dataset, lats, lons, options)?))
    }

    pub fn circle(&self, center_lat: f64, center_lon: f64, radius_km: f64) -> Result<Self> {
        let dataset =
            select::select_circle(&self.dataset, center_lat, center_lon, radius_km, &self.axes)?;
        Ok(self.derive(dataset))
    }

    pub fn rectangle(
        &self,
        min_lat: f64,
        min_lon: f64,
        max_lat: f64,
        max_lon: f64,
    ) -> Result<Self> {
        let bounds = BoundingBox::new(min_lat, min_lon, max_lat, max_lon);
        Ok(self.derive(select::select_rectangle(&self.dataset, &bounds, &self.axes)?))
    }

    /// Time steps between `start` and `end`, both included. Reversed ranges are swapped.
    ///
    /// The endpoints are interpreted according to the time coordinate's values: numbers for a
    /// numeric axis, dates for a temporal one. Fails with `InvalidSelection` when there's no time
    /// axis and `NoDataFound` when no time step falls in the range, or the result is otherwise
    /// empty.
    ///
    pub fn time_range<S, E>(&self, start: S, end: E) -> Result<Self>
    where
        S: Into<TimeValue>,
        E: Into<TimeValue>,
    {
        let dim = TIME_ALIASES
            .iter()
            .copied()
            .find(|alias| self.dataset.has_dim(alias))
            .ok_or_else(|| {
                Error::InvalidSelection(format!(
                    "no time axis ({}) in dataset with dimensions: {}",
                    TIME_ALIASES.join("/"),
                    self.dataset.dims().join(", ")
                ))
            })?;
        let coord = self
            .dataset
            .coord(dim)
            .ok_or_else(|| Error::InvalidSelection(format!("dataset has no dimension '{dim}'")))?;

        let range = normalize_time_range(&start.into(), &end.into(), coord.first().as_ref())?;
        let indices: Vec<usize> = (0..coord.len())
            .filter(|&index| coord.comparable(index).map_or(false, |value| range.contains(value)))
            .collect();
        if indices.is_empty() {
            return Err(Error::NoDataFound(format!(
                "no '{dim}' values between {} and {}",
                range.start, range.end
            )));
        }

        let selected = self.dataset.isel(dim, Indexer::Indices(indices))?;
        if selected.is_empty() {
            return Err(Error::NoDataFound(format!(
                "no data between {} and {}, dataset has an empty dimension",
                range.start, range.end
            )));
        }

        Ok(self.derive(selected))
    }

    /// Apply a point selection, then a time range.
    pub fn select(&self, selection: &Selection) -> Result<Self> {
        Ok(self.select_with_outcome(selection)?.into_view())
    }

    /// Like `select`, but says whether the time range was actually applied.
    ///
    /// If the point selection succeeds and the time range then fails, the point selection alone is
    /// returned as `SelectOutcome::PointOnly`. Without a point selection, time range errors are
    /// returned as they are.
    ///
    pub fn select_with_outcome(&self, selection: &Selection) -> Result<SelectOutcome> {
        let view = match selection.point {
            Some((lat, lon)) => self.point(lat, lon)?,
            None => self.clone(),
        };

        let (start, end) = match &selection.time_range {
            Some(range) => range.clone(),
            None => return Ok(SelectOutcome::Complete(view)),
        };
        match view.time_range(start, end) {
            Ok(selected) => Ok(SelectOutcome::Complete(selected)),
            Err(err) if selection.point.is_some() => {
                warn!(
                    "Time range selection on {} failed, keeping point selection only: {err}",
                    self.metadata.path
                );
                Ok(SelectOutcome::PointOnly { view, reason: err })
            }
            Err(err) => Err(err),
        }
    }
}
