pub mod catalog;
mod client;
mod concat;
mod config;
mod dataset;
mod errors;
mod geom;
mod helpers;
mod select;
mod store;
mod time;
mod view;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use client::LoadOptions;

pub use concat::concatenate_variants;
pub use concat::load_variants;

pub use config::ClientConfig;
pub use config::{DEFAULT_CACHE_TTL_SECS, DEFAULT_CATALOG_ROOT, DEFAULT_GATEWAY_URL};

pub use dataset::{Coordinate, CoordinateValue, CoordinateValues, Dataset, Indexer, Variable};

pub use errors::Error;
pub use errors::Result;

pub use geom::{haversine, haversine_many, BoundingBox, MatchMethod, Rect, EARTH_RADIUS_KM};

pub use helpers::rearrange;

pub use select::{
    find_axes, select_circle, select_point, select_points, select_rectangle, Axes, PointOptions,
    PointsOptions, LATITUDE_ALIASES, LONGITUDE_ALIASES, POINT_DIMENSION,
};

pub use store::ArrayStore;

pub use time::{normalize_time_range, parse_date, SampleKind, TimeRange, TimeValue};

pub use view::{DatasetMetadata, GeotemporalDataset, SelectOutcome, Selection, TIME_ALIASES};
