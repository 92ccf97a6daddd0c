use std::result;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("organization '{organization}' not found. Available organizations: {}", list(.available))]
    OrganizationNotFound {
        organization: String,
        available: Vec<String>,
    },

    #[error("collection '{collection}' not found. Available collections: {}", list(.available))]
    CollectionNotFound {
        collection: String,
        available: Vec<String>,
    },

    #[error("dataset '{dataset}' not found in collection '{collection}'. Available datasets: {}", list(.available))]
    DatasetNotFound {
        collection: String,
        dataset: String,
        available: Vec<String>,
    },

    #[error("variant '{variant}' not found for dataset '{collection}-{dataset}'. Available variants: {}", list(.available))]
    VariantNotFound {
        collection: String,
        dataset: String,
        variant: String,
        available: Vec<String>,
    },

    #[error("dataset '{collection}-{dataset}' has several variants and none is a default; specify one of: {}", list(.available))]
    VariantRequiredAmbiguous {
        collection: String,
        dataset: String,
        available: Vec<String>,
    },

    #[error("{what} is ambiguous; candidates: {}", list(.candidates))]
    AmbiguousResolution { what: String, candidates: Vec<String> },

    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("invalid content identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("no data found: {0}")]
    NoDataFound(String),

    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("no variants to concatenate")]
    EmptyVariantSet,

    #[error("variant '{variant}' has no '{dimension}' coordinate to concatenate along")]
    MissingCoordinateDimension { variant: String, dimension: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl Error {
    /// Whether this is one of the catalog "not found" errors, which always carry the list of
    /// valid alternatives.
    ///
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::OrganizationNotFound { .. }
                | Error::CollectionNotFound { .. }
                | Error::DatasetNotFound { .. }
                | Error::VariantNotFound { .. }
        )
    }

    /// The valid alternatives carried by this error, if any.
    pub fn alternatives(&self) -> &[String] {
        match self {
            Error::OrganizationNotFound { available, .. }
            | Error::CollectionNotFound { available, .. }
            | Error::DatasetNotFound { available, .. }
            | Error::VariantNotFound { available, .. }
            | Error::VariantRequiredAmbiguous { available, .. } => available,
            Error::AmbiguousResolution { candidates, .. } => candidates,
            _ => &[],
        }
    }
}

fn list(items: &[String]) -> String {
    if items.is_empty() {
        String::from("(none)")
    } else {
        items.join(", ")
    }
}

pub type Result<T> = result::Result<T, Error>;
