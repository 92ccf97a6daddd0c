use std::fmt;

use cid::Cid;
use serde::Serialize;

/// What a caller wants to load.
///
/// Only the dataset name is required. Everything else narrows the search, and a `cid` bypasses
/// the catalogs entirely.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetRequest {
    pub organization: Option<String>,
    pub collection: Option<String>,
    pub dataset: String,
    pub variant: Option<String>,
    pub cid: Option<String>,
}

impl DatasetRequest {
    pub fn new<S: Into<String>>(dataset: S) -> Self {
        Self {
            dataset: dataset.into(),
            ..Default::default()
        }
    }

    pub fn organization<S: Into<String>>(mut self, organization: S) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn collection<S: Into<String>>(mut self, collection: S) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn variant<S: Into<String>>(mut self, variant: S) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn cid<S: Into<String>>(mut self, cid: S) -> Self {
        self.cid = Some(cid.into());
        self
    }
}

/// Which source produced a `ResolvedSource`.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionMethod {
    Explicit,
    FastPath,
    HierarchicalCatalog,
    LegacyMap,
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ResolutionMethod::Explicit => "explicit",
            ResolutionMethod::FastPath => "fast-path",
            ResolutionMethod::HierarchicalCatalog => "hierarchical-catalog",
            ResolutionMethod::LegacyMap => "legacy-map",
        };
        f.write_str(tag)
    }
}

/// A dataset request resolved to a single content identifier.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSource {
    pub cid: Cid,
    pub collection: String,
    pub dataset: String,
    pub variant: String,
    pub organization: Option<String>,
    pub method: ResolutionMethod,

    /// Canonical slug, `{collection}-{dataset}-{variant}` for catalog hits
    pub path: String,
}

/// Where to find the data for one variant.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VariantSource {
    /// The content identifier is known.
    Cid(Cid),

    /// The current content identifier must be looked up at this URL first.
    Endpoint(String),
}

/// A variant that takes part in auto-concatenation.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcatenableVariant {
    pub variant: String,
    pub source: VariantSource,

    /// Lower loads first and wins overlapping ranges
    pub priority: i64,

    /// Dimension to concatenate along
    pub dimension: String,
}

/// Several variants of one dataset to be loaded and stitched together.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcatenationPlan {
    pub collection: String,
    pub dataset: String,
    pub organization: Option<String>,
    pub method: ResolutionMethod,

    /// Sorted by ascending priority
    pub variants: Vec<ConcatenableVariant>,
}

impl ConcatenationPlan {
    pub fn variant_names(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.variant.clone()).collect()
    }

    /// Slug covering the whole concatenated series, `{collection}-{dataset}`
    pub fn path(&self) -> String {
        format!("{}-{}", self.collection, self.dataset)
    }
}

/// The outcome of resolving a `DatasetRequest`.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Single(ResolvedSource),
    Concatenate(ConcatenationPlan),
}

/// One dataset known to the hierarchical catalog.
///
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatasetListing {
    pub organization: String,
    pub collection: String,
    pub dataset: String,
    pub variants: Vec<String>,

    /// Whether two or more variants carry concatenation metadata
    pub concatenable: bool,
}
