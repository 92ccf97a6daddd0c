//! Finding datasets by name.
//!
//! A request names a dataset and optionally its organization, collection and variant. The
//! `Resolver` turns it into a content identifier, or into a `ConcatenationPlan` when several
//! variants of the dataset are meant to be stitched together.
//!
mod cache;
mod gateway;
mod legacy;
mod lookup;
mod resolver;
mod schema;
mod source;
mod tree;

pub use cache::{CatalogCache, Clock, SystemClock};
pub use gateway::{current_cid, resolve_href, Gateway, LookupItem, LookupService};
pub use legacy::LegacyCatalog;
pub use lookup::{preferred_variant, VARIANT_PREFERENCE};
pub use resolver::{ResolveOptions, Resolver};
pub use schema::{parse_cid, CatalogDocument, ItemDocument, Link};
pub use source::{
    ConcatenableVariant, ConcatenationPlan, DatasetListing, DatasetRequest, Resolution,
    ResolutionMethod, ResolvedSource, VariantSource,
};
pub use tree::{
    CatalogItem, CatalogTree, Collection, ConcatMeta, Organization, DEFAULT_CONCAT_DIMENSION,
    DEFAULT_VARIANT,
};
