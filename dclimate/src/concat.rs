//! Stitching variants of one dataset into a single series.
//!
//! Variants are merged in ascending priority order. Each one only contributes the part of its
//! series that comes strictly after everything merged so far, so higher priority data is never
//! overwritten and the result has no repeated coordinate values.
//!
use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    catalog::{current_cid, ConcatenableVariant, Gateway, VariantSource, DEFAULT_CONCAT_DIMENSION},
    dataset::{Coordinate, Dataset, Indexer},
    errors::{Error, Result},
    helpers::cancellable,
    store::ArrayStore,
};

/// Merge opened variants into one dataset along their concatenation dimension.
///
/// The dimension comes from the highest priority variant. Fails with `EmptyVariantSet` when
/// there's nothing to merge and `MissingCoordinateDimension` when any variant lacks the
/// dimension. A variant with nothing newer than what's already merged is skipped.
///
pub fn concatenate_variants(mut variants: Vec<(ConcatenableVariant, Dataset)>) -> Result<Dataset> {
    variants.sort_by_key(|(variant, _)| variant.priority);

    let mut variants = variants.into_iter();
    let (first, mut merged) = variants.next().ok_or(Error::EmptyVariantSet)?;
    let dimension = if first.dimension.is_empty() {
        DEFAULT_CONCAT_DIMENSION.to_string()
    } else {
        first.dimension.clone()
    };
    require_dimension(&first, &merged, &dimension)?;

    for (variant, dataset) in variants {
        let coord = require_dimension(&variant, &dataset, &dimension)?;
        let last = merged
            .coord(&dimension)
            .and_then(Coordinate::last)
            .and_then(|value| value.comparable());
        let split = match last {
            Some(last) => split_index(coord, last),
            None => Some(0),
        };

        match split {
            None => info!(
                "Skipping variant {}: no '{dimension}' values after those already loaded",
                variant.variant
            ),
            Some(index) => {
                debug!(
                    "Appending {} '{dimension}' steps from variant {}",
                    coord.len() - index,
                    variant.variant
                );
                let tail = dataset.isel(&dimension, Indexer::Range(index..coord.len()))?;
                merged = merged.concat(&tail, &dimension)?;
            }
        }
    }

    Ok(merged)
}

/// Open every variant concurrently.
///
/// Variants whose source is an endpoint are looked up first; the returned variants carry the
/// identifier actually opened. Results come back in the order given, however the loads finish.
///
pub async fn load_variants(
    store: &dyn ArrayStore,
    gateway: &dyn Gateway,
    variants: &[ConcatenableVariant],
    cancel: Option<&CancellationToken>,
) -> Result<Vec<(ConcatenableVariant, Dataset)>> {
    let loads = variants.iter().map(|variant| async move {
        let cid = match &variant.source {
            VariantSource::Cid(cid) => *cid,
            VariantSource::Endpoint(url) => current_cid(gateway, url, cancel).await?,
        };
        debug!("Opening variant {} at {cid}", variant.variant);
        let dataset = cancellable(cancel, store.open(&cid)).await?;
        let variant = ConcatenableVariant {
            source: VariantSource::Cid(cid),
            ..variant.clone()
        };

        Ok::<_, Error>((variant, dataset))
    });

    try_join_all(loads).await
}

fn require_dimension<'a>(
    variant: &ConcatenableVariant,
    dataset: &'a Dataset,
    dimension: &str,
) -> Result<&'a Coordinate> {
    dataset
        .coord(dimension)
        .ok_or_else(|| Error::MissingCoordinateDimension {
            variant: variant.variant.clone(),
            dimension: dimension.to_string(),
        })
}

/// First position whose value is strictly greater than `last`
fn split_index(coord: &Coordinate, last: f64) -> Option<usize> {
    (0..coord.len()).find(|&index| coord.comparable(index).map_or(false, |value| value > last))
}
