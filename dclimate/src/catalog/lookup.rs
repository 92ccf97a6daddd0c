use tokio_util::sync::CancellationToken;

use super::{
    gateway::{current_cid, Gateway, LookupItem, LookupService},
    schema::variant_source,
    source::{ResolutionMethod, ResolvedSource, VariantSource},
};
use crate::{
    errors::{Error, Result},
    helpers::cancellable,
};

/// Variant names picked, in order, when a request doesn't name one.
pub const VARIANT_PREFERENCE: [&str; 4] = ["default", "final", "finalized", "latest"];

/// Pick the preferred variant out of `available`, if any of them is preferred.
pub fn preferred_variant<'a, S: AsRef<str>>(available: &'a [S]) -> Option<&'a str> {
    VARIANT_PREFERENCE.iter().find_map(|preferred| {
        available
            .iter()
            .map(AsRef::as_ref)
            .find(|variant| variant == preferred)
    })
}

/// Ask the lookup service for a dataset, without walking the catalog.
///
/// Items are filtered by id prefix, `{collection}-{dataset}` alone or followed by `-{variant}`.
/// With no variant requested the preferred variant wins, falling back to the first match.
/// An item pointing at an endpoint rather than a content identifier is resolved through
/// `gateway`.
///
pub async fn fast_path(
    lookup: &dyn LookupService,
    gateway: &dyn Gateway,
    collection: &str,
    dataset: &str,
    variant: Option<&str>,
    cancel: Option<&CancellationToken>,
) -> Result<ResolvedSource> {
    let items = cancellable(cancel, lookup.search(collection)).await?;
    let prefix = format!("{collection}-{dataset}");

    let candidates: Vec<(String, &LookupItem)> = items
        .iter()
        .filter_map(|item| {
            let rest = item.id.strip_prefix(&prefix)?;
            if rest.is_empty() {
                Some((String::from(VARIANT_PREFERENCE[0]), item))
            } else {
                rest.strip_prefix('-')
                    .filter(|variant| !variant.is_empty())
                    .map(|variant| (variant.to_string(), item))
            }
        })
        .collect();

    let (variant, item) = match variant {
        Some(variant) => candidates.iter().find(|(name, _)| name == variant),
        None => {
            let names: Vec<&str> = candidates.iter().map(|(name, _)| name.as_str()).collect();
            match preferred_variant(&names) {
                Some(preferred) => candidates.iter().find(|(name, _)| name == preferred),
                None => candidates.first(),
            }
        }
    }
    .ok_or_else(|| Error::NoDataFound(format!("lookup service has no match for '{prefix}'")))?;

    let cid = match variant_source(&item.href)? {
        VariantSource::Cid(cid) => cid,
        VariantSource::Endpoint(url) => current_cid(gateway, &url, cancel).await?,
    };

    Ok(ResolvedSource {
        cid,
        collection: collection.to_string(),
        dataset: dataset.to_string(),
        variant: variant.clone(),
        organization: None,
        method: ResolutionMethod::FastPath,
        path: item.id.clone(),
    })
}
