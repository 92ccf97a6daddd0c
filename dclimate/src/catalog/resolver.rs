use std::sync::Arc;

use futures::future::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    cache::CatalogCache,
    gateway::{current_cid, Gateway, LookupService},
    legacy::LegacyCatalog,
    lookup::{fast_path, preferred_variant},
    schema::parse_cid,
    source::{
        ConcatenationPlan, DatasetListing, DatasetRequest, Resolution, ResolutionMethod,
        ResolvedSource, VariantSource,
    },
    tree::{CatalogItem, CatalogTree, Collection, Organization},
};
use crate::errors::{Error, Result};

/// Per-call knobs for `Resolver::resolve`.
///
#[derive(Clone, Debug)]
pub struct ResolveOptions {
    /// Whether a request without a variant may resolve to a `ConcatenationPlan`
    pub auto_concatenate: bool,

    /// Gateway endpoint to use instead of the configured one
    pub gateway: Option<String>,

    pub cancel: Option<CancellationToken>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            auto_concatenate: true,
            gateway: None,
            cancel: None,
        }
    }
}

impl ResolveOptions {
    fn eligible_for_concatenation(&self, request: &DatasetRequest) -> bool {
        self.auto_concatenate && request.variant.is_none()
    }
}

/// Turns dataset requests into content identifiers.
///
/// Sources are tried in order: an explicit identifier on the request, the lookup service, the
/// hierarchical catalog, then the legacy flat catalog. Catalog trees are cached per gateway
/// endpoint.
///
pub struct Resolver {
    gateway: Arc<dyn Gateway>,
    lookup: Option<Arc<dyn LookupService>>,
    legacy: LegacyCatalog,
    catalog_root: String,
    cache: CatalogCache,
}

/// Where in the catalog a request landed.
enum CatalogHit<'a> {
    Single {
        organization: &'a Organization,
        item: &'a CatalogItem,
        variant: &'a str,
    },
    Concatenate(ConcatenationPlan),
}

impl Resolver {
    pub fn new<S: Into<String>>(
        gateway: Arc<dyn Gateway>,
        catalog_root: S,
        cache: CatalogCache,
    ) -> Self {
        Self {
            gateway,
            lookup: None,
            legacy: LegacyCatalog::default(),
            catalog_root: catalog_root.into(),
            cache,
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn LookupService>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_legacy(mut self, legacy: LegacyCatalog) -> Self {
        self.legacy = legacy;
        self
    }

    pub fn gateway(&self) -> &dyn Gateway {
        self.gateway.as_ref()
    }

    /// The gateway endpoint in effect for a call.
    pub fn endpoint<'a>(&'a self, options: &'a ResolveOptions) -> &'a str {
        options
            .gateway
            .as_deref()
            .unwrap_or_else(|| self.gateway.endpoint())
    }

    pub async fn resolve(
        &self,
        request: &DatasetRequest,
        options: &ResolveOptions,
    ) -> Result<Resolution> {
        if request.dataset.trim().is_empty() {
            return Err(Error::InvalidSelection(String::from("a dataset name is required")));
        }
        if let Some(cid) = &request.cid {
            return Ok(Resolution::Single(explicit(request, cid)?));
        }

        let cancel = options.cancel.as_ref();
        if let (Some(lookup), Some(collection)) = (&self.lookup, &request.collection) {
            if !options.eligible_for_concatenation(request) {
                let (lookup, gateway) = (lookup.as_ref(), self.gateway.as_ref());
                let (dataset, variant) = (request.dataset.as_str(), request.variant.as_deref());
                match fast_path(lookup, gateway, collection, dataset, variant, cancel).await {
                    Ok(resolved) => {
                        debug!("Resolved {} through the lookup service", resolved.path);
                        return Ok(Resolution::Single(resolved));
                    }
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(err) => debug!("Lookup service miss for {}: {err}", request.dataset),
                }
            }
        }

        let endpoint = self.endpoint(options);
        let tree = match self.catalog(endpoint, cancel).await {
            Ok(tree) => tree,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                return match self.legacy(request) {
                    Some(resolved) => {
                        info!("Catalog unavailable ({err}), using legacy catalog");
                        Ok(Resolution::Single(resolved))
                    }
                    None => Err(Error::CatalogUnavailable(err.to_string())),
                };
            }
        };

        let hit = match find(&tree, request, options.eligible_for_concatenation(request)) {
            Ok(hit) => hit,
            Err(err @ Error::CollectionNotFound { .. }) | Err(err @ Error::DatasetNotFound { .. })
                if request.organization.is_none() =>
            {
                return match self.legacy(request) {
                    Some(resolved) => {
                        info!("{err}, using legacy catalog");
                        Ok(Resolution::Single(resolved))
                    }
                    None => Err(err),
                };
            }
            Err(err) => return Err(err),
        };

        match hit {
            CatalogHit::Concatenate(plan) => {
                info!(
                    "Resolved {} to {} concatenable variants",
                    plan.path(),
                    plan.variants.len()
                );
                Ok(Resolution::Concatenate(plan))
            }
            CatalogHit::Single {
                organization,
                item,
                variant,
            } => {
                let cid = match &item.source {
                    VariantSource::Cid(cid) => *cid,
                    VariantSource::Endpoint(url) => {
                        current_cid(self.gateway.as_ref(), url, cancel).await?
                    }
                };
                Ok(Resolution::Single(ResolvedSource {
                    cid,
                    collection: item.collection.clone(),
                    dataset: request.dataset.clone(),
                    variant: variant.to_string(),
                    organization: Some(organization.id.clone()),
                    method: ResolutionMethod::HierarchicalCatalog,
                    path: item.id.clone(),
                }))
            }
        }
    }

    /// Every dataset in the hierarchical catalog.
    pub async fn list_datasets(&self, options: &ResolveOptions) -> Result<Vec<DatasetListing>> {
        let tree = self
            .catalog(self.endpoint(options), options.cancel.as_ref())
            .await?;

        Ok(tree.listings())
    }

    async fn catalog(
        &self,
        endpoint: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Arc<CatalogTree>> {
        let gateway = self.gateway.as_ref();
        let root = self.catalog_root.as_str();
        let load = || CatalogTree::fetch(gateway, endpoint, root, cancel).boxed();

        self.cache.get(endpoint, load, cancel).await
    }

    fn legacy(&self, request: &DatasetRequest) -> Option<ResolvedSource> {
        let (key, cid) = self.legacy.lookup(
            request.collection.as_deref(),
            &request.dataset,
            request.variant.as_deref(),
        )?;

        Some(ResolvedSource {
            cid,
            collection: request.collection.clone().unwrap_or_default(),
            dataset: request.dataset.clone(),
            variant: request.variant.clone().unwrap_or_default(),
            organization: request.organization.clone(),
            method: ResolutionMethod::LegacyMap,
            path: key,
        })
    }
}

fn explicit(request: &DatasetRequest, cid: &str) -> Result<ResolvedSource> {
    let cid = parse_cid(cid)?;
    let collection = request.collection.clone().unwrap_or_default();
    let variant = request.variant.clone().unwrap_or_default();
    let path = [collection.as_str(), request.dataset.as_str(), variant.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    Ok(ResolvedSource {
        cid,
        collection,
        dataset: request.dataset.clone(),
        variant,
        organization: request.organization.clone(),
        method: ResolutionMethod::Explicit,
        path,
    })
}

/// Locate a request in the catalog tree.
///
fn find<'a>(
    tree: &'a CatalogTree,
    request: &DatasetRequest,
    concatenate: bool,
) -> Result<CatalogHit<'a>> {
    let dataset = request.dataset.as_str();
    let organizations: Vec<&Organization> = match &request.organization {
        Some(id) => match tree.organization(id) {
            Some(organization) => vec![organization],
            None => {
                return Err(Error::OrganizationNotFound {
                    organization: id.clone(),
                    available: tree.organization_ids(),
                })
            }
        },
        None => tree.organizations.iter().collect(),
    };

    let (organization, collection) = match &request.collection {
        Some(collection_id) => {
            let owners: Vec<&Organization> = match &request.organization {
                Some(_) => organizations
                    .iter()
                    .copied()
                    .filter(|org| org.collection(collection_id).is_some())
                    .collect(),
                None => tree.owners_of(collection_id),
            };
            let organization = match owners.as_slice() {
                [] => {
                    return Err(Error::CollectionNotFound {
                        collection: collection_id.clone(),
                        available: organizations
                            .iter()
                            .flat_map(|org| org.collections.iter().map(|c| c.id.clone()))
                            .collect(),
                    })
                }
                [organization] => *organization,
                _ => {
                    return Err(Error::AmbiguousResolution {
                        what: format!("collection '{collection_id}'"),
                        candidates: owners.iter().map(|org| org.id.clone()).collect(),
                    })
                }
            };
            match organization.collection(collection_id) {
                Some(collection) => (organization, collection),
                None => {
                    return Err(Error::CollectionNotFound {
                        collection: collection_id.clone(),
                        available: organization.collections.iter().map(|c| c.id.clone()).collect(),
                    })
                }
            }
        }
        None => {
            let hits: Vec<(&Organization, &Collection)> = organizations
                .iter()
                .flat_map(|org| org.collections.iter().map(move |c| (*org, c)))
                .filter(|(_, collection)| !collection.variants_of(dataset).is_empty())
                .collect();
            match hits.as_slice() {
                [] => {
                    return Err(Error::DatasetNotFound {
                        collection: String::from("any collection"),
                        dataset: dataset.to_string(),
                        available: organizations
                            .iter()
                            .flat_map(|org| org.collections.iter())
                            .flat_map(|c| {
                                c.datasets()
                                    .into_iter()
                                    .map(move |dataset| format!("{}-{dataset}", c.id))
                            })
                            .collect(),
                    })
                }
                [hit] => *hit,
                _ => {
                    return Err(Error::AmbiguousResolution {
                        what: format!("dataset '{dataset}'"),
                        candidates: hits
                            .iter()
                            .map(|(org, c)| format!("{}/{}", org.id, c.id))
                            .collect(),
                    })
                }
            }
        }
    };

    let variants = collection.variants_of(dataset);
    if variants.is_empty() {
        return Err(Error::DatasetNotFound {
            collection: collection.id.clone(),
            dataset: dataset.to_string(),
            available: collection.datasets(),
        });
    }
    let names: Vec<String> = variants.iter().map(|(name, _)| name.to_string()).collect();

    if let Some(requested) = &request.variant {
        return match variants.iter().find(|(name, _)| name == requested).copied() {
            Some((variant, item)) => Ok(CatalogHit::Single {
                organization,
                item,
                variant,
            }),
            None => Err(Error::VariantNotFound {
                collection: collection.id.clone(),
                dataset: dataset.to_string(),
                variant: requested.clone(),
                available: names,
            }),
        };
    }

    if concatenate {
        let mut concatenable: Vec<_> = variants
            .iter()
            .filter_map(|(variant, item)| item.concatenable(variant))
            .collect();
        if concatenable.len() >= 2 {
            concatenable.sort_by_key(|variant| variant.priority);
            return Ok(CatalogHit::Concatenate(ConcatenationPlan {
                collection: collection.id.clone(),
                dataset: dataset.to_string(),
                organization: Some(organization.id.clone()),
                method: ResolutionMethod::HierarchicalCatalog,
                variants: concatenable,
            }));
        }
    }

    let chosen = match preferred_variant(&names) {
        Some(preferred) => variants.iter().find(|(name, _)| *name == preferred).copied(),
        None if variants.len() == 1 => variants.first().copied(),
        None => None,
    };
    match chosen {
        Some((variant, item)) => Ok(CatalogHit::Single {
            organization,
            item,
            variant,
        }),
        None => Err(Error::VariantRequiredAmbiguous {
            collection: collection.id.clone(),
            dataset: dataset.to_string(),
            available: names,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::testing::{self, MemoryGateway, MemoryLookup};

    fn resolver(gateway: &Arc<MemoryGateway>) -> Resolver {
        Resolver::new(
            gateway.clone(),
            testing::CATALOG_ROOT,
            CatalogCache::new(Duration::from_secs(3600)),
        )
    }

    fn single(resolution: Resolution) -> ResolvedSource {
        match resolution {
            Resolution::Single(resolved) => resolved,
            Resolution::Concatenate(plan) => panic!("expected a single source, got {plan:?}"),
        }
    }

    fn no_concat() -> ResolveOptions {
        ResolveOptions {
            auto_concatenate: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_explicit_round_trip() -> Result<()> {
        let gateway = Arc::new(MemoryGateway::new());
        let resolver = resolver(&gateway);
        let cid = testing::cid("explicit");

        let request = DatasetRequest::new("precip").cid(cid.to_string());
        let resolved = single(resolver.resolve(&request, &Default::default()).await?);
        assert_eq!(resolved.cid, cid);
        assert_eq!(resolved.method, ResolutionMethod::Explicit);
        assert_eq!(resolved.collection, "");
        assert_eq!(resolved.path, "precip");
        assert_eq!(gateway.fetches(), 0);

        let request = DatasetRequest::new("precip").cid("not a cid");
        assert!(matches!(
            resolver.resolve(&request, &Default::default()).await,
            Err(Error::InvalidIdentifier(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_finalized_variant() -> Result<()> {
        let gateway = Arc::new(MemoryGateway::new());
        testing::populate_catalog(&gateway);
        let resolver = resolver(&gateway);

        let request = DatasetRequest::new("2m_temperature")
            .collection("era5")
            .variant("finalized");
        let resolved = single(resolver.resolve(&request, &Default::default()).await?);
        assert_eq!(resolved.cid, testing::cid("era5-2m_temperature-finalized"));
        assert_eq!(resolved.path, "era5-2m_temperature-finalized");
        assert_eq!(resolved.organization.as_deref(), Some("ecmwf"));
        assert_eq!(resolved.method, ResolutionMethod::HierarchicalCatalog);

        Ok(())
    }

    #[tokio::test]
    async fn test_warm_cache_is_idempotent() -> Result<()> {
        let gateway = Arc::new(MemoryGateway::new());
        testing::populate_catalog(&gateway);
        let resolver = resolver(&gateway);
        let request = DatasetRequest::new("precip").collection("chirps");

        let first = single(resolver.resolve(&request, &Default::default()).await?);
        let fetches = gateway.fetches();
        let second = single(resolver.resolve(&request, &Default::default()).await?);
        assert_eq!(first, second);
        assert_eq!(gateway.fetches(), fetches);

        // Another gateway gets its own cache entry
        let options = ResolveOptions {
            gateway: Some(String::from("https://other.test")),
            ..Default::default()
        };
        assert!(matches!(
            resolver.resolve(&request, &options).await,
            Err(Error::CatalogUnavailable(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_concatenation_plan() -> Result<()> {
        let gateway = Arc::new(MemoryGateway::new());
        testing::populate_catalog(&gateway);
        let resolver = resolver(&gateway);
        let request = DatasetRequest::new("2m_temperature").collection("era5");

        match resolver.resolve(&request, &Default::default()).await? {
            Resolution::Concatenate(plan) => {
                assert_eq!(plan.variant_names(), vec!["finalized", "non-finalized"]);
                assert_eq!(plan.path(), "era5-2m_temperature");
                assert_eq!(plan.organization.as_deref(), Some("ecmwf"));
            }
            Resolution::Single(resolved) => panic!("expected a plan, got {resolved:?}"),
        }

        // Without auto-concatenation, "finalized" is a preferred default
        let resolved = single(resolver.resolve(&request, &no_concat()).await?);
        assert_eq!(resolved.variant, "finalized");

        Ok(())
    }

    #[tokio::test]
    async fn test_not_found_errors() {
        let gateway = Arc::new(MemoryGateway::new());
        testing::populate_catalog(&gateway);
        let resolver = resolver(&gateway);

        let err = resolver
            .resolve(&DatasetRequest::new("x").collection("nope"), &no_concat())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CollectionNotFound { .. }));
        assert_eq!(err.alternatives(), ["era5", "chirps"]);

        let err = resolver
            .resolve(&DatasetRequest::new("wind").collection("era5"), &no_concat())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DatasetNotFound { .. }));
        assert_eq!(err.alternatives(), ["2m_temperature", "precip"]);

        let request = DatasetRequest::new("2m_temperature")
            .collection("era5")
            .variant("preliminary");
        let err = resolver.resolve(&request, &no_concat()).await.unwrap_err();
        assert!(matches!(err, Error::VariantNotFound { .. }));
        assert_eq!(err.alternatives(), ["finalized", "non-finalized"]);

        let request = DatasetRequest::new("precip").organization("nasa");
        let err = resolver.resolve(&request, &no_concat()).await.unwrap_err();
        assert!(matches!(err, Error::OrganizationNotFound { .. }));
        assert_eq!(err.alternatives(), ["ecmwf", "ucsb"]);
    }

    #[tokio::test]
    async fn test_ambiguous_variant() {
        let gateway = Arc::new(MemoryGateway::new());
        testing::populate_catalog(&gateway);
        let resolver = resolver(&gateway);

        let request = DatasetRequest::new("precip").collection("era5");
        let err = resolver.resolve(&request, &no_concat()).await.unwrap_err();
        assert!(matches!(err, Error::VariantRequiredAmbiguous { .. }));
        assert_eq!(err.alternatives(), ["early", "late"]);
    }

    #[tokio::test]
    async fn test_search_without_collection() -> Result<()> {
        let gateway = Arc::new(MemoryGateway::new());
        testing::populate_catalog(&gateway);
        let resolver = resolver(&gateway);

        let request = DatasetRequest::new("2m_temperature").variant("non-finalized");
        let resolved = single(resolver.resolve(&request, &Default::default()).await?);
        assert_eq!(resolved.collection, "era5");
        assert_eq!(resolved.cid, testing::cid("era5-2m_temperature-non-finalized"));

        // "precip" lives in both era5 and chirps
        let err = resolver
            .resolve(&DatasetRequest::new("precip"), &no_concat())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousResolution { .. }));
        assert_eq!(err.alternatives(), ["ecmwf/era5", "ucsb/chirps"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_legacy_fallback() -> Result<()> {
        let legacy_cid = testing::cid("legacy-cpc");
        let legacy = LegacyCatalog::new([("cpc-precip", legacy_cid.to_string())])?;

        // Catalog doesn't know the collection
        let gateway = Arc::new(MemoryGateway::new());
        testing::populate_catalog(&gateway);
        let resolver = resolver(&gateway).with_legacy(legacy.clone());
        let request = DatasetRequest::new("precip").collection("cpc");
        let resolved = single(resolver.resolve(&request, &Default::default()).await?);
        assert_eq!(resolved.cid, legacy_cid);
        assert_eq!(resolved.method, ResolutionMethod::LegacyMap);
        assert_eq!(resolved.path, "cpc-precip");

        // Catalog can't be loaded at all
        let gateway = Arc::new(MemoryGateway::new());
        let resolver = self::resolver(&gateway).with_legacy(legacy);
        let resolved = single(resolver.resolve(&request, &Default::default()).await?);
        assert_eq!(resolved.method, ResolutionMethod::LegacyMap);

        let request = DatasetRequest::new("temp").collection("cpc");
        assert!(matches!(
            resolver.resolve(&request, &Default::default()).await,
            Err(Error::CatalogUnavailable(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_fast_path() -> Result<()> {
        let gateway = Arc::new(MemoryGateway::new());
        testing::populate_catalog(&gateway);
        let lookup = Arc::new(MemoryLookup::new());
        let fast = testing::cid("x3");
        lookup.insert("chirps", "chirps-precip-final", &fast.to_string());
        let resolver = resolver(&gateway).with_lookup(lookup);

        let request = DatasetRequest::new("precip").collection("chirps").variant("final");
        let resolved = single(resolver.resolve(&request, &Default::default()).await?);
        assert_eq!(resolved.cid, fast);
        assert_eq!(resolved.method, ResolutionMethod::FastPath);
        assert_eq!(gateway.fetches(), 0);

        // Misses fall through to the catalog
        let request = DatasetRequest::new("precip").collection("chirps").variant("prelim");
        let resolved = single(resolver.resolve(&request, &Default::default()).await?);
        assert_eq!(resolved.cid, testing::cid("chirps-precip-prelim"));
        assert_eq!(resolved.method, ResolutionMethod::HierarchicalCatalog);

        Ok(())
    }

    #[tokio::test]
    async fn test_endpoint_source() -> Result<()> {
        let gateway = Arc::new(MemoryGateway::new());
        testing::populate_catalog(&gateway);
        let resolver = resolver(&gateway);

        let request = DatasetRequest::new("precip").collection("era5").variant("late");
        let resolved = single(resolver.resolve(&request, &Default::default()).await?);
        assert_eq!(resolved.cid, testing::cid("x2"));

        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled() {
        let gateway = Arc::new(MemoryGateway::new());
        testing::populate_catalog(&gateway);
        let resolver = resolver(&gateway);
        let token = CancellationToken::new();
        token.cancel();
        let options = ResolveOptions {
            cancel: Some(token),
            ..Default::default()
        };

        let request = DatasetRequest::new("precip").collection("chirps");
        assert!(matches!(
            resolver.resolve(&request, &options).await,
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_list_datasets() -> Result<()> {
        let gateway = Arc::new(MemoryGateway::new());
        testing::populate_catalog(&gateway);
        let resolver = resolver(&gateway);

        let listings = resolver.list_datasets(&Default::default()).await?;
        let names: Vec<String> = listings
            .iter()
            .map(|l| format!("{}/{}-{}", l.organization, l.collection, l.dataset))
            .collect();
        assert_eq!(
            names,
            vec!["ecmwf/era5-2m_temperature", "ecmwf/era5-precip", "ucsb/chirps-precip"]
        );

        Ok(())
    }
}
