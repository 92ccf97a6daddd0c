use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    catalog::{
        CatalogCache, DatasetListing, DatasetRequest, Gateway, LookupService, Resolution,
        ResolveOptions, Resolver, VariantSource,
    },
    concat::{concatenate_variants, load_variants},
    config::ClientConfig,
    errors::{Error, Result},
    helpers::cancellable,
    store::ArrayStore,
    view::{DatasetMetadata, GeotemporalDataset},
};

/// Per-call overrides for `Client` operations. Unset fields fall back to the client's config.
///
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub auto_concatenate: Option<bool>,

    /// Gateway endpoint to resolve the catalog against
    pub gateway: Option<String>,

    pub cancel: Option<CancellationToken>,
}

/// Loads datasets by name.
///
/// Resolves a request, opens what it resolved to from the store, concatenating variants where
/// the catalog says to, and returns the result as a `GeotemporalDataset`.
///
pub struct Client {
    config: ClientConfig,
    resolver: Resolver,
    gateway: Arc<dyn Gateway>,
    store: Arc<dyn ArrayStore>,
}

impl Client {
    /// Fails if the configured legacy catalog holds an invalid identifier.
    pub fn new(
        config: ClientConfig,
        gateway: Arc<dyn Gateway>,
        store: Arc<dyn ArrayStore>,
    ) -> Result<Self> {
        let cache = CatalogCache::new(config.cache_ttl());
        let resolver = Resolver::new(Arc::clone(&gateway), config.catalog_root.clone(), cache)
            .with_legacy(config.legacy()?);

        Ok(Self {
            config,
            resolver,
            gateway,
            store,
        })
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn LookupService>) -> Self {
        self.resolver = self.resolver.with_lookup(lookup);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    fn resolve_options(&self, options: &LoadOptions) -> ResolveOptions {
        ResolveOptions {
            auto_concatenate: options
                .auto_concatenate
                .unwrap_or(self.config.auto_concatenate),
            gateway: options.gateway.clone(),
            cancel: options.cancel.clone(),
        }
    }

    pub async fn resolve(
        &self,
        request: &DatasetRequest,
        options: &LoadOptions,
    ) -> Result<Resolution> {
        self.resolver
            .resolve(request, &self.resolve_options(options))
            .await
    }

    /// Resolve and open a dataset.
    pub async fn load_dataset(
        &self,
        request: &DatasetRequest,
        options: &LoadOptions,
    ) -> Result<GeotemporalDataset> {
        let cancel = options.cancel.as_ref();

        match self.resolve(request, options).await? {
            Resolution::Single(resolved) => {
                info!("Opening {} at {} ({})", resolved.path, resolved.cid, resolved.method);
                let dataset = cancellable(cancel, self.store.open(&resolved.cid)).await?;
                let metadata = DatasetMetadata::from_resolved(&resolved, Utc::now());

                Ok(GeotemporalDataset::new(dataset, metadata))
            }
            Resolution::Concatenate(plan) => {
                info!(
                    "Concatenating {} from variants {}",
                    plan.path(),
                    plan.variant_names().join(", ")
                );
                let loaded = load_variants(
                    self.store.as_ref(),
                    self.gateway.as_ref(),
                    &plan.variants,
                    cancel,
                )
                .await?;
                let cid = match loaded.first() {
                    Some((variant, _)) => match variant.source {
                        VariantSource::Cid(cid) => cid,
                        VariantSource::Endpoint(ref url) => {
                            return Err(Error::InvalidIdentifier(url.clone()))
                        }
                    },
                    None => return Err(Error::EmptyVariantSet),
                };
                let dataset = concatenate_variants(loaded)?;
                let metadata = DatasetMetadata::from_plan(&plan, cid, Utc::now());

                Ok(GeotemporalDataset::new(dataset, metadata))
            }
        }
    }

    /// Every dataset in the hierarchical catalog, with its variants.
    pub async fn list_available_datasets(
        &self,
        options: &LoadOptions,
    ) -> Result<Vec<DatasetListing>> {
        self.resolver
            .list_datasets(&self.resolve_options(options))
            .await
    }
}
