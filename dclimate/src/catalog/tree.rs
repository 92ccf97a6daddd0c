use std::collections::BTreeSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    gateway::{resolve_href, Gateway},
    schema::{CatalogDocument, ItemDocument, Link},
    source::{ConcatenableVariant, DatasetListing, VariantSource},
};
use crate::{
    errors::{Error, Result},
    helpers::cancellable,
};

/// Dimension variants are concatenated along when the catalog doesn't say.
pub const DEFAULT_CONCAT_DIMENSION: &str = "time";

/// The whole hierarchical catalog, as fetched from a gateway.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogTree {
    pub organizations: Vec<Organization>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Organization {
    pub id: String,
    pub title: Option<String>,
    pub declared_collections: Vec<String>,
    pub dataset_slugs: Vec<String>,
    pub collections: Vec<Collection>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Collection {
    pub id: String,
    pub items: Vec<CatalogItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogItem {
    /// `{collection}-{dataset}-{variant}`
    pub id: String,
    pub collection: String,
    pub source: VariantSource,
    pub concat: Option<ConcatMeta>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcatMeta {
    pub priority: i64,
    pub dimension: String,
}

impl CatalogItem {
    /// The part of the id after `{collection}-`
    pub fn remainder(&self) -> &str {
        self.id
            .strip_prefix(self.collection.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .unwrap_or(&self.id)
    }

    /// If this item belongs to `dataset`, the item's variant name.
    ///
    /// An item id without a variant segment is the dataset's `default` variant.
    ///
    pub fn variant_of(&self, dataset: &str) -> Option<&str> {
        let remainder = self.remainder();
        if remainder == dataset {
            Some(DEFAULT_VARIANT)
        } else {
            remainder
                .strip_prefix(dataset)
                .and_then(|rest| rest.strip_prefix('-'))
                .filter(|variant| !variant.is_empty())
        }
    }

    /// Dataset and variant names, splitting the remainder at its first hyphen.
    pub fn split(&self) -> (&str, &str) {
        match self.remainder().split_once('-') {
            Some((dataset, variant)) => (dataset, variant),
            None => (self.remainder(), DEFAULT_VARIANT),
        }
    }

    pub fn concatenable(&self, variant: &str) -> Option<ConcatenableVariant> {
        self.concat.as_ref().map(|concat| ConcatenableVariant {
            variant: variant.to_string(),
            source: self.source.clone(),
            priority: concat.priority,
            dimension: concat.dimension.clone(),
        })
    }
}

pub const DEFAULT_VARIANT: &str = "default";

impl Collection {
    /// Items of `dataset`, paired with their variant names, in catalog order.
    pub fn variants_of(&self, dataset: &str) -> Vec<(&str, &CatalogItem)> {
        self.items
            .iter()
            .filter_map(|item| item.variant_of(dataset).map(|variant| (variant, item)))
            .collect()
    }

    /// Distinct dataset names, in catalog order.
    pub fn datasets(&self) -> Vec<String> {
        let mut datasets: Vec<String> = vec![];
        for item in &self.items {
            let (dataset, _) = item.split();
            if !datasets.iter().any(|d| d == dataset) {
                datasets.push(dataset.to_string());
            }
        }

        datasets
    }
}

impl Organization {
    /// Whether this organization declares `collection` as its own, either in its collection
    /// list or through a `{collection}-` dataset slug.
    ///
    pub fn declares(&self, collection: &str) -> bool {
        let prefix = format!("{collection}-");
        self.declared_collections.iter().any(|c| c == collection)
            || self.dataset_slugs.iter().any(|slug| slug.starts_with(&prefix))
    }

    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.collections.iter().find(|collection| collection.id == id)
    }
}

impl CatalogTree {
    pub fn organization(&self, id: &str) -> Option<&Organization> {
        self.organizations.iter().find(|org| org.id == id)
    }

    pub fn organization_ids(&self) -> Vec<String> {
        self.organizations.iter().map(|org| org.id.clone()).collect()
    }

    /// Every collection id, across organizations, in catalog order.
    pub fn collection_ids(&self) -> Vec<String> {
        self.organizations
            .iter()
            .flat_map(|org| org.collections.iter().map(|c| c.id.clone()))
            .collect()
    }

    /// Organizations holding `collection`. Those declaring it win over those merely containing
    /// it.
    ///
    pub fn owners_of(&self, collection: &str) -> Vec<&Organization> {
        let containing: Vec<&Organization> = self
            .organizations
            .iter()
            .filter(|org| org.collection(collection).is_some())
            .collect();
        let declaring: Vec<&Organization> = containing
            .iter()
            .copied()
            .filter(|org| org.declares(collection))
            .collect();

        if declaring.is_empty() {
            containing
        } else {
            declaring
        }
    }

    pub fn listings(&self) -> Vec<DatasetListing> {
        let mut listings = vec![];
        for org in &self.organizations {
            for collection in &org.collections {
                for dataset in collection.datasets() {
                    let items = collection.variants_of(&dataset);
                    let concatenable =
                        items.iter().filter(|(_, item)| item.concat.is_some()).count() >= 2;
                    listings.push(DatasetListing {
                        organization: org.id.clone(),
                        collection: collection.id.clone(),
                        variants: items.iter().map(|(v, _)| v.to_string()).collect(),
                        dataset,
                        concatenable,
                    });
                }
            }
        }

        listings
    }

    /// Walk the catalog starting from the root document at `root`.
    ///
    /// Organizations, collections and items are fetched level by level. Links that fail to load
    /// or parse below the root are skipped with a warning; a bad root fails the whole walk.
    ///
    pub async fn fetch(
        gateway: &dyn Gateway,
        endpoint: &str,
        root: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<Self> {
        let root_url = resolve_href(endpoint, None, root);
        info!("Fetching catalog from {root_url}");
        let document = fetch_document(gateway, &root_url, cancel).await?;

        let mut organizations = vec![];
        for link in document.children() {
            let url = resolve_href(endpoint, Some(&root_url), &link.href);
            let org_document = match fetch_document(gateway, &url, cancel).await {
                Ok(document) => document,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    warn!("Skipping organization at {url}: {err}");
                    continue;
                }
            };
            let mut organization = Organization {
                id: org_document.organization(link.organization.as_deref()),
                title: org_document.title.clone().or_else(|| link.title.clone()),
                declared_collections: org_document.declared_collections.clone(),
                dataset_slugs: org_document.dataset_slugs.clone(),
                collections: vec![],
            };

            for link in org_document.children() {
                let collection_url = resolve_href(endpoint, Some(&url), &link.href);
                match fetch_collection(gateway, endpoint, &collection_url, cancel).await {
                    Ok(collection) => organization.collections.push(collection),
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(err) => warn!("Skipping collection at {collection_url}: {err}"),
                }
            }

            debug!(
                "Loaded organization {} with {} collections",
                organization.id,
                organization.collections.len()
            );
            organizations.push(organization);
        }

        Ok(Self { organizations })
    }
}

async fn fetch_document(
    gateway: &dyn Gateway,
    url: &str,
    cancel: Option<&CancellationToken>,
) -> Result<CatalogDocument> {
    let value = cancellable(cancel, gateway.fetch_json(url)).await?;
    CatalogDocument::parse(value)
}

async fn fetch_collection(
    gateway: &dyn Gateway,
    endpoint: &str,
    url: &str,
    cancel: Option<&CancellationToken>,
) -> Result<Collection> {
    let document = fetch_document(gateway, url, cancel).await?;
    let prefix = format!("{}-", document.id);

    let mut items: Vec<CatalogItem> = vec![];
    let mut seen = BTreeSet::new();
    for link in document.items() {
        let item_url = resolve_href(endpoint, Some(url), &link.href);
        let value = match cancellable(cancel, gateway.fetch_json(&item_url)).await {
            Ok(value) => value,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                warn!("Skipping catalog item at {item_url}: {err}");
                continue;
            }
        };
        let item = match ItemDocument::parse(value) {
            Ok(item) => item,
            Err(err) => {
                warn!("Skipping catalog item at {item_url}: {err}");
                continue;
            }
        };
        if !item.id.starts_with(&prefix) {
            warn!(
                "Skipping catalog item {} which doesn't belong to collection {}",
                item.id, document.id
            );
            continue;
        }
        if !seen.insert(item.id.clone()) {
            warn!("Skipping duplicate catalog item {}", item.id);
            continue;
        }

        items.push(CatalogItem {
            source: item.source()?,
            concat: concat_meta(&item, link),
            collection: document.id.clone(),
            id: item.id,
        });
    }

    Ok(Collection {
        id: document.id,
        items,
    })
}

/// Concatenation metadata from the item's own properties, falling back to the link pointing at
/// it. Items without a priority anywhere aren't concatenable.
///
fn concat_meta(item: &ItemDocument, link: &Link) -> Option<ConcatMeta> {
    let priority = item.properties.concat_priority.or(link.concat_priority)?;
    let dimension = item
        .properties
        .concat_dimension
        .clone()
        .or_else(|| link.concat_dimension.clone())
        .unwrap_or_else(|| DEFAULT_CONCAT_DIMENSION.to_string());

    Some(ConcatMeta {
        priority,
        dimension,
    })
}
