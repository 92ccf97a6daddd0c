//! Documents making up the hierarchical catalog.
//!
//! The root, organization and collection levels share `CatalogDocument`. Leaves are
//! `ItemDocument`s. Both are validated as they are parsed so the rest of the resolver can rely on
//! the fields being present and well formed.
//!
use std::collections::BTreeMap;
use std::str::FromStr;

use cid::Cid;
use serde::Deserialize;
use serde_json::Value;

use super::source::VariantSource;
use crate::{
    errors::{Error, Result},
    helpers::strip_ipfs_scheme,
};

pub const REL_CHILD: &str = "child";
pub const REL_ITEM: &str = "item";

/// Asset name preferred when an item carries several.
pub const DATA_ASSET: &str = "data";

#[derive(Clone, Debug, Deserialize)]
pub struct CatalogDocument {
    pub id: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub links: Vec<Link>,

    /// Explicit organization id, for organization level documents
    #[serde(rename = "dclimate:id", default)]
    pub organization_id: Option<String>,

    /// Collections this organization declares it owns
    #[serde(rename = "dclimate:collections", default)]
    pub declared_collections: Vec<String>,

    /// `{collection}-{dataset}` slugs this organization declares it owns
    #[serde(rename = "dclimate:datasets", default)]
    pub dataset_slugs: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,

    #[serde(default)]
    pub title: Option<String>,

    /// Organization id on root level child links
    #[serde(rename = "dclimate:organization", default)]
    pub organization: Option<String>,

    #[serde(rename = "concatPriority", default)]
    pub concat_priority: Option<i64>,

    #[serde(rename = "concatDimension", default)]
    pub concat_dimension: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ItemDocument {
    pub id: String,

    #[serde(default)]
    pub properties: ItemProperties,

    #[serde(default)]
    pub assets: BTreeMap<String, Asset>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ItemProperties {
    #[serde(rename = "concatPriority", default)]
    pub concat_priority: Option<i64>,

    #[serde(rename = "concatDimension", default)]
    pub concat_dimension: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Asset {
    pub href: String,
}

impl CatalogDocument {
    pub fn parse(value: Value) -> Result<Self> {
        let document: Self = serde_json::from_value(value)?;
        if document.id.trim().is_empty() {
            return Err(Error::CatalogUnavailable(String::from(
                "catalog document without an id",
            )));
        }
        if let Some(organization) = &document.organization_id {
            if organization.trim().is_empty() {
                return Err(Error::CatalogUnavailable(format!(
                    "catalog document '{}' has an empty organization id",
                    document.id
                )));
            }
        }
        if let Some(link) = document.links.iter().find(|link| link.href.trim().is_empty()) {
            return Err(Error::CatalogUnavailable(format!(
                "catalog document '{}' has a '{}' link without an href",
                document.id, link.rel
            )));
        }

        Ok(document)
    }

    pub fn children(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|link| link.rel == REL_CHILD)
    }

    pub fn items(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(|link| link.rel == REL_ITEM)
    }

    /// The organization id: the explicit field, else the one the parent link gave, else the
    /// document id.
    ///
    pub fn organization(&self, from_link: Option<&str>) -> String {
        self.organization_id
            .as_deref()
            .or(from_link)
            .unwrap_or(&self.id)
            .to_string()
    }
}

impl ItemDocument {
    pub fn parse(value: Value) -> Result<Self> {
        let document: Self = serde_json::from_value(value)?;
        if document.id.trim().is_empty() {
            return Err(Error::CatalogUnavailable(String::from(
                "catalog item without an id",
            )));
        }
        document.source()?;

        Ok(document)
    }

    /// Where this item's data lives.
    ///
    /// The `data` asset wins, otherwise the first asset (in name order) with a content reference
    /// or URL. `ipfs://` references become `VariantSource::Cid`, `http(s)` URLs become
    /// `VariantSource::Endpoint`.
    ///
    pub fn source(&self) -> Result<VariantSource> {
        let asset = self
            .assets
            .get(DATA_ASSET)
            .or_else(|| {
                self.assets
                    .values()
                    .find(|asset| asset.href.starts_with("ipfs://"))
            })
            .or_else(|| self.assets.values().next())
            .ok_or_else(|| {
                Error::CatalogUnavailable(format!("catalog item '{}' has no assets", self.id))
            })?;

        variant_source(&asset.href)
    }
}

/// Interpret an asset href or lookup result as a variant source.
pub fn variant_source(href: &str) -> Result<VariantSource> {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return Ok(VariantSource::Endpoint(href.to_string()));
    }

    parse_cid(strip_ipfs_scheme(href)).map(VariantSource::Cid)
}

pub fn parse_cid(text: &str) -> Result<Cid> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidIdentifier(String::from(text)));
    }
    Cid::from_str(text).map_err(|_| Error::InvalidIdentifier(text.to_string()))
}
