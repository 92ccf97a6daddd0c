//! Concrete implementations of the `dclimate` transport traits over an HTTP IPFS gateway.
//!
//! `GatewayClient` fetches catalog documents and queries the lookup service. `GatewayStore`
//! opens datasets stored as JSON documents under `/ipfs/{cid}`.
//!
mod document;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use cid::Cid;
use futures::StreamExt;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use dclimate::catalog::{Gateway, LookupItem, LookupService};
use dclimate::{ArrayStore, Client, ClientConfig, Dataset, Error, Result};

pub use document::{CoordDocument, DatasetDocument, VariableDocument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// An HTTP client for an IPFS gateway, and optionally for a lookup service alongside it.
///
#[derive(Clone)]
pub struct GatewayClient {
    client: HttpClient,
    endpoint: String,
    lookup_url: Option<String>,
}

impl GatewayClient {
    pub fn new<S: Into<String>>(endpoint: S, lookup_url: Option<String>) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(transport)?;
        let endpoint = endpoint.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            endpoint,
            lookup_url,
        })
    }

    /// Read the whole body at `url`. Anything but a success status is an error.
    ///
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes> {
        debug!("GET {url}");
        let response = self.client.get(url).send().await.map_err(transport)?;
        check_status(url, response.status())?;

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.map_err(transport)?);
        }

        Ok(body.freeze())
    }
}

#[async_trait]
impl Gateway for GatewayClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let body = self.fetch_bytes(url).await?;

        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let body = self.fetch_bytes(url).await?;

        String::from_utf8(body.to_vec())
            .map_err(|err| Error::Transport(format!("{url} is not valid UTF-8: {err}")))
    }
}

#[async_trait]
impl LookupService for GatewayClient {
    async fn search(&self, collection: &str) -> Result<Vec<LookupItem>> {
        let lookup_url = self
            .lookup_url
            .as_deref()
            .ok_or_else(|| Error::Transport(String::from("no lookup service configured")))?;
        let response = self
            .client
            .get(lookup_url)
            .query(&[("collections", collection)])
            .send()
            .await
            .map_err(transport)?;
        check_status(lookup_url, response.status())?;
        let body: Value = response.json().await.map_err(transport)?;

        parse_search(body)
    }
}

/// Opens datasets served by a gateway as JSON dataset documents.
///
#[derive(Clone)]
pub struct GatewayStore {
    gateway: Arc<GatewayClient>,
}

impl GatewayStore {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ArrayStore for GatewayStore {
    async fn open(&self, cid: &Cid) -> Result<Dataset> {
        let url = format!("{}/ipfs/{cid}", self.gateway.endpoint());
        let document = DatasetDocument::from_value(self.gateway.fetch_json(&url).await?)?;

        document.into_dataset()
    }
}

/// Build a `Client` talking to the gateway, and lookup service if any, named in `config`.
///
pub fn connect(config: ClientConfig) -> Result<Client> {
    let gateway = Arc::new(GatewayClient::new(
        config.gateway_url.as_str(),
        config.lookup_url.clone(),
    )?);
    let store = Arc::new(GatewayStore::new(Arc::clone(&gateway)));
    let has_lookup = config.lookup_url.is_some();
    let client = Client::new(config, gateway.clone(), store)?;

    if has_lookup {
        Ok(client.with_lookup(gateway))
    } else {
        Ok(client)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Features {
        #[serde(alias = "items")]
        features: Vec<SearchFeature>,
    },
    List(Vec<SearchFeature>),
}

#[derive(Debug, Deserialize)]
struct SearchFeature {
    id: String,

    #[serde(default)]
    assets: BTreeMap<String, SearchAsset>,
}

#[derive(Debug, Deserialize)]
struct SearchAsset {
    href: String,
}

/// Read a search response, either STAC style `{"features": [...]}`, `{"items": [...]}`, or a
/// bare list. Features without any asset are skipped.
///
fn parse_search(body: Value) -> Result<Vec<LookupItem>> {
    let features = match serde_json::from_value(body)? {
        SearchResponse::Features { features } => features,
        SearchResponse::List(features) => features,
    };

    Ok(features
        .into_iter()
        .filter_map(|mut feature| {
            let asset = match feature.assets.remove("data") {
                Some(asset) => asset,
                None => feature.assets.into_values().next()?,
            };
            Some(LookupItem {
                id: feature.id,
                href: asset.href,
            })
        })
        .collect())
}

fn check_status(url: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(Error::Transport(format!("{status} fetching {url}")))
    }
}

fn transport(err: reqwest::Error) -> Error {
    Error::Transport(err.to_string())
}
