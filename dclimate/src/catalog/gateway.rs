use async_trait::async_trait;
use cid::Cid;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::schema::parse_cid;
use crate::{
    errors::{Error, Result},
    helpers::{cancellable, strip_ipfs_scheme},
};

/// Network access to content addressed storage.
///
/// URLs handed to a `Gateway` are always absolute. Use `resolve_href` to turn catalog links into
/// URLs.
///
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Base URL used when no per-call endpoint is given, e.g. `https://ipfs.io`
    fn endpoint(&self) -> &str;

    /// Fetch and parse a JSON document.
    async fn fetch_json(&self, url: &str) -> Result<Value>;

    /// Fetch a plain text document.
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// The lightweight search service used to short circuit catalog walks.
///
#[async_trait]
pub trait LookupService: Send + Sync {
    /// Candidate items for a collection, in the catalog's item id encoding.
    async fn search(&self, collection: &str) -> Result<Vec<LookupItem>>;
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct LookupItem {
    /// `{collection}-{dataset}-{variant}`
    pub id: String,

    /// `ipfs://{cid}`, a bare content identifier, or a URL to look the identifier up at
    pub href: String,
}

/// Turn a catalog link into an absolute URL.
///
/// * `ipfs://{cid}[/path]` and `ipns://{name}[/path]` are served by the gateway at `endpoint`
/// * `/ipfs/...` and `/ipns/...` are gateway paths
/// * absolute `http(s)` URLs are used as they are
/// * anything else is relative to the directory of `base`, the URL of the document containing
///   the link
///
pub fn resolve_href(endpoint: &str, base: Option<&str>, href: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    let href = href.trim();

    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("ipfs://") {
        return format!("{endpoint}/ipfs/{rest}");
    }
    if let Some(rest) = href.strip_prefix("ipns://") {
        return format!("{endpoint}/ipns/{rest}");
    }
    if href.starts_with("/ipfs/") || href.starts_with("/ipns/") {
        return format!("{endpoint}{href}");
    }

    let base = match base {
        Some(base) => base,
        None => return format!("{endpoint}/{}", href.trim_start_matches("./")),
    };

    // Split off scheme and host so `..` never climbs past them
    let (origin, path) = match base.find("://") {
        Some(scheme) => match base[scheme + 3..].find('/') {
            Some(slash) => base.split_at(scheme + 3 + slash),
            None => (base, ""),
        },
        None => ("", base),
    };

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if !path.ends_with('/') {
        // Drop the document's own file name
        segments.pop();
    }
    let root_len = match segments.first() {
        Some(&"ipfs") | Some(&"ipns") => 2.min(segments.len()),
        _ => 0,
    };
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.len() > root_len {
                    segments.pop();
                }
            }
            segment => segments.push(segment),
        }
    }

    format!("{origin}/{}", segments.join("/"))
}

/// Ask an endpoint which content identifier it currently points at.
///
/// The response is either a bare identifier, optionally `ipfs://` prefixed, or a JSON object
/// with a `cid` field holding a string or an IPLD link (`{"/": cid}`).
///
pub async fn current_cid(
    gateway: &dyn Gateway,
    url: &str,
    cancel: Option<&CancellationToken>,
) -> Result<Cid> {
    let text = cancellable(cancel, gateway.fetch_text(url)).await?;
    let text = text.trim();
    let reference = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => object
            .get("cid")
            .and_then(|cid| cid.as_str().or_else(|| cid.get("/").and_then(Value::as_str)))
            .map(String::from)
            .ok_or_else(|| Error::InvalidIdentifier(format!("no 'cid' in response from {url}")))?,
        Ok(Value::String(reference)) => reference,
        _ => text.to_string(),
    };

    parse_cid(strip_ipfs_scheme(&reference))
}
