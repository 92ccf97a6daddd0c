use std::collections::HashMap;

use cid::Cid;
use serde_json::Value;

use super::schema::parse_cid;
use crate::errors::{Error, Result};

/// The old flat catalog: dataset names mapped straight to content identifiers.
///
/// Consulted when the hierarchical catalog can't be loaded or doesn't know a collection.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyCatalog {
    entries: HashMap<String, Cid>,
}

impl LegacyCatalog {
    /// Build from `name -> cid` pairs. Every identifier must parse.
    pub fn new<I, K, V>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, cid)| Ok((name.into(), parse_cid(cid.as_ref())?)))
            .collect::<Result<HashMap<String, Cid>>>()?;

        Ok(Self { entries })
    }

    /// Parse a JSON object of `{name: cid}`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::CatalogUnavailable(String::from("legacy catalog must be a JSON object"))
        })?;
        let entries = object
            .iter()
            .map(|(name, cid)| match cid.as_str() {
                Some(cid) => Ok((name.clone(), parse_cid(cid)?)),
                None => Err(Error::InvalidIdentifier(cid.to_string())),
            })
            .collect::<Result<HashMap<String, Cid>>>()?;

        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a dataset, trying `{collection}-{dataset}-{variant}`, then
    /// `{collection}-{dataset}`, then `{dataset}`.
    ///
    /// Returns the matching key along with the identifier.
    ///
    pub fn lookup(
        &self,
        collection: Option<&str>,
        dataset: &str,
        variant: Option<&str>,
    ) -> Option<(String, Cid)> {
        let mut keys = vec![];
        if let Some(collection) = collection {
            if let Some(variant) = variant {
                keys.push(format!("{collection}-{dataset}-{variant}"));
            }
            keys.push(format!("{collection}-{dataset}"));
        }
        keys.push(dataset.to_string());

        keys.into_iter()
            .find_map(|key| self.entries.get(&key).map(|cid| (key, *cid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::testing;

    #[test]
    fn test_lookup_order() -> Result<()> {
        let specific = testing::cid("x1");
        let general = testing::cid("x2");
        let bare = testing::cid("x3");
        let legacy = LegacyCatalog::new([
            ("cpc-precip-final", specific.to_string()),
            ("cpc-precip", general.to_string()),
            ("precip", bare.to_string()),
        ])?;

        assert_eq!(
            legacy.lookup(Some("cpc"), "precip", Some("final")),
            Some((String::from("cpc-precip-final"), specific))
        );
        assert_eq!(
            legacy.lookup(Some("cpc"), "precip", Some("prelim")),
            Some((String::from("cpc-precip"), general))
        );
        assert_eq!(
            legacy.lookup(None, "precip", Some("final")),
            Some((String::from("precip"), bare))
        );
        assert_eq!(legacy.lookup(Some("cpc"), "temp", None), None);

        Ok(())
    }

    #[test]
    fn test_from_json() -> Result<()> {
        let cid = testing::cid("legacy-cpc");
        let legacy = LegacyCatalog::from_json(&json!({"cpc-precip": cid.to_string()}))?;
        assert_eq!(legacy.lookup(Some("cpc"), "precip", None).map(|(_, c)| c), Some(cid));

        assert!(LegacyCatalog::from_json(&json!(["nope"])).is_err());
        assert!(LegacyCatalog::from_json(&json!({"cpc-precip": 3})).is_err());
        assert!(LegacyCatalog::from_json(&json!({"cpc-precip": "garbage"})).is_err());

        Ok(())
    }
}
