use async_trait::async_trait;
use cid::Cid;

use crate::{dataset::Dataset, errors::Result};

/// A trait for opening gridded datasets from an arbitrary content addressed store.
///
/// Implementations handle decoding of the stored bytes. Everything above this trait only ever
/// works with opened `Dataset` values.
///
#[async_trait]
pub trait ArrayStore: Send + Sync {
    /// Open the dataset identified by `cid`.
    ///
    async fn open(&self, cid: &Cid) -> Result<Dataset>;
}
