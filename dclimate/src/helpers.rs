use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::errors::{Error, Result};

/// Make sure bounds are ordered correctly, eg start comes before end, bottom is below top.
///
pub fn rearrange<N>(lower: N, upper: N) -> (N, N)
where
    N: PartialOrd,
{
    if lower > upper {
        (upper, lower)
    } else {
        (lower, upper)
    }
}

/// Run `operation` unless `cancel` fires first.
///
/// A token that is already cancelled short circuits without polling `operation` at all.
///
pub(crate) async fn cancellable<T, F>(cancel: Option<&CancellationToken>, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match cancel {
        None => operation.await,
        Some(token) => {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = operation => result,
            }
        }
    }
}

/// Strip an `ipfs://` or `/ipfs/` prefix from a content reference.
pub(crate) fn strip_ipfs_scheme(href: &str) -> &str {
    let href = href.trim();
    href.strip_prefix("ipfs://")
        .or_else(|| href.strip_prefix("/ipfs/"))
        .unwrap_or(href)
        .trim_end_matches('/')
}
