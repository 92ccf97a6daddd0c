//! A time limited cache for fetched catalog trees.
//!
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{
    channel::oneshot::{channel, Sender},
    future::BoxFuture,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::tree::CatalogTree;
use crate::{errors::Result, helpers::cancellable};

/// Source of the current time, so tests can control expiry.
///
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Catalog trees keyed by gateway endpoint, each kept for a fixed time to live.
///
/// Concurrent requests for the same key share a single load. If that load fails, or the task
/// running it is dropped, waiting requests start over and one of them loads again.
///
/// Expired entries are discarded when they're next looked up. Nothing is evicted otherwise, the
/// number of distinct gateways in use is expected to be tiny.
///
pub struct CatalogCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Entry>>,
    loaders: Mutex<HashMap<String, Arc<Loader>>>,
}

struct Entry {
    tree: Arc<CatalogTree>,
    fetched_at: Instant,
}

/// Shared by every request waiting on one load.
struct Loader {
    state: Mutex<LoaderState>,
}

#[derive(Default)]
struct LoaderState {
    /// `Some` once the load is over, holding the tree if it succeeded
    done: Option<Option<Arc<CatalogTree>>>,
    waiters: Vec<Sender<Option<Arc<CatalogTree>>>>,
}

/// Held by the request doing the loading. Dropping it, however that happens, releases the key
/// and wakes anyone still waiting.
struct LoadGuard<'a> {
    cache: &'a CatalogCache,
    key: String,
    loader: Arc<Loader>,
}

enum Join<'a> {
    Load(LoadGuard<'a>),
    Wait(Arc<Loader>),
}

impl CatalogCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
            loaders: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the tree for `key`, calling `load` if there is no fresh entry.
    ///
    /// Cancelling `cancel` abandons the call whether it's loading or waiting on another call's
    /// load.
    ///
    pub async fn get<'f, L>(
        &self,
        key: &str,
        load: L,
        cancel: Option<&CancellationToken>,
    ) -> Result<Arc<CatalogTree>>
    where
        L: FnOnce() -> BoxFuture<'f, Result<CatalogTree>>,
    {
        loop {
            if let Some(tree) = self.lookup(key) {
                debug!("Catalog cache hit for {key}");
                return Ok(tree);
            }

            match self.join(key) {
                Join::Load(guard) => {
                    debug!("Catalog cache miss for {key}");
                    let tree = Arc::new(cancellable(cancel, load()).await?);
                    self.entries.lock().insert(
                        key.to_string(),
                        Entry {
                            tree: Arc::clone(&tree),
                            fetched_at: self.clock.now(),
                        },
                    );
                    guard.loader.finish(Some(Arc::clone(&tree)));

                    return Ok(tree);
                }
                Join::Wait(loader) => {
                    let waited = cancellable(cancel, async { Ok(loader.wait().await) }).await?;
                    if let Some(tree) = waited {
                        return Ok(tree);
                    }
                    // The other load failed, try again ourselves
                }
            }
        }
    }

    fn lookup(&self, key: &str) -> Option<Arc<CatalogTree>> {
        let mut entries = self.entries.lock();
        let fresh = match entries.get(key) {
            None => return None,
            Some(entry) => self.clock.now().saturating_duration_since(entry.fetched_at) < self.ttl,
        };
        if fresh {
            entries.get(key).map(|entry| Arc::clone(&entry.tree))
        } else {
            debug!("Catalog cache entry for {key} expired");
            entries.remove(key);
            None
        }
    }

    fn join(&self, key: &str) -> Join<'_> {
        let mut loaders = self.loaders.lock();
        match loaders.get(key) {
            Some(loader) => Join::Wait(Arc::clone(loader)),
            None => {
                let loader = Arc::new(Loader::new());
                loaders.insert(key.to_string(), Arc::clone(&loader));

                Join::Load(LoadGuard {
                    cache: self,
                    key: key.to_string(),
                    loader,
                })
            }
        }
    }
}

impl Loader {
    fn new() -> Self {
        Self {
            state: Mutex::new(LoaderState::default()),
        }
    }

    fn finish(&self, tree: Option<Arc<CatalogTree>>) {
        let mut state = self.state.lock();
        if state.done.is_some() {
            return;
        }
        for waiter in state.waiters.drain(..) {
            // Receiver may have given up, that's fine
            let _ = waiter.send(tree.clone());
        }
        state.done = Some(tree);
    }

    async fn wait(&self) -> Option<Arc<CatalogTree>> {
        let receive = {
            let mut state = self.state.lock();
            if let Some(done) = &state.done {
                return done.clone();
            }
            let (send, receive) = channel();
            state.waiters.push(send);

            receive
        };

        receive.await.ok().flatten()
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.cache.loaders.lock().remove(&self.key);
        self.loader.finish(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::{join_all, FutureExt};
    use tokio::{sync::Notify, task, time};

    use crate::{errors::Error, testing::ManualClock};

    fn tree(organization: &str) -> CatalogTree {
        CatalogTree {
            organizations: vec![super::super::tree::Organization {
                id: organization.into(),
                title: None,
                declared_collections: vec![],
                dataset_slugs: vec![],
                collections: vec![],
            }],
        }
    }

    fn loaded(organization: &str) -> BoxFuture<'static, Result<CatalogTree>> {
        let tree = tree(organization);
        async move { Ok(tree) }.boxed()
    }

    #[tokio::test]
    async fn test_hit_then_expire() -> Result<()> {
        let clock = Arc::new(ManualClock::new());
        let cache = CatalogCache::with_clock(Duration::from_secs(3600), clock.clone());
        let loads = AtomicUsize::new(0);
        let loads = &loads;
        let load = |organization: &'static str| {
            move || {
                loads.fetch_add(1, Ordering::SeqCst);
                loaded(organization)
            }
        };

        let first = cache.get("https://gateway.test", load("ecmwf"), None).await?;
        clock.advance(Duration::from_secs(3599));
        let second = cache.get("https://gateway.test", load("other"), None).await?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(1));
        let third = cache.get("https://gateway.test", load("other"), None).await?;
        assert_eq!(third.organization_ids(), vec!["other"]);
        assert_eq!(loads.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_keyed_by_endpoint() -> Result<()> {
        let cache = CatalogCache::new(Duration::from_secs(60));
        cache.get("https://a.test", || loaded("a"), None).await?;
        let b = cache.get("https://b.test", || loaded("b"), None).await?;
        assert_eq!(b.organization_ids(), vec!["b"]);
        let a = cache.get("https://a.test", || loaded("a2"), None).await?;
        assert_eq!(a.organization_ids(), vec!["a"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() -> Result<()> {
        let cache = CatalogCache::new(Duration::from_secs(60));
        let loads = Arc::new(AtomicUsize::new(0));

        let requests = (0..5).map(|_| {
            let loads = Arc::clone(&loads);
            let load = move || -> BoxFuture<'static, Result<CatalogTree>> {
                async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    time::sleep(Duration::from_millis(20)).await;
                    Ok(tree("ecmwf"))
                }
                .boxed()
            };
            cache.get("https://gateway.test", load, None)
        });
        let results = join_all(requests).await;
        for result in results {
            assert_eq!(result?.organization_ids(), vec!["ecmwf"]);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_waiter_returns_promptly() -> Result<()> {
        let cache = CatalogCache::new(Duration::from_secs(60));
        let release = Notify::new();
        let release = &release;
        let token = CancellationToken::new();

        // The load only finishes once the waiter has given up
        let loading = cache.get(
            "https://gateway.test",
            move || {
                async move {
                    release.notified().await;
                    Ok::<_, Error>(tree("ecmwf"))
                }
                .boxed()
            },
            None,
        );
        let waiting = async {
            // Join after the load has started
            task::yield_now().await;
            let result = cache
                .get("https://gateway.test", || loaded("other"), Some(&token))
                .await;
            release.notify_one();
            result
        };
        let cancel = async {
            task::yield_now().await;
            task::yield_now().await;
            token.cancel();
        };

        let (first, second, _) = time::timeout(Duration::from_secs(5), async {
            tokio::join!(loading, waiting, cancel)
        })
        .await
        .expect("cancelled waiter never returned");
        assert!(matches!(second, Err(Error::Cancelled)));
        assert_eq!(first?.organization_ids(), vec!["ecmwf"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_before_loading() {
        let cache = CatalogCache::new(Duration::from_secs(60));
        let token = CancellationToken::new();
        token.cancel();

        let result = cache
            .get("https://gateway.test", || loaded("ecmwf"), Some(&token))
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(cache.loaders.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_load_not_cached() -> Result<()> {
        let cache = CatalogCache::new(Duration::from_secs(60));
        let fail = || -> BoxFuture<'static, Result<CatalogTree>> {
            async { Err(Error::Transport("boom".into())) }.boxed()
        };
        assert!(cache.get("https://gateway.test", fail, None).await.is_err());

        let tree = cache
            .get("https://gateway.test", || loaded("ecmwf"), None)
            .await?;
        assert_eq!(tree.organization_ids(), vec!["ecmwf"]);

        Ok(())
    }
}
