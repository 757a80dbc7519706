//! TTL response cache with pattern invalidation.
//!
//! [`CacheStore`] holds the entries; [`CacheManager`] owns a store plus the
//! background sweep task that purges expired entries nobody reads again.
//! The sweep runs until [`CacheManager::dispose`] is called or the manager
//! is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use regex::Regex;
use reqwest::Method;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backoff::deadline_after;
use crate::config::CacheConfig;
use crate::error::{SdkError, SdkResult};

/// Build the cache key of a request: `METHOD:path?sorted&query=params`.
///
/// Query parameters embedded in `path` are merged with `query`, and the
/// result is sorted by key (then value) so caller ordering does not matter.
///
/// # Examples
///
/// ```
/// use resilient_client::cache::cache_key;
/// use reqwest::Method;
///
/// let a = cache_key(&Method::GET, "/widgets?b=2&a=1", &[]);
/// let query = [("a".into(), "1".into()), ("b".into(), "2".into())];
/// let b = cache_key(&Method::GET, "/widgets", &query);
/// assert_eq!(a, "GET:/widgets?a=1&b=2");
/// assert_eq!(a, b);
/// ```
#[must_use]
pub fn cache_key(method: &Method, path: &str, query: &[(String, String)]) -> String {
    let (path, embedded) = path.split_once('?').unwrap_or((path, ""));

    let mut params: Vec<(String, String)> = url::form_urlencoded::parse(embedded.as_bytes())
        .into_owned()
        .chain(query.iter().cloned())
        .collect();

    if params.is_empty() {
        return format!("{method}:{path}");
    }

    params.sort();
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&params)
        .finish();
    format!("{method}:{path}?{encoded}")
}

/// Compile a glob pattern (`*` any run, `?` any single character) into an
/// anchored regex.
///
/// # Errors
///
/// Returns a `Cache` error for an empty pattern.
pub fn glob_to_regex(pattern: &str) -> SdkResult<Regex> {
    if pattern.is_empty() {
        return Err(SdkError::cache("invalidate", "pattern must not be empty"));
    }
    let mut source = String::with_capacity(pattern.len() * 2 + 2);
    source.push('^');
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| SdkError::cache("invalidate", e.to_string()))
}

/// A cached value.
#[derive(Debug, Clone)]
pub struct CacheItem<V> {
    /// Cached value
    pub data: V,
    /// When the value was stored
    pub created_at: Instant,
    /// When the value stops being visible
    pub expires_at: Instant,
    /// Free-form annotations
    pub metadata: Option<HashMap<String, String>>,
}

impl<V> CacheItem<V> {
    /// Whether the item is still visible at `now`.
    #[must_use]
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

type Entries<V> = Arc<RwLock<HashMap<String, CacheItem<V>>>>;

fn purge_expired_entries<V>(entries: &mut HashMap<String, CacheItem<V>>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, item| item.is_live(now));
    before - entries.len()
}

/// TTL-keyed storage.
#[derive(Debug)]
pub struct CacheStore<V> {
    entries: Entries<V>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> CacheStore<V> {
    /// Create a store.
    #[must_use]
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Get a live value. An expired entry is removed on the way.
    pub async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(item) if item.is_live(now) => return Some(item.data.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|item| !item.is_live(now)) {
            entries.remove(key);
        }
        None
    }

    /// Get a live item including its bookkeeping.
    pub async fn get_item(&self, key: &str) -> Option<CacheItem<V>> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|item| item.is_live(now))
            .cloned()
    }

    /// Store a value for `ttl` (the default TTL when `None`).
    ///
    /// # Errors
    ///
    /// Returns a `Cache` error for a zero TTL.
    pub async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> SdkResult<()> {
        self.set_with_metadata(key, value, ttl, None).await
    }

    /// Store a value with metadata.
    ///
    /// # Errors
    ///
    /// Returns a `Cache` error for a zero TTL.
    pub async fn set_with_metadata(
        &self,
        key: &str,
        value: V,
        ttl: Option<Duration>,
        metadata: Option<HashMap<String, String>>,
    ) -> SdkResult<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return Err(SdkError::cache("set", format!("ttl for {key} must be positive")));
        }

        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            purge_expired_entries(&mut entries);
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, item)| item.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key.to_string(),
            CacheItem {
                data: value,
                created_at: now,
                expires_at: deadline_after(now, ttl),
                metadata,
            },
        );
        Ok(())
    }

    /// Remove one entry. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Remove every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Remove every entry whose key matches the glob `pattern`.
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns a `Cache` error for an empty pattern.
    pub async fn invalidate(&self, pattern: &str) -> SdkResult<usize> {
        let matcher = glob_to_regex(pattern)?;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !matcher.is_match(key));
        Ok(before - entries.len())
    }

    /// Remove expired entries. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        purge_expired_entries(&mut *self.entries.write().await)
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Keys currently stored.
    pub async fn keys(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    fn downgrade(&self) -> Weak<RwLock<HashMap<String, CacheItem<V>>>> {
        Arc::downgrade(&self.entries)
    }
}

/// Cache store plus its background expiry sweep.
#[derive(Debug)]
pub struct CacheManager<V> {
    store: CacheStore<V>,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V: Clone + Send + Sync + 'static> CacheManager<V> {
    /// Create a manager and start its sweep task.
    ///
    /// # Errors
    ///
    /// Returns a `Cache` error when called outside a Tokio runtime.
    pub fn new(config: &CacheConfig) -> SdkResult<Self> {
        let manager = Self {
            store: CacheStore::new(config.default_ttl, config.max_entries),
            sweep_interval: config.sweep_interval,
            sweeper: Mutex::new(None),
        };
        manager.start()?;
        Ok(manager)
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &CacheStore<V> {
        &self.store
    }

    /// Start the sweep task. No-op if it is already running.
    ///
    /// # Errors
    ///
    /// Returns a `Cache` error when called outside a Tokio runtime.
    pub fn start(&self) -> SdkResult<()> {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SdkError::cache("start", format!("no async runtime: {e}")))?;
        let entries = self.store.downgrade();
        let interval = self.sweep_interval.max(Duration::from_millis(1));

        *sweeper = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                let purged = purge_expired_entries(&mut *entries.write().await);
                if purged > 0 {
                    debug!(purged, "Swept expired cache entries");
                }
            }
        }));
        debug!(interval_ms = interval.as_millis() as u64, "Cache sweeper started");
        Ok(())
    }

    /// Stop the sweep task. Idempotent.
    pub fn dispose(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Cache sweeper stopped");
        }
    }

    /// Whether the sweep task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// See [`CacheStore::get`].
    pub async fn get(&self, key: &str) -> Option<V> {
        self.store.get(key).await
    }

    /// See [`CacheStore::set`].
    ///
    /// # Errors
    ///
    /// Returns a `Cache` error for a zero TTL.
    pub async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> SdkResult<()> {
        self.store.set(key, value, ttl).await
    }

    /// Store a response for `method` `path`, recording both as metadata.
    ///
    /// # Errors
    ///
    /// Returns a `Cache` error for a zero TTL.
    pub async fn set_response(
        &self,
        key: &str,
        value: V,
        ttl: Option<Duration>,
        method: &Method,
        path: &str,
    ) -> SdkResult<()> {
        let metadata = HashMap::from([
            ("method".to_string(), method.to_string()),
            ("path".to_string(), path.to_string()),
        ]);
        self.store
            .set_with_metadata(key, value, ttl, Some(metadata))
            .await
    }

    /// See [`CacheStore::remove`].
    pub async fn remove(&self, key: &str) -> bool {
        self.store.remove(key).await
    }

    /// See [`CacheStore::clear`].
    pub async fn clear(&self) {
        self.store.clear().await;
    }

    /// See [`CacheStore::invalidate`].
    ///
    /// # Errors
    ///
    /// Returns a `Cache` error for an empty pattern.
    pub async fn invalidate(&self, pattern: &str) -> SdkResult<usize> {
        self.store.invalidate(pattern).await
    }

    /// See [`CacheStore::len`].
    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    /// See [`CacheStore::is_empty`].
    pub async fn is_empty(&self) -> bool {
        self.store.is_empty().await
    }
}

impl<V> Drop for CacheManager<V> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CacheStore<String> {
        CacheStore::new(Duration::from_secs(60), 100)
    }

    #[test]
    fn test_cache_key_sorts_query() {
        let a = cache_key(&Method::GET, "/widgets?b=2&a=1", &[]);
        let b = cache_key(
            &Method::GET,
            "/widgets",
            &[("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())],
        );
        assert_eq!(a, "GET:/widgets?a=1&b=2");
        assert_eq!(a, b);
        assert_eq!(cache_key(&Method::GET, "/widgets", &[]), "GET:/widgets");
    }

    #[test]
    fn test_glob_matching() {
        let re = glob_to_regex("GET:/widgets*").unwrap();
        assert!(re.is_match("GET:/widgets"));
        assert!(re.is_match("GET:/widgets/1?a=1"));
        assert!(!re.is_match("GET:/users"));

        let re = glob_to_regex("GET:/widgets/?").unwrap();
        assert!(re.is_match("GET:/widgets/7"));
        assert!(!re.is_match("GET:/widgets/77"));

        let re = glob_to_regex("GET:/search?q=a.b").unwrap();
        assert!(!re.is_match("GET:/search?q=aXb"));

        assert!(glob_to_regex("").is_err());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = store();
        cache.set("key1", "value1".to_string(), None).await.unwrap();
        assert_eq!(cache.get("key1").await, Some("value1".to_string()));
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_ttl_expiration_purges_lazily() {
        let cache = store();
        cache
            .set("key", "value".to_string(), Some(Duration::from_millis(5)))
            .await
            .unwrap();
        assert_eq!(cache.get("key").await, Some("value".to_string()));

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("key").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected() {
        let cache = store();
        let err = cache
            .set("key", "value".to_string(), Some(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Cache { .. }));
    }

    #[tokio::test]
    async fn test_unbounded_ttl_saturates() {
        let cache = store();
        cache
            .set("forever", "value".to_string(), Some(Duration::MAX))
            .await
            .unwrap();

        assert_eq!(cache.get("forever").await, Some("value".to_string()));
        let item = cache.get_item("forever").await.unwrap();
        assert!(item.expires_at > item.created_at);
        assert_eq!(cache.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn test_remove_clear_invalidate() {
        let cache = store();
        for key in ["GET:/widgets", "GET:/widgets/1", "GET:/users"] {
            cache.set(key, key.to_string(), None).await.unwrap();
        }

        assert!(cache.remove("GET:/users").await);
        assert!(!cache.remove("GET:/users").await);

        assert_eq!(cache.invalidate("GET:/widgets*").await.unwrap(), 2);
        assert!(cache.is_empty().await);

        cache.set("a", "a".to_string(), None).await.unwrap();
        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_overflow_evicts_entry_closest_to_expiry() {
        let cache: CacheStore<u32> = CacheStore::new(Duration::from_secs(60), 2);
        cache.set("short", 1, Some(Duration::from_secs(1))).await.unwrap();
        cache.set("long", 2, Some(Duration::from_secs(100))).await.unwrap();
        cache.set("new", 3, None).await.unwrap();

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("short").await, None);
        assert_eq!(cache.get("long").await, Some(2));
    }

    #[tokio::test]
    async fn test_sweeper_purges_unread_entries() {
        let config = CacheConfig::enabled().with_sweep_interval(Duration::from_millis(10));
        let manager: CacheManager<String> = CacheManager::new(&config).unwrap();
        assert!(manager.is_running());

        manager
            .set("stale", "v".to_string(), Some(Duration::from_millis(5)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(manager.len().await, 0);
        manager.dispose();
    }

    #[tokio::test]
    async fn test_dispose_stops_sweeper() {
        let config = CacheConfig::enabled().with_sweep_interval(Duration::from_millis(10));
        let manager: CacheManager<String> = CacheManager::new(&config).unwrap();

        manager.dispose();
        manager.dispose();
        tokio::task::yield_now().await;

        manager
            .set("stale", "v".to_string(), Some(Duration::from_millis(5)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(!manager.is_running());
        assert_eq!(manager.len().await, 1);
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result: SdkResult<CacheManager<String>> = CacheManager::new(&CacheConfig::enabled());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_response_metadata() {
        let manager: CacheManager<u32> = CacheManager::new(&CacheConfig::enabled()).unwrap();
        manager
            .set_response("GET:/widgets", 1, None, &Method::GET, "/widgets")
            .await
            .unwrap();

        let item = manager.store().get_item("GET:/widgets").await.unwrap();
        let metadata = item.metadata.unwrap();
        assert_eq!(metadata["method"], "GET");
        assert_eq!(metadata["path"], "/widgets");
        manager.dispose();
    }
}
