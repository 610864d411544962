/// Read-through caching around an async computation.
///
/// Returns the cached value when the key is present. Otherwise awaits
/// `$block`, queues the result for a background write, and returns it.
/// Cache reads that fail are logged and treated as a miss so an unavailable
/// Redis never fails the caller; errors from `$block` propagate with `?`.
///
/// # Arguments
/// * `$cache`: a [`Cache`](crate::db::Cache)
/// * `$key`: the [`CacheKey`](crate::db::CacheKey) to read and write
/// * `$ttl`: time-to-live of the written value, in seconds
/// * `$block`: future computing the value on a miss
///
/// # Example
/// ```rust,ignore
/// let record = cached!(cache, CacheKey::LookupByIdentifier(isbn), TTL, async move {
///     fetch_record(&isbn).await
/// });
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        match $cache.get_from_cache(&key).await {
            Ok(Some(cached)) => Ok(cached),
            result => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, key = %key, "Cache read failed, treating as miss");
                }
                let value = $block.await?;
                $cache.set_in_background(&key, &value, $ttl);
                Ok(value)
            }
        }
    }};
}
