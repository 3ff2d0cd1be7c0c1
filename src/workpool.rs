//! Fixed-size worker pool over disjoint item batches.
//!
//! Shared by the indexer (admission / recheck / extraction passes) and the
//! query executor's verification pass. Items are split into batches of
//! `batch_size`, and at most `pool_size` batches are processed concurrently
//! at any moment, rather than spawning one OS thread per batch.

/// Splits `items` into batches of `batch_size`, processes up to `pool_size`
/// batches concurrently via scoped threads, and returns one result per batch
/// in batch order.
pub fn map_batches<T, R, F>(items: Vec<T>, pool_size: usize, batch_size: usize, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(Vec<T>) -> R + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }

    let batch_size = batch_size.max(1);
    let mut batches: Vec<Vec<T>> = Vec::new();
    {
        let mut it = items.into_iter();
        loop {
            let batch: Vec<T> = it.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            batches.push(batch);
        }
    }

    let pool_size = pool_size.max(1);
    let mut results = Vec::with_capacity(batches.len());
    let mut remaining = batches;
    while !remaining.is_empty() {
        let take = pool_size.min(remaining.len());
        let group: Vec<Vec<T>> = remaining.drain(..take).collect();
        let group_results: Vec<R> = std::thread::scope(|scope| {
            let handles: Vec<_> = group.into_iter().map(|b| scope.spawn(|| f(b))).collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("worker thread panicked"))
                .collect()
        });
        results.extend(group_results);
    }
    results
}
