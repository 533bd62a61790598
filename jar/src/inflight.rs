use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-fingerprint mutex table enforcing at-most-one-concurrent-fetch. The
/// table only ever grows entries it doesn't remove; that's fine because
/// the key space is bounded by the number of distinct JAR sources in use,
/// not by request volume.
#[derive(Default)]
pub struct InFlightTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, fingerprint: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(fingerprint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `body` while holding the fingerprint's lock. Callers racing on
    /// the same fingerprint serialize here; the caller is expected to
    /// re-check the cache inside `body` before doing any real fetch work,
    /// so the second and later callers observe the first one's result
    /// instead of re-fetching.
    pub async fn with_lock<T, F, Fut>(&self, fingerprint: &str, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = self.lock_for(fingerprint);
        let _guard = lock.lock().await;
        body().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn serializes_same_fingerprint() {
        let table = StdArc::new(InFlightTable::new());
        let counter = StdArc::new(AtomicU32::new(0));
        let concurrent = StdArc::new(AtomicU32::new(0));
        let max_concurrent = StdArc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            let counter = counter.clone();
            let concurrent = concurrent.clone();
            let max_concurrent = max_concurrent.clone();
            handles.push(tokio::spawn(async move {
                table
                    .with_lock("fp-a", || async {
                        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                        max_concurrent.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        concurrent.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }
}
