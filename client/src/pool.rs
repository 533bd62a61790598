use crate::nimbus::{NimbusClient, NimbusConfig};
use dashmap::DashMap;
use std::time::Duration;

/// Shared pool of [`NimbusClient`] handles keyed by endpoint URL. Each
/// `StormCluster` resolves to one entry; reconcilers ask the pool for a
/// client rather than building one per reconcile, so the circuit breaker
/// state and connection keep-alives survive across reconciles.
pub struct NimbusPool {
    clients: DashMap<String, NimbusClient>,
    http: reqwest::Client,
    default_timeout: Duration,
}

impl NimbusPool {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            http: reqwest::Client::builder()
                .pool_max_idle_per_host(4)
                .build()
                .expect("reqwest client builder with static config cannot fail"),
            default_timeout,
        }
    }

    pub fn get_or_insert(&self, base_url: &str) -> NimbusClient {
        if let Some(existing) = self.clients.get(base_url) {
            return existing.clone();
        }
        let config = NimbusConfig {
            base_url: base_url.to_string(),
            request_timeout: self.default_timeout,
            ..NimbusConfig::default()
        };
        let client = NimbusClient::new(self.http.clone(), config);
        self.clients.insert(base_url.to_string(), client.clone());
        client
    }

    pub fn remove(&self, base_url: &str) {
        self.clients.remove(base_url);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for NimbusPool {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_client_for_same_endpoint() {
        let pool = NimbusPool::default();
        let a = pool.get_or_insert("http://nimbus-a:8080");
        let b = pool.get_or_insert("http://nimbus-a:8080");
        assert_eq!(pool.len(), 1);
        drop((a, b));
    }

    #[test]
    fn distinct_endpoints_get_distinct_entries() {
        let pool = NimbusPool::default();
        pool.get_or_insert("http://nimbus-a:8080");
        pool.get_or_insert("http://nimbus-b:8080");
        assert_eq!(pool.len(), 2);
    }
}
