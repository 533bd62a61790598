use crate::circuit::CircuitBreaker;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A single entry from Nimbus's `/api/v1/topology/summary` listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopologySummary {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(rename = "uptimeSeconds")]
    pub uptime_seconds: i64,
    #[serde(rename = "numWorkers")]
    pub num_workers: i32,
    #[serde(rename = "numExecutors")]
    pub num_executors: i32,
    #[serde(rename = "numTasks")]
    pub num_tasks: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopologyListing {
    pub topologies: Vec<TopologySummary>,
}

/// Full detail for one topology, Nimbus's `/api/v1/topology/{id}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopologyInfo {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(rename = "uptimeSeconds")]
    pub uptime_seconds: i64,
    #[serde(rename = "workers")]
    pub workers: Vec<WorkerSummary>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSummary {
    pub host: String,
    pub port: u16,
    #[serde(rename = "uptimeSeconds")]
    pub uptime_seconds: i64,
}

/// Nimbus's `/api/v1/cluster/summary` slot accounting for the whole cluster.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterInfo {
    #[serde(rename = "slotsTotal")]
    pub slots_total: i32,
    #[serde(rename = "slotsUsed")]
    pub slots_used: i32,
    #[serde(rename = "topologies")]
    pub topology_count: i32,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    name: &'a str,
    #[serde(rename = "mainClass")]
    main_class: &'a str,
    args: &'a [String],
    config: &'a std::collections::BTreeMap<String, String>,
    #[serde(rename = "jarPath")]
    jar_path: &'a str,
}

/// Config for one Nimbus endpoint: everything [`NimbusClient`] needs besides
/// the shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct NimbusConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub circuit_failure_threshold: u32,
    pub circuit_open_duration: Duration,
}

impl Default for NimbusConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout: Duration::from_secs(30),
            circuit_failure_threshold: 5,
            circuit_open_duration: Duration::from_secs(30),
        }
    }
}

/// A pooled, circuit-breaker-guarded handle to a single Nimbus's REST API
/// (the UI daemon's `/api/v1` surface, not Thrift — see DESIGN.md). Cheap
/// to clone: the breaker and HTTP client are both shared via `Arc`.
#[derive(Clone)]
pub struct NimbusClient {
    http: reqwest::Client,
    config: NimbusConfig,
    breaker: Arc<CircuitBreaker>,
}

impl NimbusClient {
    pub fn new(http: reqwest::Client, config: NimbusConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            config.circuit_failure_threshold,
            config.circuit_open_duration,
        ));
        Self {
            http,
            config,
            breaker,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn guarded<T, F, Fut>(&self, f: F) -> Result<T, Error>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        if !self.breaker.allow_request() {
            return Err(Error::CircuitOpen(self.config.base_url.clone()));
        }
        match f().await {
            Ok(v) => {
                self.breaker.record_success();
                Ok(v)
            }
            Err(e) => {
                if e.is_transient() {
                    self.breaker.record_failure();
                }
                Err(e)
            }
        }
    }

    pub async fn list_topologies(&self) -> Result<Vec<TopologySummary>, Error> {
        self.guarded(|| async {
            let resp = self
                .http
                .get(self.url("/api/v1/topology/summary"))
                .timeout(self.config.request_timeout)
                .send()
                .await
                .map_err(map_transport_error)?;
            let resp = check_status(resp).await?;
            let listing: TopologyListing = resp.json().await?;
            Ok(listing.topologies)
        })
        .await
    }

    pub async fn get_topology(&self, id: &str) -> Result<TopologyInfo, Error> {
        self.guarded(|| async {
            let resp = self
                .http
                .get(self.url(&format!("/api/v1/topology/{id}")))
                .timeout(self.config.request_timeout)
                .send()
                .await
                .map_err(map_transport_error)?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(Error::NotFound(id.to_string()));
            }
            let resp = check_status(resp).await?;
            Ok(resp.json().await?)
        })
        .await
    }

    /// Issues Nimbus's cluster-wide slot summary, the basis for recomputing
    /// `usedSlots`/`freeSlots`/`topologyCount` on `StormCluster.status`.
    pub async fn get_cluster_info(&self) -> Result<ClusterInfo, Error> {
        self.guarded(|| async {
            let resp = self
                .http
                .get(self.url("/api/v1/cluster/summary"))
                .timeout(self.config.request_timeout)
                .send()
                .await
                .map_err(map_transport_error)?;
            let resp = check_status(resp).await?;
            Ok(resp.json().await?)
        })
        .await
    }

    /// Submits a topology whose JAR has already been uploaded to Nimbus's
    /// local filesystem at `jar_path` (the JAR acquirer's job).
    pub async fn submit_topology(
        &self,
        name: &str,
        main_class: &str,
        args: &[String],
        config: &std::collections::BTreeMap<String, String>,
        jar_path: &str,
    ) -> Result<String, Error> {
        self.guarded(|| async {
            let body = SubmitRequest {
                name,
                main_class,
                args,
                config,
                jar_path,
            };
            let resp = self
                .http
                .post(self.url("/api/v1/topology"))
                .timeout(self.config.request_timeout)
                .json(&body)
                .send()
                .await
                .map_err(map_transport_error)?;
            if resp.status() == reqwest::StatusCode::CONFLICT {
                return Err(Error::AlreadyAlive(name.to_string()));
            }
            let resp = check_status(resp).await?;
            #[derive(Deserialize)]
            struct SubmitResponse {
                id: String,
            }
            let parsed: SubmitResponse = resp.json().await?;
            Ok(parsed.id)
        })
        .await
    }

    pub async fn kill_topology(&self, id: &str, wait_seconds: u32) -> Result<(), Error> {
        self.guarded(|| async {
            let resp = self
                .http
                .post(self.url(&format!("/api/v1/topology/{id}/kill/{wait_seconds}")))
                .timeout(self.config.request_timeout)
                .send()
                .await
                .map_err(map_transport_error)?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(Error::NotAlive(id.to_string()));
            }
            check_status(resp).await?;
            Ok(())
        })
        .await
    }

    /// Streams a JAR's bytes to Nimbus's upload endpoint in chunks so the
    /// whole artifact is never buffered in memory at once. Not wrapped in
    /// the usual retry path: a consumed byte stream can't be replayed, so
    /// callers needing a retry must re-open the source and call again.
    pub async fn upload_jar(
        &self,
        chunks: impl futures::Stream<Item = std::io::Result<bytes::Bytes>> + Send + Sync + 'static,
    ) -> Result<String, Error> {
        let body = reqwest::Body::wrap_stream(chunks);
        if !self.breaker.allow_request() {
            return Err(Error::CircuitOpen(self.config.base_url.clone()));
        }
        let result = self
            .http
            .post(self.url("/api/v1/jar"))
            .timeout(self.config.request_timeout)
            .body(body)
            .send()
            .await
            .map_err(map_transport_error);
        match result {
            Ok(resp) => {
                let resp = check_status(resp).await?;
                #[derive(Deserialize)]
                struct UploadResponse {
                    path: String,
                }
                let parsed: UploadResponse = resp.json().await?;
                self.breaker.record_success();
                Ok(parsed.path)
            }
            Err(e) => {
                if e.is_transient() {
                    self.breaker.record_failure();
                }
                Err(e)
            }
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::Transient(e.to_string())
    } else {
        Error::Http(e)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Unauthorized);
    }
    if status.is_server_error() {
        let text = resp.text().await.unwrap_or_default();
        return Err(Error::Transient(format!("{status}: {text}")));
    }
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(Error::Transient(format!("{status}: {text}")));
    }
    Ok(resp)
}
