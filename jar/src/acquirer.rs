use crate::cache::JarCache;
use crate::error::Error;
use crate::fingerprint::{content_hash, source_fingerprint};
use crate::inflight::InFlightTable;
use crate::sources::{config_map, s3 as s3_source, secret, url as url_source, validate_single_source};
use kube::Client;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use storm_types::{ChecksumSpec, JarSource};

/// Coordinates cache lookups, in-flight dedup, source fetch dispatch, and
/// checksum verification for a single namespace's JAR sources. One
/// `JarAcquirer` is shared across all topology reconciles; the cache and
/// in-flight table are what make repeated reconciles of the same topology
/// (or multiple topologies sharing a JAR) cheap.
pub struct JarAcquirer {
    cache: Arc<JarCache>,
    inflight: Arc<InFlightTable>,
    http: reqwest::Client,
    kube: Client,
}

impl JarAcquirer {
    pub fn new(cache: Arc<JarCache>, http: reqwest::Client, kube: Client) -> Self {
        Self {
            cache,
            inflight: Arc::new(InFlightTable::new()),
            http,
            kube,
        }
    }

    /// Resolves `source` to a local file path, fetching it if necessary.
    /// Returns the cache-relative path; the caller must call
    /// [`JarCache::release`] with the returned hash once done with it.
    pub async fn acquire(
        &self,
        namespace: &str,
        source: &JarSource,
        checksum: Option<&ChecksumSpec>,
    ) -> Result<AcquiredJar, Error> {
        validate_single_source(source)?;
        let fingerprint = source_fingerprint(source);

        let cache = self.cache.clone();
        let http = self.http.clone();
        let kube = self.kube.clone();
        let namespace = namespace.to_string();
        let source = source.clone();
        let checksum = checksum.cloned();

        let fingerprint_for_fetch = fingerprint.clone();
        self.inflight
            .with_lock(&fingerprint, move || async move {
                Self::fetch_uncached(
                    cache,
                    http,
                    kube,
                    &namespace,
                    &source,
                    checksum.as_ref(),
                    &fingerprint_for_fetch,
                )
                .await
            })
            .await
    }

    /// Releases the pin `acquire` took on the cache entry for `hash`. Call
    /// once the topology reaches `Running` or its submission fails.
    pub fn release(&self, hash: &str) {
        self.cache.release(hash);
    }

    async fn fetch_uncached(
        cache: Arc<JarCache>,
        http: reqwest::Client,
        kube: Client,
        namespace: &str,
        source: &JarSource,
        checksum: Option<&ChecksumSpec>,
        fingerprint: &str,
    ) -> Result<AcquiredJar, Error> {
        if let Some((hash, path)) = cache.get_by_fingerprint(fingerprint) {
            return Ok(AcquiredJar { path, hash });
        }

        let bytes = if let Some(url) = &source.url {
            let tmp = tempfile::NamedTempFile::new()?;
            url_source::fetch_to_path(&http, url, tmp.path()).await?;
            tokio::fs::read(tmp.path()).await?
        } else if let Some(cm) = &source.config_map {
            config_map::fetch(kube.clone(), namespace, &cm.name, &cm.key).await?
        } else if let Some(sec) = &source.secret {
            secret::fetch(kube.clone(), namespace, &sec.name, &sec.key).await?
        } else if let Some(s3cfg) = &source.s3 {
            let creds = secret::fetch(kube.clone(), namespace, &s3cfg.credentials_secret, "accessKeyId")
                .await?;
            let secret_key =
                secret::fetch(kube.clone(), namespace, &s3cfg.credentials_secret, "secretAccessKey")
                    .await?;
            let client = s3_source::build_client(
                std::str::from_utf8(&creds).unwrap_or_default(),
                std::str::from_utf8(&secret_key).unwrap_or_default(),
                s3cfg.region.as_deref().unwrap_or("us-east-1"),
                s3cfg.endpoint.as_deref(),
            );
            s3_source::fetch(&client, &s3cfg.bucket, &s3cfg.key).await?
        } else {
            return Err(Error::Validation(
                "container jar sources are acquired via the extraction job path, not fetch_uncached"
                    .into(),
            ));
        };

        if let Some(checksum) = checksum {
            verify_checksum(&bytes, checksum)?;
        }

        let hash = content_hash(&bytes);
        // Identical bytes may already be cached under a different source
        // fingerprint (e.g. two URLs serving the same JAR); skip the write
        // and just pin the existing entry.
        let dest = if let Some(existing) = cache.get(&hash) {
            existing
        } else {
            let dest = cache.path_for(&hash);
            tokio::fs::write(&dest, &bytes).await?;
            cache.insert(&hash, dest.clone(), bytes.len() as u64);
            dest
        };
        cache.record_fingerprint(fingerprint, &hash);
        for evicted in cache.evict_to_capacity() {
            let _ = tokio::fs::remove_file(evicted).await;
        }

        Ok(AcquiredJar { path: dest, hash })
    }
}

pub struct AcquiredJar {
    pub path: std::path::PathBuf,
    pub hash: String,
}

fn verify_checksum(bytes: &[u8], checksum: &ChecksumSpec) -> Result<(), Error> {
    if checksum.algorithm.to_lowercase() != "sha256" {
        return Err(Error::UnsupportedChecksumAlgorithm(checksum.algorithm.clone()));
    }
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let actual = hex::encode(hasher.finalize());
    if actual != checksum.value.to_lowercase() {
        return Err(Error::ChecksumMismatch {
            expected: checksum.value.clone(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_mismatch_is_rejected() {
        let checksum = ChecksumSpec {
            algorithm: "sha256".into(),
            value: "0".repeat(64),
        };
        let err = verify_checksum(b"hello", &checksum).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn checksum_match_is_accepted() {
        let mut hasher = Sha256::new();
        hasher.update(b"hello");
        let value = hex::encode(hasher.finalize());
        let checksum = ChecksumSpec {
            algorithm: "sha256".into(),
            value,
        };
        assert!(verify_checksum(b"hello", &checksum).is_ok());
    }

    #[test]
    fn unsupported_algorithm_is_rejected() {
        let checksum = ChecksumSpec {
            algorithm: "md5".into(),
            value: "deadbeef".into(),
        };
        let err = verify_checksum(b"hello", &checksum).unwrap_err();
        assert!(matches!(err, Error::UnsupportedChecksumAlgorithm(_)));
    }
}
