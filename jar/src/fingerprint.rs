use sha2::{Digest, Sha256};
use storm_types::JarSource;

/// A stable identity for a [`JarSource`] description, used as the cache key
/// and the in-flight-fetch dedup key. Two topologies pointing at the same
/// URL/configMap key/S3 object/image+path share a fingerprint and therefore
/// share a fetch and a cache entry, even before the bytes are known.
pub fn source_fingerprint(source: &JarSource) -> String {
    let mut hasher = Sha256::new();
    if let Some(url) = &source.url {
        hasher.update(b"url:");
        hasher.update(url.as_bytes());
    } else if let Some(cm) = &source.config_map {
        hasher.update(b"configMap:");
        hasher.update(cm.name.as_bytes());
        hasher.update(b":");
        hasher.update(cm.key.as_bytes());
    } else if let Some(secret) = &source.secret {
        hasher.update(b"secret:");
        hasher.update(secret.name.as_bytes());
        hasher.update(b":");
        hasher.update(secret.key.as_bytes());
    } else if let Some(s3) = &source.s3 {
        hasher.update(b"s3:");
        hasher.update(s3.bucket.as_bytes());
        hasher.update(b":");
        hasher.update(s3.key.as_bytes());
    } else if let Some(c) = &source.container {
        hasher.update(b"container:");
        hasher.update(c.image.as_bytes());
        hasher.update(b":");
        hasher.update(c.path.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// The content hash of fetched bytes, used as the cache's real storage key
/// once the artifact is in hand (the fingerprint above only identifies the
/// *description*, not the content).
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_types::{ConfigMapJarSource, JarSource};

    #[test]
    fn same_descriptor_same_fingerprint() {
        let a = JarSource {
            config_map: Some(ConfigMapJarSource {
                name: "jars".into(),
                key: "app.jar".into(),
            }),
            ..Default::default()
        };
        let b = a.clone();
        assert_eq!(source_fingerprint(&a), source_fingerprint(&b));
    }

    #[test]
    fn different_keys_different_fingerprint() {
        let a = JarSource {
            url: Some("https://example.com/a.jar".into()),
            ..Default::default()
        };
        let b = JarSource {
            url: Some("https://example.com/b.jar".into()),
            ..Default::default()
        };
        assert_ne!(source_fingerprint(&a), source_fingerprint(&b));
    }
}
