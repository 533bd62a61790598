pub mod config_map;
pub mod container;
pub mod s3;
pub mod secret;
pub mod url;

use crate::error::Error;
use storm_types::JarSource;

/// Bytes fetched from a [`JarSource`], still unverified. Held in memory
/// only long enough to be checksummed and written to the cache; callers
/// streaming very large JARs should prefer `url`'s direct-to-disk path
/// (see [`url::fetch_to_path`]).
pub struct FetchedJar {
    pub bytes: Vec<u8>,
}

pub fn validate_single_source(source: &JarSource) -> Result<(), Error> {
    match source.populated_count() {
        1 => Ok(()),
        0 => Err(Error::Validation(
            "jar source must set exactly one of url/configMap/secret/s3/container, got none"
                .into(),
        )),
        n => Err(Error::Validation(format!(
            "jar source must set exactly one of url/configMap/secret/s3/container, got {n}"
        ))),
    }
}
