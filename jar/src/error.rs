use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("s3 error: {0}")]
    S3(String),

    #[error("transient failure fetching jar: {0}")]
    Transient(String),

    #[error("jar source is misconfigured: {0}")]
    Validation(String),

    #[error("referenced configMap/secret key '{0}' not found")]
    SourceKeyNotFound(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("unsupported checksum algorithm '{0}'")]
    UnsupportedChecksumAlgorithm(String),
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Transient(_) | Error::S3(_))
    }
}
