use crate::error::Error;
use futures_util::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Streams an HTTP(S) JAR directly to `dest`, never buffering the whole
/// artifact in memory. Returns the number of bytes written.
pub async fn fetch_to_path(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64, Error> {
    let resp = client.get(url).send().await.map_err(map_err)?;
    if !resp.status().is_success() {
        let status = resp.status();
        return Err(if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
            Error::Transient(format!("fetching {url}: {status}"))
        } else {
            Error::Validation(format!("fetching {url}: {status}"))
        });
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_err)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn map_err(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::Transient(e.to_string())
    } else {
        Error::Http(e)
    }
}
