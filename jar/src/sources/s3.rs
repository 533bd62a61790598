use crate::error::Error;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::Client as S3Client;

/// Builds an S3 client from credentials read out of a Kubernetes secret,
/// the same `aws-sdk-s3`/`aws-config` pairing the video-relay side of this
/// workspace uses for its own uploads.
pub fn build_client(
    access_key_id: &str,
    secret_access_key: &str,
    region: &str,
    endpoint: Option<&str>,
) -> S3Client {
    let creds = Credentials::new(access_key_id, secret_access_key, None, None, "storm-jar");
    let mut builder = S3ConfigBuilder::new()
        .region(Region::new(region.to_string()))
        .credentials_provider(creds)
        .behavior_version(aws_config::BehaviorVersion::latest());
    if let Some(endpoint) = endpoint {
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }
    S3Client::from_conf(builder.build())
}

pub async fn fetch(client: &S3Client, bucket: &str, key: &str) -> Result<Vec<u8>, Error> {
    let output = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| Error::S3(e.to_string()))?;
    let data = output
        .body
        .collect()
        .await
        .map_err(|e| Error::S3(e.to_string()))?;
    Ok(data.into_bytes().to_vec())
}
