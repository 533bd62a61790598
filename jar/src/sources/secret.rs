use crate::error::Error;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

pub async fn fetch(client: Client, namespace: &str, name: &str, key: &str) -> Result<Vec<u8>, Error> {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    let secret = api.get(name).await?;
    let encoded = secret
        .data
        .as_ref()
        .and_then(|m| m.get(key))
        .ok_or_else(|| Error::SourceKeyNotFound(format!("secret/{name}[{key}]")))?;
    Ok(encoded.0.clone())
}
