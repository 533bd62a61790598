use crate::error::Error;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};

/// ConfigMaps store JAR bytes base64-encoded under `binaryData` (plain
/// `data` is UTF-8-only and unsuitable for a JAR); `key` must name an entry
/// in `binaryData`.
pub async fn fetch(client: Client, namespace: &str, name: &str, key: &str) -> Result<Vec<u8>, Error> {
    let api: Api<ConfigMap> = Api::namespaced(client, namespace);
    let cm = api.get(name).await?;
    let encoded = cm
        .binary_data
        .as_ref()
        .and_then(|m| m.get(key))
        .ok_or_else(|| Error::SourceKeyNotFound(format!("configMap/{name}[{key}]")))?;
    Ok(encoded.0.clone())
}
