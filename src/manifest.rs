use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Source of truth for `/deployments.json`: the protocol→network→endpoint
/// mapping the dashboard renders. Loaded from a URL or a local file, with
/// one silent retry; a second failure surfaces as 503 so the presentation
/// layer falls back to a hard reload. That crude policy stays confined here.
pub struct ManifestLoader {
    source: Option<String>,
    cache: RwLock<Option<Value>>,
}

impl ManifestLoader {
    pub fn new(source: Option<String>) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
        }
    }

    pub async fn get(&self) -> Result<Value> {
        if let Some(cached) = self.cache.read().await.clone() {
            return Ok(cached);
        }

        let manifest = match self.load_once().await {
            Ok(manifest) => manifest,
            Err(first) => {
                debug!("manifest load failed, retrying once: {first}");
                self.load_once().await.map_err(|second| {
                    warn!("manifest load failed twice: {second}");
                    AppError::Manifest(second.to_string())
                })?
            }
        };

        *self.cache.write().await = Some(manifest.clone());
        Ok(manifest)
    }

    async fn load_once(&self) -> Result<Value> {
        let Some(source) = &self.source else {
            // No manifest configured: an empty mapping, not an error.
            return Ok(Value::Object(serde_json::Map::new()));
        };

        if source.starts_with("http://") || source.starts_with("https://") {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?;
            let manifest = client.get(source).send().await?.json::<Value>().await?;
            Ok(manifest)
        } else {
            let raw = tokio::fs::read_to_string(source).await?;
            Ok(serde_json::from_str(&raw)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_source_serves_an_empty_mapping() {
        let loader = ManifestLoader::new(None);
        let manifest = loader.get().await.unwrap();
        assert_eq!(manifest, serde_json::json!({}));
    }

    #[tokio::test]
    async fn file_source_is_loaded_and_cached() {
        let dir = std::env::temp_dir();
        let path = dir.join("poolmetrics-manifest-test.json");
        tokio::fs::write(
            &path,
            r#"{"lending":{"maple-v1":{"mainnet":"https://example.org/maple"}}}"#,
        )
        .await
        .unwrap();

        let loader = ManifestLoader::new(Some(path.to_string_lossy().into_owned()));
        let manifest = loader.get().await.unwrap();
        assert_eq!(
            manifest["lending"]["maple-v1"]["mainnet"],
            "https://example.org/maple"
        );

        // Cached: deleting the file must not break subsequent reads.
        tokio::fs::remove_file(&path).await.unwrap();
        assert!(loader.get().await.is_ok());
    }

    #[tokio::test]
    async fn missing_file_fails_after_the_single_retry() {
        let loader = ManifestLoader::new(Some("/nonexistent/deployments.json".to_string()));
        let err = loader.get().await.unwrap_err();
        assert!(matches!(err, AppError::Manifest(_)));
    }
}
