//! Avatar asset loading with a per-session cache.

use crate::avatar::SharedScene;
use crate::avatar::glb::parse_asset;
use crate::error::{AvatarError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Where an avatar asset lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// Fetched over HTTP(S).
    Remote(Url),
    /// Read from the local filesystem.
    Local(PathBuf),
}

impl AssetSource {
    /// Classify a source string. Anything that is not an `http`, `https` or
    /// `file` URL is treated as a filesystem path.
    pub fn parse(source: &str) -> Self {
        match Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Remote(url),
            Ok(url) if url.scheme() == "file" => match url.to_file_path() {
                Ok(path) => Self::Local(path),
                Err(()) => Self::Local(PathBuf::from(source)),
            },
            _ => Self::Local(PathBuf::from(source)),
        }
    }
}

/// Loads avatar assets once and hands out the cached handle afterwards.
pub struct AvatarLoader {
    http: reqwest::Client,
    cache: HashMap<String, SharedScene>,
}

impl AvatarLoader {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| AvatarError::Asset(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            cache: HashMap::new(),
        })
    }

    /// Load the asset at `source`, or return the handle loaded earlier.
    ///
    /// # Errors
    ///
    /// Returns an error if the asset cannot be fetched or parsed.
    pub async fn load(&mut self, source: &str) -> Result<SharedScene> {
        if let Some(scene) = self.cache.get(source) {
            debug!("avatar cache hit: {source}");
            return Ok(Arc::clone(scene));
        }

        let bytes = self.fetch(&AssetSource::parse(source)).await?;
        let scene = parse_asset(&bytes)?;
        info!(
            "avatar loaded from {source}: {} meshes, {} nodes",
            scene.meshes.len(),
            scene.nodes.len()
        );

        let shared = scene.into_shared();
        self.cache.insert(source.to_owned(), Arc::clone(&shared));
        Ok(shared)
    }

    /// Previously loaded handle, if any.
    pub fn cached(&self, source: &str) -> Option<SharedScene> {
        self.cache.get(source).cloned()
    }

    async fn fetch(&self, source: &AssetSource) -> Result<Vec<u8>> {
        match source {
            AssetSource::Local(path) => Ok(tokio::fs::read(path).await?),
            AssetSource::Remote(url) => {
                let response = self
                    .http
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| AvatarError::Asset(format!("fetch {url} failed: {e}")))?
                    .error_for_status()
                    .map_err(|e| AvatarError::Asset(format!("fetch {url} failed: {e}")))?;
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| AvatarError::Asset(format!("read {url} failed: {e}")))?;
                Ok(bytes.to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::avatar::glb::glb_from_json;

    #[test]
    fn classifies_sources() {
        assert!(matches!(
            AssetSource::parse("https://models.readyplayer.me/x.glb"),
            AssetSource::Remote(_)
        ));
        assert_eq!(
            AssetSource::parse("assets/avatar.glb"),
            AssetSource::Local(PathBuf::from("assets/avatar.glb"))
        );
        assert_eq!(
            AssetSource::parse("file:///tmp/avatar.glb"),
            AssetSource::Local(PathBuf::from("/tmp/avatar.glb"))
        );
    }

    #[tokio::test]
    async fn local_asset_is_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("avatar.glb");
        let json = r#"{"nodes": [{"name": "Face", "mesh": 0}],
                       "meshes": [{"extras": {"targetNames": ["mouthOpen"]}}]}"#;
        std::fs::write(&path, glb_from_json(json)).unwrap();

        let source = path.to_string_lossy().into_owned();
        let mut loader = AvatarLoader::new().unwrap();
        let first = loader.load(&source).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = loader.load(&source).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(loader.cached(&source).is_some());
        let scene = first.lock().unwrap();
        assert!(scene.mesh("Face").is_some());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let mut loader = AvatarLoader::new().unwrap();
        let result = loader.load("/nonexistent/avatar.glb").await;
        assert!(matches!(result, Err(AvatarError::Io(_))));
        assert!(loader.cached("/nonexistent/avatar.glb").is_none());
    }
}
