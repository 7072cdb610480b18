//! dApp manifest loading with a key-value cache.
//!
//! Manifests are cached under `connectManifests/{extension_key(manifest_url)}`.
//! A cached manifest is used as is; the dApp-declared URL is fetched only
//! when nothing is stored for it.

use std::sync::Arc;

use protocol::ErrorCode;
use protocol::dapp::extension_key;
use protocol::messages::{AppManifest, ConnectEventError};
use storage::{KeyValueStore, read_json, write_json};
use transport::{BoxFuture, HttpClient, TransportError};

const CACHE_PREFIX: &str = "connectManifests";

/// Downloads manifest documents.
pub trait ManifestSource: Send + Sync {
    /// Fetches the raw manifest JSON at `url`.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, TransportError>>;
}

impl ManifestSource for HttpClient {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, TransportError>> {
        Box::pin(self.get_text(url))
    }
}

/// Fetches, validates, and caches manifests.
pub struct ManifestLoader {
    source: Arc<dyn ManifestSource>,
    kv: Arc<dyn KeyValueStore>,
}

impl ManifestLoader {
    pub fn new(source: Arc<dyn ManifestSource>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self { source, kv }
    }

    /// Loads the manifest at `manifest_url`.
    ///
    /// Unreachable manifests map to `ManifestNotFound`, malformed ones to
    /// `ManifestContent`, both as connect errors ready to send.
    pub async fn load(&self, manifest_url: &str) -> Result<AppManifest, ConnectEventError> {
        let cache_key = format!("{CACHE_PREFIX}/{}", extension_key(manifest_url));

        match read_json::<AppManifest>(self.kv.as_ref(), &cache_key) {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => tracing::warn!(%e, manifest_url, "manifest cache unreadable"),
        }

        let raw = self.source.fetch(manifest_url).await.map_err(|e| {
            tracing::warn!(%e, manifest_url, "manifest fetch failed");
            ConnectEventError::new(ErrorCode::ManifestNotFound, "Manifest not found")
        })?;

        let manifest = parse_manifest(&raw).ok_or_else(|| {
            ConnectEventError::new(ErrorCode::ManifestContent, "Manifest content error")
        })?;

        if let Err(e) = write_json(self.kv.as_ref(), &cache_key, &manifest) {
            tracing::warn!(%e, manifest_url, "manifest cache write failed");
        }
        Ok(manifest)
    }
}

/// Parses a manifest and requires non-empty `url` and `name`.
pub fn parse_manifest(raw: &str) -> Option<AppManifest> {
    let manifest: AppManifest = serde_json::from_str(raw).ok()?;
    if manifest.url.trim().is_empty() || manifest.name.trim().is_empty() {
        return None;
    }
    Some(manifest)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use storage::InMemoryKeyValueStore;

    const GOOD: &str = r#"{"url":"https://good.app","name":"Good","iconUrl":"https://good.app/i.png"}"#;

    /// Serves queued responses in order.
    struct Scripted(Mutex<Vec<Result<String, TransportError>>>);

    impl ManifestSource for Scripted {
        fn fetch<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<String, TransportError>> {
            let next = self.0.lock().unwrap().remove(0);
            Box::pin(async move { next })
        }
    }

    fn loader(responses: Vec<Result<String, TransportError>>) -> ManifestLoader {
        ManifestLoader::new(
            Arc::new(Scripted(Mutex::new(responses))),
            Arc::new(InMemoryKeyValueStore::new()),
        )
    }

    #[tokio::test]
    async fn cached_manifest_skips_fetch() {
        // A second fetch would fail; the cache answers instead.
        let source = Arc::new(Scripted(Mutex::new(vec![Ok(GOOD.into()), Err(TransportError::Timeout)])));
        let loader = ManifestLoader::new(source.clone(), Arc::new(InMemoryKeyValueStore::new()));
        let first = loader.load("https://good.app/m.json").await.unwrap();
        let second = loader.load("https://good.app/m.json").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.name, "Good");

        assert_eq!(source.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_without_cache() {
        let err = loader(vec![Err(TransportError::Status(404))])
            .load("https://good.app/m.json")
            .await
            .unwrap_err();
        assert_eq!(err.payload.code, ErrorCode::ManifestNotFound.code());
    }

    #[tokio::test]
    async fn malformed_manifest() {
        let err = loader(vec![Ok(r#"{"url":"","name":"x","iconUrl":""}"#.into())])
            .load("https://good.app/m.json")
            .await
            .unwrap_err();
        assert_eq!(err.payload.code, ErrorCode::ManifestContent.code());
    }
}
