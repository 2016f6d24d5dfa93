use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use base64::Engine as _;
use url::Url;

use crate::classify::{AssetRef, CaptureImage};
use crate::config::ScrapeConfig;
use crate::error::{CaptureError, SubstrateError};
use crate::poll::{poll_settled, poll_until};
use crate::substrate::{NodeHandle, Rect, Substrate};

/// Source attributes probed in priority order when resolving an image URL.
pub const SOURCE_ATTRS: &[&str] = &["src", "data-src", "data-original", "data-lazy-src"];

/// Class markers some lazy-loaders set once an image has real pixels.
const LOADED_CLASS_MARKERS: &[&str] = &["loaded", "lazyloaded"];

/// Capture strategies, tried in order until one succeeds.
#[derive(Debug, Clone, Copy)]
enum Strategy {
    Snapshot,
    PageFetch,
    DirectFetch,
}

const STRATEGIES: [Strategy; 3] = [Strategy::Snapshot, Strategy::PageFetch, Strategy::DirectFetch];

impl Strategy {
    fn name(self) -> &'static str {
        match self {
            Strategy::Snapshot => "snapshot",
            Strategy::PageFetch => "page-fetch",
            Strategy::DirectFetch => "direct-fetch",
        }
    }
}

/// Synchronizes a lazily-loaded image into a captured asset file.
///
/// Waits for lazy-load readiness and bounding-box stability, derives a
/// deterministic asset id from the source URL, skips work when the asset is
/// already on disk, and otherwise walks the capture strategy chain. All
/// strategies share one timeout discipline; when every one fails the
/// reference is still returned, just without bytes.
pub struct AssetCapturer<'a> {
    substrate: &'a dyn Substrate,
    http: &'a reqwest::Client,
    config: &'a ScrapeConfig,
    asset_dir: PathBuf,
}

impl<'a> AssetCapturer<'a> {
    pub fn new(
        substrate: &'a dyn Substrate,
        http: &'a reqwest::Client,
        config: &'a ScrapeConfig,
        asset_dir: PathBuf,
    ) -> Self {
        Self {
            substrate,
            http,
            config,
            asset_dir,
        }
    }

    /// Capture a volume cover under the fixed asset id `cover`.
    pub async fn capture_cover(&self, node: &NodeHandle) -> Result<AssetRef, CaptureError> {
        self.capture_as(node, Some("cover")).await
    }

    async fn capture_as(
        &self,
        node: &NodeHandle,
        fixed_id: Option<&str>,
    ) -> Result<AssetRef, CaptureError> {
        let source = resolve_source(self.substrate, node)
            .await
            .ok_or(CaptureError::NoSource)?;
        let asset_id = match fixed_id {
            Some(id) => id.to_owned(),
            None => asset_id_for(&source),
        };

        if let Some(existing) = existing_asset(&self.asset_dir, &asset_id) {
            tracing::debug!(%asset_id, path = %existing.display(), "asset already captured; skipping");
            return Ok(AssetRef {
                asset_id,
                source_url: source.to_string(),
                captured: true,
            });
        }

        if let Err(err) = self.substrate.scroll_into_view(node).await {
            tracing::debug!(%source, "scroll into view failed: {err}");
        }
        self.wait_for_readiness(node, &source).await;
        self.wait_for_stable_box(node, &source).await;

        let out_path = self
            .asset_dir
            .join(format!("{asset_id}.{}", extension_for(&source)));

        let mut captured = false;
        for strategy in STRATEGIES {
            match self.attempt(strategy, node, &source, &out_path).await {
                Ok(()) => {
                    tracing::debug!(strategy = strategy.name(), %asset_id, "asset captured");
                    captured = true;
                    break;
                }
                Err(err) => {
                    tracing::warn!(strategy = strategy.name(), %source, "capture strategy failed: {err:#}");
                }
            }
        }
        if !captured {
            tracing::warn!(%source, %asset_id, "all capture strategies failed; emitting dangling reference");
        }

        Ok(AssetRef {
            asset_id,
            source_url: source.to_string(),
            captured,
        })
    }

    /// Lazy-load readiness: a loaded marker class, a resolvable source, or a
    /// positive intrinsic size. Timing out is not fatal; capture proceeds
    /// best-effort since some assets render without ever satisfying this.
    async fn wait_for_readiness(&self, node: &NodeHandle, source: &Url) {
        let substrate = self.substrate;
        let probe_node = node.clone();
        let ready = poll_until(
            self.config.poll_interval,
            self.config.readiness_timeout,
            move || {
                let node = probe_node.clone();
                async move {
                    if let Ok(Some(class)) = substrate.attribute(&node, "class").await {
                        let loaded = class.split_whitespace().any(|marker| {
                            LOADED_CLASS_MARKERS
                                .iter()
                                .any(|known| marker.eq_ignore_ascii_case(known))
                        });
                        if loaded {
                            return true;
                        }
                    }
                    if let Ok(Some(src)) = substrate.attribute(&node, "src").await
                        && !src.trim().is_empty()
                    {
                        return true;
                    }
                    matches!(substrate.natural_size(&node).await, Ok(Some((w, h))) if w > 0 && h > 0)
                }
            },
        )
        .await;
        if !ready {
            tracing::warn!(%source, "image readiness wait timed out; capturing best-effort");
        }
    }

    /// Geometry stability: consecutive bounding-box samples must agree within
    /// tolerance, guarding against capture mid-layout-shift. The last sample
    /// is used when the wait times out.
    async fn wait_for_stable_box(&self, node: &NodeHandle, source: &Url) -> Option<Rect> {
        let substrate = self.substrate;
        let probe_node = node.clone();
        let tolerance = self.config.stability_tolerance;
        let settled = poll_settled(
            self.config.poll_interval,
            self.config.stability_timeout,
            self.config.stability_samples,
            move || {
                let node = probe_node.clone();
                async move { substrate.bounding_box(&node).await.ok().flatten() }
            },
            |a: &Rect, b: &Rect| a.approx_eq(b, tolerance),
        )
        .await;
        if !settled.stable && settled.last.is_some() {
            tracing::debug!(%source, "bounding box never settled; using last sample");
        }
        settled.last
    }

    async fn attempt(
        &self,
        strategy: Strategy,
        node: &NodeHandle,
        source: &Url,
        out_path: &Path,
    ) -> anyhow::Result<()> {
        let run = async {
            match strategy {
                Strategy::Snapshot => self.snapshot_element(node, out_path).await,
                Strategy::PageFetch => self.fetch_in_page(source, out_path).await,
                Strategy::DirectFetch => self.fetch_direct(source, out_path).await,
            }
        };
        match tokio::time::timeout(self.config.capture_timeout, run).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("timed out after {:?}", self.config.capture_timeout),
        }
    }

    /// Direct visual snapshot of the element. Works even for cross-origin
    /// images where a byte-level fetch would be blocked.
    async fn snapshot_element(&self, node: &NodeHandle, out_path: &Path) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.asset_dir)
            .with_context(|| format!("create asset dir: {}", self.asset_dir.display()))?;
        let tmp = tempfile::NamedTempFile::new_in(&self.asset_dir)
            .context("create snapshot temp file")?;
        self.substrate
            .snapshot(node, tmp.path())
            .await
            .map_err(|err: SubstrateError| anyhow::anyhow!(err))?;
        let len = tmp.as_file().metadata().context("stat snapshot")?.len();
        anyhow::ensure!(len > 0, "snapshot produced an empty file");
        tmp.persist(out_path)
            .map_err(|err| anyhow::anyhow!("persist snapshot: {}", err.error))?;
        Ok(())
    }

    /// In-context byte fetch with credentials, returned base64-encoded and
    /// decoded back to binary.
    async fn fetch_in_page(&self, source: &Url, out_path: &Path) -> anyhow::Result<()> {
        let url_literal =
            serde_json::to_string(source.as_str()).context("encode source url for script")?;
        let script = format!(
            "(async () => {{\
             const response = await fetch({url_literal}, {{ credentials: 'include' }});\
             if (!response.ok) throw new Error('status ' + response.status);\
             const bytes = new Uint8Array(await response.arrayBuffer());\
             let binary = '';\
             for (const b of bytes) binary += String.fromCharCode(b);\
             return btoa(binary);\
             }})()"
        );
        let value = self
            .substrate
            .evaluate(&script)
            .await
            .map_err(|err: SubstrateError| anyhow::anyhow!(err))?;
        let encoded = value
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("in-page fetch returned a non-string result"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .context("decode in-page fetch payload")?;
        anyhow::ensure!(!bytes.is_empty(), "in-page fetch returned no bytes");
        crate::store::write_atomic(out_path, &bytes)
    }

    /// Out-of-context authenticated request against the resolved URL. Last
    /// resort; the origin may block it as hot-linking.
    async fn fetch_direct(&self, source: &Url, out_path: &Path) -> anyhow::Result<()> {
        let mut request = self.http.get(source.clone());
        if let Ok(page_url) = self.substrate.current_url().await {
            request = request.header(reqwest::header::REFERER, page_url.as_str().to_owned());
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("GET {source}"))?
            .error_for_status()
            .with_context(|| format!("GET {source}"))?;
        let bytes = response.bytes().await.context("read image body")?;
        anyhow::ensure!(!bytes.is_empty(), "image response was empty");
        crate::store::write_atomic(out_path, &bytes)
    }
}

#[async_trait]
impl CaptureImage for AssetCapturer<'_> {
    async fn capture(&self, node: &NodeHandle) -> Result<AssetRef, CaptureError> {
        self.capture_as(node, None).await
    }
}

/// First non-empty lazy-source attribute, resolved against the page URL.
pub async fn resolve_source(substrate: &dyn Substrate, node: &NodeHandle) -> Option<Url> {
    let base = substrate.current_url().await.ok();
    for attr in SOURCE_ATTRS {
        let Ok(Some(value)) = substrate.attribute(node, attr).await else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let resolved = match &base {
            Some(base) => base.join(value).ok(),
            None => Url::parse(value).ok(),
        };
        if let Some(url) = resolved {
            return Some(url);
        }
    }
    None
}

/// Deterministic asset id: the digit runs of the URL's last path segment,
/// concatenated. Sources without digits fall back to a timestamp, which is
/// acceptable because such sources are not expected to be re-encountered.
pub fn asset_id_for(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .unwrap_or_default();
    let digits: String = segment.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        chrono::Utc::now().timestamp_millis().to_string()
    } else {
        digits
    }
}

fn extension_for(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .unwrap_or_default();
    match segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=4).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "png".to_owned(),
    }
}

/// An asset file for `asset_id` already on disk, regardless of extension.
fn existing_asset(dir: &Path, asset_id: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file()
            && path.file_stem().and_then(|stem| stem.to_str()) == Some(asset_id)
        {
            return Some(path);
        }
    }
    None
}
