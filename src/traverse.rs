use std::path::{Path, PathBuf};

use anyhow::Context as _;
use url::Url;

use crate::capture::AssetCapturer;
use crate::cli::ScrapeArgs;
use crate::config::ScrapeConfig;
use crate::formats::ChapterRecord;
use crate::paginate;
use crate::store;
use crate::substrate::{NodeHandle, Substrate};
use crate::substrate::http::HttpSubstrate;

/// Counts reported at the end of a run. Skipped chapters are resume hits;
/// degraded chapters were persisted with a partial (possibly empty) token
/// list after a navigation failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub volumes: usize,
    pub chapters_written: usize,
    pub chapters_skipped: usize,
    pub chapters_degraded: usize,
    pub covers_captured: usize,
}

struct ChapterPlan {
    title: String,
    dir_name: String,
    href: Option<Url>,
}

struct VolumePlan {
    dir: PathBuf,
    chapters: Vec<ChapterPlan>,
}

pub async fn run(args: ScrapeArgs) -> anyhow::Result<RunSummary> {
    let catalog_url = Url::parse(&args.url).context("parse --url")?;
    if catalog_url.scheme() != "http" && catalog_url.scheme() != "https" {
        anyhow::bail!("--url must be http/https: {catalog_url}");
    }

    let config = args.to_config();
    let out_dir = PathBuf::from(&args.out);

    let http = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("build http client")?;
    let substrate = HttpSubstrate::new(http.clone(), config.nav_timeout);

    let summary = traverse(&substrate, &http, &config, &catalog_url, &out_dir).await?;
    tracing::info!(
        volumes = summary.volumes,
        written = summary.chapters_written,
        skipped = summary.chapters_skipped,
        degraded = summary.chapters_degraded,
        covers = summary.covers_captured,
        "scrape finished"
    );
    Ok(summary)
}

/// Walk catalog → volumes → chapters and persist one record per chapter.
///
/// Only a failure to open the catalog page itself is fatal. The catalog is
/// scanned into a plain plan (and covers captured) before any chapter
/// navigation, because following a link stales every catalog node handle.
pub async fn traverse(
    substrate: &dyn Substrate,
    http: &reqwest::Client,
    config: &ScrapeConfig,
    catalog_url: &Url,
    out_dir: &Path,
) -> anyhow::Result<RunSummary> {
    let mut summary = RunSummary::default();

    substrate
        .goto(catalog_url, config.nav_timeout)
        .await
        .map_err(|err| anyhow::anyhow!("catalog page unreachable: {catalog_url}: {err}"))?;

    let root = store::catalog_root(out_dir, &source_id_for(catalog_url));
    std::fs::create_dir_all(&root)
        .with_context(|| format!("create output root: {}", root.display()))?;

    let plan = scan_catalog(substrate, http, config, catalog_url, &root, &mut summary).await;
    summary.volumes = plan.len();

    for volume in &plan {
        for (index, chapter) in volume.chapters.iter().enumerate() {
            let chapter_dir = store::chapter_dir(&volume.dir, &chapter.dir_name);
            if store::chapter_record_exists(&chapter_dir) {
                tracing::info!(chapter = %chapter.title, "record exists; skipping");
                summary.chapters_skipped += 1;
                continue;
            }

            let record = match &chapter.href {
                None => {
                    tracing::warn!(chapter = %chapter.title, "chapter has no link; writing empty record");
                    ChapterRecord::from_tokens(&chapter.title, &[])
                }
                Some(url) => {
                    tokio::time::sleep(config.request_delay).await;
                    let capturer = AssetCapturer::new(
                        substrate,
                        http,
                        config,
                        store::pictures_dir(&chapter_dir),
                    );
                    let walk = paginate::walk_chapter(substrate, config, url, &capturer).await;
                    if !walk.complete {
                        summary.chapters_degraded += 1;
                    }
                    tracing::info!(
                        chapter = %chapter.title,
                        pages = walk.pages,
                        tokens = walk.tokens.len(),
                        complete = walk.complete,
                        "chapter walked"
                    );
                    ChapterRecord::from_tokens(&chapter.title, &walk.tokens)
                }
            };

            match store::write_chapter_record(&chapter_dir, &record) {
                Ok(path) => {
                    summary.chapters_written += 1;
                    tracing::debug!(path = %path.display(), "chapter record written");
                }
                Err(err) => {
                    // Contained: one lost record must not roll back the rest.
                    tracing::warn!(chapter = %chapter.title, index, "failed to persist chapter record: {err:#}");
                }
            }
        }
    }

    Ok(summary)
}

/// Enumerate volumes and chapters in document order while still on the
/// catalog page, capturing each volume's cover on the way.
async fn scan_catalog(
    substrate: &dyn Substrate,
    http: &reqwest::Client,
    config: &ScrapeConfig,
    catalog_url: &Url,
    root: &Path,
    summary: &mut RunSummary,
) -> Vec<VolumePlan> {
    let base = substrate
        .current_url()
        .await
        .unwrap_or_else(|_| catalog_url.clone());

    let volume_nodes = match substrate.query_all(None, &config.selectors.volume).await {
        Ok(nodes) => nodes,
        Err(err) => {
            tracing::warn!(selector = %config.selectors.volume, "volume query failed: {err}");
            Vec::new()
        }
    };
    if volume_nodes.is_empty() {
        tracing::warn!(selector = %config.selectors.volume, "catalog page has no volumes");
    }

    let mut plan = Vec::new();
    for volume_node in &volume_nodes {
        let heading = volume_heading(substrate, config, volume_node).await;
        let dir_name = heading
            .as_deref()
            .and_then(store::fs_name)
            .unwrap_or_else(|| config.untitled_volume.clone());
        let volume_dir = store::volume_dir(root, &dir_name);
        if let Err(err) = std::fs::create_dir_all(&volume_dir) {
            tracing::warn!(volume = %dir_name, "failed to create volume dir: {err}; skipping volume");
            continue;
        }

        capture_cover(substrate, http, config, volume_node, &volume_dir, summary).await;

        let chapters = scan_chapters(substrate, config, volume_node, &base).await;
        tracing::info!(volume = %dir_name, chapters = chapters.len(), "volume scanned");
        plan.push(VolumePlan {
            dir: volume_dir,
            chapters,
        });
    }
    plan
}

async fn volume_heading(
    substrate: &dyn Substrate,
    config: &ScrapeConfig,
    volume_node: &NodeHandle,
) -> Option<String> {
    let headings = substrate
        .query_all(Some(volume_node), &config.selectors.volume_title)
        .await
        .ok()?;
    let first = headings.first()?;
    let text = substrate.text_content(first).await.ok()?;
    let text = text.trim();
    if text.is_empty() { None } else { Some(text.to_owned()) }
}

async fn capture_cover(
    substrate: &dyn Substrate,
    http: &reqwest::Client,
    config: &ScrapeConfig,
    volume_node: &NodeHandle,
    volume_dir: &Path,
    summary: &mut RunSummary,
) {
    let images = match substrate.query_all(Some(volume_node), "img").await {
        Ok(images) => images,
        Err(err) => {
            tracing::warn!("cover query failed: {err}");
            return;
        }
    };
    let Some(cover) = images.first() else {
        tracing::debug!(volume = %volume_dir.display(), "volume has no cover image");
        return;
    };

    let capturer = AssetCapturer::new(substrate, http, config, volume_dir.to_path_buf());
    match capturer.capture_cover(cover).await {
        Ok(asset) if asset.captured => summary.covers_captured += 1,
        Ok(_) => tracing::warn!(volume = %volume_dir.display(), "cover capture failed on every strategy"),
        Err(err) => tracing::warn!(volume = %volume_dir.display(), "cover skipped: {err}"),
    }
}

async fn scan_chapters(
    substrate: &dyn Substrate,
    config: &ScrapeConfig,
    volume_node: &NodeHandle,
    base: &Url,
) -> Vec<ChapterPlan> {
    let links = match substrate
        .query_all(Some(volume_node), &config.selectors.chapter_link)
        .await
    {
        Ok(links) => links,
        Err(err) => {
            tracing::warn!(selector = %config.selectors.chapter_link, "chapter query failed: {err}");
            Vec::new()
        }
    };

    let mut chapters = Vec::new();
    for (index, link) in links.iter().enumerate() {
        let title = substrate
            .text_content(link)
            .await
            .map(|text| text.trim().to_owned())
            .unwrap_or_default();
        let title = if title.is_empty() {
            format!("chapter-{}", index + 1)
        } else {
            title
        };
        let dir_name = store::fs_name(&title).unwrap_or_else(|| format!("chapter-{}", index + 1));

        let href = match substrate.attribute(link, "href").await {
            Ok(Some(href)) => base.join(href.trim()).ok(),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(chapter = %title, "chapter href read failed: {err}");
                None
            }
        };

        chapters.push(ChapterPlan {
            title,
            dir_name,
            href,
        });
    }
    chapters
}

/// Catalog identity derived from its origin URL: the digit runs of the path,
/// then the host, then a fixed fallback.
fn source_id_for(url: &Url) -> String {
    let digits: String = url.path().chars().filter(char::is_ascii_digit).collect();
    if !digits.is_empty() {
        return digits;
    }
    url.host_str()
        .and_then(store::fs_name)
        .unwrap_or_else(|| "catalog".to_owned())
}
