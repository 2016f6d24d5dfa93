use url::Url;

use crate::classify::{self, CaptureImage};
use crate::config::ScrapeConfig;
use crate::poll::poll_until;
use crate::substrate::{NodeHandle, Substrate};
use crate::token::ContentToken;

/// States of one chapter's multi-page walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Loading,
    Extracting,
    CheckingNext,
    Done,
}

/// Result of walking one chapter across its pages.
#[derive(Debug, Default)]
pub struct ChapterWalk {
    /// Tokens flattened across pages, in traversal order.
    pub tokens: Vec<ContentToken>,
    /// Number of extraction passes (one per visited page).
    pub pages: usize,
    /// URL behind a trailing "next chapter" control, recorded but never
    /// followed; the controller already enumerates every chapter.
    pub next_chapter: Option<Url>,
    /// False when the walk ended on a navigation failure and the token list
    /// is (possibly) partial. Such chapters are still persisted.
    pub complete: bool,
}

/// Walk one chapter: load its first page, extract tokens, and keep following
/// the "next page" control until a termination sentinel or a failure.
///
/// Termination holds because every iteration either fails into `Done` or
/// requires the footer's last link to still carry the next-page label; a page
/// without that label ends the walk.
pub async fn walk_chapter(
    substrate: &dyn Substrate,
    config: &ScrapeConfig,
    first_page: &Url,
    capture: &dyn CaptureImage,
) -> ChapterWalk {
    let mut walk = ChapterWalk::default();
    let mut state = WalkState::Loading;

    while state != WalkState::Done {
        state = match state {
            WalkState::Loading => match substrate.goto(first_page, config.nav_timeout).await {
                Ok(()) => WalkState::Extracting,
                Err(err) => {
                    tracing::warn!(url = %first_page, "chapter page failed to load: {err}");
                    WalkState::Done
                }
            },
            WalkState::Extracting => {
                extract_current_page(substrate, config, capture, &mut walk).await;
                walk.pages += 1;
                WalkState::CheckingNext
            }
            WalkState::CheckingNext => check_next(substrate, config, &mut walk).await,
            WalkState::Done => WalkState::Done,
        };
    }

    walk
}

async fn extract_current_page(
    substrate: &dyn Substrate,
    config: &ScrapeConfig,
    capture: &dyn CaptureImage,
    walk: &mut ChapterWalk,
) {
    let container = match content_container(substrate, config).await {
        Some(container) => container,
        None => {
            tracing::warn!(
                selector = %config.selectors.content,
                "content container not found; page contributes no tokens"
            );
            return;
        }
    };
    match classify::extract_tokens(substrate, &container, capture).await {
        Ok(mut tokens) => walk.tokens.append(&mut tokens),
        Err(err) => tracing::warn!("token extraction degraded: {err}"),
    }
}

async fn content_container(
    substrate: &dyn Substrate,
    config: &ScrapeConfig,
) -> Option<NodeHandle> {
    match substrate.query_all(None, &config.selectors.content).await {
        Ok(handles) => handles.into_iter().next(),
        Err(err) => {
            tracing::warn!("content container query failed: {err}");
            None
        }
    }
}

/// Inspect the footer's last link and dispatch on its sentinel text.
async fn check_next(
    substrate: &dyn Substrate,
    config: &ScrapeConfig,
    walk: &mut ChapterWalk,
) -> WalkState {
    let links = match substrate
        .query_all(None, &config.selectors.footer_links)
        .await
    {
        Ok(links) => links,
        Err(err) => {
            tracing::warn!("footer links query failed: {err}");
            walk.complete = true;
            return WalkState::Done;
        }
    };
    let Some(last) = links.last() else {
        walk.complete = true;
        return WalkState::Done;
    };

    let text = substrate.text_content(last).await.unwrap_or_default();
    let text = text.trim();

    if text == config.next_page_sentinel {
        match follow_next_page(substrate, config, last).await {
            Ok(()) => WalkState::Extracting,
            Err(err) => {
                tracing::warn!("failed to follow next-page link: {err:#}");
                WalkState::Done
            }
        }
    } else if text == config.next_chapter_sentinel {
        walk.next_chapter = resolve_link(substrate, last).await;
        tracing::debug!(next_chapter = ?walk.next_chapter.as_ref().map(Url::as_str), "next chapter recorded, not followed");
        walk.complete = true;
        WalkState::Done
    } else {
        walk.complete = true;
        WalkState::Done
    }
}

async fn resolve_link(substrate: &dyn Substrate, link: &NodeHandle) -> Option<Url> {
    let href = substrate.attribute(link, "href").await.ok().flatten()?;
    let base = substrate.current_url().await.ok()?;
    base.join(&href).ok()
}

/// Follow the next-page control, then wait for either a navigation or a
/// change in the content container's markup, whichever resolves first,
/// bounded by the navigation timeout.
async fn follow_next_page(
    substrate: &dyn Substrate,
    config: &ScrapeConfig,
    link: &NodeHandle,
) -> anyhow::Result<()> {
    let before_url = substrate
        .current_url()
        .await
        .map_err(|err| anyhow::anyhow!("read page url: {err}"))?;
    let before_markup = match content_container(substrate, config).await {
        Some(container) => substrate.outer_markup(&container).await.unwrap_or_default(),
        None => String::new(),
    };

    tokio::time::sleep(config.request_delay).await;
    substrate
        .click(link)
        .await
        .map_err(|err| anyhow::anyhow!("activate next-page link: {err}"))?;

    let content_selector = config.selectors.content.clone();
    let advanced = poll_until(config.poll_interval, config.nav_timeout, move || {
        let before_url = before_url.clone();
        let before_markup = before_markup.clone();
        let content_selector = content_selector.clone();
        async move {
            if let Ok(now) = substrate.current_url().await
                && now != before_url
            {
                return true;
            }
            let Ok(handles) = substrate.query_all(None, &content_selector).await else {
                return false;
            };
            let Some(container) = handles.into_iter().next() else {
                return false;
            };
            match substrate.outer_markup(&container).await {
                Ok(markup) => markup != before_markup,
                Err(_) => false,
            }
        }
    })
    .await;

    anyhow::ensure!(advanced, "page did not advance after following next-page link");
    Ok(())
}
