use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{ScrapeConfig, Selectors};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Scrape(ScrapeArgs),
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Catalog URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Output directory for chapter records and captured assets.
    #[arg(long)]
    pub out: String,

    /// Delay before each chapter traversal (politeness).
    #[arg(long, default_value_t = 500)]
    pub delay_ms: u64,

    /// Timeout for one page navigation.
    #[arg(long, default_value_t = 20)]
    pub nav_timeout_secs: u64,

    /// Interval between readiness/stability probes.
    #[arg(long, default_value_t = 150)]
    pub poll_interval_ms: u64,

    /// User agent for page loads and asset requests.
    #[arg(long, default_value = "bookhaul/0.1")]
    pub user_agent: String,

    /// Exact label on the control that advances to the next page.
    #[arg(long, default_value = "Next Page")]
    pub next_page_text: String,

    /// Exact label on the control that points at the following chapter.
    #[arg(long, default_value = "Next Chapter")]
    pub next_chapter_text: String,

    /// Selector for one volume container on the catalog page.
    #[arg(long, default_value = ".volume")]
    pub volume_selector: String,

    /// Selector for the volume heading, scoped to the volume container.
    #[arg(long, default_value = "h2")]
    pub volume_title_selector: String,

    /// Selector for chapter links, scoped to the volume container.
    #[arg(long, default_value = "ul.chapters a")]
    pub chapter_selector: String,

    /// Selector for the chapter content container.
    #[arg(long, default_value = "#content")]
    pub content_selector: String,

    /// Selector for the footer pagination links.
    #[arg(long, default_value = ".footer-link a")]
    pub footer_selector: String,
}

impl ScrapeArgs {
    pub fn to_config(&self) -> ScrapeConfig {
        ScrapeConfig {
            user_agent: self.user_agent.clone(),
            nav_timeout: Duration::from_secs(self.nav_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            request_delay: Duration::from_millis(self.delay_ms),
            next_page_sentinel: self.next_page_text.clone(),
            next_chapter_sentinel: self.next_chapter_text.clone(),
            selectors: Selectors {
                volume: self.volume_selector.clone(),
                volume_title: self.volume_title_selector.clone(),
                chapter_link: self.chapter_selector.clone(),
                content: self.content_selector.clone(),
                footer_links: self.footer_selector.clone(),
            },
            ..ScrapeConfig::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Directory tree (or single record file) to check.
    #[arg(long)]
    pub dir: String,
}
