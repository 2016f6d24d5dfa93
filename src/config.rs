use std::time::Duration;

/// Selector set for the catalog layout.
///
/// Site-specific selector negotiation is out of scope; these are plain CSS
/// selectors supplied once at startup. Volume-scoped selectors are evaluated
/// relative to one volume container.
#[derive(Debug, Clone)]
pub struct Selectors {
    /// One volume container on the catalog page.
    pub volume: String,
    /// The volume heading, inside a volume container.
    pub volume_title: String,
    /// Chapter links, inside a volume container.
    pub chapter_link: String,
    /// The chapter content container on a chapter page.
    pub content: String,
    /// The footer pagination links on a chapter page.
    pub footer_links: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            volume: ".volume".to_owned(),
            volume_title: "h2".to_owned(),
            chapter_link: "ul.chapters a".to_owned(),
            content: "#content".to_owned(),
            footer_links: ".footer-link a".to_owned(),
        }
    }
}

/// Every knob of a scrape run, threaded explicitly into the traversal at
/// construction. There is no ambient configuration state.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub user_agent: String,

    /// Timeout for one page navigation.
    pub nav_timeout: Duration,
    /// Interval between probes of the readiness, stability and
    /// follow-the-next-link polls.
    pub poll_interval: Duration,
    /// Upper bound on the lazy-load readiness wait per image.
    pub readiness_timeout: Duration,
    /// Upper bound on the bounding-box stability wait per image.
    pub stability_timeout: Duration,
    /// Consecutive agreeing bounding-box samples required for stability.
    pub stability_samples: u32,
    /// Position/size tolerance (px) within which two samples agree.
    pub stability_tolerance: f64,
    /// Upper bound on one capture strategy attempt.
    pub capture_timeout: Duration,
    /// Politeness delay before each chapter traversal.
    pub request_delay: Duration,

    /// Exact label on the control that advances to the next page.
    pub next_page_sentinel: String,
    /// Exact label on the control that points at the following chapter.
    pub next_chapter_sentinel: String,

    /// Identity used for volumes whose heading is empty or whitespace.
    pub untitled_volume: String,

    pub selectors: Selectors,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            user_agent: "bookhaul/0.1".to_owned(),
            nav_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(150),
            readiness_timeout: Duration::from_secs(6),
            stability_timeout: Duration::from_secs(3),
            stability_samples: 3,
            stability_tolerance: 1.0,
            capture_timeout: Duration::from_secs(15),
            request_delay: Duration::from_millis(500),
            next_page_sentinel: "Next Page".to_owned(),
            next_chapter_sentinel: "Next Chapter".to_owned(),
            untitled_volume: "untitled".to_owned(),
            selectors: Selectors::default(),
        }
    }
}
