use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Failures at the rendering-substrate boundary.
///
/// Everything below the catalog level is contained by the caller: chapter and
/// page navigation failures degrade to partial records, capture failures to
/// dangling image references. Only a failure to open the catalog page itself
/// aborts a run.
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: Url, reason: String },

    #[error("no page has been loaded")]
    NoPage,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("node handle is stale; the page has navigated since it was obtained")]
    StaleNode,

    #[error("invalid selector: {0}")]
    SelectorParse(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("element capture failed: {0}")]
    Capture(String),

    #[error("{0} is not supported by this substrate")]
    Unsupported(&'static str),
}

/// Failures of the asset capture synchronizer.
///
/// A source-less image is the only error condition; an image whose capture
/// strategies all fail still yields a reference, just without bytes on disk.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("image has no resolvable source")]
    NoSource,
}
