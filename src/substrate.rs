use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::SubstrateError;

pub mod http;

/// Opaque reference to a node in the currently loaded page.
///
/// Handles carry the generation of the page they were obtained from and go
/// stale on navigation; using a stale handle yields `SubstrateError::StaleNode`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub generation: u64,
    pub index: usize,
}

/// Closed classification of a container's child nodes.
///
/// The substrate maps markup onto these kinds; the classifier matches them
/// exhaustively. Anything it cannot name is `Other` and degrades to plain
/// text rather than failing extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Text,
    LineBreak,
    Image,
    Caption,
    Other,
}

/// One immediate child of a container, pre-classified by the substrate.
#[derive(Debug, Clone)]
pub struct ChildNode {
    pub handle: NodeHandle,
    pub kind: NodeKind,
    /// Text payload: the node's own text for `Text`, the full descendant text
    /// for `Caption` and `Other`, empty otherwise.
    pub text: String,
    pub visible: bool,
}

/// Element bounding box in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn approx_eq(&self, other: &Rect, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.width - other.width).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }
}

/// The rendering/navigation capability the pipeline runs against.
///
/// Implementations own page state and interior mutability; the pipeline only
/// ever holds a shared reference. Fixed-duration waits are the caller's job
/// (`tokio::time::sleep`), bounded condition waits go through [`crate::poll`].
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Load `url`, replacing the current page. All outstanding node handles
    /// become stale.
    async fn goto(&self, url: &Url, timeout: Duration) -> Result<(), SubstrateError>;

    async fn current_url(&self) -> Result<Url, SubstrateError>;

    /// Match `selector` against the document, or against the subtree of
    /// `scope` when given, in document order.
    async fn query_all(
        &self,
        scope: Option<&NodeHandle>,
        selector: &str,
    ) -> Result<Vec<NodeHandle>, SubstrateError>;

    async fn attribute(
        &self,
        node: &NodeHandle,
        name: &str,
    ) -> Result<Option<String>, SubstrateError>;

    async fn text_content(&self, node: &NodeHandle) -> Result<String, SubstrateError>;

    async fn is_visible(&self, node: &NodeHandle) -> Result<bool, SubstrateError>;

    /// The node's immediate children, classified into [`NodeKind`]s.
    async fn child_nodes(&self, node: &NodeHandle) -> Result<Vec<ChildNode>, SubstrateError>;

    /// Serialized markup of the node, used to detect in-place page changes.
    async fn outer_markup(&self, node: &NodeHandle) -> Result<String, SubstrateError>;

    /// Activate a control; for links this navigates, staling all handles.
    async fn click(&self, node: &NodeHandle) -> Result<(), SubstrateError>;

    async fn scroll_into_view(&self, node: &NodeHandle) -> Result<(), SubstrateError>;

    async fn bounding_box(&self, node: &NodeHandle) -> Result<Option<Rect>, SubstrateError>;

    /// Intrinsic pixel size of an image node, when known.
    async fn natural_size(&self, node: &NodeHandle)
    -> Result<Option<(u32, u32)>, SubstrateError>;

    /// Run a script in page context and return its JSON-converted result.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SubstrateError>;

    /// Produce a visual snapshot of the node at `out_path`.
    async fn snapshot(&self, node: &NodeHandle, out_path: &Path) -> Result<(), SubstrateError>;
}
