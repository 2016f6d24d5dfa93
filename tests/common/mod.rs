#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use url::Url;

use bookhaul::classify::{AssetRef, CaptureImage};
use bookhaul::config::ScrapeConfig;
use bookhaul::error::{CaptureError, SubstrateError};
use bookhaul::substrate::{ChildNode, NodeHandle, NodeKind, Rect, Substrate};

/// Minimal valid PNG, enough for byte-level assertions.
pub static PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1,
    128, 110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

/// Scrape configuration with intervals short enough for tests.
pub fn test_config() -> ScrapeConfig {
    ScrapeConfig {
        nav_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(5),
        readiness_timeout: Duration::from_millis(50),
        stability_timeout: Duration::from_millis(50),
        capture_timeout: Duration::from_secs(2),
        request_delay: Duration::ZERO,
        ..ScrapeConfig::default()
    }
}

#[derive(Debug, Clone)]
pub struct FakeNode {
    pub kind: NodeKind,
    pub text: String,
    pub attrs: HashMap<String, String>,
    pub visible: bool,
}

impl FakeNode {
    fn new(kind: NodeKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_owned(),
            attrs: HashMap::new(),
            visible: true,
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(NodeKind::Text, text)
    }

    pub fn line_break() -> Self {
        Self::new(NodeKind::LineBreak, "")
    }

    pub fn image(src: &str) -> Self {
        Self::new(NodeKind::Image, "").with_attr("src", src)
    }

    pub fn caption(text: &str) -> Self {
        Self::new(NodeKind::Caption, text)
    }

    pub fn other(text: &str) -> Self {
        Self::new(NodeKind::Other, text)
    }

    /// A link-ish node: `text_content` yields the label, `href` the target.
    pub fn link(label: &str, href: Option<&str>) -> Self {
        let node = Self::new(NodeKind::Other, label);
        match href {
            Some(href) => node.with_attr("href", href),
            None => node,
        }
    }

    pub fn container() -> Self {
        Self::new(NodeKind::Other, "")
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_owned(), value.to_owned());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[derive(Debug, Default)]
pub struct FakePage {
    pub nodes: Vec<FakeNode>,
    /// Document-level selector → node indexes.
    pub selector_hits: HashMap<String, Vec<usize>>,
    /// (scope node index, selector) → node indexes.
    pub scoped_hits: HashMap<(usize, String), Vec<usize>>,
    /// Node index → immediate child indexes.
    pub children: HashMap<usize, Vec<usize>>,
}

impl FakePage {
    pub fn add(&mut self, node: FakeNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn hit(&mut self, selector: &str, indexes: Vec<usize>) {
        self.selector_hits.insert(selector.to_owned(), indexes);
    }

    pub fn scoped_hit(&mut self, scope: usize, selector: &str, indexes: Vec<usize>) {
        self.scoped_hits.insert((scope, selector.to_owned()), indexes);
    }
}

/// A chapter page in the shape the walker expects: one content container with
/// the given children, plus footer links.
pub fn chapter_page(
    config: &ScrapeConfig,
    children: Vec<FakeNode>,
    footer: Vec<FakeNode>,
) -> FakePage {
    let mut page = FakePage::default();
    let container = page.add(FakeNode::container());

    let mut child_indexes = Vec::new();
    for node in children {
        child_indexes.push(page.add(node));
    }
    page.children.insert(container, child_indexes);
    page.hit(&config.selectors.content, vec![container]);

    let mut footer_indexes = Vec::new();
    for node in footer {
        footer_indexes.push(page.add(node));
    }
    page.hit(&config.selectors.footer_links, footer_indexes);

    page
}

struct FakeState {
    pages: HashMap<Url, FakePage>,
    current: Option<Url>,
    generation: u64,
}

/// Scripted substrate: pages keyed by URL, switchable snapshot and in-page
/// fetch behavior, and attempt counters for asserting strategy order.
pub struct FakeSubstrate {
    state: Mutex<FakeState>,
    /// `Some(bytes)` makes `snapshot` write them; `None` makes it fail.
    pub snapshot_bytes: Mutex<Option<Vec<u8>>>,
    /// `Some(bytes)` makes `evaluate` return them base64-encoded; `None`
    /// makes it fail.
    pub page_fetch_bytes: Mutex<Option<Vec<u8>>>,
    pub snapshot_calls: AtomicUsize,
    pub page_fetch_calls: AtomicUsize,
}

impl FakeSubstrate {
    pub fn new(pages: Vec<(Url, FakePage)>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                pages: pages.into_iter().collect(),
                current: None,
                generation: 0,
            }),
            snapshot_bytes: Mutex::new(None),
            page_fetch_bytes: Mutex::new(None),
            snapshot_calls: AtomicUsize::new(0),
            page_fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_snapshot_bytes(&self, bytes: Option<&[u8]>) {
        *self.snapshot_bytes.lock().expect("snapshot lock") = bytes.map(<[u8]>::to_vec);
    }

    pub fn set_page_fetch_bytes(&self, bytes: Option<&[u8]>) {
        *self.page_fetch_bytes.lock().expect("page fetch lock") = bytes.map(<[u8]>::to_vec);
    }

    fn with_node<T>(
        &self,
        handle: &NodeHandle,
        f: impl FnOnce(&FakeNode) -> T,
    ) -> Result<T, SubstrateError> {
        let state = self.state.lock().expect("fake state lock");
        if handle.generation != state.generation {
            return Err(SubstrateError::StaleNode);
        }
        let current = state.current.as_ref().ok_or(SubstrateError::NoPage)?;
        let page = state.pages.get(current).ok_or(SubstrateError::NoPage)?;
        let node = page.nodes.get(handle.index).ok_or(SubstrateError::StaleNode)?;
        Ok(f(node))
    }
}

#[async_trait]
impl Substrate for FakeSubstrate {
    async fn goto(&self, url: &Url, _timeout: Duration) -> Result<(), SubstrateError> {
        let mut state = self.state.lock().expect("fake state lock");
        if !state.pages.contains_key(url) {
            return Err(SubstrateError::Navigation {
                url: url.clone(),
                reason: "no such page scripted".to_owned(),
            });
        }
        state.generation += 1;
        state.current = Some(url.clone());
        Ok(())
    }

    async fn current_url(&self) -> Result<Url, SubstrateError> {
        let state = self.state.lock().expect("fake state lock");
        state.current.clone().ok_or(SubstrateError::NoPage)
    }

    async fn query_all(
        &self,
        scope: Option<&NodeHandle>,
        selector: &str,
    ) -> Result<Vec<NodeHandle>, SubstrateError> {
        let state = self.state.lock().expect("fake state lock");
        let generation = state.generation;
        let current = state.current.as_ref().ok_or(SubstrateError::NoPage)?;
        let page = state.pages.get(current).ok_or(SubstrateError::NoPage)?;

        let indexes = match scope {
            None => page.selector_hits.get(selector),
            Some(scope_handle) => {
                if scope_handle.generation != generation {
                    return Err(SubstrateError::StaleNode);
                }
                page.scoped_hits
                    .get(&(scope_handle.index, selector.to_owned()))
            }
        };
        Ok(indexes
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|index| NodeHandle { generation, index })
            .collect())
    }

    async fn attribute(
        &self,
        node: &NodeHandle,
        name: &str,
    ) -> Result<Option<String>, SubstrateError> {
        self.with_node(node, |n| n.attrs.get(name).cloned())
    }

    async fn text_content(&self, node: &NodeHandle) -> Result<String, SubstrateError> {
        self.with_node(node, |n| n.text.clone())
    }

    async fn is_visible(&self, node: &NodeHandle) -> Result<bool, SubstrateError> {
        self.with_node(node, |n| n.visible)
    }

    async fn child_nodes(&self, node: &NodeHandle) -> Result<Vec<ChildNode>, SubstrateError> {
        let state = self.state.lock().expect("fake state lock");
        if node.generation != state.generation {
            return Err(SubstrateError::StaleNode);
        }
        let current = state.current.as_ref().ok_or(SubstrateError::NoPage)?;
        let page = state.pages.get(current).ok_or(SubstrateError::NoPage)?;

        let indexes = page.children.get(&node.index).cloned().unwrap_or_default();
        let mut children = Vec::new();
        for index in indexes {
            let fake = page.nodes.get(index).ok_or(SubstrateError::StaleNode)?;
            children.push(ChildNode {
                handle: NodeHandle {
                    generation: node.generation,
                    index,
                },
                kind: fake.kind,
                text: fake.text.clone(),
                visible: fake.visible,
            });
        }
        Ok(children)
    }

    async fn outer_markup(&self, node: &NodeHandle) -> Result<String, SubstrateError> {
        let url = self.current_url().await?;
        self.with_node(node, |_| format!("{url}#node{}", node.index))
    }

    async fn click(&self, node: &NodeHandle) -> Result<(), SubstrateError> {
        let href = self
            .with_node(node, |n| n.attrs.get("href").cloned())?
            .ok_or(SubstrateError::Unsupported("clicking a node without an href"))?;
        let base = self.current_url().await?;
        let target = base.join(&href).map_err(|err| SubstrateError::Navigation {
            url: base,
            reason: err.to_string(),
        })?;
        self.goto(&target, Duration::from_secs(1)).await
    }

    async fn scroll_into_view(&self, _node: &NodeHandle) -> Result<(), SubstrateError> {
        Ok(())
    }

    async fn bounding_box(&self, _node: &NodeHandle) -> Result<Option<Rect>, SubstrateError> {
        Ok(Some(Rect {
            x: 0.0,
            y: 120.0,
            width: 100.0,
            height: 150.0,
        }))
    }

    async fn natural_size(
        &self,
        node: &NodeHandle,
    ) -> Result<Option<(u32, u32)>, SubstrateError> {
        self.with_node(node, |n| {
            let width = n.attrs.get("width")?.parse().ok()?;
            let height = n.attrs.get("height")?.parse().ok()?;
            Some((width, height))
        })
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, SubstrateError> {
        self.page_fetch_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self.page_fetch_bytes.lock().expect("page fetch lock").clone();
        match bytes {
            Some(bytes) => Ok(serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(bytes),
            )),
            None => Err(SubstrateError::Script("in-page fetch disabled".to_owned())),
        }
    }

    async fn snapshot(&self, _node: &NodeHandle, out_path: &Path) -> Result<(), SubstrateError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self.snapshot_bytes.lock().expect("snapshot lock").clone();
        match bytes {
            Some(bytes) => std::fs::write(out_path, bytes)
                .map_err(|err| SubstrateError::Capture(err.to_string())),
            None => Err(SubstrateError::Capture("snapshot disabled".to_owned())),
        }
    }
}

/// Capture stub that derives ids like the real synchronizer but never touches
/// disk or network.
pub struct StubCapture;

#[async_trait]
impl CaptureImage for StubCapture {
    async fn capture(&self, _node: &NodeHandle) -> Result<AssetRef, CaptureError> {
        Ok(AssetRef {
            asset_id: "0".to_owned(),
            source_url: String::new(),
            captured: false,
        })
    }
}
