use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::error::SubstrateError;
use crate::substrate::{ChildNode, NodeHandle, NodeKind, Rect, Substrate};

/// Substrate adapter for static markup fetched over plain HTTP.
///
/// The loaded page is kept as a string and re-parsed on access; node handles
/// are document-order indexes into the parse, resolved per call. The parse
/// tree itself is never stored because it is not `Send`, and the re-parse is
/// deterministic for a fixed string, so indexes stay valid until the next
/// navigation bumps the generation.
///
/// `snapshot` and `evaluate` report unsupported here; asset capture falls
/// through its strategy chain to the direct authenticated request.
pub struct HttpSubstrate {
    client: reqwest::Client,
    nav_timeout: Duration,
    state: Mutex<PageState>,
}

#[derive(Default)]
struct PageState {
    generation: u64,
    url: Option<Url>,
    html: String,
}

impl HttpSubstrate {
    pub fn new(client: reqwest::Client, nav_timeout: Duration) -> Self {
        Self {
            client,
            nav_timeout,
            state: Mutex::new(PageState::default()),
        }
    }

    fn install_page(&self, url: Url, html: String) {
        let mut state = self.state.lock().expect("page state lock");
        state.generation += 1;
        state.url = Some(url);
        state.html = html;
    }

    fn current_page(&self) -> Result<(u64, Url, String), SubstrateError> {
        let state = self.state.lock().expect("page state lock");
        let url = state.url.clone().ok_or(SubstrateError::NoPage)?;
        Ok((state.generation, url, state.html.clone()))
    }

    /// Page snapshot for a handle, after checking it is not stale.
    fn page_for(&self, handle: &NodeHandle) -> Result<(Url, String), SubstrateError> {
        let (generation, url, html) = self.current_page()?;
        if handle.generation != generation {
            return Err(SubstrateError::StaleNode);
        }
        Ok((url, html))
    }

    /// Resolve the navigation target of a click without holding the parse
    /// tree across an await.
    fn link_target(&self, node: &NodeHandle) -> Result<Url, SubstrateError> {
        let (base, html) = self.page_for(node)?;
        let doc = Html::parse_document(&html);
        let Some(target) = nth(&doc, node.index) else {
            return Err(SubstrateError::StaleNode);
        };
        let Some(href) = target.value().as_element().and_then(|el| el.attr("href")) else {
            return Err(SubstrateError::Unsupported("clicking a node without an href"));
        };
        base.join(href).map_err(|err| SubstrateError::Navigation {
            url: base.clone(),
            reason: format!("unresolvable href `{href}`: {err}"),
        })
    }
}

fn nth<'a>(
    doc: &'a Html,
    index: usize,
) -> Option<ego_tree::NodeRef<'a, Node>> {
    doc.tree.root().descendants().nth(index)
}

fn parse_selector(selector: &str) -> Result<Selector, SubstrateError> {
    Selector::parse(selector)
        .map_err(|err| SubstrateError::SelectorParse(format!("{selector}: {err}")))
}

fn element_hidden(el: &scraper::node::Element) -> bool {
    if el.attr("hidden").is_some() {
        return true;
    }
    match el.attr("style") {
        Some(style) => {
            let style = style.replace(' ', "").to_ascii_lowercase();
            style.contains("display:none") || style.contains("visibility:hidden")
        }
        None => false,
    }
}

fn element_kind(el: &scraper::node::Element) -> NodeKind {
    match el.name() {
        "br" => NodeKind::LineBreak,
        "img" => NodeKind::Image,
        "center" => NodeKind::Caption,
        _ => {
            let centered = el
                .attr("style")
                .map(|style| {
                    style
                        .replace(' ', "")
                        .to_ascii_lowercase()
                        .contains("text-align:center")
                })
                .unwrap_or(false);
            if centered { NodeKind::Caption } else { NodeKind::Other }
        }
    }
}

#[async_trait]
impl Substrate for HttpSubstrate {
    async fn goto(&self, url: &Url, timeout: Duration) -> Result<(), SubstrateError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| SubstrateError::Navigation {
                url: url.clone(),
                reason: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubstrateError::Navigation {
                url: url.clone(),
                reason: format!("status {status}"),
            });
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|err| SubstrateError::Navigation {
                url: url.clone(),
                reason: format!("read body: {err}"),
            })?;

        self.install_page(final_url, html);
        Ok(())
    }

    async fn current_url(&self) -> Result<Url, SubstrateError> {
        let (_, url, _) = self.current_page()?;
        Ok(url)
    }

    async fn query_all(
        &self,
        scope: Option<&NodeHandle>,
        selector: &str,
    ) -> Result<Vec<NodeHandle>, SubstrateError> {
        let parsed = parse_selector(selector)?;
        let (generation, _, html) = self.current_page()?;
        let doc = Html::parse_document(&html);

        let matched: HashSet<_> = match scope {
            None => doc.select(&parsed).map(|el| el.id()).collect(),
            Some(scope_handle) => {
                if scope_handle.generation != generation {
                    return Err(SubstrateError::StaleNode);
                }
                let Some(scope_node) = nth(&doc, scope_handle.index) else {
                    return Err(SubstrateError::StaleNode);
                };
                let Some(scope_el) = ElementRef::wrap(scope_node) else {
                    return Ok(Vec::new());
                };
                scope_el.select(&parsed).map(|el| el.id()).collect()
            }
        };

        let mut handles = Vec::new();
        for (index, node) in doc.tree.root().descendants().enumerate() {
            if matched.contains(&node.id()) {
                handles.push(NodeHandle { generation, index });
            }
        }
        Ok(handles)
    }

    async fn attribute(
        &self,
        node: &NodeHandle,
        name: &str,
    ) -> Result<Option<String>, SubstrateError> {
        let (_, html) = self.page_for(node)?;
        let doc = Html::parse_document(&html);
        let Some(target) = nth(&doc, node.index) else {
            return Err(SubstrateError::StaleNode);
        };
        Ok(target
            .value()
            .as_element()
            .and_then(|el| el.attr(name))
            .map(str::to_owned))
    }

    async fn text_content(&self, node: &NodeHandle) -> Result<String, SubstrateError> {
        let (_, html) = self.page_for(node)?;
        let doc = Html::parse_document(&html);
        let Some(target) = nth(&doc, node.index) else {
            return Err(SubstrateError::StaleNode);
        };
        if let Some(text) = target.value().as_text() {
            return Ok(text.text.to_string());
        }
        Ok(ElementRef::wrap(target)
            .map(|el| el.text().collect())
            .unwrap_or_default())
    }

    async fn is_visible(&self, node: &NodeHandle) -> Result<bool, SubstrateError> {
        let (_, html) = self.page_for(node)?;
        let doc = Html::parse_document(&html);
        let Some(target) = nth(&doc, node.index) else {
            return Err(SubstrateError::StaleNode);
        };
        if let Some(el) = target.value().as_element()
            && element_hidden(el)
        {
            return Ok(false);
        }
        for ancestor in target.ancestors() {
            if let Some(el) = ancestor.value().as_element()
                && element_hidden(el)
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn child_nodes(&self, node: &NodeHandle) -> Result<Vec<ChildNode>, SubstrateError> {
        let (_, html) = self.page_for(node)?;
        let generation = node.generation;
        let doc = Html::parse_document(&html);
        let Some(target) = nth(&doc, node.index) else {
            return Err(SubstrateError::StaleNode);
        };

        let mut children = Vec::new();
        for (index, candidate) in doc.tree.root().descendants().enumerate() {
            if candidate.parent().map(|p| p.id()) != Some(target.id()) {
                continue;
            }
            let handle = NodeHandle { generation, index };
            match candidate.value() {
                Node::Text(text) => children.push(ChildNode {
                    handle,
                    kind: NodeKind::Text,
                    text: text.text.to_string(),
                    visible: true,
                }),
                Node::Element(el) => {
                    let kind = element_kind(el);
                    let text = match kind {
                        NodeKind::Caption | NodeKind::Other => ElementRef::wrap(candidate)
                            .map(|el| el.text().collect())
                            .unwrap_or_default(),
                        _ => String::new(),
                    };
                    children.push(ChildNode {
                        handle,
                        kind,
                        text,
                        visible: !element_hidden(el),
                    });
                }
                _ => {}
            }
        }
        Ok(children)
    }

    async fn outer_markup(&self, node: &NodeHandle) -> Result<String, SubstrateError> {
        let (_, html) = self.page_for(node)?;
        let doc = Html::parse_document(&html);
        let Some(target) = nth(&doc, node.index) else {
            return Err(SubstrateError::StaleNode);
        };
        if let Some(el) = ElementRef::wrap(target) {
            return Ok(el.html());
        }
        Ok(target
            .value()
            .as_text()
            .map(|text| text.text.to_string())
            .unwrap_or_default())
    }

    async fn click(&self, node: &NodeHandle) -> Result<(), SubstrateError> {
        let target = self.link_target(node)?;
        self.goto(&target, self.nav_timeout).await
    }

    async fn scroll_into_view(&self, _node: &NodeHandle) -> Result<(), SubstrateError> {
        // Static markup has no viewport.
        Ok(())
    }

    async fn bounding_box(&self, node: &NodeHandle) -> Result<Option<Rect>, SubstrateError> {
        // Static markup never reflows; report a constant box so stability
        // waits settle on their first samples.
        let size = self.natural_size(node).await?.unwrap_or((0, 0));
        Ok(Some(Rect {
            x: 0.0,
            y: 0.0,
            width: f64::from(size.0),
            height: f64::from(size.1),
        }))
    }

    async fn natural_size(
        &self,
        node: &NodeHandle,
    ) -> Result<Option<(u32, u32)>, SubstrateError> {
        let width = self.attribute(node, "width").await?;
        let height = self.attribute(node, "height").await?;
        let (Some(width), Some(height)) = (width, height) else {
            return Ok(None);
        };
        match (width.trim().parse::<u32>(), height.trim().parse::<u32>()) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok(Some((w, h))),
            _ => Ok(None),
        }
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, SubstrateError> {
        Err(SubstrateError::Unsupported("script evaluation"))
    }

    async fn snapshot(&self, _node: &NodeHandle, _out_path: &Path) -> Result<(), SubstrateError> {
        Err(SubstrateError::Unsupported("element snapshot"))
    }
}
