use async_trait::async_trait;

use crate::error::{CaptureError, SubstrateError};
use crate::substrate::{NodeHandle, NodeKind, Substrate};
use crate::token::ContentToken;

/// Reference to a captured (or attempted) asset, as returned by the capture
/// seam. `captured` is false when every strategy failed and the reference
/// dangles without bytes on disk.
#[derive(Debug, Clone)]
pub struct AssetRef {
    pub asset_id: String,
    pub source_url: String,
    pub captured: bool,
}

/// Seam between the classifier and the asset capture synchronizer, so token
/// extraction can be exercised without a real capture pipeline.
#[async_trait]
pub trait CaptureImage: Send + Sync {
    async fn capture(&self, node: &NodeHandle) -> Result<AssetRef, CaptureError>;
}

/// Linearize a container's immediate children into an ordered token stream.
///
/// Text and unrecognized inline elements accumulate in an in-flight buffer;
/// explicit line breaks, captions and images flush it. Only non-empty lines
/// are emitted, so consecutive breaks act as separators, never as content.
/// Hidden children are skipped before classification. Images without a
/// resolvable source are skipped with a warning; nothing below the container
/// level fails extraction.
pub async fn extract_tokens(
    substrate: &dyn Substrate,
    container: &NodeHandle,
    capture: &dyn CaptureImage,
) -> Result<Vec<ContentToken>, SubstrateError> {
    let children = substrate.child_nodes(container).await?;

    let mut tokens = Vec::new();
    let mut buffer = String::new();

    for child in children {
        if !child.visible {
            continue;
        }
        match child.kind {
            NodeKind::Text | NodeKind::Other => buffer.push_str(&child.text),
            NodeKind::LineBreak => flush_line(&mut buffer, &mut tokens),
            NodeKind::Caption => {
                flush_line(&mut buffer, &mut tokens);
                let text = child.text.trim();
                if !text.is_empty() {
                    tokens.push(ContentToken::Caption(text.to_owned()));
                }
            }
            NodeKind::Image => {
                flush_line(&mut buffer, &mut tokens);
                match capture.capture(&child.handle).await {
                    Ok(asset) => tokens.push(ContentToken::ImageRef {
                        asset_id: asset.asset_id,
                        source_url: asset.source_url,
                    }),
                    Err(CaptureError::NoSource) => {
                        tracing::warn!("image without resolvable source; skipping");
                    }
                }
            }
        }
    }

    flush_line(&mut buffer, &mut tokens);
    Ok(tokens)
}

fn flush_line(buffer: &mut String, tokens: &mut Vec<ContentToken>) {
    let line = buffer.trim();
    if !line.is_empty() {
        tokens.push(ContentToken::TextLine(line.to_owned()));
    }
    buffer.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_skips_whitespace_only_buffers() {
        let mut tokens = Vec::new();

        let mut buffer = "  \n ".to_owned();
        flush_line(&mut buffer, &mut tokens);
        assert!(tokens.is_empty());

        let mut buffer = "  kept  ".to_owned();
        flush_line(&mut buffer, &mut tokens);
        assert_eq!(tokens, vec![ContentToken::TextLine("kept".to_owned())]);
        assert!(buffer.is_empty());
    }
}
