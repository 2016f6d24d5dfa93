/// One unit of linearized chapter content, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentToken {
    /// A completed line of prose.
    TextLine(String),
    /// Text that was visually set apart on the page.
    Caption(String),
    /// Reference to a captured (or attempted) image asset.
    ImageRef { asset_id: String, source_url: String },
}

impl ContentToken {
    /// Wire form used inside a persisted chapter record: plain text verbatim,
    /// captions as `((text))`, image references as `(((assetId)))`.
    pub fn encode(&self) -> String {
        match self {
            ContentToken::TextLine(text) => text.clone(),
            ContentToken::Caption(text) => format!("(({text}))"),
            ContentToken::ImageRef { asset_id, .. } => format!("((({asset_id})))"),
        }
    }
}
