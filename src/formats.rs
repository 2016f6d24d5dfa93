use serde::{Deserialize, Serialize};

use crate::token::ContentToken;

/// Persisted form of one chapter: the title plus the flattened token stream.
///
/// `contents` is an array of string arrays for compatibility with downstream
/// consumers; page boundaries are not retained, so a non-empty chapter always
/// serializes as a single inner array. An empty chapter serializes with an
/// empty `contents` and is reported as incomplete by the validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRecord {
    pub chapter_title: String,
    pub contents: Vec<Vec<String>>,
}

impl ChapterRecord {
    pub fn from_tokens(chapter_title: &str, tokens: &[ContentToken]) -> Self {
        let contents = if tokens.is_empty() {
            Vec::new()
        } else {
            vec![tokens.iter().map(ContentToken::encode).collect()]
        };
        Self {
            chapter_title: chapter_title.to_owned(),
            contents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_flattens_tokens_into_one_group() {
        let tokens = vec![
            ContentToken::TextLine("a".to_owned()),
            ContentToken::ImageRef {
                asset_id: "12".to_owned(),
                source_url: "https://example.com/12.jpg".to_owned(),
            },
            ContentToken::Caption("c".to_owned()),
        ];
        let record = ChapterRecord::from_tokens("T", &tokens);
        assert_eq!(record.contents, vec![vec![
            "a".to_owned(),
            "(((12)))".to_owned(),
            "((c))".to_owned(),
        ]]);
    }

    #[test]
    fn empty_chapter_serializes_with_empty_contents() {
        let record = ChapterRecord::from_tokens("T", &[]);
        let json = serde_json::to_string(&record).expect("serialize");
        assert_eq!(json, r#"{"chapterTitle":"T","contents":[]}"#);
    }
}
