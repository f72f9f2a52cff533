//! Core data models used by the library.

use serde::{Deserialize, Deserializer, Serialize};

/// A knowledge-base document as returned by the KB service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KbDocument {
    /// Stable document id. The KB may send numbers; they are kept as strings.
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// A document plus its similarity score in `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: KbDocument,
    pub score: f64,
}

/// Result of one (or a merged set of) KB searches.
///
/// `documents` are unique by id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub documents: Vec<ScoredDocument>,
    #[serde(default)]
    pub context: String,
}

impl RetrievalResult {
    pub fn empty(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    /// Highest document score, if any.
    pub fn top_score(&self) -> Option<f64> {
        self.documents
            .iter()
            .map(|d| d.score)
            .fold(None, |acc, s| Some(acc.map_or(s, |a: f64| a.max(s))))
    }

    pub fn has_documents(&self) -> bool {
        !self.documents.is_empty()
    }
}

fn id_from_any<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AnyId {
        Str(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match AnyId::deserialize(de)? {
        AnyId::Str(s) => s,
        AnyId::Int(n) => n.to_string(),
        AnyId::Uint(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_ids_deserialize() {
        let raw = r#"{"question":"q","documents":[
            {"document":{"id":7,"type":"chat_qa","content":"a"},"score":0.4},
            {"document":{"id":"doc-9","content":"b"},"score":0.9}
        ]}"#;
        let r: RetrievalResult = serde_json::from_str(raw).unwrap();
        assert_eq!(r.documents[0].document.id, "7");
        assert_eq!(r.documents[0].document.doc_type.as_deref(), Some("chat_qa"));
        assert_eq!(r.documents[1].document.id, "doc-9");
        assert_eq!(r.top_score(), Some(0.9));
        assert_eq!(r.context, "");
    }

    #[test]
    fn empty_result_has_no_top_score() {
        assert_eq!(RetrievalResult::empty("q").top_score(), None);
    }
}
