use serde::{Deserialize, Serialize};

/// The persisted unit in the vector store: one submitted document plus the
/// identity and timestamp assigned at ingestion time. The embedding itself is
/// computed by the store's bound embedder on write and never travels through
/// this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub content: String,
    pub created_at: String,
}

impl DocumentRecord {
    /// Assign a fresh random id and creation timestamp to a submitted
    /// document. Ids are never reused; uniqueness does not depend on clock
    /// resolution under concurrent ingestion.
    pub fn new(content: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Build one record per document, preserving input order: `records[i]`
    /// holds `documents[i]`.
    pub fn from_documents(documents: &[String]) -> Vec<Self> {
        documents.iter().map(|d| Self::new(d.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_record_new() {
        let record = DocumentRecord::new("a document".to_string());
        assert_eq!(record.content, "a document");
        assert_eq!(record.id.len(), 36);
        assert!(!record.created_at.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let docs: Vec<String> = (0..64).map(|i| format!("doc {}", i)).collect();
        let records = DocumentRecord::from_documents(&docs);
        let ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), records.len());
    }

    #[test]
    fn test_order_preserved() {
        let docs = vec!["first".to_string(), "second".to_string(), "third".to_string()];
        let records = DocumentRecord::from_documents(&docs);
        let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }
}
