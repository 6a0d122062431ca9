//! Document store: the full records that retrieved fragments point back to.
//!
//! A [`DocumentStore`] is built once and never mutated. Reloading builds a
//! fresh store and swaps the shared reference held by
//! [`SharedDocumentStore`], so a reader sees either the old corpus or the
//! new one, never a mix.
//!
//! The whole corpus lives in memory; its size is a capacity-planning input.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use ragline_core::{Document, DocumentStoreError};
use tracing::info;

/// Immutable id → document mapping with O(1) lookup.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: Vec<Document>,
    index: HashMap<String, usize>,
}

impl DocumentStore {
    /// Load a JSON array of document records.
    ///
    /// Fails if the file is missing or malformed, or if any id is empty or
    /// repeated.
    pub fn load(path: &Path) -> Result<Self, DocumentStoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| DocumentStoreError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let documents: Vec<Document> =
            serde_json::from_str(&content).map_err(|e| DocumentStoreError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let store = Self::from_documents(documents)?;
        info!(path = %path.display(), documents = store.len(), "Loaded document store");
        Ok(store)
    }

    pub fn from_documents(documents: Vec<Document>) -> Result<Self, DocumentStoreError> {
        let mut index = HashMap::with_capacity(documents.len());
        for (i, doc) in documents.iter().enumerate() {
            if doc.id.trim().is_empty() {
                return Err(DocumentStoreError::Invalid(format!(
                    "document #{} has an empty id",
                    i + 1
                )));
            }
            if index.insert(doc.id.clone(), i).is_some() {
                return Err(DocumentStoreError::Invalid(format!(
                    "duplicate document id '{}'",
                    doc.id
                )));
            }
        }
        Ok(Self { documents, index })
    }

    pub fn get(&self, id: &str) -> Result<&Document, DocumentStoreError> {
        self.find(id)
            .ok_or_else(|| DocumentStoreError::NotFound(id.to_string()))
    }

    pub fn find(&self, id: &str) -> Option<&Document> {
        self.index.get(id).map(|&i| &self.documents[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Ids in load order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(|d| d.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }
}

/// Shared handle to the current document store.
///
/// The lock guards only the `Arc` itself: readers clone it and release the
/// lock immediately.
#[derive(Debug)]
pub struct SharedDocumentStore {
    current: RwLock<Arc<DocumentStore>>,
}

impl SharedDocumentStore {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            current: RwLock::new(Arc::new(store)),
        }
    }

    /// The store as of now. Hold on to it for the whole request.
    pub fn snapshot(&self) -> Arc<DocumentStore> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new store, returning the previous one.
    pub fn replace(&self, store: DocumentStore) -> Arc<DocumentStore> {
        let next = Arc::new(store);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Load `path` off to the side and swap it in. On failure the current
    /// store stays in place.
    pub fn reload(&self, path: &Path) -> Result<usize, DocumentStoreError> {
        let store = DocumentStore::load(path)?;
        let count = store.len();
        self.replace(store);
        info!(documents = count, "Document store reloaded");
        Ok(count)
    }
}

impl From<DocumentStore> for SharedDocumentStore {
    fn from(store: DocumentStore) -> Self {
        Self::new(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_json(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const TWO_DOCS: &str = r#"[
        {"id": "a", "title": "A", "newspaper": "Le Soleil", "date": "1990-01-01",
         "subject": "Islam", "spatial": ["Dakar", "Thiès"], "content": "Alpha text"},
        {"id": "b", "title": "B", "source": "Walf", "subjects": ["Hajj"], "text": "Beta text",
         "summary": "short", "url": "https://example.org/b"}
    ]"#;

    #[test]
    fn loads_and_indexes() {
        let file = write_json(TWO_DOCS);
        let store = DocumentStore::load(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["a", "b"]);

        let a = store.get("a").unwrap();
        assert_eq!(a.source, "Le Soleil");
        assert!(a.subjects.contains("Islam"));
        assert_eq!(a.locations.len(), 2);
        assert!(a.summary.is_empty());

        let b = store.get("b").unwrap();
        assert_eq!(b.url.as_deref(), Some("https://example.org/b"));
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = DocumentStore::from_documents(vec![Document::new("x", "X", "t")]).unwrap();
        assert!(matches!(store.get("y"), Err(DocumentStoreError::NotFound(_))));
        assert!(store.find("y").is_none());
        assert!(store.contains("x"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = DocumentStore::load(Path::new("/nonexistent/docs.json")).unwrap_err();
        assert!(matches!(err, DocumentStoreError::Read { .. }));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let file = write_json("[{\"id\": \"a\",");
        let err = DocumentStore::load(file.path()).unwrap_err();
        assert!(matches!(err, DocumentStoreError::Parse { .. }));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let docs = vec![Document::new("a", "1", "x"), Document::new("a", "2", "y")];
        let err = DocumentStore::from_documents(docs).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn empty_id_rejected() {
        let err = DocumentStore::from_documents(vec![Document::new(" ", "t", "x")]).unwrap_err();
        assert!(matches!(err, DocumentStoreError::Invalid(_)));
    }

    #[test]
    fn snapshot_survives_replace() {
        let shared = SharedDocumentStore::new(
            DocumentStore::from_documents(vec![Document::new("old", "Old", "x")]).unwrap(),
        );
        let before = shared.snapshot();

        let previous = shared.replace(
            DocumentStore::from_documents(vec![Document::new("new", "New", "y")]).unwrap(),
        );

        assert!(before.contains("old"));
        assert!(previous.contains("old"));
        let after = shared.snapshot();
        assert!(after.contains("new"));
        assert!(!after.contains("old"));
    }

    #[test]
    fn failed_reload_keeps_current_store() {
        let good = write_json(TWO_DOCS);
        let shared = SharedDocumentStore::new(DocumentStore::load(good.path()).unwrap());

        let bad = write_json("not json");
        assert!(shared.reload(bad.path()).is_err());
        assert_eq!(shared.snapshot().len(), 2);

        let dup = write_json(r#"[{"id": "z", "text": ""}, {"id": "z", "text": ""}]"#);
        assert!(shared.reload(dup.path()).is_err());
        assert!(shared.snapshot().contains("a"));

        let single = write_json(r#"[{"id": "only", "text": "1"}]"#);
        assert_eq!(shared.reload(single.path()).unwrap(), 1);
        assert!(shared.snapshot().contains("only"));
    }
}
