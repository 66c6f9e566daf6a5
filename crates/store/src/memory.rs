//! In-memory implementation of the document store for testing.
//!
//! Keeps documents in a flat map keyed by full path. Semantics mirror the
//! REST implementation: merge-writes upsert, deletes are idempotent, and
//! listing scans direct children of a collection path.

use crate::{Document, DocumentStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Value>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents, across all collections
    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.lock().await.is_empty()
    }

    /// Fetch one document by full path
    pub async fn get(&self, path: &str) -> Option<Value> {
        self.documents.lock().await.get(path).cloned()
    }

    fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
        match (a, b) {
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .unwrap_or(0.0)
                .partial_cmp(&y.as_f64().unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, path: &str, doc: Value) -> Result<String, StoreError> {
        let id = format!("doc-{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.documents
            .lock()
            .await
            .insert(format!("{path}/{id}"), doc);
        Ok(id)
    }

    async fn set_merge(&self, path: &str, doc: Value) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().await;
        let entry = documents
            .entry(path.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let (Some(existing), Some(incoming)) = (entry.as_object_mut(), doc.as_object()) {
            for (key, value) in incoming {
                existing.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn list(
        &self,
        path: &str,
        order_by: &str,
        descending: bool,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.lock().await;
        let prefix = format!("{path}/");

        let mut matched: Vec<Document> = documents
            .iter()
            .filter_map(|(key, fields)| {
                let id = key.strip_prefix(&prefix)?;
                // Direct children only, not nested subcollection documents
                if id.contains('/') {
                    return None;
                }
                Some(Document {
                    id: id.to_string(),
                    fields: fields.clone(),
                })
            })
            .collect();

        matched.sort_by(|a, b| {
            let av = a.fields.get(order_by).unwrap_or(&Value::Null);
            let bv = b.fields.get(order_by).unwrap_or(&Value::Null);
            let ordering = Self::compare(av, bv);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        matched.truncate(limit);
        Ok(matched)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.documents.lock().await.remove(path);
        Ok(())
    }

    async fn increment(&self, path: &str, field: &str, by: i64) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().await;
        let entry = documents
            .entry(path.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(object) = entry.as_object_mut() {
            let current = object.get(field).and_then(|v| v.as_i64()).unwrap_or(0);
            object.insert(field.to_string(), serde_json::json!(current + by));
        }
        Ok(())
    }
}
