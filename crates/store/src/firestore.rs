//! Firestore REST implementation of the document store.
//!
//! Documents are addressed as
//! `{base_url}/projects/{project}/databases/(default)/documents/{path}`.
//! JSON values are translated to and from Firestore's typed field encoding
//! (`stringValue`, `integerValue`, `mapValue`, ...). Counter updates use
//! the native atomic increment transform so concurrent writers never need
//! application-level locking.

use crate::{Document, DocumentStore, StoreError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};

pub struct FirestoreStore {
    client: Client,
    base_url: String,
    project_id: String,
    access_token: String,
}

impl FirestoreStore {
    pub fn new(base_url: String, project_id: String, access_token: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url,
            project_id,
            access_token,
        }
    }

    fn documents_root(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.base_url, self.project_id
        )
    }

    /// Fully qualified resource name used inside commit requests
    fn resource_name(&self, path: &str) -> String {
        format!(
            "projects/{}/databases/(default)/documents/{}",
            self.project_id, path
        )
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("Bearer {}", self.access_token))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Http { status, body })
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn create(&self, path: &str, doc: Value) -> Result<String, StoreError> {
        let url = format!("{}/{}", self.documents_root(), path);
        let body = json!({ "fields": to_fields(&doc) });

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::RequestFailed(e.to_string()))?;
        let response = Self::check(response).await?;

        let created: Value = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        let name = created
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| StoreError::InvalidResponse("missing document name".to_string()))?;
        let id = name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(id)
    }

    async fn set_merge(&self, path: &str, doc: Value) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.documents_root(), path);

        // Restrict the update mask to the supplied fields so the merge
        // leaves everything else untouched.
        let mask: Vec<(&str, String)> = doc
            .as_object()
            .map(|fields| {
                fields
                    .keys()
                    .map(|k| ("updateMask.fieldPaths", k.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let body = json!({ "fields": to_fields(&doc) });

        let response = self
            .authorized(self.client.patch(&url))
            .query(&mask)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::RequestFailed(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list(
        &self,
        path: &str,
        order_by: &str,
        descending: bool,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        // runQuery is addressed to the parent document of the collection
        let (parent, collection_id) = match path.rfind('/') {
            Some(pos) => (&path[..pos], &path[pos + 1..]),
            None => ("", path),
        };
        let url = if parent.is_empty() {
            format!("{}:runQuery", self.documents_root())
        } else {
            format!("{}/{}:runQuery", self.documents_root(), parent)
        };

        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection_id }],
                "orderBy": [{
                    "field": { "fieldPath": order_by },
                    "direction": if descending { "DESCENDING" } else { "ASCENDING" },
                }],
                "limit": limit,
            }
        });

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::RequestFailed(e.to_string()))?;
        let response = Self::check(response).await?;

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        let mut documents = Vec::new();
        for row in rows {
            // Rows without a document carry query metadata only
            let Some(doc) = row.get("document") else {
                continue;
            };
            let name = doc.get("name").and_then(|n| n.as_str()).unwrap_or_default();
            let id = name.rsplit('/').next().unwrap_or_default().to_string();
            let fields = doc.get("fields").map(from_fields).unwrap_or(Value::Null);
            documents.push(Document { id, fields });
        }
        Ok(documents)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.documents_root(), path);
        let response = self
            .authorized(self.client.delete(&url))
            .send()
            .await
            .map_err(|e| StoreError::RequestFailed(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn increment(&self, path: &str, field: &str, by: i64) -> Result<(), StoreError> {
        let url = format!("{}:commit", self.documents_root());
        let body = json!({
            "writes": [{
                "transform": {
                    "document": self.resource_name(path),
                    "fieldTransforms": [{
                        "fieldPath": field,
                        "increment": { "integerValue": by.to_string() },
                    }],
                }
            }]
        });

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::RequestFailed(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }
}

// ==================== Field encoding ====================

/// Encode a JSON object into Firestore's typed field map
fn to_fields(value: &Value) -> Value {
    let mut fields = Map::new();
    if let Some(object) = value.as_object() {
        for (key, val) in object {
            fields.insert(key.clone(), to_field_value(val));
        }
    }
    Value::Object(fields)
}

fn to_field_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(to_field_value).collect::<Vec<_>>() }
        }),
        Value::Object(_) => json!({ "mapValue": { "fields": to_fields(value) } }),
    }
}

/// Decode Firestore's typed field map back into a plain JSON object
fn from_fields(fields: &Value) -> Value {
    let mut out = Map::new();
    if let Some(object) = fields.as_object() {
        for (key, val) in object {
            out.insert(key.clone(), from_field_value(val));
        }
    }
    Value::Object(out)
}

fn from_field_value(value: &Value) -> Value {
    let Some(object) = value.as_object() else {
        return Value::Null;
    };

    if let Some(s) = object.get("stringValue").and_then(|v| v.as_str()) {
        return Value::String(s.to_string());
    }
    if let Some(i) = object.get("integerValue") {
        // Encoded as a string on the wire
        let parsed = i
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| i.as_i64());
        if let Some(n) = parsed {
            return json!(n);
        }
    }
    if let Some(d) = object.get("doubleValue").and_then(|v| v.as_f64()) {
        return json!(d);
    }
    if let Some(b) = object.get("booleanValue").and_then(|v| v.as_bool()) {
        return Value::Bool(b);
    }
    if let Some(arr) = object
        .get("arrayValue")
        .and_then(|v| v.get("values"))
        .and_then(|v| v.as_array())
    {
        return Value::Array(arr.iter().map(from_field_value).collect());
    }
    if let Some(map) = object.get("mapValue").and_then(|v| v.get("fields")) {
        return from_fields(map);
    }
    Value::Null
}
