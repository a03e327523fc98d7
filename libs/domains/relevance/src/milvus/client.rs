use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{RelevanceError, RelevanceResult};
use crate::milvus::MilvusConfig;
use crate::milvus::expr;
use crate::models::{
    CollectionSpec, EntryVector, Polarity, PreferenceVector, SearchFilters, SearchHit,
    UserPreferences,
};
use crate::repository::VectorRepository;

/// Milvus REST (v2) implementation of [`VectorRepository`].
///
/// Owns the two collections (`entries`, `user_preferences`) and embeds the
/// embedding-space signature in each collection description so a restarted
/// worker can tell whether the stored vectors match the active config.
pub struct MilvusRepository {
    http: reqwest::Client,
    config: MilvusConfig,
    /// Spec of the most recently ensured collections, used by the heal path
    /// when a data operation hits a dropped collection.
    ensured: RwLock<Option<CollectionSpec>>,
}

const NOT_FOUND_CODE: i64 = 100;

/// Polls after a drop until Milvus reports the collection gone.
const DROP_POLL_ATTEMPTS: u32 = 30;
const DROP_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Extra delay after both drops before recreating, Milvus finishes the drop
/// asynchronously even after `has` flips.
const DROP_SETTLE_DELAY: Duration = Duration::from_millis(500);

impl MilvusRepository {
    pub fn new(config: MilvusConfig) -> RelevanceResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelevanceError::Store(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            ensured: RwLock::new(None),
        })
    }

    pub fn from_env() -> RelevanceResult<Self> {
        Self::new(MilvusConfig::from_env()?)
    }

    async fn post(&self, path: &str, body: Value) -> RelevanceResult<Value> {
        let url = format!("{}{}", self.config.url.trim_end_matches('/'), path);

        let mut request = self.http.post(&url).json(&body);
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            request = request.bearer_auth(format!("{}:{}", user, pass));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelevanceError::Store(format!(
                "Milvus returned HTTP {} for {}",
                status, path
            )));
        }

        let payload: Value = response.json().await?;
        let code = payload.get("code").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();

            if code == NOT_FOUND_CODE
                || message.contains("can't find collection")
                || message.contains("collection not found")
            {
                return Err(RelevanceError::CollectionNotFound(message));
            }
            return Err(RelevanceError::Store(format!(
                "Milvus error (code {}): {}",
                code, message
            )));
        }

        Ok(payload)
    }

    async fn has_collection(&self, name: &str) -> RelevanceResult<bool> {
        let payload = self
            .post(
                "/v2/vectordb/collections/has",
                json!({ "collectionName": name }),
            )
            .await?;
        Ok(payload
            .pointer("/data/has")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn collection_signature(&self, name: &str) -> RelevanceResult<Option<String>> {
        let payload = self
            .post(
                "/v2/vectordb/collections/describe",
                json!({ "collectionName": name }),
            )
            .await?;
        let description = payload
            .pointer("/data/description")
            .and_then(Value::as_str)
            .unwrap_or("");
        Ok(extract_signature(description))
    }

    async fn drop_and_wait(&self, name: &str) -> RelevanceResult<()> {
        self.post(
            "/v2/vectordb/collections/drop",
            json!({ "collectionName": name }),
        )
        .await?;

        for _ in 0..DROP_POLL_ATTEMPTS {
            if !self.has_collection(name).await? {
                debug!(collection = name, "Collection drop confirmed");
                return Ok(());
            }
            tokio::time::sleep(DROP_POLL_INTERVAL).await;
        }

        Err(RelevanceError::Timeout(format!(
            "Collection {} still present after drop",
            name
        )))
    }

    async fn create_entries_collection(&self, spec: &CollectionSpec) -> RelevanceResult<()> {
        let name = &self.config.entries_collection;
        self.post(
            "/v2/vectordb/collections/create",
            json!({
                "collectionName": name,
                "schema": {
                    "autoId": false,
                    "enableDynamicField": false,
                    "description": format!("Feed entry embeddings | model={}", spec.signature()),
                    "fields": [
                        { "fieldName": "id", "dataType": "VarChar", "isPrimary": true,
                          "elementTypeParams": { "max_length": "36" } },
                        { "fieldName": "embedding", "dataType": "FloatVector",
                          "elementTypeParams": { "dim": spec.dimension.to_string() } },
                        { "fieldName": "feed_id", "dataType": "VarChar",
                          "elementTypeParams": { "max_length": "36" } },
                        { "fieldName": "published_at", "dataType": "Int64" },
                        { "fieldName": "language", "dataType": "VarChar",
                          "elementTypeParams": { "max_length": "10" } },
                        { "fieldName": "word_count", "dataType": "Int32" },
                        { "fieldName": "author", "dataType": "VarChar",
                          "elementTypeParams": { "max_length": "200" } }
                    ]
                }
            }),
        )
        .await?;

        // The vector index is required for search; scalar indexes only speed
        // up filters and their failure is tolerated.
        self.create_index(
            name,
            json!({
                "fieldName": "embedding",
                "indexName": "embedding_idx",
                "metricType": "COSINE",
                "indexType": "IVF_FLAT",
                "params": { "nlist": 1024 }
            }),
        )
        .await?;

        for field in ["feed_id", "published_at"] {
            if let Err(e) = self
                .create_index(
                    name,
                    json!({ "fieldName": field, "indexName": format!("{}_idx", field) }),
                )
                .await
            {
                warn!(collection = name, field, error = %e, "Scalar index creation failed");
            }
        }

        self.load_collection(name).await?;
        info!(collection = name, signature = %spec.signature(), "Created entries collection");
        Ok(())
    }

    async fn create_prefs_collection(&self, spec: &CollectionSpec) -> RelevanceResult<()> {
        let name = &self.config.prefs_collection;
        self.post(
            "/v2/vectordb/collections/create",
            json!({
                "collectionName": name,
                "schema": {
                    "autoId": false,
                    "enableDynamicField": false,
                    "description": format!("User preference vectors | model={}", spec.signature()),
                    "fields": [
                        { "fieldName": "id", "dataType": "VarChar", "isPrimary": true,
                          "elementTypeParams": { "max_length": "50" } },
                        { "fieldName": "user_id", "dataType": "VarChar",
                          "elementTypeParams": { "max_length": "36" } },
                        { "fieldName": "vector_type", "dataType": "VarChar",
                          "elementTypeParams": { "max_length": "20" } },
                        { "fieldName": "embedding", "dataType": "FloatVector",
                          "elementTypeParams": { "dim": spec.dimension.to_string() } },
                        { "fieldName": "sample_count", "dataType": "Float" },
                        { "fieldName": "updated_at", "dataType": "Int64" }
                    ]
                }
            }),
        )
        .await?;

        self.create_index(
            name,
            json!({
                "fieldName": "embedding",
                "indexName": "embedding_idx",
                "metricType": "COSINE",
                "indexType": "FLAT",
                "params": {}
            }),
        )
        .await?;

        if let Err(e) = self
            .create_index(name, json!({ "fieldName": "user_id", "indexName": "user_id_idx" }))
            .await
        {
            warn!(collection = name, error = %e, "Scalar index creation failed");
        }

        self.load_collection(name).await?;
        info!(collection = name, signature = %spec.signature(), "Created preferences collection");
        Ok(())
    }

    async fn create_index(&self, collection: &str, index_params: Value) -> RelevanceResult<()> {
        self.post(
            "/v2/vectordb/indexes/create",
            json!({ "collectionName": collection, "indexParams": [index_params] }),
        )
        .await?;
        Ok(())
    }

    async fn load_collection(&self, name: &str) -> RelevanceResult<()> {
        self.post(
            "/v2/vectordb/collections/load",
            json!({ "collectionName": name }),
        )
        .await?;
        Ok(())
    }

    async fn ensure_one(
        &self,
        name: &str,
        spec: &CollectionSpec,
    ) -> RelevanceResult<EnsureOutcome> {
        if !self.has_collection(name).await? {
            return Ok(EnsureOutcome::Missing);
        }

        let stored = self.collection_signature(name).await?;
        if stored.as_deref() == Some(spec.signature().as_str()) {
            Ok(EnsureOutcome::Matches)
        } else {
            warn!(
                collection = name,
                stored = stored.as_deref().unwrap_or("<none>"),
                expected = %spec.signature(),
                "Collection signature mismatch"
            );
            Ok(EnsureOutcome::Mismatch)
        }
    }

    /// Re-run the ensure path after a data operation hit a missing
    /// collection. Returns false when nothing was ever ensured.
    async fn heal(&self) -> RelevanceResult<bool> {
        let spec = self.ensured.read().await.clone();
        match spec {
            Some(spec) => {
                warn!("Collection disappeared mid-operation, re-ensuring");
                self.ensure_collections(&spec).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn with_heal<T, F, Fut>(&self, op: F) -> RelevanceResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RelevanceResult<T>>,
    {
        match op().await {
            Err(e) if e.is_not_found() => {
                if self.heal().await? {
                    op().await
                } else {
                    Err(e)
                }
            }
            other => other,
        }
    }

    async fn insert_entry_inner(&self, vector: &EntryVector) -> RelevanceResult<()> {
        let collection = &self.config.entries_collection;
        let id = vector.entry_id.to_string();

        // Upsert: Milvus insert does not replace by primary key.
        self.post(
            "/v2/vectordb/entities/delete",
            json!({ "collectionName": collection, "filter": expr::id_equals(&id) }),
        )
        .await?;

        self.post(
            "/v2/vectordb/entities/insert",
            json!({
                "collectionName": collection,
                "data": [{
                    "id": id,
                    "embedding": vector.embedding,
                    "feed_id": vector.feed_id.to_string(),
                    "published_at": vector.published_at,
                    "language": vector.language,
                    "word_count": vector.word_count,
                    "author": vector.author,
                }]
            }),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filter: String,
        output_fields: &[&str],
        limit: usize,
    ) -> RelevanceResult<Vec<Value>> {
        let payload = self
            .post(
                "/v2/vectordb/entities/query",
                json!({
                    "collectionName": collection,
                    "filter": filter,
                    "outputFields": output_fields,
                    "limit": limit,
                }),
            )
            .await?;
        Ok(payload
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_preference_inner(&self, pref: &PreferenceVector) -> RelevanceResult<()> {
        let collection = &self.config.prefs_collection;
        let id = pref.storage_id();

        self.post(
            "/v2/vectordb/entities/delete",
            json!({ "collectionName": collection, "filter": expr::id_equals(&id) }),
        )
        .await?;

        self.post(
            "/v2/vectordb/entities/insert",
            json!({
                "collectionName": collection,
                "data": [{
                    "id": id,
                    "user_id": pref.user_id.to_string(),
                    "vector_type": pref.polarity.as_str(),
                    "embedding": pref.embedding,
                    "sample_count": pref.sample_count,
                    "updated_at": pref.updated_at,
                }]
            }),
        )
        .await?;
        Ok(())
    }
}

enum EnsureOutcome {
    Matches,
    Mismatch,
    Missing,
}

/// Pull `provider:model:dimension` back out of a collection description.
fn extract_signature(description: &str) -> Option<String> {
    description
        .split("model=")
        .nth(1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn row_str(row: &Value, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(str::to_string)
}

fn row_uuid(row: &Value, key: &str) -> Option<Uuid> {
    row.get(key)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn row_f32s(row: &Value, key: &str) -> Option<Vec<f32>> {
    row.get(key).and_then(Value::as_array).map(|values| {
        values
            .iter()
            .filter_map(Value::as_f64)
            .map(|v| v as f32)
            .collect()
    })
}

#[async_trait]
impl VectorRepository for MilvusRepository {
    async fn ensure_collections(&self, spec: &CollectionSpec) -> RelevanceResult<()> {
        let entries = self
            .ensure_one(&self.config.entries_collection, spec)
            .await?;
        let prefs = self.ensure_one(&self.config.prefs_collection, spec).await?;

        match (entries, prefs) {
            (EnsureOutcome::Mismatch, _) | (_, EnsureOutcome::Mismatch) => {
                // Vectors from another embedding space are useless, drop both.
                self.recreate_collections(spec).await?;
            }
            (entries, prefs) => {
                if matches!(entries, EnsureOutcome::Missing) {
                    self.create_entries_collection(spec).await?;
                }
                if matches!(prefs, EnsureOutcome::Missing) {
                    self.create_prefs_collection(spec).await?;
                }
            }
        }

        *self.ensured.write().await = Some(spec.clone());
        Ok(())
    }

    async fn recreate_collections(&self, spec: &CollectionSpec) -> RelevanceResult<()> {
        info!(signature = %spec.signature(), "Recreating vector collections");

        for name in [&self.config.entries_collection, &self.config.prefs_collection] {
            if self.has_collection(name).await? {
                self.drop_and_wait(name).await?;
            }
        }
        tokio::time::sleep(DROP_SETTLE_DELAY).await;

        self.create_entries_collection(spec).await?;
        self.create_prefs_collection(spec).await?;

        *self.ensured.write().await = Some(spec.clone());
        Ok(())
    }

    async fn ping(&self) -> RelevanceResult<()> {
        self.post("/v2/vectordb/collections/list", json!({}))
            .await?;
        Ok(())
    }

    async fn insert_entry_embedding(&self, vector: &EntryVector) -> RelevanceResult<()> {
        self.with_heal(|| self.insert_entry_inner(vector)).await
    }

    async fn get_entry_embedding(&self, entry_id: Uuid) -> RelevanceResult<Option<Vec<f32>>> {
        let rows = self
            .with_heal(|| {
                self.query(
                    &self.config.entries_collection,
                    expr::id_equals(&entry_id.to_string()),
                    &["embedding"],
                    1,
                )
            })
            .await?;

        Ok(rows.first().and_then(|row| row_f32s(row, "embedding")))
    }

    async fn batch_get_entry_embeddings(
        &self,
        entry_ids: &[Uuid],
    ) -> RelevanceResult<HashMap<Uuid, Vec<f32>>> {
        if entry_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<String> = entry_ids.iter().map(Uuid::to_string).collect();
        let rows = self
            .with_heal(|| {
                self.query(
                    &self.config.entries_collection,
                    expr::id_in(&ids),
                    &["id", "embedding"],
                    entry_ids.len(),
                )
            })
            .await?;

        let mut result = HashMap::with_capacity(rows.len());
        for row in &rows {
            if let (Some(id), Some(embedding)) = (row_uuid(row, "id"), row_f32s(row, "embedding"))
            {
                result.insert(id, embedding);
            }
        }
        Ok(result)
    }

    async fn search_similar_entries<'a>(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&'a SearchFilters>,
    ) -> RelevanceResult<Vec<SearchHit>> {
        let filter = filters.and_then(expr::entry_search_filter);

        let payload = self
            .with_heal(|| {
                let mut body = json!({
                    "collectionName": self.config.entries_collection,
                    "data": [query],
                    "annsField": "embedding",
                    "limit": top_k,
                    "outputFields": ["id", "feed_id", "published_at", "author"],
                });
                if let Some(filter) = &filter {
                    body["filter"] = json!(filter);
                }
                self.post("/v2/vectordb/entities/search", body)
            })
            .await?;

        let rows = payload
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let hits = rows
            .iter()
            .filter_map(|row| {
                let entry_id = row_uuid(row, "id")?;
                let score = row.get("distance").and_then(Value::as_f64)? as f32;
                Some(SearchHit {
                    entry_id,
                    score,
                    feed_id: row_uuid(row, "feed_id"),
                    published_at: row.get("published_at").and_then(Value::as_i64),
                    author: row_str(row, "author"),
                })
            })
            .collect();
        Ok(hits)
    }

    async fn upsert_user_preference(&self, pref: &PreferenceVector) -> RelevanceResult<()> {
        self.with_heal(|| self.upsert_preference_inner(pref)).await
    }

    async fn get_user_preferences(&self, user_id: Uuid) -> RelevanceResult<UserPreferences> {
        let rows = self
            .with_heal(|| {
                self.query(
                    &self.config.prefs_collection,
                    expr::user_id_equals(user_id),
                    &["id", "vector_type", "embedding", "sample_count", "updated_at"],
                    2,
                )
            })
            .await?;

        let mut prefs = UserPreferences::default();
        for row in &rows {
            let polarity = match row_str(row, "vector_type").as_deref() {
                Some("positive") => Polarity::Positive,
                Some("negative") => Polarity::Negative,
                other => {
                    warn!(user_id = %user_id, vector_type = ?other, "Unknown preference row");
                    continue;
                }
            };
            let Some(embedding) = row_f32s(row, "embedding") else {
                continue;
            };

            let vector = PreferenceVector {
                user_id,
                polarity,
                embedding,
                sample_count: row.get("sample_count").and_then(Value::as_f64).unwrap_or(0.0)
                    as f32,
                updated_at: row.get("updated_at").and_then(Value::as_i64).unwrap_or(0),
            };
            match polarity {
                Polarity::Positive => prefs.positive = Some(vector),
                Polarity::Negative => prefs.negative = Some(vector),
            }
        }
        Ok(prefs)
    }

    async fn delete_entry_embedding(&self, entry_id: Uuid) -> RelevanceResult<()> {
        self.with_heal(|| {
            self.post(
                "/v2/vectordb/entities/delete",
                json!({
                    "collectionName": self.config.entries_collection,
                    "filter": expr::id_equals(&entry_id.to_string()),
                }),
            )
        })
        .await?;
        Ok(())
    }

    async fn delete_user_preferences(&self, user_id: Uuid) -> RelevanceResult<()> {
        self.with_heal(|| {
            self.post(
                "/v2/vectordb/entities/delete",
                json!({
                    "collectionName": self.config.prefs_collection,
                    "filter": expr::user_id_equals(user_id),
                }),
            )
        })
        .await?;
        Ok(())
    }
}
