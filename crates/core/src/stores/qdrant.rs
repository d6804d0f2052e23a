use crate::error::BackendError;
use crate::models::{ChunkPayload, DistanceMetric, PointRecord, ScoredPoint};
use crate::traits::VectorStore;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

/// Qdrant over its HTTP API. `vector_size` is the collection's configured
/// dimensionality; every outgoing vector is checked against it so a
/// mismatched embedder fails at the first upsert or search instead of
/// silently degrading scores.
pub struct QdrantStore {
    endpoint: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, vector_size: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Client::new(),
            vector_size,
        }
    }

    fn check_dimension(&self, got: usize) -> Result<(), BackendError> {
        if got != self.vector_size {
            return Err(BackendError::DimensionMismatch {
                expected: self.vector_size,
                got,
            });
        }
        Ok(())
    }
}

fn backend_response(details: impl ToString) -> BackendError {
    BackendError::BackendResponse {
        backend: "qdrant".to_string(),
        details: details.to_string(),
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn list_collections(&self) -> Result<Vec<String>, BackendError> {
        let response = self
            .client
            .get(format!("{}/collections", self.endpoint))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_response(response.status()));
        }

        let parsed: Value = response.json().await?;
        let names = parsed
            .pointer("/result/collections")
            .and_then(Value::as_array)
            .map(|collections| {
                collections
                    .iter()
                    .filter_map(|collection| {
                        collection
                            .pointer("/name")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(names)
    }

    async fn create_collection(
        &self,
        name: &str,
        dim: usize,
        metric: DistanceMetric,
    ) -> Result<(), BackendError> {
        self.check_dimension(dim)?;

        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, name))
            .json(&json!({
                "vectors": { "size": dim, "distance": metric.as_str() }
            }))
            .send()
            .await?;

        // a concurrent caller may have won the creation race; already-exists
        // is success, not a conflict
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }

        if !response.status().is_success() {
            return Err(backend_response(response.status()));
        }

        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        points: &[PointRecord],
        wait: bool,
    ) -> Result<(), BackendError> {
        if points.is_empty() {
            return Ok(());
        }

        for point in points {
            self.check_dimension(point.vector.len())?;
        }

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait={}",
                self.endpoint, collection, wait
            ))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_response(response.status()));
        }

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        tenant: &str,
        limit: usize,
        with_payload: bool,
    ) -> Result<Vec<ScoredPoint>, BackendError> {
        self.check_dimension(vector.len())?;

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, collection
            ))
            .json(&json!({
                "vector": vector,
                "filter": {
                    "must": [
                        { "key": "tenant", "match": { "value": tenant } }
                    ]
                },
                "limit": limit,
                "with_payload": with_payload,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_response(response.status()));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut result = Vec::new();
        for hit in hits {
            let id = match hit.pointer("/id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => String::new(),
            };
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
            let payload = hit
                .pointer("/payload")
                .cloned()
                .and_then(|value| serde_json::from_value::<ChunkPayload>(value).ok());

            result.push(ScoredPoint { id, score, payload });
        }

        Ok(result)
    }
}
