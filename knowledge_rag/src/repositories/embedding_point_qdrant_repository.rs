use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::{
    prelude::QdrantClient,
    qdrant::{
        self, points_selector::PointsSelectorOneOf, value::Kind as ValueKind,
        vectors_config::Config, with_payload_selector::SelectorOptions, Condition,
        CreateCollection, Distance, Filter, ListValue, PointStruct, PointsSelector, SearchPoints,
        Struct, VectorParams, VectorsConfig, WithPayloadSelector,
    },
};
use serde_json::{Map, Number, Value as JsonValue};
use tracing::{info, warn};

use crate::{
    domain::entities::{
        embedding_point::{EmbeddingPoint, Embeddings, Kind, Payload, ScoredPoint, OWNER_ID_KEY},
        knowledge_base::OwnerId,
    },
    ports::vector_index::{VectorIndex, VectorIndexError},
};

/// Vector index persisted in Qdrant, one collection for each kind of embedding point
pub struct EmbeddingPointQdrantRepository {
    client: QdrantClient,
    /// Prepended to the collection names, to isolate environments sharing a Qdrant instance
    collection_prefix: String,
    collection_distance: Distance,
}

impl EmbeddingPointQdrantRepository {
    pub fn try_new(
        client: QdrantClient,
        collection_prefix: &str,
        collection_distance: &str,
    ) -> Result<Self, VectorIndexError> {
        let collection_distance = Distance::from_str_name(collection_distance).ok_or_else(|| {
            VectorIndexError::QdrantConfigurationError(format!(
                "Invalid Qdrant distance from configuration: {}",
                collection_distance
            ))
        })?;

        Ok(Self {
            client,
            collection_prefix: collection_prefix.to_string(),
            collection_distance,
        })
    }

    pub fn collection_name(&self, kind: Kind) -> String {
        format!("{}{}", self.collection_prefix, kind.collection_name())
    }

    #[tracing::instrument(name = "Creating a Qdrant collection", skip(self))]
    async fn ensure_collection(&self, kind: Kind, dimension: u64) -> Result<(), VectorIndexError> {
        let collection_name = self.collection_name(kind);

        let exists = self
            .client
            .has_collection(&collection_name)
            .await
            .map_err(|e| VectorIndexError::QdrantError(e.to_string()))?;

        if exists {
            info!("Collection {} already exists", collection_name);
            return Ok(());
        }

        match self
            .client
            .create_collection(&CreateCollection {
                collection_name: collection_name.clone(),
                vectors_config: Some(VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: dimension,
                        distance: self.collection_distance as i32,
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            })
            .await
        {
            Ok(_) => {
                info!("Created collection {}", collection_name);
                Ok(())
            }
            // Another instance created it between our check and our creation
            // Qdrant client only returns anyhow errors for now
            Err(error) if error.to_string().contains("already exists") => {
                info!("Collection {} already exists", collection_name);
                Ok(())
            }
            Err(error) => Err(VectorIndexError::QdrantError(error.to_string())),
        }
    }
}

#[async_trait]
impl VectorIndex for EmbeddingPointQdrantRepository {
    #[tracing::instrument(name = "Initializing the Qdrant collections", skip(self))]
    async fn ensure_collections(&self, dimension: u64) -> Result<(), VectorIndexError> {
        for kind in Kind::ALL {
            self.ensure_collection(kind, dimension).await?;
        }
        Ok(())
    }

    #[tracing::instrument(name = "Saving an embedding point to Qdrant", skip(self, vector, payload))]
    async fn upsert(
        &self,
        kind: Kind,
        owner_id: OwnerId,
        local_id: &str,
        vector: Embeddings,
        payload: Payload,
    ) -> Result<(), VectorIndexError> {
        let point = EmbeddingPoint::new(kind, owner_id, local_id, vector, payload);

        // Waits for the point to be persisted, so a search right after indexing finds it
        self.client
            .upsert_points_blocking(self.collection_name(kind), vec![point.into()], None)
            .await
            .map_err(|e| VectorIndexError::QdrantError(e.to_string()))?;

        info!("Saved embedding point");
        Ok(())
    }

    #[tracing::instrument(name = "Searching embedding points in Qdrant", skip(self, query_vector))]
    async fn search(
        &self,
        kind: Kind,
        query_vector: &[f32],
        owner_id: OwnerId,
        limit: u64,
    ) -> Result<Vec<ScoredPoint>, VectorIndexError> {
        if limit == 0 {
            return Ok(vec![]);
        }

        let response = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection_name(kind),
                vector: query_vector.to_vec(),
                filter: Some(owner_filter(owner_id)),
                limit,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| VectorIndexError::QdrantError(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredPoint {
                score: point.score,
                payload: qdrant_payload_to_json(point.payload),
            })
            .collect())
    }

    #[tracing::instrument(name = "Deleting the embedding points of an owner from Qdrant", skip(self))]
    async fn delete_by_owner(&self, owner_id: OwnerId) -> Result<(), VectorIndexError> {
        let points_selector = PointsSelector {
            points_selector_one_of: Some(PointsSelectorOneOf::Filter(owner_filter(owner_id))),
        };

        // A collection failing to delete does not stop the others: the failure is only logged
        for kind in Kind::ALL {
            let collection_name = self.collection_name(kind);

            match self
                .client
                .delete_points_blocking(&collection_name, &points_selector, None)
                .await
            {
                Ok(_) => info!("Deleted embedding points from {}", collection_name),
                Err(error) => warn!(
                    ?error,
                    "Could not delete embedding points from {}", collection_name
                ),
            }
        }

        Ok(())
    }
}

fn owner_filter(owner_id: OwnerId) -> Filter {
    Filter::must([Condition::matches(OWNER_ID_KEY, owner_id)])
}

impl From<EmbeddingPoint> for PointStruct {
    fn from(point: EmbeddingPoint) -> Self {
        Self {
            id: Some(point.id.to_string().into()),
            vectors: Some(point.vector.into()),
            payload: point
                .payload
                .into_iter()
                .map(|(key, value)| (key, json_to_qdrant_value(value)))
                .collect(),
        }
    }
}

fn json_to_qdrant_value(value: JsonValue) -> qdrant::Value {
    let kind = match value {
        JsonValue::Null => ValueKind::NullValue(0),
        JsonValue::Bool(value) => ValueKind::BoolValue(value),
        JsonValue::Number(number) => match number.as_i64() {
            Some(integer) => ValueKind::IntegerValue(integer),
            None => ValueKind::DoubleValue(number.as_f64().unwrap_or_default()),
        },
        JsonValue::String(value) => ValueKind::StringValue(value),
        JsonValue::Array(values) => ValueKind::ListValue(ListValue {
            values: values.into_iter().map(json_to_qdrant_value).collect(),
        }),
        JsonValue::Object(fields) => ValueKind::StructValue(Struct {
            fields: fields
                .into_iter()
                .map(|(key, value)| (key, json_to_qdrant_value(value)))
                .collect(),
        }),
    };

    qdrant::Value { kind: Some(kind) }
}

fn qdrant_to_json_value(value: qdrant::Value) -> JsonValue {
    match value.kind {
        None | Some(ValueKind::NullValue(_)) => JsonValue::Null,
        Some(ValueKind::BoolValue(value)) => JsonValue::Bool(value),
        Some(ValueKind::IntegerValue(value)) => JsonValue::from(value),
        Some(ValueKind::DoubleValue(value)) => Number::from_f64(value)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Some(ValueKind::StringValue(value)) => JsonValue::String(value),
        Some(ValueKind::ListValue(list)) => {
            JsonValue::Array(list.values.into_iter().map(qdrant_to_json_value).collect())
        }
        Some(ValueKind::StructValue(object)) => JsonValue::Object(qdrant_payload_to_json(object.fields)),
    }
}

fn qdrant_payload_to_json(payload: HashMap<String, qdrant::Value>) -> Map<String, JsonValue> {
    payload
        .into_iter()
        .map(|(key, value)| (key, qdrant_to_json_value(value)))
        .collect()
}
