//! Qdrant vector database integration
//!
//! This module wraps the Qdrant client and provides:
//! - Collection management
//! - Batch upsert of frame feature records
//! - Top-k similarity search by vector

mod payload;

pub use payload::*;

use crate::config::{Config, MAX_TOP_K};
use crate::error::{Error, Result};
use crate::models::{FeatureRecord, SimilarityResult};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, GetCollectionInfoResponse, PointId, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Operations the indexing pipeline and query boundary need from a vector engine
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimensionality every stored and queried vector must have
    fn dimension(&self) -> usize;

    /// Create the collection (cosine metric) if it does not exist yet
    async fn ensure_collection(&self) -> Result<()>;

    /// Store a batch under freshly generated ids; all or nothing from the caller's view
    async fn upsert(&self, records: Vec<FeatureRecord>) -> Result<Vec<Uuid>>;

    /// Up to `top_k` records ranked by decreasing similarity
    async fn search(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<SimilarityResult>>;
}

/// Reject vectors whose length differs from the collection's
pub fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::DimensionMismatch { expected, actual })
    }
}

/// Enforce `1 <= top_k <= max`
pub fn check_top_k(top_k: usize, max: usize) -> Result<()> {
    let max = max.min(MAX_TOP_K);
    if (1..=max).contains(&top_k) {
        Ok(())
    } else {
        Err(Error::InvalidTopK { value: top_k, max })
    }
}

/// Information about a Qdrant collection
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub indexed_vectors_count: u64,
    pub status: String,
}

/// Qdrant store handle
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Connect to Qdrant using config
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(
            &config.qdrant_url,
            config.qdrant_api_key(),
            &config.collection_name,
            config.vector_dim,
        )
        .await
    }

    /// Create a new store connection directly with URL and collection name
    pub async fn new(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        dimension: usize,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Reset the collection (delete and recreate)
    pub async fn reset_collection(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            info!("Deleting existing collection {}", self.collection);
            self.client.delete_collection(&self.collection).await?;
        }

        self.ensure_collection().await
    }

    /// Get collection info (point count, etc)
    pub async fn get_collection_info(&self) -> Result<Option<CollectionInfo>> {
        if !self.client.collection_exists(&self.collection).await? {
            return Ok(None);
        }

        let info = self.client.collection_info(&self.collection).await?;
        Ok(info.result.map(|result| CollectionInfo {
            points_count: result.points_count.unwrap_or(0),
            indexed_vectors_count: result.indexed_vectors_count.unwrap_or(0),
            status: format!("{:?}", result.status()),
        }))
    }

    async fn collection_vector_size(&self) -> Result<Option<u64>> {
        let info = self.client.collection_info(&self.collection).await?;
        Ok(extract_vector_size(&info))
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn ensure_collection(&self) -> Result<()> {
        if self.client.collection_exists(&self.collection).await? {
            debug!("Collection {} already exists", self.collection);

            if let Some(size) = self.collection_vector_size().await? {
                if size as usize != self.dimension {
                    return Err(Error::Qdrant(format!(
                        "Collection '{}' has vector size {}, but config expects {}. Remediation: set a new collection name or reset the collection.",
                        self.collection, size, self.dimension
                    )));
                }
            }

            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, self.dimension
        );

        let created = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                ),
            )
            .await;

        if let Err(e) = created {
            // Another caller may have created it between the check and the create
            if self.client.collection_exists(&self.collection).await? {
                debug!("Collection {} created concurrently", self.collection);
                return Ok(());
            }
            return Err(e.into());
        }

        info!("Collection {} created successfully", self.collection);
        Ok(())
    }

    async fn upsert(&self, records: Vec<FeatureRecord>) -> Result<Vec<Uuid>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        for record in &records {
            check_dimension(self.dimension, record.vector.len())?;
        }

        debug!(
            "Upserting {} points to collection {}",
            records.len(),
            self.collection
        );

        let points: Vec<FramePoint> = records.into_iter().map(FramePoint::from_record).collect();
        let ids: Vec<Uuid> = points.iter().map(|p| p.id).collect();
        let point_structs: Vec<PointStruct> =
            points.into_iter().map(FramePoint::to_point_struct).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, point_structs).wait(true))
            .await
            .map_err(|e| Error::IndexInsertFailed(e.to_string()))?;

        Ok(ids)
    }

    async fn search(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<SimilarityResult>> {
        check_dimension(self.dimension, vector.len())?;
        check_top_k(top_k, MAX_TOP_K)?;

        debug!(
            "Searching collection {} with limit {}",
            self.collection, top_k
        );

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, top_k as u64).with_payload(true),
            )
            .await?;

        let results = response
            .result
            .into_iter()
            .filter_map(|p| {
                let id = point_id_to_string(p.id);
                match metadata_from_qdrant_payload(p.payload) {
                    Some(metadata) => Some(SimilarityResult {
                        id,
                        score: p.score,
                        metadata,
                    }),
                    None => {
                        warn!(point = %id, "Skipping point with unrecognised payload");
                        None
                    }
                }
            })
            .collect();

        Ok(results)
    }
}

fn extract_vector_size(info: &GetCollectionInfoResponse) -> Option<u64> {
    let result = info.result.as_ref()?;
    let config = result.config.as_ref()?;
    let params = config.params.as_ref()?;
    let vectors_config = params.vectors_config.as_ref()?;

    match vectors_config.config.as_ref()? {
        qdrant_client::qdrant::vectors_config::Config::Params(params) => Some(params.size),
        qdrant_client::qdrant::vectors_config::Config::ParamsMap(_) => None,
    }
}

/// Convert PointId to string
fn point_id_to_string(id: Option<PointId>) -> String {
    match id {
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(uuid)),
        }) => uuid,
        Some(PointId {
            point_id_options: Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(num)),
        }) => num.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory vector index used to exercise callers without a Qdrant server

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub struct MemoryIndex {
        dimension: usize,
        points: Mutex<Vec<(Uuid, FeatureRecord)>>,
        collection_ready: Mutex<bool>,
        pub upsert_calls: AtomicUsize,
        pub collections_created: AtomicUsize,
        pub fail_upserts: bool,
        pub offline: bool,
    }

    impl MemoryIndex {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
                points: Mutex::new(Vec::new()),
                collection_ready: Mutex::new(false),
                upsert_calls: AtomicUsize::new(0),
                collections_created: AtomicUsize::new(0),
                fail_upserts: false,
                offline: false,
            }
        }

        /// Every call fails as if the server were down
        pub fn offline(dimension: usize) -> Self {
            Self {
                offline: true,
                fail_upserts: true,
                ..Self::new(dimension)
            }
        }

        pub fn collections_created(&self) -> usize {
            self.collections_created.load(Ordering::SeqCst)
        }

        pub fn failing(dimension: usize) -> Self {
            Self {
                fail_upserts: true,
                ..Self::new(dimension)
            }
        }

        pub fn len(&self) -> usize {
            self.points.lock().unwrap().len()
        }

        pub fn upserts(&self) -> usize {
            self.upsert_calls.load(Ordering::SeqCst)
        }
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if na == 0.0 || nb == 0.0 {
            0.0
        } else {
            dot / (na * nb)
        }
    }

    #[async_trait]
    impl VectorIndex for MemoryIndex {
        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn ensure_collection(&self) -> Result<()> {
            if self.offline {
                return Err(Error::Qdrant("connection refused".to_string()));
            }
            let mut ready = self.collection_ready.lock().unwrap();
            if !*ready {
                *ready = true;
                self.collections_created.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn upsert(&self, records: Vec<FeatureRecord>) -> Result<Vec<Uuid>> {
            self.upsert_calls.fetch_add(1, Ordering::SeqCst);
            for record in &records {
                check_dimension(self.dimension, record.vector.len())?;
            }
            if self.fail_upserts {
                return Err(Error::IndexInsertFailed("store unavailable".to_string()));
            }

            let mut points = self.points.lock().unwrap();
            let mut ids = Vec::with_capacity(records.len());
            for record in records {
                let point = FramePoint::from_record(record);
                ids.push(point.id);
                points.push((
                    point.id,
                    FeatureRecord {
                        vector: point.vector,
                        metadata: point.metadata,
                    },
                ));
            }
            Ok(ids)
        }

        async fn search(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<SimilarityResult>> {
            check_dimension(self.dimension, vector.len())?;
            check_top_k(top_k, MAX_TOP_K)?;

            let points = self.points.lock().unwrap();
            let mut scored: Vec<SimilarityResult> = points
                .iter()
                .map(|(id, record)| SimilarityResult {
                    id: id.to_string(),
                    score: cosine(&vector, &record.vector),
                    metadata: record.metadata.clone(),
                })
                .collect();
            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            scored.truncate(top_k);
            Ok(scored)
        }
    }
}
