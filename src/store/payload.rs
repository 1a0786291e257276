//! Payload schema for Qdrant points

use crate::models::{FeatureRecord, FrameMetadata};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// A frame point ready to be upserted to Qdrant
#[derive(Debug, Clone)]
pub struct FramePoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub metadata: FrameMetadata,
}

impl FramePoint {
    /// Give a record a fresh identity; ids are never reused or looked up
    pub fn from_record(record: FeatureRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            vector: record.vector,
            metadata: record.metadata,
        }
    }

    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        let payload = metadata_to_qdrant_payload(&self.metadata);
        PointStruct::new(self.id.to_string(), self.vector, payload)
    }
}

/// Convert frame metadata to Qdrant payload format
pub fn metadata_to_qdrant_payload(meta: &FrameMetadata) -> HashMap<String, QdrantValue> {
    let mut map = HashMap::new();

    map.insert("image_path".to_string(), string_to_qdrant(&meta.image_path));
    map.insert(
        "frame_timestamp".to_string(),
        double_to_qdrant(meta.frame_timestamp),
    );
    map.insert(
        "video_filename".to_string(),
        string_to_qdrant(&meta.video_filename),
    );
    map.insert(
        "upload_timestamp".to_string(),
        string_to_qdrant(&meta.upload_timestamp),
    );

    if let Some(ref video_id) = meta.video_id {
        map.insert("video_id".to_string(), string_to_qdrant(video_id));
    }

    if let Some(index) = meta.frame_index {
        map.insert("frame_index".to_string(), int_to_qdrant(index as i64));
    }

    map
}

/// Rebuild typed metadata from a stored payload; `None` if fields are missing
pub fn metadata_from_qdrant_payload(
    payload: HashMap<String, QdrantValue>,
) -> Option<FrameMetadata> {
    let map: Map<String, Value> = payload
        .into_iter()
        .map(|(k, v)| (k, json_from_qdrant_value(v)))
        .collect();
    serde_json::from_value(Value::Object(map)).ok()
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(Kind::StringValue(s.to_string())),
    }
}

fn double_to_qdrant(d: f64) -> QdrantValue {
    QdrantValue {
        kind: Some(Kind::DoubleValue(d)),
    }
}

fn int_to_qdrant(i: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(Kind::IntegerValue(i)),
    }
}

/// Convert Qdrant value to serde_json Value
fn json_from_qdrant_value(v: QdrantValue) -> Value {
    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> FrameMetadata {
        FrameMetadata {
            image_path: "/frames/clip_1/frame_30.jpg".to_string(),
            frame_timestamp: 1.0,
            video_filename: "clip.mp4".to_string(),
            upload_timestamp: "2024-01-01T00:00:00+00:00".to_string(),
            video_id: Some("clip_1".to_string()),
            frame_index: Some(30),
        }
    }

    #[test]
    fn test_payload_carries_named_fields() {
        let payload = metadata_to_qdrant_payload(&sample_metadata());
        assert_eq!(payload.len(), 6);
        assert_eq!(
            payload["frame_timestamp"].kind,
            Some(Kind::DoubleValue(1.0))
        );
        assert_eq!(payload["frame_index"].kind, Some(Kind::IntegerValue(30)));
    }

    #[test]
    fn test_payload_restores_metadata() {
        let meta = sample_metadata();
        let restored = metadata_from_qdrant_payload(metadata_to_qdrant_payload(&meta)).unwrap();
        assert_eq!(restored, meta);
    }

    #[test]
    fn test_foreign_payload_is_rejected() {
        let mut payload = HashMap::new();
        payload.insert("source_id".to_string(), string_to_qdrant("abc"));
        assert!(metadata_from_qdrant_payload(payload).is_none());
    }

    #[test]
    fn test_points_get_fresh_ids() {
        let record = FeatureRecord {
            vector: vec![1.0, 0.0],
            metadata: sample_metadata(),
        };
        let a = FramePoint::from_record(record.clone());
        let b = FramePoint::from_record(record);
        assert_ne!(a.id, b.id);
    }
}
