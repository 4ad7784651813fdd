//! Annotation content kind.
//!
//! Annotation tiles are JSON documents:
//!
//! ```json
//! {"annotations": [
//!     {"id": "lane-7", "kind": "lane", "points": [[e, n, a], ...], "properties": {...}}
//! ]}
//! ```
//!
//! Geometry arrives in world coordinates. An annotation spanning several
//! tiles is listed by each of them and kept once per aggregate.

use std::collections::HashSet;

use glam::{DVec3, Vec3};
use serde::Deserialize;

use super::{ContentKind, DecodeError, DecodeFailurePolicy, TileContext};
use crate::grid::BoundingBox;
use crate::source::ContentType;

/// One decoded annotation with local-frame geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    pub id: String,
    pub kind: String,
    pub points: Vec<Vec3>,
    pub properties: serde_json::Value,
}

/// Merged annotations of one aggregate, unique by id.
#[derive(Debug, Clone, Default)]
pub struct AnnotationContents {
    records: Vec<AnnotationRecord>,
    ids: HashSet<String>,
}

impl AnnotationContents {
    pub fn records(&self) -> &[AnnotationRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&AnnotationRecord> {
        self.records.iter().find(|record| record.id == id)
    }
}

#[derive(Deserialize)]
struct WireDocument {
    #[serde(default)]
    annotations: Vec<WireAnnotation>,
}

#[derive(Deserialize)]
struct WireAnnotation {
    id: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    points: Vec<[f64; 3]>,
    #[serde(default)]
    properties: serde_json::Value,
}

/// Decodes JSON annotation tiles.
#[derive(Debug, Clone, Default)]
pub struct AnnotationKind {
    failure_policy: DecodeFailurePolicy,
}

impl AnnotationKind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose whether one malformed tile fails the whole aggregate.
    pub fn with_failure_policy(mut self, policy: DecodeFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

impl ContentKind for AnnotationKind {
    type Record = AnnotationRecord;
    type Contents = AnnotationContents;

    fn content_type(&self) -> ContentType {
        ContentType::Annotation
    }

    fn decode(
        &self,
        context: &TileContext,
        bytes: &[u8],
    ) -> Result<Vec<AnnotationRecord>, DecodeError> {
        let document: WireDocument = serde_json::from_slice(bytes)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;

        document
            .annotations
            .into_iter()
            .map(|annotation| {
                let points = annotation
                    .points
                    .iter()
                    .map(|[e, n, a]| {
                        context
                            .coordinate_system
                            .world_to_local(DVec3::new(*e, *n, *a))
                            .map(|local| local.as_vec3())
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(AnnotationRecord {
                    id: annotation.id,
                    kind: annotation.kind,
                    points,
                    properties: annotation.properties,
                })
            })
            .collect()
    }

    fn merge(&self, contents: &mut AnnotationContents, records: &[AnnotationRecord]) {
        for record in records {
            if contents.ids.insert(record.id.clone()) {
                contents.records.push(record.clone());
            }
        }
    }

    fn object_count(&self, contents: &AnnotationContents) -> usize {
        contents.records.len()
    }

    fn contents_bounds(&self, _contents: &AnnotationContents) -> Option<BoundingBox> {
        None
    }

    fn decode_failure_policy(&self) -> DecodeFailurePolicy {
        self.failure_policy
    }
}
