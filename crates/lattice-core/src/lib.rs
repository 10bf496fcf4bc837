//! # Lattice Core
//!
//! Core data model for the LatticeDB client SDK.
//!
//! This crate provides the fundamental building blocks shared by the client
//! and the benchmark harness:
//! - [`Vector`], [`VectorWithId`], [`VectorWithDistance`] - vector payloads
//! - [`ScalarValue`] - schema-flexible scalar attributes attached to vectors
//! - [`Document`] - id-keyed document rows returned by batch queries
//! - [`IndexKind`], [`ScalarSchema`] - index descriptor vocabulary

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of a logical index.
pub type IndexId = i64;

/// Identifier of a partition within an index.
pub type PartitionId = i64;

/// Identifier of a region (a physical shard serving a key range).
pub type RegionId = i64;

// =============================================================================
// Errors
// =============================================================================

/// Validation errors for the core data model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The payload length does not match the declared dimension.
    #[error("payload length {len} does not match dimension {dimension}")]
    DimensionMismatch { dimension: u32, len: usize },

    /// The populated payload field does not match the value type.
    #[error("payload does not match value type {0}")]
    PayloadMismatch(ValueType),

    /// A scalar field does not match its declared field type.
    #[error("scalar field does not match declared type {0}")]
    ScalarTypeMismatch(ScalarFieldType),
}

// =============================================================================
// Value and metric types
// =============================================================================

/// Element type of a vector payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ValueType {
    /// 32-bit float elements, carried in `float_values`.
    #[default]
    Float,
    /// Unsigned byte elements, carried in `binary_values`.
    Uint8,
    /// Signed byte elements, carried in `binary_values`.
    Int8,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Float => write!(f, "float"),
            ValueType::Uint8 => write!(f, "uint8"),
            ValueType::Int8 => write!(f, "int8"),
        }
    }
}

/// Distance metric reported with search results.
///
/// Results are ordered ascending by distance for every metric; the server is
/// responsible for the sign convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MetricType {
    #[default]
    None,
    L2,
    InnerProduct,
    Cosine,
    Hamming,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricType::None => write!(f, "none"),
            MetricType::L2 => write!(f, "l2"),
            MetricType::InnerProduct => write!(f, "inner_product"),
            MetricType::Cosine => write!(f, "cosine"),
            MetricType::Hamming => write!(f, "hamming"),
        }
    }
}

// =============================================================================
// Scalar values
// =============================================================================

/// Declared type of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarFieldType {
    Bool,
    Int64,
    Double,
    String,
}

impl fmt::Display for ScalarFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarFieldType::Bool => write!(f, "bool"),
            ScalarFieldType::Int64 => write!(f, "int64"),
            ScalarFieldType::Double => write!(f, "double"),
            ScalarFieldType::String => write!(f, "string"),
        }
    }
}

/// A single scalar field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarField {
    Bool(bool),
    Int64(i64),
    Double(f64),
    String(String),
}

impl ScalarField {
    /// Returns the field type this value belongs to.
    pub fn field_type(&self) -> ScalarFieldType {
        match self {
            ScalarField::Bool(_) => ScalarFieldType::Bool,
            ScalarField::Int64(_) => ScalarFieldType::Int64,
            ScalarField::Double(_) => ScalarFieldType::Double,
            ScalarField::String(_) => ScalarFieldType::String,
        }
    }
}

/// A typed, possibly multi-valued scalar attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarValue {
    pub field_type: ScalarFieldType,
    pub fields: Vec<ScalarField>,
}

impl ScalarValue {
    /// Creates a single-valued scalar.
    pub fn single(field: ScalarField) -> Self {
        Self {
            field_type: field.field_type(),
            fields: vec![field],
        }
    }

    /// Checks that every field matches the declared type.
    pub fn validate(&self) -> Result<(), ModelError> {
        for field in &self.fields {
            if field.field_type() != self.field_type {
                return Err(ModelError::ScalarTypeMismatch(self.field_type));
            }
        }
        Ok(())
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        Self::single(ScalarField::Bool(v))
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        Self::single(ScalarField::Int64(v))
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        Self::single(ScalarField::Double(v))
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        Self::single(ScalarField::String(v.to_string()))
    }
}

// =============================================================================
// Vectors
// =============================================================================

/// A raw vector payload.
///
/// Exactly one of `float_values` / `binary_values` carries the payload,
/// matching `value_type`. For binary payloads one byte is one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Vector {
    pub dimension: u32,
    pub value_type: ValueType,
    pub float_values: Vec<f32>,
    pub binary_values: Vec<u8>,
    /// Auxiliary scalar attributes carried with the raw payload.
    #[serde(default)]
    pub scalar_data: HashMap<String, ScalarValue>,
}

impl Vector {
    /// Creates a float vector; dimension is taken from the payload length.
    pub fn from_floats(values: Vec<f32>) -> Self {
        Self {
            dimension: values.len() as u32,
            value_type: ValueType::Float,
            float_values: values,
            binary_values: Vec::new(),
            scalar_data: HashMap::new(),
        }
    }

    /// Creates a binary vector with the given element type.
    pub fn from_bytes(value_type: ValueType, values: Vec<u8>) -> Self {
        Self {
            dimension: values.len() as u32,
            value_type,
            float_values: Vec::new(),
            binary_values: values,
            scalar_data: HashMap::new(),
        }
    }

    /// Checks payload/value-type/dimension consistency.
    pub fn validate(&self) -> Result<(), ModelError> {
        let (len, other_empty) = match self.value_type {
            ValueType::Float => (self.float_values.len(), self.binary_values.is_empty()),
            ValueType::Uint8 | ValueType::Int8 => {
                (self.binary_values.len(), self.float_values.is_empty())
            }
        };
        if !other_empty {
            return Err(ModelError::PayloadMismatch(self.value_type));
        }
        if len != self.dimension as usize {
            return Err(ModelError::DimensionMismatch {
                dimension: self.dimension,
                len,
            });
        }
        Ok(())
    }
}

/// A vector with its primary key.
///
/// The `id` is the routing key; valid ids are strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VectorWithId {
    pub id: i64,
    pub vector: Vector,
    #[serde(default)]
    pub scalar_data: HashMap<String, ScalarValue>,
}

impl VectorWithId {
    pub fn new(id: i64, vector: Vector) -> Self {
        Self {
            id,
            vector,
            scalar_data: HashMap::new(),
        }
    }

    /// Attaches a scalar attribute.
    pub fn with_scalar(mut self, key: impl Into<String>, value: ScalarValue) -> Self {
        self.scalar_data.insert(key.into(), value);
        self
    }
}

/// A search hit: a vector plus its distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorWithDistance {
    pub vector_data: VectorWithId,
    pub distance: f32,
    pub metric: MetricType,
}

/// Per-query search output: the echoed query vector and its sorted hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SearchResult {
    /// A copy of the input vector (payload only; the id is not meaningful).
    pub query_vector: VectorWithId,
    /// Hits sorted ascending by distance.
    pub hits: Vec<VectorWithDistance>,
}

// =============================================================================
// Documents
// =============================================================================

/// An id-keyed document row returned by batch queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    pub id: i64,
    #[serde(default)]
    pub fields: HashMap<String, ScalarValue>,
}

impl Document {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            fields: HashMap::new(),
        }
    }
}

// =============================================================================
// Index vocabulary
// =============================================================================

/// Kind of vector index behind a logical index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IndexKind {
    /// Unset; rejected by parameter building.
    #[default]
    None,
    Flat,
    IvfFlat,
    IvfPq,
    Hnsw,
    DiskAnn,
    BruteForce,
    BinaryFlat,
    BinaryIvfFlat,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexKind::None => "none",
            IndexKind::Flat => "flat",
            IndexKind::IvfFlat => "ivf_flat",
            IndexKind::IvfPq => "ivf_pq",
            IndexKind::Hnsw => "hnsw",
            IndexKind::DiskAnn => "diskann",
            IndexKind::BruteForce => "brute_force",
            IndexKind::BinaryFlat => "binary_flat",
            IndexKind::BinaryIvfFlat => "binary_ivf_flat",
        };
        write!(f, "{name}")
    }
}

/// One column of an index's scalar schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarColumn {
    pub key: String,
    pub field_type: ScalarFieldType,
    /// Whether the column is indexed for fast filtering.
    pub speed: bool,
}

/// Scalar schema attached to an index descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScalarSchema {
    pub cols: Vec<ScalarColumn>,
}

impl ScalarSchema {
    /// Looks up a column by key.
    pub fn column(&self, key: &str) -> Option<&ScalarColumn> {
        self.cols.iter().find(|c| c.key == key)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_vector_validate() {
        let v = Vector::from_floats(vec![0.1, 0.2, 0.3]);
        assert_eq!(v.dimension, 3);
        assert!(v.validate().is_ok());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut v = Vector::from_floats(vec![0.1, 0.2]);
        v.dimension = 3;
        assert_eq!(
            v.validate(),
            Err(ModelError::DimensionMismatch {
                dimension: 3,
                len: 2
            })
        );
    }

    #[test]
    fn test_payload_mismatch() {
        let mut v = Vector::from_floats(vec![0.1, 0.2]);
        v.binary_values = vec![1];
        assert_eq!(v.validate(), Err(ModelError::PayloadMismatch(ValueType::Float)));
    }

    #[test]
    fn test_binary_vector_validate() {
        let v = Vector::from_bytes(ValueType::Uint8, vec![1, 2, 3, 4]);
        assert_eq!(v.dimension, 4);
        assert!(v.validate().is_ok());
    }

    #[test]
    fn test_scalar_value_validate() {
        let ok = ScalarValue::from(42i64);
        assert!(ok.validate().is_ok());

        let bad = ScalarValue {
            field_type: ScalarFieldType::Bool,
            fields: vec![ScalarField::Int64(1)],
        };
        assert_eq!(
            bad.validate(),
            Err(ModelError::ScalarTypeMismatch(ScalarFieldType::Bool))
        );
    }

    #[test]
    fn test_scalar_schema_lookup() {
        let schema = ScalarSchema {
            cols: vec![ScalarColumn {
                key: "color".to_string(),
                field_type: ScalarFieldType::String,
                speed: true,
            }],
        };
        assert!(schema.column("color").is_some());
        assert!(schema.column("size").is_none());
    }

    #[test]
    fn test_index_kind_display() {
        assert_eq!(IndexKind::IvfPq.to_string(), "ivf_pq");
        assert_eq!(IndexKind::DiskAnn.to_string(), "diskann");
    }
}
