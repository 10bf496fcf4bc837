//! Directory-of-JSON dataset loaders.
//!
//! A JSON dataset is a directory of array files: `train*.json` with the
//! vectors, `test*.json` with the queries, and optional sidecars:
//! `scalar_labels*.json` (`{"id": .., "labels": ".."}`) attaching a label
//! per vector and `neighbors*.json` (`{"id": .., "neighbors_id": [..]}`)
//! carrying ground truth when the test rows do not embed it.
//!
//! The per-dataset variation (field names, which scalars to keep) lives in a
//! [`JsonSchema`] record, one per supported dataset; there is no loader
//! hierarchy. Source ids are 0-based; every id (train, test, neighbor) is
//! shifted by one so they are valid routing keys.

use crate::dataset::{Dataset, DatasetError, Result, TestEntry};
use lattice_core::{ScalarValue, Vector, VectorWithId};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Field mapping for one JSON dataset family.
#[derive(Debug, Clone, Copy)]
pub struct JsonSchema {
    pub name: &'static str,
    pub id_field: &'static str,
    pub vector_field: &'static str,
    /// Scalar fields copied onto the vector when present.
    pub scalar_fields: &'static [&'static str],
}

pub const WIKIPEDIA_2212: JsonSchema = JsonSchema {
    name: "wikipedia2212",
    id_field: "id",
    vector_field: "emb",
    scalar_fields: &["title", "text", "url", "wiki_id", "paragraph_id"],
};

pub const MIRACL: JsonSchema = JsonSchema {
    name: "miracl",
    id_field: "id",
    vector_field: "emb",
    scalar_fields: &["docid", "title", "text"],
};

pub const BIOASQ: JsonSchema = JsonSchema {
    name: "bioasq",
    id_field: "id",
    vector_field: "emb",
    scalar_fields: &["title", "text"],
};

pub const OPENAI_LARGE: JsonSchema = JsonSchema {
    name: "openai_large",
    id_field: "id",
    vector_field: "emb",
    scalar_fields: &["title", "text"],
};

/// Loader for one dataset directory.
pub struct JsonDataset {
    dirpath: PathBuf,
    schema: JsonSchema,

    train_files: Vec<PathBuf>,
    test_files: Vec<PathBuf>,
    scalar_labels: HashMap<i64, String>,
    neighbors: HashMap<i64, Vec<i64>>,

    dimension: u32,
    train_count: u32,
    test_count: u32,

    next_train_file: usize,
    buffer: VecDeque<VectorWithId>,
}

impl JsonDataset {
    pub fn new(dirpath: impl Into<PathBuf>, schema: JsonSchema) -> Self {
        Self {
            dirpath: dirpath.into(),
            schema,
            train_files: Vec::new(),
            test_files: Vec::new(),
            scalar_labels: HashMap::new(),
            neighbors: HashMap::new(),
            dimension: 0,
            train_count: 0,
            test_count: 0,
            next_train_file: 0,
            buffer: VecDeque::new(),
        }
    }

    pub fn wikipedia2212(dirpath: impl Into<PathBuf>) -> Self {
        Self::new(dirpath, WIKIPEDIA_2212)
    }

    pub fn miracl(dirpath: impl Into<PathBuf>) -> Self {
        Self::new(dirpath, MIRACL)
    }

    pub fn bioasq(dirpath: impl Into<PathBuf>) -> Self {
        Self::new(dirpath, BIOASQ)
    }

    pub fn openai_large(dirpath: impl Into<PathBuf>) -> Self {
        Self::new(dirpath, OPENAI_LARGE)
    }

    /// Creates a loader by dataset name.
    pub fn by_name(name: &str, dirpath: impl Into<PathBuf>) -> Option<Self> {
        let schema = match name {
            "wikipedia2212" => WIKIPEDIA_2212,
            "miracl" => MIRACL,
            "bioasq" => BIOASQ,
            "openai_large" => OPENAI_LARGE,
            _ => return None,
        };
        Some(Self::new(dirpath, schema))
    }

    fn read_array(path: &Path) -> Result<Vec<Value>> {
        let contents = std::fs::read_to_string(path)?;
        let value: Value =
            serde_json::from_str(&contents).map_err(|source| DatasetError::Json {
                file: path.display().to_string(),
                source,
            })?;
        match value {
            Value::Array(rows) => Ok(rows),
            _ => Err(DatasetError::MissingField {
                field: "<top-level array>".to_string(),
                file: path.display().to_string(),
            }),
        }
    }

    fn parse_row(&self, obj: &Value, file: &Path) -> Result<VectorWithId> {
        let missing = |field: &str| DatasetError::MissingField {
            field: field.to_string(),
            file: file.display().to_string(),
        };

        let raw_id = obj
            .get(self.schema.id_field)
            .and_then(Value::as_i64)
            .ok_or_else(|| missing(self.schema.id_field))?;
        // Source ids are 0-based; routing ids must be positive.
        let id = raw_id + 1;

        let values = obj
            .get(self.schema.vector_field)
            .and_then(Value::as_array)
            .ok_or_else(|| missing(self.schema.vector_field))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect::<Vec<f32>>();

        let mut vector_with_id = VectorWithId::new(id, Vector::from_floats(values));

        for &field in self.schema.scalar_fields {
            if let Some(value) = obj.get(field) {
                if let Some(scalar) = json_scalar(value) {
                    vector_with_id.scalar_data.insert(field.to_string(), scalar);
                }
            }
        }
        if let Some(label) = self.scalar_labels.get(&id) {
            vector_with_id
                .scalar_data
                .insert("labels".to_string(), ScalarValue::from(label.as_str()));
        }

        Ok(vector_with_id)
    }

    fn parse_test_entry(&self, obj: &Value, file: &Path) -> Result<TestEntry> {
        let vector_with_id = self.parse_row(obj, file)?;
        let id = vector_with_id.id;

        let mut neighbors = HashMap::new();
        if let Some(embedded) = obj.get("neighbors").and_then(Value::as_array) {
            for n in embedded {
                if let (Some(nid), Some(distance)) = (
                    n.get("id").and_then(Value::as_i64),
                    n.get("distance").and_then(Value::as_f64),
                ) {
                    neighbors.insert(nid + 1, distance as f32);
                }
            }
        } else if let Some(ids) = self.neighbors.get(&id) {
            for &nid in ids {
                neighbors.insert(nid, 0.0);
            }
        }

        let filter_json = match self.scalar_labels.get(&id) {
            Some(label) => format!(
                r#"{{"type":"comparison","comparator":"eq","attribute":"labels","value":"{label}"}}"#
            ),
            None => String::new(),
        };

        let filter_vector_ids = obj
            .get("filter_vector_ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_i64).map(|i| i + 1).collect())
            .unwrap_or_default();

        Ok(TestEntry {
            vector_with_id,
            neighbors,
            filter_json,
            filter_vector_ids,
        })
    }

    fn load_sidecars(&mut self, label_files: &[PathBuf], neighbor_files: &[PathBuf]) -> Result<()> {
        for path in label_files {
            for row in Self::read_array(path)? {
                if let (Some(id), Some(label)) = (
                    row.get("id").and_then(Value::as_i64),
                    row.get("labels").and_then(Value::as_str),
                ) {
                    self.scalar_labels.insert(id + 1, label.to_string());
                }
            }
        }
        for path in neighbor_files {
            for row in Self::read_array(path)? {
                if let (Some(id), Some(ids)) = (
                    row.get("id").and_then(Value::as_i64),
                    row.get("neighbors_id").and_then(Value::as_array),
                ) {
                    self.neighbors.insert(
                        id + 1,
                        ids.iter().filter_map(Value::as_i64).map(|i| i + 1).collect(),
                    );
                }
            }
        }
        Ok(())
    }
}

/// Maps a JSON value onto a scalar attribute; arrays and objects are
/// skipped.
fn json_scalar(value: &Value) -> Option<ScalarValue> {
    match value {
        Value::Bool(b) => Some(ScalarValue::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(ScalarValue::from(i))
            } else {
                n.as_f64().map(ScalarValue::from)
            }
        }
        Value::String(s) => Some(ScalarValue::from(s.as_str())),
        _ => None,
    }
}

impl Dataset for JsonDataset {
    fn init(&mut self) -> Result<()> {
        let mut label_files = Vec::new();
        let mut neighbor_files = Vec::new();

        for entry in std::fs::read_dir(&self.dirpath)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".json") {
                continue;
            }
            if name.starts_with("train") {
                self.train_files.push(path);
            } else if name.starts_with("test") {
                self.test_files.push(path);
            } else if name.starts_with("scalar_labels") {
                label_files.push(path);
            } else if name.starts_with("neighbors") {
                neighbor_files.push(path);
            }
        }
        self.train_files.sort();
        self.test_files.sort();

        if self.train_files.is_empty() {
            return Err(DatasetError::Empty("train"));
        }
        if self.test_files.is_empty() {
            return Err(DatasetError::Empty("test"));
        }

        self.load_sidecars(&label_files, &neighbor_files)?;

        // One counting pass so the driver can size progress reporting; the
        // dimension comes from the first train row.
        for path in &self.train_files.clone() {
            let rows = Self::read_array(path)?;
            if self.dimension == 0 {
                if let Some(first) = rows.first() {
                    let row = self.parse_row(first, path)?;
                    self.dimension = row.vector.dimension;
                }
            }
            self.train_count += rows.len() as u32;
        }
        for path in &self.test_files {
            self.test_count += Self::read_array(path)?.len() as u32;
        }

        info!(
            dataset = self.schema.name,
            train = self.train_count,
            test = self.test_count,
            dimension = self.dimension,
            labels = self.scalar_labels.len(),
            "json dataset initialized"
        );
        Ok(())
    }

    fn dimension(&self) -> u32 {
        self.dimension
    }

    fn train_count(&self) -> u32 {
        self.train_count
    }

    fn test_count(&self) -> u32 {
        self.test_count
    }

    fn next_batch(&mut self, batch_size: u32) -> Result<(Vec<VectorWithId>, bool)> {
        while self.buffer.len() < batch_size as usize && self.next_train_file < self.train_files.len()
        {
            let path = self.train_files[self.next_train_file].clone();
            self.next_train_file += 1;
            debug!(file = %path.display(), "loading train file");
            for row in Self::read_array(&path)? {
                let parsed = self.parse_row(&row, &path)?;
                self.buffer.push_back(parsed);
            }
        }

        let take = (batch_size as usize).min(self.buffer.len());
        let batch: Vec<VectorWithId> = self.buffer.drain(..take).collect();
        let eof = self.buffer.is_empty() && self.next_train_file == self.train_files.len();
        Ok((batch, eof))
    }

    fn test_data(&mut self) -> Result<Vec<TestEntry>> {
        let mut entries = Vec::new();
        for path in &self.test_files.clone() {
            for row in Self::read_array(path)? {
                entries.push(self.parse_test_entry(&row, path)?);
            }
        }
        Ok(entries)
    }

    fn kind(&self) -> &'static str {
        self.schema.name
    }
}

// =============================================================================
// Tests
// =============================================================================
