//! Value types that flow between the indexing core and store backends.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sparse term→weight vector, compared by inner product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector(pub BTreeMap<String, f32>);

impl SparseVector {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Inner product with another sparse vector.
    #[must_use]
    pub fn dot(&self, other: &Self) -> f32 {
        let (small, large) = if self.0.len() <= other.0.len() {
            (&self.0, &other.0)
        } else {
            (&other.0, &self.0)
        };
        small
            .iter()
            .filter_map(|(term, w)| large.get(term).map(|v| w * v))
            .sum()
    }
}

impl FromIterator<(String, f32)> for SparseVector {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Persisted unit in a collection.
///
/// `id` is a pure function of `(relative_path, start_line, end_line,
/// content)`, so re-emitting the same chunk yields the same id and
/// upserts stay idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub relative_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub file_extension: String,
    /// Free-form metadata, serialized as a JSON object string.
    pub metadata: String,
    /// Present only when the collection was created with a sparse field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<SparseVector>,
}

/// Collection schema, anchored by the embedding dimension at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub dimension: usize,
    pub has_sparse: bool,
    pub description: Option<String>,
}

/// A search hit with its relevance score and payload fields.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub relative_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub file_extension: String,
    pub metadata: String,
}

/// Filter over one string-typed field: equality or list membership.
///
/// This is the whole filter grammar the core needs; backends translate
/// it into their native predicate language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: String,
    pub any_of: Vec<String>,
}

impl FieldFilter {
    /// `field == value`
    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            any_of: vec![value.into()],
        }
    }

    /// `field ∈ values`
    #[must_use]
    pub fn one_of(field: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            field: field.into(),
            any_of: values,
        }
    }

    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        self.any_of.iter().any(|v| v == value)
    }
}

/// Parameters for a dense similarity search.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub top_k: usize,
    /// Hits scoring below this are dropped.
    pub threshold: f32,
    /// Read consistency requested from the backend.
    pub consistency: ConsistencyLevel,
}

/// How dense and sparse result lists are fused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ranker {
    /// Reciprocal-rank fusion with constant `k`.
    Rrf { k: f32 },
    /// Weighted sum over per-list normalized scores.
    Weighted { dense: f32, sparse: f32 },
}

impl Default for Ranker {
    fn default() -> Self {
        Self::Rrf { k: 100.0 }
    }
}

impl Ranker {
    /// Short label for observability.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rrf { .. } => "rrf",
            Self::Weighted { .. } => "weight",
        }
    }
}

/// Parameters for a hybrid (dense + sparse) search.
#[derive(Debug, Clone, Copy)]
pub struct HybridOptions {
    pub top_k: usize,
    /// Applied to the fused score.
    pub threshold: f32,
    pub ranker: Ranker,
    /// Read consistency requested from the backend.
    pub consistency: ConsistencyLevel,
}

/// Read consistency requested from backends that distinguish levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyLevel {
    Strong,
    #[default]
    Session,
    Bounded,
    Eventually,
}
