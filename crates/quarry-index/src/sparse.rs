//! Sparse term→weight encoding for hybrid search.

use quarry_store::SparseVector;

/// Produces the sparse side of a hybrid query or document.
pub trait SparseEncoder: Send + Sync {
    fn encode(&self, text: &str) -> SparseVector;
}

/// BM25-flavored term-frequency saturation
const DEFAULT_K1: f32 = 1.2;

/// Default encoder: lowercased identifier-aware tokens weighted by
/// saturated term frequency `tf / (tf + k1)`.
///
/// No corpus statistics are kept; the inner product against document
/// vectors built the same way behaves like an idf-free BM25.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Encoder {
    k1: f32,
}

impl Default for Bm25Encoder {
    fn default() -> Self {
        Self { k1: DEFAULT_K1 }
    }
}

impl Bm25Encoder {
    #[must_use]
    pub fn new(k1: f32) -> Self {
        Self { k1 }
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() > 1)
        .map(String::from)
        .collect::<Vec<_>>()
        .into_iter()
}

impl SparseEncoder for Bm25Encoder {
    fn encode(&self, text: &str) -> SparseVector {
        let mut frequencies: std::collections::BTreeMap<String, f32> =
            std::collections::BTreeMap::new();
        for token in tokenize(text) {
            *frequencies.entry(token).or_default() += 1.0;
        }
        frequencies
            .into_iter()
            .map(|(term, tf)| (term, tf / (tf + self.k1)))
            .collect()
    }
}
