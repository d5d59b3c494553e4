//! AST-aware code indexing and semantic retrieval.
//!
//! A codebase is carved into chunks along AST boundaries, embedded in
//! batches, and upserted into a vector collection named after the
//! codebase path. A per-codebase snapshot of content hashes drives
//! incremental re-indexing, and the query planner serves dense or
//! hybrid (dense + sparse) search with dense-only fallback.
//!
//! The embedding provider and the vector database are abstract
//! collaborators; see the `quarry-embed` and `quarry-store` crates.

pub mod collection;
pub mod config;
pub mod enrich;
pub mod error;
pub mod ignore;
pub mod languages;
pub mod pipeline;
pub mod progress;
pub mod search;
pub mod sparse;
pub mod splitter;
pub mod sync;

pub use collection::{CollectionManager, collection_name};
pub use config::{IndexConfig, RankerConfig, RankerType};
pub use enrich::{ChunkTransform, ContextualTransform};
pub use error::{IndexError, Result};
pub use ignore::IgnoreEngine;
pub use languages::{Lang, NodeKind, detect_language};
pub use pipeline::{ChangeStats, Indexer, IndexStats, RunStatus, chunk_id};
pub use progress::{ProgressReporter, ProgressUpdate, TracingProgress};
pub use search::{QueryPlanner, SearchResult};
pub use sparse::{Bm25Encoder, SparseEncoder};
pub use splitter::{AstSplitter, CodeChunk};
pub use sync::{FileDelta, FileSynchronizer, Snapshot};
