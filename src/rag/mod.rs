//! Retrieval side of the pipeline.
//!
//! - `Chunker`: splits scraped pages into overlapping chunks
//! - `VectorStore` / `SqliteVectorStore`: the persistent, deduplicated index
//! - `Indexer` and `Retriever`: the pipeline's write and read paths into it

pub mod chunker;
pub mod indexer;
pub mod sqlite;
pub mod store;

pub use chunker::Chunker;
pub use indexer::{Indexer, Retriever};
pub use sqlite::SqliteVectorStore;
pub use store::VectorStore;
