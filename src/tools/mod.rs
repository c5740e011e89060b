//! External collaborators of the pipeline: web search, page fetching and relevance scoring.

pub mod fetcher;
pub mod reranker;
pub mod search;

pub use fetcher::{HttpPageFetcher, PageFetcher};
pub use reranker::{build_scorer, RelevanceScorer, Reranker};
pub use search::{SearchProvider, WebSearch};
