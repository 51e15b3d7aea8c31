//! Similarity-search orchestration over the Bahn store: metadata
//! prefilter, per-mode nearest-neighbor lookup, RRF fusion, and the
//! optional DTW reranking stage.

pub mod error;
pub mod filter;
pub mod multimodal;
pub mod rerank;
pub mod shape;

pub use error::SearchError;
pub use filter::{FilterFeature, FilterSearcher};
pub use multimodal::{MultiModalSearcher, SearchRequest, SearchResponse};
pub use rerank::DtwReranker;
pub use shape::ShapeSearcher;
