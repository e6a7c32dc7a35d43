pub mod config;
pub mod error;
mod cache;
mod ingest;
mod repository;

pub use cache::VersionCache;
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use ingest::{IngestionPipeline, PayloadSource, Prepared};
pub use repository::MeshRepository;
