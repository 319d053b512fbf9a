//! Collects closed, reviewed pull requests from GitHub repositories into a flat
//! dataset of per-pull-request metrics.

pub mod cache;
pub mod collector;
pub mod config;
pub mod dataset;
pub mod discovery;
pub mod enricher;
pub mod fetcher;
pub mod filter;
pub mod github;
pub mod metrics;
pub mod models;
pub mod pagination;
pub mod types;

pub use collector::{Collection, CollectionReport, Collector};
pub use config::AppConfig;
pub use dataset::{CsvSink, Dataset, DatasetSink, JsonSink};
pub use types::{RepoId, RepositoryDescriptor};
