//! Artist catalog retrieval and duplicate-track reconciliation.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod safety;
pub mod scoring;

pub use catalog::{build_catalog, Catalog, CatalogReport};
pub use config::{CatalogConfig, FetchConfig, ReconcileConfig};
pub use dedup::{reconcile, HighestPopularity, OutlierFilteredMean, ReconcilePolicy};
pub use error::{CatalogError, Result};
pub use fetch::MetadataSource;
