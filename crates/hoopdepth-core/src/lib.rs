// Library root: season ingestion, clustering and team depth ranking.

pub mod analysis;
pub mod config;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod report;
