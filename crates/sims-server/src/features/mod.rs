//! Feature routes
//!
//! Thin HTTP wrappers around the ingestion pipeline. Handlers validate
//! input, delegate to the registry, and shape responses; no pipeline
//! logic lives here.

use axum::Router;
use std::path::PathBuf;

use crate::ingest::JobRegistry;

pub mod imports;

/// State shared by feature handlers
#[derive(Clone)]
pub struct FeatureState {
    pub registry: JobRegistry,
    pub upload_dir: PathBuf,
}

/// Create the feature router
pub fn router(state: FeatureState) -> Router {
    imports::routes().with_state(state)
}
