//! docscan-server: HTTP front end for uploaded-video document scans

pub mod http;
pub mod jobs;

pub use http::{create_router, ApiState};
pub use jobs::{DocumentAnalysisResponse, JobRecord, JobStatus, JobStore};
