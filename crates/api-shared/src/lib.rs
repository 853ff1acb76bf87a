//! # API Shared
//!
//! Wire types and services shared by the nimbus APIs.
//!
//! Contains:
//! - Request and response bodies, serialisable with serde and described for OpenAPI with utoipa
//! - `HealthService`

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod health;

pub use health::HealthService;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Key of a freshly stored upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadRes {
    pub key: String,
}

/// Keys of a multi-file upload, in the order the parts were received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UploadManyRes {
    pub keys: Vec<String>,
}

/// Keys to bundle into one zip archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DownloadManyReq {
    pub filenames: Vec<String>,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    /// Stable machine-readable code, e.g. `not_found`
    pub code: String,
    pub message: String,
}
