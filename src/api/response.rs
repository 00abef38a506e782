//! Response envelopes shared by the query endpoints

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Successful query response, `{"result": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResult<T> {
    pub result: T,
}

impl<T> QueryResult<T> {
    pub fn new(result: T) -> Self {
        Self { result }
    }
}

/// Error response, `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ApiError,
}

/// Error details
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}
