use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Success envelope shared by every media endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Per-backend result counts, listings only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<BTreeMap<String, usize>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, count: usize) -> Self {
        Self {
            success: true,
            message: None,
            data,
            count,
            user_id: None,
            sources: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_sources(mut self, sources: BTreeMap<String, usize>) -> Self {
        self.sources = Some(sources);
        self
    }
}

/// Error envelope
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Message reported by the storage backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Diagnostic detail, development only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            debug: None,
        }
    }
}
