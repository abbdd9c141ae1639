use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::generation::recipe_generator::GenerationError;
use crate::storage::blob_publisher::StorageError;
use crate::vision::tagger::TaggingError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid upload: {0}")]
    InvalidInput(String),
    #[error("Staging failed: {0}")]
    StagingFailed(#[source] std::io::Error),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),
    #[error("Tagging failed: {0}")]
    TaggingFailed(#[from] TaggingError),
    #[error("No ingredients found")]
    NoIngredientsFound,
    #[error("Generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "InvalidInput",
            PipelineError::StagingFailed(_) => "StagingFailed",
            PipelineError::StorageUnavailable(_) => "StorageUnavailable",
            PipelineError::TaggingFailed(_) => "TaggingFailed",
            PipelineError::NoIngredientsFound => "NoIngredientsFound",
            PipelineError::GenerationFailed(_) => "GenerationFailed",
        }
    }

    /// Caused by the upload itself rather than by this service or its dependencies.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidInput(_) | PipelineError::NoIngredientsFound
        )
    }

    /// Message safe to show to the client. Upstream bodies and paths stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            PipelineError::InvalidInput(reason) => reason.clone(),
            PipelineError::StagingFailed(_) => "Failed to store the uploaded image".to_string(),
            PipelineError::StorageUnavailable(_) => "Image storage is unavailable".to_string(),
            PipelineError::TaggingFailed(_) => "Image tagging failed".to_string(),
            PipelineError::NoIngredientsFound => {
                "No ingredients were recognised in the image".to_string()
            }
            PipelineError::GenerationFailed(_) => "Recipe generation failed".to_string(),
        }
    }
}

impl ResponseError for PipelineError {
    fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.client_message(),
        })
    }
}
