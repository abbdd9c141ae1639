use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Multipart field that carries the uploaded photograph.
pub const UPLOAD_FIELD: &str = "image";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RecipeResponse {
    pub ingredients: Vec<String>,
    pub recipe: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

/// Steps an upload walks through on its way to a recipe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Validated,
    Staged,
    Published,
    Tagged,
    Filtered,
    Generated,
    Completed,
    Failed,
}
