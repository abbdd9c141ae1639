use std::path::Path;

use shared::RecipeResponse;

use crate::error::PipelineError;
use crate::vision::tagger::Label;

pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Labels must score strictly above this to count as ingredients.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// An image as it arrived over HTTP, not yet checked.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub struct ValidatedUpload {
    pub extension: String,
    pub payload: Vec<u8>,
}

impl UploadRequest {
    pub fn new(filename: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            payload,
        }
    }

    pub fn validate(self, max_bytes: usize) -> Result<ValidatedUpload, PipelineError> {
        if self.filename.trim().is_empty() {
            return Err(PipelineError::InvalidInput("No file selected".to_string()));
        }

        let extension = Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| ACCEPTED_EXTENSIONS.contains(&e.as_str()))
            .ok_or_else(|| {
                PipelineError::InvalidInput(format!(
                    "Unsupported file type; accepted: {}",
                    ACCEPTED_EXTENSIONS.join(", ")
                ))
            })?;

        if self.payload.is_empty() {
            return Err(PipelineError::InvalidInput("Uploaded file is empty".to_string()));
        }
        if self.payload.len() > max_bytes {
            return Err(PipelineError::InvalidInput(format!(
                "Image exceeds the {} byte limit",
                max_bytes
            )));
        }

        Ok(ValidatedUpload {
            extension,
            payload: self.payload,
        })
    }
}

/// Ingredient names in the order the tagger reported them. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct IngredientSet(Vec<String>);

impl IngredientSet {
    pub fn from_labels(labels: &[Label], threshold: f64) -> Option<Self> {
        let names: Vec<String> = labels
            .iter()
            .filter(|label| label.confidence > threshold)
            .map(|label| label.name.clone())
            .collect();

        if names.is_empty() { None } else { Some(Self(names)) }
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn into_names(self) -> Vec<String> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeResult {
    pub ingredients: IngredientSet,
    pub recipe_text: String,
}

impl From<RecipeResult> for RecipeResponse {
    fn from(result: RecipeResult) -> Self {
        RecipeResponse {
            ingredients: result.ingredients.into_names(),
            recipe: result.recipe_text,
        }
    }
}
