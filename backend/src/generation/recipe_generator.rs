use async_trait::async_trait;

use crate::remote::retry::Transient;

const PROMPT_PREFIX: &str = "Generate a recipe using these ingredients: ";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Refusing to generate a recipe without ingredients")]
    NoIngredients,
    #[error("Generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Generation service returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("Unexpected generation response: {0}")]
    MalformedResponse(String),
}

impl Transient for GenerationError {
    fn is_transient(&self) -> bool {
        match self {
            GenerationError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            GenerationError::Upstream { status, .. } => *status == 429 || *status >= 500,
            GenerationError::NoIngredients | GenerationError::MalformedResponse(_) => false,
        }
    }
}

/// Prompt text sent to the generation service, ingredients in the given order.
pub fn build_prompt<S: AsRef<str>>(ingredients: &[S]) -> String {
    let names: Vec<&str> = ingredients.iter().map(AsRef::as_ref).collect();
    format!("{}{}", PROMPT_PREFIX, names.join(", "))
}

#[async_trait]
pub trait RecipeGenerator: Send + Sync {
    /// Must not be called with an empty list.
    async fn generate(&self, ingredients: &[String]) -> Result<String, GenerationError>;
}
