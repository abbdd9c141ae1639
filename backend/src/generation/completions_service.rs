use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::recipe_generator::{GenerationError, RecipeGenerator, build_prompt};
use crate::config::GenerationConfig;
use crate::remote::excerpt;
use crate::remote::retry::{RetryPolicy, with_retry};

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Deserialize)]
struct Choice {
    text: Option<String>,
}

/// Completions deployment that turns an ingredient list into recipe text.
#[derive(Clone)]
pub struct CompletionsService {
    http_client: Client,
    completions_url: String,
    api_key: String,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl CompletionsService {
    pub fn new(http_client: Client, config: &GenerationConfig, retry: RetryPolicy) -> Self {
        let mut completions_url = format!(
            "{}/openai/deployments/{}/completions",
            config.endpoint, config.deployment
        );
        if let Some(version) = &config.api_version {
            completions_url.push_str("?api-version=");
            completions_url.push_str(version);
        }

        Self {
            http_client,
            completions_url,
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            retry,
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let response = self
            .http_client
            .post(&self.completions_url)
            .header("api-key", &self.api_key)
            .json(&CompletionRequest {
                prompt,
                max_tokens: self.max_tokens,
            })
            .send()
            .await
            .map_err(|e| {
                log::error!("Generation request to {} failed: {}", self.completions_url, e);
                GenerationError::Http(e)
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let body = excerpt(&body);
            log::error!(
                "Generation service at {} returned {}: {}",
                self.completions_url,
                status,
                body
            );
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        first_completion(&body)
    }
}

fn first_completion(body: &str) -> Result<String, GenerationError> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(format!("{}: {}", e, excerpt(body))))?;

    parsed
        .choices
        .ok_or_else(|| GenerationError::MalformedResponse("response has no choices".to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::MalformedResponse("choices list is empty".to_string()))?
        .text
        .ok_or_else(|| GenerationError::MalformedResponse("first choice has no text".to_string()))
}

#[async_trait]
impl RecipeGenerator for CompletionsService {
    async fn generate(&self, ingredients: &[String]) -> Result<String, GenerationError> {
        if ingredients.is_empty() {
            return Err(GenerationError::NoIngredients);
        }

        let prompt = build_prompt(ingredients);
        log::debug!("Generation prompt: {}", prompt);

        let prompt = prompt.as_str();
        let text = with_retry(&self.retry, "Recipe generation", move || self.complete(prompt)).await?;
        log::info!("Generated recipe of {} chars", text.len());
        Ok(text)
    }
}
