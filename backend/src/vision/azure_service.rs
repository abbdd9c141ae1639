use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

use super::tagger::{ImageReference, ImageTagger, Label, TaggingError};
use crate::config::VisionConfig;
use crate::remote::excerpt;
use crate::remote::retry::{RetryPolicy, with_retry};

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Serialize)]
struct AnalyzeUrlRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    tags: Option<Vec<RawTag>>,
}

#[derive(Deserialize)]
struct RawTag {
    name: String,
    confidence: f64,
}

/// Image analysis endpoint asked for `Tags` visual features only.
#[derive(Clone)]
pub struct AzureVisionService {
    http_client: Client,
    analyze_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl AzureVisionService {
    pub fn new(http_client: Client, config: &VisionConfig, retry: RetryPolicy) -> Self {
        Self {
            http_client,
            analyze_url: format!(
                "{}/vision/{}/analyze?visualFeatures=Tags",
                config.endpoint, config.api_version
            ),
            api_key: config.api_key.clone(),
            retry,
        }
    }

    async fn analyze(&self, image: &ImageReference) -> Result<Vec<Label>, TaggingError> {
        let request = self
            .http_client
            .post(&self.analyze_url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key);

        let request = match image {
            ImageReference::Url(url) => request.json(&AnalyzeUrlRequest { url }),
            ImageReference::Bytes(bytes) => request
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(bytes.clone()),
        };

        let response = request.send().await.map_err(|e| {
            log::error!("Tagging request to {} failed: {}", self.analyze_url, e);
            TaggingError::Http(e)
        })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let body = excerpt(&body);
            log::error!(
                "Tagging service at {} returned {}: {}",
                self.analyze_url,
                status,
                body
            );
            return Err(TaggingError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        parse_tags(&body)
    }
}

fn parse_tags(body: &str) -> Result<Vec<Label>, TaggingError> {
    let parsed: AnalyzeResponse = serde_json::from_str(body)
        .map_err(|e| TaggingError::MalformedResponse(format!("{}: {}", e, excerpt(body))))?;

    let tags = parsed
        .tags
        .ok_or_else(|| TaggingError::MalformedResponse("response has no tags".to_string()))?;

    Ok(tags
        .into_iter()
        .map(|tag| Label {
            name: tag.name,
            confidence: tag.confidence,
        })
        .collect())
}

#[async_trait]
impl ImageTagger for AzureVisionService {
    async fn tag(&self, image: ImageReference) -> Result<Vec<Label>, TaggingError> {
        log::debug!("Requesting tags for {:?}", image);
        let image = &image;
        let labels = with_retry(&self.retry, "Image tagging", move || self.analyze(image)).await?;
        log::info!("Tagging service returned {} labels", labels.len());
        Ok(labels)
    }
}
