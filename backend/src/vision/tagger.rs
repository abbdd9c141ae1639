use async_trait::async_trait;

use crate::remote::retry::Transient;

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub name: String,
    pub confidence: f64,
}

/// What the tagging service is pointed at.
#[derive(Clone, PartialEq)]
pub enum ImageReference {
    Url(String),
    Bytes(Vec<u8>),
}

impl std::fmt::Debug for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // presigned URLs carry a signature in the query string
            ImageReference::Url(url) => {
                let base = url.split('?').next().unwrap_or_default();
                f.debug_tuple("Url").field(&base).finish()
            }
            ImageReference::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TaggingError {
    #[error("Tagging request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Tagging service returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("Unexpected tagging response: {0}")]
    MalformedResponse(String),
}

impl Transient for TaggingError {
    fn is_transient(&self) -> bool {
        match self {
            TaggingError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            TaggingError::Upstream { status, .. } => *status == 429 || *status >= 500,
            TaggingError::MalformedResponse(_) => false,
        }
    }
}

/// Turns an image into labels. Confidence filtering is left to the caller.
#[async_trait]
pub trait ImageTagger: Send + Sync {
    async fn tag(&self, image: ImageReference) -> Result<Vec<Label>, TaggingError>;
}
