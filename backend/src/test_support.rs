//! Stand-ins for the remote collaborators, shared by the pipeline and route tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::generation::recipe_generator::{GenerationError, RecipeGenerator};
use crate::storage::blob_publisher::{BlobPublisher, PublishedBlob, StorageError};
use crate::vision::tagger::{ImageReference, ImageTagger, Label, TaggingError};

pub enum TaggerBehavior {
    Labels(Vec<(&'static str, f64)>),
    Upstream(u16),
    Malformed,
    Panic,
}

pub struct MockTagger {
    behavior: TaggerBehavior,
    calls: AtomicUsize,
    references: Mutex<Vec<ImageReference>>,
}

impl MockTagger {
    pub fn new(behavior: TaggerBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            references: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn references(&self) -> Vec<ImageReference> {
        self.references.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageTagger for MockTagger {
    async fn tag(&self, image: ImageReference) -> Result<Vec<Label>, TaggingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.references.lock().unwrap().push(image);
        match &self.behavior {
            TaggerBehavior::Labels(labels) => Ok(labels
                .iter()
                .map(|(name, confidence)| Label {
                    name: name.to_string(),
                    confidence: *confidence,
                })
                .collect()),
            TaggerBehavior::Upstream(status) => Err(TaggingError::Upstream {
                status: *status,
                body: "upstream said no".to_string(),
            }),
            TaggerBehavior::Malformed => Err(TaggingError::MalformedResponse(
                "response has no tags".to_string(),
            )),
            TaggerBehavior::Panic => panic!("tagger blew up"),
        }
    }
}

pub struct MockGenerator {
    text: Option<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl MockGenerator {
    pub fn with_text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Behaves like a service whose response lacks a completion list.
    pub fn malformed() -> Self {
        Self {
            text: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecipeGenerator for MockGenerator {
    async fn generate(&self, ingredients: &[String]) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push(ingredients.to_vec());
        self.text
            .clone()
            .ok_or_else(|| GenerationError::MalformedResponse("response has no choices".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct PublishRecord {
    pub blob: PublishedBlob,
    pub staged_file_existed: bool,
}

pub struct MockPublisher {
    fail: bool,
    published: Mutex<Vec<PublishRecord>>,
    retracted: Mutex<Vec<String>>,
}

impl MockPublisher {
    pub fn working() -> Self {
        Self {
            fail: false,
            published: Mutex::new(Vec::new()),
            retracted: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::working()
        }
    }

    pub fn published(&self) -> Vec<PublishRecord> {
        self.published.lock().unwrap().clone()
    }

    pub fn retracted(&self) -> Vec<String> {
        self.retracted.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobPublisher for MockPublisher {
    async fn publish(&self, local_path: &Path) -> Result<PublishedBlob, StorageError> {
        if self.fail {
            return Err(StorageError::S3("bucket does not exist".to_string()));
        }
        let mut published = self.published.lock().unwrap();
        let key = format!("uploads/{}.png", published.len());
        let blob = PublishedBlob {
            url: format!("https://blobs.example/{}?sig=1", key),
            key,
        };
        published.push(PublishRecord {
            blob: blob.clone(),
            staged_file_existed: local_path.exists(),
        });
        Ok(blob)
    }

    async fn retract(&self, blob: &PublishedBlob) -> Result<(), StorageError> {
        self.retracted.lock().unwrap().push(blob.key.clone());
        Ok(())
    }
}

/// Files left behind in a staging directory.
pub fn staging_entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}
