use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid storage connection string: {0}")]
    InvalidConnectionString(String),
    #[error("Failed to read staged file: {0}")]
    LocalFile(String),
    #[error("S3 error: {0}")]
    S3(String),
    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),
}

/// An object written to storage for the tagging service to fetch.
#[derive(Clone, PartialEq)]
pub struct PublishedBlob {
    pub key: String,
    pub url: String,
}

impl std::fmt::Debug for PublishedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishedBlob")
            .field("key", &self.key)
            .field("url", &"<presigned>")
            .finish()
    }
}

#[async_trait]
pub trait BlobPublisher: Send + Sync {
    /// Uploads the file under a freshly generated name and returns a URL the tagger can reach.
    async fn publish(&self, local_path: &Path) -> Result<PublishedBlob, StorageError>;

    /// Removes a blob once the tagger is done with it.
    async fn retract(&self, blob: &PublishedBlob) -> Result<(), StorageError>;
}

/// A published blob that still has to be retracted.
///
/// `release` retracts it in line. A lease dropped before that (a panicking
/// tagger, or a request abandoned by its client) hands the retraction to the
/// runtime instead.
pub struct BlobLease {
    publisher: Arc<dyn BlobPublisher>,
    blob: PublishedBlob,
    released: bool,
}

impl BlobLease {
    pub fn new(publisher: Arc<dyn BlobPublisher>, blob: PublishedBlob) -> Self {
        Self {
            publisher,
            blob,
            released: false,
        }
    }

    pub fn blob(&self) -> &PublishedBlob {
        &self.blob
    }

    pub async fn release(mut self) -> Result<(), StorageError> {
        let result = self.publisher.retract(&self.blob).await;
        self.released = true;
        result
    }
}

impl Drop for BlobLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!("No runtime left to remove blob {}", self.blob.key);
                return;
            }
        };

        log::warn!("Blob {} abandoned before retraction, removing in background", self.blob.key);
        let publisher = self.publisher.clone();
        let blob = self.blob.clone();
        handle.spawn(async move {
            if let Err(e) = publisher.retract(&blob).await {
                log::warn!("Background removal of blob {} failed: {}", blob.key, e);
            }
        });
    }
}
