use std::path::PathBuf;
use std::sync::Arc;

use shared::PipelineStage;
use uuid::Uuid;

use super::models::{CONFIDENCE_THRESHOLD, IngredientSet, RecipeResult, UploadRequest};
use super::staging::StagedFile;
use crate::error::PipelineError;
use crate::generation::recipe_generator::RecipeGenerator;
use crate::storage::blob_publisher::{BlobLease, BlobPublisher};
use crate::vision::tagger::{ImageReference, ImageTagger};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub staging_dir: PathBuf,
    pub max_upload_bytes: usize,
}

/// Drives one upload from validation to recipe. Holds no per-request state, so a
/// single instance is cloned into every worker.
#[derive(Clone)]
pub struct UploadOrchestrator {
    tagger: Arc<dyn ImageTagger>,
    generator: Arc<dyn RecipeGenerator>,
    publisher: Option<Arc<dyn BlobPublisher>>,
    settings: PipelineSettings,
}

impl UploadOrchestrator {
    pub fn new(
        tagger: Arc<dyn ImageTagger>,
        generator: Arc<dyn RecipeGenerator>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            tagger,
            generator,
            publisher: None,
            settings,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn BlobPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.settings.max_upload_bytes
    }

    pub async fn run(&self, upload: UploadRequest) -> Result<RecipeResult, PipelineError> {
        let request_id = Uuid::new_v4();
        log::info!(
            "[{}] {}: {} bytes",
            request_id,
            PipelineStage::Received,
            upload.payload.len()
        );

        let result = self.execute(request_id, upload).await;

        match &result {
            Ok(recipe) => log::info!(
                "[{}] {}: {} ingredients",
                request_id,
                PipelineStage::Completed,
                recipe.ingredients.names().len()
            ),
            Err(e) if e.is_client_error() => log::warn!(
                "[{}] {} ({}): {}",
                request_id,
                PipelineStage::Failed,
                e.kind(),
                e
            ),
            Err(e) => log::error!(
                "[{}] {} ({}): {}",
                request_id,
                PipelineStage::Failed,
                e.kind(),
                e
            ),
        }

        result
    }

    async fn execute(
        &self,
        request_id: Uuid,
        upload: UploadRequest,
    ) -> Result<RecipeResult, PipelineError> {
        let upload = upload.validate(self.settings.max_upload_bytes)?;
        log::debug!("[{}] {}", request_id, PipelineStage::Validated);

        let staged = StagedFile::write(&self.settings.staging_dir, &upload.extension, &upload.payload)
            .await
            .map_err(PipelineError::StagingFailed)?;
        log::debug!(
            "[{}] {}: {}",
            request_id,
            PipelineStage::Staged,
            staged.path().display()
        );

        // `staged` drops at the end of this scope whatever `process` returned
        self.process(request_id, &staged).await
    }

    async fn process(
        &self,
        request_id: Uuid,
        staged: &StagedFile,
    ) -> Result<RecipeResult, PipelineError> {
        let labels = match &self.publisher {
            Some(publisher) => {
                let blob = publisher.publish(staged.path()).await?;
                log::debug!("[{}] {}: {}", request_id, PipelineStage::Published, blob.key);

                let key = blob.key.clone();
                let lease = BlobLease::new(publisher.clone(), blob);
                let tagged = self
                    .tagger
                    .tag(ImageReference::Url(lease.blob().url.clone()))
                    .await;

                if let Err(e) = lease.release().await {
                    log::warn!("[{}] Failed to remove blob {}: {}", request_id, key, e);
                }
                tagged?
            }
            None => {
                let bytes = staged.read().await.map_err(PipelineError::StagingFailed)?;
                self.tagger.tag(ImageReference::Bytes(bytes)).await?
            }
        };
        log::debug!(
            "[{}] {}: {} labels",
            request_id,
            PipelineStage::Tagged,
            labels.len()
        );

        let ingredients = IngredientSet::from_labels(&labels, CONFIDENCE_THRESHOLD)
            .ok_or(PipelineError::NoIngredientsFound)?;
        log::info!(
            "[{}] {}: {}",
            request_id,
            PipelineStage::Filtered,
            ingredients.names().join(", ")
        );

        let recipe_text = self.generator.generate(ingredients.names()).await?;
        log::debug!("[{}] {}", request_id, PipelineStage::Generated);

        Ok(RecipeResult {
            ingredients,
            recipe_text,
        })
    }
}
