use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use shared::{RecipeResponse, UPLOAD_FIELD};

use crate::error::PipelineError;
use crate::pipeline::models::UploadRequest;
use crate::pipeline::orchestrator::UploadOrchestrator;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/upload").route(web::post().to(handle_upload)));
}

async fn handle_upload(
    orchestrator: web::Data<UploadOrchestrator>,
    mut payload: Multipart,
) -> Result<HttpResponse, PipelineError> {
    let upload = read_upload(&mut payload, orchestrator.max_upload_bytes()).await?;
    let result = orchestrator.run(upload).await?;
    Ok(HttpResponse::Ok().json(RecipeResponse::from(result)))
}

/// Pulls the first `image` field out of the form. Other fields are drained and ignored.
async fn read_upload(
    payload: &mut Multipart,
    max_bytes: usize,
) -> Result<UploadRequest, PipelineError> {
    let mut upload = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| PipelineError::InvalidInput(format!("Malformed multipart body: {}", e)))?
    {
        let wanted = upload.is_none() && field.name() == Some(UPLOAD_FIELD);
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(String::from)
            .unwrap_or_default();

        let mut image_data = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| {
                PipelineError::InvalidInput(format!("Failed to read upload: {}", e))
            })?;
            if !wanted {
                continue;
            }
            if image_data.len() + data.len() > max_bytes {
                return Err(PipelineError::InvalidInput(format!(
                    "Image exceeds the {} byte limit",
                    max_bytes
                )));
            }
            image_data.extend_from_slice(&data);
        }

        if wanted {
            upload = Some(UploadRequest::new(filename, image_data));
        }
    }

    upload.ok_or_else(|| PipelineError::InvalidInput("No image provided".to_string()))
}
