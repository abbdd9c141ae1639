mod config;
mod error;
mod generation;
mod pipeline;
mod remote;
mod routes;
mod storage;
mod vision;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use config::AppConfig;
use generation::completions_service::CompletionsService;
use pipeline::orchestrator::{PipelineSettings, UploadOrchestrator};
use remote::retry::RetryPolicy;
use routes::configure_routes;
use storage::s3_service::S3Service;
use vision::azure_service::AzureVisionService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;
    log::debug!("Loaded configuration: {:?}", config);

    std::fs::create_dir_all(&config.upload_dir).inspect_err(|e| {
        log::error!(
            "Failed to create upload directory {}: {}",
            config.upload_dir.display(),
            e
        );
    })?;

    let http_client = remote::http_client(&config.remote).map_err(|e| {
        log::error!("Failed to build HTTP client: {}", e);
        std::io::Error::other(format!("HTTP client error: {}", e))
    })?;
    let retry = RetryPolicy::from(&config.remote);

    let tagger = AzureVisionService::new(http_client.clone(), &config.vision, retry.clone());
    let generator = CompletionsService::new(http_client, &config.generation, retry);

    let mut orchestrator = UploadOrchestrator::new(
        Arc::new(tagger),
        Arc::new(generator),
        PipelineSettings {
            staging_dir: config.upload_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        },
    );

    match &config.storage {
        Some(storage) => {
            let s3_service = S3Service::connect(storage, config.remote.timeout)
                .await
                .map_err(|e| {
                    log::error!("Failed to set up blob storage: {}", e);
                    std::io::Error::other(format!("Storage error: {}", e))
                })?;
            log::info!("Uploads are published to bucket {}", storage.container);
            orchestrator = orchestrator.with_publisher(Arc::new(s3_service));
        }
        None => log::info!("Blob storage not configured; image bytes go straight to the tagger"),
    }

    let allowed_origins = config.server.allowed_origins.clone();
    let bind_address = config.bind_address();

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(cors(&allowed_origins))
            .app_data(web::Data::new(orchestrator.clone()))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn cors(allowed_origins: &[String]) -> Cors {
    let cors = if allowed_origins.is_empty() {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };

    cors.allowed_methods(vec!["POST", "OPTIONS"])
        .allowed_headers(vec![
            actix_web::http::header::ACCEPT,
            actix_web::http::header::CONTENT_TYPE,
        ])
        .max_age(3600)
}
