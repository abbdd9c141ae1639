use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use uuid::Uuid;

use super::blob_publisher::{BlobPublisher, PublishedBlob, StorageError};
use crate::config::StorageConfig;

const DEFAULT_REGION: &str = "us-east-1";

/// Parsed `Key=Value;...` storage connection string.
#[derive(Default, PartialEq)]
pub struct S3ConnectionString {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl S3ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let mut parsed = Self::default();

        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                StorageError::InvalidConnectionString(format!(
                    "segment without '=' near {:?}",
                    part.chars().take(16).collect::<String>()
                ))
            })?;
            let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());

            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" => parsed.endpoint = value,
                "region" => parsed.region = value,
                "accesskeyid" => parsed.access_key_id = value,
                "secretaccesskey" => parsed.secret_access_key = value,
                "sessiontoken" => parsed.session_token = value,
                other => {
                    return Err(StorageError::InvalidConnectionString(format!(
                        "unknown key {:?}",
                        other
                    )));
                }
            }
        }

        if parsed.access_key_id.is_some() != parsed.secret_access_key.is_some() {
            return Err(StorageError::InvalidConnectionString(
                "AccessKeyId and SecretAccessKey must be given together".to_string(),
            ));
        }

        Ok(parsed)
    }

    fn credentials(&self) -> Option<Credentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) => Some(Credentials::new(
                id,
                secret,
                self.session_token.clone(),
                None,
                "connection-string",
            )),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
    url_ttl: Duration,
    retain_uploads: bool,
    timeout: Duration,
}

impl S3Service {
    pub fn new(
        client: Client,
        bucket_name: String,
        url_ttl: Duration,
        retain_uploads: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            bucket_name,
            url_ttl,
            retain_uploads,
            timeout,
        }
    }

    /// Builds a client from the connection string, falling back to the default AWS credential chain.
    pub async fn connect(config: &StorageConfig, timeout: Duration) -> Result<Self, StorageError> {
        let connection = S3ConnectionString::parse(&config.connection_string)?;

        let mut builder = match connection.credentials() {
            Some(credentials) => aws_sdk_s3::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(credentials)
                .region(Region::new(
                    connection
                        .region
                        .clone()
                        .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                )),
            None => {
                let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
                let region = connection
                    .region
                    .clone()
                    .map(Region::new)
                    .or_else(|| shared.region().cloned())
                    .unwrap_or_else(|| Region::new(DEFAULT_REGION));
                aws_sdk_s3::config::Builder::from(&shared).region(region)
            }
        };

        if let Some(endpoint) = &connection.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self::new(
            Client::from_conf(builder.build()),
            config.container.clone(),
            config.url_ttl,
            config.retain_uploads,
            timeout,
        ))
    }

    /// Object names are random so neither client filenames nor content leak into storage.
    pub fn generate_s3_key(file_extension: &str) -> String {
        format!("uploads/{}.{}", Uuid::new_v4(), file_extension)
    }

    pub fn content_type_for(file_extension: &str) -> &'static str {
        match file_extension {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            _ => "application/octet-stream",
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StorageError::Timeout(self.timeout))?
    }

    pub async fn upload_image(&self, local_path: &Path, s3_key: &str) -> Result<(), StorageError> {
        let extension = file_extension(local_path);
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::LocalFile(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .body(body)
            .content_type(Self::content_type_for(&extension))
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(())
    }

    pub async fn presigned_url(&self, s3_key: &str) -> Result<String, StorageError> {
        let presigning =
            PresigningConfig::expires_in(self.url_ttl).map_err(|e| StorageError::S3(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(request.uri().to_string())
    }

    pub async fn delete_image(&self, s3_key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;

        Ok(())
    }
}

fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}

#[async_trait]
impl BlobPublisher for S3Service {
    async fn publish(&self, local_path: &Path) -> Result<PublishedBlob, StorageError> {
        let key = Self::generate_s3_key(&file_extension(local_path));

        self.bounded(self.upload_image(local_path, &key))
            .await
            .inspect_err(|e| {
                log::error!("Upload to bucket {} failed: {}", self.bucket_name, e);
            })?;
        let url = self.bounded(self.presigned_url(&key)).await?;

        log::info!("Published {} to bucket {}", key, self.bucket_name);
        Ok(PublishedBlob { key, url })
    }

    async fn retract(&self, blob: &PublishedBlob) -> Result<(), StorageError> {
        if self.retain_uploads {
            log::debug!("Keeping {} in bucket {}", blob.key, self.bucket_name);
            return Ok(());
        }
        self.bounded(self.delete_image(&blob.key)).await?;
        log::debug!("Removed {} from bucket {}", blob.key, self.bucket_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::remote::stub::{SLOW_REPLY, StubServer, short_deadline};

    #[test]
    fn parses_full_connection_string_case_insensitively() {
        let parsed = S3ConnectionString::parse(
            "Endpoint=http://minio:9000; region=eu-west-1;ACCESSKEYID=AKIA;SecretAccessKey=shh;",
        )
        .unwrap();
        assert_eq!(parsed.endpoint.as_deref(), Some("http://minio:9000"));
        assert_eq!(parsed.region.as_deref(), Some("eu-west-1"));
        assert_eq!(parsed.access_key_id.as_deref(), Some("AKIA"));
        assert_eq!(parsed.secret_access_key.as_deref(), Some("shh"));
        assert!(parsed.session_token.is_none());
        assert!(parsed.credentials().is_some());
    }

    #[test]
    fn region_only_connection_string_uses_default_chain() {
        let parsed = S3ConnectionString::parse("Region=us-west-2").unwrap();
        assert!(parsed.credentials().is_none());
    }

    #[test]
    fn rejects_malformed_connection_strings() {
        assert!(matches!(
            S3ConnectionString::parse("Endpoint"),
            Err(StorageError::InvalidConnectionString(_))
        ));
        assert!(matches!(
            S3ConnectionString::parse("AccountName=foo"),
            Err(StorageError::InvalidConnectionString(_))
        ));
        assert!(matches!(
            S3ConnectionString::parse("AccessKeyId=AKIA"),
            Err(StorageError::InvalidConnectionString(_))
        ));
    }

    #[test]
    fn keys_are_unique_and_carry_only_the_extension() {
        let a = S3Service::generate_s3_key("png");
        let b = S3Service::generate_s3_key("png");
        assert_ne!(a, b);
        assert!(a.starts_with("uploads/") && a.ends_with(".png"));
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(S3Service::content_type_for("png"), "image/png");
        assert_eq!(S3Service::content_type_for("jpeg"), "image/jpeg");
        assert_eq!(S3Service::content_type_for("jpg"), "image/jpeg");
    }

    #[actix_web::test]
    async fn publish_uploads_under_generated_key_and_presigns() {
        let stub = StubServer::start(vec![(200, "")]).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("my-dinner.png");
        std::fs::write(&local, b"png bytes").unwrap();

        let config = StorageConfig {
            connection_string: format!(
                "Endpoint={};Region=us-east-1;AccessKeyId=test;SecretAccessKey=test",
                stub.base_url
            ),
            container: "recipe-uploads".to_string(),
            url_ttl: Duration::from_secs(60),
            retain_uploads: false,
        };
        let service = S3Service::connect(&config, Duration::from_secs(10)).await.unwrap();

        let blob = service.publish(&local).await.unwrap();
        assert!(blob.key.starts_with("uploads/") && blob.key.ends_with(".png"));
        assert!(!blob.key.contains("my-dinner"));
        assert!(blob.url.contains(&blob.key));
        assert!(blob.url.contains("X-Amz-Signature"));

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "PUT");
        assert_eq!(requests[0].path, format!("/recipe-uploads/{}", blob.key));
        // body may arrive aws-chunked with a trailing checksum
        assert!(String::from_utf8_lossy(&requests[0].body).contains("png bytes"));

        service.retract(&blob).await.unwrap();
        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, "DELETE");
    }

    #[actix_web::test]
    async fn retained_uploads_are_not_deleted() {
        let stub = StubServer::start(vec![(200, "")]).await.unwrap();
        let config = StorageConfig {
            connection_string: format!(
                "Endpoint={};AccessKeyId=test;SecretAccessKey=test",
                stub.base_url
            ),
            container: "recipe-uploads".to_string(),
            url_ttl: Duration::from_secs(60),
            retain_uploads: true,
        };
        let service = S3Service::connect(&config, Duration::from_secs(10)).await.unwrap();

        let blob = PublishedBlob {
            key: "uploads/abc.png".to_string(),
            url: "http://example/abc.png".to_string(),
        };
        service.retract(&blob).await.unwrap();
        assert!(stub.requests().is_empty());
    }

    #[actix_web::test]
    async fn missing_local_file_is_reported() {
        let stub = StubServer::start(vec![(200, "")]).await.unwrap();
        let config = StorageConfig {
            connection_string: format!(
                "Endpoint={};AccessKeyId=test;SecretAccessKey=test",
                stub.base_url
            ),
            container: "recipe-uploads".to_string(),
            url_ttl: Duration::from_secs(60),
            retain_uploads: false,
        };
        let service = S3Service::connect(&config, Duration::from_secs(10)).await.unwrap();

        let err = service
            .publish(Path::new("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::LocalFile(_)));
        assert!(stub.requests().is_empty());
    }

    #[actix_web::test]
    async fn slow_storage_times_out_as_storage_unavailable() {
        let stub = StubServer::start_delayed(vec![(200, "")], SLOW_REPLY)
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("dinner.jpg");
        std::fs::write(&local, b"jpg bytes").unwrap();

        let config = StorageConfig {
            connection_string: format!(
                "Endpoint={};AccessKeyId=test;SecretAccessKey=test",
                stub.base_url
            ),
            container: "recipe-uploads".to_string(),
            url_ttl: Duration::from_secs(60),
            retain_uploads: false,
        };
        let deadline = short_deadline().timeout;
        let service = S3Service::connect(&config, deadline).await.unwrap();

        let err = service.publish(&local).await.unwrap_err();

        assert!(matches!(err, StorageError::Timeout(d) if d == deadline), "{:?}", err);
        assert!(matches!(
            PipelineError::from(err),
            PipelineError::StorageUnavailable(_)
        ));
    }
}
