pub mod blob_publisher;
pub mod s3_service;
