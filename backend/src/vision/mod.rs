pub mod azure_service;
pub mod tagger;
