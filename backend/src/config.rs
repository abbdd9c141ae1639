use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

const DEFAULT_VISION_API_VERSION: &str = "v3.2";
const DEFAULT_DEPLOYMENT: &str = "text-davinci";
const DEFAULT_MAX_TOKENS: u32 = 100;
const DEFAULT_URL_TTL_SECS: u64 = 900;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_BASE_MS: u64 = 250;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone)]
pub struct VisionConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
}

#[derive(Clone)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: Option<String>,
    pub max_tokens: u32,
}

#[derive(Clone)]
pub struct StorageConfig {
    pub connection_string: String,
    pub container: String,
    pub url_ttl: Duration,
    pub retain_uploads: bool,
}

#[derive(Debug, Clone)]
pub struct RemoteCallConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub vision: VisionConfig,
    pub generation: GenerationConfig,
    pub storage: Option<StorageConfig>,
    pub remote: RemoteCallConfig,
    pub server: ServerConfig,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

// Keys stay out of Debug output, which ends up in logs.
impl fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("connection_string", &"<redacted>")
            .field("container", &self.container)
            .field("url_ttl", &self.url_ttl)
            .field("retain_uploads", &self.retain_uploads)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let vision = VisionConfig {
            endpoint: parse_endpoint("VISION_ENDPOINT", require("VISION_ENDPOINT")?)?,
            api_key: require("VISION_API_KEY")?,
            api_version: get("VISION_API_VERSION")
                .unwrap_or_else(|| DEFAULT_VISION_API_VERSION.to_string()),
        };

        let generation = GenerationConfig {
            endpoint: parse_endpoint("OPENAI_ENDPOINT", require("OPENAI_ENDPOINT")?)?,
            api_key: require("OPENAI_API_KEY")?,
            deployment: get("OPENAI_DEPLOYMENT").unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string()),
            api_version: get("OPENAI_API_VERSION"),
            max_tokens: parse_or("RECIPE_MAX_TOKENS", get("RECIPE_MAX_TOKENS"), DEFAULT_MAX_TOKENS)?,
        };
        if generation.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                key: "RECIPE_MAX_TOKENS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let storage = match get("STORAGE_CONNECTION_STRING") {
            Some(connection_string) => Some(StorageConfig {
                connection_string,
                container: require("STORAGE_CONTAINER")?,
                url_ttl: Duration::from_secs(parse_or(
                    "STORAGE_URL_TTL_SECS",
                    get("STORAGE_URL_TTL_SECS"),
                    DEFAULT_URL_TTL_SECS,
                )?),
                retain_uploads: parse_or(
                    "STORAGE_RETAIN_UPLOADS",
                    get("STORAGE_RETAIN_UPLOADS"),
                    false,
                )?,
            }),
            None => None,
        };

        let remote = RemoteCallConfig {
            timeout: Duration::from_secs(parse_or(
                "REMOTE_TIMEOUT_SECS",
                get("REMOTE_TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )?),
            max_attempts: parse_or(
                "REMOTE_MAX_ATTEMPTS",
                get("REMOTE_MAX_ATTEMPTS"),
                DEFAULT_MAX_ATTEMPTS,
            )?,
            retry_base_delay: Duration::from_millis(parse_or(
                "REMOTE_RETRY_BASE_MS",
                get("REMOTE_RETRY_BASE_MS"),
                DEFAULT_RETRY_BASE_MS,
            )?),
        };
        if remote.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "REMOTE_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if remote.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "REMOTE_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }

        let server = ServerConfig {
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            allowed_origins: get("CORS_ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        };

        let upload_dir = get("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("recipe-lens-uploads"));

        let max_upload_bytes = parse_or(
            "MAX_UPLOAD_BYTES",
            get("MAX_UPLOAD_BYTES"),
            DEFAULT_MAX_UPLOAD_BYTES,
        )?;

        Ok(Self {
            vision,
            generation,
            storage,
            remote,
            server,
            upload_dir,
            max_upload_bytes,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_endpoint(key: &'static str, raw: String) -> Result<String, ConfigError> {
    let url = Url::parse(&raw).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: format!("{:?}: {}", value, e),
        }),
        None => Ok(default),
    }
}
