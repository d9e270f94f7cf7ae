//! Configuration management for Yardcam Server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::recognition::HttpEndpoint;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    /// Root directory for the local backend
    pub local_path: PathBuf,
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Local,
    Minio,
    R2,
    S3,
    B2,
}

impl StorageProvider {
    fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "minio" => StorageProvider::Minio,
            "r2" => StorageProvider::R2,
            "s3" => StorageProvider::S3,
            "b2" => StorageProvider::B2,
            _ => StorageProvider::Local,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Recognition provider endpoints; absent providers are not registered
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    pub container_ocr: Option<ProviderEndpointConfig>,
    pub plate_recognizer: Option<ProviderEndpointConfig>,
    pub vision: Option<ProviderEndpointConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderEndpointConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl ProviderEndpointConfig {
    pub fn endpoint(&self) -> HttpEndpoint {
        HttpEndpoint::new(self.url.clone(), self.api_key.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            storage: StorageConfig {
                provider: StorageProvider::Local,
                local_path: PathBuf::from("./data/photos"),
                endpoint: "http://localhost:9000".to_string(),
                bucket: "yardcam".to_string(),
                access_key: "admin".to_string(),
                secret_key: "password123".to_string(),
                region: Some("us-east-1".to_string()),
            },
            database: DatabaseConfig {
                url: "sqlite:./yardcam.db".to_string(),
            },
            providers: ProvidersConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = Config::default();
        let provider = StorageProvider::from_name(
            &env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".to_string()),
        );

        // Remote backends need real credentials
        let (endpoint, bucket, access_key, secret_key) = if provider == StorageProvider::Local {
            (
                env::var("S3_ENDPOINT").unwrap_or(defaults.storage.endpoint),
                env::var("S3_BUCKET").unwrap_or(defaults.storage.bucket),
                env::var("S3_ACCESS_KEY").unwrap_or(defaults.storage.access_key),
                env::var("S3_SECRET_KEY").unwrap_or(defaults.storage.secret_key),
            )
        } else {
            (
                env::var("S3_ENDPOINT")?,
                env::var("S3_BUCKET")?,
                env::var("S3_ACCESS_KEY")?,
                env::var("S3_SECRET_KEY")?,
            )
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            storage: StorageConfig {
                provider,
                local_path: env::var("STORAGE_LOCAL_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.local_path),
                endpoint,
                bucket,
                access_key,
                secret_key,
                region: env::var("S3_REGION").ok(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./yardcam.db".to_string()),
            },
            providers: ProvidersConfig {
                container_ocr: endpoint_from_env("CONTAINER_OCR_URL", "CONTAINER_OCR_API_KEY"),
                plate_recognizer: endpoint_from_env("PLATE_RECOGNIZER_URL", "PLATE_RECOGNIZER_TOKEN"),
                vision: endpoint_from_env("VISION_URL", "VISION_API_KEY"),
            },
        })
    }
}

fn endpoint_from_env(url_var: &str, key_var: &str) -> Option<ProviderEndpointConfig> {
    let url = env::var(url_var).ok().filter(|u| !u.trim().is_empty())?;
    Some(ProviderEndpointConfig {
        url,
        api_key: env::var(key_var).ok().filter(|k| !k.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.provider, StorageProvider::Local);
        assert!(config.providers.vision.is_none());
    }

    #[test]
    fn test_storage_provider_names() {
        assert_eq!(StorageProvider::from_name("R2"), StorageProvider::R2);
        assert_eq!(StorageProvider::from_name("minio"), StorageProvider::Minio);
        assert_eq!(StorageProvider::from_name("anything"), StorageProvider::Local);
    }

    #[test]
    fn test_provider_endpoint() {
        let config = ProviderEndpointConfig {
            url: "https://ocr.example.com/v1/read".to_string(),
            api_key: Some("secret".to_string()),
        };
        let endpoint = config.endpoint();
        assert_eq!(endpoint.url, "https://ocr.example.com/v1/read");
        assert_eq!(endpoint.api_key.as_deref(), Some("secret"));
    }
}
