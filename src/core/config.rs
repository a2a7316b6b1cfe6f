use std::env;

use crate::modules::storage::StorageKind;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub swagger: SwaggerConfig,
    pub s3: Option<S3Config>,
    pub cloudinary: Option<CloudinaryConfig>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allow_origin: String,
    pub max_request_body_size: usize,
    /// Deployment environment; `development` exposes diagnostic error details
    pub environment: String,
    /// User namespace used when an upload carries no `userId` field
    pub default_user_id: String,
    /// Backend receiving new uploads
    pub upload_backend: StorageKind,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub title: String,
    pub version: String,
    pub description: String,
}

/// S3 (or S3-compatible) bucket configuration
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Custom endpoint for S3-compatible stores (path-style addressing)
    pub endpoint: Option<String>,
    /// Base URL used when building public object URLs (optional)
    pub public_endpoint: Option<String>,
    /// Key prefix under which every user namespace lives
    pub key_prefix: String,
    /// Maximum number of objects returned per listing
    pub max_keys: usize,
    /// Install a public-read bucket policy for the key prefix at startup
    pub manage_public_policy: bool,
}

/// Cloudinary media-management configuration
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Root folder under which every user folder lives
    pub folder: String,
    /// Maximum number of resources returned per resource type
    pub max_results: u32,
    pub api_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        let config = Config {
            app: AppConfig::from_env()?,
            swagger: SwaggerConfig::from_env()?,
            s3: S3Config::from_env()?,
            cloudinary: CloudinaryConfig::from_env()?,
        };
        config.validate()?;

        Ok(config)
    }

    /// Check that the selected upload backend is actually configured
    pub fn validate(&self) -> Result<(), String> {
        if self.s3.is_none() && self.cloudinary.is_none() {
            return Err(
                "No storage backend configured: set AWS_S3_BUCKET_NAME and/or CLOUDINARY_* variables"
                    .to_string(),
            );
        }

        let configured = match self.app.upload_backend {
            StorageKind::S3 => self.s3.is_some(),
            StorageKind::Cloudinary => self.cloudinary.is_some(),
        };
        if !configured {
            return Err(format!(
                "UPLOAD_BACKEND is '{}' but that backend is not configured",
                self.app.upload_backend
            ));
        }

        Ok(())
    }
}

impl AppConfig {
    const DEFAULT_MAX_REQUEST_BODY_SIZE: usize = 50 * 1024 * 1024; // 50MB

    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        let cors_allow_origin = env::var("CORS_ALLOW_ORIGIN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "*".to_string());

        let max_request_body_size = env::var("MAX_REQUEST_BODY_SIZE")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_REQUEST_BODY_SIZE.to_string())
            .parse::<usize>()
            .map_err(|_| "MAX_REQUEST_BODY_SIZE must be a valid number".to_string())?;

        let environment = env::var("APP_ENV").unwrap_or_else(|_| "production".to_string());

        let default_user_id =
            env::var("DEFAULT_USER_ID").unwrap_or_else(|_| "default-user".to_string());

        let upload_backend = env::var("UPLOAD_BACKEND")
            .unwrap_or_else(|_| "s3".to_string())
            .parse::<StorageKind>()?;

        Ok(Self {
            host,
            port,
            cors_allow_origin,
            max_request_body_size,
            environment,
            default_user_id,
            upload_backend,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}

impl SwaggerConfig {
    pub fn from_env() -> Result<Self, String> {
        let username = env::var("SWAGGER_USERNAME").ok().filter(|s| !s.is_empty());
        let password = env::var("SWAGGER_PASSWORD").ok().filter(|s| !s.is_empty());
        let title =
            env::var("SWAGGER_TITLE").unwrap_or_else(|_| "Memories to Cloud API".to_string());
        let version = env::var("SWAGGER_VERSION").unwrap_or_else(|_| "0.1.0".to_string());
        let description = env::var("SWAGGER_DESCRIPTION")
            .unwrap_or_else(|_| "Media upload and listing API".to_string());

        Ok(Self {
            username,
            password,
            title,
            version,
            description,
        })
    }

    /// Returns credentials in "username:password" format if auth is enabled
    pub fn credentials(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(format!("{}:{}", user, pass)),
            _ => None,
        }
    }
}

impl S3Config {
    const DEFAULT_REGION: &'static str = "eu-west-1";
    const DEFAULT_KEY_PREFIX: &'static str = "memories-to-cloud";
    const DEFAULT_MAX_KEYS: usize = 1000;

    /// Returns `None` when no bucket is configured
    pub fn from_env() -> Result<Option<Self>, String> {
        let Some(bucket) = non_empty_var("AWS_S3_BUCKET_NAME") else {
            return Ok(None);
        };

        let access_key = env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| "AWS_ACCESS_KEY_ID must be set when AWS_S3_BUCKET_NAME is".to_string())?;
        let secret_key = env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            "AWS_SECRET_ACCESS_KEY must be set when AWS_S3_BUCKET_NAME is".to_string()
        })?;

        let region =
            non_empty_var("AWS_REGION").unwrap_or_else(|| Self::DEFAULT_REGION.to_string());

        let endpoint = non_empty_var("AWS_S3_ENDPOINT").map(|s| s.trim_end_matches('/').to_string());
        let public_endpoint =
            non_empty_var("AWS_S3_PUBLIC_ENDPOINT").map(|s| s.trim_end_matches('/').to_string());

        let key_prefix = non_empty_var("AWS_S3_KEY_PREFIX")
            .map(|s| s.trim_matches('/').to_string())
            .unwrap_or_else(|| Self::DEFAULT_KEY_PREFIX.to_string());

        let max_keys = env::var("AWS_S3_MAX_KEYS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_KEYS.to_string())
            .parse::<usize>()
            .map_err(|_| "AWS_S3_MAX_KEYS must be a valid number".to_string())?;

        let manage_public_policy = env::var("AWS_S3_MANAGE_PUBLIC_POLICY")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .map_err(|_| "AWS_S3_MANAGE_PUBLIC_POLICY must be true or false".to_string())?;

        Ok(Some(Self {
            bucket,
            region,
            access_key,
            secret_key,
            endpoint,
            public_endpoint,
            key_prefix,
            max_keys,
            manage_public_policy,
        }))
    }
}

impl CloudinaryConfig {
    const DEFAULT_FOLDER: &'static str = "photo-uploader";
    const DEFAULT_MAX_RESULTS: u32 = 100;
    const DEFAULT_API_BASE_URL: &'static str = "https://api.cloudinary.com";

    /// Returns `None` unless cloud name, API key and API secret are all set
    pub fn from_env() -> Result<Option<Self>, String> {
        let (Some(cloud_name), Some(api_key), Some(api_secret)) = (
            non_empty_var("CLOUDINARY_CLOUD_NAME"),
            non_empty_var("CLOUDINARY_API_KEY"),
            non_empty_var("CLOUDINARY_API_SECRET"),
        ) else {
            return Ok(None);
        };

        let folder = non_empty_var("CLOUDINARY_FOLDER")
            .map(|s| s.trim_matches('/').to_string())
            .unwrap_or_else(|| Self::DEFAULT_FOLDER.to_string());

        let max_results = env::var("CLOUDINARY_MAX_RESULTS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_RESULTS.to_string())
            .parse::<u32>()
            .map_err(|_| "CLOUDINARY_MAX_RESULTS must be a valid number".to_string())?;

        let api_base_url = non_empty_var("CLOUDINARY_API_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| Self::DEFAULT_API_BASE_URL.to_string());

        Ok(Some(Self {
            cloud_name,
            api_key,
            api_secret,
            folder,
            max_results,
            api_base_url,
        }))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_config(upload_backend: StorageKind) -> AppConfig {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_allow_origin: "*".to_string(),
            max_request_body_size: 1024,
            environment: "production".to_string(),
            default_user_id: "default-user".to_string(),
            upload_backend,
        }
    }

    fn swagger_config() -> SwaggerConfig {
        SwaggerConfig {
            username: None,
            password: None,
            title: "t".to_string(),
            version: "v".to_string(),
            description: "d".to_string(),
        }
    }

    fn cloudinary_config() -> CloudinaryConfig {
        CloudinaryConfig {
            cloud_name: "demo".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            folder: "photo-uploader".to_string(),
            max_results: 100,
            api_base_url: "https://api.cloudinary.com".to_string(),
        }
    }

    #[test]
    fn test_validate_requires_a_backend() {
        let config = Config {
            app: app_config(StorageKind::S3),
            swagger: swagger_config(),
            s3: None,
            cloudinary: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unconfigured_upload_backend() {
        let config = Config {
            app: app_config(StorageKind::S3),
            swagger: swagger_config(),
            s3: None,
            cloudinary: Some(cloudinary_config()),
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("aws-s3"));
    }

    #[test]
    fn test_validate_accepts_configured_upload_backend() {
        let config = Config {
            app: app_config(StorageKind::Cloudinary),
            swagger: swagger_config(),
            s3: None,
            cloudinary: Some(cloudinary_config()),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_is_development() {
        let mut app = app_config(StorageKind::S3);
        assert!(!app.is_development());
        app.environment = "Development".to_string();
        assert!(app.is_development());
    }
}
