//! S3-compatible storage client
//!
//! Uploads media into `{prefix}/{user}/` and lists it back. Works against AWS
//! or any S3-compatible store reachable through a custom endpoint.
//!
//! Uses rust-s3 crate for lightweight S3 operations.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use s3::creds::Credentials;
use s3::{Bucket, BucketConfiguration, Region};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::types::{
    extension_of, MediaType, StorageError, StorageKind, StoredObject, UploadObject,
};
use super::StorageBackend;
use crate::core::config::S3Config;

type HmacSha256 = Hmac<Sha256>;

/// S3-compatible storage client
pub struct S3Client {
    bucket: Box<Bucket>,
    region: Region,
    credentials: Credentials,
    config: S3Config,
    /// HTTP client for bucket policy operations
    http_client: Client,
}

impl S3Client {
    /// Create a new S3 client from configuration
    ///
    /// With a custom endpoint the bucket is created when missing. When
    /// `manage_public_policy` is set, a public-read policy is installed for
    /// the key prefix.
    pub async fn new(config: S3Config) -> Result<Self, StorageError> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Configuration(format!("Invalid S3 credentials: {}", e)))?;

        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config.region.parse::<Region>().map_err(|e| {
                StorageError::Configuration(format!("Invalid AWS region '{}': {}", config.region, e))
            })?,
        };

        let mut bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(|e| StorageError::Configuration(format!("Failed to create S3 bucket handle: {}", e)))?;

        // Custom endpoints (MinIO and friends) need path-style URLs
        if config.endpoint.is_some() {
            bucket.set_path_style();
        }

        let http_client = Client::builder().build().map_err(|e| {
            StorageError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        let client = Self {
            bucket,
            region,
            credentials,
            config,
            http_client,
        };

        if client.config.endpoint.is_some() {
            client.ensure_bucket_exists().await;
        }
        if client.config.manage_public_policy {
            client.set_public_read_policy().await;
        }

        info!(
            "S3 client initialized for bucket: {}, region: {}, key_prefix: {}",
            client.config.bucket, client.config.region, client.config.key_prefix
        );

        Ok(client)
    }

    /// Ensure the bucket exists, create if not
    async fn ensure_bucket_exists(&self) {
        let result = Bucket::create_with_path_style(
            &self.config.bucket,
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await;

        match result {
            Ok(_) => info!("Bucket '{}' created successfully", self.config.bucket),
            Err(e) => {
                let error_str = e.to_string();
                if error_str.contains("BucketAlreadyOwnedByYou")
                    || error_str.contains("BucketAlreadyExists")
                    || error_str.contains("already own it")
                {
                    debug!("Bucket '{}' already exists", self.config.bucket);
                } else {
                    warn!(
                        "Could not create bucket '{}': {}. Assuming it exists.",
                        self.config.bucket, e
                    );
                }
            }
        }
    }

    /// Allow anonymous reads of everything under the key prefix
    async fn set_public_read_policy(&self) {
        let bucket_name = &self.config.bucket;
        let key_prefix = &self.config.key_prefix;

        let policy = json!({
            "Version": "2012-10-17",
            "Statement": [
                {
                    "Effect": "Allow",
                    "Principal": {"AWS": "*"},
                    "Action": ["s3:GetObject"],
                    "Resource": [format!("arn:aws:s3:::{bucket_name}/{key_prefix}/*")]
                }
            ]
        });

        match self.put_bucket_policy_with_sigv4(&policy.to_string()).await {
            Ok(()) => info!("Set public read policy for {}/{}/*", bucket_name, key_prefix),
            Err(e) => warn!(
                "Failed to set bucket policy for '{}': {}. Objects may not be publicly readable.",
                bucket_name, e
            ),
        }
    }

    fn service_endpoint(&self) -> String {
        self.config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.config.region))
    }

    /// Put bucket policy using AWS Signature v4
    async fn put_bucket_policy_with_sigv4(&self, policy: &str) -> Result<(), StorageError> {
        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let endpoint = self.service_endpoint();
        let endpoint_url = Url::parse(&endpoint).map_err(|e| {
            StorageError::Configuration(format!("Invalid endpoint URL '{}': {}", endpoint, e))
        })?;
        let host = endpoint_url
            .host_str()
            .ok_or_else(|| StorageError::Configuration("Endpoint URL has no host".to_string()))?;
        let host_header = match endpoint_url.port() {
            Some(p) => format!("{}:{}", host, p),
            None => host.to_string(),
        };

        let bucket_name = &self.config.bucket;
        let url = format!("{}/{}?policy", endpoint, bucket_name);
        let payload_hash = hex::encode(Sha256::digest(policy.as_bytes()));

        let canonical_uri = format!("/{}", bucket_name);
        let canonical_querystring = "policy=";
        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            host_header, payload_hash, amz_date
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";

        let canonical_request = format!(
            "PUT\n{}\n{}\n{}\n{}\n{}",
            canonical_uri, canonical_querystring, canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let canonical_request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm, amz_date, credential_scope, canonical_request_hash
        );

        let signature = signature_v4(
            &self.config.secret_key,
            &date_stamp,
            &self.config.region,
            &string_to_sign,
        )?;

        let authorization_header = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.config.access_key, credential_scope, signed_headers, signature
        );

        let response = self
            .http_client
            .put(&url)
            .header("Host", &host_header)
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", &payload_hash)
            .header("Authorization", &authorization_header)
            .header("Content-Type", "application/json")
            .body(policy.to_string())
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(StorageError::Response { status, message })
        }
    }

    /// Key prefix of one user's namespace, with trailing slash
    pub fn user_prefix(&self, user_id: &str) -> String {
        format!("{}/{}/", self.config.key_prefix, user_id)
    }

    pub fn bucket_name(&self) -> &str {
        &self.config.bucket
    }
}

#[async_trait]
impl StorageBackend for S3Client {
    fn kind(&self) -> StorageKind {
        StorageKind::S3
    }

    async fn upload(&self, object: UploadObject) -> Result<StoredObject, StorageError> {
        let key = format!("{}{}", self.user_prefix(&object.user_id), object.storage_name);
        let size = object.data.len() as u64;
        let uploaded_at = Utc::now();
        let metadata = metadata_headers(&object, uploaded_at)?;

        let response = self
            .bucket
            .put_object_with_content_type_and_headers(
                &key,
                &object.data,
                &object.content_type,
                Some(metadata),
            )
            .await?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Response {
                status,
                message: String::from_utf8_lossy(response.as_slice()).into_owned(),
            });
        }

        debug!("Uploaded object '{}' to bucket '{}'", key, self.config.bucket);

        let format = extension_of(&object.original_name);
        Ok(StoredObject {
            url: object_url(&self.config, &key),
            id: key,
            original_name: object.original_name,
            size,
            media_type: MediaType::from_mime(&object.content_type),
            uploaded_at,
            format,
            storage: StorageKind::S3,
        })
    }

    async fn list(&self, user_id: &str) -> Result<Vec<StoredObject>, StorageError> {
        let prefix = self.user_prefix(user_id);
        let (page, _) = self
            .bucket
            .list_page(prefix.clone(), None, None, None, Some(self.config.max_keys))
            .await?;
        if page.is_truncated {
            debug!(
                "Listing under '{}' truncated at {} keys",
                prefix, self.config.max_keys
            );
        }

        let objects: Vec<StoredObject> = page
            .contents
            .into_iter()
            .filter_map(|object| {
                stored_object_from_listing(&self.config, object.key, &object.last_modified, object.size)
            })
            .collect();

        debug!("Found {} objects under '{}'", objects.len(), prefix);
        Ok(objects)
    }
}

/// `x-amz-meta-*` headers stored with every upload
///
/// Header values must be visible ASCII, so the client filename is
/// percent-encoded.
fn metadata_headers(
    object: &UploadObject,
    uploaded_at: DateTime<Utc>,
) -> Result<HeaderMap, StorageError> {
    let entries = [
        ("original-name", urlencoding::encode(&object.original_name).into_owned()),
        ("user-id", object.user_id.clone()),
        (
            "upload-date",
            uploaded_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
        ("file-size", object.data.len().to_string()),
    ];

    let mut headers = HeaderMap::new();
    for (name, value) in entries {
        let header_name = HeaderName::from_bytes(format!("x-amz-meta-{}", name).as_bytes())
            .map_err(|e| StorageError::Request(format!("Invalid metadata name '{}': {}", name, e)))?;
        let header_value = HeaderValue::from_str(&value).map_err(|e| {
            StorageError::Request(format!("Invalid metadata value for '{}': {}", name, e))
        })?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

/// Normalize one `ListObjectsV2` entry
///
/// Entries with an unparseable `LastModified` and directory markers are
/// skipped.
fn stored_object_from_listing(
    config: &S3Config,
    key: String,
    last_modified: &str,
    size: u64,
) -> Option<StoredObject> {
    if key.ends_with('/') {
        return None;
    }

    let uploaded_at = match DateTime::parse_from_rfc3339(last_modified) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            warn!(
                "Skipping object '{}' with invalid LastModified '{}': {}",
                key, last_modified, e
            );
            return None;
        }
    };

    let file_name = key.rsplit('/').next().unwrap_or(&key).to_string();
    let format = extension_of(&file_name);

    Some(StoredObject {
        url: object_url(config, &key),
        media_type: MediaType::from_extension(&format),
        original_name: file_name,
        size,
        uploaded_at,
        format,
        storage: StorageKind::S3,
        id: key,
    })
}

/// Public URL of an object key
///
/// Uses the public endpoint when configured, the custom endpoint (path style)
/// otherwise, and falls back to the virtual-hosted AWS URL.
pub fn object_url(config: &S3Config, key: &str) -> String {
    let encoded_key = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    match (&config.public_endpoint, &config.endpoint) {
        (Some(public), _) => format!("{}/{}/{}", public, config.bucket, encoded_key),
        (None, Some(endpoint)) => format!("{}/{}/{}", endpoint, config.bucket, encoded_key),
        (None, None) => format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            config.bucket, config.region, encoded_key
        ),
    }
}

/// Calculate AWS Signature v4 signature
fn signature_v4(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    string_to_sign: &str,
) -> Result<String, StorageError> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, b"s3")?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;

    let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes())?;
    Ok(hex::encode(signature))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StorageError::Configuration(format!("HMAC key error: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
