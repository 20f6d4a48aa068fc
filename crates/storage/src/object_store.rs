//! Object storage (spec §6): byte-level upload/download/delete/head against
//! S3-compatible storage, plus the key-generation and public-URL-building
//! helpers every upload call site needs.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for MinIO/other S3-compatible backends; `None` for AWS S3.
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Path prefix every generated key is placed under.
    #[serde(default)]
    pub prefix: String,
    /// Local-dev override for the public URL builder, checked first.
    #[serde(default)]
    pub dev_public_url: Option<String>,
    /// A CDN/public domain fronting the bucket, checked second.
    #[serde(default)]
    pub public_domain: Option<String>,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            bucket: "doc-agent".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            prefix: String::new(),
            dev_public_url: None,
            public_domain: None,
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `bytes` under `key`, returning a public URL when one can be
    /// built.
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> StorageResult<Option<String>>;

    /// Downloads the object at `key`, or `None` if it doesn't exist.
    async fn download(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn head(&self, key: &str) -> StorageResult<bool>;

    /// Builds `{prefix}/{user_id}/{uuid}{ext}`, the naming convention every
    /// upload call site uses.
    fn generate_key(&self, user_id: &str, ext: &str) -> String;

    /// Prefers a configured dev URL, then a configured public domain, then
    /// an endpoint-derived URL.
    fn public_url(&self, key: &str) -> Option<String>;
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    prefix: String,
    dev_public_url: Option<String>,
    public_domain: Option<String>,
    endpoint: Option<String>,
}

impl S3ObjectStore {
    pub async fn new(config: ObjectStoreConfig) -> StorageResult<Self> {
        let credentials = Credentials::new(&config.access_key_id, &config.secret_access_key, None, None, "doc-agent-storage");
        let region = Region::new(config.region.clone());

        let mut builder = aws_sdk_s3::Config::builder().credentials_provider(credentials).region(region).behavior_version_latest();

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        Ok(Self {
            client,
            bucket: config.bucket,
            prefix: config.prefix,
            dev_public_url: config.dev_public_url,
            public_domain: config.public_domain,
            endpoint: config.endpoint,
        })
    }

    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), key)
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> StorageResult<Option<String>> {
        let full_key = self.full_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| StorageError::ObjectStore(err.to_string()))?;

        Ok(self.public_url(key))
    }

    async fn download(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let full_key = self.full_key(key);
        let response = self.client.get_object().bucket(&self.bucket).key(&full_key).send().await;

        let response = match response {
            Ok(response) => response,
            Err(err) if err.to_string().contains("NoSuchKey") => return Ok(None),
            Err(err) => return Err(StorageError::ObjectStore(err.to_string())),
        };

        let bytes = response.body.collect().await.map_err(|err| StorageError::ObjectStore(err.to_string()))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let full_key = self.full_key(key);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|err| StorageError::ObjectStore(err.to_string()))?;
        Ok(())
    }

    async fn head(&self, key: &str) -> StorageResult<bool> {
        let full_key = self.full_key(key);
        match self.client.head_object().bucket(&self.bucket).key(&full_key).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.to_string().contains("NotFound") => Ok(false),
            Err(err) => Err(StorageError::ObjectStore(err.to_string())),
        }
    }

    fn generate_key(&self, user_id: &str, ext: &str) -> String {
        let prefix = if self.prefix.is_empty() { String::new() } else { format!("{}/", self.prefix.trim_end_matches('/')) };
        format!("{prefix}{user_id}/{}{ext}", Uuid::new_v4())
    }

    fn public_url(&self, key: &str) -> Option<String> {
        let full_key = self.full_key(key);
        if let Some(dev_url) = &self.dev_public_url {
            return Some(format!("{}/{full_key}", dev_url.trim_end_matches('/')));
        }
        if let Some(domain) = &self.public_domain {
            return Some(format!("https://{}/{full_key}", domain.trim_end_matches('/')));
        }
        self.endpoint.as_ref().map(|endpoint| format!("{}/{}/{full_key}", endpoint.trim_end_matches('/'), self.bucket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(config: ObjectStoreConfig) -> S3ObjectStore {
        S3ObjectStore {
            client: Client::from_conf(aws_sdk_s3::Config::builder().behavior_version_latest().region(Region::new("us-east-1")).build()),
            bucket: config.bucket,
            prefix: config.prefix,
            dev_public_url: config.dev_public_url,
            public_domain: config.public_domain,
            endpoint: config.endpoint,
        }
    }

    #[test]
    fn full_key_joins_prefix() {
        let store = store(ObjectStoreConfig { prefix: "chat_images".to_string(), ..Default::default() });
        assert_eq!(store.full_key("abc.png"), "chat_images/abc.png");
    }

    #[test]
    fn generate_key_matches_prefix_user_uuid_ext_convention() {
        let store = store(ObjectStoreConfig { prefix: "chat_images".to_string(), ..Default::default() });
        let key = store.generate_key("user-1", ".png");
        assert!(key.starts_with("chat_images/user-1/"));
        assert!(key.ends_with(".png"));
    }

    #[test]
    fn public_url_prefers_dev_url_over_domain_over_endpoint() {
        let store = store(ObjectStoreConfig {
            dev_public_url: Some("http://localhost:9000/bucket".to_string()),
            public_domain: Some("cdn.example.com".to_string()),
            endpoint: Some("http://minio:9000".to_string()),
            ..Default::default()
        });
        assert_eq!(store.public_url("a.png").unwrap(), "http://localhost:9000/bucket/a.png");

        let store = store(ObjectStoreConfig { public_domain: Some("cdn.example.com".to_string()), endpoint: Some("http://minio:9000".to_string()), ..Default::default() });
        assert_eq!(store.public_url("a.png").unwrap(), "https://cdn.example.com/a.png");

        let store = store(ObjectStoreConfig { endpoint: Some("http://minio:9000".to_string()), bucket: "b".to_string(), ..Default::default() });
        assert_eq!(store.public_url("a.png").unwrap(), "http://minio:9000/b/a.png");
    }
}
