use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ObjectStore, ObjectStoreExt, PutPayload};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorDetails};

/// Where uploaded feedback photos go.
/// Every enabled variant carries the public URL prefix that stored keys are appended to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhotoStorageKind {
    S3Compatible {
        bucket_name: Option<String>,
        region: Option<String>,
        endpoint: Option<String>,
        allow_http: Option<bool>,
        public_url: String,
    },
    Filesystem {
        path: String,
        public_url: String,
    },
    #[default]
    Disabled,
}

#[derive(Clone, Debug)]
pub struct PhotoStorageInfo {
    // `None` when photo storage is disabled
    object_store: Option<Arc<dyn ObjectStore>>,
    public_url: String,
}

impl PhotoStorageInfo {
    pub fn new(kind: &PhotoStorageKind) -> Result<Self, Error> {
        match kind {
            PhotoStorageKind::Filesystem { path, public_url } => {
                let store = LocalFileSystem::new_with_prefix(path).map_err(|e| {
                    Error::new(ErrorDetails::Config {
                        message: format!(
                            "Failed to create filesystem photo storage for path `{path}`: {e}"
                        ),
                    })
                })?;
                Ok(Self::new_with_object_store(
                    Arc::new(store),
                    public_url.clone(),
                ))
            }
            PhotoStorageKind::S3Compatible {
                bucket_name,
                region,
                endpoint,
                allow_http,
                public_url,
            } => {
                let mut builder = AmazonS3Builder::from_env();

                // These env vars have the highest priority, overriding whatever was set from 'AmazonS3Builder::from_env()'
                if let Ok(s3_access_key) = std::env::var("S3_ACCESS_KEY_ID") {
                    let s3_secret_key = std::env::var("S3_SECRET_ACCESS_KEY").map_err(|_| {
                        Error::new(ErrorDetails::Config {
                            message: "S3_ACCESS_KEY_ID is set but S3_SECRET_ACCESS_KEY is not. Please set either both or none".to_string(),
                        })
                    })?;
                    builder = builder
                        .with_access_key_id(s3_access_key)
                        .with_secret_access_key(s3_secret_key);
                }
                if let Some(bucket_name) = bucket_name {
                    builder = builder.with_bucket_name(bucket_name);
                }
                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(allow_http) = *allow_http {
                    if allow_http {
                        tracing::warn!(
                            "`[photo_storage].allow_http` is set to `true` - this is insecure, and should only be used with a local S3-compatible object store"
                        );
                    }
                    builder = builder.with_allow_http(allow_http);
                }

                let store = builder.build().map_err(|e| {
                    Error::new(ErrorDetails::Config {
                        message: format!("Failed to create S3-compatible photo storage: {e}"),
                    })
                })?;
                Ok(Self::new_with_object_store(
                    Arc::new(store),
                    public_url.clone(),
                ))
            }
            PhotoStorageKind::Disabled => Ok(Self::disabled()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            object_store: None,
            public_url: String::new(),
        }
    }

    pub fn new_with_object_store(object_store: Arc<dyn ObjectStore>, public_url: String) -> Self {
        Self {
            object_store: Some(object_store),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.object_store.is_some()
    }

    /// The URL under which a stored key is publicly reachable
    pub fn public_url_for(&self, key: &str) -> String {
        format!("{}/{key}", self.public_url)
    }

    /// Store `data` under `key` and return its public URL
    pub async fn upload_photo(&self, key: &str, data: Bytes) -> Result<String, Error> {
        let Some(store) = &self.object_store else {
            return Err(Error::new(ErrorDetails::PhotoStorageDisabled));
        };
        store
            .put(&Path::from(key), PutPayload::from(data))
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::PhotoUpload {
                    key: key.to_string(),
                    message: e.to_string(),
                })
            })?;
        Ok(self.public_url_for(key))
    }
}
