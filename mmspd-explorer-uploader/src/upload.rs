#![doc = "S3 implementation of the core object-store contract."]
//
//! This module wires the [`ObjectStore`] trait from `explorer-uploader-core` to the
//! AWS SDK. One [`S3Store`] is built at startup and shared by every uploader worker;
//! the SDK client is internally reference counted and safe for concurrent use.
//!
//! Credentials are resolved by `aws-config` (environment, profile files, instance
//! metadata). `--endpoint-url` points the client at an S3-compatible service such as
//! MinIO, in which case path-style addressing is used.

use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use explorer_uploader_core::contract::{ObjectStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsSettings {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub async fn connect(bucket: impl Into<String>, aws: &AwsSettings) -> Self {
        let bucket = bucket.into();
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = &aws.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &aws.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(url) = &aws.endpoint_url {
            loader = loader.endpoint_url(url);
        }
        let conf = loader.load().await;

        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(aws.endpoint_url.is_some())
            .build();
        tracing::info!(
            bucket = %bucket,
            profile = aws.profile.as_deref().unwrap_or("default"),
            region = conf.region().map(|r| r.as_ref()).unwrap_or("unset"),
            endpoint_url = aws.endpoint_url.as_deref().unwrap_or("aws"),
            "Initialized S3 client"
        );
        Self {
            client: Client::from_conf(s3_conf),
            bucket,
        }
    }
}

fn content_type(key: &str) -> &'static str {
    if key.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> String {
        self.bucket.clone()
    }

    async fn put_file(&self, path: &Path, key: &str) -> Result<(), StoreError> {
        let body = ByteStream::from_path(path).await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type(key))
            .body(body)
            .send()
            .await
            .map_err(|e| DisplayErrorContext(e).to_string())?;
        Ok(())
    }
}
