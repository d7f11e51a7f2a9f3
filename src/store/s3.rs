//! Object store backed by AWS S3 or an S3-compatible service

use super::types::{
    CompletedPart, CreateBucketOptions, DeleteError, DeleteObjectsOutput, LifecycleRule, ListPage,
    ListRequest, ObjectMeta, ObjectSummary, PutOptions, PutOutput, ReadStream,
};
use super::ObjectStore;
use crate::config::FsConfig;
use crate::error::{FsError, FsResult};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::types::{
    BucketLifecycleConfiguration, BucketLocationConstraint, CompletedMultipartUpload,
    CreateBucketConfiguration, Delete, ExpirationStatus, LifecycleExpiration,
    LifecycleRuleFilter, ObjectIdentifier,
};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Characters left unescaped in a copy source locator
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Read buffer size for object bodies
const CHUNK_SIZE: usize = 1024 * 1024;

/// S3 implementation of [`ObjectStore`]
#[derive(Clone, Debug)]
pub struct S3Store {
    client: AwsS3Client,
}

impl S3Store {
    /// Build a client from configuration
    ///
    /// Region and credentials fall back to the standard AWS provider chain
    /// when not set explicitly.
    ///
    /// ```no_run
    /// use bucketfs::{FsConfig, S3Store};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = FsConfig::new("my-bucket/prefix");
    /// let store = S3Store::new(&config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: &FsConfig) -> FsResult<Self> {
        config.validate()?;
        let client = Self::build_aws_client(config).await;
        Ok(Self { client })
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: AwsS3Client) -> Self {
        Self { client }
    }

    /// Underlying SDK client
    pub fn aws_client(&self) -> &AwsS3Client {
        &self.client
    }

    async fn build_aws_client(config: &FsConfig) -> AwsS3Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        let region_provider = match &config.region {
            Some(region) => RegionProviderChain::first_try(Region::new(region.clone())),
            None => RegionProviderChain::default_provider(),
        };
        loader = loader.region(region_provider);

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            let credentials = Credentials::new(
                access_key,
                secret_key,
                config.session_token.clone(),
                None,
                "bucketfs-explicit",
            );
            loader = loader.credentials_provider(credentials);
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        // MinIO, LocalStack and most self-hosted services need path-style URLs
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        builder = builder
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(config.timeout_seconds))
                    .build(),
            )
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_retries + 1));

        AwsS3Client::from_conf(builder.build())
    }
}

fn to_chrono(dt: Option<&AwsDateTime>) -> Option<DateTime<Utc>> {
    dt.and_then(|dt| SystemTime::try_from(*dt).ok())
        .map(DateTime::<Utc>::from)
}

fn build_error(e: impl std::fmt::Display) -> FsError {
    FsError::Protocol(format!("Failed to build request: {}", e))
}

fn metadata_or_none(metadata: &HashMap<String, String>) -> Option<HashMap<String, String>> {
    if metadata.is_empty() {
        None
    } else {
        Some(metadata.clone())
    }
}

fn not_found(bucket: &str, key: &str) -> FsError {
    FsError::NotFound {
        bucket: bucket.to_string(),
        key: key.to_string(),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn create_bucket(&self, bucket: &str, options: CreateBucketOptions) -> FsResult<()> {
        let configuration = options.location_constraint.map(|region| {
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region.as_str()))
                .build()
        });
        self.client
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(configuration)
            .send()
            .await?;
        debug!(bucket, "bucket created");
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> FsResult<()> {
        self.client.delete_bucket().bucket(bucket).send().await?;
        debug!(bucket, "bucket deleted");
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        options: &PutOptions,
    ) -> FsResult<PutOutput> {
        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(options.content_type.clone())
            .set_metadata(metadata_or_none(&options.metadata))
            .send()
            .await?;
        Ok(PutOutput {
            etag: output.e_tag().map(str::to_string),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> FsResult<ReadStream> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    not_found(bucket, key)
                } else {
                    FsError::from(e)
                }
            })?;

        let reader = output.body.into_async_read();
        let stream = stream::unfold(
            (reader, vec![0u8; CHUNK_SIZE]),
            |(mut reader, mut buffer)| async move {
                match reader.read(&mut buffer).await {
                    Ok(0) => None,
                    Ok(n) => {
                        let data = Bytes::copy_from_slice(&buffer[..n]);
                        Some((Ok(data), (reader, buffer)))
                    }
                    Err(e) => Some((Err(e), (reader, buffer))),
                }
            },
        );

        Ok(Box::pin(stream))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> FsResult<ObjectMeta> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                // HEAD responses carry no body, so a 404 arrives without an error code
                let missing = e.as_service_error().is_some_and(|se| se.is_not_found())
                    || e.raw_response().is_some_and(|r| r.status().as_u16() == 404);
                if missing {
                    not_found(bucket, key)
                } else {
                    FsError::from(e)
                }
            })?;

        Ok(ObjectMeta {
            size: output.content_length().unwrap_or(0).max(0) as u64,
            last_modified: to_chrono(output.last_modified()),
            etag: output.e_tag().map(str::to_string),
            content_type: output.content_type().map(str::to_string),
            metadata: output.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn list_objects(&self, bucket: &str, request: &ListRequest) -> FsResult<ListPage> {
        let output = self
            .client
            .list_objects()
            .bucket(bucket)
            .set_prefix(request.prefix.clone())
            .set_delimiter(request.delimiter.clone())
            .set_marker(request.marker.clone())
            .set_max_keys(request.max_keys)
            .send()
            .await?;

        let contents = output
            .contents()
            .iter()
            .filter_map(|obj| {
                Some(ObjectSummary {
                    key: obj.key()?.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: to_chrono(obj.last_modified()),
                    etag: obj.e_tag().map(str::to_string),
                })
            })
            .collect();

        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        Ok(ListPage {
            contents,
            common_prefixes,
            is_truncated: output.is_truncated().unwrap_or(false),
            next_marker: output.next_marker().map(str::to_string),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> FsResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> FsResult<DeleteObjectsOutput> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build().map_err(build_error))
            .collect::<FsResult<Vec<_>>>()?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .map_err(build_error)?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await?;

        Ok(DeleteObjectsOutput {
            deleted: output
                .deleted()
                .iter()
                .filter_map(|d| d.key().map(str::to_string))
                .collect(),
            errors: output
                .errors()
                .iter()
                .map(|e| DeleteError {
                    key: e.key().unwrap_or_default().to_string(),
                    code: e.code().map(str::to_string),
                    message: e.message().map(str::to_string),
                })
                .collect(),
        })
    }

    async fn copy_object(&self, bucket: &str, copy_source: &str, key: &str) -> FsResult<()> {
        let encoded = utf8_percent_encode(copy_source, COPY_SOURCE).to_string();
        self.client
            .copy_object()
            .bucket(bucket)
            .copy_source(encoded)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        options: &PutOptions,
    ) -> FsResult<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(options.content_type.clone())
            .set_metadata(metadata_or_none(&options.metadata))
            .send()
            .await?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| FsError::Protocol("No upload ID returned".to_string()))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> FsResult<String> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await?;

        output
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| FsError::Protocol(format!("No ETag returned for part {}", part_number)))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> FsResult<PutOutput> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|p| {
                        aws_sdk_s3::types::CompletedPart::builder()
                            .part_number(p.part_number)
                            .e_tag(&p.etag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await?;

        Ok(PutOutput {
            etag: output.e_tag().map(str::to_string),
        })
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> FsResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await?;
        Ok(())
    }

    async fn put_bucket_lifecycle(&self, bucket: &str, rules: &[LifecycleRule]) -> FsResult<()> {
        let rules = rules
            .iter()
            .map(|rule| {
                aws_sdk_s3::types::LifecycleRule::builder()
                    .id(&rule.id)
                    .filter(LifecycleRuleFilter::builder().prefix(&rule.prefix).build())
                    .status(ExpirationStatus::Enabled)
                    .expiration(
                        LifecycleExpiration::builder()
                            .days(rule.expiration_days)
                            .build(),
                    )
                    .build()
                    .map_err(build_error)
            })
            .collect::<FsResult<Vec<_>>>()?;

        let configuration = BucketLifecycleConfiguration::builder()
            .set_rules(Some(rules))
            .build()
            .map_err(build_error)?;

        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(bucket)
            .lifecycle_configuration(configuration)
            .send()
            .await?;
        Ok(())
    }
}
