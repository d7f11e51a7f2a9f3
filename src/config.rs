/*!
 * Configuration types for bucketfs
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FsError, FsResult};
use crate::path::BucketRoot;

/// Part size below which S3 rejects a non-final multipart part
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Default multipart part size
pub const DEFAULT_PART_SIZE: usize = MIN_PART_SIZE;

/// Default ceiling on the number of parts in one upload
pub const DEFAULT_MAX_PARTS: i32 = 1000;

/// Hard ceiling imposed by S3 on part numbers
pub const S3_MAX_PARTS: i32 = 10_000;

/// Filesystem configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsConfig {
    /// Bucket spec, optionally with a sub-path (`bucket/sub/path`)
    pub bucket: String,

    /// AWS region
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Access key ID
    #[serde(default)]
    pub access_key: Option<String>,

    /// Secret access key
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Session token (for temporary credentials)
    #[serde(default)]
    pub session_token: Option<String>,

    /// Use path-style addressing instead of virtual-hosted style
    #[serde(default)]
    pub force_path_style: bool,

    /// Per-operation timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retries performed by the S3 client itself
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Multipart part size in bytes
    #[serde(default = "default_part_size")]
    pub part_size: usize,

    /// Maximum number of parts in one upload
    #[serde(default = "default_max_parts")]
    pub max_parts: i32,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log to this file as JSON instead of stdout
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_part_size() -> usize {
    DEFAULT_PART_SIZE
}

fn default_max_parts() -> i32 {
    DEFAULT_MAX_PARTS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl FsConfig {
    /// Create a config with defaults for the given bucket spec
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
            session_token: None,
            force_path_style: false,
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            part_size: DEFAULT_PART_SIZE,
            max_parts: DEFAULT_MAX_PARTS,
            log_level: default_log_level(),
            log_file: None,
        }
    }

    /// Start a builder for the given bucket spec
    pub fn builder(bucket: impl Into<String>) -> FsConfigBuilder {
        FsConfigBuilder::new(bucket)
    }

    /// Parse an `s3://bucket/sub/path` URI
    pub fn from_uri(uri: &str) -> FsResult<Self> {
        let parsed = url::Url::parse(uri)
            .map_err(|e| FsError::InvalidArgument(format!("Invalid URI '{}': {}", uri, e)))?;

        if parsed.scheme() != "s3" {
            return Err(FsError::InvalidArgument(format!(
                "Unsupported scheme '{}' in '{}', expected s3://",
                parsed.scheme(),
                uri
            )));
        }

        let bucket = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| FsError::InvalidArgument(format!("No bucket in URI '{}'", uri)))?;

        let path = parsed.path().trim_matches('/');
        let spec = if path.is_empty() {
            bucket.to_string()
        } else {
            format!("{}/{}", bucket, path)
        };

        let mut config = Self::new(spec);
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "region" => config.region = Some(value.into_owned()),
                "endpoint" => {
                    config.endpoint = Some(value.into_owned());
                    config.force_path_style = true;
                }
                _ => {}
            }
        }
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> FsResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FsError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> FsResult<Self> {
        let config: FsConfig =
            toml::from_str(contents).map_err(|e| FsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file(&self, path: &Path) -> FsResult<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| FsError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> FsResult<()> {
        BucketRoot::parse(&self.bucket)?;

        if self.part_size == 0 {
            return Err(FsError::InvalidArgument(
                "Part size must be greater than zero".to_string(),
            ));
        }

        if !(1..=S3_MAX_PARTS).contains(&self.max_parts) {
            return Err(FsError::InvalidArgument(format!(
                "Max parts {} must be between 1 and {}",
                self.max_parts, S3_MAX_PARTS
            )));
        }

        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(FsError::Config(
                "Both access_key and secret_key must be provided together".to_string(),
            ));
        }

        Ok(())
    }

    /// Stricter validation for a live S3 store, whose parts have a minimum size
    pub fn validate_for_s3(&self) -> FsResult<()> {
        self.validate()?;
        if self.part_size < MIN_PART_SIZE {
            return Err(FsError::InvalidArgument(format!(
                "Part size {} is below the S3 minimum {}",
                self.part_size, MIN_PART_SIZE
            )));
        }
        Ok(())
    }

    /// Parsed bucket root
    pub fn bucket_root(&self) -> FsResult<BucketRoot> {
        BucketRoot::parse(&self.bucket)
    }

    /// Write stream options derived from this config
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            part_size: self.part_size,
            max_parts: self.max_parts,
        }
    }
}

impl Default for FsConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Builder for FsConfig
pub struct FsConfigBuilder {
    config: FsConfig,
}

impl FsConfigBuilder {
    /// Create a new builder with a bucket spec
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            config: FsConfig::new(bucket),
        }
    }

    /// Set the AWS region
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = Some(region.into());
        self
    }

    /// Set custom endpoint (for MinIO, LocalStack, etc.)
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    /// Set credentials explicitly
    pub fn credentials(mut self, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.config.access_key = Some(access_key.into());
        self.config.secret_key = Some(secret_key.into());
        self
    }

    /// Set session token (for temporary credentials)
    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.config.session_token = Some(token.into());
        self
    }

    /// Enable path-style addressing
    pub fn force_path_style(mut self, force: bool) -> Self {
        self.config.force_path_style = force;
        self
    }

    /// Set timeout in seconds
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.timeout_seconds = seconds;
        self
    }

    /// Set retries performed by the client
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set multipart part size
    pub fn part_size(mut self, size: usize) -> Self {
        self.config.part_size = size;
        self
    }

    /// Set the part count ceiling
    pub fn max_parts(mut self, parts: i32) -> Self {
        self.config.max_parts = parts;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Log to a JSON file
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_file = Some(path.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> FsResult<FsConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Options for a multipart write stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Buffer size at which a part is cut
    pub part_size: usize,

    /// Highest part number the stream may use
    pub max_parts: i32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            max_parts: DEFAULT_MAX_PARTS,
        }
    }
}
