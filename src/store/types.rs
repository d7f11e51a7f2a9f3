//! Request and response types shared by object store implementations

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use std::collections::HashMap;
use std::pin::Pin;

/// Async read stream for object data
pub type ReadStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Object metadata returned by a head request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMeta {
    /// Object size in bytes
    pub size: u64,

    /// Last modified timestamp
    pub last_modified: Option<DateTime<Utc>>,

    /// ETag (entity tag)
    pub etag: Option<String>,

    /// Content type
    pub content_type: Option<String>,

    /// User-defined metadata
    pub metadata: HashMap<String, String>,
}

/// One object in a listing page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSummary {
    /// Object key (full key as returned by the store, or prefix-stripped
    /// once it leaves the lister)
    pub key: String,

    /// Object size in bytes
    pub size: u64,

    /// Last modified timestamp
    pub last_modified: Option<DateTime<Utc>>,

    /// ETag
    pub etag: Option<String>,
}

/// A single listing request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Only keys beginning with this prefix; `None` lists the whole bucket
    pub prefix: Option<String>,

    /// Group keys sharing the next delimiter into common prefixes
    pub delimiter: Option<String>,

    /// Return keys lexically after this one
    pub marker: Option<String>,

    /// Page size hint
    pub max_keys: Option<i32>,
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    /// Objects on this page, in lexical key order
    pub contents: Vec<ObjectSummary>,

    /// Common prefixes (directories) on this page
    pub common_prefixes: Vec<String>,

    /// Whether more results follow this page
    pub is_truncated: bool,

    /// Continuation marker supplied by the service, if any
    pub next_marker: Option<String>,
}

/// Options applied when creating an object or multipart session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Content type / MIME type
    pub content_type: Option<String>,

    /// User-defined metadata
    pub metadata: HashMap<String, String>,
}

impl PutOptions {
    /// Create with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add one user metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Result of a single-object put
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOutput {
    /// ETag assigned by the service
    pub etag: Option<String>,
}

/// A part that has been uploaded and can be listed in a completion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number
    pub part_number: i32,

    /// ETag assigned to the part by the service
    pub etag: String,
}

/// Per-key failure inside a batched delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteError {
    pub key: String,
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Outcome of a batched delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteObjectsOutput {
    /// Keys the service reported as deleted
    pub deleted: Vec<String>,

    /// Keys the service could not delete
    pub errors: Vec<DeleteError>,
}

impl DeleteObjectsOutput {
    /// Fold another batch into this one
    pub fn merge(&mut self, other: DeleteObjectsOutput) {
        self.deleted.extend(other.deleted);
        self.errors.extend(other.errors);
    }
}

/// Options for bucket creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateBucketOptions {
    /// Region constraint for the new bucket
    pub location_constraint: Option<String>,
}

/// A single expiration rule for a bucket lifecycle configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRule {
    /// Rule identifier
    pub id: String,

    /// Key prefix the rule applies to
    pub prefix: String,

    /// Days after creation at which objects expire
    pub expiration_days: i32,
}
