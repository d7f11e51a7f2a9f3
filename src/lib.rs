/*!
 * bucketfs - a filesystem-shaped interface over S3 object storage
 *
 * - Path translation from caller paths to bucket keys, scoped to a prefix
 * - Directory emulation with delimiter listings and zero-byte markers
 * - Paginated listings that follow continuation markers to the end
 * - Recursive delete and copy fanned out across concurrent requests
 * - Streaming writes that become multipart uploads past the part size
 * - Stat records synthesized for directories or built from object metadata
 */

pub mod callback;
pub mod config;
pub mod error;
pub mod fs;
pub mod logging;
pub mod path;
pub mod stats;
pub mod store;

// Re-export commonly used types
pub use config::{FsConfig, FsConfigBuilder, WriteOptions};
pub use error::{FsError, FsResult};
pub use fs::{BucketFs, FileBody, FileSystem, MultipartWriteStream, UploadSummary};
pub use path::{BucketRoot, EntryKind, ObjectPath};
pub use stats::StatRecord;
pub use store::{MemoryStore, ObjectStore, PutOptions};

#[cfg(feature = "s3-native")]
pub use store::S3Store;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
