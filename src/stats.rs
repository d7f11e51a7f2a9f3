/*!
 * Filesystem-style stat records for object storage entries
 */

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::path::EntryKind;
use crate::store::ObjectMeta;

/// Stat record synthesized for a directory or built from object metadata
///
/// The entry kind comes from the path the caller asked about, not from
/// anything stored with the object: a key ending in `/` always reports as a
/// directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRecord {
    /// ID of device containing file
    pub dev: u64,
    /// Inode number
    pub ino: u64,
    /// Protection bits
    pub mode: u32,
    /// Number of hard links
    pub nlink: u64,
    /// User ID of owner
    pub uid: u32,
    /// Group ID of owner
    pub gid: u32,
    /// Device ID (if special file)
    pub rdev: u64,
    /// Total size, in bytes
    pub size: u64,
    /// Blocksize for filesystem I/O
    pub blksize: Option<u64>,
    /// Number of 512B blocks allocated
    pub blocks: Option<u64>,
    /// Time of last access
    pub atime: DateTime<Utc>,
    /// Time of last modification
    pub mtime: DateTime<Utc>,
    /// Time of last status change
    pub ctime: DateTime<Utc>,
    /// Creation time, never known for objects
    pub birthtime: Option<DateTime<Utc>>,
    path: String,
    #[serde(skip)]
    kind: EntryKind,
}

impl StatRecord {
    /// Record for a directory: no network round trip, one shared timestamp
    pub fn directory(path: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            dev: 0,
            ino: 0,
            mode: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            size: 0,
            blksize: None,
            blocks: None,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: None,
            path: path.into(),
            kind: EntryKind::DirectoryMarker,
        }
    }

    /// Record for an object from its head metadata
    pub fn file(path: impl Into<String>, meta: &ObjectMeta) -> Self {
        let modified = meta.last_modified.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            dev: 0,
            ino: 0,
            mode: 0,
            nlink: 0,
            uid: 0,
            gid: 0,
            rdev: 0,
            size: meta.size,
            blksize: None,
            blocks: None,
            atime: modified,
            mtime: modified,
            ctime: modified,
            birthtime: None,
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    /// Path the record was requested for
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Entry kind the record was built for
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::DirectoryMarker
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_block_device(&self) -> bool {
        false
    }

    pub fn is_character_device(&self) -> bool {
        false
    }

    pub fn is_symbolic_link(&self) -> bool {
        false
    }

    pub fn is_fifo(&self) -> bool {
        false
    }

    pub fn is_socket(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_directory_record() {
        let now = Utc::now();
        let stats = StatRecord::directory("dir/", now);
        assert!(stats.is_directory());
        assert!(!stats.is_file());
        assert_eq!(stats.size, 0);
        assert_eq!(stats.nlink, 1);
        assert_eq!(stats.atime, now);
        assert_eq!(stats.mtime, stats.ctime);
        assert_eq!(stats.path(), "dir/");
    }

    #[test]
    fn test_file_record_uses_last_modified() {
        let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let meta = ObjectMeta {
            size: 42,
            last_modified: Some(modified),
            ..Default::default()
        };
        let stats = StatRecord::file("file.json", &meta);
        assert!(stats.is_file());
        assert_eq!(stats.size, 42);
        assert_eq!(stats.nlink, 0);
        assert_eq!(stats.atime, modified);
        assert_eq!(stats.mtime, modified);
        assert_eq!(stats.ctime, modified);
        assert!(stats.birthtime.is_none());
    }

    #[test]
    fn test_special_file_predicates() {
        let stats = StatRecord::directory("x/", Utc::now());
        assert!(!stats.is_block_device());
        assert!(!stats.is_character_device());
        assert!(!stats.is_symbolic_link());
        assert!(!stats.is_fifo());
        assert!(!stats.is_socket());
    }
}
