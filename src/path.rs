//! Path to object-key translation
//!
//! Object storage has a flat key space. Everything that looks like a path on
//! the caller's side goes through this module before it touches the store:
//! segments are split on either slash style, `.` and `..` are resolved, and
//! when the root carries a sub-prefix, a fully qualified `bucket/prefix/...`
//! path has that leading portion removed. A root without a prefix strips
//! nothing, so a top-level key spelled like the bucket stays reachable.
//!
//! A `..` that would climb above the root is dropped rather than rejected.

use crate::error::{FsError, FsResult};

/// Longest key accepted by S3-compatible services, in bytes
pub const MAX_KEY_LENGTH: usize = 1024;

/// What a caller path denotes, derived once from its spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular object
    File,
    /// A directory, stored (if at all) as a zero-byte key ending in `/`
    DirectoryMarker,
}

/// Bucket name plus the key prefix every operation is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRoot {
    bucket: String,
    /// Empty, or a normalized prefix ending in `/`
    prefix: String,
}

impl BucketRoot {
    /// Split a bucket spec such as `bucket/sub/path` into name and prefix
    pub fn parse(spec: &str) -> FsResult<Self> {
        let mut segments = decompose_path(spec).into_iter();
        let bucket = segments
            .next()
            .ok_or_else(|| FsError::InvalidArgument("bucket is required".to_string()))?;
        let rest: Vec<String> = segments.collect();
        let prefix = normalize_segments(&rest).join("/");
        Ok(Self::from_parts(bucket, &prefix))
    }

    fn from_parts(bucket: String, prefix: &str) -> Self {
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix.trim_end_matches('/'))
        };
        Self { bucket, prefix }
    }

    /// Bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Key prefix (empty or ending in `/`)
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Bucket spec this root was parsed from, without trailing slash
    pub fn spec(&self) -> String {
        join_paths(&[&self.bucket, &self.prefix])
    }

    /// Root scoped to a sub-path of this one
    pub fn child(&self, subpath: &str) -> FsResult<Self> {
        Self::parse(&join_paths(&[&self.bucket, &self.prefix, subpath]))
    }

    /// Full storage key for a key relative to this root
    pub fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Translate any caller path into a key relative to this root
    pub fn to_key(&self, path: &str) -> String {
        to_key(path, Some(self))
    }
}

/// A caller path resolved to a root-relative key and its entry kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath {
    key: String,
    kind: EntryKind,
}

impl ObjectPath {
    /// Resolve a caller path against a bucket root
    ///
    /// The kind is a directory when the caller spelled the path with a
    /// trailing slash, or when it resolves to the root itself.
    pub fn parse(path: &str, root: &BucketRoot) -> FsResult<Self> {
        let key = root.to_key(path);
        if root.prefix().len() + key.len() + 1 > MAX_KEY_LENGTH {
            return Err(FsError::InvalidArgument(format!(
                "key for '{}' exceeds {} bytes",
                path, MAX_KEY_LENGTH
            )));
        }
        let kind = if key.is_empty() || ends_with_separator(path) {
            EntryKind::DirectoryMarker
        } else {
            EntryKind::File
        };
        Ok(Self { key, kind })
    }

    /// Normalized key without trailing slash, relative to the root
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Entry kind derived from the caller's spelling
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// True when the caller path denotes a directory
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::DirectoryMarker
    }

    /// True when this path is the root of the bucket scope
    pub fn is_root(&self) -> bool {
        self.key.is_empty()
    }

    /// Key of the directory marker / listing prefix for this path
    ///
    /// Empty for the root so that root listings carry no prefix at all.
    pub fn dir_key(&self) -> String {
        if self.key.is_empty() {
            String::new()
        } else {
            format!("{}/", self.key)
        }
    }
}

fn ends_with_separator(path: &str) -> bool {
    path.ends_with('/') || path.ends_with('\\')
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Whether a path is absolute in either POSIX or Windows spelling
pub fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    match bytes {
        [b'/', ..] => true,
        [b'\\', b'\\', ..] => true,
        [_, b':', b'\\', ..] => true,
        _ => false,
    }
}

/// Split a path into its non-empty segments
pub fn decompose_path(path: &str) -> Vec<String> {
    path.split(is_separator)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve `.` and `..` segments; `..` above the first segment is dropped
fn normalize_segments<S: AsRef<str>>(segments: &[S]) -> Vec<String> {
    let mut resolved: Vec<String> = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment.as_ref() {
            "" | "." => {}
            ".." => {
                resolved.pop();
            }
            other => resolved.push(other.to_string()),
        }
    }
    resolved
}

/// Normalize a path: collapse separators to single `/`, resolve dot segments
///
/// A leading separator and a trailing separator are both preserved.
pub fn normalize_path(path: &str) -> String {
    let absolute = is_absolute(path);
    let tail = normalize_segments(&decompose_path(path)).join("/");
    let mut normalized = String::with_capacity(tail.len() + 2);
    if absolute {
        normalized.push('/');
    }
    normalized.push_str(&tail);
    if !tail.is_empty() && ends_with_separator(path) {
        normalized.push('/');
    }
    normalized
}

/// Join any number of path-like arguments with `/`
pub fn join_paths<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .flat_map(|part| decompose_path(part.as_ref()))
        .collect::<Vec<_>>()
        .join("/")
}

/// Translate a caller path into a normalized key without leading or trailing slash
///
/// When `root` has a non-empty prefix and the path starts with the root's
/// `bucket/prefix`, that leading portion is removed first.
pub fn to_key(path: &str, root: Option<&BucketRoot>) -> String {
    let segments = decompose_path(path);
    let segments = match root {
        Some(root) if !root.prefix().is_empty() => {
            let root_segments = decompose_path(&root.spec());
            if segments.len() >= root_segments.len() && segments.starts_with(&root_segments) {
                segments[root_segments.len()..].to_vec()
            } else {
                segments
            }
        }
        _ => segments,
    };
    normalize_segments(&segments).join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(spec: &str) -> BucketRoot {
        BucketRoot::parse(spec).unwrap()
    }

    #[test]
    fn test_bucket_root_parse() {
        let r = root("my-bucket/sub/path");
        assert_eq!(r.bucket(), "my-bucket");
        assert_eq!(r.prefix(), "sub/path/");
        assert_eq!(r.spec(), "my-bucket/sub/path");

        let r = root("my-bucket");
        assert_eq!(r.prefix(), "");
        assert_eq!(r.full_key("a.json"), "a.json");

        let r = root("/my-bucket//sub\\path/");
        assert_eq!(r.bucket(), "my-bucket");
        assert_eq!(r.prefix(), "sub/path/");
    }

    #[test]
    fn test_bucket_root_rejects_empty() {
        assert!(matches!(
            BucketRoot::parse(""),
            Err(FsError::InvalidArgument(_))
        ));
        assert!(BucketRoot::parse("///").is_err());
    }

    #[test]
    fn test_child_root() {
        let r = root("bucket/a").child("b/c").unwrap();
        assert_eq!(r.bucket(), "bucket");
        assert_eq!(r.prefix(), "a/b/c/");
    }

    #[test]
    fn test_decompose_and_join() {
        assert_eq!(decompose_path("/a//b\\c/"), vec!["a", "b", "c"]);
        assert!(decompose_path("").is_empty());
        assert_eq!(join_paths(&["a/", "/b", "c/d/"]), "a/b/c/d");
        assert_eq!(join_paths(&["", "x"]), "x");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("a//b/./c"), "a/b/c");
        assert_eq!(normalize_path("a/b/../c/"), "a/c/");
        assert_eq!(normalize_path("/a/b"), "/a/b");
        assert_eq!(normalize_path("a\\b\\c"), "a/b/c");
    }

    #[test]
    fn test_parent_segments_never_escape_root() {
        assert_eq!(normalize_path("../../a"), "a");
        assert_eq!(normalize_path(&join_paths(&["x", ".."])), "");
        assert_eq!(to_key("a/../../b", None), "b");
        assert_eq!(to_key("..", None), "");
    }

    #[test]
    fn test_to_key_strips_root() {
        let r = root("bucket/base");
        assert_eq!(to_key("bucket/base/dir/file.json", Some(&r)), "dir/file.json");
        assert_eq!(to_key("/dir/file.json", Some(&r)), "dir/file.json");
        assert_eq!(to_key("other/file.json", Some(&r)), "other/file.json");
        assert_eq!(to_key("dir/", Some(&r)), "dir");
    }

    #[test]
    fn test_to_key_keeps_bucket_named_segment_without_prefix() {
        let r = root("logs");
        assert_eq!(to_key("logs/x.json", Some(&r)), "logs/x.json");
        assert_eq!(to_key("logs", Some(&r)), "logs");

        let dir = ObjectPath::parse("logs", &r).unwrap();
        assert!(!dir.is_root());
        assert_eq!(dir.dir_key(), "logs/");
    }

    #[test]
    fn test_is_absolute() {
        assert!(is_absolute("/a"));
        assert!(is_absolute("\\\\server\\share"));
        assert!(is_absolute("C:\\dir"));
        assert!(!is_absolute("a/b"));
        assert!(!is_absolute(""));
    }

    #[test]
    fn test_object_path_kind() {
        let r = root("bucket");
        let dir = ObjectPath::parse("a/b/", &r).unwrap();
        assert!(dir.is_directory());
        assert_eq!(dir.key(), "a/b");
        assert_eq!(dir.dir_key(), "a/b/");

        let file = ObjectPath::parse("a/b.json", &r).unwrap();
        assert_eq!(file.kind(), EntryKind::File);

        let top = ObjectPath::parse("/", &r).unwrap();
        assert!(top.is_root());
        assert!(top.is_directory());
        assert_eq!(top.dir_key(), "");
    }

    #[test]
    fn test_object_path_rejects_long_keys() {
        let r = root("bucket");
        let long = "k".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            ObjectPath::parse(&long, &r),
            Err(FsError::InvalidArgument(_))
        ));
    }
}
