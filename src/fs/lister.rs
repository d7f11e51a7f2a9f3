//! Paginated listing
//!
//! One logical listing is a sequence of `list_objects` calls chained by
//! continuation markers. Pages are fetched strictly one after another and
//! concatenated in call order, so callers see exactly what a single
//! unbounded request would have returned. Any failed page discards the
//! partial result.

use crate::error::{FsError, FsResult};
use crate::store::{ListPage, ListRequest, ObjectStore, ObjectSummary};
use tracing::debug;

/// Accumulated result of a full listing, keys relative to the listed prefix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    /// Objects, in listing order
    pub entries: Vec<ObjectSummary>,

    /// Common prefixes (sub-directories), in listing order, ending in the delimiter
    pub common_prefixes: Vec<String>,
}

/// Marker to continue after `page`
///
/// S3 only returns `NextMarker` for delimited listings; otherwise the last
/// key or common prefix on the page, whichever sorts later, is used.
fn continuation_marker(page: &ListPage) -> Option<String> {
    if let Some(marker) = page.next_marker.as_ref().filter(|m| !m.is_empty()) {
        return Some(marker.clone());
    }
    let last_key = page.contents.last().map(|o| o.key.clone());
    let last_prefix = page.common_prefixes.last().cloned();
    last_key.max(last_prefix)
}

fn strip<'a>(key: &'a str, prefix: &str) -> &'a str {
    key.strip_prefix(prefix).unwrap_or(key)
}

/// Fetch every page under `prefix` and return the raw entries
///
/// `marker` is a full key; listing starts strictly after it. Entries whose
/// stripped key is empty (the directory marker for `prefix` itself) are
/// dropped.
pub async fn list_entries(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    delimiter: Option<&str>,
    marker: Option<String>,
) -> FsResult<Listing> {
    let mut listing = Listing::default();
    let mut marker = marker;
    let mut pages = 0usize;

    loop {
        let request = ListRequest {
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
            delimiter: delimiter.map(str::to_string),
            marker: marker.clone(),
            max_keys: None,
        };
        let page = store.list_objects(bucket, &request).await?;
        pages += 1;
        debug!(
            bucket,
            prefix,
            page = pages,
            objects = page.contents.len(),
            prefixes = page.common_prefixes.len(),
            truncated = page.is_truncated,
            "listed page"
        );

        let next = continuation_marker(&page);
        let truncated = page.is_truncated;

        listing.entries.extend(page.contents.into_iter().filter_map(|mut entry| {
            let relative = strip(&entry.key, prefix);
            if relative.is_empty() {
                return None;
            }
            entry.key = relative.to_string();
            Some(entry)
        }));
        listing.common_prefixes.extend(
            page.common_prefixes
                .iter()
                .map(|p| strip(p, prefix))
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        );

        if !truncated {
            break;
        }

        match next {
            Some(next) if marker.as_deref().map_or(true, |m| next.as_str() > m) => {
                marker = Some(next);
            }
            Some(next) => {
                return Err(FsError::Protocol(format!(
                    "listing of '{}' did not advance past marker '{}'",
                    prefix, next
                )));
            }
            None => {
                return Err(FsError::Protocol(format!(
                    "truncated listing of '{}' returned no continuation marker",
                    prefix
                )));
            }
        }
    }

    Ok(listing)
}

/// Fetch every page under `prefix` and return entry names only
///
/// Object keys come first, then common prefixes, each with `prefix`
/// stripped; blank names are filtered out.
pub async fn list_filenames(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    delimiter: Option<&str>,
) -> FsResult<Vec<String>> {
    let listing = list_entries(store, bucket, prefix, delimiter, None).await?;
    Ok(listing
        .entries
        .into_iter()
        .map(|entry| entry.key)
        .chain(listing.common_prefixes)
        .collect())
}
