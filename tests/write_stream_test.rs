//! Multipart write stream behavior against a recording store

mod common;

use bucketfs::config::MIN_PART_SIZE;
use bucketfs::{BucketFs, FileBody, FsError, MemoryStore, PutOptions, WriteOptions};
use bytes::Bytes;
use common::{recording_fs, small_parts, PatternReader, RecordingStore, BUCKET};
use std::sync::Arc;

#[tokio::test]
async fn test_payload_above_part_size_uploads_parts_in_order() {
    let (store, fs) = recording_fs(1000).await;
    let fs = fs.with_write_options(small_parts(16, 1000));

    let payload: Vec<u8> = (0..17u8).collect();
    let mut stream = fs
        .create_write_stream("big.bin", &PutOptions::default())
        .unwrap();
    stream.write(&payload).await.unwrap();
    let summary = stream.finish().await.unwrap();

    assert_eq!(summary.parts, 2);
    assert_eq!(summary.size, 17);
    assert_eq!(store.calls("create_multipart_upload"), 1);
    assert_eq!(store.calls("put_object"), 0);

    let mut uploaded = store.uploaded_parts();
    uploaded.sort_unstable();
    assert_eq!(uploaded, vec![1, 2]);
    assert_eq!(store.completions(), vec![vec![1, 2]]);

    assert_eq!(
        store.inner().object(BUCKET, "big.bin").unwrap(),
        Bytes::from(payload)
    );
    assert!(summary.etag.unwrap().ends_with("-2\""));
}

#[tokio::test]
async fn test_payload_below_part_size_uses_single_put() {
    let (store, fs) = recording_fs(1000).await;
    let fs = fs.with_write_options(small_parts(16, 1000));

    let mut stream = fs
        .create_write_stream("small.bin", &PutOptions::default())
        .unwrap();
    stream.write(b"fifteen bytes!!").await.unwrap();
    let summary = stream.finish().await.unwrap();

    assert_eq!(summary.parts, 0);
    assert_eq!(store.calls("put_object"), 1);
    assert_eq!(store.calls("create_multipart_upload"), 0);
    assert_eq!(store.calls("complete_multipart_upload"), 0);
    assert_eq!(store.inner().pending_uploads(BUCKET), 0);
}

#[tokio::test]
async fn test_many_parts_share_one_session() {
    let (store, fs) = recording_fs(1000).await;
    let fs = fs.with_write_options(small_parts(10, 1000));

    let mut stream = fs
        .create_write_stream("shared.bin", &PutOptions::default())
        .unwrap();
    for chunk in PatternReader::expected(95).chunks(7) {
        stream.write(chunk).await.unwrap();
    }
    let summary = stream.end(Some(Bytes::from_static(b"tail"))).await.unwrap();

    assert_eq!(summary.size, 99);
    assert_eq!(summary.parts, 10);
    assert_eq!(store.calls("create_multipart_upload"), 1);
    assert_eq!(store.calls("upload_part"), 10);
    assert_eq!(store.completions(), vec![(1..=10).collect::<Vec<i32>>()]);

    let mut expected = PatternReader::expected(95);
    expected.extend_from_slice(b"tail");
    assert_eq!(
        store.inner().object(BUCKET, "shared.bin").unwrap().as_ref(),
        expected.as_slice()
    );
}

#[tokio::test]
async fn test_exceeding_max_parts_aborts_once() {
    let (store, fs) = recording_fs(1000).await;
    let fs = fs.with_write_options(small_parts(4, 3));
    // the abort failure must not replace the original error
    store.fail("abort_multipart_upload");

    let mut stream = fs
        .create_write_stream("overflow.bin", &PutOptions::default())
        .unwrap();
    let err = stream.write(&[0u8; 16]).await.unwrap_err();
    assert!(matches!(
        err,
        FsError::MaxPartsExceeded {
            part_number: 4,
            max_parts: 3
        }
    ));

    // later writes and ending are refused without another abort
    assert!(stream.write(b"more").await.is_err());
    assert!(stream.finish().await.is_err());
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(store.calls("abort_multipart_upload"), 1);
    assert_eq!(store.calls("complete_multipart_upload"), 0);
    assert!(store.inner().object(BUCKET, "overflow.bin").is_none());
}

#[tokio::test]
async fn test_part_failure_aborts_and_surfaces_original_error() {
    let (store, fs) = recording_fs(1000).await;
    let fs = fs.with_write_options(small_parts(8, 1000));
    store.fail_matching("upload_part", "#2");

    let mut stream = fs
        .create_write_stream("broken.bin", &PutOptions::default())
        .unwrap();
    stream.write(&[1u8; 20]).await.unwrap();
    let err = stream.finish().await.unwrap_err();

    assert_eq!(err.code(), Some("InjectedFailure"));
    assert_eq!(store.calls("abort_multipart_upload"), 1);
    assert_eq!(store.calls("complete_multipart_upload"), 0);
    assert_eq!(store.inner().pending_uploads(BUCKET), 0);
    assert!(store.inner().object(BUCKET, "broken.bin").is_none());
}

#[tokio::test]
async fn test_session_creation_failure_is_reported() {
    let (store, fs) = recording_fs(1000).await;
    let fs = fs.with_write_options(small_parts(8, 1000));
    store.fail("create_multipart_upload");

    let mut stream = fs
        .create_write_stream("nosession.bin", &PutOptions::default())
        .unwrap();
    stream.write(&[2u8; 24]).await.unwrap();
    let err = stream.finish().await.unwrap_err();

    assert_eq!(err.code(), Some("InjectedFailure"));
    assert_eq!(store.calls("complete_multipart_upload"), 0);
}

#[tokio::test]
async fn test_dropped_stream_aborts_session() {
    let (store, fs) = recording_fs(1000).await;
    let fs = fs.with_write_options(small_parts(8, 1000));

    let mut stream = fs
        .create_write_stream("dropped.bin", &PutOptions::default())
        .unwrap();
    stream.write(&[3u8; 20]).await.unwrap();
    drop(stream);

    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(store.calls("abort_multipart_upload"), 1);
    assert_eq!(store.inner().pending_uploads(BUCKET), 0);
}

#[tokio::test]
async fn test_streamed_write_file_round_trip() {
    let (store, fs) = recording_fs(1000).await;
    let fs = fs.with_write_options(small_parts(1024, 1000));

    let total = 10 * 1024 + 17;
    let summary = fs
        .write_file(
            "streamed.bin",
            FileBody::reader(PatternReader::new(total, 300)),
            &PutOptions::default().with_content_type("application/octet-stream"),
        )
        .await
        .unwrap();

    assert_eq!(summary.size, total);
    assert_eq!(summary.parts, 11);
    assert_eq!(
        fs.read_file("streamed.bin").await.unwrap().as_ref(),
        PatternReader::expected(total).as_slice()
    );
    let meta = fs.head_object("streamed.bin").await.unwrap();
    assert_eq!(meta.content_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(store.calls("create_multipart_upload"), 1);
}

#[tokio::test]
async fn test_default_part_size_just_above_threshold() {
    bucketfs::logging::init_test_logging();
    let store = Arc::new(RecordingStore::new(
        MemoryStore::new().with_min_part_size(MIN_PART_SIZE),
    ));
    let fs = BucketFs::new(store.clone(), BUCKET).unwrap();
    fs.create(Default::default()).await.unwrap();
    assert_eq!(fs.write_options(), WriteOptions::default());

    let total = (5 * 1024 * 1024 + 1) as u64;
    let mut stream = fs
        .create_write_stream("default.bin", &PutOptions::default())
        .unwrap();
    stream
        .copy_from(&mut PatternReader::new(total, 64 * 1024))
        .await
        .unwrap();
    let summary = stream.finish().await.unwrap();

    assert_eq!(summary.parts, 2);
    assert_eq!(summary.size, total);
    assert_eq!(store.calls("put_object"), 0);
    assert_eq!(store.completions(), vec![vec![1, 2]]);
    assert_eq!(
        store.inner().object(BUCKET, "default.bin").unwrap().as_ref(),
        PatternReader::expected(total).as_slice()
    );
}
