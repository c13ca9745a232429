// Concurrent writers to the same path must never produce a mixed file.

mod common;

use common::{is_uniform, repository, slow_source};
use depot_storage::{StorageWriter, marker_path};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;

const PATH: &str = "com/acme/lib/1.0/lib-1.0.jar";

#[tokio::test]
async fn test_concurrent_stores_to_same_path_never_mix() {
    let temp_dir = TempDir::new().unwrap();
    let repo = repository(temp_dir.path(), "main");
    let writer = StorageWriter::new(Duration::from_millis(20), None);
    let target = repo.file(PATH);

    let long = vec![0xAA; 64 * 1024];
    let short = vec![0xBB; 1000];

    let first = writer.store(
        slow_source(long.clone(), 8, Duration::from_millis(10)),
        Arc::clone(&repo),
        PATH,
    );
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = writer.store(
        slow_source(short.clone(), 1, Duration::ZERO),
        Arc::clone(&repo),
        PATH,
    );

    // Observe the target while both writes are in flight
    let done = Arc::new(AtomicBool::new(false));
    let observer = {
        let done = Arc::clone(&done);
        let target = target.clone();
        let lengths = [long.len(), short.len()];
        tokio::spawn(async move {
            while !done.load(Ordering::Acquire) {
                if let Ok(data) = tokio::fs::read(&target).await {
                    assert!(lengths.contains(&data.len()), "partial file observed");
                    assert!(is_uniform(&data), "mixed file observed");
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
    };

    let (first, second) = tokio::join!(first, second);
    done.store(true, Ordering::Release);
    observer.await.unwrap();

    first.unwrap();
    second.unwrap();

    let data = tokio::fs::read(&target).await.unwrap();
    assert!(data.len() == long.len() || data.len() == short.len());
    assert!(is_uniform(&data));
    assert!(!marker_path(&target).exists());
}

#[tokio::test]
async fn test_many_concurrent_stores_all_complete() {
    let temp_dir = TempDir::new().unwrap();
    let repo = repository(temp_dir.path(), "main");
    let writer = StorageWriter::new(Duration::from_millis(10), None);

    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            writer.store(
                slow_source(vec![i; 100 + i as usize], 2, Duration::from_millis(1)),
                Arc::clone(&repo),
                PATH,
            )
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let data = tokio::fs::read(repo.file(PATH)).await.unwrap();
    assert!(is_uniform(&data));
    assert_eq!(data.len(), 100 + data[0] as usize);
    // Every store allocates its own length, overwrites included
    let expected: u64 = (0..8u64).map(|i| 100 + i).sum();
    assert_eq!(repo.quota().usage(), expected);
}

#[tokio::test]
async fn test_distinct_paths_do_not_contend() {
    let temp_dir = TempDir::new().unwrap();
    let repo = repository(temp_dir.path(), "main");
    // A long retry delay would stall this test if distinct paths contended
    let writer = StorageWriter::new(Duration::from_secs(60), None);

    let a = writer.store(
        slow_source(vec![1; 10], 1, Duration::ZERO),
        Arc::clone(&repo),
        "g/a/1.0/a-1.0.jar",
    );
    let b = writer.store(
        slow_source(vec![2; 20], 1, Duration::ZERO),
        Arc::clone(&repo),
        "g/b/1.0/b-1.0.jar",
    );

    let (a, b) = tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(a, b) })
        .await
        .unwrap();
    assert_eq!(a.unwrap().content_length, 10);
    assert_eq!(b.unwrap().content_length, 20);
}
