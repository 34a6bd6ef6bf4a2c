//! Client scenarios against an in-process cluster.

mod common;

use common::TestCluster;
use scribe::client::WordEdit;
use scribe::directory::AccessMode;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_create_write_read() {
    let cluster = TestCluster::start(1).await;
    let alice = cluster.client("alice").await;

    alice.create("notes.txt").await.unwrap();
    let err = alice.create("notes.txt").await.unwrap_err();
    assert_eq!(err.reason(), "ALREADY_EXISTS");

    alice
        .edit("notes.txt", 0, &[WordEdit::insert(0, "Hello world.")])
        .await
        .unwrap();
    assert_eq!(alice.read("notes.txt").await.unwrap(), "Hello world.");

    alice
        .edit(
            "notes.txt",
            1,
            &[WordEdit::insert(0, "Second"), WordEdit::insert(1, "sentence!")],
        )
        .await
        .unwrap();
    assert_eq!(
        alice.read("notes.txt").await.unwrap(),
        "Hello world. Second sentence!"
    );
    assert_eq!(
        alice.stream("notes.txt").await.unwrap(),
        vec!["Hello", "world.", "Second", "sentence!"]
    );

    alice.undo("notes.txt").await.unwrap();
    assert_eq!(alice.read("notes.txt").await.unwrap(), "Hello world.");
}

#[tokio::test]
async fn test_acl_scenario() {
    let cluster = TestCluster::start(1).await;
    let alice = cluster.client("alice").await;
    let bob = cluster.client("bob").await;

    alice.create("notes.txt").await.unwrap();
    alice
        .edit("notes.txt", 0, &[WordEdit::insert(0, "Secret plans.")])
        .await
        .unwrap();

    assert_eq!(bob.read("notes.txt").await.unwrap_err().reason(), "UNAUTHORIZED");

    assert_eq!(
        alice.add_access("notes.txt", "bob", AccessMode::Read).await.unwrap(),
        "Access granted"
    );
    assert_eq!(bob.read("notes.txt").await.unwrap(), "Secret plans.");
    let err = bob
        .edit("notes.txt", 0, &[WordEdit::insert(0, "Not")])
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "UNAUTHORIZED");

    alice.add_access("notes.txt", "bob", AccessMode::Write).await.unwrap();
    bob.edit("notes.txt", 0, &[WordEdit::replace(0, "Public")])
        .await
        .unwrap();
    assert_eq!(alice.read("notes.txt").await.unwrap(), "Public plans.");

    assert_eq!(bob.delete("notes.txt").await.unwrap_err().reason(), "UNAUTHORIZED");
    alice.remove_access("notes.txt", "bob").await.unwrap();
    assert_eq!(bob.read("notes.txt").await.unwrap_err().reason(), "UNAUTHORIZED");

    let visible = bob.view("").await.unwrap();
    assert!(visible.is_empty());
    let all = bob.view("a").await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_info_reflects_edits() {
    let cluster = TestCluster::start(1).await;
    let alice = cluster.client("alice").await;
    alice.create("notes.txt").await.unwrap();
    alice
        .edit("notes.txt", 0, &[WordEdit::insert(0, "Hello world.")])
        .await
        .unwrap();

    let info = alice.info("notes.txt").await.unwrap();
    assert_eq!(info.get_int("words"), Some(2));
    assert_eq!(info.get_int("chars"), Some(11));
    assert_eq!(info.get_int("bytes"), Some(12));
    assert_eq!(info.get_string("last_accessed_by"), Some("alice"));

    let detailed = alice.view("l").await.unwrap();
    assert_eq!(detailed[0]["filename"], "notes.txt");
    assert_eq!(detailed[0]["owner"], "alice");
}

#[tokio::test]
async fn test_delete_removes_both_copies() {
    let cluster = TestCluster::start(2).await;
    let alice = cluster.client("alice").await;
    alice.create("gone.txt").await.unwrap();

    let copies = |i: usize| cluster.dir.path().join(format!("ss{}", i)).join("data").join("gone.txt");
    assert!(copies(0).exists());
    assert!(copies(1).exists());

    assert_eq!(alice.delete("gone.txt").await.unwrap(), "File deleted");
    assert!(!copies(0).exists());
    assert!(!copies(1).exists());
    assert_eq!(alice.read("gone.txt").await.unwrap_err().reason(), "FILE_NOT_FOUND");
    alice.create("gone.txt").await.unwrap();
}

#[tokio::test]
async fn test_failover_to_backup() {
    let cluster = TestCluster::start(2).await;
    let alice = cluster.client("alice").await;

    let primary = alice.create("f.txt").await.unwrap();
    let primary_idx = cluster.storage_index(primary.port);
    let backup_idx = 1 - primary_idx;

    cluster.storage[primary_idx].stop().await;

    let resolved = alice.resolve("READ", "f.txt").await.unwrap();
    assert_eq!(resolved.port, cluster.storage[backup_idx].addr.port());
    // The backup copy was created empty alongside the primary.
    assert_eq!(alice.read("f.txt").await.unwrap(), "");

    cluster.storage[backup_idx].stop().await;
    let err = alice.resolve("READ", "f.txt").await.unwrap_err();
    assert_eq!(err.reason(), "ALL_SS_DOWN");
}

#[tokio::test]
async fn test_round_robin_placement() {
    let cluster = TestCluster::start(2).await;
    let alice = cluster.client("alice").await;

    let first = alice.create("one.txt").await.unwrap();
    let second = alice.create("two.txt").await.unwrap();
    let third = alice.create("three.txt").await.unwrap();
    assert_ne!(first.port, second.port);
    assert_eq!(first.port, third.port);
}

#[tokio::test]
async fn test_exec_runs_file_content() {
    let cluster = TestCluster::start(1).await;
    let alice = cluster.client("alice").await;
    alice.create("script.sh").await.unwrap();

    assert_eq!(alice.exec("script.sh").await.unwrap_err().reason(), "EMPTY_FILE");

    alice
        .edit("script.sh", 0, &[WordEdit::insert(0, "echo scribe")])
        .await
        .unwrap();
    let result = alice.exec("script.sh").await.unwrap();
    assert_eq!(result.output, "scribe\n");
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn test_stream_pacing_through_client() {
    let cluster = TestCluster::start_with_delay(1, 40).await;
    let alice = cluster.client("alice").await;
    alice.create("slow.txt").await.unwrap();
    alice
        .edit("slow.txt", 0, &[WordEdit::insert(0, "a b c d e.")])
        .await
        .unwrap();

    let started = Instant::now();
    let words = alice.stream("slow.txt").await.unwrap();
    assert_eq!(words.len(), 5);
    assert!(started.elapsed() >= Duration::from_millis(160));
}

#[tokio::test]
async fn test_list_users() {
    let cluster = TestCluster::start(0).await;
    let alice = cluster.client("alice").await;
    let _bob = cluster.client("bob").await;
    assert_eq!(alice.list().await.unwrap(), vec!["alice", "bob"]);
}
