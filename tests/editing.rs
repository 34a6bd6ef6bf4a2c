//! Storage Server protocol tests over TCP.

mod common;

use common::{call, connect, TestStorageServer};
use scribe::net::client::StreamItem;
use scribe::protocol::Request;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

fn create(filename: &str, content: &str) -> Request {
    Request::new("CREATE")
        .with("filename", filename)
        .with("content", content)
}

fn write(filename: &str, index: i64) -> Request {
    Request::new("WRITE")
        .with("filename", filename)
        .with("sentence_index", index)
}

fn update(word_index: i64, content: &str) -> Request {
    Request::new("UPDATE")
        .with("word_index", word_index)
        .with("content", content)
}

fn read(filename: &str) -> Request {
    Request::new("READ").with("filename", filename)
}

#[tokio::test]
async fn test_create_edit_read() {
    let dir = tempfile::tempdir().unwrap();
    let ss = TestStorageServer::start(dir.path(), None, 0).await;
    let mut conn = connect(ss.addr).await;

    let resp = call(&mut conn, create("notes.txt", "")).await;
    assert_eq!(resp.get_string("msg"), Some("CREATED"));
    let resp = call(&mut conn, create("notes.txt", "")).await;
    assert_eq!(resp.reason(), Some("ALREADY_EXISTS"));

    assert_eq!(call(&mut conn, write("notes.txt", 0)).await.get_string("msg"), Some("LOCKED"));
    assert_eq!(
        call(&mut conn, update(0, "Hello world.")).await.get_string("msg"),
        Some("UPDATED")
    );
    assert_eq!(
        call(&mut conn, Request::new("ETIRW")).await.get_string("msg"),
        Some("WRITE DONE")
    );

    let resp = call(&mut conn, read("notes.txt")).await;
    assert_eq!(resp.get_string("content"), Some("Hello world."));

    ss.stop().await;
}

#[tokio::test]
async fn test_write_index_rules() {
    let dir = tempfile::tempdir().unwrap();
    let ss = TestStorageServer::start(dir.path(), None, 0).await;
    let mut conn = connect(ss.addr).await;

    call(&mut conn, create("done.txt", "One. Two.")).await;
    call(&mut conn, create("open.txt", "One. Two")).await;

    assert_eq!(call(&mut conn, write("done.txt", 3)).await.reason(), Some("INVALID_INDEX"));
    assert_eq!(call(&mut conn, write("done.txt", -1)).await.reason(), Some("INVALID_INDEX"));
    assert_eq!(call(&mut conn, write("open.txt", 2)).await.reason(), Some("INVALID_INDEX"));
    assert_eq!(call(&mut conn, write("missing.txt", 0)).await.reason(), Some("FILE_NOT_FOUND"));

    // Appending after a terminated last sentence is allowed.
    assert!(call(&mut conn, write("done.txt", 2)).await.is_ok());
    call(&mut conn, update(0, "Three!")).await;
    call(&mut conn, Request::new("ETIRW")).await;
    assert_eq!(
        call(&mut conn, read("done.txt")).await.get_string("content"),
        Some("One. Two. Three!")
    );
}

#[tokio::test]
async fn test_sentence_locks_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let ss = TestStorageServer::start(dir.path(), None, 0).await;
    let mut a = connect(ss.addr).await;
    let mut b = connect(ss.addr).await;

    call(&mut a, create("f.txt", "One. Two.")).await;
    assert!(call(&mut a, write("f.txt", 0)).await.is_ok());
    assert_eq!(call(&mut b, write("f.txt", 0)).await.reason(), Some("SENTENCE_LOCKED"));
    assert!(call(&mut b, write("f.txt", 1)).await.is_ok());

    // UNDO is refused while any sentence of the file is locked.
    let mut c = connect(ss.addr).await;
    assert_eq!(
        call(&mut c, Request::new("UNDO").with("filename", "f.txt")).await.reason(),
        Some("LOCKED")
    );

    call(&mut a, update(0, "First")).await;
    call(&mut b, update(1, "more")).await;
    assert!(call(&mut a, Request::new("ETIRW")).await.is_ok());
    assert!(call(&mut b, Request::new("ETIRW")).await.is_ok());

    assert_eq!(
        call(&mut c, read("f.txt")).await.get_string("content"),
        Some("First One. Two more.")
    );
}

#[tokio::test]
async fn test_disconnect_releases_lock_and_discards_edits() {
    let dir = tempfile::tempdir().unwrap();
    let ss = TestStorageServer::start(dir.path(), None, 0).await;
    let mut a = connect(ss.addr).await;
    call(&mut a, create("f.txt", "Keep me.")).await;
    call(&mut a, write("f.txt", 0)).await;
    call(&mut a, update(0, "Lost")).await;
    drop(a);

    let mut b = connect(ss.addr).await;
    let mut acquired = false;
    for _ in 0..50 {
        if call(&mut b, write("f.txt", 0)).await.is_ok() {
            acquired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(acquired, "lock was not released after disconnect");
    assert_eq!(
        call(&mut b, read("f.txt")).await.get_string("content"),
        Some("Keep me.")
    );
}

#[tokio::test]
async fn test_undo_restores_pre_commit_content() {
    let dir = tempfile::tempdir().unwrap();
    let ss = TestStorageServer::start(dir.path(), None, 0).await;
    let mut conn = connect(ss.addr).await;
    let undo = || Request::new("UNDO").with("filename", "f.txt");

    call(&mut conn, create("f.txt", "Original text.")).await;
    assert_eq!(call(&mut conn, undo()).await.reason(), Some("NO_SNAPSHOT"));

    call(&mut conn, write("f.txt", 0)).await;
    call(&mut conn, Request::new("UPDATE").with("word_index", 0).with("content", "Edited").with("mode", "replace")).await;
    call(&mut conn, Request::new("ETIRW")).await;
    assert_eq!(
        call(&mut conn, read("f.txt")).await.get_string("content"),
        Some("Edited text.")
    );

    assert!(call(&mut conn, undo()).await.is_ok());
    assert_eq!(
        call(&mut conn, read("f.txt")).await.get_string("content"),
        Some("Original text.")
    );
    assert!(call(&mut conn, undo()).await.is_ok());
    assert_eq!(
        call(&mut conn, read("f.txt")).await.get_string("content"),
        Some("Original text.")
    );
}

#[tokio::test]
async fn test_stream_is_paced() {
    let dir = tempfile::tempdir().unwrap();
    let ss = TestStorageServer::start(dir.path(), None, 50).await;
    let mut conn = connect(ss.addr).await;
    call(&mut conn, create("f.txt", "one two three four.")).await;

    let started = Instant::now();
    conn.send(&Request::new("STREAM").with("filename", "f.txt"))
        .await
        .unwrap();
    let mut words = Vec::new();
    loop {
        match conn.read_stream_item().await.unwrap() {
            StreamItem::Token(t) if t == "STOP" => break,
            StreamItem::Token(t) => words.push(t),
            StreamItem::Reply(r) => panic!("unexpected reply: {}", r),
        }
    }
    assert_eq!(words, vec!["one", "two", "three", "four."]);
    assert!(started.elapsed() >= Duration::from_millis(150));

    // The connection is still usable afterwards.
    conn.send(&Request::new("STREAM").with("filename", "nope"))
        .await
        .unwrap();
    match conn.read_stream_item().await.unwrap() {
        StreamItem::Reply(r) => assert_eq!(r.reason(), Some("FILE_NOT_FOUND")),
        other => panic!("expected error reply, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_lines_keep_connection_open() {
    let dir = tempfile::tempdir().unwrap();
    let ss = TestStorageServer::start(dir.path(), None, 0).await;

    let stream = TcpStream::connect(ss.addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half.write_all(b"not json\n").await.unwrap();
    let line = lines.next_line().await.unwrap().unwrap();
    assert!(line.contains("BAD_REQUEST"), "{}", line);

    write_half.write_all(b"{\"cmd\":\"FROB\"}\n\n").await.unwrap();
    let line = lines.next_line().await.unwrap().unwrap();
    assert!(line.contains("UNKNOWN_CMD"), "{}", line);

    write_half
        .write_all(b"{\"cmd\":\"STAT\",\"filename\":\"../etc\"}\r\n")
        .await
        .unwrap();
    let line = lines.next_line().await.unwrap().unwrap();
    assert!(line.contains("BAD_REQUEST"), "{}", line);
}

#[tokio::test]
async fn test_stat_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let ss = TestStorageServer::start(dir.path(), None, 0).await;
    let mut conn = connect(ss.addr).await;
    call(&mut conn, create("f.txt", "Hello world.")).await;

    let stat = call(&mut conn, Request::new("STAT").with("filename", "f.txt")).await;
    assert_eq!(stat.get_int("words"), Some(2));
    assert_eq!(stat.get_int("chars"), Some(11));
    assert_eq!(stat.get_int("bytes"), Some(12));

    assert!(call(&mut conn, Request::new("DELETE").with("filename", "f.txt")).await.is_ok());
    assert_eq!(
        call(&mut conn, read("f.txt")).await.reason(),
        Some("FILE_NOT_FOUND")
    );
    assert!(!dir.path().join("data").join("f.txt").exists());
}

#[tokio::test]
async fn test_saving_a_file_keeps_its_tmp_named_neighbour() {
    let dir = tempfile::tempdir().unwrap();
    let ss = TestStorageServer::start(dir.path(), None, 0).await;
    let mut conn = connect(ss.addr).await;

    call(&mut conn, create("report.tmp", "Keep me.")).await;
    assert!(call(&mut conn, create("report", "")).await.is_ok());
    call(&mut conn, write("report", 0)).await;
    call(&mut conn, update(0, "Draft.")).await;
    assert!(call(&mut conn, Request::new("ETIRW")).await.is_ok());

    assert_eq!(
        call(&mut conn, read("report.tmp")).await.get_string("content"),
        Some("Keep me.")
    );
    assert_eq!(
        ss.server.service().store().list_files().unwrap(),
        vec!["report", "report.tmp"]
    );
}

#[tokio::test]
async fn test_non_utf8_file_is_never_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let ss = TestStorageServer::start(dir.path(), None, 0).await;
    let path = dir.path().join("data").join("latin1.txt");
    let original = b"Un caf\xe9 noir. Merci.".to_vec();
    std::fs::write(&path, &original).unwrap();

    let mut conn = connect(ss.addr).await;
    assert_eq!(
        call(&mut conn, write("latin1.txt", 1)).await.reason(),
        Some("INVALID_ENCODING")
    );
    assert_eq!(
        call(&mut conn, Request::new("ETIRW")).await.reason(),
        Some("NO_ACTIVE_WRITE")
    );
    assert_eq!(
        call(&mut conn, read("latin1.txt")).await.reason(),
        Some("INVALID_ENCODING")
    );
    assert_eq!(std::fs::read(&path).unwrap(), original);
}
