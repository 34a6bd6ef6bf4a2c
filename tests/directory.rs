//! Name Server protocol tests over TCP.

mod common;

use common::{call, connect, TestNameServer, TestStorageServer};
use scribe::protocol::Request;
use serde_json::json;

fn user_request(cmd: &str, user: &str) -> Request {
    Request::new(cmd).with("username", user)
}

#[tokio::test]
async fn test_many_requests_on_one_connection() {
    let dir = tempfile::tempdir().unwrap();
    let nm = TestNameServer::start(dir.path()).await;
    let mut conn = connect(nm.addr).await;

    let resp = call(&mut conn, user_request("register_client", "alice")).await;
    assert_eq!(resp.get_string("msg"), Some("Registered successfully"));
    let resp = call(&mut conn, user_request("register_client", "bob")).await;
    assert!(resp.is_ok());

    let resp = call(&mut conn, user_request("LIST", "alice")).await;
    assert_eq!(resp.get("users"), Some(&json!(["alice", "bob"])));

    let resp = call(&mut conn, user_request("CREATE", "alice").with("filename", "a.txt")).await;
    assert_eq!(resp.reason(), Some("NO_SS_AVAILABLE"));

    let resp = call(&mut conn, Request::new("FROB")).await;
    assert_eq!(resp.reason(), Some("UNKNOWN_CMD"));

    nm.stop().await;
}

#[tokio::test]
async fn test_storage_registration_uses_observed_ip() {
    let dir = tempfile::tempdir().unwrap();
    let nm = TestNameServer::start(&dir.path().join("nm")).await;
    let ss = TestStorageServer::start(&dir.path().join("ss"), None, 0).await;

    let mut conn = connect(nm.addr).await;
    let resp = call(
        &mut conn,
        Request::new("register_ss")
            .with("ip", "0.0.0.0")
            .with("nm_port", ss.addr.port())
            .with("client_port", ss.addr.port())
            .with("files", Vec::<String>::new()),
    )
    .await;
    assert_eq!(resp.get_string("msg"), Some("SS Registered successfully"));

    let servers = nm.server.service().servers().servers();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].ip, "127.0.0.1");

    // The resolved address is reachable, so placement succeeds.
    let resp = call(&mut conn, user_request("CREATE", "alice").with("filename", "a.txt")).await;
    assert_eq!(resp.get_string("ss_ip"), Some("127.0.0.1"));
    assert_eq!(resp.get_int("ss_port"), Some(i64::from(ss.addr.port())));
    assert!(dir.path().join("ss").join("data").join("a.txt").exists());
}

#[tokio::test]
async fn test_metadata_survives_name_server_restart() {
    let dir = tempfile::tempdir().unwrap();
    let nm_dir = dir.path().join("nm");
    let nm = TestNameServer::start(&nm_dir).await;
    let _ss = TestStorageServer::start(&dir.path().join("ss"), Some(nm.addr), 0).await;

    let mut conn = connect(nm.addr).await;
    call(&mut conn, user_request("register_client", "alice")).await;
    assert!(call(&mut conn, user_request("CREATE", "alice").with("filename", "keep.txt")).await.is_ok());
    call(
        &mut conn,
        user_request("ADDACCESS", "alice")
            .with("filename", "keep.txt")
            .with("target", "bob")
            .with("mode", "R"),
    )
    .await;
    drop(conn);
    nm.stop().await;

    let metadata = std::fs::read_to_string(nm.config.metadata_path()).unwrap();
    assert!(metadata.contains("keep.txt"));

    let restarted = TestNameServer::start(&nm_dir).await;
    let mut conn = connect(restarted.addr).await;
    let resp = call(&mut conn, user_request("LIST", "carol")).await;
    assert_eq!(resp.get("users"), Some(&json!(["alice"])));

    let resp = call(&mut conn, user_request("INFO", "alice").with("filename", "keep.txt")).await;
    assert_eq!(resp.get_string("owner"), Some("alice"));
    assert_eq!(
        resp.get("access"),
        Some(&json!([{"user": "alice", "mode": "RW"}, {"user": "bob", "mode": "R"}]))
    );
}
