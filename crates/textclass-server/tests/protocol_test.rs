//! End-to-end protocol tests
//!
//! Each test starts a server on an ephemeral loopback port and talks to it
//! through the client library or raw frames.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use serde_json::json;
use textclass_classifiers::{
    ClassifierFactory, ClassifierRegistry, KeywordClassifier, SentimentClassifier,
};
use textclass_client::Client;
use textclass_core::{FramedChannel, Response};
use textclass_server::{Server, ServerConfig, ServerHandle};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";

fn loopback(timeout: f64) -> ServerConfig {
    ServerConfig {
        port: 0,
        timeout: Some(timeout),
        ..ServerConfig::default()
    }
}

fn registry() -> Arc<ClassifierRegistry> {
    let mut keywords = BTreeMap::new();
    keywords.insert(
        "sports".to_string(),
        vec!["goal".to_string(), "striker".to_string()],
    );
    keywords.insert(
        "politics".to_string(),
        vec!["vote".to_string(), "parliament".to_string()],
    );

    Arc::new(
        ClassifierRegistry::new()
            .with(
                "keyword",
                Arc::new(KeywordClassifier::new("keyword", &keywords).unwrap()),
                true,
            )
            .unwrap()
            .with("sentiment", Arc::new(SentimentClassifier::new().unwrap()), true)
            .unwrap(),
    )
}

async fn start() -> (ServerHandle, Client) {
    let handle = Server::new(loopback(0.05), registry()).start().await.unwrap();
    let client = connect(&handle).await;
    (handle, client)
}

async fn connect(handle: &ServerHandle) -> Client {
    let addr = handle.local_addr();
    Client::connect(&addr.ip().to_string(), addr.port()).await.unwrap()
}

#[tokio::test]
async fn test_ping_version_close() {
    let (handle, mut client) = start().await;

    assert_eq!(client.ping().await.unwrap(), Response::ok("PONG"));
    assert_eq!(
        client.version().await.unwrap(),
        Response::ok(textclass_server::VERSION)
    );
    assert_eq!(client.close().await.unwrap(), Response::ok("Bye"));

    handle.shutdown();
    handle.wait().await.unwrap();
}

#[tokio::test]
async fn test_unknown_command_keeps_connection() {
    let (_handle, mut client) = start().await;

    assert_eq!(
        client.command("FOO\n").await.unwrap(),
        Response::error("Unknown Command")
    );
    assert_eq!(client.ping().await.unwrap(), Response::ok("PONG"));
}

#[tokio::test]
async fn test_md5_stream_matches_md5_file() {
    let (_handle, mut client) = start().await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"abc").unwrap();
    file.flush().unwrap();

    assert_eq!(client.md5_stream(b"abc").await.unwrap(), Response::ok(ABC_MD5));
    assert_eq!(
        client
            .md5_file(&file.path().display().to_string())
            .await
            .unwrap(),
        Response::ok(ABC_MD5)
    );
}

#[tokio::test]
async fn test_md5_stream_across_many_frames() {
    let (_handle, mut client) = start().await;

    // 3000 bytes go out as three frames plus the sentinel.
    let payload: Vec<u8> = b"abc".iter().copied().cycle().take(3000).collect();
    let streamed = client.md5_stream(&payload).await.unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&payload).unwrap();
    file.flush().unwrap();
    let hashed = client
        .md5_file(&file.path().display().to_string())
        .await
        .unwrap();

    assert!(streamed.is_ok());
    assert_eq!(streamed, hashed);
}

#[tokio::test]
async fn test_missing_file_is_an_error_response() {
    let (_handle, mut client) = start().await;

    let response = client.md5_file("/nonexistent/input.txt").await.unwrap();
    assert!(!response.is_ok());
    assert_eq!(client.ping().await.unwrap(), Response::ok("PONG"));
}

#[tokio::test]
async fn test_predict_stream_matches_predict_file() {
    let (_handle, mut client) = start().await;

    let text = "the striker scored a goal\nparliament passed the vote\n";
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();

    let streamed = client.predict_stream(text.as_bytes()).await.unwrap();
    let from_file = client
        .predict_file(&file.path().display().to_string())
        .await
        .unwrap();

    assert!(streamed.is_ok());
    assert_eq!(streamed, from_file);

    let keyword = streamed.result["keyword"].as_array().unwrap();
    // Two lines plus the empty string after the trailing newline.
    assert_eq!(keyword.len(), 3);
    assert_eq!(keyword[0]["label"], "sports");
    assert_eq!(keyword[1]["label"], "politics");
    assert!(streamed.result.get("sentiment").is_some());
}

#[tokio::test]
async fn test_list_and_set_classifier() {
    let (_handle, mut client) = start().await;

    assert_eq!(
        client.list_classifiers().await.unwrap(),
        Response::ok(json!({"keyword": true, "sentiment": true}))
    );

    assert_eq!(
        client.set_classifier("sentiment", "False").await.unwrap(),
        Response::ok(json!([{"sentiment": false}]))
    );
    assert_eq!(
        client.set_classifier("sentiment", "nope").await.unwrap(),
        Response::error(json!([{"sentiment": false}]))
    );
    assert_eq!(
        client.set_classifier("bayes", "true").await.unwrap(),
        Response::error("Unknown classifier: bayes")
    );

    let prediction = client.predict_stream(b"goal").await.unwrap();
    assert!(prediction.result.get("keyword").is_some());
    assert!(prediction.result.get("sentiment").is_none());

    assert_eq!(
        client.set_classifier("sentiment", "TRUE").await.unwrap(),
        Response::ok(json!([{"sentiment": true}]))
    );
}

#[tokio::test]
async fn test_all_disabled_predicts_empty_mapping() {
    let (_handle, mut client) = start().await;

    client.set_classifier("keyword", "false").await.unwrap();
    client.set_classifier("sentiment", "false").await.unwrap();

    assert_eq!(
        client.predict_stream(b"goal").await.unwrap(),
        Response::ok(json!({}))
    );
}

#[tokio::test]
async fn test_flags_are_shared_across_connections() {
    let (handle, mut first) = start().await;
    let mut second = connect(&handle).await;

    first.set_classifier("keyword", "false").await.unwrap();
    assert_eq!(
        second.list_classifiers().await.unwrap(),
        Response::ok(json!({"keyword": false, "sentiment": true}))
    );
}

#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let (handle, _client) = start().await;

    let mut stream = TcpStream::connect(handle.local_addr()).await.unwrap();
    stream.write_all(&5000u32.to_le_bytes()).await.unwrap();
    stream.write_all(&vec![b'x'; 5000]).await.unwrap_or(());

    let mut channel = FramedChannel::new(stream);
    assert!(channel.receive().await.unwrap_or(None).is_none());

    // The server itself keeps serving new connections.
    let mut client = connect(&handle).await;
    assert_eq!(client.ping().await.unwrap(), Response::ok("PONG"));
}

#[tokio::test]
async fn test_reload_reapplies_enabled_flags() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("server.yaml");
    let yaml = |sentiment_enabled: bool| {
        format!(
            r#"
port: 0
timeout: 0.05
classifiers:
  keyword:
    keywords:
      sports: [goal]
  sentiment:
    enabled: {}
"#,
            sentiment_enabled
        )
    };
    std::fs::write(&config_path, yaml(true)).unwrap();

    let config = ServerConfig::from_file(&config_path).unwrap();
    let server = Server::from_config(config, &ClassifierFactory::with_builtins())
        .unwrap()
        .with_config_path(&config_path);
    let handle = server.start().await.unwrap();
    let mut client = connect(&handle).await;

    assert_eq!(
        client.list_classifiers().await.unwrap(),
        Response::ok(json!({"keyword": true, "sentiment": true}))
    );

    std::fs::write(&config_path, yaml(false)).unwrap();
    assert_eq!(client.reload().await.unwrap(), Response::ok("reload"));
    assert_eq!(
        client.list_classifiers().await.unwrap(),
        Response::ok(json!({"keyword": true, "sentiment": false}))
    );

    std::fs::write(&config_path, "classifiers: [not, a, mapping]\n").unwrap();
    assert!(!client.reload().await.unwrap().is_ok());
}

#[tokio::test]
async fn test_shutdown_refuses_new_connections() {
    let (handle, mut client) = start().await;
    let addr = handle.local_addr();

    handle.shutdown();
    handle.wait().await.unwrap();

    // Accepted connections finish on their own tasks.
    assert_eq!(client.ping().await.unwrap(), Response::ok("PONG"));
    assert!(TcpStream::connect(addr).await.is_err());
}
