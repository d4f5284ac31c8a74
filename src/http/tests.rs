use super::*;
use serde::Deserialize;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize, PartialEq)]
struct Pong {
    ok: bool,
}

fn client(attempts: u32) -> HttpClient {
    HttpClient::new(Duration::from_secs(5), attempts).with_backoff(Duration::from_millis(1))
}

#[tokio::test(flavor = "multi_thread")]
async fn retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let pong: Pong = client(3)
        .get_json(&format!("{}/ping", server.uri()))
        .expect("third attempt should succeed");
    assert_eq!(pong, Pong { ok: true });
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such index"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(3)
        .get_json::<Pong>(&format!("{}/indexes/missing", server.uri()))
        .expect_err("404 should fail");
    assert!(err.is_not_found());
    assert!(err.to_string().contains("no such index"));
}

#[tokio::test(flavor = "multi_thread")]
async fn non_idempotent_post_sent_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(3)
        .post_json::<_, Pong>(
            &format!("{}/generate", server.uri()),
            &json!({"prompt": "hi"}),
            Retry::Never,
        )
        .expect_err("500 should fail");
    assert_eq!(err.status(), Some(500));
}

#[tokio::test(flavor = "multi_thread")]
async fn post_sends_json_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("Api-Key", "secret"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({"value": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let pong: Pong = client(1)
        .with_header("Api-Key", "secret")
        .post_json(
            &format!("{}/echo", server.uri()),
            &json!({"value": 3}),
            Retry::Idempotent,
        )
        .expect("request should succeed");
    assert!(pong.ok);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(3)
        .get_json::<Pong>(&server.uri())
        .expect_err("body is not json");
    assert!(matches!(err, HttpError::Decode(_)));
}

#[test]
fn unreachable_host_is_transport_error() {
    let err = client(2)
        .get_json::<Pong>("http://127.0.0.1:1/ping")
        .expect_err("nothing listens on port 1");
    assert!(matches!(err, HttpError::Transport(_)));
}

#[test]
fn attempts_never_zero() {
    assert_eq!(HttpClient::new(Duration::from_secs(1), 0).retry_attempts(), 1);
}

#[test]
fn join_url_keeps_base_path() {
    assert_eq!(
        join_url("https://api.openai.com/v1", "embeddings"),
        "https://api.openai.com/v1/embeddings"
    );
    assert_eq!(
        join_url("http://localhost:11434/", "/api/embed"),
        "http://localhost:11434/api/embed"
    );
}
