use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> CompletionRequest {
    CompletionRequest {
        system: Some("You are terse.".to_string()),
        prompt: "Who won gold?".to_string(),
        max_tokens: 150,
        temperature: 0.7,
    }
}

fn client_for(server: &MockServer, api_key: Option<&str>) -> OpenAiChatClient {
    OpenAiChatClient::new(
        &format!("{}/v1", server.uri()),
        "gpt-4o-mini",
        api_key,
        Duration::from_secs(5),
    )
    .expect("client")
}

#[tokio::test(flavor = "multi_thread")]
async fn sends_chat_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 150,
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "Who won gold?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Ledecky."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = client_for(&server, Some("sk-test"))
        .complete(&request())
        .expect("completion");
    assert_eq!(answer, "Ledecky.");
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server, Some("sk-test"))
        .complete(&request())
        .expect_err("503");
    assert!(matches!(err, RagError::Generation(ref msg) if msg.contains("overloaded")));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_choices_yield_empty_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let answer = client_for(&server, None)
        .complete(&request())
        .expect("empty completion is still a response");
    assert!(answer.is_empty());
}

#[test]
fn rejects_invalid_base_url() {
    let result = OpenAiChatClient::new("::not a url", "gpt-4o-mini", None, Duration::from_secs(1));
    assert!(matches!(result, Err(RagError::Config(_))));
}
