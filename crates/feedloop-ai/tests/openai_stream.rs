//! Streaming completion tests against a mock OpenAI-compatible server

use feedloop_ai::{AiError, CompletionRequest, FinishReason, LlmClient, Message, OpenAIClient};
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn disable_system_proxy_for_tests() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        // Safety: set once for the process before any HTTP clients are built.
        unsafe {
            std::env::set_var("FEEDLOOP_DISABLE_SYSTEM_PROXY", "1");
        }
    });
}

fn delta(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({"choices": [{"delta": {"content": content}, "finish_reason": null}]})
    )
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

async fn client_for(server: &MockServer) -> OpenAIClient {
    disable_system_proxy_for_tests();
    OpenAIClient::new("sk-test")
        .unwrap()
        .with_model("gpt-test")
        .with_base_url(server.uri())
}

#[tokio::test]
async fn test_stream_yields_fragments_in_order() {
    let server = MockServer::start().await;
    let body = [
        delta("Hi Diego,"),
        delta("\nWe fixed it.\n"),
        "data: {broken\n\n".to_string(),
        delta("\nBest,\nAgent"),
        format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {}, "finish_reason": "stop"}]})
        ),
        "data: [DONE]\n\n".to_string(),
    ]
    .concat();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "stream": true,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "it broke"}
            ]
        })))
        .respond_with(sse_response(body))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let request = CompletionRequest::new(vec![Message::system("be brief"), Message::user("it broke")]);
    let items: Vec<_> = client.complete_stream(request).collect().await;

    let texts: Vec<String> = items
        .iter()
        .filter_map(|item| item.as_ref().ok())
        .filter(|chunk| !chunk.text.is_empty())
        .map(|chunk| chunk.text.clone())
        .collect();
    assert_eq!(texts, vec!["Hi Diego,", "\nWe fixed it.\n", "\nBest,\nAgent"]);

    let malformed = items
        .iter()
        .filter(|item| matches!(item, Err(e) if e.is_malformed_frame()))
        .count();
    assert_eq!(malformed, 1);

    let finish = items
        .iter()
        .filter_map(|item| item.as_ref().ok())
        .find_map(|chunk| chunk.finish_reason.clone());
    assert_eq!(finish, Some(FinishReason::Stop));
}

#[tokio::test]
async fn test_stream_surfaces_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let items: Vec<_> = client
        .complete_stream(CompletionRequest::new(vec![Message::user("hi")]))
        .collect()
        .await;

    assert_eq!(items.len(), 1);
    match &items[0] {
        Err(err @ AiError::LlmHttp { status, .. }) => {
            assert_eq!(*status, 401);
            assert!(err.is_auth_error());
        }
        other => panic!("expected http error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stream_without_trailing_blank_line() {
    let server = MockServer::start().await;
    let body = format!(
        "{}data: {}",
        delta("partial"),
        json!({"choices": [{"delta": {"content": " tail"}}]})
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let texts: Vec<String> = client
        .complete_stream(CompletionRequest::new(vec![Message::user("hi")]))
        .filter_map(|item| async move { item.ok() })
        .map(|chunk| chunk.text)
        .collect()
        .await;

    assert_eq!(texts, vec!["partial", " tail"]);
}
