//! Integration tests for the chat-completions and embedding HTTP clients
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use mentor_cogbench::config::{EmbeddingBackendKind, EmbeddingConfig, LlmConfig, RequestConfig};
use mentor_cogbench::embedding::{EmbeddingBackend, EmbeddingService, HttpEmbedder};
use mentor_cogbench::error::{EmbeddingError, LlmError};
use mentor_cogbench::llm::{ChatClient, ChatRequest, LlmBackend, Message};

fn request_config(max_retries: u32) -> RequestConfig {
    RequestConfig {
        timeout_ms: 5000,
        max_retries,
        retry_delay_ms: 10,
        max_backoff_ms: 40,
    }
}

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str, max_retries: u32) -> ChatClient {
    let config = LlmConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        ..LlmConfig::default()
    };
    ChatClient::new(&config, request_config(max_retries)).expect("Failed to create client")
}

fn create_test_request(content: &str) -> ChatRequest {
    ChatRequest::new(
        "gpt-4o-mini",
        vec![
            Message::system("You are a Socratic design tutor."),
            Message::user(content),
        ],
    )
    .with_max_tokens(200)
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "model": "gpt-4o-mini",
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 40, "completion_tokens": 12, "total_tokens": 52}
    })
}

mod chat_tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_completion() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-api-key"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 200})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body("What does the entrance need to do?")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let completion = client
            .generate(&create_test_request("Where should the entrance go?"))
            .await
            .unwrap();

        assert_eq!(completion.content, "What does the entrance need to do?");
        assert_eq!(completion.usage.total_tokens, 52);
    }

    #[tokio::test]
    async fn test_trailing_slash_in_base_url() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&format!("{}/", mock_server.uri()), 0);
        assert!(client.generate(&create_test_request("hi")).await.is_ok());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 3);
        let result = client.generate(&create_test_request("hi")).await;
        match result {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad request");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2);
        let result = client.generate(&create_test_request("hi")).await;
        assert!(
            matches!(result, Err(LlmError::Unavailable { retries: 2, .. })),
            "got {:?}",
            result
        );
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("recovered")))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2);
        let completion = client.generate(&create_test_request("hi")).await.unwrap();
        assert_eq!(completion.content, "recovered");
    }

    #[tokio::test]
    async fn test_rate_limit_reported_after_retries() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(2)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 1);
        let result = client.generate(&create_test_request("hi")).await;
        assert!(matches!(result, Err(LlmError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_empty_content_is_invalid() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("   ")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 2);
        let result = client.generate(&create_test_request("hi")).await;
        assert!(matches!(result, Err(LlmError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let result = client.generate(&create_test_request("hi")).await;
        assert!(matches!(result, Err(LlmError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_missing_usage_defaults_to_zero() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Which view matters most?"}}]
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server.uri(), 0);
        let completion = client.generate(&create_test_request("hi")).await.unwrap();
        assert_eq!(completion.usage.total_tokens, 0);
    }
}

mod embedding_tests {
    use super::*;

    fn embedding_config(base_url: &str, dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            backend: EmbeddingBackendKind::Http,
            model_id: "text-embedding-3-small".to_string(),
            base_url: base_url.to_string(),
            api_key: "embed-key".to_string(),
            dimension,
            cache_capacity: 16,
            zero_vector_fallback: false,
        }
    }

    fn embedder(base_url: &str, dimension: usize, max_retries: u32) -> HttpEmbedder {
        HttpEmbedder::new(&embedding_config(base_url, dimension), request_config(max_retries))
            .expect("Failed to create embedder")
    }

    #[tokio::test]
    async fn test_vectors_returned_in_input_order() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("Authorization", "Bearer embed-key"))
            .and(body_partial_json(json!({"model": "text-embedding-3-small"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0, 0.0]},
                    {"index": 0, "embedding": [1.0, 0.0, 0.0]}
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = embedder(&mock_server.uri(), 3, 0);
        let vectors = backend
            .encode(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [1.0, 0.0]}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = embedder(&mock_server.uri(), 3, 2);
        let result = backend.encode(&["entrance".to_string()]).await;
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_server_failure_becomes_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&mock_server)
            .await;

        let backend = embedder(&mock_server.uri(), 3, 1);
        let result = backend.encode(&["entrance".to_string()]).await;
        assert!(matches!(result, Err(EmbeddingError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_service_cache_avoids_second_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.6, 0.8, 0.0]}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let service = EmbeddingService::from_config(
            &embedding_config(&mock_server.uri(), 3),
            request_config(0),
        )
        .unwrap();
        let first = service.embed("a courtyard garden").await.unwrap();
        let second = service.embed("a  courtyard   garden").await.unwrap();

        assert_eq!(first, second);
        let stats = service.cache_stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }
}
