use super::*;
use crate::config::OllamaConfig;

fn test_config() -> OllamaConfig {
    OllamaConfig {
        protocol: "http".to_string(),
        host: "gen-host".to_string(),
        port: 4321,
        embedding_model: "embed-model".to_string(),
        generation_model: "gen-model".to_string(),
        batch_size: 16,
        embedding_dimension: 768,
    }
}

#[test]
fn client_configuration() {
    let client = GenerationClient::new(&test_config()).expect("Failed to create client");

    assert_eq!(client.model, "gen-model");
    assert_eq!(client.base_url.host_str(), Some("gen-host"));
    assert_eq!(client.base_url.port(), Some(4321));
    assert_eq!(client.retry.max_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let client = GenerationClient::new(&test_config())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(10))
        .with_retry_attempts(4);

    assert_eq!(client.retry.max_attempts, 4);
}

#[test]
fn generate_request_disables_streaming() {
    let request = GenerateRequest {
        model: "m".to_string(),
        prompt: "p".to_string(),
        stream: false,
    };
    let value = serde_json::to_value(&request).expect("should serialize");

    assert_eq!(value["model"], "m");
    assert_eq!(value["prompt"], "p");
    assert_eq!(value["stream"], false);
}

#[test]
fn generate_response_parses_answer_text() {
    let response: GenerateResponse =
        serde_json::from_str(r#"{"response": "the answer", "done": true}"#).expect("should parse");

    assert_eq!(response.response, "the answer");
}
