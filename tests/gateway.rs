//! HTTP contract tests for the model gateway, transcription and the network tools
//!
//! Every backend runs against a local wiremock server

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nao_agent::agent::{AnthropicGateway, ChatModel, Message, ModelOutput, OpenAiGateway};
use nao_agent::config::{LlmConfig, LlmProvider, SearchBackend, SearchConfig};
use nao_agent::tools::{ToolRegistry, WeatherClient, WeatherTool, WebSearchTool};
use nao_agent::voice::{SpeechToText, Transcriber};
use nao_agent::Error;

fn llm(provider: LlmProvider, base_url: &str) -> LlmConfig {
    LlmConfig {
        provider,
        model: "test-model".to_string(),
        api_key: SecretString::from("test-key".to_string()),
        base_url: base_url.to_string(),
        temperature: 0.7,
        max_tokens: 256,
        max_tool_rounds: 8,
        system_prompt: "You are NAO.".to_string(),
    }
}

fn weather_registry(base_url: &str) -> ToolRegistry {
    let client = Arc::new(WeatherClient::with_base_url(base_url));
    let mut registry = ToolRegistry::new(Duration::from_secs(5));
    for tool in WeatherTool::all(&client) {
        registry.register(tool);
    }
    registry
}

#[tokio::test]
async fn test_anthropic_request_carries_tools_and_parses_tool_use() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "system": "You are NAO.",
            "messages": [{"role": "user", "content": [{"type": "text", "text": "¿Qué tiempo hace?"}]}],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "get_temperature",
                 "input": {"latitude": 40.4, "longitude": -3.7}},
            ],
            "stop_reason": "tool_use",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registry = weather_registry("http://unused.invalid");
    let gateway = AnthropicGateway::new(&llm(LlmProvider::Anthropic, &server.uri()), &registry).unwrap();

    let out = gateway
        .generate(&[Message::user("¿Qué tiempo hace?")])
        .await
        .unwrap();

    let ModelOutput::ToolCalls { preamble, calls } = out else {
        panic!("expected tool calls, got {out:?}");
    };
    assert_eq!(preamble.as_deref(), Some("Let me check."));
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "get_temperature");
    assert_eq!(calls[0].arguments["longitude"], -3.7);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["tools"].as_array().unwrap().len(), 9);
    assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
}

#[tokio::test]
async fn test_anthropic_rejected_key_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"},
        })))
        .mount(&server)
        .await;

    let gateway = AnthropicGateway::new(
        &llm(LlmProvider::Anthropic, &server.uri()),
        &ToolRegistry::new(Duration::from_secs(1)),
    )
    .unwrap();
    let err = gateway.generate(&[Message::user("hola")]).await.unwrap_err();

    assert!(matches!(err, Error::Auth(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_anthropic_overload_is_model_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let gateway = AnthropicGateway::new(
        &llm(LlmProvider::Anthropic, &server.uri()),
        &ToolRegistry::new(Duration::from_secs(1)),
    )
    .unwrap();
    let err = gateway.generate(&[Message::user("hola")]).await.unwrap_err();

    assert!(matches!(err, Error::ModelUnavailable(_)));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_model_unavailable() {
    // Nothing listens on the discard port
    let gateway = OpenAiGateway::new(
        &llm(LlmProvider::OpenAi, "http://127.0.0.1:9"),
        &ToolRegistry::new(Duration::from_secs(1)),
    )
    .unwrap();
    let err = gateway.generate(&[Message::user("hola")]).await.unwrap_err();

    assert!(matches!(err, Error::ModelUnavailable(_)));
}

#[tokio::test]
async fn test_openai_text_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "messages": [
                {"role": "system", "content": "You are NAO."},
                {"role": "user", "content": "hola"},
            ],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "¡Hola!"},
                "finish_reason": "stop",
            }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = OpenAiGateway::new(
        &llm(LlmProvider::OpenAi, &server.uri()),
        &ToolRegistry::new(Duration::from_secs(1)),
    )
    .unwrap();
    let out = gateway.generate(&[Message::user("hola")]).await.unwrap();

    assert_eq!(out, ModelOutput::Text("¡Hola!".to_string()));

    // No tools registered, so none are offered
    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert!(body.get("tools").is_none());
}

#[tokio::test]
async fn test_openai_garbled_arguments_are_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{"id": "call_1", "type": "function",
                    "function": {"name": "get_rain", "arguments": "{\"latitude\": 40.4,"}}],
            }}],
        })))
        .mount(&server)
        .await;

    let gateway = OpenAiGateway::new(
        &llm(LlmProvider::OpenAi, &server.uri()),
        &ToolRegistry::new(Duration::from_secs(1)),
    )
    .unwrap();
    let err = gateway.generate(&[Message::user("¿llueve?")]).await.unwrap_err();

    assert!(matches!(err, Error::MalformedToolCall { .. }));
}

#[tokio::test]
async fn test_weather_tool_reads_current_conditions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "40.4"))
        .and(query_param("longitude", "-3.7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "latitude": 40.4,
            "longitude": -3.7,
            "current": {
                "time": "2024-05-01T12:00",
                "temperature_2m": 21.4,
                "relative_humidity_2m": 40,
                "apparent_temperature": 20.9,
                "is_day": 1,
                "precipitation": 0.0,
                "rain": 0.0,
                "showers": 0.0,
                "snowfall": 0.0,
            },
        })))
        .mount(&server)
        .await;

    let registry = weather_registry(&server.uri());
    let args = json!({"latitude": 40.4, "longitude": -3.7});

    let temperature = registry.dispatch("get_temperature", &args).await.unwrap();
    assert_eq!(temperature, "Temperature: 21.4°C");

    let day = registry.dispatch("get_day_or_night", &args).await.unwrap();
    assert_eq!(day, "It is currently day.");

    let report = registry.dispatch("get_full_weather_report", &args).await.unwrap();
    assert!(report.starts_with("Weather Report for coordinates (40.4, -3.7):"));
    assert_eq!(report.lines().count(), 9);
}

#[tokio::test]
async fn test_weather_rejects_out_of_range_coordinates() {
    let server = MockServer::start().await;
    let registry = weather_registry(&server.uri());

    let err = registry
        .dispatch("get_rain", &json!({"latitude": 123.0, "longitude": 0.0}))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidArguments { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tavily_search_results_are_numbered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({
            "api_key": "tvly-test",
            "query": "NAO robot",
            "max_results": 2,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"title": "NAO", "url": "https://example.org/nao", "content": "A humanoid robot."},
                {"title": "NAOqi", "url": "https://example.org/naoqi", "content": "Its SDK."},
            ],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tool = WebSearchTool::new(&SearchConfig {
        backend: SearchBackend::Tavily,
        api_key: SecretString::from("tvly-test".to_string()),
    })
    .with_base_url(server.uri());
    let registry = ToolRegistry::new(Duration::from_secs(5)).with(Arc::new(tool));

    let out = registry
        .dispatch("web_search", &json!({"query": "NAO robot", "max_results": 2}))
        .await
        .unwrap();

    assert!(out.contains("1. NAO"));
    assert!(out.contains("https://example.org/naoqi"));
}

#[tokio::test]
async fn test_whisper_upload_returns_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .and(header("authorization", "Bearer stt-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "Realiza algo"})))
        .expect(1)
        .mount(&server)
        .await;

    let stt = SpeechToText::new_whisper(
        SecretString::from("stt-key".to_string()),
        "whisper-1".to_string(),
        "es".to_string(),
    )
    .unwrap()
    .with_base_url(server.uri());

    let hypotheses = stt.transcribe(&[0.0; 1_600]).await.unwrap();
    assert_eq!(hypotheses[0].text, "Realiza algo");
}

#[tokio::test]
async fn test_deepgram_failure_is_transcription_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/listen"))
        .and(query_param("language", "es"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let stt = SpeechToText::new_deepgram(
        SecretString::from("dg-key".to_string()),
        "nova-2".to_string(),
        "es".to_string(),
    )
    .unwrap()
    .with_base_url(server.uri());

    let err = stt.transcribe(&[0.0; 1_600]).await.unwrap_err();
    assert!(matches!(err, Error::Transcription(_)));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_rejected_stt_key_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"},
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/listen"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let whisper = SpeechToText::new_whisper(
        SecretString::from("bad-key".to_string()),
        "whisper-1".to_string(),
        "es".to_string(),
    )
    .unwrap()
    .with_base_url(server.uri());
    let deepgram = SpeechToText::new_deepgram(
        SecretString::from("bad-key".to_string()),
        "nova-2".to_string(),
        "es".to_string(),
    )
    .unwrap()
    .with_base_url(server.uri());

    for stt in [whisper, deepgram] {
        let err = stt.transcribe(&[0.0; 1_600]).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "got {err:?}");
        assert!(err.is_fatal());
    }
}
