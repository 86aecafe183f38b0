//! 网络翻译后端集成测试
//!
//! 在本机启动一个 axum 模拟服务，检查请求格式、响应解析和错误归类

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use epub2pdf::translation::backend::{
    BackendKind, Backends, ChatBackend, GoogleBackend, TranslationBackend,
};
use epub2pdf::translation::config::ProviderConfig;
use epub2pdf::translation::{BackendErrorKind, TranslationEngine};

mod common {
    include!("common/mod.rs");
}

use common::fast_engine_config;

async fn chat(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer test-key");
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "invalid api key"}})),
        );
    }

    let content = body["messages"][1]["content"].as_str().unwrap_or_default();
    assert_eq!(body["messages"][0]["role"], "system");
    assert!(body["model"].is_string());
    assert!(body["max_tokens"].is_number());

    match content {
        "quota" => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"message": "Insufficient balance, please top up"}})),
        ),
        "busy" => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"message": "rate limit reached"})),
        ),
        "empty" => (
            StatusCode::OK,
            Json(json!({"choices": [{"message": {"content": "   "}}]})),
        ),
        other => (
            StatusCode::OK,
            Json(json!({"choices": [{"message": {"content": format!("  译文：{}  ", other)}}]})),
        ),
    }
}

async fn google(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    assert_eq!(params.get("client").map(String::as_str), Some("gtx"));
    let q = params.get("q").cloned().unwrap_or_default();
    if q == "broken" {
        return (StatusCode::OK, Json(json!({"unexpected": true})));
    }
    (
        StatusCode::OK,
        Json(json!([[["你好，", q, null], ["世界", "world", null]], null, "en"])),
    )
}

/// 启动模拟服务，返回基础地址
async fn start_mock_server() -> String {
    let app = Router::new()
        .route("/v1/chat/completions", post(chat))
        .route("/translate_a/single", get(google));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn chat_backend(base: &str, api_key: Option<&str>) -> ChatBackend {
    ChatBackend::new(
        BackendKind::SiliconFlow,
        reqwest::Client::new(),
        ProviderConfig {
            api_url: format!("{}/v1/chat/completions", base),
            model: "test-model".to_string(),
            api_key: api_key.map(str::to_string),
        },
        0.3,
        4000,
        3000,
    )
}

/// 对话补全后端：成功响应去掉首尾空白
#[tokio::test]
async fn test_chat_backend_reads_first_choice() {
    let base = start_mock_server().await;
    let backend = chat_backend(&base, Some("test-key"));

    let text = backend.translate("hello").await.unwrap();
    assert_eq!(text, "译文：hello");

    println!("✅ 对话补全后端解析成功");
}

/// 对话补全后端的错误归类
#[tokio::test]
async fn test_chat_backend_classifies_errors() {
    let base = start_mock_server().await;

    let missing = chat_backend(&base, None).translate("hello").await.unwrap_err();
    assert_eq!(missing.kind, BackendErrorKind::AuthMissing);

    let wrong = chat_backend(&base, Some("wrong")).translate("hello").await.unwrap_err();
    assert_eq!(wrong.kind, BackendErrorKind::AuthMissing);
    assert_eq!(wrong.status, Some(401));

    let backend = chat_backend(&base, Some("test-key"));

    let quota = backend.translate("quota").await.unwrap_err();
    assert_eq!(quota.kind, BackendErrorKind::QuotaExhausted);
    assert!(!quota.is_retryable());

    let busy = backend.translate("busy").await.unwrap_err();
    assert_eq!(busy.kind, BackendErrorKind::RateLimited);
    assert!(busy.is_retryable());

    let empty = backend.translate("empty").await.unwrap_err();
    assert_eq!(empty.kind, BackendErrorKind::MalformedResponse);

    println!("✅ 错误归类正确");
}

/// 连接不上时归为网络错误
#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = chat_backend(&format!("http://{}", addr), Some("test-key"));
    let err = backend.translate("hello").await.unwrap_err();
    assert_eq!(err.kind, BackendErrorKind::Network);

    println!("✅ 连接失败归为网络错误");
}

/// 通用接口后端拼接各句译文
#[tokio::test]
async fn test_google_backend_concatenates_sentences() {
    let base = start_mock_server().await;
    let backend = GoogleBackend::new(
        reqwest::Client::new(),
        format!("{}/translate_a/single", base),
        3000,
    );

    assert_eq!(backend.translate("hello world").await.unwrap(), "你好，世界");

    let err = backend.translate("broken").await.unwrap_err();
    assert_eq!(err.kind, BackendErrorKind::MalformedResponse);

    println!("✅ 通用接口后端解析成功");
}

/// 主后端鉴权失败时沿回退链落到模拟器
#[tokio::test]
async fn test_engine_falls_back_after_auth_failure() {
    let base = start_mock_server().await;
    let backends =
        Backends::offline().with_backend(Arc::new(chat_backend(&base, Some("wrong"))));
    let engine = TranslationEngine::new(
        backends,
        vec![BackendKind::SiliconFlow],
        fast_engine_config(),
    );

    let outcome = engine.translate("the book").await;
    assert_eq!(outcome.backend, BackendKind::Simulator);
    assert!(outcome.degraded);
    assert!(outcome.text.contains("【原文】the book"));

    // 空白输入不调用后端
    let blank = engine.translate("   ").await;
    assert_eq!(blank.text, "   ");

    println!("✅ 回退链生效");
}
