//! Façade behaviour over the scripted in-memory transport.

use std::time::Duration;

use proptest::prelude::*;
use resilient_client::{ApiResponse, HttpClient, RetryConfig, SdkError};
use resilient_client_integration_tests::{cached_config, fast_config};
use serde_json::json;
use test_utils::fixtures::{SampleWidget, success_envelope};
use test_utils::{MockTransport, ScriptedResponse, non_retryable_status, retry_config};

const BASE: &str = "http://mock.test/api";

#[tokio::test]
async fn test_network_failure_then_success() {
    let transport = MockTransport::scripted([
        ScriptedResponse::error(SdkError::network("connection reset")),
        ScriptedResponse::json(&success_envelope(&json!(SampleWidget::sprocket()))),
    ])
    .shared();
    let client = HttpClient::new(fast_config(BASE), transport.clone(), None).unwrap();

    let response: ApiResponse<SampleWidget> = client.get("/widgets/2").await.unwrap();

    assert_eq!(response.data, Some(SampleWidget::sprocket()));
    assert_eq!(transport.calls(), 2);
    let last = transport.last_request().await.unwrap();
    assert_eq!(last.url, "http://mock.test/api/widgets/2");
    assert!(last.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_cache_entry_expires_after_ttl() {
    let transport = MockTransport::new().shared();
    let client = HttpClient::new(cached_config(BASE), transport.clone(), None).unwrap();

    let request =
        resilient_client::ApiRequest::get("/widgets").cache_ttl(Duration::from_millis(20));
    let _: ApiResponse<serde_json::Value> = client.execute(request.clone()).await.unwrap();
    let _: ApiResponse<serde_json::Value> = client.execute(request.clone()).await.unwrap();
    assert_eq!(transport.calls(), 1);

    tokio::time::sleep(Duration::from_millis(40)).await;
    let _: ApiResponse<serde_json::Value> = client.execute(request).await.unwrap();
    assert_eq!(transport.calls(), 2);
    client.dispose();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(25))]

    #[test]
    fn prop_server_errors_use_whole_budget(config in retry_config()) {
        let attempts = config.max_attempts;
        block_on(async move {
            let transport = MockTransport::new()
                .with_fallback(ScriptedResponse::status(503, "unavailable"))
                .shared();
            let client =
                HttpClient::new(fast_config(BASE).with_retry(config), transport.clone(), None)
                    .unwrap();

            let err = client.get::<serde_json::Value>("/flaky").await.unwrap_err();

            assert!(matches!(err, SdkError::Http { status: 503, .. }));
            assert_eq!(transport.calls(), attempts);
        });
    }

    #[test]
    fn prop_client_errors_are_not_retried(status in non_retryable_status()) {
        block_on(async move {
            let transport = MockTransport::new()
                .with_fallback(ScriptedResponse::status(status, "nope"))
                .shared();
            let retry = RetryConfig::default().with_base_delay(Duration::from_millis(1));
            let client =
                HttpClient::new(fast_config(BASE).with_retry(retry), transport.clone(), None)
                    .unwrap();

            let err = client.get::<serde_json::Value>("/widgets").await.unwrap_err();

            assert_eq!(err.status(), Some(status));
            assert_eq!(transport.calls(), 1);
        });
    }
}

fn block_on<F: std::future::Future<Output = ()>>(future: F) {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future);
}
