//! HTTP-level tests for the inference client.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cropscan_ai_client::{AiClient, AiClientConfig, AiError};

fn client_for(server: &MockServer) -> AiClient {
    AiClient::new(AiClientConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
        max_retries: 0,
    })
    .unwrap()
}

#[tokio::test]
async fn test_health_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(&server)
        .await;

    assert!(client_for(&server).health_check().await);
}

#[tokio::test]
async fn test_health_wrong_status_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "loading"})),
        )
        .mount(&server)
        .await;

    assert!(!client_for(&server).health_check().await);
}

#[tokio::test]
async fn test_health_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(!client_for(&server).health_check().await);
}

#[tokio::test]
async fn test_health_unreachable() {
    let client = AiClient::new(AiClientConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        timeout: Duration::from_secs(1),
        max_retries: 0,
    })
    .unwrap();

    assert!(!client.health_check().await);
}

#[tokio::test]
async fn test_detect_image_parses_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "predictions": [
                {"class": "sauvebua", "confidence": 0.87, "box": [0, 0, 10, 10], "class_id": 2, "track_id": null}
            ],
            "processed_media_base64": "QUJD",
            "media_type": "image/jpeg"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .detect_image(b"\xff\xd8fake", "photo.jpg", "image/jpeg")
        .await
        .unwrap();

    assert_eq!(result.count(), 1);
    assert_eq!(result.best().unwrap().label, "sauvebua");
    assert_eq!(
        result.annotated_data_url().as_deref(),
        Some("data:image/jpeg;base64,QUJD")
    );
}

#[tokio::test]
async fn test_detect_image_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict/image"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad image"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .detect_image(b"junk", "photo.jpg", "image/jpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, AiError::RequestFailed(ref msg) if msg.contains("422")));
}

#[tokio::test]
async fn test_detect_image_invalid_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict/image"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .detect_image(b"junk", "photo.jpg", "image/jpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, AiError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_detect_image_retries_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict/image"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = AiClient::new(AiClientConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
        max_retries: 1,
    })
    .unwrap();

    let err = client
        .detect_image(b"junk", "photo.jpg", "image/jpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, AiError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn test_detect_image_recovers_after_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predict/image"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/predict/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "predictions": [
                {"class": "sauvebua", "confidence": 0.64, "box": [0, 0, 10, 10], "class_id": 2, "track_id": null}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AiClient::new(AiClientConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
        max_retries: 2,
    })
    .unwrap();

    let result = client
        .detect_image(b"\xff\xd8fake", "photo.jpg", "image/jpeg")
        .await
        .unwrap();
    assert_eq!(result.count(), 1);
}
