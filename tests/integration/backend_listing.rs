use pullstream::backend::BackendClient;
use pullstream::error::PullError;

use crate::integration::test_utils::{FakeBackend, FakeResponse};

#[tokio::test]
async fn local_models_are_listed() {
    let backend = FakeBackend::start(|req| match (req.method.as_str(), req.path()) {
        ("POST", "/fetch/models") => FakeResponse::json(
            "{\"models\":[{\"name\":\"llama2:latest\",\"size\":1536},{\"name\":\"mistral:7b\",\"size\":\"4.1 GB\"}]}",
        ),
        _ => FakeResponse::status(404, "not found"),
    })
    .await;
    let client = BackendClient::new(&backend.config().backend).unwrap();

    let models = client.list_local_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].display_size(), "1.5 KB");
    assert_eq!(models[1].display_size(), "4.1 GB");
}

#[tokio::test]
async fn library_models_tolerate_missing_fields() {
    let backend = FakeBackend::start(|_| {
        FakeResponse::json("{\"models\":[{\"name\":\"phi\"},{\"name\":\"gemma\",\"description\":\"Google\"}]}")
    })
    .await;
    let client = BackendClient::new(&backend.config().backend).unwrap();

    let models = client.library_models().await.unwrap();
    assert_eq!(models[0].name, "phi");
    assert!(models[0].description.is_none());
    assert_eq!(models[1].description.as_deref(), Some("Google"));
}

#[tokio::test]
async fn listing_failure_is_a_backend_error() {
    let backend = FakeBackend::start(|_| FakeResponse::status(500, "boom")).await;
    let client = BackendClient::new(&backend.config().backend).unwrap();
    assert!(matches!(
        client.list_local_models().await,
        Err(PullError::Backend(_))
    ));
}

#[tokio::test]
async fn status_check_reports_not_running_on_failure() {
    let backend = FakeBackend::start(|_| FakeResponse::status(500, "boom")).await;
    let client = BackendClient::new(&backend.config().backend).unwrap();
    assert!(!client.backend_status().await.running);

    let backend = FakeBackend::start(|_| FakeResponse::json("{\"running\":true}")).await;
    let client = BackendClient::new(&backend.config().backend).unwrap();
    assert!(client.backend_status().await.running);
}
