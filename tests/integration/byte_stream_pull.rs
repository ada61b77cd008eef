use std::sync::Arc;

use futures::StreamExt;
use pullstream::backend::BackendClient;
use pullstream::error::{PullError, GENERIC_PULL_FAILURE};
use pullstream::progress::{ProgressEvent, PullRegistry, SessionState, TransportKind};

use crate::integration::test_utils::{FakeBackend, FakeResponse};

fn registry_for(backend: &FakeBackend) -> PullRegistry {
    let client = BackendClient::new(&backend.config().backend).unwrap();
    PullRegistry::new(Arc::new(client))
}

#[tokio::test]
async fn records_split_across_chunks_become_ordered_events() {
    let backend = FakeBackend::start(|req| match req.path() {
        "/api/pull-model" => FakeResponse::ok(
            "text/event-stream",
            vec![
                "data: {\"status\":\"pulling manifest\"}\n",
                "data: {\"status\":\"downloading\",\"completed_mb\":50,",
                "\"total_mb\":100,\"progress\":50}\n",
                "data: not json\n",
                "data: {\"status\":\"verifying\"}\ndata: {\"status\":\"success\"}\n",
            ],
        ),
        _ => FakeResponse::status(404, "not found"),
    })
    .await;
    let registry = registry_for(&backend);

    let session = registry
        .start_pull("llama2", TransportKind::ByteStream)
        .await
        .unwrap();
    assert!(registry.is_active("llama2"));
    let events: Vec<_> = session.events().collect().await;

    assert_eq!(
        events,
        vec![
            ProgressEvent::Started,
            ProgressEvent::Downloading {
                completed_bytes: 50_000_000,
                total_bytes: Some(100_000_000),
                status_text: "Downloading: 50MB / 100MB (50%)".to_string(),
            },
            ProgressEvent::Verifying {
                status_text: "Verifying download...".to_string(),
            },
            ProgressEvent::Completed,
        ]
    );
    assert!(registry.snapshot().is_empty());

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["model"], "llama2");
}

#[tokio::test]
async fn error_record_fails_the_pull_with_its_message() {
    let backend = FakeBackend::start(|_| {
        FakeResponse::ok(
            "text/event-stream",
            vec![
                "data: {\"status\":\"pulling manifest\"}\n",
                "data: {\"error\":\"manifest for llama9 not found\"}\n",
                "data: {\"status\":\"success\"}\n",
            ],
        )
    })
    .await;
    let registry = registry_for(&backend);

    let session = registry
        .start_pull("llama9", TransportKind::ByteStream)
        .await
        .unwrap();
    let events: Vec<_> = session.events().collect().await;
    assert_eq!(
        events,
        vec![
            ProgressEvent::Started,
            ProgressEvent::Failed {
                message: "manifest for llama9 not found".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn body_ending_without_terminal_record_fails_generically() {
    let backend = FakeBackend::start(|_| {
        FakeResponse::ok(
            "text/event-stream",
            vec!["data: {\"status\":\"downloading\",\"completed_mb\":1,\"total_mb\":4}\n"],
        )
    })
    .await;
    let registry = registry_for(&backend);

    let mut session = registry
        .start_pull("llama2", TransportKind::ByteStream)
        .await
        .unwrap();
    assert!(matches!(
        session.next_event().await,
        Some(ProgressEvent::Downloading { .. })
    ));
    assert_eq!(
        session.next_event().await,
        Some(ProgressEvent::Failed {
            message: GENERIC_PULL_FAILURE.to_string()
        })
    );
    assert_eq!(session.next_event().await, None);
    assert!(matches!(session.state(), SessionState::Terminal(_)));
}

#[tokio::test]
async fn rejected_pull_leaves_no_registry_entry() {
    let backend = FakeBackend::start(|_| FakeResponse::status(500, "boom")).await;
    let registry = registry_for(&backend);

    let err = registry
        .start_pull("llama2", TransportKind::ByteStream)
        .await
        .unwrap_err();
    match &err {
        PullError::TransportRejected { status, .. } => assert_eq!(*status, Some(500)),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        err.as_failed_event(),
        Some(ProgressEvent::Failed {
            message: GENERIC_PULL_FAILURE.to_string()
        })
    );
    assert!(!registry.is_active("llama2"));
}

#[tokio::test]
async fn unreachable_backend_is_rejected() {
    // Port 9 (discard) is closed on test hosts.
    let config = pullstream::config::BackendConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        connect_timeout_secs: 1,
        ..Default::default()
    };
    let registry = PullRegistry::new(Arc::new(BackendClient::new(&config).unwrap()));
    let err = registry
        .start_pull("llama2", TransportKind::ByteStream)
        .await
        .unwrap_err();
    assert!(matches!(err, PullError::TransportRejected { status: None, .. }));
    assert!(registry.snapshot().is_empty());
}

#[tokio::test]
async fn error_record_with_badly_typed_fields_still_fails() {
    let backend = FakeBackend::start(|_| {
        FakeResponse::ok(
            "text/event-stream",
            vec![
                "data: {\"error\":\"disk full\",\"progress\":\"n/a\"}\n",
                "data: {\"status\":\"success\"}\n",
            ],
        )
    })
    .await;
    let registry = registry_for(&backend);

    let session = registry
        .start_pull("llama2", TransportKind::ByteStream)
        .await
        .unwrap();
    let events: Vec<_> = session.events().collect().await;
    assert_eq!(
        events,
        vec![ProgressEvent::Failed {
            message: "disk full".to_string()
        }]
    );
    assert!(registry.snapshot().is_empty());
}

#[tokio::test]
async fn status_records_mid_download_are_kept_in_order() {
    let backend = FakeBackend::start(|_| {
        FakeResponse::ok(
            "text/event-stream",
            vec![
                "data: {\"status\":\"pulling manifest\"}\n",
                "data: {\"status\":\"downloading\",\"completed_mb\":100,\"total_mb\":100,\"progress\":100}\n",
                "data: {\"status\":\"writing manifest\"}\n",
                "data: {\"status\":\"removing any unused layers\"}\n",
                "data: {\"status\":\"success\"}\n",
            ],
        )
    })
    .await;
    let registry = registry_for(&backend);

    let session = registry
        .start_pull("llama2", TransportKind::ByteStream)
        .await
        .unwrap();
    let events: Vec<_> = session.events().collect().await;
    let texts: Vec<String> = events
        .iter()
        .map(|event| match event {
            ProgressEvent::Downloading { status_text, .. } => status_text.clone(),
            other => other.kind().to_string(),
        })
        .collect();
    assert_eq!(
        texts,
        vec![
            "started",
            "Downloading: 100MB / 100MB (100%)",
            "writing manifest",
            "removing any unused layers",
            "completed",
        ]
    );
    assert!(matches!(
        events[3],
        ProgressEvent::Downloading {
            completed_bytes: 100_000_000,
            total_bytes: Some(100_000_000),
            ..
        }
    ));
}
