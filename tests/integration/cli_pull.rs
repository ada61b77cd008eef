use std::io::{self, Write};
use std::time::Duration;

use pullstream::cli::{Commands, OutputFormat, RunContext};
use pullstream::error::PullError;
use pullstream::progress::TransportKind;

use crate::integration::test_utils::{FakeBackend, FakeResponse};

fn stream_backend_chunks() -> Vec<&'static str> {
    vec![
        "data: {\"status\":\"pulling manifest\"}\n",
        "data: {\"status\":\"downloading\",\"completed_mb\":25,\"total_mb\":100,\"progress\":25}\n",
        "data: {\"status\":\"success\"}\n",
    ]
}

#[tokio::test]
async fn text_pull_prints_one_line_per_event() {
    let backend =
        FakeBackend::start(|_| FakeResponse::ok("text/event-stream", stream_backend_chunks())).await;
    let ctx = RunContext::from_config(backend.config()).unwrap();

    let mut out: Vec<u8> = Vec::new();
    let summary = ctx
        .pull("llama2", TransportKind::ByteStream, OutputFormat::Text, &mut out)
        .await
        .unwrap();
    assert_eq!(summary, "Pulled llama2");

    let printed = String::from_utf8(out).unwrap();
    let lines: Vec<_> = printed.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("Starting pull"));
    assert!(lines[1].contains("Downloading: 25MB / 100MB (25%)"));
    assert!(lines[2].contains("Pull complete"));
}

#[tokio::test]
async fn json_pull_emits_tagged_updates() {
    let backend =
        FakeBackend::start(|_| FakeResponse::ok("text/event-stream", stream_backend_chunks())).await;
    let ctx = RunContext::from_config(backend.config()).unwrap();

    let mut out: Vec<u8> = Vec::new();
    ctx.pull("llama2", TransportKind::ByteStream, OutputFormat::Json, &mut out)
        .await
        .unwrap();

    let kinds: Vec<String> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            assert_eq!(v["key"], "llama2");
            v["event"]["kind"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(kinds, vec!["started", "downloading", "completed"]);
}

#[tokio::test]
async fn failed_pull_is_an_error_outcome() {
    let backend = FakeBackend::start(|_| {
        FakeResponse::ok("text/event-stream", vec!["data: {\"error\":\"disk full\"}\n"])
    })
    .await;
    let ctx = RunContext::from_config(backend.config()).unwrap();

    let mut out: Vec<u8> = Vec::new();
    let err = ctx
        .pull("llama2", TransportKind::ByteStream, OutputFormat::Text, &mut out)
        .await
        .unwrap_err();
    match err {
        PullError::PullFailed { key, message } => {
            assert_eq!(key, "llama2");
            assert_eq!(message, "disk full");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(ctx.registry().snapshot().is_empty());
}

struct ClosedPipe;

impl Write for ClosedPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }
}

#[tokio::test]
async fn broken_output_aborts_the_pull() {
    let backend = FakeBackend::start(|_| {
        FakeResponse::ok(
            "text/event-stream",
            vec!["data: {\"status\":\"pulling manifest\"}\n"],
        )
        .held_open()
    })
    .await;
    let ctx = RunContext::from_config(backend.config()).unwrap();

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        ctx.pull("llama2", TransportKind::ByteStream, OutputFormat::Text, &mut ClosedPipe),
    )
    .await
    .expect("pull should end once output fails")
    .unwrap_err();
    assert!(matches!(err, PullError::Aborted(ref key) if key == "llama2"));
    assert!(ctx.registry().snapshot().is_empty());
}

#[tokio::test]
async fn models_and_status_commands_render() {
    let backend = FakeBackend::start(|req| match req.path() {
        "/fetch/models" => FakeResponse::json(
            "{\"models\":[{\"name\":\"llama2:latest\",\"size\":3825819519,\"modified_at\":\"2024-01-02\"}]}",
        ),
        "/api/ollama-status" => FakeResponse::json("{\"running\":true}"),
        _ => FakeResponse::status(404, "not found"),
    })
    .await;
    let ctx = RunContext::from_config(backend.config()).unwrap();

    let models = ctx
        .execute(&Commands::Models {
            format: OutputFormat::Text,
        })
        .await
        .unwrap();
    assert!(models.contains("llama2:latest"));
    assert!(models.contains("3.56 GB"));

    let status = ctx
        .execute(&Commands::Status {
            format: OutputFormat::Json,
        })
        .await
        .unwrap();
    let status: serde_json::Value = serde_json::from_str(&status).unwrap();
    assert_eq!(status["running"], true);
    assert_eq!(status["base_url"], backend.base_url());
}
