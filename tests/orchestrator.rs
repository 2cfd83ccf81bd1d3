mod common;

use std::time::{Duration, Instant};

use folio::domain::error::RenderErrorKind;
use folio_api_types::RenderRequestBody;
use futures::future::join_all;
use serde_json::json;

use common::{Behaviour, FakeEngine, PipelineConfig, TITLE_DOCUMENT, orchestrator, wait_until};

#[tokio::test]
async fn empty_or_oversized_content_never_reaches_the_engine() {
    let engine = FakeEngine::new(Behaviour::Pdf);
    let pipeline = orchestrator(
        engine.clone(),
        PipelineConfig {
            max_content_bytes: 16,
            ..Default::default()
        },
    );

    let bodies = [
        RenderRequestBody::default(),
        RenderRequestBody::with_content(""),
        RenderRequestBody::with_content("   \n\t"),
        RenderRequestBody::with_content("x".repeat(17)),
    ];

    for body in bodies {
        let err = pipeline.handle(body).await.expect_err("must be rejected");
        assert_eq!(err.kind(), RenderErrorKind::ValidationError);
        assert!(!err.retryable());
    }
    assert_eq!(engine.calls(), 0);
    assert_eq!(pipeline.gate().available(), pipeline.gate().capacity());
}

#[tokio::test]
async fn content_at_the_limit_is_rendered() {
    let engine = FakeEngine::new(Behaviour::Pdf);
    let pipeline = orchestrator(
        engine.clone(),
        PipelineConfig {
            max_content_bytes: 64,
            ..Default::default()
        },
    );

    // The doctype prefix is added after the size check.
    let content = "x".repeat(64);
    pipeline
        .handle(RenderRequestBody::with_content(content))
        .await
        .expect("inclusive limit");
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn title_document_renders_to_pdf() {
    let engine = FakeEngine::new(Behaviour::Pdf);
    let pipeline = orchestrator(engine.clone(), PipelineConfig::default());

    let document = pipeline
        .handle(RenderRequestBody::with_content(TITLE_DOCUMENT))
        .await
        .expect("render should succeed");

    assert_eq!(document.result.media_type(), "application/pdf");
    assert!(document.result.byte_length() > 0);
    assert!(document.request.content().starts_with("<!DOCTYPE html>"));
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn invalid_page_size_names_the_field() {
    let engine = FakeEngine::new(Behaviour::Pdf);
    let pipeline = orchestrator(engine.clone(), PipelineConfig::default());

    let body = RenderRequestBody::with_content(TITLE_DOCUMENT).option("page_size", json!("Invalid"));
    let err = pipeline.handle(body).await.expect_err("invalid option");

    assert_eq!(err.kind(), RenderErrorKind::ValidationError);
    assert!(err.message().contains("page_size"), "{}", err.message());
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn every_valid_request_gets_exactly_one_outcome() {
    let cases = [
        (Behaviour::Pdf, None),
        (Behaviour::Crash, Some((RenderErrorKind::EngineCrash, false))),
        (Behaviour::Empty, Some((RenderErrorKind::EngineCrash, false))),
        (
            Behaviour::OutOfMemory,
            Some((RenderErrorKind::ResourceExhausted, true)),
        ),
        (
            Behaviour::Unavailable,
            Some((RenderErrorKind::InternalError, false)),
        ),
    ];

    for (behaviour, expected) in cases {
        let engine = FakeEngine::new(behaviour);
        let pipeline = orchestrator(engine.clone(), PipelineConfig::default());

        let outcome = pipeline
            .handle(RenderRequestBody::with_content(TITLE_DOCUMENT))
            .await;

        match (outcome, expected) {
            (Ok(document), None) => assert!(document.result.byte_length() > 0),
            (Err(err), Some((kind, retryable))) => {
                assert_eq!(err.kind(), kind, "{behaviour:?}");
                assert_eq!(err.retryable(), retryable, "{behaviour:?}");
            }
            (outcome, expected) => {
                panic!("{behaviour:?}: got {outcome:?}, expected {expected:?}")
            }
        }
        assert_eq!(engine.calls(), 1, "{behaviour:?}");
        assert_eq!(pipeline.gate().available(), pipeline.gate().capacity());
    }
}

#[tokio::test]
async fn identical_requests_render_to_equal_lengths() {
    let engine = FakeEngine::new(Behaviour::Pdf);
    let pipeline = orchestrator(engine, PipelineConfig::default());

    let body = RenderRequestBody::with_content(TITLE_DOCUMENT).option("page_size", json!("letter"));
    let first = pipeline.handle(body.clone()).await.expect("first render");
    let second = pipeline.handle(body).await.expect("second render");

    assert_eq!(first.result.byte_length(), second.result.byte_length());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn gate_caps_concurrent_engine_calls() {
    let capacity = 2;
    let extra = 4;
    let engine = FakeEngine::new(Behaviour::Slow(Duration::from_millis(50)));
    let pipeline = orchestrator(
        engine.clone(),
        PipelineConfig {
            capacity,
            queue_wait: Duration::from_secs(10),
            ..Default::default()
        },
    );

    let outcomes = join_all((0..capacity + extra).map(|_| {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .handle(RenderRequestBody::with_content(TITLE_DOCUMENT))
                .await
        })
    }))
    .await;

    for outcome in outcomes {
        outcome.expect("task should not panic").expect("queued request should succeed");
    }
    assert_eq!(engine.calls(), capacity + extra);
    assert!(engine.peak() <= capacity, "peak was {}", engine.peak());
    assert_eq!(pipeline.gate().available(), capacity);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overflow_is_rejected_after_queue_wait_without_starting_the_engine() {
    let engine = FakeEngine::new(Behaviour::Slow(Duration::from_millis(500)));
    let pipeline = orchestrator(
        engine.clone(),
        PipelineConfig {
            capacity: 1,
            queue_wait: Duration::from_millis(50),
            ..Default::default()
        },
    );

    let outcomes = join_all((0..3).map(|_| {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .handle(RenderRequestBody::with_content(TITLE_DOCUMENT))
                .await
        })
    }))
    .await;

    let mut succeeded = 0;
    let mut exhausted = 0;
    for outcome in outcomes {
        match outcome.expect("task should not panic") {
            Ok(_) => succeeded += 1,
            Err(err) => {
                assert_eq!(err.kind(), RenderErrorKind::ResourceExhausted);
                assert!(err.retryable());
                exhausted += 1;
            }
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(exhausted, 2);
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn hanging_engine_times_out_and_frees_the_slot() {
    let render_timeout = Duration::from_millis(100);
    let engine = FakeEngine::new(Behaviour::Hang);
    let pipeline = orchestrator(
        engine.clone(),
        PipelineConfig {
            capacity: 1,
            render_timeout,
            queue_wait: Duration::from_millis(200),
            ..Default::default()
        },
    );

    let started = Instant::now();
    let err = pipeline
        .handle(RenderRequestBody::with_content(TITLE_DOCUMENT))
        .await
        .expect_err("hang must time out");
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), RenderErrorKind::EngineTimeout);
    assert!(err.retryable());
    assert!(elapsed >= render_timeout);
    assert!(elapsed < render_timeout + Duration::from_secs(1), "{elapsed:?}");
    assert_eq!(engine.active(), 0);
    assert_eq!(pipeline.gate().available(), 1);

    // The freed slot is usable: the next call reaches the engine again.
    let err = pipeline
        .handle(RenderRequestBody::with_content(TITLE_DOCUMENT))
        .await
        .expect_err("hang must time out again");
    assert_eq!(err.kind(), RenderErrorKind::EngineTimeout);
    assert_eq!(engine.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_caller_releases_the_slot() {
    let engine = FakeEngine::new(Behaviour::Hang);
    let pipeline = orchestrator(
        engine.clone(),
        PipelineConfig {
            capacity: 1,
            render_timeout: Duration::from_secs(30),
            ..Default::default()
        },
    );

    let task = tokio::spawn({
        let pipeline = pipeline.clone();
        async move {
            pipeline
                .handle(RenderRequestBody::with_content(TITLE_DOCUMENT))
                .await
        }
    });

    wait_until(Duration::from_secs(2), || engine.active() == 1).await;
    assert_eq!(pipeline.gate().available(), 0);

    task.abort();
    assert!(task.await.expect_err("task was aborted").is_cancelled());

    wait_until(Duration::from_secs(2), || pipeline.gate().available() == 1).await;
    assert_eq!(engine.active(), 0);
}
