mod common;

use std::{collections::HashSet, time::Duration};

use folio_api_types::RenderRequestBody;
use metrics_util::debugging::DebuggingRecorder;

use common::{Behaviour, FakeEngine, PipelineConfig, TITLE_DOCUMENT, orchestrator};

#[tokio::test]
async fn render_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let ok = orchestrator(FakeEngine::new(Behaviour::Pdf), PipelineConfig::default());
    ok.handle(RenderRequestBody::with_content(TITLE_DOCUMENT))
        .await
        .expect("render should succeed");
    ok.handle(RenderRequestBody::default())
        .await
        .expect_err("empty content is rejected");

    let crashing = orchestrator(FakeEngine::new(Behaviour::Crash), PipelineConfig::default());
    crashing
        .handle(RenderRequestBody::with_content(TITLE_DOCUMENT))
        .await
        .expect_err("crash surfaces");

    let hanging = orchestrator(
        FakeEngine::new(Behaviour::Hang),
        PipelineConfig {
            render_timeout: Duration::from_millis(20),
            ..Default::default()
        },
    );
    hanging
        .handle(RenderRequestBody::with_content(TITLE_DOCUMENT))
        .await
        .expect_err("hang times out");

    let snapshot = snapshotter.snapshot().into_vec();

    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();
    for metric in [
        "folio_render_total",
        "folio_render_duration_ms",
        "folio_render_queue_wait_ms",
        "folio_render_in_flight",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let outcomes: HashSet<String> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| composite_key.key().name() == "folio_render_total")
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .map(|label| format!("{}={}", label.key(), label.value()))
                .collect::<Vec<_>>()
        })
        .collect();
    for label in [
        "outcome=succeeded",
        "outcome=rejected",
        "outcome=failed",
        "kind=validation_error",
        "kind=engine_crash",
        "kind=engine_timeout",
    ] {
        assert!(outcomes.contains(label), "missing label: {label}");
    }
}
