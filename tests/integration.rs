//! End-to-end tests: SQLite backend through decision, path resolution and streaming


use query_output::config::{OutputConfig, OutputFormat};
use query_output::error::{ErrorKind, OutputError};
use query_output::orchestrator::{Outcome, OutputRequest};
use query_output::paths::PathResolver;
use std::sync::Arc;
use test_utils::TestContext;

const QUERY: &str = "SELECT id, sensor, reading, note FROM measurements ORDER BY id";

#[tokio::test]
async fn test_scenario_a_small_result_inline() {
    let ctx = TestContext::with_rows(500).await;
    let outcome = ctx
        .orchestrator(ctx.config(1000))
        .execute(OutputRequest::new(QUERY), &ctx.backend)
        .await
        .unwrap();

    let decision = outcome.decision();
    assert!(!decision.use_file);
    assert_eq!(decision.row_count, Some(500));
    assert!(decision.reason.contains("row_count <= threshold"));
    assert!(outcome.artifact().is_none());
    // Inline results never create the output directory
    assert!(!ctx.root.join("output").exists());
}

#[tokio::test]
async fn test_scenario_b_large_result_file() {
    let ctx = TestContext::with_rows(5000).await;
    let outcome = ctx
        .orchestrator(ctx.config(1000))
        .execute(OutputRequest::new(QUERY).chunk_size(700), &ctx.backend)
        .await
        .unwrap();

    assert!(outcome.decision().use_file);
    let artifact = outcome.artifact().unwrap();
    assert_eq!(artifact.rows, 5000);
    assert_eq!(artifact.columns, 4);
    assert_eq!(artifact.format, OutputFormat::Csv);
    assert!(artifact.path.is_absolute());
    assert_eq!(artifact.bytes, std::fs::metadata(&artifact.path).unwrap().len());
}

#[tokio::test]
async fn test_scenario_c_forced_file_override() {
    let ctx = TestContext::with_rows(10).await;
    let outcome = ctx
        .orchestrator(ctx.config(1000))
        .execute(OutputRequest::new(QUERY).mode("file"), &ctx.backend)
        .await
        .unwrap();

    let decision = outcome.decision();
    assert!(decision.use_file);
    assert!(decision.forced);
    assert!(decision.reason.contains("override"));
    assert_eq!(outcome.artifact().unwrap().rows, 10);
}

#[tokio::test]
async fn test_scenario_d_relative_location_without_root() {
    let ctx = TestContext::with_rows(10).await;
    let config = Arc::new(OutputConfig::default());
    let err = ctx
        .orchestrator(config)
        .execute(
            OutputRequest::new(QUERY).mode("file").location("./out_scenario_d"),
            &ctx.backend,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OutputError::NoSandboxRoot { .. }));
    assert_eq!(err.kind(), ErrorKind::PathSecurity);
    assert!(!std::path::Path::new("./out_scenario_d").exists());
}

#[tokio::test]
async fn test_scenario_e_reserved_filename() {
    let ctx = TestContext::with_rows(10).await;
    let err = ctx
        .orchestrator(ctx.config(1000))
        .execute(OutputRequest::new(QUERY).filename("CON.csv"), &ctx.backend)
        .await
        .unwrap_err();
    assert!(matches!(err, OutputError::ReservedFilename(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_threshold_property_over_row_counts() {
    let ctx = TestContext::with_rows(120).await;
    let orchestrator = ctx.orchestrator(ctx.config(100));

    for limit in [0u64, 1, 99, 100, 101, 120] {
        let query = format!("SELECT * FROM measurements ORDER BY id LIMIT {}", limit);
        let outcome = orchestrator
            .execute(OutputRequest::new(query), &ctx.backend)
            .await
            .unwrap();
        assert_eq!(outcome.decision().use_file, limit > 100, "limit={}", limit);
    }
}

#[tokio::test]
async fn test_csv_round_trip_from_sqlite() {
    let ctx = TestContext::with_rows(1234).await;
    let outcome = ctx
        .orchestrator(ctx.config(1000))
        .execute(
            OutputRequest::new(QUERY)
                .mode("file")
                .location("exports/csv")
                .filename("measurements")
                .chunk_size(100),
            &ctx.backend,
        )
        .await
        .unwrap();
    let artifact = outcome.artifact().unwrap();
    assert_eq!(artifact.path, ctx.root.join("exports/csv/measurements.csv"));

    let mut reader = csv::Reader::from_path(&artifact.path).unwrap();
    assert_eq!(
        reader.headers().unwrap().iter().collect::<Vec<_>>(),
        ["id", "sensor", "reading", "note"]
    );
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 1234);
    assert!(records.iter().all(|r| r.len() == 4));
    assert_eq!(&records[0][0], "1");
    assert_eq!(&records[0][1], "sensor-1");
    assert_eq!(&records[0][2], "0.25");
    assert_eq!(&records[0][3], "comma, \"quoted\"");
    // id 10 has a NULL note
    assert_eq!(&records[9][3], "");
}

#[tokio::test]
async fn test_json_round_trip_from_sqlite() {
    let ctx = TestContext::with_rows(1500).await;
    let outcome = ctx
        .orchestrator(ctx.config(1000))
        .execute(
            OutputRequest::new(QUERY).format("json").chunk_size(256),
            &ctx.backend,
        )
        .await
        .unwrap();
    let artifact = outcome.artifact().unwrap();
    assert_eq!(artifact.format, OutputFormat::Json);
    assert!(artifact.path.to_string_lossy().ends_with(".json"));

    let content = std::fs::read_to_string(&artifact.path).unwrap();
    let rows: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(&content).unwrap();
    assert_eq!(rows.len(), 1500);
    assert_eq!(
        rows[0].keys().collect::<Vec<_>>(),
        ["id", "sensor", "reading", "note"]
    );
    assert_eq!(rows[9]["note"], serde_json::Value::Null);
    assert_eq!(rows[1]["id"], 2);
}

#[tokio::test]
async fn test_install_tree_rejected_for_absolute_location() {
    let ctx = TestContext::with_rows(10).await;
    let target = ctx.install.join("results");
    let err = ctx
        .orchestrator(ctx.config(1000))
        .execute(
            OutputRequest::new(QUERY)
                .mode("file")
                .location(target.to_string_lossy()),
            &ctx.backend,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OutputError::InsideInstallTree { .. }));
    assert!(!target.exists());
}

#[tokio::test]
async fn test_resolve_twice_is_idempotent() {
    let ctx = TestContext::with_rows(0).await;
    let config = ctx.config(1000);
    let resolver = PathResolver::new(config).with_install_dir(&ctx.install);
    let first = resolver.resolve(Some("nested/dir"), "a.csv").await.unwrap();
    let second = resolver.resolve(Some("nested/dir"), "a.csv").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_query_error_propagates() {
    let ctx = TestContext::with_rows(10).await;
    let err = ctx
        .orchestrator(ctx.config(1000))
        .execute(OutputRequest::new("SELECT * FROM nope"), &ctx.backend)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Backend);
}

#[tokio::test]
async fn test_estimate_reports_confidence() {
    let ctx = TestContext::with_rows(2000).await;
    let estimate = ctx
        .orchestrator(ctx.config(1000))
        .estimate(QUERY, &ctx.backend)
        .await
        .unwrap();
    assert_eq!(estimate.row_count, 2000);
    assert_eq!(estimate.sampled_rows, 100);
    assert!(estimate.estimated_total_tokens > 0);
    assert!(estimate.estimated_bytes > 0);
}

#[tokio::test]
async fn test_inline_outcome_serializes() {
    let ctx = TestContext::with_rows(3).await;
    let outcome = ctx
        .orchestrator(ctx.config(1000))
        .execute(OutputRequest::new(QUERY), &ctx.backend)
        .await
        .unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["output"], "screen");
    assert_eq!(json["rows"].as_array().unwrap().len(), 3);
    assert!(matches!(outcome, Outcome::Screen { .. }));
}

#[tokio::test]
async fn test_location_is_checked_inside_root() {
    let ctx = TestContext::with_rows(10).await;
    let orchestrator = ctx.orchestrator(ctx.config(1000));

    // A file of that name exists in the working directory but not under the root
    let outcome = orchestrator
        .execute(
            OutputRequest::new(QUERY).mode("file").location("Cargo.toml"),
            &ctx.backend,
        )
        .await
        .unwrap();
    assert!(outcome.artifact().unwrap().path.starts_with(ctx.root.join("Cargo.toml")));

    std::fs::write(ctx.root.join("notes"), "not a directory").unwrap();
    let err = orchestrator
        .execute(
            OutputRequest::new(QUERY).mode("file").location("notes"),
            &ctx.backend,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(matches!(err, OutputError::InvalidLocation { .. }));
}
