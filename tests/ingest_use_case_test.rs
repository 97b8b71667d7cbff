use std::io::Write;
use std::sync::Arc;

use meter_ingest::app::IngestUseCase;
use meter_ingest::config::Config;
use meter_ingest::domain::RawRow;
use meter_ingest::pipeline::storage::InMemoryReadingStore;
use meter_ingest::pipeline::BatchStatus;
use tempfile::NamedTempFile;

fn load_config(toml: &str) -> Config {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml.as_bytes()).unwrap();
    Config::load(file.path()).unwrap()
}

#[tokio::test]
async fn test_end_only_meter_across_uploads() {
    let config = load_config(
        r#"
[meter]
id = 77
only_end_time = true
length_gap_seconds = 0
length_variation_seconds = 0
"#,
    );
    let store = InMemoryReadingStore::new();
    let use_case = IngestUseCase::new(Arc::new(store.clone()));

    let first = use_case
        .ingest_batch(
            config.meter.id,
            &config.meter.pipeline,
            vec![
                RawRow::end_only("1", "2021-06-01T01:00:00Z"),
                RawRow::end_only("2", "2021-06-01T02:00:00Z"),
                RawRow::end_only("3", "2021-06-01T03:00:00Z"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(first.status(), BatchStatus::PartialFailure);
    assert_eq!(first.accepted.len(), 2);

    // The next upload picks up from the stored end time; no priming drop
    let second = use_case
        .ingest_batch(
            config.meter.id,
            &config.meter.pipeline,
            vec![RawRow::end_only("4", "2021-06-01T04:00:00Z")],
        )
        .await
        .unwrap();
    assert_eq!(second.status(), BatchStatus::Success);
    assert_eq!(second.accepted[0].start, first.accepted[1].end);

    let stored = store.readings(77).unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.windows(2).all(|pair| pair[0].end == pair[1].start));
}

#[tokio::test]
async fn test_meters_run_independently() {
    let config = load_config("[meter]\nid = 1\ncumulative = true\n");
    let store = InMemoryReadingStore::new();
    let use_case = Arc::new(IngestUseCase::new(Arc::new(store.clone())));

    let mut handles = Vec::new();
    for meter_id in 1..=4 {
        let use_case = Arc::clone(&use_case);
        let pipeline = config.meter.pipeline.clone();
        handles.push(tokio::spawn(async move {
            let rows = vec![
                RawRow::new("10", "2021-06-01T00:00:00Z", "2021-06-02T00:00:00Z"),
                RawRow::new(
                    (10 + meter_id).to_string(),
                    "2021-06-02T00:00:00Z",
                    "2021-06-03T00:00:00Z",
                ),
            ];
            use_case.ingest_batch(meter_id, &pipeline, rows).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for meter_id in 1..=4 {
        let stored = store.readings(meter_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value, meter_id as f64);
    }
}
