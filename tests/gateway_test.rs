/// Integration tests for the request gateway
///
/// Tests cover:
/// - configDb idempotence, conflict rejection and schema provisioning
/// - importDb end to end with status, result and cancellation
/// - single-flight admission per configured database
/// - wire-level error payloads
mod utils;

use std::sync::Arc;
use std::time::Duration;

use utils::factories::{self, CsvSourceFactory, TestDir};
use utils::helpers::{self, InstrumentedMemoryDriver};
use whodb_core::{ErrorKind, JobId, JobStatus};

// ================================================================================================
// CONFIG TESTS
// ================================================================================================

#[tokio::test]
async fn config_db_reissues_handle_for_identical_config() {
    let gateway = helpers::fast_gateway();
    let request = helpers::memory_config_request("crm", Some(factories::users_schema()));

    let first = gateway.config_db(request.clone()).await.unwrap();
    assert!(first.created);

    let second = gateway.config_db(request).await.unwrap();
    assert!(!second.created, "identical config should be re-accepted");
    assert_eq!(first.handle, second.handle);
}

#[tokio::test]
async fn config_db_rejects_conflicting_config_for_same_database() {
    let gateway = helpers::fast_gateway();
    gateway
        .config_db(helpers::memory_config_request("crm", None))
        .await
        .unwrap();

    let mut conflicting = helpers::memory_config_request("crm", None);
    conflicting.pool_size = Some(8);
    let err = gateway.config_db(conflicting).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateConfig);
}

#[tokio::test]
async fn config_db_provisions_schema_and_join_tables() {
    let driver = Arc::new(InstrumentedMemoryDriver::new());
    let gateway = helpers::fast_gateway();
    gateway.coordinator().register_driver(driver.clone());

    gateway
        .config_db(helpers::memory_config_request(
            "crm",
            Some(factories::linked_schema()),
        ))
        .await
        .unwrap();

    let store = driver.store("crm").unwrap();
    assert!(store.has_table("users"));
    assert!(store.has_table("teams"));
    assert!(store.has_table("tags"));
    assert!(
        store.has_table("users_tags"),
        "manyOn column should become a join table"
    );
}

#[tokio::test]
async fn config_db_rejects_malformed_schema() {
    let gateway = helpers::fast_gateway();
    let mut request = helpers::memory_config_request("crm", None);
    // manyOn without a references target has nothing to join against
    request.schema = Some(serde_json::json!({
        "users": {
            "id": { "type": "integer", "pk": true },
            "tags": { "type": "text", "manyOn": "tag_ids" }
        }
    }));

    let err = gateway.config_db(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

// ================================================================================================
// IMPORT FLOW TESTS
// ================================================================================================

#[tokio::test]
async fn import_db_runs_to_success_and_reports_it() {
    let dir = TestDir::new();
    let path = factories::write_csv(&dir, "users.csv", 25);

    let driver = Arc::new(InstrumentedMemoryDriver::new());
    let gateway = helpers::fast_gateway();
    gateway.coordinator().register_driver(driver.clone());
    let handle =
        helpers::configure_memory(&gateway, "crm", Some(factories::users_schema())).await;

    let mut request = helpers::import_request(&handle, &path);
    request.options.chunk_size = 10;
    let accepted = gateway.import_db(request).await.unwrap();
    assert!(!accepted.status.is_terminal());

    let result = gateway.wait_for_result(&accepted.job_id).await.unwrap();
    assert_eq!(result.status, JobStatus::Succeeded);
    let summary = result.summary.unwrap();
    assert_eq!(summary.rows_imported, 25);
    assert_eq!(summary.chunks_committed, 3);
    assert_eq!(summary.tables, vec!["users".to_string()]);

    let status = gateway.get_import_status(&accepted.job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Succeeded);
    assert_eq!(status.rows_committed, 25);
    assert_eq!(status.checkpoint.unwrap().rows_committed, 25);
    assert!(status.finished_at.is_some());

    assert_eq!(driver.store("crm").unwrap().row_count("users"), Some(25));
}

#[tokio::test]
async fn import_db_rejects_invalid_options() {
    let gateway = helpers::fast_gateway();
    let handle = helpers::configure_memory(&gateway, "crm", None).await;
    let dir = TestDir::new();
    let path = factories::write_csv(&dir, "users.csv", 1);

    let mut zero_chunk = helpers::import_request(&handle, &path);
    zero_chunk.options.chunk_size = 0;
    let err = gateway.import_db(zero_chunk).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let mut zero_timeout = helpers::import_request(&handle, &path);
    zero_timeout.options.timeout_ms = Some(0);
    let err = gateway.import_db(zero_timeout).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

// ================================================================================================
// SINGLE-FLIGHT TESTS
// ================================================================================================

#[tokio::test]
async fn second_import_for_same_database_is_rejected() {
    let dir = TestDir::new();
    let path = factories::write_csv(&dir, "users.csv", 30);

    let driver = Arc::new(InstrumentedMemoryDriver::gated());
    let gateway = helpers::fast_gateway();
    gateway.coordinator().register_driver(driver.clone());
    let handle = helpers::configure_memory(&gateway, "crm", None).await;

    let mut request = helpers::import_request(&handle, &path);
    request.options.chunk_size = 10;
    let first = gateway.import_db(request.clone()).await.unwrap();

    // The first job is parked inside its first chunk write, so the slot
    // is guaranteed to still be taken.
    let err = gateway.import_db(request.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyRunning);

    driver.release_writes(3);
    let result = gateway.wait_for_result(&first.job_id).await.unwrap();
    assert_eq!(result.status, JobStatus::Succeeded);

    // The slot frees right after the result publishes; admission of the
    // next import can lag by a beat.
    driver.release_writes(3);
    let mut readmitted = None;
    for _ in 0..400 {
        match gateway.import_db(request.clone()).await {
            Ok(accepted) => {
                readmitted = Some(accepted);
                break;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyRunning => {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            Err(e) => panic!("unexpected admission error: {}", e),
        }
    }
    let readmitted = readmitted.expect("import slot never freed");
    let result = gateway.wait_for_result(&readmitted.job_id).await.unwrap();
    assert_eq!(result.status, JobStatus::Succeeded);
    assert_eq!(driver.store("crm").unwrap().row_count("users"), Some(60));
}

#[tokio::test]
async fn simultaneous_imports_admit_exactly_one() {
    let dir = TestDir::new();
    let path = factories::write_csv(&dir, "users.csv", 20);

    let driver = Arc::new(InstrumentedMemoryDriver::gated());
    let gateway = helpers::fast_gateway();
    gateway.coordinator().register_driver(driver.clone());
    let handle = helpers::configure_memory(&gateway, "crm", None).await;

    let request = helpers::import_request(&handle, &path);
    let (first, second) = tokio::join!(
        gateway.import_db(request.clone()),
        gateway.import_db(request.clone())
    );

    let accepted: Vec<_> = [&first, &second].into_iter().filter(|r| r.is_ok()).collect();
    assert_eq!(accepted.len(), 1, "exactly one import may win the slot");
    let rejected = [first.as_ref(), second.as_ref()]
        .into_iter()
        .find_map(|r| r.err())
        .unwrap();
    assert_eq!(rejected.kind(), ErrorKind::AlreadyRunning);

    driver.release_writes(1);
    let winner = accepted[0].as_ref().unwrap();
    let result = gateway.wait_for_result(&winner.job_id).await.unwrap();
    assert_eq!(result.status, JobStatus::Succeeded);
}

// ================================================================================================
// CANCELLATION TESTS
// ================================================================================================

#[tokio::test]
async fn cancel_takes_effect_at_the_next_chunk_boundary() {
    let dir = TestDir::new();
    let path = factories::write_csv(&dir, "users.csv", 50);

    let driver = Arc::new(InstrumentedMemoryDriver::new());
    let gateway = helpers::fast_gateway();
    gateway.coordinator().register_driver(driver.clone());
    let handle = helpers::configure_memory(&gateway, "crm", None).await;

    // The first job on a fresh coordinator is job-1.
    let coordinator = gateway.coordinator().clone();
    driver.on_write(move |writes| {
        if writes == 2 {
            let _ = coordinator.cancel(JobId(1));
        }
    });

    let mut request = helpers::import_request(&handle, &path);
    request.options.chunk_size = 10;
    let accepted = gateway.import_db(request).await.unwrap();

    let result = gateway.wait_for_result(&accepted.job_id).await.unwrap();
    assert_eq!(result.status, JobStatus::Cancelled);
    assert_eq!(result.error.unwrap().error_kind, ErrorKind::Cancelled);

    // Both committed chunks stay; the chunk in flight never half-lands.
    let status = gateway.get_import_status(&accepted.job_id).await.unwrap();
    assert_eq!(status.rows_committed, 20);
    assert_eq!(driver.store("crm").unwrap().row_count("users"), Some(20));
}

#[tokio::test]
async fn cancel_after_completion_is_a_no_op() {
    let dir = TestDir::new();
    let path = factories::write_csv(&dir, "users.csv", 10);

    let gateway = helpers::fast_gateway();
    let handle = helpers::configure_memory(&gateway, "crm", None).await;
    let accepted = gateway
        .import_db(helpers::import_request(&handle, &path))
        .await
        .unwrap();
    gateway.wait_for_result(&accepted.job_id).await.unwrap();

    let ack = gateway.cancel_import(&accepted.job_id).await.unwrap();
    assert_eq!(ack.status, JobStatus::Succeeded);
    assert_eq!(ack.rows_committed, 10);
}

// ================================================================================================
// PROGRESS TESTS
// ================================================================================================

#[tokio::test]
async fn progress_is_monotonic_and_chunk_aligned() {
    let dir = TestDir::new();
    let path = factories::write_csv(&dir, "users.csv", 50);

    let driver = Arc::new(InstrumentedMemoryDriver::gated());
    let gateway = helpers::fast_gateway();
    gateway.coordinator().register_driver(driver.clone());
    let handle = helpers::configure_memory(&gateway, "crm", None).await;

    let mut request = helpers::import_request(&handle, &path);
    request.options.chunk_size = 10;
    let accepted = gateway.import_db(request).await.unwrap();

    for expected in [10u64, 20, 30, 40, 50] {
        driver.release_writes(1);
        let snapshot = helpers::wait_for_snapshot(
            &gateway,
            &accepted.job_id,
            "next chunk commit",
            |s| s.rows_committed >= expected,
        )
        .await;
        // The gate holds further writes back, so the counter is exact.
        assert_eq!(snapshot.rows_committed, expected);
        assert_eq!(snapshot.rows_committed % 10, 0);
        assert_eq!(snapshot.checkpoint.unwrap().rows_committed, expected);
    }

    let result = gateway.wait_for_result(&accepted.job_id).await.unwrap();
    assert_eq!(result.status, JobStatus::Succeeded);
    assert_eq!(result.summary.unwrap().rows_imported, 50);
}

// ================================================================================================
// RESULT AND ERROR PAYLOAD TESTS
// ================================================================================================

#[tokio::test]
async fn repeated_result_queries_see_the_same_outcome() {
    let dir = TestDir::new();
    let path = factories::write_csv(&dir, "users.csv", 10);

    let gateway = helpers::fast_gateway();
    let handle = helpers::configure_memory(&gateway, "crm", None).await;
    let accepted = gateway
        .import_db(helpers::import_request(&handle, &path))
        .await
        .unwrap();

    let first = gateway.wait_for_result(&accepted.job_id).await.unwrap();
    let second = gateway.wait_for_result(&accepted.job_id).await.unwrap();
    let third = gateway.wait_for_result(&accepted.job_id).await.unwrap();

    assert_eq!(first.status, JobStatus::Succeeded);
    assert_eq!(first.finished_at, second.finished_at);
    assert_eq!(second.finished_at, third.finished_at);
    assert_eq!(
        first.summary.unwrap().rows_imported,
        third.summary.unwrap().rows_imported
    );
}

#[tokio::test]
async fn unknown_job_queries_fail_with_unknown_job() {
    let gateway = helpers::fast_gateway();
    assert_eq!(
        gateway.get_import_status("job-999").await.unwrap_err().kind(),
        ErrorKind::UnknownJob
    );
    assert_eq!(
        gateway.cancel_import("job-999").await.unwrap_err().kind(),
        ErrorKind::UnknownJob
    );
    assert_eq!(
        gateway.wait_for_result("job-999").await.unwrap_err().kind(),
        ErrorKind::UnknownJob
    );
}

#[tokio::test]
async fn failed_import_reports_parse_error_with_offset() {
    let dir = TestDir::new();
    let path = CsvSourceFactory::default()
        .with_rows(20)
        .with_bad_row(14)
        .write(&dir, "users.csv");

    let gateway = helpers::fast_gateway();
    let handle =
        helpers::configure_memory(&gateway, "crm", Some(factories::users_schema())).await;

    let mut request = helpers::import_request(&handle, &path);
    request.options.chunk_size = 10;
    let accepted = gateway.import_db(request).await.unwrap();

    let result = gateway.wait_for_result(&accepted.job_id).await.unwrap();
    assert_eq!(result.status, JobStatus::Failed);
    let error = result.error.unwrap();
    assert_eq!(error.error_kind, ErrorKind::ParseError);
    assert!(error.offset.unwrap() > 0);

    // The chunk before the bad record is committed, the bad chunk is not,
    // and the failure payload says how far the job got.
    let checkpoint = result.checkpoint.unwrap();
    assert_eq!(checkpoint.chunk_index, 0);
    assert_eq!(checkpoint.rows_committed, 10);
    let status = gateway.get_import_status(&accepted.job_id).await.unwrap();
    assert_eq!(status.rows_committed, 10);
}
