//! Backend failures and cancellation surface with their context attached.

use sheetdb::{KvStore, KvStoreConfig, OpContext, RowStore, RowStoreConfig, SheetDbError};
use sheetdb_core::BackendError;
use sheetdb_test_utils::assertions::assert_backend_error;
use sheetdb_test_utils::fixtures::{sample_people, Person, PEOPLE_COLUMNS};
use sheetdb_test_utils::{init_tracing, memory_spreadsheet, SheetsBackend};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_open_failure_is_wrapped() {
    init_tracing();
    let (backend, id) = memory_spreadsheet().await;
    backend
        .fail_next(
            "create_sheet",
            BackendError::Auth {
                reason: "token expired".to_string(),
            },
        )
        .await;

    let err = KvStore::open(
        &OpContext::background(),
        backend,
        &id,
        "kv",
        KvStoreConfig::default(),
    )
    .await
    .unwrap_err();
    match err {
        SheetDbError::Backend {
            operation,
            ref range,
            source: BackendError::Auth { .. },
        } => {
            assert_eq!(operation, "create_sheet");
            assert_eq!(range, "kv");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_spreadsheet() {
    let (backend, _id) = memory_spreadsheet().await;
    let err = RowStore::open(
        &OpContext::background(),
        backend,
        "missing",
        "people",
        RowStoreConfig::new(PEOPLE_COLUMNS),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        assert_backend_error(&err, "create_sheet"),
        BackendError::SpreadsheetNotFound { .. }
    ));
}

#[tokio::test]
async fn test_select_failure_names_the_sheet() {
    let (backend, id) = memory_spreadsheet().await;
    let ctx = OpContext::background();
    let store = RowStore::open(
        &ctx,
        backend.clone(),
        &id,
        "people",
        RowStoreConfig::new(PEOPLE_COLUMNS),
    )
    .await
    .unwrap();
    backend
        .fail_next(
            "query_rows",
            BackendError::Api {
                status: 429,
                message: "quota exceeded".to_string(),
            },
        )
        .await;

    let err = store.select(["name"]).exec::<Person>(&ctx).await.unwrap_err();
    assert!(matches!(
        assert_backend_error(&err, "query_rows"),
        BackendError::Api { status: 429, .. }
    ));
    assert!(err.to_string().contains("people"));
}

#[tokio::test]
async fn test_cancelled_context_touches_nothing() {
    let (backend, id) = memory_spreadsheet().await;
    let store = KvStore::open(
        &OpContext::background(),
        backend.clone(),
        &id,
        "kv",
        KvStoreConfig::default(),
    )
    .await
    .unwrap();

    let shutdown = CancellationToken::new();
    let ctx = OpContext::with_cancellation(shutdown.child_token());
    shutdown.cancel();

    let err = store.set(&ctx, "k", b"v").await.unwrap_err();
    assert!(matches!(err, SheetDbError::Cancelled));
    assert_eq!(backend.get_rows(&id, "kv!A1:C10").await.unwrap().len(), 1);
    assert!(backend.get_rows(&id, "kv_scratch!C1:D1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_deadline() {
    let (backend, id) = memory_spreadsheet().await;
    let store = RowStore::open(
        &OpContext::background(),
        backend,
        &id,
        "people",
        RowStoreConfig::new(PEOPLE_COLUMNS),
    )
    .await
    .unwrap();

    let ctx = OpContext::with_timeout(Duration::ZERO);
    let err = store.insert(sample_people()).exec(&ctx).await.unwrap_err();
    assert!(matches!(err, SheetDbError::DeadlineExceeded));
    assert_eq!(
        store.count().exec(&OpContext::background()).await.unwrap(),
        0
    );
}
