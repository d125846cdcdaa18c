//! Scratchpad journal recovery, on open and inline after a failed step.

use sheetdb::{
    CellValue, Intent, KvStore, KvStoreConfig, MemorySheets, OpContext, RecoveryOutcome,
    SheetsBackend,
};
use sheetdb_core::{BackendError, ProtocolError};
use sheetdb_test_utils::assertions::{assert_backend_error, assert_protocol_error};
use sheetdb_test_utils::{init_tracing, memory_spreadsheet};
use std::sync::Arc;

const JOURNAL: &str = "kv_scratch!C1:D1";

/// A store holding `k = v1`, then `k = v2`, closed again.
async fn seeded(config: KvStoreConfig) -> (Arc<MemorySheets>, String) {
    init_tracing();
    let (backend, id) = memory_spreadsheet().await;
    let ctx = OpContext::background();
    let store = KvStore::open(&ctx, backend.clone(), &id, "kv", config)
        .await
        .unwrap();
    store.set(&ctx, "k", b"v1").await.unwrap();
    store.set(&ctx, "k", b"v2").await.unwrap();
    store.close(&ctx).await.unwrap();
    (backend, id)
}

async fn write_journal(backend: &MemorySheets, id: &str, token: &str, intent: &str) {
    backend
        .update_rows(
            id,
            JOURNAL,
            vec![vec![CellValue::from(token), CellValue::from(intent)]],
        )
        .await
        .unwrap();
}

async fn book(backend: &MemorySheets, id: &str, intent: Intent) {
    write_journal(backend, id, "t-1", &serde_json::to_string(&intent).unwrap()).await;
}

async fn journal(backend: &MemorySheets, id: &str) -> Vec<Vec<CellValue>> {
    backend.get_rows(id, JOURNAL).await.unwrap()
}

async fn reopen(backend: &Arc<MemorySheets>, id: &str, config: KvStoreConfig) -> KvStore {
    KvStore::open(&OpContext::background(), backend.clone(), id, "kv", config)
        .await
        .unwrap()
}

// ============================================================================
// ON OPEN
// ============================================================================

#[tokio::test]
async fn test_recover_set_that_landed() {
    let (backend, id) = seeded(KvStoreConfig::default()).await;
    book(
        &backend,
        &id,
        Intent::Set {
            key: "k".to_string(),
            previous: Some("!v1".to_string()),
            next: "!v2".to_string(),
        },
    )
    .await;

    let store = reopen(&backend, &id, KvStoreConfig::default()).await;
    assert!(journal(&backend, &id).await.is_empty());
    assert_eq!(store.get(&OpContext::background(), "k").await.unwrap(), b"v2");
}

#[tokio::test]
async fn test_recover_set_that_never_landed() {
    let (backend, id) = seeded(KvStoreConfig::default()).await;
    book(
        &backend,
        &id,
        Intent::Set {
            key: "k".to_string(),
            previous: Some("!v2".to_string()),
            next: "!v3".to_string(),
        },
    )
    .await;

    let store = reopen(&backend, &id, KvStoreConfig::default()).await;
    assert!(journal(&backend, &id).await.is_empty());
    assert_eq!(store.get(&OpContext::background(), "k").await.unwrap(), b"v2");
}

#[tokio::test]
async fn test_recover_reports_outcome() {
    let (backend, id) = seeded(KvStoreConfig::default()).await;
    let store = reopen(&backend, &id, KvStoreConfig::default()).await;
    let ctx = OpContext::background();
    assert_eq!(store.recover(&ctx).await.unwrap(), None);

    book(
        &backend,
        &id,
        Intent::Set {
            key: "fresh".to_string(),
            previous: None,
            next: "!x".to_string(),
        },
    )
    .await;
    assert_eq!(
        store.recover(&ctx).await.unwrap(),
        Some(RecoveryOutcome::NotApplied)
    );
}

#[tokio::test]
async fn test_recover_delete() {
    let (backend, id) = seeded(KvStoreConfig::default()).await;
    let store = reopen(&backend, &id, KvStoreConfig::default()).await;
    let ctx = OpContext::background();

    book(
        &backend,
        &id,
        Intent::Delete {
            key: "k".to_string(),
            previous: Some("!v2".to_string()),
        },
    )
    .await;
    assert_eq!(
        store.recover(&ctx).await.unwrap(),
        Some(RecoveryOutcome::NotApplied)
    );

    store.delete(&ctx, "k").await.unwrap();
    book(
        &backend,
        &id,
        Intent::Delete {
            key: "k".to_string(),
            previous: Some("!v2".to_string()),
        },
    )
    .await;
    assert_eq!(
        store.recover(&ctx).await.unwrap(),
        Some(RecoveryOutcome::Completed)
    );
}

#[tokio::test]
async fn test_recover_append() {
    let (backend, id) = seeded(KvStoreConfig::append_only()).await;
    let store = reopen(&backend, &id, KvStoreConfig::append_only()).await;
    let ctx = OpContext::background();

    book(
        &backend,
        &id,
        Intent::Append {
            key: "k".to_string(),
            value: "!v3".to_string(),
            order: 12345,
        },
    )
    .await;
    assert_eq!(
        store.recover(&ctx).await.unwrap(),
        Some(RecoveryOutcome::NotApplied)
    );

    backend
        .insert_rows(
            &id,
            "kv!A1:C5000000",
            vec![vec!["'k".into(), "!v3".into(), CellValue::Number(12345.0)]],
        )
        .await
        .unwrap();
    book(
        &backend,
        &id,
        Intent::Append {
            key: "k".to_string(),
            value: "!v3".to_string(),
            order: 12345,
        },
    )
    .await;
    assert_eq!(
        store.recover(&ctx).await.unwrap(),
        Some(RecoveryOutcome::Completed)
    );
    assert!(journal(&backend, &id).await.is_empty());
}

#[tokio::test]
async fn test_garbled_journal_fails_open() {
    let (backend, id) = seeded(KvStoreConfig::default()).await;
    write_journal(&backend, &id, "t-9", "{not an intent").await;

    let err = KvStore::open(
        &OpContext::background(),
        backend.clone(),
        &id,
        "kv",
        KvStoreConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        assert_protocol_error(&err),
        ProtocolError::UnrecoverableBooking { token, .. } if token == "t-9"
    ));
    assert_eq!(journal(&backend, &id).await[0][0], CellValue::from("t-9"));
}

#[tokio::test]
async fn test_token_without_intent_fails_open() {
    let (backend, id) = seeded(KvStoreConfig::default()).await;
    backend
        .update_rows(&id, "kv_scratch!C1", vec![vec![CellValue::from("t-2")]])
        .await
        .unwrap();

    let err = KvStore::open(
        &OpContext::background(),
        backend,
        &id,
        "kv",
        KvStoreConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        assert_protocol_error(&err),
        ProtocolError::UnrecoverableBooking { .. }
    ));
}

#[tokio::test]
async fn test_unexplained_value_fails_open() {
    let (backend, id) = seeded(KvStoreConfig::default()).await;
    book(
        &backend,
        &id,
        Intent::Set {
            key: "k".to_string(),
            previous: Some("!a".to_string()),
            next: "!b".to_string(),
        },
    )
    .await;

    let err = KvStore::open(
        &OpContext::background(),
        backend.clone(),
        &id,
        "kv",
        KvStoreConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        assert_protocol_error(&err),
        ProtocolError::UnrecoverableBooking { .. }
    ));
    assert!(!journal(&backend, &id).await.is_empty());
}

// ============================================================================
// INLINE
// ============================================================================

#[tokio::test]
async fn test_busy_scratchpad_refuses_writes() {
    let (backend, id) = seeded(KvStoreConfig::default()).await;
    let store = reopen(&backend, &id, KvStoreConfig::default()).await;
    write_journal(&backend, &id, "someone-else", "{}").await;

    let err = store
        .set(&OpContext::background(), "k", b"v3")
        .await
        .unwrap_err();
    assert!(matches!(
        assert_protocol_error(&err),
        ProtocolError::ScratchpadBusy { token, .. } if token == "someone-else"
    ));
    assert_eq!(store.get(&OpContext::background(), "k").await.unwrap(), b"v2");
}

#[tokio::test]
async fn test_failed_insert_is_settled_inline() {
    let (backend, id) = seeded(KvStoreConfig::default()).await;
    let store = reopen(&backend, &id, KvStoreConfig::default()).await;
    let ctx = OpContext::background();

    backend
        .fail_next(
            "insert_rows",
            BackendError::Api {
                status: 503,
                message: "unavailable".to_string(),
            },
        )
        .await;
    let err = store.set(&ctx, "new", b"value").await.unwrap_err();
    assert!(matches!(
        assert_backend_error(&err, "insert_rows"),
        BackendError::Api { status: 503, .. }
    ));

    assert!(journal(&backend, &id).await.is_empty());
    assert!(store.get(&ctx, "new").await.unwrap_err().is_not_found());
    store.set(&ctx, "new", b"value").await.unwrap();
    assert_eq!(store.get(&ctx, "new").await.unwrap(), b"value");
}

#[tokio::test]
async fn test_failed_release_is_recovered_on_next_open() {
    let (backend, id) = seeded(KvStoreConfig::default()).await;
    let store = reopen(&backend, &id, KvStoreConfig::default()).await;
    let ctx = OpContext::background();

    backend
        .fail_next(
            "clear",
            BackendError::Transport {
                reason: "connection reset".to_string(),
            },
        )
        .await;
    let err = store.set(&ctx, "k", b"v3").await.unwrap_err();
    assert_backend_error(&err, "clear");
    assert!(!journal(&backend, &id).await.is_empty());

    let reopened = reopen(&backend, &id, KvStoreConfig::default()).await;
    assert!(journal(&backend, &id).await.is_empty());
    assert_eq!(reopened.get(&ctx, "k").await.unwrap(), b"v3");
}

#[tokio::test]
async fn test_failed_append_is_settled_inline() {
    let (backend, id) = seeded(KvStoreConfig::append_only()).await;
    let store = reopen(&backend, &id, KvStoreConfig::append_only()).await;
    let ctx = OpContext::background();

    backend
        .fail_next(
            "insert_rows",
            BackendError::Injected {
                reason: "drop".to_string(),
            },
        )
        .await;
    store.set(&ctx, "k", b"v3").await.unwrap_err();
    assert!(journal(&backend, &id).await.is_empty());
    assert_eq!(store.get(&ctx, "k").await.unwrap(), b"v2");
}
