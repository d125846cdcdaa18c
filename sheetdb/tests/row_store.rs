//! Row store statements against the in-memory backend.

use serde_json::json;
use sheetdb::{
    CellValue, ColumnOrderBy, MemorySheets, OpContext, RowStore, RowStoreConfig, SheetDbError,
    SheetsBackend,
};
use sheetdb_core::{ConfigError, QueryError, SchemaError};
use sheetdb_test_utils::fixtures::{sample_people, Person, PEOPLE_COLUMNS};
use sheetdb_test_utils::{init_tracing, memory_spreadsheet};
use std::sync::Arc;

async fn open_people() -> (Arc<MemorySheets>, String, RowStore) {
    init_tracing();
    let (backend, id) = memory_spreadsheet().await;
    let store = RowStore::open(
        &OpContext::background(),
        backend.clone(),
        &id,
        "people",
        RowStoreConfig::new(PEOPLE_COLUMNS),
    )
    .await
    .unwrap();
    (backend, id, store)
}

async fn seeded_people() -> (Arc<MemorySheets>, String, RowStore) {
    let (backend, id, store) = open_people().await;
    let inserted = store
        .insert(sample_people())
        .exec(&OpContext::background())
        .await
        .unwrap();
    assert_eq!(inserted, 3);
    (backend, id, store)
}

#[tokio::test]
async fn test_open_writes_header() {
    let (backend, id, store) = open_people().await;
    let header = backend.get_rows(&id, "people!A1:Z1").await.unwrap();
    assert_eq!(
        header[0],
        vec![
            CellValue::from("_rid"),
            "name".into(),
            "age".into(),
            "score".into(),
            "active".into(),
            "email".into(),
        ]
    );
    assert_eq!(store.columns(), PEOPLE_COLUMNS);
    assert_eq!(store.mapping().resolve("age").unwrap().letter, "C");
}

#[tokio::test]
async fn test_insert_and_select_all() {
    let (backend, id, store) = seeded_people().await;
    let ctx = OpContext::background();

    let people: Vec<Person> = store
        .select(Vec::<String>::new())
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(people, sample_people());

    let raw = backend.raw_rows(&id, "people!A2:A4").await.unwrap();
    assert!(raw.iter().all(|row| row[0] == CellValue::from("=ROW()")));
}

#[tokio::test]
async fn test_insert_nothing_is_a_noop() {
    let (backend, id, store) = open_people().await;
    let inserted = store
        .insert(Vec::<Person>::new())
        .exec(&OpContext::background())
        .await
        .unwrap();
    assert_eq!(inserted, 0);
    assert_eq!(backend.get_rows(&id, "people!A1:Z").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_select_filter_order_and_paging() {
    let (_backend, _id, store) = seeded_people().await;
    let ctx = OpContext::background();

    let older: Vec<Person> = store
        .select(["name", "age"])
        .where_("age > ?", vec![json!(30)])
        .order_by([ColumnOrderBy::desc("age")])
        .exec(&ctx)
        .await
        .unwrap();
    let names: Vec<&str> = older.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Grace", "Ada"]);
    assert_eq!(older[0].email, None);
    assert!(!older[0].active);

    let page: Vec<Person> = store
        .select(["name"])
        .order_by([ColumnOrderBy::asc("age")])
        .offset(1)
        .limit(1)
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].name, "Ada");
}

#[tokio::test]
async fn test_or_predicate_does_not_resurrect_deleted_rows() {
    let (_backend, _id, store) = seeded_people().await;
    let ctx = OpContext::background();

    let deleted = store
        .delete()
        .where_("name = ?", vec![json!("Grace")])
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let rows = store
        .select(["name"])
        .where_("name = ? OR age >= ?", vec![json!("Grace"), json!(0)])
        .exec_raw(&ctx)
        .await
        .unwrap();
    let names: Vec<_> = rows.iter().map(|r| r.get("name").cloned()).collect();
    assert_eq!(
        names,
        [Some(CellValue::from("Ada")), Some(CellValue::from("Linus"))]
    );
}

#[tokio::test]
async fn test_update_only_touches_named_columns() {
    let (_backend, _id, store) = seeded_people().await;
    let ctx = OpContext::background();

    let updated = store
        .update([("age", 37)])
        .set("email", "countess@example.com")
        .where_("name = ?", vec![json!("Ada")])
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let ada: Vec<Person> = store
        .select(Vec::<String>::new())
        .where_("name = ?", vec![json!("Ada")])
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(
        ada,
        [Person::new("Ada", 37).with_email("countess@example.com")]
    );
}

#[tokio::test]
async fn test_update_every_live_row() {
    let (_backend, _id, store) = seeded_people().await;
    let ctx = OpContext::background();

    let updated = store
        .update([("active", false)])
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(updated, 3);
    let active = store
        .count()
        .where_("active = ?", vec![json!(true)])
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(active, 0);
}

#[tokio::test]
async fn test_update_without_matches() {
    let (_backend, _id, store) = seeded_people().await;
    let updated = store
        .update([("age", 1)])
        .where_("name = ?", vec![json!("Nobody")])
        .exec(&OpContext::background())
        .await
        .unwrap();
    assert_eq!(updated, 0);
}

#[tokio::test]
async fn test_update_rejects_bad_columns_before_any_call() {
    let (backend, _id, store) = seeded_people().await;
    let ctx = OpContext::background();
    backend
        .fail_next(
            "update_rows",
            sheetdb_core::BackendError::Injected {
                reason: "must not be reached".to_string(),
            },
        )
        .await;

    let err = store.update([("height", 2)]).exec(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        SheetDbError::Schema(SchemaError::UnknownColumn { ref column }) if column == "height"
    ));

    let err = store.update([("_rid", 2)]).exec(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        SheetDbError::Schema(SchemaError::ReservedColumn { .. })
    ));

    let err = store
        .update(Vec::<(String, CellValue)>::new())
        .exec(&ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, SheetDbError::Schema(SchemaError::EmptyColumns)));

    assert_eq!(backend.pending_faults().await, 1);
}

#[tokio::test]
async fn test_delete_tombstones_rows() {
    let (backend, id, store) = seeded_people().await;
    let ctx = OpContext::background();

    let deleted = store
        .delete()
        .where_("active = ?", vec![json!(false)])
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(store.count().exec(&ctx).await.unwrap(), 2);

    let rows = backend.get_rows(&id, "people!A1:Z").await.unwrap();
    assert_eq!(rows.len(), 3);

    let none = store
        .delete()
        .where_("name = ?", vec![json!("Linus")])
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(none, 0);
}

#[tokio::test]
async fn test_delete_in_the_middle_keeps_positions() {
    let (backend, id, store) = seeded_people().await;
    let ctx = OpContext::background();

    store
        .delete()
        .where_("name = ?", vec![json!("Grace")])
        .exec(&ctx)
        .await
        .unwrap();
    let rows = backend.get_rows(&id, "people!A1:B4").await.unwrap();
    assert_eq!(rows[1][1], CellValue::from("Ada"));
    assert!(rows[2].iter().all(CellValue::is_blank));
    assert_eq!(rows[3][1], CellValue::from("Linus"));

    store
        .insert([Person::new("Alan", 41)])
        .exec(&ctx)
        .await
        .unwrap();
    let names: Vec<Person> = store.select(["name"]).exec(&ctx).await.unwrap();
    assert_eq!(names.len(), 3);
    assert_eq!(names[2].name, "Alan");
}

#[tokio::test]
async fn test_count_with_filter() {
    let (_backend, _id, store) = seeded_people().await;
    let ctx = OpContext::background();
    assert_eq!(store.count().exec(&ctx).await.unwrap(), 3);
    assert_eq!(
        store
            .count()
            .where_("age < ? AND active = ?", vec![json!(40), json!(true)])
            .exec(&ctx)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_query_errors_surface_before_backend() {
    let (backend, _id, store) = seeded_people().await;
    backend
        .fail_next(
            "query_rows",
            sheetdb_core::BackendError::Injected {
                reason: "must not be reached".to_string(),
            },
        )
        .await;

    let err = store
        .select(["name"])
        .where_("age > ? AND age < ?", vec![json!(1)])
        .exec::<Person>(&OpContext::background())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SheetDbError::Query(QueryError::ArgumentCountMismatch {
            placeholders: 2,
            args: 1
        })
    ));
    assert_eq!(backend.pending_faults().await, 1);
}

#[tokio::test]
async fn test_decode_type_mismatch() {
    let (backend, id, store) = open_people().await;
    backend
        .insert_rows(
            &id,
            "people!A2:Z",
            vec![vec!["=ROW()".into(), "Bob".into(), "'old".into()]],
        )
        .await
        .unwrap();

    let err = store
        .select(["name", "age"])
        .exec::<Person>(&OpContext::background())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SheetDbError::Schema(SchemaError::TypeMismatch { ref column, .. }) if column == "age"
    ));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let (backend, id) = memory_spreadsheet().await;
    let err = RowStore::open(
        &OpContext::background(),
        backend,
        &id,
        "bad",
        RowStoreConfig::new(["name", "_rid"]),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        SheetDbError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[tokio::test]
async fn test_reopen_with_existing_header() {
    let (backend, id, store) = seeded_people().await;
    let ctx = OpContext::background();
    store.close(&ctx).await.unwrap();

    let store = RowStore::open(
        &ctx,
        backend.clone(),
        &id,
        "people",
        RowStoreConfig::new(PEOPLE_COLUMNS),
    )
    .await
    .unwrap();
    assert_eq!(store.count().exec(&ctx).await.unwrap(), 3);
    assert_eq!(backend.get_rows(&id, "people!A1:A1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_column_names_must_be_bare_words() {
    let (backend, id) = memory_spreadsheet().await;
    for name in ["first-name", "2fa", "名前", "date of birth"] {
        let err = RowStore::open(
            &OpContext::background(),
            backend.clone(),
            &id,
            "contacts",
            RowStoreConfig::new(["id", name]),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(&err, SheetDbError::Config(ConfigError::InvalidValue { value, .. }) if value == name),
            "{name:?}: {err}"
        );
    }
    // Rejected before the sheet is created.
    let sheets = backend.sheet_ids(&id).await.unwrap();
    assert!(!sheets.contains_key("contacts"));
}
