//! SheetDB Test Utilities
//!
//! Shared test infrastructure for the SheetDB workspace:
//! - Proptest generators for cell values, column layouts and records
//! - Fixture records and an in-memory spreadsheet
//! - Assertions for wrapped backend and protocol errors
//! - Tracing setup for test output

pub use sheetdb_backend::{MemorySheets, SheetsBackend};
pub use sheetdb_core::{
    BackendError, CellValue, ColumnMapping, Field, ProtocolError, Record, SheetDbError,
};

use std::sync::{Arc, Once};

// ============================================================================
// TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a fmt subscriber honouring `RUST_LOG` (default `sheetdb=debug`).
/// Safe to call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sheetdb=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// IN-MEMORY SPREADSHEET
// ============================================================================

/// A fresh in-memory backend holding one spreadsheet.
pub async fn memory_spreadsheet() -> (Arc<MemorySheets>, String) {
    let backend = Arc::new(MemorySheets::new());
    let id = backend
        .create_spreadsheet("sheetdb-test")
        .await
        .expect("in-memory spreadsheet");
    (backend, id)
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for SheetDB values.

    use super::fixtures::Person;
    use super::*;
    use proptest::prelude::*;

    /// A valid logical column name.
    pub fn arb_column_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}"
    }

    /// Up to `max` distinct column names in arbitrary order.
    pub fn arb_columns(max: usize) -> impl Strategy<Value = Vec<String>> {
        proptest::collection::btree_set(arb_column_name(), 1..=max)
            .prop_map(|set| set.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
    }

    /// A fully populated person. Names avoid text the spreadsheet would
    /// retype (numbers, booleans, formulas).
    pub fn arb_person() -> impl Strategy<Value = Person> {
        let name = "[A-Z][a-z]{1,11}".prop_filter("boolean text", |n| {
            !n.eq_ignore_ascii_case("true") && !n.eq_ignore_ascii_case("false")
        });
        (
            name,
            0i64..120,
            (0u32..10_000).prop_map(|n| f64::from(n) / 4.0),
            any::<bool>(),
        )
            .prop_map(|(name, age, score, active)| Person {
                name,
                age,
                score,
                active,
                email: None,
            })
    }

    /// A key usable in the key-value store.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9:_-]{0,15}".prop_filter("header", |k| !k.eq_ignore_ascii_case("key"))
    }

    /// A JSON argument the predicate renderer accepts.
    pub fn arb_query_argument() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            any::<i32>().prop_map(serde_json::Value::from),
            any::<bool>().prop_map(serde_json::Value::from),
            "[a-zA-Z0-9 ]{0,12}".prop_map(serde_json::Value::from),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Record types and column layouts used across the test suites.

    use super::*;

    /// Columns of the `people` row store.
    pub const PEOPLE_COLUMNS: [&str; 5] = ["name", "age", "score", "active", "email"];

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Person {
        pub name: String,
        pub age: i64,
        pub score: f64,
        pub active: bool,
        pub email: Option<String>,
    }

    impl Person {
        pub fn new(name: &str, age: i64) -> Self {
            Self {
                name: name.to_string(),
                age,
                score: 0.0,
                active: true,
                email: None,
            }
        }

        pub fn with_email(mut self, email: &str) -> Self {
            self.email = Some(email.to_string());
            self
        }
    }

    impl Record for Person {
        fn fields() -> Vec<Field<Self>> {
            vec![
                Field::text("name", |p| Some(p.name.clone()), |p, v| p.name = v),
                Field::integer("age", |p| Some(p.age), |p, v| p.age = v),
                Field::float("score", |p| Some(p.score), |p, v| p.score = v),
                Field::boolean("active", |p| Some(p.active), |p, v| p.active = v),
                Field::text("email", |p| p.email.clone(), |p, v| p.email = Some(v)),
            ]
        }
    }

    /// Ada, Grace and Linus.
    pub fn sample_people() -> Vec<Person> {
        vec![
            Person::new("Ada", 36).with_email("ada@example.com"),
            Person::new("Grace", 45),
            Person {
                score: 9.5,
                active: false,
                ..Person::new("Linus", 28)
            },
        ]
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over SheetDB errors.

    use super::*;

    /// Assert `err` wraps a backend error from `operation`, returning the
    /// inner error.
    pub fn assert_backend_error<'e>(err: &'e SheetDbError, operation: &str) -> &'e BackendError {
        match err {
            SheetDbError::Backend {
                operation: op,
                source,
                ..
            } => {
                assert_eq!(*op, operation, "backend error from unexpected operation");
                source
            }
            other => panic!("expected backend error from {operation}, got {other:?}"),
        }
    }

    /// Assert `err` is a protocol error and return it.
    pub fn assert_protocol_error(err: &SheetDbError) -> &ProtocolError {
        match err {
            SheetDbError::Protocol(inner) => inner,
            other => panic!("expected protocol error, got {other:?}"),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::assertions::*;
    use super::fixtures::*;
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;
    use sheetdb_core::{decode_row, encode_row, row_exists_interceptor, ColumnMapping, QueryBuilder};

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }

    #[tokio::test]
    async fn test_memory_spreadsheet_has_default_sheet() {
        let (backend, id) = memory_spreadsheet().await;
        let sheets = backend.sheet_ids(&id).await.unwrap();
        assert!(sheets.contains_key("Sheet1"));
    }

    #[test]
    fn test_assertions_unwrap_errors() {
        let err = SheetDbError::backend(
            "clear",
            "kv!A1",
            BackendError::Injected {
                reason: "boom".to_string(),
            },
        );
        assert!(matches!(
            assert_backend_error(&err, "clear"),
            BackendError::Injected { .. }
        ));

        let err = SheetDbError::from(ProtocolError::MalformedRowIndices {
            raw: "x".to_string(),
        });
        assert!(matches!(
            assert_protocol_error(&err),
            ProtocolError::MalformedRowIndices { .. }
        ));
    }

    proptest! {
        #[test]
        fn prop_person_survives_row_codec(person in arb_person()) {
            let mapping = ColumnMapping::for_row_store(&PEOPLE_COLUMNS).unwrap();
            let row = encode_row(&person, mapping.names());
            prop_assert_eq!(&row[0], &CellValue::from("=ROW()"));
            let decoded: Person = decode_row(&row[1..], &PEOPLE_COLUMNS).unwrap();
            prop_assert_eq!(decoded, person);
        }

        #[test]
        fn prop_generated_columns_build_a_mapping(columns in arb_columns(25)) {
            let mapping = ColumnMapping::for_row_store(&columns).unwrap();
            prop_assert_eq!(mapping.len(), columns.len() + 1);
        }

        #[test]
        fn prop_generated_arguments_render(arg in arb_query_argument()) {
            let mapping = ColumnMapping::for_row_store(&PEOPLE_COLUMNS).unwrap();
            let query = QueryBuilder::new(mapping.name_map(), row_exists_interceptor, ["name"])
                .where_("email = ?", vec![arg])
                .generate()
                .unwrap();
            prop_assert!(query.contains(" where "));
            prop_assert!(!query.contains('?'));
        }
    }
}
