// MasterStore persistence: load, append, save through real xlsx files

mod common;

use common::date;
use plant_sheet_reconciler::reconcile::{MasterStore, MasterStoreError, Outcome};
use plant_sheet_reconciler::table::{Table, Value};
use tempfile::TempDir;

fn batch(rows: Vec<Vec<Value>>) -> Table {
    Table::new(
        vec!["Date".to_string(), "SIN_SHIFT".to_string(), "SIN_FE".to_string()],
        rows,
    )
}

#[test]
fn test_append_creates_master_and_round_trips_dates() {
    let dir = TempDir::new().unwrap();
    let store = MasterStore::new(dir.path().join("data").join("master.xlsx"));

    let outcome = store
        .append(
            batch(vec![vec![Value::Date(date("2025-06-24")), "A".into(), 10.0.into()]]),
            "SHIFT",
        )
        .unwrap();
    assert!(outcome.is_done());

    let loaded = store.load().unwrap();
    assert_eq!(loaded.columns(), &["Date", "SIN_SHIFT", "SIN_FE"]);
    assert_eq!(loaded.get(0, "Date"), Some(&Value::Date(date("2025-06-24"))));
    assert_eq!(loaded.get(0, "SIN_SHIFT"), Some(&Value::from("A")));
}

#[test]
fn test_known_key_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let store = MasterStore::new(dir.path().join("master.xlsx"));
    store
        .append(
            batch(vec![vec![Value::Date(date("2025-06-24")), "A".into(), 10.0.into()]]),
            "SHIFT",
        )
        .unwrap();
    let modified = std::fs::metadata(store.path()).unwrap().modified().unwrap();

    let outcome = store
        .append(
            batch(vec![vec!["24-Jun-2025".into(), "A".into(), 99.0.into()]]),
            "SHIFT",
        )
        .unwrap();

    assert!(matches!(outcome, Outcome::Skipped(_)));
    assert_eq!(
        std::fs::metadata(store.path()).unwrap().modified().unwrap(),
        modified
    );
    assert_eq!(store.load().unwrap().get(0, "SIN_FE"), Some(&Value::Number(10.0)));
}

#[test]
fn test_new_columns_extend_existing_master() {
    let dir = TempDir::new().unwrap();
    let store = MasterStore::new(dir.path().join("master.xlsx"));
    store
        .save(&Table::new(
            vec!["Date".to_string(), "SIN_SHIFT".to_string()],
            vec![vec![Value::Date(date("2025-06-23")), "C".into()]],
        ))
        .unwrap();

    let outcome = store
        .append(
            batch(vec![vec![Value::Date(date("2025-06-24")), "A".into(), 1.0.into()]]),
            "SHIFT",
        )
        .unwrap();
    match outcome {
        Outcome::Done(report) => {
            assert_eq!(report.appended, 1);
            assert_eq!(report.total_rows, 2);
        }
        other => panic!("Expected append, got {other:?}"),
    }

    let loaded = store.load().unwrap();
    assert_eq!(loaded.columns(), &["Date", "SIN_SHIFT", "SIN_FE"]);
    assert_eq!(loaded.get(0, "SIN_FE"), Some(&Value::Null));
    assert_eq!(loaded.get(1, "SIN_FE"), Some(&Value::Number(1.0)));
}

#[test]
fn test_append_while_locked_fails() {
    let dir = TempDir::new().unwrap();
    let store = MasterStore::new(dir.path().join("master.xlsx"));
    let _held = store.lock().unwrap();

    let result = store.append(batch(vec![]), "SHIFT");
    assert!(matches!(result, Err(MasterStoreError::Locked(_))));
}
