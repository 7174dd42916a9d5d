//! End-to-end tests of both ingestion strategies against in-memory SQLite.
//!
//! These tests verify that:
//! 1. The schema initializer leaves both tables present and empty, whatever
//!    state they were in before
//! 2. Both strategies land exactly the generated rows in the target table
//! 3. Re-running either strategy over the same rows is a silent no-op
//! 4. Existing rows are never overwritten
//! 5. The direct strategy stops at the first failing row, keeping earlier rows

use staged_upsert::{
    Error, Row, Schema, SqliteTarget, UpsertTarget, direct_upsert, generate_rows, initialize,
    staged_merge,
};

// =============================================================================
// Helper functions
// =============================================================================

/// Fresh in-memory database with both tables created.
fn fresh_target() -> SqliteTarget {
    let mut target = SqliteTarget::open_in_memory(Schema::default()).expect("open in-memory db");
    initialize(&mut target).expect("initialize schema");
    target
}

fn target_rows(target: &SqliteTarget) -> Vec<Row> {
    target.load_rows("benchmark_test").expect("load target rows")
}

fn staging_count(target: &mut SqliteTarget) -> u64 {
    target.count_rows("benchmark_staging").expect("count staging")
}

// =============================================================================
// Schema initializer
// =============================================================================

#[test]
fn test_initialize_creates_empty_tables() {
    let mut target = fresh_target();
    assert!(target.table_exists("benchmark_test").unwrap());
    assert!(target.table_exists("benchmark_staging").unwrap());
    assert_eq!(target.count_rows("benchmark_test").unwrap(), 0);
    assert_eq!(staging_count(&mut target), 0);
}

#[test]
fn test_initialize_discards_previous_contents() {
    let mut target = fresh_target();
    direct_upsert(&mut target, &generate_rows(10).unwrap()).unwrap();
    target
        .execute("INSERT INTO benchmark_staging (id, value) VALUES (1, 'left over')")
        .unwrap();

    initialize(&mut target).unwrap();
    assert!(target_rows(&target).is_empty());
    assert_eq!(staging_count(&mut target), 0);

    // Running it again on an already clean schema also succeeds.
    initialize(&mut target).unwrap();
}

#[test]
fn test_initialize_uses_custom_table_names() {
    let schema = Schema::new("events", "events_staging").unwrap();
    let mut target = SqliteTarget::open_in_memory(schema).unwrap();
    initialize(&mut target).unwrap();
    assert!(target.table_exists("events").unwrap());
    assert!(target.table_exists("events_staging").unwrap());
    assert!(!target.table_exists("benchmark_test").unwrap());

    staged_merge(&mut target, &generate_rows(4).unwrap()).unwrap();
    assert_eq!(target.count_rows("events").unwrap(), 4);
}

#[test]
fn test_initialize_reports_failing_statement() {
    let mut target = fresh_target();
    // A view with the target's name cannot be removed by DROP TABLE.
    target.execute("DROP TABLE benchmark_test").unwrap();
    target
        .execute("CREATE VIEW benchmark_test AS SELECT 1 AS id")
        .unwrap();

    let err = initialize(&mut target).unwrap_err();
    match err {
        Error::Setup { statement, .. } => {
            assert_eq!(statement, "DROP TABLE IF EXISTS benchmark_test");
        }
        other => panic!("expected setup error, got {other:?}"),
    }
}

// =============================================================================
// Direct upsert
// =============================================================================

#[test]
fn test_direct_upsert_inserts_every_row() {
    let mut target = fresh_target();
    let rows = generate_rows(500).unwrap();
    direct_upsert(&mut target, &rows).unwrap();
    assert_eq!(target_rows(&target), rows);
}

#[test]
fn test_direct_upsert_is_idempotent() {
    let mut target = fresh_target();
    let rows = generate_rows(3).unwrap();
    direct_upsert(&mut target, &rows).unwrap();
    assert_eq!(target.count_rows("benchmark_test").unwrap(), 3);

    direct_upsert(&mut target, &rows).unwrap();
    assert_eq!(
        target_rows(&target),
        vec![Row::new(0, "val"), Row::new(1, "val"), Row::new(2, "val")]
    );
}

#[test]
fn test_direct_upsert_stops_at_first_failure() {
    let mut target = fresh_target();
    target
        .execute(
            "CREATE TRIGGER reject_two BEFORE INSERT ON benchmark_test WHEN NEW.id = 2 \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .unwrap();

    let err = direct_upsert(&mut target, &generate_rows(5).unwrap()).unwrap_err();
    assert!(matches!(err, Error::DirectUpsert { id: 2, .. }), "{err:?}");
    // Rows before the failure were committed individually.
    assert_eq!(target_rows(&target), generate_rows(2).unwrap());
}

#[test]
fn test_direct_upsert_of_nothing() {
    let mut target = fresh_target();
    direct_upsert(&mut target, &[]).unwrap();
    assert!(target_rows(&target).is_empty());
}

// =============================================================================
// Staged merge
// =============================================================================

#[test]
fn test_staged_merge_inserts_every_row_and_empties_staging() {
    let mut target = fresh_target();
    let rows = generate_rows(500).unwrap();
    let summary = staged_merge(&mut target, &rows).unwrap();
    assert_eq!(summary.loaded, 500);
    assert_eq!(summary.inserted, 500);
    assert_eq!(target_rows(&target), rows);
    assert_eq!(staging_count(&mut target), 0);
}

#[test]
fn test_staged_merge_is_idempotent() {
    let mut target = fresh_target();
    let rows = generate_rows(3).unwrap();
    staged_merge(&mut target, &rows).unwrap();
    let summary = staged_merge(&mut target, &rows).unwrap();
    assert_eq!(summary.loaded, 3);
    assert_eq!(summary.inserted, 0);
    assert_eq!(target_rows(&target), rows);
    assert_eq!(staging_count(&mut target), 0);
}

#[test]
fn test_staged_merge_of_nothing() {
    let mut target = fresh_target();
    let summary = staged_merge(&mut target, &[]).unwrap();
    assert_eq!(summary.loaded, 0);
    assert_eq!(summary.inserted, 0);
    assert!(target_rows(&target).is_empty());
}

#[test]
fn test_staged_merge_partially_overlapping_batch() {
    let mut target = fresh_target();
    staged_merge(&mut target, &generate_rows(5).unwrap()).unwrap();
    let summary = staged_merge(&mut target, &generate_rows(8).unwrap()).unwrap();
    assert_eq!(summary.loaded, 8);
    assert_eq!(summary.inserted, 3);
    assert_eq!(target_rows(&target), generate_rows(8).unwrap());
}

// =============================================================================
// Cross-strategy behaviour
// =============================================================================

#[test]
fn test_both_strategies_reach_the_same_state() {
    let rows = generate_rows(3).unwrap();

    let mut direct = fresh_target();
    direct_upsert(&mut direct, &rows).unwrap();
    direct_upsert(&mut direct, &rows).unwrap();

    let mut staged = fresh_target();
    staged_merge(&mut staged, &rows).unwrap();
    staged_merge(&mut staged, &rows).unwrap();

    assert_eq!(target_rows(&direct), target_rows(&staged));
    assert_eq!(staging_count(&mut direct), staging_count(&mut staged));
}

#[test]
fn test_strategies_never_overwrite_existing_rows() {
    let mut target = fresh_target();
    target
        .execute("INSERT INTO benchmark_test (id, value) VALUES (1, 'original')")
        .unwrap();

    let rows = generate_rows(3).unwrap();
    direct_upsert(&mut target, &rows).unwrap();
    staged_merge(&mut target, &rows).unwrap();

    assert_eq!(
        target_rows(&target),
        vec![
            Row::new(0, "val"),
            Row::new(1, "original"),
            Row::new(2, "val")
        ]
    );
}

#[test]
fn test_mixing_strategies_keeps_one_row_per_id() {
    let mut target = fresh_target();
    direct_upsert(&mut target, &generate_rows(4).unwrap()).unwrap();
    staged_merge(&mut target, &generate_rows(6).unwrap()).unwrap();
    direct_upsert(&mut target, &generate_rows(6).unwrap()).unwrap();
    assert_eq!(target_rows(&target), generate_rows(6).unwrap());
}
