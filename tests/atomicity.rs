//! Tests forcing each step of the staged merge to fail.
//!
//! Whatever step fails, the target table must hold exactly the rows it held
//! before the call and the staging table must be back to its pre-call state.
//! Failures are provoked with SQLite triggers, duplicate ids inside the batch
//! and a deferred foreign key that only trips at commit.

use staged_upsert::{
    Error, MergeStage, Row, Schema, SqliteTarget, UpsertTarget, direct_upsert, generate_rows,
    initialize, staged_merge,
};

/// Fresh in-memory database with both tables created and `seed` in the target.
fn seeded_target(seed: &[Row]) -> SqliteTarget {
    let mut target = SqliteTarget::open_in_memory(Schema::default()).expect("open in-memory db");
    initialize(&mut target).expect("initialize schema");
    direct_upsert(&mut target, seed).expect("seed target");
    target
}

/// Asserts `err` is a staged-merge failure at `stage`.
fn assert_stage(err: &Error, stage: MergeStage) {
    match err {
        Error::StagedMerge { stage: actual, .. } => assert_eq!(*actual, stage, "{err}"),
        other => panic!("expected staged merge failure at {stage}, got {other:?}"),
    }
}

/// Asserts the target holds exactly `seed` and the staging table is empty.
fn assert_unchanged(target: &mut SqliteTarget, seed: &[Row]) {
    assert_eq!(target.load_rows("benchmark_test").unwrap(), seed);
    assert_eq!(target.count_rows("benchmark_staging").unwrap(), 0);
}

fn seed() -> Vec<Row> {
    vec![Row::new(100, "seeded"), Row::new(101, "seeded")]
}

#[test]
fn test_duplicate_id_in_batch_fails_bulk_load() {
    let seed = seed();
    let mut target = seeded_target(&seed);
    let batch = vec![Row::new(0, "val"), Row::new(1, "val"), Row::new(1, "val")];

    let err = staged_merge(&mut target, &batch).unwrap_err();
    assert_stage(&err, MergeStage::BulkLoad);
    assert_unchanged(&mut target, &seed);
}

#[test]
fn test_failed_merge_rolls_back_partial_insert() {
    let seed = seed();
    let mut target = seeded_target(&seed);
    // Rows 0..3 are inserted by the merge before id 3 aborts it.
    target
        .execute(
            "CREATE TRIGGER reject_three BEFORE INSERT ON benchmark_test WHEN NEW.id = 3 \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .unwrap();

    let err = staged_merge(&mut target, &generate_rows(10).unwrap()).unwrap_err();
    assert_stage(&err, MergeStage::Merge);
    assert_unchanged(&mut target, &seed);
}

#[test]
fn test_failed_truncate_rolls_back_merge() {
    let seed = seed();
    let mut target = seeded_target(&seed);
    target
        .execute(
            "CREATE TRIGGER keep_staging BEFORE DELETE ON benchmark_staging \
             BEGIN SELECT RAISE(ABORT, 'no truncate'); END",
        )
        .unwrap();

    let err = staged_merge(&mut target, &generate_rows(10).unwrap()).unwrap_err();
    assert_stage(&err, MergeStage::Truncate);
    assert_unchanged(&mut target, &seed);
}

#[test]
fn test_failed_commit_rolls_back_everything() {
    let seed = seed();
    let mut target = seeded_target(&seed);
    // Rebuild the target with a deferred foreign key that no generated row
    // satisfies: every statement succeeds, COMMIT does not.
    target.execute("PRAGMA foreign_keys = ON").unwrap();
    target
        .execute("CREATE TABLE payloads (value TEXT PRIMARY KEY)")
        .unwrap();
    target
        .execute("INSERT INTO payloads (value) VALUES ('seeded')")
        .unwrap();
    target.execute("DROP TABLE benchmark_test").unwrap();
    target
        .execute(
            "CREATE TABLE benchmark_test (id INTEGER PRIMARY KEY, value TEXT \
             REFERENCES payloads (value) DEFERRABLE INITIALLY DEFERRED)",
        )
        .unwrap();
    direct_upsert(&mut target, &seed).unwrap();

    let err = staged_merge(&mut target, &generate_rows(10).unwrap()).unwrap_err();
    assert_stage(&err, MergeStage::Commit);
    assert_unchanged(&mut target, &seed);

    // The connection is usable again afterwards.
    staged_merge(&mut target, &[Row::new(7, "seeded")]).unwrap();
    assert_eq!(target.count_rows("benchmark_test").unwrap(), 3);
}

#[test]
fn test_staging_reverts_to_pre_call_contents() {
    let mut target = seeded_target(&[]);
    // A row left behind outside any merge transaction.
    target
        .execute("INSERT INTO benchmark_staging (id, value) VALUES (50, 'stale')")
        .unwrap();
    target
        .execute(
            "CREATE TRIGGER keep_staging BEFORE DELETE ON benchmark_staging \
             BEGIN SELECT RAISE(ABORT, 'no truncate'); END",
        )
        .unwrap();

    let err = staged_merge(&mut target, &generate_rows(3).unwrap()).unwrap_err();
    assert_stage(&err, MergeStage::Truncate);
    assert!(target.load_rows("benchmark_test").unwrap().is_empty());
    assert_eq!(
        target.load_rows("benchmark_staging").unwrap(),
        vec![Row::new(50, "stale")]
    );
}

#[test]
fn test_merge_succeeds_after_earlier_failure() {
    let mut target = seeded_target(&[]);
    let batch = vec![Row::new(0, "val"), Row::new(0, "val")];
    assert!(staged_merge(&mut target, &batch).is_err());

    let rows = generate_rows(5).unwrap();
    staged_merge(&mut target, &rows).unwrap();
    assert_eq!(target.load_rows("benchmark_test").unwrap(), rows);
    assert_eq!(target.count_rows("benchmark_staging").unwrap(), 0);
}
