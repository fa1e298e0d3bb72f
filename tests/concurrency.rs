use memrel::{
    ColumnDef, ColumnType, Database, ExecutionContext, Expr, FilterPlan, MemrelConfig, MemrelError,
    Row, SetUpdater, TableSchema, UpdateExpr, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

fn int_table(db: &Database, name: &str) {
    db.create_table(TableSchema {
        table_name: name.into(),
        columns: vec![
            ColumnDef {
                name: "id".into(),
                col_type: ColumnType::Integer,
                nullable: false,
            },
            ColumnDef {
                name: "n".into(),
                col_type: ColumnType::Integer,
                nullable: true,
            },
        ],
        primary_key: vec!["id".into()],
        constraints: Vec::new(),
    })
    .expect("table");
}

fn seed(db: &Database, table: &str, id: i64) {
    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    db.execute_insert(
        table,
        Row::from_values(vec![Value::Integer(id), Value::Integer(0)]),
        &ctx,
    )
    .expect("seed");
    txn.commit();
}

fn bump(db: &Database, ctx: &ExecutionContext<'_>, table: &str, id: i64) -> Result<(), MemrelError> {
    db.execute_update(
        &FilterPlan::table(table).where_(Expr::Eq("id".into(), Value::Integer(id))),
        &SetUpdater::set("n", UpdateExpr::AddInteger(1)),
        ctx,
    )
    .map(|_| ())
}

#[test]
fn update_write_lock_is_held_until_commit() {
    let db = Database::with_config(MemrelConfig::contended());
    int_table(&db, "counters");
    seed(&db, "counters", 1);

    let writer = db.begin();
    let writer_ctx = ExecutionContext::new(&writer);
    bump(&db, &writer_ctx, "counters", 1).expect("first update");

    let blocked = db.begin();
    let blocked_ctx = ExecutionContext::new(&blocked);
    let err = db
        .execute_insert(
            "counters",
            Row::from_values(vec![Value::Integer(2), Value::Integer(0)]),
            &blocked_ctx,
        )
        .unwrap_err();
    assert!(matches!(err, MemrelError::LockTimeout { .. }));

    writer.commit();
    db.execute_insert(
        "counters",
        Row::from_values(vec![Value::Integer(2), Value::Integer(0)]),
        &blocked_ctx,
    )
    .expect("after release");
    blocked.commit();
}

#[test]
fn insert_releases_its_write_lock_at_command_end() {
    let db = Database::with_config(MemrelConfig::contended());
    int_table(&db, "counters");

    let first = db.begin();
    let first_ctx = ExecutionContext::new(&first);
    db.execute_insert(
        "counters",
        Row::from_values(vec![Value::Integer(1), Value::Integer(0)]),
        &first_ctx,
    )
    .expect("insert");
    // No commit yet: the insert path alone must have let go of the table.

    let second = db.begin();
    let second_ctx = ExecutionContext::new(&second);
    db.execute_insert(
        "counters",
        Row::from_values(vec![Value::Integer(2), Value::Integer(0)]),
        &second_ctx,
    )
    .expect("uncommitted peer does not block inserts");
    second.commit();
    first.commit();
}

#[test]
fn a_transaction_reads_through_its_own_write_lock() {
    let db = Database::with_config(MemrelConfig::contended());
    int_table(&db, "counters");
    seed(&db, "counters", 1);

    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    bump(&db, &ctx, "counters", 1).expect("update");
    let rows = db
        .execute_query(&FilterPlan::table("counters"), &ctx)
        .expect("reentrant read");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values[1], Value::Integer(1));
    txn.commit();
}

#[test]
fn disjoint_tables_interleave_freely() {
    let db = Database::new();
    int_table(&db, "alpha");
    int_table(&db, "beta");

    let handles: Vec<_> = [("alpha", 0i64), ("beta", 1000)]
        .into_iter()
        .map(|(table, base)| {
            let db = db.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    let txn = db.begin();
                    let ctx = ExecutionContext::new(&txn);
                    db.execute_insert(
                        table,
                        Row::from_values(vec![Value::Integer(base + i), Value::Integer(i)]),
                        &ctx,
                    )
                    .expect("insert");
                    txn.commit();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    assert_eq!(db.row_count("alpha").expect("count"), 100);
    assert_eq!(db.row_count("beta").expect("count"), 100);
}

#[test]
fn crossed_table_writers_detect_deadlock() {
    let db = Database::new();
    int_table(&db, "alpha");
    int_table(&db, "beta");
    seed(&db, "alpha", 1);
    seed(&db, "beta", 1);

    let forward = {
        let db = db.clone();
        thread::spawn(move || {
            let txn = db.begin();
            let ctx = ExecutionContext::new(&txn);
            bump(&db, &ctx, "alpha", 1)?;
            thread::sleep(Duration::from_millis(100));
            bump(&db, &ctx, "beta", 1)?;
            txn.commit();
            Ok::<(), MemrelError>(())
        })
    };
    let backward = {
        let db = db.clone();
        thread::spawn(move || {
            let txn = db.begin();
            let ctx = ExecutionContext::new(&txn);
            bump(&db, &ctx, "beta", 1)?;
            thread::sleep(Duration::from_millis(100));
            bump(&db, &ctx, "alpha", 1)?;
            txn.commit();
            Ok::<(), MemrelError>(())
        })
    };

    let results = [forward.join().expect("join"), backward.join().expect("join")];
    let deadlocks = results
        .iter()
        .filter(|r| matches!(r, Err(MemrelError::Deadlock { .. })))
        .count();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(deadlocks, 1, "exactly one side is the deadlock victim");
    assert_eq!(successes, 1, "the survivor finishes once the victim unwinds");

    // Commands are atomic individually; the victim's first bump completed
    // before the deadlock and stays. Survivor: 2 bumps, victim: 1.
    let total: i64 = ["alpha", "beta"]
        .iter()
        .map(|table| {
            let txn = db.begin();
            let ctx = ExecutionContext::new(&txn);
            let rows = db
                .execute_query(&FilterPlan::table(*table), &ctx)
                .expect("query");
            match &rows[0].values[1] {
                Value::Integer(n) => *n,
                _ => panic!("integer column"),
            }
        })
        .sum();
    assert_eq!(total, 3);
}

#[test]
fn cancellation_surfaces_at_lock_acquisition() {
    let db = Database::new();
    int_table(&db, "counters");
    seed(&db, "counters", 1);

    let holder = db.begin();
    let holder_ctx = ExecutionContext::new(&holder);
    bump(&db, &holder_ctx, "counters", 1).expect("hold write lock");

    let cancelled = Arc::new(AtomicBool::new(true));
    let txn = db.begin();
    let ctx = ExecutionContext::with_cancellation(&txn, Arc::clone(&cancelled));
    let err = db
        .execute_insert(
            "counters",
            Row::from_values(vec![Value::Integer(2), Value::Integer(0)]),
            &ctx,
        )
        .unwrap_err();
    assert!(matches!(err, MemrelError::Cancelled));

    cancelled.store(false, Ordering::Relaxed);
    holder.commit();
}
