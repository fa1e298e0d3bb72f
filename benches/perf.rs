use criterion::{Criterion, black_box, criterion_group, criterion_main};
use memrel::{
    ColumnDef, ColumnType, Database, ExecutionContext, Expr, FilterPlan, IndexDef, IndexKind,
    Order, Row, SetUpdater, TableSchema, UpdateExpr, Value,
};

const TABLE_NAME: &str = "users";
const SEEDED_ROWS: i64 = 10_000;

fn setup_db(seed_rows: i64) -> Database {
    let db = Database::new();
    db.create_table(TableSchema {
        table_name: TABLE_NAME.into(),
        columns: vec![
            ColumnDef {
                name: "id".into(),
                col_type: ColumnType::Integer,
                nullable: false,
            },
            ColumnDef {
                name: "name".into(),
                col_type: ColumnType::Text,
                nullable: false,
            },
            ColumnDef {
                name: "age".into(),
                col_type: ColumnType::Integer,
                nullable: false,
            },
        ],
        primary_key: vec!["id".into()],
        constraints: Vec::new(),
    })
    .expect("table");
    db.create_index(
        TABLE_NAME,
        IndexDef {
            index_name: "by_age".into(),
            columns: vec!["age".into()],
            kind: IndexKind::BTree,
        },
    )
    .expect("index");

    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    for id in 1..=seed_rows {
        db.execute_insert(
            TABLE_NAME,
            Row::from_values(vec![
                Value::Integer(id),
                Value::Text(format!("user-{id}").into()),
                Value::Integer(18 + (id % 50)),
            ]),
            &ctx,
        )
        .expect("seed row");
    }
    txn.commit();
    db
}

fn bench_insert(c: &mut Criterion) {
    let db = setup_db(0);
    let mut next_id = 1i64;
    c.bench_function("insert_single_row", |b| {
        b.iter(|| {
            let txn = db.begin();
            let ctx = ExecutionContext::new(&txn);
            let row = db
                .execute_insert(
                    TABLE_NAME,
                    Row::from_values(vec![
                        Value::Integer(next_id),
                        Value::Text(format!("user-{next_id}").into()),
                        Value::Integer(18 + (next_id % 50)),
                    ]),
                    &ctx,
                )
                .expect("insert");
            txn.commit();
            next_id += 1;
            black_box(row)
        })
    });
}

fn bench_filter_query(c: &mut Criterion) {
    let db = setup_db(SEEDED_ROWS);
    c.bench_function("filter_order_limit_query", |b| {
        b.iter(|| {
            let txn = db.begin();
            let ctx = ExecutionContext::new(&txn);
            let rows = db
                .execute_query(
                    &FilterPlan::table(TABLE_NAME)
                        .where_(Expr::Gte("age".into(), Value::Integer(60)))
                        .order_by("id", Order::Desc)
                        .limit(50),
                    &ctx,
                )
                .expect("query");
            black_box(rows)
        })
    });
}

fn bench_point_update(c: &mut Criterion) {
    let db = setup_db(SEEDED_ROWS);
    let mut id = 1i64;
    c.bench_function("point_update_rekeys_index", |b| {
        b.iter(|| {
            let txn = db.begin();
            let ctx = ExecutionContext::new(&txn);
            let rows = db
                .execute_update(
                    &FilterPlan::table(TABLE_NAME)
                        .where_(Expr::Eq("id".into(), Value::Integer(id))),
                    &SetUpdater::set("age", UpdateExpr::AddInteger(1)),
                    &ctx,
                )
                .expect("update");
            txn.commit();
            id = id % SEEDED_ROWS + 1;
            black_box(rows)
        })
    });
}

fn bench_delete_reinsert(c: &mut Criterion) {
    let db = setup_db(SEEDED_ROWS);
    let mut id = 1i64;
    c.bench_function("point_delete_then_reinsert", |b| {
        b.iter(|| {
            let txn = db.begin();
            let ctx = ExecutionContext::new(&txn);
            let deleted = db
                .execute_delete(
                    &FilterPlan::table(TABLE_NAME)
                        .where_(Expr::Eq("id".into(), Value::Integer(id))),
                    &ctx,
                )
                .expect("delete");
            for row in &deleted {
                db.execute_insert(TABLE_NAME, row.clone(), &ctx)
                    .expect("reinsert");
            }
            txn.commit();
            id = id % SEEDED_ROWS + 1;
            black_box(deleted)
        })
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_filter_query,
    bench_point_update,
    bench_delete_reinsert
);
criterion_main!(benches);
