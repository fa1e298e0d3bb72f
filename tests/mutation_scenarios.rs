use memrel::{
    ColumnDef, ColumnType, Database, ExecutionContext, Expr, FilterPlan, IndexDef, IndexKind,
    MemrelError, RelationDef, RelationOptions, Row, SetUpdater, TableSchema, UpdateExpr, Value,
};

fn column(name: &str, col_type: ColumnType, nullable: bool) -> ColumnDef {
    ColumnDef {
        name: name.into(),
        col_type,
        nullable,
    }
}

fn setup_customers_orders(cascade: bool) -> Database {
    let db = Database::new();
    db.create_table(TableSchema {
        table_name: "customers".into(),
        columns: vec![
            column("id", ColumnType::Integer, false),
            column("name", ColumnType::Text, true),
        ],
        primary_key: vec!["id".into()],
        constraints: Vec::new(),
    })
    .expect("customers");
    db.create_table(TableSchema {
        table_name: "orders".into(),
        columns: vec![
            column("id", ColumnType::Integer, false),
            column("customer_id", ColumnType::Integer, true),
        ],
        primary_key: vec!["id".into()],
        constraints: Vec::new(),
    })
    .expect("orders");
    db.create_index(
        "orders",
        IndexDef {
            index_name: "by_customer".into(),
            columns: vec!["customer_id".into()],
            kind: IndexKind::BTree,
        },
    )
    .expect("index");
    db.create_relation(RelationDef {
        name: "orders_customer".into(),
        foreign_table: "orders".into(),
        foreign_columns: vec!["customer_id".into()],
        primary_table: "customers".into(),
        primary_columns: vec!["id".into()],
        options: RelationOptions {
            cascaded_deletion: cascade,
        },
    })
    .expect("relation");
    db
}

fn insert(db: &Database, table: &str, values: Vec<Value>) {
    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    db.execute_insert(table, Row::from_values(values), &ctx)
        .expect("insert");
    txn.commit();
}

#[test]
fn insert_with_dangling_foreign_key_is_rejected() {
    let db = setup_customers_orders(false);
    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);

    let err = db
        .execute_insert(
            "orders",
            Row::from_values(vec![Value::Integer(1), Value::Integer(99)]),
            &ctx,
        )
        .unwrap_err();
    assert!(matches!(err, MemrelError::ForeignKeyViolation { .. }));

    assert_eq!(db.row_count("orders").expect("count"), 0);
    assert_eq!(db.index_entry_count("orders", "primary").expect("idx"), 0);
    assert_eq!(
        db.index_entry_count("orders", "by_customer").expect("idx"),
        0
    );
}

#[test]
fn nulled_foreign_key_is_exempt_from_the_relation() {
    let db = setup_customers_orders(false);
    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    db.execute_insert(
        "orders",
        Row::from_values(vec![Value::Integer(1), Value::Null]),
        &ctx,
    )
    .expect("nullable fk insert");
    txn.commit();
    assert_eq!(db.row_count("orders").expect("count"), 1);
}

#[test]
fn update_that_breaks_a_referrer_rolls_back() {
    let db = setup_customers_orders(false);
    insert(&db, "customers", vec![Value::Integer(1), Value::Text("A".into())]);
    insert(&db, "orders", vec![Value::Integer(1), Value::Integer(1)]);

    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    let plan = FilterPlan::table("customers").where_(Expr::Eq("id".into(), Value::Integer(1)));
    let err = db
        .execute_update(
            &plan,
            &SetUpdater::set("id", UpdateExpr::Value(Value::Integer(2))),
            &ctx,
        )
        .unwrap_err();
    assert!(matches!(err, MemrelError::ForeignKeyViolation { .. }));
    drop(txn);

    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    let customers = db
        .execute_query(&FilterPlan::table("customers"), &ctx)
        .expect("query");
    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0].values[0], Value::Integer(1));
    let orders = db
        .execute_query(&FilterPlan::table("orders"), &ctx)
        .expect("query");
    assert_eq!(orders[0].values[1], Value::Integer(1));
}

#[test]
fn cascade_delete_removes_referrers_and_reports_only_direct_victims() {
    let db = setup_customers_orders(true);
    insert(&db, "customers", vec![Value::Integer(1), Value::Text("A".into())]);
    insert(&db, "orders", vec![Value::Integer(10), Value::Integer(1)]);
    insert(&db, "orders", vec![Value::Integer(11), Value::Integer(1)]);

    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    let plan = FilterPlan::table("customers").where_(Expr::Eq("id".into(), Value::Integer(1)));
    let deleted = db.execute_delete(&plan, &ctx).expect("delete");
    txn.commit();

    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].values[0], Value::Integer(1));
    assert_eq!(db.row_count("customers").expect("count"), 0);
    assert_eq!(db.row_count("orders").expect("count"), 0);
    assert_eq!(db.index_entry_count("orders", "primary").expect("idx"), 0);
    assert_eq!(
        db.index_entry_count("orders", "by_customer").expect("idx"),
        0
    );
}

#[test]
fn delete_with_live_referrer_and_no_cascade_is_rejected() {
    let db = setup_customers_orders(false);
    insert(&db, "customers", vec![Value::Integer(1), Value::Text("A".into())]);
    insert(&db, "orders", vec![Value::Integer(10), Value::Integer(1)]);

    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    let plan = FilterPlan::table("customers").where_(Expr::Eq("id".into(), Value::Integer(1)));
    let err = db.execute_delete(&plan, &ctx).unwrap_err();
    assert!(matches!(err, MemrelError::ForeignKeyViolation { .. }));
    drop(txn);

    assert_eq!(db.row_count("customers").expect("count"), 1);
    assert_eq!(db.row_count("orders").expect("count"), 1);
    assert_eq!(db.index_entry_count("customers", "primary").expect("idx"), 1);
}

fn setup_items() -> Database {
    let db = Database::new();
    db.create_table(TableSchema {
        table_name: "items".into(),
        columns: vec![
            column("id", ColumnType::Integer, false),
            column("code", ColumnType::Text, false),
        ],
        primary_key: vec!["id".into()],
        constraints: Vec::new(),
    })
    .expect("items");
    db.create_index(
        "items",
        IndexDef {
            index_name: "by_code".into(),
            columns: vec!["code".into()],
            kind: IndexKind::UniqueHash,
        },
    )
    .expect("index");
    insert(&db, "items", vec![Value::Integer(1), Value::Text("a".into())]);
    insert(&db, "items", vec![Value::Integer(2), Value::Text("b".into())]);
    db
}

#[test]
fn update_rekeys_the_affected_unique_index() {
    let db = setup_items();
    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    let plan = FilterPlan::table("items").where_(Expr::Eq("id".into(), Value::Integer(1)));
    let updated = db
        .execute_update(
            &plan,
            &SetUpdater::set("code", UpdateExpr::Value(Value::Text("c".into()))),
            &ctx,
        )
        .expect("update");
    txn.commit();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].values[1], Value::Text("c".into()));

    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    let by_old = db
        .execute_query(
            &FilterPlan::table("items").where_(Expr::Eq("code".into(), Value::Text("a".into()))),
            &ctx,
        )
        .expect("query");
    assert!(by_old.is_empty());
    let by_new = db
        .execute_query(
            &FilterPlan::table("items").where_(Expr::Eq("code".into(), Value::Text("c".into()))),
            &ctx,
        )
        .expect("query");
    assert_eq!(by_new.len(), 1);
    assert_eq!(by_new[0].values[0], Value::Integer(1));
    assert_eq!(db.index_entry_count("items", "by_code").expect("idx"), 2);
}

#[test]
fn update_into_an_occupied_unique_key_rolls_back() {
    let db = setup_items();
    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    let plan = FilterPlan::table("items").where_(Expr::Eq("id".into(), Value::Integer(1)));
    let err = db
        .execute_update(
            &plan,
            &SetUpdater::set("code", UpdateExpr::Value(Value::Text("b".into()))),
            &ctx,
        )
        .unwrap_err();
    assert!(matches!(err, MemrelError::UniqueViolation { ref index, .. } if index == "by_code"));
    drop(txn);

    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    let rows = db
        .execute_query(&FilterPlan::table("items").order_by("id", memrel::Order::Asc), &ctx)
        .expect("query");
    assert_eq!(rows[0].values[1], Value::Text("a".into()));
    assert_eq!(rows[1].values[1], Value::Text("b".into()));
    assert_eq!(db.index_entry_count("items", "by_code").expect("idx"), 2);
}

#[test]
fn queries_return_clones_not_live_references() {
    let db = setup_customers_orders(false);
    insert(&db, "customers", vec![Value::Integer(1), Value::Text("A".into())]);

    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    let mut rows = db
        .execute_query(&FilterPlan::table("customers"), &ctx)
        .expect("query");
    rows[0].values[1] = Value::Text("mutated".into());
    drop(txn);

    let txn = db.begin();
    let ctx = ExecutionContext::new(&txn);
    let rows = db
        .execute_query(&FilterPlan::table("customers"), &ctx)
        .expect("query");
    assert_eq!(rows[0].values[1], Value::Text("A".into()));
}
