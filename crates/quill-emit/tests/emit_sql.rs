//! Emission tests: SQL text, parameter maps, plans, and CTE hoisting.

use quill_ast::{Cardinality, Expr, JsonShape, Plan, Query, SortDirection};
use quill_emit::{format_sql, Emitter, OperationKind, QueryExt};
use quill_error::QuillError;
use quill_schema::{Column, TableSpec};
use quill_types::{Codec, SqlValue, Value};

fn users() -> TableSpec {
    TableSpec::declare(
        "users",
        vec![
            ("id", Column::integer().primary()),
            ("name", Column::text()),
        ],
    )
    .unwrap()
}

fn tasks() -> TableSpec {
    TableSpec::declare(
        "tasks",
        vec![
            ("id", Column::integer().primary()),
            ("title", Column::text()),
        ],
    )
    .unwrap()
}

fn join_users_tasks() -> TableSpec {
    TableSpec::declare(
        "joinUsersTasks",
        vec![
            ("user_id", Column::integer().primary()),
            ("task_id", Column::integer().primary()),
        ],
    )
    .unwrap()
}

/// Inner-join tasks onto the join table, group per user, aggregate the
/// user's tasks into a JSON array.
fn tasks_per_user() -> Query {
    Query::scan(&join_users_tasks())
        .inner_join(&Query::scan(&tasks()), "tasks", |b| {
            Ok(b.col("task_id")?.eq(b.joined("tasks", "id")?))
        })
        .unwrap()
        .group_by(|b| Ok(vec![b.col("user_id")?]))
        .unwrap()
        .select(|b| {
            Ok(vec![
                ("user_id".to_owned(), b.col("user_id")?),
                (
                    "tasks".to_owned(),
                    Expr::json_group_array(Expr::json_object(vec![
                        ("id", b.joined("tasks", "id")?),
                        ("title", b.joined("tasks", "title")?),
                    ])),
                ),
            ])
        })
        .unwrap()
}

#[test]
fn bare_scan() {
    let op = Emitter::deterministic()
        .emit(&Query::scan(&users()), Cardinality::All)
        .unwrap();
    assert_eq!(op.sql, "SELECT users.* FROM users");
    assert_eq!(op.kind, OperationKind::Query);
    assert!(op.params.is_empty());
    let plan = op.plan.unwrap();
    let Plan::Record { fields } = &plan else {
        panic!("expected record plan");
    };
    assert_eq!(fields.len(), 2);
    assert!(matches!(
        &fields[0].1,
        Plan::Scalar { column, codec } if column == "id" && *codec == Codec::INTEGER
    ));
}

#[test]
fn filter_equal_binds_named_params() {
    let q = users_query_filtered();
    let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    assert_eq!(
        op.sql,
        "SELECT users.* FROM users WHERE users.name == :name"
    );
    assert_eq!(
        op.params.get("name"),
        Some(&SqlValue::Text("Jane".to_owned()))
    );
}

fn users_query_filtered() -> Query {
    Query::scan(&users())
        .and_filter_equal(vec![("name", Value::Text("Jane".to_owned()))])
        .unwrap()
}

#[test]
fn join_group_json_sql_is_deterministic() {
    let op = Emitter::deterministic()
        .emit(&tasks_per_user(), Cardinality::All)
        .unwrap();
    assert_eq!(
        op.sql,
        "SELECT t_id0.user_id AS user_id, \
         json_group_array(json_object('id', t_id1.id, 'title', t_id1.title)) AS tasks \
         FROM joinUsersTasks AS t_id0 \
         INNER JOIN (SELECT tasks.* FROM tasks) AS t_id1 ON t_id0.task_id == t_id1.id \
         GROUP BY t_id0.user_id"
    );

    // The canonical formatted rendering, byte for byte.
    assert_eq!(
        format_sql(&op.sql),
        "SELECT t_id0.user_id AS user_id, \
         json_group_array(json_object('id', t_id1.id, 'title', t_id1.title)) AS tasks\n\
         FROM joinUsersTasks AS t_id0\n\
         INNER JOIN (\n  SELECT tasks.*\n  FROM tasks) AS t_id1 ON t_id0.task_id == t_id1.id\n\
         GROUP BY t_id0.user_id"
    );
}

#[test]
fn emission_is_idempotent() {
    let q = tasks_per_user();
    let a = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    let b = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    assert_eq!(a, b);
}

#[test]
fn json_plan_records_nested_shape() {
    let op = Emitter::deterministic()
        .emit(&tasks_per_user(), Cardinality::All)
        .unwrap();
    let Some(Plan::Record { fields }) = op.plan else {
        panic!("expected record plan");
    };
    let (_, tasks_plan) = &fields[1];
    let Plan::Json { column, shape } = tasks_plan else {
        panic!("expected json plan, got {tasks_plan:?}");
    };
    assert_eq!(column, "tasks");
    let JsonShape::Array(element) = shape else {
        panic!("expected array shape");
    };
    assert!(matches!(**element, JsonShape::Object(_)));
}

#[test]
fn derived_query_used_twice_becomes_one_cte() {
    let d = Query::scan(&tasks())
        .select(|b| Ok(vec![("id".to_owned(), b.col("id")?)]))
        .unwrap();
    let q = Query::scan(&users())
        .inner_join(&d, "a", |b| Ok(b.col("id")?.eq(b.joined("a", "id")?)))
        .unwrap()
        .inner_join(&d, "b", |b| Ok(b.col("id")?.eq(b.joined("b", "id")?)))
        .unwrap();
    let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    assert_eq!(
        op.sql,
        "WITH cte_id0 AS (SELECT tasks.id AS id FROM tasks) \
         SELECT t_id1.* FROM users AS t_id1 \
         INNER JOIN cte_id0 AS t_id2 ON t_id1.id == t_id2.id \
         INNER JOIN cte_id0 AS t_id3 ON t_id1.id == t_id3.id"
    );
    assert_eq!(op.sql.matches("AS (").count(), 1);
}

#[test]
fn subquery_predicate_is_hoisted() {
    let sub = Query::scan(&join_users_tasks())
        .group_by(|b| Ok(vec![b.col("user_id")?]))
        .unwrap()
        .having(|b| Ok(Expr::count(b.col("task_id")?).eq(Expr::int(2))))
        .unwrap()
        .select(|b| Ok(vec![("user_id".to_owned(), b.col("user_id")?)]))
        .unwrap();
    let q = Query::scan(&users())
        .filter(|b| Ok(b.col("id")?.in_subquery(sub.clone())))
        .unwrap();
    let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    assert_eq!(
        op.sql,
        "WITH cte_id0 AS (SELECT joinUsersTasks.user_id AS user_id \
         FROM joinUsersTasks GROUP BY joinUsersTasks.user_id \
         HAVING count(joinUsersTasks.task_id) == 2) \
         SELECT users.* FROM users WHERE users.id IN cte_id0"
    );
}

#[test]
fn not_in_subquery_emits_not_in() {
    let sub = Query::scan(&join_users_tasks())
        .group_by(|b| Ok(vec![b.col("user_id")?]))
        .unwrap()
        .select(|b| Ok(vec![("user_id".to_owned(), b.col("user_id")?)]))
        .unwrap();
    let q = Query::scan(&users())
        .filter(|b| Ok(b.col("id")?.not_in_subquery(sub.clone())))
        .unwrap();
    let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    assert!(op.sql.contains("users.id NOT IN cte_id0"));
}

#[test]
fn promoted_source_is_a_cte() {
    let inner = Query::scan(&users())
        .select(|b| Ok(vec![("id".to_owned(), b.col("id")?)]))
        .unwrap();
    let q = Query::from_query(inner);
    let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    assert_eq!(
        op.sql,
        "WITH cte_id0 AS (SELECT users.id AS id FROM users) \
         SELECT t_id1.* FROM cte_id0 AS t_id1"
    );
}

#[test]
fn external_limit_binds_parameter() {
    let q = Query::scan(&users()).limit(Expr::external(10i64).unwrap());
    let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    assert_eq!(op.sql, "SELECT users.* FROM users LIMIT :_id0");
    assert_eq!(op.params.get("_id0"), Some(&SqlValue::Integer(10)));
}

#[test]
fn parameter_order_follows_first_use() {
    let q = Query::scan(&users())
        .select(|b| {
            Ok(vec![
                ("id".to_owned(), b.col("id")?),
                ("tag".to_owned(), Expr::named_external("tag", "x")?),
            ])
        })
        .unwrap()
        .filter(|b| Ok(b.col("name")?.eq(Expr::named_external("who", "Jane")?)))
        .unwrap()
        .limit(Expr::external(5i64).unwrap());
    let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    assert_eq!(
        op.sql,
        "SELECT users.id AS id, :tag AS tag FROM users \
         WHERE users.name == :who LIMIT :_id0"
    );
    assert_eq!(op.params.labels(), vec!["tag", "who", "_id0"]);
}

#[test]
fn two_anonymous_externals_get_distinct_slots() {
    let q = Query::scan(&users())
        .filter(|b| {
            Ok(b.col("id")?
                .gt(Expr::external(1i64)?)
                .and(b.col("id")?.lt(Expr::external(1i64)?)))
        })
        .unwrap();
    let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    assert_eq!(op.params.len(), 2);
    assert_eq!(op.params.labels(), vec!["_id0", "_id1"]);
}

#[test]
fn conflicting_label_rebinding_fails() {
    let q = Query::scan(&users())
        .filter(|b| {
            Ok(b.col("id")?
                .gt(Expr::named_external("n", 1i64)?)
                .and(b.col("id")?.lt(Expr::named_external("n", 2i64)?)))
        })
        .unwrap();
    let err = Emitter::deterministic()
        .emit(&q, Cardinality::All)
        .unwrap_err();
    assert!(matches!(err, QuillError::ParamConflict { .. }));
}

#[test]
fn order_by_and_offset_render_in_canonical_positions() {
    let q = Query::scan(&users())
        .order_by(|b| b.col("name"), SortDirection::Desc)
        .unwrap()
        .limit_offset(Expr::int(10), Expr::int(20));
    let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    assert_eq!(
        op.sql,
        "SELECT users.* FROM users ORDER BY users.name DESC LIMIT 10 OFFSET 20"
    );
}

#[test]
fn left_join_projection_plan_is_nullable() {
    let per_user = tasks_per_user();
    let q = Query::scan(&users())
        .left_join(&per_user, "t", |b| {
            Ok(b.col("id")?.eq(b.joined("t", "user_id")?))
        })
        .unwrap()
        .select(|b| {
            Ok(vec![
                ("id".to_owned(), b.col("id")?),
                ("name".to_owned(), b.col("name")?),
                ("tasks".to_owned(), b.joined("t", "tasks")?),
            ])
        })
        .unwrap();
    let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    let Some(Plan::Record { fields }) = op.plan else {
        panic!("expected record plan");
    };
    let (_, tasks_plan) = &fields[2];
    let Plan::Nullable { inner } = tasks_plan else {
        panic!("expected nullable plan, got {tasks_plan:?}");
    };
    assert!(matches!(**inner, Plan::Json { .. }));
}

#[test]
fn having_without_group_by_is_rejected() {
    let q = Query::scan(&users())
        .having(|b| Ok(Expr::count(b.col("id")?).gt(Expr::int(1))))
        .unwrap();
    let err = q.one().unwrap_err();
    assert!(matches!(err, QuillError::HavingWithoutGroupBy));
}

#[test]
fn aggregate_in_ungrouped_select_is_rejected() {
    let q = Query::scan(&users())
        .select(|_| Ok(vec![("n".to_owned(), Expr::count_star())]))
        .unwrap();
    let err = q.all().unwrap_err();
    assert!(matches!(
        err,
        QuillError::IllegalAggregate { ref clause, .. } if clause == "SELECT"
    ));
}

#[test]
fn wide_subquery_predicate_is_rejected() {
    let wide = Query::scan(&users());
    let q = Query::scan(&users())
        .filter(|b| Ok(b.col("id")?.in_subquery(wide.clone())))
        .unwrap();
    let err = q.all().unwrap_err();
    assert!(matches!(err, QuillError::SubqueryArity { count: 2 }));
}

#[test]
fn raw_expression_is_verbatim() {
    let q = Query::scan(&users())
        .filter(|b| {
            Ok(b.col("id")?
                .eq(Expr::raw("abs(-1)", Codec::INTEGER)))
        })
        .unwrap();
    let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
    assert_eq!(op.sql, "SELECT users.* FROM users WHERE users.id == abs(-1)");
}

#[test]
fn insert_single_row() {
    let table = users();
    let op = Emitter::deterministic()
        .emit_insert(
            &table,
            &[vec![
                ("id".to_owned(), Value::Int(1)),
                ("name".to_owned(), Value::Text("John".to_owned())),
            ]],
        )
        .unwrap();
    assert_eq!(op.kind, OperationKind::Insert);
    assert_eq!(op.sql, "INSERT INTO users (id, name) VALUES (:id, :name)");
    assert_eq!(op.params.get("id"), Some(&SqlValue::Integer(1)));
}

#[test]
fn insert_many_rows_suffixes_labels() {
    let table = users();
    let op = Emitter::deterministic()
        .emit_insert(
            &table,
            &[
                vec![
                    ("id".to_owned(), Value::Int(1)),
                    ("name".to_owned(), Value::Text("John".to_owned())),
                ],
                vec![
                    ("id".to_owned(), Value::Int(2)),
                    ("name".to_owned(), Value::Text("Jane".to_owned())),
                ],
            ],
        )
        .unwrap();
    assert_eq!(
        op.sql,
        "INSERT INTO users (id, name) VALUES (:id_0, :name_0), (:id_1, :name_1)"
    );
    assert_eq!(op.params.labels(), vec!["id_0", "name_0", "id_1", "name_1"]);
}

#[test]
fn insert_serializes_through_column_codecs() {
    let table = TableSpec::declare(
        "flags",
        vec![
            ("id", Column::integer().primary()),
            ("done", Column::boolean()),
        ],
    )
    .unwrap();
    let op = Emitter::deterministic()
        .emit_insert(
            &table,
            &[vec![
                ("id".to_owned(), Value::Int(1)),
                ("done".to_owned(), Value::Bool(true)),
            ]],
        )
        .unwrap();
    assert_eq!(op.params.get("done"), Some(&SqlValue::Integer(1)));
}

#[test]
fn update_with_filter() {
    let table = users();
    let filter = Query::scan(&table)
        .bag()
        .col("id")
        .unwrap()
        .eq(Expr::named_external("id", 3i64).unwrap());
    let op = Emitter::deterministic()
        .emit_update(
            &table,
            &[("name".to_owned(), Value::Text("Jill".to_owned()))],
            Some(&filter),
        )
        .unwrap();
    assert_eq!(op.kind, OperationKind::Update);
    assert_eq!(
        op.sql,
        "UPDATE users SET name = :set_name WHERE users.id == :id"
    );
    assert_eq!(op.params.labels(), vec!["set_name", "id"]);
}

#[test]
fn delete_without_filter() {
    let table = users();
    let op = Emitter::deterministic().emit_delete(&table, None).unwrap();
    assert_eq!(op.kind, OperationKind::Delete);
    assert_eq!(op.sql, "DELETE FROM users");
    assert!(op.params.is_empty());
}

#[test]
fn insert_unknown_column_fails() {
    let err = Emitter::deterministic()
        .emit_insert(&users(), &[vec![("nmae".to_owned(), Value::Int(1))]])
        .unwrap_err();
    assert!(matches!(err, QuillError::UnknownColumn { .. }));
}
