//! Property tests for emission invariants: idempotence, canonical-format
//! stability, and parameter ordering.

use proptest::prelude::*;
use quill::{
    format_sql, query, Cardinality, Column, Emitter, Expr, Query, QueryExt, SortDirection,
    TableSpec, Value,
};

fn users() -> TableSpec {
    TableSpec::declare(
        "users",
        vec![
            ("id", Column::integer().primary()),
            ("name", Column::text()),
            ("age", Column::integer().nullable()),
        ],
    )
    .unwrap()
}

/// A bounded recipe for a query over the fixture table. Kept as plain data
/// so the same recipe can be replayed into identical trees.
#[derive(Clone, Debug)]
struct Recipe {
    id_gt: Option<i64>,
    name_eq: Option<String>,
    labeled: Vec<(String, i64)>,
    order_desc: Option<bool>,
    limit: Option<u32>,
}

fn arb_recipe() -> impl Strategy<Value = Recipe> {
    (
        prop::option::of(any::<i64>()),
        prop::option::of("[a-z]{1,8}"),
        proptest::sample::subsequence(vec!["a", "b", "c", "d", "e"], 0..=5),
        prop::option::of(any::<bool>()),
        prop::option::of(1u32..100),
    )
        .prop_map(|(id_gt, name_eq, labels, order_desc, limit)| Recipe {
            id_gt,
            name_eq,
            labeled: labels
                .into_iter()
                .enumerate()
                .map(|(i, l)| (l.to_owned(), i as i64))
                .collect(),
            order_desc,
            limit,
        })
}

fn build(recipe: &Recipe) -> Query {
    let mut q = query(&users());
    if let Some(n) = recipe.id_gt {
        q = q.filter(|b| Ok(b.col("id")?.gt(Expr::int(n)))).unwrap();
    }
    if let Some(name) = &recipe.name_eq {
        q = q
            .filter(|b| Ok(b.col("name")?.eq(Expr::text(name.clone()))))
            .unwrap();
    }
    for (label, value) in &recipe.labeled {
        q = q
            .filter(|b| Ok(b.col("id")?.ne(Expr::named_external(label.clone(), *value)?)))
            .unwrap();
    }
    if let Some(desc) = recipe.order_desc {
        let direction = if desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        q = q.order_by(|b| b.col("name"), direction).unwrap();
    }
    if let Some(limit) = recipe.limit {
        q = q.limit(Expr::external(i64::from(limit)).unwrap());
    }
    q
}

proptest::proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(256))]

    /// Emission is a pure function of the tree and the generator state.
    #[test]
    fn emission_is_idempotent(recipe in arb_recipe()) {
        let q = build(&recipe);
        let a = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
        let b = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
        prop_assert_eq!(&a.sql, &b.sql);
        prop_assert_eq!(a.params, b.params);
        prop_assert_eq!(a.plan, b.plan);
    }

    /// The canonical formatted text is stable and reformat-idempotent.
    #[test]
    fn canonical_format_is_stable(recipe in arb_recipe()) {
        let q = build(&recipe);
        let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
        let formatted = format_sql(&op.sql);
        prop_assert_eq!(format_sql(&formatted), formatted.clone());

        let again = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
        prop_assert_eq!(format_sql(&again.sql), formatted);
    }

    /// Parameter insertion order equals first-occurrence order in the SQL.
    #[test]
    fn parameter_order_matches_sql(recipe in arb_recipe()) {
        let q = build(&recipe);
        let op = Emitter::deterministic().emit(&q, Cardinality::All).unwrap();
        let mut positions: Vec<(usize, String)> = op
            .params
            .labels()
            .iter()
            .map(|label| {
                let at = op.sql.find(&format!(":{label}")).expect("label in SQL");
                (at, (*label).to_owned())
            })
            .collect();
        positions.sort_by_key(|(at, _)| *at);
        let by_position: Vec<String> = positions.into_iter().map(|(_, l)| l).collect();
        let by_insertion: Vec<String> =
            op.params.labels().iter().map(|l| (*l).to_owned()).collect();
        prop_assert_eq!(by_position, by_insertion);
    }

    /// Rebuilding the same recipe yields structurally equal trees with
    /// distinct identity tokens, and emission does not depend on identity.
    #[test]
    fn identity_does_not_leak_into_sql(recipe in arb_recipe()) {
        let a = build(&recipe);
        let b = build(&recipe);
        prop_assert_ne!(a.id(), b.id());
        let op_a = Emitter::deterministic().emit(&a, Cardinality::All).unwrap();
        let op_b = Emitter::deterministic().emit(&b, Cardinality::All).unwrap();
        prop_assert_eq!(op_a.sql, op_b.sql);
    }
}

/// Structural check kept outside proptest: `.all()` with the random id
/// generator still round-trips the same clauses, just with opaque names.
#[test]
fn random_ids_do_not_change_shape() {
    let q = query(&users())
        .filter(|b| Ok(b.col("id")?.gt(Expr::int(1))))
        .unwrap()
        .and_filter_equal(vec![("name", Value::Text("Jane".to_owned()))])
        .unwrap();
    let op = q.all().unwrap();
    assert!(op.sql.starts_with("SELECT users.*"));
    assert!(op.sql.contains("WHERE (users.id > 1) AND (users.name == :name)"));
}
