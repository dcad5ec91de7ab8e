//! Row order survives sorting, filtering and column rewrites.

mod common;

use common::{collect, ints, offsets, people, strings};
use strata_compile::{EmitOptions, OrderedNode, OrderingMode, RelationalNode, ORDER_ID_COLUMN};
use strata_engine::Schema;
use strata_expr::{Expression, OrderingDirection, OrderingExpression, ScalarOp};
use strata_runtime::Executor;
use strata_types::{DataType, Scalar};

fn older_than(age: i64) -> Expression {
    Expression::binary(ScalarOp::Gt, Expression::var("age"), Expression::lit(age))
}

#[test]
fn test_rows_keep_input_order() {
    let batch = collect(&people());
    assert_eq!(batch.column("name").unwrap(), strings(&["ann", "bob", "cy", "dee"]));
    assert_eq!(batch.column(ORDER_ID_COLUMN).unwrap(), offsets(4));
}

#[test]
fn test_order_by_places_nulls() {
    let by_age = people().order_by(vec![OrderingExpression::asc_column("age")]).unwrap();
    assert_eq!(
        collect(&by_age).column("name").unwrap(),
        strings(&["cy", "ann", "dee", "bob"])
    );

    let nulls_first = people()
        .order_by(vec![OrderingExpression::new(
            Expression::var("age"),
            OrderingDirection::Desc,
            false,
        )])
        .unwrap();
    assert_eq!(
        collect(&nulls_first).column("name").unwrap(),
        strings(&["bob", "ann", "dee", "cy"])
    );
}

#[test]
fn test_sort_is_stable() {
    let by_age = people()
        .order_by(vec![OrderingExpression::desc(Expression::var("age"))])
        .unwrap();
    // ann and dee tie on age and keep their relative order.
    assert_eq!(
        collect(&by_age).column("name").unwrap(),
        strings(&["ann", "dee", "cy", "bob"])
    );
}

#[test]
fn test_reversed() {
    let reversed = people().reversed().unwrap();
    assert_eq!(
        collect(&reversed).column("name").unwrap(),
        strings(&["dee", "cy", "bob", "ann"])
    );
}

#[test]
fn test_filter_renumbers_offsets() {
    let filtered = people().filter(&older_than(26)).unwrap();
    let batch = collect(&filtered);
    assert_eq!(batch.column("name").unwrap(), strings(&["ann", "dee"]));
    assert_eq!(batch.column(ORDER_ID_COLUMN).unwrap(), offsets(2));

    let twice = filtered
        .filter(&Expression::binary(
            ScalarOp::Ne,
            Expression::var("name"),
            Expression::lit("ann"),
        ))
        .unwrap();
    assert_eq!(collect(&twice).column("name").unwrap(), strings(&["dee"]));
}

#[test]
fn test_overwriting_sort_column_keeps_order() {
    let by_age = people().order_by(vec![OrderingExpression::asc_column("age")]).unwrap();
    let blanked = by_age
        .projection(&[
            (Expression::var("name"), "name".to_string()),
            (Expression::lit(0i64), "age".to_string()),
        ])
        .unwrap();
    let batch = collect(&blanked);
    assert_eq!(batch.column("name").unwrap(), strings(&["cy", "ann", "dee", "bob"]));
    assert_eq!(batch.column("age").unwrap(), ints(&[Some(0); 4]));
}

#[test]
fn test_dropping_sort_column_keeps_order() {
    let by_name = people()
        .order_by(vec![OrderingExpression::desc(Expression::var("name"))])
        .unwrap();
    let ages = by_name
        .projection(&[(Expression::var("age"), "age".to_string())])
        .unwrap();
    assert_eq!(ages.column_ids(), vec!["age"]);
    assert_eq!(
        collect(&ages).column("age").unwrap(),
        ints(&[Some(31), Some(25), None, Some(31)])
    );
}

#[test]
fn test_reprojection_keeps_order() {
    let by_age = people()
        .filter(&older_than(20))
        .unwrap()
        .order_by(vec![OrderingExpression::desc(Expression::var("score"))])
        .unwrap();
    let reprojected = by_age.reproject_to_table().unwrap();
    assert!(reprojected.core().predicates().is_empty());
    assert_eq!(
        collect(&reprojected).column("name").unwrap(),
        collect(&by_age).column("name").unwrap()
    );
    assert_eq!(
        collect(&by_age).column("name").unwrap(),
        strings(&["ann", "dee", "cy"])
    );
}

#[test]
fn test_promote_offsets_after_filter() {
    let promoted = people()
        .reversed()
        .unwrap()
        .filter(&older_than(26))
        .unwrap()
        .promote_offsets("pos")
        .unwrap();
    let batch = collect(&promoted);
    assert_eq!(batch.column("name").unwrap(), strings(&["dee", "ann"]));
    assert_eq!(batch.column("pos").unwrap(), offsets(2));
}

#[test]
fn test_string_encoding_sorts_like_offsets() {
    let n = 10_000i64;
    let schema = Schema::from_fields([("v", DataType::Int64)]).unwrap();
    let rows = (0..n).map(|i| vec![Scalar::Int64((i * 7919) % n)]).collect();
    let node = OrderedNode::from_rows(schema, rows)
        .unwrap()
        .order_by(vec![OrderingExpression::desc(Expression::var("v"))])
        .unwrap();

    let table = node
        .to_table(&EmitOptions::with_mode(OrderingMode::StringEncoded).with_order_col_name("key"))
        .unwrap();
    let batch = Executor::new().execute(&table).unwrap();
    let mut rows: Vec<(String, i64)> = batch
        .rows
        .iter()
        .map(|row| match (&row[1], &row[0]) {
            (Scalar::String(key), Scalar::Int64(v)) => (key.clone(), *v),
            other => panic!("unexpected row {:?}", other),
        })
        .collect();
    assert!(rows.iter().all(|(key, _)| key.len() == 19));
    rows.sort();
    let values: Vec<i64> = rows.iter().map(|(_, v)| *v).collect();
    let expected: Vec<i64> = (0..n).rev().collect();
    assert_eq!(values, expected);
}

#[test]
fn test_string_encoding_reuses_integer_ids() {
    let filtered = people().filter(&older_than(26)).unwrap();
    let table = filtered
        .to_table(&EmitOptions::with_mode(OrderingMode::StringEncoded))
        .unwrap();
    let batch = Executor::new().execute(&table).unwrap();
    assert_eq!(
        batch.column(ORDER_ID_COLUMN).unwrap(),
        strings(&["0000000000000000000", "0000000000000000003"])
    );
}
