mod common;

use common::{collect, ints, offsets, people};
use strata_compile::{RelationalNode, WindowOpOptions, ORDER_ID_COLUMN};
use strata_expr::{AggOp, Aggregation, Expression, ScalarOp, WindowSpec};
use strata_types::Scalar;

fn aggregations() -> Vec<(Aggregation, String)> {
    vec![
        (Aggregation::unary(AggOp::Sum, "score"), "total".to_string()),
        (Aggregation::nullary(AggOp::Size), "n".to_string()),
    ]
}

#[test]
fn test_grouped_aggregate_drops_null_keys() {
    let grouped = people()
        .to_unordered()
        .unwrap()
        .aggregate(&aggregations(), &["age".to_string()], true)
        .unwrap();
    assert_eq!(grouped.column_ids(), vec!["age", "total", "n"]);

    let batch = collect(&grouped);
    assert_eq!(batch.column("age").unwrap(), ints(&[Some(25), Some(31)]));
    // cy's only score is NULL, so the sum is zero.
    assert_eq!(
        batch.column("total").unwrap(),
        vec![Scalar::Float64(0.0), Scalar::Float64(2.0)]
    );
    assert_eq!(batch.column("n").unwrap(), ints(&[Some(1), Some(2)]));
    assert_eq!(batch.column(ORDER_ID_COLUMN).unwrap(), offsets(2));
}

#[test]
fn test_null_group_sorts_last() {
    let grouped = people()
        .to_unordered()
        .unwrap()
        .aggregate(&aggregations(), &["age".to_string()], false)
        .unwrap();
    let batch = collect(&grouped);
    assert_eq!(batch.column("age").unwrap(), ints(&[Some(25), Some(31), None]));
    assert_eq!(
        batch.column("total").unwrap(),
        vec![Scalar::Float64(0.0), Scalar::Float64(2.0), Scalar::Float64(2.5)]
    );
}

#[test]
fn test_scalar_aggregate_over_no_rows() {
    let none = people()
        .filter(&Expression::binary(
            ScalarOp::Gt,
            Expression::var("age"),
            Expression::lit(100i64),
        ))
        .unwrap();
    let counted = none
        .to_unordered()
        .unwrap()
        .aggregate(&[(Aggregation::nullary(AggOp::Size), "n".to_string())], &[], false)
        .unwrap();
    let batch = collect(&counted);
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(batch.column("n").unwrap(), ints(&[Some(0)]));
}

#[test]
fn test_row_count() {
    let count = people().to_unordered().unwrap().row_count().unwrap();
    assert_eq!(collect(&count).column("count").unwrap(), ints(&[Some(4)]));
}

#[test]
fn test_aggregate_then_window() {
    let grouped = people()
        .to_unordered()
        .unwrap()
        .aggregate(&aggregations(), &["age".to_string()], false)
        .unwrap();
    let shifted = grouped
        .project_window_op(
            "n",
            AggOp::Shift(1),
            &WindowSpec::unbound(),
            &WindowOpOptions::output("prev_n"),
        )
        .unwrap();
    assert_eq!(
        collect(&shifted).column("prev_n").unwrap(),
        ints(&[None, Some(1), Some(2)])
    );
}
