//! Fixtures for end-to-end tests: nodes are emitted as tables and evaluated
//! by the reference executor.

#![allow(dead_code)]

use strata_compile::{EmitOptions, OrderedNode, OrderingMode, UnorderedNode, ORDER_ID_COLUMN};
use strata_engine::Schema;
use strata_runtime::{Batch, Executor};
use strata_types::{DataType, Scalar};

/// name, age, score, tags: four rows with NULLs and empty arrays mixed in.
pub fn people() -> OrderedNode {
    let schema = Schema::from_fields([
        ("name", DataType::String),
        ("age", DataType::Int64),
        ("score", DataType::Float64),
        ("tags", DataType::Array(Box::new(DataType::String))),
    ])
    .unwrap();
    let tags = |items: &[&str]| Scalar::Array(items.iter().map(|s| Scalar::from(*s)).collect());
    OrderedNode::from_rows(
        schema,
        vec![
            vec![Scalar::from("ann"), Scalar::Int64(31), Scalar::Float64(1.5), tags(&["a", "b"])],
            vec![Scalar::from("bob"), Scalar::Null, Scalar::Float64(2.5), tags(&[])],
            vec![Scalar::from("cy"), Scalar::Int64(25), Scalar::Null, Scalar::Null],
            vec![Scalar::from("dee"), Scalar::Int64(31), Scalar::Float64(0.5), tags(&["c"])],
        ],
    )
    .unwrap()
}

/// Rows of `node` in logical order, with offsets in `strata_ordering_id`.
pub fn collect(node: &OrderedNode) -> Batch {
    let table = node
        .to_table(&EmitOptions::with_mode(OrderingMode::OffsetColumn))
        .unwrap();
    Executor::new()
        .execute(&table)
        .unwrap()
        .sorted_by(ORDER_ID_COLUMN)
        .unwrap()
}

/// Rows of `node` in no particular order.
pub fn collect_unordered(node: &UnorderedNode) -> Batch {
    let table = node.to_table(&EmitOptions::default()).unwrap();
    Executor::new().execute(&table).unwrap()
}

pub fn strings(values: &[&str]) -> Vec<Scalar> {
    values.iter().map(|s| Scalar::from(*s)).collect()
}

pub fn ints(values: &[Option<i64>]) -> Vec<Scalar> {
    values.iter().map(|v| Scalar::from(*v)).collect()
}

pub fn offsets(n: usize) -> Vec<Scalar> {
    (0..n as i64).map(Scalar::Int64).collect()
}
