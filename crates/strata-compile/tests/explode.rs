mod common;

use common::{collect, collect_unordered, offsets, people, strings};
use strata_compile::{RelationalNode, ORDER_ID_COLUMN};
use strata_types::Scalar;

fn tag(value: Option<&str>) -> Scalar {
    Scalar::from(value)
}

#[test]
fn test_explode_keeps_row_order() {
    let exploded = people().explode(&["tags".to_string()]).unwrap();
    assert_eq!(exploded.column_ids(), vec!["name", "age", "score", "tags"]);

    let batch = collect(&exploded);
    assert_eq!(
        batch.column("name").unwrap(),
        strings(&["ann", "ann", "bob", "cy", "dee"])
    );
    // Empty and NULL arrays each leave a single NULL row.
    assert_eq!(
        batch.column("tags").unwrap(),
        vec![tag(Some("a")), tag(Some("b")), tag(None), tag(None), tag(Some("c"))]
    );
    assert_eq!(batch.column(ORDER_ID_COLUMN).unwrap(), offsets(5));
}

#[test]
fn test_explode_after_reverse() {
    let exploded = people()
        .reversed()
        .unwrap()
        .explode(&["tags".to_string()])
        .unwrap();
    let batch = collect(&exploded);
    assert_eq!(
        batch.column("name").unwrap(),
        strings(&["dee", "cy", "bob", "ann", "ann"])
    );
    // Positions within one source row stay ascending.
    assert_eq!(
        batch.column("tags").unwrap(),
        vec![tag(Some("c")), tag(None), tag(None), tag(Some("a")), tag(Some("b"))]
    );
}

#[test]
fn test_explode_unknown_column() {
    assert!(people().explode(&["missing".to_string()]).is_err());
    assert!(people()
        .to_unordered()
        .unwrap()
        .explode(&["missing".to_string()])
        .is_err());
}

#[test]
fn test_unordered_explode() {
    let exploded = people()
        .to_unordered()
        .unwrap()
        .explode(&["tags".to_string()])
        .unwrap();
    let batch = collect_unordered(&exploded);
    let names = batch.column("name").unwrap();
    let tags = batch.column("tags").unwrap();
    let mut pairs: Vec<String> = names
        .iter()
        .zip(tags.iter())
        .map(|(name, tag)| format!("{}:{}", name, tag))
        .collect();
    pairs.sort();
    assert_eq!(pairs.len(), 5);
    assert_eq!(pairs[0], format!("{}:{}", Scalar::from("ann"), Scalar::from("a")));
    assert_eq!(pairs[4], format!("{}:{}", Scalar::from("dee"), Scalar::from("c")));
}
