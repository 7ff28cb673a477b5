//! Property and document tests for the conflict merge
//!
//! These tests verify that merge:
//! - Is a left fold of pairwise merges
//! - Never loses a key present in any input mapping
//! - Gives later attribute values precedence when merging parsed documents

use pakbench::services::{StructuredTree, exml, merge};
use proptest::prelude::*;

fn tree_strategy() -> impl Strategy<Value = StructuredTree> {
    let leaf = "[a-z0-9]{0,4}".prop_map(StructuredTree::Scalar);
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(StructuredTree::Sequence),
            prop::collection::vec(("[a-d]", inner), 0..4).prop_map(|pairs| {
                StructuredTree::Mapping(pairs.into_iter().collect())
            }),
        ]
    })
}

fn mapping_strategy() -> impl Strategy<Value = StructuredTree> {
    prop::collection::vec(("[a-f]", tree_strategy()), 0..5)
        .prop_map(|pairs| StructuredTree::Mapping(pairs.into_iter().collect()))
}

proptest! {
    #[test]
    fn merge_is_a_left_fold(a in tree_strategy(), b in tree_strategy(), c in tree_strategy()) {
        let stepwise = merge(&[merge(&[a.clone(), b.clone()]), c.clone()]);
        prop_assert_eq!(stepwise, merge(&[a, b, c]));
    }

    #[test]
    fn merge_of_one_is_identity(a in tree_strategy()) {
        prop_assert_eq!(merge(std::slice::from_ref(&a)), a);
    }

    #[test]
    fn merged_mapping_keeps_every_key(a in mapping_strategy(), b in mapping_strategy()) {
        let merged = merge(&[a.clone(), b.clone()]);
        let merged_keys: Vec<&String> = merged.as_mapping().unwrap().keys().collect();

        // Keys of the first input keep their positions; new keys follow in order
        let mut expected: Vec<&String> = a.as_mapping().unwrap().keys().collect();
        for key in b.as_mapping().unwrap().keys() {
            if !expected.contains(&key) {
                expected.push(key);
            }
        }
        prop_assert_eq!(merged_keys, expected);
    }

    #[test]
    fn later_scalar_wins(a in mapping_strategy(), key in "[a-f]", value in "[A-Z]{1,3}") {
        let mut later = indexmap::IndexMap::new();
        later.insert(key.clone(), StructuredTree::Scalar(value.clone()));

        let merged = merge(&[a, StructuredTree::Mapping(later)]);
        prop_assert_eq!(merged.get(&key).and_then(StructuredTree::as_scalar), Some(value.as_str()));
    }
}

#[test]
fn test_merge_of_nothing_is_empty_mapping() {
    assert_eq!(merge(&[]), StructuredTree::empty_mapping());
}

#[test]
fn test_document_merge_three_way() {
    let base = exml::parse(
        r#"<?xml version="1.0" encoding="utf-8"?>
<Data template="GcWeapon">
	<Property name="Damage" value="10"/>
	<Property name="Range" value="5"/>
</Data>"#,
    )
    .unwrap();
    let damage = exml::parse(r#"<Data template="GcWeapon" tier="2"/>"#).unwrap();
    let extra = exml::parse(r#"<Data><Property name="Spread" value="1"/></Data>"#).unwrap();

    let merged = merge(&[base, damage, extra]);
    let data = merged.get("Data").unwrap();

    let attributes = data.get("$").unwrap();
    assert_eq!(
        attributes.get("template").and_then(StructuredTree::as_scalar),
        Some("GcWeapon")
    );
    assert_eq!(attributes.get("tier").and_then(StructuredTree::as_scalar), Some("2"));

    let names: Vec<&str> = data
        .get("Property")
        .and_then(StructuredTree::as_sequence)
        .unwrap()
        .iter()
        .map(|p| p.get("$").unwrap().get("name").unwrap().as_scalar().unwrap())
        .collect();
    assert_eq!(names, vec!["Damage", "Range", "Spread"]);

    // The merged tree serializes and parses back to itself
    let text = exml::serialize(&merged).unwrap();
    assert!(text.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
    assert_eq!(exml::parse(&text).unwrap(), merged);
}
