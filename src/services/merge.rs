//! Conflict resolver: deep merge of parsed text entries.

use indexmap::IndexMap;

/// Parsed content of a text entry.
///
/// Mapping keys keep document order so that a merged tree serializes in the
/// same order as its sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredTree {
    Scalar(String),
    Sequence(Vec<StructuredTree>),
    Mapping(IndexMap<String, StructuredTree>),
}

impl StructuredTree {
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    pub fn empty_mapping() -> Self {
        Self::Mapping(IndexMap::new())
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[StructuredTree]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, StructuredTree>> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a mapping key.
    pub fn get(&self, key: &str) -> Option<&StructuredTree> {
        self.as_mapping()?.get(key)
    }

    /// Merge `other` into `self`.
    ///
    /// - mapping into mapping: recurse key by key, new keys are appended
    /// - sequence into sequence: concatenate
    /// - anything else: `other` replaces `self`
    pub fn merge_from(&mut self, other: &StructuredTree) {
        match (self, other) {
            (Self::Mapping(left), Self::Mapping(right)) => {
                for (key, value) in right {
                    match left.get_mut(key) {
                        Some(existing) => existing.merge_from(value),
                        None => {
                            left.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            (Self::Sequence(left), Self::Sequence(right)) => {
                left.extend(right.iter().cloned());
            }
            (slot, value) => *slot = value.clone(),
        }
    }
}

/// Fold `trees` left to right with [`StructuredTree::merge_from`].
///
/// Inputs are never modified. An empty slice yields an empty mapping.
pub fn merge(trees: &[StructuredTree]) -> StructuredTree {
    let Some((first, rest)) = trees.split_first() else {
        return StructuredTree::empty_mapping();
    };

    let mut merged = first.clone();
    for tree in rest {
        merged.merge_from(tree);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: Vec<(&str, StructuredTree)>) -> StructuredTree {
        StructuredTree::Mapping(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn seq(items: Vec<StructuredTree>) -> StructuredTree {
        StructuredTree::Sequence(items)
    }

    fn s(value: &str) -> StructuredTree {
        StructuredTree::scalar(value)
    }

    #[test]
    fn test_later_scalar_wins() {
        let a = mapping(vec![("speed", s("1")), ("name", s("a"))]);
        let b = mapping(vec![("speed", s("2"))]);

        let merged = merge(&[a, b]);
        assert_eq!(merged.get("speed"), Some(&s("2")));
        assert_eq!(merged.get("name"), Some(&s("a")));
    }

    #[test]
    fn test_sequences_concatenate() {
        let a = mapping(vec![("items", seq(vec![s("1")]))]);
        let b = mapping(vec![("items", seq(vec![s("2"), s("3")]))]);

        let merged = merge(&[a, b]);
        assert_eq!(merged.get("items"), Some(&seq(vec![s("1"), s("2"), s("3")])));
    }

    #[test]
    fn test_nested_mappings_recurse() {
        let a = mapping(vec![("outer", mapping(vec![("x", s("1")), ("y", s("1"))]))]);
        let b = mapping(vec![("outer", mapping(vec![("y", s("2")), ("z", s("2"))]))]);

        let merged = merge(&[a, b]);
        let outer = merged.get("outer").unwrap();
        let keys: Vec<_> = outer.as_mapping().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["x", "y", "z"]);
        assert_eq!(outer.get("y"), Some(&s("2")));
    }

    #[test]
    fn test_mismatched_kinds_take_later() {
        let a = mapping(vec![("v", seq(vec![s("1")]))]);
        let b = mapping(vec![("v", s("flat"))]);

        assert_eq!(merge(&[a, b]).get("v"), Some(&s("flat")));
    }

    #[test]
    fn test_inputs_untouched() {
        let a = mapping(vec![("items", seq(vec![s("1")]))]);
        let b = mapping(vec![("items", seq(vec![s("2")]))]);
        let before = vec![a, b];
        let trees = before.clone();

        let _ = merge(&trees);
        assert_eq!(trees, before);
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(merge(&[]), StructuredTree::empty_mapping());
        assert_eq!(merge(&[s("only")]), s("only"));
    }
}
