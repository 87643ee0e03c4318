use crate::models::{CatalogAsset, ColumnSpec};
use std::collections::HashMap;

/// Anything joined by display name.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for CatalogAsset {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for ColumnSpec {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Join key: the lower-cased name.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
}

/// One source entity joined to one target entity.
#[derive(Debug)]
pub struct MatchedPair<'a, T> {
    pub source: &'a T,
    pub target: &'a T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Several entities on one side normalize to the same key. Only the last one
/// (`kept`) takes part in the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollision {
    pub side: Side,
    pub key: String,
    pub dropped: Vec<String>,
    pub kept: String,
}

#[derive(Debug)]
pub struct MatchOutcome<'a, T> {
    pub pairs: Vec<MatchedPair<'a, T>>,
    pub unmatched_left: Vec<&'a T>,
    pub unmatched_right: Vec<&'a T>,
    pub collisions: Vec<NameCollision>,
}

/// Keys in first-seen order, each mapped to the index of its last entity.
struct NameIndex {
    keys: Vec<String>,
    last: HashMap<String, usize>,
    collisions: Vec<NameCollision>,
}

impl NameIndex {
    fn build<T: Named>(side: Side, entities: &[T]) -> Self {
        let mut keys = Vec::new();
        let mut positions: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, entity) in entities.iter().enumerate() {
            let key = normalize(entity.name());
            let slot = positions.entry(key.clone()).or_default();
            if slot.is_empty() {
                keys.push(key);
            }
            slot.push(index);
        }

        let mut last = HashMap::with_capacity(positions.len());
        let mut collisions = Vec::new();
        for key in &keys {
            let indices = &positions[key];
            let kept = indices[indices.len() - 1];
            if indices.len() > 1 {
                collisions.push(NameCollision {
                    side,
                    key: key.clone(),
                    dropped: indices[..indices.len() - 1]
                        .iter()
                        .map(|&i| entities[i].name().to_string())
                        .collect(),
                    kept: entities[kept].name().to_string(),
                });
            }
            last.insert(key.clone(), kept);
        }

        Self {
            keys,
            last,
            collisions,
        }
    }
}

/// Joins two collections on case-insensitive name equality.
///
/// Pairs come out in the left side's order. Entities without a counterpart
/// are returned as unmatched on their side and never block the matched ones.
/// When one side has several entities with the same normalized name the
/// last one wins; the others are reported in `collisions` rather than
/// silently disappearing.
pub fn match_by_name<'a, T: Named>(left: &'a [T], right: &'a [T]) -> MatchOutcome<'a, T> {
    let left_index = NameIndex::build(Side::Left, left);
    let right_index = NameIndex::build(Side::Right, right);

    let mut pairs = Vec::new();
    let mut unmatched_left = Vec::new();
    for key in &left_index.keys {
        let source = &left[left_index.last[key]];
        match right_index.last.get(key) {
            Some(&target) => pairs.push(MatchedPair {
                source,
                target: &right[target],
            }),
            None => unmatched_left.push(source),
        }
    }

    let unmatched_right = right_index
        .keys
        .iter()
        .filter(|key| !left_index.last.contains_key(*key))
        .map(|key| &right[right_index.last[key]])
        .collect();

    let mut collisions = left_index.collisions;
    collisions.extend(right_index.collisions);

    MatchOutcome {
        pairs,
        unmatched_left,
        unmatched_right,
        collisions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Item(&'static str);

    impl Named for Item {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn names<'a>(items: &[&'a Item]) -> Vec<&'a str> {
        items.iter().map(|item| item.0).collect()
    }

    #[test]
    fn joins_case_insensitively() {
        let left = [Item("Orders"), Item("Users")];
        let right = [Item("orders"), Item("ADDRESSES")];
        let outcome = match_by_name(&left, &right);

        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs[0].source.0, "Orders");
        assert_eq!(outcome.pairs[0].target.0, "orders");
        assert_eq!(names(&outcome.unmatched_left), vec!["Users"]);
        assert_eq!(names(&outcome.unmatched_right), vec!["ADDRESSES"]);
        assert!(outcome.collisions.is_empty());
    }

    #[test]
    fn pairs_follow_left_order() {
        let left = [Item("c"), Item("a"), Item("b")];
        let right = [Item("A"), Item("B"), Item("C")];
        let outcome = match_by_name(&left, &right);
        let sources: Vec<_> = outcome.pairs.iter().map(|p| p.source.0).collect();
        assert_eq!(sources, vec!["c", "a", "b"]);
    }

    #[test]
    fn duplicate_keys_keep_last_and_report_collision() {
        let left = [Item("Orders"), Item("ORDERS")];
        let right = [Item("orders")];
        let outcome = match_by_name(&left, &right);

        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs[0].source.0, "ORDERS");
        assert_eq!(
            outcome.collisions,
            vec![NameCollision {
                side: Side::Left,
                key: "orders".into(),
                dropped: vec!["Orders".into()],
                kept: "ORDERS".into(),
            }]
        );
    }

    #[test]
    fn empty_sides() {
        let left: [Item; 0] = [];
        let right = [Item("x")];
        let outcome = match_by_name(&left, &right);
        assert!(outcome.pairs.is_empty());
        assert_eq!(names(&outcome.unmatched_right), vec!["x"]);
    }
}
