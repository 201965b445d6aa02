//! Column equivalence classes.

use std::collections::HashMap;

use joinplan_proto::ColumnRef;

/// Union-find over columns proven equal by the query's predicates.
///
/// A column is always equivalent to itself; any other pair must have been
/// declared, directly or transitively.
#[derive(Debug, Clone, Default)]
pub struct EquivalenceFinder {
    parent: HashMap<ColumnRef, ColumnRef>,
}

impl EquivalenceFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from declared pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = &'a (ColumnRef, ColumnRef)>) -> Self {
        let mut finder = Self::new();
        for (a, b) in pairs {
            finder.mark_equivalent(a.clone(), b.clone());
        }
        finder
    }

    /// Declare `a` and `b` equal.
    pub fn mark_equivalent(&mut self, a: ColumnRef, b: ColumnRef) {
        let ra = self.find(&a).clone();
        let rb = self.find(&b).clone();
        if ra != rb {
            // Attach the larger root under the smaller so the result does not
            // depend on declaration order.
            if ra < rb {
                self.parent.insert(rb, ra);
            } else {
                self.parent.insert(ra, rb);
            }
        }
    }

    fn find<'a>(&'a self, column: &'a ColumnRef) -> &'a ColumnRef {
        let mut current = column;
        while let Some(next) = self.parent.get(current) {
            current = next;
        }
        current
    }

    /// Whether the two columns are known to be equal.
    pub fn are_equivalent(&self, a: &ColumnRef, b: &ColumnRef) -> bool {
        a == b || self.find(a) == self.find(b)
    }

    /// All columns declared equivalent to `column`, excluding itself.
    pub fn equivalents_of(&self, column: &ColumnRef) -> Vec<ColumnRef> {
        let root = self.find(column);
        let mut out: Vec<ColumnRef> = self
            .parent
            .keys()
            .chain(self.parent.values())
            .filter(|c| *c != column && self.find(c) == root)
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(t: &str, c: &str) -> ColumnRef {
        ColumnRef::new(t, c)
    }

    #[test]
    fn test_reflexive() {
        let finder = EquivalenceFinder::new();
        assert!(finder.are_equivalent(&col("a", "x"), &col("a", "x")));
        assert!(!finder.are_equivalent(&col("a", "x"), &col("b", "x")));
    }

    #[test]
    fn test_transitive() {
        let pairs = vec![
            (col("a", "x"), col("b", "y")),
            (col("b", "y"), col("c", "z")),
        ];
        let finder = EquivalenceFinder::from_pairs(&pairs);
        assert!(finder.are_equivalent(&col("a", "x"), &col("c", "z")));
        assert!(finder.are_equivalent(&col("c", "z"), &col("a", "x")));
        assert!(!finder.are_equivalent(&col("a", "x"), &col("d", "w")));
    }

    #[test]
    fn test_equivalents_of() {
        let pairs = vec![
            (col("a", "x"), col("b", "y")),
            (col("c", "z"), col("b", "y")),
            (col("d", "w"), col("e", "v")),
        ];
        let finder = EquivalenceFinder::from_pairs(&pairs);
        assert_eq!(
            finder.equivalents_of(&col("b", "y")),
            vec![col("a", "x"), col("c", "z")]
        );
    }
}
