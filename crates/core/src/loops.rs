use crate::types::{LoopInfo, PairingGraph};

/// Loops of the primary (level 0) nesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopTree {
    /// Index 0 = external loop, then one loop per primary pair in opening order
    pub loops: Vec<LoopInfo>,
    /// closed_by[i] = loop closed by the primary pair opening at i
    closed_by: Vec<Option<usize>>,
}

impl LoopTree {
    /// Loop closed by the primary pair opening at `i`.
    pub fn closed_by(&self, i: usize) -> Option<&LoopInfo> {
        self.closed_by
            .get(i)
            .copied()
            .flatten()
            .map(|idx| &self.loops[idx])
    }

    pub fn external(&self) -> &LoopInfo {
        &self.loops[0]
    }
}

/// Decompose the primary nesting into loops.
///
/// Residues paired only at a crossing level are listed as unpaired in the
/// loop that contains them. A single stack of open loops is kept, so deep
/// stems need no recursion.
pub fn decompose(graph: &PairingGraph) -> LoopTree {
    let n = graph.n_bases;
    let mut loops = vec![LoopInfo {
        parent_pair: None,
        child_pairs: vec![],
        unpaired_bases: vec![],
    }];
    let mut closed_by = vec![None; n];
    let mut open: Vec<usize> = vec![0];

    for i in 0..n {
        let current = open.last().copied().unwrap_or(0);
        match graph.primary_partner(i) {
            Some(j) if i < j => {
                loops[current].child_pairs.push((i, j));
                closed_by[i] = Some(loops.len());
                open.push(loops.len());
                loops.push(LoopInfo {
                    parent_pair: Some((i, j)),
                    child_pairs: vec![],
                    unpaired_bases: vec![],
                });
            }
            Some(_) => {
                if open.len() > 1 {
                    open.pop();
                }
            }
            None => loops[current].unpaired_bases.push(i),
        }
    }

    LoopTree { loops, closed_by }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_hairpin_stem() {
        let tree = decompose(&parse("((...))").unwrap());
        assert_eq!(tree.loops.len(), 3);
        assert_eq!(tree.external().child_pairs, vec![(0, 6)]);
        let outer = tree.closed_by(0).unwrap();
        assert!(outer.is_stack());
        let inner = tree.closed_by(1).unwrap();
        assert!(inner.is_hairpin());
        assert_eq!(inner.unpaired_bases, vec![2, 3, 4]);
        assert!(tree.closed_by(2).is_none());
    }

    #[test]
    fn test_multiloop_and_tails() {
        let tree = decompose(&parse("..(.(..).(..).)..").unwrap());
        assert_eq!(tree.external().unpaired_bases, vec![0, 1, 15, 16]);
        let multi = tree.closed_by(2).unwrap();
        assert_eq!(multi.child_pairs, vec![(4, 7), (9, 12)]);
        assert_eq!(multi.unpaired_bases, vec![3, 8, 13]);
        assert!(!multi.is_stack());
    }

    #[test]
    fn test_crossing_pairs_are_unpaired_at_primary_level() {
        let tree = decompose(&parse("(([))]").unwrap());
        assert_eq!(tree.external().unpaired_bases, vec![5]);
        assert_eq!(tree.closed_by(1).unwrap().unpaired_bases, vec![2]);
    }

    #[test]
    fn test_empty() {
        let tree = decompose(&PairingGraph::unpaired(0));
        assert_eq!(tree.loops.len(), 1);
        assert!(tree.external().child_pairs.is_empty());
    }
}
