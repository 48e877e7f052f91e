use std::collections::BTreeMap;

/// Union-find with path compression (halving).
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Smaller root wins so component roots do not depend on edge order.
            let (keep, drop) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[drop] = keep;
        }
    }
}

/// Connected components of an undirected graph on `n` nodes with at least
/// `min_size` members. Members are sorted and components are ordered by
/// their smallest member.
pub fn connected_components(
    n: usize,
    edges: &[(usize, usize)],
    min_size: usize,
) -> Vec<Vec<usize>> {
    let mut uf = UnionFind::new(n);
    for &(a, b) in edges {
        uf.union(a, b);
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        let root = uf.find(i);
        groups.entry(root).or_default().push(i);
    }

    let mut comps: Vec<Vec<usize>> = groups
        .into_values()
        .filter(|members| members.len() >= min_size)
        .collect();
    comps.sort_by_key(|members| members[0]);
    comps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_are_transitive() {
        let comps = connected_components(4, &[(0, 1), (1, 2)], 2);
        assert_eq!(comps, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn singletons_filtered() {
        let comps = connected_components(3, &[], 2);
        assert!(comps.is_empty());
        let all = connected_components(3, &[], 1);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn ordered_by_smallest_member() {
        let comps = connected_components(6, &[(4, 5), (3, 0)], 2);
        assert_eq!(comps, vec![vec![0, 3], vec![4, 5]]);
    }

    #[test]
    fn find_compresses() {
        let mut uf = UnionFind::new(4);
        uf.union(3, 2);
        uf.union(2, 1);
        assert_eq!(uf.find(3), uf.find(1));
        assert_eq!(uf.find(3), 1);
    }
}
