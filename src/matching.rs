//! Maximum-Weight Matching Computer
//!
//! The public face of the matching solver. Construct an instance either with a known
//! vertex count and maximum edge weight or empty, add vertices, assign edge weights any
//! number of times, then call [`MatchingComputer::compute_matching`] and read the partner
//! vector back out. The graph is complete; a weight of zero denotes a missing edge and
//! such edges never appear in the matching.
//!
//! The implementation runs in O(n^3) per `compute_matching` using the algorithm of
//! "An O(EV log V) Algorithm for Finding a Maximal Weighted Matching in General Graphs"
//! by Galil, Micali and Gabow (1986), modified to allow updates: adding j vertices and
//! changing weights incident on k vertices makes the next solve cost O((j+k) n^2).
//!
//! Among maximum-weight matchings no further guarantee is made, so callers express all
//! tie-breaking in the edge weights themselves. Two solves over identical weights return
//! identical vectors.
//!

use crate::blossom_graph::Graph;
use crate::util::*;
use crate::wide_uint::EdgeWeight;

pub struct MatchingComputer<W: EdgeWeight = u64> {
    graph: Graph<W>,
}

impl<W: EdgeWeight> MatchingComputer<W> {
    pub fn new() -> Self {
        Self { graph: Graph::new() }
    }

    /// Reserve for `vertex_num` vertices and declare the maximum edge weight that will
    /// ever be assigned. Vertices are still added individually.
    pub fn with_capacity(vertex_num: VertexNum, max_edge_weight: W) -> Self {
        assert!(max_edge_weight.has_headroom(), "max edge weight lacks the two spare high bits");
        Self {
            graph: Graph::with_capacity(vertex_num, max_edge_weight),
        }
    }

    pub fn size(&self) -> VertexNum {
        self.graph.size()
    }

    /// Add a vertex with the lowest unused index.
    #[allow(clippy::unnecessary_cast)]
    pub fn add_vertex(&mut self) {
        assert!(self.graph.size() <= MAX_PLAYERS as usize, "too many vertices");
        self.graph.add_vertex();
    }

    /// Set the weight of the edge between `vertex` and `neighbor`. Weight zero removes
    /// the edge.
    pub fn set_edge_weight(&mut self, vertex: VertexIndex, neighbor: VertexIndex, weight: W) {
        self.graph.set_edge_weight(vertex, neighbor, weight);
    }

    pub fn compute_matching(&mut self) {
        self.graph.compute_matching();
    }

    /// The partner vector: entry i holds the partner of vertex i, or i itself when i is
    /// unmatched. `compute_matching` must be called first if any update has been made.
    pub fn matching(&self) -> Vec<VertexIndex> {
        self.graph.matching()
    }
}

impl<W: EdgeWeight> Default for MatchingComputer<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::wide_uint::WideUint;
    use rand::{Rng, SeedableRng};

    fn solve(n: usize, edges: &[(usize, usize, u64)]) -> Vec<usize> {
        let mut computer = MatchingComputer::<u64>::new();
        for _ in 0..n {
            computer.add_vertex();
        }
        for &(u, v, w) in edges {
            computer.set_edge_weight(u, v, w);
        }
        computer.compute_matching();
        computer.matching()
    }

    fn matched_weight(matching: &[usize], weights: &[Vec<u64>]) -> u64 {
        let mut total = 0;
        for (vertex, &partner) in matching.iter().enumerate() {
            if partner > vertex {
                total += weights[vertex][partner];
            }
        }
        total
    }

    fn check_valid(matching: &[usize], weights: &[Vec<u64>]) {
        for (vertex, &partner) in matching.iter().enumerate() {
            assert_eq!(matching[partner], vertex, "partner vector must be an involution");
            if partner != vertex {
                assert!(weights[vertex][partner] > 0, "zero-weight edges never matched");
            }
        }
    }

    /// Exhaustive maximum over all matchings, for small n.
    fn brute_force(weights: &[Vec<u64>]) -> u64 {
        fn recurse(used: &mut [bool], weights: &[Vec<u64>]) -> u64 {
            let first = match used.iter().position(|&u| !u) {
                Some(first) => first,
                None => return 0,
            };
            used[first] = true;
            let mut best = recurse(used, weights);
            for second in first + 1..weights.len() {
                if !used[second] && weights[first][second] > 0 {
                    used[second] = true;
                    best = best.max(weights[first][second] + recurse(used, weights));
                    used[second] = false;
                }
            }
            used[first] = false;
            best
        }
        let mut used = vec![false; weights.len()];
        recurse(&mut used, weights)
    }

    #[test]
    fn matching_perfect_sanity_1() {
        // cargo test matching_perfect_sanity_1 -- --nocapture
        let matching = solve(
            4,
            &[(0, 1, 10), (2, 3, 10), (0, 2, 1), (1, 3, 1), (0, 3, 1), (1, 2, 1)],
        );
        assert_eq!(matching, vec![1, 0, 3, 2]);
    }

    #[test]
    fn matching_blossom_five_cycle_1() {
        // cargo test matching_blossom_five_cycle_1 -- --nocapture
        // an odd cycle with uniform weights stalls any non-blossom algorithm
        let matching = solve(5, &[(0, 1, 2), (1, 2, 2), (2, 3, 2), (3, 4, 2), (4, 0, 2)]);
        let mut weights = vec![vec![0; 5]; 5];
        for &(u, v, w) in &[(0usize, 1usize, 2u64), (1, 2, 2), (2, 3, 2), (3, 4, 2), (4, 0, 2)] {
            weights[u][v] = w;
            weights[v][u] = w;
        }
        check_valid(&matching, &weights);
        assert_eq!(matched_weight(&matching, &weights), 4);
        assert_eq!(matching.iter().enumerate().filter(|&(v, &p)| v == p).count(), 1);
    }

    #[test]
    fn matching_empty_weights_1() {
        // cargo test matching_empty_weights_1 -- --nocapture
        let matching = solve(4, &[]);
        assert_eq!(matching, vec![0, 1, 2, 3]);
    }

    #[test]
    fn matching_reruns_are_identical_1() {
        // cargo test matching_reruns_are_identical_1 -- --nocapture
        let mut computer = MatchingComputer::<u64>::new();
        for _ in 0..6 {
            computer.add_vertex();
        }
        for (u, v, w) in [(0, 1, 3), (1, 2, 5), (2, 3, 3), (3, 4, 5), (4, 5, 3), (5, 0, 5)] {
            computer.set_edge_weight(u, v, w);
        }
        computer.compute_matching();
        let first = computer.matching();
        computer.compute_matching();
        assert_eq!(first, computer.matching());
    }

    #[test]
    fn matching_matches_brute_force_1() {
        // cargo test matching_matches_brute_force_1 -- --nocapture
        let mut rng = DeterministicRng::seed_from_u64(0x5b1055);
        for round in 0..200 {
            let n = 2 + round % 7;
            let mut weights = vec![vec![0u64; n]; n];
            let mut computer = MatchingComputer::<u64>::new();
            for _ in 0..n {
                computer.add_vertex();
            }
            for u in 0..n {
                for v in u + 1..n {
                    let weight = rng.gen_range(0..=6);
                    weights[u][v] = weight;
                    weights[v][u] = weight;
                    computer.set_edge_weight(u, v, weight);
                }
            }
            computer.compute_matching();
            let matching = computer.matching();
            check_valid(&matching, &weights);
            assert_eq!(
                matched_weight(&matching, &weights),
                brute_force(&weights),
                "weights: {:?}",
                weights
            );
        }
    }

    #[test]
    fn matching_incremental_update_1() {
        // cargo test matching_incremental_update_1 -- --nocapture
        let mut rng = DeterministicRng::seed_from_u64(0xd1ce);
        for _ in 0..100 {
            let n = 5 + (rng.gen_range(0..4) as usize);
            let mut weights = vec![vec![0u64; n]; n];
            let mut computer = MatchingComputer::<u64>::new();
            for _ in 0..n {
                computer.add_vertex();
            }
            for u in 0..n {
                for v in u + 1..n {
                    let weight = rng.gen_range(0..=9);
                    weights[u][v] = weight;
                    weights[v][u] = weight;
                    computer.set_edge_weight(u, v, weight);
                }
            }
            computer.compute_matching();
            // perturb the edges of two vertices and re-solve on the same instance
            for _ in 0..2 {
                let vertex = rng.gen_range(0..n);
                for neighbor in 0..n {
                    if neighbor != vertex {
                        let weight = rng.gen_range(0..=9);
                        weights[vertex][neighbor] = weight;
                        weights[neighbor][vertex] = weight;
                        computer.set_edge_weight(vertex, neighbor, weight);
                    }
                }
            }
            computer.compute_matching();
            let matching = computer.matching();
            check_valid(&matching, &weights);
            assert_eq!(matched_weight(&matching, &weights), brute_force(&weights));
        }
    }

    #[test]
    fn matching_vertex_insertion_after_solve_1() {
        // cargo test matching_vertex_insertion_after_solve_1 -- --nocapture
        let mut computer = MatchingComputer::<u64>::new();
        for _ in 0..2 {
            computer.add_vertex();
        }
        computer.set_edge_weight(0, 1, 4);
        computer.compute_matching();
        assert_eq!(computer.matching(), vec![1, 0]);
        computer.add_vertex();
        computer.add_vertex();
        computer.set_edge_weight(1, 2, 9);
        computer.set_edge_weight(0, 3, 9);
        computer.compute_matching();
        assert_eq!(computer.matching(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn matching_wide_uint_weights_1() {
        // cargo test matching_wide_uint_weights_1 -- --nocapture
        // the same instance solved over u64 and over very wide weights must agree
        let edges = [(0, 1, 3u64), (1, 2, 5), (2, 3, 3), (3, 4, 5), (4, 5, 3), (5, 0, 5), (0, 3, 1)];
        let narrow = solve(6, &edges.iter().map(|&(u, v, w)| (u, v, w)).collect::<Vec<_>>());
        let mut computer = MatchingComputer::<WideUint>::new();
        for _ in 0..6 {
            computer.add_vertex();
        }
        for &(u, v, w) in edges.iter() {
            let mut weight = WideUint::from(w);
            weight.shift_grow(150);
            computer.set_edge_weight(u, v, weight);
        }
        computer.compute_matching();
        assert_eq!(computer.matching(), narrow);
    }
}
