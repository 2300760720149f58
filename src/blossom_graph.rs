//! Blossom Graph
//!
//! The internals of the maximum-weight matching solver: a complete graph whose vertices
//! carry dual variables, organized into a forest of blossoms following the O(V^3)
//! algorithm of Galil, Micali and Gabow. One *augmentation phase* grows alternating trees
//! out of the exposed root blossoms, adjusts the duals by the largest step that keeps every
//! edge resistance non-negative, and ends by augmenting the matching, so each phase leaves
//! one or two fewer non-free, non-zero vertices.
//!
//! Blossom nodes and root blossoms live in [`IterablePool`] arenas whose lifetime is the
//! graph's; all links are plain indices. A blossom is either a `Leaf` wrapping one vertex
//! or a `Composite` holding an odd cycle of sub-blossoms, and the two cases are told apart
//! by ordinary pattern matching.
//!
//! Edge weights are stored doubled so that half-integral dual updates stay integral. The
//! *resistance* of an edge (u,v) in different root blossoms is
//! `dual(u) + dual(v) - stored_weight(u,v)`; every operation here preserves its
//! non-negativity.
//!

use std::collections::VecDeque;

use derivative::Derivative;

use crate::pool::IterablePool;
use crate::util::*;
use crate::wide_uint::EdgeWeight;

/// Augmentation-phase label of a root blossom. A root is `Zero` iff it is exposed and its
/// base has dual variable zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Outer,
    Zero,
    Inner,
    Free,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Vertex<W> {
    /// the weights of the edges to the other vertices, indexed by vertex index; stored
    /// doubled, weight zero denotes a missing edge
    #[derivative(Debug = "ignore")]
    pub edge_weights: Vec<W>,
    pub dual_variable: W,
    /// if this vertex is not in an outer root blossom, the minimum resistance of edges
    /// to outer vertices; only valid during augmentation
    pub min_outer_edge_resistance: W,
    /// the outer endpoint witnessing `min_outer_edge_resistance`; only valid during
    /// augmentation
    pub min_outer_edge: Option<VertexIndex>,
    /// the leaf blossom node wrapping this vertex
    pub blossom: BlossomIndex,
    /// link of the intrusive vertex list threaded through each blossom
    pub next_vertex: Option<VertexIndex>,
}

#[derive(Debug)]
pub enum BlossomKind<W> {
    Leaf {
        vertex: VertexIndex,
    },
    Composite {
        /// always even and non-negative
        dual_variable: W,
        /// any of the sub-blossoms; [`Graph::set_pointers_from_ancestor`] repoints it at
        /// the child on the path to a chosen vertex
        subblossom: BlossomIndex,
    },
}

/// A blossom or sub-blossom. Sibling fields are only meaningful while the node is a child
/// of a composite.
#[derive(Debug)]
pub struct BlossomNode<W> {
    pub root: RootIndex,
    pub parent: Option<BlossomIndex>,
    /// head of the linked list of the vertices contained in this blossom
    pub vertex_list_head: VertexIndex,
    /// tail of the linked list of the vertices contained in this blossom
    pub vertex_list_tail: VertexIndex,
    /// the vertex in this sub-blossom linking it to the previous sibling
    pub vertex_to_previous_sibling: VertexIndex,
    /// the vertex in this sub-blossom linking it to the next sibling
    pub vertex_to_next_sibling: VertexIndex,
    pub next_blossom: BlossomIndex,
    pub previous_blossom: BlossomIndex,
    pub kind: BlossomKind<W>,
}

/// The extra data of a top-level blossom.
#[derive(Debug)]
pub struct RootBlossom<W> {
    /// for an outer root, the vertex of this root on the minimum edge toward every other
    /// outer root, indexed by the other root's base vertex; only valid during augmentation
    pub min_outer_edges: Vec<Option<VertexIndex>>,
    /// for an outer root, the minimum resistance toward any other outer root; only valid
    /// during augmentation
    pub min_outer_edge_resistance: W,
    pub root_child: BlossomIndex,
    /// the one vertex exposed to the outside matching
    pub base_vertex: VertexIndex,
    /// the vertex in another root blossom that `base_vertex` is matched to
    pub base_vertex_match: Option<VertexIndex>,
    pub label: Label,
    /// for an inner root, the vertex in another blossom used to label this one
    pub labeling_vertex: Option<VertexIndex>,
    /// for an inner root, the vertex in this blossom used to label it
    pub labeled_vertex: Option<VertexIndex>,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Graph<W> {
    #[derivative(Debug = "ignore")]
    pub vertices: Vec<Vertex<W>>,
    pub blossoms: IterablePool<BlossomNode<W>>,
    pub roots: IterablePool<RootBlossom<W>>,
    /// the maximum stored (doubled) edge weight seen so far
    pub max_edge_weight: W,
}

impl<W: EdgeWeight> Graph<W> {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            blossoms: IterablePool::new(),
            roots: IterablePool::new(),
            max_edge_weight: W::default(),
        }
    }

    pub fn with_capacity(vertex_num: VertexNum, max_edge_weight: W) -> Self {
        // doubling by addition lets dynamically-sized weights widen instead of truncate
        let mut stored_max = max_edge_weight.clone();
        stored_max += &max_edge_weight;
        let mut graph = Self {
            vertices: Vec::with_capacity(vertex_num),
            // at most n leaves plus n/2 composites ever exist
            blossoms: IterablePool::with_capacity(vertex_num + vertex_num / 2),
            roots: IterablePool::with_capacity(vertex_num),
            max_edge_weight: W::default(),
        };
        graph.max_edge_weight = stored_max;
        graph
    }

    pub fn size(&self) -> VertexNum {
        self.vertices.len()
    }

    /// Add a vertex with the lowest unused index, as its own root blossom.
    pub fn add_vertex(&mut self) {
        let vertex_index = self.vertices.len();
        for vertex in self.vertices.iter_mut() {
            vertex.edge_weights.push(W::default());
        }
        for root_index in self.roots.collect_indices() {
            self.roots[root_index].min_outer_edges.push(None);
        }
        let blossom = self.blossoms.insert(BlossomNode {
            root: 0,
            parent: None,
            vertex_list_head: vertex_index,
            vertex_list_tail: vertex_index,
            vertex_to_previous_sibling: vertex_index,
            vertex_to_next_sibling: vertex_index,
            next_blossom: 0,
            previous_blossom: 0,
            kind: BlossomKind::Leaf { vertex: vertex_index },
        });
        self.blossoms[blossom].next_blossom = blossom;
        self.blossoms[blossom].previous_blossom = blossom;
        self.vertices.push(Vertex {
            edge_weights: vec![W::default(); vertex_index + 1],
            dual_variable: W::default(),
            min_outer_edge_resistance: W::default(),
            min_outer_edge: None,
            blossom,
            next_vertex: None,
        });
        let root = self.roots.insert(RootBlossom {
            min_outer_edges: vec![None; vertex_index + 1],
            min_outer_edge_resistance: W::default(),
            root_child: blossom,
            base_vertex: vertex_index,
            base_vertex_match: None,
            label: Label::Zero,
            labeling_vertex: None,
            labeled_vertex: None,
        });
        self.blossoms[blossom].root = root;
    }

    /// Set the weight of the edge between the two vertices. Weight zero is a non-edge.
    /// After calls touching at most k distinct first arguments, the next
    /// `compute_matching` takes O(k n^2) time.
    pub fn set_edge_weight(&mut self, modified_vertex: VertexIndex, neighbor: VertexIndex, weight: W) {
        assert_ne!(modified_vertex, neighbor, "no self edges");
        assert!(modified_vertex < self.vertices.len(), "vertex {} out of range", modified_vertex);
        assert!(neighbor < self.vertices.len(), "vertex {} out of range", neighbor);
        assert!(weight.has_headroom(), "edge weight lacks the two spare high bits");

        let mut stored = weight.clone();
        stored += &weight;
        if stored > self.max_edge_weight {
            self.max_edge_weight = stored.clone();
        }
        self.prepare_vertex_for_weight_adjustments(modified_vertex);
        self.vertices[modified_vertex].edge_weights[neighbor] = stored.clone();
        self.vertices[neighbor].edge_weights[modified_vertex] = stored;
    }

    /// Disconnect the vertex from its root blossom and its matched vertex, keeping all
    /// edge resistances non-negative, so its incident weights can be reassigned freely.
    fn prepare_vertex_for_weight_adjustments(&mut self, vertex: VertexIndex) {
        let root = self.root_of_vertex(vertex);
        if let Some(matched) = self.roots[root].base_vertex_match {
            let matched_root = self.root_of_vertex(matched);
            self.roots[matched_root].base_vertex_match = None;
            self.roots[root].base_vertex_match = None;
        }
        self.roots[root].base_vertex = vertex;
        let leaf = self.vertices[vertex].blossom;
        self.free_ancestor_of_base(root, leaf);
        self.vertices[vertex].dual_variable = self.max_edge_weight.clone();
    }

    pub fn root_of_vertex(&self, vertex: VertexIndex) -> RootIndex {
        self.blossoms[self.vertices[vertex].blossom].root
    }

    fn label_of_vertex(&self, vertex: VertexIndex) -> Label {
        self.roots[self.root_of_vertex(vertex)].label
    }

    /// The resistance `dual(u) + dual(v) - stored_weight(u, v)` of an edge between
    /// different root blossoms.
    fn resistance(&self, u: VertexIndex, v: VertexIndex) -> W {
        debug_assert_ne!(self.root_of_vertex(u), self.root_of_vertex(v));
        let mut result = self.vertices[u].dual_variable.clone();
        result += &self.vertices[v].dual_variable;
        result -= &self.vertices[u].edge_weights[v];
        result
    }

    /// A sentinel strictly greater than any attainable resistance.
    fn above_max_edge_weight(&self) -> W {
        let mut result = self.max_edge_weight.clone();
        result += &self.max_edge_weight;
        result.increment();
        result
    }

    // ------------------------------------------------------------------
    // traversals
    // ------------------------------------------------------------------

    /// All blossom nodes of the subtree rooted at `blossom`, the node itself included.
    fn collect_blossoms_below(&self, blossom: BlossomIndex) -> Vec<BlossomIndex> {
        let mut result = Vec::new();
        let mut stack = vec![blossom];
        while let Some(current) = stack.pop() {
            result.push(current);
            if let BlossomKind::Composite { subblossom, .. } = self.blossoms[current].kind {
                let mut child = subblossom;
                loop {
                    stack.push(child);
                    child = self.blossoms[child].next_blossom;
                    if child == subblossom {
                        break;
                    }
                }
            }
        }
        result
    }

    /// The vertices of `blossom`, by walking its intrusive list from head to tail. The
    /// tail bounds the walk, so this is valid for sub-blossoms whose tail still links
    /// onward into a sibling's list.
    fn blossom_vertex_list(&self, blossom: BlossomIndex) -> Vec<VertexIndex> {
        let mut result = Vec::new();
        let tail = self.blossoms[blossom].vertex_list_tail;
        let mut current = Some(self.blossoms[blossom].vertex_list_head);
        while let Some(vertex) = current {
            result.push(vertex);
            if vertex == tail {
                break;
            }
            current = self.vertices[vertex].next_vertex;
        }
        result
    }

    /// The vertices of `blossom` in matching order: `base` first, then consecutive
    /// matched pairs.
    fn matching_order_vertices(&self, blossom: BlossomIndex, base: VertexIndex, out: &mut Vec<VertexIndex>) {
        match self.blossoms[blossom].kind {
            BlossomKind::Leaf { vertex } => out.push(vertex),
            BlossomKind::Composite { .. } => {
                let base_child = self.get_ancestor_of_vertex(base, Some(blossom));
                self.matching_order_vertices(base_child, base, out);
                let mut left_child = self.blossoms[base_child].next_blossom;
                while left_child != base_child {
                    let right_child = self.blossoms[left_child].next_blossom;
                    let left_vertex = self.blossoms[left_child].vertex_to_next_sibling;
                    let right_vertex = self.blossoms[right_child].vertex_to_previous_sibling;
                    let mut left = Vec::new();
                    self.matching_order_vertices(left_child, left_vertex, &mut left);
                    let mut right = Vec::new();
                    self.matching_order_vertices(right_child, right_vertex, &mut right);
                    out.push(left[0]);
                    out.push(right[0]);
                    out.extend_from_slice(&left[1..]);
                    out.extend_from_slice(&right[1..]);
                    left_child = self.blossoms[right_child].next_blossom;
                }
            }
        }
    }

    /// The child of `parent` containing `vertex` (the topmost blossom of the vertex when
    /// `parent` is `None`).
    fn get_ancestor_of_vertex(&self, vertex: VertexIndex, parent: Option<BlossomIndex>) -> BlossomIndex {
        let mut current = self.vertices[vertex].blossom;
        while self.blossoms[current].parent != parent {
            current = self.blossoms[current].parent.expect("vertex not contained in the given parent");
        }
        current
    }

    /// Repoint the `subblossom` field of every composite between `ancestor` and `vertex`
    /// at the child on the path to `vertex`, so descending via `subblossom` reaches it.
    fn set_pointers_from_ancestor(&mut self, vertex: VertexIndex, ancestor: BlossomIndex) {
        let mut current = self.vertices[vertex].blossom;
        while current != ancestor {
            let parent = self.blossoms[current].parent.expect("vertex not contained in the given ancestor");
            if let BlossomKind::Composite { ref mut subblossom, .. } = self.blossoms[parent].kind {
                *subblossom = current;
            }
            current = parent;
        }
    }

    // ------------------------------------------------------------------
    // root blossom construction and dissolution
    // ------------------------------------------------------------------

    /// Turn `root_child` into its own root blossom with the given augmentation fields,
    /// updating the root pointer of every descendant.
    fn make_root(
        &mut self,
        root_child: BlossomIndex,
        base_vertex: VertexIndex,
        base_vertex_match: Option<VertexIndex>,
        label: Label,
        labeling_vertex: Option<VertexIndex>,
        labeled_vertex: Option<VertexIndex>,
    ) -> RootIndex {
        self.blossoms[root_child].parent = None;
        let tail = self.blossoms[root_child].vertex_list_tail;
        self.vertices[tail].next_vertex = None;
        let root = self.roots.insert(RootBlossom {
            min_outer_edges: vec![None; self.vertices.len()],
            min_outer_edge_resistance: W::default(),
            root_child,
            base_vertex,
            base_vertex_match,
            label,
            labeling_vertex,
            labeled_vertex,
        });
        for blossom in self.collect_blossoms_below(root_child) {
            self.blossoms[blossom].root = root;
        }
        root
    }

    /// Assuming `ancestor` contains the base vertex of `root`, disassemble every blossom
    /// above it so that `ancestor` and all blossoms cut loose become their own roots,
    /// while keeping edge resistances non-negative. Consumes `root`.
    fn free_ancestor_of_base(&mut self, root: RootIndex, ancestor: BlossomIndex) {
        if self.roots[root].root_child == ancestor {
            return;
        }

        let base_vertex = self.roots[root].base_vertex;
        let base_vertex_match = self.roots[root].base_vertex_match;

        // Dissolving a composite with dual variable z adds z/2 to each contained vertex,
        // which exactly compensates the loss of z on the edges inside it.
        let mut adjustment = W::default();
        {
            let mut current = self.blossoms[ancestor].parent;
            while let Some(parent) = current {
                if let BlossomKind::Composite { ref dual_variable, .. } = self.blossoms[parent].kind {
                    debug_assert!(dual_variable.is_even());
                    let mut half = dual_variable.clone();
                    half >>= 1;
                    adjustment += &half;
                }
                current = self.blossoms[parent].parent;
            }
        }

        let mut level_parent = self.blossoms[ancestor].parent;
        let mut next_blossom = self.blossoms[ancestor].next_blossom;
        let mut dissolved_composites = Vec::new();

        self.make_root(ancestor, base_vertex, base_vertex_match, Label::Zero, None, None);
        self.adjust_vertex_duals(ancestor, &adjustment);

        let mut child_to_free = ancestor;
        while let Some(parent) = level_parent {
            let mut links_forward = true;
            let mut previous_blossom = self.blossoms[child_to_free].previous_blossom;
            let mut current = next_blossom;
            while current != child_to_free {
                let next = self.blossoms[current].next_blossom;
                let (new_base, new_match) = if links_forward {
                    (
                        self.blossoms[current].vertex_to_next_sibling,
                        self.blossoms[next].vertex_to_previous_sibling,
                    )
                } else {
                    (
                        self.blossoms[current].vertex_to_previous_sibling,
                        self.blossoms[previous_blossom].vertex_to_next_sibling,
                    )
                };
                self.make_root(current, new_base, Some(new_match), Label::Zero, None, None);
                self.adjust_vertex_duals(current, &adjustment);
                links_forward = !links_forward;
                previous_blossom = current;
                current = next;
            }
            if let BlossomKind::Composite { ref dual_variable, .. } = self.blossoms[parent].kind {
                debug_assert!(dual_variable.is_even());
                let mut half = dual_variable.clone();
                half >>= 1;
                adjustment -= &half;
            }
            dissolved_composites.push(parent);
            child_to_free = parent;
            next_blossom = self.blossoms[parent].next_blossom;
            level_parent = self.blossoms[parent].parent;
        }

        for composite in dissolved_composites {
            self.blossoms.destroy(composite);
        }
        self.roots.destroy(root);
    }

    fn adjust_vertex_duals(&mut self, blossom: BlossomIndex, adjustment: &W) {
        if adjustment.is_zero() {
            return;
        }
        for vertex in self.blossom_vertex_list(blossom) {
            self.vertices[vertex].dual_variable += adjustment;
        }
    }

    /// Contract the odd cycle described by `path` (alternating exit and entry vertices of
    /// the cycle's blossoms, starting and ending inside the same root) into a new outer
    /// composite blossom, merging the minimum outer edge data of the old roots.
    fn construct_blossom_from_path(&mut self, path: &VecDeque<VertexIndex>) -> RootIndex {
        debug_assert!(path.len() >= 6 && path.len() % 2 == 0);
        let old_roots: Vec<RootIndex> = path.iter().step_by(2).map(|&v| self.root_of_vertex(v)).collect();
        let base_root = old_roots[0];
        let base_vertex = self.roots[base_root].base_vertex;
        let base_vertex_match = self.roots[base_root].base_vertex_match;
        let label = self.roots[base_root].label;
        debug_assert_eq!(label, Label::Outer);
        let labeling_vertex = self.roots[base_root].labeling_vertex;
        let labeled_vertex = self.roots[base_root].labeled_vertex;
        let inherited_min_outer_edges = self.roots[base_root].min_outer_edges.clone();

        // Build the composite and link the children into a sibling cycle.
        let first_child = self.get_ancestor_of_vertex(path[0], None);
        let composite = self.blossoms.insert(BlossomNode {
            root: 0,
            parent: None,
            vertex_list_head: 0,
            vertex_list_tail: 0,
            vertex_to_previous_sibling: path[0],
            vertex_to_next_sibling: path[0],
            next_blossom: 0,
            previous_blossom: 0,
            kind: BlossomKind::Composite {
                dual_variable: W::default(),
                subblossom: first_child,
            },
        });
        let mut previous_child = first_child;
        let mut path_iterator = path.iter();
        while let Some(&exit_vertex) = path_iterator.next() {
            let &entry_vertex = path_iterator.next().expect("path vertices come in pairs");
            self.blossoms[previous_child].vertex_to_next_sibling = exit_vertex;
            let subblossom = self.get_ancestor_of_vertex(entry_vertex, None);
            self.blossoms[previous_child].next_blossom = subblossom;
            self.blossoms[subblossom].vertex_to_previous_sibling = entry_vertex;
            self.blossoms[subblossom].parent = Some(composite);
            self.blossoms[subblossom].previous_blossom = previous_child;
            if let BlossomKind::Composite { subblossom: ref mut slot, .. } = self.blossoms[composite].kind {
                *slot = subblossom;
            }
            previous_child = subblossom;
        }
        debug_assert_eq!(previous_child, first_child, "the path must close its cycle");

        // Concatenate the children's vertex lists in cycle order.
        let mut child = first_child;
        let head = self.blossoms[first_child].vertex_list_head;
        let mut tail = self.blossoms[first_child].vertex_list_tail;
        loop {
            child = self.blossoms[child].next_blossom;
            if child == first_child {
                break;
            }
            let child_head = self.blossoms[child].vertex_list_head;
            self.vertices[tail].next_vertex = Some(child_head);
            tail = self.blossoms[child].vertex_list_tail;
        }
        self.vertices[tail].next_vertex = None;
        self.blossoms[composite].vertex_list_head = head;
        self.blossoms[composite].vertex_list_tail = tail;

        // The old roots stay readable while the merge below consults their data, but must
        // not be visited as live roots any more.
        for &old_root in old_roots.iter() {
            self.roots.hide(old_root);
        }

        let new_root = self.roots.insert(RootBlossom {
            min_outer_edges: inherited_min_outer_edges,
            min_outer_edge_resistance: W::default(),
            root_child: composite,
            base_vertex,
            base_vertex_match,
            label,
            labeling_vertex,
            labeled_vertex,
        });
        for blossom in self.collect_blossoms_below(composite) {
            self.blossoms[blossom].root = new_root;
        }

        self.initialize_from_children(new_root, &old_roots);

        for &old_root in old_roots.iter() {
            self.roots.destroy(old_root);
        }
        new_root
    }

    /// Rebuild the minimum outer edge data of a newly formed outer composite from its
    /// children's: cached witness pairs where both sides were outer, full rescans where a
    /// child was inner.
    fn initialize_from_children(&mut self, new_root: RootIndex, old_roots: &[RootIndex]) {
        let infinity = self.above_max_edge_weight();
        self.roots[new_root].min_outer_edge_resistance = infinity.clone();
        let new_base = self.roots[new_root].base_vertex;

        for other in self.roots.collect_indices() {
            if other == new_root || self.roots[other].label != Label::Outer {
                continue;
            }
            let other_base = self.roots[other].base_vertex;
            let mut min_resistance = infinity.clone();
            for &old_root in old_roots {
                if self.roots[old_root].label == Label::Inner {
                    let scan = self.roots[old_root].root_child;
                    let other_scan = self.roots[other].root_child;
                    min_resistance =
                        self.update_outer_outer_edges(new_root, scan, other, other_scan, min_resistance);
                } else {
                    debug_assert_eq!(self.roots[old_root].label, Label::Outer);
                    let old_base = self.roots[old_root].base_vertex;
                    let witness_here = self.roots[old_root].min_outer_edges[other_base];
                    let witness_there = self.roots[other].min_outer_edges[old_base];
                    if let (Some(witness_here), Some(witness_there)) = (witness_here, witness_there) {
                        let resistance = self.resistance(witness_here, witness_there);
                        debug_assert!(resistance.is_even());
                        if resistance < min_resistance {
                            min_resistance = resistance.clone();
                            self.roots[new_root].min_outer_edges[other_base] = Some(witness_here);
                            self.roots[other].min_outer_edges[new_base] = Some(witness_there);
                            if resistance < self.roots[new_root].min_outer_edge_resistance {
                                self.roots[new_root].min_outer_edge_resistance = resistance.clone();
                            }
                            if resistance < self.roots[other].min_outer_edge_resistance {
                                self.roots[other].min_outer_edge_resistance = resistance;
                            }
                        }
                    }
                }
            }
        }

        // Vertices of formerly non-outer children are outer now; non-outer vertices
        // elsewhere may find a smaller witness among them.
        for &old_root in old_roots {
            if self.roots[old_root].label != Label::Outer {
                let scan = self.roots[old_root].root_child;
                self.update_inner_outer_edges(scan);
            }
        }
    }

    // ------------------------------------------------------------------
    // augmentation bookkeeping
    // ------------------------------------------------------------------

    /// Set the label of every root blossom for a fresh augmentation phase.
    fn initialize_labeling(&mut self) {
        for root in self.roots.collect_indices() {
            let base = self.roots[root].base_vertex;
            let label = if self.roots[root].base_vertex_match.is_some() {
                Label::Free
            } else if !self.vertices[base].dual_variable.is_zero() {
                Label::Outer
            } else {
                Label::Zero
            };
            self.roots[root].label = label;
            self.roots[root].labeling_vertex = None;
            self.roots[root].labeled_vertex = None;
        }
    }

    /// Reset and recompute the minimum outer edge of every non-outer vertex.
    fn initialize_inner_outer_edges(&mut self) {
        let infinity = self.above_max_edge_weight();
        let mut outer_vertices = Vec::with_capacity(self.vertices.len());
        for vertex in 0..self.vertices.len() {
            if self.label_of_vertex(vertex) == Label::Outer {
                outer_vertices.push(vertex);
            }
        }
        for vertex in 0..self.vertices.len() {
            if self.label_of_vertex(vertex) != Label::Outer {
                self.vertices[vertex].min_outer_edge_resistance = infinity.clone();
                self.vertices[vertex].min_outer_edge = None;
                for &outer_vertex in outer_vertices.iter() {
                    let resistance = self.resistance(outer_vertex, vertex);
                    if resistance < self.vertices[vertex].min_outer_edge_resistance {
                        self.vertices[vertex].min_outer_edge_resistance = resistance;
                        self.vertices[vertex].min_outer_edge = Some(outer_vertex);
                    }
                }
            }
        }
    }

    /// Update the minimum outer edge of every non-outer vertex against the vertices of
    /// the given (newly outer) blossom.
    fn update_inner_outer_edges(&mut self, outer_blossom: BlossomIndex) {
        let outer_vertices = self.blossom_vertex_list(outer_blossom);
        for vertex in 0..self.vertices.len() {
            if self.label_of_vertex(vertex) != Label::Outer {
                for &outer_vertex in outer_vertices.iter() {
                    let resistance = self.resistance(outer_vertex, vertex);
                    if resistance < self.vertices[vertex].min_outer_edge_resistance {
                        self.vertices[vertex].min_outer_edge_resistance = resistance;
                        self.vertices[vertex].min_outer_edge = Some(outer_vertex);
                    }
                }
            }
        }
    }

    /// Find the minimum resistance between a vertex scanned under root `a` and one
    /// scanned under root `b`, recording the witnesses on both roots. Returns the updated
    /// running minimum.
    fn update_outer_outer_edges(
        &mut self,
        a: RootIndex,
        scan_a: BlossomIndex,
        b: RootIndex,
        scan_b: BlossomIndex,
        mut min_resistance: W,
    ) -> W {
        let base_a = self.roots[a].base_vertex;
        let base_b = self.roots[b].base_vertex;
        let vertices_a = self.blossom_vertex_list(scan_a);
        let vertices_b = self.blossom_vertex_list(scan_b);
        for &u in vertices_a.iter() {
            for &v in vertices_b.iter() {
                let resistance = self.resistance(u, v);
                debug_assert!(resistance.is_even());
                if resistance < min_resistance {
                    min_resistance = resistance.clone();
                    self.roots[a].min_outer_edges[base_b] = Some(u);
                    self.roots[b].min_outer_edges[base_a] = Some(v);
                    if resistance < self.roots[a].min_outer_edge_resistance {
                        self.roots[a].min_outer_edge_resistance = resistance.clone();
                    }
                    if resistance < self.roots[b].min_outer_edge_resistance {
                        self.roots[b].min_outer_edge_resistance = resistance;
                    }
                }
            }
        }
        min_resistance
    }

    /// Reset and recompute the minimum outer edges of one outer root.
    fn initialize_outer_outer_edges_root(&mut self, root: RootIndex) {
        let infinity = self.above_max_edge_weight();
        self.roots[root].min_outer_edge_resistance = infinity.clone();
        for other in self.roots.collect_indices() {
            if other != root && self.roots[other].label == Label::Outer {
                let base_other = self.roots[other].base_vertex;
                self.roots[root].min_outer_edges[base_other] = None;
                let scan_root = self.roots[root].root_child;
                let scan_other = self.roots[other].root_child;
                self.update_outer_outer_edges(root, scan_root, other, scan_other, infinity.clone());
            }
        }
    }

    /// Reset and recompute the minimum outer edges of all outer roots.
    fn initialize_outer_outer_edges(&mut self) {
        for root in self.roots.collect_indices() {
            if self.roots[root].label == Label::Outer {
                self.initialize_outer_outer_edges_root(root);
            }
        }
    }

    /// The minimum resistance between outer vertices in different roots.
    fn initialize_min_outer_outer_edge_resistance(&self) -> (Option<RootIndex>, W) {
        let mut min_resistance = self.above_max_edge_weight();
        let mut min_root = None;
        for root in self.roots.indices() {
            if self.roots[root].label == Label::Outer
                && self.roots[root].min_outer_edge_resistance < min_resistance
            {
                min_resistance = self.roots[root].min_outer_edge_resistance.clone();
                min_root = Some(root);
            }
        }
        debug_assert!(min_root.is_none() || min_resistance.is_even());
        (min_root, min_resistance)
    }

    /// The minimum composite dual variable among inner roots.
    fn initialize_min_inner_dual_variable(&self) -> (Option<BlossomIndex>, W) {
        let mut min_dual = self.above_max_edge_weight();
        let mut min_blossom = None;
        for root in self.roots.indices() {
            if self.roots[root].label == Label::Inner {
                let root_child = self.roots[root].root_child;
                if let BlossomKind::Composite { ref dual_variable, .. } = self.blossoms[root_child].kind {
                    if *dual_variable < min_dual {
                        min_dual = dual_variable.clone();
                        min_blossom = Some(root_child);
                    }
                }
            }
        }
        debug_assert!(min_blossom.is_none() || min_dual.is_even());
        (min_blossom, min_dual)
    }

    // ------------------------------------------------------------------
    // augmentation
    // ------------------------------------------------------------------

    /// Augment between `vertex` and the exposed outer root that led to its labeling,
    /// matching `vertex` to `new_match` along the way.
    fn augment_to_source(&mut self, vertex: VertexIndex, new_match: Option<VertexIndex>) {
        let mut vertex = vertex;
        let mut new_match = new_match;
        loop {
            let root = self.root_of_vertex(vertex);
            let old_match = match self.roots[root].base_vertex_match {
                Some(old_match) => old_match,
                None => break,
            };
            self.roots[root].base_vertex = vertex;
            self.roots[root].base_vertex_match = new_match;
            let original_match_root = self.root_of_vertex(old_match);
            let labeled = self.roots[original_match_root].labeled_vertex.expect("inner root has a labeled vertex");
            let labeling = self.roots[original_match_root].labeling_vertex.expect("inner root has a labeling vertex");
            self.roots[original_match_root].base_vertex = labeled;
            self.roots[original_match_root].base_vertex_match = Some(labeling);
            vertex = labeling;
            new_match = Some(labeled);
        }
        let root = self.root_of_vertex(vertex);
        self.roots[root].base_vertex = vertex;
        self.roots[root].base_vertex_match = new_match;
    }

    /// Expand an inner composite root whose dual variable has reached zero. Its children
    /// split into a chain of new roots; the ones on the alternating path from the base
    /// child to the connecting child are relabeled inner/outer, the rest become free.
    #[allow(clippy::too_many_arguments)]
    fn expand_inner_blossom(
        &mut self,
        composite: BlossomIndex,
        min_outer_dual: &mut W,
        min_outer_dual_vertex: &mut Option<VertexIndex>,
        min_outer_outer_root: &mut Option<RootIndex>,
        min_outer_outer_resistance: &mut W,
    ) {
        let old_root = self.blossoms[composite].root;
        debug_assert_eq!(self.roots[old_root].root_child, composite);
        debug_assert_eq!(self.roots[old_root].label, Label::Inner);
        self.roots.hide(old_root);

        let root_vertex = self.roots[old_root].base_vertex;
        let old_base_match = self.roots[old_root].base_vertex_match;
        let old_labeling = self.roots[old_root].labeling_vertex;
        let old_labeled = self.roots[old_root].labeled_vertex;
        let root_child = self.get_ancestor_of_vertex(root_vertex, Some(composite));
        let connect_child =
            self.get_ancestor_of_vertex(old_labeled.expect("inner root has a labeled vertex"), Some(composite));

        let mut connect_forward = true;
        {
            let mut current = root_child;
            while current != connect_child {
                current = self.blossoms[current].next_blossom;
                connect_forward = !connect_forward;
            }
        }

        let mut links_to_next = false;
        let mut is_free = false;
        let mut previous_child = self.blossoms[root_child].previous_blossom;
        let mut current = root_child;
        loop {
            let next_child = self.blossoms[current].next_blossom;
            if current == connect_child && !connect_forward {
                is_free = false;
            }
            let label = if is_free {
                Label::Free
            } else if (links_to_next ^ connect_forward) || current == root_child {
                Label::Inner
            } else {
                Label::Outer
            };
            let base_vertex = if current == root_child {
                root_vertex
            } else if links_to_next {
                self.blossoms[current].vertex_to_next_sibling
            } else {
                self.blossoms[current].vertex_to_previous_sibling
            };
            let base_vertex_match = if current == root_child {
                old_base_match
            } else if links_to_next {
                Some(self.blossoms[next_child].vertex_to_previous_sibling)
            } else {
                Some(self.blossoms[previous_child].vertex_to_next_sibling)
            };
            let labeling_vertex = if current == connect_child {
                old_labeling
            } else if label == Label::Inner {
                if connect_forward {
                    Some(self.blossoms[next_child].vertex_to_previous_sibling)
                } else {
                    Some(self.blossoms[previous_child].vertex_to_next_sibling)
                }
            } else {
                None
            };
            let labeled_vertex = if current == connect_child {
                old_labeled
            } else if label == Label::Inner {
                if connect_forward {
                    Some(self.blossoms[current].vertex_to_next_sibling)
                } else {
                    Some(self.blossoms[current].vertex_to_previous_sibling)
                }
            } else {
                None
            };

            let new_root = self.make_root(current, base_vertex, base_vertex_match, label, labeling_vertex, labeled_vertex);
            if label == Label::Outer {
                self.update_inner_outer_edges(current);
                self.initialize_outer_outer_edges_root(new_root);
                for vertex in self.blossom_vertex_list(current) {
                    if self.vertices[vertex].dual_variable < *min_outer_dual {
                        *min_outer_dual = self.vertices[vertex].dual_variable.clone();
                        *min_outer_dual_vertex = Some(vertex);
                    }
                }
                if self.roots[new_root].min_outer_edge_resistance < *min_outer_outer_resistance {
                    *min_outer_outer_resistance = self.roots[new_root].min_outer_edge_resistance.clone();
                    *min_outer_outer_root = Some(new_root);
                }
            }

            if current == (if connect_forward { connect_child } else { root_child }) {
                is_free = true;
            }
            links_to_next = !links_to_next;
            previous_child = current;
            current = next_child;
            if current == root_child {
                break;
            }
        }

        self.roots.destroy(old_root);
        self.blossoms.destroy(composite);
    }

    /// One augmentation phase. Returns false when no outer root remains, i.e. the
    /// matching is maximum.
    fn augment_matching(&mut self) -> bool {
        self.initialize_labeling();

        let infinity = self.above_max_edge_weight();
        let mut half_infinity = infinity.clone();
        half_infinity >>= 1;

        let mut min_outer_dual = infinity.clone();
        let mut min_outer_dual_vertex: Option<VertexIndex> = None;
        for vertex in 0..self.vertices.len() {
            debug_assert!(self.vertices[vertex].dual_variable <= half_infinity);
            if self.label_of_vertex(vertex) == Label::Outer
                && self.vertices[vertex].dual_variable < min_outer_dual
            {
                min_outer_dual = self.vertices[vertex].dual_variable.clone();
                min_outer_dual_vertex = Some(vertex);
            }
        }
        if min_outer_dual_vertex.is_none() {
            return false;
        }

        self.initialize_inner_outer_edges();
        self.initialize_outer_outer_edges();

        let (mut min_outer_outer_root, mut min_outer_outer_resistance) =
            self.initialize_min_outer_outer_edge_resistance();

        // No inner roots exist yet; they appear through tree extension below.
        let mut min_inner_dual = infinity.clone();
        let mut min_inner_dual_blossom: Option<BlossomIndex> = None;

        loop {
            // The inner-outer minimum is recomputed every iteration; the other three
            // minimums are maintained incrementally.
            let mut min_inner_outer_resistance = infinity.clone();
            let mut min_inner_outer_vertex: Option<VertexIndex> = None;
            for vertex in 0..self.vertices.len() {
                let label = self.label_of_vertex(vertex);
                if (label == Label::Free || label == Label::Zero)
                    && self.vertices[vertex].min_outer_edge_resistance < min_inner_outer_resistance
                {
                    min_inner_outer_resistance = self.vertices[vertex].min_outer_edge_resistance.clone();
                    min_inner_outer_vertex = Some(vertex);
                }
            }

            // delta = min(delta1, delta2, delta3, delta4)
            let mut adjustment = min_outer_dual.clone();
            if min_inner_outer_resistance < adjustment {
                adjustment = min_inner_outer_resistance.clone();
            }
            let mut halved = min_outer_outer_resistance.clone();
            halved >>= 1;
            if halved < adjustment {
                adjustment = halved;
            }
            let mut halved_inner = min_inner_dual.clone();
            halved_inner >>= 1;
            if halved_inner < adjustment {
                adjustment = halved_inner;
            }

            if !adjustment.is_zero() {
                let mut twice_adjustment = adjustment.clone();
                twice_adjustment += &adjustment;
                min_outer_dual -= &adjustment;
                min_inner_outer_resistance -= &adjustment;
                min_outer_outer_resistance -= &twice_adjustment;
                min_inner_dual -= &twice_adjustment;

                for vertex in 0..self.vertices.len() {
                    let root = self.root_of_vertex(vertex);
                    let label = self.roots[root].label;
                    match label {
                        Label::Outer => self.vertices[vertex].dual_variable -= &adjustment,
                        Label::Inner => self.vertices[vertex].dual_variable += &adjustment,
                        _ => {
                            if self.vertices[vertex].min_outer_edge_resistance < infinity {
                                self.vertices[vertex].min_outer_edge_resistance -= &adjustment;
                            }
                        }
                    }
                    debug_assert!(self.vertices[vertex].dual_variable <= half_infinity);
                    if self.roots[root].base_vertex == vertex {
                        if label == Label::Outer {
                            if self.roots[root].min_outer_edge_resistance < infinity {
                                self.roots[root].min_outer_edge_resistance -= &twice_adjustment;
                            }
                            let root_child = self.roots[root].root_child;
                            if let BlossomKind::Composite { ref mut dual_variable, .. } =
                                self.blossoms[root_child].kind
                            {
                                *dual_variable += &twice_adjustment;
                            }
                        } else if label == Label::Inner {
                            let root_child = self.roots[root].root_child;
                            if let BlossomKind::Composite { ref mut dual_variable, .. } =
                                self.blossoms[root_child].kind
                            {
                                *dual_variable -= &twice_adjustment;
                            }
                        }
                    }
                }
            }

            // Find the condition that halted the dual adjustment and apply the change.
            if min_outer_dual.is_zero() {
                // An outer vertex reached dual zero: augment from it to its tree root.
                self.augment_to_source(min_outer_dual_vertex.expect("an outer vertex exists"), None);
                return true;
            }
            if min_inner_outer_resistance.is_zero()
                && self.label_of_vertex(min_inner_outer_vertex.expect("witness exists")) == Label::Zero
            {
                // A tight edge between a zero vertex and an outer vertex: augment both ways.
                let zero_vertex = min_inner_outer_vertex.expect("witness exists");
                let outer_vertex = self.vertices[zero_vertex].min_outer_edge.expect("witness has an outer edge");
                self.augment_to_source(outer_vertex, Some(zero_vertex));
                self.augment_to_source(zero_vertex, Some(outer_vertex));
                return true;
            } else if min_outer_outer_resistance.is_zero() {
                // A tight edge between two outer roots: contract or augment.
                let anchor = min_outer_outer_root.expect("a minimum outer pair exists");
                let mut witness_pair: Option<(VertexIndex, VertexIndex)> = None;
                for other in self.roots.indices() {
                    if self.roots[other].label == Label::Outer && other != anchor {
                        let anchor_base = self.roots[anchor].base_vertex;
                        let other_base = self.roots[other].base_vertex;
                        let vertex0 = self.roots[anchor].min_outer_edges[other_base];
                        let vertex1 = self.roots[other].min_outer_edges[anchor_base];
                        if let (Some(vertex0), Some(vertex1)) = (vertex0, vertex1) {
                            if self.resistance(vertex0, vertex1).is_zero() {
                                witness_pair = Some((vertex0, vertex1));
                                break;
                            }
                        }
                    }
                }
                let (vertex0, vertex1) = witness_pair.expect("a tight outer-outer edge exists");

                // Walk both alternating trees up to their exposed roots.
                let mut path: VecDeque<VertexIndex> = VecDeque::new();
                path.push_front(vertex0);
                path.push_back(vertex1);
                loop {
                    let front_root = self.root_of_vertex(*path.front().expect("path is non-empty"));
                    let matched = match self.roots[front_root].base_vertex_match {
                        Some(matched) => matched,
                        None => break,
                    };
                    path.push_front(self.roots[front_root].base_vertex);
                    path.push_front(matched);
                    let inner_root = self.root_of_vertex(matched);
                    path.push_front(self.roots[inner_root].labeled_vertex.expect("inner root is labeled"));
                    path.push_front(self.roots[inner_root].labeling_vertex.expect("inner root is labeled"));
                }
                loop {
                    let back_root = self.root_of_vertex(*path.back().expect("path is non-empty"));
                    let matched = match self.roots[back_root].base_vertex_match {
                        Some(matched) => matched,
                        None => break,
                    };
                    path.push_back(self.roots[back_root].base_vertex);
                    path.push_back(matched);
                    let inner_root = self.root_of_vertex(matched);
                    path.push_back(self.roots[inner_root].labeled_vertex.expect("inner root is labeled"));
                    path.push_back(self.roots[inner_root].labeling_vertex.expect("inner root is labeled"));
                }

                let front_root = self.root_of_vertex(*path.front().expect("path is non-empty"));
                let back_root = self.root_of_vertex(*path.back().expect("path is non-empty"));
                if front_root == back_root {
                    // The trees meet: trim to the lowest common root and contract.
                    while self.root_of_vertex(path[1]) == self.root_of_vertex(path[path.len() - 2]) {
                        for _ in 0..4 {
                            path.pop_front();
                            path.pop_back();
                        }
                    }
                    debug_assert_eq!(
                        self.roots[self.root_of_vertex(*path.front().expect("path is non-empty"))].label,
                        Label::Outer
                    );
                    let new_root = self.construct_blossom_from_path(&path);
                    debug_assert_eq!(self.roots[new_root].label, Label::Outer);
                    let root_child = self.roots[new_root].root_child;
                    for vertex in self.blossom_vertex_list(root_child) {
                        if self.vertices[vertex].dual_variable < min_outer_dual {
                            min_outer_dual = self.vertices[vertex].dual_variable.clone();
                            min_outer_dual_vertex = Some(vertex);
                        }
                    }
                    let (root, resistance) = self.initialize_min_outer_outer_edge_resistance();
                    min_outer_outer_root = root;
                    min_outer_outer_resistance = resistance;
                    let (blossom, dual) = self.initialize_min_inner_dual_variable();
                    min_inner_dual_blossom = blossom;
                    min_inner_dual = dual;
                } else {
                    self.augment_to_source(vertex0, Some(vertex1));
                    self.augment_to_source(vertex1, Some(vertex0));
                    return true;
                }
            } else if min_inner_outer_resistance.is_zero() {
                // A tight edge between a free root and an outer vertex: extend the tree.
                let inner_vertex = min_inner_outer_vertex.expect("witness exists");
                let free_root = self.root_of_vertex(inner_vertex);
                debug_assert_eq!(self.roots[free_root].label, Label::Free);
                let matched = self.roots[free_root].base_vertex_match.expect("free roots are matched");
                let matched_root = self.root_of_vertex(matched);
                self.roots[free_root].label = Label::Inner;
                self.roots[matched_root].label = Label::Outer;
                self.roots[free_root].labeling_vertex = self.vertices[inner_vertex].min_outer_edge;
                self.roots[free_root].labeled_vertex = Some(inner_vertex);
                let matched_child = self.roots[matched_root].root_child;
                self.update_inner_outer_edges(matched_child);
                self.initialize_outer_outer_edges_root(matched_root);
                for vertex in self.blossom_vertex_list(matched_child) {
                    if self.vertices[vertex].dual_variable < min_outer_dual {
                        min_outer_dual = self.vertices[vertex].dual_variable.clone();
                        min_outer_dual_vertex = Some(vertex);
                    }
                }
                if self.roots[matched_root].min_outer_edge_resistance < min_outer_outer_resistance {
                    min_outer_outer_resistance = self.roots[matched_root].min_outer_edge_resistance.clone();
                    min_outer_outer_root = Some(matched_root);
                }
                let free_child = self.roots[free_root].root_child;
                if let BlossomKind::Composite { ref dual_variable, .. } = self.blossoms[free_child].kind {
                    if *dual_variable < min_inner_dual {
                        min_inner_dual = dual_variable.clone();
                        min_inner_dual_blossom = Some(free_child);
                    }
                }
                continue;
            } else if min_inner_dual.is_zero() {
                // An inner composite reached dual zero: dissolve it.
                let composite = min_inner_dual_blossom.expect("a minimum inner composite exists");
                self.expand_inner_blossom(
                    composite,
                    &mut min_outer_dual,
                    &mut min_outer_dual_vertex,
                    &mut min_outer_outer_root,
                    &mut min_outer_outer_resistance,
                );
                let (blossom, dual) = self.initialize_min_inner_dual_variable();
                min_inner_dual_blossom = blossom;
                min_inner_dual = dual;
            }
        }
    }

    /// Find the maximum-weight matching for the graph.
    pub fn compute_matching(&mut self) {
        // Make sure all exposed vertex duals are even, so every intermediate dual state
        // of the phases stays representable in integers.
        for root in self.roots.collect_indices() {
            let base = self.roots[root].base_vertex;
            if self.roots[root].base_vertex_match.is_some() || self.vertices[base].dual_variable.is_even() {
                continue;
            }
            let root_child = self.roots[root].root_child;
            self.set_pointers_from_ancestor(base, root_child);
            let mut adjustable = root_child;
            while let BlossomKind::Composite { ref dual_variable, subblossom } = self.blossoms[adjustable].kind {
                if !dual_variable.is_zero() {
                    break;
                }
                adjustable = subblossom;
            }
            self.free_ancestor_of_base(root, adjustable);
            if let BlossomKind::Composite { ref mut dual_variable, .. } = self.blossoms[adjustable].kind {
                let two = W::from_usize(2);
                debug_assert!(*dual_variable >= two);
                *dual_variable -= &two;
            }
            for vertex in self.blossom_vertex_list(adjustable) {
                self.vertices[vertex].dual_variable.increment();
                debug_assert!(self.vertices[vertex].dual_variable.is_even());
            }
        }

        while self.augment_matching() {}
    }

    /// The matching as a partner vector: entry i is the partner of vertex i, or i itself
    /// when unmatched. `compute_matching` must have run since the last update.
    pub fn matching(&self) -> Vec<VertexIndex> {
        let mut result = vec![0; self.vertices.len()];
        for root in self.roots.indices() {
            let base = self.roots[root].base_vertex;
            match self.roots[root].base_vertex_match {
                Some(matched) => {
                    debug_assert!(!self.vertices[base].edge_weights[matched].is_zero());
                    result[base] = matched;
                }
                None => {
                    debug_assert!(self.vertices[base].dual_variable.is_zero());
                    result[base] = base;
                }
            }
            let mut order = Vec::new();
            self.matching_order_vertices(self.roots[root].root_child, base, &mut order);
            debug_assert_eq!(order[0], base);
            let mut position = 1;
            while position + 1 < order.len() {
                let first = order[position];
                let second = order[position + 1];
                debug_assert!(!self.vertices[first].edge_weights[second].is_zero());
                result[first] = second;
                result[second] = first;
                position += 2;
            }
        }
        result
    }
}

impl<W: EdgeWeight> Default for Graph<W> {
    fn default() -> Self {
        Self::new()
    }
}
