pub mod loader;

use crate::utils::UNASSIGNED;

use bytemuck::Zeroable;
use num_cpus::get_physical;
use std::fmt::Display;
use std::ops::Range;

/// One directed adjacency entry of a [`CsrGraph`].
///
/// Input weights are 32-bit; they are widened on construction so that
/// community contraction may sum arbitrarily many of them without overflow.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WeightedEdge {
    dest: usize,
    weight: u64,
}

unsafe impl Zeroable for WeightedEdge {}

impl WeightedEdge {
    #[inline(always)]
    pub fn new(dest: usize, weight: u64) -> Self {
        WeightedEdge { dest, weight }
    }

    #[inline(always)]
    pub fn dest(&self) -> usize {
        self.dest
    }

    #[inline(always)]
    pub fn weight(&self) -> u64 {
        self.weight
    }
}

impl Display for WeightedEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, w{})", self.dest, self.weight)
    }
}

/// Mutable per-vertex payload used by the clustering engine.
///
/// `curr_comm` is the live assignment, `prev_comm` the assignment it replaced,
/// `degree_wt` the sum of incident edge weights (computed once per phase) and
/// `cluster_wt_internal` the weight toward same-community neighbours
/// (recomputed after every engine iteration).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub prev_comm: u64,
    pub curr_comm: u64,
    pub degree_wt: u64,
    pub cluster_wt_internal: u64,
}

unsafe impl Zeroable for Node {}

impl Default for Node {
    fn default() -> Self {
        Node {
            prev_comm: UNASSIGNED,
            curr_comm: UNASSIGNED,
            degree_wt: 0,
            cluster_wt_internal: 0,
        }
    }
}

/// Immutable compressed-sparse-row adjacency over `size()` vertices.
///
/// The structure is expected to be symmetric (every undirected edge stored in
/// both directions) with no duplicate entries; self-loops are stored once.
/// Producers are responsible for both properties, the constructors only check
/// index bounds.
#[derive(Debug, Clone)]
pub struct CsrGraph {
    /// Offset array, `index.len() == size() + 1`.
    index: Box<[usize]>,
    /// Flat adjacency, `edges.len() == width()`.
    edges: Box<[WeightedEdge]>,
    threads: usize,
}

#[allow(dead_code)]
impl CsrGraph {
    /// Builds a graph from prebuilt CSR arrays.
    ///
    /// # Arguments
    ///
    /// * `index`: offset array of length `node_count + 1`, monotonically
    ///   non-decreasing, ending at `edges.len()`.
    /// * `edges`: flat adjacency entries with in-bounds destinations.
    /// * `threads`: suggested worker count, defaults to the physical core count.
    pub fn from_csr(
        index: Vec<usize>,
        edges: Vec<WeightedEdge>,
        threads: Option<usize>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if index.is_empty() {
            return Err("error csr index array may not be empty".into());
        }
        let node_count = index.len() - 1;
        if index[0] != 0 || index[node_count] != edges.len() {
            return Err(format!(
                "error csr index array must span [0, {}], got [{}, {}]",
                edges.len(),
                index[0],
                index[node_count]
            )
            .into());
        }
        for u in 0..node_count {
            if index[u] > index[u + 1] {
                return Err(format!("error csr index array decreases at vertex {u}").into());
            }
        }
        if let Some(bad) = edges.iter().find(|e| e.dest() >= node_count) {
            return Err(format!(
                "error edge destination {} out of bounds for {} vertices",
                bad.dest(),
                node_count
            )
            .into());
        }
        Ok(CsrGraph {
            index: index.into_boxed_slice(),
            edges: edges.into_boxed_slice(),
            threads: threads.unwrap_or_else(get_physical).max(1),
        })
    }

    /// Builds a graph from directed `(src, dst, weight)` triples, stored
    /// exactly as given.
    pub fn from_edges(
        node_count: usize,
        edge_list: &[(usize, usize, u64)],
        threads: Option<usize>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut degree = vec![0usize; node_count];
        for &(u, v, _) in edge_list {
            if u >= node_count || v >= node_count {
                return Err(format!(
                    "error edge ({u}, {v}) out of bounds for {node_count} vertices"
                )
                .into());
            }
            degree[u] += 1;
        }

        let mut index = vec![0usize; node_count + 1];
        for u in 0..node_count {
            index[u + 1] = index[u] + degree[u];
        }

        let mut cursor = index.clone();
        let mut edges = vec![WeightedEdge::zeroed(); edge_list.len()];
        for &(u, v, w) in edge_list {
            edges[cursor[u]] = WeightedEdge::new(v, w);
            cursor[u] += 1;
        }

        Self::from_csr(index, edges, threads)
    }

    /// Builds a symmetric graph from undirected `(u, v, weight)` pairs.
    ///
    /// Every `u != v` pair is mirrored; self-loops are stored once.
    pub fn from_undirected(
        node_count: usize,
        edge_list: &[(usize, usize, u64)],
        threads: Option<usize>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut directed = Vec::with_capacity(edge_list.len() * 2);
        for &(u, v, w) in edge_list {
            directed.push((u, v, w));
            if u != v {
                directed.push((v, u, w));
            }
        }
        Self::from_edges(node_count, &directed, threads)
    }

    /// Number of vertices.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.index.len() - 1
    }

    /// Number of directed adjacency entries.
    #[inline(always)]
    pub fn width(&self) -> usize {
        self.edges.len()
    }

    #[inline(always)]
    pub fn thread_num(&self) -> usize {
        self.threads
    }

    #[inline(always)]
    pub fn node_degree(&self, u: usize) -> usize {
        self.index[u + 1] - self.index[u]
    }

    /// Range of `u`'s entries in the flat adjacency array.
    #[inline(always)]
    pub fn index_node(&self, u: usize) -> Range<usize> {
        self.index[u]..self.index[u + 1]
    }

    /// Adjacency entries of `u`.
    #[inline(always)]
    pub fn neighbours(&self, u: usize) -> &[WeightedEdge] {
        &self.edges[self.index_node(u)]
    }

    /// Sum of incident edge weights of `u` (self-loops counted once).
    pub fn vertex_weight(&self, u: usize) -> u64 {
        self.neighbours(u).iter().map(|e| e.weight()).sum()
    }

    #[inline(always)]
    pub(crate) fn index_view(&self) -> crate::shared_slice::SharedSlice<usize> {
        crate::shared_slice::SharedSlice::from_slice(&self.index)
    }

    #[inline(always)]
    pub(crate) fn edge_view(&self) -> crate::shared_slice::SharedSlice<WeightedEdge> {
        crate::shared_slice::SharedSlice::from_slice(&self.edges)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn csr_from_undirected_mirrors_edges() -> Result<(), Box<dyn std::error::Error>> {
        let g = CsrGraph::from_undirected(3, &[(0, 1, 1), (1, 2, 2)], Some(1))?;
        assert_eq!(g.size(), 3);
        assert_eq!(g.width(), 4);
        assert_eq!(g.node_degree(0), 1);
        assert_eq!(g.node_degree(1), 2);
        assert_eq!(g.node_degree(2), 1);
        assert_eq!(g.neighbours(1), &[
            WeightedEdge::new(0, 1),
            WeightedEdge::new(2, 2)
        ]);
        Ok(())
    }

    #[test]
    fn csr_self_loop_stored_once() -> Result<(), Box<dyn std::error::Error>> {
        let g = CsrGraph::from_undirected(2, &[(0, 0, 3), (0, 1, 1)], Some(1))?;
        assert_eq!(g.node_degree(0), 2);
        assert_eq!(g.vertex_weight(0), 4);
        assert_eq!(g.vertex_weight(1), 1);
        Ok(())
    }

    #[test]
    fn csr_rejects_out_of_bounds() {
        assert!(CsrGraph::from_edges(2, &[(0, 5, 1)], Some(1)).is_err());
        assert!(CsrGraph::from_csr(vec![0, 2, 1], vec![WeightedEdge::zeroed(); 1], Some(1)).is_err());
    }

    #[test]
    fn isolated_vertices_have_no_neighbours() -> Result<(), Box<dyn std::error::Error>> {
        let g = CsrGraph::from_undirected(4, &[(1, 2, 1)], Some(1))?;
        assert_eq!(g.node_degree(0), 0);
        assert_eq!(g.node_degree(3), 0);
        assert!(g.neighbours(0).is_empty());
        Ok(())
    }
}
