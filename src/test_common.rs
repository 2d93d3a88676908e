use crate::graph::CsrGraph;

/// Two vertices, no edges.
pub(crate) fn isolated_pair() -> Result<CsrGraph, Box<dyn std::error::Error>> {
    CsrGraph::from_undirected(2, &[], Some(2))
}

/// `K3` with unit weights.
pub(crate) fn triangle() -> Result<CsrGraph, Box<dyn std::error::Error>> {
    CsrGraph::from_undirected(3, &[(0, 1, 1), (1, 2, 1), (0, 2, 1)], Some(2))
}

/// Two unit-weight triangles joined by a single unit edge.
pub(crate) fn two_triangles_bridge() -> Result<CsrGraph, Box<dyn std::error::Error>> {
    CsrGraph::from_undirected(
        6,
        &[
            (0, 1, 1),
            (1, 2, 1),
            (0, 2, 1),
            (3, 4, 1),
            (4, 5, 1),
            (3, 5, 1),
            (2, 3, 1),
        ],
        Some(2),
    )
}

/// Star with center 0 and `n - 1` unit-weight leaves.
pub(crate) fn star(n: usize) -> Result<CsrGraph, Box<dyn std::error::Error>> {
    let edges: Vec<(usize, usize, u64)> = (1..n).map(|leaf| (0, leaf, 1)).collect();
    CsrGraph::from_undirected(n, &edges, Some(2))
}

/// Single unit-weight edge `0 -- 1`.
pub(crate) fn path2() -> Result<CsrGraph, Box<dyn std::error::Error>> {
    CsrGraph::from_undirected(2, &[(0, 1, 1)], Some(2))
}
