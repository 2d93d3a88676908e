use crate::graph::{CsrGraph, Node, WeightedEdge};
use crate::shared_slice::{ProceduralMemoryMut, SharedSliceMut};
use crate::utils::{f64_is_finite, verbose, ISOLATED, UNASSIGNED};
use crate::worklist::{ChunkedWorklist, WorklistQueue};

use crossbeam::thread;
use num_cpus::get_physical;
use portable_atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Per-community aggregates, updated only through atomic add/subtract while
/// an iteration is in flight.
#[derive(Debug, Default)]
pub struct Comm {
    pub size: AtomicU64,
    pub degree_wt: AtomicU64,
}

type ProceduralMemoryLouvain = (
    // per-vertex payload
    ProceduralMemoryMut<Node>,
    // community table, one record per potential community id
    ProceduralMemoryMut<Comm>,
    // per-vertex write locks for the cautious loop body
    ProceduralMemoryMut<AtomicBool>,
);

/// Parallel Louvain community detection over a [`CsrGraph`].
///
/// Runs local-moving phases until modularity gain drops below the threshold,
/// contracting communities into super-vertices between phases. Vertices are
/// dispatched through the chunked work-stealing worklist; each loop body
/// write-locks its vertex and all neighbours up front so it observes a
/// consistent assignment snapshot, and community aggregates absorb the
/// remaining cross-vertex traffic atomically.
#[allow(dead_code)]
#[derive(Debug)]
pub struct AlgoLouvain<'a> {
    g: &'a CsrGraph,
    /// Cluster id per original vertex; [`ISOLATED`] for edge-less vertices.
    clusters: ProceduralMemoryMut<u64>,
    community_count: usize,
    modularity: f64,
    threads: usize,
    c_threshold: f64,
    min_graph_size: usize,
}

#[allow(dead_code)]
impl<'a> AlgoLouvain<'a> {
    /// Bound on local-moving iterations within one phase; convergence is
    /// normally reached well before it.
    const MAX_ITERATIONS: usize = 64;
    /// Default modularity-gain convergence threshold.
    pub const DEFAULT_THRESHOLD: f64 = 0.01;
    /// Default smallest contracted graph worth another phase.
    pub const DEFAULT_MIN_GRAPH_SIZE: usize = 100;

    pub fn new(g: &'a CsrGraph) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_conf(
            g,
            None,
            Self::DEFAULT_THRESHOLD,
            Self::DEFAULT_MIN_GRAPH_SIZE,
        )
    }

    /// # Arguments
    ///
    /// * `g`: the graph to cluster; must be symmetric without duplicate edges.
    /// * `threads`: worker count, defaults to `min(graph setting, physical cores)`.
    /// * `c_threshold`: modularity-gain convergence threshold.
    /// * `min_graph_size`: smallest contracted graph worth another phase.
    pub fn with_conf(
        g: &'a CsrGraph,
        threads: Option<usize>,
        c_threshold: f64,
        min_graph_size: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut louvain = Self::new_no_compute(g, threads, c_threshold, min_graph_size)?;
        louvain.compute()?;
        Ok(louvain)
    }

    /// Cluster assignment per original vertex.
    pub fn clusters(&self) -> &[u64] {
        self.clusters.as_slice()
    }

    pub fn cluster_of(&self, u: usize) -> u64 {
        *self.clusters.get(u)
    }

    /// Number of non-singleton-isolated communities in the final assignment.
    pub fn community_count(&self) -> usize {
        self.community_count
    }

    pub fn partition_modularity(&self) -> f64 {
        self.modularity
    }

    fn new_no_compute(
        g: &'a CsrGraph,
        threads: Option<usize>,
        c_threshold: f64,
        min_graph_size: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let c_threshold = f64_is_finite(c_threshold, "convergence threshold")?;
        let threads = threads
            .unwrap_or_else(|| g.thread_num().min(get_physical()))
            .max(1);
        Ok(Self {
            g,
            clusters: ProceduralMemoryMut::from_value(g.size(), UNASSIGNED),
            community_count: 0,
            modularity: 0.,
            threads,
            c_threshold,
            min_graph_size,
        })
    }

    fn init_proc_mem(node_count: usize) -> ProceduralMemoryLouvain {
        (
            ProceduralMemoryMut::<Node>::new(node_count),
            ProceduralMemoryMut::<Comm>::new(node_count),
            ProceduralMemoryMut::<AtomicBool>::new(node_count),
        )
    }

    /// Multi-phase driver: local moving, contiguous renumbering, dendrogram
    /// flattening, community contraction, repeat while worthwhile.
    fn compute(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let node_count = self.g.size();
        let mut clusters = self.clusters.shared_slice();
        let verbose = verbose();

        let mut work: Option<CsrGraph> = None;
        let mut prev_mod;
        let mut curr_mod = -1f64;
        let mut comm_count = 0usize;
        let mut phase = 1usize;

        loop {
            let g = work.as_ref().unwrap_or(self.g);
            let g_size = g.size();
            if g_size == 0 {
                break;
            }
            if verbose {
                println!("Starting phase {phase} on {g_size} vertices");
            }
            prev_mod = curr_mod;

            let proc_mem = Self::init_proc_mem(g_size);
            curr_mod = self.one_phase(g, &proc_mem, curr_mod)?;

            let nodes = proc_mem.0.shared_slice();
            let mut renumber = vec![UNASSIGNED; g_size];
            comm_count = renumber_clusters_contiguously(&nodes, g_size, &mut renumber);

            if phase == 1 {
                for orig in 0..node_count {
                    let c = nodes.get(orig).curr_comm;
                    *clusters.get_mut(orig) = if c == ISOLATED {
                        ISOLATED
                    } else {
                        renumber[c as usize]
                    };
                }
            } else {
                // route each original vertex through the super-vertex it
                // belongs to
                for orig in 0..node_count {
                    let c = *clusters.get(orig);
                    if c == ISOLATED {
                        continue;
                    }
                    let super_comm = nodes.get(c as usize).curr_comm;
                    *clusters.get_mut(orig) = renumber[super_comm as usize];
                }
            }

            self.modularity = curr_mod;
            if comm_count <= 1
                || comm_count == g_size
                || comm_count <= self.min_graph_size
                || curr_mod - prev_mod < self.c_threshold
            {
                break;
            }

            let contracted = contract(g, &nodes, &renumber, comm_count, self.threads)?;
            work = Some(contracted);
            phase += 1;
        }

        self.community_count = comm_count;
        Ok(())
    }

    /// One local-moving phase: iterate the cautious parallel body until the
    /// modularity gain falls below the threshold, returning the phase's
    /// modularity. `lower` is the modularity the phase has to beat.
    fn one_phase(
        &self,
        g: &CsrGraph,
        proc_mem: &ProceduralMemoryLouvain,
        lower: f64,
    ) -> Result<f64, Box<dyn std::error::Error>> {
        let node_count = g.size();
        if node_count == 0 {
            return Ok(0.);
        }
        let threads = self.threads.min(node_count);
        let thread_load = node_count.div_ceil(threads);
        let index_ptr = g.index_view();
        let edge_ptr = g.edge_view();

        let (node_mem, comm_mem, lock_mem) = proc_mem;
        let nodes = node_mem.shared_slice();
        let c_info = comm_mem.shared_slice();
        let locks = lock_mem.shared_slice();

        // seed every vertex as its own community and accumulate 2m
        let m2 = thread::scope(|scope| -> u64 {
            let mut partials = Vec::with_capacity(threads);
            for tid in 0..threads {
                let mut nodes = nodes;
                let c_info = c_info;
                let locks = locks;
                let start = std::cmp::min(tid * thread_load, node_count);
                let end = std::cmp::min(start + thread_load, node_count);
                partials.push(scope.spawn(move |_| -> u64 {
                    let mut local_wt = 0u64;
                    for u in start..end {
                        let mut degree_wt = 0u64;
                        for e_idx in *index_ptr.get(u)..*index_ptr.get(u + 1) {
                            degree_wt += edge_ptr.get(e_idx).weight();
                        }
                        *nodes.get_mut(u) = Node {
                            prev_comm: u as u64,
                            curr_comm: u as u64,
                            degree_wt,
                            cluster_wt_internal: 0,
                        };
                        c_info.get(u).size.store(1, Ordering::Relaxed);
                        c_info.get(u).degree_wt.store(degree_wt, Ordering::Relaxed);
                        locks.get(u).store(false, Ordering::Relaxed);
                        local_wt += degree_wt;
                    }
                    local_wt
                }));
            }
            partials
                .into_iter()
                .map(|h| h.join().expect("error joining init worker"))
                .sum()
        })
        .map_err(|e| -> Box<dyn std::error::Error> { format!("{:?}", e).into() })?;

        let constant = if m2 == 0 { 0. } else { 1. / m2 as f64 };
        let verbose = verbose();
        if verbose {
            println!("================================================================");
            println!(" Itr            E_xx              A2_x          Curr-Mod");
            println!("================================================================");
        }

        let mut prev_mod = lower;
        let mut num_iter = 0usize;
        while num_iter < Self::MAX_ITERATIONS {
            num_iter += 1;

            self.cautious_move_pass(
                node_count, threads, thread_load, &index_ptr, &edge_ptr, nodes, c_info, locks,
                constant,
            )?;

            // quiescent post-pass: per-vertex internal weights are race-free
            // here, community degrees are stable
            let (e_xx, a2_x) = thread::scope(|scope| -> (u64, f64) {
                let mut partials = Vec::with_capacity(threads);
                for tid in 0..threads {
                    let mut nodes = nodes;
                    let c_info = c_info;
                    let start = std::cmp::min(tid * thread_load, node_count);
                    let end = std::cmp::min(start + thread_load, node_count);
                    partials.push(scope.spawn(move |_| -> (u64, f64) {
                        let mut local_exx = 0u64;
                        let mut local_a2 = 0f64;
                        for u in start..end {
                            let u_comm = nodes.get(u).curr_comm;
                            let mut internal = 0u64;
                            if u_comm != ISOLATED {
                                for e_idx in *index_ptr.get(u)..*index_ptr.get(u + 1) {
                                    let e = edge_ptr.get(e_idx);
                                    if nodes.get(e.dest()).curr_comm == u_comm {
                                        internal += e.weight();
                                    }
                                }
                            }
                            nodes.get_mut(u).cluster_wt_internal = internal;
                            local_exx += internal;
                            let comm_wt = c_info.get(u).degree_wt.load(Ordering::Relaxed) as f64;
                            local_a2 += comm_wt * comm_wt;
                        }
                        (local_exx, local_a2)
                    }));
                }
                let mut e_xx = 0u64;
                let mut a2_x = 0f64;
                for handle in partials {
                    let (exx, a2) = handle.join().expect("error joining modularity worker");
                    e_xx += exx;
                    a2_x += a2;
                }
                (e_xx, a2_x)
            })
            .map_err(|e| -> Box<dyn std::error::Error> { format!("{:?}", e).into() })?;

            let curr_mod = e_xx as f64 * constant - a2_x * constant * constant;
            if verbose {
                println!("{num_iter:>4} {e_xx:>15} {a2_x:>17.1} {curr_mod:>17.6}");
            }

            if curr_mod - prev_mod < self.c_threshold {
                return Ok(prev_mod.max(curr_mod));
            }
            prev_mod = curr_mod;
        }
        Ok(prev_mod)
    }

    /// One parallel sweep over all vertices through the stealing worklist.
    ///
    /// Every worker seeds its own share, then pops until the global countdown
    /// reaches zero. A body that loses the lock race requeues its vertex
    /// through the running queue and moves on.
    #[allow(clippy::too_many_arguments)]
    fn cautious_move_pass(
        &self,
        node_count: usize,
        threads: usize,
        thread_load: usize,
        index_ptr: &crate::shared_slice::SharedSlice<usize>,
        edge_ptr: &crate::shared_slice::SharedSlice<WeightedEdge>,
        nodes: SharedSliceMut<Node>,
        c_info: SharedSliceMut<Comm>,
        locks: SharedSliceMut<AtomicBool>,
        constant: f64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let worklist = ChunkedWorklist::<usize, _>::new(
            WorklistQueue::<usize>::with_workers(threads),
            threads,
        );
        let remaining = AtomicUsize::new(node_count);

        thread::scope(|scope| {
            for tid in 0..threads {
                let worklist = &worklist;
                let remaining = &remaining;
                let index_ptr = *index_ptr;
                let edge_ptr = *edge_ptr;
                let mut nodes = nodes;
                let c_info = c_info;
                let locks = locks;
                let start = std::cmp::min(tid * thread_load, node_count);
                let end = std::cmp::min(start + thread_load, node_count);

                scope.spawn(move |_| {
                    let mut handle = worklist.worker(tid);
                    let seeds: Vec<usize> = (start..end).collect();
                    handle.seed_slice(&seeds);

                    let mut lock_ids: SmallVec<[usize; 32]> = SmallVec::new();
                    let mut local_map: HashMap<u64, usize> = HashMap::new();
                    let mut counter: SmallVec<[u64; 16]> = SmallVec::new();

                    while remaining.load(Ordering::Acquire) > 0 {
                        let u = match handle.pop() {
                            Some(u) => u,
                            None => {
                                // nothing reachable right now; siblings still
                                // hold work in their current chunks
                                std::thread::yield_now();
                                continue;
                            }
                        };

                        let e_start = *index_ptr.get(u);
                        let e_end = *index_ptr.get(u + 1);

                        // cautious acquire: this vertex plus every neighbour,
                        // in id order, all or nothing
                        lock_ids.clear();
                        lock_ids.push(u);
                        for e_idx in e_start..e_end {
                            lock_ids.push(edge_ptr.get(e_idx).dest());
                        }
                        lock_ids.sort_unstable();
                        lock_ids.dedup();
                        if !try_lock_all(&locks, &lock_ids) {
                            handle.push(u);
                            std::hint::spin_loop();
                            continue;
                        }

                        let n_data = *nodes.get(u);
                        let sc = n_data.curr_comm;
                        let local_target = if e_end > e_start {
                            local_map.clear();
                            counter.clear();
                            local_map.insert(sc, 0);
                            counter.push(0);
                            let mut self_loop_wt = 0u64;
                            for e_idx in e_start..e_end {
                                let e = edge_ptr.get(e_idx);
                                let wt = e.weight();
                                if e.dest() == u {
                                    self_loop_wt += wt;
                                }
                                let dst_comm = nodes.get(e.dest()).curr_comm;
                                match local_map.get(&dst_comm) {
                                    Some(&idx) => counter[idx] += wt,
                                    None => {
                                        local_map.insert(dst_comm, counter.len());
                                        counter.push(wt);
                                    }
                                }
                            }
                            max_modularity(
                                &local_map,
                                &counter,
                                self_loop_wt,
                                &c_info,
                                n_data.degree_wt,
                                sc,
                                constant,
                            )
                        } else {
                            ISOLATED
                        };

                        if local_target != sc && local_target != ISOLATED {
                            let target = c_info.get(local_target as usize);
                            target.degree_wt.fetch_add(n_data.degree_wt, Ordering::Relaxed);
                            target.size.fetch_add(1, Ordering::Relaxed);
                            let source = c_info.get(sc as usize);
                            let old_wt =
                                source.degree_wt.fetch_sub(n_data.degree_wt, Ordering::Relaxed);
                            let old_size = source.size.fetch_sub(1, Ordering::Relaxed);
                            if old_wt < n_data.degree_wt || old_size < 1 {
                                // a negative aggregate is a migration logic
                                // bug; siblings may be blocked on the
                                // countdown, so bail out of the process
                                eprintln!(
                                    "invariant violation: community {sc} aggregates went negative"
                                );
                                std::process::abort();
                            }
                            let n_mut = nodes.get_mut(u);
                            n_mut.prev_comm = sc;
                            n_mut.curr_comm = local_target;
                        } else if local_target == ISOLATED && sc != ISOLATED {
                            // an edge-less vertex leaves the community it
                            // seeded so community sizes count real members
                            let source = c_info.get(sc as usize);
                            let old_size = source.size.fetch_sub(1, Ordering::Relaxed);
                            if old_size < 1 {
                                eprintln!(
                                    "invariant violation: community {sc} aggregates went negative"
                                );
                                std::process::abort();
                            }
                            let n_mut = nodes.get_mut(u);
                            n_mut.prev_comm = sc;
                            n_mut.curr_comm = ISOLATED;
                        }

                        unlock_all(&locks, &lock_ids);
                        remaining.fetch_sub(1, Ordering::Release);
                    }
                });
            }
        })
        .map_err(|e| -> Box<dyn std::error::Error> { format!("{:?}", e).into() })?;

        Ok(())
    }
}

/// Picks the community with the highest modularity gain for a vertex.
///
/// `local_map` maps community ids to dense indices into `counter` (index 0 is
/// the vertex's current community `sc`), `counter[i]` the edge weight from
/// the vertex to that community. Ties resolve to the smaller community id;
/// a swap between two singleton communities is suppressed in one direction so
/// mutual pairs cannot oscillate forever.
fn max_modularity(
    local_map: &HashMap<u64, usize>,
    counter: &[u64],
    self_loop_wt: u64,
    c_info: &SharedSliceMut<Comm>,
    degree_wt: u64,
    sc: u64,
    constant: f64,
) -> u64 {
    let mut max_index = sc;
    let mut max_gain = 0f64;
    let e_ix = counter[0] as f64 - self_loop_wt as f64;
    let a_x = c_info.get(sc as usize).degree_wt.load(Ordering::Relaxed) as f64 - degree_wt as f64;
    let degree_wt = degree_wt as f64;

    for (&comm, &idx) in local_map.iter() {
        if comm == sc {
            continue;
        }
        let a_y = c_info.get(comm as usize).degree_wt.load(Ordering::Relaxed) as f64;
        let e_iy = counter[idx] as f64;
        let cur_gain =
            2. * constant * (e_iy - e_ix) + 2. * degree_wt * (a_x - a_y) * constant * constant;
        if cur_gain > max_gain || (cur_gain == max_gain && cur_gain != 0. && comm < max_index) {
            max_gain = cur_gain;
            max_index = comm;
        }
    }

    if max_index > sc
        && c_info.get(max_index as usize).size.load(Ordering::Relaxed) == 1
        && c_info.get(sc as usize).size.load(Ordering::Relaxed) == 1
    {
        max_index = sc;
    }

    max_index
}

#[inline]
fn try_lock_all(locks: &SharedSliceMut<AtomicBool>, ids: &[usize]) -> bool {
    for (acquired, &id) in ids.iter().enumerate() {
        if locks
            .get(id)
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            for &held in &ids[..acquired] {
                locks.get(held).store(false, Ordering::Release);
            }
            return false;
        }
    }
    true
}

#[inline]
fn unlock_all(locks: &SharedSliceMut<AtomicBool>, ids: &[usize]) {
    for &id in ids {
        locks.get(id).store(false, Ordering::Release);
    }
}

/// Contiguously renumbers the communities present in `nodes`, smallest member
/// first, filling `renumber` (community id to new id) and returning the count.
fn renumber_clusters_contiguously(
    nodes: &SharedSliceMut<Node>,
    node_count: usize,
    renumber: &mut [u64],
) -> usize {
    let mut next = 0u64;
    for u in 0..node_count {
        let c = nodes.get(u).curr_comm;
        if c == ISOLATED {
            continue;
        }
        let slot = &mut renumber[c as usize];
        if *slot == UNASSIGNED {
            *slot = next;
            next += 1;
        }
    }
    next as usize
}

/// Contracts each community into a super-vertex, summing parallel edge
/// weights. Weight internal to a community becomes a self-loop on its
/// super-vertex, so the total degree weight (and with it 2m) is conserved
/// across phases.
fn contract(
    g: &CsrGraph,
    nodes: &SharedSliceMut<Node>,
    renumber: &[u64],
    comm_count: usize,
    threads: usize,
) -> Result<CsrGraph, Box<dyn std::error::Error>> {
    let mut acc: Vec<HashMap<u64, u64>> = vec![HashMap::new(); comm_count];
    for u in 0..g.size() {
        let c = nodes.get(u).curr_comm;
        if c == ISOLATED {
            continue;
        }
        let cu = renumber[c as usize] as usize;
        for e in g.neighbours(u) {
            let cv = renumber[nodes.get(e.dest()).curr_comm as usize];
            *acc[cu].entry(cv).or_insert(0) += e.weight();
        }
    }

    let mut index = Vec::with_capacity(comm_count + 1);
    index.push(0usize);
    let mut edges = Vec::new();
    for comm_adj in &acc {
        let mut adj: Vec<(u64, u64)> = comm_adj.iter().map(|(&d, &w)| (d, w)).collect();
        adj.sort_unstable_by_key(|&(d, _)| d);
        for (d, w) in adj {
            edges.push(WeightedEdge::new(d as usize, w));
        }
        index.push(edges.len());
    }
    CsrGraph::from_csr(index, edges, Some(threads))
}

/// Collapses trivially attached vertices before clustering.
///
/// Every vertex first becomes its own cluster. Edge-less vertices are marked
/// [`ISOLATED`]; a degree-one vertex follows its unique neighbour `d` when
/// `d` has other edges or the id order breaks the mutual pair (`n > d`).
/// Returns how many vertices were collapsed or isolated. The graph itself is
/// not rewritten.
pub fn vertex_following(
    g: &CsrGraph,
    clusters: &mut ProceduralMemoryMut<u64>,
) -> Result<u64, Box<dyn std::error::Error>> {
    let node_count = g.size();
    if clusters.len() != node_count {
        return Err(format!(
            "error cluster array length {} does not match graph size {node_count}",
            clusters.len()
        )
        .into());
    }
    if node_count == 0 {
        return Ok(0);
    }
    let threads = g.thread_num().min(node_count).max(1);
    let thread_load = node_count.div_ceil(threads);
    let index_ptr = g.index_view();
    let edge_ptr = g.edge_view();
    let clusters = clusters.shared_slice();

    let followed = thread::scope(|scope| -> u64 {
        let mut partials = Vec::with_capacity(threads);
        for tid in 0..threads {
            let mut clusters = clusters;
            let start = std::cmp::min(tid * thread_load, node_count);
            let end = std::cmp::min(start + thread_load, node_count);
            partials.push(scope.spawn(move |_| -> u64 {
                let mut followed = 0u64;
                for u in start..end {
                    let degree = *index_ptr.get(u + 1) - *index_ptr.get(u);
                    if degree == 0 {
                        followed += 1;
                        *clusters.get_mut(u) = ISOLATED;
                        continue;
                    }
                    *clusters.get_mut(u) = u as u64;
                    if degree == 1 {
                        let d = edge_ptr.get(*index_ptr.get(u)).dest();
                        let d_degree = *index_ptr.get(d + 1) - *index_ptr.get(d);
                        if d != u && (d_degree > 1 || u > d) {
                            followed += 1;
                            *clusters.get_mut(u) = d as u64;
                        }
                    }
                }
                followed
            }));
        }
        partials
            .into_iter()
            .map(|h| h.join().expect("error joining vertex-following worker"))
            .sum()
    })
    .map_err(|e| -> Box<dyn std::error::Error> { format!("{:?}", e).into() })?;

    Ok(followed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_common::{isolated_pair, path2, star, triangle, two_triangles_bridge};

    const EPS: f64 = 1e-9;

    #[test]
    fn isolated_pair_yields_zero_modularity() -> Result<(), Box<dyn std::error::Error>> {
        let g = isolated_pair()?;
        let louvain = AlgoLouvain::new(&g)?;
        assert_eq!(louvain.clusters(), &[ISOLATED, ISOLATED]);
        assert!((louvain.partition_modularity() - 0.).abs() < EPS);
        assert_eq!(louvain.community_count(), 0);
        Ok(())
    }

    #[test]
    fn triangle_collapses_into_one_community() -> Result<(), Box<dyn std::error::Error>> {
        let g = triangle()?;
        let louvain = AlgoLouvain::new(&g)?;
        assert_eq!(louvain.clusters(), &[0, 0, 0]);
        assert_eq!(louvain.community_count(), 1);
        // single community over the whole graph: alpha * e_xx = 1 and
        // alpha^2 * a2_x = 1 cancel out exactly
        assert!((louvain.partition_modularity() - 0.).abs() < EPS);
        Ok(())
    }

    #[test]
    fn bridged_triangles_split_into_two_communities() -> Result<(), Box<dyn std::error::Error>> {
        let g = two_triangles_bridge()?;
        let louvain = AlgoLouvain::new(&g)?;
        let clusters = louvain.clusters();
        assert_eq!(clusters[0], clusters[1]);
        assert_eq!(clusters[1], clusters[2]);
        assert_eq!(clusters[3], clusters[4]);
        assert_eq!(clusters[4], clusters[5]);
        assert_ne!(clusters[0], clusters[3]);
        assert_eq!(louvain.community_count(), 2);
        // strictly better than the single-community answer (which scores 0)
        assert!(louvain.partition_modularity() > 0.3);
        Ok(())
    }

    #[test]
    fn star_converges_to_a_single_community() -> Result<(), Box<dyn std::error::Error>> {
        let g = star(8)?;
        let louvain = AlgoLouvain::new(&g)?;
        let clusters = louvain.clusters();
        assert!(clusters.iter().all(|&c| c == clusters[0]));
        assert_eq!(louvain.community_count(), 1);
        Ok(())
    }

    #[test]
    fn self_loop_only_vertex_never_migrates() -> Result<(), Box<dyn std::error::Error>> {
        // vertex 0 has a single self-loop, vertices 1 and 2 share an edge
        let g = CsrGraph::from_undirected(3, &[(0, 0, 2), (1, 2, 1)], Some(2))?;
        let louvain = AlgoLouvain::new(&g)?;
        let clusters = louvain.clusters();
        assert_eq!(clusters[1], clusters[2]);
        assert_ne!(clusters[0], clusters[1]);
        Ok(())
    }

    #[test]
    fn single_thread_runs_are_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let g = two_triangles_bridge()?;
        let a = AlgoLouvain::with_conf(&g, Some(1), 0.01, 100)?;
        let b = AlgoLouvain::with_conf(&g, Some(1), 0.01, 100)?;
        assert_eq!(a.clusters(), b.clusters());
        assert!((a.partition_modularity() - b.partition_modularity()).abs() < EPS);
        Ok(())
    }

    #[test]
    fn community_aggregates_match_vertex_state() -> Result<(), Box<dyn std::error::Error>> {
        let g = two_triangles_bridge()?;
        let louvain = AlgoLouvain::new_no_compute(&g, Some(4), 0.01, 100)?;
        let proc_mem = AlgoLouvain::init_proc_mem(g.size());
        louvain.one_phase(&g, &proc_mem, -1.)?;

        let (node_mem, comm_mem, _) = &proc_mem;
        let total_degree: u64 = (0..g.size()).map(|u| g.vertex_weight(u)).sum();
        let comm_degree: u64 = (0..g.size())
            .map(|c| comm_mem.get(c).degree_wt.load(Ordering::Relaxed))
            .sum();
        assert_eq!(total_degree, comm_degree, "degree weight not conserved");

        let non_isolated = (0..g.size())
            .filter(|&u| node_mem.get(u).curr_comm != ISOLATED)
            .count() as u64;
        let comm_sizes: u64 = (0..g.size())
            .map(|c| comm_mem.get(c).size.load(Ordering::Relaxed))
            .sum();
        assert_eq!(comm_sizes, non_isolated, "community sizes do not add up");

        for c in 0..g.size() {
            let members: Vec<usize> = (0..g.size())
                .filter(|&u| node_mem.get(u).curr_comm == c as u64)
                .collect();
            assert_eq!(
                comm_mem.get(c).size.load(Ordering::Relaxed),
                members.len() as u64
            );
            let member_wt: u64 = members.iter().map(|&u| node_mem.get(u).degree_wt).sum();
            assert_eq!(comm_mem.get(c).degree_wt.load(Ordering::Relaxed), member_wt);
        }
        Ok(())
    }

    #[test]
    fn star_phase_modularity_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        // leaves can only ever join the center's community, so the phase
        // result is identical no matter how workers interleave
        let g = star(16)?;
        let louvain = AlgoLouvain::new_no_compute(&g, Some(4), 0.01, 100)?;
        let proc_mem = AlgoLouvain::init_proc_mem(g.size());
        let q = louvain.one_phase(&g, &proc_mem, -1.)?;
        let proc_mem2 = AlgoLouvain::init_proc_mem(g.size());
        let q2 = louvain.one_phase(&g, &proc_mem2, -1.)?;
        assert!((q - 0.).abs() < EPS);
        assert!((q2 - q).abs() < EPS);
        for u in 0..g.size() {
            assert_eq!(proc_mem.0.get(u).curr_comm, 0);
        }
        Ok(())
    }

    #[test]
    fn ties_break_toward_smaller_community_id() -> Result<(), Box<dyn std::error::Error>> {
        let g = triangle()?;
        let proc_mem = AlgoLouvain::init_proc_mem(g.size());
        let louvain = AlgoLouvain::new_no_compute(&g, Some(1), 0.01, 100)?;
        louvain.one_phase(&g, &proc_mem, -1.)?;
        // smallest id wins the tie, so everything lands in vertex 0's seed
        // community
        for u in 0..3 {
            assert_eq!(proc_mem.0.get(u).curr_comm, 0);
        }
        Ok(())
    }

    #[test]
    fn vertex_following_marks_isolated_and_followers() -> Result<(), Box<dyn std::error::Error>> {
        let g = path2()?;
        let mut clusters = ProceduralMemoryMut::from_value(g.size(), UNASSIGNED);
        let followed = vertex_following(&g, &mut clusters)?;
        // the larger endpoint follows the smaller one
        assert_eq!(followed, 1);
        assert_eq!(*clusters.get(0), 0);
        assert_eq!(*clusters.get(1), 0);
        Ok(())
    }

    #[test]
    fn vertex_following_collapses_star_leaves() -> Result<(), Box<dyn std::error::Error>> {
        let g = star(6)?;
        let mut clusters = ProceduralMemoryMut::from_value(g.size(), UNASSIGNED);
        let followed = vertex_following(&g, &mut clusters)?;
        assert_eq!(followed, 5);
        for leaf in 1..6 {
            assert_eq!(*clusters.get(leaf), 0);
        }
        assert_eq!(*clusters.get(0), 0);
        Ok(())
    }

    #[test]
    fn vertex_following_counts_isolated_vertices() -> Result<(), Box<dyn std::error::Error>> {
        let g = CsrGraph::from_undirected(4, &[(1, 2, 1)], Some(2))?;
        let mut clusters = ProceduralMemoryMut::from_value(g.size(), UNASSIGNED);
        let followed = vertex_following(&g, &mut clusters)?;
        // two isolated vertices, plus vertex 2 collapsing into its mutual
        // pair partner 1
        assert_eq!(followed, 3);
        assert_eq!(*clusters.get(0), ISOLATED);
        assert_eq!(*clusters.get(3), ISOLATED);
        assert_eq!(*clusters.get(1), 1);
        assert_eq!(*clusters.get(2), 1);
        Ok(())
    }

    #[test]
    fn multi_phase_contracts_when_enabled() -> Result<(), Box<dyn std::error::Error>> {
        // min_graph_size 1 forces a second phase over the contracted graph
        let g = two_triangles_bridge()?;
        let louvain = AlgoLouvain::with_conf(&g, Some(2), 0.001, 1)?;
        let clusters = louvain.clusters();
        assert_eq!(clusters[0], clusters[1]);
        assert_eq!(clusters[3], clusters[4]);
        assert!(louvain.community_count() >= 1);
        assert!(louvain.partition_modularity() > 0.3);
        Ok(())
    }

    #[test]
    fn contraction_conserves_total_degree_weight() -> Result<(), Box<dyn std::error::Error>> {
        let g = two_triangles_bridge()?;
        let louvain = AlgoLouvain::new_no_compute(&g, Some(2), 0.01, 100)?;
        let proc_mem = AlgoLouvain::init_proc_mem(g.size());
        louvain.one_phase(&g, &proc_mem, -1.)?;

        let nodes = proc_mem.0.shared_slice();
        let mut renumber = vec![UNASSIGNED; g.size()];
        let comm_count = renumber_clusters_contiguously(&nodes, g.size(), &mut renumber);
        assert_eq!(comm_count, 2);

        let contracted = contract(&g, &nodes, &renumber, comm_count, 2)?;
        let before: u64 = (0..g.size()).map(|u| g.vertex_weight(u)).sum();
        let after: u64 = (0..contracted.size())
            .map(|u| contracted.vertex_weight(u))
            .sum();
        assert_eq!(before, after);
        Ok(())
    }
}
