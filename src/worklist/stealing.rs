use super::chunk::{Chunk, CHUNK_SIZE};
use super::lifo::LifoStack;

use crossbeam::utils::CachePadded;
use std::ptr::NonNull;

/// Routing surface shared by every chunk-level scheduler layer.
///
/// `worker` is the caller's effective id, assigned once at registration and
/// stable for the worker's lifetime; implementations use it to address
/// per-locality state, never thread-locals.
pub trait ChunkQueue<T: Copy, const K: usize = CHUNK_SIZE>: Send + Sync
where
    T: Send,
{
    /// Publishes a chunk produced by running work.
    fn push(&self, worker: usize, chunk: NonNull<Chunk<T, K>>);

    /// Publishes a seed chunk ahead of kick-off.
    fn pushi(&self, worker: usize, chunk: NonNull<Chunk<T, K>>);

    /// Fetches a chunk for `worker`, or `None` when nothing is reachable.
    fn pop(&self, worker: usize) -> Option<NonNull<Chunk<T, K>>>;
}

/// A single global stack is the simplest queue: every worker shares it.
impl<T: Copy + Send, const K: usize> ChunkQueue<T, K> for LifoStack<T, K> {
    fn push(&self, _worker: usize, chunk: NonNull<Chunk<T, K>>) {
        LifoStack::push(self, chunk);
    }

    fn pushi(&self, _worker: usize, chunk: NonNull<Chunk<T, K>>) {
        LifoStack::pushi(self, chunk);
    }

    fn pop(&self, _worker: usize) -> Option<NonNull<Chunk<T, K>>> {
        LifoStack::pop(self)
    }
}

/// One stack per scheduling locality; chunks never migrate between slots.
pub struct LocalQueues<T: Copy, const K: usize = CHUNK_SIZE> {
    local: Box<[CachePadded<LifoStack<T, K>>]>,
}

#[allow(dead_code)]
impl<T: Copy, const K: usize> LocalQueues<T, K> {
    pub fn new(workers: usize) -> Self {
        assert!(workers > 0, "worklist needs at least one worker slot");
        LocalQueues {
            local: (0..workers)
                .map(|_| CachePadded::new(LifoStack::new()))
                .collect(),
        }
    }

    #[inline(always)]
    pub fn workers(&self) -> usize {
        self.local.len()
    }

    #[inline(always)]
    pub(super) fn stack(&self, worker: usize) -> &LifoStack<T, K> {
        &self.local[worker]
    }
}

impl<T: Copy + Send, const K: usize> ChunkQueue<T, K> for LocalQueues<T, K> {
    fn push(&self, worker: usize, chunk: NonNull<Chunk<T, K>>) {
        self.stack(worker).push(chunk);
    }

    fn pushi(&self, worker: usize, chunk: NonNull<Chunk<T, K>>) {
        self.stack(worker).pushi(chunk);
    }

    fn pop(&self, worker: usize) -> Option<NonNull<Chunk<T, K>>> {
        self.stack(worker).pop()
    }
}

/// [`LocalQueues`] plus stealing: local pop first, then one round-robin sweep
/// over the other slots starting at `(worker + 1) % n`, try-locking each.
///
/// The deterministic victim order avoids convoys and keeps runs reproducible;
/// a sweep that finds every sibling empty or contended reports `None` and the
/// caller decides whether to retry.
pub struct StealingQueue<T: Copy, const K: usize = CHUNK_SIZE> {
    local: LocalQueues<T, K>,
}

#[allow(dead_code)]
impl<T: Copy, const K: usize> StealingQueue<T, K> {
    pub fn new(workers: usize) -> Self {
        StealingQueue {
            local: LocalQueues::new(workers),
        }
    }

    #[inline(always)]
    pub fn workers(&self) -> usize {
        self.local.workers()
    }
}

impl<T: Copy + Send, const K: usize> ChunkQueue<T, K> for StealingQueue<T, K> {
    fn push(&self, worker: usize, chunk: NonNull<Chunk<T, K>>) {
        self.local.stack(worker).push(chunk);
    }

    fn pushi(&self, worker: usize, chunk: NonNull<Chunk<T, K>>) {
        self.local.stack(worker).pushi(chunk);
    }

    fn pop(&self, worker: usize) -> Option<NonNull<Chunk<T, K>>> {
        if let Some(chunk) = self.local.stack(worker).pop() {
            return Some(chunk);
        }
        let n = self.local.workers();
        let mut id = worker;
        for _ in 0..n {
            id = (id + 1) % n;
            if let Some(chunk) = self.local.stack(id).steal() {
                return Some(chunk);
            }
        }
        None
    }
}

/// Composes a seed queue with a running queue: `pushi` lands in `seeds`,
/// `push` in `running`, and `pop` drains running work before seeds, so seeds
/// feed workers exactly as stealing spins up.
pub struct SeededQueue<I, R> {
    seeds: I,
    running: R,
}

#[allow(dead_code)]
impl<I, R> SeededQueue<I, R> {
    pub fn new(seeds: I, running: R) -> Self {
        SeededQueue { seeds, running }
    }
}

impl<T, I, R, const K: usize> ChunkQueue<T, K> for SeededQueue<I, R>
where
    T: Copy + Send,
    I: ChunkQueue<T, K>,
    R: ChunkQueue<T, K>,
{
    fn push(&self, worker: usize, chunk: NonNull<Chunk<T, K>>) {
        self.running.push(worker, chunk);
    }

    fn pushi(&self, worker: usize, chunk: NonNull<Chunk<T, K>>) {
        self.seeds.pushi(worker, chunk);
    }

    fn pop(&self, worker: usize) -> Option<NonNull<Chunk<T, K>>> {
        if let Some(chunk) = self.running.pop(worker) {
            return Some(chunk);
        }
        self.seeds.pop(worker)
    }
}

/// The default scheduler stack: a global seed queue over per-worker stealing
/// queues.
pub type WorklistQueue<T, const K: usize = CHUNK_SIZE> =
    SeededQueue<LifoStack<T, K>, StealingQueue<T, K>>;

#[allow(dead_code)]
impl<T: Copy, const K: usize> SeededQueue<LifoStack<T, K>, StealingQueue<T, K>> {
    pub fn with_workers(workers: usize) -> Self {
        SeededQueue::new(LifoStack::new(), StealingQueue::new(workers))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::worklist::chunk::ChunkSlab;

    fn chunk_of(slab: &mut ChunkSlab<usize, 8>, vals: &[usize]) -> NonNull<Chunk<usize, 8>> {
        let mut c = slab.alloc();
        for &v in vals {
            assert!(unsafe { c.as_mut().push(v) });
        }
        c
    }

    fn drain(
        slab: &mut ChunkSlab<usize, 8>,
        chunk: NonNull<Chunk<usize, 8>>,
    ) -> Vec<usize> {
        let mut chunk = chunk;
        let mut out = Vec::new();
        while let Some(v) = unsafe { chunk.as_mut().pop() } {
            out.push(v);
        }
        slab.free(chunk);
        out
    }

    #[test]
    fn local_queues_do_not_migrate_work() {
        let mut slab = ChunkSlab::<usize, 8>::new();
        let q = LocalQueues::<usize, 8>::new(2);
        q.push(0, chunk_of(&mut slab, &[1]));
        assert!(q.pop(1).is_none());
        let c = q.pop(0).expect("own work");
        assert_eq!(drain(&mut slab, c), vec![1]);
    }

    #[test]
    fn stealing_sweeps_round_robin_from_next_id() {
        let mut slab = ChunkSlab::<usize, 8>::new();
        let q = StealingQueue::<usize, 8>::new(4);
        q.push(1, chunk_of(&mut slab, &[11]));
        q.push(3, chunk_of(&mut slab, &[33]));

        // worker 0 sweeps 1, 2, 3 and must find worker 1's chunk first
        let c = q.pop(0).expect("stolen chunk");
        assert_eq!(drain(&mut slab, c), vec![11]);
        let c = q.pop(0).expect("second victim");
        assert_eq!(drain(&mut slab, c), vec![33]);
        assert!(q.pop(0).is_none());
    }

    #[test]
    fn local_work_wins_over_stealing() {
        let mut slab = ChunkSlab::<usize, 8>::new();
        let q = StealingQueue::<usize, 8>::new(2);
        q.push(0, chunk_of(&mut slab, &[5]));
        q.push(1, chunk_of(&mut slab, &[6]));
        let c = q.pop(0).expect("local chunk");
        assert_eq!(drain(&mut slab, c), vec![5]);
    }

    #[test]
    fn seeded_queue_prefers_running_work() {
        let mut slab = ChunkSlab::<usize, 8>::new();
        let q = WorklistQueue::<usize, 8>::with_workers(2);
        q.pushi(0, chunk_of(&mut slab, &[100]));
        q.push(0, chunk_of(&mut slab, &[200]));

        let c = q.pop(0).expect("running chunk");
        assert_eq!(drain(&mut slab, c), vec![200]);
        let c = q.pop(0).expect("seed chunk");
        assert_eq!(drain(&mut slab, c), vec![100]);
        assert!(q.pop(0).is_none());
    }

    #[test]
    fn seeds_reachable_from_any_worker() {
        let mut slab = ChunkSlab::<usize, 8>::new();
        let q = WorklistQueue::<usize, 8>::with_workers(3);
        q.pushi(0, chunk_of(&mut slab, &[42]));
        let c = q.pop(2).expect("seed visible to worker 2");
        assert_eq!(drain(&mut slab, c), vec![42]);
    }
}
