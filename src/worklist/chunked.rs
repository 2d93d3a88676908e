use super::chunk::{Chunk, ChunkSlab, CHUNK_SIZE};
use super::stealing::ChunkQueue;

use std::marker::PhantomData;
use std::ptr::NonNull;

/// User-facing chunked worklist over any [`ChunkQueue`].
///
/// The shared half routes whole chunks; each worker registers once and keeps
/// the returned [`WorkerHandle`] for its lifetime, giving it a private current
/// chunk and a private slab. Items are LIFO within a chunk and chunks are
/// LIFO on the stacks, so recently produced work runs first and a thief
/// imports a whole chunk's worth of items per synchronization.
pub struct ChunkedWorklist<T: Copy, Q, const K: usize = CHUNK_SIZE> {
    queue: Q,
    workers: usize,
    _marker: PhantomData<fn(T)>,
}

#[allow(dead_code)]
impl<T, Q, const K: usize> ChunkedWorklist<T, Q, K>
where
    T: Copy + Send,
    Q: ChunkQueue<T, K>,
{
    pub fn new(queue: Q, workers: usize) -> Self {
        assert!(workers > 0, "worklist needs at least one worker");
        ChunkedWorklist {
            queue,
            workers,
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Registers the caller as worker `id`. Ids must be unique per live
    /// worker and `< workers()`; they address the per-locality stacks.
    pub fn worker(&self, id: usize) -> WorkerHandle<'_, T, Q, K> {
        assert!(id < self.workers, "worker id {id} >= {}", self.workers);
        WorkerHandle {
            id,
            cur: None,
            slab: ChunkSlab::new(),
            wl: self,
        }
    }
}

/// A worker's private view of a [`ChunkedWorklist`].
pub struct WorkerHandle<'a, T: Copy, Q, const K: usize = CHUNK_SIZE>
where
    T: Send,
    Q: ChunkQueue<T, K>,
{
    id: usize,
    cur: Option<NonNull<Chunk<T, K>>>,
    slab: ChunkSlab<T, K>,
    wl: &'a ChunkedWorklist<T, Q, K>,
}

#[allow(dead_code)]
impl<'a, T, Q, const K: usize> WorkerHandle<'a, T, Q, K>
where
    T: Copy + Send,
    Q: ChunkQueue<T, K>,
{
    #[inline(always)]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Pushes one item, publishing the current chunk when it is full. The
    /// push after a publication always lands because the fresh chunk is empty.
    pub fn push(&mut self, val: T) {
        if let Some(cur) = self.cur {
            if unsafe { (*cur.as_ptr()).push(val) } {
                return;
            }
            self.wl.queue.push(self.id, cur);
            self.cur = None;
        }
        let fresh = self.slab.alloc();
        unsafe { (*fresh.as_ptr()).push(val) };
        self.cur = Some(fresh);
    }

    /// Bulk push: fills and publishes chunks until `vals` is drained.
    pub fn push_slice(&mut self, vals: &[T]) {
        let mut rest = vals;
        while !rest.is_empty() {
            if self.cur.is_none() {
                self.cur = Some(self.slab.alloc());
            }
            let cur = self.cur.unwrap();
            let consumed = unsafe { (*cur.as_ptr()).push_slice(rest) };
            rest = &rest[consumed..];
            if !rest.is_empty() {
                self.wl.queue.push(self.id, cur);
                self.cur = None;
            }
        }
    }

    /// Seeds items through the initial-queue path, bypassing the current
    /// chunk; used by drivers before kick-off.
    pub fn seed_slice(&mut self, vals: &[T]) {
        let mut rest = vals;
        while !rest.is_empty() {
            let chunk = self.slab.alloc();
            let consumed = unsafe { (*chunk.as_ptr()).push_slice(rest) };
            rest = &rest[consumed..];
            self.wl.queue.pushi(self.id, chunk);
        }
    }

    /// Pops the most recent local item, fetching a chunk from the shared
    /// queue when the current one drains.
    pub fn pop(&mut self) -> Option<T> {
        if let Some(cur) = self.cur {
            if let Some(val) = unsafe { (*cur.as_ptr()).pop() } {
                return Some(val);
            }
            self.slab.free(cur);
            self.cur = None;
        }
        loop {
            let chunk = self.wl.queue.pop(self.id)?;
            if let Some(val) = unsafe { (*chunk.as_ptr()).pop() } {
                self.cur = Some(chunk);
                return Some(val);
            }
            // published chunks are never empty, but a recycled one costs
            // nothing to skip
            self.slab.free(chunk);
        }
    }
}

impl<'a, T, Q, const K: usize> Drop for WorkerHandle<'a, T, Q, K>
where
    T: Copy + Send,
    Q: ChunkQueue<T, K>,
{
    fn drop(&mut self) {
        // unpopped items stay reachable for the remaining workers
        if let Some(cur) = self.cur.take() {
            if unsafe { (*cur.as_ptr()).empty() } {
                self.slab.free(cur);
            } else {
                self.wl.queue.push(self.id, cur);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::worklist::stealing::WorklistQueue;

    use paste::paste;
    use rand::seq::SliceRandom;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn single_worker_is_lifo() {
        let wl = ChunkedWorklist::<usize, _, 4>::new(WorklistQueue::<usize, 4>::with_workers(1), 1);
        let mut w = wl.worker(0);
        for i in 0..10 {
            w.push(i);
        }
        for i in (0..10).rev() {
            assert_eq!(w.pop(), Some(i));
        }
        assert_eq!(w.pop(), None);
    }

    #[test]
    fn publication_spills_full_chunks_to_shared_queue() {
        let wl = ChunkedWorklist::<usize, _, 4>::new(WorklistQueue::<usize, 4>::with_workers(2), 2);
        let mut producer = wl.worker(0);
        producer.push_slice(&(0..9).collect::<Vec<_>>());
        // 9 items over chunks of 4: two full chunks published, one current
        let mut thief = wl.worker(1);
        let mut stolen = Vec::new();
        while let Some(v) = thief.pop() {
            stolen.push(v);
        }
        assert_eq!(stolen.len(), 8);
        let mut rest = Vec::new();
        while let Some(v) = producer.pop() {
            rest.push(v);
        }
        assert_eq!(rest, vec![8]);
    }

    #[test]
    fn seeds_bypass_the_current_chunk() {
        let wl = ChunkedWorklist::<usize, _, 4>::new(WorklistQueue::<usize, 4>::with_workers(2), 2);
        let mut w = wl.worker(0);
        w.seed_slice(&[1, 2, 3]);
        // seeding leaves no current chunk behind, so another worker can take
        // everything
        let mut other = wl.worker(1);
        let mut got = Vec::new();
        while let Some(v) = other.pop() {
            got.push(v);
        }
        got.sort_unstable();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn dropped_handle_publishes_leftovers() {
        let wl = ChunkedWorklist::<usize, _, 4>::new(WorklistQueue::<usize, 4>::with_workers(2), 2);
        {
            let mut w = wl.worker(0);
            w.push(77);
        }
        let mut other = wl.worker(1);
        assert_eq!(other.pop(), Some(77));
    }

    fn stress(workers: usize, per_worker: usize) {
        let wl = ChunkedWorklist::<usize, _, CHUNK_SIZE>::new(
            WorklistQueue::<usize>::with_workers(workers),
            workers,
        );
        let seen = Mutex::new(HashSet::new());

        crossbeam::thread::scope(|scope| {
            for tid in 0..workers {
                let wl = &wl;
                let seen = &seen;
                scope.spawn(move |_| {
                    let mut rng = rand::thread_rng();
                    let mut w = wl.worker(tid);
                    let mut vals = (tid * per_worker..(tid + 1) * per_worker).collect::<Vec<_>>();
                    vals.shuffle(&mut rng);
                    for batch in vals.chunks(97) {
                        w.push_slice(batch);
                        // drain a little between batches to mix pops with
                        // pushes and trigger steals on the siblings
                        for _ in 0..16 {
                            if let Some(v) = w.pop() {
                                assert!(seen.lock().unwrap().insert(v), "duplicate {v}");
                            }
                        }
                    }
                    while let Some(v) = w.pop() {
                        assert!(seen.lock().unwrap().insert(v), "duplicate {v}");
                    }
                });
            }
        })
        .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), workers * per_worker, "lost items");
        for v in 0..workers * per_worker {
            assert!(seen.contains(&v), "missing item {v}");
        }
    }

    macro_rules! stress_tests {
        ($($name:ident => ($workers:expr, $per_worker:expr),)*) => {
            $(
                paste! {
                    #[test]
                    fn [<stress_ $name>]() {
                        stress($workers, $per_worker)
                    }
                }
            )*
        }
    }

    stress_tests! {
        two_workers => (2, 10_000),
        four_workers => (4, 10_000),
        eight_workers => (8, 10_000),
    }
}
