//! Chunked, work-stealing worklists for irregular per-vertex tasks.
//!
//! Items move between workers in fixed-capacity [`Chunk`]s: a worker fills a
//! private chunk, publishes it to a per-worker lock-free LIFO stack when it
//! is full, and idle workers steal whole chunks from their siblings. The
//! layers compose bottom-up: [`chunk`] (batches and their slab), [`lifo`]
//! (the CAS stack), [`stealing`] (per-locality routing, stealing, seeding)
//! and [`chunked`] (the per-worker adaptor).

pub mod chunk;
pub mod chunked;
pub mod lifo;
pub mod stealing;

pub use chunk::{Chunk, ChunkSlab, CHUNK_SIZE};
pub use chunked::{ChunkedWorklist, WorkerHandle};
pub use lifo::LifoStack;
pub use stealing::{ChunkQueue, LocalQueues, SeededQueue, StealingQueue, WorklistQueue};
