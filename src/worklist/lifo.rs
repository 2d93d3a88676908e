use super::chunk::{Chunk, CHUNK_SIZE};

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

const LOCK_BIT: usize = 1;

/// A pointer-sized word holding a chunk address and a low-bit lock.
///
/// `cas` never acquires the lock; it compares against the untagged value, so
/// it simply fails while a holder has the bit set. The locked critical
/// sections are O(1) (detach one chunk), which keeps contention bounded.
pub(super) struct PtrLock {
    word: AtomicUsize,
}

impl PtrLock {
    pub(super) const fn new() -> Self {
        PtrLock {
            word: AtomicUsize::new(0),
        }
    }

    /// Current pointer value, lock bit masked off.
    #[inline(always)]
    pub(super) fn value(&self) -> usize {
        self.word.load(Ordering::Acquire) & !LOCK_BIT
    }

    /// Replaces `old` with `new` unless the word is locked or has moved.
    /// Both arguments must be untagged pointers.
    #[inline]
    pub(super) fn cas(&self, old: usize, new: usize) -> bool {
        debug_assert_eq!(old & LOCK_BIT, 0);
        debug_assert_eq!(new & LOCK_BIT, 0);
        self.word
            .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub(super) fn try_lock(&self) -> bool {
        let w = self.word.load(Ordering::Relaxed);
        if w & LOCK_BIT != 0 {
            return false;
        }
        self.word
            .compare_exchange(w, w | LOCK_BIT, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub(super) fn lock(&self) {
        loop {
            if self.try_lock() {
                return;
            }
            std::hint::spin_loop();
        }
    }

    /// Pointer value while the caller holds the lock.
    #[inline(always)]
    pub(super) fn locked_value(&self) -> usize {
        self.word.load(Ordering::Relaxed) & !LOCK_BIT
    }

    #[inline]
    pub(super) fn unlock(&self) {
        self.word.fetch_and(!LOCK_BIT, Ordering::Release);
    }

    /// Releases the lock and installs `new` (untagged) in one store.
    #[inline]
    pub(super) fn unlock_and_set(&self, new: usize) {
        debug_assert_eq!(new & LOCK_BIT, 0);
        self.word.store(new, Ordering::Release);
    }
}

/// Lock-free LIFO stack of [`Chunk`]s.
///
/// `push` is a Treiber compare-and-swap loop and never blocks. `pop` and
/// `steal` serialize on the head lock; `steal` only try-locks, so a thief
/// never waits on a contended victim. A chunk is on at most one stack at a
/// time, and the stack owns whatever chain remains when it drops.
pub struct LifoStack<T: Copy, const K: usize = CHUNK_SIZE> {
    head: PtrLock,
    _marker: PhantomData<*mut Chunk<T, K>>,
}

unsafe impl<T: Copy + Send, const K: usize> Send for LifoStack<T, K> {}
unsafe impl<T: Copy + Send, const K: usize> Sync for LifoStack<T, K> {}

#[allow(dead_code)]
impl<T: Copy, const K: usize> LifoStack<T, K> {
    pub const fn new() -> Self {
        LifoStack {
            head: PtrLock::new(),
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub fn empty(&self) -> bool {
        self.head.value() == 0
    }

    /// Links `chunk` in as the new head. Retries until the CAS wins; each
    /// failed attempt means either a concurrent push or a locked holder, both
    /// of which resolve in O(1).
    pub fn push(&self, chunk: NonNull<Chunk<T, K>>) {
        debug_assert_eq!(chunk.as_ptr() as usize & LOCK_BIT, 0);
        loop {
            let old = self.head.value();
            unsafe { (*chunk.as_ptr()).next = old as *mut Chunk<T, K> };
            if self.head.cas(old, chunk.as_ptr() as usize) {
                return;
            }
            std::hint::spin_loop();
        }
    }

    pub fn pushi(&self, chunk: NonNull<Chunk<T, K>>) {
        self.push(chunk);
    }

    /// Detaches and returns the head chunk.
    pub fn pop(&self) -> Option<NonNull<Chunk<T, K>>> {
        // lock-free fast path: an empty read may miss a concurrent push, which
        // only delays that work, never loses it
        if self.empty() {
            return None;
        }
        self.head.lock();
        let chunk = self.head.locked_value() as *mut Chunk<T, K>;
        if chunk.is_null() {
            self.head.unlock();
            return None;
        }
        let next = unsafe { (*chunk).next };
        self.head.unlock_and_set(next as usize);
        unsafe { (*chunk).next = std::ptr::null_mut() };
        NonNull::new(chunk)
    }

    /// As [`pop`](Self::pop), called by a thief on another worker's stack:
    /// backs off with `None` instead of waiting when the head is contended.
    pub fn steal(&self) -> Option<NonNull<Chunk<T, K>>> {
        if self.empty() {
            return None;
        }
        if !self.head.try_lock() {
            return None;
        }
        let chunk = self.head.locked_value() as *mut Chunk<T, K>;
        if chunk.is_null() {
            self.head.unlock();
            return None;
        }
        let next = unsafe { (*chunk).next };
        self.head.unlock_and_set(next as usize);
        unsafe { (*chunk).next = std::ptr::null_mut() };
        NonNull::new(chunk)
    }
}

impl<T: Copy, const K: usize> Default for LifoStack<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const K: usize> Drop for LifoStack<T, K> {
    fn drop(&mut self) {
        while let Some(chunk) = self.pop() {
            unsafe { drop(Box::from_raw(chunk.as_ptr())) };
        }
    }
}
