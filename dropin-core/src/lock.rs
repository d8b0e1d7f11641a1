//! Re-entrant reader/writer lock with scoped guards.
//!
//! The lock coordinates compound operations (register a deployer and open it
//! on every directory, add a directory and open every deployer on it) that may
//! call back into the same component on the same thread. A thread that already
//! holds the lock re-acquires it for free; the lock is only released when the
//! outermost guard of that thread is dropped.
//!
//! Rules:
//! - write while holding write, read while holding read or write: no-op.
//! - write while being the only reader: upgrade in place.
//! - write while other threads read: wait.
//!
//! The lock guards no data. Callers keep the protected state in a plain mutex
//! that is only held for short, callback-free sections.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Holders {
    writer: Option<ThreadId>,
    write_holds: usize,
    readers: HashMap<ThreadId, usize>,
}

#[derive(Debug, Default)]
pub struct ReentrantRwLock {
    holders: Mutex<Holders>,
    released: Condvar,
}

impl ReentrantRwLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write side, blocking while other threads hold the lock.
    pub fn write(&self) -> WriteGuard<'_> {
        let me = thread::current().id();
        let mut holders = self.holders.lock();
        if holders.writer == Some(me) {
            holders.write_holds += 1;
            return WriteGuard::new(self);
        }
        while holders.writer.is_some() || holders.readers.keys().any(|reader| *reader != me) {
            self.released.wait(&mut holders);
        }
        holders.writer = Some(me);
        holders.write_holds = 1;
        WriteGuard::new(self)
    }

    /// Acquire the read side, blocking while another thread writes.
    pub fn read(&self) -> ReadGuard<'_> {
        let me = thread::current().id();
        let mut holders = self.holders.lock();
        let reentrant = holders.writer == Some(me) || holders.readers.contains_key(&me);
        if !reentrant {
            while holders.writer.is_some() {
                self.released.wait(&mut holders);
            }
        }
        *holders.readers.entry(me).or_insert(0) += 1;
        ReadGuard::new(self)
    }

    /// Number of write guards the calling thread currently holds.
    pub fn write_hold_count(&self) -> usize {
        let holders = self.holders.lock();
        if holders.writer == Some(thread::current().id()) {
            holders.write_holds
        } else {
            0
        }
    }

    /// Number of read guards the calling thread currently holds.
    pub fn read_hold_count(&self) -> usize {
        let holders = self.holders.lock();
        holders
            .readers
            .get(&thread::current().id())
            .copied()
            .unwrap_or(0)
    }

    pub fn is_write_locked_by_current_thread(&self) -> bool {
        self.write_hold_count() > 0
    }

    fn release_write(&self) {
        let mut holders = self.holders.lock();
        holders.write_holds = holders.write_holds.saturating_sub(1);
        if holders.write_holds == 0 {
            holders.writer = None;
            self.released.notify_all();
        }
    }

    fn release_read(&self) {
        let me = thread::current().id();
        let mut holders = self.holders.lock();
        let remaining = match holders.readers.get_mut(&me) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => return,
        };
        if remaining == 0 {
            holders.readers.remove(&me);
            self.released.notify_all();
        }
    }
}

/// Scoped write hold; `!Send` because holds are tracked per thread.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a ReentrantRwLock,
    _not_send: PhantomData<*const ()>,
}

impl<'a> WriteGuard<'a> {
    fn new(lock: &'a ReentrantRwLock) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

/// Scoped read hold; `!Send` because holds are tracked per thread.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a ReentrantRwLock,
    _not_send: PhantomData<*const ()>,
}

impl<'a> ReadGuard<'a> {
    fn new(lock: &'a ReentrantRwLock) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}
