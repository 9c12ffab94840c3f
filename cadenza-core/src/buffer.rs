// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `buffer` module provides reference-counted byte buffers and a fixed-slot buffer pool.
//!
//! A [`Buffer`] is a cheaply-cloneable handle to a shared byte region. Every clone carries its
//! own window onto the underlying bytes, so two handles to the same buffer may expose different
//! slices. The underlying storage is released exactly once, when the last handle is dropped.
//!
//! A [`BufferPool`] recycles fixed-size buffers: dropping the last handle to a pooled buffer
//! returns its slot to the pool instead of freeing it. Pools may be retired while buffers are
//! still outstanding; the pool's storage lives until the final holder lets go.

use std::mem;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;

bitflags! {
    /// Buffer behaviour flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u32 {
        /// The buffer refuses writable access even when uniquely held.
        const READONLY = 0x01;
        /// The buffer storage may be resized in place. Set only for buffers whose storage was
        /// allocated by this module.
        const REALLOCATABLE = 0x02;
    }
}

enum Storage {
    Heap(Vec<u8>),
    Pooled { data: Vec<u8>, pool: Arc<PoolShared> },
}

impl Storage {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Heap(v) => v,
            Storage::Pooled { data, .. } => data,
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::Heap(v) => v,
            Storage::Pooled { data, .. } => data,
        }
    }
}

struct Inner {
    storage: Storage,
    flags: BufferFlags,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Pooled storage goes back to its pool; heap storage is freed by Vec.
        if let Storage::Pooled { data, pool } = &mut self.storage {
            let data = mem::take(data);
            pool.release(data);
        }
    }
}

/// A reference-counted byte buffer carrying its own view window.
pub struct Buffer {
    inner: Arc<Inner>,
    offset: usize,
    len: usize,
}

impl Buffer {
    /// Allocate a new buffer of `len` bytes.
    pub fn alloc(len: usize) -> Buffer {
        Buffer::from_vec(vec![0; len])
    }

    /// Allocate a new zero-filled buffer of `len` bytes.
    pub fn alloc_zeroed(len: usize) -> Buffer {
        Buffer::from_vec(vec![0; len])
    }

    /// Wrap caller-provided bytes. The buffer is writable and reallocatable.
    pub fn from_vec(data: Vec<u8>) -> Buffer {
        let len = data.len();
        Buffer {
            inner: Arc::new(Inner {
                storage: Storage::Heap(data),
                flags: BufferFlags::REALLOCATABLE,
            }),
            offset: 0,
            len,
        }
    }

    /// Wrap caller-owned bytes with explicit flags. `REALLOCATABLE` is ignored: foreign storage
    /// is never resized in place.
    pub fn from_boxed(data: Box<[u8]>, flags: BufferFlags) -> Buffer {
        let len = data.len();
        Buffer {
            inner: Arc::new(Inner {
                storage: Storage::Heap(data.into_vec()),
                flags: flags - BufferFlags::REALLOCATABLE,
            }),
            offset: 0,
            len,
        }
    }

    fn from_pool(data: Vec<u8>, pool: Arc<PoolShared>) -> Buffer {
        let len = data.len();
        Buffer {
            inner: Arc::new(Inner {
                storage: Storage::Pooled { data, pool },
                flags: BufferFlags::empty(),
            }),
            offset: 0,
            len,
        }
    }

    /// Get the bytes visible through this handle's window.
    pub fn data(&self) -> &[u8] {
        &self.inner.storage.bytes()[self.offset..self.offset + self.len]
    }

    /// Get the length of this handle's window.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if this handle's window is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the number of handles sharing the underlying buffer.
    pub fn shared_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// A buffer is writable when it is not read-only and this is the only handle.
    pub fn is_writable(&self) -> bool {
        !self.inner.flags.contains(BufferFlags::READONLY) && Arc::strong_count(&self.inner) == 1
    }

    /// Get mutable access to the window. Returns `None` unless [`Buffer::is_writable`].
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        if self.inner.flags.contains(BufferFlags::READONLY) {
            return None;
        }
        let offset = self.offset;
        let len = self.len;
        Arc::get_mut(&mut self.inner)
            .map(|inner| &mut inner.storage.bytes_mut()[offset..offset + len])
    }

    /// Ensure this handle is writable, copying the window into fresh storage if it is shared or
    /// read-only.
    pub fn make_writable(&mut self) {
        if self.is_writable() {
            return;
        }
        let copy = self.data().to_vec();
        *self = Buffer::from_vec(copy);
    }

    /// Resize the buffer to `len` bytes.
    ///
    /// Resizes in place only when the storage was allocated by this module, the handle is
    /// writable, and the window covers the whole underlying buffer. Otherwise new storage is
    /// allocated and `min(old, new)` bytes are preserved.
    pub fn realloc(&mut self, len: usize) {
        let in_place = self.inner.flags.contains(BufferFlags::REALLOCATABLE)
            && self.is_writable()
            && self.offset == 0
            && self.len == self.inner.storage.bytes().len();

        if in_place {
            if let Some(inner) = Arc::get_mut(&mut self.inner) {
                if let Storage::Heap(v) = &mut inner.storage {
                    v.resize(len, 0);
                    self.len = len;
                    return;
                }
            }
        }

        let mut data = vec![0; len];
        let keep = self.len.min(len);
        data[..keep].copy_from_slice(&self.data()[..keep]);
        *self = Buffer::from_vec(data);
    }

    /// Create a new handle to the same buffer exposing a sub-window.
    ///
    /// # Panics
    ///
    /// Panics if the requested window exceeds the current one.
    pub fn slice(&self, offset: usize, len: usize) -> Buffer {
        assert!(offset + len <= self.len);
        Buffer { inner: Arc::clone(&self.inner), offset: self.offset + offset, len }
    }

    /// Shrink this handle's window to the first `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }
}

impl Clone for Buffer {
    fn clone(&self) -> Buffer {
        Buffer { inner: Arc::clone(&self.inner), offset: self.offset, len: self.len }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("shared", &self.shared_count())
            .finish()
    }
}

struct PoolShared {
    slot_size: usize,
    state: Mutex<PoolState>,
}

struct PoolState {
    free: Vec<Vec<u8>>,
    retired: bool,
}

impl PoolShared {
    fn release(&self, data: Vec<u8>) {
        let mut state = self.state.lock();
        if !state.retired {
            state.free.push(data);
        }
    }
}

/// A pool of fixed-size buffers.
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Create a pool handing out buffers of `slot_size` bytes.
    pub fn new(slot_size: usize) -> BufferPool {
        BufferPool {
            shared: Arc::new(PoolShared {
                slot_size,
                state: Mutex::new(PoolState { free: Vec::new(), retired: false }),
            }),
        }
    }

    /// Get the pool's slot size.
    pub fn slot_size(&self) -> usize {
        self.shared.slot_size
    }

    /// Get a buffer from the pool, recycling an idle slot when one is available.
    ///
    /// Recycled slots retain their previous contents.
    pub fn get(&self) -> Buffer {
        let slot = self.shared.state.lock().free.pop();
        let data = slot.unwrap_or_else(|| vec![0; self.shared.slot_size]);
        Buffer::from_pool(data, Arc::clone(&self.shared))
    }

    /// Get the number of idle slots currently held by the pool.
    pub fn idle_slots(&self) -> usize {
        self.shared.state.lock().free.len()
    }

    /// Retire the pool.
    ///
    /// Idle slots are freed immediately. Outstanding buffers remain valid; their storage is
    /// freed (not re-queued) as they are dropped, and the pool's shared state is freed when the
    /// last of them lets go.
    pub fn retire(self) {
        let mut state = self.shared.state.lock();
        state.retired = true;
        state.free.clear();
    }
}

impl Clone for BufferPool {
    fn clone(&self) -> BufferPool {
        BufferPool { shared: Arc::clone(&self.shared) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_clone_shares_and_drop_releases() {
        let buf = Buffer::from_vec(vec![1, 2, 3, 4]);
        assert_eq!(buf.shared_count(), 1);

        let other = buf.clone();
        assert_eq!(buf.shared_count(), 2);
        assert_eq!(other.data(), &[1, 2, 3, 4]);

        drop(other);
        assert_eq!(buf.shared_count(), 1);
    }

    #[test]
    fn verify_slices_share_storage_with_distinct_windows() {
        let buf = Buffer::from_vec(vec![0, 1, 2, 3, 4, 5, 6, 7]);
        let head = buf.slice(0, 4);
        let tail = buf.slice(4, 4);

        assert_eq!(head.data(), &[0, 1, 2, 3]);
        assert_eq!(tail.data(), &[4, 5, 6, 7]);
        assert_eq!(buf.shared_count(), 3);
    }

    #[test]
    fn verify_writability_requires_unique_handle() {
        let mut buf = Buffer::from_vec(vec![0; 8]);
        assert!(buf.is_writable());

        let other = buf.clone();
        assert!(!buf.is_writable());
        assert!(buf.data_mut().is_none());

        drop(other);
        assert!(buf.is_writable());
        buf.data_mut().unwrap()[0] = 0xAA;
        assert_eq!(buf.data()[0], 0xAA);
    }

    #[test]
    fn verify_readonly_refuses_writability() {
        let mut buf = Buffer::from_boxed(vec![0; 4].into_boxed_slice(), BufferFlags::READONLY);
        assert!(!buf.is_writable());
        assert!(buf.data_mut().is_none());

        // make_writable produces a private, writable copy.
        buf.make_writable();
        assert!(buf.is_writable());
    }

    #[test]
    fn verify_make_writable_copies_on_contention() {
        let mut buf = Buffer::from_vec(vec![7; 4]);
        let other = buf.clone();

        buf.make_writable();
        buf.data_mut().unwrap()[0] = 9;

        assert_eq!(buf.data(), &[9, 7, 7, 7]);
        assert_eq!(other.data(), &[7, 7, 7, 7]);
    }

    #[test]
    fn verify_realloc_preserves_prefix() {
        let mut buf = Buffer::from_vec(vec![1, 2, 3, 4]);
        buf.realloc(6);
        assert_eq!(buf.data(), &[1, 2, 3, 4, 0, 0]);

        // Shared buffers realloc into fresh storage.
        let other = buf.clone();
        buf.realloc(2);
        assert_eq!(buf.data(), &[1, 2]);
        assert_eq!(other.data(), &[1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn verify_realloc_of_slice_copies() {
        let buf = Buffer::from_vec(vec![1, 2, 3, 4]);
        let mut tail = buf.slice(2, 2);
        drop(buf);

        // Unique, but the window does not cover the whole allocation.
        tail.realloc(3);
        assert_eq!(tail.data(), &[3, 4, 0]);
    }

    #[test]
    fn verify_pool_recycles_slots() {
        let pool = BufferPool::new(16);
        assert_eq!(pool.idle_slots(), 0);

        let mut buf = pool.get();
        assert_eq!(buf.len(), 16);
        buf.data_mut().unwrap()[0] = 0x5A;
        drop(buf);
        assert_eq!(pool.idle_slots(), 1);

        // Recycled slot keeps its previous contents.
        let buf = pool.get();
        assert_eq!(pool.idle_slots(), 0);
        assert_eq!(buf.data()[0], 0x5A);
    }

    #[test]
    fn verify_pool_clone_outstanding_across_retire() {
        let pool = BufferPool::new(8);
        let buf = pool.get();
        let idle = pool.get();
        drop(idle);
        assert_eq!(pool.idle_slots(), 1);

        pool.retire();

        // The outstanding buffer is still usable, and dropping it after retirement must not
        // re-queue the slot anywhere.
        assert_eq!(buf.len(), 8);
        drop(buf);
    }
}
