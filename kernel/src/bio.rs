//! The buffer cache is a fixed-size pool of disk block copies, shared across the whole kernel.
//! Caching disk blocks in memory reduces the number of disk reads and gives multiple processes a
//! single synchronization point for a given block.
//!
//! To keep `bget` from serializing every miss behind one global lock, the cache is split into
//! `NSLOT` buckets, each with its own lock and its own chain of buffers. A lookup only contends
//! with other lookups hashing to the same bucket; a miss that needs to steal a buffer from a
//! different bucket takes the global `move_lock` just long enough to relocate it.

use array_macro::array;

use crate::{
    param::MAXOPBLOCKS,
    sleeplock::{SleepLock, SleepLockGuard},
    spinlock::SpinLock,
    virtio::DISK,
};
use core::{
    ops::{Deref, DerefMut, Index, IndexMut},
    sync::atomic::{AtomicBool, Ordering},
};

pub const NBUF: usize = MAXOPBLOCKS * 3; // size of disk block cache
pub const BSIZE: usize = 4096; // size of disk block
pub const NSLOT: usize = 13; // number of hash buckets

fn hash(dev: u32, blockno: u32) -> usize {
    (dev as usize + blockno as usize) % NSLOT
}

pub static BCACHE: BCache = BCache::new();

pub struct BCache {
    /// held only while a buffer is being moved between slots, so two misses on different
    /// target slots never deadlock trying to steal from each other.
    move_lock: SpinLock<()>,
    slots: [SpinLock<Slot>; NSLOT],
    bufs: [Buf; NBUF],
}

impl BCache {
    const fn new() -> Self {
        Self {
            move_lock: SpinLock::new((), "bcache_move"),
            slots: array![_ => SpinLock::new(Slot::new(), "bcache_slot"); NSLOT],
            bufs: array![_ => Buf::new(); NBUF],
        }
    }

    pub fn init(&self) {
        // spread the NBUF physical buffers evenly across the NSLOT chains so that a fresh
        // cache doesn't force every early miss through the steal path.
        for i in 0..NBUF {
            let mut slot = self.slots[i % NSLOT].lock();
            slot.push_front(i);
            drop(slot);
        }
    }

    pub fn bread(&self, dev: u32, blockno: u32) -> BufGuard {
        let mut buf = self.bget(dev, blockno);

        if !self.bufs[buf.index].valid.load(Ordering::Relaxed) {
            DISK.read(&mut buf);
            self.bufs[buf.index].valid.store(true, Ordering::Relaxed);
        }
        buf
    }

    pub fn brelse(&self, index: usize) {
        self.bufs[index].meta.lock().refcnt -= 1;
    }

    pub unsafe fn bpin(&self, index: usize) {
        self.bufs[index].meta.lock().refcnt += 1;
    }

    pub unsafe fn bunpin(&self, index: usize) {
        self.bufs[index].meta.lock().refcnt -= 1;
    }

    /// Look up (dev, blockno) in the cache, returning a locked buffer.
    ///
    /// Fast path: the block is already cached in its home bucket.
    /// Slow path: it isn't, so we take `move_lock`, re-check the home bucket (another thread
    /// may have raced us to populate it, or a free buffer may already live there), and if still
    /// nothing is found, steal an unreferenced buffer from some other bucket and relink it into
    /// the home bucket under the new key.
    fn bget(&self, dev: u32, blockno: u32) -> BufGuard {
        let key = hash(dev, blockno);

        let mut target = self.slots[key].lock();
        if let Some(index) = target.find(&self.bufs, dev, blockno) {
            self.bufs[index].meta.lock().refcnt += 1;
            drop(target);
            return BufGuard {
                index,
                blockno,
                data: Some(self.bufs[index].data.lock()),
            };
        }
        drop(target);

        let _move_guard = self.move_lock.lock();
        let mut target = self.slots[key].lock();

        if let Some(index) = target.find(&self.bufs, dev, blockno) {
            self.bufs[index].meta.lock().refcnt += 1;
            drop(target);
            drop(_move_guard);
            return BufGuard {
                index,
                blockno,
                data: Some(self.bufs[index].data.lock()),
            };
        }

        if let Some(index) = target.take_free(&self.bufs) {
            target.push_front(index);

            let mut m = self.bufs[index].meta.lock();
            m.dev = dev;
            m.blockno = blockno;
            m.refcnt = 1;
            drop(m);
            self.bufs[index].valid.store(false, Ordering::Relaxed);
            drop(target);
            drop(_move_guard);
            return BufGuard {
                index,
                blockno,
                data: Some(self.bufs[index].data.lock()),
            };
        }

        // nothing free at home: steal an unreferenced buffer from some other bucket.
        for i in 1..NSLOT {
            let victim_key = (key + i) % NSLOT;
            let mut victim = self.slots[victim_key].lock();
            if let Some(index) = victim.take_free(&self.bufs) {
                target.push_front(index);

                let mut m = self.bufs[index].meta.lock();
                m.dev = dev;
                m.blockno = blockno;
                m.refcnt = 1;
                drop(m);
                self.bufs[index].valid.store(false, Ordering::Relaxed);

                drop(victim);
                drop(target);
                drop(_move_guard);
                return BufGuard {
                    index,
                    blockno,
                    data: Some(self.bufs[index].data.lock()),
                };
            }
        }

        panic!("bcache: no free buffers");
    }
}

pub struct BufGuard<'a> {
    index: usize,
    pub blockno: u32,
    data: Option<SleepLockGuard<'a, BufData>>,
}

impl<'a> BufGuard<'a> {
    pub fn data_ptr_mut(&mut self) -> *mut BufData {
        let guard = self.data.as_mut().unwrap();
        guard.deref_mut()
    }

    pub fn data_ptr(&self) -> *const BufData {
        let guard = self.data.as_ref().unwrap();
        guard.deref()
    }
}

impl<'a> BufGuard<'a> {
    pub fn bwrite(&mut self) {
        DISK.write(self);
    }

    pub unsafe fn bpin(&mut self) {
        BCACHE.bpin(self.index);
    }

    pub unsafe fn bunpin(&mut self) {
        BCACHE.bunpin(self.index);
    }
}

impl<'a> Drop for BufGuard<'a> {
    fn drop(&mut self) {
        drop(self.data.take());
        BCACHE.brelse(self.index);
    }
}

struct Buf {
    // has data been read from disk?
    valid: AtomicBool,
    meta: SpinLock<BufMeta>,
    data: SleepLock<BufData>,
}

impl Buf {
    const fn new() -> Self {
        Self {
            valid: AtomicBool::new(false),
            meta: SpinLock::new(BufMeta::new(), "bcache_meta"),
            data: SleepLock::new(BufData::new(), "bcache_data"),
        }
    }
}

struct BufMeta {
    dev: u32,
    blockno: u32,
    refcnt: usize,
}

impl BufMeta {
    const fn new() -> Self {
        Self {
            dev: 0,
            blockno: 0,
            refcnt: 0,
        }
    }
}

/// one hash bucket: a singly-linked chain of buffer indices, protected by the bucket's own
/// lock. indices only, never the buffers themselves, so a steal is just unlinking a `usize`
/// from one slot and linking it into another.
struct Slot {
    chain: [Option<usize>; NBUF],
    head: Option<usize>,
}

impl Slot {
    const fn new() -> Self {
        Self {
            chain: [None; NBUF],
            head: None,
        }
    }

    fn push_front(&mut self, index: usize) {
        self.chain[index] = self.head;
        self.head = Some(index);
    }

    fn find(&self, bufs: &[Buf; NBUF], dev: u32, blockno: u32) -> Option<usize> {
        let mut cur = self.head;
        while let Some(i) = cur {
            let m = bufs[i].meta.lock();
            if m.dev == dev && m.blockno == blockno {
                return Some(i);
            }
            drop(m);
            cur = self.chain[i];
        }
        None
    }

    /// unlink and return the first buffer in this bucket with no outstanding references.
    fn take_free(&mut self, bufs: &[Buf; NBUF]) -> Option<usize> {
        let mut prev: Option<usize> = None;
        let mut cur = self.head;
        while let Some(i) = cur {
            let refcnt = bufs[i].meta.lock().refcnt;
            let next = self.chain[i];
            if refcnt == 0 {
                match prev {
                    Some(p) => self.chain[p] = next,
                    None => self.head = next,
                }
                self.chain[i] = None;
                return Some(i);
            }
            prev = cur;
            cur = next;
        }
        None
    }
}

#[repr(C, align(8))]
pub struct BufData([u8; BSIZE]);

impl BufData {
    const fn new() -> Self {
        Self([0; BSIZE])
    }
}

impl Index<usize> for BufData {
    type Output = u8;
    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IndexMut<usize> for BufData {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn read() {
        let buf = BCACHE.bread(1, 1);
        assert_eq!(1, buf.blockno);
    }

    #[test_case]
    fn hash_is_stable_per_block() {
        assert_eq!(hash(1, 1), hash(1, 1));
    }

    #[test_case]
    fn reread_hits_same_buffer() {
        let b1 = BCACHE.bread(1, 2);
        let idx1 = b1.index;
        drop(b1);
        let b2 = BCACHE.bread(1, 2);
        assert_eq!(idx1, b2.index);
    }
}
