//! Chunked storage of primitive references.
//!
//! A [`PrimRefList`] is a singly linked chain of fixed capacity [`PrimRefBlock`]s. Blocks come from a shared
//! [`PrimRefBlockPool`] through per-worker [`PrimRefBlockAllocator`]s, which only lock the pool to refill or drain
//! their local cache. A block belongs to exactly one list at a time; ownership moves with `take`/`insert`.

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::prim_ref::PrimRef;

/// Number of references a block holds.
pub const PRIM_REF_BLOCK_CAPACITY: usize = 256;

/// Fixed capacity run of references, linked to the next block of its list.
pub struct PrimRefBlock {
    items: Vec<PrimRef>,
    next: Option<Box<PrimRefBlock>>,
}

impl PrimRefBlock {
    fn new() -> Box<Self> {
        Box::new(Self {
            items: Vec::with_capacity(PRIM_REF_BLOCK_CAPACITY),
            next: None,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.items.len() >= PRIM_REF_BLOCK_CAPACITY
    }

    #[inline(always)]
    pub fn items(&self) -> &[PrimRef] {
        &self.items
    }

    /// Appends a reference. Returns `false` without inserting if the block is full.
    #[inline(always)]
    pub fn insert(&mut self, prim: PrimRef) -> bool {
        if self.is_full() {
            return false;
        }
        self.items.push(prim);
        true
    }
}

/// Shared source of reference blocks.
pub struct PrimRefBlockPool {
    free: Mutex<Vec<Box<PrimRefBlock>>>,
    created: CachePadded<AtomicUsize>,
}

impl Default for PrimRefBlockPool {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimRefBlockPool {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            created: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Total number of blocks ever created by this pool.
    pub fn created_block_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of blocks sitting in the pool, unused.
    pub fn free_block_count(&self) -> usize {
        self.free.lock().len()
    }

    fn take_into(&self, cache: &mut Vec<Box<PrimRefBlock>>, count: usize) {
        let mut free = self.free.lock();
        let start = free.len().saturating_sub(count);
        cache.extend(free.drain(start..));
    }

    fn give_back<I: IntoIterator<Item = Box<PrimRefBlock>>>(&self, blocks: I) {
        self.free.lock().extend(blocks);
    }

    /// Drops every pooled block.
    pub fn clear(&self) {
        self.free.lock().clear();
    }
}

/// Per-worker block allocator with a small local cache.
pub struct PrimRefBlockAllocator<'a> {
    pool: &'a PrimRefBlockPool,
    cache: Vec<Box<PrimRefBlock>>,
}

impl<'a> PrimRefBlockAllocator<'a> {
    const CACHE_REFILL: usize = 8;

    pub fn new(pool: &'a PrimRefBlockPool) -> Self {
        Self {
            pool,
            cache: Vec::with_capacity(Self::CACHE_REFILL * 2 + 1),
        }
    }

    /// Gets an empty block.
    pub fn malloc(&mut self) -> Box<PrimRefBlock> {
        if self.cache.is_empty() {
            self.pool.take_into(&mut self.cache, Self::CACHE_REFILL);
        }
        self.cache.pop().unwrap_or_else(|| {
            self.pool.created.fetch_add(1, Ordering::Relaxed);
            PrimRefBlock::new()
        })
    }

    /// Returns a block for reuse.
    pub fn free(&mut self, mut block: Box<PrimRefBlock>) {
        block.items.clear();
        block.next = None;
        self.cache.push(block);
        if self.cache.len() > Self::CACHE_REFILL * 2 {
            let keep = self.cache.len() - Self::CACHE_REFILL;
            self.pool.give_back(self.cache.drain(keep..));
        }
    }
}

impl Drop for PrimRefBlockAllocator<'_> {
    fn drop(&mut self) {
        self.pool.give_back(self.cache.drain(..));
    }
}

/// Ordered collection of primitive references stored as a chain of blocks.
#[derive(Default)]
pub struct PrimRefList {
    head: Option<Box<PrimRefBlock>>,
}

impl PrimRefList {
    pub fn new() -> Self {
        Self { head: None }
    }

    /// Detaches the first block of the chain.
    pub fn take(&mut self) -> Option<Box<PrimRefBlock>> {
        let mut block = self.head.take()?;
        self.head = block.next.take();
        Some(block)
    }

    /// Links a block in front of the chain.
    pub fn insert(&mut self, mut block: Box<PrimRefBlock>) {
        debug_assert!(block.next.is_none(), "A block can only belong to one list.");
        block.next = self.head.take();
        self.head = Some(block);
    }

    /// Appends a reference, opening a new block when the front block is full.
    pub fn push(&mut self, prim: PrimRef, alloc: &mut PrimRefBlockAllocator) {
        let needs_block = self.head.as_ref().map_or(true, |head| head.is_full());
        if needs_block {
            self.insert(alloc.malloc());
        }
        if let Some(head) = self.head.as_mut() {
            head.items.push(prim);
        }
    }

    /// Moves every block of `other` into this list.
    pub fn append(&mut self, mut other: PrimRefList) {
        while let Some(block) = other.take() {
            self.insert(block);
        }
    }

    /// Iterates the blocks of the chain.
    pub fn blocks(&self) -> BlockIter<'_> {
        BlockIter {
            current: self.head.as_deref(),
        }
    }

    /// Iterates every reference in chain order.
    pub fn iter(&self) -> impl Iterator<Item = &PrimRef> + '_ {
        self.blocks().flat_map(|block| block.items.iter())
    }

    pub fn block_count(&self) -> usize {
        self.blocks().count()
    }

    /// Counts the references. Walks the chain.
    pub fn len(&self) -> usize {
        self.blocks().map(PrimRefBlock::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks().all(PrimRefBlock::is_empty)
    }

    /// Concatenates every block into the first one and frees the rest back to `alloc`.
    ///
    /// Callers merge lists that fit into one block (leaves); a larger list still merges, but its single block grows
    /// past the nominal capacity.
    pub fn merge(&mut self, alloc: &mut PrimRefBlockAllocator) {
        let Some(mut first) = self.take() else {
            return;
        };
        while let Some(mut block) = self.take() {
            first.items.append(&mut block.items);
            alloc.free(block);
        }
        debug_assert!(
            first.items.len() <= PRIM_REF_BLOCK_CAPACITY,
            "Merged list should fit in a single block."
        );
        self.insert(first);
    }

    /// Merges the list and sorts its references by primitive id. The sort is stable.
    pub fn merge_sorted(&mut self, alloc: &mut PrimRefBlockAllocator) -> &[PrimRef] {
        self.merge(alloc);
        match self.head.as_mut() {
            Some(head) => {
                head.items.sort_by_key(|prim| prim.id);
                &head.items
            }
            None => &[],
        }
    }

    /// Gives every block back to `alloc`.
    pub fn clear(&mut self, alloc: &mut PrimRefBlockAllocator) {
        while let Some(block) = self.take() {
            alloc.free(block);
        }
    }
}

impl Drop for PrimRefList {
    fn drop(&mut self) {
        // Unlink iteratively; recursive box drops could overflow on very long chains.
        while self.take().is_some() {}
    }
}

/// Iterator over the blocks of a [`PrimRefList`].
pub struct BlockIter<'a> {
    current: Option<&'a PrimRefBlock>,
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = &'a PrimRefBlock;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.current?;
        self.current = block.next.as_deref();
        Some(block)
    }
}
