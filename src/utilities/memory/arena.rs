use parking_lot::Mutex;
use std::fmt;

/// Location of a value inside an [`Arena`]: which chunk, and which slot inside that chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArenaIndex {
    pub chunk: u32,
    pub slot: u32,
}

impl ArenaIndex {
    /// Index that never refers to a live value. Used by empty leaves.
    pub const INVALID: Self = Self {
        chunk: u32::MAX,
        slot: u32::MAX,
    };

    #[inline(always)]
    pub fn new(chunk: u32, slot: u32) -> Self {
        Self { chunk, slot }
    }
}

impl fmt::Display for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chunk, self.slot)
    }
}

/// Chunked bulk storage addressed by [`ArenaIndex`].
///
/// Values are never moved once placed in a chunk, so indices stay valid for the life of the arena.
pub struct Arena<T> {
    chunks: Vec<Vec<T>>,
    chunk_capacity: usize,
}

impl<T> Arena<T> {
    /// Creates an empty arena whose chunks hold `chunk_capacity` values unless a larger contiguous run is requested.
    pub fn new(chunk_capacity: usize) -> Self {
        assert!(chunk_capacity > 0, "Chunk capacity must be positive.");
        Self {
            chunks: Vec::new(),
            chunk_capacity,
        }
    }

    /// Number of chunks, including chunks that ended up holding nothing.
    #[inline(always)]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of values stored across all chunks.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(Vec::is_empty)
    }

    /// Bytes reserved by the chunks, including unused capacity.
    pub fn allocated_byte_count(&self) -> usize {
        self.chunks
            .iter()
            .map(|chunk| chunk.capacity() * std::mem::size_of::<T>())
            .sum()
    }

    #[inline(always)]
    pub fn get(&self, index: ArenaIndex) -> &T {
        &self.chunks[index.chunk as usize][index.slot as usize]
    }

    #[inline(always)]
    pub fn get_mut(&mut self, index: ArenaIndex) -> &mut T {
        &mut self.chunks[index.chunk as usize][index.slot as usize]
    }

    /// Gets `count` contiguous values starting at `start`. A zero count is valid for any index.
    #[inline]
    pub fn slice(&self, start: ArenaIndex, count: usize) -> &[T] {
        if count == 0 {
            return &[];
        }
        let begin = start.slot as usize;
        &self.chunks[start.chunk as usize][begin..begin + count]
    }

    /// Appends a value to the last chunk, opening a new chunk when it is full.
    pub fn alloc(&mut self, value: T) -> ArenaIndex {
        let needs_chunk = self
            .chunks
            .last()
            .map_or(true, |chunk| chunk.len() >= self.chunk_capacity);
        if needs_chunk {
            self.chunks.push(Vec::with_capacity(self.chunk_capacity));
        }
        let chunk_index = self.chunks.len() - 1;
        let chunk = &mut self.chunks[chunk_index];
        let slot = chunk.len();
        chunk.push(value);
        ArenaIndex::new(chunk_index as u32, slot as u32)
    }

    /// Converts the arena into a pool that concurrent allocators can draw chunks from.
    pub fn into_pool(self) -> ArenaPool<T> {
        ArenaPool {
            chunk_capacity: self.chunk_capacity,
            state: Mutex::new(ArenaPoolState {
                chunks: self.chunks,
                outstanding: 0,
            }),
        }
    }
}

struct ArenaPoolState<T> {
    chunks: Vec<Vec<T>>,
    outstanding: usize,
}

/// Shared source of arena chunks.
///
/// Allocators take a chunk under the lock, fill it without any synchronization, and retire it back when it is
/// full or when the allocator is dropped. The lock is only touched at those two points.
pub struct ArenaPool<T> {
    chunk_capacity: usize,
    state: Mutex<ArenaPoolState<T>>,
}

impl<T> ArenaPool<T> {
    pub fn new(chunk_capacity: usize) -> Self {
        Arena::new(chunk_capacity).into_pool()
    }

    /// Reserves a chunk id and hands out storage with room for at least `minimum_capacity` values.
    fn take_chunk(&self, minimum_capacity: usize) -> (u32, Vec<T>) {
        let capacity = self.chunk_capacity.max(minimum_capacity);
        let mut state = self.state.lock();
        let chunk_id = state.chunks.len();
        assert!(chunk_id < u32::MAX as usize, "Arena chunk ids exhausted.");
        state.chunks.push(Vec::new());
        state.outstanding += 1;
        (chunk_id as u32, Vec::with_capacity(capacity))
    }

    /// Publishes a chunk previously obtained from `take_chunk`.
    fn retire(&self, chunk_id: u32, chunk: Vec<T>) {
        let mut state = self.state.lock();
        debug_assert!(
            state.chunks[chunk_id as usize].is_empty(),
            "A chunk id should only be retired once."
        );
        state.chunks[chunk_id as usize] = chunk;
        state.outstanding -= 1;
    }

    /// Number of chunks currently held by allocators.
    pub fn outstanding_chunk_count(&self) -> usize {
        self.state.lock().outstanding
    }

    /// Gives up the pool and returns the arena with every retired chunk in place.
    pub fn into_arena(self) -> Arena<T> {
        let state = self.state.into_inner();
        debug_assert_eq!(
            state.outstanding, 0,
            "All allocators should have retired their chunks before the pool is consumed."
        );
        Arena {
            chunks: state.chunks,
            chunk_capacity: self.chunk_capacity,
        }
    }
}

/// Bump allocator over one chunk at a time, drawing chunks from a shared [`ArenaPool`].
///
/// Values written through an allocator only become readable through the [`Arena`] once the allocator has retired
/// the chunk (when it fills up, on `flush`, or on drop).
pub struct ArenaAllocator<'a, T> {
    pool: &'a ArenaPool<T>,
    current: Option<(u32, Vec<T>)>,
    allocated_count: usize,
}

impl<'a, T> ArenaAllocator<'a, T> {
    pub fn new(pool: &'a ArenaPool<T>) -> Self {
        Self {
            pool,
            current: None,
            allocated_count: 0,
        }
    }

    /// Number of values this allocator handed out over its lifetime.
    #[inline(always)]
    pub fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Ensures the current chunk can hold `count` more values contiguously and returns it.
    fn reserve(&mut self, count: usize) -> &mut (u32, Vec<T>) {
        let fits = self
            .current
            .as_ref()
            .map_or(false, |(_, chunk)| chunk.capacity() - chunk.len() >= count);
        if !fits {
            self.flush();
            self.current = Some(self.pool.take_chunk(count));
        }
        self.current
            .as_mut()
            .unwrap_or_else(|| unreachable!("a chunk was just taken"))
    }

    /// Stores a single value.
    pub fn alloc(&mut self, value: T) -> ArenaIndex {
        let (chunk_id, chunk) = self.reserve(1);
        let index = ArenaIndex::new(*chunk_id, chunk.len() as u32);
        chunk.push(value);
        self.allocated_count += 1;
        index
    }

    /// Moves every value out of `values` into one contiguous run and returns the index of its first element.
    pub fn alloc_from_vec(&mut self, values: &mut Vec<T>) -> ArenaIndex {
        let count = values.len();
        if count == 0 {
            return ArenaIndex::INVALID;
        }
        let (chunk_id, chunk) = self.reserve(count);
        let index = ArenaIndex::new(*chunk_id, chunk.len() as u32);
        chunk.append(values);
        self.allocated_count += count;
        index
    }

    /// Retires the current chunk to the pool.
    pub fn flush(&mut self) {
        if let Some((chunk_id, chunk)) = self.current.take() {
            self.pool.retire(chunk_id, chunk);
        }
    }
}

impl<T> Drop for ArenaAllocator<'_, T> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_readable_after_pool_is_consumed() {
        let pool = ArenaPool::new(4);
        let mut indices = Vec::new();
        {
            let mut allocator = ArenaAllocator::new(&pool);
            for i in 0..10 {
                indices.push(allocator.alloc(i));
            }
            assert_eq!(allocator.allocated_count(), 10);
        }
        assert_eq!(pool.outstanding_chunk_count(), 0);
        let arena = pool.into_arena();
        assert_eq!(arena.len(), 10);
        assert_eq!(arena.chunk_count(), 3);
        for (i, index) in indices.iter().enumerate() {
            assert_eq!(*arena.get(*index), i);
        }
    }

    #[test]
    fn contiguous_runs_never_straddle_chunks() {
        let pool = ArenaPool::new(4);
        let (a, b) = {
            let mut allocator = ArenaAllocator::new(&pool);
            let a = allocator.alloc_from_vec(&mut vec![1, 2, 3]);
            let b = allocator.alloc_from_vec(&mut vec![4, 5, 6, 7, 8, 9]);
            (a, b)
        };
        let arena = pool.into_arena();
        assert_eq!(arena.slice(a, 3), &[1, 2, 3]);
        assert_eq!(arena.slice(b, 6), &[4, 5, 6, 7, 8, 9]);
        assert_ne!(a.chunk, b.chunk);
    }

    #[test]
    fn concurrent_allocators_get_distinct_chunks() {
        let pool = ArenaPool::new(8);
        crossbeam_utils::thread::scope(|scope| {
            for t in 0..4u32 {
                let pool = &pool;
                scope.spawn(move |_| {
                    let mut allocator = ArenaAllocator::new(pool);
                    for i in 0..20 {
                        allocator.alloc(t * 100 + i);
                    }
                });
            }
        })
        .unwrap();
        let arena = pool.into_arena();
        assert_eq!(arena.len(), 80);
    }
}
