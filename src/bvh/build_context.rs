//! State shared by every task of one build.

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};

use super::build_options::BuildOptions;
use super::error::BuildError;
use super::node::Node;
use super::prim_ref::PrimRef;
use super::prim_ref_list::{PrimRefBlockAllocator, PrimRefBlockPool, PrimRefList};
use crate::primitives::{PrimitiveId, PrimitiveSource};
use crate::utilities::memory::{Arena, ArenaAllocator, ArenaPool};
use crate::utilities::thread_dispatcher::ThreadDispatcher;

/// Per-build context handed to every task.
///
/// Everything that the builder mutates from several threads lives here: the replication budget, the arena pools and
/// the first fatal error. Independent builds get independent contexts.
pub struct BuildContext<'a, P> {
    pub options: BuildOptions,
    pub source: &'a dyn PrimitiveSource<Payload = P>,
    pub dispatcher: &'a dyn ThreadDispatcher,
    /// Number of primitives taken from the source.
    pub primitive_count: usize,
    pub max_leaf_size: usize,
    pub block_pool: PrimRefBlockPool,
    pub node_pool: ArenaPool<Node>,
    pub leaf_pool: ArenaPool<P>,
    remaining_replications: CachePadded<AtomicIsize>,
    accepted_replications: CachePadded<AtomicUsize>,
    leaf_references: CachePadded<AtomicUsize>,
    aborted: AtomicBool,
    error: Mutex<Option<BuildError>>,
}

impl<'a, P: Send> BuildContext<'a, P> {
    pub fn new(
        options: BuildOptions,
        source: &'a dyn PrimitiveSource<Payload = P>,
        dispatcher: &'a dyn ThreadDispatcher,
        node_pool: ArenaPool<Node>,
        leaf_pool: ArenaPool<P>,
    ) -> Self {
        let primitive_count = options.effective_primitive_count(source.count());
        let budget = options.replication_budget(primitive_count);
        Self {
            options,
            source,
            dispatcher,
            primitive_count,
            max_leaf_size: options.effective_max_leaf_size(),
            block_pool: PrimRefBlockPool::new(),
            node_pool,
            leaf_pool,
            remaining_replications: CachePadded::new(AtomicIsize::new(budget as isize)),
            accepted_replications: CachePadded::new(AtomicUsize::new(0)),
            leaf_references: CachePadded::new(AtomicUsize::new(0)),
            aborted: AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }

    /// Number of workers builds dispatch to.
    #[inline(always)]
    pub fn thread_count(&self) -> usize {
        self.dispatcher.thread_count().max(1)
    }

    /// Whether newly discovered splits may still consider spatial splitting.
    #[inline(always)]
    pub fn spatial_splits_available(&self) -> bool {
        self.options.enable_spatial_splits && self.remaining_replications.load(Ordering::Acquire) > 0
    }

    /// Replications that spatial splits may still create.
    pub fn remaining_replications(&self) -> usize {
        self.remaining_replications.load(Ordering::Acquire).max(0) as usize
    }

    /// Replications created by accepted spatial splits so far.
    pub fn accepted_replications(&self) -> usize {
        self.accepted_replications.load(Ordering::Acquire)
    }

    /// Atomically takes `count` replications out of the budget. Fails without side effects if not enough remain.
    pub fn try_reserve_replications(&self, count: usize) -> bool {
        let count = count as isize;
        let mut remaining = self.remaining_replications.load(Ordering::Acquire);
        loop {
            if remaining < count {
                return false;
            }
            match self.remaining_replications.compare_exchange_weak(
                remaining,
                remaining - count,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(current) => remaining = current,
            }
        }
    }

    /// Settles a reservation: `used` replications were created, the rest of `reserved` goes back to the budget.
    pub fn settle_replications(&self, reserved: usize, used: usize) {
        debug_assert!(used <= reserved, "Used more replications than reserved.");
        self.accepted_replications.fetch_add(used, Ordering::AcqRel);
        let refund = reserved.saturating_sub(used);
        if refund > 0 {
            self.remaining_replications
                .fetch_add(refund as isize, Ordering::AcqRel);
        }
    }

    /// Counts primitive references written into leaves.
    #[inline(always)]
    pub fn add_leaf_references(&self, count: usize) {
        self.leaf_references.fetch_add(count, Ordering::Relaxed);
    }

    pub fn leaf_references(&self) -> usize {
        self.leaf_references.load(Ordering::Acquire)
    }

    /// Records a fatal error. Only the first one is kept; every worker stops at its next task boundary.
    pub fn abort(&self, error: BuildError) {
        log::error!("Aborting BVH build: {error}");
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
        self.aborted.store(true, Ordering::Release);
    }

    #[inline(always)]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub fn take_error(&self) -> Option<BuildError> {
        self.error.lock().take()
    }

    /// Consumes the context and returns the node and leaf arenas filled by the build.
    pub fn into_arenas(self) -> (Arena<Node>, Arena<P>) {
        (self.node_pool.into_arena(), self.leaf_pool.into_arena())
    }

    /// Runs `fold` over every block of `prims` on all workers and returns one accumulator per participating worker.
    ///
    /// Blocks are handed out through a shared cursor, so which worker sees which block is unspecified; accumulators
    /// must combine order-independently.
    pub fn fold_blocks_parallel<B, I, F>(&self, prims: &PrimRefList, init: I, fold: F) -> Vec<B>
    where
        B: Send,
        I: Fn() -> B + Sync,
        F: Fn(&mut B, &[PrimRef]) + Sync,
    {
        let blocks: Vec<&[PrimRef]> = prims.blocks().map(|block| block.items()).collect();
        let cursor = AtomicUsize::new(0);
        let results = Mutex::new(Vec::with_capacity(self.thread_count()));
        let body = |_worker_index: usize| {
            let mut accumulator = init();
            loop {
                let index = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(block) = blocks.get(index) else {
                    break;
                };
                fold(&mut accumulator, block);
            }
            results.lock().push(accumulator);
        };
        if let Err(payload) = self.dispatcher.dispatch_workers(&body, blocks.len()) {
            std::panic::resume_unwind(payload);
        }
        results.into_inner()
    }
}

/// Allocators owned by one worker for the duration of the build.
///
/// Nodes and leaf payloads are bump allocated from chunks drawn from the context's pools; reference blocks come from
/// a small local cache in front of the shared block pool. Dropping the allocators retires their chunks.
pub struct ThreadAllocators<'c, P> {
    pub nodes: ArenaAllocator<'c, Node>,
    pub leaves: ArenaAllocator<'c, P>,
    pub blocks: PrimRefBlockAllocator<'c>,
    /// Reused buffer for the ids of the leaf being filled.
    pub leaf_ids: Vec<PrimitiveId>,
    /// Reused buffer the source fills leaf payloads into.
    pub leaf_payload: Vec<P>,
}

impl<'c, P> ThreadAllocators<'c, P> {
    pub fn new<'a>(context: &'c BuildContext<'a, P>) -> Self {
        Self {
            nodes: ArenaAllocator::new(&context.node_pool),
            leaves: ArenaAllocator::new(&context.leaf_pool),
            blocks: PrimRefBlockAllocator::new(&context.block_pool),
            leaf_ids: Vec::new(),
            leaf_payload: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::BoundsList;
    use crate::utilities::bounding_box::BoundingBox;
    use crate::utilities::thread_dispatcher::ScopedThreadDispatcher;
    use glam::Vec3;

    fn context<'a>(
        source: &'a BoundsList,
        dispatcher: &'a ScopedThreadDispatcher,
        options: BuildOptions,
    ) -> BuildContext<'a, PrimitiveId> {
        BuildContext::new(
            options,
            source,
            dispatcher,
            ArenaPool::new(64),
            ArenaPool::new(256),
        )
    }

    #[test]
    fn reservations_never_overdraw_the_budget() {
        let source = BoundsList::new(vec![BoundingBox::new(Vec3::ZERO, Vec3::ONE); 100]);
        let dispatcher = ScopedThreadDispatcher::new(1);
        let context = context(&source, &dispatcher, BuildOptions::high_quality(1.5));
        assert_eq!(context.remaining_replications(), 50);
        assert!(context.try_reserve_replications(30));
        assert!(!context.try_reserve_replications(30));
        context.settle_replications(30, 25);
        assert_eq!(context.remaining_replications(), 25);
        assert_eq!(context.accepted_replications(), 25);
        assert!(context.try_reserve_replications(25));
        assert!(!context.spatial_splits_available());
    }

    #[test]
    fn first_error_wins() {
        let source = BoundsList::default();
        let dispatcher = ScopedThreadDispatcher::new(1);
        let context = context(&source, &dispatcher, BuildOptions::default());
        context.abort(BuildError::WorkerPanicked);
        context.abort(BuildError::DepthExceeded { depth: 1, count: 2 });
        assert!(context.is_aborted());
        assert_eq!(context.take_error(), Some(BuildError::WorkerPanicked));
    }

    #[test]
    fn parallel_fold_visits_every_block_once() {
        let source = BoundsList::default();
        let dispatcher = ScopedThreadDispatcher::new(4);
        let context = context(&source, &dispatcher, BuildOptions::default());
        let mut blocks = PrimRefBlockAllocator::new(&context.block_pool);
        let mut list = PrimRefList::new();
        for i in 0..2000u32 {
            let bounds = BoundingBox::new(Vec3::splat(i as f32), Vec3::splat(i as f32 + 1.0));
            list.push(PrimRef::new(bounds, PrimitiveId(i)), &mut blocks);
        }
        let sums = context.fold_blocks_parallel(&list, || 0usize, |sum, items| *sum += items.len());
        assert_eq!(sums.iter().sum::<usize>(), 2000);
        list.clear(&mut blocks);
    }
}
