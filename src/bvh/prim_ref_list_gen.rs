//! Initial reference generation from a primitive source.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::build_context::BuildContext;
use super::prim_ref::{PrimInfo, PrimRef};
use super::prim_ref_list::{PrimRefBlockAllocator, PrimRefList};
use crate::primitives::PrimitiveId;

/// Ids handed to a worker at a time.
const GENERATION_RANGE_SIZE: usize = 4096;

fn generate_range<P: Send>(
    context: &BuildContext<'_, P>,
    start: usize,
    end: usize,
    list: &mut PrimRefList,
    info: &mut PrimInfo,
    alloc: &mut PrimRefBlockAllocator,
) {
    for index in start..end {
        let id = PrimitiveId(index as u32);
        let bounds = context.source.bounds_of(id);
        info.add(&bounds);
        list.push(PrimRef::new(bounds, id), alloc);
    }
}

/// Creates one reference per primitive of the context's source, together with their summary.
///
/// With `parallel` set, id ranges are distributed over the context's workers, each filling its own block chain;
/// the chains are linked afterwards. The summary is exact either way; only the order of the references differs.
pub fn generate<P: Send>(
    context: &BuildContext<'_, P>,
    alloc: &mut PrimRefBlockAllocator,
    parallel: bool,
) -> (PrimRefList, PrimInfo) {
    let count = context.primitive_count;
    let mut list = PrimRefList::new();
    let mut info = PrimInfo::EMPTY;
    if !parallel || context.thread_count() <= 1 || count <= GENERATION_RANGE_SIZE {
        generate_range(context, 0, count, &mut list, &mut info, alloc);
        return (list, info);
    }

    let range_count = count.div_ceil(GENERATION_RANGE_SIZE);
    let cursor = AtomicUsize::new(0);
    let results = Mutex::new(Vec::with_capacity(context.thread_count()));
    let body = |_worker_index: usize| {
        let mut worker_alloc = PrimRefBlockAllocator::new(&context.block_pool);
        let mut worker_list = PrimRefList::new();
        let mut worker_info = PrimInfo::EMPTY;
        loop {
            let range = cursor.fetch_add(1, Ordering::Relaxed);
            if range >= range_count {
                break;
            }
            let start = range * GENERATION_RANGE_SIZE;
            let end = (start + GENERATION_RANGE_SIZE).min(count);
            generate_range(
                context,
                start,
                end,
                &mut worker_list,
                &mut worker_info,
                &mut worker_alloc,
            );
        }
        results.lock().push((worker_list, worker_info));
    };
    if let Err(payload) = context.dispatcher.dispatch_workers(&body, range_count) {
        std::panic::resume_unwind(payload);
    }
    for (worker_list, worker_info) in results.into_inner() {
        list.append(worker_list);
        info.merge(&worker_info);
    }
    (list, info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::build_options::BuildOptions;
    use crate::primitives::BoundsList;
    use crate::utilities::bounding_box::BoundingBox;
    use crate::utilities::memory::ArenaPool;
    use crate::utilities::thread_dispatcher::ScopedThreadDispatcher;
    use glam::Vec3;

    #[test]
    fn parallel_generation_matches_serial_summary() {
        let boxes: Vec<_> = (0..20_000)
            .map(|i| {
                let min = Vec3::new((i % 100) as f32, (i / 100) as f32, (i % 7) as f32);
                BoundingBox::new(min, min + Vec3::splat(0.5))
            })
            .collect();
        let source = BoundsList::new(boxes);
        let dispatcher = ScopedThreadDispatcher::new(4);
        let context = BuildContext::new(
            BuildOptions::default(),
            &source,
            &dispatcher,
            ArenaPool::new(8),
            ArenaPool::new(8),
        );
        let mut alloc = PrimRefBlockAllocator::new(&context.block_pool);
        let (mut serial, serial_info) = generate(&context, &mut alloc, false);
        let (mut parallel, parallel_info) = generate(&context, &mut alloc, true);
        assert_eq!(serial_info, parallel_info);
        assert_eq!(parallel.len(), 20_000);
        let mut ids: Vec<u32> = parallel.iter().map(|prim| prim.id.0).collect();
        ids.sort_unstable();
        assert!(ids.iter().enumerate().all(|(i, id)| i as u32 == *id));
        serial.clear(&mut alloc);
        parallel.clear(&mut alloc);
    }

    #[test]
    fn truncated_sources_only_yield_the_first_ids() {
        let source = BoundsList::new(vec![BoundingBox::new(Vec3::ZERO, Vec3::ONE); 10]);
        let dispatcher = ScopedThreadDispatcher::new(1);
        let options = BuildOptions {
            max_objects_to_consider: Some(4),
            ..BuildOptions::default()
        };
        let context = BuildContext::new(options, &source, &dispatcher, ArenaPool::new(8), ArenaPool::new(8));
        let mut alloc = PrimRefBlockAllocator::new(&context.block_pool);
        let (mut list, info) = generate(&context, &mut alloc, true);
        assert_eq!(info.count, 4);
        assert!(list.iter().all(|prim| prim.id.0 < 4));
        list.clear(&mut alloc);
    }
}
