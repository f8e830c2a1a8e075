//! Build orchestration: primitive generation, the serial path, the top-level phase and the worker phase.

use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{fence, Ordering};
use std::time::Instant;

use super::build_context::{BuildContext, ThreadAllocators};
use super::build_options::BuildOptions;
use super::build_record::{BuildRecord, Destination, LargestFirst};
use super::error::{BuildError, Result};
use super::node::NodeRef;
use super::prim_ref::PrimInfo;
use super::prim_ref_list_gen;
use super::split::Split;
use super::tree::{BuildStatistics, Tree, LEAF_CHUNK_CAPACITY, NODE_CHUNK_CAPACITY};
use super::tree_builder::SubtreeBuilder;
use crate::primitives::PrimitiveSource;
use crate::utilities::memory::ArenaPool;
use crate::utilities::task_scheduling::TaskStack;
use crate::utilities::thread_dispatcher::{ScopedThreadDispatcher, ThreadDispatcher};

/// Finished subtree reference and the slot it belongs in.
type Patch = (Destination, NodeRef);

/// What the build phases hand back before the arenas are assembled into a tree.
struct BuildOutput {
    patches: Vec<Patch>,
    root_info: PrimInfo,
    top_level_tasks: usize,
}

impl<P: Send> Tree<P> {
    /// Builds a tree over `source` using a [`ScopedThreadDispatcher`] with `options.thread_count` workers.
    pub fn build<S: PrimitiveSource<Payload = P>>(source: &S, options: &BuildOptions) -> Result<Self> {
        let dispatcher = ScopedThreadDispatcher::new(options.thread_count);
        Self::build_with_dispatcher(source, options, &dispatcher)
    }

    /// Builds a tree over `source`, running parallel work on `dispatcher`.
    ///
    /// Sets at or below `options.single_threaded_threshold` primitives are built on the calling thread. Larger ones
    /// are expanded breadth first on the calling thread until enough tasks exist for the workers, which then finish
    /// them, expanding big tasks one level at a time. A layout pass over the top nodes completes the tree.
    ///
    /// # Arguments
    ///
    /// * `source` - Primitives to index. Only the first `options.max_objects_to_consider` are used when set.
    /// * `options` - Build settings. Rejected with [`BuildError::InvalidOptions`] if they do not validate.
    /// * `dispatcher` - Thread dispatcher used for primitive generation, binning and the worker phase.
    pub fn build_with_dispatcher(
        source: &dyn PrimitiveSource<Payload = P>,
        options: &BuildOptions,
        dispatcher: &dyn ThreadDispatcher,
    ) -> Result<Self> {
        options.validate()?;
        let start = Instant::now();
        if options.effective_max_leaf_size() < options.max_leaf_size {
            log::warn!(
                "Maximum leaf size {} exceeds what a leaf can address; using {}.",
                options.max_leaf_size,
                options.effective_max_leaf_size()
            );
        }

        let mut tree = Tree::new();
        let context = BuildContext::new(
            *options,
            source,
            dispatcher,
            ArenaPool::new(NODE_CHUNK_CAPACITY),
            ArenaPool::new(LEAF_CHUNK_CAPACITY),
        );
        if context.primitive_count == 0 {
            log::debug!("No primitives to build over; leaving the tree empty.");
            tree.build_statistics.elapsed = start.elapsed();
            return Ok(tree);
        }

        let single_threaded = context.primitive_count <= options.single_threaded_threshold;
        log::debug!(
            "Building over {} primitives on {} ({} workers available).",
            context.primitive_count,
            if single_threaded { "the calling thread" } else { "all workers" },
            context.thread_count()
        );
        let output = if single_threaded {
            Self::build_serial(&context)
        } else {
            Self::build_parallel(&context)
        };
        let output = match output {
            Ok(output) => output,
            Err(error) => {
                if !context.is_aborted() {
                    log::error!("Aborting BVH build: {error}");
                }
                return Err(error);
            }
        };

        let replications = context.accepted_replications();
        let leaf_references = context.leaf_references();
        log::debug!(
            "Reference blocks: {} created, released with the build.",
            context.block_pool.created_block_count()
        );
        context.block_pool.clear();
        let (nodes, leaves) = context.into_arenas();
        tree.nodes = nodes;
        tree.leaves = leaves;
        for (dst, node_ref) in output.patches {
            match dst {
                Destination::Root => tree.root = node_ref,
                Destination::Child { node, slot } => {
                    tree.nodes.get_mut(node).children[slot as usize].node_ref = node_ref;
                }
            }
        }
        tree.layout_top_nodes();

        tree.num_primitives = output.root_info.count + replications;
        tree.bounds = output.root_info.geom_bounds;
        if leaf_references != tree.num_primitives {
            let error = BuildError::PrimitivesLost {
                expected: tree.num_primitives,
                found: leaf_references,
            };
            log::error!("Aborting BVH build: {error}");
            return Err(error);
        }
        tree.build_statistics = BuildStatistics {
            elapsed: start.elapsed(),
            replications,
            top_level_tasks: output.top_level_tasks,
            single_threaded,
        };
        tree.log_build_summary(options);
        Ok(tree)
    }

    fn build_serial(context: &BuildContext<'_, P>) -> Result<BuildOutput> {
        let mut allocators = ThreadAllocators::new(context);
        let (prims, root_info) = prim_ref_list_gen::generate(context, &mut allocators.blocks, false);
        let mut builder = SubtreeBuilder::new(context, &mut allocators);
        let mut root = BuildRecord::new(0, prims, root_info, Split::NONE, Destination::Root);
        root.split = builder.find_split(&root);
        let root_ref = builder.finish_build(root)?;
        Ok(BuildOutput {
            patches: vec![(Destination::Root, root_ref)],
            root_info,
            top_level_tasks: 0,
        })
    }

    fn build_parallel(context: &BuildContext<'_, P>) -> Result<BuildOutput> {
        let options = &context.options;
        let mut patches = Vec::new();
        let mut heap = BinaryHeap::new();
        let root_info;
        {
            let mut allocators = ThreadAllocators::new(context);
            log::debug!("Generating references.");
            let (prims, info) = prim_ref_list_gen::generate(context, &mut allocators.blocks, true);
            root_info = info;
            let mut builder = SubtreeBuilder::new(context, &mut allocators);
            builder.parallel = true;
            let mut root = BuildRecord::new(0, prims, info, Split::NONE, Destination::Root);
            root.split = builder.find_split(&root);
            heap.push(LargestFirst(root));

            let task_target = options
                .top_level_task_target
                .unwrap_or_else(|| context.thread_count())
                .max(1);
            while heap.len() < task_target {
                let Some(LargestFirst(record)) = heap.pop() else {
                    break;
                };
                if record.size() <= options.single_threaded_threshold {
                    heap.push(LargestFirst(record));
                    break;
                }
                let dst = record.dst;
                let (node_ref, children) = builder.expand_one_level(record)?;
                let node_ref = if children.is_empty() {
                    node_ref.with_barrier()
                } else {
                    node_ref
                };
                patches.push((dst, node_ref));
                heap.extend(children.into_iter().map(LargestFirst));
            }
        }

        let tasks: Vec<BuildRecord> = heap.into_iter().map(|task| task.0).collect();
        let top_level_tasks = tasks.len();
        log::debug!("Top-level phase produced {top_level_tasks} tasks; dispatching workers.");
        let stack = TaskStack::with_tasks(tasks);
        let worker_patches = Mutex::new(Vec::new());
        let task_size_threshold = options.task_size_threshold;
        let worker_body = |worker_index: usize| {
            let mut allocators = ThreadAllocators::new(context);
            let mut local_patches = Vec::new();
            let mut completed = 0usize;
            stack.run_worker(|record: BuildRecord| {
                if context.is_aborted() {
                    return;
                }
                let dst = record.dst;
                let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<()> {
                    let mut builder = SubtreeBuilder::new(context, &mut allocators);
                    if record.size() < task_size_threshold {
                        let node_ref = builder.finish_build(record)?;
                        local_patches.push((dst, node_ref.with_barrier()));
                    } else {
                        let (node_ref, children) = builder.expand_one_level(record)?;
                        if children.is_empty() {
                            local_patches.push((dst, node_ref.with_barrier()));
                        } else {
                            local_patches.push((dst, node_ref));
                            stack.push_many(children);
                        }
                    }
                    Ok(())
                }));
                // Leaf and node writes of this task happen before anything another thread learns about it.
                fence(Ordering::Release);
                completed += 1;
                let error = match outcome {
                    Ok(Ok(())) => return,
                    Ok(Err(error)) => error,
                    Err(_) => BuildError::WorkerPanicked,
                };
                context.abort(error);
                stack.request_stop();
            });
            log::trace!("Worker {worker_index} completed {completed} tasks.");
            worker_patches.lock().extend(local_patches);
        };
        if context.dispatcher.dispatch_workers(&worker_body, usize::MAX).is_err() {
            context.abort(BuildError::WorkerPanicked);
        }
        if let Some(error) = context.take_error() {
            return Err(error);
        }
        debug_assert_eq!(stack.active_task_count(), 0, "Workers left with tasks outstanding.");

        patches.extend(worker_patches.into_inner());
        Ok(BuildOutput {
            patches,
            root_info,
            top_level_tasks,
        })
    }
}
