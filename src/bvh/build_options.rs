use super::error::{BuildError, Result};
use super::prim_ref_list::PRIM_REF_BLOCK_CAPACITY;

/// Largest accepted `log_block_size` and `log_sah_block_size`.
pub const MAX_LOG_BLOCK_SIZE: u32 = 8;

/// Settings for a single build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildOptions {
    /// Allows splits that clip primitives and reference them from both sides.
    pub enable_spatial_splits: bool,
    /// Request for one instance per scene object. Only meaningful to whoever constructs the primitive source; the
    /// builder carries it through untouched.
    pub force_instance_per_object: bool,
    /// Only the first `n` primitives of the source are indexed when set.
    pub max_objects_to_consider: Option<usize>,
    /// Upper bound on references (originals plus spatial split duplicates) relative to the primitive count.
    pub replication_factor: f32,
    /// Worker threads used by the default dispatcher. Zero selects the available parallelism.
    pub thread_count: usize,
    /// Builds at or below this primitive count run entirely on the calling thread.
    pub single_threaded_threshold: usize,
    /// Worker tasks smaller than this are finished in one go instead of being expanded one level.
    pub task_size_threshold: usize,
    /// The top-level phase stops once this many tasks are pending. `None` uses the worker count.
    pub top_level_task_target: Option<usize>,
    /// Subsets at or below this size always become leaves.
    pub min_leaf_size: usize,
    /// Largest subset a leaf may hold; clamped to what the leaf encoding supports.
    pub max_leaf_size: usize,
    /// Leaves store primitives in blocks of `1 << log_block_size`.
    pub log_block_size: u32,
    /// Block granularity used when estimating leaf cost.
    pub log_sah_block_size: u32,
    /// Most blocks a single leaf can address.
    pub max_leaf_blocks: usize,
    /// Cost of intersecting one primitive block.
    pub intersection_cost: f32,
    /// Cost of traversing one inner node.
    pub traversal_cost: f32,
    /// Subsets deeper than this become leaves regardless of cost.
    pub max_build_depth: usize,
    /// Depth at which large-leaf subdivision gives up; reaching it aborts the build.
    pub max_build_depth_leaf: usize,
    /// Bins per axis for object partitioning.
    pub bin_count: usize,
    /// Bins per axis for spatial splitting.
    pub spatial_bin_count: usize,
    /// 0 is quiet; 2 and up logs a build summary with tree statistics.
    pub verbose: u32,
    /// Logs a single machine-readable timing line after the build.
    pub benchmark: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            enable_spatial_splits: false,
            force_instance_per_object: false,
            max_objects_to_consider: None,
            replication_factor: 1.2,
            thread_count: 0,
            single_threaded_threshold: 50_000,
            task_size_threshold: 4 * 1024,
            top_level_task_target: None,
            min_leaf_size: 4,
            max_leaf_size: 32,
            log_block_size: 2,
            log_sah_block_size: 2,
            max_leaf_blocks: 8,
            intersection_cost: 1.0,
            traversal_cost: 1.0,
            max_build_depth: 32,
            max_build_depth_leaf: 48,
            bin_count: 32,
            spatial_bin_count: 16,
            verbose: 0,
            benchmark: false,
        }
    }
}

impl BuildOptions {
    /// Options with spatial splits turned on and the given replication bound.
    pub fn high_quality(replication_factor: f32) -> Self {
        Self {
            enable_spatial_splits: true,
            replication_factor,
            ..Self::default()
        }
    }

    /// Largest leaf the builder will create after applying the structural limits.
    pub fn effective_max_leaf_size(&self) -> usize {
        let block_limit = 1usize
            .checked_shl(self.log_block_size)
            .map_or(usize::MAX, |block_size| self.max_leaf_blocks.saturating_mul(block_size));
        self.max_leaf_size
            .min(block_limit)
            .min(PRIM_REF_BLOCK_CAPACITY)
    }

    /// Number of primitives indexed for a source with `source_count` primitives.
    pub fn effective_primitive_count(&self, source_count: usize) -> usize {
        self.max_objects_to_consider
            .map_or(source_count, |limit| limit.min(source_count))
    }

    /// Replications the spatial splitter may create for `primitive_count` primitives.
    pub fn replication_budget(&self, primitive_count: usize) -> usize {
        if !self.enable_spatial_splits {
            return 0;
        }
        let max_primitives = (self.replication_factor as f64 * primitive_count as f64).floor() as usize;
        max_primitives.saturating_sub(primitive_count)
    }

    /// Checks the options for values the builder cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.replication_factor.is_finite() || self.replication_factor < 1.0 {
            return Err(BuildError::InvalidOptions(format!(
                "replication factor must be finite and at least 1.0, got {}",
                self.replication_factor
            )));
        }
        if self.bin_count < 2 || self.spatial_bin_count < 2 {
            return Err(BuildError::InvalidOptions(format!(
                "bin counts must be at least 2, got {} and {}",
                self.bin_count, self.spatial_bin_count
            )));
        }
        if self.log_block_size > MAX_LOG_BLOCK_SIZE || self.log_sah_block_size > MAX_LOG_BLOCK_SIZE {
            return Err(BuildError::InvalidOptions(format!(
                "log block sizes must not exceed {MAX_LOG_BLOCK_SIZE}, got {} and {}",
                self.log_block_size, self.log_sah_block_size
            )));
        }
        if self.min_leaf_size == 0 {
            return Err(BuildError::InvalidOptions(
                "minimum leaf size must be positive".to_string(),
            ));
        }
        let max_leaf_size = self.effective_max_leaf_size();
        if self.min_leaf_size > max_leaf_size {
            return Err(BuildError::InvalidOptions(format!(
                "minimum leaf size {} exceeds the effective maximum leaf size {}",
                self.min_leaf_size, max_leaf_size
            )));
        }
        if self.max_build_depth >= self.max_build_depth_leaf {
            return Err(BuildError::InvalidOptions(format!(
                "leaf depth limit {} must exceed the build depth limit {}",
                self.max_build_depth_leaf, self.max_build_depth
            )));
        }
        if self.task_size_threshold == 0 {
            return Err(BuildError::InvalidOptions(
                "task size threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_log_block_sizes_are_rejected() {
        for log_block_size in [MAX_LOG_BLOCK_SIZE + 1, 64, u32::MAX] {
            let options = BuildOptions {
                log_block_size,
                ..BuildOptions::default()
            };
            assert!(matches!(
                options.validate(),
                Err(BuildError::InvalidOptions(_))
            ));
            assert_eq!(options.effective_max_leaf_size(), 32);
        }
        let options = BuildOptions {
            log_sah_block_size: 64,
            ..BuildOptions::default()
        };
        assert!(options.validate().is_err());
        let options = BuildOptions {
            log_block_size: MAX_LOG_BLOCK_SIZE,
            max_leaf_blocks: usize::MAX,
            ..BuildOptions::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn defaults_validate() {
        assert!(BuildOptions::default().validate().is_ok());
        assert_eq!(BuildOptions::default().effective_max_leaf_size(), 32);
    }

    #[test]
    fn replication_factor_below_one_is_rejected() {
        let options = BuildOptions {
            replication_factor: 0.5,
            ..BuildOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(BuildError::InvalidOptions(_))
        ));
        let options = BuildOptions {
            replication_factor: f32::NAN,
            ..BuildOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn replication_budget_requires_spatial_splits() {
        assert_eq!(BuildOptions::default().replication_budget(1000), 0);
        assert_eq!(BuildOptions::high_quality(1.2).replication_budget(200_000), 40_000);
        assert_eq!(BuildOptions::high_quality(1.0).replication_budget(1000), 0);
    }

    #[test]
    fn max_objects_truncates_the_source() {
        let options = BuildOptions {
            max_objects_to_consider: Some(10),
            ..BuildOptions::default()
        };
        assert_eq!(options.effective_primitive_count(100), 10);
        assert_eq!(options.effective_primitive_count(5), 5);
    }

    #[test]
    fn leaf_size_is_clamped_to_the_leaf_encoding() {
        let options = BuildOptions {
            max_leaf_size: usize::MAX,
            max_leaf_blocks: 3,
            ..BuildOptions::default()
        };
        assert_eq!(options.effective_max_leaf_size(), 12);
    }
}
