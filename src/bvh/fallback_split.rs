use super::prim_ref::{PrimInfo, PrimRef};
use super::prim_ref_list::{PrimRefBlockAllocator, PrimRefList};
use super::split::Partitioned;

/// Halves a set of references by count, ignoring geometry.
///
/// References are ordered by primitive id first so the halves do not depend on how the list happened to be chained.
/// Always makes progress for two or more references, which is what the large-leaf path relies on when every cost
/// based split has failed.
pub fn split(mut prims: PrimRefList, alloc: &mut PrimRefBlockAllocator) -> Partitioned {
    let mut refs: Vec<PrimRef> = Vec::with_capacity(prims.len());
    while let Some(block) = prims.take() {
        refs.extend_from_slice(block.items());
        alloc.free(block);
    }
    refs.sort_by_key(|prim| prim.id);
    let middle = refs.len() / 2;
    let mut partitioned = Partitioned::default();
    for prim in &refs[..middle] {
        partitioned.left.push(*prim, alloc);
    }
    for prim in &refs[middle..] {
        partitioned.right.push(*prim, alloc);
    }
    partitioned.left_info = PrimInfo::from_refs(&refs[..middle]);
    partitioned.right_info = PrimInfo::from_refs(&refs[middle..]);
    partitioned
}
