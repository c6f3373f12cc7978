//! Generalized indices address positions in a conceptual complete binary tree:
//! the root is 1 and the children of node `i` are `2 * i` and `2 * i + 1`.

/// An address of a node in a backing tree. Valid indices are nonzero.
pub type GeneralizedIndex = u64;

pub const ROOT: GeneralizedIndex = 1;

/// The data subtree of a list sits under the left child of the root.
pub(crate) const DATA: GeneralizedIndex = 2;
/// The length mix-in leaf of a list is the right child of the root.
pub(crate) const LENGTH: GeneralizedIndex = 3;

/// Number of levels between `index` and the root of its tree.
#[must_use]
pub(crate) fn depth(index: GeneralizedIndex) -> u32 {
    assert!(index > 0);
    index.ilog2()
}

/// Address of the node reached by following the path of `child` starting from
/// the subtree addressed by `parent`.
#[must_use]
pub(crate) fn concatenate(
    parent: GeneralizedIndex,
    child: GeneralizedIndex,
) -> GeneralizedIndex {
    let child_depth = depth(child);
    (parent << child_depth) | (child ^ (1 << child_depth))
}

/// Address of leaf `position` in a balanced subtree of the given depth.
#[must_use]
pub(crate) fn leaf_at_depth(depth: u32, position: usize) -> GeneralizedIndex {
    let position = u64::try_from(position).expect("leaf positions fit in u64");
    assert!(position < 1 << depth);
    (1_u64 << depth) | position
}
