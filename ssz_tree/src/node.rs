use core::fmt::{Debug, Formatter, Result as FmtResult};

use easy_ext::ext;
use ethereum_types::H256;
use hashing::ZERO_HASHES;
use once_cell::{race::OnceBox, sync::Lazy};
use triomphe::Arc;

use crate::{
    error::IndexError,
    gindex::{self, GeneralizedIndex},
};

/// Deepest all-zero subtree kept in the shared table. Schema construction
/// rejects descriptors that would need deeper trees.
pub(crate) const MAX_ZERO_DEPTH: u32 = 63;

/// An immutable node of a backing Merkle tree.
///
/// Nodes are shared through [`Arc`] and never mutated in place; every update
/// produces fresh nodes along the changed path. A branch hash is therefore
/// valid for the lifetime of the node, which is what makes caching it sound.
pub enum Node {
    Branch {
        left: Arc<Node>,
        right: Arc<Node>,
        // `OnceBox` keeps the node a word smaller than `OnceCell<H256>` would.
        // The tradeoff is that concurrent first accesses may hash the same
        // subtree more than once instead of blocking, which is harmless.
        cached_hash: OnceBox<H256>,
    },
    Leaf {
        chunk: H256,
    },
}

// The `Debug` impl for `OnceBox` formats it as a raw pointer.
impl Debug for Node {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        match self {
            Self::Branch {
                left,
                right,
                cached_hash,
            } => formatter
                .debug_struct("Branch")
                .field("cached_hash", &cached_hash.get())
                .field("left", left)
                .field("right", right)
                .finish(),
            Self::Leaf { chunk } => formatter.debug_tuple("Leaf").field(chunk).finish(),
        }
    }
}

impl Node {
    #[must_use]
    pub fn leaf(chunk: H256) -> Arc<Self> {
        Arc::new(Self::Leaf { chunk })
    }

    #[must_use]
    pub fn branch(left: Arc<Self>, right: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::Branch {
            left,
            right,
            cached_hash: OnceBox::new(),
        })
    }

    /// All-zero subtree of the given depth, shared process-wide.
    ///
    /// Hashes are pre-seeded, so padding never costs a hash computation.
    #[must_use]
    pub fn zero(depth: u32) -> Arc<Self> {
        static ZERO_NODES: Lazy<Vec<Arc<Node>>> = Lazy::new(|| {
            let max_depth = usize::try_from(MAX_ZERO_DEPTH).expect("MAX_ZERO_DEPTH fits in usize");
            let mut nodes = Vec::with_capacity(max_depth + 1);
            let mut hash = H256::zero();

            nodes.push(Node::leaf(hash));

            for depth in 1..=max_depth {
                hash = match ZERO_HASHES.get(depth) {
                    Some(tabulated) => *tabulated,
                    None => hashing::hash_256_256(hash, hash),
                };

                let child = Arc::clone(&nodes[depth - 1]);
                nodes.push(Node::branch_with_hash(Arc::clone(&child), child, hash));
            }

            nodes
        });

        let depth = usize::try_from(depth).expect("tree depths fit in usize");
        Arc::clone(&ZERO_NODES[depth])
    }

    /// For a leaf this is its chunk; for a branch it is
    /// `hash_256_256(left.hash(), right.hash())`, computed at most once per
    /// node and cached.
    #[must_use]
    pub fn hash(&self) -> H256 {
        match self {
            Self::Branch {
                left,
                right,
                cached_hash,
            } => *cached_hash
                .get_or_init(|| Box::new(hashing::hash_256_256(left.hash(), right.hash()))),
            Self::Leaf { chunk } => *chunk,
        }
    }

    fn branch_with_hash(left: Arc<Self>, right: Arc<Self>, hash: H256) -> Arc<Self> {
        let cached_hash = OnceBox::new();

        cached_hash
            .set(Box::new(hash))
            .expect("the cell was created empty");

        Arc::new(Self::Branch {
            left,
            right,
            cached_hash,
        })
    }

    fn replace(
        node: &Arc<Self>,
        depth: u32,
        index: GeneralizedIndex,
        subtree: Arc<Self>,
    ) -> Result<Arc<Self>, IndexError> {
        if depth == 0 {
            return Ok(subtree);
        }

        match node.as_ref() {
            Self::Branch { left, right, .. } => {
                let level = depth - 1;

                if index >> level & 1 == 1 {
                    let right = Self::replace(right, level, index, subtree)?;
                    Ok(Self::branch(Arc::clone(left), right))
                } else {
                    let left = Self::replace(left, level, index, subtree)?;
                    Ok(Self::branch(left, Arc::clone(right)))
                }
            }
            Self::Leaf { .. } => Err(IndexError::PastLeaf { index }),
        }
    }
}

/// Traversal and structural updates on shared nodes. These live on
/// `Arc<Node>` because their results share subtrees with the receiver.
#[ext(NodeExt)]
pub impl Arc<Node> {
    /// Descends left or right per the bit pattern of `index`.
    fn navigate(&self, index: GeneralizedIndex) -> Result<Arc<Node>, IndexError> {
        if index == 0 {
            return Err(IndexError::ZeroGeneralizedIndex);
        }

        let mut node = self;

        for level in (0..gindex::depth(index)).rev() {
            match node.as_ref() {
                Node::Branch { left, right, .. } => {
                    node = if index >> level & 1 == 1 { right } else { left };
                }
                Node::Leaf { .. } => return Err(IndexError::PastLeaf { index }),
            }
        }

        Ok(Arc::clone(node))
    }

    /// Returns a tree identical to `self` except that the node at `index` is
    /// replaced with `subtree`.
    ///
    /// Only the ancestors of the replaced node are rebuilt (with empty hash
    /// cells); every subtree off the path is shared with the original.
    /// Cost is proportional to the depth of `index`, not to the tree size.
    fn with_subtree(
        &self,
        index: GeneralizedIndex,
        subtree: Arc<Node>,
    ) -> Result<Arc<Node>, IndexError> {
        if index == 0 {
            return Err(IndexError::ZeroGeneralizedIndex);
        }

        Node::replace(self, gindex::depth(index), index, subtree)
    }
}
