use ethereum_types::H256;
use hashing::hash_256_256;
use triomphe::Arc;

use crate::{consts::BYTES_PER_CHUNK, node::Node};

/// Builds a subtree of the given depth over the given nodes, padding with
/// zero subtrees on the right. The input must fit, i.e. there must be at
/// most `2 ^ depth` nodes.
pub(crate) fn subtree_from_nodes(
    nodes: impl IntoIterator<Item = Arc<Node>>,
    depth: u32,
) -> Arc<Node> {
    let mut level = nodes.into_iter().collect::<Vec<_>>();

    assert!(
        level.len() <= 2_usize.pow(depth.min(usize::BITS - 1)),
        "{} nodes do not fit in a subtree of depth {depth}",
        level.len(),
    );

    for height in 0..depth {
        if level.is_empty() {
            break;
        }

        let mut pairs = level.chunks_exact(2);

        let mut next = pairs
            .by_ref()
            .map(|pair| Node::branch(pair[0].clone(), pair[1].clone()))
            .collect::<Vec<_>>();

        if let [odd] = pairs.remainder() {
            next.push(Node::branch(odd.clone(), Node::zero(height)));
        }

        level = next;
    }

    match level.pop() {
        Some(root) => root,
        None => Node::zero(depth),
    }
}

pub(crate) fn subtree_from_chunks(
    chunks: impl IntoIterator<Item = H256>,
    depth: u32,
) -> Arc<Node> {
    subtree_from_nodes(chunks.into_iter().map(Node::leaf), depth)
}

/// Splits serialized data into 32-byte chunks, zero-padding the last one.
pub(crate) fn chunks_from_bytes(bytes: &[u8]) -> impl Iterator<Item = H256> + '_ {
    bytes.chunks(BYTES_PER_CHUNK).map(|slice| {
        let mut chunk = H256::zero();
        chunk[..slice.len()].copy_from_slice(slice);
        chunk
    })
}

/// The chunk that stores a sequence length: the length in little-endian,
/// zero-padded to 32 bytes.
#[must_use]
pub fn length_leaf(length: usize) -> H256 {
    let mut chunk = H256::zero();
    chunk[..size_of::<usize>()].copy_from_slice(&length.to_le_bytes());
    chunk
}

#[must_use]
pub fn mix_in_length(root: H256, length: usize) -> H256 {
    hash_256_256(root, length_leaf(length))
}

pub(crate) fn read_length_leaf(chunk: H256) -> usize {
    let mut bytes = [0; size_of::<usize>()];
    bytes.copy_from_slice(&chunk[..size_of::<usize>()]);
    usize::from_le_bytes(bytes)
}
