use std::collections::BTreeMap;

use bit_field::BitArray as _;
use ethereum_types::H256;
use triomphe::Arc;

use crate::{
    consts::BITS_PER_CHUNK,
    error::{IndexError, PushError, ViewError},
    gindex::{self, GeneralizedIndex},
    merkle,
    node::{Node, NodeExt as _},
    schema::SszType,
    view::View,
};

/// A batch of modifications on top of a [`View`].
///
/// Writes are staged as replacement subtrees keyed by generalized index and
/// folded into the backing tree on [`commit`]. The view the batch was started
/// from is never affected. Staging the same position twice keeps the later
/// write.
///
/// [`commit`]: Self::commit
#[derive(Debug)]
pub struct MutableView {
    ty: Arc<SszType>,
    base: Arc<Node>,
    pending: BTreeMap<GeneralizedIndex, Arc<Node>>,
    length: usize,
}

impl MutableView {
    pub(crate) fn new(view: &View) -> Self {
        Self {
            ty: view.ty().clone(),
            base: view.node().clone(),
            pending: BTreeMap::new(),
            length: view.length().unwrap_or_default(),
        }
    }

    /// Replaces the element at `position` of a vector or a list.
    pub fn set(&mut self, position: usize, value: &View) -> Result<(), ViewError> {
        let element = match self.ty.as_ref() {
            SszType::Vector(vector) => &vector.element,
            SszType::List(list) => &list.element,
            _ => return Err(self.kind_mismatch("a vector or a list")),
        };

        check_type(element, value)?;

        if position >= self.length {
            return Err(IndexError::OutOfBounds {
                length: self.length,
                index: position,
            }
            .into());
        }

        self.set_element(position, value)
    }

    /// Replaces the field named `name` of a container.
    pub fn set_field(&mut self, name: &str, value: &View) -> Result<(), ViewError> {
        let Some(container) = self.ty.as_container() else {
            return Err(self.kind_mismatch("a container"));
        };

        let position = container.field_position(name)?;

        check_type(container.fields()[position].ty(), value)?;

        self.pending
            .insert(self.ty.chunk_gindex(position), value.node().clone());

        Ok(())
    }

    /// Sets the bit at `position` of a bit vector or a bit list.
    pub fn set_bit(&mut self, position: usize, bit: bool) -> Result<(), ViewError> {
        match self.ty.as_ref() {
            SszType::BitVector(_) | SszType::BitList(_) => {}
            _ => return Err(self.kind_mismatch("a bit sequence")),
        }

        if position >= self.length {
            return Err(IndexError::OutOfBounds {
                length: self.length,
                index: position,
            }
            .into());
        }

        self.stage_bit(position, bit)
    }

    /// Appends to a list, failing if it is already at capacity.
    pub fn push(&mut self, value: &View) -> Result<(), ViewError> {
        let SszType::List(list) = self.ty.as_ref() else {
            return Err(self.kind_mismatch("a list"));
        };

        let maximum = list.maximum;
        let element = list.element.clone();

        if self.length >= maximum {
            return Err(PushError::CapacityExceeded { maximum }.into());
        }

        check_type(&element, value)?;

        self.set_element(self.length, value)?;
        self.length += 1;

        Ok(())
    }

    /// Appends to a bit list, failing if it is already at capacity.
    pub fn push_bit(&mut self, bit: bool) -> Result<(), ViewError> {
        let SszType::BitList(bits) = self.ty.as_ref() else {
            return Err(self.kind_mismatch("a bit list"));
        };

        if self.length >= bits.maximum {
            return Err(PushError::CapacityExceeded {
                maximum: bits.maximum,
            }
            .into());
        }

        self.stage_bit(self.length, bit)?;
        self.length += 1;

        Ok(())
    }

    /// Folds the staged writes into the backing tree and produces the
    /// modified value. Ancestors shared by multiple writes are rebuilt once
    /// per write path; everything off those paths is shared with the
    /// original tree.
    #[must_use]
    pub fn commit(self) -> View {
        let mut node = self.base;

        for (index, subtree) in self.pending {
            node = node
                .with_subtree(index, subtree)
                .expect("staged indices address chunks of the backing tree");
        }

        if matches!(self.ty.as_ref(), SszType::List(_) | SszType::BitList(_)) {
            let stored = node
                .navigate(gindex::LENGTH)
                .map(|leaf| merkle::read_length_leaf(leaf.hash()))
                .expect("list trees have a length leaf");

            if stored != self.length {
                node = node
                    .with_subtree(gindex::LENGTH, Node::leaf(merkle::length_leaf(self.length)))
                    .expect("list trees have a length leaf");
            }
        }

        View::new_unchecked(self.ty, node)
    }

    fn set_element(&mut self, position: usize, value: &View) -> Result<(), ViewError> {
        match value.ty().as_ref() {
            SszType::Basic(basic) => {
                let per_chunk = basic.values_per_chunk();
                let index = self.ty.chunk_gindex(position / per_chunk);
                let mut chunk = self.current_chunk(index)?.to_fixed_bytes();
                let offset = position % per_chunk * basic.size();

                value
                    .to_basic()?
                    .write_fixed(&mut chunk[offset..offset + basic.size()]);

                self.pending.insert(index, Node::leaf(H256(chunk)));
            }
            _ => {
                self.pending
                    .insert(self.ty.chunk_gindex(position), value.node().clone());
            }
        }

        Ok(())
    }

    fn stage_bit(&mut self, position: usize, bit: bool) -> Result<(), ViewError> {
        let index = self.ty.chunk_gindex(position / BITS_PER_CHUNK);
        let mut chunk = self.current_chunk(index)?.to_fixed_bytes();

        chunk.set_bit(position % BITS_PER_CHUNK, bit);
        self.pending.insert(index, Node::leaf(H256(chunk)));

        Ok(())
    }

    fn current_chunk(&self, index: GeneralizedIndex) -> Result<H256, ViewError> {
        match self.pending.get(&index) {
            Some(node) => Ok(node.hash()),
            None => Ok(self.base.navigate(index)?.hash()),
        }
    }

    fn kind_mismatch(&self, expected: &'static str) -> ViewError {
        ViewError::KindMismatch {
            expected,
            actual: self.ty.clone(),
        }
    }
}

fn check_type(expected: &Arc<SszType>, value: &View) -> Result<(), ViewError> {
    if expected != value.ty() {
        return Err(ViewError::TypeMismatch {
            expected: expected.clone(),
            actual: value.ty().clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::basic::{BasicType, BasicValue};
    use crate::error::SchemaError;
    use crate::merkle::mix_in_length;

    use super::*;

    fn uint64() -> Arc<SszType> {
        SszType::basic(BasicType::U64)
    }

    fn filled_list(values: impl IntoIterator<Item = u64>) -> View {
        let mut mutable = View::new_default(
            SszType::list(uint64(), 8).expect("the capacity is nonzero"),
        )
        .to_mutable();

        for value in values {
            mutable
                .push(&BasicValue::from(value).into())
                .expect("the list is below capacity");
        }

        mutable.commit()
    }

    #[test]
    fn pushed_elements_read_back_in_order() {
        let list = filled_list([1, 2, 3]);

        assert_eq!(list.length().expect("lists have a length"), 3);

        for (position, expected) in [1_u64, 2, 3].into_iter().enumerate() {
            assert_eq!(
                list.get(position).expect("the position is in bounds"),
                BasicValue::from(expected).into(),
            );
        }
    }

    #[test]
    fn pushing_past_capacity_fails_and_leaves_the_batch_usable() {
        let mut mutable = filled_list([0; 8]).to_mutable();

        assert_eq!(
            mutable.push(&BasicValue::from(9_u64).into()).unwrap_err(),
            PushError::CapacityExceeded { maximum: 8 }.into(),
        );

        // The failed push must not affect the committed value.
        assert_eq!(mutable.commit(), filled_list([0; 8]));
    }

    #[test]
    fn list_roots_mix_in_the_length() {
        let list = filled_list([1, 2, 3]);

        let mut chunk = H256::zero();
        BasicValue::from(1_u64).write_fixed(&mut chunk[..8]);
        BasicValue::from(2_u64).write_fixed(&mut chunk[8..16]);
        BasicValue::from(3_u64).write_fixed(&mut chunk[16..24]);

        let data_root = hashing::hash_256_256(chunk, hashing::ZERO_HASHES[0]);

        assert_eq!(list.hash_tree_root(), mix_in_length(data_root, 3));

        // Appending a zero leaves the packed chunks unchanged, so the roots
        // differ purely because of the length leaf.
        let longer = filled_list([1, 2, 3, 0]);

        assert_eq!(longer.hash_tree_root(), mix_in_length(data_root, 4));
        assert_ne!(longer.hash_tree_root(), list.hash_tree_root());
    }

    #[test]
    fn write_order_does_not_affect_the_root() -> Result<(), SchemaError> {
        let pair = SszType::container([("a", uint64()), ("b", uint64())])?;

        let mut forward = View::new_default(pair.clone()).to_mutable();
        forward
            .set_field("a", &BasicValue::from(1_u64).into())
            .expect("the field exists");
        forward
            .set_field("b", &BasicValue::from(2_u64).into())
            .expect("the field exists");

        let mut backward = View::new_default(pair).to_mutable();
        backward
            .set_field("b", &BasicValue::from(2_u64).into())
            .expect("the field exists");
        backward
            .set_field("a", &BasicValue::from(1_u64).into())
            .expect("the field exists");

        assert_eq!(forward.commit(), backward.commit());

        Ok(())
    }

    #[test]
    fn commits_do_not_affect_the_original_and_share_untouched_subtrees() -> Result<(), SchemaError> {
        let inner = SszType::container([("x", uint64())])?;
        let outer = SszType::container([("left", inner.clone()), ("right", inner)])?;

        let original = View::new_default(outer);
        let root_before = original.hash_tree_root();

        let mut mutable = original.to_mutable();
        let mut left = original.field("left").expect("the field exists").to_mutable();
        left.set_field("x", &BasicValue::from(5_u64).into())
            .expect("the field exists");
        mutable
            .set_field("left", &left.commit())
            .expect("the field exists");
        let modified = mutable.commit();

        assert_eq!(original.hash_tree_root(), root_before);
        assert_ne!(modified.hash_tree_root(), root_before);

        // The untouched sibling is the same tree, not a copy.
        assert!(Arc::ptr_eq(
            original.field("right").expect("the field exists").node(),
            modified.field("right").expect("the field exists").node(),
        ));

        Ok(())
    }

    #[test]
    fn later_writes_to_the_same_position_win() {
        let mut mutable = filled_list([1, 2, 3]).to_mutable();

        mutable
            .set(1, &BasicValue::from(10_u64).into())
            .expect("the position is in bounds");
        mutable
            .set(1, &BasicValue::from(20_u64).into())
            .expect("the position is in bounds");

        assert_eq!(
            mutable.commit().get(1).expect("the position is in bounds"),
            BasicValue::from(20_u64).into(),
        );
    }

    #[test]
    fn mismatched_element_types_are_rejected() {
        let mut mutable = filled_list([1]).to_mutable();
        let wrong = View::from(BasicValue::from(true));

        assert!(matches!(
            mutable.set(0, &wrong).unwrap_err(),
            ViewError::TypeMismatch { .. },
        ));
    }

    #[test]
    fn pushing_bits_past_capacity_fails() {
        let mut mutable = View::new_default(
            SszType::bit_list(4).expect("the capacity is nonzero"),
        )
        .to_mutable();

        for _ in 0..4 {
            mutable.push_bit(true).expect("the bit list is below capacity");
        }

        assert_eq!(
            mutable.push_bit(true).unwrap_err(),
            PushError::CapacityExceeded { maximum: 4 }.into(),
        );

        // The failed push must not affect the committed length.
        let bits = mutable.commit();

        assert_eq!(bits.length().expect("bit lists have a length"), 4);
    }

    #[test]
    fn bit_lists_track_their_length_and_bits() -> Result<(), SchemaError> {
        let mut mutable = View::new_default(SszType::bit_list(16)?).to_mutable();

        for bit in [true, false, true] {
            mutable.push_bit(bit).expect("the bit list is below capacity");
        }

        let bits = mutable.commit();

        assert_eq!(bits.length().expect("bit lists have a length"), 3);
        assert!(bits.bit(0).expect("the position is in bounds"));
        assert!(!bits.bit(1).expect("the position is in bounds"));
        assert!(bits.bit(2).expect("the position is in bounds"));

        let mut chunk = H256::zero();
        chunk.as_bytes_mut()[0] = 0b101;

        assert_eq!(bits.hash_tree_root(), mix_in_length(chunk, 3));

        Ok(())
    }
}
