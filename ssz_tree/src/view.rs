use bit_field::BitArray as _;
use ethereum_types::H256;
use triomphe::Arc;

use crate::{
    basic::BasicValue,
    consts::BITS_PER_CHUNK,
    error::{IndexError, ViewError},
    gindex,
    merkle,
    mutable::MutableView,
    node::{Node, NodeExt as _},
    schema::SszType,
};

/// An immutable value of some [`SszType`], backed by a Merkle tree.
///
/// Views are cheap to clone and to compare: cloning copies two pointers, and
/// comparison hashes at most the uncached parts of both trees. Reading a
/// field or an element produces another view sharing the same tree.
#[derive(Clone, Debug)]
pub struct View {
    ty: Arc<SszType>,
    node: Arc<Node>,
}

impl From<BasicValue> for View {
    fn from(value: BasicValue) -> Self {
        Self {
            ty: SszType::basic(value.basic_type()),
            node: Node::leaf(value.chunk()),
        }
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.hash_tree_root() == other.hash_tree_root()
    }
}

impl Eq for View {}

impl View {
    /// The zero value of the given type.
    #[must_use]
    pub fn new_default(ty: Arc<SszType>) -> Self {
        let node = ty.default_tree();
        Self { ty, node }
    }

    pub(crate) fn new_unchecked(ty: Arc<SszType>, node: Arc<Node>) -> Self {
        Self { ty, node }
    }

    #[must_use]
    pub fn ty(&self) -> &Arc<SszType> {
        &self.ty
    }

    pub(crate) fn node(&self) -> &Arc<Node> {
        &self.node
    }

    #[must_use]
    pub fn hash_tree_root(&self) -> H256 {
        self.node.hash()
    }

    /// The number of elements or bits. Lists store theirs in the tree;
    /// vectors get theirs from the type.
    pub fn length(&self) -> Result<usize, ViewError> {
        match self.ty.as_ref() {
            SszType::Vector(vector) => Ok(vector.length),
            SszType::BitVector(bits) => Ok(bits.length),
            SszType::List(_) | SszType::BitList(_) => {
                let leaf = self.node.navigate(gindex::LENGTH)?;
                Ok(merkle::read_length_leaf(leaf.hash()))
            }
            _ => Err(self.kind_mismatch("a sequence")),
        }
    }

    /// The element at `position` of a vector or a list.
    pub fn get(&self, position: usize) -> Result<Self, ViewError> {
        let element = match self.ty.as_ref() {
            SszType::Vector(vector) => &vector.element,
            SszType::List(list) => &list.element,
            _ => return Err(self.kind_mismatch("a vector or a list")),
        };

        let length = self.length()?;

        if position >= length {
            return Err(IndexError::OutOfBounds {
                length,
                index: position,
            }
            .into());
        }

        match element.as_ref() {
            SszType::Basic(basic) => {
                let per_chunk = basic.values_per_chunk();
                let chunk_index = self.ty.chunk_gindex(position / per_chunk);
                let chunk = self.node.navigate(chunk_index)?.hash();
                let offset = position % per_chunk * basic.size();
                let value = basic.read(&chunk.as_bytes()[offset..offset + basic.size()])?;
                Ok(value.into())
            }
            _ => {
                let node = self.node.navigate(self.ty.chunk_gindex(position))?;
                Ok(Self::new_unchecked(element.clone(), node))
            }
        }
    }

    /// The field named `name` of a container.
    pub fn field(&self, name: &str) -> Result<Self, ViewError> {
        let Some(container) = self.ty.as_container() else {
            return Err(self.kind_mismatch("a container"));
        };

        let position = container.field_position(name)?;
        let node = self.node.navigate(self.ty.chunk_gindex(position))?;
        let ty = container.fields()[position].ty().clone();

        Ok(Self::new_unchecked(ty, node))
    }

    /// The bit at `position` of a bit vector or a bit list.
    pub fn bit(&self, position: usize) -> Result<bool, ViewError> {
        match self.ty.as_ref() {
            SszType::BitVector(_) | SszType::BitList(_) => {}
            _ => return Err(self.kind_mismatch("a bit sequence")),
        }

        let length = self.length()?;

        if position >= length {
            return Err(IndexError::OutOfBounds {
                length,
                index: position,
            }
            .into());
        }

        let chunk_index = self.ty.chunk_gindex(position / BITS_PER_CHUNK);
        let chunk = self.node.navigate(chunk_index)?.hash();

        Ok(chunk.as_bytes().get_bit(position % BITS_PER_CHUNK))
    }

    /// The value of a view of a basic type.
    pub fn to_basic(&self) -> Result<BasicValue, ViewError> {
        let SszType::Basic(basic) = self.ty.as_ref() else {
            return Err(self.kind_mismatch("a basic value"));
        };

        let chunk = self.node.hash();
        Ok(basic.read(&chunk.as_bytes()[..basic.size()])?)
    }

    /// Starts a batch of modifications on a copy of this value.
    #[must_use]
    pub fn to_mutable(&self) -> MutableView {
        MutableView::new(self)
    }

    fn kind_mismatch(&self, expected: &'static str) -> ViewError {
        ViewError::KindMismatch {
            expected,
            actual: self.ty.clone(),
        }
    }
}
