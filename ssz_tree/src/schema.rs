use core::fmt::{Display, Formatter, Result as FmtResult};

use arithmetic::UsizeExt as _;
use itertools::Itertools as _;
use triomphe::Arc;

use crate::{
    basic::BasicType,
    consts::{BITS_PER_BYTE, BITS_PER_CHUNK, BYTES_PER_CHUNK, BYTES_PER_LENGTH_OFFSET},
    error::{IndexError, SchemaError},
    gindex::{self, GeneralizedIndex},
    merkle,
    node::{MAX_ZERO_DEPTH, Node},
};

/// A type descriptor: pure schema metadata describing how a logical value
/// maps to a backing tree and to SSZ wire bytes.
///
/// Descriptors carry no value data and are shared as `Arc<SszType>` between
/// every view of the same type. Capacities are part of the type.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum SszType {
    Basic(BasicType),
    Container(ContainerType),
    Vector(VectorType),
    List(ListType),
    BitVector(BitVectorType),
    BitList(BitListType),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ContainerType {
    fields: Box<[Field]>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Field {
    name: Box<str>,
    ty: Arc<SszType>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VectorType {
    pub(crate) element: Arc<SszType>,
    pub(crate) length: usize,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ListType {
    pub(crate) element: Arc<SszType>,
    pub(crate) maximum: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BitVectorType {
    pub(crate) length: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BitListType {
    pub(crate) maximum: usize,
}

impl Display for SszType {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        match self {
            Self::Basic(basic) => basic.fmt(formatter),
            Self::Container(container) => {
                let fields = container
                    .fields
                    .iter()
                    .format_with(", ", |field, f| f(&format_args!("{}: {}", field.name, field.ty)));
                write!(formatter, "Container {{ {fields} }}")
            }
            Self::Vector(vector) => write!(formatter, "Vector[{}, {}]", vector.element, vector.length),
            Self::List(list) => write!(formatter, "List[{}, {}]", list.element, list.maximum),
            Self::BitVector(bits) => write!(formatter, "Bitvector[{}]", bits.length),
            Self::BitList(bits) => write!(formatter, "Bitlist[{}]", bits.maximum),
        }
    }
}

impl SszType {
    #[must_use]
    pub fn basic(basic: BasicType) -> Arc<Self> {
        Arc::new(Self::Basic(basic))
    }

    /// An ordered, fixed set of named fields.
    pub fn container<'names>(
        fields: impl IntoIterator<Item = (&'names str, Arc<Self>)>,
    ) -> Result<Arc<Self>, SchemaError> {
        let fields = fields
            .into_iter()
            .map(|(name, ty)| Field {
                name: name.into(),
                ty,
            })
            .collect::<Box<[_]>>();

        if fields.is_empty() {
            return Err(SchemaError::EmptyContainer);
        }

        Ok(Arc::new(Self::Container(ContainerType { fields })))
    }

    /// A homogeneous sequence of exactly `length` elements.
    pub fn vector(element: Arc<Self>, length: usize) -> Result<Arc<Self>, SchemaError> {
        validate_capacity(&element, length, MAX_ZERO_DEPTH)?;

        Ok(Arc::new(Self::Vector(VectorType { element, length })))
    }

    /// A homogeneous sequence of up to `maximum` elements.
    pub fn list(element: Arc<Self>, maximum: usize) -> Result<Arc<Self>, SchemaError> {
        // The length mix-in level sits above the data subtree, so lists get
        // one level less for their chunks.
        validate_capacity(&element, maximum, MAX_ZERO_DEPTH - 1)?;

        Ok(Arc::new(Self::List(ListType { element, maximum })))
    }

    /// A packed sequence of exactly `length` bits.
    pub fn bit_vector(length: usize) -> Result<Arc<Self>, SchemaError> {
        if length == 0 {
            return Err(SchemaError::ZeroCapacity);
        }

        Ok(Arc::new(Self::BitVector(BitVectorType { length })))
    }

    /// A packed sequence of up to `maximum` bits.
    pub fn bit_list(maximum: usize) -> Result<Arc<Self>, SchemaError> {
        if maximum == 0 {
            return Err(SchemaError::ZeroCapacity);
        }

        Ok(Arc::new(Self::BitList(BitListType { maximum })))
    }

    #[must_use]
    pub fn is_fixed_size(&self) -> bool {
        self.fixed_size().is_some()
    }

    /// The wire size of every value of this type, defined only for
    /// fixed-size types.
    #[must_use]
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Basic(basic) => Some(basic.size()),
            Self::Container(container) => container
                .fields
                .iter()
                .map(|field| field.ty.fixed_size())
                .sum(),
            Self::Vector(vector) => vector
                .element
                .fixed_size()
                .map(|size| size * vector.length),
            Self::BitVector(bits) => Some(bits.length.div_ceil(BITS_PER_BYTE)),
            Self::List(_) | Self::BitList(_) => None,
        }
    }

    /// Number of 32-byte chunks at the bottom of a value's tree. Sequences of
    /// basic values and bit sequences pack multiple elements per chunk;
    /// sequence counts are derived from the capacity, not the current length.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        match self {
            Self::Basic(_) => 1,
            Self::Container(container) => container.fields.len(),
            Self::Vector(vector) => sequence_chunk_count(&vector.element, vector.length),
            Self::List(list) => sequence_chunk_count(&list.element, list.maximum),
            Self::BitVector(bits) => bits.length.div_ceil(BITS_PER_CHUNK),
            Self::BitList(bits) => bits.maximum.div_ceil(BITS_PER_CHUNK),
        }
    }

    /// Depth of the chunk level of a value's tree (excluding the length
    /// mix-in level of lists).
    #[must_use]
    pub fn chunk_depth(&self) -> u32 {
        self.chunk_count().ilog2_ceil()
    }

    /// The canonical tree of this type's zero value. Zero subtrees are shared
    /// process-wide, so the cost is proportional to the number of distinct
    /// nonzero descriptors involved, not to the capacity.
    #[must_use]
    pub fn default_tree(&self) -> Arc<Node> {
        match self {
            Self::Basic(_) | Self::BitVector(_) => Node::zero(self.chunk_depth()),
            Self::Container(container) => merkle::subtree_from_nodes(
                container.fields.iter().map(|field| field.ty.default_tree()),
                self.chunk_depth(),
            ),
            Self::Vector(vector) => {
                if vector.element.is_basic() {
                    Node::zero(self.chunk_depth())
                } else {
                    let element = vector.element.default_tree();
                    merkle::subtree_from_nodes(
                        core::iter::repeat_n(element, vector.length),
                        self.chunk_depth(),
                    )
                }
            }
            Self::List(_) | Self::BitList(_) => Node::branch(
                Node::zero(self.chunk_depth()),
                Node::zero(0),
            ),
        }
    }

    /// Generalized index of the chunk-level subtree at `position` within a
    /// value's backing tree. For lists the path passes through the data
    /// subtree under the left child of the root.
    #[must_use]
    pub(crate) fn chunk_gindex(&self, position: usize) -> GeneralizedIndex {
        let leaf = gindex::leaf_at_depth(self.chunk_depth(), position);

        match self {
            Self::List(_) | Self::BitList(_) => gindex::concatenate(gindex::DATA, leaf),
            _ => leaf,
        }
    }

    #[must_use]
    pub(crate) const fn is_basic(&self) -> bool {
        matches!(self, Self::Basic(_))
    }

    #[must_use]
    pub(crate) const fn as_container(&self) -> Option<&ContainerType> {
        match self {
            Self::Container(container) => Some(container),
            _ => None,
        }
    }
}

impl ContainerType {
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_position(&self, name: &str) -> Result<usize, IndexError> {
        self.fields
            .iter()
            .position(|field| &*field.name == name)
            .ok_or_else(|| IndexError::UnknownField { name: name.into() })
    }
}

impl Field {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ty(&self) -> &Arc<SszType> {
        &self.ty
    }

    /// Contribution of this field to the fixed part of its container's
    /// encoding: its own size if fixed, otherwise an offset.
    #[must_use]
    pub(crate) fn fixed_part_size(&self) -> usize {
        self.ty.fixed_size().unwrap_or(BYTES_PER_LENGTH_OFFSET)
    }
}

fn sequence_chunk_count(element: &SszType, length: usize) -> usize {
    match element {
        SszType::Basic(basic) => (length * basic.size()).div_ceil(BYTES_PER_CHUNK),
        _ => length,
    }
}

/// Sequence capacities must produce trees whose leaves have generalized
/// indices, so their chunk depth is bounded.
fn validate_capacity(
    element: &SszType,
    capacity: usize,
    depth_limit: u32,
) -> Result<(), SchemaError> {
    if capacity == 0 {
        return Err(SchemaError::ZeroCapacity);
    }

    let chunks = match element {
        SszType::Basic(basic) => capacity
            .checked_mul(basic.size())
            .map(|bytes| bytes.div_ceil(BYTES_PER_CHUNK)),
        _ => Some(capacity),
    };

    if !chunks.is_some_and(|chunks| chunks.ilog2_ceil() <= depth_limit) {
        return Err(SchemaError::CapacityTooLarge { capacity });
    }

    Ok(())
}
