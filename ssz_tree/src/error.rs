use thiserror::Error;
use triomphe::Arc;

use crate::{
    consts::{Offset, BYTES_PER_LENGTH_OFFSET},
    gindex::GeneralizedIndex,
    schema::SszType,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum SchemaError {
    #[error("container types must have at least one field")]
    EmptyContainer,
    #[error("sequence types must have nonzero capacity")]
    ZeroCapacity,
    #[error("capacity of {capacity} does not fit in an addressable backing tree")]
    CapacityTooLarge { capacity: usize },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum ReadError {
    #[error("expected fixed-size value of {expected} bytes, found {actual} bytes")]
    FixedSizeMismatch { expected: usize, actual: usize },
    #[error("offset {offset} does not fit in usize")]
    OffsetDoesNotFitInUsize { offset: Offset },
    #[error(
        "offsets {start} and {end} are not valid subslice bounds for slice of length {length}"
    )]
    OffsetsNotValidSubsliceBounds {
        start: usize,
        end: usize,
        length: usize,
    },
    #[error("expected boolean to be 0 or 1, found {value}")]
    BooleanInvalid { value: u8 },
    #[error("expected {expected} as the first offset, found {actual}")]
    FirstOffsetMismatch { expected: usize, actual: usize },
    #[error("first offset of list is not aligned")]
    ListFirstOffsetUnaligned { first_offset: usize },
    #[error("slice of {length} bytes does not divide into elements of {element_size} bytes")]
    ElementSizeMismatch { length: usize, element_size: usize },
    #[error("expected list to have no more than {maximum} elements, found {actual} elements")]
    ListTooLong { maximum: usize, actual: usize },
    #[error("expected bit vector to have {expected} bits, found {actual} bits")]
    BitVectorTooLong { expected: usize, actual: usize },
    #[error("empty slice is not a valid bit list")]
    BitListEmptySlice,
    #[error("last byte of slice has no delimiting bit")]
    BitListNoDelimitingBit,
    #[error("expected bit list to have no more than {maximum} bits, found {actual} bits")]
    BitListTooLong { maximum: usize, actual: usize },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum WriteError {
    #[error("offset {offset} does not fit in {BYTES_PER_LENGTH_OFFSET} bytes")]
    OffsetTooBig { offset: usize },
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum IndexError {
    #[error("generalized index 0 does not address any node")]
    ZeroGeneralizedIndex,
    #[error("generalized index {index} descends past a leaf")]
    PastLeaf { index: GeneralizedIndex },
    #[error("index {index} is out of bounds for collection of length {length}")]
    OutOfBounds { length: usize, index: usize },
    #[error("container has no field named `{name}`")]
    UnknownField { name: Box<str> },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum PushError {
    #[error("capacity of {maximum} elements exceeded")]
    CapacityExceeded { maximum: usize },
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum ViewError {
    #[error("expected a value of type {expected}, found {actual}")]
    TypeMismatch {
        expected: Arc<SszType>,
        actual: Arc<SszType>,
    },
    #[error("operation requires {expected}, found a value of type {actual}")]
    KindMismatch {
        expected: &'static str,
        actual: Arc<SszType>,
    },
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Push(#[from] PushError),
    #[error(transparent)]
    Read(#[from] ReadError),
}
