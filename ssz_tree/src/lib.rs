// These are re-exported so that callers registering schemas and holding views
// do not need direct dependencies on the underlying crates.
pub use ethereum_types::H256;
pub use hashing;
pub use triomphe::Arc;

pub use crate::{
    basic::{BasicType, BasicValue},
    codec::{deserialize, serialize},
    consts::{
        Endianness, Offset, BITS_PER_BYTE, BITS_PER_CHUNK, BYTES_PER_CHUNK,
        BYTES_PER_LENGTH_OFFSET,
    },
    error::{IndexError, PushError, ReadError, SchemaError, ViewError, WriteError},
    gindex::{GeneralizedIndex, ROOT},
    merkle::{length_leaf, mix_in_length},
    mutable::MutableView,
    node::{Node, NodeExt},
    schema::SszType,
    view::View,
};

mod basic;
mod codec;
mod consts;
mod error;
mod gindex;
mod merkle;
mod mutable;
mod node;
mod schema;
mod view;
