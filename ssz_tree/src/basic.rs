use core::fmt::{Display, Formatter, Result as FmtResult};

use byteorder::ByteOrder as _;
use ethereum_types::{H256, U256};

use crate::{
    consts::{Endianness, BYTES_PER_CHUNK},
    error::ReadError,
};

/// Fixed-width scalar kinds: unsigned integers, booleans, and the two
/// fixed-size byte array widths the protocol uses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BasicType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    U128,
    U256,
    Bytes4,
    Bytes32,
}

impl Display for BasicType {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter.write_str(match self {
            Self::Bool => "boolean",
            Self::U8 => "uint8",
            Self::U16 => "uint16",
            Self::U32 => "uint32",
            Self::U64 => "uint64",
            Self::U128 => "uint128",
            Self::U256 => "uint256",
            Self::Bytes4 => "bytes4",
            Self::Bytes32 => "bytes32",
        })
    }
}

impl BasicType {
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Bool | Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 | Self::Bytes4 => 4,
            Self::U64 => 8,
            Self::U128 => 16,
            Self::U256 | Self::Bytes32 => 32,
        }
    }

    /// How many values of this type pack into one 32-byte chunk.
    #[must_use]
    pub const fn values_per_chunk(self) -> usize {
        BYTES_PER_CHUNK / self.size()
    }

    /// Decodes a value from exactly [`size`](Self::size) little-endian bytes.
    pub fn read(self, bytes: &[u8]) -> Result<BasicValue, ReadError> {
        let value = match self {
            Self::Bool => match bytes[0] {
                0 => BasicValue::Bool(false),
                1 => BasicValue::Bool(true),
                value => return Err(ReadError::BooleanInvalid { value }),
            },
            Self::U8 => BasicValue::U8(bytes[0]),
            Self::U16 => BasicValue::U16(Endianness::read_u16(bytes)),
            Self::U32 => BasicValue::U32(Endianness::read_u32(bytes)),
            Self::U64 => BasicValue::U64(Endianness::read_u64(bytes)),
            Self::U128 => BasicValue::U128(Endianness::read_u128(bytes)),
            Self::U256 => BasicValue::U256(U256::from_little_endian(bytes)),
            Self::Bytes4 => {
                let mut value = [0; 4];
                value.copy_from_slice(bytes);
                BasicValue::Bytes4(value)
            }
            Self::Bytes32 => BasicValue::Bytes32(H256::from_slice(bytes)),
        };

        Ok(value)
    }
}

/// A decoded scalar, tagged with its [`BasicType`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BasicValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    U256(U256),
    Bytes4([u8; 4]),
    Bytes32(H256),
}

impl BasicValue {
    #[must_use]
    pub const fn basic_type(self) -> BasicType {
        match self {
            Self::Bool(_) => BasicType::Bool,
            Self::U8(_) => BasicType::U8,
            Self::U16(_) => BasicType::U16,
            Self::U32(_) => BasicType::U32,
            Self::U64(_) => BasicType::U64,
            Self::U128(_) => BasicType::U128,
            Self::U256(_) => BasicType::U256,
            Self::Bytes4(_) => BasicType::Bytes4,
            Self::Bytes32(_) => BasicType::Bytes32,
        }
    }

    #[must_use]
    pub const fn size(self) -> usize {
        self.basic_type().size()
    }

    /// Encodes into exactly [`size`](Self::size) little-endian bytes.
    pub(crate) fn write_fixed(self, bytes: &mut [u8]) {
        match self {
            Self::Bool(value) => bytes[0] = value.into(),
            Self::U8(value) => bytes[0] = value,
            Self::U16(value) => Endianness::write_u16(bytes, value),
            Self::U32(value) => Endianness::write_u32(bytes, value),
            Self::U64(value) => Endianness::write_u64(bytes, value),
            Self::U128(value) => Endianness::write_u128(bytes, value),
            Self::U256(value) => value.to_little_endian(bytes),
            Self::Bytes4(value) => bytes.copy_from_slice(&value),
            Self::Bytes32(value) => bytes.copy_from_slice(value.as_bytes()),
        }
    }

    /// The 32-byte chunk backing a standalone value: the encoding zero-padded
    /// on the right.
    #[must_use]
    pub(crate) fn chunk(self) -> H256 {
        let mut chunk = H256::zero();
        self.write_fixed(&mut chunk.as_bytes_mut()[..self.size()]);
        chunk
    }
}

impl From<bool> for BasicValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u8> for BasicValue {
    fn from(value: u8) -> Self {
        Self::U8(value)
    }
}

impl From<u16> for BasicValue {
    fn from(value: u16) -> Self {
        Self::U16(value)
    }
}

impl From<u32> for BasicValue {
    fn from(value: u32) -> Self {
        Self::U32(value)
    }
}

impl From<u64> for BasicValue {
    fn from(value: u64) -> Self {
        Self::U64(value)
    }
}

impl From<u128> for BasicValue {
    fn from(value: u128) -> Self {
        Self::U128(value)
    }
}

impl From<U256> for BasicValue {
    fn from(value: U256) -> Self {
        Self::U256(value)
    }
}

impl From<H256> for BasicValue {
    fn from(value: H256) -> Self {
        Self::Bytes32(value)
    }
}
