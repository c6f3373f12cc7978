use core::ops::Range;

use bit_field::BitArray as _;
use byteorder::ByteOrder as _;
use itertools::Itertools as _;
use triomphe::Arc;

use crate::{
    consts::{Endianness, Offset, BITS_PER_BYTE, BYTES_PER_CHUNK, BYTES_PER_LENGTH_OFFSET},
    error::{ReadError, WriteError},
    merkle,
    node::{Node, NodeExt as _},
    schema::{Field, SszType},
    view::View,
};

/// Serializes a view into SSZ bytes.
pub fn serialize(view: &View) -> Result<Vec<u8>, WriteError> {
    match view.ty().fixed_size() {
        Some(size) => {
            let mut bytes = vec![0; size];
            write_fixed(view, &mut bytes);
            Ok(bytes)
        }
        None => {
            let mut bytes = Vec::new();
            write_variable(view, &mut bytes)?;
            Ok(bytes)
        }
    }
}

/// Deserializes SSZ bytes into a view of the given type, validating the
/// encoding as it goes. The resulting backing tree is fully canonical, so two
/// encodings of equal values produce equal views.
pub fn deserialize(ty: &Arc<SszType>, bytes: &[u8]) -> Result<View, ReadError> {
    if let Some(expected) = ty.fixed_size() {
        if bytes.len() != expected {
            return Err(ReadError::FixedSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
    }

    let node = read_tree(ty, bytes)?;

    Ok(View::new_unchecked(ty.clone(), node))
}

fn write_fixed(view: &View, buffer: &mut [u8]) {
    match view.ty().as_ref() {
        SszType::Basic(basic) => {
            let value = view.to_basic().expect("the view is of a basic type");
            value.write_fixed(&mut buffer[..basic.size()]);
        }
        SszType::Container(container) => {
            let mut start = 0;

            for (position, field) in container.fields().iter().enumerate() {
                let size = field
                    .ty()
                    .fixed_size()
                    .expect("fields of fixed-size containers are fixed-size");

                write_fixed(
                    &subview(view, field.ty(), position),
                    &mut buffer[start..start + size],
                );

                start += size;
            }
        }
        SszType::Vector(vector) => match vector.element.fixed_size() {
            Some(_) if vector.element.is_basic() => copy_chunks(view, buffer),
            Some(size) => {
                for position in 0..vector.length {
                    write_fixed(
                        &subview(view, &vector.element, position),
                        &mut buffer[position * size..(position + 1) * size],
                    );
                }
            }
            None => unreachable!("vectors of variable-size elements are variable-size"),
        },
        SszType::BitVector(_) => copy_chunks(view, buffer),
        SszType::List(_) | SszType::BitList(_) => {
            unreachable!("lists are variable-size")
        }
    }
}

fn write_variable(view: &View, bytes: &mut Vec<u8>) -> Result<(), WriteError> {
    let start = bytes.len();

    match view.ty().as_ref() {
        SszType::Container(container) => {
            let fixed_size: usize =
                container.fields().iter().map(Field::fixed_part_size).sum();

            bytes.resize(start + fixed_size, 0);

            let mut slot = start;
            let mut deferred = Vec::new();

            for (position, field) in container.fields().iter().enumerate() {
                let field_view = subview(view, field.ty(), position);

                match field.ty().fixed_size() {
                    Some(size) => write_fixed(&field_view, &mut bytes[slot..slot + size]),
                    None => deferred.push((slot, field_view)),
                }

                slot += field.fixed_part_size();
            }

            for (slot, field_view) in deferred {
                write_offset(bytes, start, slot)?;
                write_variable(&field_view, bytes)?;
            }
        }
        SszType::List(list) => {
            let length = view.length().expect("lists have a length");

            match list.element.fixed_size() {
                Some(size) if list.element.is_basic() => {
                    bytes.resize(start + length * size, 0);
                    copy_chunks(view, &mut bytes[start..]);
                }
                Some(size) => {
                    bytes.resize(start + length * size, 0);

                    for position in 0..length {
                        let slot = start + position * size;

                        write_fixed(
                            &subview(view, &list.element, position),
                            &mut bytes[slot..slot + size],
                        );
                    }
                }
                None => {
                    bytes.resize(start + length * BYTES_PER_LENGTH_OFFSET, 0);

                    for position in 0..length {
                        let element = view
                            .get(position)
                            .expect("the position is below the stored length");

                        write_offset(bytes, start, start + position * BYTES_PER_LENGTH_OFFSET)?;
                        write_variable(&element, bytes)?;
                    }
                }
            }
        }
        SszType::Vector(vector) => {
            // Only vectors of variable-size elements are themselves
            // variable-size.
            bytes.resize(start + vector.length * BYTES_PER_LENGTH_OFFSET, 0);

            for position in 0..vector.length {
                let element = subview(view, &vector.element, position);

                write_offset(bytes, start, start + position * BYTES_PER_LENGTH_OFFSET)?;
                write_variable(&element, bytes)?;
            }
        }
        SszType::BitList(_) => {
            let length = view.length().expect("bit lists have a length");
            let data_bytes = length.div_ceil(BITS_PER_BYTE);

            bytes.resize(start + length / BITS_PER_BYTE + 1, 0);
            copy_chunks(view, &mut bytes[start..start + data_bytes]);

            // The delimiting bit encodes the length.
            bytes[start..].set_bit(length, true);
        }
        SszType::Basic(_) | SszType::BitVector(_) => {
            unreachable!("fixed-size values are written by write_fixed")
        }
    }

    Ok(())
}

/// Copies the packed chunk contents of `view` into `buffer`, whose length
/// determines how many bytes are meaningful.
fn copy_chunks(view: &View, buffer: &mut [u8]) {
    for (position, slot) in buffer.chunks_mut(BYTES_PER_CHUNK).enumerate() {
        let chunk = view
            .node()
            .navigate(view.ty().chunk_gindex(position))
            .expect("the backing tree has a chunk for every packed element")
            .hash();

        slot.copy_from_slice(&chunk[..slot.len()]);
    }
}

fn subview(view: &View, ty: &Arc<SszType>, position: usize) -> View {
    let node = view
        .node()
        .navigate(view.ty().chunk_gindex(position))
        .expect("the backing tree has a subtree for every field and element");

    View::new_unchecked(ty.clone(), node)
}

fn write_offset(bytes: &mut [u8], start: usize, slot: usize) -> Result<(), WriteError> {
    let offset = bytes.len() - start;

    let encoded =
        Offset::try_from(offset).map_err(|_error| WriteError::OffsetTooBig { offset })?;

    Endianness::write_u32(&mut bytes[slot..slot + BYTES_PER_LENGTH_OFFSET], encoded);

    Ok(())
}

fn read_tree(ty: &Arc<SszType>, bytes: &[u8]) -> Result<Arc<Node>, ReadError> {
    match ty.as_ref() {
        SszType::Basic(basic) => Ok(Node::leaf(basic.read(bytes)?.chunk())),
        SszType::Container(container) => {
            let fields = container.fields();
            let fixed_size: usize = fields.iter().map(Field::fixed_part_size).sum();

            let mut fixed_ranges = Vec::with_capacity(fields.len());
            let mut offsets = Vec::new();
            let mut position = 0;

            for field in fields {
                match field.ty().fixed_size() {
                    Some(size) => fixed_ranges.push(Some(position..position + size)),
                    None => {
                        let slot =
                            subslice(bytes, position..position + BYTES_PER_LENGTH_OFFSET)?;

                        offsets.push(read_offset(slot)?);
                        fixed_ranges.push(None);
                    }
                }

                position += field.fixed_part_size();
            }

            if let Some(first) = offsets.first().copied() {
                if first != fixed_size {
                    return Err(ReadError::FirstOffsetMismatch {
                        expected: fixed_size,
                        actual: first,
                    });
                }
            }

            offsets.push(bytes.len());

            let mut variable_ranges = offsets
                .into_iter()
                .tuple_windows()
                .map(|(range_start, range_end)| range_start..range_end);

            let nodes = fields
                .iter()
                .zip(fixed_ranges)
                .map(|(field, fixed_range)| {
                    let range = fixed_range.or_else(|| variable_ranges.next()).expect(
                        "an offset was read for every variable-size field",
                    );

                    read_tree(field.ty(), subslice(bytes, range)?)
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(merkle::subtree_from_nodes(nodes, ty.chunk_depth()))
        }
        SszType::Vector(vector) => match vector.element.fixed_size() {
            Some(_) if vector.element.is_basic() => {
                validate_basic_elements(&vector.element, bytes)?;

                Ok(merkle::subtree_from_chunks(
                    merkle::chunks_from_bytes(bytes),
                    ty.chunk_depth(),
                ))
            }
            Some(size) => Ok(merkle::subtree_from_nodes(
                read_fixed_elements(&vector.element, bytes, size)?,
                ty.chunk_depth(),
            )),
            None => Ok(merkle::subtree_from_nodes(
                read_variable_elements(&vector.element, bytes, vector.length)?,
                ty.chunk_depth(),
            )),
        },
        SszType::List(list) => {
            // The count comes out of the encoding itself and must be checked
            // against the capacity before any tree is built.
            let count = match list.element.fixed_size() {
                Some(size) => {
                    if bytes.len() % size != 0 {
                        return Err(ReadError::ElementSizeMismatch {
                            length: bytes.len(),
                            element_size: size,
                        });
                    }

                    bytes.len() / size
                }
                None if bytes.is_empty() => 0,
                None => {
                    let first_offset =
                        read_offset(subslice(bytes, 0..BYTES_PER_LENGTH_OFFSET)?)?;

                    if first_offset % BYTES_PER_LENGTH_OFFSET != 0 {
                        return Err(ReadError::ListFirstOffsetUnaligned { first_offset });
                    }

                    first_offset / BYTES_PER_LENGTH_OFFSET
                }
            };

            if count > list.maximum {
                return Err(ReadError::ListTooLong {
                    maximum: list.maximum,
                    actual: count,
                });
            }

            let data = match list.element.fixed_size() {
                Some(_) if list.element.is_basic() => {
                    validate_basic_elements(&list.element, bytes)?;

                    merkle::subtree_from_chunks(
                        merkle::chunks_from_bytes(bytes),
                        ty.chunk_depth(),
                    )
                }
                Some(size) => merkle::subtree_from_nodes(
                    read_fixed_elements(&list.element, bytes, size)?,
                    ty.chunk_depth(),
                ),
                None => merkle::subtree_from_nodes(
                    read_variable_elements(&list.element, bytes, count)?,
                    ty.chunk_depth(),
                ),
            };

            Ok(Node::branch(data, Node::leaf(merkle::length_leaf(count))))
        }
        SszType::BitVector(bits) => {
            let highest_excess = (bits.length..bytes.len() * BITS_PER_BYTE)
                .rev()
                .find(|position| bytes.get_bit(*position));

            if let Some(position) = highest_excess {
                return Err(ReadError::BitVectorTooLong {
                    expected: bits.length,
                    actual: position + 1,
                });
            }

            Ok(merkle::subtree_from_chunks(
                merkle::chunks_from_bytes(bytes),
                ty.chunk_depth(),
            ))
        }
        SszType::BitList(bits) => {
            let last_byte = bytes.last().copied().ok_or(ReadError::BitListEmptySlice)?;

            if last_byte == 0 {
                return Err(ReadError::BitListNoDelimitingBit);
            }

            let leading_zeros = usize::try_from(last_byte.leading_zeros())
                .expect("a byte has at most 8 leading zeros");
            let length = bytes.len() * BITS_PER_BYTE - 1 - leading_zeros;

            if length > bits.maximum {
                return Err(ReadError::BitListTooLong {
                    maximum: bits.maximum,
                    actual: length,
                });
            }

            let mut data = bytes.to_vec();

            data.set_bit(length, false);
            data.truncate(length.div_ceil(BITS_PER_BYTE));

            Ok(Node::branch(
                merkle::subtree_from_chunks(
                    merkle::chunks_from_bytes(&data),
                    ty.chunk_depth(),
                ),
                Node::leaf(merkle::length_leaf(length)),
            ))
        }
    }
}

/// Rejects basic sequences with invalid elements. Only booleans can be
/// invalid; for integer types this is a no-op.
fn validate_basic_elements(element: &SszType, bytes: &[u8]) -> Result<(), ReadError> {
    let SszType::Basic(basic) = element else {
        unreachable!("the caller checked that the element type is basic")
    };

    for slice in bytes.chunks(basic.size()) {
        basic.read(slice)?;
    }

    Ok(())
}

fn read_fixed_elements(
    element: &Arc<SszType>,
    bytes: &[u8],
    size: usize,
) -> Result<Vec<Arc<Node>>, ReadError> {
    bytes
        .chunks(size)
        .map(|slice| read_tree(element, slice))
        .collect()
}

fn read_variable_elements(
    element: &Arc<SszType>,
    bytes: &[u8],
    count: usize,
) -> Result<Vec<Arc<Node>>, ReadError> {
    let mut offsets = Vec::with_capacity(count + 1);

    for position in 0..count {
        let slot = subslice(
            bytes,
            position * BYTES_PER_LENGTH_OFFSET..(position + 1) * BYTES_PER_LENGTH_OFFSET,
        )?;

        offsets.push(read_offset(slot)?);
    }

    if let Some(first) = offsets.first().copied() {
        let expected = count * BYTES_PER_LENGTH_OFFSET;

        if first != expected {
            return Err(ReadError::FirstOffsetMismatch {
                expected,
                actual: first,
            });
        }
    }

    offsets.push(bytes.len());

    offsets
        .into_iter()
        .tuple_windows()
        .map(|(start, end)| read_tree(element, subslice(bytes, start..end)?))
        .collect()
}

fn subslice(bytes: &[u8], range: Range<usize>) -> Result<&[u8], ReadError> {
    let Range { start, end } = range;

    bytes
        .get(range)
        .ok_or(ReadError::OffsetsNotValidSubsliceBounds {
            start,
            end,
            length: bytes.len(),
        })
}

fn read_offset(slot: &[u8]) -> Result<usize, ReadError> {
    let offset = Endianness::read_u32(slot);

    usize::try_from(offset).map_err(|_error| ReadError::OffsetDoesNotFitInUsize { offset })
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use test_case::test_case;

    use crate::{
        basic::{BasicType, BasicValue},
        error::SchemaError,
    };

    use super::*;

    fn uint64() -> Arc<SszType> {
        SszType::basic(BasicType::U64)
    }

    fn fork() -> Arc<SszType> {
        SszType::container([
            ("previous_version", SszType::basic(BasicType::Bytes4)),
            ("current_version", SszType::basic(BasicType::Bytes4)),
            ("epoch", uint64()),
        ])
        .expect("the container has fields")
    }

    fn round_trip(ty: &Arc<SszType>, bytes: &[u8]) -> View {
        let view = deserialize(ty, bytes).expect("the bytes are a valid encoding");

        assert_eq!(
            serialize(&view).expect("offsets fit in 4 bytes"),
            bytes,
            "reserializing must reproduce the encoding of {ty}",
        );

        view
    }

    #[test]
    fn fixed_size_containers_round_trip() {
        let bytes = hex!("01020304 0a0b0c0d 2a00000000000000");
        let view = round_trip(&fork(), &bytes);

        assert_eq!(
            view.field("current_version").expect("the field exists"),
            BasicValue::Bytes4(hex!("0a0b0c0d")).into(),
        );
        assert_eq!(
            view.field("epoch").expect("the field exists"),
            BasicValue::from(42_u64).into(),
        );
    }

    #[test]
    fn fixed_size_values_reject_wrong_sizes() {
        assert_eq!(
            deserialize(&fork(), &[0; 15]).unwrap_err(),
            ReadError::FixedSizeMismatch {
                expected: 16,
                actual: 15,
            },
        );
    }

    #[test]
    fn lists_of_basic_values_round_trip() -> Result<(), SchemaError> {
        let ty = SszType::list(uint64(), 8)?;

        assert_eq!(round_trip(&ty, &[]).length().expect("lists have a length"), 0);

        let bytes = hex!("0100000000000000 0200000000000000 0300000000000000");
        let view = round_trip(&ty, &bytes);

        assert_eq!(view.length().expect("lists have a length"), 3);
        assert_eq!(
            view.get(2).expect("the position is in bounds"),
            BasicValue::from(3_u64).into(),
        );

        // The deserialized tree must be canonical.
        let mut mutable = View::new_default(ty).to_mutable();
        for value in [1_u64, 2, 3] {
            mutable
                .push(&BasicValue::from(value).into())
                .expect("the list is below capacity");
        }
        assert_eq!(view, mutable.commit());

        Ok(())
    }

    #[test]
    fn fixed_size_vectors_round_trip() -> Result<(), SchemaError> {
        let packed = SszType::vector(uint64(), 3)?;
        let bytes = hex!("0100000000000000 0200000000000000 0300000000000000");
        let view = round_trip(&packed, &bytes);

        assert_eq!(
            view.get(2).expect("the position is in bounds"),
            BasicValue::from(3_u64).into(),
        );

        let pair = SszType::container([("a", uint64()), ("b", uint64())])?;
        let composite = SszType::vector(pair, 2)?;
        let bytes = hex!(
            "0100000000000000 0200000000000000"
            "0300000000000000 0400000000000000"
        );
        let view = round_trip(&composite, &bytes);

        assert_eq!(
            view.get(1)
                .expect("the position is in bounds")
                .field("b")
                .expect("the field exists"),
            BasicValue::from(4_u64).into(),
        );

        Ok(())
    }

    #[test]
    fn lists_at_exact_capacity_round_trip() -> Result<(), SchemaError> {
        let ty = SszType::list(uint64(), 2)?;
        let view = round_trip(&ty, &hex!("0100000000000000 0200000000000000"));

        assert_eq!(view.length().expect("lists have a length"), 2);

        Ok(())
    }

    #[test]
    fn lists_reject_indivisible_and_oversized_input() -> Result<(), SchemaError> {
        let ty = SszType::list(uint64(), 2)?;

        assert_eq!(
            deserialize(&ty, &[0; 12]).unwrap_err(),
            ReadError::ElementSizeMismatch {
                length: 12,
                element_size: 8,
            },
        );
        assert_eq!(
            deserialize(&ty, &[0; 24]).unwrap_err(),
            ReadError::ListTooLong {
                maximum: 2,
                actual: 3,
            },
        );

        Ok(())
    }

    #[test]
    fn containers_with_variable_fields_use_offsets() -> Result<(), SchemaError> {
        let ty = SszType::container([
            ("slot", uint64()),
            ("values", SszType::list(SszType::basic(BasicType::U16), 4)?),
        ])?;

        // 8 bytes of slot, a 4-byte offset pointing past them, two elements.
        let bytes = hex!("0700000000000000 0c000000 1100 2200");
        let view = round_trip(&ty, &bytes);

        assert_eq!(
            view.field("slot").expect("the field exists"),
            BasicValue::from(7_u64).into(),
        );

        let values = view.field("values").expect("the field exists");

        assert_eq!(values.length().expect("lists have a length"), 2);
        assert_eq!(
            values.get(1).expect("the position is in bounds"),
            BasicValue::from(0x22_u16).into(),
        );

        Ok(())
    }

    #[test]
    fn containers_reject_misplaced_first_offsets() -> Result<(), SchemaError> {
        let ty = SszType::container([
            ("slot", uint64()),
            ("values", SszType::list(SszType::basic(BasicType::U16), 4)?),
        ])?;

        let bytes = hex!("0700000000000000 0b000000 1100 2200");

        assert_eq!(
            deserialize(&ty, &bytes).unwrap_err(),
            ReadError::FirstOffsetMismatch {
                expected: 12,
                actual: 11,
            },
        );

        Ok(())
    }

    #[test]
    fn lists_of_lists_reject_decreasing_offsets() -> Result<(), SchemaError> {
        let inner = SszType::list(SszType::basic(BasicType::U8), 8)?;
        let ty = SszType::list(inner, 4)?;

        // Two offsets, the second pointing before the first.
        let bytes = hex!("08000000 07000000 aa bb");

        assert_eq!(
            deserialize(&ty, &bytes).unwrap_err(),
            ReadError::OffsetsNotValidSubsliceBounds {
                start: 8,
                end: 7,
                length: 10,
            },
        );

        Ok(())
    }

    #[test]
    fn lists_of_variable_elements_round_trip() -> Result<(), SchemaError> {
        let inner = SszType::list(SszType::basic(BasicType::U8), 8)?;
        let ty = SszType::list(inner, 4)?;

        let bytes = hex!("08000000 09000000 aa bbcc");
        let view = round_trip(&ty, &bytes);

        assert_eq!(view.length().expect("lists have a length"), 2);

        let second = view.get(1).expect("the position is in bounds");

        assert_eq!(second.length().expect("lists have a length"), 2);
        assert_eq!(
            second.get(0).expect("the position is in bounds"),
            BasicValue::from(0xbb_u8).into(),
        );

        Ok(())
    }

    #[test_case(&[] => ReadError::BitListEmptySlice)]
    #[test_case(&hex!("ff 00") => ReadError::BitListNoDelimitingBit)]
    #[test_case(&hex!("ff ff ff") => ReadError::BitListTooLong { maximum: 16, actual: 23 })]
    fn malformed_bit_lists_are_rejected(bytes: &[u8]) -> ReadError {
        let ty = SszType::bit_list(16).expect("the capacity is nonzero");

        deserialize(&ty, bytes).unwrap_err()
    }

    #[test]
    fn bit_lists_round_trip_with_their_delimiter() {
        let ty = SszType::bit_list(16).expect("the capacity is nonzero");

        // Bits [1, 0, 1] plus the delimiter at position 3.
        let view = round_trip(&ty, &hex!("0d"));

        assert_eq!(view.length().expect("bit lists have a length"), 3);
        assert!(view.bit(0).expect("the position is in bounds"));
        assert!(!view.bit(1).expect("the position is in bounds"));
        assert!(view.bit(2).expect("the position is in bounds"));

        // A length divisible by 8 puts the delimiter in a byte of its own.
        let view = round_trip(&ty, &hex!("ff 01"));

        assert_eq!(view.length().expect("bit lists have a length"), 8);
    }

    #[test]
    fn bit_vectors_reject_excess_bits() {
        let ty = SszType::bit_vector(10).expect("the capacity is nonzero");

        assert_eq!(
            deserialize(&ty, &hex!("ff 0f")).unwrap_err(),
            ReadError::BitVectorTooLong {
                expected: 10,
                actual: 12,
            },
        );

        let view = round_trip(&ty, &hex!("ff 03"));

        assert!(view.bit(9).expect("the position is in bounds"));
    }

    #[test]
    fn vectors_of_variable_elements_round_trip() -> Result<(), SchemaError> {
        let inner = SszType::list(SszType::basic(BasicType::U8), 8)?;
        let ty = SszType::vector(inner, 2)?;

        let bytes = hex!("08000000 0a000000 aabb ccddee");
        let view = round_trip(&ty, &bytes);

        assert_eq!(
            view.get(1)
                .expect("the position is in bounds")
                .length()
                .expect("lists have a length"),
            3,
        );

        Ok(())
    }

    #[test]
    fn booleans_in_sequences_are_validated() -> Result<(), SchemaError> {
        let ty = SszType::list(SszType::basic(BasicType::Bool), 4)?;

        assert_eq!(
            deserialize(&ty, &hex!("01 02")).unwrap_err(),
            ReadError::BooleanInvalid { value: 2 },
        );

        Ok(())
    }
}
