//! Little-endian packed encode/decode of runtime messages.
//!
//! Encoding walks the fields in declaration order, flattening nested
//! compounds and packing bitfields into their backing primitive. Decoding
//! walks the same layout over a byte cursor; the trailing variable array
//! sizes itself from the remaining buffer. For any validly constructed
//! message `m`, `decode(encode(m)) == m`, and for any accepted buffer `b`,
//! `encode(decode(b)) == b`.

use crate::error::{CodecError, CodecResult};
use crate::schema::{BaseType, CountMode, FieldDef, MessageDef, Prim, Schema};
use crate::value::{pack_bits, unpack_bits, validate_scalar, FieldValue, MessageValue};

/// Encodes a message into its packed little-endian wire form.
pub fn encode(schema: &Schema, msg: &MessageValue) -> CodecResult<Vec<u8>> {
    let def = schema
        .def(&msg.name)
        .ok_or_else(|| CodecError::UnknownMessage {
            name: msg.name.clone(),
        })?;
    let mut out = Vec::with_capacity(schema.layout(def).fixed_size);
    encode_def(schema, def, msg, &mut out)?;
    log::debug!("encoded `{}` into {} bytes", msg.name, out.len());
    Ok(out)
}

/// Decodes a packed little-endian buffer into a message.
pub fn decode(schema: &Schema, def: &MessageDef, bytes: &[u8]) -> CodecResult<MessageValue> {
    let mut cursor = Cursor::new(bytes);
    let msg = decode_def(schema, def, &mut cursor)?;
    if cursor.remaining() > 0 {
        return Err(CodecError::ExcessBuffer {
            remaining: cursor.remaining(),
        });
    }
    Ok(msg)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::ShortBuffer {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

fn encode_def(
    schema: &Schema,
    def: &MessageDef,
    msg: &MessageValue,
    out: &mut Vec<u8>,
) -> CodecResult<()> {
    for (name, _) in &msg.fields {
        if def.field(name).is_none() {
            return Err(CodecError::UnknownField {
                message: def.name.clone(),
                field: name.clone(),
            });
        }
    }
    for (index, field) in def.fields.iter().enumerate() {
        if field.is_variable() && index + 1 != def.fields.len() {
            return Err(CodecError::VariableFieldNotLast {
                field: field.name.clone(),
            });
        }
        let value = msg.get(&field.name).ok_or_else(|| CodecError::MissingField {
            message: def.name.clone(),
            field: field.name.clone(),
        })?;
        encode_field(schema, field, value, out)?;
    }
    Ok(())
}

fn encode_field(
    schema: &Schema,
    field: &FieldDef,
    value: &FieldValue,
    out: &mut Vec<u8>,
) -> CodecResult<()> {
    match field.count {
        CountMode::One => encode_element(schema, field, value, out),
        CountMode::Fixed(n) => {
            let FieldValue::Array(items) = value else {
                return Err(CodecError::TypeMismatch {
                    field: field.name.clone(),
                    expected: "array",
                    got: value.kind_name(),
                });
            };
            if items.len() != n {
                return Err(CodecError::ArityMismatch {
                    field: field.name.clone(),
                    expected: n,
                    got: items.len(),
                });
            }
            for item in items {
                encode_element(schema, field, item, out)?;
            }
            Ok(())
        }
        CountMode::Variable => {
            let FieldValue::Array(items) = value else {
                return Err(CodecError::TypeMismatch {
                    field: field.name.clone(),
                    expected: "array",
                    got: value.kind_name(),
                });
            };
            for item in items {
                encode_element(schema, field, item, out)?;
            }
            Ok(())
        }
    }
}

fn encode_element(
    schema: &Schema,
    field: &FieldDef,
    value: &FieldValue,
    out: &mut Vec<u8>,
) -> CodecResult<()> {
    match field.base {
        BaseType::Prim(prim) => {
            let FieldValue::Scalar(v) = value else {
                return Err(CodecError::TypeMismatch {
                    field: field.name.clone(),
                    expected: "scalar",
                    got: value.kind_name(),
                });
            };
            validate_scalar(schema, field, *v)?;
            write_prim(out, prim, *v);
            Ok(())
        }
        BaseType::Bitfield(handle) => {
            let FieldValue::Bits(bits) = value else {
                return Err(CodecError::TypeMismatch {
                    field: field.name.clone(),
                    expected: "bitfield",
                    got: value.kind_name(),
                });
            };
            let bf = schema.bitfield_at(handle);
            if bits.bitfield != bf.name {
                return Err(CodecError::TypeMismatch {
                    field: field.name.clone(),
                    expected: "matching bitfield",
                    got: "different bitfield",
                });
            }
            let word = pack_bits(schema, bf, bits)?;
            write_prim(out, bf.storage(), word as i64);
            Ok(())
        }
        BaseType::Compound(handle) => {
            let FieldValue::Compound(inner) = value else {
                return Err(CodecError::TypeMismatch {
                    field: field.name.clone(),
                    expected: "compound",
                    got: value.kind_name(),
                });
            };
            let sub_def = schema.def_at(handle);
            if inner.name != sub_def.name {
                return Err(CodecError::TypeMismatch {
                    field: field.name.clone(),
                    expected: "matching compound type",
                    got: "different compound type",
                });
            }
            encode_def(schema, sub_def, inner, out)
        }
    }
}

fn decode_def(
    schema: &Schema,
    def: &MessageDef,
    cursor: &mut Cursor<'_>,
) -> CodecResult<MessageValue> {
    let mut fields = Vec::with_capacity(def.fields.len());
    for (index, field) in def.fields.iter().enumerate() {
        let value = match field.count {
            CountMode::One => decode_element(schema, field, cursor)?,
            CountMode::Fixed(n) => {
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(decode_element(schema, field, cursor)?);
                }
                FieldValue::Array(items)
            }
            CountMode::Variable => {
                if index + 1 != def.fields.len() {
                    return Err(CodecError::VariableFieldNotLast {
                        field: field.name.clone(),
                    });
                }
                let stride = schema.element_size(field.base);
                let remaining = cursor.remaining();
                if stride == 0 || remaining % stride != 0 {
                    return Err(CodecError::ExcessBuffer {
                        remaining: if stride == 0 {
                            remaining
                        } else {
                            remaining % stride
                        },
                    });
                }
                let count = remaining / stride;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(decode_element(schema, field, cursor)?);
                }
                FieldValue::Array(items)
            }
        };
        fields.push((field.name.clone(), value));
    }
    Ok(MessageValue {
        name: def.name.clone(),
        fields,
    })
}

fn decode_element(
    schema: &Schema,
    field: &FieldDef,
    cursor: &mut Cursor<'_>,
) -> CodecResult<FieldValue> {
    match field.base {
        BaseType::Prim(prim) => {
            let value = read_prim(cursor, prim)?;
            validate_scalar(schema, field, value)?;
            Ok(FieldValue::Scalar(value))
        }
        BaseType::Bitfield(handle) => {
            let bf = schema.bitfield_at(handle);
            let word = read_prim(cursor, bf.storage())? as u64;
            Ok(FieldValue::Bits(unpack_bits(schema, bf, word)?))
        }
        BaseType::Compound(handle) => {
            // Compounds never hold a variable tail, so the recursive walk
            // consumes exactly the compound's fixed size.
            let sub_def = schema.def_at(handle);
            Ok(FieldValue::Compound(decode_def(schema, sub_def, cursor)?))
        }
    }
}

fn write_prim(out: &mut Vec<u8>, prim: Prim, value: i64) {
    match prim {
        Prim::U8 => out.push(value as u8),
        Prim::I8 => out.push(value as i8 as u8),
        Prim::U16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
        Prim::I16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
        Prim::U32 => out.extend_from_slice(&(value as u32).to_le_bytes()),
        Prim::I32 => out.extend_from_slice(&(value as i32).to_le_bytes()),
    }
}

fn read_prim(cursor: &mut Cursor<'_>, prim: Prim) -> CodecResult<i64> {
    let bytes = cursor.take(prim.size_bytes())?;
    let value = match prim {
        Prim::U8 => i64::from(bytes[0]),
        Prim::I8 => i64::from(bytes[0] as i8),
        Prim::U16 => i64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
        Prim::I16 => i64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        Prim::U32 => i64::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        Prim::I32 => i64::from(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::MessageBuilder;

    fn schema() -> Schema {
        Schema::from_json_str(
            r#"{
                "enums": [
                    {"name": "Color", "desc": "d", "entries": [
                        {"entry": "RED", "value": 1, "desc": "r"},
                        {"entry": "GREEN", "value": 2, "desc": "g"},
                        {"entry": "BLUE", "value": 3, "desc": "b"}
                    ]},
                    {"name": "Code", "desc": "d", "entries": [
                        {"entry": "OK", "value": 0, "desc": "ok"},
                        {"entry": "WARN", "value": 1, "desc": "warn"},
                        {"entry": "ERR", "value": 2, "desc": "err"}
                    ]}
                ],
                "types": [
                    {"name": "Point", "desc": "d", "fields": [
                        {"name": "x", "type": "int16", "desc": "x"},
                        {"name": "y", "type": "int16", "desc": "y"}
                    ]}
                ],
                "bitfields": [
                    {"name": "Status", "desc": "d", "bits": [
                        {"name": "ok", "position": 0, "desc": "ok"},
                        {"name": "code", "position": 1, "enum": "Code", "desc": "code"}
                    ]}
                ],
                "messages": [
                    {"name": "Hello", "desc": "d", "id": 1, "fields": [
                        {"name": "a", "type": "uint8", "desc": "a", "enum": "Color"}
                    ]},
                    {"name": "Arr", "desc": "d", "id": 2, "fields": [
                        {"name": "xs", "type": "uint16[]", "desc": "xs"}
                    ]},
                    {"name": "Stat", "desc": "d", "id": 3, "fields": [
                        {"name": "s", "type": "Status", "desc": "s"}
                    ]},
                    {"name": "Shape", "desc": "d", "id": 4, "fields": [
                        {"name": "kind", "type": "uint8", "desc": "k"},
                        {"name": "points", "type": "Point[2]", "desc": "ps"},
                        {"name": "extra", "type": "int32[]", "desc": "extra"}
                    ]}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn enum_scalar_round_trip() {
        let schema = schema();
        let def = schema.def("Hello").unwrap();
        let mut builder = MessageBuilder::new(&schema, def);
        builder.set_enum("a", "GREEN").unwrap();
        let msg = builder.finish().unwrap();

        let bytes = encode(&schema, &msg).unwrap();
        assert_eq!(bytes, vec![0x02]);
        let back = decode(&schema, def, &bytes).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn variable_u16_array_layout() {
        let schema = schema();
        let def = schema.def("Arr").unwrap();
        let mut builder = MessageBuilder::new(&schema, def);
        builder.set_scalar_array("xs", &[0x0001, 0x0203]).unwrap();
        let msg = builder.finish().unwrap();

        let bytes = encode(&schema, &msg).unwrap();
        assert_eq!(bytes, vec![0x01, 0x00, 0x03, 0x02]);
        let back = decode(&schema, def, &bytes).unwrap();
        assert_eq!(back, msg);
        assert_eq!(encode(&schema, &back).unwrap(), bytes);
    }

    #[test]
    fn bitfield_packing() {
        let schema = schema();
        let def = schema.def("Stat").unwrap();
        let mut builder = MessageBuilder::new(&schema, def);
        builder.set_bit("s", "ok", 1).unwrap();
        builder.set_bit_enum("s", "code", "ERR").unwrap();
        let msg = builder.finish().unwrap();

        let bytes = encode(&schema, &msg).unwrap();
        // ok at bit 0, code=2 at bits 2:1 -> 0b0000_0101
        assert_eq!(bytes, vec![0x05]);
        assert_eq!(decode(&schema, def, &bytes).unwrap(), msg);
    }

    #[test]
    fn nested_compound_round_trip() {
        let schema = schema();
        let def = schema.def("Shape").unwrap();
        let point_def = schema.def("Point").unwrap();

        let mut p1 = MessageBuilder::new(&schema, point_def);
        p1.set_scalar("x", -1).unwrap();
        p1.set_scalar("y", 2).unwrap();
        let mut p2 = MessageBuilder::new(&schema, point_def);
        p2.set_scalar("x", 300).unwrap();
        p2.set_scalar("y", -300).unwrap();

        let mut builder = MessageBuilder::new(&schema, def);
        builder.set_scalar("kind", 7).unwrap();
        builder
            .set_compound_array("points", vec![p1.finish().unwrap(), p2.finish().unwrap()])
            .unwrap();
        builder.set_scalar_array("extra", &[-5]).unwrap();
        let msg = builder.finish().unwrap();

        let bytes = encode(&schema, &msg).unwrap();
        // 1 + 2*4 + 1*4 bytes
        assert_eq!(bytes.len(), 13);
        let back = decode(&schema, def, &bytes).unwrap();
        assert_eq!(back, msg);
        assert_eq!(encode(&schema, &back).unwrap(), bytes);
    }

    #[test]
    fn decode_rejects_unknown_enum_value() {
        let schema = schema();
        let def = schema.def("Hello").unwrap();
        assert!(matches!(
            decode(&schema, def, &[0x07]),
            Err(CodecError::UnknownEnumValue { value: 7, .. })
        ));
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let schema = schema();
        let def = schema.def("Shape").unwrap();
        assert!(matches!(
            decode(&schema, def, &[0x01, 0x02]),
            Err(CodecError::ShortBuffer { .. })
        ));
    }

    #[test]
    fn decode_rejects_excess_buffer() {
        let schema = schema();
        let def = schema.def("Hello").unwrap();
        assert!(matches!(
            decode(&schema, def, &[0x01, 0x00]),
            Err(CodecError::ExcessBuffer { remaining: 1 })
        ));
    }

    #[test]
    fn decode_rejects_ragged_variable_tail() {
        let schema = schema();
        let def = schema.def("Arr").unwrap();
        // 3 bytes is not a multiple of the u16 stride
        assert!(matches!(
            decode(&schema, def, &[0x01, 0x00, 0x03]),
            Err(CodecError::ExcessBuffer { remaining: 1 })
        ));
    }

    #[test]
    fn encode_rejects_out_of_domain_scalar() {
        let schema = schema();
        // Hand-crafted value that bypasses the builder's validation.
        let bad = MessageValue {
            name: "Hello".into(),
            fields: vec![("a".into(), FieldValue::Scalar(700))],
        };
        assert!(matches!(
            encode(&schema, &bad),
            Err(CodecError::UnknownEnumValue { .. })
        ));
    }

    #[test]
    fn empty_variable_tail_is_valid() {
        let schema = schema();
        let def = schema.def("Arr").unwrap();
        let msg = decode(&schema, def, &[]).unwrap();
        assert_eq!(msg.get("xs"), Some(&FieldValue::Array(Vec::new())));
        assert_eq!(encode(&schema, &msg).unwrap(), Vec::<u8>::new());
    }
}
