//! Runtime message values and validated construction.
//!
//! A decoded or hand-built message is a [`MessageValue`]: the message name
//! plus its field values in declaration order. Field values are a closed
//! set of tagged variants; there is no runtime reflection. Construction
//! goes through [`MessageBuilder`], which validates ranges, enum
//! membership and array arity against the schema.

use crate::error::{CodecError, CodecResult};
use crate::layout::Domain;
use crate::schema::{BaseType, BitfieldDef, CountMode, FieldDef, MessageDef, Schema};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use smartstring::{LazyCompact, SmartString};
use std::fmt;

type MsgString = SmartString<LazyCompact>;

/// Value of one field of a runtime message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Primitive integer (enum-annotated fields store the raw value)
    Scalar(i64),
    /// Fixed or variable array of scalars or compounds
    Array(Vec<FieldValue>),
    /// Bitfield with per-bit values
    Bits(BitsValue),
    /// Nested compound value
    Compound(MessageValue),
}

impl FieldValue {
    /// Variant name used in type mismatch diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Array(_) => "array",
            Self::Bits(_) => "bitfield",
            Self::Compound(_) => "compound",
        }
    }

    /// The scalar payload, if this is a scalar.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<i64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

/// Per-bit values of one bitfield field, in bit declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitsValue {
    /// Name of the bitfield definition
    pub bitfield: MsgString,
    /// `(bit name, raw value)` pairs in declaration order
    pub values: SmallVec<[(MsgString, u32); 8]>,
}

impl BitsValue {
    /// All-zero value for a bitfield, bits in declaration order.
    #[must_use]
    pub fn zeroed(def: &BitfieldDef) -> Self {
        Self {
            bitfield: def.name.clone(),
            values: def.bits.iter().map(|b| (b.name.clone(), 0)).collect(),
        }
    }

    /// Raw value of one bit by name.
    #[must_use]
    pub fn get(&self, bit: &str) -> Option<u32> {
        self.values
            .iter()
            .find(|(name, _)| name == bit)
            .map(|&(_, v)| v)
    }

    fn set(&mut self, bit: &str, value: u32) -> bool {
        for (name, slot) in &mut self.values {
            if name == bit {
                *slot = value;
                return true;
            }
        }
        false
    }
}

/// A runtime message or compound value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageValue {
    /// Name of the message or compound definition
    pub name: MsgString,
    /// `(field name, value)` pairs in declaration order
    pub fields: Vec<(MsgString, FieldValue)>,
}

impl MessageValue {
    /// Looks a field value up by name.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    /// Scalar value of a field, if it is a scalar.
    #[must_use]
    pub fn scalar(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_scalar)
    }

    /// Encoded size in bytes: the fixed prefix plus the actual length of
    /// the variable tail, if any.
    pub fn len_bytes(&self, schema: &Schema) -> CodecResult<usize> {
        let def = schema
            .def(&self.name)
            .ok_or_else(|| CodecError::UnknownMessage {
                name: self.name.clone(),
            })?;
        let layout = schema.layout(def);
        let mut len = layout.fixed_size;
        if let Some(stride) = layout.variable_stride {
            let tail = def.fields.last().map(|f| f.name.as_str()).unwrap_or("");
            if let Some(FieldValue::Array(items)) = self.get(tail) {
                len += stride * items.len();
            }
        }
        Ok(len)
    }
}

impl fmt::Display for MessageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for (name, value) in &self.fields {
            match value {
                FieldValue::Scalar(v) => writeln!(f, "  {name}: {v}")?,
                FieldValue::Array(items) => {
                    write!(f, "  {name}: [")?;
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        match item {
                            FieldValue::Scalar(v) => write!(f, "{v}")?,
                            other => write!(f, "<{}>", other.kind_name())?,
                        }
                    }
                    writeln!(f, "]")?;
                }
                FieldValue::Bits(bits) => {
                    write!(f, "  {name}:")?;
                    for (bit, v) in &bits.values {
                        write!(f, " {bit}={v}")?;
                    }
                    writeln!(f)?;
                }
                FieldValue::Compound(inner) => {
                    write!(f, "  {name}: {}", inner.name)?;
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}

/// Packs per-bit values into the bitfield's backing word.
pub fn pack_bits(schema: &Schema, def: &BitfieldDef, bits: &BitsValue) -> CodecResult<u64> {
    let mut word: u64 = 0;
    for bit in &def.bits {
        let value = bits
            .get(&bit.name)
            .ok_or_else(|| CodecError::UnknownBit {
                bitfield: def.name.clone(),
                bit: bit.name.clone(),
            })?;
        if u64::from(value) > bit.max_value() {
            return Err(CodecError::OutOfRange {
                field: bit.name.clone(),
                value: i64::from(value),
                min: 0,
                max: bit.max_value() as i64,
            });
        }
        if let Some(handle) = bit.enum_ref {
            let enum_def = schema.enum_at(handle);
            if enum_def.entry_by_value(i64::from(value)).is_none() {
                return Err(CodecError::UnknownEnumValue {
                    field: bit.name.clone(),
                    enum_name: enum_def.name.clone(),
                    value: i64::from(value),
                });
            }
        }
        word |= u64::from(value) << bit.position;
    }
    Ok(word)
}

/// Unpacks a backing word into per-bit values, validating attached enums.
pub fn unpack_bits(schema: &Schema, def: &BitfieldDef, word: u64) -> CodecResult<BitsValue> {
    let mut bits = BitsValue {
        bitfield: def.name.clone(),
        values: SmallVec::new(),
    };
    for bit in &def.bits {
        let value = ((word >> bit.position) & bit.max_value()) as u32;
        if let Some(handle) = bit.enum_ref {
            let enum_def = schema.enum_at(handle);
            if enum_def.entry_by_value(i64::from(value)).is_none() {
                return Err(CodecError::UnknownEnumValue {
                    field: bit.name.clone(),
                    enum_name: enum_def.name.clone(),
                    value: i64::from(value),
                });
            }
        }
        bits.values.push((bit.name.clone(), value));
    }
    Ok(bits)
}

/// Checks a scalar against the field's value domain.
pub(crate) fn validate_scalar(
    schema: &Schema,
    field: &FieldDef,
    value: i64,
) -> CodecResult<()> {
    match schema.scalar_domain(field) {
        Some(Domain::Enum(enum_def)) => {
            if enum_def.entry_by_value(value).is_none() {
                return Err(CodecError::UnknownEnumValue {
                    field: field.name.clone(),
                    enum_name: enum_def.name.clone(),
                    value,
                });
            }
            Ok(())
        }
        Some(Domain::Range { min, max }) => {
            if !(min..=max).contains(&value) {
                return Err(CodecError::OutOfRange {
                    field: field.name.clone(),
                    value,
                    min,
                    max,
                });
            }
            Ok(())
        }
        None => Err(CodecError::TypeMismatch {
            field: field.name.clone(),
            expected: "bitfield or compound",
            got: "scalar",
        }),
    }
}

/// Builds a [`MessageValue`] against a schema, validating as it goes.
pub struct MessageBuilder<'s> {
    schema: &'s Schema,
    def: &'s MessageDef,
    values: FxHashMap<MsgString, FieldValue>,
}

impl<'s> MessageBuilder<'s> {
    /// Starts building an instance of `def`.
    #[must_use]
    pub fn new(schema: &'s Schema, def: &'s MessageDef) -> Self {
        Self {
            schema,
            def,
            values: FxHashMap::default(),
        }
    }

    fn field(&self, name: &str) -> CodecResult<&'s FieldDef> {
        self.def
            .field(name)
            .ok_or_else(|| CodecError::UnknownField {
                message: self.def.name.clone(),
                field: name.into(),
            })
    }

    /// Sets a scalar primitive field.
    pub fn set_scalar(&mut self, name: &str, value: i64) -> CodecResult<&mut Self> {
        let field = self.field(name)?;
        if field.count != CountMode::One {
            return Err(CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: "array",
                got: "scalar",
            });
        }
        validate_scalar(self.schema, field, value)?;
        self.values
            .insert(field.name.clone(), FieldValue::Scalar(value));
        Ok(self)
    }

    /// Sets an enum-annotated field by entry name.
    pub fn set_enum(&mut self, name: &str, entry: &str) -> CodecResult<&mut Self> {
        let field = self.field(name)?;
        let Some(handle) = field.enum_ref else {
            return Err(CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: "plain scalar",
                got: "enum entry",
            });
        };
        let enum_def = self.schema.enum_at(handle);
        let value = enum_def
            .entry_by_name(entry)
            .ok_or_else(|| CodecError::BadArgument {
                field: field.name.clone(),
                detail: format!("`{entry}` is not an entry of enum `{}`", enum_def.name).into(),
            })?
            .value;
        self.values
            .insert(field.name.clone(), FieldValue::Scalar(value));
        Ok(self)
    }

    /// Sets a primitive array field from scalar values.
    pub fn set_scalar_array(&mut self, name: &str, values: &[i64]) -> CodecResult<&mut Self> {
        let field = self.field(name)?;
        match field.count {
            CountMode::One => {
                return Err(CodecError::TypeMismatch {
                    field: field.name.clone(),
                    expected: "scalar",
                    got: "array",
                });
            }
            CountMode::Fixed(n) if n != values.len() => {
                return Err(CodecError::ArityMismatch {
                    field: field.name.clone(),
                    expected: n,
                    got: values.len(),
                });
            }
            _ => {}
        }
        let BaseType::Prim(_) = field.base else {
            return Err(CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: "compound array",
                got: "scalar array",
            });
        };
        for &value in values {
            validate_scalar(self.schema, field, value)?;
        }
        self.values.insert(
            field.name.clone(),
            FieldValue::Array(values.iter().map(|&v| FieldValue::Scalar(v)).collect()),
        );
        Ok(self)
    }

    /// Sets one bit of a bitfield field; unset bits stay zero.
    pub fn set_bit(&mut self, name: &str, bit: &str, value: u32) -> CodecResult<&mut Self> {
        let field = self.field(name)?;
        let BaseType::Bitfield(handle) = field.base else {
            return Err(CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: "non-bitfield",
                got: "bit assignment",
            });
        };
        let bf = self.schema.bitfield_at(handle);
        let bit_def = bf.bit(bit).ok_or_else(|| CodecError::UnknownBit {
            bitfield: bf.name.clone(),
            bit: bit.into(),
        })?;
        if u64::from(value) > bit_def.max_value() {
            return Err(CodecError::OutOfRange {
                field: bit_def.name.clone(),
                value: i64::from(value),
                min: 0,
                max: bit_def.max_value() as i64,
            });
        }
        if let Some(enum_handle) = bit_def.enum_ref {
            let enum_def = self.schema.enum_at(enum_handle);
            if enum_def.entry_by_value(i64::from(value)).is_none() {
                return Err(CodecError::UnknownEnumValue {
                    field: bit_def.name.clone(),
                    enum_name: enum_def.name.clone(),
                    value: i64::from(value),
                });
            }
        }
        let entry = self
            .values
            .entry(field.name.clone())
            .or_insert_with(|| FieldValue::Bits(BitsValue::zeroed(bf)));
        if let FieldValue::Bits(bits) = entry {
            bits.set(bit, value);
        }
        Ok(self)
    }

    /// Sets one bit of a bitfield field by attached enum entry name.
    pub fn set_bit_enum(&mut self, name: &str, bit: &str, entry: &str) -> CodecResult<&mut Self> {
        let field = self.field(name)?;
        let BaseType::Bitfield(handle) = field.base else {
            return Err(CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: "non-bitfield",
                got: "bit assignment",
            });
        };
        let bf = self.schema.bitfield_at(handle);
        let bit_def = bf.bit(bit).ok_or_else(|| CodecError::UnknownBit {
            bitfield: bf.name.clone(),
            bit: bit.into(),
        })?;
        let Some(enum_handle) = bit_def.enum_ref else {
            return Err(CodecError::BadArgument {
                field: bit_def.name.clone(),
                detail: "bit has no attached enum".into(),
            });
        };
        let enum_def = self.schema.enum_at(enum_handle);
        let value = enum_def
            .entry_by_name(entry)
            .ok_or_else(|| CodecError::BadArgument {
                field: bit_def.name.clone(),
                detail: format!("`{entry}` is not an entry of enum `{}`", enum_def.name).into(),
            })?
            .value;
        self.set_bit(name, bit, value as u32)
    }

    /// Sets a compound field from an already built value.
    pub fn set_compound(&mut self, name: &str, value: MessageValue) -> CodecResult<&mut Self> {
        let field = self.field(name)?;
        let BaseType::Compound(handle) = field.base else {
            return Err(CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: "non-compound",
                got: "compound",
            });
        };
        if field.count != CountMode::One {
            return Err(CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: "compound array",
                got: "compound",
            });
        }
        let expected = &self.schema.def_at(handle).name;
        if &value.name != expected {
            return Err(CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: "matching compound type",
                got: "different compound type",
            });
        }
        self.values
            .insert(field.name.clone(), FieldValue::Compound(value));
        Ok(self)
    }

    /// Sets a compound array field from already built values.
    pub fn set_compound_array(
        &mut self,
        name: &str,
        values: Vec<MessageValue>,
    ) -> CodecResult<&mut Self> {
        let field = self.field(name)?;
        let BaseType::Compound(handle) = field.base else {
            return Err(CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: "non-compound",
                got: "compound array",
            });
        };
        if let CountMode::Fixed(n) = field.count {
            if n != values.len() {
                return Err(CodecError::ArityMismatch {
                    field: field.name.clone(),
                    expected: n,
                    got: values.len(),
                });
            }
        }
        if field.count == CountMode::One {
            return Err(CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: "compound",
                got: "compound array",
            });
        }
        let expected = &self.schema.def_at(handle).name;
        if values.iter().any(|v| &v.name != expected) {
            return Err(CodecError::TypeMismatch {
                field: field.name.clone(),
                expected: "matching compound type",
                got: "different compound type",
            });
        }
        self.values.insert(
            field.name.clone(),
            FieldValue::Array(values.into_iter().map(FieldValue::Compound).collect()),
        );
        Ok(self)
    }

    /// Finishes construction. Every field must have been assigned, except
    /// bitfields (unset bits are zero) and variable arrays (default
    /// empty); bit defaults are re-validated against attached enums.
    pub fn finish(mut self) -> CodecResult<MessageValue> {
        let mut fields = Vec::with_capacity(self.def.fields.len());
        for field in &self.def.fields {
            let value = match self.values.remove(field.name.as_str()) {
                Some(value) => value,
                None => match (field.base, field.count) {
                    (BaseType::Bitfield(handle), CountMode::One) => {
                        let bf = self.schema.bitfield_at(handle);
                        let zeroed = BitsValue::zeroed(bf);
                        pack_bits(self.schema, bf, &zeroed)?;
                        FieldValue::Bits(zeroed)
                    }
                    (_, CountMode::Variable) => FieldValue::Array(Vec::new()),
                    _ => {
                        return Err(CodecError::MissingField {
                            message: self.def.name.clone(),
                            field: field.name.clone(),
                        });
                    }
                },
            };
            fields.push((field.name.clone(), value));
        }
        Ok(MessageValue {
            name: self.def.name.clone(),
            fields,
        })
    }
}
