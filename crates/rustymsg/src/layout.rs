//! Field typing and wire layout resolution.
//!
//! Everything here is derived from the validated [`Schema`]: element wire
//! formats, element sizes, fixed prefixes and variable strides. The codec
//! and the light transport both consult these answers; they never reparse
//! type strings.

use crate::schema::{BaseType, CountMode, EnumDef, FieldDef, MessageDef, Schema};

/// Wire-level shape of one element of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementLayout {
    /// Little-endian format code (`u8`, `i16`, ...) or `bytes` for a
    /// nested compound.
    pub format: &'static str,
    /// Size of one element in bytes.
    pub size: usize,
}

/// Value domain of a scalar field.
#[derive(Debug, Clone, Copy)]
pub enum Domain<'s> {
    /// Full primitive range
    Range {
        /// Lower bound, inclusive
        min: i64,
        /// Upper bound, inclusive
        max: i64,
    },
    /// Exact enum value set
    Enum(&'s EnumDef),
}

impl Domain<'_> {
    /// Whether `value` is a member of the domain.
    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        match self {
            Self::Range { min, max } => (*min..=*max).contains(&value),
            Self::Enum(def) => def.entry_by_value(value).is_some(),
        }
    }
}

/// Static layout summary of a message or compound type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLayout {
    /// Byte size of all fixed-count fields
    pub fixed_size: usize,
    /// Element stride of the trailing variable field, if any
    pub variable_stride: Option<usize>,
}

impl MessageLayout {
    /// Whether an encoded buffer of `len` bytes can satisfy this layout.
    #[must_use]
    pub fn matches_len(&self, len: usize) -> bool {
        match self.variable_stride {
            None => len == self.fixed_size,
            Some(stride) => {
                len >= self.fixed_size && (len - self.fixed_size) % stride == 0
            }
        }
    }
}

impl Schema {
    /// Byte size of one element of the given base type. Compound sizes
    /// are static by construction (variable tails never nest).
    #[must_use]
    pub fn element_size(&self, base: BaseType) -> usize {
        match base {
            BaseType::Prim(prim) => prim.size_bytes(),
            BaseType::Bitfield(handle) => self.bitfield_at(handle).storage().size_bytes(),
            BaseType::Compound(handle) => self.layout(self.def_at(handle)).fixed_size,
        }
    }

    /// Wire format and size of one element of a field.
    #[must_use]
    pub fn element_layout(&self, field: &FieldDef) -> ElementLayout {
        let format = match field.base {
            BaseType::Prim(prim) => prim.wire_code(),
            BaseType::Bitfield(handle) => self.bitfield_at(handle).storage().wire_code(),
            BaseType::Compound(_) => "bytes",
        };
        ElementLayout {
            format,
            size: self.element_size(field.base),
        }
    }

    /// Fixed prefix size and variable stride of a definition.
    #[must_use]
    pub fn layout(&self, def: &MessageDef) -> MessageLayout {
        let mut fixed_size = 0;
        let mut variable_stride = None;
        for field in &def.fields {
            let element = self.element_size(field.base);
            match field.count {
                CountMode::One => fixed_size += element,
                CountMode::Fixed(n) => fixed_size += element * n,
                CountMode::Variable => variable_stride = Some(element),
            }
        }
        MessageLayout {
            fixed_size,
            variable_stride,
        }
    }

    /// Value domain of a scalar primitive field; `None` for bitfields and
    /// compounds, which are not scalars.
    #[must_use]
    pub fn scalar_domain(&self, field: &FieldDef) -> Option<Domain<'_>> {
        match (field.enum_ref, field.base) {
            (Some(handle), _) => Some(Domain::Enum(self.enum_at(handle))),
            (None, BaseType::Prim(prim)) => Some(Domain::Range {
                min: prim.min(),
                max: prim.max(),
            }),
            _ => None,
        }
    }

    /// Compact human-readable format string of a definition, nested
    /// compounds in parentheses, e.g. `u8 (u8 i16) u16[]`.
    #[must_use]
    pub fn format_string(&self, def: &MessageDef) -> String {
        let mut parts = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let element = match field.base {
                BaseType::Prim(prim) => prim.wire_code().to_owned(),
                BaseType::Bitfield(handle) => self
                    .bitfield_at(handle)
                    .storage()
                    .wire_code()
                    .to_owned(),
                BaseType::Compound(handle) => {
                    format!("({})", self.format_string(self.def_at(handle)))
                }
            };
            let part = match field.count {
                CountMode::One => element,
                CountMode::Fixed(n) => format!("{element}[{n}]"),
                CountMode::Variable => format!("{element}[]"),
            };
            parts.push(part);
        }
        parts.join(" ")
    }
}
