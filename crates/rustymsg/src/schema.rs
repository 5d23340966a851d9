//! In-memory schema model: enums, bitfields, compound types and messages.
//!
//! A [`Schema`] is built eagerly from a definition tree (the file parsing
//! itself is left to `serde_json`). Loading resolves every cross-reference
//! and validates the whole model; a schema either loads cleanly or not at
//! all. Definitions are processed enums first, then compound types, then
//! bitfields, then messages, so a name must be defined before it is used.
//! Fields hold opaque index handles into the schema's arenas rather than
//! owning copies of their referents.

use crate::error::{SchemaError, SchemaResult};
use rustc_hash::FxHashMap;
use serde_json::Value;
use smallvec::SmallVec;
use smartstring::{LazyCompact, SmartString};
use std::fmt::Write as _;

type MsgString = SmartString<LazyCompact>;

/// Primitive wire types, little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prim {
    /// Unsigned 8-bit integer
    U8,
    /// Signed 8-bit integer
    I8,
    /// Unsigned 16-bit integer
    U16,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 32-bit integer
    I32,
}

impl Prim {
    /// Resolves a declared base type name to a primitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "uint8" => Some(Self::U8),
            "int8" => Some(Self::I8),
            "uint16" => Some(Self::U16),
            "int16" => Some(Self::I16),
            "uint32" => Some(Self::U32),
            "int32" => Some(Self::I32),
            _ => None,
        }
    }

    /// Schema-level name of the primitive.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::I8 => "int8",
            Self::U16 => "uint16",
            Self::I16 => "int16",
            Self::U32 => "uint32",
            Self::I32 => "int32",
        }
    }

    /// Little-endian wire format code.
    #[must_use]
    pub const fn wire_code(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
        }
    }

    /// C type name used by the header emitter.
    #[must_use]
    pub const fn c_type(self) -> &'static str {
        match self {
            Self::U8 => "uint8_t",
            Self::I8 => "int8_t",
            Self::U16 => "uint16_t",
            Self::I16 => "int16_t",
            Self::U32 => "uint32_t",
            Self::I32 => "int32_t",
        }
    }

    /// Byte width on the wire.
    #[must_use]
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 => 4,
        }
    }

    /// Whether the primitive is signed.
    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32)
    }

    /// Lower bound of the value domain.
    #[must_use]
    pub const fn min(self) -> i64 {
        match self {
            Self::U8 | Self::U16 | Self::U32 => 0,
            Self::I8 => i8::MIN as i64,
            Self::I16 => i16::MIN as i64,
            Self::I32 => i32::MIN as i64,
        }
    }

    /// Upper bound of the value domain.
    #[must_use]
    pub const fn max(self) -> i64 {
        match self {
            Self::U8 => u8::MAX as i64,
            Self::I8 => i8::MAX as i64,
            Self::U16 => u16::MAX as i64,
            Self::I16 => i16::MAX as i64,
            Self::U32 => u32::MAX as i64,
            Self::I32 => i32::MAX as i64,
        }
    }

    /// Smallest unsigned primitive whose width covers `highest_bit`
    /// (a zero-based bit index below 32).
    #[must_use]
    pub const fn fitting_unsigned(highest_bit: u32) -> Self {
        if highest_bit < 8 {
            Self::U8
        } else if highest_bit < 16 {
            Self::U16
        } else {
            Self::U32
        }
    }
}

/// Opaque handle to an enum in the schema arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumHandle(pub(crate) usize);

/// Opaque handle to a bitfield in the schema arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitfieldHandle(pub(crate) usize);

/// Opaque handle to a message or compound type in the schema arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefHandle(pub(crate) usize);

/// One named value of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumEntry {
    /// Entry name, unique within the enum
    pub name: MsgString,
    /// Entry value, unique within the enum
    pub value: i64,
    /// Human description
    pub desc: MsgString,
}

/// A named enumeration.
#[derive(Debug, Clone)]
pub struct EnumDef {
    /// Enum name, unique within the schema
    pub name: MsgString,
    /// Human description
    pub desc: MsgString,
    /// Entries in declaration order
    pub entries: SmallVec<[EnumEntry; 8]>,
    bit_width: u32,
    max_value: i64,
}

impl EnumDef {
    /// Number of bits needed to hold any entry value,
    /// `ceil(log2(max_value + 1))`, at least 1.
    #[must_use]
    pub const fn bit_width(&self) -> u32 {
        self.bit_width
    }

    /// Largest entry value.
    #[must_use]
    pub const fn max_value(&self) -> i64 {
        self.max_value
    }

    /// Looks an entry up by name.
    pub fn entry_by_name(&self, name: &str) -> Option<&EnumEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Looks an entry up by value.
    pub fn entry_by_value(&self, value: i64) -> Option<&EnumEntry> {
        self.entries.iter().find(|e| e.value == value)
    }
}

/// One bit (or bit run) inside a bitfield.
#[derive(Debug, Clone)]
pub struct Bit {
    /// Bit name, unique within the bitfield
    pub name: MsgString,
    /// LSB index of the run
    pub position: u32,
    /// Width in bits, at least 1; overridden by the attached enum's width
    pub width: u32,
    /// Human description
    pub desc: MsgString,
    /// Attached enum constraining the run's values
    pub enum_ref: Option<EnumHandle>,
}

impl Bit {
    /// Occupancy mask of the run within the backing word.
    #[must_use]
    pub const fn mask(&self) -> u64 {
        ((1u64 << self.width) - 1) << self.position
    }

    /// Largest raw value the run can hold.
    #[must_use]
    pub const fn max_value(&self) -> u64 {
        (1u64 << self.width) - 1
    }
}

/// A word-sized container of non-overlapping bits.
#[derive(Debug, Clone)]
pub struct BitfieldDef {
    /// Bitfield name, unique within the schema
    pub name: MsgString,
    /// Human description
    pub desc: MsgString,
    /// Bits in declaration order
    pub bits: SmallVec<[Bit; 8]>,
    storage: Prim,
}

impl BitfieldDef {
    /// The unsigned primitive backing this bitfield on the wire.
    #[must_use]
    pub const fn storage(&self) -> Prim {
        self.storage
    }

    /// Looks a bit up by name.
    pub fn bit(&self, name: &str) -> Option<&Bit> {
        self.bits.iter().find(|b| b.name == name)
    }

    /// Bits ordered MSB-first, the display convention for bitfields.
    pub fn bits_msb_first(&self) -> SmallVec<[&Bit; 8]> {
        let mut bits: SmallVec<[&Bit; 8]> = self.bits.iter().collect();
        bits.sort_by(|a, b| b.position.cmp(&a.position));
        bits
    }
}

/// Resolved base type of a field, after stripping any array suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    /// Primitive integer
    Prim(Prim),
    /// Bitfield (never arrayed)
    Bitfield(BitfieldHandle),
    /// Compound type or message
    Compound(DefHandle),
}

/// How many elements a field carries on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    /// A single element
    One,
    /// A fixed-size array
    Fixed(usize),
    /// A trailing variable-size array; element count comes from the buffer
    Variable,
}

/// One field of a message or compound type.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Field name, unique within the owner
    pub name: MsgString,
    /// Human description
    pub desc: MsgString,
    /// The declared type string, e.g. `uint16[4]`
    pub type_spec: MsgString,
    /// Resolved base type
    pub base: BaseType,
    /// Element count mode
    pub count: CountMode,
    /// Attached enum constraining scalar values
    pub enum_ref: Option<EnumHandle>,
}

impl FieldDef {
    /// Whether the field is a trailing variable-size array.
    #[must_use]
    pub const fn is_variable(&self) -> bool {
        matches!(self.count, CountMode::Variable)
    }
}

/// A message (with an identifier) or compound type (without).
///
/// Presence of `id` is the discriminator: only identifier-bearing
/// definitions can travel on the wire by themselves.
#[derive(Debug, Clone)]
pub struct MessageDef {
    /// Definition name, unique within the schema
    pub name: MsgString,
    /// Human description
    pub desc: MsgString,
    /// Message identifier; `None` marks a compound type
    pub id: Option<u32>,
    /// Fields in declaration order
    pub fields: SmallVec<[FieldDef; 8]>,
}

impl MessageDef {
    /// Whether this definition can travel on the wire by itself.
    #[must_use]
    pub const fn is_message(&self) -> bool {
        self.id.is_some()
    }

    /// Looks a field up by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether the trailing field is variable-size.
    #[must_use]
    pub fn has_variable_field(&self) -> bool {
        self.fields.last().is_some_and(FieldDef::is_variable)
    }
}

/// A fully resolved and validated schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    enums: Vec<EnumDef>,
    bitfields: Vec<BitfieldDef>,
    defs: Vec<MessageDef>,
    enum_index: FxHashMap<MsgString, usize>,
    bitfield_index: FxHashMap<MsgString, usize>,
    def_index: FxHashMap<MsgString, usize>,
    id_index: FxHashMap<u32, usize>,
}

impl Schema {
    /// Builds a schema from JSON text. The heavy lifting of parsing is
    /// done by `serde_json`; this only walks the resulting tree.
    pub fn from_json_str(text: &str) -> SchemaResult<Self> {
        let root: Value = serde_json::from_str(text).map_err(|e| SchemaError::InvalidValue {
            context: "schema document".into(),
            key: "json",
            detail: e.to_string().into(),
        })?;
        Self::from_value(&root)
    }

    /// Builds a schema from an already parsed definition tree.
    ///
    /// Top-level keys `enums`, `bitfields`, `types` and `messages` are all
    /// optional. Processing order is enums, compound types, bitfields,
    /// messages; references only resolve to already processed definitions.
    pub fn from_value(root: &Value) -> SchemaResult<Self> {
        let root_map = obj(root, "schema root")?;
        let mut schema = Self::default();

        if let Some(v) = root_map.get("enums") {
            for entry in arr(v, "enums")? {
                let def = parse_enum(entry)?;
                schema.add_enum(def)?;
            }
        }
        if let Some(v) = root_map.get("types") {
            for entry in arr(v, "types")? {
                let def = parse_def(&schema, entry, "types")?;
                schema.add_def(def)?;
            }
        }
        if let Some(v) = root_map.get("bitfields") {
            for entry in arr(v, "bitfields")? {
                let def = parse_bitfield(&schema, entry)?;
                schema.add_bitfield(def)?;
            }
        }
        if let Some(v) = root_map.get("messages") {
            for entry in arr(v, "messages")? {
                let def = parse_def(&schema, entry, "messages")?;
                schema.add_def(def)?;
            }
        }
        Ok(schema)
    }

    fn add_enum(&mut self, def: EnumDef) -> SchemaResult<()> {
        if self.enum_index.contains_key(def.name.as_str()) {
            return Err(SchemaError::DuplicateName {
                kind: "enum",
                name: def.name,
                owner: "schema".into(),
            });
        }
        self.enum_index.insert(def.name.clone(), self.enums.len());
        self.enums.push(def);
        Ok(())
    }

    fn add_bitfield(&mut self, def: BitfieldDef) -> SchemaResult<()> {
        if self.bitfield_index.contains_key(def.name.as_str()) {
            return Err(SchemaError::DuplicateName {
                kind: "bitfield",
                name: def.name,
                owner: "schema".into(),
            });
        }
        self.bitfield_index
            .insert(def.name.clone(), self.bitfields.len());
        self.bitfields.push(def);
        Ok(())
    }

    fn add_def(&mut self, def: MessageDef) -> SchemaResult<()> {
        if self.def_index.contains_key(def.name.as_str()) {
            return Err(SchemaError::DuplicateName {
                kind: "message",
                name: def.name,
                owner: "schema".into(),
            });
        }
        if let Some(id) = def.id {
            if let Some(&prev) = self.id_index.get(&id) {
                return Err(SchemaError::DuplicateId {
                    id,
                    previous: self.defs[prev].name.clone(),
                    name: def.name,
                });
            }
            self.id_index.insert(id, self.defs.len());
        }
        self.def_index.insert(def.name.clone(), self.defs.len());
        self.defs.push(def);
        Ok(())
    }

    /// Resolves an enum handle.
    #[must_use]
    pub fn enum_at(&self, handle: EnumHandle) -> &EnumDef {
        &self.enums[handle.0]
    }

    /// Resolves a bitfield handle.
    #[must_use]
    pub fn bitfield_at(&self, handle: BitfieldHandle) -> &BitfieldDef {
        &self.bitfields[handle.0]
    }

    /// Resolves a definition handle.
    #[must_use]
    pub fn def_at(&self, handle: DefHandle) -> &MessageDef {
        &self.defs[handle.0]
    }

    /// Looks an enum up by name.
    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enum_index.get(name).map(|&i| &self.enums[i])
    }

    /// Looks a bitfield up by name.
    pub fn bitfield(&self, name: &str) -> Option<&BitfieldDef> {
        self.bitfield_index.get(name).map(|&i| &self.bitfields[i])
    }

    /// Looks a message or compound type up by name.
    pub fn def(&self, name: &str) -> Option<&MessageDef> {
        self.def_index.get(name).map(|&i| &self.defs[i])
    }

    /// Looks a definition handle up by name.
    pub fn def_handle(&self, name: &str) -> Option<DefHandle> {
        self.def_index.get(name).map(|&i| DefHandle(i))
    }

    /// Looks an identifier-bearing message up by id.
    pub fn message_by_id(&self, id: u32) -> Option<&MessageDef> {
        self.id_index.get(&id).map(|&i| &self.defs[i])
    }

    /// All enums in declaration order.
    pub fn enums(&self) -> impl Iterator<Item = &EnumDef> {
        self.enums.iter()
    }

    /// All bitfields in declaration order.
    pub fn bitfields(&self) -> impl Iterator<Item = &BitfieldDef> {
        self.bitfields.iter()
    }

    /// All messages and compound types in declaration order.
    pub fn defs(&self) -> impl Iterator<Item = &MessageDef> {
        self.defs.iter()
    }

    /// Identifier-bearing messages in declaration order.
    pub fn messages(&self) -> impl Iterator<Item = &MessageDef> {
        self.defs.iter().filter(|d| d.is_message())
    }

    /// Compound types in declaration order.
    pub fn compounds(&self) -> impl Iterator<Item = &MessageDef> {
        self.defs.iter().filter(|d| !d.is_message())
    }

    /// Human-readable description of a message's fields, used by the
    /// `--print-msg` surface of the transaction client.
    pub fn helper(&self, name: &str) -> Option<String> {
        let def = self.def(name)?;
        let mut out = String::new();
        match def.id {
            Some(id) => {
                let _ = writeln!(out, "{} (id 0x{id:02X}): {}", def.name, def.desc);
            }
            None => {
                let _ = writeln!(out, "{} (compound): {}", def.name, def.desc);
            }
        }
        for field in &def.fields {
            let _ = write!(out, "  {}: {}", field.name, field.type_spec);
            if let Some(handle) = field.enum_ref {
                let _ = write!(out, " (enum {})", self.enum_at(handle).name);
            }
            let _ = writeln!(out, " -- {}", field.desc);
            if let BaseType::Bitfield(handle) = field.base {
                for bit in self.bitfield_at(handle).bits_msb_first() {
                    let _ = writeln!(
                        out,
                        "    [{}:{}] {} -- {}",
                        bit.position + bit.width - 1,
                        bit.position,
                        bit.name,
                        bit.desc
                    );
                }
            }
        }
        Some(out)
    }
}

// ---------------------------------------------------------------------------
// Definition tree walking

fn obj<'a>(v: &'a Value, context: &str) -> SchemaResult<&'a serde_json::Map<String, Value>> {
    v.as_object().ok_or_else(|| SchemaError::InvalidValue {
        context: context.into(),
        key: "",
        detail: "expected a mapping".into(),
    })
}

fn arr<'a>(v: &'a Value, context: &str) -> SchemaResult<&'a Vec<Value>> {
    v.as_array().ok_or_else(|| SchemaError::InvalidValue {
        context: context.into(),
        key: "",
        detail: "expected a sequence".into(),
    })
}

fn req_str(
    map: &serde_json::Map<String, Value>,
    key: &'static str,
    context: &str,
) -> SchemaResult<MsgString> {
    match map.get(key) {
        None => Err(SchemaError::MissingKey {
            context: context.into(),
            key,
        }),
        Some(v) => v
            .as_str()
            .map(Into::into)
            .ok_or_else(|| SchemaError::InvalidValue {
                context: context.into(),
                key,
                detail: "expected a string".into(),
            }),
    }
}

fn opt_str(
    map: &serde_json::Map<String, Value>,
    key: &'static str,
    context: &str,
) -> SchemaResult<Option<MsgString>> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.into()))
            .ok_or_else(|| SchemaError::InvalidValue {
                context: context.into(),
                key,
                detail: "expected a string".into(),
            }),
    }
}

fn req_i64(
    map: &serde_json::Map<String, Value>,
    key: &'static str,
    context: &str,
) -> SchemaResult<i64> {
    match map.get(key) {
        None => Err(SchemaError::MissingKey {
            context: context.into(),
            key,
        }),
        Some(v) => v.as_i64().ok_or_else(|| SchemaError::InvalidValue {
            context: context.into(),
            key,
            detail: "expected an integer".into(),
        }),
    }
}

fn opt_u64(
    map: &serde_json::Map<String, Value>,
    key: &'static str,
    context: &str,
) -> SchemaResult<Option<u64>> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| SchemaError::InvalidValue {
                context: context.into(),
                key,
                detail: "expected an unsigned integer".into(),
            }),
    }
}

fn parse_enum(v: &Value) -> SchemaResult<EnumDef> {
    let map = obj(v, "enums entry")?;
    let name = req_str(map, "name", "enums entry")?;
    let context = format!("enum `{name}`");
    let desc = req_str(map, "desc", &context)?;
    let entries_v = map.get("entries").ok_or_else(|| SchemaError::MissingKey {
        context: context.as_str().into(),
        key: "entries",
    })?;

    let mut entries: SmallVec<[EnumEntry; 8]> = SmallVec::new();
    for entry_v in arr(entries_v, &context)? {
        let entry_map = obj(entry_v, &context)?;
        let entry_name = req_str(entry_map, "entry", &context)?;
        let entry_context = format!("{context} entry `{entry_name}`");
        let value = req_i64(entry_map, "value", &entry_context)?;
        let entry_desc = req_str(entry_map, "desc", &entry_context)?;

        if entries.iter().any(|e| e.name == entry_name) {
            return Err(SchemaError::DuplicateName {
                kind: "enum entry",
                name: entry_name,
                owner: name,
            });
        }
        if entries.iter().any(|e| e.value == value) {
            return Err(SchemaError::DuplicateValue {
                enum_name: name,
                value,
            });
        }
        entries.push(EnumEntry {
            name: entry_name,
            value,
            desc: entry_desc,
        });
    }

    let max_value = entries.iter().map(|e| e.value).max().unwrap_or(0);
    let bit_width = if max_value <= 0 {
        1
    } else {
        64 - (max_value as u64).leading_zeros()
    };
    Ok(EnumDef {
        name,
        desc,
        entries,
        bit_width,
        max_value,
    })
}

fn parse_bitfield(schema: &Schema, v: &Value) -> SchemaResult<BitfieldDef> {
    let map = obj(v, "bitfields entry")?;
    let name = req_str(map, "name", "bitfields entry")?;
    let context = format!("bitfield `{name}`");
    let desc = req_str(map, "desc", &context)?;
    let bits_v = map.get("bits").ok_or_else(|| SchemaError::MissingKey {
        context: context.as_str().into(),
        key: "bits",
    })?;

    let mut bits: SmallVec<[Bit; 8]> = SmallVec::new();
    let mut occupied: u64 = 0;
    for bit_v in arr(bits_v, &context)? {
        let bit_map = obj(bit_v, &context)?;
        let bit_name = req_str(bit_map, "name", &context)?;
        let bit_context = format!("{context} bit `{bit_name}`");
        let position = req_i64(bit_map, "position", &bit_context)?;
        let bit_desc = req_str(bit_map, "desc", &bit_context)?;
        let enum_name = opt_str(bit_map, "enum", &bit_context)?;
        let declared_width = opt_u64(bit_map, "width", &bit_context)?.unwrap_or(1);

        if !(0..=31).contains(&position) {
            return Err(SchemaError::InvalidValue {
                context: bit_context.as_str().into(),
                key: "position",
                detail: "expected a bit index in 0..=31".into(),
            });
        }
        let position = position as u32;

        // An attached enum overrides the declared width.
        let (width, enum_ref) = match &enum_name {
            Some(enum_name) => {
                let &index = schema.enum_index.get(enum_name.as_str()).ok_or_else(|| {
                    SchemaError::UnknownType {
                        owner: name.clone(),
                        field: bit_name.clone(),
                        type_name: enum_name.clone(),
                    }
                })?;
                let enum_def = &schema.enums[index];
                if enum_def.entries.iter().any(|e| e.value < 0) {
                    return Err(SchemaError::InvalidValue {
                        context: bit_context.as_str().into(),
                        key: "enum",
                        detail: "enums attached to bits must be non-negative".into(),
                    });
                }
                (enum_def.bit_width(), Some(EnumHandle(index)))
            }
            None => {
                if declared_width == 0 {
                    return Err(SchemaError::InvalidValue {
                        context: bit_context.as_str().into(),
                        key: "width",
                        detail: "width must be at least 1".into(),
                    });
                }
                if declared_width > 32 {
                    return Err(SchemaError::WidthExceeded {
                        context: bit_context.as_str().into(),
                        value: declared_width as i64,
                        limit: 32,
                    });
                }
                (declared_width as u32, None)
            }
        };

        if u64::from(position) + u64::from(width) > 32 {
            return Err(SchemaError::WidthExceeded {
                context: bit_context.as_str().into(),
                value: i64::from(position) + i64::from(width),
                limit: 32,
            });
        }
        if bits.iter().any(|b| b.name == bit_name) {
            return Err(SchemaError::DuplicateName {
                kind: "bit",
                name: bit_name,
                owner: name,
            });
        }

        let bit = Bit {
            name: bit_name,
            position,
            width,
            desc: bit_desc,
            enum_ref,
        };
        if occupied & bit.mask() != 0 {
            return Err(SchemaError::BitOverlap {
                bitfield: name,
                bit: bit.name,
            });
        }
        occupied |= bit.mask();
        bits.push(bit);
    }

    let highest_bit = if occupied == 0 {
        0
    } else {
        63 - occupied.leading_zeros()
    };
    let storage = Prim::fitting_unsigned(highest_bit);
    Ok(BitfieldDef {
        name,
        desc,
        bits,
        storage,
    })
}

fn parse_def(schema: &Schema, v: &Value, section: &str) -> SchemaResult<MessageDef> {
    let map = obj(v, section)?;
    let name = req_str(map, "name", section)?;
    let context = format!("{section} entry `{name}`");
    let desc = req_str(map, "desc", &context)?;

    // Presence of `id` discriminates messages from compound types. The id
    // shares its byte with the response flag, so bit 7 must stay clear.
    let id = match opt_u64(map, "id", &context)? {
        Some(raw) => {
            if raw > 0x7F {
                return Err(SchemaError::WidthExceeded {
                    context: format!("{context} id").into(),
                    value: raw as i64,
                    limit: 0x7F,
                });
            }
            Some(raw as u32)
        }
        None => None,
    };

    let fields_v = map.get("fields").ok_or_else(|| SchemaError::MissingKey {
        context: context.as_str().into(),
        key: "fields",
    })?;

    let mut fields: SmallVec<[FieldDef; 8]> = SmallVec::new();
    for field_v in arr(fields_v, &context)? {
        let field = parse_field(schema, &name, field_v, &context)?;
        if fields.iter().any(|f| f.name == field.name) {
            return Err(SchemaError::DuplicateName {
                kind: "field",
                name: field.name,
                owner: name,
            });
        }
        fields.push(field);
    }

    // A variable-length field may only terminate an identifier-bearing
    // message; compound types must stay statically sized so that parent
    // offsets remain computable.
    for (index, field) in fields.iter().enumerate() {
        if field.is_variable() && (id.is_none() || index + 1 != fields.len()) {
            return Err(SchemaError::VariableFieldNotLast {
                owner: name,
                field: field.name.clone(),
            });
        }
    }

    Ok(MessageDef {
        name,
        desc,
        id,
        fields,
    })
}

fn parse_field(
    schema: &Schema,
    owner: &MsgString,
    v: &Value,
    context: &str,
) -> SchemaResult<FieldDef> {
    let map = obj(v, context)?;
    let name = req_str(map, "name", context)?;
    let field_context = format!("{context} field `{name}`");
    let type_spec = req_str(map, "type", &field_context)?;
    let desc = req_str(map, "desc", &field_context)?;
    let enum_name = opt_str(map, "enum", &field_context)?;

    let (base_name, count) = parse_type_spec(owner, &name, &type_spec)?;

    let base = if let Some(prim) = Prim::parse(base_name) {
        BaseType::Prim(prim)
    } else if let Some(&index) = schema.bitfield_index.get(base_name) {
        if count != CountMode::One {
            // Bitfields are not arrayable.
            return Err(SchemaError::BadArraySpec {
                owner: owner.clone(),
                field: name,
                spec: type_spec,
            });
        }
        BaseType::Bitfield(BitfieldHandle(index))
    } else if let Some(&index) = schema.def_index.get(base_name) {
        if schema.defs[index].has_variable_field() {
            // Embedding a variable-length message would bury its tail.
            return Err(SchemaError::VariableFieldNotLast {
                owner: owner.clone(),
                field: name,
            });
        }
        if count == CountMode::Variable && schema.layout(&schema.defs[index]).fixed_size == 0 {
            // A variable array needs a nonzero stride to size itself.
            return Err(SchemaError::BadArraySpec {
                owner: owner.clone(),
                field: name,
                spec: type_spec,
            });
        }
        BaseType::Compound(DefHandle(index))
    } else {
        return Err(SchemaError::UnknownType {
            owner: owner.clone(),
            field: name,
            type_name: base_name.into(),
        });
    };

    let enum_ref = match &enum_name {
        None => None,
        Some(enum_name) => {
            let &index = schema.enum_index.get(enum_name.as_str()).ok_or_else(|| {
                SchemaError::UnknownType {
                    owner: owner.clone(),
                    field: name.clone(),
                    type_name: enum_name.clone(),
                }
            })?;
            let &BaseType::Prim(prim) = &base else {
                return Err(SchemaError::EnumNotApplicable {
                    owner: owner.clone(),
                    field: name,
                    enum_name: enum_name.clone(),
                });
            };
            if count != CountMode::One {
                return Err(SchemaError::EnumNotApplicable {
                    owner: owner.clone(),
                    field: name,
                    enum_name: enum_name.clone(),
                });
            }
            for entry in &schema.enums[index].entries {
                if entry.value < prim.min() || entry.value > prim.max() {
                    return Err(SchemaError::WidthExceeded {
                        context: format!("enum `{enum_name}` on field `{name}` of `{owner}`")
                            .into(),
                        value: entry.value,
                        limit: prim.max(),
                    });
                }
            }
            Some(EnumHandle(index))
        }
    };

    Ok(FieldDef {
        name,
        desc,
        type_spec,
        base,
        count,
        enum_ref,
    })
}

/// Splits a declared type string into its base name and count mode.
/// `base` is scalar, `base[N]` (decimal, nonzero) fixed, `base[]` variable.
fn parse_type_spec<'a>(
    owner: &MsgString,
    field: &MsgString,
    spec: &'a str,
) -> SchemaResult<(&'a str, CountMode)> {
    let bad = || SchemaError::BadArraySpec {
        owner: owner.clone(),
        field: field.clone(),
        spec: spec.into(),
    };
    match spec.find('[') {
        None => {
            if spec.contains(']') || spec.is_empty() {
                return Err(bad());
            }
            Ok((spec, CountMode::One))
        }
        Some(open) => {
            if open == 0 || !spec.ends_with(']') {
                return Err(bad());
            }
            let base = &spec[..open];
            let inner = &spec[open + 1..spec.len() - 1];
            if inner.is_empty() {
                Ok((base, CountMode::Variable))
            } else if inner.bytes().all(|b| b.is_ascii_digit()) {
                let n: usize = inner.parse().map_err(|_| bad())?;
                if n == 0 {
                    return Err(bad());
                }
                Ok((base, CountMode::Fixed(n)))
            } else {
                Err(bad())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(text: &str) -> SchemaResult<Schema> {
        Schema::from_json_str(text)
    }

    const BASIC: &str = r#"{
        "enums": [
            {"name": "Color", "desc": "Palette", "entries": [
                {"entry": "RED", "value": 1, "desc": "red"},
                {"entry": "GREEN", "value": 2, "desc": "green"},
                {"entry": "BLUE", "value": 3, "desc": "blue"}
            ]}
        ],
        "bitfields": [
            {"name": "Status", "desc": "Link status", "bits": [
                {"name": "ok", "position": 0, "desc": "link up"},
                {"name": "code", "position": 1, "width": 3, "desc": "status code"}
            ]}
        ],
        "messages": [
            {"name": "Hello", "desc": "Greeting", "id": 1, "fields": [
                {"name": "a", "type": "uint8", "desc": "color", "enum": "Color"}
            ]},
            {"name": "Arr", "desc": "Array carrier", "id": 2, "fields": [
                {"name": "xs", "type": "uint16[]", "desc": "samples"}
            ]}
        ]
    }"#;

    #[test]
    fn loads_basic_schema() {
        let schema = load(BASIC).unwrap();
        assert_eq!(schema.enums().count(), 1);
        assert_eq!(schema.messages().count(), 2);
        let hello = schema.message_by_id(1).unwrap();
        assert_eq!(hello.name, "Hello");
        assert!(hello.fields[0].enum_ref.is_some());
        let arr = schema.def("Arr").unwrap();
        assert!(arr.has_variable_field());
    }

    #[test]
    fn enum_bit_width_derivation() {
        let schema = load(BASIC).unwrap();
        let color = schema.enum_def("Color").unwrap();
        // max value 3 -> 2 bits
        assert_eq!(color.bit_width(), 2);
        assert_eq!(color.entry_by_name("GREEN").unwrap().value, 2);
        assert!(color.entry_by_value(4).is_none());
    }

    #[test]
    fn bitfield_storage_and_order() {
        let schema = load(BASIC).unwrap();
        let status = schema.bitfield("Status").unwrap();
        assert_eq!(status.storage(), Prim::U8);
        let msb_first = status.bits_msb_first();
        assert_eq!(msb_first[0].name, "code");
        assert_eq!(msb_first[1].name, "ok");
    }

    #[test]
    fn rejects_duplicate_enum_value() {
        let text = r#"{"enums": [{"name": "E", "desc": "d", "entries": [
            {"entry": "A", "value": 1, "desc": "a"},
            {"entry": "B", "value": 1, "desc": "b"}
        ]}]}"#;
        assert!(matches!(
            load(text),
            Err(SchemaError::DuplicateValue { value: 1, .. })
        ));
    }

    #[test]
    fn rejects_duplicate_enum_entry_name() {
        let text = r#"{"enums": [{"name": "E", "desc": "d", "entries": [
            {"entry": "A", "value": 1, "desc": "a"},
            {"entry": "A", "value": 2, "desc": "b"}
        ]}]}"#;
        assert!(matches!(load(text), Err(SchemaError::DuplicateName { .. })));
    }

    #[test]
    fn rejects_variable_field_not_last() {
        let text = r#"{"messages": [
            {"name": "M", "desc": "d", "id": 1, "fields": [
                {"name": "a", "type": "uint8[]", "desc": "a"},
                {"name": "b", "type": "uint8", "desc": "b"}
            ]}
        ]}"#;
        assert!(matches!(
            load(text),
            Err(SchemaError::VariableFieldNotLast { .. })
        ));
    }

    #[test]
    fn rejects_variable_field_in_compound() {
        let text = r#"{"types": [
            {"name": "T", "desc": "d", "fields": [
                {"name": "a", "type": "uint8[]", "desc": "a"}
            ]}
        ]}"#;
        assert!(matches!(
            load(text),
            Err(SchemaError::VariableFieldNotLast { .. })
        ));
    }

    #[test]
    fn rejects_unknown_base_type() {
        let text = r#"{"messages": [
            {"name": "M", "desc": "d", "id": 1, "fields": [
                {"name": "a", "type": "mystery", "desc": "a"}
            ]}
        ]}"#;
        assert!(matches!(load(text), Err(SchemaError::UnknownType { .. })));
    }

    #[test]
    fn rejects_forward_reference() {
        // `Inner` is declared under `messages`, after `types` processing,
        // so the compound reference cannot resolve.
        let text = r#"{
            "types": [
                {"name": "Outer", "desc": "d", "fields": [
                    {"name": "x", "type": "Inner", "desc": "x"}
                ]}
            ],
            "messages": [
                {"name": "Inner", "desc": "d", "id": 1, "fields": [
                    {"name": "v", "type": "uint8", "desc": "v"}
                ]}
            ]
        }"#;
        assert!(matches!(load(text), Err(SchemaError::UnknownType { .. })));
    }

    #[test]
    fn rejects_bad_array_specs() {
        for spec in ["uint8[0]", "uint8[-1]", "uint8[two]", "uint8[2", "[3]"] {
            let text = format!(
                r#"{{"messages": [{{"name": "M", "desc": "d", "id": 1, "fields": [
                    {{"name": "a", "type": "{spec}", "desc": "a"}}
                ]}}]}}"#
            );
            assert!(
                matches!(load(&text), Err(SchemaError::BadArraySpec { .. })),
                "spec {spec} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_arrayed_bitfield() {
        let text = r#"{
            "bitfields": [{"name": "B", "desc": "d", "bits": [
                {"name": "x", "position": 0, "desc": "x"}
            ]}],
            "messages": [{"name": "M", "desc": "d", "id": 1, "fields": [
                {"name": "a", "type": "B[2]", "desc": "a"}
            ]}]
        }"#;
        assert!(matches!(load(text), Err(SchemaError::BadArraySpec { .. })));
    }

    #[test]
    fn rejects_bit_overlap() {
        let text = r#"{"bitfields": [{"name": "B", "desc": "d", "bits": [
            {"name": "lo", "position": 0, "width": 2, "desc": "lo"},
            {"name": "hi", "position": 1, "desc": "hi"}
        ]}]}"#;
        assert!(matches!(load(text), Err(SchemaError::BitOverlap { .. })));
    }

    #[test]
    fn rejects_bitfield_wider_than_word() {
        let text = r#"{"bitfields": [{"name": "B", "desc": "d", "bits": [
            {"name": "wide", "position": 30, "width": 4, "desc": "w"}
        ]}]}"#;
        assert!(matches!(load(text), Err(SchemaError::WidthExceeded { .. })));
    }

    #[test]
    fn rejects_duplicate_message_id() {
        let text = r#"{"messages": [
            {"name": "A", "desc": "d", "id": 1, "fields": []},
            {"name": "B", "desc": "d", "id": 1, "fields": []}
        ]}"#;
        assert!(matches!(
            load(text),
            Err(SchemaError::DuplicateId { id: 1, .. })
        ));
    }

    #[test]
    fn rejects_id_with_response_bit() {
        let text = r#"{"messages": [
            {"name": "A", "desc": "d", "id": 200, "fields": []}
        ]}"#;
        assert!(matches!(load(text), Err(SchemaError::WidthExceeded { .. })));
    }

    #[test]
    fn rejects_missing_desc() {
        let text = r#"{"messages": [
            {"name": "A", "id": 1, "fields": []}
        ]}"#;
        assert!(matches!(
            load(text),
            Err(SchemaError::MissingKey { key: "desc", .. })
        ));
    }

    #[test]
    fn rejects_enum_on_compound_field() {
        let text = r#"{
            "enums": [{"name": "E", "desc": "d", "entries": [
                {"entry": "A", "value": 0, "desc": "a"}
            ]}],
            "types": [{"name": "T", "desc": "d", "fields": [
                {"name": "v", "type": "uint8", "desc": "v"}
            ]}],
            "messages": [{"name": "M", "desc": "d", "id": 1, "fields": [
                {"name": "t", "type": "T", "desc": "t", "enum": "E"}
            ]}]
        }"#;
        assert!(matches!(
            load(text),
            Err(SchemaError::EnumNotApplicable { .. })
        ));
    }

    #[test]
    fn rejects_enum_too_wide_for_field() {
        let text = r#"{
            "enums": [{"name": "E", "desc": "d", "entries": [
                {"entry": "BIG", "value": 300, "desc": "big"}
            ]}],
            "messages": [{"name": "M", "desc": "d", "id": 1, "fields": [
                {"name": "a", "type": "uint8", "desc": "a", "enum": "E"}
            ]}]
        }"#;
        assert!(matches!(load(text), Err(SchemaError::WidthExceeded { .. })));
    }

    #[test]
    fn bitfield_enum_overrides_width() {
        let text = r#"{
            "enums": [{"name": "Code", "desc": "d", "entries": [
                {"entry": "OK", "value": 0, "desc": "ok"},
                {"entry": "WARN", "value": 1, "desc": "warn"},
                {"entry": "ERR", "value": 2, "desc": "err"}
            ]}],
            "bitfields": [{"name": "S", "desc": "d", "bits": [
                {"name": "ok", "position": 0, "desc": "ok"},
                {"name": "code", "position": 1, "enum": "Code", "desc": "code"}
            ]}]
        }"#;
        let schema = load(text).unwrap();
        let bit = schema.bitfield("S").unwrap().bit("code").unwrap();
        // Code has max value 2 -> 2 bits
        assert_eq!(bit.width, 2);
    }

    #[test]
    fn helper_lists_fields_and_bits() {
        let schema = load(BASIC).unwrap();
        let text = schema.helper("Hello").unwrap();
        assert!(text.contains("Hello (id 0x01)"));
        assert!(text.contains("a: uint8 (enum Color)"));
        assert!(schema.helper("Nope").is_none());
    }

    #[test]
    fn type_spec_parsing() {
        let owner: MsgString = "M".into();
        let field: MsgString = "f".into();
        let (base, count) = parse_type_spec(&owner, &field, "uint16[4]").unwrap();
        assert_eq!(base, "uint16");
        assert_eq!(count, CountMode::Fixed(4));
        let (_, count) = parse_type_spec(&owner, &field, "uint16[]").unwrap();
        assert_eq!(count, CountMode::Variable);
        let (_, count) = parse_type_spec(&owner, &field, "uint16").unwrap();
        assert_eq!(count, CountMode::One);
    }
}
