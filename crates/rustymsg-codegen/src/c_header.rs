//! C header emission: enums, bitfield macros and packed message structs.

use heck::ToShoutySnakeCase;
use rustymsg::{BaseType, BitfieldDef, CountMode, EnumDef, MessageDef, Schema};
use std::fmt::Write as _;

/// Hard upper bound for variable-length arrays in C structs. The runtime
/// has no such limit; the header documents it next to each capped field.
pub const C_VARIABLE_ARRAY_CAP: usize = 255;

/// Emits one self-contained C header for a schema.
pub struct CHeaderEmitter<'s> {
    schema: &'s Schema,
    prefix: String,
    indent: usize,
}

impl<'s> CHeaderEmitter<'s> {
    /// Creates an emitter. `prefix` names the include guard.
    #[must_use]
    pub fn new(schema: &'s Schema, prefix: &str) -> Self {
        Self {
            schema,
            prefix: prefix.to_shouty_snake_case(),
            indent: 4,
        }
    }

    /// Overrides the indentation width (spaces per level).
    #[must_use]
    pub const fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    /// Renders the header text.
    #[must_use]
    pub fn emit(&self) -> String {
        let mut out = String::new();
        let guard = format!("__{}_H__", self.prefix);
        let _ = writeln!(out, "#ifndef {guard}");
        let _ = writeln!(out, "#define {guard}");
        let _ = writeln!(out);
        let _ = writeln!(out, "#include <stdint.h>");

        for enum_def in self.schema.enums() {
            let _ = writeln!(out);
            out.push_str(&self.emit_enum(enum_def));
        }
        for bitfield in self.schema.bitfields() {
            let _ = writeln!(out);
            out.push_str(&self.emit_bitfield(bitfield));
        }
        for def in self.schema.defs() {
            let _ = writeln!(out);
            out.push_str(&self.emit_struct(def));
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "#endif /* {guard} */");
        out
    }

    fn pad(&self) -> String {
        " ".repeat(self.indent)
    }

    fn emit_enum(&self, def: &EnumDef) -> String {
        let mut out = String::new();
        let pad = self.pad();
        let _ = writeln!(out, "/* {} */", def.desc);
        let _ = writeln!(out, "typedef enum {}_e {{", def.name);
        for entry in &def.entries {
            let _ = writeln!(out, "{pad}{} = {}, /* {} */", entry.name, entry.value, entry.desc);
        }
        let _ = writeln!(out, "{pad}{}_END = {}", def.name, def.max_value() + 1);
        let _ = writeln!(out, "}} {}_t;", def.name);
        out
    }

    fn emit_bitfield(&self, def: &BitfieldDef) -> String {
        let mut out = String::new();
        let pad = self.pad();
        let bf_prefix = def.name.to_shouty_snake_case();
        let _ = writeln!(out, "/* {} */", def.desc);

        // Per-bit macros, MSB first to match the display convention.
        for bit in def.bits_msb_first() {
            let bit_prefix = format!("{bf_prefix}_{}", bit.name.to_shouty_snake_case());
            if bit.width == 1 {
                let _ = writeln!(out, "#define {bit_prefix} (1 << {})", bit.position);
            } else {
                let mask = (1u64 << bit.width) - 1;
                let _ = writeln!(
                    out,
                    "#define {bit_prefix}_MASK (0x{mask:X} << {})",
                    bit.position
                );
                let _ = writeln!(out, "#define {bit_prefix}_POS {}", bit.position);
            }
            if let Some(handle) = bit.enum_ref {
                for entry in &self.schema.enum_at(handle).entries {
                    let _ = writeln!(
                        out,
                        "#define {bit_prefix}_{} ({} << {})",
                        entry.name.to_shouty_snake_case(),
                        entry.value,
                        bit.position
                    );
                }
            }
        }

        // Packed struct with C bitfield members, LSB first, gaps padded.
        let storage = def.storage();
        let storage_bits = storage.size_bytes() as u32 * 8;
        let _ = writeln!(out, "typedef struct __attribute__((packed)) {{");
        let mut lsb_first: Vec<_> = def.bits.iter().collect();
        lsb_first.sort_by_key(|b| b.position);
        let mut next_pos = 0u32;
        let mut pad_index = 0u32;
        for bit in lsb_first {
            if bit.position > next_pos {
                let _ = writeln!(
                    out,
                    "{pad}{} reserved{pad_index} : {};",
                    storage.c_type(),
                    bit.position - next_pos
                );
                pad_index += 1;
            }
            let _ = writeln!(
                out,
                "{pad}{} {} : {}; /* {} */",
                storage.c_type(),
                bit.name,
                bit.width,
                bit.desc
            );
            next_pos = bit.position + bit.width;
        }
        if next_pos < storage_bits {
            let _ = writeln!(
                out,
                "{pad}{} reserved{pad_index} : {};",
                storage.c_type(),
                storage_bits - next_pos
            );
        }
        let _ = writeln!(out, "}} {}_t;", def.name);
        out
    }

    fn emit_struct(&self, def: &MessageDef) -> String {
        let mut out = String::new();
        let pad = self.pad();
        if let Some(id) = def.id {
            let _ = writeln!(out, "#define {}_ID {id}", def.name.to_shouty_snake_case());
        }
        let _ = writeln!(out, "/* {} */", def.desc);
        let _ = writeln!(out, "#pragma pack(push, 1)");
        let _ = writeln!(out, "typedef struct {{");
        for field in &def.fields {
            let c_type = match field.base {
                BaseType::Prim(prim) => prim.c_type().to_owned(),
                BaseType::Bitfield(handle) => {
                    format!("{}_t", self.schema.bitfield_at(handle).name)
                }
                BaseType::Compound(handle) => format!("{}_t", self.schema.def_at(handle).name),
            };
            let mut comment = field.desc.to_string();
            if let Some(handle) = field.enum_ref {
                let _ = write!(comment, " (enum {})", self.schema.enum_at(handle).name);
            }
            match field.count {
                CountMode::One => {
                    let _ = writeln!(out, "{pad}{c_type} {}; /* {comment} */", field.name);
                }
                CountMode::Fixed(n) => {
                    let _ = writeln!(out, "{pad}{c_type} {}[{n}]; /* {comment} */", field.name);
                }
                CountMode::Variable => {
                    let _ = writeln!(
                        out,
                        "{pad}{c_type} {}[{C_VARIABLE_ARRAY_CAP}]; /* {comment}; \
                         variable length, capped at {C_VARIABLE_ARRAY_CAP} elements */",
                        field.name
                    );
                }
            }
        }
        let _ = writeln!(out, "}} {}_t;", def.name);
        let _ = writeln!(out, "#pragma pack(pop)");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::from_json_str(
            r#"{
                "enums": [{"name": "Color", "desc": "Palette", "entries": [
                    {"entry": "RED", "value": 1, "desc": "red"},
                    {"entry": "GREEN", "value": 2, "desc": "green"}
                ]}],
                "bitfields": [{"name": "Status", "desc": "Link status", "bits": [
                    {"name": "ok", "position": 0, "desc": "link up"},
                    {"name": "code", "position": 2, "width": 3, "desc": "code"}
                ]}],
                "types": [{"name": "Point", "desc": "2d point", "fields": [
                    {"name": "x", "type": "int16", "desc": "x"},
                    {"name": "y", "type": "int16", "desc": "y"}
                ]}],
                "messages": [{"name": "Hello", "desc": "Greeting", "id": 1, "fields": [
                    {"name": "a", "type": "uint8", "desc": "color", "enum": "Color"},
                    {"name": "s", "type": "Status", "desc": "status"},
                    {"name": "at", "type": "Point", "desc": "where"},
                    {"name": "xs", "type": "uint16[]", "desc": "samples"}
                ]}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn guard_and_include() {
        let schema = schema();
        let header = CHeaderEmitter::new(&schema, "my_proto").emit();
        assert!(header.starts_with("#ifndef __MY_PROTO_H__\n#define __MY_PROTO_H__\n"));
        assert!(header.contains("#include <stdint.h>"));
        assert!(header.trim_end().ends_with("#endif /* __MY_PROTO_H__ */"));
    }

    #[test]
    fn enum_block_shape() {
        let schema = schema();
        let header = CHeaderEmitter::new(&schema, "p").emit();
        let expected = "/* Palette */\n\
                        typedef enum Color_e {\n    \
                        RED = 1, /* red */\n    \
                        GREEN = 2, /* green */\n    \
                        Color_END = 3\n\
                        } Color_t;\n";
        assert!(header.contains(expected), "header:\n{header}");
    }

    #[test]
    fn bitfield_macros_and_struct() {
        let schema = schema();
        let header = CHeaderEmitter::new(&schema, "p").emit();
        assert!(header.contains("#define STATUS_OK (1 << 0)"));
        assert!(header.contains("#define STATUS_CODE_MASK (0x7 << 2)"));
        assert!(header.contains("#define STATUS_CODE_POS 2"));
        // gap between bit 0 and bit 2 is padded, tail filled to 8 bits
        assert!(header.contains("uint8_t reserved0 : 1;"));
        assert!(header.contains("uint8_t reserved1 : 3;"));
        assert!(header.contains("uint8_t code : 3;"));
    }

    #[test]
    fn message_struct_shape() {
        let schema = schema();
        let header = CHeaderEmitter::new(&schema, "p").emit();
        assert!(header.contains("#define HELLO_ID 1"));
        assert!(header.contains("#pragma pack(push, 1)"));
        assert!(header.contains("uint8_t a; /* color (enum Color) */"));
        assert!(header.contains("Status_t s; /* status */"));
        assert!(header.contains("Point_t at; /* where */"));
        assert!(header.contains("uint16_t xs[255];"));
        assert!(header.contains("capped at 255 elements"));
    }

    #[test]
    fn indent_is_configurable() {
        let schema = schema();
        let header = CHeaderEmitter::new(&schema, "p").with_indent(2).emit();
        assert!(header.contains("\n  RED = 1, /* red */"));
    }

    #[test]
    fn compound_struct_has_no_id_define() {
        let schema = schema();
        let header = CHeaderEmitter::new(&schema, "p").emit();
        assert!(!header.contains("POINT_ID"));
        let point = "typedef struct {\n    int16_t x; /* x */\n    int16_t y; /* y */\n} Point_t;";
        assert!(header.contains(point), "header:\n{header}");
    }
}
