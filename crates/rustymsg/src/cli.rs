//! Per-message command-line option groups.
//!
//! Every registered message becomes one subcommand with one `--<field>`
//! option per field, so a thin front-end can dispatch straight from parsed
//! arguments to a validated [`MessageValue`]. Scalars accept integers
//! (decimal or `0x` hex) or enum entry names; arrays take comma-separated
//! values; bitfields take `bit=value` pairs; compounds take their scalar
//! fields flattened in declaration order.

use crate::error::{CodecError, CodecResult};
use crate::schema::{BaseType, CountMode, MessageDef, Schema};
use crate::value::{MessageBuilder, MessageValue};
use clap::{Arg, ArgAction, ArgMatches, Command};

/// Builds one subcommand per registered message.
#[must_use]
pub fn subcommands(schema: &Schema) -> Vec<Command> {
    schema.messages().map(|def| subcommand(schema, def)).collect()
}

fn subcommand(schema: &Schema, def: &MessageDef) -> Command {
    let mut cmd = Command::new(def.name.to_string()).about(def.desc.to_string());
    for field in &def.fields {
        let mut help = format!("{} ({})", field.desc, field.type_spec);
        if let Some(handle) = field.enum_ref {
            let enum_def = schema.enum_at(handle);
            let entries: Vec<&str> = enum_def.entries.iter().map(|e| e.name.as_str()).collect();
            help.push_str(&format!(" [{}]", entries.join("|")));
        }
        let mut arg = Arg::new(field.name.to_string())
            .long(field.name.to_string())
            .help(help)
            .action(ArgAction::Append)
            .allow_hyphen_values(true);
        arg = match (&field.base, field.count) {
            (BaseType::Prim(_), CountMode::One) => arg.num_args(1).required(true),
            (BaseType::Prim(_), CountMode::Fixed(_)) => {
                arg.num_args(1..).value_delimiter(',').required(true)
            }
            (BaseType::Prim(_), CountMode::Variable) => {
                arg.num_args(1..).value_delimiter(',').required(false)
            }
            (BaseType::Bitfield(_), _) => arg
                .num_args(1..)
                .value_delimiter(',')
                .value_name("BIT=VALUE")
                .required(false),
            (BaseType::Compound(_), CountMode::One) => {
                arg.num_args(1..).value_delimiter(',').required(true)
            }
            (BaseType::Compound(_), CountMode::Fixed(_)) => {
                arg.num_args(1..).value_delimiter(',').required(true)
            }
            (BaseType::Compound(_), CountMode::Variable) => {
                arg.num_args(1..).value_delimiter(',').required(false)
            }
        };
        cmd = cmd.arg(arg);
    }
    cmd
}

/// Converts parsed subcommand matches into a validated message.
pub fn message_from_matches(
    schema: &Schema,
    name: &str,
    matches: &ArgMatches,
) -> CodecResult<MessageValue> {
    let def = schema
        .def(name)
        .filter(|d| d.is_message())
        .ok_or_else(|| CodecError::UnknownMessage { name: name.into() })?;
    let mut builder = MessageBuilder::new(schema, def);

    for field in &def.fields {
        let Some(raw) = matches.get_many::<String>(field.name.as_str()) else {
            continue;
        };
        let raw: Vec<&String> = raw.collect();
        match (&field.base, field.count) {
            (BaseType::Prim(_), CountMode::One) => {
                let text = raw[0];
                if let Some(value) = parse_int(text) {
                    builder.set_scalar(&field.name, value)?;
                } else {
                    builder.set_enum(&field.name, text)?;
                }
            }
            (BaseType::Prim(_), _) => {
                let values = parse_int_list(&field.name, &raw)?;
                builder.set_scalar_array(&field.name, &values)?;
            }
            (BaseType::Bitfield(handle), _) => {
                let bf = schema.bitfield_at(*handle);
                for pair in &raw {
                    let (bit, text) =
                        pair.split_once('=')
                            .ok_or_else(|| CodecError::BadArgument {
                                field: field.name.clone(),
                                detail: format!("expected BIT=VALUE, got `{pair}`").into(),
                            })?;
                    if bf.bit(bit).is_none() {
                        return Err(CodecError::UnknownBit {
                            bitfield: bf.name.clone(),
                            bit: bit.into(),
                        });
                    }
                    match parse_int(text) {
                        Some(value) if (0..=i64::from(u32::MAX)).contains(&value) => {
                            builder.set_bit(&field.name, bit, value as u32)?;
                        }
                        Some(value) => {
                            return Err(CodecError::BadArgument {
                                field: field.name.clone(),
                                detail: format!("bit value {value} out of range").into(),
                            });
                        }
                        None => {
                            builder.set_bit_enum(&field.name, bit, text)?;
                        }
                    }
                }
            }
            (BaseType::Compound(handle), count) => {
                let sub_def = schema.def_at(*handle);
                let values = parse_int_list(&field.name, &raw)?;
                if count == CountMode::One {
                    let compound = build_flat_compound(schema, sub_def, &field.name, &values)?;
                    builder.set_compound(&field.name, compound)?;
                } else {
                    let width = sub_def.fields.len();
                    if width == 0 || values.len() % width != 0 {
                        return Err(CodecError::BadArgument {
                            field: field.name.clone(),
                            detail: format!(
                                "expected a multiple of {width} values for `{}` elements",
                                sub_def.name
                            )
                            .into(),
                        });
                    }
                    let mut elements = Vec::with_capacity(values.len() / width);
                    for chunk in values.chunks(width) {
                        elements.push(build_flat_compound(schema, sub_def, &field.name, chunk)?);
                    }
                    builder.set_compound_array(&field.name, elements)?;
                }
            }
        }
    }
    builder.finish()
}

/// Builds a compound value from scalars flattened in declaration order.
/// Only flat compounds (all fields scalar primitives) can come from the
/// command line.
fn build_flat_compound(
    schema: &Schema,
    def: &MessageDef,
    field: &str,
    values: &[i64],
) -> CodecResult<MessageValue> {
    if values.len() != def.fields.len() {
        return Err(CodecError::BadArgument {
            field: field.into(),
            detail: format!(
                "`{}` takes {} values, got {}",
                def.name,
                def.fields.len(),
                values.len()
            )
            .into(),
        });
    }
    let mut builder = MessageBuilder::new(schema, def);
    for (sub_field, &value) in def.fields.iter().zip(values) {
        if !matches!(
            (&sub_field.base, sub_field.count),
            (BaseType::Prim(_), CountMode::One)
        ) {
            return Err(CodecError::BadArgument {
                field: field.into(),
                detail: format!(
                    "compound `{}` is not flat and cannot be built from the command line",
                    def.name
                )
                .into(),
            });
        }
        builder.set_scalar(&sub_field.name, value)?;
    }
    builder.finish()
}

fn parse_int_list(field: &str, raw: &[&String]) -> CodecResult<Vec<i64>> {
    raw.iter()
        .map(|text| {
            parse_int(text).ok_or_else(|| CodecError::BadArgument {
                field: field.into(),
                detail: format!("`{text}` is not an integer").into(),
            })
        })
        .collect()
}

/// Parses a decimal or `0x`-prefixed hexadecimal integer.
#[must_use]
pub fn parse_int(text: &str) -> Option<i64> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        body.parse::<i64>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::from_json_str(
            r#"{
                "enums": [{"name": "Color", "desc": "d", "entries": [
                    {"entry": "RED", "value": 1, "desc": "r"},
                    {"entry": "GREEN", "value": 2, "desc": "g"}
                ]}],
                "types": [{"name": "Point", "desc": "d", "fields": [
                    {"name": "x", "type": "int16", "desc": "x"},
                    {"name": "y", "type": "int16", "desc": "y"}
                ]}],
                "bitfields": [{"name": "Status", "desc": "d", "bits": [
                    {"name": "ok", "position": 0, "desc": "ok"},
                    {"name": "code", "position": 1, "width": 3, "desc": "c"}
                ]}],
                "messages": [
                    {"name": "Hello", "desc": "greeting", "id": 1, "fields": [
                        {"name": "a", "type": "uint8", "desc": "a", "enum": "Color"},
                        {"name": "s", "type": "Status", "desc": "s"},
                        {"name": "at", "type": "Point", "desc": "at"},
                        {"name": "xs", "type": "uint16[]", "desc": "xs"}
                    ]}
                ]
            }"#,
        )
        .unwrap()
    }

    fn parse(schema: &Schema, argv: &[&str]) -> CodecResult<MessageValue> {
        let cmd = Command::new("client").subcommands(subcommands(schema));
        let matches = cmd.try_get_matches_from(argv).unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        message_from_matches(schema, name, sub)
    }

    #[test]
    fn builds_message_from_argv() {
        let schema = schema();
        let msg = parse(
            &schema,
            &[
                "client", "Hello", "--a", "GREEN", "--s", "ok=1,code=3", "--at", "-4,7", "--xs",
                "1,0x203",
            ],
        )
        .unwrap();
        assert_eq!(msg.scalar("a"), Some(2));
        let bytes = crate::codec::encode(&schema, &msg).unwrap();
        // a=2, status=0b111=7? no: ok=1, code=3 -> 1 | 3<<1 = 7
        assert_eq!(bytes[0], 0x02);
        assert_eq!(bytes[1], 0x07);
        // point -4,7 little-endian i16
        assert_eq!(&bytes[2..6], &[0xFC, 0xFF, 0x07, 0x00]);
        assert_eq!(&bytes[6..], &[0x01, 0x00, 0x03, 0x02]);
    }

    #[test]
    fn enum_accepts_raw_value() {
        let schema = schema();
        let msg = parse(
            &schema,
            &["client", "Hello", "--a", "1", "--at", "0,0"],
        )
        .unwrap();
        assert_eq!(msg.scalar("a"), Some(1));
        // unset bitfield defaults to zero, unset variable tail to empty
        assert_eq!(msg.scalar("a"), Some(1));
    }

    #[test]
    fn rejects_unknown_bit_name() {
        let schema = schema();
        let err = parse(
            &schema,
            &["client", "Hello", "--a", "1", "--s", "nope=1", "--at", "0,0"],
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::UnknownBit { .. }));
    }

    #[test]
    fn rejects_wrong_compound_arity() {
        let schema = schema();
        let err = parse(
            &schema,
            &["client", "Hello", "--a", "1", "--at", "1,2,3"],
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::BadArgument { .. }));
    }

    #[test]
    fn parse_int_formats() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("-42"), Some(-42));
        assert_eq!(parse_int("0x10"), Some(16));
        assert_eq!(parse_int("0X10"), Some(16));
        assert_eq!(parse_int("GREEN"), None);
    }
}
