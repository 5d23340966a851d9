//! Random message generation bounded by field domains, and the autotest
//! harness that round-trips every registered message.

use crate::codec::{decode, encode};
use crate::error::{CodecError, CodecResult};
use crate::layout::Domain;
use crate::schema::{BaseType, CountMode, FieldDef, MessageDef, Schema};
use crate::value::{BitsValue, FieldValue, MessageValue};
use rand::Rng;
use smallvec::SmallVec;

/// Maximum element count sampled for a variable-length tail.
const MAX_RANDOM_TAIL: usize = 16;

/// Samples a valid random instance of `def`. Every scalar is drawn from
/// its field's domain, so the result always encodes cleanly.
pub fn sample_message<R: Rng + ?Sized>(
    schema: &Schema,
    def: &MessageDef,
    rng: &mut R,
) -> MessageValue {
    let fields = def
        .fields
        .iter()
        .map(|field| (field.name.clone(), sample_field(schema, field, rng)))
        .collect();
    MessageValue {
        name: def.name.clone(),
        fields,
    }
}

fn sample_field<R: Rng + ?Sized>(schema: &Schema, field: &FieldDef, rng: &mut R) -> FieldValue {
    match field.count {
        CountMode::One => sample_element(schema, field, rng),
        CountMode::Fixed(n) => {
            FieldValue::Array((0..n).map(|_| sample_element(schema, field, rng)).collect())
        }
        CountMode::Variable => {
            let n = rng.random_range(0..=MAX_RANDOM_TAIL);
            FieldValue::Array((0..n).map(|_| sample_element(schema, field, rng)).collect())
        }
    }
}

fn sample_element<R: Rng + ?Sized>(schema: &Schema, field: &FieldDef, rng: &mut R) -> FieldValue {
    match field.base {
        BaseType::Prim(_) => {
            let value = match schema.scalar_domain(field) {
                Some(Domain::Enum(enum_def)) => {
                    let index = rng.random_range(0..enum_def.entries.len());
                    enum_def.entries[index].value
                }
                Some(Domain::Range { min, max }) => rng.random_range(min..=max),
                None => 0,
            };
            FieldValue::Scalar(value)
        }
        BaseType::Bitfield(handle) => {
            let bf = schema.bitfield_at(handle);
            let mut values: SmallVec<[_; 8]> = SmallVec::new();
            for bit in &bf.bits {
                let value = match bit.enum_ref {
                    Some(enum_handle) => {
                        let enum_def = schema.enum_at(enum_handle);
                        let index = rng.random_range(0..enum_def.entries.len());
                        enum_def.entries[index].value as u32
                    }
                    None => rng.random_range(0..=bit.max_value()) as u32,
                };
                values.push((bit.name.clone(), value));
            }
            FieldValue::Bits(BitsValue {
                bitfield: bf.name.clone(),
                values,
            })
        }
        BaseType::Compound(handle) => {
            FieldValue::Compound(sample_message(schema, schema.def_at(handle), rng))
        }
    }
}

/// Round-trips `iterations` random instances of every registered message:
/// value equality after decode, byte equality after re-encode.
pub fn autotest<R: Rng + ?Sized>(
    schema: &Schema,
    iterations: usize,
    rng: &mut R,
) -> CodecResult<()> {
    for def in schema.messages() {
        for _ in 0..iterations {
            let msg = sample_message(schema, def, rng);
            let bytes = encode(schema, &msg)?;
            let back = decode(schema, def, &bytes)?;
            if back != msg {
                return Err(CodecError::RoundTripMismatch {
                    message: def.name.clone(),
                });
            }
            if encode(schema, &back)? != bytes {
                return Err(CodecError::RoundTripMismatch {
                    message: def.name.clone(),
                });
            }
        }
        log::debug!("autotest: `{}` survived {iterations} round-trips", def.name);
    }
    Ok(())
}
