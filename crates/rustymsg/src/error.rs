//! Error types for schema loading and message encoding/decoding.

use smartstring::{LazyCompact, SmartString};
use thiserror::Error;

type MsgString = SmartString<LazyCompact>;

/// Result type alias for schema operations.
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

/// Result type alias for codec operations.
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Errors raised while building a schema from its definition tree.
///
/// Schema errors are fatal: a schema either loads cleanly or not at all.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The same name is declared twice within one namespace.
    #[error("duplicate {kind} name `{name}` in `{owner}`")]
    DuplicateName {
        /// What kind of item collided (enum entry, field, message, ...)
        kind: &'static str,
        /// The colliding name
        name: MsgString,
        /// The enclosing definition
        owner: MsgString,
    },

    /// Two enum entries share one value.
    #[error("value {value} used for more than one entry in enum `{enum_name}`")]
    DuplicateValue {
        /// The enum that holds the collision
        enum_name: MsgString,
        /// The duplicated value
        value: i64,
    },

    /// Two messages share one identifier.
    #[error("message id {id} used by both `{previous}` and `{name}`")]
    DuplicateId {
        /// The duplicated identifier
        id: u32,
        /// Message that first claimed the id
        previous: MsgString,
        /// Message that tried to claim it again
        name: MsgString,
    },

    /// A field's base type or enum reference does not resolve.
    #[error("unknown type `{type_name}` referenced by field `{field}` of `{owner}`")]
    UnknownType {
        /// The enclosing message or compound type
        owner: MsgString,
        /// The referencing field
        field: MsgString,
        /// The unresolved name
        type_name: MsgString,
    },

    /// The `[..]` suffix of a type string is malformed.
    #[error("bad array spec `{spec}` on field `{field}` of `{owner}`")]
    BadArraySpec {
        /// The enclosing message or compound type
        owner: MsgString,
        /// The offending field
        field: MsgString,
        /// The declared type string
        spec: MsgString,
    },

    /// Two bits of a bitfield occupy overlapping positions.
    #[error("bit `{bit}` overlaps a previous bit in bitfield `{bitfield}`")]
    BitOverlap {
        /// The bitfield that holds the collision
        bitfield: MsgString,
        /// The overlapping bit
        bit: MsgString,
    },

    /// A width or value exceeds what its container can hold.
    #[error("{context}: {value} exceeds limit {limit}")]
    WidthExceeded {
        /// Human description of the container
        context: MsgString,
        /// The offending value or width
        value: i64,
        /// The maximum the container allows
        limit: i64,
    },

    /// A required key is absent from the definition tree.
    #[error("missing required key `{key}` in {context}")]
    MissingKey {
        /// Where the key was expected
        context: MsgString,
        /// The absent key
        key: &'static str,
    },

    /// A key is present but holds a value of the wrong shape.
    #[error("invalid value for `{key}` in {context}: {detail}")]
    InvalidValue {
        /// Where the value was found
        context: MsgString,
        /// The offending key
        key: &'static str,
        /// What was wrong with it
        detail: MsgString,
    },

    /// A variable-length field is not the trailing field of a message.
    #[error("variable-length field `{field}` of `{owner}` must be the last field of a message")]
    VariableFieldNotLast {
        /// The enclosing definition
        owner: MsgString,
        /// The offending field
        field: MsgString,
    },

    /// An enum annotation is attached to something that cannot carry it.
    #[error("enum `{enum_name}` cannot annotate field `{field}` of `{owner}`: only scalar primitive fields take enums")]
    EnumNotApplicable {
        /// The enclosing definition
        owner: MsgString,
        /// The annotated field
        field: MsgString,
        /// The attached enum
        enum_name: MsgString,
    },
}

/// Errors raised while constructing, encoding or decoding runtime messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The buffer ended before the layout was satisfied.
    #[error("short buffer: needed {needed} more bytes, {available} available")]
    ShortBuffer {
        /// Bytes the next element requires
        needed: usize,
        /// Bytes remaining in the buffer
        available: usize,
    },

    /// Bytes were left over after the layout was satisfied.
    #[error("excess buffer: {remaining} trailing bytes do not fit the layout")]
    ExcessBuffer {
        /// Bytes that did not map to any field
        remaining: usize,
    },

    /// A scalar does not fit its field's value domain.
    #[error("value {value} out of range [{min}, {max}] for field `{field}`")]
    OutOfRange {
        /// The constrained field
        field: MsgString,
        /// The offending value
        value: i64,
        /// Domain lower bound
        min: i64,
        /// Domain upper bound
        max: i64,
    },

    /// A wire value is not a member of the field's attached enum.
    #[error("value {value} is not a member of enum `{enum_name}` (field `{field}`)")]
    UnknownEnumValue {
        /// The annotated field
        field: MsgString,
        /// The attached enum
        enum_name: MsgString,
        /// The unmatched value
        value: i64,
    },

    /// A variable-length field was encountered before the end of a walk.
    #[error("variable-length field `{field}` is not the last field")]
    VariableFieldNotLast {
        /// The offending field
        field: MsgString,
    },

    /// A name does not match any field of the message under construction.
    #[error("message `{message}` has no field `{field}`")]
    UnknownField {
        /// The message being built
        message: MsgString,
        /// The unmatched field name
        field: MsgString,
    },

    /// A field was never assigned before `finish`.
    #[error("field `{field}` of message `{message}` was not set")]
    MissingField {
        /// The message being built
        message: MsgString,
        /// The unset field
        field: MsgString,
    },

    /// A fixed-size array holds the wrong number of elements.
    #[error("field `{field}` expects {expected} elements, got {got}")]
    ArityMismatch {
        /// The array field
        field: MsgString,
        /// Declared element count
        expected: usize,
        /// Provided element count
        got: usize,
    },

    /// A value's variant does not match the field's declared kind.
    #[error("field `{field}` expects {expected}, got {got}")]
    TypeMismatch {
        /// The mismatched field
        field: MsgString,
        /// What the layout requires
        expected: &'static str,
        /// What the value provided
        got: &'static str,
    },

    /// A name does not resolve to a bit of the bitfield.
    #[error("bitfield `{bitfield}` has no bit `{bit}`")]
    UnknownBit {
        /// The bitfield being packed
        bitfield: MsgString,
        /// The unmatched bit name
        bit: MsgString,
    },

    /// A name or identifier does not resolve to a registered message.
    #[error("unknown message `{name}`")]
    UnknownMessage {
        /// The unresolved message name
        name: MsgString,
    },

    /// A random round-trip produced a value that did not survive.
    #[error("round-trip mismatch for message `{message}`")]
    RoundTripMismatch {
        /// The message whose round-trip failed
        message: MsgString,
    },

    /// A command-line argument could not be converted to a field value.
    #[error("bad argument for field `{field}`: {detail}")]
    BadArgument {
        /// The field the argument maps to
        field: MsgString,
        /// What was wrong with it
        detail: MsgString,
    },
}
