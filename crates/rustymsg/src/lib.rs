//! # `RustyMsg` - Schema-Driven Binary Message Runtime
//!
//! This crate is the runtime half of the message toolkit: it loads a
//! declarative schema (enums, bitfields, compound types and identified
//! messages), resolves every field to a closed set of typed layouts, and
//! encodes/decodes packed little-endian messages against that model.
//!
//! ## Features
//!
//! - **Eager validation** - a schema loads cleanly or not at all
//! - **Closed field kinds** - primitives, arrays, bitfields and compounds
//!   as tagged variants, no runtime reflection
//! - **Round-trip codec** - `decode(encode(m)) == m` for every valid `m`
//! - **Message dispatch** - id-keyed creator with an opaque-bytes fallback
//! - **Random sampling** - domain-bounded instances plus an autotest
//!   harness
//! - **CLI option groups** - one generated subcommand per message
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustymsg::prelude::*;
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = Schema::from_json_str(r#"{
//!         "messages": [{"name": "Ping", "desc": "ping", "id": 1, "fields": [
//!             {"name": "token", "type": "uint16", "desc": "echo token"}
//!         ]}]
//!     }"#)?;
//!
//!     let def = schema.def("Ping").ok_or("missing")?;
//!     let mut builder = MessageBuilder::new(&schema, def);
//!     builder.set_scalar("token", 0x1234)?;
//!     let msg = builder.finish()?;
//!
//!     let bytes = rustymsg::encode(&schema, &msg)?;
//!     assert_eq!(bytes, vec![0x34, 0x12]);
//!     assert_eq!(rustymsg::decode(&schema, def, &bytes)?, msg);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs, rust_2024_incompatible_pat, unsafe_op_in_unsafe_fn)]
#![warn(clippy::all, rust_2024_compatibility)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod cli;
pub mod codec;
pub mod error;
pub mod layout;
pub mod random;
pub mod registry;
pub mod schema;
pub mod value;

// Re-export commonly used types for convenience
pub use codec::{decode, encode};
pub use error::{CodecError, CodecResult, SchemaError, SchemaResult};
pub use layout::{Domain, ElementLayout, MessageLayout};
pub use random::{autotest, sample_message};
pub use registry::{Created, MessageRegistry};
pub use schema::{
    BaseType, Bit, BitfieldDef, CountMode, EnumDef, EnumEntry, FieldDef, MessageDef, Prim, Schema,
};
pub use value::{BitsValue, FieldValue, MessageBuilder, MessageValue};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CodecError, CodecResult, Created, FieldValue, MessageBuilder, MessageRegistry,
        MessageValue, Schema, SchemaError, SchemaResult,
    };
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
