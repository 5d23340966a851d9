//! # `RustyMsg` Codegen - Schema Artifact Emission
//!
//! Projects a loaded [`rustymsg::Schema`] into two artifacts:
//!
//! - a self-contained C header with enums, bitfield macros and packed
//!   message structs (`#pragma pack(push, 1)`, little-endian layout);
//! - a Rust module binding the schema to the `rustymsg` runtime.
//!
//! Only the semantic contract of the generated artifacts is guaranteed;
//! their exact textual layout may change between versions.

#![deny(missing_docs, rust_2024_incompatible_pat, unsafe_op_in_unsafe_fn)]
#![warn(clippy::all, rust_2024_compatibility)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod c_header;
pub mod rust_bindings;

pub use c_header::{CHeaderEmitter, C_VARIABLE_ARRAY_CAP};
pub use rust_bindings::RustBindingsEmitter;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
