//! # `RustySlip` - SLIP Framing and Message Transactions
//!
//! RFC 1055 framing (`END = 0xC0`, escape `0xDB`) with a tolerant receive
//! state machine, CRC-16/CCITT integrity, and a request/response
//! transaction layer that carries [`rustymsg`] messages over any
//! bidirectional byte channel.
//!
//! ## Features
//!
//! - **Pure encoder, stateful decoder** - encode is a function, decode is
//!   a byte-at-a-time state machine that resyncs at every `END`
//! - **Bounded receive buffer** - overflow resets the framer and surfaces
//!   [`FrameError::Overflow`]
//! - **Two payload layouts** - heavy (`pid|seq|len|data|crc16`) and light
//!   (`pid|data`), fixed per connection
//! - **Request/response pairing** - bit 7 of the pid marks the response;
//!   transactions collect intermediate frames in arrival order
//! - **`tokio-util` codec adapter** - drive the framer from a `Framed`
//!   stream
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustyslip::{Transaction, Variant};
//! use rustymsg::{MessageRegistry, Schema};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = Schema::from_json_str("{}")?;
//!     let registry = Arc::new(MessageRegistry::new(Arc::new(schema)));
//!     let (source, sink) = tokio::io::split(tokio::io::duplex(64).0);
//!
//!     let mut endpoint = Transaction::new(source, sink, Variant::Light, registry);
//!     let outcome = endpoint
//!         .transact(0x03, &[0x01, 0x02], Duration::from_secs(1))
//!         .await?;
//!     println!("{}", outcome.response);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs, rust_2024_incompatible_pat, unsafe_op_in_unsafe_fn)]
#![warn(clippy::all, rust_2024_compatibility)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod codec;
pub mod crc;
pub mod error;
pub mod payload;
pub mod slip;
pub mod transaction;

// Re-export commonly used types for convenience
pub use codec::SlipCodec;
pub use crc::{crc16_ccitt, CRC_INIT};
pub use error::{FrameError, TransactionError};
pub use payload::{pack_payload, parse_payload, Frame, Variant, RESPONSE_FLAG};
pub use slip::{SlipDecoder, SlipState, DEFAULT_CAPACITY, END, ESC, ESC_END, ESC_ESC};
pub use transaction::{response_pid, FrameReader, Transaction, TransactionOutcome};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
