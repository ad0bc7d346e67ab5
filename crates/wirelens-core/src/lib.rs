//! # wirelens-core
//!
//! A library for inspecting protobuf wire-format data when no `.proto` schema
//! is available.
//!
//! This crate provides the core functionality for:
//! - Decoding raw wire data into fields with byte-level provenance
//! - Recursing into length-delimited payloads as nested messages
//! - Naming and deduplicating recurring message shapes
//! - Reconstructing a pseudo-schema from the decoded structure
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`wire`]: Bounds-checked cursor, varint and fixed-width reads
//! - [`decoder`]: Best-effort recursive message decoding
//! - [`message`]: Decoded message trees and provenance queries
//! - [`frame`]: Splitting buffers of concatenated messages
//! - [`schema`]: Shape registry, schema text and descriptor export
//! - [`session`]: Decoder, registry and printer bundled together
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use wirelens_core::{Decoder, SchemaPrinter, SchemaRegistry};
//!
//! let mut registry = SchemaRegistry::new();
//! let message = Decoder::new().decode(&[0x08, 0x01, 0x10, 0x02], &mut registry);
//!
//! assert!(message.is_complete());
//! assert_eq!(message.fields.len(), 2);
//!
//! let schema = SchemaPrinter::new().render(&message);
//! assert!(schema.starts_with("message Message1 {"));
//! ```
//!
//! Decoding never fails outright. A message that could not be decoded to the
//! end keeps the fields read so far and reports why it stopped in
//! [`Message::error`].

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod decoder;
pub mod error;
pub mod frame;
pub mod message;
pub mod schema;
pub mod session;
pub mod span;
pub mod wire;

// Re-export primary types for convenience
pub use decoder::{Decoder, DecoderConfig};
pub use error::{Error, Result};
pub use frame::{split_frames, FrameSplit, Framing, LengthPrefixed, Unframed};
pub use message::{Field, FieldValue, Label, Message};
pub use schema::descriptor::InferredSchema;
pub use schema::{PrinterConfig, SchemaPrinter, SchemaRegistry};
pub use session::{Capture, Session};
pub use span::ByteSpan;
pub use wire::{Cursor, WireType, MAX_FIELD_NUMBER, RESERVED_FIELD_NUMBERS};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
