//! Schema-less message decoding.
//!
//! ## Algorithm Overview
//!
//! 1. Read a tag, then the value its wire type announces
//! 2. For length-delimited values, decode the payload as a nested message
//!    with an independent decoder run scoped to exactly those bytes
//! 3. Repeat until the range is consumed or a read fails
//! 4. Assign the finished message a schema id from the session registry
//!
//! A failure stops only the message it happened in. Fields decoded before it
//! are kept and the error is stored on the [`Message`]. A broken nested
//! payload never aborts its parent: the parent skips the declared length and
//! carries on with its next field.

use crate::error::{Error, Result};
use crate::message::{Field, FieldValue, Message};
use crate::schema::{self, SchemaRegistry};
use crate::span::ByteSpan;
use crate::wire::{Cursor, WireType};
use tracing::{debug, trace};

/// Default cap on nested message depth
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Configuration for the decoder
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Deepest nesting level attempted; the root is depth 0
    pub max_depth: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecoderConfig {
    /// Creates a new decoder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Best-effort protobuf decoder for buffers without a schema
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    config: DecoderConfig,
}

impl Decoder {
    /// Creates a new decoder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new decoder with custom configuration
    pub fn with_config(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode the whole buffer as one message
    pub fn decode(&self, data: &[u8], registry: &mut SchemaRegistry) -> Message {
        self.decode_span(data, ByteSpan::new(0, data.len()), registry)
    }

    /// Decode `span` of the buffer as one message.
    ///
    /// Spans and offsets in the result are absolute offsets into `data`.
    pub fn decode_span(
        &self,
        data: &[u8],
        span: ByteSpan,
        registry: &mut SchemaRegistry,
    ) -> Message {
        let span = ByteSpan::new(span.begin.min(data.len()), span.end.min(data.len()));
        debug!("Decoding message over {} ({} bytes)", span, span.len());
        let message = self.decode_message(data, span, 0, registry);

        if let Some(err) = &message.error {
            debug!(
                "Decode of {} stopped after {} field(s): {}",
                span,
                message.fields.len(),
                err
            );
        }
        message
    }

    fn decode_message(
        &self,
        data: &[u8],
        span: ByteSpan,
        depth: usize,
        registry: &mut SchemaRegistry,
    ) -> Message {
        let mut cursor = Cursor::with_span(data, span);
        let mut fields = Vec::new();

        let error = loop {
            if !cursor.has_more() {
                break None;
            }
            match self.read_field(data, &mut cursor, depth, registry) {
                Ok(field) => {
                    trace!("{}", field);
                    fields.push(field);
                }
                Err(e) => break Some(e),
            }
        };

        finish(span, fields, error, registry)
    }

    fn read_field(
        &self,
        data: &[u8],
        cursor: &mut Cursor<'_>,
        depth: usize,
        registry: &mut SchemaRegistry,
    ) -> Result<Field> {
        let tag_start = cursor.position();
        let tag = cursor.read_tag()?;
        let tag_span = ByteSpan::new(tag_start, cursor.position());

        let wire_type = WireType::from_bits(tag.wire_bits, tag_start)?;
        let value_start = cursor.position();
        let value = self.read_value(data, cursor, wire_type, tag_start, depth, registry)?;

        Ok(Field {
            id: tag.field_id,
            value,
            tag_span,
            value_span: ByteSpan::new(value_start, cursor.position()),
        })
    }

    fn read_value(
        &self,
        data: &[u8],
        cursor: &mut Cursor<'_>,
        wire_type: WireType,
        tag_start: usize,
        depth: usize,
        registry: &mut SchemaRegistry,
    ) -> Result<FieldValue> {
        match wire_type {
            WireType::Varint => cursor.read_varint().map(FieldValue::Varint),
            WireType::Fixed64 => cursor.read_f64().map(FieldValue::Fixed64),
            WireType::Fixed32 => cursor.read_f32().map(FieldValue::Fixed32),
            WireType::LengthDelimited => {
                let length = cursor.read_length()?;
                let begin = cursor.position();
                let span = ByteSpan::new(begin, begin + length);
                let message = self.decode_nested(data, span, depth + 1, registry);
                // Advance by the declared length whatever the nested decode consumed
                cursor.skip(length)?;
                Ok(FieldValue::LengthDelimited { length, message })
            }
            WireType::StartGroup | WireType::EndGroup => {
                Err(Error::unsupported_wire_type(tag_start, wire_type.bits()))
            }
        }
    }

    fn decode_nested(
        &self,
        data: &[u8],
        span: ByteSpan,
        depth: usize,
        registry: &mut SchemaRegistry,
    ) -> Message {
        if depth > self.config.max_depth {
            debug!(
                "Not descending into {} at depth {} (limit {})",
                span, depth, self.config.max_depth
            );
            let error = Error::DepthExceeded {
                offset: span.begin,
                depth,
                limit: self.config.max_depth,
            };
            return finish(span, Vec::new(), Some(error), registry);
        }

        let message = self.decode_message(data, span, depth, registry);
        if let Some(err) = &message.error {
            trace!("Nested message at {} is partial: {}", span, err);
        }
        message
    }
}

fn finish(
    span: ByteSpan,
    fields: Vec<Field>,
    error: Option<Error>,
    registry: &mut SchemaRegistry,
) -> Message {
    let signature = schema::signature(&fields);
    let schema_id = registry.assign(&signature);
    Message {
        span,
        fields,
        schema_id,
        signature,
        error,
    }
}
