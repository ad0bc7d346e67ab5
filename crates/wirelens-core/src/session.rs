//! Decode sessions.
//!
//! A [`Session`] owns one [`SchemaRegistry`] and threads it through every
//! decode, so shapes seen in one buffer keep their `MessageN` name in the next.
//! Independent runs use independent sessions, or call [`Session::reset`].

use crate::decoder::{Decoder, DecoderConfig};
use crate::error::{Error, Result};
use crate::frame::Framing;
use crate::message::{Field, Message};
use crate::schema::descriptor::InferredSchema;
use crate::schema::{PrinterConfig, SchemaPrinter, SchemaRegistry};
use crate::span::ByteSpan;
use bytes::Bytes;
use tracing::debug;

/// Decoder, registry and printer for one inspection session
#[derive(Debug, Clone, Default)]
pub struct Session {
    decoder: Decoder,
    registry: SchemaRegistry,
    printer: SchemaPrinter,
}

impl Session {
    /// Creates a new session with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new session with custom configuration
    pub fn with_config(decoder: DecoderConfig, printer: PrinterConfig) -> Self {
        Self {
            decoder: Decoder::with_config(decoder),
            registry: SchemaRegistry::new(),
            printer: SchemaPrinter::with_config(printer),
        }
    }

    /// The session's schema registry
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Decode a whole buffer as one message
    pub fn decode(&mut self, data: &[u8]) -> Message {
        self.decoder.decode(data, &mut self.registry)
    }

    /// Split a buffer into frames and decode each one
    pub fn inspect(&mut self, data: impl Into<Bytes>, framing: &dyn Framing) -> Capture {
        let data = data.into();
        let split = framing.split(&data);

        let frames: Vec<Message> = split
            .frames
            .iter()
            .map(|span| self.decoder.decode_span(&data, *span, &mut self.registry))
            .collect();

        debug!(
            "Inspected {} bytes: {} frame(s), {} schema(s) known",
            data.len(),
            frames.len(),
            self.registry.len()
        );

        Capture {
            data,
            frames,
            framing_error: split.error,
        }
    }

    /// Render schema text for several roots, each block once
    pub fn render(&self, messages: &[Message]) -> String {
        self.printer.render_all(messages)
    }

    /// Export the schemas reachable from `messages` as a descriptor
    pub fn export(&self, messages: &[Message], package: &str) -> Result<InferredSchema> {
        InferredSchema::from_messages(messages, package)
    }

    /// Forget all schema assignments
    pub fn reset(&mut self) {
        self.registry.reset();
    }
}

/// A buffer together with its decoded frames
#[derive(Debug, Clone)]
pub struct Capture {
    data: Bytes,
    /// One decoded message per frame, in buffer order
    pub frames: Vec<Message>,
    /// Why framing stopped early, if it did
    pub framing_error: Option<Error>,
}

impl Capture {
    /// The inspected buffer
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Raw bytes of a span of this capture
    pub fn bytes_of(&self, span: ByteSpan) -> Bytes {
        let end = span.end.min(self.data.len());
        self.data.slice(span.begin.min(end)..end)
    }

    /// Raw bytes of frame `index`
    pub fn frame_bytes(&self, index: usize) -> Option<Bytes> {
        self.frames.get(index).map(|frame| self.bytes_of(frame.span))
    }

    /// Raw bytes of a field, tag included
    pub fn field_bytes(&self, field: &Field) -> Bytes {
        self.bytes_of(field.span())
    }

    /// Returns true if framing and every decode, nested ones included, finished cleanly
    pub fn is_complete(&self) -> bool {
        self.framing_error.is_none() && self.frames.iter().all(|f| f.errors().is_empty())
    }
}
