//! Pseudo-schema text rendering.
//!
//! Each distinct schema id reachable from the rendered roots becomes one
//! block:
//!
//! ```text
//! message Message2 {
//!   optional int64 field1 = 1;
//!   repeated Message1 field2 = 2;
//! }
//! ```
//!
//! Fields are renumbered `1..N` by first occurrence. Referenced nested blocks
//! are written before the block that uses them, once per render.

use crate::message::{FieldValue, Message};
use std::collections::HashSet;
use std::fmt::{self, Write as FmtWrite};

/// Configuration for schema rendering
#[derive(Debug, Clone)]
pub struct PrinterConfig {
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
        }
    }
}

impl PrinterConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }
}

/// Renders decoded messages as pseudo-schema text
#[derive(Debug, Clone, Default)]
pub struct SchemaPrinter {
    config: PrinterConfig,
}

impl SchemaPrinter {
    /// Creates a new printer with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new printer with custom configuration
    pub fn with_config(config: PrinterConfig) -> Self {
        Self { config }
    }

    /// Render one root message and every schema it references
    pub fn render(&self, message: &Message) -> String {
        self.render_all(std::slice::from_ref(message))
    }

    /// Render several roots, emitting each schema id once overall
    pub fn render_all(&self, roots: &[Message]) -> String {
        let mut output = String::new();
        // Writing to a String cannot fail
        let _ = self.write_to(roots, &mut output);
        output
    }

    /// Write the rendered schema to a writer
    pub fn write_to(&self, roots: &[Message], w: &mut impl FmtWrite) -> fmt::Result {
        let mut writer = BlockWriter {
            writer: w,
            config: &self.config,
            emitted: HashSet::new(),
        };
        for root in roots {
            writer.write_message(root)?;
        }
        Ok(())
    }
}

/// Type keyword used for a field value
pub fn type_name(value: &FieldValue) -> String {
    match value {
        FieldValue::Varint(_) => "int64".to_string(),
        FieldValue::Fixed64(_) => "double".to_string(),
        FieldValue::Fixed32(_) => "float".to_string(),
        FieldValue::LengthDelimited { message, .. } => format!("Message{}", message.schema_id),
    }
}

struct BlockWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    config: &'a PrinterConfig,
    emitted: HashSet<u32>,
}

impl<W: FmtWrite> BlockWriter<'_, W> {
    fn write_message(&mut self, message: &Message) -> fmt::Result {
        if self.emitted.contains(&message.schema_id) {
            return Ok(());
        }

        for field in message.first_occurrences() {
            if let Some(nested) = field.value.as_message() {
                self.write_message(nested)?;
            }
        }

        // A nested instance with the same shape may have just written this block
        if self.emitted.contains(&message.schema_id) {
            return Ok(());
        }
        if !self.emitted.is_empty() {
            writeln!(self.writer)?;
        }
        self.emitted.insert(message.schema_id);

        writeln!(self.writer, "message Message{} {{", message.schema_id)?;
        let labels = message.labels();
        for (number, field) in message.first_occurrences().enumerate() {
            let number = number + 1;
            writeln!(
                self.writer,
                "{}{} {} field{} = {};",
                self.config.indent_str,
                labels[&field.id].as_str(),
                type_name(&field.value),
                number,
                number
            )?;
        }
        writeln!(self.writer, "}}")
    }
}
